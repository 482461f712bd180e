use tracing::debug;

use crate::location::ClassLocation;
use crate::resolver::{CLASS_SUFFIX, ClassId};

/// Conventional build-output directory names. The first one found in a path, scanning from
/// its root, is treated as the top of the package hierarchy.
pub const OUTPUT_DIR_MARKERS: [&str; 4] = ["classes", "bin", "target", "build"];

/// Derives the internal class name for a location.
///
/// Tiers, in order: the archive-relative member path; everything after the first
/// build-output marker directory; the bare file name with no package.
pub fn internal_class_name(location: &ClassLocation) -> ClassId {
    if let Some(name) = location
        .archive_relative_path()
        .and_then(|rel| rel.strip_suffix(CLASS_SUFFIX))
        .filter(|name| !name.is_empty())
    {
        debug!(class = name, "class name from archive-relative path");
        return ClassId::new(name);
    }

    let logical = location.logical_path();
    let path = logical.strip_suffix(CLASS_SUFFIX).unwrap_or(&logical);
    if let Some(name) = name_after_marker(path) {
        debug!(class = %name, "class name from output-directory marker");
        return ClassId::new(&name);
    }

    let bare = path.rsplit('/').next().unwrap_or(path);
    debug!(class = bare, "class name from bare file name");
    ClassId::new(bare)
}

fn name_after_marker(path: &str) -> Option<String> {
    if !path.contains('/') {
        return None;
    }
    let parts: Vec<&str> = path.split('/').collect();
    parts.iter().enumerate().find_map(|(i, part)| {
        if !OUTPUT_DIR_MARKERS.contains(part) {
            return None;
        }
        let rest: Vec<&str> = parts[i + 1..]
            .iter()
            .copied()
            .filter(|p| !p.is_empty())
            .collect();
        (!rest.is_empty()).then(|| rest.join("/"))
    })
}
