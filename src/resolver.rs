//! Class bytecode resolution.
//!
//! A resolver answers "can I load class X, and if so, give me its bytes" for one bounded
//! scope: a directory of loose class files ([`SiblingResolver`]) or a fully indexed archive
//! ([`ArchiveResolver`]). Both live for a single decompilation request.

use memmap2::Mmap;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

use crate::error::{DecompileError, DecompileResult};

pub const CLASS_SUFFIX: &str = ".class";

// Declared entry sizes come from the archive header and are only a hint.
const MAX_SIZE_HINT: u64 = 1 << 20;

/// Slash-delimited internal class name, e.g. `com/example/Widget`. Never carries the
/// `.class` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(String);

impl ClassId {
    pub fn new(name: &str) -> Self {
        let name = name.replace('\\', "/");
        let name = name.strip_suffix(CLASS_SUFFIX).unwrap_or(&name);
        Self(name.trim_start_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment.
    pub fn simple_name(&self) -> &str {
        simple_name(&self.0)
    }

    /// Everything before the last segment, without the trailing slash.
    pub fn package(&self) -> Option<&str> {
        self.0.rfind('/').map(|idx| &self.0[..idx])
    }

    pub fn class_path(&self) -> String {
        format!("{}{CLASS_SUFFIX}", self.0)
    }

    pub fn dotted(&self) -> String {
        self.0.replace('/', ".")
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn simple_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Bytes of one compiled class together with the name they were loaded for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeBlob {
    pub id: ClassId,
    pub bytes: Vec<u8>,
}

/// Presence and content queries for class names within one scope.
pub trait ClassResolver {
    fn can_load(&self, name: &str) -> bool;

    fn load(&self, name: &str) -> DecompileResult<BytecodeBlob>;

    /// Classes this scope can enumerate. Scopes that cannot list their content return nothing.
    fn class_names(&self) -> Vec<ClassId> {
        Vec::new()
    }

    /// The archive file backing this scope, when it is one on disk.
    fn archive_path(&self) -> Option<&Path> {
        None
    }
}

/// Resolves the primary class from the bytes it was built with and every other class from a
/// `.class` file sitting in the same directory.
///
/// Lookups match on the simple name only: `other/pkg/Widget` resolves to `Widget.class` next
/// to the primary class even though its package differs.
#[derive(Debug, Clone)]
pub struct SiblingResolver {
    dir: PathBuf,
    primary: BytecodeBlob,
}

impl SiblingResolver {
    pub fn new(dir: PathBuf, primary: BytecodeBlob) -> Self {
        Self { dir, primary }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn primary(&self) -> &BytecodeBlob {
        &self.primary
    }

    fn sibling_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{CLASS_SUFFIX}", simple_name(name)))
    }
}

impl ClassResolver for SiblingResolver {
    fn can_load(&self, name: &str) -> bool {
        name == self.primary.id.as_str() || self.sibling_path(name).is_file()
    }

    fn load(&self, name: &str) -> DecompileResult<BytecodeBlob> {
        if name == self.primary.id.as_str() {
            return Ok(self.primary.clone());
        }
        let path = self.sibling_path(name);
        if !path.is_file() {
            return Err(DecompileError::NotFound(ClassId::new(name)));
        }
        Ok(BytecodeBlob {
            id: ClassId::new(name),
            bytes: std::fs::read(&path)?,
        })
    }

    fn class_names(&self) -> Vec<ClassId> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return vec![self.primary.id.clone()];
        };
        let package = self.primary.id.package();
        let mut names: Vec<ClassId> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let file_name = entry.file_name();
                let stem = file_name.to_str()?.strip_suffix(CLASS_SUFFIX)?.to_string();
                Some(match package {
                    Some(pkg) => ClassId::new(&format!("{pkg}/{stem}")),
                    None => ClassId::new(&stem),
                })
            })
            .collect();
        if !names.contains(&self.primary.id) {
            names.push(self.primary.id.clone());
        }
        names.sort();
        names
    }
}

/// Every class in one archive, read eagerly in a single sequential pass and keyed by entry
/// path with the `.class` suffix stripped.
#[derive(Debug, Clone, Default)]
pub struct ArchiveResolver {
    classes: HashMap<String, Vec<u8>>,
    archive: Option<PathBuf>,
}

impl ArchiveResolver {
    pub fn index(archive_path: &Path) -> DecompileResult<Self> {
        let file = File::open(archive_path)?;
        // SAFETY: The file is opened read-only and outlives the mapping, which is dropped
        // before this function returns.
        let mmap = unsafe { Mmap::map(&file)? };
        let mut resolver = Self::from_reader(Cursor::new(&mmap[..]))?;
        resolver.archive = Some(archive_path.to_path_buf());
        debug!(
            archive = %archive_path.display(),
            classes = resolver.len(),
            "indexed archive"
        );
        Ok(resolver)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> DecompileResult<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut classes = HashMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            if entry.enclosed_name().is_none() {
                debug!(entry = entry.name(), "skipping entry escaping the archive root");
                continue;
            }
            let Some(name) = entry.name().strip_suffix(CLASS_SUFFIX).map(str::to_string) else {
                continue;
            };
            let mut bytes = Vec::with_capacity(entry.size().min(MAX_SIZE_HINT) as usize);
            entry.read_to_end(&mut bytes)?;
            classes.insert(name, bytes);
        }
        Ok(Self {
            classes,
            archive: None,
        })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.classes.get(name).map(Vec::as_slice)
    }
}

impl ClassResolver for ArchiveResolver {
    fn can_load(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    fn load(&self, name: &str) -> DecompileResult<BytecodeBlob> {
        let bytes = self
            .classes
            .get(name)
            .ok_or_else(|| DecompileError::NotFound(ClassId::new(name)))?;
        Ok(BytecodeBlob {
            id: ClassId::new(name),
            bytes: bytes.clone(),
        })
    }

    fn class_names(&self) -> Vec<ClassId> {
        let mut names: Vec<ClassId> = self.classes.keys().map(|k| ClassId::new(k)).collect();
        names.sort();
        names
    }

    fn archive_path(&self) -> Option<&Path> {
        self.archive.as_deref()
    }
}

/// Wraps a scope so the class being decompiled is always resolvable from the bytes handed to
/// the engine, before any other lookup reaches the scope.
pub struct PrimaryFirst<'a> {
    id: &'a ClassId,
    bytes: &'a [u8],
    scope: &'a dyn ClassResolver,
}

impl<'a> PrimaryFirst<'a> {
    pub fn new(id: &'a ClassId, bytes: &'a [u8], scope: &'a dyn ClassResolver) -> Self {
        Self { id, bytes, scope }
    }

    pub fn id(&self) -> &ClassId {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        self.bytes
    }
}

impl ClassResolver for PrimaryFirst<'_> {
    fn can_load(&self, name: &str) -> bool {
        name == self.id.as_str() || self.scope.can_load(name)
    }

    fn load(&self, name: &str) -> DecompileResult<BytecodeBlob> {
        if name == self.id.as_str() {
            return Ok(BytecodeBlob {
                id: self.id.clone(),
                bytes: self.bytes.to_vec(),
            });
        }
        self.scope.load(name)
    }

    fn class_names(&self) -> Vec<ClassId> {
        let mut names = self.scope.class_names();
        if !names.contains(self.id) {
            names.push(self.id.clone());
        }
        names
    }

    fn archive_path(&self) -> Option<&Path> {
        self.scope.archive_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_lens_resolver_test_{}_{}_{}",
            std::process::id(),
            nanos,
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
        let file = fs::File::create(path)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            zip.start_file(*name, options)?;
            zip.write_all(content)?;
        }
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn class_id_strips_suffix_and_separators() {
        let id = ClassId::new("com\\example\\Widget.class");
        assert_eq!(id.as_str(), "com/example/Widget");
        assert_eq!(id.simple_name(), "Widget");
        assert_eq!(id.package(), Some("com/example"));
        assert_eq!(id.dotted(), "com.example.Widget");
        assert_eq!(ClassId::new("Widget").package(), None);
    }

    #[test]
    fn archive_resolver_indexes_every_class_entry() -> anyhow::Result<()> {
        let jar = temp_path("index.jar");
        write_jar(
            &jar,
            &[
                ("org/example/A.class", b"AAAA"),
                ("org/example/A$Inner.class", b"INNER"),
                ("org/example/", b""),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0"),
            ],
        )?;

        let resolver = ArchiveResolver::index(&jar)?;
        assert_eq!(resolver.len(), 2);
        assert!(resolver.can_load("org/example/A"));
        assert!(resolver.can_load("org/example/A$Inner"));
        assert!(!resolver.can_load("META-INF/MANIFEST"));
        assert_eq!(resolver.load("org/example/A")?.bytes, b"AAAA");
        assert_eq!(resolver.load("org/example/A$Inner")?.bytes, b"INNER");
        assert!(matches!(
            resolver.load("org/example/B"),
            Err(DecompileError::NotFound(_))
        ));

        fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn archive_resolver_skips_entries_outside_the_root() -> anyhow::Result<()> {
        let jar = temp_path("escape.jar");
        write_jar(
            &jar,
            &[
                ("a/B.class", b"B"),
                ("../../x/Evil.class", b"EVIL"),
                ("/abs/Rooted.class", b"ROOT"),
            ],
        )?;

        let resolver = ArchiveResolver::index(&jar)?;
        assert_eq!(resolver.class_names(), vec![ClassId::new("a/B")]);
        assert!(!resolver.can_load("../../x/Evil"));
        assert_eq!(resolver.archive_path(), Some(jar.as_path()));

        fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn archive_resolver_rejects_non_zip() -> anyhow::Result<()> {
        let path = temp_path("broken.jar");
        fs::write(&path, b"not a zip")?;
        assert!(matches!(
            ArchiveResolver::index(&path),
            Err(DecompileError::Archive(_))
        ));
        fs::remove_file(path)?;
        Ok(())
    }

    #[test]
    fn sibling_resolver_serves_primary_and_neighbours() -> anyhow::Result<()> {
        let dir = temp_path("siblings");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("Widget.class"), b"on-disk widget")?;
        fs::write(dir.join("Gadget.class"), b"gadget")?;

        let primary = BytecodeBlob {
            id: ClassId::new("com/example/Widget"),
            bytes: b"primary".to_vec(),
        };
        let resolver = SiblingResolver::new(dir.clone(), primary);

        assert!(resolver.can_load("com/example/Widget"));
        assert_eq!(resolver.load("com/example/Widget")?.bytes, b"primary");
        assert!(resolver.can_load("com/example/Gadget"));
        assert_eq!(resolver.load("com/example/Gadget")?.bytes, b"gadget");
        assert!(!resolver.can_load("com/example/Missing"));
        assert!(matches!(
            resolver.load("com/example/Missing"),
            Err(DecompileError::NotFound(_))
        ));

        let names = resolver.class_names();
        assert!(names.contains(&ClassId::new("com/example/Gadget")));
        assert!(names.contains(&ClassId::new("com/example/Widget")));

        fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn sibling_resolver_matches_simple_name_across_packages() -> anyhow::Result<()> {
        let dir = temp_path("sibling_heuristic");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("Gadget.class"), b"gadget")?;

        let primary = BytecodeBlob {
            id: ClassId::new("com/example/Widget"),
            bytes: b"primary".to_vec(),
        };
        let resolver = SiblingResolver::new(dir.clone(), primary);
        assert!(resolver.can_load("unrelated/pkg/Gadget"));

        fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn primary_first_answers_before_scope() -> anyhow::Result<()> {
        let scope = ArchiveResolver::default();
        let id = ClassId::new("a/B");
        let resolver = PrimaryFirst::new(&id, b"bytes", &scope);
        assert!(resolver.can_load("a/B"));
        assert_eq!(resolver.load("a/B")?.bytes, b"bytes");
        assert!(!resolver.can_load("a/C"));
        assert_eq!(resolver.class_names(), vec![id.clone()]);
        Ok(())
    }
}
