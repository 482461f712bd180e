use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{DecompileError, DecompileResult};

const ARCHIVE_SEPARATOR: &str = "!/";
const JAR_URL_PREFIX: &str = "jar:file:";

/// Where a class file lives: loose on disk, or as a member of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassLocation {
    File(PathBuf),
    Archived {
        /// The archive's own plain file, when the host could map it to one.
        archive: Option<PathBuf>,
        /// Path of the member relative to the archive root.
        entry: String,
    },
}

impl ClassLocation {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn archived(archive: impl Into<PathBuf>, entry: &str) -> Self {
        Self::Archived {
            archive: Some(archive.into()),
            entry: entry.trim_start_matches('/').to_string(),
        }
    }

    /// Parses `path/to/Foo.class`, `lib.jar!/a/B.class` or `jar:file:/lib.jar!/a/B.class`.
    ///
    /// Nested archives (`outer.jar!/inner.jar!/a/B.class`) keep the whole prefix as the archive
    /// path, which never maps to a plain file.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.strip_prefix(JAR_URL_PREFIX).unwrap_or(raw);
        match raw.rsplit_once(ARCHIVE_SEPARATOR) {
            Some((archive, entry)) => Self::Archived {
                archive: (!archive.is_empty()).then(|| PathBuf::from(archive)),
                entry: entry.trim_start_matches('/').to_string(),
            },
            None => Self::File(PathBuf::from(raw)),
        }
    }

    pub fn is_archived(&self) -> bool {
        matches!(self, Self::Archived { .. })
    }

    /// Path used for naming: the filesystem path, or the in-archive member path.
    pub fn logical_path(&self) -> String {
        match self {
            Self::File(path) => path.to_string_lossy().replace('\\', "/"),
            Self::Archived { entry, .. } => entry.clone(),
        }
    }

    /// Member path relative to the archive root, for archived locations.
    pub fn archive_relative_path(&self) -> Option<&str> {
        match self {
            Self::File(_) => None,
            Self::Archived { entry, .. } => Some(entry.as_str()),
        }
    }

    /// File name of the class without directories.
    pub fn file_name(&self) -> String {
        let logical = self.logical_path();
        logical.rsplit('/').next().unwrap_or(&logical).to_string()
    }

    /// The archive as a plain file, or `ContainerUnresolvable`.
    pub fn archive_file(&self) -> DecompileResult<&Path> {
        match self {
            Self::File(path) => Err(DecompileError::ContainerUnresolvable(format!(
                "{} is not inside an archive",
                path.display()
            ))),
            Self::Archived { archive: None, entry } => Err(DecompileError::ContainerUnresolvable(
                format!("Cannot determine archive for: {entry}"),
            )),
            Self::Archived {
                archive: Some(archive),
                ..
            } => {
                if archive.is_file() {
                    Ok(archive.as_path())
                } else {
                    Err(DecompileError::ContainerUnresolvable(format!(
                        "Cannot get file for archive: {}",
                        archive.display()
                    )))
                }
            }
        }
    }
}

impl fmt::Display for ClassLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Archived {
                archive: Some(archive),
                entry,
            } => write!(f, "{}{ARCHIVE_SEPARATOR}{entry}", archive.display()),
            Self::Archived {
                archive: None,
                entry,
            } => write!(f, "<unknown archive>{ARCHIVE_SEPARATOR}{entry}"),
        }
    }
}
