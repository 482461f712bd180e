use crate::resolver::ClassId;

#[derive(Debug, thiserror::Error)]
pub enum DecompileError {
    /// The resolver has no bytes for the requested class.
    #[error("Cannot load: {0}")]
    NotFound(ClassId),

    /// The class file, or the archive holding it, is not a plain file on disk.
    #[error("Container unresolvable: {0}")]
    ContainerUnresolvable(String),

    #[error("{engine} failed: {message}")]
    Engine { engine: String, message: String },

    #[error("{0}")]
    ReadOnly(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Preference store error: {0}")]
    Store(String),
}

impl DecompileError {
    pub fn engine(engine: &str, err: impl std::fmt::Display) -> Self {
        Self::Engine {
            engine: engine.to_string(),
            message: err.to_string(),
        }
    }

    /// Short category label used in diagnostic text.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::ContainerUnresolvable(_) => "ContainerUnresolvable",
            Self::Engine { .. } => "DecompilationError",
            Self::ReadOnly(_) => "ReadOnlyViolation",
            Self::Io(_) => "IoError",
            Self::Archive(_) => "ArchiveError",
            Self::Store(_) => "StoreError",
        }
    }
}

impl From<heed::Error> for DecompileError {
    fn from(err: heed::Error) -> Self {
        Self::Store(err.to_string())
    }
}

pub type DecompileResult<T> = Result<T, DecompileError>;
