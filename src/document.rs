use serde::Serialize;

use crate::error::{DecompileError, DecompileResult};
use crate::location::ClassLocation;

pub const JAVA_MIME_TYPE: &str = "text/x-java";

/// A read-only view of decompiled source, presented under the class file's own name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecompiledDocument {
    pub display_name: String,
    pub mime_type: &'static str,
    pub text: String,
}

impl DecompiledDocument {
    pub fn new(location: &ClassLocation, text: String) -> Self {
        Self {
            display_name: location.file_name(),
            mime_type: JAVA_MIME_TYPE,
            text,
        }
    }

    /// Decompiled text has no backing source, so it never counts as edited.
    pub fn is_modified(&self) -> bool {
        false
    }

    pub fn write_back(&self) -> DecompileResult<()> {
        Err(DecompileError::ReadOnly(
            "Decompiled source is read-only".to_string(),
        ))
    }
}
