//! Decompiler engines.
//!
//! Every back end sits behind [`DecompilerEngine`]. Each adapter talks to its back end through
//! a capability trait shaped like that back end's native API, collects whatever line
//! information it exposes into a [`LineMapping`](crate::realign::LineMapping), and hands it to
//! the shared [`realign`](crate::realign::realign).

pub mod cfr;
pub mod jd;
pub mod procyon;
pub mod vineflower;

use serde::Serialize;

use crate::error::DecompileResult;
use crate::resolver::{ClassId, ClassResolver};

pub use cfr::CfrEngine;
pub use jd::JdCoreEngine;
pub use procyon::ProcyonEngine;
pub use vineflower::VineflowerEngine;

/// Identity of one engine, fixed at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
}

pub trait DecompilerEngine: Send + Sync {
    fn descriptor(&self) -> &EngineDescriptor;

    /// Decompiles `bytes` (the class `class_id`) to source text ending in the attribution
    /// footer. `resolver` supplies every other class the back end asks for; the primary
    /// class is always answered from `bytes`.
    fn decompile(
        &self,
        class_id: &ClassId,
        bytes: &[u8],
        resolver: &dyn ClassResolver,
        preserve_lines: bool,
    ) -> DecompileResult<String>;
}

/// Appends the one-line attribution footer.
pub fn with_footer(mut text: String, descriptor: &EngineDescriptor) -> String {
    text.push_str("\n\n// Decompiled with ");
    text.push_str(descriptor.display_name);
    text.push('\n');
    text
}

/// Whether `text` ends with the footer of `descriptor`.
pub fn has_footer(text: &str, descriptor: &EngineDescriptor) -> bool {
    text.trim_end()
        .ends_with(&format!("// Decompiled with {}", descriptor.display_name))
}
