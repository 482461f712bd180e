//! Procyon adapter.
//!
//! Procyon exposes no decompiled-to-original line information that keeps the output
//! compilable, so `preserve_lines` cannot realign anything here. It is accepted and only
//! pins `retain_pointless_switches` off.

use crate::engine::{DecompilerEngine, EngineDescriptor, with_footer};
use crate::error::{DecompileError, DecompileResult};
use crate::resolver::{ClassId, ClassResolver, PrimaryFirst};

pub const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    id: "procyon",
    display_name: "Procyon",
    description: "Procyon by Mike Strobel - Excellent generics support",
};

/// Fills `buffer` with the bytes of `internal_name`, returning whether it could.
pub trait TypeLoader {
    fn try_load_type(&self, internal_name: &str, buffer: &mut Vec<u8>) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcyonSettings {
    pub show_synthetic_members: bool,
    pub force_explicit_imports: bool,
    pub retain_pointless_switches: bool,
}

impl Default for ProcyonSettings {
    fn default() -> Self {
        Self {
            show_synthetic_members: false,
            force_explicit_imports: true,
            retain_pointless_switches: false,
        }
    }
}

pub trait ProcyonDecompiler: Send + Sync {
    fn decompile_type(
        &self,
        internal_name: &str,
        loader: &dyn TypeLoader,
        settings: &ProcyonSettings,
    ) -> anyhow::Result<String>;
}

pub struct ProcyonEngine {
    decompiler: Box<dyn ProcyonDecompiler>,
}

impl ProcyonEngine {
    pub fn new(decompiler: impl ProcyonDecompiler + 'static) -> Self {
        Self {
            decompiler: Box::new(decompiler),
        }
    }
}

struct ResolverTypeLoader<'a> {
    resolver: PrimaryFirst<'a>,
}

impl TypeLoader for ResolverTypeLoader<'_> {
    fn try_load_type(&self, internal_name: &str, buffer: &mut Vec<u8>) -> bool {
        if !self.resolver.can_load(internal_name) {
            return false;
        }
        match self.resolver.load(internal_name) {
            Ok(blob) => {
                buffer.clear();
                buffer.extend_from_slice(&blob.bytes);
                true
            }
            Err(_) => false,
        }
    }
}

impl DecompilerEngine for ProcyonEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &DESCRIPTOR
    }

    fn decompile(
        &self,
        class_id: &ClassId,
        bytes: &[u8],
        resolver: &dyn ClassResolver,
        preserve_lines: bool,
    ) -> DecompileResult<String> {
        let mut settings = ProcyonSettings::default();
        if preserve_lines {
            settings.retain_pointless_switches = false;
        }
        let loader = ResolverTypeLoader {
            resolver: PrimaryFirst::new(class_id, bytes, resolver),
        };

        let text = self
            .decompiler
            .decompile_type(class_id.as_str(), &loader, &settings)
            .map_err(|e| DecompileError::engine(DESCRIPTOR.display_name, format!("{e:#}")))?;
        Ok(with_footer(text, &DESCRIPTOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ArchiveResolver;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;

    struct EchoProcyon;

    impl ProcyonDecompiler for EchoProcyon {
        fn decompile_type(
            &self,
            internal_name: &str,
            loader: &dyn TypeLoader,
            settings: &ProcyonSettings,
        ) -> anyhow::Result<String> {
            let mut buffer = Vec::new();
            anyhow::ensure!(
                loader.try_load_type(internal_name, &mut buffer),
                "Could not load type: {internal_name}"
            );
            let mut dep = Vec::new();
            let has_dep = loader.try_load_type("a/Dep", &mut dep);
            Ok(format!(
                "// {} bytes, dep={has_dep}, switches={}\nclass B {{}}",
                buffer.len(),
                settings.retain_pointless_switches
            ))
        }
    }

    fn scope_with_dep() -> ArchiveResolver {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("a/Dep.class", FileOptions::default()).unwrap();
        zip.write_all(b"DEP").unwrap();
        let cursor = zip.finish().unwrap();
        ArchiveResolver::from_reader(Cursor::new(cursor.into_inner())).unwrap()
    }

    #[test]
    fn loads_primary_and_dependencies_through_type_loader() -> DecompileResult<()> {
        let engine = ProcyonEngine::new(EchoProcyon);
        let out = engine.decompile(&ClassId::new("a/B"), b"1234", &scope_with_dep(), false)?;
        assert!(out.starts_with("// 4 bytes, dep=true, switches=false\nclass B {}"));
        assert!(out.ends_with("// Decompiled with Procyon\n"));
        Ok(())
    }

    #[test]
    fn preserve_lines_is_accepted_without_realignment() -> DecompileResult<()> {
        let engine = ProcyonEngine::new(EchoProcyon);
        let out = engine.decompile(
            &ClassId::new("a/B"),
            b"1234",
            &ArchiveResolver::default(),
            true,
        )?;
        assert!(out.starts_with("// 4 bytes, dep=false, switches=false\nclass B {}\n\n//"));
        Ok(())
    }
}
