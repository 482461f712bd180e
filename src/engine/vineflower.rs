use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::engine::{DecompilerEngine, EngineDescriptor, with_footer};
use crate::error::{DecompileError, DecompileResult};
use crate::realign::{LineMapping, realign};
use crate::resolver::{CLASS_SUFFIX, ClassId, ClassResolver, PrimaryFirst, simple_name};

pub const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    id: "vineflower",
    display_name: "Fernflower (Vineflower)",
    description: "Fernflower/Vineflower - IntelliJ IDEA style decompilation",
};

/// Bytes for a class file named by its external path.
pub trait BytecodeProvider {
    fn bytecode(&self, external_path: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Receives decompiled classes. `mapping` is a flat
/// `[decompiled, original, decompiled, original, ..]` array when bytecode source mapping is on.
pub trait ResultSaver {
    fn save_class_file(
        &mut self,
        path: &str,
        qualified_name: &str,
        entry_name: &str,
        content: &str,
        mapping: Option<&[i32]>,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

pub trait FernflowerLogger {
    fn write_message(&mut self, message: &str, severity: Severity);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FernflowerOptions {
    values: BTreeMap<String, String>,
}

impl FernflowerOptions {
    pub fn new(preserve_lines: bool) -> Self {
        let mut values: BTreeMap<String, String> = [
            ("dgs", "1"),
            ("asc", "1"),
            ("ind", "    "),
            ("udv", "1"),
            ("rsy", "1"),
            ("rbr", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        if preserve_lines {
            values.insert("bsm".to_string(), "1".to_string());
        }
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

pub trait Fernflower: Send + Sync {
    /// Decompiles the class file at `source`, pulling bytes through `provider`.
    fn decompile_context(
        &self,
        source: &Path,
        provider: &dyn BytecodeProvider,
        saver: &mut dyn ResultSaver,
        logger: &mut dyn FernflowerLogger,
        options: &FernflowerOptions,
    ) -> anyhow::Result<()>;
}

pub struct VineflowerEngine {
    fernflower: Box<dyn Fernflower>,
}

impl VineflowerEngine {
    pub fn new(fernflower: impl Fernflower + 'static) -> Self {
        Self {
            fernflower: Box::new(fernflower),
        }
    }
}

struct ResolverProvider<'a> {
    resolver: PrimaryFirst<'a>,
}

impl ResolverProvider<'_> {
    /// Maps an external path to a class name: the primary class when the path ends with its
    /// class path or its simple file name, otherwise the longest trailing run of segments the
    /// scope can load.
    fn class_for_path(&self, external_path: &str) -> Option<String> {
        let normalized = external_path.replace('\\', "/");
        let primary = self.resolver.id();
        if normalized.ends_with(&primary.class_path())
            || simple_name(&normalized) == format!("{}{CLASS_SUFFIX}", primary.simple_name())
        {
            return Some(primary.as_str().to_string());
        }

        let stem = normalized.strip_suffix(CLASS_SUFFIX).unwrap_or(&normalized);
        let segments: Vec<&str> = stem.split('/').filter(|s| !s.is_empty()).collect();
        (0..segments.len())
            .map(|start| segments[start..].join("/"))
            .find(|candidate| self.resolver.can_load(candidate))
    }
}

impl BytecodeProvider for ResolverProvider<'_> {
    fn bytecode(&self, external_path: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let Some(name) = self.class_for_path(external_path) else {
            return Ok(None);
        };
        Ok(Some(self.resolver.load(&name)?.bytes))
    }
}

struct CollectingSaver {
    preserve_lines: bool,
    text: String,
}

impl ResultSaver for CollectingSaver {
    fn save_class_file(
        &mut self,
        _path: &str,
        _qualified_name: &str,
        _entry_name: &str,
        content: &str,
        mapping: Option<&[i32]>,
    ) {
        if content.is_empty() {
            return;
        }
        match mapping {
            Some(flat) if self.preserve_lines && !flat.is_empty() => {
                let lines = LineMapping::from_flat_pairs(flat);
                self.text.push_str(&realign(content, &lines));
            }
            _ => self.text.push_str(content),
        }
    }
}

#[derive(Default)]
struct ProblemLog {
    lines: String,
}

impl FernflowerLogger for ProblemLog {
    fn write_message(&mut self, message: &str, severity: Severity) {
        if severity >= Severity::Warn {
            warn!(severity = severity.label(), "{message}");
            self.lines
                .push_str(&format!("// {}: {message}\n", severity.label()));
        }
    }
}

impl DecompilerEngine for VineflowerEngine {
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
        let provider = ResolverProvider {
            resolver: PrimaryFirst::new(class_id, bytes, resolver),
        };
        let mut saver = CollectingSaver {
            preserve_lines,
            text: String::new(),
        };
        let mut log = ProblemLog::default();
        let options = FernflowerOptions::new(preserve_lines);
        let source = std::env::temp_dir().join(class_id.class_path());

        self.fernflower
            .decompile_context(&source, &provider, &mut saver, &mut log, &options)
            .map_err(|e| DecompileError::engine(DESCRIPTOR.display_name, format!("{e:#}")))?;

        let mut text = saver.text;
        if text.is_empty() {
            debug!(class = %class_id, "vineflower produced no output");
            text.push_str("// Decompilation produced no output\n");
            text.push_str(&log.lines);
        }
        Ok(with_footer(text, &DESCRIPTOR))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{ArchiveResolver, BytecodeBlob, SiblingResolver};
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;

    /// Fetches the source and a dependency, then saves a body with a flat mapping.
    struct ScriptedFernflower {
        emit: bool,
    }

    impl Fernflower for ScriptedFernflower {
        fn decompile_context(
            &self,
            source: &Path,
            provider: &dyn BytecodeProvider,
            saver: &mut dyn ResultSaver,
            logger: &mut dyn FernflowerLogger,
            options: &FernflowerOptions,
        ) -> anyhow::Result<()> {
            let path = source.to_string_lossy();
            let Some(bytes) = provider.bytecode(&path)? else {
                anyhow::bail!("no bytes for {path}");
            };
            anyhow::ensure!(bytes == b"PRIMARY", "wrong primary bytes");
            let dep = provider.bytecode("/tmp/anywhere/org/dep/Helper.class")?;
            anyhow::ensure!(dep.as_deref() == Some(&b"HELPER"[..]), "dependency missing");
            assert!(provider.bytecode("/tmp/x/Nope.class")?.is_none());

            logger.write_message("skipped lambda", Severity::Warn);
            logger.write_message("chatty", Severity::Info);
            if self.emit {
                let mapping: &[i32] = &[2, 6, 3, 0];
                let bsm = options.get("bsm") == Some("1");
                saver.save_class_file(
                    "",
                    "a.B",
                    "a/B.java",
                    "package a;\nclass B {\n}\n",
                    bsm.then_some(mapping),
                );
            }
            Ok(())
        }
    }

    fn scope() -> ArchiveResolver {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("org/dep/Helper.class", FileOptions::default())
            .unwrap();
        zip.write_all(b"HELPER").unwrap();
        let cursor = zip.finish().unwrap();
        ArchiveResolver::from_reader(Cursor::new(cursor.into_inner())).unwrap()
    }

    #[test]
    fn flat_mapping_drives_realignment() -> DecompileResult<()> {
        let engine = VineflowerEngine::new(ScriptedFernflower { emit: true });
        let out = engine.decompile(&ClassId::new("a/B"), b"PRIMARY", &scope(), true)?;
        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines[0], "package a;");
        assert_eq!(lines[5], "class B {");
        assert!(out.ends_with("// Decompiled with Fernflower (Vineflower)\n"));
        Ok(())
    }

    #[test]
    fn no_mapping_without_preserve_lines() -> DecompileResult<()> {
        let engine = VineflowerEngine::new(ScriptedFernflower { emit: true });
        let out = engine.decompile(&ClassId::new("a/B"), b"PRIMARY", &scope(), false)?;
        assert!(out.starts_with("package a;\nclass B {\n}\n"));
        Ok(())
    }

    #[test]
    fn empty_output_reports_captured_problems() -> DecompileResult<()> {
        let engine = VineflowerEngine::new(ScriptedFernflower { emit: false });
        let out = engine.decompile(&ClassId::new("a/B"), b"PRIMARY", &scope(), true)?;
        assert!(out.starts_with("// Decompilation produced no output\n// WARN: skipped lambda\n"));
        assert!(!out.contains("chatty"));
        Ok(())
    }

    #[test]
    fn simple_name_paths_reach_sibling_classes() {
        let dir = std::env::temp_dir();
        let sibling = SiblingResolver::new(
            dir,
            BytecodeBlob {
                id: ClassId::new("a/B"),
                bytes: b"PRIMARY".to_vec(),
            },
        );
        let id = ClassId::new("a/B");
        let provider = ResolverProvider {
            resolver: PrimaryFirst::new(&id, b"PRIMARY", &sibling),
        };
        assert_eq!(
            provider.class_for_path("C:\\work\\out\\B.class").as_deref(),
            Some("a/B")
        );
    }
}
