//! The decompilation facade.
//!
//! [`Decompiler::decompile`] always returns displayable text: decompiled source with an
//! attribution footer, or a diagnostic comment block describing what went wrong. One failing
//! class never turns into an error for the caller.

use std::path::Path;
use tracing::{debug, info, warn};

use crate::engine::{DecompilerEngine, EngineDescriptor};
use crate::error::{DecompileError, DecompileResult};
use crate::location::ClassLocation;
use crate::naming::internal_class_name;
use crate::registry::EngineRegistry;
use crate::resolver::{ArchiveResolver, BytecodeBlob, ClassId, ClassResolver, SiblingResolver};

/// Per-request overrides of the stored preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub engine: Option<String>,
    pub preserve_lines: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Decompiled {
    pub class_id: ClassId,
    pub engine: EngineDescriptor,
    pub text: String,
}

#[derive(Clone)]
pub struct Decompiler {
    registry: EngineRegistry,
}

impl Decompiler {
    pub fn new(registry: EngineRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    /// Decompiles with the stored engine selection and realign preference.
    pub fn decompile(&self, location: &ClassLocation) -> String {
        self.decompile_with(location, &Overrides::default())
    }

    pub fn decompile_with(&self, location: &ClassLocation, overrides: &Overrides) -> String {
        match self.try_decompile_with(location, overrides) {
            Ok(decompiled) => decompiled.text,
            Err(err) => {
                warn!(location = %location, "decompilation failed: {err}");
                self.diagnostic_text(&err)
            }
        }
    }

    pub fn try_decompile(&self, location: &ClassLocation) -> DecompileResult<Decompiled> {
        self.try_decompile_with(location, &Overrides::default())
    }

    pub fn try_decompile_with(
        &self,
        location: &ClassLocation,
        overrides: &Overrides,
    ) -> DecompileResult<Decompiled> {
        debug!(location = %location, archived = location.is_archived(), "decompile requested");
        match location {
            ClassLocation::File(path) => self.decompile_file(location, path, overrides),
            ClassLocation::Archived { .. } => self.decompile_archived(location, overrides),
        }
    }

    fn decompile_file(
        &self,
        location: &ClassLocation,
        path: &Path,
        overrides: &Overrides,
    ) -> DecompileResult<Decompiled> {
        if !path.is_file() {
            return Err(DecompileError::ContainerUnresolvable(format!(
                "Cannot get file for: {}",
                path.display()
            )));
        }
        let bytes = std::fs::read(path)?;
        let class_id = internal_class_name(location);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        debug!(class = %class_id, dir = %dir.display(), "using sibling resolver");

        let resolver = SiblingResolver::new(
            dir,
            BytecodeBlob {
                id: class_id.clone(),
                bytes,
            },
        );
        let primary = resolver.primary().bytes.as_slice();
        self.run_engine(&class_id, primary, &resolver, overrides)
    }

    fn decompile_archived(
        &self,
        location: &ClassLocation,
        overrides: &Overrides,
    ) -> DecompileResult<Decompiled> {
        let archive = location.archive_file()?;
        let resolver = ArchiveResolver::index(archive)?;
        let class_id = internal_class_name(location);
        let Some(bytes) = resolver.get(class_id.as_str()) else {
            return Err(DecompileError::NotFound(class_id));
        };
        debug!(
            class = %class_id,
            archive = %archive.display(),
            indexed = resolver.len(),
            "using archive resolver"
        );
        self.run_engine(&class_id, bytes, &resolver, overrides)
    }

    fn run_engine(
        &self,
        class_id: &ClassId,
        bytes: &[u8],
        resolver: &dyn ClassResolver,
        overrides: &Overrides,
    ) -> DecompileResult<Decompiled> {
        let engine = self.pick_engine(overrides);
        let preserve_lines = overrides
            .preserve_lines
            .unwrap_or_else(|| self.registry.realign_preference());
        let descriptor = engine.descriptor().clone();
        info!(
            class = %class_id,
            engine = descriptor.id,
            preserve_lines,
            "decompiling"
        );

        let text = engine.decompile(class_id, bytes, resolver, preserve_lines)?;
        Ok(Decompiled {
            class_id: class_id.clone(),
            engine: descriptor,
            text,
        })
    }

    fn pick_engine(&self, overrides: &Overrides) -> std::sync::Arc<dyn DecompilerEngine> {
        if let Some(id) = overrides.engine.as_deref() {
            match self.registry.engine(id) {
                Some(engine) => return engine,
                None => warn!(id, "unknown engine override, using selected engine"),
            }
        }
        self.registry.selected_engine()
    }

    /// Comment-only text describing `err`, safe to show in place of source.
    pub fn diagnostic_text(&self, err: &DecompileError) -> String {
        match err {
            DecompileError::Engine { engine, message } => {
                let others: Vec<&str> = self
                    .registry
                    .available_engines()
                    .iter()
                    .filter(|d| d.display_name != engine.as_str())
                    .map(|d| d.id)
                    .collect();
                let mut text = format!(
                    "// Decompilation failed with {engine}\n// Error: {}\n",
                    comment_safe(message)
                );
                match others.first() {
                    Some(first) => text.push_str(&format!(
                        "// Try selecting a different decompiler with `class-lens select {first}` (available: {})\n",
                        others.join(", ")
                    )),
                    None => text.push_str("// Try selecting a different decompiler\n"),
                }
                text
            }
            other => format!(
                "// Error during decompilation: {}\n// {}\n",
                comment_safe(&other.to_string()),
                other.kind()
            ),
        }
    }
}

/// Keeps multi-line messages inside line comments.
fn comment_safe(message: &str) -> String {
    message.trim().replace('\n', "\n// ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{has_footer, with_footer};
    use crate::prefs::{MemoryStore, PreferenceStore};
    use crate::realign::{LineMapping, realign};
    use crate::registry::PREF_PRESERVE_LINE_NUMBERS;
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};
    use zip::write::FileOptions;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "class_lens_decompiler_test_{}_{}_{}",
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

    /// Echoes the class name, byte count and dependency visibility; with preserve_lines it
    /// pushes its second line to original line 4.
    struct Echo(EngineDescriptor);

    impl DecompilerEngine for Echo {
        fn descriptor(&self) -> &EngineDescriptor {
            &self.0
        }

        fn decompile(
            &self,
            class_id: &ClassId,
            bytes: &[u8],
            resolver: &dyn ClassResolver,
            preserve_lines: bool,
        ) -> DecompileResult<String> {
            let body = format!(
                "// {class_id} ({} bytes)\nclass {} {{}} // dep={}",
                bytes.len(),
                class_id.simple_name(),
                resolver.can_load("a/Dep")
            );
            let mut mapping = LineMapping::new();
            if preserve_lines {
                mapping.insert(2, 4);
            }
            Ok(with_footer(realign(&body, &mapping), &self.0))
        }
    }

    struct Broken(EngineDescriptor);

    impl DecompilerEngine for Broken {
        fn descriptor(&self) -> &EngineDescriptor {
            &self.0
        }

        fn decompile(
            &self,
            _class_id: &ClassId,
            _bytes: &[u8],
            _resolver: &dyn ClassResolver,
            _preserve_lines: bool,
        ) -> DecompileResult<String> {
            Err(DecompileError::engine(
                self.0.display_name,
                "java.lang.IllegalStateException: bad constant pool\n\tat Foo.bar",
            ))
        }
    }

    const ECHO: EngineDescriptor = EngineDescriptor {
        id: "cfr",
        display_name: "Echo",
        description: "echo",
    };
    const BROKEN: EngineDescriptor = EngineDescriptor {
        id: "broken",
        display_name: "Broken",
        description: "always fails",
    };

    fn decompiler() -> (Decompiler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mut registry = EngineRegistry::new(store.clone(), Echo(ECHO));
        registry.register(Broken(BROKEN));
        (Decompiler::new(registry), store)
    }

    #[test]
    fn decompiles_loose_file_with_sibling_dependencies() -> anyhow::Result<()> {
        let dir = temp_path("loose").join("classes").join("a");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("B.class"), b"0123456789")?;
        fs::write(dir.join("Dep.class"), b"dep")?;

        let (decompiler, _) = decompiler();
        let decompiled = decompiler.try_decompile(&ClassLocation::file(dir.join("B.class")))?;
        assert_eq!(decompiled.class_id.as_str(), "a/B");
        assert_eq!(decompiled.engine.id, "cfr");
        let lines: Vec<&str> = decompiled.text.split('\n').collect();
        assert_eq!(lines[0], "// a/B (10 bytes)");
        assert_eq!(lines[3], "class B {} // dep=true");
        assert!(has_footer(&decompiled.text, &ECHO));

        let _ = fs::remove_dir_all(dir.parent().unwrap().parent().unwrap());
        Ok(())
    }

    #[test]
    fn decompiles_archive_member_with_archive_dependencies() -> anyhow::Result<()> {
        let jar = temp_path("member.jar");
        write_jar(&jar, &[("a/B.class", b"12345"), ("a/Dep.class", b"d")])?;

        let (decompiler, store) = decompiler();
        store.put_bool(PREF_PRESERVE_LINE_NUMBERS, false)?;
        let text = decompiler.decompile(&ClassLocation::archived(&jar, "a/B.class"));
        assert!(text.starts_with("// a/B (5 bytes)\nclass B {} // dep=true"));
        assert!(text.ends_with("// Decompiled with Echo\n"));

        fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn missing_archive_member_is_diagnosed() -> anyhow::Result<()> {
        let jar = temp_path("no_member.jar");
        write_jar(&jar, &[("a/Other.class", b"x")])?;

        let (decompiler, _) = decompiler();
        let text = decompiler.decompile(&ClassLocation::archived(&jar, "a/B.class"));
        assert!(text.starts_with("// Error during decompilation: Cannot load: a/B\n"));
        assert!(text.contains("NotFound"));

        fs::remove_file(jar)?;
        Ok(())
    }

    #[test]
    fn unresolvable_archive_is_diagnosed() {
        let (decompiler, _) = decompiler();
        let text = decompiler.decompile(&ClassLocation::parse("!/a/B.class"));
        assert!(text.contains("Container unresolvable"));
        assert!(text.contains("Cannot determine archive"));
        assert!(text.lines().all(|l| l.starts_with("//")));

        let nested = ClassLocation::parse(&format!(
            "{}!/inner.jar!/a/B.class",
            temp_path("outer.jar").display()
        ));
        let text = decompiler.decompile(&nested);
        assert!(text.contains("Cannot get file for archive"));
    }

    #[test]
    fn engine_failure_names_engine_and_alternatives() -> anyhow::Result<()> {
        let dir = temp_path("broken");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("B.class"), b"x")?;

        let (decompiler, _) = decompiler();
        decompiler.registry().set_selected("broken")?;
        let text = decompiler.decompile(&ClassLocation::file(dir.join("B.class")));
        assert!(text.starts_with("// Decompilation failed with Broken\n"));
        assert!(text.contains("// Error: java.lang.IllegalStateException: bad constant pool"));
        assert!(text.contains("class-lens select cfr"));
        assert!(text.lines().all(|l| l.starts_with("//")));

        fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn overrides_beat_stored_preferences() -> anyhow::Result<()> {
        let dir = temp_path("overrides");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("B.class"), b"x")?;
        let location = ClassLocation::file(dir.join("B.class"));

        let (decompiler, _) = decompiler();
        decompiler.registry().set_selected("broken")?;
        let overrides = Overrides {
            engine: Some("cfr".to_string()),
            preserve_lines: Some(false),
        };
        let text = decompiler.decompile_with(&location, &overrides);
        assert!(text.starts_with("// B (1 bytes)\nclass B {}"));

        fs::remove_dir_all(dir)?;
        Ok(())
    }

    #[test]
    fn missing_loose_file_is_diagnosed() {
        let (decompiler, _) = decompiler();
        let text = decompiler.decompile(&ClassLocation::file(temp_path("gone/B.class")));
        assert!(text.contains("Cannot get file for"));
        assert!(text.contains("ContainerUnresolvable"));
    }
}
