use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::engine::{DecompilerEngine, EngineDescriptor, with_footer};
use crate::error::{DecompileError, DecompileResult};
use crate::realign::{LineMapping, realign};
use crate::resolver::{CLASS_SUFFIX, ClassId, ClassResolver, PrimaryFirst};

pub const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    id: "cfr",
    display_name: "CFR",
    description: "CFR by Lee Benfield - Excellent Java 8-21+ support",
};

/// Class bytes by `.class` path, as CFR asks for them.
pub trait ClassFileSource {
    fn class_file_content(&self, path: &str) -> Option<Vec<u8>>;

    /// `.class` paths the source can enumerate up front.
    fn known_paths(&self) -> Vec<String>;

    /// The archive every known path comes from, when there is one on disk.
    fn archive_path(&self) -> Option<&Path> {
        None
    }
}

/// Receives CFR's output through per-kind sinks.
pub trait OutputSink {
    /// Whether a line-number sink should be offered.
    fn wants_line_numbers(&self) -> bool;

    fn java(&mut self, text: &str);

    /// Decompiled line to original line pairs for one class.
    fn line_numbers(&mut self, mappings: &[(u32, u32)]);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfrOptions {
    values: BTreeMap<String, String>,
}

impl Default for CfrOptions {
    fn default() -> Self {
        let values = [
            ("showversion", "false"),
            ("hideutf", "false"),
            ("innerclasses", "true"),
            ("comments", "false"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { values }
    }
}

impl CfrOptions {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

pub trait CfrDriver: Send + Sync {
    fn analyse(
        &self,
        class_path: &str,
        source: &dyn ClassFileSource,
        sink: &mut dyn OutputSink,
        options: &CfrOptions,
    ) -> anyhow::Result<()>;
}

pub struct CfrEngine {
    driver: Box<dyn CfrDriver>,
    options: CfrOptions,
}

impl CfrEngine {
    pub fn new(driver: impl CfrDriver + 'static) -> Self {
        Self {
            driver: Box::new(driver),
            options: CfrOptions::default(),
        }
    }
}

struct ResolverSource<'a> {
    resolver: PrimaryFirst<'a>,
}

impl ClassFileSource for ResolverSource<'_> {
    fn class_file_content(&self, path: &str) -> Option<Vec<u8>> {
        let name = path.strip_suffix(CLASS_SUFFIX).unwrap_or(path);
        if !self.resolver.can_load(name) {
            return None;
        }
        self.resolver.load(name).ok().map(|blob| blob.bytes)
    }

    fn known_paths(&self) -> Vec<String> {
        self.resolver
            .class_names()
            .iter()
            .map(ClassId::class_path)
            .collect()
    }

    fn archive_path(&self) -> Option<&Path> {
        self.resolver.archive_path()
    }
}

struct CapturingSink {
    preserve_lines: bool,
    text: String,
    mapping: LineMapping,
}

impl OutputSink for CapturingSink {
    fn wants_line_numbers(&self) -> bool {
        self.preserve_lines
    }

    fn java(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn line_numbers(&mut self, mappings: &[(u32, u32)]) {
        if self.preserve_lines {
            self.mapping.extend(mappings.iter().copied());
        }
    }
}

impl DecompilerEngine for CfrEngine {
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
        let source = ResolverSource {
            resolver: PrimaryFirst::new(class_id, bytes, resolver),
        };
        let mut sink = CapturingSink {
            preserve_lines,
            text: String::new(),
            mapping: LineMapping::new(),
        };

        self.driver
            .analyse(&class_id.class_path(), &source, &mut sink, &self.options)
            .map_err(|e| DecompileError::engine(DESCRIPTOR.display_name, format!("{e:#}")))?;

        debug!(
            class = %class_id,
            mapped_lines = sink.mapping.len(),
            "cfr analysis finished"
        );
        let text = if preserve_lines && !sink.mapping.is_empty() {
            realign(&sink.text, &sink.mapping)
        } else {
            sink.text
        };
        Ok(with_footer(text, &DESCRIPTOR))
    }
}
