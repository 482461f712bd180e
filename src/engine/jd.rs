use tracing::debug;

use crate::engine::{DecompilerEngine, EngineDescriptor, with_footer};
use crate::error::{DecompileError, DecompileResult};
use crate::realign::{LineMapping, realign};
use crate::resolver::{ClassId, ClassResolver, PrimaryFirst};

pub const DESCRIPTOR: EngineDescriptor = EngineDescriptor {
    id: "jd-core",
    display_name: "JD-Core",
    description: "JD-Core - Classic Java decompiler",
};

const INDENT: &str = "    ";

/// Print callbacks JD-Core drives while walking a class. Line numbers are original source
/// lines, `0` when unknown.
pub trait Printer {
    fn start(&mut self, max_line_number: u32, major_version: u16, minor_version: u16);
    fn end(&mut self);

    fn print_text(&mut self, text: &str);

    fn print_numeric_constant(&mut self, constant: &str) {
        self.print_text(constant);
    }

    fn print_string_constant(&mut self, constant: &str, _owner_internal_name: &str) {
        self.print_text(constant);
    }

    fn print_keyword(&mut self, keyword: &str) {
        self.print_text(keyword);
    }

    fn print_declaration(&mut self, _internal_type_name: &str, name: &str) {
        self.print_text(name);
    }

    fn print_reference(&mut self, _internal_type_name: &str, name: &str) {
        self.print_text(name);
    }

    fn indent(&mut self);
    fn unindent(&mut self);

    fn start_line(&mut self, line_number: u32);
    fn end_line(&mut self);
    fn extra_line(&mut self, count: u32);
}

/// Loads classes through the resolver and prints the named one.
pub trait JdDecompiler: Send + Sync {
    fn decompile(
        &self,
        loader: &dyn ClassResolver,
        printer: &mut dyn Printer,
        internal_name: &str,
    ) -> anyhow::Result<()>;
}

pub struct JdCoreEngine {
    decompiler: Box<dyn JdDecompiler>,
}

impl JdCoreEngine {
    pub fn new(decompiler: impl JdDecompiler + 'static) -> Self {
        Self {
            decompiler: Box::new(decompiler),
        }
    }
}

/// Renders print calls to text and records which original line each output line starts.
#[derive(Debug, Default)]
struct TextPrinter {
    preserve_lines: bool,
    record_lines: bool,
    indent_level: usize,
    current_line: u32,
    text: String,
    mapping: LineMapping,
}

impl Printer for TextPrinter {
    fn start(&mut self, max_line_number: u32, _major_version: u16, _minor_version: u16) {
        self.current_line = 1;
        self.record_lines = self.preserve_lines && max_line_number > 0;
    }

    fn end(&mut self) {}

    fn print_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn unindent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn start_line(&mut self, line_number: u32) {
        if self.record_lines && line_number > 0 {
            self.mapping.insert(self.current_line, line_number);
        }
        for _ in 0..self.indent_level {
            self.text.push_str(INDENT);
        }
    }

    fn end_line(&mut self) {
        self.text.push('\n');
        self.current_line += 1;
    }

    fn extra_line(&mut self, count: u32) {
        for _ in 0..count {
            self.text.push('\n');
            self.current_line += 1;
        }
    }
}

impl DecompilerEngine for JdCoreEngine {
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
        let loader = PrimaryFirst::new(class_id, bytes, resolver);
        let mut printer = TextPrinter {
            preserve_lines,
            ..TextPrinter::default()
        };

        self.decompiler
            .decompile(&loader, &mut printer, class_id.as_str())
            .map_err(|e| DecompileError::engine(DESCRIPTOR.display_name, format!("{e:#}")))?;

        debug!(
            class = %class_id,
            mapped_lines = printer.mapping.len(),
            "jd-core printing finished"
        );
        let text = realign(&printer.text, &printer.mapping);
        Ok(with_footer(text, &DESCRIPTOR))
    }
}
