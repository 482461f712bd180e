//! Out-of-process back ends.
//!
//! Each engine's capability trait is implemented here by running the engine's command-line
//! jar with `java -jar`. Classes are written to a scratch directory at their internal path
//! before the tool runs. These back ends report no line metadata, so realignment never has
//! anything to apply for them.

use anyhow::{Context, Result, bail};
use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::engine::cfr::{CfrDriver, CfrOptions, ClassFileSource, OutputSink};
use crate::engine::jd::{JdDecompiler, Printer};
use crate::engine::procyon::{ProcyonDecompiler, ProcyonSettings, TypeLoader};
use crate::engine::vineflower::{
    BytecodeProvider, Fernflower, FernflowerLogger, FernflowerOptions, ResultSaver, Severity,
};
use crate::resolver::{CLASS_SUFFIX, ClassId, ClassResolver};

pub const JAVA_ENV: &str = "CLASS_LENS_JAVA";

pub const CFR_URL: &str = "https://github.com/leibnitz27/cfr/releases/download/0.152/cfr-0.152.jar";
pub const PROCYON_URL: &str =
    "https://github.com/mstrobel/procyon/releases/download/v0.6.0/procyon-decompiler-0.6.0.jar";
pub const VINEFLOWER_URL: &str =
    "https://github.com/Vineflower/vineflower/releases/download/1.10.1/vineflower-1.10.1.jar";

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn default_java() -> PathBuf {
    std::env::var_os(JAVA_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("java"))
}

/// A tool jar run through a java executable. A missing jar with a download URL is fetched on
/// first use.
#[derive(Debug, Clone)]
pub struct JavaTool {
    java: PathBuf,
    jar: PathBuf,
    download_url: Option<&'static str>,
}

impl JavaTool {
    pub fn new(java: PathBuf, jar: PathBuf) -> Self {
        Self {
            java,
            jar,
            download_url: None,
        }
    }

    pub fn with_download(mut self, url: &'static str) -> Self {
        self.download_url = Some(url);
        self
    }

    pub fn jar(&self) -> &Path {
        &self.jar
    }

    fn ensure_jar(&self) -> Result<()> {
        if self.jar.exists() {
            return Ok(());
        }
        match self.download_url {
            Some(url) => install_tool(&self.jar, url),
            None => bail!(
                "Tool jar not found: {} (configure its path on the command line or via environment)",
                self.jar.display()
            ),
        }
    }

    pub fn run(&self, args: &[&str]) -> Result<Output> {
        self.ensure_jar()?;
        let jar = self
            .jar
            .to_str()
            .context("tool jar path is not valid UTF-8")?;
        let mut full_args = vec!["-jar", jar];
        full_args.extend_from_slice(args);
        debug!(java = %self.java.display(), args = ?full_args, "running java tool");
        java_command(&self.java, &full_args)
    }

    /// Runs the tool and returns stdout, failing with stderr on a non-zero exit.
    pub fn run_for_stdout(&self, tool_name: &str, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            bail!("{tool_name} decompilation failed: {}", stderr.trim());
        }
        if !stderr.trim().is_empty() {
            warn!(tool = tool_name, "{}", stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

fn java_command(java_bin: &Path, args: &[&str]) -> Result<Output> {
    #[cfg(windows)]
    {
        let lower = java_bin.to_string_lossy().to_ascii_lowercase();
        if lower.ends_with(".cmd") || lower.ends_with(".bat") {
            return Command::new("cmd")
                .arg("/C")
                .arg(java_bin)
                .args(args)
                .output()
                .context("Failed to execute java (ensure JRE/JDK is installed)");
        }
    }

    Command::new(java_bin)
        .args(args)
        .output()
        .context("Failed to execute java (ensure JRE/JDK is installed)")
}

fn install_tool(target_path: &Path, url: &str) -> Result<()> {
    if let Some(parent) = target_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    info!(target = %target_path.display(), url, "tool jar not found, downloading");
    let status = Command::new("curl")
        .args([
            "-L",
            "--fail",
            "--silent",
            "--show-error",
            "-o",
            target_path
                .to_str()
                .context("tool jar target path is not valid UTF-8")?,
            url,
        ])
        .status()
        .context("Failed to execute curl (ensure curl is installed, or pass the jar path)")?;

    if !status.success() {
        let _ = std::fs::remove_file(target_path);
        bail!(
            "Failed to download {url} (exit status: {status}). Pass a local jar path instead"
        );
    }
    Ok(())
}

/// Temporary directory removed on drop.
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    pub fn create(prefix: &str) -> Result<Self> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "class-lens-{prefix}-{}-{nanos}-{n}",
            std::process::id()
        ));
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create scratch dir: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` to `<root>/<relative>`, creating parents. `relative` must stay inside
    /// the root: `..` and absolute components are rejected.
    pub fn write(&self, relative: &str, bytes: &[u8]) -> Result<PathBuf> {
        let relative = Path::new(relative.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!(
                "Refusing scratch path outside {}: {}",
                self.root.display(),
                relative.display()
            );
        }
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write scratch file: {}", path.display()))?;
        Ok(path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str().context("scratch path is not valid UTF-8")
}

/// CFR's command line. The extra classpath is the source's archive when it has one, otherwise
/// every class the source can enumerate, written next to the primary class.
#[derive(Debug, Clone)]
pub struct CfrCli {
    tool: JavaTool,
}

impl CfrCli {
    pub fn new(tool: JavaTool) -> Self {
        Self { tool }
    }
}

impl CfrDriver for CfrCli {
    fn analyse(
        &self,
        class_path: &str,
        source: &dyn ClassFileSource,
        sink: &mut dyn OutputSink,
        options: &CfrOptions,
    ) -> Result<()> {
        let scratch = ScratchDir::create("cfr")?;
        let classpath = scratch.path().join("classpath");
        let bytes = source
            .class_file_content(class_path)
            .with_context(|| format!("Could not load class: {class_path}"))?;
        let target = scratch.write(&format!("classpath/{class_path}"), &bytes)?;

        let extra = match source.archive_path() {
            Some(archive) => archive.to_path_buf(),
            None => {
                for path in source.known_paths() {
                    if path == class_path {
                        continue;
                    }
                    if let Some(dep) = source.class_file_content(&path) {
                        scratch.write(&format!("classpath/{path}"), &dep)?;
                    }
                }
                classpath
            }
        };

        let mut args: Vec<String> = vec![
            path_arg(&target)?.to_string(),
            "--extraclasspath".to_string(),
            path_arg(&extra)?.to_string(),
            "--silent".to_string(),
            "true".to_string(),
        ];
        for (key, value) in options.iter() {
            args.push(format!("--{key}"));
            args.push(value.to_string());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let stdout = self.tool.run_for_stdout("CFR", &args)?;
        sink.java(&stdout);
        Ok(())
    }
}

/// jd-cli, replayed into the printer one output line at a time without line numbers.
#[derive(Debug, Clone)]
pub struct JdCli {
    tool: JavaTool,
}

impl JdCli {
    pub fn new(tool: JavaTool) -> Self {
        Self { tool }
    }
}

impl JdDecompiler for JdCli {
    fn decompile(
        &self,
        loader: &dyn ClassResolver,
        printer: &mut dyn Printer,
        internal_name: &str,
    ) -> Result<()> {
        let scratch = ScratchDir::create("jd")?;
        let blob = loader.load(internal_name)?;
        let target = scratch.write(&blob.id.class_path(), &blob.bytes)?;
        let stdout = self
            .tool
            .run_for_stdout("JD-Core", &["--outputConsole", path_arg(&target)?])?;

        printer.start(0, 0, 0);
        for line in stdout.lines() {
            printer.start_line(0);
            printer.print_text(line);
            printer.end_line();
        }
        printer.end();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ProcyonCli {
    tool: JavaTool,
}

impl ProcyonCli {
    pub fn new(tool: JavaTool) -> Self {
        Self { tool }
    }
}

impl ProcyonDecompiler for ProcyonCli {
    fn decompile_type(
        &self,
        internal_name: &str,
        loader: &dyn TypeLoader,
        settings: &ProcyonSettings,
    ) -> Result<String> {
        let mut buffer = Vec::new();
        if !loader.try_load_type(internal_name, &mut buffer) {
            bail!("Could not load type: {internal_name}");
        }
        let scratch = ScratchDir::create("procyon")?;
        let target = scratch.write(&format!("{internal_name}{CLASS_SUFFIX}"), &buffer)?;

        let mut args = Vec::new();
        if settings.show_synthetic_members {
            args.push("-ss");
        }
        if settings.force_explicit_imports {
            args.push("-ei");
        }
        if settings.retain_pointless_switches {
            args.push("-ps");
        }
        args.push(path_arg(&target)?);
        self.tool.run_for_stdout("Procyon", &args)
    }
}

#[derive(Debug, Clone)]
pub struct VineflowerCli {
    tool: JavaTool,
}

impl VineflowerCli {
    pub fn new(tool: JavaTool) -> Self {
        Self { tool }
    }
}

impl Fernflower for VineflowerCli {
    fn decompile_context(
        &self,
        source: &Path,
        provider: &dyn BytecodeProvider,
        saver: &mut dyn ResultSaver,
        logger: &mut dyn FernflowerLogger,
        options: &FernflowerOptions,
    ) -> Result<()> {
        let source_str = source.to_string_lossy();
        let bytes = provider
            .bytecode(&source_str)?
            .with_context(|| format!("Could not load class: {source_str}"))?;
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("Main{CLASS_SUFFIX}"));

        let scratch = ScratchDir::create("vineflower")?;
        let target = scratch.write(&format!("in/{file_name}"), &bytes)?;
        let out_dir = scratch.path().join("out");
        std::fs::create_dir_all(&out_dir)?;

        let mut args: Vec<String> = options
            .iter()
            .map(|(key, value)| format!("-{key}={value}"))
            .collect();
        args.push(path_arg(&target)?.to_string());
        args.push(path_arg(&out_dir)?.to_string());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = self.tool.run(&args)?;
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            if !line.trim().is_empty() {
                logger.write_message(line.trim(), Severity::Warn);
            }
        }
        if !output.status.success() {
            bail!("Vineflower exited with status {}", output.status);
        }

        for path in java_files(&out_dir)? {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read output: {}", path.display()))?;
            let entry = path
                .strip_prefix(&out_dir)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            let qualified = ClassId::new(entry.trim_end_matches(".java")).dotted();
            saver.save_class_file(path_arg(&path)?, &qualified, &entry, &content, None);
        }
        Ok(())
    }
}

fn java_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let walker = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build();
    for entry in walker {
        let path = entry
            .with_context(|| format!("Failed to walk output dir: {}", dir.display()))?
            .into_path();
        if path.is_file() && path.extension().is_some_and(|e| e == "java") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}
