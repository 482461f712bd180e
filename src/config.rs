use anyhow::{Context, Result};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::Cli;
use crate::engine::{CfrEngine, JdCoreEngine, ProcyonEngine, VineflowerEngine};
use crate::java::{
    CFR_URL, CfrCli, JavaTool, JdCli, PROCYON_URL, ProcyonCli, VINEFLOWER_URL, VineflowerCli,
    default_java,
};
use crate::prefs::{HeedStore, PreferenceStore, lock_path};
use crate::registry::EngineRegistry;

pub const DB_ENV: &str = "CLASS_LENS_DB";
pub const CFR_ENV: &str = "CFR_JAR";
pub const PROCYON_ENV: &str = "PROCYON_JAR";
pub const VINEFLOWER_ENV: &str = "VINEFLOWER_JAR";
pub const JD_ENV: &str = "JD_CLI_JAR";

/// Where each engine's command-line jar lives. Nothing is downloaded until an engine runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub java: PathBuf,
    pub cfr: PathBuf,
    pub procyon: PathBuf,
    pub vineflower: PathBuf,
    pub jd: PathBuf,
}

pub fn resolve_db_path(cli: &Cli) -> Result<PathBuf> {
    resolve_path(
        cli.db.as_deref(),
        env::var_os(DB_ENV),
        || Ok(class_lens_home()?.join("prefs.lmdb")),
    )
}

pub fn resolve_tool_paths(cli: &Cli) -> Result<ToolPaths> {
    let tool = |flag: Option<&Path>, key: &str, file_name: &str| {
        resolve_path(flag, env::var_os(key), || {
            Ok(class_lens_home()?.join("tools").join(file_name))
        })
    };
    Ok(ToolPaths {
        java: default_java(),
        cfr: tool(cli.cfr.as_deref(), CFR_ENV, "cfr.jar")?,
        procyon: tool(cli.procyon.as_deref(), PROCYON_ENV, "procyon.jar")?,
        vineflower: tool(cli.vineflower.as_deref(), VINEFLOWER_ENV, "vineflower.jar")?,
        jd: tool(cli.jd.as_deref(), JD_ENV, "jd-cli.jar")?,
    })
}

/// Flag, then environment value, then the computed default.
fn resolve_path(
    flag: Option<&Path>,
    env_value: Option<OsString>,
    default: impl FnOnce() -> Result<PathBuf>,
) -> Result<PathBuf> {
    if let Some(p) = flag {
        return Ok(p.to_path_buf());
    }
    if let Some(p) = env_value.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(p));
    }
    default()
}

pub fn open_store(db_path: &Path) -> Result<Arc<HeedStore>> {
    let store = HeedStore::open(db_path.to_path_buf())
        .with_context(|| format!("Failed to open preference db: {}", db_path.display()))?;
    Ok(Arc::new(store))
}

/// The four engines in presentation order, each backed by its command-line jar.
pub fn standard_registry(store: Arc<dyn PreferenceStore>, tools: &ToolPaths) -> EngineRegistry {
    let java = || tools.java.clone();
    let mut registry = EngineRegistry::new(
        store,
        CfrEngine::new(CfrCli::new(
            JavaTool::new(java(), tools.cfr.clone()).with_download(CFR_URL),
        )),
    );
    registry
        .register(JdCoreEngine::new(JdCli::new(JavaTool::new(
            java(),
            tools.jd.clone(),
        ))))
        .register(ProcyonEngine::new(ProcyonCli::new(
            JavaTool::new(java(), tools.procyon.clone()).with_download(PROCYON_URL),
        )))
        .register(VineflowerEngine::new(VineflowerCli::new(
            JavaTool::new(java(), tools.vineflower.clone()).with_download(VINEFLOWER_URL),
        )));
    registry
}

/// Removes the preference db and its lock file, forgetting every stored preference.
pub fn clear_db(db_path: &Path) -> Result<()> {
    remove_file_if_exists(db_path, "db")?;
    remove_file_if_exists(&lock_path(db_path), "db lock")?;
    Ok(())
}

fn class_lens_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::cache_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("class-lens"))
}

fn remove_file_if_exists(path: &Path, kind: &str) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove {kind} file: {}", path.display()))?;
    }
    Ok(())
}
