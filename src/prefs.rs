//! Persisted preferences.
//!
//! The registry reads every preference straight from the store on each query, so a change
//! made by one caller is visible to the next read anywhere in the process. [`HeedStore`]
//! keeps them in an LMDB environment (via heed); [`MemoryStore`] is the in-process substitute.

use heed::types::Str;
use heed::{Database, Env, EnvFlags, EnvOpenOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{DecompileError, DecompileResult};

pub const PREFS_DB: &str = "prefs";

const DEFAULT_MAP_SIZE: usize = 16 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 4;

/// Key/value preference storage. Writes are committed before `put` returns.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> DecompileResult<Option<String>>;

    fn put(&self, key: &str, value: &str) -> DecompileResult<()>;

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .ok()
            .flatten()
            .unwrap_or_else(|| default.to_string())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).ok().flatten().as_deref() {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }

    fn put_bool(&self, key: &str, value: bool) -> DecompileResult<()> {
        self.put(key, if value { "true" } else { "false" })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> DecompileResult<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| DecompileError::Store("preference lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> DecompileResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| DecompileError::Store("preference lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

type StrDb = Database<Str, Str>;

#[derive(Debug)]
pub struct HeedStore {
    env: Env,
    db_path: PathBuf,
    prefs: StrDb,
}

impl HeedStore {
    pub fn open(db_path: PathBuf) -> DecompileResult<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let env = open_env(&db_path)?;
        let mut wtxn = env.write_txn()?;
        let prefs = env.create_database::<Str, Str>(&mut wtxn, Some(PREFS_DB))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db_path,
            prefs,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl PreferenceStore for HeedStore {
    fn get(&self, key: &str) -> DecompileResult<Option<String>> {
        let rtxn = self.env.read_txn()?;
        Ok(self.prefs.get(&rtxn, key)?.map(str::to_string))
    }

    fn put(&self, key: &str, value: &str) -> DecompileResult<()> {
        let mut wtxn = self.env.write_txn()?;
        self.prefs.put(&mut wtxn, key, value)?;
        wtxn.commit()?;
        Ok(())
    }
}

fn open_env(db_path: &Path) -> DecompileResult<Env> {
    let mut options = EnvOpenOptions::new();
    options.map_size(DEFAULT_MAP_SIZE);
    options.max_dbs(DEFAULT_MAX_DBS);
    // SAFETY: Default LMDB locking stays on. NO_SUB_DIR keeps the store a single file at the
    // configured path.
    unsafe {
        options.flags(EnvFlags::NO_SUB_DIR);
        Ok(options.open(db_path)?)
    }
}

/// Lock file LMDB keeps next to a `NO_SUB_DIR` environment.
pub fn lock_path(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push("-lock");
    PathBuf::from(os)
}
