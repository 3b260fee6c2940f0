// src/staleness/hash.rs

//! Content-digest staleness with persisted digests.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use blake3::Hasher;
use tracing::{debug, info};

use crate::errors::Result;
use crate::fs::Workspace;
use crate::rules::Match;
use crate::staleness::{missing_output, StaleReason, Staleness, StalenessCheck};

/// Workspace-relative path of the digest file.
pub const HASH_FILE_PATH: &str = ".filedag/hashes";

/// Hash a single file through the workspace filesystem.
pub fn compute_file_hash(ws: &Workspace, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut reader = ws
        .fs()
        .open_read(&ws.path(path))
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader
            .read(&mut buf)
            .with_context(|| format!("reading file for hashing: {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Digest over the path and contents of every input of a Match.
///
/// Paths are sorted first so the digest does not depend on input order.
/// Directories contribute their path only.
pub fn compute_match_hash(ws: &Workspace, m: &Match) -> Result<String> {
    let mut paths: Vec<&PathBuf> = m.all_inputs().collect();
    paths.sort();

    let mut hasher = Hasher::new();
    for path in paths {
        hasher.update(path.to_string_lossy().as_bytes());
        if ws.fs().is_file(&ws.path(path)) {
            hasher.update(compute_file_hash(ws, path)?.as_bytes());
        }
    }
    let hash = hasher.finalize().to_hex().to_string();
    debug!(task = %m.task, hash = %hash, "computed input digest");
    Ok(hash)
}

/// Storage for per-Match digests, keyed by the Match key.
pub trait HashStore: Send + Sync {
    fn load(&self, ws: &Workspace, key: &str) -> Result<Option<String>>;
    fn save(&mut self, ws: &Workspace, key: &str, hash: &str) -> Result<()>;
}

/// Stores digests in `<workspace>/.filedag/hashes`, one `hash key` per line.
#[derive(Debug, Default)]
pub struct FileHashStore;

impl FileHashStore {
    fn load_all(ws: &Workspace) -> Result<BTreeMap<String, String>> {
        let path = ws.path(Path::new(HASH_FILE_PATH));
        if !ws.fs().exists(&path) {
            return Ok(BTreeMap::new());
        }
        let contents = ws.fs().read_to_string(&path)?;
        Ok(contents
            .lines()
            .filter_map(|line| line.trim().split_once(' '))
            .map(|(hash, key)| (key.to_string(), hash.to_string()))
            .collect())
    }

    fn save_all(ws: &Workspace, map: &BTreeMap<String, String>) -> Result<()> {
        let path = ws.path(Path::new(HASH_FILE_PATH));
        let mut out = String::new();
        for (key, hash) in map {
            out.push_str(hash);
            out.push(' ');
            out.push_str(key);
            out.push('\n');
        }
        if let Some(parent) = path.parent() {
            ws.fs().create_dir_all(parent)?;
        }
        ws.fs().write(&path, out.as_bytes())?;
        Ok(())
    }
}

impl HashStore for FileHashStore {
    fn load(&self, ws: &Workspace, key: &str) -> Result<Option<String>> {
        Ok(Self::load_all(ws)?.get(key).cloned())
    }

    fn save(&mut self, ws: &Workspace, key: &str, hash: &str) -> Result<()> {
        let mut map = Self::load_all(ws)?;
        map.insert(key.to_string(), hash.to_string());
        Self::save_all(ws, &map)?;
        info!(key = %key, "stored input digest (file)");
        Ok(())
    }
}

/// Stores digests in memory only (lost when the process exits).
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    map: BTreeMap<String, String>,
}

impl HashStore for MemoryHashStore {
    fn load(&self, _ws: &Workspace, key: &str) -> Result<Option<String>> {
        Ok(self.map.get(key).cloned())
    }

    fn save(&mut self, _ws: &Workspace, key: &str, hash: &str) -> Result<()> {
        self.map.insert(key.to_string(), hash.to_string());
        debug!(key = %key, "stored input digest (memory)");
        Ok(())
    }
}

/// Stale when an output is missing, no digest was recorded, or the inputs'
/// digest differs from the recorded one.
pub struct HashCheck {
    store: Mutex<Box<dyn HashStore>>,
}

impl std::fmt::Debug for HashCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashCheck").finish_non_exhaustive()
    }
}

impl HashCheck {
    pub fn new(store: Box<dyn HashStore>) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut dyn HashStore) -> Result<T>) -> Result<T> {
        let mut guard = self.store.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut **guard)
    }
}

impl StalenessCheck for HashCheck {
    fn check(&self, ws: &Workspace, m: &Match) -> Result<Staleness> {
        if let Some(stale) = missing_output(ws, m) {
            return Ok(stale);
        }
        if let Some(missing) = m.all_inputs().find(|p| !ws.exists(p)) {
            return Ok(Staleness::Stale(StaleReason::InputMissing(missing.clone())));
        }

        let key = m.key().to_string();
        let current = compute_match_hash(ws, m)?;
        match self.with_store(|store| store.load(ws, &key))? {
            None => Ok(Staleness::Stale(StaleReason::NoRecord)),
            Some(recorded) if recorded != current => Ok(Staleness::Stale(StaleReason::InputsChanged)),
            Some(_) => Ok(Staleness::UpToDate),
        }
    }

    fn record_success(&self, ws: &Workspace, m: &Match) -> Result<()> {
        let key = m.key().to_string();
        let current = compute_match_hash(ws, m)?;
        self.with_store(|store| store.save(ws, &key, &current))
    }
}
