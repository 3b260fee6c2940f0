use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File { content: Vec<u8>, modified: u64 },
    Dir { children: Vec<String>, modified: u64 },
}

impl MockEntry {
    fn modified(&self) -> u64 {
        match self {
            MockEntry::File { modified, .. } | MockEntry::Dir { modified, .. } => *modified,
        }
    }

    fn set_modified(&mut self, tick: u64) {
        match self {
            MockEntry::File { modified, .. } | MockEntry::Dir { modified, .. } => *modified = tick,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    entries: HashMap<PathBuf, MockEntry>,
    /// Logical clock; every write advances it by one second.
    clock: u64,
}

/// In-memory filesystem with a logical modification clock.
///
/// Modification times are `UNIX_EPOCH + tick` seconds. Writes and `touch`
/// advance the clock, so a file written later is always strictly newer;
/// [`MockFileSystem::add_file_at`] pins an explicit tick for tie tests.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut state = MockState::default();
        // Ensure root exists
        state.entries.insert(
            PathBuf::from("."),
            MockEntry::Dir {
                children: Vec::new(),
                modified: 0,
            },
        );

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means another test thread panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add (or overwrite) a file, stamping it with the next clock tick.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut state = self.lock();
        state.clock += 1;
        let tick = state.clock;
        insert_file(&mut state, path.as_ref(), content.into(), tick);
    }

    /// Add (or overwrite) a file with an explicit modification tick.
    pub fn add_file_at(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>, tick: u64) {
        let mut state = self.lock();
        state.clock = state.clock.max(tick);
        insert_file(&mut state, path.as_ref(), content.into(), tick);
    }

    /// Add a directory (and its parents), stamping it with the next tick.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.lock();
        state.clock += 1;
        let tick = state.clock;
        ensure_dir_entry(&mut state.entries, path.as_ref(), tick);
    }

    /// Overwrite the modification tick of an existing entry.
    pub fn set_modified(&self, path: impl AsRef<Path>, tick: u64) {
        let mut state = self.lock();
        state.clock = state.clock.max(tick);
        if let Some(entry) = state.entries.get_mut(path.as_ref()) {
            entry.set_modified(tick);
        }
    }

    /// Current modification tick of `path`, if present.
    pub fn modified_tick(&self, path: impl AsRef<Path>) -> Option<u64> {
        self.lock().entries.get(path.as_ref()).map(MockEntry::modified)
    }
}

/// The empty path names the root, like `.` does.
fn key(path: &Path) -> &Path {
    if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    }
}

fn tick_to_time(tick: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(tick)
}

fn normalize_parent(path: &Path) -> Option<&Path> {
    path.parent().map(|parent| {
        if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        }
    })
}

fn link_child(entries: &mut HashMap<PathBuf, MockEntry>, parent: &Path, path: &Path) {
    if let Some(MockEntry::Dir { children, .. }) = entries.get_mut(parent) {
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if !children.iter().any(|c| c == name) {
                children.push(name.to_string());
            }
        }
    }
}

fn insert_file(state: &mut MockState, path: &Path, content: Vec<u8>, tick: u64) {
    state.entries.insert(
        path.to_path_buf(),
        MockEntry::File {
            content,
            modified: tick,
        },
    );
    if let Some(parent) = normalize_parent(path) {
        ensure_dir_entry(&mut state.entries, parent, tick);
        link_child(&mut state.entries, parent, path);
    }
}

fn ensure_dir_entry(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path, tick: u64) {
    if entries.contains_key(path) {
        return;
    }
    entries.insert(
        path.to_path_buf(),
        MockEntry::Dir {
            children: Vec::new(),
            modified: tick,
        },
    );
    if let Some(parent) = normalize_parent(path) {
        if parent != path {
            ensure_dir_entry(entries, parent, tick);
            link_child(entries, parent, path);
        }
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let state = self.lock();
        match state.entries.get(path) {
            Some(MockEntry::File { content, .. }) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir { .. }) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let state = self.lock();
        match state.entries.get(path) {
            Some(MockEntry::File { content, .. }) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(MockEntry::Dir { .. }) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().entries.contains_key(key(path))
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().entries.get(key(path)), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().entries.get(key(path)), Some(MockEntry::Dir { .. }))
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        // In mock, we just return the path as is, assuming absolute paths are used in tests
        Ok(path.to_path_buf())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let state = self.lock();
        match state.entries.get(key(path)) {
            Some(MockEntry::Dir { children, .. }) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn modified(&self, path: &Path) -> Result<Option<SystemTime>> {
        Ok(self
            .lock()
            .entries
            .get(key(path))
            .map(|entry| tick_to_time(entry.modified())))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        if let Some(MockEntry::File { .. }) = state.entries.get(path) {
            return Err(anyhow!("Not a directory: {:?}", path));
        }
        state.clock += 1;
        let tick = state.clock;
        ensure_dir_entry(&mut state.entries, path, tick);
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        state
            .entries
            .retain(|p, _| p.as_path() != path && !p.starts_with(path));
        if let Some(parent) = normalize_parent(path) {
            if let (Some(MockEntry::Dir { children, .. }), Some(name)) = (
                state.entries.get_mut(parent),
                path.file_name().and_then(|n| n.to_str()),
            ) {
                children.retain(|c| c != name);
            }
        }
        Ok(())
    }

    fn touch(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        state.clock += 1;
        let tick = state.clock;
        match state.entries.get_mut(path) {
            Some(entry) => {
                entry.set_modified(tick);
                Ok(())
            }
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }
}
