//! # Seen store
//! Append-only record of identifiers that were already dispatched.
//!
//! On disk this is a newline-delimited file. A missing file is an empty set.
//! Each identifier is written with a single `write_all` of `id\n` followed by
//! `sync_data`, and a trailing fragment without its newline (torn write) is
//! cut off when the file is loaded, so a record is either whole or absent.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use metrics::gauge;

pub trait SeenStore: Send + Sync {
    fn contains(&self, identifier: &str) -> bool;

    /// Durably record `identifier`. Returns `false` when it was already present.
    fn add(&mut self, identifier: &str) -> Result<bool>;

    /// Re-read the backing storage. Called at the start of every cycle.
    fn reload(&mut self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate(identifier: &str) -> Result<()> {
    if identifier.is_empty() {
        bail!("refusing to record an empty identifier");
    }
    if identifier.contains(['\n', '\r']) {
        bail!("identifier contains a line break: {identifier:?}");
    }
    Ok(())
}

/// File-backed store.
#[derive(Debug)]
pub struct FileSeenStore {
    path: PathBuf,
    ids: HashSet<String>,
}

impl FileSeenStore {
    /// Open (and load) the store, creating the parent directory if needed.
    /// The file itself is only created on the first `add`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating seen-store dir {}", dir.display()))?;
        }
        let mut store = Self {
            path,
            ids: HashSet::new(),
        };
        store.reload()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<HashSet<String>> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading seen store {}", path.display()))
            }
        };

        // Bytes after the last newline belong to a torn record, which may end
        // inside a multi-byte character.
        let valid_len = bytes
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |i| i + 1);

        let mut ids = HashSet::new();
        for (lineno, line) in bytes[..valid_len].split(|&b| b == b'\n').enumerate() {
            let Ok(line) = std::str::from_utf8(line) else {
                tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    "skipping undecodable seen record"
                );
                continue;
            };
            let id = line.trim_end_matches('\r');
            if !id.is_empty() {
                ids.insert(id.to_string());
            }
        }

        if valid_len < bytes.len() {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = bytes.len() - valid_len,
                "seen store ends with a torn record; truncating"
            );
            let f = OpenOptions::new()
                .write(true)
                .open(path)
                .with_context(|| format!("opening {} for repair", path.display()))?;
            f.set_len(valid_len as u64)
                .with_context(|| format!("truncating {}", path.display()))?;
        }

        Ok(ids)
    }
}

impl SeenStore for FileSeenStore {
    fn contains(&self, identifier: &str) -> bool {
        self.ids.contains(identifier)
    }

    fn add(&mut self, identifier: &str) -> Result<bool> {
        validate(identifier)?;
        if self.ids.contains(identifier) {
            return Ok(false);
        }

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening seen store {}", self.path.display()))?;
        let record = format!("{identifier}\n");
        f.write_all(record.as_bytes())
            .with_context(|| format!("appending to {}", self.path.display()))?;
        f.sync_data()
            .with_context(|| format!("syncing {}", self.path.display()))?;

        self.ids.insert(identifier.to_string());
        gauge!("seen_store_size").set(self.ids.len() as f64);
        Ok(true)
    }

    fn reload(&mut self) -> Result<()> {
        self.ids = Self::load(&self.path)?;
        gauge!("seen_store_size").set(self.ids.len() as f64);
        Ok(())
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Volatile store for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemorySeenStore {
    ids: HashSet<String>,
}

impl MemorySeenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: Into<String>> FromIterator<S> for MemorySeenStore {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl SeenStore for MemorySeenStore {
    fn contains(&self, identifier: &str) -> bool {
        self.ids.contains(identifier)
    }

    fn add(&mut self, identifier: &str) -> Result<bool> {
        validate(identifier)?;
        Ok(self.ids.insert(identifier.to_string()))
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}
