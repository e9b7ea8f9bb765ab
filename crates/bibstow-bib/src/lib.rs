use std::fs;
use std::path::{Path, PathBuf};

use biblatex::{Bibliography, Entry, ParseError};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to back up {path}: {source}")]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("BibTeX parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("no BibTeX entry found in record")]
    NoEntry,
    #[error("citation key `{0}` already exists in the database")]
    DuplicateKey(String),
}

/// An ordered BibTeX database backed by a `.bib` file.
///
/// Entry order is the file order and is semantically meaningful: the
/// database keeps a reverse-chronological convention by only ever inserting
/// new entries at the front. Nothing here sorts, so every rewrite preserves
/// the existing sequence verbatim.
#[derive(Debug, Clone, Default)]
pub struct Database {
    entries: Vec<Entry>,
}

impl Database {
    /// Parse a database from raw BibTeX text, preserving entry order.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let bibliography = Bibliography::parse(raw)?;
        let entries: Vec<Entry> = bibliography.into_iter().collect();
        debug!(entries = entries.len(), "parsed BibTeX database");
        Ok(Self { entries })
    }

    /// Read and parse a database file.
    pub fn from_path(path: &Path) -> Result<Self, StoreError> {
        let raw = fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Entries in stored (file) order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    /// Insert an entry at position 0.
    ///
    /// Citation keys are unique within a database, so an entry whose key is
    /// already present is rejected. Nothing is mutated on error.
    pub fn insert_front(&mut self, entry: Entry) -> Result<(), StoreError> {
        if self.contains_key(&entry.key) {
            return Err(StoreError::DuplicateKey(entry.key.clone()));
        }
        debug!(key = %entry.key, "inserting entry at front");
        self.entries.insert(0, entry);
        Ok(())
    }

    /// Serialize all entries in stored order, separated by blank lines.
    pub fn to_biblatex_string(&self) -> String {
        let mut out = String::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&entry.to_biblatex_string());
            out.push('\n');
        }
        out
    }

    /// Rewrite the database file in one shot, keeping entry order.
    pub fn write_to_path(&self, path: &Path) -> Result<(), StoreError> {
        debug!(path = %path.display(), entries = self.entries.len(), "writing database");
        fs::write(path, self.to_biblatex_string()).map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Parse a fetched BibTeX record and return its first entry.
///
/// The doi.org content negotiation service returns a single record, but any
/// trailing entries are ignored rather than rejected.
pub fn first_entry(raw: &str) -> Result<Entry, StoreError> {
    Bibliography::parse(raw)?
        .into_iter()
        .next()
        .ok_or(StoreError::NoEntry)
}

/// Copy `path` to `<path>.bak`, overwriting any previous backup.
///
/// Best-effort single backup: the copy is not verified beyond the copy call
/// itself succeeding.
pub fn backup(path: &Path) -> Result<PathBuf, StoreError> {
    let mut bak = path.as_os_str().to_os_string();
    bak.push(".bak");
    let bak = PathBuf::from(bak);
    debug!(from = %path.display(), to = %bak.display(), "backing up database");
    fs::copy(path, &bak).map_err(|source| StoreError::Backup {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(bak)
}
