//! Persisted subcategory-link -> root-category memo.
//!
//! The file is comma-delimited, headerless, UTF-8 with a byte-order mark and
//! sorted by subcategory link. Lookups honour the first entry for a link.

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BOM: &str = "\u{feff}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCacheEntry {
    pub subcategory_link: String,
    pub category_name: String,
    pub category_link: String,
}

#[derive(Debug)]
pub struct LinkCache {
    path: PathBuf,
    entries: Vec<LinkCacheEntry>,
    index: HashMap<String, usize>,
    new_entries: usize,
    dirty: bool,
}

impl LinkCache {
    /// An empty cache that will be written to `path` on flush.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
            index: HashMap::new(),
            new_entries: 0,
            dirty: false,
        }
    }

    /// Load the cache at `path`. A missing file is a first run and yields an
    /// empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No link cache at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(ScanError::persistence(&path, e)),
        };

        let body = content.strip_prefix(BOM).unwrap_or(&content);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(false)
            .from_reader(body.as_bytes());

        let mut cache = Self::empty(path);
        for row in reader.deserialize::<LinkCacheEntry>() {
            let entry = row.map_err(|e| ScanError::persistence(&cache.path, e))?;
            cache.push(entry);
        }

        info!(
            "Loaded {} link cache entries from {}",
            cache.entries.len(),
            cache.path.display()
        );
        Ok(cache)
    }

    fn push(&mut self, entry: LinkCacheEntry) {
        let position = self.entries.len();
        self.index
            .entry(entry.subcategory_link.clone())
            .or_insert(position);
        self.entries.push(entry);
    }

    /// The `(name, canonical_link)` recorded for `link`.
    pub fn lookup(&self, link: &str) -> Option<(&str, &str)> {
        self.index.get(link).map(|&i| {
            let entry = &self.entries[i];
            (entry.category_name.as_str(), entry.category_link.as_str())
        })
    }

    pub fn contains(&self, link: &str) -> bool {
        self.index.contains_key(link)
    }

    /// Record a resolution. A link that is already present keeps its first
    /// resolution; returns whether the entry was added.
    pub fn record(&mut self, link: &str, name: &str, canonical_link: &str) -> bool {
        if self.contains(link) {
            debug!("Link cache already holds {}, keeping first entry", link);
            return false;
        }
        self.push(LinkCacheEntry {
            subcategory_link: link.to_string(),
            category_name: name.to_string(),
            category_link: canonical_link.to_string(),
        });
        self.new_entries += 1;
        self.dirty = true;
        true
    }

    /// Rewrite the file with every entry, sorted by subcategory link. Skipped
    /// when nothing was recorded since load.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            debug!("Link cache unchanged, not rewriting {}", self.path.display());
            return Ok(false);
        }
        self.write()?;
        Ok(true)
    }

    /// Rewrite the file regardless of whether anything changed.
    pub fn write(&mut self) -> Result<()> {
        // Stable: duplicate links keep their relative order, so the first one still wins.
        self.entries
            .sort_by(|a, b| a.subcategory_link.cmp(&b.subcategory_link));
        self.rebuild_index();

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BOM.as_bytes().to_vec());
        for entry in &self.entries {
            writer
                .serialize(entry)
                .map_err(|e| ScanError::persistence(&self.path, e))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ScanError::persistence(&self.path, e))?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| ScanError::persistence(&self.path, e))?;
        }
        fs::write(&self.path, bytes).map_err(|e| ScanError::persistence(&self.path, e))?;

        self.dirty = false;
        info!(
            "Link cache saved to {} ({} entries, {} new this run)",
            self.path.display(),
            self.entries.len(),
            self.new_entries
        );
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (position, entry) in self.entries.iter().enumerate() {
            self.index
                .entry(entry.subcategory_link.clone())
                .or_insert(position);
        }
    }

    pub fn entries(&self) -> &[LinkCacheEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries recorded since load.
    pub fn new_entries(&self) -> usize {
        self.new_entries
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
