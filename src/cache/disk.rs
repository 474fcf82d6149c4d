//! Disk Tier Module
//!
//! One subdirectory per category, one blob per qualified key. A blob is a
//! single JSON header line (the entry metadata) followed by the raw payload,
//! so metadata can be read without touching the payload.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{CacheCategory, CacheEntry, CacheStats, EntryMeta};
use crate::error::{CacheError, Result};

/// File holding the persisted statistics blob, at the cache root.
pub const STATISTICS_FILE: &str = "statistics.json";

/// Prefix `tempfile` gives in-flight writes.
const TEMP_PREFIX: &str = ".tmp";

// == Blob Codec ==
/// Serializes header line + payload.
pub fn encode_blob(meta: &EntryMeta, payload: &[u8]) -> Result<Vec<u8>> {
    let mut blob = serde_json::to_vec(meta)?;
    blob.reserve(payload.len() + 1);
    blob.push(b'\n');
    blob.extend_from_slice(payload);
    Ok(blob)
}

/// Splits and validates a blob produced by [`encode_blob`].
pub fn decode_blob(blob: &[u8]) -> Result<CacheEntry> {
    let split = blob
        .iter()
        .position(|b| *b == b'\n')
        .ok_or_else(|| CacheError::Corrupt("missing header terminator".to_string()))?;
    let meta: EntryMeta = serde_json::from_slice(&blob[..split])?;
    let payload = &blob[split + 1..];

    if payload.len() as u64 != meta.size_bytes() {
        return Err(CacheError::Corrupt(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            meta.size_bytes()
        )));
    }

    Ok(CacheEntry::from_parts(meta, Arc::from(payload)))
}

// == Disk Tier ==
/// Lazily read on-disk tier.
#[derive(Debug, Clone)]
pub struct DiskTier {
    root: PathBuf,
}

impl DiskTier {
    // == Constructor ==
    /// Creates the root and every category directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let tier = Self { root: root.into() };
        for category in CacheCategory::ALL {
            fs::create_dir_all(tier.category_dir(category))?;
        }
        debug!(root = %tier.root.display(), "Disk tier ready");
        Ok(tier)
    }

    pub fn category_dir(&self, category: CacheCategory) -> PathBuf {
        self.root.join(category.as_str())
    }

    /// Blob location for a qualified key; the filename is URL-encoded so
    /// any key maps to exactly one safe name.
    pub fn blob_path(&self, category: CacheCategory, qualified_key: &str) -> PathBuf {
        self.category_dir(category)
            .join(urlencoding::encode(qualified_key).as_ref())
    }

    // == Write ==
    /// Atomically writes the entry's blob, replacing any previous one.
    pub fn write(&self, entry: &CacheEntry) -> Result<()> {
        let meta = entry.meta();
        let dir = self.category_dir(meta.category());
        fs::create_dir_all(&dir)?;

        let blob = encode_blob(meta, entry.payload())?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&blob)?;
        tmp.as_file().sync_data()?;

        let path = self.blob_path(meta.category(), &meta.qualified_key());
        tmp.persist(&path)?;

        debug!(
            key = %meta.qualified_key(),
            size = meta.size_bytes(),
            "Persisted entry to disk tier"
        );
        Ok(())
    }

    // == Load ==
    /// Reads a full entry. Absent blobs are `None`; corrupt ones are deleted
    /// and also reported as `None`.
    pub fn load(&self, category: CacheCategory, qualified_key: &str) -> Option<CacheEntry> {
        let path = self.blob_path(category, qualified_key);
        let blob = match fs::read(&path) {
            Ok(blob) => blob,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read disk blob");
                return None;
            }
        };

        match decode_blob(&blob) {
            Ok(entry) if entry.meta().qualified_key() == qualified_key => Some(entry),
            Ok(entry) => {
                warn!(
                    path = %path.display(),
                    found = %entry.meta().qualified_key(),
                    "Disk blob belongs to another key, discarding"
                );
                self.discard(&path);
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt disk blob, discarding");
                self.discard(&path);
                None
            }
        }
    }

    /// Reads only the header line of a blob.
    pub fn read_meta(path: &Path) -> Result<EntryMeta> {
        let mut reader = BufReader::new(fs::File::open(path)?);
        let mut header = Vec::new();
        reader.read_until(b'\n', &mut header)?;
        if header.last() != Some(&b'\n') {
            return Err(CacheError::Corrupt("missing header terminator".to_string()));
        }
        Ok(serde_json::from_slice(&header[..header.len() - 1])?)
    }

    // == Remove ==
    /// Deletes a blob; absent blobs are fine.
    pub fn remove(&self, category: CacheCategory, qualified_key: &str) {
        self.discard(&self.blob_path(category, qualified_key));
    }

    fn discard(&self, path: &Path) {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed disk blob"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove disk blob"),
        }
    }

    // == Clear ==
    /// Deletes every blob of a category.
    pub fn clear_category(&self, category: CacheCategory) {
        let dir = self.category_dir(category);
        if let Err(e) = fs::remove_dir_all(&dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(dir = %dir.display(), error = %e, "Failed to clear category directory");
            }
        }
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "Failed to recreate category directory");
        }
    }

    // == Scan ==
    /// Reads the header of every blob, dropping temp leftovers and anything
    /// that does not parse or sits under the wrong name.
    pub fn scan(&self) -> Vec<EntryMeta> {
        let mut found = Vec::new();

        for category in CacheCategory::ALL {
            let dir = self.category_dir(category);
            let read_dir = match fs::read_dir(&dir) {
                Ok(read_dir) => read_dir,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to scan category directory");
                    continue;
                }
            };

            for dir_entry in read_dir.flatten() {
                let path = dir_entry.path();
                let name = dir_entry.file_name().to_string_lossy().into_owned();

                if name.starts_with(TEMP_PREFIX) {
                    debug!(path = %path.display(), "Removing stale temp file");
                    self.discard(&path);
                    continue;
                }

                match Self::read_meta(&path) {
                    Ok(meta)
                        if meta.category() == category
                            && self.blob_path(category, &meta.qualified_key()) == path =>
                    {
                        found.push(meta)
                    }
                    Ok(_) => {
                        warn!(path = %path.display(), "Misplaced disk blob, discarding");
                        self.discard(&path);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Unreadable disk blob, discarding");
                        self.discard(&path);
                    }
                }
            }
        }

        info!(entries = found.len(), "Disk tier scanned");
        found
    }

    // == Statistics Blob ==
    /// Loads the persisted statistics; missing or unreadable blobs yield `None`.
    pub fn load_statistics(&self) -> Option<CacheStats> {
        let path = self.root.join(STATISTICS_FILE);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read statistics blob");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable statistics blob");
                None
            }
        }
    }

    pub fn save_statistics(&self, stats: &CacheStats) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(stats)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&bytes)?;
        tmp.persist(self.root.join(STATISTICS_FILE))?;
        Ok(())
    }
}
