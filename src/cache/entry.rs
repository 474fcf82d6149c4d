//! Cache Entry Module
//!
//! Defines the immutable entry envelope: metadata plus the serialized payload.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheCategory;

// == Entry Metadata ==
/// Everything about an entry except its payload.
///
/// This is also the header line of a disk blob, so the evictor can order
/// disk-only entries without decoding their payloads. Records are never
/// mutated; [`EntryMeta::touched`] produces the replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMeta {
    key: String,
    category: CacheCategory,
    /// Creation timestamp (Unix milliseconds)
    created_at: u64,
    /// `created_at + ttl` (Unix milliseconds)
    expires_at: u64,
    /// Serialized payload length
    size_bytes: u64,
    access_count: u64,
    /// Last store or hit (Unix milliseconds)
    last_accessed_at: u64,
}

impl EntryMeta {
    // == Constructor ==
    /// Creates metadata for a freshly stored payload of `size_bytes`.
    pub fn new(
        key: impl Into<String>,
        category: CacheCategory,
        size_bytes: u64,
        ttl: Duration,
        now_ms: u64,
    ) -> Self {
        Self {
            key: key.into(),
            category,
            created_at: now_ms,
            expires_at: now_ms.saturating_add(duration_ms(ttl)),
            size_bytes,
            access_count: 0,
            last_accessed_at: now_ms,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn category(&self) -> CacheCategory {
        self.category
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn last_accessed_at(&self) -> u64 {
        self.last_accessed_at
    }

    /// `category + "_" + key`
    pub fn qualified_key(&self) -> String {
        self.category.qualify(&self.key)
    }

    // == Is Expired ==
    /// An entry is expired strictly after `expires_at`.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at
    }

    // == Touched ==
    /// Replacement record for a hit at `now_ms`.
    pub fn touched(&self, now_ms: u64) -> Self {
        Self {
            access_count: self.access_count.saturating_add(1),
            last_accessed_at: now_ms.max(self.last_accessed_at),
            ..self.clone()
        }
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// == Cache Entry ==
/// Metadata plus the serialized payload bytes.
///
/// The payload is shared so readers can decode it after releasing the tier
/// lock. Entries handed out by the store carry the generation of the index
/// record they came from, so a late hit or discard can tell whether that
/// record is still the live one.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    meta: EntryMeta,
    payload: Arc<[u8]>,
    generation: u64,
}

impl CacheEntry {
    /// Wraps an already serialized payload; `size_bytes` is its length.
    pub fn new(
        key: impl Into<String>,
        category: CacheCategory,
        payload: Vec<u8>,
        ttl: Duration,
        now_ms: u64,
    ) -> Self {
        let meta = EntryMeta::new(key, category, payload.len() as u64, ttl, now_ms);
        Self {
            meta,
            payload: payload.into(),
            generation: 0,
        }
    }

    pub(crate) fn from_parts(meta: EntryMeta, payload: Arc<[u8]>) -> Self {
        Self {
            meta,
            payload,
            generation: 0,
        }
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn meta(&self) -> &EntryMeta {
        &self.meta
    }

    pub fn payload(&self) -> &Arc<[u8]> {
        &self.payload
    }

    /// Index record generation; 0 for entries not handed out by a store.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn into_parts(self) -> (EntryMeta, Arc<[u8]>) {
        (self.meta, self.payload)
    }
}
