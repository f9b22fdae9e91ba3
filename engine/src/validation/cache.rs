//! Memoized validator reports
//!
//! Keys are BLAKE3 digests over (tier, agent, task, canonical input, canonical
//! output), so a hit is only possible for byte-identical logical payloads.
//! Entries never expire; the cache is bounded and evicts least recently used.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::{canonical_json, TierReport, ValidationSubject, ValidatorTier};
use crate::state::BoundedLru;

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

pub struct ValidationCache {
    entries: Mutex<BoundedLru<String, TierReport>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ValidationCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(BoundedLru::new(max_entries)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoundedLru<String, TierReport>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache key for one tier's view of a subject
    pub fn key(tier: ValidatorTier, subject: &ValidationSubject<'_>) -> String {
        let input = canonical_json(subject.input);
        let output = canonical_json(subject.output);

        let mut hasher = blake3::Hasher::new();
        for part in [
            tier.as_str(),
            subject.agent.as_str(),
            subject.task,
            input.as_str(),
            output.as_str(),
        ] {
            // Length prefix keeps ("ab","c") and ("a","bc") apart
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn get(&self, key: &str) -> Option<TierReport> {
        let found = self.lock().get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn insert(&self, key: String, report: TierReport) {
        if let Some((evicted, _)) = self.lock().insert(key, report) {
            tracing::debug!("Validation cache full, evicted {}", evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: entries.len(),
            capacity: entries.capacity(),
        }
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(1000)
    }
}
