//! Verified signature cache
//!
//! Signature checks dominate validation cost, and the same input is often
//! validated twice (mempool admission, then block connection). The cache
//! remembers `(sighash, signature, pubkey)` triples that already verified.
//!
//! Bounded; when full, a random entry is evicted to make room. Safe to share
//! between validating threads.

use rand::Rng;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::trace;

use crate::constants::DEFAULT_SIG_CACHE_SIZE;
use crate::types::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SigCacheEntry {
    sig: Vec<u8>,
    pub_key: Vec<u8>,
}

#[derive(Debug, Default)]
struct Entries {
    by_hash: HashMap<Hash, SigCacheEntry>,
    // Every key of `by_hash`, for O(1) random eviction
    keys: Vec<Hash>,
}

#[derive(Debug)]
pub struct SigCache {
    valid_sigs: RwLock<Entries>,
    max_entries: usize,
}

impl SigCache {
    /// A cache holding at most `max_entries` signatures; 0 disables it
    pub fn new(max_entries: usize) -> Self {
        let reserve = max_entries.min(1024);
        let entries = Entries { by_hash: HashMap::with_capacity(reserve), keys: Vec::with_capacity(reserve) };
        Self { valid_sigs: RwLock::new(entries), max_entries }
    }

    /// Has this exact signature already been verified for `sig_hash`?
    pub fn exists(&self, sig_hash: &Hash, sig: &[u8], pub_key: &[u8]) -> bool {
        let guard = match self.valid_sigs.read() {
            Ok(guard) => guard,
            Err(_) => return false,
        };
        guard.by_hash.get(sig_hash).map_or(false, |entry| entry.sig == sig && entry.pub_key == pub_key)
    }

    /// Record a verified signature
    pub fn add(&self, sig_hash: Hash, sig: &[u8], pub_key: &[u8]) {
        if self.max_entries == 0 {
            return;
        }
        let mut guard = match self.valid_sigs.write() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        let entries = &mut *guard;
        let entry = SigCacheEntry { sig: sig.to_vec(), pub_key: pub_key.to_vec() };

        if let Some(existing) = entries.by_hash.get_mut(&sig_hash) {
            *existing = entry;
            return;
        }
        if entries.keys.len() >= self.max_entries {
            let victim = rand::thread_rng().gen_range(0..entries.keys.len());
            let key = entries.keys.swap_remove(victim);
            entries.by_hash.remove(&key);
            trace!("sigcache full, evicted {}", hex::encode(key));
        }
        entries.keys.push(sig_hash);
        entries.by_hash.insert(sig_hash, entry);
    }

    pub fn len(&self) -> usize {
        self.valid_sigs.read().map(|g| g.by_hash.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }
}

impl Default for SigCache {
    fn default() -> Self {
        Self::new(DEFAULT_SIG_CACHE_SIZE)
    }
}
