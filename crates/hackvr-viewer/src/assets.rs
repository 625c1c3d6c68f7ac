//! Content-addressed asset cache.
//!
//! Assets are identified by `(uri, sha256)`; fetching is out-of-band
//! relative to command processing. Concurrent requests for the same key are
//! deduplicated: only the first caller is told to fetch. A failed fetch or a
//! digest mismatch pins a placeholder (magenta/white checker for images, an
//! ASCII-covering fallback for fonts) and the scene carries on.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

/// Cache key: the URI plus the expected content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub uri: String,
    pub sha256: [u8; 32],
}

/// What kind of placeholder applies on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Font,
}

/// State of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetState {
    /// A fetch is in flight; later requesters wait on this entry.
    Pending,
    /// Verified bytes.
    Ready(Vec<u8>),
    /// Fetch failed or the digest did not match; render the placeholder.
    Placeholder(AssetKind),
}

#[derive(Debug, Default)]
pub struct AssetCache {
    entries: HashMap<AssetKey, AssetState>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &AssetKey) -> Option<&AssetState> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ask for an asset. Returns `true` when the caller should start a
    /// fetch; `false` means the entry is already pending, ready, or failed.
    pub fn request(&mut self, key: AssetKey) -> bool {
        match self.entries.get(&key) {
            Some(_) => false,
            None => {
                self.entries.insert(key, AssetState::Pending);
                true
            }
        }
    }

    /// A fetch finished. The bytes are kept only if they hash to the key's
    /// digest; a mismatch pins the placeholder instead.
    pub fn complete(&mut self, key: &AssetKey, kind: AssetKind, bytes: Vec<u8>) {
        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        let state = if digest == key.sha256 {
            AssetState::Ready(bytes)
        } else {
            log::warn!("digest mismatch for {}, using placeholder", key.uri);
            AssetState::Placeholder(kind)
        };
        self.entries.insert(key.clone(), state);
    }

    /// A fetch failed outright. Retry policy is the embedder's call, but it
    /// must not hammer the origin: clearing the placeholder re-arms a single
    /// new fetch.
    pub fn fail(&mut self, key: &AssetKey, kind: AssetKind) {
        log::warn!("asset fetch failed for {}, using placeholder", key.uri);
        self.entries.insert(key.clone(), AssetState::Placeholder(kind));
    }

    /// Drop a placeholder so the asset may be fetched again.
    pub fn clear_placeholder(&mut self, key: &AssetKey) {
        if matches!(self.entries.get(key), Some(AssetState::Placeholder(_))) {
            self.entries.remove(key);
        }
    }
}
