//! Bounded cache of decoded, not yet displayed frames.
//!
//! Entries are kept sorted by [`FrameKey`] (playback order) and unique. The cache owns
//! each frame's hardware reference until it is evicted; eviction hands the
//! [`CachedFrame`] back to the caller, which releases it to the display sink outside the
//! pipeline lock. The currently and previously shown keys are protected: no eviction
//! path removes them while they are marked.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;

use super::chunk_index::FrameKey;
use super::codec::{DecodedFrame, FrameDescriptor};

/// Cache statistics (lock-free, shared with status reporting)
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_evictions(&self, n: usize) {
        self.evictions.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }
}

/// Decoded frame and its position
pub struct CachedFrame {
    pub key: FrameKey,
    pub frame: Box<dyn DecodedFrame>,
}

impl std::fmt::Debug for CachedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedFrame").field("key", &self.key).finish()
    }
}

pub struct FrameCache {
    frames: Vec<CachedFrame>,
    capacity: usize,
    shown: Option<FrameKey>,
    prev_shown: Option<FrameKey>,
    stats: Arc<CacheStats>,
}

impl FrameCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
            capacity,
            shown: None,
            prev_shown: None,
            stats: Arc::new(CacheStats::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots left
    pub fn room(&self) -> usize {
        self.capacity - self.frames.len()
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    fn find(&self, key: FrameKey) -> Result<usize, usize> {
        self.frames.binary_search_by(|f| f.key.cmp(&key))
    }

    pub fn contains(&self, key: FrameKey) -> bool {
        self.find(key).is_ok()
    }

    /// Descriptor of a cached frame, recorded as a hit or miss
    pub fn lookup(&self, key: FrameKey) -> Option<FrameDescriptor> {
        match self.find(key) {
            Ok(i) => {
                self.stats.record_hit();
                Some(self.frames[i].frame.descriptor())
            }
            Err(_) => {
                self.stats.record_miss();
                None
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = FrameKey> + '_ {
        self.frames.iter().map(|f| f.key)
    }

    /// Insert a decoded frame, taking ownership.
    ///
    /// A key already present is a no-op and the new frame is dropped. Inserting into a
    /// full cache panics: capacity mirrors the hardware buffer pool and the windowing
    /// policy must keep room.
    pub fn insert(&mut self, key: FrameKey, frame: Box<dyn DecodedFrame>) -> bool {
        match self.find(key) {
            Ok(_) => {
                trace!("Duplicate frame {} dropped", key);
                false
            }
            Err(pos) => {
                assert!(
                    self.frames.len() < self.capacity,
                    "frame cache overflow inserting {} (capacity {})",
                    key,
                    self.capacity
                );
                self.frames.insert(pos, CachedFrame { key, frame });
                true
            }
        }
    }

    /// Record `key` as on screen; the previous on-screen key stays protected.
    pub fn mark_shown(&mut self, key: FrameKey) {
        if self.shown != Some(key) {
            self.prev_shown = self.shown;
            self.shown = Some(key);
        }
    }

    pub fn shown(&self) -> Option<FrameKey> {
        self.shown
    }

    pub fn is_protected(&self, key: FrameKey) -> bool {
        self.shown == Some(key) || self.prev_shown == Some(key)
    }

    /// Remove every unprotected entry matching `pred`.
    pub fn evict_where(&mut self, mut pred: impl FnMut(FrameKey) -> bool) -> Vec<CachedFrame> {
        let shown = self.shown;
        let prev = self.prev_shown;
        let mut evicted = Vec::new();
        let mut kept = Vec::with_capacity(self.capacity);
        for f in self.frames.drain(..) {
            let protected = Some(f.key) == shown || Some(f.key) == prev;
            if !protected && pred(f.key) {
                evicted.push(f);
            } else {
                kept.push(f);
            }
        }
        self.frames = kept;
        self.stats.record_evictions(evicted.len());
        evicted
    }

    /// Catch-up flush: everything except the protected keys.
    pub fn flush(&mut self) -> Vec<CachedFrame> {
        self.evict_where(|_| true)
    }

    /// Stream teardown: everything including protected keys, which are unmarked.
    pub fn drain_all(&mut self) -> Vec<CachedFrame> {
        self.shown = None;
        self.prev_shown = None;
        let evicted: Vec<CachedFrame> = self.frames.drain(..).collect();
        self.stats.record_evictions(evicted.len());
        evicted
    }
}
