#![forbid(unsafe_code)]

//! In-memory thumbnail cache and an in-memory [`RasterSource`].
//!
//! [`ThumbnailCache`] is an S3-FIFO cache keyed by [`ImageRef::cache_key`].
//! Swiping through a batch is a scan: most thumbnails are seen once and
//! never again. S3-FIFO keeps one-hit entries in a small probationary queue
//! so a long scan cannot flush the thumbnails the user keeps coming back to.
//!
//! - **probation** (~10 % of capacity): new entries. On eviction, entries hit
//!   at least once move to `protected`; the rest leave a key in `ghost`.
//! - **protected** (~90 %): FIFO with a small hit counter (max 3) acting as
//!   a second chance.
//! - **ghost**: keys only. Re-inserting a ghost key skips probation.
//!
//! [`MemoryRasterSource`] pairs the cache with a table of synthetic images;
//! the replay tool and tests use it in place of a real decoder.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::trace;

use crate::raster::{
    ColorDepth, DecodeOptions, ImageRef, Raster, RasterRecycler, RasterSource, fit_within,
};

const MAX_HITS: u8 = 3;

struct Slot {
    key: String,
    raster: Arc<Raster>,
    hits: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
    Probation,
    Protected,
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub probation: usize,
    pub protected: usize,
    pub ghost: usize,
    pub capacity: usize,
}

/// Scan-resistant thumbnail cache.
pub struct ThumbnailCache {
    index: HashMap<String, Queue>,
    probation: VecDeque<Slot>,
    protected: VecDeque<Slot>,
    ghost: VecDeque<String>,
    probation_cap: usize,
    protected_cap: usize,
    hits: u64,
    misses: u64,
}

impl std::fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailCache")
            .field("probation", &self.probation.len())
            .field("protected", &self.protected.len())
            .field("ghost", &self.ghost.len())
            .finish()
    }
}

impl ThumbnailCache {
    /// Cache holding up to `capacity` thumbnails (minimum 2).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        let probation_cap = (capacity / 10).max(1);
        Self {
            index: HashMap::with_capacity(capacity),
            probation: VecDeque::with_capacity(probation_cap),
            protected: VecDeque::with_capacity(capacity - probation_cap),
            ghost: VecDeque::with_capacity(probation_cap),
            probation_cap,
            protected_cap: capacity - probation_cap,
            hits: 0,
            misses: 0,
        }
    }

    fn queue_mut(&mut self, queue: Queue) -> &mut VecDeque<Slot> {
        match queue {
            Queue::Probation => &mut self.probation,
            Queue::Protected => &mut self.protected,
        }
    }

    /// Shared handle to a cached thumbnail; counts a hit.
    pub fn get(&mut self, key: &str) -> Option<Arc<Raster>> {
        let Some(&queue) = self.index.get(key) else {
            self.misses += 1;
            return None;
        };
        let slot = self.queue_mut(queue).iter_mut().find(|s| s.key == key)?;
        slot.hits = (slot.hits + 1).min(MAX_HITS);
        let raster = Arc::clone(&slot.raster);
        self.hits += 1;
        Some(raster)
    }

    /// Whether `key` is cached (does not count as a hit).
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or replace a thumbnail.
    pub fn insert(&mut self, key: impl Into<String>, raster: Raster) {
        let key = key.into();
        let raster = Arc::new(raster);
        if let Some(&queue) = self.index.get(&key)
            && let Some(slot) = self.queue_mut(queue).iter_mut().find(|s| s.key == key)
        {
            slot.raster = raster;
            slot.hits = (slot.hits + 1).min(MAX_HITS);
            return;
        }

        let was_ghost = match self.ghost.iter().position(|k| *k == key) {
            Some(pos) => {
                self.ghost.remove(pos);
                true
            }
            None => false,
        };

        let slot = Slot {
            key: key.clone(),
            raster,
            hits: 0,
        };
        if was_ghost {
            self.make_room_protected();
            self.protected.push_back(slot);
            self.index.insert(key, Queue::Protected);
        } else {
            self.make_room_probation();
            self.probation.push_back(slot);
            self.index.insert(key, Queue::Probation);
        }
    }

    /// Drop a thumbnail (e.g. the image was deleted).
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(queue) = self.index.remove(key) else {
            return false;
        };
        let q = self.queue_mut(queue);
        if let Some(pos) = q.iter().position(|s| s.key == key) {
            q.remove(pos);
        }
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.probation.len() + self.protected.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.probation_cap + self.protected_cap
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            probation: self.probation.len(),
            protected: self.protected.len(),
            ghost: self.ghost.len(),
            capacity: self.capacity(),
        }
    }

    fn make_room_probation(&mut self) {
        while self.probation.len() >= self.probation_cap {
            let Some(slot) = self.probation.pop_front() else {
                break;
            };
            if slot.hits > 0 {
                self.make_room_protected();
                self.index.insert(slot.key.clone(), Queue::Protected);
                self.protected.push_back(Slot { hits: 0, ..slot });
            } else {
                self.index.remove(&slot.key);
                if self.ghost.len() >= self.probation_cap {
                    self.ghost.pop_front();
                }
                self.ghost.push_back(slot.key);
            }
        }
    }

    fn make_room_protected(&mut self) {
        while self.protected.len() >= self.protected_cap {
            let Some(mut slot) = self.protected.pop_front() else {
                break;
            };
            if slot.hits > 0 {
                slot.hits -= 1;
                self.protected.push_back(slot);
            } else {
                self.index.remove(&slot.key);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryRasterSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct SyntheticImage {
    width: u32,
    height: u32,
    color: u32,
}

/// A [`RasterSource`] over synthetic solid-colour images.
pub struct MemoryRasterSource {
    images: HashMap<u64, SyntheticImage>,
    broken: HashSet<u64>,
    cache: Mutex<ThumbnailCache>,
    decode_delay: Duration,
    recycler: Option<Arc<dyn RasterRecycler>>,
}

impl Default for MemoryRasterSource {
    fn default() -> Self {
        Self::new(64)
    }
}

impl MemoryRasterSource {
    #[must_use]
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            images: HashMap::new(),
            broken: HashSet::new(),
            cache: Mutex::new(ThumbnailCache::new(cache_capacity)),
            decode_delay: Duration::ZERO,
            recycler: None,
        }
    }

    /// Register an image of the given full-resolution size.
    #[must_use]
    pub fn with_image(mut self, id: u64, width: u32, height: u32) -> Self {
        let color = 0xff00_0000 | (id as u32).wrapping_mul(0x9e37_79b9) >> 8;
        self.images.insert(
            id,
            SyntheticImage {
                width,
                height,
                color,
            },
        );
        self
    }

    /// Register an image whose decode always fails.
    #[must_use]
    pub fn with_broken_image(mut self, id: u64, width: u32, height: u32) -> Self {
        self = self.with_image(id, width, height);
        self.broken.insert(id);
        self
    }

    /// Sleep this long inside every decode (simulates storage latency).
    #[must_use]
    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    /// Attach a recycler to every raster this source hands out.
    #[must_use]
    pub fn with_recycler(mut self, recycler: Arc<dyn RasterRecycler>) -> Self {
        self.recycler = Some(recycler);
        self
    }

    /// Put a thumbnail for `image` into the memory cache.
    pub fn warm(&self, image: &ImageRef, max_dim: u32) -> bool {
        let Some(meta) = self.images.get(&image.id) else {
            return false;
        };
        let (w, h) = fit_within(meta.width, meta.height, max_dim.saturating_mul(2));
        let Some(thumb) = Raster::solid(w, h, ColorDepth::Argb8888, meta.color) else {
            return false;
        };
        self.lock_cache().insert(image.cache_key(), thumb);
        true
    }

    /// Snapshot of the cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ThumbnailCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn track(&self, raster: Raster) -> Raster {
        match &self.recycler {
            Some(r) => raster.with_recycler(Arc::clone(r)),
            None => raster,
        }
    }
}

impl RasterSource for MemoryRasterSource {
    fn lookup(&self, key: &str, max_dim: u32) -> Option<Raster> {
        let copy = self.lock_cache().get(key)?.downscaled(max_dim);
        Some(self.track(copy))
    }

    fn probe(&self, image: &ImageRef) -> Option<(u32, u32)> {
        self.images.get(&image.id).map(|m| (m.width, m.height))
    }

    fn decode(&self, image: &ImageRef, options: DecodeOptions) -> Option<Raster> {
        if !self.decode_delay.is_zero() {
            std::thread::sleep(self.decode_delay);
        }
        if self.broken.contains(&image.id) {
            trace!(id = image.id, "synthetic decode failure");
            return None;
        }
        let meta = self.images.get(&image.id)?;
        let factor = options.sample_factor.max(1);
        let w = (meta.width / factor).max(1);
        let h = (meta.height / factor).max(1);
        let raster = Raster::solid(w, h, options.depth, meta.color)?;
        Some(self.track(raster))
    }
}
