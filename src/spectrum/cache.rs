//! Bounded memoization of patch spectra.
//!
//! Entries are keyed by patch center through a location-to-slot table sized
//! to the full image, with at most `capacity` spectra resident at once and
//! least-recently-used eviction. A location present in the table always has a
//! live entry; eviction clears both sides together. Each worker owns its own
//! caches, so no locking is involved.

use crate::fft::FftPool;
use crate::image::ImageView;
use crate::spectrum::{compute_patch_spectrum, PatchSpectrum};
use crate::util::{TrackError, TrackResult};

/// Hit/miss counters for one cache instance.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache; 0 when nothing was looked up.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry {
    location: usize,
    last_access: u64,
    spectrum: PatchSpectrum,
}

/// Per-worker LRU cache of patch spectra for one image.
pub struct SpectrumCache {
    width: usize,
    height: usize,
    capacity: usize,
    kernel_width: usize,
    table: Vec<Option<usize>>,
    entries: Vec<CacheEntry>,
    bypass: Option<PatchSpectrum>,
    clock: u64,
    stats: CacheStats,
}

impl SpectrumCache {
    /// Creates a cache for an image of the given size.
    ///
    /// Capacity 0 disables memoization entirely; every lookup recomputes.
    pub fn new(width: usize, height: usize, capacity: usize) -> TrackResult<Self> {
        let len = width
            .checked_mul(height)
            .ok_or(TrackError::InvalidDimensions { width, height })?;
        if len == 0 {
            return Err(TrackError::InvalidDimensions { width, height });
        }
        Ok(Self {
            width,
            height,
            capacity,
            kernel_width: 0,
            table: vec![None; len],
            entries: Vec::with_capacity(capacity.min(len)),
            bypass: None,
            clock: 0,
            stats: CacheStats::default(),
        })
    }

    /// Returns the patch spectrum at `center`, computing it on a miss.
    ///
    /// Hits refresh the entry's access time; misses evict the globally
    /// least-recently-used entry when the cache is full. Changing the kernel
    /// width flushes resident entries, since they were computed for another
    /// patch size.
    pub fn lookup(
        &mut self,
        image: ImageView<'_, f32>,
        center: (usize, usize),
        kernel_width: usize,
        pool: &mut FftPool,
    ) -> TrackResult<&PatchSpectrum> {
        if image.width() != self.width || image.height() != self.height {
            return Err(TrackError::SizeMismatch {
                width_a: self.width,
                height_a: self.height,
                width_b: image.width(),
                height_b: image.height(),
            });
        }
        if kernel_width != self.kernel_width {
            self.flush();
            self.kernel_width = kernel_width;
        }
        let (cx, cy) = center;
        if cx >= self.width || cy >= self.height {
            return Err(TrackError::IndexOutOfBounds {
                index: cy.saturating_mul(self.width).saturating_add(cx),
                len: self.table.len(),
                context: "cache location table",
            });
        }
        let location = cy * self.width + cx;
        self.clock += 1;

        if self.capacity == 0 {
            self.stats.misses += 1;
            let spectrum = compute_patch_spectrum(image, center, kernel_width, pool)?;
            self.bypass = Some(spectrum);
            return Ok(self.bypass.as_ref().expect("bypass slot just filled"));
        }

        if let Some(slot) = self.table[location] {
            self.stats.hits += 1;
            self.entries[slot].last_access = self.clock;
            return Ok(&self.entries[slot].spectrum);
        }

        self.stats.misses += 1;
        let spectrum = compute_patch_spectrum(image, center, kernel_width, pool)?;
        let entry = CacheEntry {
            location,
            last_access: self.clock,
            spectrum,
        };

        let slot = if self.entries.len() < self.capacity {
            self.entries.push(entry);
            self.entries.len() - 1
        } else {
            let oldest = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(i, _)| i)
                .expect("capacity > 0 implies at least one entry");
            self.table[self.entries[oldest].location] = None;
            self.entries[oldest] = entry;
            oldest
        };
        self.table[location] = Some(slot);
        Ok(&self.entries[slot].spectrum)
    }

    /// Drops all resident entries; counters are kept.
    pub fn flush(&mut self) {
        for entry in &self.entries {
            self.table[entry.location] = None;
        }
        self.entries.clear();
        self.bypass = None;
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup counters accumulated so far.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::SpectrumCache;
    use crate::fft::FftPool;
    use crate::image::ImageView;

    fn sample_image(width: usize, height: usize) -> Vec<f32> {
        (0..width * height)
            .map(|i| ((i % width) as f32 * 0.31).sin() + ((i / width) as f32 * 0.17).cos())
            .collect()
    }

    #[test]
    fn repeated_lookups_hit() {
        let data = sample_image(64, 64);
        let view = ImageView::from_slice(&data, 64, 64).unwrap();
        let mut pool = FftPool::new();
        let mut cache = SpectrumCache::new(64, 64, 8).unwrap();

        cache.lookup(view, (32, 32), 16, &mut pool).unwrap();
        assert_eq!(cache.stats().hits, 0);
        cache.lookup(view, (32, 32), 16, &mut pool).unwrap();
        cache.lookup(view, (32, 32), 16, &mut pool).unwrap();
        assert_eq!(cache.stats().hits, 2);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn zero_capacity_never_hits() {
        let data = sample_image(64, 64);
        let view = ImageView::from_slice(&data, 64, 64).unwrap();
        let mut pool = FftPool::new();
        let mut cache = SpectrumCache::new(64, 64, 0).unwrap();

        for _ in 0..4 {
            cache.lookup(view, (32, 32), 16, &mut pool).unwrap();
        }
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.stats().misses, 4);
        assert!(cache.is_empty());
    }

    #[test]
    fn eviction_targets_least_recently_used() {
        let data = sample_image(64, 64);
        let view = ImageView::from_slice(&data, 64, 64).unwrap();
        let mut pool = FftPool::new();
        let mut cache = SpectrumCache::new(64, 64, 2).unwrap();

        cache.lookup(view, (20, 20), 16, &mut pool).unwrap();
        cache.lookup(view, (30, 30), 16, &mut pool).unwrap();
        // Refresh (20, 20) so (30, 30) becomes the eviction victim.
        cache.lookup(view, (20, 20), 16, &mut pool).unwrap();
        cache.lookup(view, (40, 40), 16, &mut pool).unwrap();

        let stats_before = cache.stats();
        cache.lookup(view, (20, 20), 16, &mut pool).unwrap();
        assert_eq!(cache.stats().hits, stats_before.hits + 1);
        cache.lookup(view, (30, 30), 16, &mut pool).unwrap();
        assert_eq!(cache.stats().misses, stats_before.misses + 1);
    }

    #[test]
    fn kernel_change_flushes_entries() {
        let data = sample_image(64, 64);
        let view = ImageView::from_slice(&data, 64, 64).unwrap();
        let mut pool = FftPool::new();
        let mut cache = SpectrumCache::new(64, 64, 4).unwrap();

        cache.lookup(view, (32, 32), 16, &mut pool).unwrap();
        cache.lookup(view, (32, 32), 8, &mut pool).unwrap();
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.len(), 1);
    }
}
