//! Reuse compiled plans across shaping calls
//!
//! Compiling a plan walks the font's layout tables for every feature, so
//! repeated runs with the same font, segment and features should share one
//! plan. Plans are immutable and handed out as `Arc<ShapePlan>`.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use oshape_core::error::PlanError;
use oshape_core::traits::Font;
use oshape_core::types::{Feature, SegmentProperties, Tag};
use parking_lot::Mutex;

use crate::complex::ShaperRegistry;
use crate::plan::ShapePlan;
use crate::planner::ShapePlanner;

/// Default number of plans kept
pub const DEFAULT_PLAN_CACHE_CAPACITY: usize = 64;

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(DEFAULT_PLAN_CACHE_CAPACITY) {
    Some(v) => v,
    None => unreachable!(),
};

/// What a plan depends on; feature ranges only matter at shaping time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PlanKey {
    font_id: u64,
    props: SegmentProperties,
    features: Vec<(Tag, u32, bool)>,
}

impl PlanKey {
    fn new(font_id: u64, props: &SegmentProperties, features: &[Feature]) -> Self {
        Self {
            font_id,
            props: props.clone(),
            features: features.iter().map(|f| (f.tag, f.value, f.is_global())).collect(),
        }
    }
}

/// Cache usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlanCacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl PlanCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU of compiled plans
pub struct PlanCache {
    plans: Mutex<LruCache<PlanKey, Arc<ShapePlan>>>,
    capacity: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PlanCache {
    /// A cache holding up to `capacity` plans; 0 picks the default
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            plans: Mutex::new(LruCache::new(capacity)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The cached plan for these inputs, compiling and storing it on a miss
    ///
    /// Fonts without a cache id are compiled every time. Failed
    /// compilations are not cached.
    pub fn get_or_compile(
        &self,
        font: &dyn Font,
        props: &SegmentProperties,
        features: &[Feature],
        registry: &ShaperRegistry,
    ) -> Result<Arc<ShapePlan>, PlanError> {
        let compile = || ShapePlanner::new(font, props, registry).compile(features).map(Arc::new);

        let Some(font_id) = font.cache_id() else {
            return compile();
        };
        let key = PlanKey::new(font_id, props, features);

        if let Some(plan) = self.plans.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("Plan cache hit for font {:#x} {:?}", font_id, props.direction);
            return Ok(Arc::clone(plan));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        log::trace!("Plan cache miss for font {:#x} {:?}", font_id, props.direction);

        // Compile without holding the lock; a racing thread may compile the
        // same plan, and the last one stored wins.
        let plan = compile()?;
        self.plans.lock().put(key, Arc::clone(&plan));
        Ok(plan)
    }

    pub fn stats(&self) -> PlanCacheStats {
        PlanCacheStats {
            size: self.plans.lock().len(),
            capacity: self.capacity.get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.plans.lock().clear();
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new(DEFAULT_PLAN_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCache").field("stats", &self.stats()).finish()
    }
}
