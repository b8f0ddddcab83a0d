//! oshape - OpenType shaping orchestration
//!
//! Turns a run of Unicode text into positioned glyphs by driving the
//! shaping pipeline around the font's layout tables:
//! 1. Plan compilation: pick a complex shaper and backends, allocate masks
//! 2. Character preparation: properties, clusters, direction, normalization
//! 3. Substitution: OpenType GSUB or AAT morx
//! 4. Positioning: GPOS, kerx, legacy kern or synthesized fallbacks
//! 5. Cleanup: hide ignorables, propagate unsafe-to-break flags
//!
//! Lookup application itself is delegated to the [`Font`] implementation;
//! this crate decides what runs, in which order, on which glyphs.
//!
//! # Example
//!
//! ```ignore
//! use oshape::prelude::*;
//!
//! let shaper = OtShaper::new();
//! let mut buffer = GlyphBuffer::new();
//! buffer.add_str("Hello");
//! shaper.shape(&font, &mut buffer, &["kern".parse()?])?;
//! ```
//!
//! # Configuration
//!
//! `OSHAPE_PLAN_CACHE` sets how many compiled plans [`OtShaper`] keeps
//! (`0` disables the cache). Buffer work budgets come from
//! [`oshape_core::limits::BufferLimits`].

use std::sync::Arc;

use oshape_core::buffer::GlyphBuffer;
use oshape_core::error::PlanError;
use oshape_core::traits::{Font, UnicodeFuncs};
use oshape_core::types::{Feature, SegmentProperties};
use oshape_unicode::IcuUnicode;

pub mod complex;
pub mod fallback;
pub mod normalize;
pub mod plan;
pub mod plan_cache;
pub mod planner;
pub mod shape;

pub use complex::{ComplexShaper, NormalizationMode, ShaperData, ShaperRegistry, ZeroWidthMarks};
pub use plan::ShapePlan;
pub use plan_cache::{PlanCache, PlanCacheStats, DEFAULT_PLAN_CACHE_CAPACITY};
pub use planner::ShapePlanner;
pub use shape::{shape_with, Stage};

/// Compile a plan with the built-in shaper registry
pub fn compile_plan(
    font: &dyn Font,
    props: &SegmentProperties,
    features: &[Feature],
) -> Result<ShapePlan, PlanError> {
    ShapePlanner::new(font, props, ShaperRegistry::shared()).compile(features)
}

/// Shape `buffer` with a compiled plan and the ICU character database
pub fn shape(plan: &ShapePlan, font: &dyn Font, buffer: &mut GlyphBuffer, features: &[Feature]) {
    shape_with(plan, font, IcuUnicode::shared(), buffer, features);
}

/// Settings for [`OtShaper`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaperConfig {
    /// Plans kept in the cache; 0 disables caching
    pub plan_cache_capacity: usize,
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            plan_cache_capacity: DEFAULT_PLAN_CACHE_CAPACITY,
        }
    }
}

impl ShaperConfig {
    /// Defaults, with `OSHAPE_PLAN_CACHE` applied when it parses
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("OSHAPE_PLAN_CACHE") {
            match val.trim().parse::<usize>() {
                Ok(capacity) => {
                    config.plan_cache_capacity = capacity;
                    log::info!("Plan cache capacity set to {} via OSHAPE_PLAN_CACHE", capacity);
                }
                Err(_) => log::warn!("Ignoring OSHAPE_PLAN_CACHE={:?}: not a number", val),
            }
        }
        config
    }
}

/// Shaping entry point owning a shaper registry and a plan cache
pub struct OtShaper {
    config: ShaperConfig,
    registry: ShaperRegistry,
    cache: Option<PlanCache>,
    ucd: Arc<dyn UnicodeFuncs>,
}

impl OtShaper {
    pub fn new() -> Self {
        Self::with_config(ShaperConfig::from_env())
    }

    pub fn with_config(config: ShaperConfig) -> Self {
        let cache = match config.plan_cache_capacity {
            0 => {
                log::info!("Plan cache disabled");
                None
            }
            capacity => Some(PlanCache::new(capacity)),
        };
        Self {
            config,
            registry: ShaperRegistry::new(),
            cache,
            ucd: Arc::new(IcuUnicode::new()),
        }
    }

    /// Use another character database
    pub fn with_unicode(mut self, ucd: Arc<dyn UnicodeFuncs>) -> Self {
        self.ucd = ucd;
        self
    }

    pub fn config(&self) -> &ShaperConfig {
        &self.config
    }

    pub fn registry(&self) -> &ShaperRegistry {
        &self.registry
    }

    /// Add a complex shaper ahead of the built-ins
    ///
    /// Cached plans were categorized without it, so the cache is emptied.
    pub fn register_shaper(&mut self, shaper: Arc<dyn ComplexShaper>) {
        self.registry.register(shaper);
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// The plan for these inputs, from the cache when possible
    pub fn plan(
        &self,
        font: &dyn Font,
        props: &SegmentProperties,
        features: &[Feature],
    ) -> Result<Arc<ShapePlan>, PlanError> {
        match &self.cache {
            Some(cache) => cache.get_or_compile(font, props, features, &self.registry),
            None => ShapePlanner::new(font, props, &self.registry).compile(features).map(Arc::new),
        }
    }

    /// Fill in missing segment properties, plan, then shape
    ///
    /// On a planning error the buffer keeps its characters unshaped.
    pub fn shape(
        &self,
        font: &dyn Font,
        buffer: &mut GlyphBuffer,
        features: &[Feature],
    ) -> Result<(), PlanError> {
        buffer.guess_segment_properties(self.ucd.as_ref());
        let props = buffer.segment_properties();
        let plan = self.plan(font, &props, features)?;
        shape_with(&plan, font, self.ucd.as_ref(), buffer, features);
        Ok(())
    }

    pub fn cache_stats(&self) -> Option<PlanCacheStats> {
        self.cache.as_ref().map(PlanCache::stats)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

impl Default for OtShaper {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OtShaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtShaper")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .finish()
    }
}

/// Common imports for typical usage
pub mod prelude {
    pub use crate::{
        compile_plan, shape, ComplexShaper, OtShaper, PlanCacheStats, ShapePlan, ShaperConfig,
    };
    pub use oshape_core::{
        buffer::{BufferFlags, ClusterLevel, GlyphBuffer, GlyphFlags, GlyphInfo, GlyphPosition},
        error::{OshapeError, PlanError, Result},
        traits::{Font, UnicodeFuncs},
        types::{Direction, Feature, Language, Script, SegmentProperties, Tag},
    };
}
