//! Complex shapers: the per-script policy plugged into planning and shaping
//!
//! A complex shaper contributes features while the plan is collected, may
//! allocate private plan data, and gets hooks at fixed points of the
//! pipeline. Its static policy (mark zeroing, fallback positioning, the
//! GPOS script it expects, the normalization mode) feeds the planner's
//! backend decisions.
//!
//! The [`ShaperRegistry`] picks one per plan from the segment properties.
//! Shapers registered by callers are consulted before the built-ins; the
//! default shaper catches everything else.

use std::any::Any;
use std::sync::{Arc, OnceLock};

use oshape_core::buffer::GlyphBuffer;
use oshape_core::error::PlanError;
use oshape_core::traits::{Font, UnicodeFuncs};
use oshape_core::types::{SegmentProperties, Tag};

use crate::plan::ShapePlan;
use crate::planner::ShapePlanner;

mod default;
mod dumb;
mod hebrew;

pub use default::DefaultShaper;
pub use dumb::DumbShaper;
pub use hebrew::HebrewShaper;

/// Opaque per-plan data owned by a complex shaper
pub type ShaperData = Box<dyn Any + Send + Sync>;

/// When mark advances are zeroed relative to the positioning backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroWidthMarks {
    /// Marks keep their advances
    None,
    /// Zeroed before positioning lookups run
    ByGdefEarly,
    /// Zeroed after positioning lookups run
    #[default]
    ByGdefLate,
}

/// How characters are normalized before glyph mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalizationMode {
    /// Only decompose characters the font cannot map
    None,
    /// Decompose fully, never recompose
    Decomposed,
    /// Decompose, reorder marks, then recompose what the font supports
    ComposedDiacritics,
    /// Let the normalizer choose; currently [`NormalizationMode::ComposedDiacritics`]
    #[default]
    Auto,
}

/// Script-specific shaping behavior
///
/// Every hook has a no-op default, so a shaper only implements what its
/// script needs.
pub trait ComplexShaper: Send + Sync {
    /// Short identifier used in logs and for registry bookkeeping
    fn name(&self) -> &'static str;

    /// Whether this shaper handles the segment
    fn matches(&self, _props: &SegmentProperties) -> bool {
        false
    }

    /// Registers script features between the planner's bracketing markers
    fn collect_features(&self, _planner: &mut ShapePlanner<'_>) {}

    /// Last word on which features are on or off
    fn override_features(&self, _planner: &mut ShapePlanner<'_>) {}

    /// Allocates private plan data once the plan is otherwise complete
    fn create_data(&self, _plan: &ShapePlan) -> Result<Option<ShaperData>, PlanError> {
        Ok(None)
    }

    fn preprocess_text(&self, _plan: &ShapePlan, _font: &dyn Font, _buffer: &mut GlyphBuffer) {}

    fn setup_masks(&self, _plan: &ShapePlan, _font: &dyn Font, _buffer: &mut GlyphBuffer) {}

    fn postprocess_glyphs(&self, _plan: &ShapePlan, _font: &dyn Font, _buffer: &mut GlyphBuffer) {}

    /// One step of canonical decomposition, as the normalizer should see it
    fn decompose(&self, _plan: &ShapePlan, ucd: &dyn UnicodeFuncs, ab: u32) -> Option<(u32, Option<u32>)> {
        ucd.decompose(ab)
    }

    /// Canonical composition, as the normalizer should see it
    fn compose(&self, _plan: &ShapePlan, ucd: &dyn UnicodeFuncs, a: u32, b: u32) -> Option<u32> {
        ucd.compose(a, b)
    }

    fn normalization_mode(&self) -> NormalizationMode {
        NormalizationMode::Auto
    }

    fn zero_width_marks(&self) -> ZeroWidthMarks {
        ZeroWidthMarks::ByGdefLate
    }

    /// Whether marks get metrics-only positioning when no backend places them
    fn fallback_position(&self) -> bool {
        true
    }

    /// The GPOS script this shaper was written against; GPOS is skipped
    /// when the font resolves to a different one
    fn gpos_tag(&self) -> Option<Tag> {
        None
    }
}

/// Ordered set of complex shapers to choose from
#[derive(Clone)]
pub struct ShaperRegistry {
    custom: Vec<Arc<dyn ComplexShaper>>,
    builtin: Vec<Arc<dyn ComplexShaper>>,
    default: Arc<dyn ComplexShaper>,
    dumb: Arc<dyn ComplexShaper>,
}

impl ShaperRegistry {
    /// The built-in shapers only
    pub fn new() -> Self {
        Self {
            custom: Vec::new(),
            builtin: vec![Arc::new(HebrewShaper)],
            default: Arc::new(DefaultShaper),
            dumb: Arc::new(DumbShaper),
        }
    }

    /// Process-wide registry holding only the built-ins
    pub fn shared() -> &'static ShaperRegistry {
        static SHARED: OnceLock<ShaperRegistry> = OnceLock::new();
        SHARED.get_or_init(ShaperRegistry::new)
    }

    /// Adds a shaper that is consulted before the built-ins
    ///
    /// Custom shapers are tried in registration order.
    pub fn register(&mut self, shaper: Arc<dyn ComplexShaper>) {
        log::debug!("Registered complex shaper '{}'", shaper.name());
        self.custom.push(shaper);
    }

    /// The shaper for `props`, falling back to the default shaper
    pub fn categorize(&self, props: &SegmentProperties) -> Arc<dyn ComplexShaper> {
        self.custom
            .iter()
            .chain(self.builtin.iter())
            .find(|shaper| shaper.matches(props))
            .map_or_else(|| Arc::clone(&self.default), Arc::clone)
    }

    pub fn default_shaper(&self) -> &Arc<dyn ComplexShaper> {
        &self.default
    }

    /// The reduced shaper used alongside the alternate substitution backend
    pub fn dumb_shaper(&self) -> &Arc<dyn ComplexShaper> {
        &self.dumb
    }

    /// Whether `shaper` is this registry's default shaper instance
    ///
    /// Compared by address; a custom shaper sharing the name is not the default.
    pub fn is_default(&self, shaper: &dyn ComplexShaper) -> bool {
        std::ptr::eq(
            shaper as *const dyn ComplexShaper as *const (),
            Arc::as_ptr(&self.default) as *const (),
        )
    }

    /// Names of every registered shaper, in lookup order
    pub fn names(&self) -> Vec<&'static str> {
        self.custom
            .iter()
            .chain(self.builtin.iter())
            .chain([&self.default, &self.dumb])
            .map(|shaper| shaper.name())
            .collect()
    }
}

impl Default for ShaperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShaperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaperRegistry")
            .field("shapers", &self.names())
            .finish()
    }
}
