//! The compiled shape plan
//!
//! A plan is everything decided before the first glyph is touched: which
//! complex shaper runs, which backend substitutes and which positions, the
//! feature masks, and the mark policy. It is immutable once compiled and
//! meant to be shared; the plan cache hands out `Arc<ShapePlan>`.

use std::any::Any;
use std::sync::Arc;

use oshape_core::buffer::GlyphBuffer;
use oshape_core::map::{AltFeatureMap, FeatureMap, TableIndex};
use oshape_core::traits::Font;
use oshape_core::types::{Mask, SegmentProperties};

use crate::complex::{ComplexShaper, ShaperData};
use crate::fallback;

/// A compiled, reusable shaping plan
pub struct ShapePlan {
    pub(crate) props: SegmentProperties,
    pub(crate) shaper: Arc<dyn ComplexShaper>,
    pub(crate) map: FeatureMap,
    pub(crate) alt_map: AltFeatureMap,
    pub(crate) data: Option<ShaperData>,

    pub frac_mask: Mask,
    pub numr_mask: Mask,
    pub dnom_mask: Mask,
    pub rtlm_mask: Mask,
    pub kern_mask: Mask,
    pub trak_mask: Mask,

    pub requested_kerning: bool,
    pub requested_tracking: bool,
    pub has_frac: bool,
    pub has_vert: bool,
    pub has_gpos_mark: bool,
    pub zero_marks: bool,
    pub fallback_glyph_classes: bool,
    pub fallback_mark_positioning: bool,
    pub adjust_mark_positioning_when_zeroing: bool,

    pub apply_gpos: bool,
    pub apply_kern: bool,
    pub apply_fallback_kern: bool,
    pub apply_kerx: bool,
    pub apply_morx: bool,
    pub apply_trak: bool,
}

impl ShapePlan {
    pub fn props(&self) -> &SegmentProperties {
        &self.props
    }

    pub fn shaper(&self) -> &dyn ComplexShaper {
        self.shaper.as_ref()
    }

    pub fn map(&self) -> &FeatureMap {
        &self.map
    }

    /// Feature list handed to the alternate substitution backend
    pub fn alt_map(&self) -> &AltFeatureMap {
        &self.alt_map
    }

    /// The complex shaper's private data, if it allocated some of type `T`
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref::<T>()
    }

    /// Runs the substitution backend chosen at compile time
    pub fn substitute(&self, font: &dyn Font, buffer: &mut GlyphBuffer) {
        if self.apply_morx {
            font.apply_alt_substitution(&self.alt_map, buffer);
        } else {
            self.map.apply(TableIndex::Gsub, self, font, buffer);
        }
    }

    /// Runs the positioning backends chosen at compile time
    ///
    /// Table positioning comes first; legacy kerning or the metrics
    /// fallback kerner run after it when the table lacks kerning, and
    /// tracking last.
    pub fn position(&self, font: &dyn Font, buffer: &mut GlyphBuffer) {
        if self.apply_gpos {
            self.map.apply(TableIndex::Gpos, self, font, buffer);
        } else if self.apply_kerx {
            font.apply_alt_positioning(buffer);
        }

        if self.apply_kern {
            font.apply_legacy_kerning(self.kern_mask, buffer);
        } else if self.apply_fallback_kern {
            fallback::kern(self, font, buffer);
        }

        if self.apply_trak {
            font.apply_tracking(self.trak_mask, buffer);
        }
    }

    /// Sorted lookup indices this plan applies from `table`
    pub fn collect_lookups(&self, table: TableIndex) -> Vec<u16> {
        if self.apply_morx && table == TableIndex::Gsub {
            return Vec::new();
        }
        if !self.apply_gpos && table == TableIndex::Gpos {
            return Vec::new();
        }
        self.map.collect_lookups(table)
    }
}

impl std::fmt::Debug for ShapePlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapePlan")
            .field("props", &self.props)
            .field("shaper", &self.shaper.name())
            .field("global_mask", &format_args!("{:#010x}", self.map.global_mask()))
            .field("apply_gpos", &self.apply_gpos)
            .field("apply_kerx", &self.apply_kerx)
            .field("apply_kern", &self.apply_kern)
            .field("apply_fallback_kern", &self.apply_fallback_kern)
            .field("apply_morx", &self.apply_morx)
            .field("apply_trak", &self.apply_trak)
            .field("zero_marks", &self.zero_marks)
            .field("fallback_mark_positioning", &self.fallback_mark_positioning)
            .field("has_data", &self.data.is_some())
            .finish_non_exhaustive()
    }
}
