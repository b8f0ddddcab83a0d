//! The contracts the shaper relies on
//!
//! Shaping is orchestration. The actual knowledge lives elsewhere: fonts
//! know their glyphs, metrics and layout tables, and a Unicode database knows
//! character properties. These two traits are everything the orchestrator
//! asks of them.
//!
//! - [`Font`] - metrics, capability queries and lookup application
//! - [`UnicodeFuncs`] - character properties

use crate::buffer::GlyphBuffer;
use crate::map::{AltFeatureMap, LookupMap, TableIndex};
use crate::types::{Direction, GlyphId, Language, Mask, Script, Tag};
use crate::unicode::GeneralCategory;

/// The glyph class a font assigns in its glyph definition table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GlyphClass {
    #[default]
    Unclassified,
    Base,
    Ligature,
    Mark,
    Component,
}

/// Ink bounds of a glyph, y growing upwards from the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphExtents {
    pub x_bearing: i32,
    pub y_bearing: i32,
    pub width: i32,
    /// Negative for glyphs with ink below `y_bearing`
    pub height: i32,
}

/// Where a language-system lookup should look for a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureSearch<'a> {
    /// Only features reachable from one script's language system
    LanguageSystem {
        script: Tag,
        language: Option<&'a Language>,
    },
    /// Any feature record in the table, whatever script references it
    Anywhere,
}

/// The font as the shaper sees it
///
/// Only the metric queries are required. Everything else has a default
/// that reports "not available", so a metrics-only font shapes through the
/// fallback paths.
///
/// ```
/// use oshape_core::traits::Font;
/// use oshape_core::types::GlyphId;
///
/// struct Monospace;
///
/// impl Font for Monospace {
///     fn units_per_em(&self) -> u16 {
///         1000
///     }
///
///     fn nominal_glyph(&self, cp: u32) -> Option<GlyphId> {
///         (cp < 0x80).then_some(cp)
///     }
///
///     fn h_advance(&self, _glyph: GlyphId) -> i32 {
///         600
///     }
/// }
///
/// assert!(Monospace.has_glyph('A' as u32));
/// assert!(!Monospace.has_ot_substitution());
/// ```
pub trait Font: Send + Sync {
    /// The font's design grid
    fn units_per_em(&self) -> u16;

    /// Glyph for a character, if the font covers it
    fn nominal_glyph(&self, cp: u32) -> Option<GlyphId>;

    /// Glyph for a character followed by a variation selector
    fn variation_glyph(&self, _cp: u32, _selector: u32) -> Option<GlyphId> {
        None
    }

    fn has_glyph(&self, cp: u32) -> bool {
        self.nominal_glyph(cp).is_some()
    }

    fn h_advance(&self, glyph: GlyphId) -> i32;

    /// Vertical advance, negative because y grows upwards
    fn v_advance(&self, _glyph: GlyphId) -> i32 {
        -i32::from(self.units_per_em())
    }

    /// Whether horizontal origins differ from the default (0, 0)
    fn has_h_origin(&self) -> bool {
        false
    }

    fn h_origin(&self, _glyph: GlyphId) -> (i32, i32) {
        (0, 0)
    }

    fn v_origin(&self, glyph: GlyphId) -> (i32, i32) {
        (self.h_advance(glyph) / 2, self.ascender())
    }

    fn ascender(&self) -> i32 {
        i32::from(self.units_per_em()) * 4 / 5
    }

    fn glyph_extents(&self, _glyph: GlyphId) -> Option<GlyphExtents> {
        None
    }

    fn glyph_class(&self, _glyph: GlyphId) -> GlyphClass {
        GlyphClass::Unclassified
    }

    /// Pair kerning from plain metrics, used by the fallback kerner
    fn h_kerning(&self, _left: GlyphId, _right: GlyphId) -> i32 {
        0
    }

    /// Stable identity for plan caching; `None` disables caching
    fn cache_id(&self) -> Option<u64> {
        None
    }

    // Capabilities

    fn has_ot_substitution(&self) -> bool {
        false
    }

    fn has_ot_positioning(&self) -> bool {
        false
    }

    fn has_alt_substitution(&self) -> bool {
        false
    }

    fn has_alt_positioning(&self) -> bool {
        false
    }

    fn has_legacy_kerning(&self) -> bool {
        false
    }

    /// Legacy kerning driven by a state machine rather than pairs
    fn has_machine_kerning(&self) -> bool {
        false
    }

    /// Legacy kerning that moves glyphs across the line direction
    fn has_cross_kerning(&self) -> bool {
        false
    }

    fn has_tracking(&self) -> bool {
        false
    }

    fn has_glyph_classes(&self) -> bool {
        false
    }

    // Layout tables

    /// The script tag `table` would be applied under, and whether it was an
    /// actual match rather than a default fallback. `None` without the table.
    fn select_script(&self, _table: TableIndex, _script: Option<Script>) -> Option<(Tag, bool)> {
        None
    }

    /// Lookup indices for `feature`, or `None` if the feature is absent
    fn feature_lookups(
        &self,
        _table: TableIndex,
        _search: FeatureSearch<'_>,
        _feature: Tag,
    ) -> Option<Vec<u16>> {
        None
    }

    /// Prepares the buffer for substitution; the default stamps glyph
    /// classes from [`Font::glyph_class`]
    fn substitute_start(&self, buffer: &mut GlyphBuffer) {
        for info in buffer.info_mut() {
            let class = self.glyph_class(info.codepoint);
            info.set_glyph_class(class);
        }
    }

    fn substitute_finish(&self, _buffer: &mut GlyphBuffer) {}

    /// Applies one lookup of `table` to glyphs carrying `lookup.mask`
    fn apply_lookup(&self, _table: TableIndex, _lookup: &LookupMap, _buffer: &mut GlyphBuffer) {}

    fn position_start(&self, _buffer: &mut GlyphBuffer) {}

    fn position_finish_advances(&self, _buffer: &mut GlyphBuffer) {}

    fn position_finish_offsets(&self, _buffer: &mut GlyphBuffer) {}

    /// Runs the alternate-format substitution backend. Deleted glyphs are
    /// left behind as [`DELETED_GLYPH`](crate::buffer::DELETED_GLYPH).
    fn apply_alt_substitution(&self, _map: &AltFeatureMap, _buffer: &mut GlyphBuffer) {}

    fn apply_alt_positioning(&self, _buffer: &mut GlyphBuffer) {}

    fn apply_legacy_kerning(&self, _kern_mask: Mask, _buffer: &mut GlyphBuffer) {}

    fn apply_tracking(&self, _trak_mask: Mask, _buffer: &mut GlyphBuffer) {}
}

/// The Unicode property database
pub trait UnicodeFuncs: Send + Sync {
    fn general_category(&self, cp: u32) -> GeneralCategory;

    /// The mirrored counterpart, or `cp` itself
    fn mirroring(&self, cp: u32) -> u32;

    fn is_default_ignorable(&self, cp: u32) -> bool;

    fn is_extended_pictographic(&self, cp: u32) -> bool;

    fn combining_class(&self, _cp: u32) -> u8 {
        0
    }

    /// Combining class tweaked so mark reordering keeps a few
    /// script-specific marks in their expected position
    fn modified_combining_class(&self, cp: u32) -> u8 {
        match cp {
            // Tai Tham SAKOT after tone marks, Tibetan PADMA after vowels.
            0x1A60 | 0x0FC6 => 254,
            // Tibetan TSA-PHRU before U+0F74.
            0x0F39 => 127,
            _ => self.combining_class(cp),
        }
    }

    fn script(&self, _cp: u32) -> Script {
        Script::UNKNOWN
    }

    fn script_horizontal_direction(&self, script: Script) -> Option<Direction> {
        script.horizontal_direction()
    }

    /// Canonical decomposition into at most two code points
    fn decompose(&self, _cp: u32) -> Option<(u32, Option<u32>)> {
        None
    }

    /// Canonical composition of a pair
    fn compose(&self, _a: u32, _b: u32) -> Option<u32> {
        None
    }
}
