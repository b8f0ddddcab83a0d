//! Metrics-only font shared by the integration tests
#![allow(dead_code)]

use oshape_core::buffer::GlyphBuffer;
use oshape_core::map::{LookupMap, TableIndex};
use oshape_core::traits::{FeatureSearch, Font};
use oshape_core::types::{GlyphId, Script, Tag};
use parking_lot::Mutex;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Every code point maps to the glyph with the same id
#[derive(Default)]
pub struct MockFont {
    /// Code points the font has no glyph for
    pub missing: Vec<u32>,
    /// Features the font's GSUB provides, each with one lookup
    pub gsub_features: Vec<Tag>,
    /// `(max_len, max_ops)` seen at each substitution start
    pub budgets: Mutex<Vec<(usize, i32)>>,
}

impl MockFont {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gsub(features: &[&[u8; 4]]) -> Self {
        Self {
            gsub_features: features.iter().map(|tag| Tag::new(tag)).collect(),
            ..Self::default()
        }
    }

    pub fn without(missing: &[u32]) -> Self {
        Self {
            missing: missing.to_vec(),
            ..Self::default()
        }
    }
}

impl Font for MockFont {
    fn units_per_em(&self) -> u16 {
        1000
    }

    fn nominal_glyph(&self, cp: u32) -> Option<GlyphId> {
        (!self.missing.contains(&cp)).then_some(cp)
    }

    fn h_advance(&self, _glyph: GlyphId) -> i32 {
        500
    }

    fn cache_id(&self) -> Option<u64> {
        Some(1)
    }

    fn has_ot_substitution(&self) -> bool {
        !self.gsub_features.is_empty()
    }

    fn select_script(&self, table: TableIndex, _script: Option<Script>) -> Option<(Tag, bool)> {
        (table == TableIndex::Gsub && self.has_ot_substitution()).then(|| (Tag::new(b"DFLT"), false))
    }

    fn feature_lookups(&self, table: TableIndex, _search: FeatureSearch<'_>, feature: Tag) -> Option<Vec<u16>> {
        if table != TableIndex::Gsub {
            return None;
        }
        let index = self.gsub_features.iter().position(|&tag| tag == feature)?;
        Some(vec![index as u16])
    }

    fn substitute_start(&self, buffer: &mut GlyphBuffer) {
        self.budgets.lock().push((buffer.max_len(), buffer.max_ops()));
    }

    fn apply_lookup(&self, _table: TableIndex, _lookup: &LookupMap, _buffer: &mut GlyphBuffer) {}
}

/// A buffer holding `text` with the given properties
pub fn buffer_for(text: &str, direction: oshape_core::types::Direction, script: Script) -> GlyphBuffer {
    let mut buffer = GlyphBuffer::new();
    buffer.add_str(text);
    buffer.set_direction(direction);
    buffer.set_script(script);
    buffer
}

pub fn glyphs(buffer: &GlyphBuffer) -> Vec<u32> {
    buffer.info().iter().map(|info| info.codepoint).collect()
}

pub fn clusters(buffer: &GlyphBuffer) -> Vec<u32> {
    buffer.info().iter().map(|info| info.cluster).collect()
}
