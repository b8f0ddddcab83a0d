//! Hebrew: presentation-form composition for fonts without mark positioning

use oshape_core::traits::UnicodeFuncs;
use oshape_core::types::{Script, SegmentProperties, Tag};

use super::ComplexShaper;
use crate::plan::ShapePlan;

const DAGESH: u32 = 0x05BC;
const ALEF: u32 = 0x05D0;
const TAV: u32 = 0x05EA;

/// Letter with dagesh, indexed from ALEF; 0 where Unicode encodes none
const DAGESH_FORMS: [u32; (TAV - ALEF + 1) as usize] = [
    0xFB30, 0xFB31, 0xFB32, 0xFB33, 0xFB34, 0xFB35, 0xFB36, 0x0000, 0xFB38, 0xFB39, 0xFB3A, 0xFB3B, 0xFB3C,
    0x0000, 0xFB3E, 0x0000, 0xFB40, 0xFB41, 0x0000, 0xFB43, 0xFB44, 0x0000, 0xFB46, 0xFB47, 0xFB48, 0xFB49,
    0xFB4A,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct HebrewShaper;

/// Presentation forms excluded from canonical composition
fn compose_presentation_form(a: u32, b: u32) -> Option<u32> {
    let composed = match (b, a) {
        // hiriq
        (0x05B4, 0x05D9) => 0xFB1D,
        // patah
        (0x05B7, 0x05F2) => 0xFB1F,
        (0x05B7, 0x05D0) => 0xFB2E,
        // qamats
        (0x05B8, 0x05D0) => 0xFB2F,
        // holam
        (0x05B9, 0x05D5) => 0xFB4B,
        (DAGESH, ALEF..=TAV) => DAGESH_FORMS[(a - ALEF) as usize],
        (DAGESH, 0xFB2A) => 0xFB2C,
        (DAGESH, 0xFB2B) => 0xFB2D,
        // rafe
        (0x05BF, 0x05D1) => 0xFB4C,
        (0x05BF, 0x05DB) => 0xFB4D,
        (0x05BF, 0x05E4) => 0xFB4E,
        // shin dot
        (0x05C1, 0x05E9) => 0xFB2A,
        (0x05C1, 0xFB49) => 0xFB2C,
        // sin dot
        (0x05C2, 0x05E9) => 0xFB2B,
        (0x05C2, 0xFB49) => 0xFB2D,
        _ => 0,
    };
    (composed != 0).then_some(composed)
}

impl ComplexShaper for HebrewShaper {
    fn name(&self) -> &'static str {
        "hebrew"
    }

    fn matches(&self, props: &SegmentProperties) -> bool {
        props.script == Some(Script::HEBREW)
    }

    /// Old fonts without GPOS mark positioning carry the presentation
    /// forms instead, so compose into those when nothing canonical applies
    fn compose(&self, plan: &ShapePlan, ucd: &dyn UnicodeFuncs, a: u32, b: u32) -> Option<u32> {
        ucd.compose(a, b).or_else(|| {
            if plan.has_gpos_mark {
                None
            } else {
                compose_presentation_form(a, b)
            }
        })
    }

    fn gpos_tag(&self) -> Option<Tag> {
        Some(Tag::new(b"hebr"))
    }
}
