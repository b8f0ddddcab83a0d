//! End-to-end shaping runs against a metrics-only font

mod common;

use std::sync::Arc;

use common::{buffer_for, clusters, glyphs, init_logging, MockFont};
use oshape::prelude::*;
use oshape::{ShaperData, ShaperRegistry};
use oshape_core::buffer::{ContentType, ScratchFlags};
use oshape_core::limits::{BufferLimits, MAX_LEN_DEFAULT, MAX_OPS_DEFAULT};

fn plan_for(font: &MockFont, buffer: &GlyphBuffer, features: &[Feature]) -> ShapePlan {
    compile_plan(font, &buffer.segment_properties(), features).expect("plan compiles")
}

#[test]
fn test_ascii_run_stays_simple() {
    init_logging();
    let font = MockFont::new();
    let mut buffer = buffer_for("Hello", Direction::LeftToRight, Script::LATIN);
    let plan = plan_for(&font, &buffer, &[]);

    shape(&plan, &font, &mut buffer, &[]);

    assert_eq!(glyphs(&buffer), vec![0x48, 0x65, 0x6C, 0x6C, 0x6F]);
    assert_eq!(buffer.direction(), Some(Direction::LeftToRight));
    assert!(!buffer
        .scratch_flags
        .intersects(ScratchFlags::HAS_NON_ASCII | ScratchFlags::HAS_UNSAFE_TO_BREAK));
    assert!(buffer.info().iter().all(|info| info.mask == plan.map().global_mask()));
    assert!(buffer.pos().iter().all(|pos| pos.x_advance == 500));
}

#[test]
fn test_leading_mark_gets_dotted_circle() {
    init_logging();
    let font = MockFont::new();
    let mut buffer = buffer_for("\u{05B4}", Direction::RightToLeft, Script::HEBREW);
    buffer.flags |= BufferFlags::BOT;
    let plan = plan_for(&font, &buffer, &[]);

    shape(&plan, &font, &mut buffer, &[]);

    // Hebrew is shaped right-to-left in logical order and reversed at the end,
    // so the circle inserted before the mark becomes the last visual glyph.
    assert_eq!(glyphs(&buffer), vec![0x05B4, 0x25CC]);
    assert_eq!(clusters(&buffer), vec![0, 0]);
    assert_eq!(buffer.direction(), Some(Direction::RightToLeft));
}

#[test]
fn test_leading_mark_in_left_to_right_script_shaped_backward() {
    init_logging();
    let font = MockFont::new();
    let mut buffer = buffer_for("\u{0301}", Direction::RightToLeft, Script::LATIN);
    buffer.flags |= BufferFlags::BOT;
    let plan = plan_for(&font, &buffer, &[]);

    shape(&plan, &font, &mut buffer, &[]);

    // Latin runs are flipped grapheme by grapheme, keeping the circle ahead of its mark.
    assert_eq!(glyphs(&buffer), vec![0x25CC, 0x0301]);
    assert_eq!(clusters(&buffer), vec![0, 0]);
    assert_eq!(buffer.direction(), Some(Direction::RightToLeft));

    let mut buffer = buffer_for("\u{0301}a", Direction::RightToLeft, Script::LATIN);
    buffer.flags |= BufferFlags::BOT;
    shape(&plan, &font, &mut buffer, &[]);
    assert_eq!(glyphs(&buffer), vec![0x61, 0x25CC, 0x0301]);
    assert_eq!(buffer.direction(), Some(Direction::RightToLeft));
}

#[test]
fn test_dotted_circle_needs_text_start() {
    let font = MockFont::new();

    let mut buffer = buffer_for("\u{05B4}", Direction::RightToLeft, Script::HEBREW);
    let plan = plan_for(&font, &buffer, &[]);
    shape(&plan, &font, &mut buffer, &[]);
    assert_eq!(glyphs(&buffer), vec![0x05B4]);

    let mut buffer = buffer_for("\u{05B4}", Direction::RightToLeft, Script::HEBREW);
    buffer.flags |= BufferFlags::BOT;
    buffer.set_pre_context("\u{05D0}");
    shape(&plan, &font, &mut buffer, &[]);
    assert_eq!(glyphs(&buffer), vec![0x05B4]);

    let font = MockFont::without(&[0x25CC]);
    let mut buffer = buffer_for("\u{05B4}", Direction::RightToLeft, Script::HEBREW);
    buffer.flags |= BufferFlags::BOT;
    shape(&plan, &font, &mut buffer, &[]);
    assert_eq!(glyphs(&buffer), vec![0x05B4]);
}

#[test]
fn test_fraction_masks_forward() {
    init_logging();
    let font = MockFont::with_gsub(&[b"frac", b"numr", b"dnom"]);
    let mut buffer = buffer_for("1234\u{2044}5678", Direction::LeftToRight, Script::LATIN);
    let plan = plan_for(&font, &buffer, &[]);
    assert!(plan.has_frac);

    shape(&plan, &font, &mut buffer, &[]);

    let all = plan.numr_mask | plan.frac_mask | plan.dnom_mask;
    let masks: Vec<u32> = buffer.info().iter().map(|info| info.mask & all).collect();
    let numerator = plan.numr_mask | plan.frac_mask;
    let denominator = plan.frac_mask | plan.dnom_mask;
    assert_eq!(&masks[..4], &[numerator; 4]);
    assert_eq!(masks[4], plan.frac_mask);
    assert_eq!(&masks[5..], &[denominator; 4]);

    // Every break inside the fraction is unsafe; the one before it is not.
    let unsafe_to_break: Vec<bool> = buffer
        .info()
        .iter()
        .map(|info| info.glyph_flags().contains(GlyphFlags::UNSAFE_TO_BREAK))
        .collect();
    assert!(!unsafe_to_break[0]);
    assert!(unsafe_to_break[1..].iter().all(|&flag| flag));
}

#[test]
fn test_fraction_masks_backward_swap() {
    let font = MockFont::with_gsub(&[b"frac", b"numr", b"dnom"]);
    let mut buffer = buffer_for("1234\u{2044}5678", Direction::RightToLeft, Script::HEBREW);
    let plan = plan_for(&font, &buffer, &[]);

    shape(&plan, &font, &mut buffer, &[]);

    let all = plan.numr_mask | plan.frac_mask | plan.dnom_mask;
    for info in buffer.info() {
        let expected = match info.codepoint {
            0x31..=0x34 => plan.frac_mask | plan.dnom_mask,
            0x2044 => plan.frac_mask,
            _ => plan.numr_mask | plan.frac_mask,
        };
        assert_eq!(info.mask & all, expected, "glyph {:#x}", info.codepoint);
    }
    // Visual order for a backward run.
    assert_eq!(glyphs(&buffer)[0], 0x38);
}

#[test]
fn test_lone_fraction_slash_gets_no_masks() {
    let font = MockFont::with_gsub(&[b"frac", b"numr", b"dnom"]);
    let mut buffer = buffer_for("a\u{2044}5", Direction::LeftToRight, Script::LATIN);
    let plan = plan_for(&font, &buffer, &[]);

    shape(&plan, &font, &mut buffer, &[]);

    let all = plan.numr_mask | plan.frac_mask | plan.dnom_mask;
    assert!(buffer.info().iter().all(|info| info.mask & all == 0));
}

#[test]
fn test_ignorable_mark_classed_as_base() {
    init_logging();
    let font = MockFont::new();
    let mut buffer = buffer_for("a\u{034F}\u{0301}", Direction::LeftToRight, Script::LATIN);
    buffer.flags |= BufferFlags::PRESERVE_DEFAULT_IGNORABLES;
    let plan = plan_for(&font, &buffer, &[]);
    assert!(plan.fallback_glyph_classes);

    shape(&plan, &font, &mut buffer, &[]);

    let info = buffer.info();
    assert_eq!(info[1].codepoint, 0x034F);
    assert!(info[1].is_base_glyph());
    assert!(!info[1].is_mark());
    assert!(info[2].is_mark());
}

#[test]
fn test_work_budget_scales_with_length() {
    init_logging();
    let font = MockFont::new();
    let text = "a".repeat(1000);
    let mut buffer = buffer_for(&text, Direction::LeftToRight, Script::LATIN);
    let plan = plan_for(&font, &buffer, &[]);

    shape(&plan, &font, &mut buffer, &[]);

    let limits = BufferLimits::default();
    assert_eq!(font.budgets.lock().as_slice(), &[(1000 * 64, 1000 * 1024)]);
    assert_eq!(limits.max_len_for(1000), 64_000);
    assert_eq!(buffer.max_len(), MAX_LEN_DEFAULT);
    assert_eq!(buffer.max_ops(), MAX_OPS_DEFAULT);
}

#[test]
fn test_work_budget_floor_and_override() {
    let font = MockFont::new();
    let mut buffer = buffer_for("abc", Direction::LeftToRight, Script::LATIN);
    let plan = plan_for(&font, &buffer, &[]);
    shape(&plan, &font, &mut buffer, &[]);

    let mut custom = buffer_for("abc", Direction::LeftToRight, Script::LATIN);
    custom.set_limits(BufferLimits {
        max_len_factor: 2,
        max_len_min: 4,
        max_ops_factor: 3,
        max_ops_min: 5,
    });
    shape(&plan, &font, &mut custom, &[]);

    assert_eq!(font.budgets.lock().as_slice(), &[(16384, 16384), (6, 9)]);
}

#[test]
fn test_reversal_round_trip() {
    let font = MockFont::new();

    // Latin forced right-to-left comes out in reversed visual order.
    let mut buffer = buffer_for("abc", Direction::RightToLeft, Script::LATIN);
    let plan = plan_for(&font, &buffer, &[]);
    shape(&plan, &font, &mut buffer, &[]);
    assert_eq!(glyphs(&buffer), vec![0x63, 0x62, 0x61]);
    assert_eq!(buffer.direction(), Some(Direction::RightToLeft));

    // Hebrew forced left-to-right is reversed twice and ends in input order.
    let mut buffer = buffer_for("\u{05D0}\u{05D1}\u{05D2}", Direction::LeftToRight, Script::HEBREW);
    let plan = plan_for(&font, &buffer, &[]);
    shape(&plan, &font, &mut buffer, &[]);
    assert_eq!(glyphs(&buffer), vec![0x05D0, 0x05D1, 0x05D2]);
    assert_eq!(buffer.direction(), Some(Direction::LeftToRight));
}

#[test]
fn test_mirroring_in_backward_text() {
    let font = MockFont::new();
    let mut buffer = buffer_for("(\u{05D0})", Direction::RightToLeft, Script::HEBREW);
    let plan = plan_for(&font, &buffer, &[]);
    shape(&plan, &font, &mut buffer, &[]);
    // Visual order, with each parenthesis swapped for its mirror.
    assert_eq!(glyphs(&buffer), vec![0x28, 0x05D0, 0x29]);
}

#[test]
fn test_default_ignorables_hidden() {
    let font = MockFont::new();

    let mut buffer = buffer_for("a\u{200B}b", Direction::LeftToRight, Script::LATIN);
    let plan = plan_for(&font, &buffer, &[]);
    shape(&plan, &font, &mut buffer, &[]);
    assert_eq!(glyphs(&buffer), vec![0x61, 0x20, 0x62]);
    assert_eq!(buffer.pos()[1].x_advance, 0);

    let mut buffer = buffer_for("a\u{200B}b", Direction::LeftToRight, Script::LATIN);
    buffer.flags |= BufferFlags::REMOVE_DEFAULT_IGNORABLES;
    shape(&plan, &font, &mut buffer, &[]);
    assert_eq!(glyphs(&buffer), vec![0x61, 0x62]);
}

#[test]
fn test_ranged_feature_masks_only_its_clusters() {
    let font = MockFont::with_gsub(&[b"smcp"]);
    let features: Vec<Feature> = vec!["smcp[1:3]".parse().expect("valid feature")];
    let mut buffer = buffer_for("abcd", Direction::LeftToRight, Script::LATIN);
    let plan = plan_for(&font, &buffer, &features);

    shape(&plan, &font, &mut buffer, &features);

    let smcp = plan.map().one_mask(Tag::new(b"smcp"));
    assert_ne!(smcp, 0);
    let on: Vec<bool> = buffer.info().iter().map(|info| info.mask & smcp != 0).collect();
    assert_eq!(on, vec![false, true, true, false]);
}

#[test]
fn test_empty_buffer_becomes_glyphs() {
    let font = MockFont::new();
    let mut buffer = buffer_for("", Direction::LeftToRight, Script::LATIN);
    let plan = plan_for(&font, &buffer, &[]);
    shape(&plan, &font, &mut buffer, &[]);
    assert!(buffer.is_empty());
    assert_eq!(buffer.content_type(), ContentType::Glyphs);
}

struct GreedyShaper;

impl ComplexShaper for GreedyShaper {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn matches(&self, _props: &SegmentProperties) -> bool {
        true
    }

    fn create_data(&self, _plan: &ShapePlan) -> std::result::Result<Option<ShaperData>, PlanError> {
        Err(PlanError::DataAllocation { shaper: "greedy" })
    }
}

#[test]
fn test_plan_failure_leaves_buffer_unshaped() {
    init_logging();
    let font = MockFont::new();
    let props = SegmentProperties::new(Direction::LeftToRight, Some(Script::LATIN), None);

    let mut registry = ShaperRegistry::new();
    registry.register(Arc::new(GreedyShaper));
    let err = oshape::ShapePlanner::new(&font, &props, &registry)
        .compile(&[])
        .expect_err("allocation fails");
    assert_eq!(err, PlanError::DataAllocation { shaper: "greedy" });

    let mut shaper = OtShaper::with_config(ShaperConfig::default());
    shaper.register_shaper(Arc::new(GreedyShaper));
    let mut buffer = GlyphBuffer::new();
    buffer.add_str("ab");
    let result = shaper.shape(&font, &mut buffer, &[]);
    assert!(matches!(result, Err(PlanError::DataAllocation { .. })));
    assert_eq!(buffer.content_type(), ContentType::Unicode);
    assert_eq!(glyphs(&buffer), vec![0x61, 0x62]);

    let wrapped: OshapeError = result.expect_err("still failing").into();
    assert!(wrapped.to_string().contains("greedy"));
}

#[test]
fn test_shaper_reuses_plans() {
    let font = MockFont::new();
    let shaper = OtShaper::with_config(ShaperConfig {
        plan_cache_capacity: 8,
    });
    let features: Vec<Feature> = vec!["kern".parse().expect("valid feature")];

    for text in ["one", "two", "three"] {
        let mut buffer = GlyphBuffer::new();
        buffer.add_str(text);
        shaper.shape(&font, &mut buffer, &features).expect("shapes");
        assert_eq!(buffer.direction(), Some(Direction::LeftToRight));
        assert_eq!(buffer.len(), text.len());
    }

    let stats = shaper.cache_stats().expect("cache enabled");
    assert_eq!((stats.hits, stats.misses, stats.size), (2, 1, 1));
}
