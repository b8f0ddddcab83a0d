//! Metrics-only fallbacks for fonts without layout tables
//!
//! When no positioning backend can place marks, kern pairs or size
//! synthesized spaces, these passes do a rough job from glyph extents and
//! advances alone.

use oshape_core::buffer::{GlyphBuffer, GlyphPosition, GlyphProps};
use oshape_core::traits::{Font, GlyphExtents};
use oshape_core::types::Direction;
use oshape_core::unicode::combining_class as ccc;
use oshape_core::unicode::{GeneralCategory, SpaceType};

use crate::plan::ShapePlan;

/// Maps script-specific combining classes onto positional ones
fn recategorize_combining_class(u: u32, class: u8) -> u8 {
    if class >= 200 {
        return class;
    }

    let mut class = class;
    // Thai and Lao need per-character fixes.
    if u & !0xFF == 0x0E00 {
        if class == 0 {
            match u {
                0x0E31 | 0x0E34..=0x0E37 | 0x0E47 | 0x0E4C..=0x0E4E => class = ccc::ABOVE_RIGHT,
                0x0EB1 | 0x0EB4..=0x0EB7 | 0x0EBB | 0x0ECC | 0x0ECD => class = ccc::ABOVE,
                0x0EBC => class = ccc::BELOW,
                _ => {},
            }
        } else if u == 0x0E3A {
            // Thai virama
            class = ccc::BELOW_RIGHT;
        }
    }

    match class {
        // Hebrew points
        10..=18 | 20 | 22 => ccc::BELOW,
        23 => ccc::ATTACHED_ABOVE,
        24 => ccc::ABOVE_RIGHT,
        19 | 25 => ccc::ABOVE_LEFT,
        26 => ccc::ABOVE,

        // Arabic and Syriac harakat
        27 | 28 | 30 | 31 | 33..=36 => ccc::ABOVE,
        29 | 32 => ccc::BELOW,

        // Thai
        103 => ccc::BELOW_RIGHT,
        107 => ccc::ABOVE_RIGHT,

        // Lao
        118 => ccc::BELOW,
        122 => ccc::ABOVE,

        // Tibetan
        129 | 132 => ccc::BELOW,
        130 => ccc::ABOVE,

        _ => class,
    }
}

/// Rewrites nonspacing mark classes into positional ones so
/// [`position_marks`] knows where each mark goes
pub fn recategorize_marks(_plan: &ShapePlan, _font: &dyn Font, buffer: &mut GlyphBuffer) {
    for info in buffer.info_mut() {
        if info.general_category() == GeneralCategory::NonspacingMark {
            let class = recategorize_combining_class(info.codepoint, info.modified_combining_class());
            info.set_modified_combining_class(class);
        }
    }
}

fn zero_mark_advances(buffer: &mut GlyphBuffer, start: usize, end: usize, adjust_offsets: bool) {
    let (info, pos) = buffer.split_mut();
    for (info, pos) in info[start..end].iter().zip(&mut pos[start..end]) {
        if info.general_category() != GeneralCategory::NonspacingMark {
            continue;
        }
        if adjust_offsets {
            pos.x_offset -= pos.x_advance;
            pos.y_offset -= pos.y_advance;
        }
        pos.x_advance = 0;
        pos.y_advance = 0;
    }
}

/// Places one mark against `base` and grows `base` to cover it, so the
/// next mark of the same class stacks outside this one
fn position_mark(
    direction: Direction,
    y_gap: i32,
    base: &mut GlyphExtents,
    mark: &GlyphExtents,
    class: u8,
    pos: &mut GlyphPosition,
) {
    pos.x_offset = 0;
    pos.y_offset = 0;

    let centered = base.x_bearing + (base.width - mark.width) / 2 - mark.x_bearing;
    pos.x_offset += match class {
        ccc::DOUBLE_BELOW | ccc::DOUBLE_ABOVE if direction == Direction::LeftToRight => {
            base.x_bearing + base.width - mark.width / 2 - mark.x_bearing
        },
        ccc::DOUBLE_BELOW | ccc::DOUBLE_ABOVE if direction == Direction::RightToLeft => {
            base.x_bearing - mark.width / 2 - mark.x_bearing
        },
        ccc::ATTACHED_BELOW_LEFT | ccc::BELOW_LEFT | ccc::ABOVE_LEFT => base.x_bearing - mark.x_bearing,
        ccc::ATTACHED_ABOVE_RIGHT | ccc::BELOW_RIGHT | ccc::ABOVE_RIGHT => {
            base.x_bearing + base.width - mark.width - mark.x_bearing
        },
        _ => centered,
    };

    match class {
        ccc::DOUBLE_BELOW | ccc::BELOW_LEFT | ccc::BELOW | ccc::BELOW_RIGHT | ccc::ATTACHED_BELOW_LEFT | ccc::ATTACHED_BELOW => {
            if class != ccc::ATTACHED_BELOW_LEFT && class != ccc::ATTACHED_BELOW {
                base.height -= y_gap;
            }
            pos.y_offset = base.y_bearing + base.height - mark.y_bearing;
            // Never shift a below mark up.
            if (y_gap > 0) == (pos.y_offset > 0) {
                base.height -= pos.y_offset;
                pos.y_offset = 0;
            }
            base.height += mark.height;
        },
        ccc::DOUBLE_ABOVE | ccc::ABOVE_LEFT | ccc::ABOVE | ccc::ABOVE_RIGHT | ccc::ATTACHED_ABOVE | ccc::ATTACHED_ABOVE_RIGHT => {
            if class != ccc::ATTACHED_ABOVE && class != ccc::ATTACHED_ABOVE_RIGHT {
                base.y_bearing += y_gap;
                base.height -= y_gap;
            }
            pos.y_offset = base.y_bearing - (mark.y_bearing + mark.height);
            // Don't shift an above mark down too much.
            if (y_gap > 0) != (pos.y_offset > 0) {
                let correction = -pos.y_offset / 2;
                base.y_bearing += correction;
                base.height -= correction;
                pos.y_offset += correction;
            }
            base.y_bearing -= mark.height;
            base.height += mark.height;
        },
        _ => {},
    }
}

fn position_around_base(
    plan: &ShapePlan,
    font: &dyn Font,
    buffer: &mut GlyphBuffer,
    base: usize,
    end: usize,
    adjust_offsets: bool,
) {
    buffer.unsafe_to_break(base, end);

    let base_glyph = buffer.info()[base].codepoint;
    let Some(mut base_extents) = font.glyph_extents(base_glyph) else {
        zero_mark_advances(buffer, base + 1, end, adjust_offsets);
        return;
    };
    let direction = buffer.direction().unwrap_or(plan.props().direction);
    let y_gap = i32::from(font.units_per_em()) / 16;

    base_extents.y_bearing += buffer.pos()[base].y_offset;
    // The advance is a better width than the ink, and works for empty glyphs.
    base_extents.x_bearing = 0;
    base_extents.width = font.h_advance(base_glyph);

    let (mut x_offset, mut y_offset) = (0, 0);
    if direction.is_forward() {
        x_offset -= buffer.pos()[base].x_advance;
        y_offset -= buffer.pos()[base].y_advance;
    }

    let mut last_class = 255;
    let mut cluster_extents = base_extents;
    let (info, pos) = buffer.split_mut();
    for i in base + 1..end {
        let class = info[i].modified_combining_class();
        if class == 0 {
            if direction.is_forward() {
                x_offset -= pos[i].x_advance;
                y_offset -= pos[i].y_advance;
            } else {
                x_offset += pos[i].x_advance;
                y_offset += pos[i].y_advance;
            }
            continue;
        }

        if class != last_class {
            last_class = class;
            cluster_extents = base_extents;
        }

        if let Some(mark_extents) = font.glyph_extents(info[i].codepoint) {
            position_mark(direction, y_gap, &mut cluster_extents, &mark_extents, class, &mut pos[i]);
        }

        pos[i].x_advance = 0;
        pos[i].y_advance = 0;
        pos[i].x_offset += x_offset;
        pos[i].y_offset += y_offset;
    }
}

fn position_cluster(
    plan: &ShapePlan,
    font: &dyn Font,
    buffer: &mut GlyphBuffer,
    start: usize,
    end: usize,
    adjust_offsets: bool,
) {
    if end - start < 2 {
        return;
    }

    let mut i = start;
    while i < end {
        if buffer.info()[i].is_unicode_mark() {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < end && buffer.info()[j].is_unicode_mark() {
            j += 1;
        }
        position_around_base(plan, font, buffer, i, j, adjust_offsets);
        i = j;
    }
}

/// Stacks marks around their bases using glyph extents
///
/// Each base followed by marks is one unit; a base without extents just
/// gets its marks' advances zeroed.
pub fn position_marks(plan: &ShapePlan, font: &dyn Font, buffer: &mut GlyphBuffer, adjust_offsets: bool) {
    let mut start = 0;
    for i in 1..buffer.len() {
        if !buffer.info()[i].is_unicode_mark() {
            position_cluster(plan, font, buffer, start, i, adjust_offsets);
            start = i;
        }
    }
    position_cluster(plan, font, buffer, start, buffer.len(), adjust_offsets);
}

/// Pair kerning from [`Font::h_kerning`], skipping over marks
///
/// Half the kern goes on the first glyph's advance, the other half on the
/// second glyph's advance and offset.
pub fn kern(plan: &ShapePlan, font: &dyn Font, buffer: &mut GlyphBuffer) {
    let direction = buffer.direction().unwrap_or(plan.props().direction);
    if !direction.is_horizontal() {
        return;
    }

    let reverse = direction.is_backward();
    if reverse {
        buffer.reverse();
    }

    let kern_mask = plan.kern_mask;
    let count = buffer.len();
    let mut idx = 0;
    while idx < count {
        if buffer.info()[idx].mask & kern_mask == 0 {
            idx += 1;
            continue;
        }

        let next = (idx + 1..count).find(|&j| !buffer.info()[j].is_mark());
        let Some(j) = next.filter(|&j| buffer.info()[j].mask & kern_mask != 0) else {
            idx += 1;
            continue;
        };

        let i = idx;
        let kern = font.h_kerning(buffer.info()[i].codepoint, buffer.info()[j].codepoint);
        if kern != 0 {
            let kern1 = kern >> 1;
            let kern2 = kern - kern1;
            let pos = buffer.pos_mut();
            pos[i].x_advance += kern1;
            pos[j].x_advance += kern2;
            pos[j].x_offset += kern2;
            buffer.unsafe_to_break(i, j + 1);
        }
        idx = j;
    }

    if reverse {
        buffer.reverse();
    }
}

/// Sizes spaces that normalization mapped onto the plain space glyph
pub fn adjust_spaces(plan: &ShapePlan, font: &dyn Font, buffer: &mut GlyphBuffer) {
    let horizontal = buffer
        .direction()
        .unwrap_or(plan.props().direction)
        .is_horizontal();
    let upem = i32::from(font.units_per_em());

    let advance_of = |cp: u32| {
        font.nominal_glyph(cp).map(|glyph| {
            if horizontal {
                font.h_advance(glyph)
            } else {
                font.v_advance(glyph)
            }
        })
    };

    let (info, pos) = buffer.split_mut();
    for (info, pos) in info.iter().zip(pos.iter_mut()) {
        if info.general_category() != GeneralCategory::SpaceSeparator
            || info.glyph_props().contains(GlyphProps::LIGATED)
        {
            continue;
        }
        let Some(space) = info.space_fallback() else {
            continue;
        };

        let (advance, scaled) = if horizontal {
            (&mut pos.x_advance, upem)
        } else {
            (&mut pos.y_advance, -upem)
        };

        if let Some(n) = space.em_divisor() {
            *advance = (scaled + scaled.signum() * n / 2) / n;
            continue;
        }

        match space {
            SpaceType::FourEm18 => *advance = scaled * 4 / 18,
            SpaceType::Figure => {
                if let Some(figure) = ('0'..='9').find_map(|c| advance_of(c as u32)) {
                    *advance = figure;
                }
            },
            SpaceType::Punctuation => {
                if let Some(punct) = advance_of('.' as u32).or_else(|| advance_of(',' as u32)) {
                    *advance = punct;
                }
            },
            SpaceType::Narrow => *advance /= 2,
            _ => {},
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::ShaperRegistry;
    use crate::planner::ShapePlanner;
    use oshape_core::buffer::GlyphInfo;
    use oshape_core::types::{GlyphId, Script, SegmentProperties};
    use oshape_core::UnicodeFuncs;
    use oshape_unicode::IcuUnicode;

    /// Glyph id is the code point; marks are 200 wide with ink above or
    /// below the x-height, bases 500 wide and 700 tall
    struct MetricsFont;

    impl Font for MetricsFont {
        fn units_per_em(&self) -> u16 {
            1000
        }

        fn nominal_glyph(&self, cp: u32) -> Option<GlyphId> {
            (cp != 0x2007).then_some(cp)
        }

        fn h_advance(&self, glyph: GlyphId) -> i32 {
            match glyph {
                0x0300..=0x036F => 200,
                0x0030..=0x0039 => 550,
                0x002E => 250,
                _ => 500,
            }
        }

        fn glyph_extents(&self, glyph: GlyphId) -> Option<GlyphExtents> {
            match glyph {
                0x0301 => Some(GlyphExtents {
                    x_bearing: 0,
                    y_bearing: 650,
                    width: 200,
                    height: -150,
                }),
                0x0323 => Some(GlyphExtents {
                    x_bearing: 0,
                    y_bearing: -50,
                    width: 200,
                    height: -100,
                }),
                0x0078 => None,
                _ => Some(GlyphExtents {
                    x_bearing: 50,
                    y_bearing: 700,
                    width: 400,
                    height: -700,
                }),
            }
        }

        fn h_kerning(&self, left: GlyphId, right: GlyphId) -> i32 {
            match (left, right) {
                (0x41, 0x56) => -81,
                _ => 0,
            }
        }
    }

    fn plan(direction: Direction) -> ShapePlan {
        let props = SegmentProperties::new(direction, Some(Script::LATIN), None);
        ShapePlanner::new(&MetricsFont, &props, ShaperRegistry::shared())
            .compile(&[])
            .expect("plan compiles")
    }

    fn glyph_buffer(codepoints: &[u32], plan: &ShapePlan) -> GlyphBuffer {
        let ucd = IcuUnicode::shared();
        let mut buffer = GlyphBuffer::new();
        buffer.add_codepoints(codepoints, 0);
        buffer.set_direction(plan.props().direction);
        let mut scratch = buffer.scratch_flags;
        for info in buffer.info_mut() {
            info.init_unicode_props(ucd, &mut scratch);
        }
        buffer.scratch_flags = scratch;
        buffer.reset_masks(plan.map().global_mask());
        let advances: Vec<i32> = buffer.info().iter().map(|i| MetricsFont.h_advance(i.codepoint)).collect();
        for (pos, advance) in buffer.pos_mut().iter_mut().zip(advances) {
            pos.x_advance = advance;
        }
        buffer
    }

    #[test]
    fn test_recategorize_classes() {
        assert_eq!(recategorize_combining_class(0x05B0, 10), ccc::BELOW);
        assert_eq!(recategorize_combining_class(0x05B9, 19), ccc::ABOVE_LEFT);
        assert_eq!(recategorize_combining_class(0x05BC, 21), 21);
        assert_eq!(recategorize_combining_class(0x064E, 30), ccc::ABOVE);
        assert_eq!(recategorize_combining_class(0x0650, 32), ccc::BELOW);
        assert_eq!(recategorize_combining_class(0x0E31, 0), ccc::ABOVE_RIGHT);
        assert_eq!(recategorize_combining_class(0x0E3A, 9), ccc::BELOW_RIGHT);
        assert_eq!(recategorize_combining_class(0x0EBC, 0), ccc::BELOW);
        assert_eq!(recategorize_combining_class(0x0F72, 130), ccc::ABOVE);
        assert_eq!(recategorize_combining_class(0x0301, 230), 230);
    }

    #[test]
    fn test_recategorize_marks_touches_only_nonspacing_marks() {
        let plan = plan(Direction::RightToLeft);
        let mut buffer = glyph_buffer(&[0x05D1, 0x05B0, 0x05B9], &plan);
        recategorize_marks(&plan, &MetricsFont, &mut buffer);
        let classes: Vec<u8> = buffer.info().iter().map(GlyphInfo::modified_combining_class).collect();
        assert_eq!(classes, vec![0, ccc::BELOW, ccc::ABOVE_LEFT]);
    }

    #[test]
    fn test_above_mark_centered_over_base() {
        let plan = plan(Direction::LeftToRight);
        let mut buffer = glyph_buffer(&[0x61, 0x0301], &plan);
        position_marks(&plan, &MetricsFont, &mut buffer, true);

        let mark = buffer.pos()[1];
        assert_eq!(mark.x_advance, 0);
        // Centered on the 500 advance, then pulled back over the base.
        assert_eq!(mark.x_offset, (500 - 200) / 2 - 500);
        // Sits one gap above the base's top.
        assert_eq!(mark.y_offset, 700 + 1000 / 16 - (650 - 150));
        assert_eq!(buffer.pos()[0].x_advance, 500);
    }

    #[test]
    fn test_stacked_marks_do_not_collide() {
        let plan = plan(Direction::LeftToRight);
        let mut buffer = glyph_buffer(&[0x61, 0x0301, 0x0301], &plan);
        position_marks(&plan, &MetricsFont, &mut buffer, true);
        let first = buffer.pos()[1].y_offset;
        let second = buffer.pos()[2].y_offset;
        assert!(second > first, "second mark {second} stacks above first {first}");
    }

    #[test]
    fn test_below_mark_never_shifts_up() {
        let plan = plan(Direction::LeftToRight);
        let mut buffer = glyph_buffer(&[0x61, 0x0323], &plan);
        position_marks(&plan, &MetricsFont, &mut buffer, true);
        assert!(buffer.pos()[1].y_offset <= 0);
    }

    #[test]
    fn test_base_without_extents_only_zeroes_marks() {
        let plan = plan(Direction::LeftToRight);
        let mut buffer = glyph_buffer(&[0x78, 0x0301], &plan);
        position_marks(&plan, &MetricsFont, &mut buffer, true);
        let mark = buffer.pos()[1];
        assert_eq!((mark.x_advance, mark.x_offset, mark.y_offset), (0, -200, 0));
    }

    #[test]
    fn test_fallback_kern_splits_value() {
        let plan = plan(Direction::LeftToRight);
        assert!(plan.apply_fallback_kern);
        let mut buffer = glyph_buffer(&[0x41, 0x56], &plan);
        kern(&plan, &MetricsFont, &mut buffer);
        let pos = buffer.pos();
        assert_eq!(pos[0].x_advance, 500 + (-81 >> 1));
        assert_eq!(pos[1].x_advance, 500 + (-81 - (-81 >> 1)));
        assert_eq!(pos[1].x_offset, -81 - (-81 >> 1));
    }

    #[test]
    fn test_fallback_kern_works_in_logical_order_for_rtl() {
        let plan = plan(Direction::RightToLeft);
        // Visual order V A: logically A then V.
        let mut buffer = glyph_buffer(&[0x56, 0x41], &plan);
        kern(&plan, &MetricsFont, &mut buffer);
        let codepoints: Vec<u32> = buffer.info().iter().map(|i| i.codepoint).collect();
        assert_eq!(codepoints, vec![0x56, 0x41]);
        assert_eq!(buffer.pos()[1].x_advance, 500 + (-81 >> 1));
    }

    #[test]
    fn test_space_widths() {
        let plan = plan(Direction::LeftToRight);
        let ucd = IcuUnicode::shared();
        let mut buffer = glyph_buffer(&[0x2003, 0x2009, 0x2007, 0x2008, 0x202F], &plan);
        for info in buffer.info_mut() {
            if let Some(space) = oshape_core::unicode::space_fallback_type(info.codepoint) {
                assert_eq!(ucd.general_category(info.codepoint), GeneralCategory::SpaceSeparator);
                info.set_space_fallback(space);
            }
        }
        adjust_spaces(&plan, &MetricsFont, &mut buffer);
        let advances: Vec<i32> = buffer.pos().iter().map(|p| p.x_advance).collect();
        assert_eq!(advances, vec![1000, (1000 + 2) / 5, 550, 250, 250]);
    }
}
