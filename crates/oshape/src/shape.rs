//! The shaping pipeline: characters in, positioned glyphs out
//!
//! A plan fixes *what* happens; this module runs it over one buffer, in a
//! fixed order of stages. The buffer is the only mutable state. Stages read
//! the plan, the font and the Unicode database, and leave their results in
//! the glyph records.
//!
//! Shaping runs in logical order until positioning is done, after which
//! backward text is reversed into visual order.

use oshape_core::buffer::{BufferFlags, ClusterLevel, ContentType, GlyphBuffer, GlyphFlags, GlyphInfo, ScratchFlags};
use oshape_core::traits::{Font, UnicodeFuncs};
use oshape_core::types::{Direction, Feature};
use oshape_core::unicode::{self, GeneralCategory};

use crate::complex::ZeroWidthMarks;
use crate::fallback;
use crate::normalize;
use crate::plan::ShapePlan;

/// One step of the pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Settle direction, reset flags and masks, arm the work limits
    Init,
    /// General category, ignorability and grapheme continuation
    TagUnicodeProps,
    /// Give a leading orphan mark a dotted circle to sit on
    InsertDottedCircle,
    /// Merge or protect grapheme clusters
    FormClusters,
    /// Reverse text written against its script's native direction
    NormalizeDirection,
    /// Complex shaper text preprocessing
    Preprocess,
    /// Mirroring, normalization, masks and glyph mapping
    SubstitutePre,
    /// The substitution backend
    SubstituteComplex,
    /// Advances and origins from font metrics
    PositionDefault,
    /// Mark zeroing, the positioning backends and fallbacks
    PositionComplex,
    /// Backward text into visual order
    ReverseIfBackward,
    /// Deleted glyphs and default ignorables
    SubstitutePost,
    /// Spread glyph flags over whole clusters
    PropagateUnsafeFlags,
    /// Put back the caller's direction and clear the work limits
    Restore,
}

impl Stage {
    pub const ALL: [Stage; 14] = [
        Stage::Init,
        Stage::TagUnicodeProps,
        Stage::InsertDottedCircle,
        Stage::FormClusters,
        Stage::NormalizeDirection,
        Stage::Preprocess,
        Stage::SubstitutePre,
        Stage::SubstituteComplex,
        Stage::PositionDefault,
        Stage::PositionComplex,
        Stage::ReverseIfBackward,
        Stage::SubstitutePost,
        Stage::PropagateUnsafeFlags,
        Stage::Restore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::TagUnicodeProps => "tag-unicode-props",
            Stage::InsertDottedCircle => "insert-dotted-circle",
            Stage::FormClusters => "form-clusters",
            Stage::NormalizeDirection => "normalize-direction",
            Stage::Preprocess => "preprocess",
            Stage::SubstitutePre => "substitute-pre",
            Stage::SubstituteComplex => "substitute-complex",
            Stage::PositionDefault => "position-default",
            Stage::PositionComplex => "position-complex",
            Stage::ReverseIfBackward => "reverse-if-backward",
            Stage::SubstitutePost => "substitute-post",
            Stage::PropagateUnsafeFlags => "propagate-unsafe-flags",
            Stage::Restore => "restore",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything one shaping call works with
struct ShapeContext<'a> {
    plan: &'a ShapePlan,
    font: &'a dyn Font,
    ucd: &'a dyn UnicodeFuncs,
    buffer: &'a mut GlyphBuffer,
    user_features: &'a [Feature],
    /// The direction the caller asked for; the buffer's may flip meanwhile
    target_direction: Direction,
}

/// Shapes `buffer` in place with a compiled plan
///
/// The buffer must hold Unicode text; afterwards it holds glyph ids in
/// visual order with positions. Feature ranges in `features` select
/// clusters, and must be the ones the plan was compiled with.
pub fn shape_with(
    plan: &ShapePlan,
    font: &dyn Font,
    ucd: &dyn UnicodeFuncs,
    buffer: &mut GlyphBuffer,
    features: &[Feature],
) {
    if buffer.is_empty() {
        buffer.set_content_type(ContentType::Glyphs);
        return;
    }
    if buffer.content_type() == ContentType::Glyphs {
        log::warn!("Buffer already holds glyphs, not shaping it again");
        return;
    }

    let target_direction = buffer.direction().unwrap_or(plan.props().direction);
    let mut ctx = ShapeContext {
        plan,
        font,
        ucd,
        buffer,
        user_features: features,
        target_direction,
    };

    for stage in Stage::ALL {
        log::trace!("Executing stage: {}", stage.name());
        ctx.run(stage);
    }
}

impl ShapeContext<'_> {
    fn run(&mut self, stage: Stage) {
        match stage {
            Stage::Init => self.init(),
            Stage::TagUnicodeProps => set_unicode_props(self.ucd, self.buffer),
            Stage::InsertDottedCircle => insert_dotted_circle(self.font, self.ucd, self.buffer),
            Stage::FormClusters => form_clusters(self.buffer),
            Stage::NormalizeDirection => self.ensure_native_direction(),
            Stage::Preprocess => self.plan.shaper().preprocess_text(self.plan, self.font, self.buffer),
            Stage::SubstitutePre => self.substitute_pre(),
            Stage::SubstituteComplex => self.substitute_complex(),
            Stage::PositionDefault => self.position_default(),
            Stage::PositionComplex => self.position_complex(),
            Stage::ReverseIfBackward => {
                if self.direction().is_backward() {
                    self.buffer.reverse();
                }
            }
            Stage::SubstitutePost => self.substitute_post(),
            Stage::PropagateUnsafeFlags => propagate_flags(self.buffer),
            Stage::Restore => {
                self.buffer.set_direction(self.target_direction);
                self.buffer.end_guarded();
            }
        }
    }

    /// The buffer's current direction
    fn direction(&self) -> Direction {
        self.buffer.direction().unwrap_or(self.target_direction)
    }

    fn init(&mut self) {
        self.buffer.set_direction(self.target_direction);
        self.buffer.scratch_flags = ScratchFlags::empty();
        self.buffer.begin_guarded();
        // Before mirroring, which adds the rtlm bit on top.
        self.buffer.reset_masks(self.plan.map().global_mask());
    }

    fn ensure_native_direction(&mut self) {
        let direction = self.direction();
        let script = self.buffer.script().or(self.plan.props().script);
        let mut horizontal = match script {
            Some(script) => self.ucd.script_horizontal_direction(script),
            None => Some(Direction::LeftToRight),
        };

        // Digit runs in right-to-left scripts are natively left-to-right,
        // and so are regional indicators.
        if horizontal == Some(Direction::RightToLeft) && direction == Direction::LeftToRight {
            let mut found_number = false;
            let mut found_letters = false;
            for info in self.buffer.info() {
                let gc = info.general_category();
                if gc == GeneralCategory::DecimalNumber {
                    found_number = true;
                } else if gc.is_letter() {
                    found_letters = true;
                    break;
                } else if unicode::is_regional_indicator(info.codepoint) {
                    found_number = true;
                }
            }
            if found_number && !found_letters {
                horizontal = Some(Direction::LeftToRight);
            }
        }

        let flip = if direction.is_horizontal() {
            horizontal.is_some_and(|native| native != direction)
        } else {
            direction != Direction::TopToBottom
        };

        if flip {
            log::trace!("Reversing {:?} run into native direction", direction);
            let merge = self.buffer.cluster_level == ClusterLevel::MonotoneCharacters;
            self.buffer.reverse_graphemes(merge);
            self.buffer.set_direction(direction.reverse());
        }
    }

    fn rotate_chars(&mut self) {
        let plan = self.plan;
        let font = self.font;
        let ucd = self.ucd;

        if self.target_direction.is_backward() {
            for info in self.buffer.info_mut() {
                let mirrored = ucd.mirroring(info.codepoint);
                if mirrored != info.codepoint && font.has_glyph(mirrored) {
                    info.codepoint = mirrored;
                } else {
                    info.mask |= plan.rtlm_mask;
                }
            }
        }

        if self.target_direction.is_vertical() && !plan.has_vert {
            for info in self.buffer.info_mut() {
                let rotated = unicode::vertical_char_for(info.codepoint);
                if rotated != info.codepoint && font.has_glyph(rotated) {
                    info.codepoint = rotated;
                }
            }
        }
    }

    /// numr, frac and dnom around each FRACTION SLASH between digits
    fn setup_masks_fraction(&mut self) {
        let plan = self.plan;
        if !self.buffer.scratch_flags.contains(ScratchFlags::HAS_NON_ASCII) || !plan.has_frac {
            return;
        }

        let (pre_mask, post_mask) = if self.direction().is_forward() {
            (plan.numr_mask | plan.frac_mask, plan.frac_mask | plan.dnom_mask)
        } else {
            (plan.frac_mask | plan.dnom_mask, plan.numr_mask | plan.frac_mask)
        };

        let is_digit = |info: &GlyphInfo| info.general_category() == GeneralCategory::DecimalNumber;
        let count = self.buffer.len();
        let mut i = 0;
        while i < count {
            if self.buffer.info()[i].codepoint != unicode::FRACTION_SLASH {
                i += 1;
                continue;
            }

            let info = self.buffer.info();
            let mut start = i;
            while start > 0 && is_digit(&info[start - 1]) {
                start -= 1;
            }
            let mut end = i + 1;
            while end < count && is_digit(&info[end]) {
                end += 1;
            }

            if start == i || end == i + 1 {
                if start == i {
                    self.buffer.unsafe_to_concat(start, start + 1);
                }
                if end == i + 1 {
                    self.buffer.unsafe_to_concat(end - 1, end);
                }
                i += 1;
                continue;
            }

            self.buffer.unsafe_to_break(start, end);
            let info = self.buffer.info_mut();
            for glyph in &mut info[start..i] {
                glyph.mask |= pre_mask;
            }
            info[i].mask |= plan.frac_mask;
            for glyph in &mut info[i + 1..end] {
                glyph.mask |= post_mask;
            }
            i = end;
        }
    }

    fn setup_masks(&mut self) {
        self.setup_masks_fraction();
        self.plan.shaper().setup_masks(self.plan, self.font, self.buffer);

        for feature in self.user_features.iter().filter(|f| !f.is_global()) {
            let (mask, shift) = self.plan.map().mask(feature.tag);
            self.buffer
                .set_masks(feature.value.wrapping_shl(shift), mask, feature.start, feature.end);
        }
    }

    fn substitute_pre(&mut self) {
        self.rotate_chars();
        normalize::normalize(self.plan, self.font, self.ucd, self.buffer);
        self.setup_masks();

        if self.plan.fallback_mark_positioning {
            fallback::recategorize_marks(self.plan, self.font, self.buffer);
        }

        for info in self.buffer.info_mut() {
            info.codepoint = info.glyph_index();
        }
        self.buffer.set_content_type(ContentType::Glyphs);
    }

    fn substitute_complex(&mut self) {
        self.font.substitute_start(self.buffer);

        if self.plan.fallback_glyph_classes {
            synthesize_glyph_classes(self.buffer);
        }

        self.plan.substitute(self.font, self.buffer);
        self.font.substitute_finish(self.buffer);
    }

    fn position_default(&mut self) {
        let font = self.font;
        let direction = self.direction();
        let (info, pos) = self.buffer.split_mut();

        if direction.is_horizontal() {
            let has_origin = font.has_h_origin();
            for (info, pos) in info.iter().zip(pos.iter_mut()) {
                pos.x_advance = font.h_advance(info.codepoint);
                if has_origin {
                    let (x, y) = font.h_origin(info.codepoint);
                    pos.x_offset -= x;
                    pos.y_offset -= y;
                }
            }
        } else {
            for (info, pos) in info.iter().zip(pos.iter_mut()) {
                pos.y_advance = font.v_advance(info.codepoint);
                let (x, y) = font.v_origin(info.codepoint);
                pos.x_offset -= x;
                pos.y_offset -= y;
            }
        }

        if self.buffer.scratch_flags.contains(ScratchFlags::HAS_SPACE_FALLBACK) {
            fallback::adjust_spaces(self.plan, font, self.buffer);
        }
    }

    fn shift_h_origins(&mut self, sign: i32) {
        let font = self.font;
        let (info, pos) = self.buffer.split_mut();
        for (info, pos) in info.iter().zip(pos.iter_mut()) {
            let (x, y) = font.h_origin(info.codepoint);
            pos.x_offset += sign * x;
            pos.y_offset += sign * y;
        }
    }

    fn position_complex(&mut self) {
        let plan = self.plan;
        let font = self.font;

        // Without table positioning a zeroed mark in forward text keeps
        // hanging over the preceding glyph.
        let adjust_offsets = plan.adjust_mark_positioning_when_zeroing && self.direction().is_forward();

        // Positioning lookups expect horizontal origins.
        if font.has_h_origin() {
            self.shift_h_origins(1);
        }

        font.position_start(self.buffer);

        let zero_width_marks = plan.shaper().zero_width_marks();
        if plan.zero_marks && zero_width_marks == ZeroWidthMarks::ByGdefEarly {
            zero_mark_widths_by_gdef(self.buffer, adjust_offsets);
        }

        plan.position(font, self.buffer);

        if plan.zero_marks && zero_width_marks == ZeroWidthMarks::ByGdefLate {
            zero_mark_widths_by_gdef(self.buffer, adjust_offsets);
        }

        // Finishing order matters.
        font.position_finish_advances(self.buffer);
        zero_width_default_ignorables(self.buffer);
        if plan.apply_morx {
            zero_width_deleted_glyphs(self.buffer);
        }
        font.position_finish_offsets(self.buffer);

        if font.has_h_origin() {
            self.shift_h_origins(-1);
        }

        if plan.fallback_mark_positioning {
            fallback::position_marks(plan, font, self.buffer, adjust_offsets);
        }
    }

    fn substitute_post(&mut self) {
        if self.plan.apply_morx {
            self.buffer
                .delete_glyphs_where(|info| info.codepoint == oshape_core::buffer::DELETED_GLYPH);
        }
        hide_default_ignorables(self.font, self.buffer);
        self.plan.shaper().postprocess_glyphs(self.plan, self.font, self.buffer);
    }
}

fn is_cluster_start_category(gc: GeneralCategory) -> bool {
    matches!(
        gc,
        GeneralCategory::LowercaseLetter
            | GeneralCategory::UppercaseLetter
            | GeneralCategory::TitlecaseLetter
            | GeneralCategory::OtherLetter
            | GeneralCategory::SpaceSeparator
    )
}

/// Tags every character, then marks the grapheme continuations that
/// aren't marks: emoji modifiers, flag pairs, ZWJ sequences and a few
/// grapheme extenders
fn set_unicode_props(ucd: &dyn UnicodeFuncs, buffer: &mut GlyphBuffer) {
    let mut scratch = buffer.scratch_flags;
    let info = buffer.info_mut();
    let count = info.len();

    let mut i = 0;
    while i < count {
        info[i].init_unicode_props(ucd, &mut scratch);
        let gc = info[i].general_category();
        let u = info[i].codepoint;

        if is_cluster_start_category(gc) {
            i += 1;
            continue;
        }

        if gc == GeneralCategory::ModifierSymbol && unicode::is_emoji_modifier(u) {
            info[i].set_continuation();
        } else if i > 0 && unicode::is_regional_indicator(u) {
            // Pairs of regional indicators form one flag.
            let prev = &info[i - 1];
            if unicode::is_regional_indicator(prev.codepoint) && !prev.is_continuation() {
                info[i].set_continuation();
            }
        } else if info[i].is_zwj() {
            info[i].set_continuation();
            if i + 1 < count && ucd.is_extended_pictographic(info[i + 1].codepoint) {
                i += 1;
                info[i].init_unicode_props(ucd, &mut scratch);
                info[i].set_continuation();
            }
        } else if matches!(u, 0xFF9E..=0xFF9F | 0xE0020..=0xE007F) {
            // Halfwidth katakana sound marks and emoji tag characters.
            info[i].set_continuation();
        }
        i += 1;
    }

    buffer.scratch_flags = scratch;
}

fn insert_dotted_circle(font: &dyn Font, ucd: &dyn UnicodeFuncs, buffer: &mut GlyphBuffer) {
    if buffer.flags.contains(BufferFlags::DO_NOT_INSERT_DOTTED_CIRCLE)
        || !buffer.flags.contains(BufferFlags::BOT)
        || !buffer.pre_context().is_empty()
    {
        return;
    }
    let first = buffer.info()[0];
    if !first.is_unicode_mark() || !font.has_glyph(unicode::DOTTED_CIRCLE) {
        return;
    }

    let mut circle = GlyphInfo::new(unicode::DOTTED_CIRCLE, first.cluster);
    circle.mask = first.mask;
    let mut scratch = buffer.scratch_flags;
    circle.init_unicode_props(ucd, &mut scratch);
    buffer.scratch_flags = scratch;

    if buffer.insert(0, circle) {
        log::debug!("Inserted dotted circle before leading mark U+{:04X}", first.codepoint);
    }
}

fn form_clusters(buffer: &mut GlyphBuffer) {
    if !buffer.scratch_flags.contains(ScratchFlags::HAS_NON_ASCII) {
        return;
    }

    let merge = buffer.cluster_level == ClusterLevel::MonotoneGraphemes;
    for (start, end) in buffer.grapheme_ranges() {
        if merge {
            buffer.merge_clusters(start, end);
        } else {
            buffer.unsafe_to_break(start, end);
        }
    }
}

/// Glyph classes from general category, for fonts without a glyph
/// definition table
fn synthesize_glyph_classes(buffer: &mut GlyphBuffer) {
    use oshape_core::traits::GlyphClass;

    for info in buffer.info_mut() {
        // Default ignorables such as CGJ stay bases so lookups that skip
        // marks don't skip them.
        let class = if info.general_category() != GeneralCategory::NonspacingMark || info.is_default_ignorable() {
            GlyphClass::Base
        } else {
            GlyphClass::Mark
        };
        info.set_glyph_class(class);
    }
}

fn zero_mark_widths_by_gdef(buffer: &mut GlyphBuffer, adjust_offsets: bool) {
    let (info, pos) = buffer.split_mut();
    for (_, pos) in info.iter().zip(pos.iter_mut()).filter(|(info, _)| info.is_mark()) {
        if adjust_offsets {
            pos.x_offset -= pos.x_advance;
            pos.y_offset -= pos.y_advance;
        }
        pos.x_advance = 0;
        pos.y_advance = 0;
    }
}

fn zero_width_default_ignorables(buffer: &mut GlyphBuffer) {
    if !buffer.scratch_flags.contains(ScratchFlags::HAS_DEFAULT_IGNORABLES)
        || buffer
            .flags
            .intersects(BufferFlags::PRESERVE_DEFAULT_IGNORABLES | BufferFlags::REMOVE_DEFAULT_IGNORABLES)
    {
        return;
    }

    let (info, pos) = buffer.split_mut();
    for (_, pos) in info.iter().zip(pos.iter_mut()).filter(|(info, _)| info.is_default_ignorable()) {
        *pos = Default::default();
    }
}

fn zero_width_deleted_glyphs(buffer: &mut GlyphBuffer) {
    let (info, pos) = buffer.split_mut();
    for (_, pos) in info
        .iter()
        .zip(pos.iter_mut())
        .filter(|(info, _)| info.codepoint == oshape_core::buffer::DELETED_GLYPH)
    {
        *pos = Default::default();
    }
}

fn hide_default_ignorables(font: &dyn Font, buffer: &mut GlyphBuffer) {
    if !buffer.scratch_flags.contains(ScratchFlags::HAS_DEFAULT_IGNORABLES)
        || buffer.flags.contains(BufferFlags::PRESERVE_DEFAULT_IGNORABLES)
    {
        return;
    }

    let invisible = if buffer.flags.contains(BufferFlags::REMOVE_DEFAULT_IGNORABLES) {
        None
    } else {
        buffer.invisible_glyph().or_else(|| font.nominal_glyph(' ' as u32))
    };

    match invisible {
        Some(glyph) => {
            for info in buffer.info_mut().iter_mut().filter(|info| info.is_default_ignorable()) {
                info.codepoint = glyph;
            }
        }
        None => buffer.delete_glyphs_where(GlyphInfo::is_default_ignorable),
    }
}

/// Makes every glyph of a cluster carry the union of the cluster's flags
fn propagate_flags(buffer: &mut GlyphBuffer) {
    if !buffer.scratch_flags.contains(ScratchFlags::HAS_UNSAFE_TO_BREAK) {
        return;
    }

    let defined = GlyphFlags::DEFINED.bits();
    for (start, end) in buffer.cluster_ranges() {
        let info = &mut buffer.info_mut()[start..end];
        let mask = info.iter().fold(0, |acc, glyph| acc | (glyph.mask & defined));
        if mask != 0 {
            for glyph in info {
                glyph.mask |= mask;
            }
        }
    }
}
