//! Normalization tuned to the font
//!
//! This is neither NFC nor NFD. Characters are decomposed only as far as
//! the font needs to render them, marks are put in canonical order, and
//! sequences are recomposed only where the font has a glyph for the
//! result. Every character leaves here with its nominal glyph resolved.

use oshape_core::buffer::{GlyphBuffer, GlyphInfo, ScratchFlags};
use oshape_core::traits::{Font, UnicodeFuncs};
use oshape_core::types::GlyphId;
use oshape_core::unicode::{self, GeneralCategory};

use crate::complex::NormalizationMode;
use crate::plan::ShapePlan;

/// Longer mark runs are left in input order
const MAX_COMBINING_MARKS: usize = 32;

/// Longest canonical decomposition in Unicode
const MAX_DECOMPOSITION: usize = 4;

const NON_BREAKING_HYPHEN: u32 = 0x2011;
const HYPHEN: u32 = 0x2010;

struct Decomposer<'a> {
    plan: &'a ShapePlan,
    font: &'a dyn Font,
    ucd: &'a dyn UnicodeFuncs,
    out: Vec<GlyphInfo>,
    scratch: ScratchFlags,
    invisible: Option<GlyphId>,
    input_len: usize,
    max_len: usize,
}

impl Decomposer<'_> {
    fn nominal(&self, cp: u32) -> GlyphId {
        self.font.nominal_glyph(cp).unwrap_or(0)
    }

    /// Copies `info` through unchanged apart from its glyph
    fn next_char(&mut self, info: GlyphInfo, glyph: GlyphId) {
        let mut info = info;
        info.set_glyph_index(glyph);
        self.out.push(info);
    }

    /// Emits a character produced by decomposition
    fn output_char(&mut self, template: GlyphInfo, cp: u32, glyph: GlyphId) {
        let mut info = template;
        info.codepoint = cp;
        info.set_glyph_index(glyph);
        info.init_unicode_props(self.ucd, &mut self.scratch);
        self.out.push(info);
    }

    /// Whether decomposing the character at `index` stays under `max_len`
    fn has_room(&self, index: usize) -> bool {
        self.out.len() + (self.input_len - index) + MAX_DECOMPOSITION <= self.max_len
    }

    /// Recursively decomposes `ab` into characters the font covers;
    /// returns how many were emitted, 0 on failure
    fn decompose(&mut self, template: GlyphInfo, shortest: bool, ab: u32) -> usize {
        let Some((a, b)) = self.plan.shaper().decompose(self.plan, self.ucd, ab) else {
            return 0;
        };

        let b_glyph = match b {
            Some(b) => match self.font.nominal_glyph(b) {
                Some(glyph) => Some((b, glyph)),
                None => return 0,
            },
            None => None,
        };
        let a_glyph = self.font.nominal_glyph(a);
        let tail = usize::from(b_glyph.is_some());

        if shortest {
            if let Some(glyph) = a_glyph {
                self.output_char(template, a, glyph);
                if let Some((b, glyph)) = b_glyph {
                    self.output_char(template, b, glyph);
                }
                return 1 + tail;
            }
        }

        let emitted = self.decompose(template, shortest, a);
        if emitted > 0 {
            if let Some((b, glyph)) = b_glyph {
                self.output_char(template, b, glyph);
            }
            return emitted + tail;
        }

        if let Some(glyph) = a_glyph {
            self.output_char(template, a, glyph);
            if let Some((b, glyph)) = b_glyph {
                self.output_char(template, b, glyph);
            }
            return 1 + tail;
        }

        0
    }

    fn decompose_current(&mut self, info: GlyphInfo, index: usize, shortest: bool) {
        let u = info.codepoint;
        let nominal = self.font.nominal_glyph(u);

        if shortest {
            if let Some(glyph) = nominal {
                self.next_char(info, glyph);
                return;
            }
        }

        if self.has_room(index) && self.decompose(info, shortest, u) > 0 {
            return;
        }

        if !shortest {
            if let Some(glyph) = nominal {
                self.next_char(info, glyph);
                return;
            }
        }

        if info.general_category() == GeneralCategory::SpaceSeparator {
            if let Some(space) = unicode::space_fallback_type(u) {
                if let Some(glyph) = self.font.nominal_glyph(' ' as u32).or(self.invisible) {
                    let mut info = info;
                    info.set_space_fallback(space);
                    self.scratch |= ScratchFlags::HAS_SPACE_FALLBACK;
                    self.next_char(info, glyph);
                    return;
                }
            }
        }

        // Not canonically equivalent to U+2010, but drawn the same.
        if u == NON_BREAKING_HYPHEN {
            if let Some(glyph) = self.font.nominal_glyph(HYPHEN) {
                self.next_char(info, glyph);
                return;
            }
        }

        self.next_char(info, 0);
    }

    /// A base with its marks, at least one of them a variation selector
    fn decompose_variation_cluster(&mut self, cluster: &[GlyphInfo]) {
        let end = cluster.len();
        let mut k = 0;
        while k + 1 < end {
            let cur = cluster[k];
            let next = cluster[k + 1];
            if !unicode::is_variation_selector(next.codepoint) {
                self.next_char(cur, self.nominal(cur.codepoint));
                k += 1;
                continue;
            }

            match self.font.variation_glyph(cur.codepoint, next.codepoint) {
                Some(glyph) => {
                    let mut merged = cur;
                    merged.cluster = cur.cluster.min(next.cluster);
                    self.next_char(merged, glyph);
                },
                None => {
                    // Left for the substitution lookups to handle.
                    self.next_char(cur, self.nominal(cur.codepoint));
                    self.next_char(next, self.nominal(next.codepoint));
                },
            }
            k += 2;

            while k < end && unicode::is_variation_selector(cluster[k].codepoint) {
                self.next_char(cluster[k], self.nominal(cluster[k].codepoint));
                k += 1;
            }
        }
        if k < end {
            self.next_char(cluster[k], self.nominal(cluster[k].codepoint));
        }
    }

    fn decompose_cluster(&mut self, cluster: &[GlyphInfo], start: usize, shortest: bool) {
        if cluster.iter().any(|info| unicode::is_variation_selector(info.codepoint)) {
            self.decompose_variation_cluster(cluster);
            return;
        }
        for (k, &info) in cluster.iter().enumerate() {
            self.decompose_current(info, start + k, shortest);
        }
    }
}

/// Decomposes, reorders and recomposes the buffer, then resolves each
/// character's nominal glyph
pub fn normalize(plan: &ShapePlan, font: &dyn Font, ucd: &dyn UnicodeFuncs, buffer: &mut GlyphBuffer) {
    if buffer.is_empty() {
        return;
    }

    let mode = match plan.shaper().normalization_mode() {
        NormalizationMode::Auto => NormalizationMode::ComposedDiacritics,
        mode => mode,
    };
    let always_short_circuit = mode == NormalizationMode::None;
    let might_short_circuit = always_short_circuit || mode != NormalizationMode::Decomposed;

    // First round: decompose.
    let input = buffer.info().to_vec();
    let count = input.len();
    let mut decomposer = Decomposer {
        plan,
        font,
        ucd,
        out: Vec::with_capacity(count),
        scratch: buffer.scratch_flags,
        invisible: buffer.invisible_glyph(),
        input_len: count,
        max_len: buffer.max_len(),
    };

    let mut all_simple = true;
    let mut idx = 0;
    while idx < count {
        let mut end = idx + 1;
        while end < count && !input[end].is_unicode_mark() {
            end += 1;
        }
        if end < count {
            // Leave one base for the marks to cluster with.
            end -= 1;
        }

        while idx < end {
            decomposer.decompose_current(input[idx], idx, might_short_circuit);
            idx += 1;
        }
        if idx == count {
            break;
        }

        all_simple = false;

        let mut end = idx + 1;
        while end < count && input[end].is_unicode_mark() {
            end += 1;
        }
        decomposer.decompose_cluster(&input[idx..end], idx, always_short_circuit);
        idx = end;
    }

    buffer.scratch_flags = decomposer.scratch;
    buffer.replace_infos(decomposer.out);

    // Second round: canonical mark order.
    if !all_simple {
        reorder_marks(buffer);
    }

    if buffer.scratch_flags.contains(ScratchFlags::HAS_CGJ) {
        // A CGJ that blocked no reordering can be skipped by lookups.
        let info = buffer.info_mut();
        for i in 1..info.len().saturating_sub(1) {
            if info[i].codepoint == unicode::CGJ {
                let next = info[i + 1].modified_combining_class();
                if next == 0 || info[i - 1].modified_combining_class() <= next {
                    info[i].unhide();
                }
            }
        }
    }

    // Third round: recompose what the font can render.
    if !all_simple && mode == NormalizationMode::ComposedDiacritics {
        recompose(plan, font, ucd, buffer);
    }
}

fn reorder_marks(buffer: &mut GlyphBuffer) {
    let count = buffer.len();
    let mut i = 0;
    while i < count {
        if buffer.info()[i].modified_combining_class() == 0 {
            i += 1;
            continue;
        }

        let mut end = i + 1;
        while end < count && buffer.info()[end].modified_combining_class() != 0 {
            end += 1;
        }

        if end - i <= MAX_COMBINING_MARKS {
            buffer.sort_range_by_key(i, end, GlyphInfo::modified_combining_class);
        }
        i = end;
    }
}

fn recompose(plan: &ShapePlan, font: &dyn Font, ucd: &dyn UnicodeFuncs, buffer: &mut GlyphBuffer) {
    let mut scratch = buffer.scratch_flags;
    let mut starter = 0;
    let mut i = 1;
    while i < buffer.len() {
        let cur = buffer.info()[i];
        // Only marks compose with the preceding starter; Hangul fonts in
        // particular don't mix precomposed syllables with jamo.
        if cur.is_unicode_mark() {
            let prev = buffer.info()[i - 1];
            let unblocked =
                starter == i - 1 || prev.modified_combining_class() < cur.modified_combining_class();
            let composed = unblocked
                .then(|| plan.shaper().compose(plan, ucd, buffer.info()[starter].codepoint, cur.codepoint))
                .flatten()
                .and_then(|composed| font.nominal_glyph(composed).map(|glyph| (composed, glyph)));

            if let Some((composed, glyph)) = composed {
                buffer.merge_clusters(starter, i + 1);
                buffer.remove(i);
                let base = &mut buffer.info_mut()[starter];
                base.codepoint = composed;
                base.set_glyph_index(glyph);
                base.init_unicode_props(ucd, &mut scratch);
                continue;
            }
        }

        if cur.modified_combining_class() == 0 {
            starter = i;
        }
        i += 1;
    }
    buffer.scratch_flags = scratch;
}
