//! The glyph buffer: one run of text on its way to becoming glyphs
//!
//! A buffer starts out holding characters and leaves holding glyph ids
//! with positions. In between, every pipeline stage rewrites it in place.
//! [`GlyphInfo`] and [`GlyphPosition`] records always stay index-aligned,
//! through insertions, deletions and reversals alike.
//!
//! ```
//! use oshape_core::buffer::GlyphBuffer;
//!
//! let mut buffer = GlyphBuffer::new();
//! buffer.add_str("né");
//! assert_eq!(buffer.len(), 2);
//! // Clusters are UTF-8 byte offsets.
//! assert_eq!(buffer.info()[1].cluster, 1);
//! ```

use bitflags::bitflags;

use crate::limits::{BufferLimits, MAX_LEN_DEFAULT, MAX_OPS_DEFAULT};
use crate::traits::{GlyphClass, UnicodeFuncs};
use crate::types::{Direction, GlyphId, Language, Mask, Script, SegmentProperties};
use crate::unicode::{self, GeneralCategory, SpaceType};

/// Placeholder the alternate substitution backend leaves for deleted glyphs
pub const DELETED_GLYPH: u32 = 0xFFFF;

/// Longest context kept on either side of the buffer
pub const CONTEXT_LENGTH: usize = 5;

bitflags! {
    /// Caller options for one shaping call
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        /// The buffer starts at the beginning of a paragraph
        const BOT = 0x01;
        /// The buffer ends at the end of a paragraph
        const EOT = 0x02;
        const PRESERVE_DEFAULT_IGNORABLES = 0x04;
        const REMOVE_DEFAULT_IGNORABLES = 0x08;
        const DO_NOT_INSERT_DOTTED_CIRCLE = 0x10;
        const PRODUCE_UNSAFE_TO_CONCAT = 0x20;
    }

    /// Facts discovered about the buffer while shaping it
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ScratchFlags: u32 {
        const HAS_NON_ASCII = 0x01;
        const HAS_DEFAULT_IGNORABLES = 0x02;
        const HAS_SPACE_FALLBACK = 0x04;
        /// Some glyph carries an unsafe-to-break or unsafe-to-concat flag
        const HAS_UNSAFE_TO_BREAK = 0x08;
        const HAS_CGJ = 0x10;
    }

    /// Per-glyph output flags, kept in the low bits of the glyph mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GlyphFlags: u32 {
        /// Breaking the text here requires reshaping both sides
        const UNSAFE_TO_BREAK = 0x01;
        /// Concatenating separately shaped text here may differ
        const UNSAFE_TO_CONCAT = 0x02;
        const DEFINED = Self::UNSAFE_TO_BREAK.bits() | Self::UNSAFE_TO_CONCAT.bits();
    }

    /// Glyph properties from the font's class definitions and from
    /// what lookups did to the glyph
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GlyphProps: u16 {
        const BASE_GLYPH = 0x02;
        const LIGATURE = 0x04;
        const MARK = 0x08;
        const CLASS_MASK = Self::BASE_GLYPH.bits() | Self::LIGATURE.bits() | Self::MARK.bits();
        const SUBSTITUTED = 0x10;
        const LIGATED = 0x20;
        const MULTIPLIED = 0x40;
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct UnicodeProps: u16 {
        const GENERAL_CATEGORY = 0x001F;
        const IGNORABLE = 0x0020;
        /// Hidden from the caller, but visible to lookups
        const HIDDEN = 0x0040;
        const CONTINUATION = 0x0080;
        const CF_ZWJ = 0x0100;
        const CF_ZWNJ = 0x0200;
        /// Combining class for marks, space type for spaces
        const HIGH_BYTE = 0xFF00;
    }
}

/// What the buffer currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Unicode,
    Glyphs,
}

/// How much cluster merging the caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClusterLevel {
    /// Graphemes share one cluster; cluster values never decrease
    #[default]
    MonotoneGraphemes,
    /// Each character keeps its own cluster; values never decrease
    MonotoneCharacters,
    /// Each character keeps its own cluster, in whatever order
    Characters,
}

/// One character or glyph and everything the pipeline knows about it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphInfo {
    /// A Unicode code point before glyph mapping, a glyph id afterwards
    pub codepoint: u32,
    pub cluster: u32,
    pub mask: Mask,
    unicode_props: UnicodeProps,
    glyph_props: GlyphProps,
    glyph_index: GlyphId,
}

impl GlyphInfo {
    pub fn new(codepoint: u32, cluster: u32) -> Self {
        Self {
            codepoint,
            cluster,
            ..Self::default()
        }
    }

    /// Tags general category, ignorability and grapheme continuation
    ///
    /// `scratch` learns whether the buffer contains non-ASCII text or
    /// default ignorables.
    pub fn init_unicode_props(&mut self, ucd: &dyn UnicodeFuncs, scratch: &mut ScratchFlags) {
        let u = self.codepoint;
        let gc = ucd.general_category(u);
        let mut props = UnicodeProps::from_bits_retain(gc as u16);

        if u >= 0x80 {
            *scratch |= ScratchFlags::HAS_NON_ASCII;

            if ucd.is_default_ignorable(u) {
                *scratch |= ScratchFlags::HAS_DEFAULT_IGNORABLES;
                props |= UnicodeProps::IGNORABLE;
                match u {
                    unicode::ZWNJ => props |= UnicodeProps::CF_ZWNJ,
                    unicode::ZWJ => props |= UnicodeProps::CF_ZWJ,
                    // Mongolian free variation selectors and tag characters
                    // take part in lookups but are hidden afterwards.
                    0x180B..=0x180D | 0x180F | 0xE0020..=0xE007F => props |= UnicodeProps::HIDDEN,
                    unicode::CGJ => {
                        *scratch |= ScratchFlags::HAS_CGJ;
                        props |= UnicodeProps::HIDDEN;
                    },
                    _ => {},
                }
            }

            if gc.is_mark() {
                props |= UnicodeProps::CONTINUATION;
                props |= UnicodeProps::from_bits_retain(
                    u16::from(ucd.modified_combining_class(u)) << 8,
                );
            }
        }

        self.unicode_props = props;
    }

    pub fn general_category(&self) -> GeneralCategory {
        GeneralCategory::from_u8((self.unicode_props & UnicodeProps::GENERAL_CATEGORY).bits() as u8)
    }

    pub fn set_general_category(&mut self, gc: GeneralCategory) {
        self.unicode_props = (self.unicode_props - UnicodeProps::GENERAL_CATEGORY)
            | UnicodeProps::from_bits_retain(gc as u16);
    }

    pub fn is_unicode_mark(&self) -> bool {
        self.general_category().is_mark()
    }

    pub fn is_continuation(&self) -> bool {
        self.unicode_props.contains(UnicodeProps::CONTINUATION)
    }

    pub fn set_continuation(&mut self) {
        self.unicode_props |= UnicodeProps::CONTINUATION;
    }

    pub fn reset_continuation(&mut self) {
        self.unicode_props -= UnicodeProps::CONTINUATION;
    }

    /// Combining class stored for marks, 0 for everything else
    pub fn modified_combining_class(&self) -> u8 {
        if self.is_unicode_mark() {
            self.high_byte()
        } else {
            0
        }
    }

    pub fn set_modified_combining_class(&mut self, class: u8) {
        if self.is_unicode_mark() {
            self.set_high_byte(class);
        }
    }

    pub fn space_fallback(&self) -> Option<SpaceType> {
        if self.general_category() == GeneralCategory::SpaceSeparator {
            SpaceType::from_u8(self.high_byte())
        } else {
            None
        }
    }

    pub fn set_space_fallback(&mut self, space: SpaceType) {
        if self.general_category() == GeneralCategory::SpaceSeparator {
            self.set_high_byte(space as u8);
        }
    }

    fn high_byte(&self) -> u8 {
        ((self.unicode_props & UnicodeProps::HIGH_BYTE).bits() >> 8) as u8
    }

    fn set_high_byte(&mut self, value: u8) {
        self.unicode_props = (self.unicode_props - UnicodeProps::HIGH_BYTE)
            | UnicodeProps::from_bits_retain(u16::from(value) << 8);
    }

    /// Default ignorable and not yet replaced by a lookup
    pub fn is_default_ignorable(&self) -> bool {
        self.unicode_props.contains(UnicodeProps::IGNORABLE) && !self.is_substituted()
    }

    pub fn is_hidden(&self) -> bool {
        self.unicode_props.contains(UnicodeProps::HIDDEN)
    }

    /// Makes a hidden ignorable visible to lookups again
    pub fn unhide(&mut self) {
        self.unicode_props -= UnicodeProps::HIDDEN;
    }

    pub fn is_zwj(&self) -> bool {
        self.unicode_props.contains(UnicodeProps::CF_ZWJ)
    }

    pub fn is_zwnj(&self) -> bool {
        self.unicode_props.contains(UnicodeProps::CF_ZWNJ)
    }

    pub fn glyph_props(&self) -> GlyphProps {
        self.glyph_props
    }

    pub fn set_glyph_props(&mut self, props: GlyphProps) {
        self.glyph_props = props;
    }

    /// Replaces the class bits, keeping what lookups recorded
    pub fn set_glyph_class(&mut self, class: GlyphClass) {
        let class_bits = match class {
            GlyphClass::Base => GlyphProps::BASE_GLYPH,
            GlyphClass::Ligature => GlyphProps::LIGATURE,
            GlyphClass::Mark => GlyphProps::MARK,
            GlyphClass::Unclassified | GlyphClass::Component => GlyphProps::empty(),
        };
        self.glyph_props = (self.glyph_props - GlyphProps::CLASS_MASK) | class_bits;
    }

    pub fn is_mark(&self) -> bool {
        self.glyph_props.contains(GlyphProps::MARK)
    }

    pub fn is_base_glyph(&self) -> bool {
        self.glyph_props.contains(GlyphProps::BASE_GLYPH)
    }

    pub fn is_ligature(&self) -> bool {
        self.glyph_props.contains(GlyphProps::LIGATURE)
    }

    pub fn is_substituted(&self) -> bool {
        self.glyph_props.contains(GlyphProps::SUBSTITUTED)
    }

    /// Nominal glyph resolved during normalization
    pub fn glyph_index(&self) -> GlyphId {
        self.glyph_index
    }

    pub fn set_glyph_index(&mut self, glyph: GlyphId) {
        self.glyph_index = glyph;
    }

    pub fn glyph_flags(&self) -> GlyphFlags {
        GlyphFlags::from_bits_truncate(self.mask)
    }
}

/// Where a glyph sits relative to the pen, in font units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlyphPosition {
    pub x_advance: i32,
    pub y_advance: i32,
    pub x_offset: i32,
    pub y_offset: i32,
}

/// A run of text being shaped
#[derive(Debug, Clone)]
pub struct GlyphBuffer {
    info: Vec<GlyphInfo>,
    pos: Vec<GlyphPosition>,
    direction: Option<Direction>,
    script: Option<Script>,
    language: Option<Language>,
    content_type: ContentType,
    pub flags: BufferFlags,
    pub cluster_level: ClusterLevel,
    pub scratch_flags: ScratchFlags,
    invisible: Option<GlyphId>,
    pre_context: Vec<u32>,
    post_context: Vec<u32>,
    limits: BufferLimits,
    max_len: usize,
    max_ops: i32,
}

impl Default for GlyphBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl GlyphBuffer {
    pub fn new() -> Self {
        Self::with_limits(BufferLimits::default())
    }

    pub fn with_limits(limits: BufferLimits) -> Self {
        Self {
            info: Vec::new(),
            pos: Vec::new(),
            direction: None,
            script: None,
            language: None,
            content_type: ContentType::Unicode,
            flags: BufferFlags::default(),
            cluster_level: ClusterLevel::default(),
            scratch_flags: ScratchFlags::default(),
            invisible: None,
            pre_context: Vec::new(),
            post_context: Vec::new(),
            limits,
            max_len: MAX_LEN_DEFAULT,
            max_ops: MAX_OPS_DEFAULT,
        }
    }

    /// Appends text, using UTF-8 byte offsets as clusters
    pub fn add_str(&mut self, text: &str) {
        self.info.reserve(text.len());
        for (offset, ch) in text.char_indices() {
            self.add(ch as u32, offset as u32);
        }
    }

    /// Appends code points, numbering clusters from `first_cluster`
    pub fn add_codepoints(&mut self, codepoints: &[u32], first_cluster: u32) {
        for (i, &cp) in codepoints.iter().enumerate() {
            self.add(cp, first_cluster.saturating_add(i as u32));
        }
    }

    pub fn add(&mut self, codepoint: u32, cluster: u32) {
        self.info.push(GlyphInfo::new(codepoint, cluster));
        self.pos.push(GlyphPosition::default());
    }

    /// Text logically preceding the buffer, nearest character last
    pub fn set_pre_context(&mut self, text: &str) {
        let chars: Vec<u32> = text.chars().rev().take(CONTEXT_LENGTH).map(|c| c as u32).collect();
        self.pre_context = chars.into_iter().rev().collect();
    }

    /// Text logically following the buffer
    pub fn set_post_context(&mut self, text: &str) {
        self.post_context = text.chars().take(CONTEXT_LENGTH).map(|c| c as u32).collect();
    }

    pub fn pre_context(&self) -> &[u32] {
        &self.pre_context
    }

    pub fn post_context(&self) -> &[u32] {
        &self.post_context
    }

    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    /// Drops contents and properties, keeping flags and limits
    pub fn clear(&mut self) {
        self.info.clear();
        self.pos.clear();
        self.direction = None;
        self.script = None;
        self.language = None;
        self.content_type = ContentType::Unicode;
        self.scratch_flags = ScratchFlags::default();
        self.pre_context.clear();
        self.post_context.clear();
    }

    pub fn info(&self) -> &[GlyphInfo] {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut [GlyphInfo] {
        &mut self.info
    }

    pub fn pos(&self) -> &[GlyphPosition] {
        &self.pos
    }

    pub fn pos_mut(&mut self) -> &mut [GlyphPosition] {
        &mut self.pos
    }

    /// Both record arrays at once, for stages that read one and write the other
    pub fn split_mut(&mut self) -> (&mut [GlyphInfo], &mut [GlyphPosition]) {
        (&mut self.info, &mut self.pos)
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = Some(direction);
    }

    pub fn script(&self) -> Option<Script> {
        self.script
    }

    pub fn set_script(&mut self, script: Script) {
        self.script = Some(script);
    }

    pub fn language(&self) -> Option<&Language> {
        self.language.as_ref()
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = Some(language);
    }

    /// The properties a plan for this buffer must be compiled for
    pub fn segment_properties(&self) -> SegmentProperties {
        SegmentProperties::new(
            self.direction.unwrap_or(Direction::LeftToRight),
            self.script,
            self.language.clone(),
        )
    }

    pub fn set_segment_properties(&mut self, props: &SegmentProperties) {
        self.direction = Some(props.direction);
        self.script = props.script;
        self.language = props.language.clone();
    }

    /// Fills in unset script and direction from the text itself
    ///
    /// The script comes from the first character with a real script; the
    /// direction from that script's native direction, else left-to-right.
    pub fn guess_segment_properties(&mut self, ucd: &dyn UnicodeFuncs) {
        if self.script.is_none() {
            self.script = self
                .info
                .iter()
                .map(|info| ucd.script(info.codepoint))
                .find(|script| !script.is_neutral());
        }

        if self.direction.is_none() {
            let direction = self
                .script
                .and_then(|script| ucd.script_horizontal_direction(script))
                .unwrap_or(Direction::LeftToRight);
            self.direction = Some(direction);
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn set_content_type(&mut self, content_type: ContentType) {
        self.content_type = content_type;
    }

    /// Glyph used in place of hidden default ignorables
    pub fn invisible_glyph(&self) -> Option<GlyphId> {
        self.invisible
    }

    pub fn set_invisible_glyph(&mut self, glyph: GlyphId) {
        self.invisible = Some(glyph);
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    pub fn set_limits(&mut self, limits: BufferLimits) {
        self.limits = limits;
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn max_ops(&self) -> i32 {
        self.max_ops
    }

    /// Derives the guard counters from the current length
    pub fn begin_guarded(&mut self) {
        self.max_len = self.limits.max_len_for(self.len());
        self.max_ops = self.limits.max_ops_for(self.len());
    }

    /// Returns the guard counters to their static defaults
    pub fn end_guarded(&mut self) {
        self.max_len = MAX_LEN_DEFAULT;
        self.max_ops = MAX_OPS_DEFAULT;
    }

    /// Spends `ops` from the operation budget; false once it is exhausted
    pub fn consume_ops(&mut self, ops: i32) -> bool {
        self.max_ops = self.max_ops.saturating_sub(ops);
        self.max_ops > 0
    }

    pub fn ops_exhausted(&self) -> bool {
        self.max_ops <= 0
    }

    /// Whether `extra` more glyphs fit under `max_len`
    pub fn can_grow(&self, extra: usize) -> bool {
        self.len().saturating_add(extra) <= self.max_len
    }

    /// Splices a glyph in at `index`; refused once `max_len` is reached
    pub fn insert(&mut self, index: usize, info: GlyphInfo) -> bool {
        if !self.can_grow(1) || index > self.len() {
            return false;
        }
        self.info.insert(index, info);
        self.pos.insert(index, GlyphPosition::default());
        true
    }

    /// Replaces one record with several, each inheriting its cluster and mask
    pub fn replace_with(&mut self, index: usize, codepoints: &[u32]) -> bool {
        if index >= self.len() || codepoints.is_empty() || !self.can_grow(codepoints.len() - 1) {
            return false;
        }
        let template = self.info[index];
        let records = codepoints.iter().map(|&cp| GlyphInfo {
            codepoint: cp,
            ..template
        });
        self.info.splice(index..=index, records);
        self.pos.splice(
            index..=index,
            std::iter::repeat(GlyphPosition::default()).take(codepoints.len()),
        );
        true
    }

    /// Removes a single record outright; no cluster bookkeeping
    pub fn remove(&mut self, index: usize) -> Option<GlyphInfo> {
        if index >= self.len() {
            return None;
        }
        self.pos.remove(index);
        Some(self.info.remove(index))
    }

    /// Swaps in a rebuilt record array, resetting every position
    pub fn replace_infos(&mut self, infos: Vec<GlyphInfo>) {
        self.pos = vec![GlyphPosition::default(); infos.len()];
        self.info = infos;
    }

    pub fn clear_positions(&mut self) {
        self.pos.iter_mut().for_each(|p| *p = GlyphPosition::default());
    }

    /// Sets every mask to `mask`, keeping the glyph flags already recorded
    pub fn reset_masks(&mut self, mask: Mask) {
        for info in &mut self.info {
            info.mask = mask | (info.mask & GlyphFlags::DEFINED.bits());
        }
    }

    /// Writes `value` into the `mask` bits of glyphs whose cluster is in
    /// `[cluster_start, cluster_end)`
    pub fn set_masks(&mut self, value: Mask, mask: Mask, cluster_start: u32, cluster_end: u32) {
        if mask == 0 {
            return;
        }
        let value = value & mask;
        for info in &mut self.info {
            if cluster_start <= info.cluster && info.cluster < cluster_end {
                info.mask = (info.mask & !mask) | value;
            }
        }
    }

    /// End of the cluster starting at `start`
    pub fn next_cluster(&self, start: usize) -> usize {
        let Some(first) = self.info.get(start) else {
            return self.len();
        };
        let mut end = start + 1;
        while end < self.len() && self.info[end].cluster == first.cluster {
            end += 1;
        }
        end
    }

    /// End of the grapheme starting at `start`
    pub fn next_grapheme(&self, start: usize) -> usize {
        let mut end = start + 1;
        while end < self.len() && self.info[end].is_continuation() {
            end += 1;
        }
        end.min(self.len())
    }

    /// `[start, end)` ranges of every cluster, in buffer order
    pub fn cluster_ranges(&self) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        let mut start = 0;
        while start < self.len() {
            let end = self.next_cluster(start);
            ranges.push((start, end));
            start = end;
        }
        ranges
    }

    /// `[start, end)` ranges of every grapheme, in buffer order
    pub fn grapheme_ranges(&self) -> Vec<(usize, usize)> {
        let mut ranges = Vec::new();
        let mut start = 0;
        while start < self.len() {
            let end = self.next_grapheme(start);
            ranges.push((start, end));
            start = end;
        }
        ranges
    }

    /// Gives `[start, end)` a single cluster value, widening the range so
    /// no cluster is split
    pub fn merge_clusters(&mut self, start: usize, end: usize) {
        if self.cluster_level == ClusterLevel::Characters {
            self.unsafe_to_break(start, end);
            return;
        }
        let end = end.min(self.len());
        if end.saturating_sub(start) < 2 {
            return;
        }

        let cluster = self.info[start..end]
            .iter()
            .map(|info| info.cluster)
            .min()
            .unwrap_or(0);

        let mut end = end;
        if cluster != self.info[end - 1].cluster {
            while end < self.len() && self.info[end - 1].cluster == self.info[end].cluster {
                end += 1;
            }
        }

        let mut start = start;
        if cluster != self.info[start].cluster {
            while start > 0 && self.info[start - 1].cluster == self.info[start].cluster {
                start -= 1;
            }
        }

        for info in &mut self.info[start..end] {
            set_cluster(info, cluster, 0);
        }
    }

    /// Marks `[start, end)` as unsafe to break inside
    pub fn unsafe_to_break(&mut self, start: usize, end: usize) {
        self.set_glyph_flags_interior(
            GlyphFlags::UNSAFE_TO_BREAK | GlyphFlags::UNSAFE_TO_CONCAT,
            start,
            end,
        );
    }

    /// Marks `[start, end)` as unsafe to concatenate at; only recorded when
    /// the caller asked for these flags
    pub fn unsafe_to_concat(&mut self, start: usize, end: usize) {
        if !self.flags.contains(BufferFlags::PRODUCE_UNSAFE_TO_CONCAT) {
            return;
        }
        let end = end.min(self.len());
        if start >= end {
            return;
        }
        self.scratch_flags |= ScratchFlags::HAS_UNSAFE_TO_BREAK;
        for info in &mut self.info[start..end] {
            info.mask |= GlyphFlags::UNSAFE_TO_CONCAT.bits();
        }
    }

    fn set_glyph_flags_interior(&mut self, flags: GlyphFlags, start: usize, end: usize) {
        let end = end.min(self.len());
        if end.saturating_sub(start) < 2 {
            return;
        }
        self.scratch_flags |= ScratchFlags::HAS_UNSAFE_TO_BREAK;

        let infos = &mut self.info[start..end];
        let cluster = infos.iter().map(|info| info.cluster).min().unwrap_or(0);
        let first = infos[0].cluster;
        let last = infos[infos.len() - 1].cluster;
        let bits = flags.bits();

        if self.cluster_level == ClusterLevel::Characters || (cluster != first && cluster != last) {
            for info in infos.iter_mut().filter(|info| info.cluster != cluster) {
                info.mask |= bits;
            }
        } else if cluster == first {
            for info in infos.iter_mut().rev().take_while(|info| info.cluster != first) {
                info.mask |= bits;
            }
        } else {
            for info in infos.iter_mut().take_while(|info| info.cluster != last) {
                info.mask |= bits;
            }
        }
    }

    /// Reverses the whole buffer
    pub fn reverse(&mut self) {
        self.info.reverse();
        self.pos.reverse();
    }

    pub fn reverse_range(&mut self, start: usize, end: usize) {
        let end = end.min(self.len());
        if start >= end {
            return;
        }
        self.info[start..end].reverse();
        self.pos[start..end].reverse();
    }

    /// Reverses the buffer while keeping each cluster's internal order
    pub fn reverse_clusters(&mut self) {
        for (start, end) in self.cluster_ranges() {
            self.reverse_range(start, end);
        }
        self.reverse();
    }

    /// Reverses the buffer while keeping each grapheme's internal order
    ///
    /// With `merge` set, each grapheme is merged into one cluster first.
    pub fn reverse_graphemes(&mut self, merge: bool) {
        for (start, end) in self.grapheme_ranges() {
            if merge {
                self.merge_clusters(start, end);
            }
            self.reverse_range(start, end);
        }
        self.reverse();
    }

    /// Removes every glyph matching `predicate`
    ///
    /// A removed glyph that was alone in its cluster hands the cluster to
    /// a neighbour so cluster values still cover the text.
    pub fn delete_glyphs_where<F>(&mut self, mut predicate: F)
    where
        F: FnMut(&GlyphInfo) -> bool,
    {
        let count = self.len();
        let mut j = 0;
        for i in 0..count {
            if predicate(&self.info[i]) {
                let cluster = self.info[i].cluster;
                if i + 1 < count && cluster == self.info[i + 1].cluster {
                    // Cluster survives.
                    continue;
                }

                if j > 0 {
                    // Merge backward.
                    if cluster < self.info[j - 1].cluster {
                        let mask = self.info[i].mask;
                        let old_cluster = self.info[j - 1].cluster;
                        let mut k = j;
                        while k > 0 && self.info[k - 1].cluster == old_cluster {
                            set_cluster(&mut self.info[k - 1], cluster, mask);
                            k -= 1;
                        }
                    }
                    continue;
                }

                if i + 1 < count {
                    // Merge forward.
                    self.merge_clusters(i, i + 2);
                }
                continue;
            }

            if j != i {
                self.info[j] = self.info[i];
                self.pos[j] = self.pos[i];
            }
            j += 1;
        }
        self.info.truncate(j);
        self.pos.truncate(j);
    }

    /// Sorts `[start, end)` stably by `key`, merging the range into one
    /// cluster if anything moved
    pub fn sort_range_by_key<K, F>(&mut self, start: usize, end: usize, mut key: F)
    where
        K: Ord,
        F: FnMut(&GlyphInfo) -> K,
    {
        let end = end.min(self.len());
        if end.saturating_sub(start) < 2 {
            return;
        }
        let mut order: Vec<usize> = (start..end).collect();
        order.sort_by_key(|&i| key(&self.info[i]));
        if order.iter().copied().eq(start..end) {
            return;
        }
        self.merge_clusters(start, end);
        let info: Vec<GlyphInfo> = order.iter().map(|&i| self.info[i]).collect();
        let pos: Vec<GlyphPosition> = order.iter().map(|&i| self.pos[i]).collect();
        self.info[start..end].copy_from_slice(&info);
        self.pos[start..end].copy_from_slice(&pos);
    }
}

/// Moves a glyph into `cluster`; a glyph that changes cluster takes its
/// glyph flags from `mask`
fn set_cluster(info: &mut GlyphInfo, cluster: u32, mask: Mask) {
    if info.cluster != cluster {
        let defined = GlyphFlags::DEFINED.bits();
        info.mask = (info.mask & !defined) | (mask & defined);
    }
    info.cluster = cluster;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unicode::GeneralCategory as Gc;

    struct TinyUnicode;

    impl UnicodeFuncs for TinyUnicode {
        fn general_category(&self, cp: u32) -> Gc {
            match cp {
                0x0300..=0x036F | 0x05B0..=0x05BD => Gc::NonspacingMark,
                0x0030..=0x0039 => Gc::DecimalNumber,
                0x0041..=0x005A => Gc::UppercaseLetter,
                0x0061..=0x007A | 0x00E0..=0x00FF => Gc::LowercaseLetter,
                0x05D0..=0x05EA => Gc::OtherLetter,
                0x200C | 0x200D => Gc::Format,
                0x0020 | 0x2000..=0x200A => Gc::SpaceSeparator,
                _ => Gc::OtherSymbol,
            }
        }

        fn mirroring(&self, cp: u32) -> u32 {
            cp
        }

        fn is_default_ignorable(&self, cp: u32) -> bool {
            matches!(cp, 0x200B..=0x200F | 0x034F)
        }

        fn is_extended_pictographic(&self, _cp: u32) -> bool {
            false
        }

        fn combining_class(&self, cp: u32) -> u8 {
            match cp {
                0x0300..=0x0314 => 230,
                0x0323 => 220,
                _ => 0,
            }
        }

        fn script(&self, cp: u32) -> Script {
            match cp {
                0x05D0..=0x05EA => Script::HEBREW,
                0x0041..=0x007A => Script::LATIN,
                _ => Script::COMMON,
            }
        }
    }

    fn buffer_with_clusters(clusters: &[u32]) -> GlyphBuffer {
        let mut buffer = GlyphBuffer::new();
        for (i, &cluster) in clusters.iter().enumerate() {
            buffer.add(0x41 + i as u32, cluster);
        }
        buffer
    }

    fn clusters(buffer: &GlyphBuffer) -> Vec<u32> {
        buffer.info().iter().map(|info| info.cluster).collect()
    }

    #[test]
    fn test_add_str_uses_byte_offsets() {
        let mut buffer = GlyphBuffer::new();
        buffer.add_str("aé€b");
        assert_eq!(clusters(&buffer), vec![0, 1, 3, 6]);
        assert_eq!(buffer.pos().len(), 4);
    }

    #[test]
    fn test_unicode_props_for_marks() {
        let mut scratch = ScratchFlags::default();
        let mut info = GlyphInfo::new(0x0301, 0);
        info.init_unicode_props(&TinyUnicode, &mut scratch);
        assert!(info.is_unicode_mark());
        assert!(info.is_continuation());
        assert_eq!(info.modified_combining_class(), 230);
        assert!(scratch.contains(ScratchFlags::HAS_NON_ASCII));
    }

    #[test]
    fn test_unicode_props_for_ignorables() {
        let mut scratch = ScratchFlags::default();
        let mut zwnj = GlyphInfo::new(0x200C, 0);
        zwnj.init_unicode_props(&TinyUnicode, &mut scratch);
        assert!(zwnj.is_default_ignorable());
        assert!(zwnj.is_zwnj());
        assert!(!zwnj.is_continuation());
        assert!(scratch.contains(ScratchFlags::HAS_DEFAULT_IGNORABLES));

        let mut cgj = GlyphInfo::new(0x034F, 0);
        cgj.init_unicode_props(&TinyUnicode, &mut scratch);
        assert!(cgj.is_hidden());
        assert!(scratch.contains(ScratchFlags::HAS_CGJ));
    }

    #[test]
    fn test_ascii_sets_no_scratch_flags() {
        let mut scratch = ScratchFlags::default();
        let mut info = GlyphInfo::new('a' as u32, 0);
        info.init_unicode_props(&TinyUnicode, &mut scratch);
        assert_eq!(info.general_category(), Gc::LowercaseLetter);
        assert!(scratch.is_empty());
    }

    #[test]
    fn test_space_fallback_only_on_spaces() {
        let mut scratch = ScratchFlags::default();
        let mut space = GlyphInfo::new(0x2003, 0);
        space.init_unicode_props(&TinyUnicode, &mut scratch);
        space.set_space_fallback(SpaceType::Em);
        assert_eq!(space.space_fallback(), Some(SpaceType::Em));

        let mut letter = GlyphInfo::new('a' as u32, 0);
        letter.init_unicode_props(&TinyUnicode, &mut scratch);
        letter.set_space_fallback(SpaceType::Em);
        assert_eq!(letter.space_fallback(), None);
    }

    #[test]
    fn test_guess_segment_properties() {
        let mut buffer = GlyphBuffer::new();
        buffer.add_str("1 \u{05D0}\u{05D1}");
        buffer.guess_segment_properties(&TinyUnicode);
        assert_eq!(buffer.script(), Some(Script::HEBREW));
        assert_eq!(buffer.direction(), Some(Direction::RightToLeft));

        let mut digits = GlyphBuffer::new();
        digits.add_str("123");
        digits.guess_segment_properties(&TinyUnicode);
        assert_eq!(digits.script(), None);
        assert_eq!(digits.direction(), Some(Direction::LeftToRight));
    }

    #[test]
    fn test_explicit_direction_is_kept() {
        let mut buffer = GlyphBuffer::new();
        buffer.add_str("\u{05D0}");
        buffer.set_direction(Direction::LeftToRight);
        buffer.guess_segment_properties(&TinyUnicode);
        assert_eq!(buffer.direction(), Some(Direction::LeftToRight));
    }

    #[test]
    fn test_merge_clusters_takes_minimum() {
        let mut buffer = buffer_with_clusters(&[0, 1, 2, 3]);
        buffer.merge_clusters(1, 3);
        assert_eq!(clusters(&buffer), vec![0, 1, 1, 3]);
    }

    #[test]
    fn test_merge_clusters_extends_over_split_clusters() {
        let mut buffer = buffer_with_clusters(&[0, 1, 2, 2, 3]);
        buffer.merge_clusters(1, 3);
        assert_eq!(clusters(&buffer), vec![0, 1, 1, 1, 3]);
    }

    #[test]
    fn test_merge_clusters_at_character_level_only_flags() {
        let mut buffer = buffer_with_clusters(&[0, 1, 2]);
        buffer.cluster_level = ClusterLevel::Characters;
        buffer.merge_clusters(0, 3);
        assert_eq!(clusters(&buffer), vec![0, 1, 2]);
        assert!(buffer.info()[1].glyph_flags().contains(GlyphFlags::UNSAFE_TO_BREAK));
    }

    #[test]
    fn test_unsafe_to_break_skips_single_glyph() {
        let mut buffer = buffer_with_clusters(&[0, 1]);
        buffer.unsafe_to_break(0, 1);
        assert!(buffer.info().iter().all(|info| info.glyph_flags().is_empty()));
        assert!(!buffer.scratch_flags.contains(ScratchFlags::HAS_UNSAFE_TO_BREAK));
    }

    #[test]
    fn test_unsafe_to_break_flags_later_clusters() {
        let mut buffer = buffer_with_clusters(&[0, 1, 2]);
        buffer.unsafe_to_break(0, 3);
        let flagged: Vec<bool> = buffer
            .info()
            .iter()
            .map(|info| info.glyph_flags().contains(GlyphFlags::UNSAFE_TO_BREAK))
            .collect();
        assert_eq!(flagged, vec![false, true, true]);
        assert!(buffer.scratch_flags.contains(ScratchFlags::HAS_UNSAFE_TO_BREAK));
    }

    #[test]
    fn test_unsafe_to_concat_needs_opt_in() {
        let mut buffer = buffer_with_clusters(&[0, 1]);
        buffer.unsafe_to_concat(0, 2);
        assert!(buffer.info().iter().all(|info| info.glyph_flags().is_empty()));

        buffer.flags |= BufferFlags::PRODUCE_UNSAFE_TO_CONCAT;
        buffer.unsafe_to_concat(0, 2);
        assert!(buffer
            .info()
            .iter()
            .all(|info| info.glyph_flags() == GlyphFlags::UNSAFE_TO_CONCAT));
    }

    #[test]
    fn test_set_masks_respects_range() {
        let mut buffer = buffer_with_clusters(&[0, 1, 2, 3]);
        buffer.reset_masks(0x8000_0000);
        buffer.set_masks(0x10, 0x30, 1, 3);
        let masks: Vec<u32> = buffer.info().iter().map(|info| info.mask).collect();
        assert_eq!(masks, vec![0x8000_0000, 0x8000_0010, 0x8000_0010, 0x8000_0000]);
    }

    #[test]
    fn test_reset_masks_keeps_glyph_flags() {
        let mut buffer = buffer_with_clusters(&[0, 1]);
        buffer.unsafe_to_break(0, 2);
        buffer.reset_masks(0x8000_0000);
        assert_eq!(buffer.info()[1].mask, 0x8000_0000 | GlyphFlags::DEFINED.bits());
        assert_eq!(buffer.info()[0].mask, 0x8000_0000);
    }

    #[test]
    fn test_reverse_keeps_positions_aligned() {
        let mut buffer = buffer_with_clusters(&[0, 1, 2]);
        for (i, pos) in buffer.pos_mut().iter_mut().enumerate() {
            pos.x_advance = i as i32 * 100;
        }
        buffer.reverse();
        assert_eq!(clusters(&buffer), vec![2, 1, 0]);
        let advances: Vec<i32> = buffer.pos().iter().map(|p| p.x_advance).collect();
        assert_eq!(advances, vec![200, 100, 0]);
    }

    #[test]
    fn test_reverse_graphemes_keeps_grapheme_order() {
        let mut buffer = GlyphBuffer::new();
        buffer.add_str("a\u{0301}b");
        let mut scratch = ScratchFlags::default();
        for info in buffer.info_mut() {
            info.init_unicode_props(&TinyUnicode, &mut scratch);
        }
        buffer.reverse_graphemes(false);
        let cps: Vec<u32> = buffer.info().iter().map(|info| info.codepoint).collect();
        assert_eq!(cps, vec!['b' as u32, 'a' as u32, 0x0301]);
    }

    #[test]
    fn test_reverse_clusters() {
        let mut buffer = buffer_with_clusters(&[0, 0, 1]);
        buffer.reverse_clusters();
        let cps: Vec<u32> = buffer.info().iter().map(|info| info.codepoint).collect();
        assert_eq!(cps, vec![0x43, 0x41, 0x42]);
    }

    #[test]
    fn test_delete_merges_lonely_cluster_backward() {
        let mut buffer = buffer_with_clusters(&[0, 1, 2]);
        buffer.delete_glyphs_where(|info| info.cluster == 2);
        assert_eq!(clusters(&buffer), vec![0, 1]);

        let mut buffer = buffer_with_clusters(&[0, 5, 3]);
        buffer.cluster_level = ClusterLevel::Characters;
        buffer.delete_glyphs_where(|info| info.cluster == 3);
        assert_eq!(clusters(&buffer), vec![0, 3]);
    }

    #[test]
    fn test_delete_first_glyph_merges_forward() {
        let mut buffer = buffer_with_clusters(&[0, 1, 2]);
        buffer.delete_glyphs_where(|info| info.codepoint == 0x41);
        assert_eq!(clusters(&buffer), vec![0, 2]);
        assert_eq!(buffer.pos().len(), 2);
    }

    #[test]
    fn test_delete_inside_cluster_keeps_cluster() {
        let mut buffer = buffer_with_clusters(&[0, 0, 1]);
        buffer.delete_glyphs_where(|info| info.codepoint == 0x41);
        assert_eq!(clusters(&buffer), vec![0, 1]);
    }

    #[test]
    fn test_insert_respects_max_len() {
        let mut buffer = buffer_with_clusters(&[0]);
        buffer.set_limits(BufferLimits {
            max_len_factor: 1,
            max_len_min: 1,
            ..BufferLimits::default()
        });
        buffer.begin_guarded();
        assert!(!buffer.insert(0, GlyphInfo::new(0x25CC, 0)));
        buffer.end_guarded();
        assert!(buffer.insert(0, GlyphInfo::new(0x25CC, 0)));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.pos().len(), 2);
    }

    #[test]
    fn test_replace_with_inherits_cluster() {
        let mut buffer = buffer_with_clusters(&[0, 4]);
        buffer.info_mut()[0].mask = 7;
        assert!(buffer.replace_with(0, &[0x65, 0x301]));
        assert_eq!(clusters(&buffer), vec![0, 0, 4]);
        assert_eq!(buffer.info()[1].mask, 7);
        assert_eq!(buffer.pos().len(), 3);
    }

    #[test]
    fn test_ops_budget() {
        let mut buffer = buffer_with_clusters(&[0]);
        buffer.begin_guarded();
        assert_eq!(buffer.max_ops(), 16384);
        assert!(buffer.consume_ops(100));
        assert!(!buffer.consume_ops(20000));
        assert!(buffer.ops_exhausted());
        buffer.end_guarded();
        assert_eq!(buffer.max_ops(), MAX_OPS_DEFAULT);
    }

    #[test]
    fn test_sort_range_merges_when_reordered() {
        let mut buffer = buffer_with_clusters(&[0, 1, 2]);
        buffer.sort_range_by_key(0, 3, |info| std::cmp::Reverse(info.codepoint));
        let cps: Vec<u32> = buffer.info().iter().map(|info| info.codepoint).collect();
        assert_eq!(cps, vec![0x43, 0x42, 0x41]);
        assert_eq!(clusters(&buffer), vec![0, 0, 0]);

        let mut sorted = buffer_with_clusters(&[0, 1, 2]);
        sorted.sort_range_by_key(0, 3, |info| info.codepoint);
        assert_eq!(clusters(&sorted), vec![0, 1, 2]);
    }

    #[test]
    fn test_context_is_bounded() {
        let mut buffer = GlyphBuffer::new();
        buffer.set_pre_context("abcdefgh");
        buffer.set_post_context("ijklmnop");
        assert_eq!(buffer.pre_context().len(), CONTEXT_LENGTH);
        assert_eq!(buffer.pre_context().last(), Some(&('h' as u32)));
        assert_eq!(buffer.post_context().first(), Some(&('i' as u32)));
    }
}
