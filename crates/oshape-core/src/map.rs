//! Feature registration and mask allocation
//!
//! Every feature the planner registers gets its own slice of the 32-bit
//! glyph mask. Lookups later only touch glyphs whose mask intersects their
//! feature's slice, which is how ranged user features and script-specific
//! masks stay scoped.
//!
//! The layout of a mask:
//!
//! | bits | owner |
//! |---|---|
//! | 0..2 | glyph flags (unsafe to break / concat) |
//! | 2..31 | per-feature value slices, allocated in tag order |
//! | 31 | the shared global bit for on/off global features |
//!
//! Registration is an ordered list of features and pauses. A pause splits
//! lookup application into stages and may carry a callback that runs
//! between them.

use std::any::Any;

use bitflags::bitflags;

use crate::buffer::GlyphBuffer;
use crate::traits::{FeatureSearch, Font};
use crate::types::{Feature, Mask, SegmentProperties, Tag};

/// Most bits a single feature value may occupy
pub const MAX_BITS: u32 = 8;

/// Largest feature value that fits in [`MAX_BITS`]
pub const MAX_VALUE: u32 = (1 << MAX_BITS) - 1;

const GLOBAL_BIT_SHIFT: u32 = Mask::BITS - 1;
const GLOBAL_BIT_MASK: Mask = 1 << GLOBAL_BIT_SHIFT;

/// First bit available to features; the ones below hold glyph flags
const FIRST_FEATURE_BIT: u32 = crate::buffer::GlyphFlags::DEFINED.bits().count_ones();

/// The two layout tables lookups come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableIndex {
    Gsub = 0,
    Gpos = 1,
}

impl TableIndex {
    pub const ALL: [TableIndex; 2] = [TableIndex::Gsub, TableIndex::Gpos];

    pub fn tag(self) -> Tag {
        match self {
            TableIndex::Gsub => Tag::new(b"GSUB"),
            TableIndex::Gpos => Tag::new(b"GPOS"),
        }
    }
}

bitflags! {
    /// Scoping policy for a registered feature
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FeatureFlags: u32 {
        /// Applies to the whole buffer unless a ranged request narrows it
        const GLOBAL = 0x01;
        /// Kept even when the font lacks it; the shaper has a fallback
        const HAS_FALLBACK = 0x02;
        const MANUAL_ZWNJ = 0x04;
        const MANUAL_ZWJ = 0x08;
        const MANUAL_JOINERS = Self::MANUAL_ZWNJ.bits() | Self::MANUAL_ZWJ.bits();
        const GLOBAL_MANUAL_JOINERS = Self::GLOBAL.bits() | Self::MANUAL_JOINERS.bits();
        const GLOBAL_HAS_FALLBACK = Self::GLOBAL.bits() | Self::HAS_FALLBACK.bits();
        /// Look for the feature in every script when the chosen one lacks it
        const GLOBAL_SEARCH = 0x10;
        /// Each application picks a random alternate
        const RANDOM = 0x20;
        const PER_SYLLABLE = 0x40;
    }
}

/// Callback run between two lookup stages
///
/// The first argument is the shape plan driving the application, passed
/// opaquely so shapers can downcast to their own plan data.
pub type PauseFn = fn(&dyn Any, &dyn Font, &mut GlyphBuffer);

/// One entry of the registration list
#[derive(Clone, Copy)]
pub enum MapItem {
    Feature(FeatureRequest),
    Pause(TableIndex, Option<PauseFn>),
}

impl std::fmt::Debug for MapItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapItem::Feature(request) => f.debug_tuple("Feature").field(request).finish(),
            MapItem::Pause(table, callback) => f
                .debug_tuple("Pause")
                .field(table)
                .field(&callback.is_some())
                .finish(),
        }
    }
}

/// A feature as registered, before merging and allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureRequest {
    pub tag: Tag,
    pub flags: FeatureFlags,
    pub max_value: u32,
    pub default_value: u32,
}

#[derive(Debug, Clone, Copy)]
struct FeatureInfo {
    tag: Tag,
    seq: usize,
    max_value: u32,
    flags: FeatureFlags,
    default_value: u32,
    stage: [usize; 2],
}

/// Collects features and pauses, then compiles them into a [`FeatureMap`]
#[derive(Debug)]
pub struct FeatureMapBuilder {
    props: SegmentProperties,
    chosen_script: [Option<Tag>; 2],
    found_script: [bool; 2],
    items: Vec<MapItem>,
}

impl FeatureMapBuilder {
    pub fn new(font: &dyn Font, props: &SegmentProperties) -> Self {
        let mut chosen_script = [None; 2];
        let mut found_script = [false; 2];
        for table in TableIndex::ALL {
            if let Some((tag, found)) = font.select_script(table, props.script) {
                chosen_script[table as usize] = Some(tag);
                found_script[table as usize] = found;
            }
        }

        Self {
            props: props.clone(),
            chosen_script,
            found_script,
            items: Vec::new(),
        }
    }

    pub fn props(&self) -> &SegmentProperties {
        &self.props
    }

    /// The script tag the table will be applied under
    pub fn chosen_script(&self, table: TableIndex) -> Option<Tag> {
        self.chosen_script[table as usize]
    }

    /// Registers a feature; non-global features default to off
    pub fn add_feature(&mut self, tag: Tag, flags: FeatureFlags, value: u32) {
        if tag == Tag::default() {
            return;
        }
        let default_value = if flags.contains(FeatureFlags::GLOBAL) { value } else { 0 };
        self.items.push(MapItem::Feature(FeatureRequest {
            tag,
            flags,
            max_value: value,
            default_value,
        }));
    }

    /// Registers a feature that is on across the whole buffer
    pub fn enable_feature(&mut self, tag: Tag, flags: FeatureFlags, value: u32) {
        self.add_feature(tag, flags | FeatureFlags::GLOBAL, value);
    }

    pub fn disable_feature(&mut self, tag: Tag) {
        self.add_feature(tag, FeatureFlags::GLOBAL, 0);
    }

    pub fn add_gsub_pause(&mut self, pause: Option<PauseFn>) {
        self.items.push(MapItem::Pause(TableIndex::Gsub, pause));
    }

    pub fn add_gpos_pause(&mut self, pause: Option<PauseFn>) {
        self.items.push(MapItem::Pause(TableIndex::Gpos, pause));
    }

    pub fn items(&self) -> &[MapItem] {
        &self.items
    }

    /// Whether `tag` has been registered so far
    pub fn has_feature(&self, tag: Tag) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, MapItem::Feature(request) if request.tag == tag))
    }

    /// Merges duplicate registrations, allocates mask bits and gathers
    /// lookups per stage
    pub fn compile(&self, font: &dyn Font) -> FeatureMap {
        let mut map = FeatureMap {
            global_mask: GLOBAL_BIT_MASK,
            features: Vec::new(),
            lookups: [Vec::new(), Vec::new()],
            stages: [Vec::new(), Vec::new()],
            chosen_script: self.chosen_script,
            found_script: self.found_script,
        };

        // Stage numbers fall out of the position of pauses in the list.
        let mut current_stage = [0usize; 2];
        let mut infos = Vec::new();
        let mut pauses: [Vec<(usize, Option<PauseFn>)>; 2] = [Vec::new(), Vec::new()];
        for item in &self.items {
            match *item {
                MapItem::Feature(request) => infos.push(FeatureInfo {
                    tag: request.tag,
                    seq: infos.len(),
                    max_value: request.max_value,
                    flags: request.flags,
                    default_value: request.default_value,
                    stage: current_stage,
                }),
                MapItem::Pause(table, callback) => {
                    pauses[table as usize].push((current_stage[table as usize], callback));
                    current_stage[table as usize] += 1;
                },
            }
        }
        // Closing stage for each table.
        for table in TableIndex::ALL {
            pauses[table as usize].push((current_stage[table as usize], None));
            current_stage[table as usize] += 1;
        }

        let infos = merge_duplicates(infos);

        let mut next_bit = FIRST_FEATURE_BIT;
        let mut feature_lookups: Vec<[Vec<u16>; 2]> = Vec::new();
        for info in &infos {
            let uses_global_bit = info.flags.contains(FeatureFlags::GLOBAL) && info.max_value == 1;
            let bits_needed = if uses_global_bit {
                0
            } else {
                bit_storage(info.max_value).min(MAX_BITS)
            };

            if info.max_value == 0 || next_bit + bits_needed >= GLOBAL_BIT_SHIFT {
                // Disabled, or out of bits.
                continue;
            }

            let mut found = [false; 2];
            let mut lookups: [Vec<u16>; 2] = [Vec::new(), Vec::new()];
            for table in TableIndex::ALL {
                let Some(script) = self.chosen_script[table as usize] else {
                    continue;
                };
                let search = FeatureSearch::LanguageSystem {
                    script,
                    language: self.props.language.as_ref(),
                };
                if let Some(indices) = font.feature_lookups(table, search, info.tag) {
                    found[table as usize] = true;
                    lookups[table as usize] = indices;
                }
            }

            if !found.iter().any(|&f| f) && info.flags.contains(FeatureFlags::GLOBAL_SEARCH) {
                for table in TableIndex::ALL {
                    if let Some(indices) = font.feature_lookups(table, FeatureSearch::Anywhere, info.tag) {
                        found[table as usize] = true;
                        lookups[table as usize] = indices;
                    }
                }
            }

            let any_found = found.iter().any(|&f| f);
            if !any_found && !info.flags.contains(FeatureFlags::HAS_FALLBACK) {
                continue;
            }

            let (shift, mask) = if uses_global_bit {
                (GLOBAL_BIT_SHIFT, GLOBAL_BIT_MASK)
            } else {
                let shift = next_bit;
                let mask = (1 << (next_bit + bits_needed)) - (1 << next_bit);
                next_bit += bits_needed;
                map.global_mask |= (info.default_value << shift) & mask;
                (shift, mask)
            };

            map.features.push(FeatureMapEntry {
                tag: info.tag,
                stage: info.stage,
                shift,
                mask,
                one_mask: (1 << shift) & mask,
                found,
                needs_fallback: !any_found,
                auto_zwnj: !info.flags.contains(FeatureFlags::MANUAL_ZWNJ),
                auto_zwj: !info.flags.contains(FeatureFlags::MANUAL_ZWJ),
                random: info.flags.contains(FeatureFlags::RANDOM),
                per_syllable: info.flags.contains(FeatureFlags::PER_SYLLABLE),
            });
            feature_lookups.push(lookups);
        }

        for table in TableIndex::ALL {
            let t = table as usize;
            let mut stage_index = 0;
            let mut last_num_lookups = 0;
            for stage in 0..current_stage[t] {
                for (feature, lookups) in map.features.iter().zip(&feature_lookups) {
                    if feature.stage[t] != stage {
                        continue;
                    }
                    map.lookups[t].extend(lookups[t].iter().map(|&index| LookupMap {
                        index,
                        mask: feature.mask,
                        auto_zwnj: feature.auto_zwnj,
                        auto_zwj: feature.auto_zwj,
                        random: feature.random,
                        per_syllable: feature.per_syllable,
                        feature_tag: feature.tag,
                    }));
                }

                merge_lookups(&mut map.lookups[t], last_num_lookups);
                last_num_lookups = map.lookups[t].len();

                if let Some(&(index, pause)) = pauses[t].get(stage_index) {
                    if index == stage {
                        map.stages[t].push(StageMap {
                            last_lookup: last_num_lookups,
                            pause,
                        });
                        stage_index += 1;
                    }
                }
            }
        }

        log::debug!(
            "Compiled feature map: {} features, {}+{} lookups, global mask {:#010x}",
            map.features.len(),
            map.lookups[0].len(),
            map.lookups[1].len(),
            map.global_mask
        );
        map
    }
}

/// Sorts by tag and folds repeated registrations of one tag together
fn merge_duplicates(mut infos: Vec<FeatureInfo>) -> Vec<FeatureInfo> {
    infos.sort_by_key(|info| (info.tag, info.seq));
    let mut merged: Vec<FeatureInfo> = Vec::with_capacity(infos.len());
    for info in infos {
        let Some(last) = merged.last_mut().filter(|last| last.tag == info.tag) else {
            merged.push(info);
            continue;
        };
        if info.flags.contains(FeatureFlags::GLOBAL) {
            last.flags |= FeatureFlags::GLOBAL;
            last.max_value = info.max_value;
            last.default_value = info.default_value;
        } else {
            last.flags.remove(FeatureFlags::GLOBAL);
            last.max_value = last.max_value.max(info.max_value);
            // Default value stays with the earlier registration.
        }
        last.flags |= info.flags & FeatureFlags::HAS_FALLBACK;
        last.stage[0] = last.stage[0].min(info.stage[0]);
        last.stage[1] = last.stage[1].min(info.stage[1]);
    }
    merged
}

/// Sorts the lookups added since `from` and merges repeats of one index
fn merge_lookups(lookups: &mut Vec<LookupMap>, from: usize) {
    if from + 1 >= lookups.len() {
        return;
    }
    lookups[from..].sort_by_key(|lookup| lookup.index);
    let mut j = from;
    for i in from + 1..lookups.len() {
        if lookups[i].index != lookups[j].index {
            j += 1;
            lookups[j] = lookups[i];
        } else {
            let other = lookups[i];
            let kept = &mut lookups[j];
            kept.mask |= other.mask;
            kept.auto_zwnj &= other.auto_zwnj;
            kept.auto_zwj &= other.auto_zwj;
        }
    }
    lookups.truncate(j + 1);
}

fn bit_storage(value: u32) -> u32 {
    u32::BITS - value.leading_zeros()
}

/// A compiled feature: where its value lives in the glyph mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureMapEntry {
    pub tag: Tag,
    pub stage: [usize; 2],
    pub shift: u32,
    pub mask: Mask,
    /// The mask value meaning "on" (value 1)
    pub one_mask: Mask,
    /// Found in the font's GSUB / GPOS
    pub found: [bool; 2],
    /// Kept only because the shaper can fake it
    pub needs_fallback: bool,
    pub auto_zwnj: bool,
    pub auto_zwj: bool,
    pub random: bool,
    pub per_syllable: bool,
}

/// A lookup scheduled for application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupMap {
    pub index: u16,
    /// Glyphs whose mask intersects this are eligible
    pub mask: Mask,
    pub auto_zwnj: bool,
    pub auto_zwj: bool,
    pub random: bool,
    pub per_syllable: bool,
    pub feature_tag: Tag,
}

/// End of a stage's lookups, plus what runs after them
#[derive(Clone, Copy)]
pub struct StageMap {
    pub last_lookup: usize,
    pub pause: Option<PauseFn>,
}

impl std::fmt::Debug for StageMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageMap")
            .field("last_lookup", &self.last_lookup)
            .field("pause", &self.pause.is_some())
            .finish()
    }
}

/// The compiled, immutable result of [`FeatureMapBuilder::compile`]
#[derive(Debug, Clone)]
pub struct FeatureMap {
    global_mask: Mask,
    features: Vec<FeatureMapEntry>,
    lookups: [Vec<LookupMap>; 2],
    stages: [Vec<StageMap>; 2],
    chosen_script: [Option<Tag>; 2],
    found_script: [bool; 2],
}

impl FeatureMap {
    pub fn global_mask(&self) -> Mask {
        self.global_mask
    }

    pub fn features(&self) -> &[FeatureMapEntry] {
        &self.features
    }

    pub fn feature(&self, tag: Tag) -> Option<&FeatureMapEntry> {
        self.features
            .binary_search_by_key(&tag, |entry| entry.tag)
            .ok()
            .map(|i| &self.features[i])
    }

    /// `(mask, shift)` for `tag`; `(0, 0)` when it was dropped
    pub fn mask(&self, tag: Tag) -> (Mask, u32) {
        self.feature(tag).map_or((0, 0), |entry| (entry.mask, entry.shift))
    }

    pub fn one_mask(&self, tag: Tag) -> Mask {
        self.feature(tag).map_or(0, |entry| entry.one_mask)
    }

    pub fn needs_fallback(&self, tag: Tag) -> bool {
        self.feature(tag).is_some_and(|entry| entry.needs_fallback)
    }

    /// Whether the font's `table` has `tag` at all
    pub fn has_feature_in(&self, table: TableIndex, tag: Tag) -> bool {
        self.feature(tag).is_some_and(|entry| entry.found[table as usize])
    }

    pub fn chosen_script(&self, table: TableIndex) -> Option<Tag> {
        self.chosen_script[table as usize]
    }

    pub fn found_script(&self, table: TableIndex) -> bool {
        self.found_script[table as usize]
    }

    pub fn lookups(&self, table: TableIndex) -> &[LookupMap] {
        &self.lookups[table as usize]
    }

    pub fn stages(&self, table: TableIndex) -> &[StageMap] {
        &self.stages[table as usize]
    }

    /// Every lookup index compiled for `table`, sorted and deduplicated
    pub fn collect_lookups(&self, table: TableIndex) -> Vec<u16> {
        let mut indices: Vec<u16> = self.lookups[table as usize].iter().map(|l| l.index).collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Applies `table` stage by stage, running pause callbacks in between
    ///
    /// Lookups stop being applied once the buffer's op budget runs out.
    pub fn apply(&self, table: TableIndex, plan: &dyn Any, font: &dyn Font, buffer: &mut GlyphBuffer) {
        let lookups = &self.lookups[table as usize];
        let mut i = 0;
        for stage in &self.stages[table as usize] {
            while i < stage.last_lookup {
                if buffer.ops_exhausted() {
                    log::debug!("Op budget exhausted, skipping remaining {:?} lookups", table);
                    return;
                }
                font.apply_lookup(table, &lookups[i], buffer);
                i += 1;
            }
            if let Some(pause) = stage.pause {
                pause(plan, font, buffer);
            }
        }
    }
}

/// Feature list for the alternate-format substitution backend
///
/// That backend selects features by range directly, so there is no mask
/// allocation: the list is just sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AltFeatureMap {
    features: Vec<Feature>,
}

impl AltFeatureMap {
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AltFeatureMapBuilder {
    features: Vec<Feature>,
}

impl AltFeatureMapBuilder {
    pub fn add_feature(&mut self, feature: &Feature) {
        self.features.push(*feature);
    }

    /// Later requests for the same tag and range win
    pub fn compile(&self) -> AltFeatureMap {
        let mut features: Vec<(usize, Feature)> = self.features.iter().copied().enumerate().collect();
        features.sort_by_key(|(seq, f)| (f.tag, f.start, f.end, std::cmp::Reverse(*seq)));
        features.dedup_by_key(|(_, f)| (f.tag, f.start, f.end));
        AltFeatureMap {
            features: features.into_iter().map(|(_, f)| f).collect(),
        }
    }
}
