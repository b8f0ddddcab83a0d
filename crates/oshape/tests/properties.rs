//! Properties every shaping run must keep, over random mixed-script text

mod common;

use common::{buffer_for, MockFont};
use oshape::prelude::*;
use proptest::prelude::*;

const ALPHABET: &[char] = &[
    'a', 'b', 'Z', ' ', '1', '7', '(', '\u{00E9}', '\u{0301}', '\u{0327}', '\u{034F}', '\u{05D0}', '\u{05D1}',
    '\u{05B4}', '\u{05BC}', '\u{200D}', '\u{2044}', '\u{1F1EB}', '\u{1F1F7}', '\u{1F44B}', '\u{1F3FD}',
];

const FEATURE_TAGS: &[&[u8; 4]] = &[b"liga", b"smcp", b"ss01", b"salt", b"aalt", b"onum", b"frac"];

fn text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(ALPHABET), 0..24).prop_map(|chars| chars.into_iter().collect())
}

fn direction() -> impl Strategy<Value = Direction> {
    prop::sample::select(vec![
        Direction::LeftToRight,
        Direction::RightToLeft,
        Direction::TopToBottom,
        Direction::BottomToTop,
    ])
}

fn script() -> impl Strategy<Value = Script> {
    prop::sample::select(vec![Script::LATIN, Script::HEBREW])
}

fn cluster_level() -> impl Strategy<Value = ClusterLevel> {
    prop::sample::select(vec![
        ClusterLevel::MonotoneGraphemes,
        ClusterLevel::MonotoneCharacters,
        ClusterLevel::Characters,
    ])
}

fn feature() -> impl Strategy<Value = Feature> {
    (prop::sample::select(FEATURE_TAGS), 0u32..5, any::<bool>()).prop_map(|(tag, value, global)| {
        if global {
            Feature::global(Tag::new(tag), value)
        } else {
            Feature::new(Tag::new(tag), value, 2..5)
        }
    })
}

fn shaped(text: &str, direction: Direction, script: Script, level: ClusterLevel) -> GlyphBuffer {
    let font = MockFont::new();
    let mut buffer = buffer_for(text, direction, script);
    buffer.cluster_level = level;
    let plan = compile_plan(&font, &buffer.segment_properties(), &[]).expect("plan compiles");
    shape(&plan, &font, &mut buffer, &[]);
    buffer
}

proptest! {
    #[test]
    fn prop_direction_restored(text in text(), direction in direction(), script in script()) {
        let buffer = shaped(&text, direction, script, ClusterLevel::MonotoneGraphemes);
        prop_assert_eq!(buffer.direction(), Some(direction));
    }
}

proptest! {
    #[test]
    fn prop_feature_masks_disjoint(features in prop::collection::vec(feature(), 0..8)) {
        let font = MockFont::with_gsub(FEATURE_TAGS);
        let props = SegmentProperties::new(Direction::LeftToRight, Some(Script::LATIN), None);
        let plan = compile_plan(&font, &props, &features).expect("plan compiles");

        let global_bit = 1u32 << 31;
        let entries: Vec<_> = plan
            .map()
            .features()
            .iter()
            .filter(|entry| entry.mask != 0 && entry.mask != global_bit)
            .collect();

        for (i, a) in entries.iter().enumerate() {
            // The low bits belong to the glyph flags.
            prop_assert_eq!(a.mask & GlyphFlags::DEFINED.bits(), 0);
            prop_assert_eq!(a.mask & global_bit, 0);
            for b in &entries[i + 1..] {
                prop_assert_eq!(a.mask & b.mask, 0, "{} and {} overlap", a.tag, b.tag);
            }
        }
    }
}

proptest! {
    #[test]
    fn prop_clusters_monotone(text in text(), direction in direction(), script in script()) {
        let buffer = shaped(&text, direction, script, ClusterLevel::MonotoneGraphemes);
        let clusters: Vec<u32> = buffer.info().iter().map(|info| info.cluster).collect();
        // Visual order of a backward run lists clusters from the end.
        let monotone = if direction.is_backward() {
            clusters.windows(2).all(|w| w[0] >= w[1])
        } else {
            clusters.windows(2).all(|w| w[0] <= w[1])
        };
        prop_assert!(monotone, "clusters {:?}", clusters);
    }
}

proptest! {
    #[test]
    fn prop_unsafe_flags_cover_clusters(
        text in text(),
        direction in direction(),
        script in script(),
        level in cluster_level(),
    ) {
        let buffer = shaped(&text, direction, script, level);
        let info = buffer.info();
        let mut start = 0;
        while start < info.len() {
            let end = (start..info.len())
                .find(|&i| info[i].cluster != info[start].cluster)
                .unwrap_or(info.len());
            let flags = info[start].glyph_flags();
            for glyph in &info[start..end] {
                prop_assert_eq!(glyph.glyph_flags(), flags);
            }
            start = end;
        }
    }
}
