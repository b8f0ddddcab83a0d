//! Oshape Core: the vocabulary every shaping stage speaks
//!
//! Shaping turns characters into positioned glyphs. This crate holds the
//! pieces that stay the same no matter which font or script is involved:
//!
//! - [`types`] - tags, directions, scripts, languages, feature requests
//! - [`buffer::GlyphBuffer`] - the single mutable record of a run being shaped
//! - [`map`] - feature registration and disjoint mask allocation
//! - [`traits::Font`] / [`traits::UnicodeFuncs`] - what the shaper needs from
//!   its collaborators
//! - [`limits`] - work budgets that keep hostile fonts in check
//!
//! The orchestration itself (planning, the pipeline, fallbacks) lives in
//! the `oshape` crate.
//!
//! ```
//! use oshape_core::types::{Direction, Feature, Tag};
//!
//! let kern: Feature = "-kern".parse()?;
//! assert_eq!(kern.tag, Tag::new(b"kern"));
//! assert_eq!(kern.value, 0);
//! assert!(kern.is_global());
//! assert!(Direction::RightToLeft.is_backward());
//! # Ok::<(), oshape_core::error::FeatureParseError>(())
//! ```

pub mod buffer;
pub mod error;
pub mod limits;
pub mod map;
pub mod traits;
pub mod unicode;

pub use buffer::{GlyphBuffer, GlyphInfo, GlyphPosition};
pub use error::{OshapeError, Result};
pub use map::{FeatureFlags, FeatureMap, FeatureMapBuilder, TableIndex};
pub use traits::{Font, UnicodeFuncs};

/// The data structures shared by every stage
pub mod types {
    use std::fmt;
    use std::str::FromStr;

    use crate::error::FeatureParseError;

    /// Glyph index within a font
    pub type GlyphId = u32;

    /// Per-glyph feature bitset
    pub type Mask = u32;

    /// A four-byte OpenType tag such as `kern` or `latn`
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct Tag(pub u32);

    impl Tag {
        pub const fn new(bytes: &[u8; 4]) -> Self {
            Tag(u32::from_be_bytes(*bytes))
        }

        pub const fn to_bytes(self) -> [u8; 4] {
            self.0.to_be_bytes()
        }

        /// Builds a tag from up to four ASCII bytes, padding with spaces
        pub fn from_bytes_lossy(bytes: &[u8]) -> Self {
            let mut out = [b' '; 4];
            for (slot, &b) in out.iter_mut().zip(bytes.iter()) {
                *slot = b;
            }
            Tag(u32::from_be_bytes(out))
        }

        pub fn to_lowercase(self) -> Self {
            Tag(u32::from_be_bytes(self.to_bytes().map(|b| b.to_ascii_lowercase())))
        }

        pub fn to_uppercase(self) -> Self {
            Tag(u32::from_be_bytes(self.to_bytes().map(|b| b.to_ascii_uppercase())))
        }
    }

    impl fmt::Display for Tag {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for b in self.to_bytes() {
                let c = if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' };
                write!(f, "{}", c)?;
            }
            Ok(())
        }
    }

    impl fmt::Debug for Tag {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Tag({})", self)
        }
    }

    impl FromStr for Tag {
        type Err = FeatureParseError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            if s.is_empty() || s.len() > 4 || !s.is_ascii() {
                return Err(FeatureParseError::InvalidTag(s.to_string()));
            }
            Ok(Tag::from_bytes_lossy(s.as_bytes()))
        }
    }

    /// Which way the text flows
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Direction {
        LeftToRight,
        RightToLeft,
        TopToBottom,
        BottomToTop,
    }

    impl Direction {
        pub fn is_horizontal(self) -> bool {
            matches!(self, Direction::LeftToRight | Direction::RightToLeft)
        }

        pub fn is_vertical(self) -> bool {
            !self.is_horizontal()
        }

        pub fn is_forward(self) -> bool {
            matches!(self, Direction::LeftToRight | Direction::TopToBottom)
        }

        pub fn is_backward(self) -> bool {
            !self.is_forward()
        }

        /// The opposite direction on the same axis
        pub fn reverse(self) -> Self {
            match self {
                Direction::LeftToRight => Direction::RightToLeft,
                Direction::RightToLeft => Direction::LeftToRight,
                Direction::TopToBottom => Direction::BottomToTop,
                Direction::BottomToTop => Direction::TopToBottom,
            }
        }
    }

    impl FromStr for Direction {
        type Err = FeatureParseError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.to_ascii_lowercase().as_str() {
                "ltr" | "l" => Ok(Direction::LeftToRight),
                "rtl" | "r" => Ok(Direction::RightToLeft),
                "ttb" | "t" => Ok(Direction::TopToBottom),
                "btt" | "b" => Ok(Direction::BottomToTop),
                _ => Err(FeatureParseError::InvalidDirection(s.to_string())),
            }
        }
    }

    /// An ISO 15924 script, stored as its four-letter tag (`Arab`, `Latn`)
    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Script(pub Tag);

    impl Script {
        pub const ADLAM: Script = Script::new(b"Adlm");
        pub const ARABIC: Script = Script::new(b"Arab");
        pub const AVESTAN: Script = Script::new(b"Avst");
        pub const CHORASMIAN: Script = Script::new(b"Chrs");
        pub const COMMON: Script = Script::new(b"Zyyy");
        pub const CYPRIOT: Script = Script::new(b"Cprt");
        pub const CYRILLIC: Script = Script::new(b"Cyrl");
        pub const DEVANAGARI: Script = Script::new(b"Deva");
        pub const ELYMAIC: Script = Script::new(b"Elym");
        pub const GREEK: Script = Script::new(b"Grek");
        pub const HAN: Script = Script::new(b"Hani");
        pub const HANGUL: Script = Script::new(b"Hang");
        pub const HATRAN: Script = Script::new(b"Hatr");
        pub const HEBREW: Script = Script::new(b"Hebr");
        pub const HIRAGANA: Script = Script::new(b"Hira");
        pub const IMPERIAL_ARAMAIC: Script = Script::new(b"Armi");
        pub const INHERITED: Script = Script::new(b"Zinh");
        pub const INSCRIPTIONAL_PAHLAVI: Script = Script::new(b"Phli");
        pub const INSCRIPTIONAL_PARTHIAN: Script = Script::new(b"Prti");
        pub const KATAKANA: Script = Script::new(b"Kana");
        pub const KHAROSHTHI: Script = Script::new(b"Khar");
        pub const LAO: Script = Script::new(b"Laoo");
        pub const LATIN: Script = Script::new(b"Latn");
        pub const LYDIAN: Script = Script::new(b"Lydi");
        pub const MANDAIC: Script = Script::new(b"Mand");
        pub const MANICHAEAN: Script = Script::new(b"Mani");
        pub const MENDE_KIKAKUI: Script = Script::new(b"Mend");
        pub const MEROITIC_CURSIVE: Script = Script::new(b"Merc");
        pub const MEROITIC_HIEROGLYPHS: Script = Script::new(b"Mero");
        pub const MONGOLIAN: Script = Script::new(b"Mong");
        pub const NABATAEAN: Script = Script::new(b"Nbat");
        pub const NKO: Script = Script::new(b"Nkoo");
        pub const OGHAM: Script = Script::new(b"Ogam");
        pub const OLD_HUNGARIAN: Script = Script::new(b"Hung");
        pub const OLD_ITALIC: Script = Script::new(b"Ital");
        pub const OLD_NORTH_ARABIAN: Script = Script::new(b"Narb");
        pub const OLD_SOGDIAN: Script = Script::new(b"Sogo");
        pub const OLD_SOUTH_ARABIAN: Script = Script::new(b"Sarb");
        pub const OLD_TURKIC: Script = Script::new(b"Orkh");
        pub const OLD_UYGHUR: Script = Script::new(b"Ougr");
        pub const PALMYRENE: Script = Script::new(b"Palm");
        pub const PHOENICIAN: Script = Script::new(b"Phnx");
        pub const PSALTER_PAHLAVI: Script = Script::new(b"Phlp");
        pub const HANIFI_ROHINGYA: Script = Script::new(b"Rohg");
        pub const RUNIC: Script = Script::new(b"Runr");
        pub const SAMARITAN: Script = Script::new(b"Samr");
        pub const SOGDIAN: Script = Script::new(b"Sogd");
        pub const SYRIAC: Script = Script::new(b"Syrc");
        pub const THAANA: Script = Script::new(b"Thaa");
        pub const THAI: Script = Script::new(b"Thai");
        pub const TIBETAN: Script = Script::new(b"Tibt");
        pub const TIFINAGH: Script = Script::new(b"Tfng");
        pub const UNKNOWN: Script = Script::new(b"Zzzz");
        pub const YEZIDI: Script = Script::new(b"Yezi");

        pub const fn new(tag: &[u8; 4]) -> Self {
            Script(Tag::new(tag))
        }

        /// Normalizes case the ISO 15924 way: `arab` becomes `Arab`
        pub fn from_iso15924(tag: Tag) -> Self {
            let mut bytes = tag.to_lowercase().to_bytes();
            bytes[0] = bytes[0].to_ascii_uppercase();
            Script(Tag::new(&bytes))
        }

        pub fn tag(self) -> Tag {
            self.0
        }

        /// Scripts that carry no identity of their own
        pub fn is_neutral(self) -> bool {
            self == Script::COMMON || self == Script::INHERITED || self == Script::UNKNOWN
        }

        /// Native horizontal direction, or `None` for scripts written both ways
        pub fn horizontal_direction(self) -> Option<Direction> {
            const RTL: &[Script] = &[
                Script::ARABIC,
                Script::HEBREW,
                Script::SYRIAC,
                Script::THAANA,
                Script::CYPRIOT,
                Script::KHAROSHTHI,
                Script::PHOENICIAN,
                Script::NKO,
                Script::LYDIAN,
                Script::AVESTAN,
                Script::IMPERIAL_ARAMAIC,
                Script::INSCRIPTIONAL_PAHLAVI,
                Script::INSCRIPTIONAL_PARTHIAN,
                Script::OLD_SOUTH_ARABIAN,
                Script::OLD_TURKIC,
                Script::SAMARITAN,
                Script::MANDAIC,
                Script::MEROITIC_CURSIVE,
                Script::MEROITIC_HIEROGLYPHS,
                Script::MANICHAEAN,
                Script::MENDE_KIKAKUI,
                Script::NABATAEAN,
                Script::OLD_NORTH_ARABIAN,
                Script::PALMYRENE,
                Script::PSALTER_PAHLAVI,
                Script::HATRAN,
                Script::ADLAM,
                Script::HANIFI_ROHINGYA,
                Script::OLD_SOGDIAN,
                Script::SOGDIAN,
                Script::ELYMAIC,
                Script::CHORASMIAN,
                Script::YEZIDI,
                Script::OLD_UYGHUR,
            ];
            // Attested in both directions.
            const BIDI: &[Script] = &[
                Script::OLD_HUNGARIAN,
                Script::OLD_ITALIC,
                Script::RUNIC,
                Script::TIFINAGH,
            ];

            if RTL.contains(&self) {
                Some(Direction::RightToLeft)
            } else if BIDI.contains(&self) {
                None
            } else {
                Some(Direction::LeftToRight)
            }
        }
    }

    impl fmt::Debug for Script {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Script({})", self.0)
        }
    }

    impl FromStr for Script {
        type Err = FeatureParseError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            if s.len() != 4 {
                return Err(FeatureParseError::InvalidTag(s.to_string()));
            }
            Ok(Script::from_iso15924(s.parse()?))
        }
    }

    /// A BCP 47 language tag, stored lowercased
    #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Language(String);

    impl Language {
        pub fn new(tag: &str) -> Self {
            Language(tag.trim().to_ascii_lowercase().replace('_', "-"))
        }

        pub fn as_str(&self) -> &str {
            &self.0
        }

        /// The primary subtag, `sr` for `sr-latn`
        pub fn primary(&self) -> &str {
            self.0.split('-').next().unwrap_or("")
        }
    }

    impl fmt::Display for Language {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.0)
        }
    }

    /// The script, language and direction of a run being shaped
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct SegmentProperties {
        pub direction: Direction,
        pub script: Option<Script>,
        pub language: Option<Language>,
    }

    impl SegmentProperties {
        pub fn new(direction: Direction, script: Option<Script>, language: Option<Language>) -> Self {
            Self {
                direction,
                script,
                language,
            }
        }
    }

    impl Default for SegmentProperties {
        fn default() -> Self {
            Self::new(Direction::LeftToRight, None, None)
        }
    }

    /// A request to turn a feature on, off, or to a value over a cluster range
    ///
    /// Parses from the usual textual forms:
    ///
    /// ```
    /// use oshape_core::types::Feature;
    ///
    /// let f: Feature = "aalt[3:5]=2".parse()?;
    /// assert_eq!((f.value, f.start, f.end), (2, 3, 5));
    /// # Ok::<(), oshape_core::error::FeatureParseError>(())
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Feature {
        pub tag: Tag,
        pub value: u32,
        pub start: u32,
        pub end: u32,
    }

    impl Feature {
        pub const GLOBAL_START: u32 = 0;
        pub const GLOBAL_END: u32 = u32::MAX;

        pub fn new(tag: Tag, value: u32, range: impl std::ops::RangeBounds<u32>) -> Self {
            use std::ops::Bound;
            let start = match range.start_bound() {
                Bound::Included(&s) => s,
                Bound::Excluded(&s) => s.saturating_add(1),
                Bound::Unbounded => Self::GLOBAL_START,
            };
            let end = match range.end_bound() {
                Bound::Included(&e) => e.saturating_add(1),
                Bound::Excluded(&e) => e,
                Bound::Unbounded => Self::GLOBAL_END,
            };
            Self {
                tag,
                value,
                start,
                end,
            }
        }

        pub fn global(tag: Tag, value: u32) -> Self {
            Self::new(tag, value, ..)
        }

        pub fn is_global(&self) -> bool {
            self.start == Self::GLOBAL_START && self.end == Self::GLOBAL_END
        }
    }

    impl FromStr for Feature {
        type Err = FeatureParseError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let invalid = || FeatureParseError::InvalidFeature(s.to_string());
            let mut rest = s.trim();
            let mut value = 1;

            if let Some(stripped) = rest.strip_prefix('-') {
                value = 0;
                rest = stripped;
            } else if let Some(stripped) = rest.strip_prefix('+') {
                rest = stripped;
            }

            let (head, explicit_value) = match rest.split_once('=') {
                Some((head, v)) => (head.trim(), Some(v.trim())),
                None => (rest, None),
            };

            let (tag_str, range) = match head.find('[') {
                Some(open) => {
                    let close = head.rfind(']').filter(|&c| c > open).ok_or_else(invalid)?;
                    if close + 1 != head.len() {
                        return Err(invalid());
                    }
                    (&head[..open], Some(&head[open + 1..close]))
                },
                None => (head, None),
            };

            let tag_str = tag_str.trim().trim_matches(|c| c == '"' || c == '\'');
            let tag: Tag = tag_str.parse().map_err(|_| invalid())?;

            let (start, end) = match range {
                None => (Self::GLOBAL_START, Self::GLOBAL_END),
                Some(range) => match range.split_once(':') {
                    Some((a, b)) => {
                        let start = parse_bound(a, Self::GLOBAL_START).ok_or_else(invalid)?;
                        let end = parse_bound(b, Self::GLOBAL_END).ok_or_else(invalid)?;
                        (start, end)
                    },
                    None => {
                        let index: u32 = range.trim().parse().map_err(|_| invalid())?;
                        (index, index.saturating_add(1))
                    },
                },
            };

            if let Some(v) = explicit_value {
                value = match v {
                    "on" | "true" => 1,
                    "off" | "false" => 0,
                    number => number.parse().map_err(|_| invalid())?,
                };
            }

            Ok(Feature {
                tag,
                value,
                start,
                end,
            })
        }
    }

    fn parse_bound(s: &str, default: u32) -> Option<u32> {
        let s = s.trim();
        if s.is_empty() {
            Some(default)
        } else {
            s.parse().ok()
        }
    }

    impl fmt::Display for Feature {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if self.value == 0 {
                write!(f, "-")?;
            }
            write!(f, "{}", self.tag.to_string().trim_end())?;
            if !self.is_global() {
                write!(f, "[")?;
                if self.start != Self::GLOBAL_START {
                    write!(f, "{}", self.start)?;
                }
                write!(f, ":")?;
                if self.end != Self::GLOBAL_END {
                    write!(f, "{}", self.end)?;
                }
                write!(f, "]")?;
            }
            if self.value > 1 {
                write!(f, "={}", self.value)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::types::*;

    #[test]
    fn test_tag_round_trip() {
        let tag: Tag = "kern".parse().unwrap();
        assert_eq!(tag, Tag::new(b"kern"));
        assert_eq!(tag.to_string(), "kern");

        let short: Tag = "cv1".parse().unwrap();
        assert_eq!(short, Tag::new(b"cv1 "));
        assert!("toolong".parse::<Tag>().is_err());
        assert!("".parse::<Tag>().is_err());
    }

    #[test]
    fn test_direction_helpers() {
        assert!(Direction::LeftToRight.is_forward());
        assert!(Direction::BottomToTop.is_backward());
        assert!(Direction::TopToBottom.is_vertical());
        assert_eq!(Direction::RightToLeft.reverse(), Direction::LeftToRight);
        assert_eq!("rtl".parse::<Direction>().unwrap(), Direction::RightToLeft);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_script_directions() {
        assert_eq!(Script::ARABIC.horizontal_direction(), Some(Direction::RightToLeft));
        assert_eq!(Script::LATIN.horizontal_direction(), Some(Direction::LeftToRight));
        assert_eq!(Script::OLD_ITALIC.horizontal_direction(), None);
        assert_eq!("hebr".parse::<Script>().unwrap(), Script::HEBREW);
    }

    #[test]
    fn test_feature_parsing() {
        let f: Feature = "kern".parse().unwrap();
        assert_eq!(f, Feature::global(Tag::new(b"kern"), 1));

        let f: Feature = "-liga".parse().unwrap();
        assert_eq!(f.value, 0);
        assert!(f.is_global());

        let f: Feature = "kern=0".parse().unwrap();
        assert_eq!(f.value, 0);

        let f: Feature = "smcp[3:5]".parse().unwrap();
        assert_eq!((f.start, f.end, f.value), (3, 5, 1));

        let f: Feature = "smcp[3:]".parse().unwrap();
        assert_eq!((f.start, f.end), (3, Feature::GLOBAL_END));

        let f: Feature = "smcp[:5]".parse().unwrap();
        assert_eq!((f.start, f.end), (0, 5));

        let f: Feature = "smcp[7]=off".parse().unwrap();
        assert_eq!((f.start, f.end, f.value), (7, 8, 0));

        assert!("kern[3:5".parse::<Feature>().is_err());
        assert!("kern=x".parse::<Feature>().is_err());
        assert!("=1".parse::<Feature>().is_err());
    }

    #[test]
    fn test_feature_display() {
        let f: Feature = "aalt[2:4]=3".parse().unwrap();
        assert_eq!(f.to_string(), "aalt[2:4]=3");
        let f: Feature = "-kern".parse().unwrap();
        assert_eq!(f.to_string(), "-kern");
    }

    #[test]
    fn test_feature_from_range() {
        let f = Feature::new(Tag::new(b"liga"), 1, 2..=4);
        assert_eq!((f.start, f.end), (2, 5));
        assert!(Feature::global(Tag::new(b"liga"), 1).is_global());
    }

    #[test]
    fn test_language_normalization() {
        let lang = Language::new("SR_Latn");
        assert_eq!(lang.as_str(), "sr-latn");
        assert_eq!(lang.primary(), "sr");
    }
}
