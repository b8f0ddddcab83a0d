//! Unicode vocabulary the shaper reasons with
//!
//! The property *database* is a collaborator behind
//! [`UnicodeFuncs`](crate::traits::UnicodeFuncs). This module only holds the
//! small, fixed tables the pipeline itself owns: general-category codes,
//! combining-class names, space widths and vertical presentation forms.

/// Unicode general category, in the order the glyph props pack it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum GeneralCategory {
    Control = 0,
    Format,
    Unassigned,
    PrivateUse,
    Surrogate,
    LowercaseLetter,
    ModifierLetter,
    OtherLetter,
    TitlecaseLetter,
    UppercaseLetter,
    SpacingMark,
    EnclosingMark,
    NonspacingMark,
    DecimalNumber,
    LetterNumber,
    OtherNumber,
    ConnectPunctuation,
    DashPunctuation,
    ClosePunctuation,
    FinalPunctuation,
    InitialPunctuation,
    OtherPunctuation,
    OpenPunctuation,
    CurrencySymbol,
    ModifierSymbol,
    MathSymbol,
    OtherSymbol,
    LineSeparator,
    ParagraphSeparator,
    SpaceSeparator,
}

impl GeneralCategory {
    const ALL: [GeneralCategory; 30] = [
        GeneralCategory::Control,
        GeneralCategory::Format,
        GeneralCategory::Unassigned,
        GeneralCategory::PrivateUse,
        GeneralCategory::Surrogate,
        GeneralCategory::LowercaseLetter,
        GeneralCategory::ModifierLetter,
        GeneralCategory::OtherLetter,
        GeneralCategory::TitlecaseLetter,
        GeneralCategory::UppercaseLetter,
        GeneralCategory::SpacingMark,
        GeneralCategory::EnclosingMark,
        GeneralCategory::NonspacingMark,
        GeneralCategory::DecimalNumber,
        GeneralCategory::LetterNumber,
        GeneralCategory::OtherNumber,
        GeneralCategory::ConnectPunctuation,
        GeneralCategory::DashPunctuation,
        GeneralCategory::ClosePunctuation,
        GeneralCategory::FinalPunctuation,
        GeneralCategory::InitialPunctuation,
        GeneralCategory::OtherPunctuation,
        GeneralCategory::OpenPunctuation,
        GeneralCategory::CurrencySymbol,
        GeneralCategory::ModifierSymbol,
        GeneralCategory::MathSymbol,
        GeneralCategory::OtherSymbol,
        GeneralCategory::LineSeparator,
        GeneralCategory::ParagraphSeparator,
        GeneralCategory::SpaceSeparator,
    ];

    /// Inverse of `as u8`; out-of-range values read as `Unassigned`
    pub fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .unwrap_or(GeneralCategory::Unassigned)
    }

    pub fn is_mark(self) -> bool {
        matches!(
            self,
            GeneralCategory::SpacingMark
                | GeneralCategory::EnclosingMark
                | GeneralCategory::NonspacingMark
        )
    }

    pub fn is_letter(self) -> bool {
        matches!(
            self,
            GeneralCategory::LowercaseLetter
                | GeneralCategory::ModifierLetter
                | GeneralCategory::OtherLetter
                | GeneralCategory::TitlecaseLetter
                | GeneralCategory::UppercaseLetter
        )
    }
}

/// Canonical combining classes with positional meaning
pub mod combining_class {
    pub const NOT_REORDERED: u8 = 0;
    pub const ATTACHED_BELOW_LEFT: u8 = 200;
    pub const ATTACHED_BELOW: u8 = 202;
    pub const ATTACHED_ABOVE: u8 = 214;
    pub const ATTACHED_ABOVE_RIGHT: u8 = 216;
    pub const BELOW_LEFT: u8 = 218;
    pub const BELOW: u8 = 220;
    pub const BELOW_RIGHT: u8 = 222;
    pub const LEFT: u8 = 224;
    pub const RIGHT: u8 = 226;
    pub const ABOVE_LEFT: u8 = 228;
    pub const ABOVE: u8 = 230;
    pub const ABOVE_RIGHT: u8 = 232;
    pub const DOUBLE_BELOW: u8 = 233;
    pub const DOUBLE_ABOVE: u8 = 234;
    pub const IOTA_SUBSCRIPT: u8 = 240;
}

/// How wide a space character should be when the font has no glyph for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpaceType {
    Em = 1,
    Em2 = 2,
    Em3 = 3,
    Em4 = 4,
    Em5 = 5,
    Em6 = 6,
    Em16 = 16,
    FourEm18 = 17,
    Space = 18,
    Figure = 19,
    Punctuation = 20,
    Narrow = 21,
}

impl SpaceType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => SpaceType::Em,
            2 => SpaceType::Em2,
            3 => SpaceType::Em3,
            4 => SpaceType::Em4,
            5 => SpaceType::Em5,
            6 => SpaceType::Em6,
            16 => SpaceType::Em16,
            17 => SpaceType::FourEm18,
            18 => SpaceType::Space,
            19 => SpaceType::Figure,
            20 => SpaceType::Punctuation,
            21 => SpaceType::Narrow,
            _ => return None,
        })
    }

    /// The em divisor for the `Em*` kinds
    pub fn em_divisor(self) -> Option<i32> {
        match self {
            SpaceType::Em | SpaceType::Em2 | SpaceType::Em3 | SpaceType::Em4 => Some(self as i32),
            SpaceType::Em5 | SpaceType::Em6 | SpaceType::Em16 => Some(self as i32),
            _ => None,
        }
    }
}

/// Space-fallback kind for a space-separator code point
pub fn space_fallback_type(cp: u32) -> Option<SpaceType> {
    Some(match cp {
        0x0020 | 0x00A0 => SpaceType::Space,
        0x2000 | 0x2002 => SpaceType::Em2,
        0x2001 | 0x2003 | 0x3000 => SpaceType::Em,
        0x2004 => SpaceType::Em3,
        0x2005 => SpaceType::Em4,
        0x2006 => SpaceType::Em6,
        0x2007 => SpaceType::Figure,
        0x2008 => SpaceType::Punctuation,
        0x2009 => SpaceType::Em5,
        0x200A => SpaceType::Em16,
        0x202F => SpaceType::Narrow,
        0x205F => SpaceType::FourEm18,
        _ => return None,
    })
}

pub const DOTTED_CIRCLE: u32 = 0x25CC;
pub const FRACTION_SLASH: u32 = 0x2044;
pub const ZWNJ: u32 = 0x200C;
pub const ZWJ: u32 = 0x200D;
pub const CGJ: u32 = 0x034F;

pub fn is_regional_indicator(cp: u32) -> bool {
    (0x1F1E6..=0x1F1FF).contains(&cp)
}

pub fn is_emoji_modifier(cp: u32) -> bool {
    (0x1F3FB..=0x1F3FF).contains(&cp)
}

/// VS1..VS256; the Mongolian free variation selectors are not included
pub fn is_variation_selector(cp: u32) -> bool {
    (0xFE00..=0xFE0F).contains(&cp) || (0xE0100..=0xE01EF).contains(&cp)
}

/// Sideways presentation form of punctuation for vertical text
pub fn vertical_char_for(cp: u32) -> u32 {
    match cp >> 8 {
        0x20 => match cp {
            0x2013 => 0xFE32,
            0x2014 => 0xFE31,
            0x2025 => 0xFE30,
            0x2026 => 0xFE19,
            _ => cp,
        },
        0x30 => match cp {
            0x3001 => 0xFE11,
            0x3002 => 0xFE12,
            0x3008 => 0xFE3F,
            0x3009 => 0xFE40,
            0x300A => 0xFE3D,
            0x300B => 0xFE3E,
            0x300C => 0xFE41,
            0x300D => 0xFE42,
            0x300E => 0xFE43,
            0x300F => 0xFE44,
            0x3010 => 0xFE3B,
            0x3011 => 0xFE3C,
            0x3014 => 0xFE39,
            0x3015 => 0xFE3A,
            0x3016 => 0xFE17,
            0x3017 => 0xFE18,
            _ => cp,
        },
        0xFE => match cp {
            0xFE4F => 0xFE34,
            _ => cp,
        },
        0xFF => match cp {
            0xFF01 => 0xFE15,
            0xFF08 => 0xFE35,
            0xFF09 => 0xFE36,
            0xFF0C => 0xFE10,
            0xFF1A => 0xFE13,
            0xFF1B => 0xFE14,
            0xFF1F => 0xFE16,
            0xFF3B => 0xFE47,
            0xFF3D => 0xFE48,
            0xFF3F => 0xFE33,
            0xFF5B => 0xFE37,
            0xFF5D => 0xFE38,
            _ => cp,
        },
        _ => cp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_category_round_trip() {
        for value in 0..30u8 {
            assert_eq!(GeneralCategory::from_u8(value) as u8, value);
        }
        assert_eq!(GeneralCategory::from_u8(200), GeneralCategory::Unassigned);
    }

    #[test]
    fn test_category_groups() {
        assert!(GeneralCategory::NonspacingMark.is_mark());
        assert!(GeneralCategory::SpacingMark.is_mark());
        assert!(!GeneralCategory::OtherLetter.is_mark());
        assert!(GeneralCategory::TitlecaseLetter.is_letter());
        assert!(!GeneralCategory::DecimalNumber.is_letter());
    }

    #[test]
    fn test_space_types() {
        assert_eq!(space_fallback_type(0x2003), Some(SpaceType::Em));
        assert_eq!(space_fallback_type(0x2009), Some(SpaceType::Em5));
        assert_eq!(space_fallback_type(0x0041), None);
        assert_eq!(SpaceType::Em16.em_divisor(), Some(16));
        assert_eq!(SpaceType::Figure.em_divisor(), None);
        assert_eq!(SpaceType::from_u8(SpaceType::Narrow as u8), Some(SpaceType::Narrow));
    }

    #[test]
    fn test_vertical_forms() {
        assert_eq!(vertical_char_for(0x3001), 0xFE11);
        assert_eq!(vertical_char_for(0xFF08), 0xFE35);
        assert_eq!(vertical_char_for(0x2026), 0xFE19);
        assert_eq!(vertical_char_for(0x0041), 0x0041);
    }
}
