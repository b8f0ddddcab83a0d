// this_file: crates/oshape-unicode/src/lib.rs

//! Unicode character database backed by ICU4X compiled data.
//!
//! [`IcuUnicode`] answers every property query the shaper makes: general
//! category, script, mirroring, default-ignorable and emoji properties come
//! from `icu_properties`; combining classes and canonical (de)composition
//! come from `unicode-normalization`.

use std::sync::OnceLock;

use icu_properties::props::{
    BidiMirroringGlyph, DefaultIgnorableCodePoint, ExtendedPictographic,
    GeneralCategory as IcuCategory, Script as IcuScript,
};
use icu_properties::{
    CodePointMapData, CodePointMapDataBorrowed, CodePointSetData, CodePointSetDataBorrowed,
    PropertyNamesShort, PropertyNamesShortBorrowed,
};
use oshape_core::types::{Script, Tag};
use oshape_core::unicode::GeneralCategory;
use oshape_core::UnicodeFuncs;

/// Unicode property lookups over ICU data baked into the binary
pub struct IcuUnicode {
    general_category: CodePointMapDataBorrowed<'static, IcuCategory>,
    script: CodePointMapDataBorrowed<'static, IcuScript>,
    script_names: PropertyNamesShortBorrowed<'static, IcuScript>,
    mirroring: CodePointMapDataBorrowed<'static, BidiMirroringGlyph>,
    default_ignorable: CodePointSetDataBorrowed<'static>,
    extended_pictographic: CodePointSetDataBorrowed<'static>,
}

impl IcuUnicode {
    pub fn new() -> Self {
        Self {
            general_category: CodePointMapData::<IcuCategory>::new(),
            script: CodePointMapData::<IcuScript>::new(),
            script_names: PropertyNamesShort::<IcuScript>::new(),
            mirroring: CodePointMapData::<BidiMirroringGlyph>::new(),
            default_ignorable: CodePointSetData::new::<DefaultIgnorableCodePoint>(),
            extended_pictographic: CodePointSetData::new::<ExtendedPictographic>(),
        }
    }

    /// Process-wide instance; the data is static so one is enough
    pub fn shared() -> &'static IcuUnicode {
        static SHARED: OnceLock<IcuUnicode> = OnceLock::new();
        SHARED.get_or_init(IcuUnicode::new)
    }
}

impl Default for IcuUnicode {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for IcuUnicode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcuUnicode").finish_non_exhaustive()
    }
}

fn to_category(gc: IcuCategory) -> GeneralCategory {
    match gc {
        IcuCategory::Control => GeneralCategory::Control,
        IcuCategory::Format => GeneralCategory::Format,
        IcuCategory::Unassigned => GeneralCategory::Unassigned,
        IcuCategory::PrivateUse => GeneralCategory::PrivateUse,
        IcuCategory::Surrogate => GeneralCategory::Surrogate,
        IcuCategory::LowercaseLetter => GeneralCategory::LowercaseLetter,
        IcuCategory::ModifierLetter => GeneralCategory::ModifierLetter,
        IcuCategory::OtherLetter => GeneralCategory::OtherLetter,
        IcuCategory::TitlecaseLetter => GeneralCategory::TitlecaseLetter,
        IcuCategory::UppercaseLetter => GeneralCategory::UppercaseLetter,
        IcuCategory::SpacingMark => GeneralCategory::SpacingMark,
        IcuCategory::EnclosingMark => GeneralCategory::EnclosingMark,
        IcuCategory::NonspacingMark => GeneralCategory::NonspacingMark,
        IcuCategory::DecimalNumber => GeneralCategory::DecimalNumber,
        IcuCategory::LetterNumber => GeneralCategory::LetterNumber,
        IcuCategory::OtherNumber => GeneralCategory::OtherNumber,
        IcuCategory::ConnectorPunctuation => GeneralCategory::ConnectPunctuation,
        IcuCategory::DashPunctuation => GeneralCategory::DashPunctuation,
        IcuCategory::ClosePunctuation => GeneralCategory::ClosePunctuation,
        IcuCategory::FinalPunctuation => GeneralCategory::FinalPunctuation,
        IcuCategory::InitialPunctuation => GeneralCategory::InitialPunctuation,
        IcuCategory::OtherPunctuation => GeneralCategory::OtherPunctuation,
        IcuCategory::OpenPunctuation => GeneralCategory::OpenPunctuation,
        IcuCategory::CurrencySymbol => GeneralCategory::CurrencySymbol,
        IcuCategory::ModifierSymbol => GeneralCategory::ModifierSymbol,
        IcuCategory::MathSymbol => GeneralCategory::MathSymbol,
        IcuCategory::OtherSymbol => GeneralCategory::OtherSymbol,
        IcuCategory::LineSeparator => GeneralCategory::LineSeparator,
        IcuCategory::ParagraphSeparator => GeneralCategory::ParagraphSeparator,
        IcuCategory::SpaceSeparator => GeneralCategory::SpaceSeparator,
    }
}

/// Recomposes a fully decomposed sequence from the left
fn compose_all(chars: &[char]) -> Option<char> {
    let (&first, rest) = chars.split_first()?;
    rest.iter()
        .try_fold(first, |acc, &c| unicode_normalization::char::compose(acc, c))
}

impl UnicodeFuncs for IcuUnicode {
    fn general_category(&self, cp: u32) -> GeneralCategory {
        to_category(self.general_category.get32(cp))
    }

    fn mirroring(&self, cp: u32) -> u32 {
        self.mirroring
            .get32(cp)
            .mirroring_glyph
            .map_or(cp, u32::from)
    }

    fn is_default_ignorable(&self, cp: u32) -> bool {
        self.default_ignorable.contains32(cp)
    }

    fn is_extended_pictographic(&self, cp: u32) -> bool {
        self.extended_pictographic.contains32(cp)
    }

    fn combining_class(&self, cp: u32) -> u8 {
        char::from_u32(cp).map_or(0, unicode_normalization::char::canonical_combining_class)
    }

    fn script(&self, cp: u32) -> Script {
        let script = self.script.get32(cp);
        self.script_names
            .get(script)
            .and_then(|name| name.parse::<Tag>().ok())
            .map_or(Script::UNKNOWN, Script::from_iso15924)
    }

    /// One step of canonical decomposition
    ///
    /// The underlying tables decompose fully. A character whose full
    /// decomposition recomposes to something else is a singleton; otherwise
    /// the last character is split off and the remainder recomposed.
    fn decompose(&self, cp: u32) -> Option<(u32, Option<u32>)> {
        let ch = char::from_u32(cp)?;
        let mut full = Vec::with_capacity(4);
        unicode_normalization::char::decompose_canonical(ch, |c| full.push(c));
        if full.as_slice() == [ch] {
            return None;
        }

        if let Some(target) = compose_all(&full).filter(|&target| target != ch) {
            return Some((u32::from(target), None));
        }

        let (&last, prefix) = full.split_last()?;
        let head = compose_all(prefix)?;
        Some((u32::from(head), Some(u32::from(last))))
    }

    fn compose(&self, a: u32, b: u32) -> Option<u32> {
        let (a, b) = (char::from_u32(a)?, char::from_u32(b)?);
        unicode_normalization::char::compose(a, b).map(u32::from)
    }
}


#[cfg(test)]
mod proptests;
