//! Script and feature discovery in GSUB / GPOS
//!
//! Only the script and feature lists are read; lookups themselves are
//! reported by index.

use oshape_core::map::TableIndex;
use oshape_core::traits::FeatureSearch;
use oshape_core::types::{Language, Script, Tag};
use read_fonts::tables::layout::{FeatureList, LangSys, ScriptList};
use read_fonts::types::Tag as OtTag;
use read_fonts::{FontRef as ReadFontRef, TableProvider};

const DEFAULT_SCRIPT: Tag = Tag::new(b"DFLT");
const NO_REQUIRED_FEATURE: u16 = 0xFFFF;

#[cfg(test)]
fn to_ot(tag: Tag) -> OtTag {
    OtTag::from_be_bytes(tag.to_bytes())
}

fn from_ot(tag: OtTag) -> Tag {
    Tag::new(&tag.to_be_bytes())
}

fn lists<'a>(font: &ReadFontRef<'a>, table: TableIndex) -> Option<(ScriptList<'a>, FeatureList<'a>)> {
    match table {
        TableIndex::Gsub => {
            let gsub = font.gsub().ok()?;
            Some((gsub.script_list().ok()?, gsub.feature_list().ok()?))
        },
        TableIndex::Gpos => {
            let gpos = font.gpos().ok()?;
            Some((gpos.script_list().ok()?, gpos.feature_list().ok()?))
        },
    }
}

/// OpenType script tag for an ISO 15924 script
///
/// Mostly the lowercased tag; a few scripts were registered differently.
pub fn ot_script_tag(script: Script) -> Tag {
    match &script.tag().to_bytes() {
        b"Hira" => Tag::new(b"kana"),
        b"Laoo" => Tag::new(b"lao "),
        b"Yiii" => Tag::new(b"yi  "),
        b"Nkoo" => Tag::new(b"nko "),
        b"Vaii" => Tag::new(b"vai "),
        b"Zinh" | b"Zyyy" | b"Zzzz" => DEFAULT_SCRIPT,
        _ => script.tag().to_lowercase(),
    }
}

/// OpenType language tag guess: the primary subtag, uppercased and padded
fn ot_language_tag(language: &Language) -> Tag {
    Tag::from_bytes_lossy(language.primary().to_ascii_uppercase().as_bytes())
}

fn has_script(scripts: &ScriptList<'_>, tag: Tag) -> bool {
    scripts
        .script_records()
        .iter()
        .any(|record| from_ot(record.script_tag()) == tag)
}

pub(crate) fn select_script(font: &ReadFontRef<'_>, table: TableIndex, script: Option<Script>) -> Option<(Tag, bool)> {
    let (scripts, _) = lists(font, table)?;

    if let Some(tag) = script.map(ot_script_tag).filter(|&tag| tag != DEFAULT_SCRIPT) {
        if has_script(&scripts, tag) {
            return Some((tag, true));
        }
    }

    [DEFAULT_SCRIPT, Tag::new(b"dflt"), Tag::new(b"latn")]
        .into_iter()
        .find(|&tag| has_script(&scripts, tag))
        .map(|tag| (tag, false))
}

fn lang_sys<'a>(scripts: &ScriptList<'a>, script: Tag, language: Option<&Language>) -> Option<LangSys<'a>> {
    let record = scripts
        .script_records()
        .iter()
        .find(|record| from_ot(record.script_tag()) == script)?;
    let script_table = record.script(scripts.offset_data()).ok()?;

    if let Some(wanted) = language.map(ot_language_tag) {
        let found = script_table
            .lang_sys_records()
            .iter()
            .find(|record| from_ot(record.lang_sys_tag()) == wanted)
            .and_then(|record| record.lang_sys(script_table.offset_data()).ok());
        if found.is_some() {
            return found;
        }
    }

    script_table.default_lang_sys()?.ok()
}

/// Lookup indices of `feature` in `table`, or `None` when it is absent
pub(crate) fn feature_lookups(
    font: &ReadFontRef<'_>,
    table: TableIndex,
    search: FeatureSearch<'_>,
    feature: Tag,
) -> Option<Vec<u16>> {
    let (scripts, features) = lists(font, table)?;
    let records = features.feature_records();

    let candidates: Vec<u16> = match search {
        FeatureSearch::LanguageSystem { script, language } => {
            let sys = lang_sys(&scripts, script, language)?;
            let mut indices: Vec<u16> = sys.feature_indices().iter().map(|i| i.get()).collect();
            if sys.required_feature_index() != NO_REQUIRED_FEATURE {
                indices.push(sys.required_feature_index());
            }
            indices
        },
        FeatureSearch::Anywhere => (0..records.len())
            .filter_map(|i| u16::try_from(i).ok())
            .collect(),
    };

    let mut found = false;
    let mut lookups = Vec::new();
    for index in candidates {
        let Some(record) = records.get(usize::from(index)) else {
            continue;
        };
        if from_ot(record.feature_tag()) != feature {
            continue;
        }
        let Ok(feature_table) = record.feature(features.offset_data()) else {
            continue;
        };
        found = true;
        lookups.extend(feature_table.lookup_list_indices().iter().map(|i| i.get()));
    }

    found.then(|| {
        lookups.sort_unstable();
        lookups.dedup();
        lookups
    })
}
