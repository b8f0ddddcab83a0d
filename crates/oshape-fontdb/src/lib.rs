//! OpenType fonts for oshape
//!
//! [`Face`] implements the shaper's [`Font`] contract over a real font
//! binary. It answers metric and capability queries and reports which
//! GSUB/GPOS lookups a feature maps to. Applying those lookups is left to
//! a layout engine; the face only performs legacy pair kerning itself.
//!
//! ## Memory Management
//!
//! A face owns its bytes and creates a `FontRef` on demand for each query.
//! Table-derived facts used on every glyph (units per em, ascender,
//! capabilities, kerning pairs) are read once at load time.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

use oshape_core::buffer::GlyphBuffer;
use oshape_core::error::{FontLoadError, Result};
use oshape_core::map::TableIndex;
use oshape_core::traits::{FeatureSearch, Font, GlyphClass, GlyphExtents};
use oshape_core::types::{GlyphId, Mask, Script, Tag};
use read_fonts::types::{GlyphId16, GlyphId as ReadGlyphId};
use read_fonts::{FileRef, FontRef as ReadFontRef, TableProvider};
use skrifa::instance::{LocationRef, Size};
use skrifa::MetadataProvider;

pub mod kern;
mod layout;

pub use kern::KernInfo;
pub use layout::ot_script_tag;

/// Table presence, read once at load time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub gsub: bool,
    pub gpos: bool,
    pub morx: bool,
    pub kerx: bool,
    pub kern: bool,
    pub trak: bool,
    pub gdef_classes: bool,
    pub vmtx: bool,
}

/// A font face loaded into memory
pub struct Face {
    data: Vec<u8>,
    face_index: u32,
    units_per_em: u16,
    ascender: i32,
    capabilities: Capabilities,
    kern: KernInfo,
    cache_id: u64,
}

impl std::fmt::Debug for Face {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Face")
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl Face {
    /// Opens a font file from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file_index(path, 0)
    }

    /// Opens a specific face from a font file (for TTC collections)
    pub fn from_file_index(path: impl AsRef<Path>, face_index: u32) -> Result<Self> {
        let data = fs::read(path.as_ref())
            .map_err(|_| FontLoadError::FileNotFound(path.as_ref().display().to_string()))?;
        Self::from_data_index(data, face_index)
    }

    pub fn from_data(data: Vec<u8>) -> Result<Self> {
        Self::from_data_index(data, 0)
    }

    /// Parses `data` and reads the load-time facts of face `face_index`
    pub fn from_data_index(data: Vec<u8>, face_index: u32) -> Result<Self> {
        let font_ref = match FileRef::new(&data).map_err(|_| FontLoadError::InvalidData)? {
            FileRef::Font(font) if face_index == 0 => font,
            FileRef::Font(_) => return Err(FontLoadError::FaceIndexOutOfRange { index: face_index }.into()),
            FileRef::Collection(collection) => collection
                .get(face_index)
                .map_err(|_| FontLoadError::FaceIndexOutOfRange { index: face_index })?,
        };

        let units_per_em = font_ref
            .head()
            .map_err(|_| FontLoadError::MissingTable("head"))?
            .units_per_em();
        let ascender = font_ref
            .metrics(Size::unscaled(), LocationRef::default())
            .ascent
            .round() as i32;

        let has = |tag: &[u8; 4]| font_ref.table_data(read_fonts::types::Tag::new(tag)).is_some();
        let capabilities = Capabilities {
            gsub: has(b"GSUB"),
            gpos: has(b"GPOS"),
            morx: has(b"morx") || has(b"mort"),
            kerx: has(b"kerx"),
            kern: has(b"kern"),
            trak: has(b"trak"),
            gdef_classes: font_ref
                .gdef()
                .is_ok_and(|gdef| gdef.glyph_class_def().is_some_and(|classes| classes.is_ok())),
            vmtx: has(b"vmtx"),
        };

        let kern = font_ref
            .table_data(read_fonts::types::Tag::new(b"kern"))
            .map(kern::parse)
            .unwrap_or_default();

        let mut hasher = DefaultHasher::new();
        data.hash(&mut hasher);
        face_index.hash(&mut hasher);
        let cache_id = hasher.finish();

        log::debug!(
            "Loaded face {} (upem {}, {:?}, {} kern pairs)",
            face_index,
            units_per_em,
            capabilities,
            if kern.has_pairs() { "with" } else { "no" }
        );

        Ok(Face {
            data,
            face_index,
            units_per_em,
            ascender,
            capabilities,
            kern,
            cache_id,
        })
    }

    /// Returns the face index for TTC collections (0 for single fonts)
    pub fn face_index(&self) -> u32 {
        self.face_index
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn kerning(&self) -> &KernInfo {
        &self.kern
    }

    /// Creates a FontRef on-demand for parsing operations
    fn font_ref(&self) -> Option<ReadFontRef<'_>> {
        ReadFontRef::from_index(&self.data, self.face_index).ok()
    }

    /// Counts how many different glyphs this font contains
    pub fn glyph_count(&self) -> Option<u32> {
        self.font_ref()
            .and_then(|font| font.maxp().ok().map(|maxp| u32::from(maxp.num_glyphs())))
    }
}

impl Font for Face {
    fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    fn nominal_glyph(&self, cp: u32) -> Option<GlyphId> {
        self.font_ref()?.charmap().map(cp).map(|gid| gid.to_u32())
    }

    fn variation_glyph(&self, cp: u32, selector: u32) -> Option<GlyphId> {
        use skrifa::charmap::MapVariant;

        let font = self.font_ref()?;
        let charmap = font.charmap();
        match charmap.map_variant(cp, selector)? {
            MapVariant::UseDefault => charmap.map(cp).map(|gid| gid.to_u32()),
            MapVariant::Variant(gid) => Some(gid.to_u32()),
        }
    }

    fn h_advance(&self, glyph: GlyphId) -> i32 {
        self.font_ref()
            .and_then(|font| font.hmtx().ok()?.advance(ReadGlyphId::new(glyph)))
            .map_or(0, i32::from)
    }

    fn v_advance(&self, glyph: GlyphId) -> i32 {
        if !self.capabilities.vmtx {
            return -i32::from(self.units_per_em);
        }
        self.font_ref()
            .and_then(|font| font.vmtx().ok()?.advance(ReadGlyphId::new(glyph)))
            .map_or(-i32::from(self.units_per_em), |advance| -i32::from(advance))
    }

    fn ascender(&self) -> i32 {
        self.ascender
    }

    fn glyph_extents(&self, glyph: GlyphId) -> Option<GlyphExtents> {
        let font = self.font_ref()?;
        let bounds = font
            .glyph_metrics(Size::unscaled(), LocationRef::default())
            .bounds(skrifa::GlyphId::new(glyph))?;
        Some(GlyphExtents {
            x_bearing: bounds.x_min.round() as i32,
            y_bearing: bounds.y_max.round() as i32,
            width: (bounds.x_max - bounds.x_min).round() as i32,
            height: (bounds.y_min - bounds.y_max).round() as i32,
        })
    }

    fn glyph_class(&self, glyph: GlyphId) -> GlyphClass {
        if !self.capabilities.gdef_classes {
            return GlyphClass::Unclassified;
        }
        let Ok(glyph) = u16::try_from(glyph) else {
            return GlyphClass::Unclassified;
        };
        let class = self
            .font_ref()
            .and_then(|font| font.gdef().ok()?.glyph_class_def()?.ok())
            .map_or(0, |classes| classes.get(GlyphId16::new(glyph)));
        match class {
            1 => GlyphClass::Base,
            2 => GlyphClass::Ligature,
            3 => GlyphClass::Mark,
            4 => GlyphClass::Component,
            _ => GlyphClass::Unclassified,
        }
    }

    fn h_kerning(&self, left: GlyphId, right: GlyphId) -> i32 {
        self.kern.pair(left, right)
    }

    fn cache_id(&self) -> Option<u64> {
        Some(self.cache_id)
    }

    fn has_ot_substitution(&self) -> bool {
        self.capabilities.gsub
    }

    fn has_ot_positioning(&self) -> bool {
        self.capabilities.gpos
    }

    fn has_alt_substitution(&self) -> bool {
        self.capabilities.morx
    }

    fn has_alt_positioning(&self) -> bool {
        self.capabilities.kerx
    }

    fn has_legacy_kerning(&self) -> bool {
        self.capabilities.kern
    }

    fn has_machine_kerning(&self) -> bool {
        self.kern.machine
    }

    fn has_cross_kerning(&self) -> bool {
        self.kern.cross_stream
    }

    fn has_tracking(&self) -> bool {
        self.capabilities.trak
    }

    fn has_glyph_classes(&self) -> bool {
        self.capabilities.gdef_classes
    }

    fn select_script(&self, table: TableIndex, script: Option<Script>) -> Option<(Tag, bool)> {
        layout::select_script(&self.font_ref()?, table, script)
    }

    fn feature_lookups(&self, table: TableIndex, search: FeatureSearch<'_>, feature: Tag) -> Option<Vec<u16>> {
        layout::feature_lookups(&self.font_ref()?, table, search, feature)
    }

    /// Pair kerning from format 0 subtables between consecutive non-marks
    fn apply_legacy_kerning(&self, kern_mask: Mask, buffer: &mut GlyphBuffer) {
        if !self.kern.has_pairs() || !buffer.direction().is_some_and(|d| d.is_horizontal()) {
            return;
        }
        let (info, pos) = buffer.split_mut();
        let mut previous: Option<usize> = None;
        for i in 0..info.len() {
            if info[i].is_mark() {
                continue;
            }
            if let Some(p) = previous {
                if info[p].mask & kern_mask != 0 && info[i].mask & kern_mask != 0 {
                    pos[p].x_advance += self.kern.pair(info[p].codepoint, info[i].codepoint);
                }
            }
            previous = Some(i);
        }
    }
}
