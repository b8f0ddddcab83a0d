//! Shape planning: from segment properties and font capabilities to a plan
//!
//! The planner picks the complex shaper, registers every feature in a fixed
//! order, compiles the feature map and then settles which backend
//! substitutes, which positions, and how marks are treated. The order of
//! those decisions matters; later ones read earlier ones.

use std::sync::Arc;

use oshape_core::error::PlanError;
use oshape_core::map::{AltFeatureMapBuilder, FeatureFlags, FeatureMapBuilder, TableIndex, MAX_VALUE};
use oshape_core::traits::Font;
use oshape_core::types::{Direction, Feature, SegmentProperties, Tag};

use crate::complex::{ComplexShaper, ShaperRegistry, ZeroWidthMarks};
use crate::plan::ShapePlan;

const RVRN: Tag = Tag::new(b"rvrn");
const LTRA: Tag = Tag::new(b"ltra");
const LTRM: Tag = Tag::new(b"ltrm");
const RTLA: Tag = Tag::new(b"rtla");
const RTLM: Tag = Tag::new(b"rtlm");
const FRAC: Tag = Tag::new(b"frac");
const NUMR: Tag = Tag::new(b"numr");
const DNOM: Tag = Tag::new(b"dnom");
const RAND: Tag = Tag::new(b"rand");
const TRAK: Tag = Tag::new(b"trak");
const HARF: Tag = Tag::new(b"HARF");
const BUZZ: Tag = Tag::new(b"BUZZ");
const KERN: Tag = Tag::new(b"kern");
const VKRN: Tag = Tag::new(b"vkrn");
const VERT: Tag = Tag::new(b"vert");
const MARK: Tag = Tag::new(b"mark");

/// Features every plan registers, whatever the direction
const COMMON_FEATURES: [(Tag, FeatureFlags); 7] = [
    (Tag::new(b"abvm"), FeatureFlags::GLOBAL),
    (Tag::new(b"blwm"), FeatureFlags::GLOBAL),
    (Tag::new(b"ccmp"), FeatureFlags::GLOBAL),
    (Tag::new(b"locl"), FeatureFlags::GLOBAL),
    (MARK, FeatureFlags::GLOBAL_MANUAL_JOINERS),
    (Tag::new(b"mkmk"), FeatureFlags::GLOBAL_MANUAL_JOINERS),
    (Tag::new(b"rlig"), FeatureFlags::GLOBAL),
];

/// Features registered for horizontal text only
const HORIZONTAL_FEATURES: [(Tag, FeatureFlags); 7] = [
    (Tag::new(b"calt"), FeatureFlags::GLOBAL),
    (Tag::new(b"clig"), FeatureFlags::GLOBAL),
    (Tag::new(b"curs"), FeatureFlags::GLOBAL),
    (Tag::new(b"dist"), FeatureFlags::GLOBAL),
    (KERN, FeatureFlags::GLOBAL_HAS_FALLBACK),
    (Tag::new(b"liga"), FeatureFlags::GLOBAL),
    (Tag::new(b"rclt"), FeatureFlags::GLOBAL),
];

/// Mutable planning state, handed to complex shaper hooks
pub struct ShapePlanner<'a> {
    pub font: &'a dyn Font,
    pub props: SegmentProperties,
    pub map: FeatureMapBuilder,
    pub alt_map: AltFeatureMapBuilder,
    /// The alternate substitution backend replaces GSUB for this plan
    pub apply_morx: bool,
    pub shaper: Arc<dyn ComplexShaper>,
}

impl<'a> ShapePlanner<'a> {
    /// Picks the complex shaper for `props` from `registry`
    ///
    /// When the alternate substitution backend is in charge, any shaper
    /// other than the default is swapped for the dumb one.
    pub fn new(font: &'a dyn Font, props: &SegmentProperties, registry: &ShaperRegistry) -> Self {
        let apply_morx =
            font.has_alt_substitution() && (props.direction.is_horizontal() || !font.has_ot_substitution());

        let mut shaper = registry.categorize(props);
        if apply_morx && !registry.is_default(shaper.as_ref()) {
            log::debug!(
                "Alternate substitution active, using '{}' instead of '{}'",
                registry.dumb_shaper().name(),
                shaper.name()
            );
            shaper = Arc::clone(registry.dumb_shaper());
        }

        Self {
            font,
            props: props.clone(),
            map: FeatureMapBuilder::new(font, props),
            alt_map: AltFeatureMapBuilder::default(),
            apply_morx,
            shaper,
        }
    }

    fn collect_features(&mut self, user_features: &[Feature]) {
        let shaper = Arc::clone(&self.shaper);
        let map = &mut self.map;

        map.enable_feature(RVRN, FeatureFlags::empty(), 1);
        map.add_gsub_pause(None);

        match self.props.direction {
            Direction::LeftToRight => {
                map.enable_feature(LTRA, FeatureFlags::empty(), 1);
                map.enable_feature(LTRM, FeatureFlags::empty(), 1);
            },
            Direction::RightToLeft => {
                map.enable_feature(RTLA, FeatureFlags::empty(), 1);
                map.add_feature(RTLM, FeatureFlags::empty(), 1);
            },
            Direction::TopToBottom | Direction::BottomToTop => {},
        }

        // Automatic fractions.
        map.add_feature(FRAC, FeatureFlags::empty(), 1);
        map.add_feature(NUMR, FeatureFlags::empty(), 1);
        map.add_feature(DNOM, FeatureFlags::empty(), 1);

        map.enable_feature(RAND, FeatureFlags::RANDOM, MAX_VALUE);

        // Registered so callers can switch tracking off with "-trak".
        map.enable_feature(TRAK, FeatureFlags::HAS_FALLBACK, 1);

        map.enable_feature(HARF, FeatureFlags::empty(), 1);
        shaper.collect_features(self);
        let map = &mut self.map;
        map.enable_feature(BUZZ, FeatureFlags::empty(), 1);

        for (tag, flags) in COMMON_FEATURES {
            map.add_feature(tag, flags, 1);
        }

        if self.props.direction.is_horizontal() {
            for (tag, flags) in HORIZONTAL_FEATURES {
                map.add_feature(tag, flags, 1);
            }
        } else {
            map.enable_feature(VERT, FeatureFlags::GLOBAL_SEARCH, 1);
        }

        for feature in user_features {
            let flags = if feature.is_global() {
                FeatureFlags::GLOBAL
            } else {
                FeatureFlags::empty()
            };
            map.add_feature(feature.tag, flags, feature.value);
        }

        if self.apply_morx {
            for feature in user_features {
                self.alt_map.add_feature(feature);
            }
        }

        shaper.override_features(self);
    }

    /// Collects features, compiles the map and derives every backend and
    /// policy flag
    ///
    /// Fails only when the complex shaper cannot allocate its plan data.
    pub fn compile(mut self, user_features: &[Feature]) -> Result<ShapePlan, PlanError> {
        self.collect_features(user_features);

        let font = self.font;
        let map = self.map.compile(font);
        let alt_map = self.alt_map.compile();
        let shaper = self.shaper;
        let horizontal = self.props.direction.is_horizontal();

        let frac_mask = map.one_mask(FRAC);
        let numr_mask = map.one_mask(NUMR);
        let dnom_mask = map.one_mask(DNOM);
        let has_frac = frac_mask != 0 || (numr_mask != 0 && dnom_mask != 0);

        let rtlm_mask = map.one_mask(RTLM);
        let has_vert = map.one_mask(VERT) != 0;

        let kern_tag = if horizontal { KERN } else { VKRN };
        let (kern_mask, _) = map.mask(kern_tag);
        let requested_kerning = kern_mask != 0;
        let (trak_mask, _) = map.mask(TRAK);
        let requested_tracking = trak_mask != 0;

        let has_gpos_kern = map.has_feature_in(TableIndex::Gpos, kern_tag);
        let disable_gpos = shaper
            .gpos_tag()
            .is_some_and(|tag| Some(tag) != map.chosen_script(TableIndex::Gpos));

        let mut apply_kerx = false;
        let mut apply_gpos = false;
        if font.has_alt_positioning() {
            apply_kerx = true;
        } else if !self.apply_morx && !disable_gpos && font.has_ot_positioning() {
            apply_gpos = true;
        }

        let mut apply_kern = false;
        let mut apply_fallback_kern = false;
        if !apply_kerx && (!has_gpos_kern || !apply_gpos) {
            if font.has_alt_positioning() {
                apply_kerx = true;
            } else if font.has_legacy_kerning() {
                apply_kern = true;
            } else if requested_kerning {
                apply_fallback_kern = true;
            }
        }

        let zero_marks = shaper.zero_width_marks() != ZeroWidthMarks::None
            && !apply_kerx
            && (!apply_kern || !font.has_machine_kerning());
        let has_gpos_mark = map.one_mask(MARK) != 0;

        let adjust_mark_positioning_when_zeroing =
            !apply_gpos && !apply_kerx && (!apply_kern || !font.has_cross_kerning());
        let fallback_mark_positioning = adjust_mark_positioning_when_zeroing && shaper.fallback_position();

        let apply_trak = requested_tracking && font.has_tracking();

        let mut plan = ShapePlan {
            props: self.props,
            shaper,
            map,
            alt_map,
            data: None,
            frac_mask,
            numr_mask,
            dnom_mask,
            rtlm_mask,
            kern_mask,
            trak_mask,
            requested_kerning,
            requested_tracking,
            has_frac,
            has_vert,
            has_gpos_mark,
            zero_marks,
            fallback_glyph_classes: !font.has_glyph_classes(),
            fallback_mark_positioning,
            adjust_mark_positioning_when_zeroing,
            apply_gpos,
            apply_kern,
            apply_fallback_kern,
            apply_kerx,
            apply_morx: self.apply_morx,
            apply_trak,
        };

        log::debug!(
            "Planned '{}' for {:?}: gpos={} kerx={} kern={} fallback_kern={} morx={} trak={} zero_marks={} fallback_marks={}",
            plan.shaper.name(),
            plan.props.direction,
            plan.apply_gpos,
            plan.apply_kerx,
            plan.apply_kern,
            plan.apply_fallback_kern,
            plan.apply_morx,
            plan.apply_trak,
            plan.zero_marks,
            plan.fallback_mark_positioning,
        );

        let shaper = Arc::clone(&plan.shaper);
        plan.data = shaper.create_data(&plan).inspect_err(|err| {
            log::warn!("Shape plan compilation failed: {}", err);
        })?;

        Ok(plan)
    }
}

impl std::fmt::Debug for ShapePlanner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapePlanner")
            .field("props", &self.props)
            .field("shaper", &self.shaper.name())
            .field("apply_morx", &self.apply_morx)
            .finish_non_exhaustive()
    }
}
