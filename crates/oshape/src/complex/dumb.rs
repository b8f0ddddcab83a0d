use super::{ComplexShaper, NormalizationMode, ZeroWidthMarks};

/// Stand-in used when the alternate substitution backend drives a
/// complex script
///
/// That backend does its own reordering and mark handling, so this shaper
/// leaves characters unnormalized and marks at full width.
#[derive(Debug, Clone, Copy, Default)]
pub struct DumbShaper;

impl ComplexShaper for DumbShaper {
    fn name(&self) -> &'static str {
        "dumb"
    }

    fn normalization_mode(&self) -> NormalizationMode {
        NormalizationMode::None
    }

    fn zero_width_marks(&self) -> ZeroWidthMarks {
        ZeroWidthMarks::None
    }

    fn fallback_position(&self) -> bool {
        false
    }
}
