use super::ComplexShaper;

/// Shaper for every script without one of its own
///
/// Adds no features and no hooks; marks are zeroed late and positioned by
/// the metrics fallback when nothing better is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultShaper;

impl ComplexShaper for DefaultShaper {
    fn name(&self) -> &'static str {
        "default"
    }
}
