//! Error types for oshape
//!
//! Shaping itself never fails: a missing table or glyph only degrades the
//! result. What can fail is compiling a plan (when a complex shaper cannot
//! set up its private data), loading a font, or parsing user input.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OshapeError>;

/// Main error type for oshape
#[derive(Debug, Error)]
pub enum OshapeError {
    #[error("Plan compilation failed: {0}")]
    Plan(#[from] PlanError),

    #[error("Font loading failed: {0}")]
    FontLoad(#[from] FontLoadError),

    #[error("Invalid input: {0}")]
    Parse(#[from] FeatureParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shape plan compilation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("shaper '{shaper}' could not allocate its plan data")]
    DataAllocation { shaper: &'static str },
}

/// Font loading errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FontLoadError {
    #[error("Font file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid font data")]
    InvalidData,

    #[error("Face index {index} out of range")]
    FaceIndexOutOfRange { index: u32 },

    #[error("Required table '{0}' is missing")]
    MissingTable(&'static str),
}

/// Errors from parsing tags, directions and feature strings
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeatureParseError {
    #[error("invalid tag: {0:?}")]
    InvalidTag(String),

    #[error("invalid direction: {0:?}")]
    InvalidDirection(String),

    #[error("invalid feature: {0:?}")]
    InvalidFeature(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_error_converts() {
        let err: OshapeError = PlanError::DataAllocation { shaper: "hebrew" }.into();
        assert!(matches!(err, OshapeError::Plan(_)));
        assert!(err.to_string().contains("hebrew"));
    }

    #[test]
    fn test_font_load_error_message() {
        let err: OshapeError = FontLoadError::FaceIndexOutOfRange { index: 3 }.into();
        assert_eq!(err.to_string(), "Font loading failed: Face index 3 out of range");
    }
}
