//! Work budgets for a single shaping call
//!
//! Pathological fonts can make lookups grow or churn a buffer without
//! bound. Every shaping call therefore derives two guard counters from the
//! input length: `max_len` caps how long the buffer may grow and `max_ops`
//! caps how many glyph operations lookups may perform. Running out is never
//! an error; lookups stop changing the buffer and whatever was produced so
//! far is the result.
//!
//! The factors and minimums are configuration, not semantics. They default
//! to the values below and can be overridden per buffer or from the
//! environment:
//!
//! ```bash
//! OSHAPE_MAX_LEN_FACTOR=32 OSHAPE_MAX_OPS_MIN=4096 ./my_app
//! ```
//!
//! # Example
//!
//! ```
//! use oshape_core::limits::BufferLimits;
//!
//! let limits = BufferLimits::default();
//! assert_eq!(limits.max_len_for(10), 16384);
//! assert_eq!(limits.max_len_for(1000), 64_000);
//! ```

/// Static `max_len` outside of a shaping call
pub const MAX_LEN_DEFAULT: usize = 0x3FFF_FFFF;

/// Static `max_ops` outside of a shaping call
pub const MAX_OPS_DEFAULT: i32 = 0x1FFF_FFFF;

pub const MAX_LEN_FACTOR: usize = 64;
pub const MAX_LEN_MIN: usize = 16384;
pub const MAX_OPS_FACTOR: usize = 1024;
pub const MAX_OPS_MIN: usize = 16384;

/// Guard-counter policy for one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    pub max_len_factor: usize,
    pub max_len_min: usize,
    pub max_ops_factor: usize,
    pub max_ops_min: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_len_factor: MAX_LEN_FACTOR,
            max_len_min: MAX_LEN_MIN,
            max_ops_factor: MAX_OPS_FACTOR,
            max_ops_min: MAX_OPS_MIN,
        }
    }
}

impl BufferLimits {
    /// Defaults, with any `OSHAPE_MAX_*` environment overrides applied
    pub fn from_env() -> Self {
        let mut limits = Self::default();
        read_env("OSHAPE_MAX_LEN_FACTOR", &mut limits.max_len_factor);
        read_env("OSHAPE_MAX_LEN_MIN", &mut limits.max_len_min);
        read_env("OSHAPE_MAX_OPS_FACTOR", &mut limits.max_ops_factor);
        read_env("OSHAPE_MAX_OPS_MIN", &mut limits.max_ops_min);
        limits
    }

    /// `max(len * factor, min)`, or the static default on overflow
    pub fn max_len_for(&self, len: usize) -> usize {
        match len.checked_mul(self.max_len_factor) {
            Some(scaled) => scaled.max(self.max_len_min),
            None => MAX_LEN_DEFAULT,
        }
    }

    /// `max(len * factor, min)`, or the static default on overflow
    pub fn max_ops_for(&self, len: usize) -> i32 {
        len.checked_mul(self.max_ops_factor)
            .map(|scaled| scaled.max(self.max_ops_min))
            .and_then(|ops| i32::try_from(ops).ok())
            .unwrap_or(MAX_OPS_DEFAULT)
    }
}

fn read_env(name: &str, slot: &mut usize) {
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.trim().parse::<usize>() {
        Ok(value) => {
            log::info!("Buffer limit {} set to {} via environment", name, value);
            *slot = value;
        },
        Err(_) => log::warn!("Ignoring unparseable {}={:?}", name, raw),
    }
}
