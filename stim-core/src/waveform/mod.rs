//! Waveform tables and the interpolator that turns an x index into a pulse.
//!
//! A table holds up to [`MAX_PATTERN_POINTS`] `(x, width, amplitude)` points.
//! The stored count is kept verbatim, even when it is out of range, so that a
//! corrupt record degrades to "no pulse" instead of reading past the table.

use crate::error::PatternError;

pub mod patterns;

pub use patterns::{
    ActivePatterns, MAX_PATTERNS, MemoryPatternStore, PATTERN_BASE_ADDRESS, PATTERN_RECORD_LEN,
    PatternRecord, PatternStore,
};

/// Capacity of a single channel's pattern table.
pub const MAX_PATTERN_POINTS: usize = 20;

/// Width and amplitude pair produced for one pulse.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PulseSetpoint {
    pub width_us: u8,
    pub amplitude: u8,
}

impl PulseSetpoint {
    /// No pulse.
    pub const OFF: Self = Self {
        width_us: 0,
        amplitude: 0,
    };

    pub const fn new(width_us: u8, amplitude: u8) -> Self {
        Self {
            width_us,
            amplitude,
        }
    }

    /// Caps the amplitude at `ceiling`, leaving the width unchanged.
    #[must_use]
    pub const fn clamped(self, ceiling: u8) -> Self {
        let amplitude = if self.amplitude > ceiling {
            ceiling
        } else {
            self.amplitude
        };
        Self {
            width_us: self.width_us,
            amplitude,
        }
    }
}

/// One breakpoint of a pattern table.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PatternPoint {
    pub x: u8,
    pub width_us: u8,
    pub amplitude: u8,
}

impl PatternPoint {
    pub const ZERO: Self = Self::new(0, 0, 0);

    pub const fn new(x: u8, width_us: u8, amplitude: u8) -> Self {
        Self {
            x,
            width_us,
            amplitude,
        }
    }
}

/// Per-channel interpolation table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PatternTable {
    count: u8,
    points: [PatternPoint; MAX_PATTERN_POINTS],
}

impl PatternTable {
    /// Table with no points; interpolates to [`PulseSetpoint::OFF`].
    pub const EMPTY: Self = Self {
        count: 0,
        points: [PatternPoint::ZERO; MAX_PATTERN_POINTS],
    };

    /// Builds a table from a slice of points.
    pub fn from_points(points: &[PatternPoint]) -> Result<Self, PatternError> {
        if points.len() > MAX_PATTERN_POINTS {
            return Err(PatternError::TooManyPoints(points.len()));
        }
        let mut table = Self::EMPTY;
        table.points[..points.len()].copy_from_slice(points);
        table.count =
            u8::try_from(points.len()).map_err(|_| PatternError::TooManyPoints(points.len()))?;
        Ok(table)
    }

    /// Builds a table from a stored count and the full point array.
    pub const fn from_raw(count: u8, points: [PatternPoint; MAX_PATTERN_POINTS]) -> Self {
        Self { count, points }
    }

    /// Stored point count, possibly out of range.
    pub const fn count(&self) -> u8 {
        self.count
    }

    /// Full point array, including unused slots.
    pub const fn raw_points(&self) -> &[PatternPoint; MAX_PATTERN_POINTS] {
        &self.points
    }

    /// Points usable for interpolation; empty when the count is out of range.
    pub fn points(&self) -> &[PatternPoint] {
        let count = usize::from(self.count);
        if (2..=MAX_PATTERN_POINTS).contains(&count) {
            &self.points[..count]
        } else {
            &[]
        }
    }

    /// Interpolates the pulse for `x`. See [`interpolate`].
    pub fn interpolate(&self, x: u8) -> PulseSetpoint {
        interpolate(self, x)
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Linear interpolation over the first segment bracketing `x`.
///
/// Yields [`PulseSetpoint::OFF`] when the table holds fewer than two or more
/// than [`MAX_PATTERN_POINTS`] points, or when no segment with increasing x
/// brackets the input. Intermediate values truncate toward zero.
pub fn interpolate(table: &PatternTable, x: u8) -> PulseSetpoint {
    let segment = table
        .points()
        .windows(2)
        .find(|pair| pair[0].x < pair[1].x && pair[0].x <= x && x <= pair[1].x);

    match segment {
        Some([low, high]) => PulseSetpoint::new(
            lerp(low.x, high.x, low.width_us, high.width_us, x),
            lerp(low.x, high.x, low.amplitude, high.amplitude, x),
        ),
        _ => PulseSetpoint::OFF,
    }
}

fn lerp(x1: u8, x2: u8, y1: u8, y2: u8, x: u8) -> u8 {
    let rise = i32::from(y2) - i32::from(y1);
    let run = i32::from(x2) - i32::from(x1);
    let value = i32::from(y1) + rise * (i32::from(x) - i32::from(x1)) / run;
    u8::try_from(value).unwrap_or(0)
}
