//! Error types surfaced by the stimulation core.
//!
//! Every rejection leaves the previously applied state untouched. The governor
//! forwards rejections as numeric status codes via [`ConfigError::status_code`].

use core::fmt;

use crate::mode::OperatingMode;

/// Status code reported for an accepted request.
pub const STATUS_OK: u8 = 0;
/// Status code reported for a rejected request.
pub const STATUS_REJECTED: u8 = 1;

/// Configuration requests the core refuses to apply.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Requested amplitude exceeds the hardware ceiling.
    AmplitudeOutOfRange { amplitude: u8 },
    /// Channel number outside 1..=4.
    InvalidChannel(u8),
    /// Pulse timer resolution of zero ticks per microsecond.
    InvalidTimerResolution,
    /// Supply levels not ordered floor <= minimum <= stimulation <= DAC range.
    InvalidVosLevels,
    /// Supply ramp with zero steps.
    InvalidVosSteps,
}

impl ConfigError {
    /// Numeric status forwarded to the network governor.
    pub const fn status_code(self) -> u8 {
        STATUS_REJECTED
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::AmplitudeOutOfRange { amplitude } => {
                write!(f, "amplitude {amplitude} exceeds ceiling")
            }
            ConfigError::InvalidChannel(number) => write!(f, "invalid channel {number}"),
            ConfigError::InvalidTimerResolution => f.write_str("timer resolution must be non-zero"),
            ConfigError::InvalidVosLevels => f.write_str("supply levels out of order"),
            ConfigError::InvalidVosSteps => f.write_str("supply ramp needs at least one step"),
        }
    }
}

/// Pattern storage and activation failures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PatternError {
    /// Record names a channel outside 1..=4.
    InvalidChannel(u8),
    /// Pattern slot outside the storage range.
    InvalidSlot(usize),
    /// Table would hold more points than a record can carry.
    TooManyPoints(usize),
    /// Backing store refused the read or write.
    Storage,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternError::InvalidChannel(number) => write!(f, "pattern channel {number} invalid"),
            PatternError::InvalidSlot(slot) => write!(f, "pattern slot {slot} out of range"),
            PatternError::TooManyPoints(count) => write!(f, "{count} pattern points exceed table"),
            PatternError::Storage => f.write_str("pattern storage unavailable"),
        }
    }
}

/// Mode change requests refused by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ModeTransitionError {
    /// Stimulation modes may only be entered from waiting.
    NotWaiting {
        from: OperatingMode,
        to: OperatingMode,
    },
    /// Pattern activation failed; the mode was left unchanged.
    Patterns(PatternError),
}

impl From<PatternError> for ModeTransitionError {
    fn from(value: PatternError) -> Self {
        ModeTransitionError::Patterns(value)
    }
}

impl fmt::Display for ModeTransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeTransitionError::NotWaiting { from, to } => {
                write!(f, "cannot enter {to} from {from}")
            }
            ModeTransitionError::Patterns(err) => write!(f, "{err}"),
        }
    }
}
