//! Pulse definitions and the hardware seam of the pulse generator.
//!
//! A [`PulseDef`] is the fully converted form of a configuration request:
//! timer ticks instead of microseconds and a ready-to-send DAC code. The tick
//! handler hands it to [`issue_pulse`] together with a [`PulseOutput`].

use core::fmt;

use crate::channels::ChannelId;
use crate::config::{MAX_AMPLITUDE, PulseTimerConfig};
use crate::error::ConfigError;

mod issuer;

pub use issuer::{PulseReport, SPIN_POLLS_PER_TICK, SPIN_SLACK_POLLS, issue_pulse};

/// Scale applied to the raw amplitude before the 16-bit shift.
pub const AMPLITUDE_DAC_SCALE: u32 = 2_462_788;
/// Rounding bias added after scaling.
pub const AMPLITUDE_DAC_ROUNDING: u32 = 4;
/// The amplitude DAC ignores the low three bits and tops out at 13 bits.
pub const AMPLITUDE_DAC_MASK: u32 = 0x1FF8;

/// Converts an amplitude (0.1 mA units) into the amplitude DAC code.
#[allow(clippy::cast_possible_truncation)]
pub const fn amplitude_dac_code(amplitude: u8) -> u16 {
    let scaled = (amplitude as u32 * AMPLITUDE_DAC_SCALE) >> 16;
    ((scaled + AMPLITUDE_DAC_ROUNDING) & AMPLITUDE_DAC_MASK) as u16
}

/// Two-byte amplitude DAC frame, most significant byte first.
pub const fn amplitude_dac_frame(code: u16) -> [u8; 2] {
    code.to_be_bytes()
}

/// Pulse parameters as requested by the setpoint path.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseRequest {
    pub amplitude: u8,
    pub width_us: u8,
    pub ipi_us: u16,
}

impl PulseRequest {
    pub const fn new(amplitude: u8, width_us: u8, ipi_us: u16) -> Self {
        Self {
            amplitude,
            width_us,
            ipi_us,
        }
    }

    /// Rejects amplitudes above [`MAX_AMPLITUDE`].
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.amplitude > MAX_AMPLITUDE {
            Err(ConfigError::AmplitudeOutOfRange {
                amplitude: self.amplitude,
            })
        } else {
            Ok(())
        }
    }
}

/// Per-channel pulse consumed by the tick handler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseDef {
    duration: u32,
    amplitude: u8,
    interval: u32,
    dac_code: u16,
}

impl PulseDef {
    /// Pulse that is never delivered.
    pub const IDLE: Self = Self {
        duration: 0,
        amplitude: 0,
        interval: 0,
        dac_code: 0,
    };

    /// Converts a validated request into timer ticks and a DAC code.
    pub fn from_request(
        request: &PulseRequest,
        timer: &PulseTimerConfig,
    ) -> Result<Self, ConfigError> {
        request.validate()?;
        Ok(Self {
            duration: timer.us_to_ticks(u32::from(request.width_us)),
            amplitude: request.amplitude,
            interval: timer.us_to_ticks(u32::from(request.ipi_us)),
            dac_code: amplitude_dac_code(request.amplitude),
        })
    }

    /// Pulse width in timer ticks.
    pub const fn duration(&self) -> u32 {
        self.duration
    }

    pub const fn amplitude(&self) -> u8 {
        self.amplitude
    }

    /// Recharge interval after the trailing edge, in timer ticks.
    pub const fn interval(&self) -> u32 {
        self.interval
    }

    pub const fn dac_code(&self) -> u16 {
        self.dac_code
    }

    /// Zero-width and zero-interval pulses are skipped.
    pub const fn is_deliverable(&self) -> bool {
        self.duration != 0 && self.interval != 0
    }
}

impl Default for PulseDef {
    fn default() -> Self {
        Self::IDLE
    }
}

/// Timer counts for the three programmed edges plus the sampling instant.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseEdges {
    pub lead: u32,
    pub trail: u32,
    pub recharge: u32,
    /// `None` when the pulse is too short to sample regulation.
    pub measure: Option<u32>,
}

impl PulseEdges {
    pub const fn new(pulse: &PulseDef, timer: &PulseTimerConfig) -> Self {
        let lead = timer.lead_offset_ticks();
        let trail = lead.saturating_add(pulse.duration);
        let recharge = trail.saturating_add(pulse.interval);
        let offset = timer.regulation_offset_ticks();
        let measure = if pulse.duration > offset {
            Some(trail - offset)
        } else {
            None
        };
        Self {
            lead,
            trail,
            recharge,
            measure,
        }
    }
}

/// Result of the regulation comparator sample taken during a pulse.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RegulationStatus {
    OutOfRegulation,
    InRegulation,
    /// Pulse too short to sample, or no pulse delivered yet.
    #[default]
    Indeterminate,
}

impl RegulationStatus {
    /// Numeric status exposed to the governor.
    pub const fn to_raw(self) -> u8 {
        match self {
            RegulationStatus::OutOfRegulation => 0,
            RegulationStatus::InRegulation => 1,
            RegulationStatus::Indeterminate => 2,
        }
    }

    /// Decodes [`RegulationStatus::to_raw`]; unknown values are indeterminate.
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => RegulationStatus::OutOfRegulation,
            1 => RegulationStatus::InRegulation,
            _ => RegulationStatus::Indeterminate,
        }
    }
}

impl fmt::Display for RegulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegulationStatus::OutOfRegulation => f.write_str("out"),
            RegulationStatus::InRegulation => f.write_str("in"),
            RegulationStatus::Indeterminate => f.write_str("n/a"),
        }
    }
}

/// Abstraction over the pulse generator hardware.
pub trait PulseOutput {
    /// Drives the stimulation enable line. While asserted the discharge switch is open.
    fn set_stim_enable(&mut self, enabled: bool);

    /// Sends a frame to the amplitude DAC.
    fn write_amplitude_dac(&mut self, frame: [u8; 2]);

    /// Programs and starts the three-edge timer.
    fn arm_edges(&mut self, edges: &PulseEdges);

    /// Gates the output stage of one channel.
    fn set_output_enable(&mut self, channel: ChannelId, enabled: bool);

    /// Current count of the edge timer.
    fn timer_count(&mut self) -> u32;

    /// Returns `true` once the trailing edge has fired.
    fn trail_edge_reached(&mut self) -> bool;

    /// Returns `true` once the recharge edge has fired.
    fn recharge_edge_reached(&mut self) -> bool;

    /// Samples the regulation comparator; `true` means in regulation.
    fn sample_regulation(&mut self) -> bool;

    /// Stops the edge timer and clears its flags.
    fn reset_edge_timer(&mut self);
}
