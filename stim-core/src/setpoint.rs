//! Background setpoint dispatch.
//!
//! For every channel the tick handler has armed (`start_pulse` set, setup not
//! yet complete) the dispatch picks the next (width, amplitude) pair for the
//! current mode, clamps the amplitude to the channel ceiling, and writes the
//! converted pulse back under the critical section. Conversion happens
//! outside the lock so the tick handler is held off as briefly as possible.

use crate::channels::{ChannelId, NUM_CHANNELS};
use crate::config::{MAX_AMPLITUDE, MAX_IPI_US, MIN_IPI_US};
use crate::error::ConfigError;
use crate::mode::{OperatingMode, SetpointSource};
use crate::pulse::{PulseDef, PulseRequest};
use crate::shared::StimShared;
use crate::telemetry::StimEventKind;
use crate::waveform::{ActivePatterns, PulseSetpoint};

/// Default inter-pulse interval in microseconds.
pub const DEFAULT_IPI_US: u16 = 20;

/// Inputs supplied by the governor, owned by the background context.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SetpointInputs {
    direct: [PulseSetpoint; NUM_CHANNELS],
    x_index: [u8; NUM_CHANNELS],
    ceiling: [u8; NUM_CHANNELS],
    ipi_us: u16,
}

impl SetpointInputs {
    pub const fn new() -> Self {
        Self {
            direct: [PulseSetpoint::OFF; NUM_CHANNELS],
            x_index: [0; NUM_CHANNELS],
            ceiling: [MAX_AMPLITUDE; NUM_CHANNELS],
            ipi_us: DEFAULT_IPI_US,
        }
    }

    pub const fn direct(&self, channel: ChannelId) -> PulseSetpoint {
        self.direct[channel.as_index()]
    }

    pub fn set_direct(&mut self, channel: ChannelId, setpoint: PulseSetpoint) {
        self.direct[channel.as_index()] = setpoint;
    }

    /// Zeroes every direct setpoint.
    pub fn clear_direct(&mut self) {
        self.direct = [PulseSetpoint::OFF; NUM_CHANNELS];
    }

    pub const fn x_index(&self, channel: ChannelId) -> u8 {
        self.x_index[channel.as_index()]
    }

    pub fn set_x_index(&mut self, channel: ChannelId, x: u8) {
        self.x_index[channel.as_index()] = x;
    }

    /// Amplitude ceiling applied before a pulse is configured.
    pub const fn ceiling(&self, channel: ChannelId) -> u8 {
        self.ceiling[channel.as_index()]
    }

    /// Sets a channel ceiling; values above [`MAX_AMPLITUDE`] are rejected.
    pub fn set_ceiling(&mut self, channel: ChannelId, ceiling: u8) -> Result<(), ConfigError> {
        if ceiling > MAX_AMPLITUDE {
            return Err(ConfigError::AmplitudeOutOfRange { amplitude: ceiling });
        }
        self.ceiling[channel.as_index()] = ceiling;
        Ok(())
    }

    /// Requested inter-pulse interval, before clamping.
    pub const fn ipi_us(&self) -> u16 {
        self.ipi_us
    }

    pub fn set_ipi_us(&mut self, ipi_us: u16) {
        self.ipi_us = ipi_us;
    }

    /// Interval actually programmed, clamped to the supported window.
    pub fn effective_ipi_us(&self) -> u16 {
        self.ipi_us.clamp(MIN_IPI_US, MAX_IPI_US)
    }

    /// Picks the unclamped setpoint for `channel` in `mode`.
    pub fn select(
        &self,
        mode: OperatingMode,
        patterns: &ActivePatterns,
        channel: ChannelId,
    ) -> PulseSetpoint {
        match mode.setpoint_source() {
            SetpointSource::Off { .. } => PulseSetpoint::OFF,
            SetpointSource::Interpolated => {
                patterns.table(channel).interpolate(self.x_index(channel))
            }
            SetpointSource::Direct => self.direct(channel),
        }
    }
}

impl Default for SetpointInputs {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts and installs a pulse request for a 1-based channel number.
///
/// Rejected requests leave the channel's current pulse in place.
pub fn configure_pulse_channel<H>(
    shared: &StimShared<H>,
    number: u8,
    request: &PulseRequest,
) -> Result<ChannelId, ConfigError> {
    let channel = ChannelId::from_number(number).ok_or(ConfigError::InvalidChannel(number))?;
    let timer = shared.with(|cell| cell.state.timer);
    let pulse = PulseDef::from_request(request, &timer)?;
    shared.with(|cell| cell.state.channel_mut(channel).pulse = pulse);
    Ok(channel)
}

/// Services every armed channel once. Returns the number of channels set up.
pub fn dispatch<H>(
    shared: &StimShared<H>,
    inputs: &mut SetpointInputs,
    patterns: &ActivePatterns,
) -> usize {
    let (mode, armed) = shared.with(|cell| {
        let mut armed = [false; NUM_CHANNELS];
        for (flag, channel) in armed.iter_mut().zip(cell.state.channels.iter()) {
            *flag = channel.timing.start_pulse && !channel.timing.setup_complete;
        }
        (cell.state.mode, armed)
    });

    if let SetpointSource::Off { clear_direct: true } = mode.setpoint_source() {
        inputs.clear_direct();
    }

    let mut serviced = 0;
    for channel in ChannelId::ALL {
        if !armed[channel.as_index()] {
            continue;
        }
        let setpoint = inputs
            .select(mode, patterns, channel)
            .clamped(inputs.ceiling(channel));
        let request = PulseRequest::new(
            setpoint.amplitude,
            setpoint.width_us,
            inputs.effective_ipi_us(),
        );

        match configure_pulse_channel(shared, channel.number(), &request) {
            Ok(_) => shared.with(|cell| {
                let slot = cell.state.channel_mut(channel);
                slot.output = setpoint;
                slot.timing.setup_complete = true;
            }),
            Err(error) => {
                let now_ms = shared.now_ms();
                shared.with(|cell| {
                    cell.state.channel_mut(channel).timing.setup_complete = true;
                    cell.record(
                        StimEventKind::ConfigRejected {
                            channel: Some(channel),
                            error,
                        },
                        now_ms,
                    );
                });
            }
        }
        serviced += 1;
    }
    serviced
}
