//! Externally visible status of the stimulation core.
//!
//! [`StatusSnapshot`] copies everything the governor reads back out of the
//! shared arena in one critical section. [`StatusFormatter`] renders it as
//! text so the firmware log and the emulator console print the same lines.

use core::fmt;

use crate::channels::{ChannelId, NUM_CHANNELS};
use crate::mode::OperatingMode;
use crate::pulse::RegulationStatus;
use crate::setpoint::SetpointInputs;
use crate::shared::{StimShared, SyncDiagnostics};
use crate::telemetry::TimestampMillis;
use crate::waveform::PulseSetpoint;

/// Per-channel status.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChannelStatus {
    pub channel: ChannelId,
    /// Tick offset after sync, `None` when unscheduled.
    pub stim_timing: Option<u8>,
    /// Last (width, amplitude) written by the dispatch.
    pub output: PulseSetpoint,
    pub regulation: RegulationStatus,
    pub actual_fire_tick: u16,
    pub max_fire_tick: u16,
    pub start_pulse: bool,
    pub setup_complete: bool,
    pub x_index: u8,
    pub ceiling: u8,
}

/// Point-in-time copy of the core's observable state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub now_ms: TimestampMillis,
    pub mode: OperatingMode,
    pub vos_ready: bool,
    pub vos_level: Option<u16>,
    pub sync_pending: bool,
    pub vos_timing: u8,
    pub scheduled_channels: u8,
    pub diagnostics: SyncDiagnostics,
    pub channels: [ChannelStatus; NUM_CHANNELS],
}

impl StatusSnapshot {
    /// Copies the shared state and the background inputs.
    pub fn capture<H>(shared: &StimShared<H>, inputs: &SetpointInputs) -> Self {
        let now_ms = shared.now_ms();
        shared.with(|cell| {
            let state = &cell.state;
            let channels = ChannelId::ALL.map(|channel| {
                let slot = state.channel(channel);
                ChannelStatus {
                    channel,
                    stim_timing: state.schedule.stim_timing(channel),
                    output: slot.output,
                    regulation: slot.regulation,
                    actual_fire_tick: slot.actual_fire_tick,
                    max_fire_tick: slot.max_fire_tick,
                    start_pulse: slot.timing.start_pulse,
                    setup_complete: slot.timing.setup_complete,
                    x_index: inputs.x_index(channel),
                    ceiling: inputs.ceiling(channel),
                }
            });
            Self {
                now_ms,
                mode: state.mode,
                vos_ready: state.vos.ramp_complete(),
                vos_level: state.vos.level(),
                sync_pending: state.sync_pending,
                vos_timing: state.schedule.vos_timing(),
                scheduled_channels: state.schedule.scheduled_channels(),
                diagnostics: state.diagnostics,
                channels,
            }
        })
    }

    pub const fn channel(&self, channel: ChannelId) -> &ChannelStatus {
        &self.channels[channel.as_index()]
    }
}

/// Helper that renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the mode line (e.g. `mode patient-control t=1234ms sync=idle`).
    pub fn write_mode_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "mode {} t={}ms sync={}",
            self.snapshot.mode,
            self.snapshot.now_ms,
            if self.snapshot.sync_pending {
                "pending"
            } else {
                "idle"
            }
        )
    }

    /// Writes the supply line (e.g. `vos ready=true level=1200 ramp-at=3 scheduled=2`).
    pub fn write_vos_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(writer, "vos ready={} level=", self.snapshot.vos_ready)?;
        match self.snapshot.vos_level {
            Some(level) => write!(writer, "{level}")?,
            None => writer.write_str("off")?,
        }
        write!(
            writer,
            " ramp-at={} scheduled={}",
            self.snapshot.vos_timing, self.snapshot.scheduled_channels
        )
    }

    /// Writes the autonomous sync line (e.g. `autosync total=4 exceeded=0`).
    pub fn write_sync_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "autosync total={} exceeded={}",
            self.snapshot.diagnostics.total_auto_syncs, self.snapshot.diagnostics.auto_sync_exceeded
        )
    }

    /// Writes one channel line
    /// (e.g. `ch1 at=5 out=30us/22 reg=in fired=5 max=6 x=50 ceiling=200`).
    pub fn write_channel_line<W: fmt::Write>(
        &self,
        writer: &mut W,
        channel: ChannelId,
    ) -> fmt::Result {
        let status = self.snapshot.channel(channel);
        write!(writer, "{channel} at=")?;
        match status.stim_timing {
            Some(offset) => write!(writer, "{offset}")?,
            None => writer.write_str("off")?,
        }
        write!(
            writer,
            " out={}us/{} reg={} fired={} max={} x={} ceiling={}",
            status.output.width_us,
            status.output.amplitude,
            status.regulation,
            status.actual_fire_tick,
            status.max_fire_tick,
            status.x_index,
            status.ceiling
        )
    }

    /// Renders every status line.
    #[cfg(feature = "alloc")]
    pub fn lines(&self) -> alloc::vec::Vec<alloc::string::String> {
        use alloc::string::String;

        let mut lines = alloc::vec::Vec::with_capacity(3 + NUM_CHANNELS);
        let mut line = String::new();
        if self.write_mode_line(&mut line).is_ok() {
            lines.push(core::mem::take(&mut line));
        }
        if self.write_vos_line(&mut line).is_ok() {
            lines.push(core::mem::take(&mut line));
        }
        if self.write_sync_line(&mut line).is_ok() {
            lines.push(core::mem::take(&mut line));
        }
        for channel in ChannelId::ALL {
            if self.write_channel_line(&mut line, channel).is_ok() {
                lines.push(core::mem::take(&mut line));
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StimConfig;
    use crate::shared::SharedState;
    use heapless::String;

    #[test]
    fn renders_idle_snapshot() {
        let shared = StimShared::new(SharedState::new(StimConfig::default()), ());
        let snapshot = StatusSnapshot::capture(&shared, &SetpointInputs::new());
        let formatter = StatusFormatter::new(&snapshot);

        let mut line: String<96> = String::new();
        formatter.write_vos_line(&mut line).expect("fits");
        assert_eq!(line.as_str(), "vos ready=false level=off ramp-at=0 scheduled=0");

        line.clear();
        formatter
            .write_channel_line(&mut line, ChannelId::Ch4)
            .expect("fits");
        assert_eq!(
            line.as_str(),
            "ch4 at=off out=0us/0 reg=n/a fired=0 max=0 x=0 ceiling=200"
        );

        line.clear();
        formatter.write_mode_line(&mut line).expect("fits");
        assert_eq!(line.as_str(), "mode waiting t=0ms sync=idle");
    }
}
