#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The background task publishes each [`StatusSnapshot`] into lightweight
//! atomics so the console can answer `status` without taking the critical
//! section that the tick handler depends on.

use core::fmt;

use portable_atomic::{AtomicBool, AtomicU8, AtomicU16, AtomicU32, Ordering};
use stim_core::pulse::RegulationStatus;
use stim_core::status::StatusSnapshot;
use stim_core::{ChannelId, NUM_CHANNELS, OperatingMode};

static MODE: AtomicU8 = AtomicU8::new(OperatingMode::Waiting.to_raw());
static VOS_READY: AtomicBool = AtomicBool::new(false);
static UPTIME_MS: AtomicU32 = AtomicU32::new(0);
static AUTO_SYNCS: AtomicU32 = AtomicU32::new(0);
static AUTO_SYNC_EXCEEDED: AtomicU32 = AtomicU32::new(0);
static REGULATION: [AtomicU8; NUM_CHANNELS] =
    [const { AtomicU8::new(RegulationStatus::Indeterminate.to_raw()) }; NUM_CHANNELS];
static FIRE_TICK: [AtomicU16; NUM_CHANNELS] = [const { AtomicU16::new(0) }; NUM_CHANNELS];

/// Compact copy of the published status.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusSummary {
    pub mode: Option<OperatingMode>,
    pub vos_ready: bool,
    pub uptime_ms: u32,
    pub auto_syncs: u32,
    pub auto_sync_exceeded: u32,
    pub regulation: [RegulationStatus; NUM_CHANNELS],
    pub fire_tick: [u16; NUM_CHANNELS],
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            Some(mode) => write!(f, "mode {mode}")?,
            None => f.write_str("mode unknown")?,
        }
        write!(
            f,
            " t={}ms vos={} autosync={}/{}",
            self.uptime_ms,
            if self.vos_ready { "ready" } else { "off" },
            self.auto_syncs,
            self.auto_sync_exceeded
        )?;
        for channel in ChannelId::ALL {
            let index = channel.as_index();
            write!(
                f,
                " {channel}={}@{}",
                self.regulation[index], self.fire_tick[index]
            )?;
        }
        Ok(())
    }
}

/// Stores the observable parts of `snapshot`.
pub fn publish(snapshot: &StatusSnapshot) {
    MODE.store(snapshot.mode.to_raw(), Ordering::Relaxed);
    VOS_READY.store(snapshot.vos_ready, Ordering::Relaxed);
    UPTIME_MS.store(snapshot.now_ms, Ordering::Relaxed);
    AUTO_SYNCS.store(snapshot.diagnostics.total_auto_syncs, Ordering::Relaxed);
    AUTO_SYNC_EXCEEDED.store(snapshot.diagnostics.auto_sync_exceeded, Ordering::Relaxed);
    for status in &snapshot.channels {
        let index = status.channel.as_index();
        REGULATION[index].store(status.regulation.to_raw(), Ordering::Relaxed);
        FIRE_TICK[index].store(status.actual_fire_tick, Ordering::Relaxed);
    }
}

/// Returns the last published mode.
pub fn mode() -> Option<OperatingMode> {
    OperatingMode::from_raw(MODE.load(Ordering::Relaxed))
}

/// Builds a [`StatusSummary`] from the stored values.
pub fn summary() -> StatusSummary {
    StatusSummary {
        mode: mode(),
        vos_ready: VOS_READY.load(Ordering::Relaxed),
        uptime_ms: UPTIME_MS.load(Ordering::Relaxed),
        auto_syncs: AUTO_SYNCS.load(Ordering::Relaxed),
        auto_sync_exceeded: AUTO_SYNC_EXCEEDED.load(Ordering::Relaxed),
        regulation: ChannelId::ALL.map(|channel| {
            RegulationStatus::from_raw(REGULATION[channel.as_index()].load(Ordering::Relaxed))
        }),
        fire_tick: ChannelId::ALL
            .map(|channel| FIRE_TICK[channel.as_index()].load(Ordering::Relaxed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::String;
    use stim_core::config::StimConfig;
    use stim_core::setpoint::SetpointInputs;
    use stim_core::shared::SharedState;
    use stim_core::StimShared;
    use stim_core::sim::SimulatedBoard;

    #[test]
    fn published_snapshot_round_trips_through_atomics() {
        let shared = StimShared::new(
            SharedState::new(StimConfig::default()),
            SimulatedBoard::new(),
        );
        shared.with(|cell| {
            cell.state.mode = OperatingMode::RecordX;
            let slot = cell.state.channel_mut(ChannelId::Ch2);
            slot.regulation = RegulationStatus::OutOfRegulation;
            slot.actual_fire_tick = 300;
        });
        shared.clock().advance(42);

        publish(&StatusSnapshot::capture(&shared, &SetpointInputs::new()));
        let summary = summary();

        assert_eq!(summary.mode, Some(OperatingMode::RecordX));
        assert_eq!(summary.uptime_ms, 42);
        assert_eq!(summary.regulation[1], RegulationStatus::OutOfRegulation);
        assert_eq!(summary.fire_tick[1], 300);

        let mut line: String<160> = String::new();
        fmt::write(&mut line, format_args!("{summary}")).expect("summary fits");
        assert!(line.starts_with("mode record-x t=42ms vos=off autosync=0/0"));
        assert!(line.contains(" ch2=out@300"));
    }
}
