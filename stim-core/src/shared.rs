//! State shared between the tick context and the background context.
//!
//! Everything both contexts touch lives in one [`StimCell`] behind a
//! critical-section mutex, reachable only through [`StimShared::with`]. The
//! free-running millisecond clock is the single exception: it has one writer
//! (the tick context) and is kept in an atomic so readers never block ticks.

use core::cell::RefCell;

use critical_section::Mutex;
use portable_atomic::{AtomicU32, Ordering};

use crate::channels::{ChannelId, NUM_CHANNELS};
use crate::config::{PulseTimerConfig, ScheduleConfig, StimConfig, SyncConfig};
use crate::mode::OperatingMode;
use crate::pulse::{PulseDef, PulseOutput, RegulationStatus};
use crate::telemetry::{StimEventKind, StimTelemetry, TimestampMillis};
use crate::vos::{VosOutput, VosSequencer};
use crate::waveform::PulseSetpoint;

/// Full hardware surface the stimulation core drives.
pub trait StimHardware: PulseOutput + VosOutput {}

impl<T> StimHardware for T where T: PulseOutput + VosOutput {}

/// Per-channel timing flags advanced by the tick handler.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChannelTiming {
    /// Ticks since this channel's sync fired; saturates.
    pub tick_count: u16,
    /// Syncs seen since the channel last started a pulse.
    pub sync_count: u8,
    /// A pulse is pending this period.
    pub start_pulse: bool,
    /// The background task has written this period's pulse.
    pub setup_complete: bool,
}

/// Per-channel slot of the shared arena.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChannelState {
    pub pulse: PulseDef,
    pub timing: ChannelTiming,
    /// Last (width, amplitude) written by the setpoint dispatch.
    pub output: PulseSetpoint,
    pub regulation: RegulationStatus,
    /// Channel tick count (ticks since its pulse was armed) at the last fire.
    pub actual_fire_tick: u16,
    /// Latest fire tick seen since start-up.
    pub max_fire_tick: u16,
}

/// Autonomous-sync bookkeeping exposed to the governor.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SyncDiagnostics {
    /// Autonomous syncs since start-up.
    pub total_auto_syncs: u32,
    /// Periods skipped because the autonomous limit was exceeded.
    pub auto_sync_exceeded: u32,
}

/// Data shared by both execution contexts.
#[derive(Debug)]
pub struct SharedState {
    pub channels: [ChannelState; NUM_CHANNELS],
    pub schedule: ScheduleConfig,
    pub sync: SyncConfig,
    pub timer: PulseTimerConfig,
    pub vos: VosSequencer,
    pub mode: OperatingMode,
    /// Network sync received and not yet consumed by the tick handler.
    pub sync_pending: bool,
    pub diagnostics: SyncDiagnostics,
    pub telemetry: StimTelemetry,
}

impl SharedState {
    pub const fn new(config: StimConfig) -> Self {
        Self {
            channels: [ChannelState {
                pulse: PulseDef::IDLE,
                timing: ChannelTiming {
                    tick_count: 0,
                    sync_count: 0,
                    start_pulse: false,
                    setup_complete: false,
                },
                output: PulseSetpoint::OFF,
                regulation: RegulationStatus::Indeterminate,
                actual_fire_tick: 0,
                max_fire_tick: 0,
            }; NUM_CHANNELS],
            schedule: config.schedule,
            sync: config.sync,
            timer: config.timer,
            vos: VosSequencer::new(config.vos),
            mode: OperatingMode::Waiting,
            sync_pending: false,
            diagnostics: SyncDiagnostics {
                total_auto_syncs: 0,
                auto_sync_exceeded: 0,
            },
            telemetry: StimTelemetry::new(),
        }
    }

    pub fn channel(&self, channel: ChannelId) -> &ChannelState {
        &self.channels[channel.as_index()]
    }

    pub fn channel_mut(&mut self, channel: ChannelId) -> &mut ChannelState {
        &mut self.channels[channel.as_index()]
    }
}

/// Shared state bundled with the hardware it drives.
#[derive(Debug)]
pub struct StimCell<H> {
    pub state: SharedState,
    pub hardware: H,
}

impl<H> StimCell<H> {
    pub const fn new(state: SharedState, hardware: H) -> Self {
        Self { state, hardware }
    }

    /// Records a telemetry event stamped with `now_ms`.
    pub fn record(&mut self, event: StimEventKind, now_ms: TimestampMillis) {
        self.state.telemetry.record(event, now_ms);
    }
}

/// Free-running millisecond clock advanced by the tick context.
#[derive(Debug, Default)]
pub struct SystemClock {
    millis: AtomicU32,
}

impl SystemClock {
    pub const fn new() -> Self {
        Self {
            millis: AtomicU32::new(0),
        }
    }

    /// Current time in milliseconds.
    pub fn now_ms(&self) -> TimestampMillis {
        self.millis.load(Ordering::Acquire)
    }

    /// Advances the clock by one tick. Only the tick context calls this.
    pub fn advance(&self, millis: u32) -> TimestampMillis {
        let next = self.millis.load(Ordering::Relaxed).wrapping_add(millis);
        self.millis.store(next, Ordering::Release);
        next
    }

    /// `true` once `alarm_ms` milliseconds have passed since `reference_ms`.
    pub fn has_elapsed(&self, reference_ms: TimestampMillis, alarm_ms: u32) -> bool {
        self.now_ms().wrapping_sub(reference_ms) >= alarm_ms
    }
}

/// Owner of the shared arena.
pub struct StimShared<H> {
    inner: Mutex<RefCell<StimCell<H>>>,
    clock: SystemClock,
}

impl<H> StimShared<H> {
    pub const fn new(state: SharedState, hardware: H) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(StimCell::new(state, hardware))),
            clock: SystemClock::new(),
        }
    }

    /// Runs `f` with exclusive access to the shared cell.
    ///
    /// Interrupts stay masked for the duration of `f`; keep it short.
    pub fn with<R>(&self, f: impl FnOnce(&mut StimCell<H>) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    pub fn clock(&self) -> &SystemClock {
        &self.clock
    }

    pub fn now_ms(&self) -> TimestampMillis {
        self.clock.now_ms()
    }
}
