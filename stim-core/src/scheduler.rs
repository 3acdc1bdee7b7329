//! Millisecond tick scheduler.
//!
//! [`TickScheduler`] owns the state only the tick context touches and walks
//! the shared arena once per tick. Each call performs at most one major
//! action: skipping a period, ramping the supply up, de-energizing it, or
//! firing a pulse (followed by the ramp down when it was the last channel).

use crate::channels::ChannelId;
use crate::config::{MIN_DISCHARGE_TIME, TICK_PERIOD_MS};
use crate::pulse::{PulseReport, issue_pulse};
use crate::shared::{SharedState, StimCell, StimHardware, StimShared};
use crate::telemetry::{StimEventKind, TimestampMillis};
use crate::vos::VosCommand;

/// What a tick did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TickAction {
    /// Nothing was due.
    Idle,
    /// Too many consecutive autonomous syncs; the period was skipped.
    SyncSkipped,
    /// The supply has not reached its minimum level yet.
    AwaitingVos,
    /// The supply ramped to the stimulation level.
    VosRampUp,
    /// Discharge completed while idle; the supply was switched off.
    DeEnergized,
    /// A channel was due but its setpoint was not written yet.
    AwaitingSetup(ChannelId),
    /// A due channel was serviced. `report` is `None` for skipped pulses.
    PulseFired {
        channel: ChannelId,
        report: Option<PulseReport>,
        vos_ramped_down: bool,
    },
}

/// Tick-context bookkeeping.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TickScheduler {
    tick: u8,
    channels_completed: u8,
    vos_ramp_pending: bool,
    discharge_counter: u8,
    discharge_open: bool,
    auto_sync_count: u8,
}

impl TickScheduler {
    pub const fn new() -> Self {
        Self {
            tick: 0,
            channels_completed: 0,
            vos_ramp_pending: false,
            discharge_counter: 0,
            discharge_open: false,
            auto_sync_count: 0,
        }
    }

    /// Ticks since the last sync; wraps at 256.
    pub const fn tick(&self) -> u8 {
        self.tick
    }

    /// Consecutive autonomous syncs since the last network sync.
    pub const fn auto_sync_count(&self) -> u8 {
        self.auto_sync_count
    }

    /// Ticks since the last serviced pulse; saturates.
    pub const fn discharge_counter(&self) -> u8 {
        self.discharge_counter
    }

    /// Channels serviced since the last sync.
    pub const fn channels_completed(&self) -> u8 {
        self.channels_completed
    }

    /// Advances the system clock and runs one tick under the critical section.
    pub fn run_tick<H>(&mut self, shared: &StimShared<H>) -> TickAction
    where
        H: StimHardware,
    {
        let now_ms = shared.clock().advance(TICK_PERIOD_MS);
        shared.with(|cell| self.on_tick(cell, now_ms))
    }

    /// Runs one tick against an already locked cell.
    pub fn on_tick<H>(&mut self, cell: &mut StimCell<H>, now_ms: TimestampMillis) -> TickAction
    where
        H: StimHardware,
    {
        let StimCell { state, hardware } = cell;

        let autonomous = !state.sync_pending
            && self.tick > state.sync.auto_sync_time
            && state.mode.allows_autonomous_sync();
        if state.sync_pending || autonomous {
            if autonomous {
                self.auto_sync_count = self.auto_sync_count.saturating_add(1);
                state.diagnostics.total_auto_syncs =
                    state.diagnostics.total_auto_syncs.wrapping_add(1);
                if self.auto_sync_count > state.sync.max_auto_sync_count {
                    state.diagnostics.auto_sync_exceeded =
                        state.diagnostics.auto_sync_exceeded.wrapping_add(1);
                    self.tick = 0;
                    self.auto_sync_count = 0;
                    let exceeded_total = state.diagnostics.auto_sync_exceeded;
                    state
                        .telemetry
                        .record(StimEventKind::SyncSkipped { exceeded_total }, now_ms);
                    return TickAction::SyncSkipped;
                }
            } else {
                self.auto_sync_count = 0;
            }
            state.sync_pending = false;
            self.begin_period(state);
        }

        self.tick = self.tick.wrapping_add(1);
        for channel in &mut state.channels {
            if channel.timing.start_pulse {
                channel.timing.tick_count = channel.timing.tick_count.saturating_add(1);
            }
        }

        if !state.vos.ramp_complete() {
            return TickAction::AwaitingVos;
        }

        if self.vos_ramp_pending && self.tick >= state.schedule.vos_timing() {
            if state.vos.config().anode_setup() {
                hardware.set_anode_connected(true);
            }
            state.vos.apply(hardware, VosCommand::RampToStimulation);
            state
                .telemetry
                .record(StimEventKind::Vos(VosCommand::RampToStimulation), now_ms);
            self.vos_ramp_pending = false;
            return TickAction::VosRampUp;
        }

        self.discharge_counter = self.discharge_counter.saturating_add(1);
        if self.discharge_counter > state.sync.discharge_time
            && self.discharge_counter > MIN_DISCHARGE_TIME
        {
            if !self.discharge_open {
                hardware.set_stim_enable(true);
                self.discharge_open = true;
            }
            if state.mode.is_idle() {
                state.vos.apply(hardware, VosCommand::DeEnergize);
                state
                    .telemetry
                    .record(StimEventKind::Vos(VosCommand::DeEnergize), now_ms);
                return TickAction::DeEnergized;
            }
        }

        let Some(channel) = self.due_channel(state) else {
            return TickAction::Idle;
        };
        if !state.channel(channel).timing.setup_complete {
            let tick = state.channel(channel).timing.tick_count;
            state
                .telemetry
                .record(StimEventKind::PulseNotReady { channel, tick }, now_ms);
            return TickAction::AwaitingSetup(channel);
        }

        let pulse = state.channel(channel).pulse;
        let report = issue_pulse(hardware, channel, &pulse, &state.timer);
        self.discharge_counter = 0;
        self.discharge_open = false;

        let slot = state.channel_mut(channel);
        let tick = slot.timing.tick_count;
        slot.timing.start_pulse = false;
        slot.actual_fire_tick = tick;
        slot.max_fire_tick = slot.max_fire_tick.max(tick);
        if let Some(report) = report {
            slot.regulation = report.regulation;
            state.telemetry.record(
                StimEventKind::PulseFired {
                    channel,
                    tick,
                    regulation: report.regulation,
                    overran: report.overran,
                },
                now_ms,
            );
        }

        self.channels_completed = self.channels_completed.saturating_add(1);
        let vos_ramped_down = self.channels_completed == state.schedule.scheduled_channels();
        if vos_ramped_down {
            if state.vos.config().anode_setup() {
                hardware.set_anode_connected(false);
            }
            state.vos.apply(hardware, VosCommand::RampToMinimum);
            state
                .telemetry
                .record(StimEventKind::Vos(VosCommand::RampToMinimum), now_ms);
        }

        TickAction::PulseFired {
            channel,
            report,
            vos_ramped_down,
        }
    }

    fn begin_period(&mut self, state: &mut SharedState) {
        self.channels_completed = 0;
        self.vos_ramp_pending = state.schedule.scheduled_channels() > 0;
        self.tick = 0;

        for channel in ChannelId::ALL {
            let scheduled = state.schedule.stim_timing(channel).is_some();
            let interval = state.schedule.sync_interval(channel);
            let timing = &mut state.channel_mut(channel).timing;
            if !scheduled {
                timing.start_pulse = false;
                continue;
            }
            timing.sync_count = timing.sync_count.saturating_add(1);
            if timing.sync_count >= interval {
                timing.start_pulse = true;
                timing.tick_count = 0;
                timing.sync_count = 0;
                timing.setup_complete = false;
            }
        }
    }

    /// First channel with a pending pulse whose offset has been reached.
    fn due_channel(&self, state: &SharedState) -> Option<ChannelId> {
        ChannelId::ALL.into_iter().find(|channel| {
            let timing = &state.channel(*channel).timing;
            timing.start_pulse
                && state
                    .schedule
                    .stim_timing(*channel)
                    .is_some_and(|offset| timing.tick_count >= u16::from(offset))
        })
    }
}
