//! Background-context facade used by the network governor.
//!
//! [`StimController`] owns everything only the background context touches:
//! setpoint inputs, the active pattern tables, and the pattern store. It
//! applies mode transitions, sync payloads, and configuration changes to the
//! shared arena, and runs the setpoint dispatch on every background pass.

use crate::channels::ChannelId;
use crate::config::{PulseTimerConfig, SyncConfig, VosConfig};
use crate::error::{ConfigError, ModeTransitionError, PatternError};
use crate::mode::OperatingMode;
use crate::pulse::PulseRequest;
use crate::setpoint::{self, SetpointInputs};
use crate::shared::{StimCell, StimHardware, StimShared};
use crate::status::StatusSnapshot;
use crate::telemetry::StimEventKind;
use crate::vos::VosCommand;
use crate::waveform::{ActivePatterns, PATTERN_RECORD_LEN, PatternStore, PulseSetpoint};

/// Governor-facing controller for the background context.
#[derive(Debug)]
pub struct StimController<S> {
    inputs: SetpointInputs,
    patterns: ActivePatterns,
    store: S,
}

impl<S> StimController<S>
where
    S: PatternStore,
{
    pub const fn new(store: S) -> Self {
        Self {
            inputs: SetpointInputs::new(),
            patterns: ActivePatterns::new(),
            store,
        }
    }

    pub const fn inputs(&self) -> &SetpointInputs {
        &self.inputs
    }

    pub const fn patterns(&self) -> &ActivePatterns {
        &self.patterns
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Runs one background pass: services every channel the tick handler armed.
    pub fn update<H>(&mut self, shared: &StimShared<H>) -> usize {
        setpoint::dispatch(shared, &mut self.inputs, &self.patterns)
    }

    /// Requests a mode change.
    ///
    /// Stimulation modes are only entered from waiting; pattern-driven modes
    /// activate `function_group` first, and every stimulation mode brings the
    /// supply up from off. Waiting, stopped and hibernate are always accepted
    /// and reset the stimulation values; the supply is switched off later by
    /// the tick handler once discharge completes.
    pub fn enter_mode<H>(
        &mut self,
        shared: &StimShared<H>,
        mode: OperatingMode,
        function_group: u8,
    ) -> Result<(), ModeTransitionError>
    where
        H: StimHardware,
    {
        let from = shared.with(|cell| cell.state.mode);

        if mode.is_stimulating() {
            if from != OperatingMode::Waiting {
                return Err(ModeTransitionError::NotWaiting { from, to: mode });
            }
            if mode.uses_patterns() {
                self.update_patterns(shared, function_group, true)?;
            }
            let now_ms = shared.now_ms();
            shared.with(|cell| {
                let StimCell { state, hardware } = cell;
                state.mode = mode;
                state.vos.apply(hardware, VosCommand::RampFromOff);
                state
                    .telemetry
                    .record(StimEventKind::Vos(VosCommand::RampFromOff), now_ms);
                state
                    .telemetry
                    .record(StimEventKind::ModeChanged { from, to: mode }, now_ms);
            });
            return Ok(());
        }

        self.inputs.clear_direct();
        let now_ms = shared.now_ms();
        shared.with(|cell| {
            let state = &mut cell.state;
            state.mode = mode;
            for channel in &mut state.channels {
                channel.output = PulseSetpoint::OFF;
                channel.timing.start_pulse = false;
                channel.timing.sync_count = 0;
            }
            state.sync_pending = false;
            state
                .telemetry
                .record(StimEventKind::ModeChanged { from, to: mode }, now_ms);
        });
        Ok(())
    }

    /// Loads (`active`) or clears the stored patterns of a function group.
    pub fn update_patterns<H>(
        &mut self,
        shared: &StimShared<H>,
        group: u8,
        active: bool,
    ) -> Result<usize, PatternError> {
        let result = self.patterns.update_group(&self.store, group, active);
        let event = match result {
            Ok(records) => StimEventKind::PatternsUpdated {
                group,
                active,
                records: u8::try_from(records).unwrap_or(u8::MAX),
            },
            Err(error) => StimEventKind::PatternsRejected { group, error },
        };
        let now_ms = shared.now_ms();
        shared.with(|cell| cell.record(event, now_ms));
        result
    }

    /// Stores a raw record image into a pattern slot.
    ///
    /// Active tables are not touched; the record takes effect the next time
    /// its group is activated.
    pub fn write_pattern<H>(
        &mut self,
        shared: &StimShared<H>,
        slot: usize,
        group: u8,
        bytes: &[u8; PATTERN_RECORD_LEN],
    ) -> Result<(), PatternError> {
        let result = self.store.write_record(slot, group, bytes);
        if let Err(error) = result {
            let now_ms = shared.now_ms();
            shared.with(|cell| {
                cell.record(StimEventKind::PatternsRejected { group, error }, now_ms)
            });
        }
        result
    }

    /// Group tag and raw image of a pattern slot.
    pub fn read_pattern(
        &self,
        slot: usize,
    ) -> Result<(u8, [u8; PATTERN_RECORD_LEN]), PatternError> {
        let group = self.store.function_group(slot)?;
        Ok((group, self.store.read_record(slot)?))
    }

    /// Applies a sync message: maps payload bytes to x indices, then flags the sync.
    pub fn handle_sync<H>(&mut self, shared: &StimShared<H>, payload: &[u8]) {
        for channel in ChannelId::ALL {
            if let Some(x) = self.patterns.x_index_from_payload(channel, payload) {
                self.inputs.set_x_index(channel, x);
            }
        }
        shared.with(|cell| cell.state.sync_pending = true);
    }

    /// Converts and installs a pulse for a 1-based channel number.
    pub fn configure_pulse_channel<H>(
        &mut self,
        shared: &StimShared<H>,
        number: u8,
        request: &PulseRequest,
    ) -> Result<ChannelId, ConfigError> {
        setpoint::configure_pulse_channel(shared, number, request)
            .inspect_err(|error| record_rejection(shared, ChannelId::from_number(number), *error))
    }

    /// Sets the direct (width, amplitude) setpoint of a channel.
    pub fn set_direct_setpoint(&mut self, channel: ChannelId, setpoint: PulseSetpoint) {
        self.inputs.set_direct(channel, setpoint);
    }

    /// Overrides the x index of a channel until the next mapped sync.
    pub fn set_x_index(&mut self, channel: ChannelId, x: u8) {
        self.inputs.set_x_index(channel, x);
    }

    /// Sets the amplitude ceiling of a channel.
    pub fn set_amplitude_ceiling<H>(
        &mut self,
        shared: &StimShared<H>,
        channel: ChannelId,
        ceiling: u8,
    ) -> Result<(), ConfigError> {
        self.inputs
            .set_ceiling(channel, ceiling)
            .inspect_err(|error| record_rejection(shared, Some(channel), *error))
    }

    /// Sets the requested inter-pulse interval for every channel.
    pub fn set_inter_pulse_interval(&mut self, ipi_us: u16) {
        self.inputs.set_ipi_us(ipi_us);
    }

    /// Updates one channel's schedule from its raw offset and sync interval.
    pub fn set_channel_schedule<H>(
        &mut self,
        shared: &StimShared<H>,
        channel: ChannelId,
        raw_timing: u8,
        sync_interval: u8,
    ) {
        shared.with(|cell| {
            let schedule = &mut cell.state.schedule;
            schedule.set_stim_timing(channel, raw_timing);
            schedule.set_sync_interval(channel, sync_interval);
        });
    }

    pub fn set_sync_config<H>(&mut self, shared: &StimShared<H>, sync: SyncConfig) {
        shared.with(|cell| cell.state.sync = sync);
    }

    pub fn set_vos_config<H>(&mut self, shared: &StimShared<H>, vos: VosConfig) {
        shared.with(|cell| cell.state.vos.set_config(vos));
    }

    pub fn set_timer_config<H>(&mut self, shared: &StimShared<H>, timer: PulseTimerConfig) {
        shared.with(|cell| cell.state.timer = timer);
    }

    /// Captures the externally visible state.
    pub fn snapshot<H>(&self, shared: &StimShared<H>) -> StatusSnapshot {
        StatusSnapshot::capture(shared, &self.inputs)
    }
}

fn record_rejection<H>(shared: &StimShared<H>, channel: Option<ChannelId>, error: ConfigError) {
    let now_ms = shared.now_ms();
    shared.with(|cell| cell.record(StimEventKind::ConfigRejected { channel, error }, now_ms));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StimConfig;
    use crate::shared::SharedState;
    use crate::sim::SimulatedBoard;
    use crate::waveform::{MemoryPatternStore, PatternPoint, PatternRecord, PatternTable};

    fn shared() -> StimShared<SimulatedBoard> {
        StimShared::new(SharedState::new(StimConfig::default()), SimulatedBoard::new())
    }

    fn store_with_group(group: u8) -> MemoryPatternStore {
        let table = PatternTable::from_points(&[
            PatternPoint::new(0, 10, 5),
            PatternPoint::new(100, 50, 40),
        ])
        .expect("two points fit");
        let mut store = MemoryPatternStore::new();
        store
            .store(0, group, &PatternRecord::new(ChannelId::Ch1, 2, table))
            .expect("slot 0");
        store
    }

    #[test]
    fn stimulation_modes_require_waiting() {
        let shared = shared();
        let mut controller = StimController::new(MemoryPatternStore::new());
        controller
            .enter_mode(&shared, OperatingMode::Stopped, 0)
            .expect("stopped is always allowed");

        assert_eq!(
            controller.enter_mode(&shared, OperatingMode::YManual, 0),
            Err(ModeTransitionError::NotWaiting {
                from: OperatingMode::Stopped,
                to: OperatingMode::YManual,
            })
        );
        assert!(!shared.with(|cell| cell.state.vos.ramp_complete()));
    }

    #[test]
    fn entering_patient_control_loads_patterns_and_ramps_supply() {
        let shared = shared();
        let mut controller = StimController::new(store_with_group(4));

        controller
            .enter_mode(&shared, OperatingMode::PatientControl, 4)
            .expect("entry from waiting");

        assert_eq!(controller.patterns().active_group(ChannelId::Ch1), Some(4));
        shared.with(|cell| {
            assert_eq!(cell.state.mode, OperatingMode::PatientControl);
            assert!(cell.state.vos.ramp_complete());
            assert!(cell.hardware.vos_enabled());
        });
    }

    #[test]
    fn pattern_failure_blocks_mode_entry() {
        let shared = shared();
        let mut store = MemoryPatternStore::new();
        let mut corrupt = [0u8; crate::waveform::PATTERN_RECORD_LEN];
        corrupt[0] = 7;
        store.store_raw(0, 1, &corrupt).expect("slot 0");
        let mut controller = StimController::new(store);

        assert_eq!(
            controller.enter_mode(&shared, OperatingMode::XManual, 1),
            Err(ModeTransitionError::Patterns(PatternError::InvalidChannel(7)))
        );
        assert_eq!(
            shared.with(|cell| cell.state.mode),
            OperatingMode::Waiting
        );
    }

    #[test]
    fn entering_stopped_resets_stimulation_values() {
        let shared = shared();
        let mut controller = StimController::new(MemoryPatternStore::new());
        controller.set_direct_setpoint(ChannelId::Ch3, PulseSetpoint::new(40, 40));
        controller
            .enter_mode(&shared, OperatingMode::YManual, 0)
            .expect("entry from waiting");
        shared.with(|cell| {
            cell.state.sync_pending = true;
            let slot = cell.state.channel_mut(ChannelId::Ch3);
            slot.timing.start_pulse = true;
            slot.timing.sync_count = 3;
            slot.output = PulseSetpoint::new(40, 40);
        });

        controller
            .enter_mode(&shared, OperatingMode::Stopped, 0)
            .expect("stopped is always allowed");

        assert_eq!(controller.inputs().direct(ChannelId::Ch3), PulseSetpoint::OFF);
        shared.with(|cell| {
            assert!(!cell.state.sync_pending);
            let slot = cell.state.channel(ChannelId::Ch3);
            assert!(!slot.timing.start_pulse);
            assert_eq!(slot.timing.sync_count, 0);
            assert_eq!(slot.output, PulseSetpoint::OFF);
            assert!(cell.state.vos.ramp_complete(), "supply waits for discharge");
        });
    }

    #[test]
    fn sync_payload_updates_mapped_x_index() {
        let shared = shared();
        let mut controller = StimController::new(store_with_group(2));
        controller
            .update_patterns(&shared, 2, true)
            .expect("group loads");

        controller.handle_sync(&shared, &[9, 77]);

        assert_eq!(controller.inputs().x_index(ChannelId::Ch1), 77);
        assert!(shared.with(|cell| cell.state.sync_pending));
    }

    #[test]
    fn rejected_configuration_is_recorded() {
        let shared = shared();
        let mut controller = StimController::new(MemoryPatternStore::new());

        let result =
            controller.configure_pulse_channel(&shared, 2, &PulseRequest::new(250, 50, 20));

        assert_eq!(
            result,
            Err(ConfigError::AmplitudeOutOfRange { amplitude: 250 })
        );
        let latest = shared.with(|cell| cell.state.telemetry.latest().copied());
        assert_eq!(
            latest.map(|record| record.event),
            Some(StimEventKind::ConfigRejected {
                channel: Some(ChannelId::Ch2),
                error: ConfigError::AmplitudeOutOfRange { amplitude: 250 },
            })
        );
    }
}
