//! Compile-time constants and runtime-tunable configuration.
//!
//! Each configuration struct is validated when it is built, so the tick
//! handler can trust every value it reads from shared state.

use crate::channels::{ChannelId, NUM_CHANNELS};
use crate::error::ConfigError;

/// Scheduler tick period.
pub const TICK_PERIOD_MS: u32 = 1;

/// Highest amplitude the pulse generator accepts (0.1 mA units).
pub const MAX_AMPLITUDE: u8 = 200;

/// Raw schedule value marking a channel as unscheduled.
pub const UNSCHEDULED: u8 = 0xFF;

/// Ticks the supply needs to settle at the stimulation level before a pulse.
pub const VOS_UP_TIME: u8 = 2;

/// Lower bound on the idle time before the discharge switch opens.
pub const MIN_DISCHARGE_TIME: u8 = 4;

/// Absolute supply floor written before the supply is enabled.
pub const VOS_FLOOR: u16 = 4 * 60;

/// Largest code the 12-bit supply DAC accepts.
pub const VOS_DAC_MAX: u16 = 0x0FFF;

/// Inter-pulse interval clamp applied by the setpoint dispatch.
pub const MIN_IPI_US: u16 = 5;
pub const MAX_IPI_US: u16 = 100;

/// Pulse timer defaults for the 8 MHz edge timer.
pub const DEFAULT_TICKS_PER_US: u32 = 8;
pub const DEFAULT_LEAD_OFFSET_TICKS: u32 = 296;
pub const DEFAULT_REGULATION_OFFSET_US: u32 = 10;

/// Resolution and fixed offsets of the three-edge pulse timer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseTimerConfig {
    ticks_per_us: u32,
    lead_offset_ticks: u32,
    regulation_offset_us: u32,
}

impl PulseTimerConfig {
    /// Builds a timer configuration, rejecting a zero resolution.
    pub const fn new(
        ticks_per_us: u32,
        lead_offset_ticks: u32,
        regulation_offset_us: u32,
    ) -> Result<Self, ConfigError> {
        if ticks_per_us == 0 {
            return Err(ConfigError::InvalidTimerResolution);
        }
        Ok(Self {
            ticks_per_us,
            lead_offset_ticks,
            regulation_offset_us,
        })
    }

    pub const fn ticks_per_us(&self) -> u32 {
        self.ticks_per_us
    }

    /// Timer count of the leading edge.
    pub const fn lead_offset_ticks(&self) -> u32 {
        self.lead_offset_ticks
    }

    /// Regulation sampling lead before the trailing edge, in timer ticks.
    pub const fn regulation_offset_ticks(&self) -> u32 {
        self.regulation_offset_us.saturating_mul(self.ticks_per_us)
    }

    /// Converts microseconds into timer ticks.
    pub const fn us_to_ticks(&self, micros: u32) -> u32 {
        micros.saturating_mul(self.ticks_per_us)
    }
}

impl Default for PulseTimerConfig {
    fn default() -> Self {
        Self {
            ticks_per_us: DEFAULT_TICKS_PER_US,
            lead_offset_ticks: DEFAULT_LEAD_OFFSET_TICKS,
            regulation_offset_us: DEFAULT_REGULATION_OFFSET_US,
        }
    }
}

/// Compliance supply levels and ramp geometry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VosConfig {
    minimum: u16,
    stimulation: u16,
    minimum_steps: u16,
    stimulation_steps: u16,
    anode_setup: bool,
}

impl VosConfig {
    /// Builds a supply configuration.
    ///
    /// Levels must satisfy `VOS_FLOOR <= minimum <= stimulation <= VOS_DAC_MAX`
    /// and both ramps need at least one step.
    pub const fn new(
        minimum: u16,
        stimulation: u16,
        minimum_steps: u16,
        stimulation_steps: u16,
        anode_setup: bool,
    ) -> Result<Self, ConfigError> {
        if minimum < VOS_FLOOR || stimulation < minimum || stimulation > VOS_DAC_MAX {
            return Err(ConfigError::InvalidVosLevels);
        }
        if minimum_steps == 0 || stimulation_steps == 0 {
            return Err(ConfigError::InvalidVosSteps);
        }
        Ok(Self {
            minimum,
            stimulation,
            minimum_steps,
            stimulation_steps,
            anode_setup,
        })
    }

    pub const fn minimum(&self) -> u16 {
        self.minimum
    }

    pub const fn stimulation(&self) -> u16 {
        self.stimulation
    }

    pub const fn minimum_steps(&self) -> u16 {
        self.minimum_steps
    }

    pub const fn stimulation_steps(&self) -> u16 {
        self.stimulation_steps
    }

    /// Whether the anode switch is connected around each stimulation ramp.
    pub const fn anode_setup(&self) -> bool {
        self.anode_setup
    }
}

impl Default for VosConfig {
    fn default() -> Self {
        Self {
            minimum: 1200,
            stimulation: 2400,
            minimum_steps: 10,
            stimulation_steps: 4,
            anode_setup: false,
        }
    }
}

/// Per-channel stimulation schedule plus the values derived from it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScheduleConfig {
    stim_timing: [Option<u8>; NUM_CHANNELS],
    sync_interval: [u8; NUM_CHANNELS],
    vos_timing: u8,
    scheduled_channels: u8,
}

impl ScheduleConfig {
    /// Schedule with every channel unscheduled and a sync interval of one.
    pub const fn new() -> Self {
        Self {
            stim_timing: [None; NUM_CHANNELS],
            sync_interval: [1; NUM_CHANNELS],
            vos_timing: 0,
            scheduled_channels: 0,
        }
    }

    /// Builds a schedule from raw per-channel offsets, where [`UNSCHEDULED`]
    /// marks a channel without pulses.
    pub fn from_raw(stim_timing: [u8; NUM_CHANNELS], sync_interval: [u8; NUM_CHANNELS]) -> Self {
        let mut schedule = Self::new();
        for channel in ChannelId::ALL {
            let index = channel.as_index();
            schedule.stim_timing[index] = decode_timing(stim_timing[index]);
            schedule.sync_interval[index] = sync_interval[index];
        }
        schedule.recompute();
        schedule
    }

    /// Tick offset after sync at which the channel fires.
    pub const fn stim_timing(&self, channel: ChannelId) -> Option<u8> {
        self.stim_timing[channel.as_index()]
    }

    /// Number of sync events between pulses on the channel.
    ///
    /// Zero behaves like one: the channel fires on every sync.
    pub const fn sync_interval(&self, channel: ChannelId) -> u8 {
        self.sync_interval[channel.as_index()]
    }

    /// Tick at which the supply starts ramping to the stimulation level.
    pub const fn vos_timing(&self) -> u8 {
        self.vos_timing
    }

    /// Channels with a tick offset.
    pub const fn scheduled_channels(&self) -> u8 {
        self.scheduled_channels
    }

    /// Sets one channel's offset from its raw value and recomputes derived fields.
    pub fn set_stim_timing(&mut self, channel: ChannelId, raw: u8) {
        self.stim_timing[channel.as_index()] = decode_timing(raw);
        self.recompute();
    }

    /// Sets one channel's sync interval.
    pub fn set_sync_interval(&mut self, channel: ChannelId, interval: u8) {
        self.sync_interval[channel.as_index()] = interval;
    }

    fn recompute(&mut self) {
        let mut earliest: Option<u8> = None;
        let mut scheduled = 0;
        for timing in self.stim_timing.iter().flatten() {
            scheduled += 1;
            earliest = Some(earliest.map_or(*timing, |current| current.min(*timing)));
        }
        self.scheduled_channels = scheduled;
        self.vos_timing = earliest.map_or(0, |timing| timing.saturating_sub(VOS_UP_TIME));
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self::new()
    }
}

const fn decode_timing(raw: u8) -> Option<u8> {
    if raw == UNSCHEDULED { None } else { Some(raw) }
}

/// Autonomous sync and discharge thresholds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SyncConfig {
    /// Intra-period tick count after which closed-loop mode synthesizes a sync.
    pub auto_sync_time: u8,
    /// Consecutive autonomous syncs tolerated before a period is skipped.
    pub max_auto_sync_count: u8,
    /// Idle ticks after the last pulse before the discharge switch opens.
    pub discharge_time: u8,
}

impl SyncConfig {
    pub const fn new(auto_sync_time: u8, max_auto_sync_count: u8, discharge_time: u8) -> Self {
        Self {
            auto_sync_time,
            max_auto_sync_count,
            discharge_time,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(60, 5, 10)
    }
}

/// Aggregate configuration installed into the shared arena at start-up.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StimConfig {
    pub timer: PulseTimerConfig,
    pub vos: VosConfig,
    pub schedule: ScheduleConfig,
    pub sync: SyncConfig,
}
