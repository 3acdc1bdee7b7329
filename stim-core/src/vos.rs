//! Compliance supply (VOS) sequencing.
//!
//! The supply is only ever moved in discrete DAC steps. Output stages are
//! gated on [`VosSequencer::ramp_complete`], which is set once the supply has
//! reached its minimum level from off and cleared again on de-energize.

use core::fmt;

use crate::config::{VOS_DAC_MAX, VOS_FLOOR, VosConfig};
use crate::pulse::PulseOutput;

/// Command byte that prefixes every supply DAC frame.
pub const VOS_DAC_COMMAND: u8 = 0x30;

/// Encodes a 12-bit supply level into the three-byte DAC frame.
pub const fn vos_dac_frame(code: u16) -> [u8; 3] {
    let [high, low] = ((code & VOS_DAC_MAX) << 4).to_be_bytes();
    [VOS_DAC_COMMAND, high, low]
}

/// Supply transitions requested by the scheduler and the mode governor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VosCommand {
    /// Open the discharge switch, disable the supply, clear ramp-complete.
    DeEnergize,
    /// Step from the minimum to the stimulation level.
    RampToStimulation,
    /// Drop back from the stimulation level to the minimum.
    RampToMinimum,
    /// Bring the supply up from off to the minimum level.
    RampFromOff,
}

impl fmt::Display for VosCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VosCommand::DeEnergize => f.write_str("de-energize"),
            VosCommand::RampToStimulation => f.write_str("ramp-to-stimulation"),
            VosCommand::RampToMinimum => f.write_str("ramp-to-minimum"),
            VosCommand::RampFromOff => f.write_str("ramp-from-off"),
        }
    }
}

/// Abstraction over the supply DAC and its switches.
pub trait VosOutput {
    /// Sends a frame to the supply DAC.
    fn write_vos_dac(&mut self, frame: [u8; 3]);

    /// Enables or disables the supply regulator.
    fn set_vos_enable(&mut self, enabled: bool);

    /// Connects or disconnects the anode switch.
    fn set_anode_connected(&mut self, connected: bool);
}

/// Supply state plus the configuration it ramps between.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VosSequencer {
    config: VosConfig,
    ramp_complete: bool,
    level: Option<u16>,
}

impl VosSequencer {
    pub const fn new(config: VosConfig) -> Self {
        Self {
            config,
            ramp_complete: false,
            level: None,
        }
    }

    pub const fn config(&self) -> &VosConfig {
        &self.config
    }

    /// Replaces the supply levels. Takes effect on the next ramp.
    pub fn set_config(&mut self, config: VosConfig) {
        self.config = config;
    }

    /// `true` once the supply has reached its minimum level from off.
    pub const fn ramp_complete(&self) -> bool {
        self.ramp_complete
    }

    /// Last level written to the supply DAC, `None` while de-energized.
    pub const fn level(&self) -> Option<u16> {
        self.level
    }

    /// Executes one supply transition.
    pub fn apply<H>(&mut self, hw: &mut H, command: VosCommand)
    where
        H: PulseOutput + VosOutput + ?Sized,
    {
        let minimum = self.config.minimum();
        let stimulation = self.config.stimulation();
        match command {
            VosCommand::DeEnergize => {
                hw.set_stim_enable(true);
                hw.set_vos_enable(false);
                self.ramp_complete = false;
                self.level = None;
            }
            VosCommand::RampToStimulation => {
                if minimum != stimulation {
                    self.ramp(hw, minimum, stimulation, self.config.stimulation_steps());
                }
            }
            VosCommand::RampToMinimum => {
                if minimum != stimulation {
                    self.write(hw, minimum);
                }
            }
            VosCommand::RampFromOff => {
                self.write(hw, VOS_FLOOR);
                hw.set_vos_enable(true);
                self.ramp(hw, VOS_FLOOR, minimum, self.config.minimum_steps());
                self.ramp_complete = true;
            }
        }
    }

    /// Writes `steps - 1` evenly spaced intermediate levels, then `to` exactly.
    fn ramp<H>(&mut self, hw: &mut H, from: u16, to: u16, steps: u16)
    where
        H: VosOutput + ?Sized,
    {
        let steps = steps.max(1);
        let delta = (i32::from(to) - i32::from(from)) / i32::from(steps);
        for step in 1..steps {
            let level = i32::from(from) + delta * i32::from(step);
            self.write(hw, u16::try_from(level).unwrap_or(to));
        }
        self.write(hw, to);
    }

    fn write<H>(&mut self, hw: &mut H, level: u16)
    where
        H: VosOutput + ?Sized,
    {
        hw.write_vos_dac(vos_dac_frame(level));
        self.level = Some(level);
    }
}

impl Default for VosSequencer {
    fn default() -> Self {
        Self::new(VosConfig::default())
    }
}
