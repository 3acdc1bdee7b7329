#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

// Real-time stimulation core shared by the MCU firmware and the host emulator.
//
// Everything here stays `no_std`: hardware is reached through the traits in
// `pulse` and `vos`, shared state lives behind a critical-section mutex, and
// diagnostics land in a bounded telemetry ring instead of a logger.

pub mod channels;
pub mod config;
pub mod console;
pub mod controller;
pub mod error;
pub mod mode;
pub mod pulse;
pub mod scheduler;
pub mod setpoint;
pub mod shared;
pub mod sim;
pub mod status;
pub mod telemetry;
pub mod vos;
pub mod waveform;

pub use channels::{ChannelId, NUM_CHANNELS};
pub use controller::StimController;
pub use error::{ConfigError, ModeTransitionError, PatternError};
pub use mode::OperatingMode;
pub use shared::{StimCell, StimShared};
