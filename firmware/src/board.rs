//! Stimulator board driver for the STM32G0 target.
//!
//! [`StimBoard`] implements both hardware seams of `stim-core`: GPIO lines for
//! the enables and channel gates, SPI1 for the amplitude and supply DACs, and
//! an [`EdgeTimer`] that replays the programmed pulse edges against the
//! 1 MHz Embassy time base.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use stim_core::pulse::PulseEdges;

#[cfg(target_os = "none")]
use embassy_stm32::gpio::{Input, Output};
#[cfg(target_os = "none")]
use embassy_stm32::mode::Blocking;
#[cfg(target_os = "none")]
use embassy_stm32::spi::Spi;
#[cfg(target_os = "none")]
use embassy_time::Instant;
#[cfg(target_os = "none")]
use stim_core::pulse::PulseOutput;
#[cfg(target_os = "none")]
use stim_core::vos::VosOutput;
#[cfg(target_os = "none")]
use stim_core::{ChannelId, NUM_CHANNELS};

/// Edge timer resolution on this board: one Embassy tick per microsecond.
pub const EDGE_TICKS_PER_US: u32 = 1;
/// Leading-edge offset in edge timer ticks (37 µs).
pub const EDGE_LEAD_OFFSET_TICKS: u32 = 37;
/// Regulation sampling lead before the trailing edge.
pub const REGULATION_OFFSET_US: u32 = 10;

/// Software edge timer counting Embassy ticks since it was armed.
///
/// The count saturates at `u32::MAX`; pulses never come close.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct EdgeTimer {
    armed_at: Option<u64>,
    lead: u32,
    trail: u32,
    recharge: u32,
}

impl EdgeTimer {
    pub const fn new() -> Self {
        Self {
            armed_at: None,
            lead: 0,
            trail: 0,
            recharge: 0,
        }
    }

    /// Starts counting from `now_ticks`.
    pub fn arm(&mut self, edges: &PulseEdges, now_ticks: u64) {
        self.armed_at = Some(now_ticks);
        self.lead = edges.lead;
        self.trail = edges.trail;
        self.recharge = edges.recharge;
    }

    pub const fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    /// Ticks elapsed since [`EdgeTimer::arm`]; zero while stopped.
    pub fn count(&self, now_ticks: u64) -> u32 {
        self.armed_at.map_or(0, |armed_at| {
            u32::try_from(now_ticks.saturating_sub(armed_at)).unwrap_or(u32::MAX)
        })
    }

    /// `true` once the amplitude DAC has had the lead offset to settle.
    pub fn lead_reached(&self, now_ticks: u64) -> bool {
        self.armed_at.is_some() && self.count(now_ticks) >= self.lead
    }

    pub fn trail_reached(&self, now_ticks: u64) -> bool {
        self.armed_at.is_some() && self.count(now_ticks) >= self.trail
    }

    pub fn recharge_reached(&self, now_ticks: u64) -> bool {
        self.armed_at.is_some() && self.count(now_ticks) >= self.recharge
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// GPIO and SPI resources of the stimulator front end.
#[cfg(target_os = "none")]
pub struct StimBoard<'d> {
    stim_enable: Output<'d>,
    vos_enable: Output<'d>,
    anode: Output<'d>,
    amp_cs: Output<'d>,
    vos_cs: Output<'d>,
    outputs: [Output<'d>; NUM_CHANNELS],
    regulation: Input<'d>,
    spi: Spi<'d, Blocking>,
    timer: EdgeTimer,
}

#[cfg(target_os = "none")]
pub struct StimPins<'d> {
    pub stim_enable: Output<'d>,
    pub vos_enable: Output<'d>,
    pub anode: Output<'d>,
    pub amp_cs: Output<'d>,
    pub vos_cs: Output<'d>,
    pub outputs: [Output<'d>; NUM_CHANNELS],
    pub regulation: Input<'d>,
}

#[cfg(target_os = "none")]
impl<'d> StimBoard<'d> {
    pub fn new(pins: StimPins<'d>, spi: Spi<'d, Blocking>) -> Self {
        let StimPins {
            stim_enable,
            vos_enable,
            anode,
            mut amp_cs,
            mut vos_cs,
            outputs,
            regulation,
        } = pins;
        amp_cs.set_high();
        vos_cs.set_high();
        Self {
            stim_enable,
            vos_enable,
            anode,
            amp_cs,
            vos_cs,
            outputs,
            regulation,
            spi,
            timer: EdgeTimer::new(),
        }
    }

    fn now_ticks() -> u64 {
        Instant::now().as_ticks()
    }

    fn write_frame(spi: &mut Spi<'d, Blocking>, cs: &mut Output<'d>, frame: &[u8], dac: &str) {
        cs.set_low();
        if spi.blocking_write(frame).is_err() {
            defmt::warn!("board: {} DAC write failed", dac);
        }
        cs.set_high();
    }
}

#[cfg(target_os = "none")]
fn drive(output: &mut Output<'_>, high: bool) {
    if high {
        output.set_high();
    } else {
        output.set_low();
    }
}

#[cfg(target_os = "none")]
impl PulseOutput for StimBoard<'_> {
    fn set_stim_enable(&mut self, enabled: bool) {
        drive(&mut self.stim_enable, enabled);
    }

    fn write_amplitude_dac(&mut self, frame: [u8; 2]) {
        Self::write_frame(&mut self.spi, &mut self.amp_cs, &frame, "amplitude");
    }

    fn arm_edges(&mut self, edges: &PulseEdges) {
        self.timer.arm(edges, Self::now_ticks());
    }

    fn set_output_enable(&mut self, channel: ChannelId, enabled: bool) {
        if enabled && self.timer.is_armed() {
            // The gate opens on the lead edge; the trail edge closes it.
            while !self.timer.lead_reached(Self::now_ticks()) {}
        }
        drive(&mut self.outputs[channel.as_index()], enabled);
    }

    fn timer_count(&mut self) -> u32 {
        self.timer.count(Self::now_ticks())
    }

    fn trail_edge_reached(&mut self) -> bool {
        self.timer.trail_reached(Self::now_ticks())
    }

    fn recharge_edge_reached(&mut self) -> bool {
        self.timer.recharge_reached(Self::now_ticks())
    }

    fn sample_regulation(&mut self) -> bool {
        self.regulation.is_high()
    }

    fn reset_edge_timer(&mut self) {
        self.timer.reset();
    }
}

#[cfg(target_os = "none")]
impl VosOutput for StimBoard<'_> {
    fn write_vos_dac(&mut self, frame: [u8; 3]) {
        Self::write_frame(&mut self.spi, &mut self.vos_cs, &frame, "supply");
    }

    fn set_vos_enable(&mut self, enabled: bool) {
        drive(&mut self.vos_enable, enabled);
    }

    fn set_anode_connected(&mut self, connected: bool) {
        drive(&mut self.anode, connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stim_core::config::PulseTimerConfig;
    use stim_core::pulse::{PulseDef, PulseRequest};

    fn board_timer() -> PulseTimerConfig {
        PulseTimerConfig::new(EDGE_TICKS_PER_US, EDGE_LEAD_OFFSET_TICKS, REGULATION_OFFSET_US)
            .expect("non-zero resolution")
    }

    #[test]
    fn edges_follow_the_microsecond_time_base() {
        let timer = board_timer();
        let pulse = PulseDef::from_request(&PulseRequest::new(100, 50, 20), &timer)
            .expect("valid request");
        let edges = PulseEdges::new(&pulse, &timer);

        assert_eq!(edges.lead, 37);
        assert_eq!(edges.trail, 87);
        assert_eq!(edges.recharge, 107);
        assert_eq!(edges.measure, Some(77));
    }

    #[test]
    fn timer_counts_from_arm_instant() {
        let timer = board_timer();
        let pulse = PulseDef::from_request(&PulseRequest::new(100, 50, 20), &timer)
            .expect("valid request");
        let edges = PulseEdges::new(&pulse, &timer);
        let mut edge_timer = EdgeTimer::new();
        assert_eq!(edge_timer.count(5_000), 0);
        assert!(!edge_timer.recharge_reached(u64::MAX));

        assert!(!edge_timer.is_armed());
        assert!(!edge_timer.lead_reached(u64::MAX));

        edge_timer.arm(&edges, 1_000);
        assert!(edge_timer.is_armed());
        assert!(!edge_timer.lead_reached(1_036));
        assert!(edge_timer.lead_reached(1_037));
        assert_eq!(edge_timer.count(1_050), 50);
        assert!(!edge_timer.trail_reached(1_086));
        assert!(edge_timer.trail_reached(1_087));
        assert!(!edge_timer.recharge_reached(1_106));
        assert!(edge_timer.recharge_reached(1_107));

        edge_timer.reset();
        assert_eq!(edge_timer.count(2_000), 0);
        assert!(!edge_timer.lead_reached(2_000));
    }

    #[test]
    fn count_saturates_on_long_stalls() {
        let mut edge_timer = EdgeTimer::new();
        let edges = PulseEdges {
            lead: 0,
            trail: 1,
            recharge: 2,
            measure: None,
        };
        edge_timer.arm(&edges, 0);
        assert_eq!(edge_timer.count(u64::MAX), u32::MAX);
    }
}
