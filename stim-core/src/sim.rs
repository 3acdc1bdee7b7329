//! Simulated stimulator board for host builds.
//!
//! [`SimulatedBoard`] implements both hardware seams, records every call in a
//! bounded event log, and runs a fake edge timer that advances on each poll.
//! The emulator drives it interactively; tests assert on its event log.

use heapless::Vec;

use crate::channels::{ChannelId, NUM_CHANNELS};
use crate::pulse::{PulseEdges, PulseOutput};
use crate::vos::VosOutput;

/// Events retained before the log starts dropping new entries.
pub const BOARD_LOG_CAPACITY: usize = 512;

/// Timer ticks the simulated edge timer advances per poll.
pub const DEFAULT_TICKS_PER_POLL: u32 = 1;

/// Hardware interaction captured by the simulated board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BoardEvent {
    StimEnable(bool),
    AmplitudeDac([u8; 2]),
    EdgesArmed { lead: u32, trail: u32, recharge: u32 },
    OutputEnable(ChannelId, bool),
    RegulationSampled { count: u32, in_regulation: bool },
    EdgeTimerReset,
    VosDac([u8; 3]),
    VosEnable(bool),
    AnodeConnected(bool),
}

/// Recording board with a polled edge timer.
#[derive(Clone, Debug)]
pub struct SimulatedBoard {
    events: Vec<BoardEvent, BOARD_LOG_CAPACITY>,
    dropped: usize,
    edges: Option<PulseEdges>,
    count: u32,
    ticks_per_poll: u32,
    timer_stalled: bool,
    in_regulation: bool,
    stim_enabled: bool,
    vos_enabled: bool,
    anode_connected: bool,
    outputs: [bool; NUM_CHANNELS],
    amplitude_code: u16,
    vos_frame: Option<[u8; 3]>,
}

impl SimulatedBoard {
    pub const fn new() -> Self {
        Self {
            events: Vec::new(),
            dropped: 0,
            edges: None,
            count: 0,
            ticks_per_poll: DEFAULT_TICKS_PER_POLL,
            timer_stalled: false,
            in_regulation: true,
            stim_enabled: false,
            vos_enabled: false,
            anode_connected: false,
            outputs: [false; NUM_CHANNELS],
            amplitude_code: 0,
            vos_frame: None,
        }
    }

    /// Recorded hardware calls, oldest first.
    pub fn events(&self) -> &[BoardEvent] {
        &self.events
    }

    /// Events discarded because the log was full.
    pub const fn dropped_events(&self) -> usize {
        self.dropped
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }

    /// Sets the comparator level sampled during the next pulses.
    pub fn set_in_regulation(&mut self, in_regulation: bool) {
        self.in_regulation = in_regulation;
    }

    /// Freezes the edge timer so no edge is ever reached.
    pub fn set_timer_stalled(&mut self, stalled: bool) {
        self.timer_stalled = stalled;
    }

    /// Sets how far the timer moves per poll; zero is treated as one.
    pub fn set_ticks_per_poll(&mut self, ticks: u32) {
        self.ticks_per_poll = ticks.max(1);
    }

    pub const fn stim_enabled(&self) -> bool {
        self.stim_enabled
    }

    pub const fn vos_enabled(&self) -> bool {
        self.vos_enabled
    }

    pub const fn anode_connected(&self) -> bool {
        self.anode_connected
    }

    pub const fn output_enabled(&self, channel: ChannelId) -> bool {
        self.outputs[channel.as_index()]
    }

    /// Last code written to the amplitude DAC.
    pub const fn amplitude_code(&self) -> u16 {
        self.amplitude_code
    }

    /// Last supply level written, decoded from its frame.
    pub fn vos_level(&self) -> Option<u16> {
        self.vos_frame
            .map(|[_, high, low]| u16::from_be_bytes([high, low]) >> 4)
    }

    fn record(&mut self, event: BoardEvent) {
        if self.events.push(event).is_err() {
            self.dropped += 1;
        }
    }

    fn poll_timer(&mut self) -> u32 {
        if self.edges.is_some() && !self.timer_stalled {
            self.count = self.count.saturating_add(self.ticks_per_poll);
        }
        self.count
    }
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseOutput for SimulatedBoard {
    fn set_stim_enable(&mut self, enabled: bool) {
        self.stim_enabled = enabled;
        self.record(BoardEvent::StimEnable(enabled));
    }

    fn write_amplitude_dac(&mut self, frame: [u8; 2]) {
        self.amplitude_code = u16::from_be_bytes(frame);
        self.record(BoardEvent::AmplitudeDac(frame));
    }

    fn arm_edges(&mut self, edges: &PulseEdges) {
        self.edges = Some(*edges);
        self.count = 0;
        self.record(BoardEvent::EdgesArmed {
            lead: edges.lead,
            trail: edges.trail,
            recharge: edges.recharge,
        });
    }

    fn set_output_enable(&mut self, channel: ChannelId, enabled: bool) {
        self.outputs[channel.as_index()] = enabled;
        self.record(BoardEvent::OutputEnable(channel, enabled));
    }

    fn timer_count(&mut self) -> u32 {
        self.poll_timer()
    }

    fn trail_edge_reached(&mut self) -> bool {
        let count = self.poll_timer();
        self.edges.is_some_and(|edges| count >= edges.trail)
    }

    fn recharge_edge_reached(&mut self) -> bool {
        let count = self.poll_timer();
        self.edges.is_some_and(|edges| count >= edges.recharge)
    }

    fn sample_regulation(&mut self) -> bool {
        let in_regulation = self.in_regulation;
        self.record(BoardEvent::RegulationSampled {
            count: self.count,
            in_regulation,
        });
        in_regulation
    }

    fn reset_edge_timer(&mut self) {
        self.edges = None;
        self.count = 0;
        self.record(BoardEvent::EdgeTimerReset);
    }
}

impl VosOutput for SimulatedBoard {
    fn write_vos_dac(&mut self, frame: [u8; 3]) {
        self.vos_frame = Some(frame);
        self.record(BoardEvent::VosDac(frame));
    }

    fn set_vos_enable(&mut self, enabled: bool) {
        self.vos_enabled = enabled;
        self.record(BoardEvent::VosEnable(enabled));
    }

    fn set_anode_connected(&mut self, connected: bool) {
        self.anode_connected = connected;
        self.record(BoardEvent::AnodeConnected(connected));
    }
}
