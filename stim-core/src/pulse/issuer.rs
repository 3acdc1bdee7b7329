use super::{PulseDef, PulseEdges, PulseOutput, RegulationStatus, amplitude_dac_frame};
use crate::channels::ChannelId;
use crate::config::PulseTimerConfig;

/// Busy-wait polls granted per programmed timer tick.
pub const SPIN_POLLS_PER_TICK: u32 = 4;
/// Extra polls on top of the per-tick allowance.
pub const SPIN_SLACK_POLLS: u32 = 1024;

/// Outcome of one delivered pulse.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PulseReport {
    pub channel: ChannelId,
    pub regulation: RegulationStatus,
    /// The edge timer stopped advancing and the outputs were forced off.
    pub overran: bool,
}

/// Poll allowance shared by every wait of one pulse.
struct SpinBudget {
    remaining: u32,
    exhausted: bool,
}

impl SpinBudget {
    fn for_edges(edges: &PulseEdges) -> Self {
        Self {
            remaining: edges
                .recharge
                .saturating_mul(SPIN_POLLS_PER_TICK)
                .saturating_add(SPIN_SLACK_POLLS),
            exhausted: false,
        }
    }

    /// Polls `reached` until it reports `true` or the allowance runs out.
    fn wait(&mut self, mut reached: impl FnMut() -> bool) -> bool {
        while !self.exhausted {
            if reached() {
                return true;
            }
            match self.remaining.checked_sub(1) {
                Some(left) => self.remaining = left,
                None => self.exhausted = true,
            }
        }
        false
    }
}

/// Drives one pulse on `channel` to completion.
///
/// Returns `None` for pulses with a zero width or interval; nothing is
/// touched in that case. Every wait is bounded by the programmed recharge
/// edge, so a stalled timer still ends with the output gated off and the
/// amplitude DAC at zero.
pub fn issue_pulse<H>(
    hw: &mut H,
    channel: ChannelId,
    pulse: &PulseDef,
    timer: &PulseTimerConfig,
) -> Option<PulseReport>
where
    H: PulseOutput + ?Sized,
{
    if !pulse.is_deliverable() {
        return None;
    }

    let edges = PulseEdges::new(pulse, timer);
    let mut budget = SpinBudget::for_edges(&edges);

    hw.set_stim_enable(true);
    hw.write_amplitude_dac(amplitude_dac_frame(pulse.dac_code()));
    hw.arm_edges(&edges);
    hw.set_output_enable(channel, true);

    let regulation = match edges.measure {
        Some(at) => {
            if budget.wait(|| hw.timer_count() >= at) {
                if hw.sample_regulation() {
                    RegulationStatus::InRegulation
                } else {
                    RegulationStatus::OutOfRegulation
                }
            } else {
                RegulationStatus::Indeterminate
            }
        }
        None => RegulationStatus::Indeterminate,
    };

    budget.wait(|| hw.trail_edge_reached());
    hw.set_output_enable(channel, false);
    hw.write_amplitude_dac(amplitude_dac_frame(0));

    budget.wait(|| hw.recharge_edge_reached());
    hw.set_stim_enable(false);
    hw.reset_edge_timer();

    Some(PulseReport {
        channel,
        regulation,
        overran: budget.exhausted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::PulseRequest;
    use crate::sim::{BoardEvent, SimulatedBoard};

    fn pulse(amplitude: u8, width_us: u8, ipi_us: u16) -> PulseDef {
        PulseDef::from_request(
            &PulseRequest::new(amplitude, width_us, ipi_us),
            &PulseTimerConfig::default(),
        )
        .expect("valid request")
    }

    #[test]
    fn skips_zero_width_and_zero_interval() {
        let mut board = SimulatedBoard::new();
        let timer = PulseTimerConfig::default();

        assert_eq!(
            issue_pulse(&mut board, ChannelId::Ch1, &pulse(10, 0, 20), &timer),
            None
        );
        assert_eq!(
            issue_pulse(&mut board, ChannelId::Ch1, &pulse(10, 50, 0), &timer),
            None
        );
        assert!(board.events().is_empty());
    }

    #[test]
    fn drives_edges_in_order() {
        let mut board = SimulatedBoard::new();
        let timer = PulseTimerConfig::default();
        let def = pulse(100, 50, 20);

        let report = issue_pulse(&mut board, ChannelId::Ch2, &def, &timer).expect("pulse fired");
        assert_eq!(report.regulation, RegulationStatus::InRegulation);
        assert!(!report.overran);

        let events = board.events();
        assert_eq!(events[0], BoardEvent::StimEnable(true));
        assert_eq!(events[1], BoardEvent::AmplitudeDac([0x0E, 0xB0]));
        assert_eq!(
            events[2],
            BoardEvent::EdgesArmed {
                lead: 296,
                trail: 696,
                recharge: 856
            }
        );
        assert_eq!(events[3], BoardEvent::OutputEnable(ChannelId::Ch2, true));
        match events[4] {
            BoardEvent::RegulationSampled { count, .. } => assert!((616..696).contains(&count)),
            other => panic!("expected regulation sample, got {other:?}"),
        }
        assert_eq!(events[5], BoardEvent::OutputEnable(ChannelId::Ch2, false));
        assert_eq!(events[6], BoardEvent::AmplitudeDac([0, 0]));
        assert_eq!(events[7], BoardEvent::StimEnable(false));
        assert_eq!(events[8], BoardEvent::EdgeTimerReset);
        assert_eq!(events.len(), 9);
    }

    #[test]
    fn reports_out_of_regulation() {
        let mut board = SimulatedBoard::new();
        board.set_in_regulation(false);
        let report = issue_pulse(
            &mut board,
            ChannelId::Ch1,
            &pulse(50, 50, 20),
            &PulseTimerConfig::default(),
        )
        .expect("pulse fired");
        assert_eq!(report.regulation, RegulationStatus::OutOfRegulation);
    }

    #[test]
    fn short_pulse_is_indeterminate_without_sampling() {
        let mut board = SimulatedBoard::new();
        let report = issue_pulse(
            &mut board,
            ChannelId::Ch1,
            &pulse(50, 10, 20),
            &PulseTimerConfig::default(),
        )
        .expect("pulse fired");
        assert_eq!(report.regulation, RegulationStatus::Indeterminate);
        assert!(
            !board
                .events()
                .iter()
                .any(|event| matches!(event, BoardEvent::RegulationSampled { .. }))
        );
    }

    #[test]
    fn stalled_timer_still_gates_output_off() {
        let mut board = SimulatedBoard::new();
        board.set_timer_stalled(true);
        let report = issue_pulse(
            &mut board,
            ChannelId::Ch3,
            &pulse(50, 50, 20),
            &PulseTimerConfig::default(),
        )
        .expect("pulse fired");

        assert!(report.overran);
        assert_eq!(report.regulation, RegulationStatus::Indeterminate);
        assert!(!board.output_enabled(ChannelId::Ch3));
        assert!(!board.stim_enabled());
        assert_eq!(board.amplitude_code(), 0);
    }
}
