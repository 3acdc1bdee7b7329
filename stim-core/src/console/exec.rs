//! Applies parsed console commands to a [`StimController`].

use core::fmt;

use super::ConsoleCommand;
use crate::channels::ChannelId;
use crate::controller::StimController;
use crate::error::{ConfigError, ModeTransitionError, PatternError, STATUS_OK};
use crate::mode::OperatingMode;
use crate::pulse::PulseRequest;
use crate::shared::{StimHardware, StimShared};
use crate::waveform::{PATTERN_RECORD_LEN, PatternStore, PulseSetpoint};

/// Result of a governor command, rendered as one console line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandReply {
    ModeEntered(OperatingMode),
    Scheduled {
        channel: ChannelId,
        vos_timing: u8,
        scheduled_channels: u8,
    },
    SetpointStored {
        channel: ChannelId,
        setpoint: PulseSetpoint,
    },
    XIndexStored {
        channel: ChannelId,
        x: u8,
    },
    CeilingStored {
        channel: ChannelId,
        ceiling: u8,
    },
    IpiStored {
        effective_us: u16,
    },
    PulseConfigured(ChannelId),
    PatternStored {
        slot: u8,
        group: u8,
    },
    PatternRecord {
        slot: u8,
        group: u8,
        record: [u8; PATTERN_RECORD_LEN],
    },
    PatternsApplied {
        group: u8,
        records: usize,
    },
    SyncQueued {
        bytes: usize,
    },
    Rejected(ConfigError),
    ModeRefused(ModeTransitionError),
    PatternsRefused(PatternError),
    /// `tick`, `status` and `help` depend on the host context.
    NotApplied,
}

impl CommandReply {
    pub const fn is_ok(&self) -> bool {
        !matches!(
            self,
            CommandReply::Rejected(_)
                | CommandReply::ModeRefused(_)
                | CommandReply::PatternsRefused(_)
                | CommandReply::NotApplied
        )
    }
}

impl fmt::Display for CommandReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandReply::ModeEntered(mode) => write!(f, "OK mode {mode}"),
            CommandReply::Scheduled {
                channel,
                vos_timing,
                scheduled_channels,
            } => write!(
                f,
                "OK timing {channel} ramp-at={vos_timing} scheduled={scheduled_channels}"
            ),
            CommandReply::SetpointStored { channel, setpoint } => write!(
                f,
                "OK setpoint {channel} {}us/{}",
                setpoint.width_us, setpoint.amplitude
            ),
            CommandReply::XIndexStored { channel, x } => write!(f, "OK x {channel} {x}"),
            CommandReply::CeilingStored { channel, ceiling } => {
                write!(f, "OK ceiling {channel} {ceiling}")
            }
            CommandReply::IpiStored { effective_us } => write!(f, "OK ipi {effective_us}us"),
            CommandReply::PulseConfigured(channel) => write!(f, "OK {STATUS_OK} pulse {channel}"),
            CommandReply::PatternStored { slot, group } => {
                write!(f, "OK pattern slot={slot} group={group}")
            }
            CommandReply::PatternRecord {
                slot,
                group,
                record,
            } => {
                write!(f, "OK pattern slot={slot} group={group} ")?;
                record.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
            }
            CommandReply::PatternsApplied { group, records } => {
                write!(f, "OK patterns group={group} records={records}")
            }
            CommandReply::SyncQueued { bytes } => write!(f, "OK sync bytes={bytes}"),
            CommandReply::Rejected(err) => write!(f, "ERR {} {err}", err.status_code()),
            CommandReply::ModeRefused(err) => write!(f, "ERR mode {err}"),
            CommandReply::PatternsRefused(err) => write!(f, "ERR patterns {err}"),
            CommandReply::NotApplied => f.write_str("ERR not available here"),
        }
    }
}

impl<S> StimController<S>
where
    S: PatternStore,
{
    /// Applies one governor command.
    pub fn execute<H>(&mut self, shared: &StimShared<H>, command: &ConsoleCommand) -> CommandReply
    where
        H: StimHardware,
    {
        match command {
            ConsoleCommand::Mode {
                mode,
                function_group,
            } => match self.enter_mode(shared, *mode, *function_group) {
                Ok(()) => CommandReply::ModeEntered(*mode),
                Err(err) => CommandReply::ModeRefused(err),
            },
            ConsoleCommand::Timing {
                channel,
                raw_timing,
                sync_interval,
            } => {
                self.set_channel_schedule(shared, *channel, *raw_timing, *sync_interval);
                let (vos_timing, scheduled_channels) = shared.with(|cell| {
                    (
                        cell.state.schedule.vos_timing(),
                        cell.state.schedule.scheduled_channels(),
                    )
                });
                CommandReply::Scheduled {
                    channel: *channel,
                    vos_timing,
                    scheduled_channels,
                }
            }
            ConsoleCommand::Setpoint {
                channel,
                width_us,
                amplitude,
            } => {
                let setpoint = PulseSetpoint::new(*width_us, *amplitude);
                self.set_direct_setpoint(*channel, setpoint);
                CommandReply::SetpointStored {
                    channel: *channel,
                    setpoint,
                }
            }
            ConsoleCommand::XIndex { channel, x } => {
                self.set_x_index(*channel, *x);
                CommandReply::XIndexStored {
                    channel: *channel,
                    x: *x,
                }
            }
            ConsoleCommand::Ceiling { channel, ceiling } => {
                match self.set_amplitude_ceiling(shared, *channel, *ceiling) {
                    Ok(()) => CommandReply::CeilingStored {
                        channel: *channel,
                        ceiling: *ceiling,
                    },
                    Err(err) => CommandReply::Rejected(err),
                }
            }
            ConsoleCommand::Ipi { ipi_us } => {
                self.set_inter_pulse_interval(*ipi_us);
                CommandReply::IpiStored {
                    effective_us: self.inputs().effective_ipi_us(),
                }
            }
            ConsoleCommand::Pulse {
                number,
                amplitude,
                width_us,
                ipi_us,
            } => {
                let request = PulseRequest::new(*amplitude, *width_us, *ipi_us);
                match self.configure_pulse_channel(shared, *number, &request) {
                    Ok(channel) => CommandReply::PulseConfigured(channel),
                    Err(err) => CommandReply::Rejected(err),
                }
            }
            ConsoleCommand::PatternWrite {
                slot,
                group,
                record,
            } => match self.write_pattern(shared, usize::from(*slot), *group, record) {
                Ok(()) => CommandReply::PatternStored {
                    slot: *slot,
                    group: *group,
                },
                Err(err) => CommandReply::PatternsRefused(err),
            },
            ConsoleCommand::PatternRead { slot } => match self.read_pattern(usize::from(*slot)) {
                Ok((group, record)) => CommandReply::PatternRecord {
                    slot: *slot,
                    group,
                    record,
                },
                Err(err) => CommandReply::PatternsRefused(err),
            },
            ConsoleCommand::Patterns { group, active } => {
                match self.update_patterns(shared, *group, *active) {
                    Ok(records) => CommandReply::PatternsApplied {
                        group: *group,
                        records,
                    },
                    Err(err) => CommandReply::PatternsRefused(err),
                }
            }
            ConsoleCommand::Sync { payload } => {
                self.handle_sync(shared, payload);
                CommandReply::SyncQueued {
                    bytes: payload.len(),
                }
            }
            ConsoleCommand::Tick { .. } | ConsoleCommand::Status | ConsoleCommand::Help { .. } => {
                CommandReply::NotApplied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StimConfig;
    use crate::console::parse_command;
    use crate::shared::SharedState;
    use crate::sim::SimulatedBoard;
    use crate::waveform::{MemoryPatternStore, PatternPoint, PatternRecord, PatternTable};
    use heapless::String;

    fn apply(
        controller: &mut StimController<MemoryPatternStore>,
        shared: &StimShared<SimulatedBoard>,
        line: &str,
    ) -> String<64> {
        let command = parse_command(line).expect("valid command");
        let mut rendered = String::new();
        fmt::write(&mut rendered, format_args!("{}", controller.execute(shared, &command)))
            .expect("reply fits");
        rendered
    }

    #[test]
    fn replies_render_as_console_lines() {
        let shared = StimShared::new(SharedState::new(StimConfig::default()), SimulatedBoard::new());
        let mut controller = StimController::new(MemoryPatternStore::new());

        assert_eq!(
            apply(&mut controller, &shared, "timing 2 9 2").as_str(),
            "OK timing ch2 ramp-at=7 scheduled=1"
        );
        assert_eq!(
            apply(&mut controller, &shared, "ipi 300").as_str(),
            "OK ipi 100us"
        );
        assert_eq!(
            apply(&mut controller, &shared, "pulse 5 10 10 10").as_str(),
            "ERR 1 invalid channel 5"
        );
        assert_eq!(
            apply(&mut controller, &shared, "mode record-x").as_str(),
            "OK mode record-x"
        );
        assert_eq!(
            apply(&mut controller, &shared, "tick 4").as_str(),
            "ERR not available here"
        );
    }

    #[test]
    fn pattern_written_from_the_console_drives_its_group() {
        let shared = StimShared::new(SharedState::new(StimConfig::default()), SimulatedBoard::new());
        let mut controller = StimController::new(MemoryPatternStore::new());
        let table = PatternTable::from_points(&[
            PatternPoint::new(0, 20, 10),
            PatternPoint::new(255, 20, 10),
        ])
        .expect("two points fit");
        let image = PatternRecord::new(ChannelId::Ch3, 1, table).encode();

        let mut line: String<160> = String::try_from("pattern 5 9 ").expect("fits");
        for byte in image {
            fmt::write(&mut line, format_args!("{byte:02x}")).expect("fits");
        }
        let command = parse_command(&line).expect("valid command");
        assert_eq!(
            controller.execute(&shared, &command),
            CommandReply::PatternStored { slot: 5, group: 9 }
        );

        let readback = controller.execute(&shared, &parse_command("pattern 5").expect("valid"));
        let mut rendered: String<192> = String::new();
        fmt::write(&mut rendered, format_args!("{readback}")).expect("reply fits");
        let hex = &line["pattern 5 9 ".len()..];
        assert_eq!(rendered.strip_prefix("OK pattern slot=5 group=9 "), Some(hex));

        assert_eq!(
            apply(&mut controller, &shared, "patterns 9 on").as_str(),
            "OK patterns group=9 records=1"
        );
        assert_eq!(
            controller.patterns().table(ChannelId::Ch3).interpolate(0),
            PulseSetpoint::new(20, 10)
        );
    }

    #[test]
    fn malformed_pattern_image_is_refused() {
        let shared = StimShared::new(SharedState::new(StimConfig::default()), SimulatedBoard::new());
        let mut controller = StimController::new(MemoryPatternStore::new());
        let command = ConsoleCommand::PatternWrite {
            slot: 0,
            group: 1,
            record: [0; PATTERN_RECORD_LEN],
        };

        let reply = controller.execute(&shared, &command);

        assert_eq!(reply, CommandReply::PatternsRefused(PatternError::InvalidChannel(0)));
        assert!(!reply.is_ok());
        assert_eq!(controller.store().pattern_count(), 0);
        assert_eq!(
            apply(&mut controller, &shared, "pattern 48").as_str(),
            "ERR patterns pattern slot 48 out of range"
        );
    }

    #[test]
    fn sync_sets_pending_flag() {
        let shared = StimShared::new(SharedState::new(StimConfig::default()), SimulatedBoard::new());
        let mut controller = StimController::new(MemoryPatternStore::new());
        let command = parse_command("sync 1 2").expect("valid command");

        let reply = controller.execute(&shared, &command);

        assert_eq!(reply, CommandReply::SyncQueued { bytes: 2 });
        assert!(reply.is_ok());
        assert!(shared.with(|cell| cell.state.sync_pending));
    }
}
