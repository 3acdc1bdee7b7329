use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant as HostInstant};

use stim_core::config::StimConfig;
use stim_core::console::{ConsoleCommand, Topic, parse_command};
use stim_core::scheduler::{TickAction, TickScheduler};
use stim_core::shared::SharedState;
use stim_core::sim::SimulatedBoard;
use stim_core::status::StatusFormatter;
use stim_core::telemetry::EventId;
use stim_core::waveform::{MemoryPatternStore, PatternPoint, PatternRecord, PatternTable};
use stim_core::{ChannelId, StimController, StimShared};

/// Function group preloaded into the pattern store.
pub const DEMO_FUNCTION_GROUP: u8 = 1;

/// Largest `tick` batch accepted from the console.
const MAX_TICK_BATCH: u16 = 1000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Interactive,
    OpenLoop,
    ClosedLoop,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "transcripts/emulator-interactive.log",
            TranscriptProfile::OpenLoop => "transcripts/emulator-open-loop.log",
            TranscriptProfile::ClosedLoop => "transcripts/emulator-closed-loop.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Interactive => "Stimulator emulator interactive transcript",
            TranscriptProfile::OpenLoop => "Stimulator emulator open-loop transcript",
            TranscriptProfile::ClosedLoop => "Stimulator emulator closed-loop transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("interactive") {
            Ok(Self::Interactive)
        } else if tag.eq_ignore_ascii_case("open-loop") {
            Ok(Self::OpenLoop)
        } else if tag.eq_ignore_ascii_case("closed-loop") {
            Ok(Self::ClosedLoop)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

pub struct Session {
    shared: StimShared<SimulatedBoard>,
    scheduler: TickScheduler,
    controller: StimController<MemoryPatternStore>,
    telemetry_cursor: Option<EventId>,
    transcript: Option<TranscriptLogger>,
    started_at: HostInstant,
}

impl Session {
    /// Session that appends every exchange to the profile's transcript.
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        Ok(Self::build(Some(transcript)))
    }

    /// Session without a transcript file.
    pub fn detached() -> Self {
        Self::build(None)
    }

    fn build(transcript: Option<TranscriptLogger>) -> Self {
        let shared = StimShared::new(
            SharedState::new(StimConfig::default()),
            SimulatedBoard::new(),
        );
        Self {
            shared,
            scheduler: TickScheduler::new(),
            controller: StimController::new(demo_store()),
            telemetry_cursor: None,
            transcript,
            started_at: HostInstant::now(),
        }
    }

    pub fn shared(&self) -> &StimShared<SimulatedBoard> {
        &self.shared
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.log(elapsed, TranscriptRole::Host, trimmed)?;

        let mut lines = match parse_command(trimmed) {
            Ok(command) => self.execute(command),
            Err(err) => vec![format!("ERR syntax {err}")],
        };
        lines.extend(self.drain_telemetry());

        for response in &lines {
            self.log(elapsed, TranscriptRole::Emulator, response)?;
        }
        Ok(lines)
    }

    fn execute(&mut self, command: ConsoleCommand) -> Vec<String> {
        match command {
            ConsoleCommand::Tick { count } => self.run_ticks(count),
            ConsoleCommand::Status => {
                let snapshot = self.controller.snapshot(&self.shared);
                StatusFormatter::new(&snapshot).lines()
            }
            ConsoleCommand::Help { topic } => help_lines(topic),
            command => vec![self.controller.execute(&self.shared, &command).to_string()],
        }
    }

    /// Runs `count` ticks, with one background pass after each.
    fn run_ticks(&mut self, count: u16) -> Vec<String> {
        let count = count.min(MAX_TICK_BATCH);
        let mut lines = Vec::new();
        for _ in 0..count {
            if self.scheduler.run_tick(&self.shared) == TickAction::SyncSkipped {
                lines.push(format!(
                    "WARN autonomous sync limit reached at {}ms",
                    self.shared.now_ms()
                ));
            }
            self.controller.update(&self.shared);
        }
        lines.push(format!(
            "OK tick x{count} now={}ms tick={}",
            self.shared.now_ms(),
            self.scheduler.tick()
        ));
        lines
    }

    fn drain_telemetry(&mut self) -> Vec<String> {
        let cursor = self.telemetry_cursor;
        let (lines, latest) = self.shared.with(|cell| {
            let telemetry = &cell.state.telemetry;
            let lines: Vec<String> = telemetry
                .since(cursor)
                .map(|record| {
                    format!(
                        "EVT #{} t={}ms {}",
                        record.id, record.timestamp_ms, record.event
                    )
                })
                .collect();
            (lines, telemetry.latest().map(|record| record.id))
        });
        if latest.is_some() {
            self.telemetry_cursor = latest;
        }
        lines
    }

    fn log(&mut self, elapsed: Duration, role: TranscriptRole, line: &str) -> io::Result<()> {
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(elapsed, role, line),
            None => Ok(()),
        }
    }
}

/// Pattern store seeded with one ramp per channel in [`DEMO_FUNCTION_GROUP`].
///
/// Channel `n` maps its x index from sync payload byte `n`.
fn demo_store() -> MemoryPatternStore {
    let mut store = MemoryPatternStore::new();
    for (slot, channel) in ChannelId::ALL.into_iter().enumerate() {
        let table = PatternTable::from_points(&[
            PatternPoint::new(0, 0, 0),
            PatternPoint::new(10, 20, 10),
            PatternPoint::new(200, 100, 80),
        ]);
        let stored = table.and_then(|table| {
            store.store(
                slot,
                DEMO_FUNCTION_GROUP,
                &PatternRecord::new(channel, channel.number(), table),
            )
        });
        if let Err(err) = stored {
            eprintln!("demo pattern for {channel} not stored: {err}");
        }
    }
    store
}

fn help_lines(topic: Option<Topic>) -> Vec<String> {
    match topic {
        Some(topic) => vec![topic.usage().to_string()],
        None => {
            let mut lines = vec!["Available commands:".to_string()];
            for topic in Topic::ALL {
                lines.push(format!("  {}", topic.usage()));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
            lines
        }
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy, Debug)]
enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(session: &mut Session, line: &str) -> Vec<String> {
        session.handle_command(line).expect("detached session never fails")
    }

    #[test]
    fn open_loop_pulse_is_reported() {
        let mut session = Session::detached();
        assert_eq!(
            run(&mut session, "timing 1 3"),
            vec!["OK timing ch1 ramp-at=1 scheduled=1".to_string()]
        );
        run(&mut session, "setpoint 1 50 100");
        let lines = run(&mut session, "mode y-manual");
        assert_eq!(lines[0], "OK mode y-manual");
        run(&mut session, "sync");

        let lines = run(&mut session, "tick 3");
        assert!(lines.iter().any(|line| line.contains("pulse ch1 tick=3")));
        assert!(lines.iter().any(|line| line.starts_with("OK tick x3 now=3ms")));

        let status = run(&mut session, "status");
        assert!(status.iter().any(|line| line.starts_with("ch1 at=3 out=50us/100")));
    }

    #[test]
    fn closed_loop_uses_demo_patterns() {
        let mut session = Session::detached();
        let lines = run(&mut session, "mode patient-control 1");
        assert!(lines.contains(&"OK mode patient-control".to_string()));
        assert_eq!(
            session.shared().with(|cell| cell.state.mode),
            stim_core::OperatingMode::PatientControl
        );

        run(&mut session, "timing 2 2");
        run(&mut session, "sync 0 105");
        run(&mut session, "tick 2");

        let status = run(&mut session, "status");
        assert!(status.iter().any(|line| line.starts_with("ch2 at=2 out=60us/45")));
    }

    #[test]
    fn rejections_carry_status_codes() {
        let mut session = Session::detached();
        assert_eq!(
            run(&mut session, "pulse 1 250 50 20")[0],
            "ERR 1 amplitude 250 exceeds ceiling"
        );
        assert!(run(&mut session, "mode 9")[0].starts_with("OK mode"));
        assert!(run(&mut session, "mode 3")[0].starts_with("ERR mode"));
        assert!(run(&mut session, "frobnicate")[0].starts_with("ERR syntax"));
    }

    #[test]
    fn stored_patterns_read_back_as_hex() {
        let mut session = Session::detached();
        let line = run(&mut session, "pattern 0").remove(0);
        let hex = line
            .strip_prefix("OK pattern slot=0 group=")
            .and_then(|rest| rest.split_once(' '))
            .map(|(_, hex)| hex.to_string())
            .expect("readback reply");
        assert_eq!(hex.len(), 128);

        let write = format!("pattern 40 3 {hex}");
        assert_eq!(run(&mut session, &write)[0], "OK pattern slot=40 group=3");
        assert_eq!(
            run(&mut session, "pattern 48")[0],
            "ERR patterns pattern slot 48 out of range"
        );
    }

    #[test]
    fn help_lists_every_topic() {
        let mut session = Session::detached();
        let lines = run(&mut session, "help");
        assert_eq!(lines.len(), Topic::ALL.len() + 2);
        assert_eq!(
            run(&mut session, "help sync"),
            vec![Topic::Sync.usage().to_string()]
        );
    }
}
