//! defmt sinks for core telemetry and console traffic.
//!
//! Host builds compile the same call sites against no-op stand-ins so the
//! runtime-independent modules stay testable off target.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

#[cfg(target_os = "none")]
use stim_core::telemetry::StimEventKind;
use stim_core::telemetry::{EventId, TelemetryRecord};

/// Tracks the last telemetry record forwarded to the log.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TelemetryCursor {
    last: Option<EventId>,
}

impl TelemetryCursor {
    pub const fn new() -> Self {
        Self { last: None }
    }

    pub const fn last(&self) -> Option<EventId> {
        self.last
    }

    /// Logs `records` (taken from [`since`](stim_core::telemetry::StimTelemetry::since) the cursor) and advances it.
    pub fn forward<'a>(&mut self, records: impl Iterator<Item = &'a TelemetryRecord>) -> usize {
        let mut forwarded = 0;
        for record in records {
            log_telemetry(record);
            self.last = Some(record.id);
            forwarded += 1;
        }
        forwarded
    }
}

#[cfg(target_os = "none")]
fn log_telemetry(record: &TelemetryRecord) {
    match record.event {
        StimEventKind::SyncSkipped { .. }
        | StimEventKind::PulseNotReady { .. }
        | StimEventKind::ConfigRejected { .. }
        | StimEventKind::PatternsRejected { .. } => defmt::warn!(
            "stim #{=u32} t={=u32}ms {}",
            record.id,
            record.timestamp_ms,
            defmt::Display2Format(&record.event)
        ),
        StimEventKind::PulseFired { overran: true, .. } => defmt::error!(
            "stim #{=u32} t={=u32}ms {}",
            record.id,
            record.timestamp_ms,
            defmt::Display2Format(&record.event)
        ),
        _ => defmt::info!(
            "stim #{=u32} t={=u32}ms {}",
            record.id,
            record.timestamp_ms,
            defmt::Display2Format(&record.event)
        ),
    }
}

#[cfg(not(target_os = "none"))]
fn log_telemetry(_: &TelemetryRecord) {}

#[cfg(target_os = "none")]
pub fn log_command(line: &str) {
    defmt::info!("console: > {=str}", line);
}

#[cfg(not(target_os = "none"))]
pub fn log_command(_: &str) {}

#[cfg(target_os = "none")]
pub fn log_reply<D: core::fmt::Display>(reply: &D, ok: bool) {
    if ok {
        defmt::info!("console: < {}", defmt::Display2Format(reply));
    } else {
        defmt::warn!("console: < {}", defmt::Display2Format(reply));
    }
}

#[cfg(not(target_os = "none"))]
pub fn log_reply<D: core::fmt::Display>(_: &D, _: bool) {}

#[cfg(test)]
mod tests {
    use super::*;
    use stim_core::telemetry::{StimEventKind, StimTelemetry};

    #[test]
    fn cursor_forwards_each_record_once() {
        let mut telemetry: StimTelemetry<8> = StimTelemetry::new();
        let mut cursor = TelemetryCursor::new();
        telemetry.record(StimEventKind::SyncSkipped { exceeded_total: 1 }, 3);
        telemetry.record(StimEventKind::SyncSkipped { exceeded_total: 2 }, 9);

        assert_eq!(cursor.forward(telemetry.since(cursor.last())), 2);
        assert_eq!(cursor.forward(telemetry.since(cursor.last())), 0);

        let id = telemetry.record(StimEventKind::SyncSkipped { exceeded_total: 3 }, 12);
        assert_eq!(cursor.forward(telemetry.since(cursor.last())), 1);
        assert_eq!(cursor.last(), Some(id));
    }
}
