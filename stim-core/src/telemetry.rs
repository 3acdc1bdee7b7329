//! Telemetry event catalog and the bounded ring that stores it.
//!
//! The tick handler and the controller record structured events here instead
//! of logging; the firmware drains the ring from its background task and
//! forwards new records to defmt, while the emulator prints them.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::channels::ChannelId;
use crate::error::{ConfigError, PatternError};
use crate::mode::OperatingMode;
use crate::pulse::RegulationStatus;
use crate::vos::VosCommand;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Monotonic identifier assigned to every record.
pub type EventId = u32;

/// Milliseconds on the free-running system clock.
pub type TimestampMillis = u32;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StimEventKind {
    /// Consecutive autonomous syncs exceeded the limit; the period was skipped.
    SyncSkipped { exceeded_total: u32 },
    /// Supply transition executed.
    Vos(VosCommand),
    /// Pulse delivered on a channel.
    PulseFired {
        channel: ChannelId,
        tick: u16,
        regulation: RegulationStatus,
        overran: bool,
    },
    /// A pulse was due but its setpoint was not ready.
    PulseNotReady { channel: ChannelId, tick: u16 },
    /// Configuration request refused.
    ConfigRejected {
        channel: Option<ChannelId>,
        error: ConfigError,
    },
    /// Operating mode changed.
    ModeChanged {
        from: OperatingMode,
        to: OperatingMode,
    },
    /// Function group loaded or cleared.
    PatternsUpdated { group: u8, active: bool, records: u8 },
    /// Function group update failed.
    PatternsRejected { group: u8, error: PatternError },
}

impl fmt::Display for StimEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StimEventKind::SyncSkipped { exceeded_total } => {
                write!(f, "sync-skipped total={exceeded_total}")
            }
            StimEventKind::Vos(command) => write!(f, "vos {command}"),
            StimEventKind::PulseFired {
                channel,
                tick,
                regulation,
                overran,
            } => {
                write!(f, "pulse {channel} tick={tick} regulation={regulation}")?;
                if *overran {
                    f.write_str(" overran")?;
                }
                Ok(())
            }
            StimEventKind::PulseNotReady { channel, tick } => {
                write!(f, "pulse-not-ready {channel} tick={tick}")
            }
            StimEventKind::ConfigRejected { channel, error } => match channel {
                Some(channel) => write!(f, "config-rejected {channel}: {error}"),
                None => write!(f, "config-rejected: {error}"),
            },
            StimEventKind::ModeChanged { from, to } => write!(f, "mode {from} -> {to}"),
            StimEventKind::PatternsUpdated {
                group,
                active,
                records,
            } => {
                let verb = if *active { "loaded" } else { "cleared" };
                write!(f, "patterns group={group} {verb} records={records}")
            }
            StimEventKind::PatternsRejected { group, error } => {
                write!(f, "patterns group={group} rejected: {error}")
            }
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp_ms: TimestampMillis,
    pub event: StimEventKind,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct StimTelemetry<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> StimTelemetry<CAPACITY> {
    /// Creates a new recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records recorded after `cursor`, oldest first. `None` yields everything.
    pub fn since(&self, cursor: Option<EventId>) -> impl Iterator<Item = &TelemetryRecord> {
        self.ring
            .oldest_ordered()
            .filter(move |record| cursor.is_none_or(|seen| is_after(record.id, seen)))
    }

    /// Records an event and returns its identifier.
    pub fn record(&mut self, event: StimEventKind, timestamp_ms: TimestampMillis) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp_ms,
            event,
        });

        id
    }
}

impl<const CAPACITY: usize> Default for StimTelemetry<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> fmt::Debug for StimTelemetry<CAPACITY> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StimTelemetry")
            .field("len", &self.ring.len())
            .field("next_event_id", &self.next_event_id)
            .finish()
    }
}

fn is_after(id: EventId, reference: EventId) -> bool {
    let delta = id.wrapping_sub(reference);
    delta != 0 && delta < EventId::MAX / 2
}
