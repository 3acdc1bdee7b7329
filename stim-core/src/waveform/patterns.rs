//! Stored pattern records and function-group activation.
//!
//! Records are fixed 64-byte images laid out as:
//!
//! | offset | size | field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 1    | channel number (1..=4)                 |
//! | 1      | 1    | x map: 1-based sync payload byte index |
//! | 2      | 1    | point count                            |
//! | 3      | 20   | x values                               |
//! | 23     | 20   | pulse widths (µs)                      |
//! | 43     | 20   | amplitudes (0.1 mA)                    |
//! | 63     | 1    | reserved                               |
//!
//! Each slot is tagged with a function group. Activating a group copies every
//! matching record into the active table of the channel it names.

use crate::channels::{ChannelId, NUM_CHANNELS};
use crate::error::PatternError;

use super::{MAX_PATTERN_POINTS, PatternPoint, PatternTable};

/// Size of one stored pattern record.
pub const PATTERN_RECORD_LEN: usize = 64;
/// Number of pattern slots.
pub const MAX_PATTERNS: usize = 48;
/// Address of the first record in non-volatile memory.
pub const PATTERN_BASE_ADDRESS: u16 = 0x400;

const CHANNEL_OFFSET: usize = 0;
const X_MAP_OFFSET: usize = 1;
const COUNT_OFFSET: usize = 2;
const X_OFFSET: usize = 3;
const WIDTH_OFFSET: usize = X_OFFSET + MAX_PATTERN_POINTS;
const AMPLITUDE_OFFSET: usize = WIDTH_OFFSET + MAX_PATTERN_POINTS;

/// Non-volatile address of a pattern slot.
pub fn record_address(slot: usize) -> Result<u16, PatternError> {
    if slot >= MAX_PATTERNS {
        return Err(PatternError::InvalidSlot(slot));
    }
    let offset = u16::try_from(slot * PATTERN_RECORD_LEN)
        .map_err(|_| PatternError::InvalidSlot(slot))?;
    Ok(PATTERN_BASE_ADDRESS + offset)
}

/// Decoded pattern record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PatternRecord {
    pub channel: ChannelId,
    /// 1-based index into the sync payload; 0 leaves the x index alone.
    pub x_map: u8,
    pub table: PatternTable,
}

impl PatternRecord {
    pub const fn new(channel: ChannelId, x_map: u8, table: PatternTable) -> Self {
        Self {
            channel,
            x_map,
            table,
        }
    }

    /// Decodes a stored record, rejecting channel numbers outside 1..=4.
    pub fn decode(bytes: &[u8; PATTERN_RECORD_LEN]) -> Result<Self, PatternError> {
        let number = bytes[CHANNEL_OFFSET];
        let channel = ChannelId::from_number(number).ok_or(PatternError::InvalidChannel(number))?;

        let mut points = [PatternPoint::ZERO; MAX_PATTERN_POINTS];
        for (index, point) in points.iter_mut().enumerate() {
            *point = PatternPoint::new(
                bytes[X_OFFSET + index],
                bytes[WIDTH_OFFSET + index],
                bytes[AMPLITUDE_OFFSET + index],
            );
        }

        Ok(Self {
            channel,
            x_map: bytes[X_MAP_OFFSET],
            table: PatternTable::from_raw(bytes[COUNT_OFFSET], points),
        })
    }

    /// Encodes the record into its stored image. The reserved byte is zero.
    pub fn encode(&self) -> [u8; PATTERN_RECORD_LEN] {
        let mut bytes = [0u8; PATTERN_RECORD_LEN];
        bytes[CHANNEL_OFFSET] = self.channel.number();
        bytes[X_MAP_OFFSET] = self.x_map;
        bytes[COUNT_OFFSET] = self.table.count();
        for (index, point) in self.table.raw_points().iter().enumerate() {
            bytes[X_OFFSET + index] = point.x;
            bytes[WIDTH_OFFSET + index] = point.width_us;
            bytes[AMPLITUDE_OFFSET + index] = point.amplitude;
        }
        bytes
    }
}

/// Access to stored pattern slots.
pub trait PatternStore {
    /// Number of populated slots.
    fn pattern_count(&self) -> usize;

    /// Function group tag of a slot.
    fn function_group(&self, slot: usize) -> Result<u8, PatternError>;

    /// Raw record image of a slot.
    fn read_record(&self, slot: usize) -> Result<[u8; PATTERN_RECORD_LEN], PatternError>;

    /// Replaces the record image and group tag of a slot.
    ///
    /// Images that do not decode as a [`PatternRecord`] are refused and leave
    /// the slot untouched.
    fn write_record(
        &mut self,
        slot: usize,
        group: u8,
        bytes: &[u8; PATTERN_RECORD_LEN],
    ) -> Result<(), PatternError>;
}

/// Pattern store backed by an in-memory copy of the record area.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryPatternStore {
    image: [u8; PATTERN_RECORD_LEN * MAX_PATTERNS],
    groups: [u8; MAX_PATTERNS],
    count: usize,
}

impl MemoryPatternStore {
    pub const fn new() -> Self {
        Self {
            image: [0; PATTERN_RECORD_LEN * MAX_PATTERNS],
            groups: [0; MAX_PATTERNS],
            count: 0,
        }
    }

    /// Writes a record into `slot`, growing the populated range to cover it.
    pub fn store(
        &mut self,
        slot: usize,
        group: u8,
        record: &PatternRecord,
    ) -> Result<(), PatternError> {
        self.store_raw(slot, group, &record.encode())
    }

    /// Writes a raw record image into `slot` without decoding it.
    pub fn store_raw(
        &mut self,
        slot: usize,
        group: u8,
        bytes: &[u8; PATTERN_RECORD_LEN],
    ) -> Result<(), PatternError> {
        let start = image_offset(slot)?;
        self.image[start..start + PATTERN_RECORD_LEN].copy_from_slice(bytes);
        self.groups[slot] = group;
        self.count = self.count.max(slot + 1);
        Ok(())
    }
}

impl Default for MemoryPatternStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternStore for MemoryPatternStore {
    fn pattern_count(&self) -> usize {
        self.count
    }

    fn function_group(&self, slot: usize) -> Result<u8, PatternError> {
        self.groups
            .get(slot)
            .copied()
            .ok_or(PatternError::InvalidSlot(slot))
    }

    fn read_record(&self, slot: usize) -> Result<[u8; PATTERN_RECORD_LEN], PatternError> {
        let start = image_offset(slot)?;
        let mut bytes = [0u8; PATTERN_RECORD_LEN];
        bytes.copy_from_slice(&self.image[start..start + PATTERN_RECORD_LEN]);
        Ok(bytes)
    }

    fn write_record(
        &mut self,
        slot: usize,
        group: u8,
        bytes: &[u8; PATTERN_RECORD_LEN],
    ) -> Result<(), PatternError> {
        PatternRecord::decode(bytes)?;
        self.store_raw(slot, group, bytes)
    }
}

fn image_offset(slot: usize) -> Result<usize, PatternError> {
    let address = record_address(slot)?;
    Ok(usize::from(address - PATTERN_BASE_ADDRESS))
}

/// Active pattern tables and sync payload mapping for every channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ActivePatterns {
    tables: [PatternTable; NUM_CHANNELS],
    x_map: [u8; NUM_CHANNELS],
    groups: [Option<u8>; NUM_CHANNELS],
}

impl ActivePatterns {
    pub const fn new() -> Self {
        Self {
            tables: [PatternTable::EMPTY; NUM_CHANNELS],
            x_map: [0; NUM_CHANNELS],
            groups: [None; NUM_CHANNELS],
        }
    }

    pub const fn table(&self, channel: ChannelId) -> &PatternTable {
        &self.tables[channel.as_index()]
    }

    /// 1-based sync payload index feeding the channel's x index, 0 for none.
    pub const fn x_map(&self, channel: ChannelId) -> u8 {
        self.x_map[channel.as_index()]
    }

    /// Function group whose pattern is loaded on the channel.
    pub const fn active_group(&self, channel: ChannelId) -> Option<u8> {
        self.groups[channel.as_index()]
    }

    /// Installs a record on the channel it names.
    pub fn load(&mut self, record: &PatternRecord, group: u8) {
        let index = record.channel.as_index();
        self.tables[index] = record.table;
        self.x_map[index] = record.x_map;
        self.groups[index] = Some(group);
    }

    pub fn clear_channel(&mut self, channel: ChannelId) {
        let index = channel.as_index();
        self.tables[index] = PatternTable::EMPTY;
        self.x_map[index] = 0;
        self.groups[index] = None;
    }

    pub fn clear_all(&mut self) {
        *self = Self::new();
    }

    /// Loads (`active`) or clears every stored record tagged with `group`.
    ///
    /// All matching records are decoded before anything is applied, so a
    /// malformed record leaves the active tables untouched. Returns the
    /// number of records applied.
    pub fn update_group<S>(
        &mut self,
        store: &S,
        group: u8,
        active: bool,
    ) -> Result<usize, PatternError>
    where
        S: PatternStore + ?Sized,
    {
        let slots = store.pattern_count().min(MAX_PATTERNS);
        for slot in 0..slots {
            if store.function_group(slot)? == group {
                PatternRecord::decode(&store.read_record(slot)?)?;
            }
        }

        let mut applied = 0;
        for slot in 0..slots {
            if store.function_group(slot)? != group {
                continue;
            }
            let record = PatternRecord::decode(&store.read_record(slot)?)?;
            if active {
                self.load(&record, group);
            } else {
                self.clear_channel(record.channel);
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Picks the channel's x index out of a sync payload.
    ///
    /// Returns `None` when the channel has no mapping or the mapped byte lies
    /// beyond the payload.
    pub fn x_index_from_payload(&self, channel: ChannelId, payload: &[u8]) -> Option<u8> {
        let position = usize::from(self.x_map(channel));
        if position == 0 {
            return None;
        }
        payload.get(position - 1).copied()
    }
}

impl Default for ActivePatterns {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::PulseSetpoint;

    fn ramp_record(channel: ChannelId, x_map: u8) -> PatternRecord {
        let table = PatternTable::from_points(&[
            PatternPoint::new(0, 10, 5),
            PatternPoint::new(100, 50, 40),
        ])
        .expect("two points fit");
        PatternRecord::new(channel, x_map, table)
    }

    #[test]
    fn record_layout_matches_storage_offsets() {
        let bytes = ramp_record(ChannelId::Ch3, 2).encode();
        assert_eq!(bytes[0], 3);
        assert_eq!(bytes[1], 2);
        assert_eq!(bytes[2], 2);
        assert_eq!(&bytes[3..5], &[0, 100]);
        assert_eq!(&bytes[23..25], &[10, 50]);
        assert_eq!(&bytes[43..45], &[5, 40]);
        assert_eq!(bytes[63], 0);
    }

    #[test]
    fn decode_rejects_invalid_channel() {
        let mut bytes = ramp_record(ChannelId::Ch1, 1).encode();
        bytes[0] = 0;
        assert_eq!(
            PatternRecord::decode(&bytes),
            Err(PatternError::InvalidChannel(0))
        );
        bytes[0] = 5;
        assert_eq!(
            PatternRecord::decode(&bytes),
            Err(PatternError::InvalidChannel(5))
        );
    }

    #[test]
    fn slot_addresses_follow_record_stride() {
        assert_eq!(record_address(0), Ok(0x400));
        assert_eq!(record_address(1), Ok(0x440));
        assert_eq!(record_address(MAX_PATTERNS), Err(PatternError::InvalidSlot(48)));
    }

    #[test]
    fn activating_group_loads_matching_channels_only() {
        let mut store = MemoryPatternStore::new();
        store
            .store(0, 7, &ramp_record(ChannelId::Ch1, 1))
            .expect("slot 0");
        store
            .store(1, 9, &ramp_record(ChannelId::Ch2, 2))
            .expect("slot 1");

        let mut active = ActivePatterns::new();
        let applied = active.update_group(&store, 7, true).expect("group loads");

        assert_eq!(applied, 1);
        assert_eq!(active.active_group(ChannelId::Ch1), Some(7));
        assert_eq!(active.x_map(ChannelId::Ch1), 1);
        assert_eq!(
            active.table(ChannelId::Ch1).interpolate(50),
            PulseSetpoint::new(30, 22)
        );
        assert_eq!(active.active_group(ChannelId::Ch2), None);
        assert_eq!(active.table(ChannelId::Ch2).count(), 0);
    }

    #[test]
    fn deactivating_group_clears_its_channels() {
        let mut store = MemoryPatternStore::new();
        store
            .store(0, 7, &ramp_record(ChannelId::Ch4, 3))
            .expect("slot 0");
        let mut active = ActivePatterns::new();
        active.update_group(&store, 7, true).expect("group loads");

        active.update_group(&store, 7, false).expect("group clears");

        assert_eq!(active.active_group(ChannelId::Ch4), None);
        assert_eq!(active.x_map(ChannelId::Ch4), 0);
        assert!(active.table(ChannelId::Ch4).points().is_empty());
    }

    #[test]
    fn malformed_record_leaves_tables_untouched() {
        let mut store = MemoryPatternStore::new();
        store
            .store(0, 7, &ramp_record(ChannelId::Ch1, 1))
            .expect("slot 0");
        let mut corrupt = ramp_record(ChannelId::Ch2, 1).encode();
        corrupt[0] = 9;
        store.store_raw(1, 7, &corrupt).expect("slot 1");

        let mut active = ActivePatterns::new();
        assert_eq!(
            active.update_group(&store, 7, true),
            Err(PatternError::InvalidChannel(9))
        );
        assert_eq!(active, ActivePatterns::new());
    }

    #[test]
    fn write_record_refuses_images_that_do_not_decode() {
        let mut store = MemoryPatternStore::new();
        let good = ramp_record(ChannelId::Ch2, 1).encode();
        store.write_record(3, 5, &good).expect("valid image");
        assert_eq!(store.read_record(3), Ok(good));
        assert_eq!(store.function_group(3), Ok(5));
        assert_eq!(store.pattern_count(), 4);

        let mut corrupt = good;
        corrupt[0] = 0;
        assert_eq!(
            store.write_record(3, 6, &corrupt),
            Err(PatternError::InvalidChannel(0))
        );
        assert_eq!(store.read_record(3), Ok(good));
        assert_eq!(store.function_group(3), Ok(5));
        assert_eq!(
            store.write_record(MAX_PATTERNS, 5, &good),
            Err(PatternError::InvalidSlot(MAX_PATTERNS))
        );
    }

    #[test]
    fn payload_mapping_ignores_missing_bytes() {
        let mut active = ActivePatterns::new();
        active.load(&ramp_record(ChannelId::Ch1, 2), 1);
        active.load(&ramp_record(ChannelId::Ch2, 6), 1);

        let payload = [10, 20, 30];
        assert_eq!(active.x_index_from_payload(ChannelId::Ch1, &payload), Some(20));
        assert_eq!(active.x_index_from_payload(ChannelId::Ch2, &payload), None);
        assert_eq!(active.x_index_from_payload(ChannelId::Ch3, &payload), None);
    }
}
