//! Stimulation channel identifiers.
//!
//! Channels are numbered 1..=4 on the wire and indexed 0..=3 internally; the
//! helpers below are the only place that translation happens.

use core::fmt;

/// Number of stimulation outputs on the board.
pub const NUM_CHANNELS: usize = 4;

/// Identifier for one of the stimulation outputs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ChannelId {
    Ch1,
    Ch2,
    Ch3,
    Ch4,
}

impl ChannelId {
    /// Every channel in scheduling order.
    pub const ALL: [ChannelId; NUM_CHANNELS] =
        [ChannelId::Ch1, ChannelId::Ch2, ChannelId::Ch3, ChannelId::Ch4];

    /// Deterministic index for per-channel arrays.
    pub const fn as_index(self) -> usize {
        match self {
            ChannelId::Ch1 => 0,
            ChannelId::Ch2 => 1,
            ChannelId::Ch3 => 2,
            ChannelId::Ch4 => 3,
        }
    }

    /// Attempts to construct a [`ChannelId`] from a zero-based index.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(ChannelId::Ch1),
            1 => Some(ChannelId::Ch2),
            2 => Some(ChannelId::Ch3),
            3 => Some(ChannelId::Ch4),
            _ => None,
        }
    }

    /// One-based channel number used by configuration requests and pattern records.
    pub const fn number(self) -> u8 {
        match self {
            ChannelId::Ch1 => 1,
            ChannelId::Ch2 => 2,
            ChannelId::Ch3 => 3,
            ChannelId::Ch4 => 4,
        }
    }

    /// Attempts to construct a [`ChannelId`] from a one-based channel number.
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(ChannelId::Ch1),
            2 => Some(ChannelId::Ch2),
            3 => Some(ChannelId::Ch3),
            4 => Some(ChannelId::Ch4),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_and_indices_agree() {
        for (index, channel) in ChannelId::ALL.iter().enumerate() {
            assert_eq!(channel.as_index(), index);
            assert_eq!(ChannelId::from_index(index), Some(*channel));
            assert_eq!(ChannelId::from_number(channel.number()), Some(*channel));
        }
    }

    #[test]
    fn rejects_out_of_range_numbers() {
        assert_eq!(ChannelId::from_number(0), None);
        assert_eq!(ChannelId::from_number(5), None);
        assert_eq!(ChannelId::from_index(NUM_CHANNELS), None);
    }
}
