//! Text command surface for driving the core interactively.
//!
//! The grammar is deliberately flat: a keyword followed by space-separated
//! arguments. Channel numbers are 1-based. [`parse_command`] never allocates,
//! so the same parser serves host tools and an on-target console.

use core::fmt;

use heapless::Vec;

use crate::channels::ChannelId;
use crate::mode::OperatingMode;
use crate::waveform::PATTERN_RECORD_LEN;

mod exec;
mod grammar;

pub use exec::CommandReply;
pub use grammar::parse_command;

/// Largest sync payload the console accepts.
pub const MAX_SYNC_PAYLOAD: usize = 8;

/// Parsed console command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConsoleCommand {
    /// `mode <name|code> [group]`
    Mode {
        mode: OperatingMode,
        function_group: u8,
    },
    /// `timing <ch> <offset|off> [interval]`
    Timing {
        channel: ChannelId,
        raw_timing: u8,
        sync_interval: u8,
    },
    /// `setpoint <ch> <width-us> <amplitude>`
    Setpoint {
        channel: ChannelId,
        width_us: u8,
        amplitude: u8,
    },
    /// `x <ch> <value>`
    XIndex { channel: ChannelId, x: u8 },
    /// `ceiling <ch> <amplitude>`
    Ceiling { channel: ChannelId, ceiling: u8 },
    /// `ipi <us>`
    Ipi { ipi_us: u16 },
    /// `pulse <ch-number> <amplitude> <width-us> <ipi-us>`
    Pulse {
        number: u8,
        amplitude: u8,
        width_us: u8,
        ipi_us: u16,
    },
    /// `pattern <slot> <group> <hex record>`
    PatternWrite {
        slot: u8,
        group: u8,
        record: [u8; PATTERN_RECORD_LEN],
    },
    /// `pattern <slot>`
    PatternRead { slot: u8 },
    /// `patterns <group> <on|off>`
    Patterns { group: u8, active: bool },
    /// `sync [byte ...]`
    Sync { payload: Vec<u8, MAX_SYNC_PAYLOAD> },
    /// `tick [count]`
    Tick { count: u16 },
    /// `status`
    Status,
    /// `help [topic]`
    Help { topic: Option<Topic> },
}

/// Command keywords, also used as help topics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Topic {
    Mode,
    Timing,
    Setpoint,
    XIndex,
    Ceiling,
    Ipi,
    Pulse,
    Pattern,
    Patterns,
    Sync,
    Tick,
    Status,
    Help,
}

impl Topic {
    pub const ALL: [Topic; 13] = [
        Topic::Mode,
        Topic::Timing,
        Topic::Setpoint,
        Topic::XIndex,
        Topic::Ceiling,
        Topic::Ipi,
        Topic::Pulse,
        Topic::Pattern,
        Topic::Patterns,
        Topic::Sync,
        Topic::Tick,
        Topic::Status,
        Topic::Help,
    ];

    pub const fn keyword(self) -> &'static str {
        match self {
            Topic::Mode => "mode",
            Topic::Timing => "timing",
            Topic::Setpoint => "setpoint",
            Topic::XIndex => "x",
            Topic::Ceiling => "ceiling",
            Topic::Ipi => "ipi",
            Topic::Pulse => "pulse",
            Topic::Pattern => "pattern",
            Topic::Patterns => "patterns",
            Topic::Sync => "sync",
            Topic::Tick => "tick",
            Topic::Status => "status",
            Topic::Help => "help",
        }
    }

    /// One-line usage string.
    pub const fn usage(self) -> &'static str {
        match self {
            Topic::Mode => "mode <name|code> [group]        - request an operating mode",
            Topic::Timing => "timing <ch> <offset|off> [n]    - schedule a channel every n syncs",
            Topic::Setpoint => "setpoint <ch> <width> <amp>     - set the direct setpoint",
            Topic::XIndex => "x <ch> <value>                  - override the x index",
            Topic::Ceiling => "ceiling <ch> <amp>              - cap a channel's amplitude",
            Topic::Ipi => "ipi <us>                        - set the inter-pulse interval",
            Topic::Pulse => "pulse <ch> <amp> <width> <ipi>  - configure a pulse directly",
            Topic::Pattern => "pattern <slot> [group hex]      - write or read back a stored record",
            Topic::Patterns => "patterns <group> <on|off>       - load or clear a function group",
            Topic::Sync => "sync [byte ...]                 - deliver a sync with payload",
            Topic::Tick => "tick [count]                    - advance the scheduler",
            Topic::Status => "status                          - show the status snapshot",
            Topic::Help => "help [topic]                    - show help for a command",
        }
    }

    /// Looks a topic up by keyword, ignoring ASCII case.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|topic| topic.keyword().eq_ignore_ascii_case(keyword))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Console parse failures. Offsets are byte positions in the trimmed line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleError {
    Empty,
    UnknownCommand,
    Syntax { offset: usize },
    TrailingInput { offset: usize },
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleError::Empty => f.write_str("empty command"),
            ConsoleError::UnknownCommand => f.write_str("unknown command"),
            ConsoleError::Syntax { offset } => write!(f, "invalid argument at column {offset}"),
            ConsoleError::TrailingInput { offset } => {
                write!(f, "unexpected input at column {offset}")
            }
        }
    }
}
