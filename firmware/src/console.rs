#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Line handling for the governor UART console.

use core::fmt::{self, Write as _};

use heapless::String;
use stim_core::console::{CommandReply, ConsoleCommand, Topic, parse_command};

/// Longest accepted console line, excluding the terminator. Sized for a
/// `pattern` write carrying a full hex record image.
pub const CONSOLE_LINE_CAPACITY: usize = 160;
/// Longest reply line; longer replies are cut short.
pub const CONSOLE_REPLY_CAPACITY: usize = 192;

pub type ReplyLine = String<CONSOLE_REPLY_CAPACITY>;

/// Where a console line gets answered.
#[derive(Debug, Eq, PartialEq)]
pub enum Route {
    /// Answered by the console task without touching the controller.
    Local(ReplyLine),
    /// Answered from the published status atomics.
    Status,
    /// Forwarded to the background task.
    Controller(ConsoleCommand),
}

/// Parses `line` and decides who answers it.
pub fn route(line: &str) -> Route {
    match parse_command(line) {
        Ok(ConsoleCommand::Status) => Route::Status,
        Ok(ConsoleCommand::Help { topic }) => Route::Local(help_line(topic)),
        Ok(ConsoleCommand::Tick { .. }) => Route::Local(render(&CommandReply::NotApplied)),
        Ok(command) => Route::Controller(command),
        Err(err) => Route::Local(render(&format_args!("ERR {err}"))),
    }
}

/// Renders `value` into a reply line, truncating at capacity.
pub fn render(value: &dyn fmt::Display) -> ReplyLine {
    let mut line = Truncating(ReplyLine::new());
    let _ = write!(line, "{value}");
    line.0
}

fn help_line(topic: Option<Topic>) -> ReplyLine {
    let mut line = Truncating(ReplyLine::new());
    let _ = match topic {
        Some(topic) => line.write_str(topic.usage()),
        None => {
            let _ = line.write_str("commands:");
            Topic::ALL
                .iter()
                .try_for_each(|topic| write!(line, " {}", topic.keyword()))
        }
    };
    line.0
}

/// Writer that keeps what fits and drops the rest.
struct Truncating(ReplyLine);

impl fmt::Write for Truncating {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.0.push(ch).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Outcome of feeding one byte to a [`LineAssembler`].
#[derive(Debug, Eq, PartialEq)]
pub enum LineEvent {
    Pending,
    Line(String<CONSOLE_LINE_CAPACITY>),
    Overflow,
}

/// Collects bytes into lines terminated by `\r`, `\n` or `\r\n`.
///
/// Non-ASCII bytes are dropped. An over-long line is discarded up to the next
/// terminator and reported once as [`LineEvent::Overflow`].
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: String<CONSOLE_LINE_CAPACITY>,
    overflowed: bool,
}

impl LineAssembler {
    pub const fn new() -> Self {
        Self {
            buffer: String::new(),
            overflowed: false,
        }
    }

    pub fn push(&mut self, byte: u8) -> LineEvent {
        match byte {
            b'\r' | b'\n' => {
                if core::mem::take(&mut self.overflowed) {
                    self.buffer.clear();
                    return LineEvent::Pending;
                }
                if self.buffer.is_empty() {
                    return LineEvent::Pending;
                }
                LineEvent::Line(core::mem::take(&mut self.buffer))
            }
            byte if byte.is_ascii() && !byte.is_ascii_control() => {
                if self.overflowed {
                    return LineEvent::Pending;
                }
                if self.buffer.push(char::from(byte)).is_err() {
                    self.overflowed = true;
                    self.buffer.clear();
                    return LineEvent::Overflow;
                }
                LineEvent::Pending
            }
            _ => LineEvent::Pending,
        }
    }
}
