//! `winnow` grammar for console lines.

use heapless::Vec;
use winnow::ascii::{dec_uint, space1};
use winnow::combinator::{alt, opt, preceded, repeat};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take_while;

use super::{ConsoleCommand, ConsoleError, MAX_SYNC_PAYLOAD, Topic};
use crate::channels::ChannelId;
use crate::config::UNSCHEDULED;
use crate::mode::OperatingMode;
use crate::waveform::PATTERN_RECORD_LEN;

type GrammarResult<O> = Result<O, ErrMode<ContextError>>;

/// Parses one console line. Surrounding whitespace is ignored.
pub fn parse_command(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ConsoleError::Empty);
    }

    let mut input = line;
    let keyword = word(&mut input).map_err(|_| ConsoleError::UnknownCommand)?;
    let topic = Topic::from_keyword(keyword).ok_or(ConsoleError::UnknownCommand)?;
    let command = arguments(topic, &mut input).map_err(|_| ConsoleError::Syntax {
        offset: line.len() - input.len(),
    })?;

    let rest = input.trim_start();
    if !rest.is_empty() {
        return Err(ConsoleError::TrailingInput {
            offset: line.len() - rest.len(),
        });
    }
    Ok(command)
}

fn arguments(topic: Topic, input: &mut &str) -> GrammarResult<ConsoleCommand> {
    match topic {
        Topic::Mode => (arg(mode), opt(arg(dec_uint::<_, u8, _>)))
            .map(|(mode, group)| ConsoleCommand::Mode {
                mode,
                function_group: group.unwrap_or(0),
            })
            .parse_next(input),
        Topic::Timing => (arg(channel), arg(timing), opt(arg(dec_uint::<_, u8, _>)))
            .map(|(channel, raw_timing, interval)| ConsoleCommand::Timing {
                channel,
                raw_timing,
                sync_interval: interval.unwrap_or(1),
            })
            .parse_next(input),
        Topic::Setpoint => (
            arg(channel),
            arg(dec_uint::<_, u8, _>),
            arg(dec_uint::<_, u8, _>),
        )
            .map(|(channel, width_us, amplitude)| ConsoleCommand::Setpoint {
                channel,
                width_us,
                amplitude,
            })
            .parse_next(input),
        Topic::XIndex => (arg(channel), arg(dec_uint::<_, u8, _>))
            .map(|(channel, x)| ConsoleCommand::XIndex { channel, x })
            .parse_next(input),
        Topic::Ceiling => (arg(channel), arg(dec_uint::<_, u8, _>))
            .map(|(channel, ceiling)| ConsoleCommand::Ceiling { channel, ceiling })
            .parse_next(input),
        Topic::Ipi => arg(dec_uint::<_, u16, _>)
            .map(|ipi_us| ConsoleCommand::Ipi { ipi_us })
            .parse_next(input),
        Topic::Pulse => (
            arg(dec_uint::<_, u8, _>),
            arg(dec_uint::<_, u8, _>),
            arg(dec_uint::<_, u8, _>),
            arg(dec_uint::<_, u16, _>),
        )
            .map(|(number, amplitude, width_us, ipi_us)| ConsoleCommand::Pulse {
                number,
                amplitude,
                width_us,
                ipi_us,
            })
            .parse_next(input),
        Topic::Pattern => (
            arg(dec_uint::<_, u8, _>),
            opt((arg(dec_uint::<_, u8, _>), arg(hex_record))),
        )
            .map(|(slot, write)| match write {
                Some((group, record)) => ConsoleCommand::PatternWrite {
                    slot,
                    group,
                    record,
                },
                None => ConsoleCommand::PatternRead { slot },
            })
            .parse_next(input),
        Topic::Patterns => (arg(dec_uint::<_, u8, _>), arg(on_off))
            .map(|(group, active)| ConsoleCommand::Patterns { group, active })
            .parse_next(input),
        Topic::Sync => sync_payload
            .map(|payload| ConsoleCommand::Sync { payload })
            .parse_next(input),
        Topic::Tick => opt(arg(dec_uint::<_, u16, _>))
            .map(|count| ConsoleCommand::Tick {
                count: count.unwrap_or(1),
            })
            .parse_next(input),
        Topic::Status => Ok(ConsoleCommand::Status),
        Topic::Help => opt(arg(word.verify_map(Topic::from_keyword)))
            .map(|topic| ConsoleCommand::Help { topic })
            .parse_next(input),
    }
}

/// Argument preceded by at least one blank.
fn arg<'s, O>(
    parser: impl Parser<&'s str, O, ErrMode<ContextError>>,
) -> impl Parser<&'s str, O, ErrMode<ContextError>> {
    preceded(space1, parser)
}

fn word<'s>(input: &mut &'s str) -> GrammarResult<&'s str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-').parse_next(input)
}

fn channel(input: &mut &str) -> GrammarResult<ChannelId> {
    dec_uint::<_, u8, _>
        .verify_map(ChannelId::from_number)
        .parse_next(input)
}

/// Mode by network code or by label.
fn mode(input: &mut &str) -> GrammarResult<OperatingMode> {
    alt((
        dec_uint::<_, u8, _>.verify_map(OperatingMode::from_raw),
        word.verify_map(OperatingMode::from_label),
    ))
    .parse_next(input)
}

fn timing(input: &mut &str) -> GrammarResult<u8> {
    alt((
        dec_uint::<_, u8, _>,
        word.verify_map(|w: &str| w.eq_ignore_ascii_case("off").then_some(UNSCHEDULED)),
    ))
    .parse_next(input)
}

fn on_off(input: &mut &str) -> GrammarResult<bool> {
    word.verify_map(|w: &str| {
        if w.eq_ignore_ascii_case("on") {
            Some(true)
        } else if w.eq_ignore_ascii_case("off") {
            Some(false)
        } else {
            None
        }
    })
    .parse_next(input)
}

/// Record image as two hex digits per byte.
fn hex_record(input: &mut &str) -> GrammarResult<[u8; PATTERN_RECORD_LEN]> {
    take_while(PATTERN_RECORD_LEN * 2, |c: char| c.is_ascii_hexdigit())
        .verify_map(|digits: &str| {
            let mut record = [0u8; PATTERN_RECORD_LEN];
            for (byte, pair) in record.iter_mut().zip(digits.as_bytes().chunks_exact(2)) {
                let pair = core::str::from_utf8(pair).ok()?;
                *byte = u8::from_str_radix(pair, 16).ok()?;
            }
            Some(record)
        })
        .parse_next(input)
}

fn sync_payload(input: &mut &str) -> GrammarResult<Vec<u8, MAX_SYNC_PAYLOAD>> {
    repeat(0..=MAX_SYNC_PAYLOAD, arg(dec_uint::<_, u8, _>))
        .fold(Vec::new, |mut payload: Vec<u8, MAX_SYNC_PAYLOAD>, byte| {
            // The repetition bound matches the capacity.
            let _ = payload.push(byte);
            payload
        })
        .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_by_label_and_code() {
        assert_eq!(
            parse_command("mode patient-control 3"),
            Ok(ConsoleCommand::Mode {
                mode: OperatingMode::PatientControl,
                function_group: 3,
            })
        );
        assert_eq!(
            parse_command("  MODE 3 "),
            Ok(ConsoleCommand::Mode {
                mode: OperatingMode::YManual,
                function_group: 0,
            })
        );
        assert!(matches!(
            parse_command("mode 6"),
            Err(ConsoleError::Syntax { .. })
        ));
    }

    #[test]
    fn parses_timing_with_defaults() {
        assert_eq!(
            parse_command("timing 2 off"),
            Ok(ConsoleCommand::Timing {
                channel: ChannelId::Ch2,
                raw_timing: UNSCHEDULED,
                sync_interval: 1,
            })
        );
        assert_eq!(
            parse_command("timing 4 12 3"),
            Ok(ConsoleCommand::Timing {
                channel: ChannelId::Ch4,
                raw_timing: 12,
                sync_interval: 3,
            })
        );
    }

    #[test]
    fn rejects_channel_outside_range() {
        assert!(matches!(
            parse_command("setpoint 5 40 20"),
            Err(ConsoleError::Syntax { .. })
        ));
        assert!(matches!(
            parse_command("setpoint 0 40 20"),
            Err(ConsoleError::Syntax { .. })
        ));
    }

    #[test]
    fn pulse_keeps_raw_channel_number() {
        assert_eq!(
            parse_command("pulse 7 100 50 20"),
            Ok(ConsoleCommand::Pulse {
                number: 7,
                amplitude: 100,
                width_us: 50,
                ipi_us: 20,
            })
        );
    }

    #[test]
    fn sync_payload_is_bounded() {
        let parsed = parse_command("sync 1 2 3").expect("three bytes");
        let ConsoleCommand::Sync { payload } = parsed else {
            panic!("expected sync, got {parsed:?}");
        };
        assert_eq!(payload.as_slice(), &[1, 2, 3]);

        assert_eq!(
            parse_command("sync"),
            Ok(ConsoleCommand::Sync {
                payload: Vec::new()
            })
        );
        assert_eq!(
            parse_command("sync 1 2 3 4 5 6 7 8 9"),
            Err(ConsoleError::TrailingInput { offset: 21 })
        );
    }

    #[test]
    fn pattern_reads_or_writes_a_slot() {
        assert_eq!(
            parse_command("pattern 4"),
            Ok(ConsoleCommand::PatternRead { slot: 4 })
        );

        let mut line: heapless::String<160> =
            heapless::String::try_from("pattern 2 7 0102ff").expect("line fits");
        for _ in 3..PATTERN_RECORD_LEN {
            line.push_str("00").expect("line fits");
        }
        let Ok(ConsoleCommand::PatternWrite {
            slot,
            group,
            record,
        }) = parse_command(&line)
        else {
            panic!("expected a pattern write");
        };
        assert_eq!((slot, group), (2, 7));
        assert_eq!(&record[..4], &[0x01, 0x02, 0xff, 0x00]);

        assert_eq!(
            parse_command("pattern 2 7 0102ff"),
            Err(ConsoleError::TrailingInput { offset: 10 })
        );
    }

    #[test]
    fn reports_unknown_and_trailing_input() {
        assert_eq!(parse_command(""), Err(ConsoleError::Empty));
        assert_eq!(parse_command("launch"), Err(ConsoleError::UnknownCommand));
        assert_eq!(
            parse_command("status now"),
            Err(ConsoleError::TrailingInput { offset: 7 })
        );
        assert!(matches!(
            parse_command("ipi 70000"),
            Err(ConsoleError::Syntax { .. })
        ));
    }

    #[test]
    fn help_accepts_optional_topic() {
        assert_eq!(
            parse_command("help"),
            Ok(ConsoleCommand::Help { topic: None })
        );
        assert_eq!(
            parse_command("help X"),
            Ok(ConsoleCommand::Help {
                topic: Some(Topic::XIndex)
            })
        );
        assert_eq!(
            parse_command("tick"),
            Ok(ConsoleCommand::Tick { count: 1 })
        );
        assert_eq!(
            parse_command("patterns 2 off"),
            Ok(ConsoleCommand::Patterns {
                group: 2,
                active: false
            })
        );
    }
}
