mod session;

use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process;

use session::{Session, TranscriptProfile};

const USAGE: &str =
    "Usage: stim-emulator [--profile <interactive|open-loop|closed-loop>] [--script <file>]";

struct Options {
    profile: TranscriptProfile,
    script: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let scripted = options.script.is_some();
    let mut reader: Box<dyn BufRead> = match &options.script {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.profile)?;

    if !scripted {
        writeln!(
            writer,
            "Stimulator emulator ready. Type `help` for commands or `exit` to quit."
        )?;
    }

    let mut line = String::new();
    loop {
        line.clear();
        if !scripted {
            write!(writer, "> ")?;
            writer.flush()?;
        }

        if reader.read_line(&mut line)? == 0 {
            if !scripted {
                writeln!(writer)?;
            }
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if scripted {
            writeln!(writer, "> {trimmed}")?;
        }
        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed)? {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        profile: TranscriptProfile::Interactive,
        script: None,
    };
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--profile=") {
            options.profile = TranscriptProfile::from_tag(value)?;
        } else if arg == "--profile" {
            let value = args.next().ok_or("Expected value after --profile")?;
            options.profile = TranscriptProfile::from_tag(&value)?;
        } else if let Some(value) = arg.strip_prefix("--script=") {
            options.script = Some(PathBuf::from(value));
        } else if arg == "--script" {
            let value = args.next().ok_or("Expected path after --script")?;
            options.script = Some(PathBuf::from(value));
        } else {
            options.profile = TranscriptProfile::from_tag(&arg)?;
        }
    }
    Ok(options)
}
