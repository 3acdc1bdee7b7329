use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{DEMO_FUNCTION_GROUP, Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::OpenLoop)?;
    record_profile(TranscriptProfile::ClosedLoop)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    let script: &[&str] = match profile {
        TranscriptProfile::OpenLoop => &OPEN_LOOP,
        TranscriptProfile::ClosedLoop => &CLOSED_LOOP,
        TranscriptProfile::Interactive => &[],
    };
    for line in script {
        let _ = session.handle_command(line)?;
    }
    if profile == TranscriptProfile::ClosedLoop {
        let _ = session.handle_command(&format!("patterns {DEMO_FUNCTION_GROUP} off"))?;
    }
    Ok(())
}

const OPEN_LOOP: [&str; 14] = [
    "help",
    "timing 1 4",
    "timing 3 8 2",
    "setpoint 1 50 100",
    "setpoint 3 80 60",
    "ceiling 3 40",
    "mode y-manual",
    "sync",
    "tick 10",
    "sync",
    "tick 10",
    "status",
    "mode waiting",
    "tick 20",
];

const CLOSED_LOOP: [&str; 10] = [
    "timing 1 3",
    "timing 2 6",
    "mode patient-control 1",
    "sync 40 120",
    "tick 10",
    "sync 60 200",
    "tick 10",
    "tick 200",
    "status",
    "mode stopped",
];
