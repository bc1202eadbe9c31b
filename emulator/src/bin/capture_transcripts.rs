use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use ignition_core::config::Config;
use session::{DEFAULT_CYCLES, Session, TranscriptProfile};

fn main() -> io::Result<()> {
    for profile in TranscriptProfile::ALL {
        record_profile(profile, Config::default())?;
    }
    Ok(())
}

fn record_profile(profile: TranscriptProfile, config: Config) -> io::Result<()> {
    let mut session = Session::new(profile, config, DEFAULT_CYCLES)?;
    let (_, summary) = session.run()?;
    println!(
        "{}: {} cycles, {} sparks, {} cuts -> {}",
        profile.tag(),
        summary.cycles,
        summary.sparks,
        summary.cuts,
        profile.log_path()
    );
    Ok(())
}

