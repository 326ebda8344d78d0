use std::io;
use std::path::PathBuf;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, SessionOptions, TraceProfile, TranscriptLogger};

const TRANSCRIPT_DIR: &str = "transcripts";

fn main() -> io::Result<()> {
    for profile in TraceProfile::ALL {
        record_profile(profile)?;
    }
    Ok(())
}

fn record_profile(profile: TraceProfile) -> io::Result<()> {
    let entries = profile
        .entries()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let mut session = Session::new(&entries, SessionOptions::default());
    let result = session.run();

    let path: PathBuf = [TRANSCRIPT_DIR, &format!("{}.log", profile.tag())]
        .iter()
        .collect();
    let header = format!("Boot detect transcript: {}", profile.tag());
    let mut logger = TranscriptLogger::create(&path, &header)?;
    logger.append_lines(session.lines())?;
    logger.append_lines(&[session.summary(&result)])?;
    println!("{}", path.display());
    Ok(())
}
