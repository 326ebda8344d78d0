use std::cell::Cell;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::ops::Add;
use std::path::Path;
use std::process;
use std::time::Duration;

use detect_core::config::DetectConfig;
use detect_core::controller::{BootDetector, Detection, DetectError, DetectionContext};
use detect_core::hardware::{
    CaptureEngine, CaptureQueue, ChannelMask, Clock, FatalHalt, PinControl, PinId, TargetControl,
    Word,
};
use detect_core::telemetry::{DetectEvent, TelemetryInstant, TelemetrySink};
use detect_core::trace::{self, TraceEntry};

/// Simulated time consumed by every clock read.
const POLL_TICK_US: u64 = 2;

pub const HELP_TEXT: &str = "\
Usage: detect-emulator [--profile <name> | --trace <file>] [--timeout-ms <n>] [--attempts <n>]

Profiles:
  mariko       command phase, block 0, block 1
  erista       as mariko plus the status request only older boards send
  slow-block1  block 1 arrives after the boot timeout but inside the block 0 margin
  cmd1-stall   command phase never answered; exercises phase resets
  no-block1    block 0 read, block 1 never follows
  silent       no bus activity";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraceProfile {
    Mariko,
    Erista,
    SlowBlockOne,
    CommandStall,
    NoBlockOne,
    Silent,
}

impl TraceProfile {
    pub const ALL: [TraceProfile; 6] = [
        TraceProfile::Mariko,
        TraceProfile::Erista,
        TraceProfile::SlowBlockOne,
        TraceProfile::CommandStall,
        TraceProfile::NoBlockOne,
        TraceProfile::Silent,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            TraceProfile::Mariko => "mariko",
            TraceProfile::Erista => "erista",
            TraceProfile::SlowBlockOne => "slow-block1",
            TraceProfile::CommandStall => "cmd1-stall",
            TraceProfile::NoBlockOne => "no-block1",
            TraceProfile::Silent => "silent",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        Self::ALL
            .into_iter()
            .find(|profile| profile.tag().eq_ignore_ascii_case(tag))
            .ok_or_else(|| format!("Unknown trace profile `{tag}`"))
    }

    pub fn trace(self) -> &'static str {
        match self {
            TraceProfile::Mariko => {
                "# cmd1\n+1ms 0x41000000\n+8us 0xF9\n+40us 0x3F000000\n\
                 # block 0\n+4ms 0x51000000\n+12us 0x55\n\
                 # block 1\n+6ms 0x51000000\n+12us 0x147\n"
            }
            TraceProfile::Erista => {
                "+1ms 0x41000000\n+8us 0xF9\n+40us 0x3F000000\n\
                 +4ms 0x51000000\n+12us 0x55\n\
                 # status request\n+2ms 0x4D000200\n+12us 0xB1\n\
                 +6ms 0x51000000\n+12us 0x147\n"
            }
            TraceProfile::SlowBlockOne => {
                "+1ms 0x41000000\n+8us 0xF9\n+40us 0x3F000000\n\
                 +90ms 0x51000000\n+12us 0x55\n\
                 +180ms 0x51000000\n+12us 0x147\n"
            }
            TraceProfile::CommandStall => "+1ms 0x41000000\n+8us 0xF9\n",
            TraceProfile::NoBlockOne => {
                "+1ms 0x41000000\n+8us 0xF9\n+40us 0x3F000000\n+4ms 0x51000000\n+12us 0x55\n"
            }
            TraceProfile::Silent => "# nothing on the bus\n",
        }
    }

    pub fn entries(self) -> Result<Vec<TraceEntry>, String> {
        parse_entries(self.trace())
    }
}

/// Parses a capture trace into host memory.
pub fn parse_entries(input: &str) -> Result<Vec<TraceEntry>, String> {
    trace::parse_trace_vec(input).map_err(|err| err.to_string())
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct SimInstant(u64);

impl SimInstant {
    pub fn as_micros(self) -> u64 {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl TelemetryInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for SimInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}.{:03} ms", self.0 / 1_000, self.0 % 1_000)
    }
}

/// Board simulation on a virtual clock. The trace replays from its start
/// every time the target is reset.
pub struct SimBoard {
    now_us: Cell<u64>,
    schedule: Vec<(u64, Word)>,
    replay_from: Option<u64>,
    cursor: usize,
    enabled_channels: ChannelMask,
    resets: u32,
    pins_released: u32,
}

impl SimBoard {
    pub fn new(entries: &[TraceEntry]) -> Self {
        let mut offset = 0_u64;
        let schedule = entries
            .iter()
            .map(|entry| {
                let delay = u64::try_from(entry.delay.as_micros()).unwrap_or(u64::MAX);
                offset = offset.saturating_add(delay);
                (offset, entry.word)
            })
            .collect();

        Self {
            now_us: Cell::new(0),
            schedule,
            replay_from: None,
            cursor: 0,
            enabled_channels: ChannelMask::NONE,
            resets: 0,
            pins_released: 0,
        }
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    pub fn pins_released(&self) -> u32 {
        self.pins_released
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.now_us.get())
    }

    fn pending(&self) -> Option<Word> {
        if self.enabled_channels == ChannelMask::NONE {
            return None;
        }
        let started = self.replay_from?;
        let &(offset, word) = self.schedule.get(self.cursor)?;
        (started.saturating_add(offset) <= self.now_us.get()).then_some(word)
    }
}

impl CaptureEngine for SimBoard {
    fn arm(&mut self) {
        self.enabled_channels = ChannelMask::ALL;
    }

    fn quiesce(&mut self) {
        self.enabled_channels = ChannelMask::NONE;
    }

    fn disable_channels(&mut self, mask: ChannelMask) {
        let remaining = self.enabled_channels.bits() & !mask.bits();
        self.enabled_channels = ChannelMask::from_bits(remaining);
    }
}

impl CaptureQueue for SimBoard {
    fn is_empty(&self) -> bool {
        self.pending().is_none()
    }

    fn dequeue(&mut self) -> Word {
        match self.pending() {
            Some(word) => {
                self.cursor += 1;
                word
            }
            None => 0,
        }
    }
}

impl TargetControl for SimBoard {
    fn reset_target(&mut self) {
        self.resets += 1;
        self.replay_from = Some(self.now_us.get());
        self.cursor = 0;
    }
}

impl PinControl for SimBoard {
    fn disable(&mut self, _: PinId) {}

    fn clear_pulls(&mut self, _: PinId) {}

    fn release_direction(&mut self, _: PinId) {
        self.pins_released += 1;
    }
}

impl Clock for SimBoard {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        let current = self.now_us.get();
        self.now_us.set(current + POLL_TICK_US);
        SimInstant(current)
    }

    fn sleep(&mut self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.now_us.set(self.now_us.get().saturating_add(micros));
    }
}

impl FatalHalt for SimBoard {
    fn halt_with_error(&mut self, code: u8, total_stages: u8) -> ! {
        eprintln!("HALT {code}/{total_stages}");
        process::exit(i32::from(code));
    }
}

/// Telemetry sink that renders every event as a transcript line.
#[derive(Default)]
pub struct ConsoleTelemetry {
    lines: Vec<String>,
    echo: bool,
}

impl ConsoleTelemetry {
    pub fn new(echo: bool) -> Self {
        Self {
            lines: Vec::new(),
            echo,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl TelemetrySink<SimInstant> for ConsoleTelemetry {
    fn record(&mut self, timestamp: SimInstant, event: DetectEvent) {
        let line = format!("[{timestamp}] {event}");
        if self.echo {
            println!("{line}");
        }
        self.lines.push(line);
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SessionOptions {
    pub timeout: Duration,
    pub config: DetectConfig,
    pub echo: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(100),
            config: DetectConfig::DEFAULT,
            echo: false,
        }
    }
}

pub struct Session {
    detector: BootDetector<SimBoard, ConsoleTelemetry>,
    context: DetectionContext,
    timeout: Duration,
}

impl Session {
    pub fn new(entries: &[TraceEntry], options: SessionOptions) -> Self {
        let detector = BootDetector::with_telemetry(
            SimBoard::new(entries),
            ConsoleTelemetry::new(options.echo),
            options.config,
        );
        Self {
            detector,
            context: DetectionContext::new(),
            timeout: options.timeout,
        }
    }

    pub fn run(&mut self) -> Result<Detection, DetectError> {
        self.detector.detect(&mut self.context, self.timeout)
    }

    pub fn context(&self) -> &DetectionContext {
        &self.context
    }

    pub fn board(&self) -> &SimBoard {
        self.detector.hardware()
    }

    pub fn lines(&self) -> &[String] {
        self.detector.telemetry().lines()
    }

    /// Drives the simulated halt for an exhausted run.
    pub fn halt(&mut self, error: DetectError) -> ! {
        let stages = self.detector.config().total_stages;
        self.detector
            .hardware_mut()
            .halt_with_error(error.halt_code().as_raw(), stages)
    }

    /// One-line summary of a finished run.
    pub fn summary(&self, result: &Result<Detection, DetectError>) -> String {
        let board = self.board();
        match result {
            Ok(detection) => format!(
                "DETECTED attempt={} variant={} resets={} elapsed={}ms",
                detection.attempt,
                detection.variant,
                board.resets(),
                board.elapsed().as_millis()
            ),
            Err(error) => format!(
                "FAILED {error} resets={} pins-released={} elapsed={}ms",
                board.resets(),
                board.pins_released(),
                board.elapsed().as_millis()
            ),
        }
    }
}

pub struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    pub fn create(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# {header}")?;
        writeln!(logger.writer, "# Timestamps are simulated time since power-on")?;
        writeln!(logger.writer)?;
        Ok(logger)
    }

    pub fn append_lines(&mut self, lines: &[String]) -> io::Result<()> {
        for line in lines {
            writeln!(self.writer, "{line}")?;
        }
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use detect_core::controller::{BoardVariant, HaltCode};

    fn run_profile(profile: TraceProfile) -> (Session, Result<Detection, DetectError>) {
        run_profile_with(profile, SessionOptions::default())
    }

    fn run_profile_with(
        profile: TraceProfile,
        options: SessionOptions,
    ) -> (Session, Result<Detection, DetectError>) {
        let entries = profile.entries().expect("built-in trace");
        let mut session = Session::new(&entries, options);
        let result = session.run();
        (session, result)
    }

    #[test]
    fn builtin_profiles_parse() {
        for profile in TraceProfile::ALL {
            let entries = profile.entries().unwrap();
            assert_eq!(entries.is_empty(), profile == TraceProfile::Silent);
        }
    }

    #[test]
    fn erista_profile_detects_variant() {
        let (session, result) = run_profile(TraceProfile::Erista);
        let detection = result.expect("erista trace should be detected");
        assert_eq!(detection.variant, BoardVariant::Erista);
        assert_eq!(session.context().board_variant(), BoardVariant::Erista);
        assert!(session.lines().iter().any(|line| line.ends_with("variant erista")));
    }

    #[test]
    fn slow_block_one_relies_on_block_zero_margin() {
        let (session, result) = run_profile(TraceProfile::SlowBlockOne);
        let detection = result.expect("block 0 should extend the attempt");
        assert_eq!(detection.attempt, 1);
        assert_eq!(detection.variant, BoardVariant::Mariko);
        assert!(session.board().elapsed() > SessionOptions::default().timeout);
    }

    #[test]
    fn command_stall_exhausts_with_cmd1_code() {
        let options = SessionOptions {
            timeout: Duration::from_millis(500),
            ..SessionOptions::default()
        };
        let (session, result) = run_profile_with(TraceProfile::CommandStall, options);
        let error = result.expect_err("stalled command phase cannot succeed");
        assert_eq!(error.halt_code(), HaltCode::CommandPhaseStalled);
        assert_eq!(session.board().resets(), 4 * 6);
        assert_eq!(session.board().pins_released(), 4 * 3);
    }

    #[test]
    fn silent_profile_reports_no_activity() {
        let (session, result) = run_profile(TraceProfile::Silent);
        let error = result.as_ref().expect_err("silent bus cannot succeed");
        assert_eq!(error.halt_code(), HaltCode::NoBootActivity);
        assert!(session.summary(&result).starts_with("FAILED"));
    }

    #[test]
    fn unknown_profile_is_rejected() {
        assert!(TraceProfile::from_tag("switch").is_err());
        assert_eq!(TraceProfile::from_tag("NO-BLOCK1"), Ok(TraceProfile::NoBlockOne));
    }
}
