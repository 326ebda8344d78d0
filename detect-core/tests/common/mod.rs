#![allow(dead_code)]

use core::cell::Cell;
use core::ops::Add;
use core::time::Duration;

use detect_core::hardware::{
    CaptureEngine, CaptureQueue, ChannelMask, Clock, FatalHalt, PinControl, PinId, TargetControl,
    Word,
};
use detect_core::telemetry::TelemetryInstant;

/// Microseconds between bus words in scripted attempts.
pub const WORD_SPACING_US: u64 = 100;
/// Simulated time consumed by every clock read.
pub const POLL_TICK_US: u64 = 5;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MockInstant(pub u64);

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs.as_micros() as u64)
    }
}

impl TelemetryInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Arm,
    Quiesce,
    DisableChannels(ChannelMask),
    Reset,
    Disable(PinId),
    ClearPulls(PinId),
    ReleaseDirection(PinId),
    Sleep(Duration),
}

/// Simulated board. Each attempt (counted by `arm`) replays its script from
/// the start whenever the target is reset, like a rebooting target would.
pub struct MockBoard {
    now: Cell<u64>,
    scripts: Vec<Vec<(u64, Word)>>,
    script_index: Option<usize>,
    advance_on_reset: bool,
    replay_from: Option<u64>,
    cursor: usize,
    pub ops: Vec<Op>,
}

impl MockBoard {
    /// Scripts with words spaced [`WORD_SPACING_US`] apart. The last script
    /// repeats for any further attempts.
    pub fn new(scripts: &[&[Word]]) -> Self {
        let scripts = scripts
            .iter()
            .map(|words| {
                words
                    .iter()
                    .enumerate()
                    .map(|(index, &word)| ((index as u64 + 1) * WORD_SPACING_US, word))
                    .collect()
            })
            .collect();
        Self {
            now: Cell::new(0),
            scripts,
            script_index: None,
            advance_on_reset: false,
            replay_from: None,
            cursor: 0,
            ops: Vec::new(),
        }
    }

    /// Like [`MockBoard::new`], but each target reset moves to the next
    /// script instead of each attempt.
    pub fn per_reset(scripts: &[&[Word]]) -> Self {
        Self {
            advance_on_reset: true,
            ..Self::new(scripts)
        }
    }

    pub fn silent() -> Self {
        let nothing: &[Word] = &[];
        Self::new(&[nothing])
    }

    pub fn now_micros(&self) -> u64 {
        self.now.get()
    }

    pub fn count(&self, op: Op) -> usize {
        self.ops.iter().filter(|logged| **logged == op).count()
    }

    pub fn resets(&self) -> usize {
        self.count(Op::Reset)
    }

    fn advance_script(&mut self) {
        let next = self.script_index.map_or(0, |index| index + 1);
        self.script_index = Some(next.min(self.scripts.len() - 1));
    }

    fn pending(&self) -> Option<Word> {
        let script = &self.scripts[self.script_index?];
        let started = self.replay_from?;
        let &(offset, word) = script.get(self.cursor)?;
        (started + offset <= self.now.get()).then_some(word)
    }
}

impl CaptureEngine for MockBoard {
    fn arm(&mut self) {
        if !self.advance_on_reset {
            self.advance_script();
        }
        self.replay_from = None;
        self.ops.push(Op::Arm);
    }

    fn quiesce(&mut self) {
        self.replay_from = None;
        self.ops.push(Op::Quiesce);
    }

    fn disable_channels(&mut self, mask: ChannelMask) {
        self.replay_from = None;
        self.ops.push(Op::DisableChannels(mask));
    }
}

impl CaptureQueue for MockBoard {
    fn is_empty(&self) -> bool {
        self.pending().is_none()
    }

    fn dequeue(&mut self) -> Word {
        let word = self.pending().expect("dequeue called on an empty queue");
        self.cursor += 1;
        word
    }
}

impl TargetControl for MockBoard {
    fn reset_target(&mut self) {
        if self.advance_on_reset {
            self.advance_script();
        }
        self.replay_from = Some(self.now.get());
        self.cursor = 0;
        self.ops.push(Op::Reset);
    }
}

impl PinControl for MockBoard {
    fn disable(&mut self, pin: PinId) {
        self.ops.push(Op::Disable(pin));
    }

    fn clear_pulls(&mut self, pin: PinId) {
        self.ops.push(Op::ClearPulls(pin));
    }

    fn release_direction(&mut self, pin: PinId) {
        self.ops.push(Op::ReleaseDirection(pin));
    }
}

impl Clock for MockBoard {
    type Instant = MockInstant;

    fn now(&self) -> MockInstant {
        let current = self.now.get();
        self.now.set(current + POLL_TICK_US);
        MockInstant(current)
    }

    fn sleep(&mut self, duration: Duration) {
        self.now.set(self.now.get() + duration.as_micros() as u64);
        self.ops.push(Op::Sleep(duration));
    }
}

impl FatalHalt for MockBoard {
    fn halt_with_error(&mut self, code: u8, total_stages: u8) -> ! {
        panic!("halt {code}/{total_stages}");
    }
}
