//! Protocol observer for a single boot attempt.
//!
//! The observer drains the capture queue in a tight, non-blocking loop,
//! classifies each word pair against the signature table, and maintains two
//! nested deadlines: the overall attempt deadline and the command-phase
//! deadline armed while the target is expected to answer its first command.
//! It terminates with exactly one [`AttemptOutcome`].

use core::fmt;
use core::time::Duration;

use crate::config::DetectConfig;
use crate::controller::{BoardVariant, DetectionContext};
use crate::hardware::{CaptureQueue, Clock, TargetControl, Word};
use crate::protocol::{self, ProtocolEvent};
use crate::telemetry::{DetectEvent, TelemetrySink};

/// Terminal result of one attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttemptOutcome {
    /// Block 1 was read; the glitch window is confirmed.
    Success,
    /// The command phase stalled more often than the reset budget allows.
    InternalTimeout,
    /// The attempt deadline elapsed.
    OverallTimeout,
}

impl AttemptOutcome {
    pub const fn is_success(self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::InternalTimeout => "internal-timeout",
            AttemptOutcome::OverallTimeout => "overall-timeout",
        })
    }
}

/// Per-attempt bus progress. Created fresh for every attempt.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ObservationState {
    pub last_word: Word,
    pub current_word: Word,
    /// Set once block 0 has been read; never cleared within an attempt.
    pub was_read_zero: bool,
    /// Set once the command phase started; never cleared within an attempt.
    pub was_cmd1: bool,
    pub inner_reset_count: u8,
}

impl ObservationState {
    pub const fn new() -> Self {
        Self {
            last_word: 0,
            current_word: 0,
            was_read_zero: false,
            was_cmd1: false,
            inner_reset_count: 0,
        }
    }
}

/// Overall and command-phase deadlines of an attempt.
///
/// A disarmed phase deadline tracks the overall deadline.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimeoutWindow<TInstant> {
    overall: TInstant,
    phase: Option<TInstant>,
}

impl<TInstant> TimeoutWindow<TInstant>
where
    TInstant: Copy + Ord,
{
    pub const fn new(overall: TInstant) -> Self {
        Self {
            overall,
            phase: None,
        }
    }

    pub fn overall_deadline(&self) -> TInstant {
        self.overall
    }

    pub fn phase_deadline(&self) -> TInstant {
        self.phase.unwrap_or(self.overall)
    }

    pub fn is_phase_armed(&self) -> bool {
        self.phase.is_some()
    }

    pub fn arm_phase(&mut self, deadline: TInstant) {
        self.phase = Some(deadline);
    }

    pub fn disarm_phase(&mut self) {
        self.phase = None;
    }

    /// Moves the overall deadline out to `deadline`; never pulls it in.
    pub fn extend_overall(&mut self, deadline: TInstant) {
        if deadline > self.overall {
            self.overall = deadline;
        }
    }

    /// Returns `true` when an armed phase deadline has elapsed.
    pub fn phase_elapsed(&self, now: TInstant) -> bool {
        self.phase.is_some_and(|deadline| now >= deadline)
    }

    pub fn overall_elapsed(&self, now: TInstant) -> bool {
        now >= self.overall
    }
}

/// State machine for one boot attempt.
#[derive(Clone, Debug)]
pub struct ProtocolObserver<TInstant> {
    state: ObservationState,
    window: TimeoutWindow<TInstant>,
    max_phase_resets: u8,
    command_phase_window: Duration,
    read_zero_extension: Duration,
}

impl<TInstant> ProtocolObserver<TInstant>
where
    TInstant: Copy + Ord + core::ops::Add<Duration, Output = TInstant>,
{
    /// Starts an attempt at `started_at` that may run for `timeout`.
    pub fn new(started_at: TInstant, timeout: Duration, config: &DetectConfig) -> Self {
        Self {
            state: ObservationState::new(),
            window: TimeoutWindow::new(started_at + timeout),
            max_phase_resets: config.max_phase_resets,
            command_phase_window: config.command_phase_window,
            read_zero_extension: config.read_zero_extension,
        }
    }

    pub fn state(&self) -> &ObservationState {
        &self.state
    }

    pub fn window(&self) -> &TimeoutWindow<TInstant> {
        &self.window
    }

    /// Polls until the attempt reaches a terminal outcome.
    pub fn run<H, S>(
        &mut self,
        hardware: &mut H,
        context: &mut DetectionContext,
        telemetry: &mut S,
    ) -> AttemptOutcome
    where
        H: CaptureQueue + TargetControl + Clock<Instant = TInstant>,
        S: TelemetrySink<TInstant>,
    {
        loop {
            if let Some(outcome) = self.poll(hardware, context, telemetry) {
                return outcome;
            }
        }
    }

    /// Runs one iteration of the poll loop: deadlines first, then at most one
    /// word from the queue.
    pub fn poll<H, S>(
        &mut self,
        hardware: &mut H,
        context: &mut DetectionContext,
        telemetry: &mut S,
    ) -> Option<AttemptOutcome>
    where
        H: CaptureQueue + TargetControl + Clock<Instant = TInstant>,
        S: TelemetrySink<TInstant>,
    {
        let now = hardware.now();
        if let Some(outcome) = self.check_deadlines(now, hardware, telemetry) {
            return Some(outcome);
        }

        let word = hardware.try_dequeue()?;
        self.observe_word(now, word, context, telemetry)
    }

    /// Applies the deadline policy at `now`.
    ///
    /// An elapsed phase deadline resets the target and disarms the phase
    /// while the reset budget lasts, then ends the attempt.
    pub fn check_deadlines<T, S>(
        &mut self,
        now: TInstant,
        target: &mut T,
        telemetry: &mut S,
    ) -> Option<AttemptOutcome>
    where
        T: TargetControl + ?Sized,
        S: TelemetrySink<TInstant>,
    {
        if self.window.overall_elapsed(now) {
            telemetry.record(now, DetectEvent::OverallTimeout);
            return Some(AttemptOutcome::OverallTimeout);
        }

        if self.window.phase_elapsed(now) {
            if self.state.inner_reset_count >= self.max_phase_resets {
                telemetry.record(now, DetectEvent::InternalTimeout);
                return Some(AttemptOutcome::InternalTimeout);
            }
            self.state.inner_reset_count += 1;
            telemetry.record(
                now,
                DetectEvent::PhaseReset {
                    count: self.state.inner_reset_count,
                },
            );
            target.reset_target();
            self.window.disarm_phase();
        }

        None
    }

    /// Feeds one captured word observed at `now`.
    pub fn observe_word<S>(
        &mut self,
        now: TInstant,
        word: Word,
        context: &mut DetectionContext,
        telemetry: &mut S,
    ) -> Option<AttemptOutcome>
    where
        S: TelemetrySink<TInstant>,
    {
        self.state.current_word = word;
        let event = protocol::classify(self.state.last_word, word, self.state.was_read_zero);
        self.state.last_word = word;

        let event = event?;
        telemetry.record(now, DetectEvent::Protocol(event));
        self.apply(now, event, context, telemetry)
    }

    fn apply<S>(
        &mut self,
        now: TInstant,
        event: ProtocolEvent,
        context: &mut DetectionContext,
        telemetry: &mut S,
    ) -> Option<AttemptOutcome>
    where
        S: TelemetrySink<TInstant>,
    {
        match event {
            ProtocolEvent::CommandPhaseStarted => {
                self.window.arm_phase(now + self.command_phase_window);
                self.state.was_cmd1 = true;
            }
            ProtocolEvent::CommandPhaseCompleted => self.window.disarm_phase(),
            ProtocolEvent::ReadBlockZero => {
                // Slower board revisions need the extra margin before block 1.
                self.window.extend_overall(now + self.read_zero_extension);
                self.state.was_read_zero = true;
            }
            ProtocolEvent::DiagnosticStatus => {
                if context.board_variant() != BoardVariant::Erista {
                    context.set_board_variant(BoardVariant::Erista);
                    telemetry.record(now, DetectEvent::VariantDetected(BoardVariant::Erista));
                }
            }
            ProtocolEvent::ReadBlockOne => return Some(AttemptOutcome::Success),
        }
        None
    }
}
