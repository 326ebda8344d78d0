//! Retry/recovery controller for boot detection.
//!
//! [`BootDetector`] owns the attempt lifecycle: it arms the capture engine,
//! resets the target, runs a fresh [`ProtocolObserver`] to a terminal
//! outcome, and tears the hardware down between failed attempts. Once the
//! attempt budget is spent it escalates to the board's fatal halt.

use core::fmt;
use core::time::Duration;

use crate::config::DetectConfig;
use crate::hardware::DetectorHardware;
use crate::observer::{AttemptOutcome, ObservationState, ProtocolObserver};
use crate::telemetry::{DetectEvent, NoopTelemetry, TelemetrySink};

/// Target hardware class, told apart by the boot-time status request.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum BoardVariant {
    /// Newer boards; assumed until proven otherwise.
    #[default]
    Mariko,
    /// Older boards that issue a status request after reading block 0.
    Erista,
}

impl fmt::Display for BoardVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BoardVariant::Mariko => "mariko",
            BoardVariant::Erista => "erista",
        })
    }
}

/// State shared between the detector and the stages that run after it.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DetectionContext {
    variant: BoardVariant,
    detection_complete: bool,
}

impl DetectionContext {
    pub const fn new() -> Self {
        Self {
            variant: BoardVariant::Mariko,
            detection_complete: false,
        }
    }

    pub const fn board_variant(&self) -> BoardVariant {
        self.variant
    }

    pub fn set_board_variant(&mut self, variant: BoardVariant) {
        self.variant = variant;
    }

    /// Set by the downstream stage once the whole chain has succeeded.
    pub fn mark_detection_complete(&mut self) {
        self.detection_complete = true;
    }

    pub const fn is_detection_complete(&self) -> bool {
        self.detection_complete
    }
}

/// Halt code reported after every attempt failed, ordered by how far the
/// boot got.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HaltCode {
    /// Block 0 was read but block 1 never followed.
    ReadBlockZeroSeen,
    /// The command phase started but block 0 was never read.
    CommandPhaseStalled,
    /// No recognised bus activity.
    NoBootActivity,
}

impl HaltCode {
    pub const fn as_raw(self) -> u8 {
        match self {
            HaltCode::ReadBlockZeroSeen => 1,
            HaltCode::CommandPhaseStalled => 2,
            HaltCode::NoBootActivity => 3,
        }
    }

    pub const fn from_raw(code: u8) -> Option<Self> {
        match code {
            1 => Some(HaltCode::ReadBlockZeroSeen),
            2 => Some(HaltCode::CommandPhaseStalled),
            3 => Some(HaltCode::NoBootActivity),
            _ => None,
        }
    }

    /// Picks the code for the progress made by the final attempt.
    pub const fn from_progress(state: &ObservationState) -> Self {
        if state.was_read_zero {
            HaltCode::ReadBlockZeroSeen
        } else if state.was_cmd1 {
            HaltCode::CommandPhaseStalled
        } else {
            HaltCode::NoBootActivity
        }
    }
}

impl fmt::Display for HaltCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HaltCode::ReadBlockZeroSeen => "block 1 never read",
            HaltCode::CommandPhaseStalled => "command phase never completed",
            HaltCode::NoBootActivity => "no boot activity",
        };
        write!(f, "{} ({label})", self.as_raw())
    }
}

/// Successful detection summary.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Detection {
    /// 1-based attempt that observed block 1.
    pub attempt: u8,
    pub variant: BoardVariant,
}

/// Unrecoverable detection failure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DetectError {
    Exhausted { code: HaltCode, attempts: u8 },
}

impl DetectError {
    pub const fn halt_code(&self) -> HaltCode {
        match self {
            DetectError::Exhausted { code, .. } => *code,
        }
    }
}

impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectError::Exhausted { code, attempts } => {
                write!(f, "boot not detected after {attempts} attempts: {code}")
            }
        }
    }
}

/// Drives boot detection attempts on a board.
pub struct BootDetector<H, S = NoopTelemetry> {
    hardware: H,
    telemetry: S,
    config: DetectConfig,
}

impl<H> BootDetector<H, NoopTelemetry>
where
    H: DetectorHardware,
{
    pub fn new(hardware: H, config: DetectConfig) -> Self {
        Self::with_telemetry(hardware, NoopTelemetry::new(), config)
    }
}

impl<H, S> BootDetector<H, S>
where
    H: DetectorHardware,
    S: TelemetrySink<H::Instant>,
{
    pub fn with_telemetry(hardware: H, telemetry: S, config: DetectConfig) -> Self {
        Self {
            hardware,
            telemetry,
            config,
        }
    }

    pub fn config(&self) -> &DetectConfig {
        &self.config
    }

    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }

    pub fn telemetry(&self) -> &S {
        &self.telemetry
    }

    pub fn telemetry_mut(&mut self) -> &mut S {
        &mut self.telemetry
    }

    pub fn into_parts(self) -> (H, S) {
        (self.hardware, self.telemetry)
    }

    /// Waits for the target to reach the block-1 read, retrying the whole
    /// attempt up to the configured budget.
    ///
    /// Returns `true` on detection with capture quiesced and the bus pins
    /// still configured for the glitch stage. When every attempt fails the
    /// board halts with the [`HaltCode`] for the furthest progress, so
    /// `false` is never returned; use [`detect`](Self::detect) for a
    /// recoverable result.
    pub fn wait_for_boot(&mut self, context: &mut DetectionContext, timeout: Duration) -> bool {
        match self.detect(context, timeout) {
            Ok(_) => true,
            Err(DetectError::Exhausted { code, .. }) => {
                let stages = self.config.total_stages;
                self.hardware.halt_with_error(code.as_raw(), stages)
            }
        }
    }

    /// Runs the attempt loop and reports exhaustion instead of halting.
    pub fn detect(
        &mut self,
        context: &mut DetectionContext,
        timeout: Duration,
    ) -> Result<Detection, DetectError> {
        let attempts = self.config.max_attempts.max(1);
        let mut progress = ObservationState::new();

        for attempt in 1..=attempts {
            let (outcome, state) = self.run_attempt(context, timeout, attempt);
            if outcome.is_success() {
                self.hardware.quiesce();
                let now = self.hardware.now();
                self.telemetry.record(now, DetectEvent::Detected);
                return Ok(Detection {
                    attempt,
                    variant: context.board_variant(),
                });
            }

            progress = state;
            self.teardown();

            if attempt < attempts {
                self.hardware.sleep(self.config.settle_delay);
            }
        }

        let code = HaltCode::from_progress(&progress);
        let now = self.hardware.now();
        self.telemetry.record(now, DetectEvent::Exhausted(code));
        Err(DetectError::Exhausted { code, attempts })
    }

    fn run_attempt(
        &mut self,
        context: &mut DetectionContext,
        timeout: Duration,
        attempt: u8,
    ) -> (AttemptOutcome, ObservationState) {
        let started_at = self.hardware.now();
        self.telemetry
            .record(started_at, DetectEvent::AttemptStarted { attempt });

        let mut observer = ProtocolObserver::new(started_at, timeout, &self.config);
        self.hardware.arm();
        self.hardware.reset_target();

        let outcome = observer.run(&mut self.hardware, context, &mut self.telemetry);
        (outcome, *observer.state())
    }

    /// Returns the capture engine and every touched pin to a clean state.
    fn teardown(&mut self) {
        self.hardware.disable_channels(self.config.capture_channels);

        let pins = self.config.pins;
        for pin in pins.bus() {
            self.hardware.deinit(pin);
        }
        self.hardware.disable(pins.trigger);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halt_code_prefers_furthest_progress() {
        let mut state = ObservationState::new();
        assert_eq!(HaltCode::from_progress(&state), HaltCode::NoBootActivity);

        state.was_cmd1 = true;
        assert_eq!(HaltCode::from_progress(&state), HaltCode::CommandPhaseStalled);

        state.was_read_zero = true;
        assert_eq!(HaltCode::from_progress(&state), HaltCode::ReadBlockZeroSeen);
    }

    #[test]
    fn halt_codes_round_trip() {
        for code in [
            HaltCode::ReadBlockZeroSeen,
            HaltCode::CommandPhaseStalled,
            HaltCode::NoBootActivity,
        ] {
            assert_eq!(HaltCode::from_raw(code.as_raw()), Some(code));
        }
        assert_eq!(HaltCode::from_raw(0), None);
        assert_eq!(HaltCode::from_raw(4), None);
    }

    #[test]
    fn context_defaults_to_mariko_and_incomplete() {
        let mut context = DetectionContext::default();
        assert_eq!(context.board_variant(), BoardVariant::Mariko);
        assert!(!context.is_detection_complete());

        context.mark_detection_complete();
        assert!(context.is_detection_complete());
    }
}
