//! Detection telemetry shared by firmware and host targets.
//!
//! The observer and controller report every protocol moment, phase reset, and
//! attempt outcome through [`TelemetrySink`]. Firmware mirrors the stream to
//! `defmt`, the emulator prints it, and [`TelemetryRecorder`] keeps a bounded
//! history for tests and post-mortem dumps. Events encode to compact numeric
//! codes so they can travel over narrow diagnostics links.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::controller::{BoardVariant, HaltCode};
use crate::protocol::ProtocolEvent;

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Events emitted while waiting for the target to boot.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DetectEvent {
    AttemptStarted { attempt: u8 },
    Protocol(ProtocolEvent),
    VariantDetected(BoardVariant),
    PhaseReset { count: u8 },
    InternalTimeout,
    OverallTimeout,
    Detected,
    Exhausted(HaltCode),
}

impl fmt::Display for DetectEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectEvent::AttemptStarted { attempt } => write!(f, "attempt-started {attempt}"),
            DetectEvent::Protocol(event) => write!(f, "bus {event}"),
            DetectEvent::VariantDetected(variant) => write!(f, "variant {variant}"),
            DetectEvent::PhaseReset { count } => write!(f, "phase-reset {count}"),
            DetectEvent::InternalTimeout => f.write_str("internal-timeout"),
            DetectEvent::OverallTimeout => f.write_str("overall-timeout"),
            DetectEvent::Detected => f.write_str("detected"),
            DetectEvent::Exhausted(code) => write!(f, "exhausted {code}"),
        }
    }
}

impl DetectEvent {
    const ATTEMPT_BASE: u16 = 0x0100;
    const PROTOCOL_BASE: u16 = 0x0010;
    const VARIANT_BASE: u16 = 0x0020;
    const PHASE_RESET_BASE: u16 = 0x0200;
    const INTERNAL_TIMEOUT_CODE: u16 = 0x0030;
    const OVERALL_TIMEOUT_CODE: u16 = 0x0031;
    const DETECTED_CODE: u16 = 0x0032;
    const EXHAUSTED_BASE: u16 = 0x0040;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            DetectEvent::AttemptStarted { attempt } => Self::ATTEMPT_BASE + attempt as u16,
            DetectEvent::Protocol(event) => Self::PROTOCOL_BASE + protocol_index(event),
            DetectEvent::VariantDetected(variant) => Self::VARIANT_BASE + variant_index(variant),
            DetectEvent::PhaseReset { count } => Self::PHASE_RESET_BASE + count as u16,
            DetectEvent::InternalTimeout => Self::INTERNAL_TIMEOUT_CODE,
            DetectEvent::OverallTimeout => Self::OVERALL_TIMEOUT_CODE,
            DetectEvent::Detected => Self::DETECTED_CODE,
            DetectEvent::Exhausted(code) => Self::EXHAUSTED_BASE + code.as_raw() as u16,
        }
    }

    /// Decodes a raw discriminant, returning `None` for unknown codes.
    #[must_use]
    pub fn from_raw(code: u16) -> Option<Self> {
        match code {
            Self::INTERNAL_TIMEOUT_CODE => Some(DetectEvent::InternalTimeout),
            Self::OVERALL_TIMEOUT_CODE => Some(DetectEvent::OverallTimeout),
            Self::DETECTED_CODE => Some(DetectEvent::Detected),
            value if (Self::PROTOCOL_BASE..Self::VARIANT_BASE).contains(&value) => {
                protocol_from_index(value - Self::PROTOCOL_BASE).map(DetectEvent::Protocol)
            }
            value if (Self::VARIANT_BASE..Self::INTERNAL_TIMEOUT_CODE).contains(&value) => {
                variant_from_index(value - Self::VARIANT_BASE).map(DetectEvent::VariantDetected)
            }
            value if (Self::EXHAUSTED_BASE..Self::ATTEMPT_BASE).contains(&value) => {
                let raw = u8::try_from(value - Self::EXHAUSTED_BASE).ok()?;
                HaltCode::from_raw(raw).map(DetectEvent::Exhausted)
            }
            value if (Self::ATTEMPT_BASE..Self::PHASE_RESET_BASE).contains(&value) => {
                let attempt = u8::try_from(value - Self::ATTEMPT_BASE).ok()?;
                Some(DetectEvent::AttemptStarted { attempt })
            }
            value if value >= Self::PHASE_RESET_BASE => {
                let count = u8::try_from(value - Self::PHASE_RESET_BASE).ok()?;
                Some(DetectEvent::PhaseReset { count })
            }
            _ => None,
        }
    }
}

const fn protocol_index(event: ProtocolEvent) -> u16 {
    match event {
        ProtocolEvent::CommandPhaseStarted => 0,
        ProtocolEvent::CommandPhaseCompleted => 1,
        ProtocolEvent::ReadBlockZero => 2,
        ProtocolEvent::DiagnosticStatus => 3,
        ProtocolEvent::ReadBlockOne => 4,
    }
}

fn protocol_from_index(index: u16) -> Option<ProtocolEvent> {
    match index {
        0 => Some(ProtocolEvent::CommandPhaseStarted),
        1 => Some(ProtocolEvent::CommandPhaseCompleted),
        2 => Some(ProtocolEvent::ReadBlockZero),
        3 => Some(ProtocolEvent::DiagnosticStatus),
        4 => Some(ProtocolEvent::ReadBlockOne),
        _ => None,
    }
}

const fn variant_index(variant: BoardVariant) -> u16 {
    match variant {
        BoardVariant::Mariko => 0,
        BoardVariant::Erista => 1,
    }
}

fn variant_from_index(index: u16) -> Option<BoardVariant> {
    match index {
        0 => Some(BoardVariant::Mariko),
        1 => Some(BoardVariant::Erista),
        _ => None,
    }
}

/// Destination for detection events.
pub trait TelemetrySink<TInstant> {
    fn record(&mut self, timestamp: TInstant, event: DetectEvent);
}

/// Sink that drops every event.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopTelemetry;

impl NoopTelemetry {
    pub const fn new() -> Self {
        Self
    }
}

impl<TInstant> TelemetrySink<TInstant> for NoopTelemetry {
    fn record(&mut self, _: TInstant, _: DetectEvent) {}
}

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: DetectEvent,
    pub elapsed_since_previous: Option<Duration>,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records detection events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_recorded_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_recorded_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Returns `true` when any retained record carries `event`.
    pub fn contains(&self, event: DetectEvent) -> bool {
        self.oldest_first().any(|record| record.event == event)
    }

    /// Counts retained records matching `predicate`.
    pub fn count_matching<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&DetectEvent) -> bool,
    {
        self.oldest_first()
            .filter(|record| predicate(&record.event))
            .count()
    }

    /// Records an event and returns its identifier.
    pub fn push(&mut self, timestamp: TInstant, event: DetectEvent) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        let elapsed_since_previous = self
            .last_recorded_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_recorded_at = Some(timestamp);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            elapsed_since_previous,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<TInstant, const CAPACITY: usize> TelemetrySink<TInstant>
    for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn record(&mut self, timestamp: TInstant, event: DetectEvent) {
        self.push(timestamp, event);
    }
}
