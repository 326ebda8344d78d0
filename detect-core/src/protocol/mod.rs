//! Boot-bus signature table.
//!
//! Each captured word is classified together with the word that preceded it.
//! The rules below are evaluated in order and the first match wins; the
//! command-phase completion rule is a mask match, so ordering matters.

use core::fmt;

use crate::hardware::Word;

/// Command-phase request argument word.
pub const CMD1_REQUEST: Word = 0x4100_0000;
/// Trailer of the command-phase request, also the prefix of its response.
pub const CMD1_TRAILER: Word = 0x0000_00F9;
/// High byte of a command-phase response.
pub const CMD1_RESPONSE_HIGH_BYTE: u8 = 0x3F;
/// Block read request argument word.
pub const READ_BLOCK: Word = 0x5100_0000;
/// Trailer identifying a read of block 0.
pub const READ_BLOCK_ZERO: Word = 0x0000_0055;
/// Trailer identifying a read of block 1.
pub const READ_BLOCK_ONE: Word = 0x0000_0147;
/// Status request argument word.
pub const STATUS_REQUEST: Word = 0x4D00_0200;
/// Trailer of the status request only older boards issue during boot.
pub const STATUS_TRAILER: Word = 0x0000_00B1;

/// Protocol moments recognised on the bus.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProtocolEvent {
    CommandPhaseStarted,
    CommandPhaseCompleted,
    ReadBlockZero,
    DiagnosticStatus,
    ReadBlockOne,
}

impl fmt::Display for ProtocolEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProtocolEvent::CommandPhaseStarted => "cmd1-start",
            ProtocolEvent::CommandPhaseCompleted => "cmd1-complete",
            ProtocolEvent::ReadBlockZero => "read-block-0",
            ProtocolEvent::DiagnosticStatus => "diagnostic-status",
            ProtocolEvent::ReadBlockOne => "read-block-1",
        })
    }
}

/// Matcher applied to the current word.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WordPattern {
    Exact(Word),
    Masked { mask: Word, value: Word },
}

impl WordPattern {
    /// Matches words whose top byte equals `byte`.
    pub const fn high_byte(byte: u8) -> Self {
        WordPattern::Masked {
            mask: 0xFF00_0000,
            value: (byte as Word) << 24,
        }
    }

    pub const fn matches(self, word: Word) -> bool {
        match self {
            WordPattern::Exact(expected) => word == expected,
            WordPattern::Masked { mask, value } => word & mask == value,
        }
    }
}

/// Extra condition a rule needs before it may fire.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RuleGuard {
    Always,
    AfterReadBlockZero,
}

/// One entry of the signature table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SignatureRule {
    pub previous: Word,
    pub current: WordPattern,
    pub guard: RuleGuard,
    pub event: ProtocolEvent,
}

impl SignatureRule {
    pub const fn new(
        previous: Word,
        current: WordPattern,
        guard: RuleGuard,
        event: ProtocolEvent,
    ) -> Self {
        Self {
            previous,
            current,
            guard,
            event,
        }
    }

    /// Returns `true` when the rule fires for the given pair.
    pub const fn matches(&self, previous: Word, current: Word, read_zero_seen: bool) -> bool {
        let guard_ok = match self.guard {
            RuleGuard::Always => true,
            RuleGuard::AfterReadBlockZero => read_zero_seen,
        };
        guard_ok && self.previous == previous && self.current.matches(current)
    }
}

/// Priority-ordered boot signatures.
pub const SIGNATURE_TABLE: [SignatureRule; 5] = [
    SignatureRule::new(
        CMD1_REQUEST,
        WordPattern::Exact(CMD1_TRAILER),
        RuleGuard::Always,
        ProtocolEvent::CommandPhaseStarted,
    ),
    SignatureRule::new(
        CMD1_TRAILER,
        WordPattern::high_byte(CMD1_RESPONSE_HIGH_BYTE),
        RuleGuard::Always,
        ProtocolEvent::CommandPhaseCompleted,
    ),
    SignatureRule::new(
        READ_BLOCK,
        WordPattern::Exact(READ_BLOCK_ZERO),
        RuleGuard::Always,
        ProtocolEvent::ReadBlockZero,
    ),
    SignatureRule::new(
        STATUS_REQUEST,
        WordPattern::Exact(STATUS_TRAILER),
        RuleGuard::AfterReadBlockZero,
        ProtocolEvent::DiagnosticStatus,
    ),
    SignatureRule::new(
        READ_BLOCK,
        WordPattern::Exact(READ_BLOCK_ONE),
        RuleGuard::Always,
        ProtocolEvent::ReadBlockOne,
    ),
];

/// Classifies a word pair against `rules`, first match wins.
pub fn classify_with(
    rules: &[SignatureRule],
    previous: Word,
    current: Word,
    read_zero_seen: bool,
) -> Option<ProtocolEvent> {
    rules
        .iter()
        .find(|rule| rule.matches(previous, current, read_zero_seen))
        .map(|rule| rule.event)
}

/// Classifies a word pair against [`SIGNATURE_TABLE`].
pub fn classify(previous: Word, current: Word, read_zero_seen: bool) -> Option<ProtocolEvent> {
    classify_with(&SIGNATURE_TABLE, previous, current, read_zero_seen)
}
