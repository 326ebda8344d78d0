//! Text format for recorded bus captures.
//!
//! One word per line, optionally preceded by the delay since the previous
//! word. `#` starts a comment.
//!
//! ```text
//! # cmd1 exchange
//! 0x41000000
//! +8us 0xF9
//! +2ms 0x3F000000
//! ```
//!
//! Words may be hex (`0x` prefix) or decimal. Parsing is line-by-line and
//! allocation free so firmware can replay traces from flash.

use core::fmt;
use core::time::Duration;

use heapless::Vec;
use winnow::ascii::{digit1, hex_digit1, space1};
use winnow::combinator::{alt, opt, preceded, terminated};
use winnow::error::ContextError;
use winnow::prelude::*;

use crate::hardware::Word;

/// Captured word with its delay relative to the previous entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TraceEntry {
    pub delay: Duration,
    pub word: Word,
}

impl TraceEntry {
    pub const fn new(delay: Duration, word: Word) -> Self {
        Self { delay, word }
    }

    pub const fn immediate(word: Word) -> Self {
        Self::new(Duration::ZERO, word)
    }
}

/// Trace parsing failures.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TraceError {
    /// The 1-based line could not be parsed.
    Syntax { line: usize },
    /// The trace holds more entries than the destination buffer.
    Capacity { capacity: usize },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Syntax { line } => write!(f, "invalid trace entry on line {line}"),
            TraceError::Capacity { capacity } => {
                write!(f, "trace exceeds {capacity} entries")
            }
        }
    }
}

/// Iterates the entries of a trace, skipping blank and comment lines.
pub fn entries(input: &str) -> impl Iterator<Item = Result<TraceEntry, TraceError>> + '_ {
    input
        .lines()
        .enumerate()
        .filter_map(|(index, raw)| parse_line(raw, index + 1).transpose())
}

/// Parses a whole trace into a bounded buffer.
pub fn parse_trace<const N: usize>(input: &str) -> Result<Vec<TraceEntry, N>, TraceError> {
    let mut parsed = Vec::new();
    for entry in entries(input) {
        parsed
            .push(entry?)
            .map_err(|_| TraceError::Capacity { capacity: N })?;
    }
    Ok(parsed)
}

/// Parses a whole trace into a heap buffer for host tooling.
#[cfg(feature = "alloc")]
pub fn parse_trace_vec(input: &str) -> Result<alloc::vec::Vec<TraceEntry>, TraceError> {
    entries(input).collect()
}

fn parse_line(raw: &str, line: usize) -> Result<Option<TraceEntry>, TraceError> {
    let content = raw.split_once('#').map_or(raw, |(before, _)| before).trim();
    if content.is_empty() {
        return Ok(None);
    }

    entry()
        .parse(content)
        .map(Some)
        .map_err(|_| TraceError::Syntax { line })
}

fn entry<'a>() -> impl Parser<&'a str, TraceEntry, ContextError> {
    move |input: &mut &'a str| {
        let delay = opt(terminated(delay, space1)).parse_next(input)?;
        let word = word.parse_next(input)?;
        Ok(TraceEntry::new(delay.unwrap_or(Duration::ZERO), word))
    }
}

fn delay(input: &mut &str) -> Result<Duration, ContextError> {
    let amount = preceded('+', digit1)
        .try_map(|digits: &str| digits.parse::<u64>())
        .parse_next(input)?;
    let micros_per_unit = alt(("us".value(1_u64), "ms".value(1_000_u64))).parse_next(input)?;
    Ok(Duration::from_micros(amount.saturating_mul(micros_per_unit)))
}

fn word(input: &mut &str) -> Result<Word, ContextError> {
    alt((
        preceded(alt(("0x", "0X")), hex_digit1)
            .try_map(|digits: &str| Word::from_str_radix(digits, 16)),
        digit1.try_map(|digits: &str| digits.parse::<Word>()),
    ))
    .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delays_and_word_formats() {
        let trace = "\
            # boot block reads\n\
            0x51000000\n\
            +12us 0x55   # block 0\n\
            \n\
            +3ms 1358954496\n\
            0X147\n";

        let parsed = parse_trace::<8>(trace).unwrap();
        assert_eq!(
            parsed.as_slice(),
            &[
                TraceEntry::immediate(0x5100_0000),
                TraceEntry::new(Duration::from_micros(12), 0x55),
                TraceEntry::new(Duration::from_millis(3), 0x5100_0000),
                TraceEntry::immediate(0x147),
            ]
        );
    }

    #[test]
    fn reports_offending_line() {
        let trace = "0x41000000\n+5xs 0xF9\n";
        assert_eq!(
            parse_trace::<4>(trace),
            Err(TraceError::Syntax { line: 2 })
        );
    }

    #[test]
    fn rejects_words_wider_than_the_bus() {
        assert_eq!(
            parse_trace::<4>("0x1_0000_0000"),
            Err(TraceError::Syntax { line: 1 })
        );
        assert_eq!(
            parse_trace::<4>("0x100000000"),
            Err(TraceError::Syntax { line: 1 })
        );
    }

    #[test]
    fn bounded_buffer_reports_capacity() {
        assert_eq!(
            parse_trace::<1>("1\n2\n"),
            Err(TraceError::Capacity { capacity: 1 })
        );
    }
}
