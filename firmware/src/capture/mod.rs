//! Capture link between the external bus sampler and the detector.
//!
//! The sampler streams every captured bus word as four little-endian bytes
//! over a UART. The link reassembles words while at least one capture
//! channel is enabled and discards traffic otherwise. The enable mask lives
//! in an atomic so the sampler control path can read it without a lock.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use detect_core::hardware::{CaptureEngine, CaptureQueue, ChannelMask, Word};
use embedded_io::{Read, ReadReady};
use heapless::Deque;
use portable_atomic::{AtomicU8, Ordering};

/// Words buffered between polls of the detector.
pub const CAPTURE_QUEUE_DEPTH: usize = 32;

const WORD_BYTES: usize = core::mem::size_of::<Word>();
const READ_CHUNK: usize = 16;

/// Reassembles little-endian words from a byte stream.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WordAssembler {
    bytes: [u8; WORD_BYTES],
    filled: usize,
}

impl WordAssembler {
    pub const fn new() -> Self {
        Self {
            bytes: [0; WORD_BYTES],
            filled: 0,
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<Word> {
        self.bytes[self.filled] = byte;
        self.filled += 1;
        if self.filled < WORD_BYTES {
            return None;
        }
        self.filled = 0;
        Some(Word::from_le_bytes(self.bytes))
    }

    pub fn reset(&mut self) {
        self.filled = 0;
    }
}

pub struct CaptureLink<'a, R> {
    reader: R,
    enabled: &'a AtomicU8,
    assembler: WordAssembler,
    pending: Deque<Word, CAPTURE_QUEUE_DEPTH>,
    dropped: u32,
}

impl<'a, R> CaptureLink<'a, R>
where
    R: Read + ReadReady,
{
    pub fn new(reader: R, enabled: &'a AtomicU8) -> Self {
        enabled.store(ChannelMask::NONE.bits(), Ordering::Release);
        Self {
            reader,
            enabled,
            assembler: WordAssembler::new(),
            pending: Deque::new(),
            dropped: 0,
        }
    }

    pub fn enabled_channels(&self) -> ChannelMask {
        ChannelMask::from_bits(self.enabled.load(Ordering::Acquire))
    }

    /// Words lost because the detector fell behind the sampler.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    fn pump(&mut self) {
        let mut chunk = [0_u8; READ_CHUNK];
        while matches!(self.reader.read_ready(), Ok(true)) {
            let count = match self.reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(count) => count,
            };
            if self.enabled_channels() == ChannelMask::NONE {
                continue;
            }
            for &byte in &chunk[..count] {
                if let Some(word) = self.assembler.push(byte)
                    && self.pending.push_back(word).is_err()
                {
                    self.dropped = self.dropped.wrapping_add(1);
                }
            }
        }
    }

    fn flush(&mut self) {
        let mut chunk = [0_u8; READ_CHUNK];
        while matches!(self.reader.read_ready(), Ok(true)) {
            if !matches!(self.reader.read(&mut chunk), Ok(count) if count > 0) {
                break;
            }
        }
        self.assembler.reset();
        self.pending.clear();
    }
}

impl<R> CaptureEngine for CaptureLink<'_, R>
where
    R: Read + ReadReady,
{
    fn arm(&mut self) {
        self.flush();
        self.dropped = 0;
        self.enabled.store(ChannelMask::ALL.bits(), Ordering::Release);
    }

    fn quiesce(&mut self) {
        self.enabled.store(ChannelMask::NONE.bits(), Ordering::Release);
    }

    fn disable_channels(&mut self, mask: ChannelMask) {
        self.enabled.fetch_and(!mask.bits(), Ordering::AcqRel);
        if self.enabled_channels() == ChannelMask::NONE {
            self.assembler.reset();
            self.pending.clear();
        }
    }
}

impl<R> CaptureQueue for CaptureLink<'_, R>
where
    R: Read + ReadReady,
{
    /// Reports only words already reassembled. Bytes still in the UART are
    /// not visible until a dequeue pumps them, so poll through
    /// [`try_dequeue`](CaptureQueue::try_dequeue).
    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pumps the UART, then pops the oldest word. Yields `0` when nothing
    /// has arrived.
    fn dequeue(&mut self) -> Word {
        self.try_dequeue().unwrap_or_default()
    }

    fn try_dequeue(&mut self) -> Option<Word> {
        self.pump();
        self.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_io::ErrorType;

    struct MockSerial {
        bytes: Deque<u8, 256>,
    }

    impl MockSerial {
        fn new() -> Self {
            Self {
                bytes: Deque::new(),
            }
        }

        fn feed_word(&mut self, word: Word) {
            for byte in word.to_le_bytes() {
                self.bytes.push_back(byte).unwrap();
            }
        }
    }

    impl ErrorType for MockSerial {
        type Error = Infallible;
    }

    impl Read for MockSerial {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let mut count = 0;
            while count < buf.len() {
                let Some(byte) = self.bytes.pop_front() else {
                    break;
                };
                buf[count] = byte;
                count += 1;
            }
            Ok(count)
        }
    }

    impl ReadReady for MockSerial {
        fn read_ready(&mut self) -> Result<bool, Self::Error> {
            Ok(!self.bytes.is_empty())
        }
    }

    #[test]
    fn assembler_emits_little_endian_words() {
        let mut assembler = WordAssembler::new();
        assert_eq!(assembler.push(0x00), None);
        assert_eq!(assembler.push(0x00), None);
        assert_eq!(assembler.push(0x00), None);
        assert_eq!(assembler.push(0x51), Some(0x5100_0000));
        assert_eq!(assembler.push(0x55), None);
    }

    #[test]
    fn arm_discards_stale_traffic() {
        let enabled = AtomicU8::new(0);
        let mut serial = MockSerial::new();
        serial.feed_word(0xDEAD_BEEF);
        serial.bytes.push_back(0x01).unwrap();
        let mut link = CaptureLink::new(serial, &enabled);

        link.arm();
        assert_eq!(link.enabled_channels(), ChannelMask::ALL);
        assert_eq!(link.try_dequeue(), None);

        link.reader.feed_word(0x4100_0000);
        link.reader.feed_word(0x00F9);
        assert_eq!(link.try_dequeue(), Some(0x4100_0000));
        assert!(!link.is_empty());
        assert_eq!(link.dequeue(), 0x00F9);
        assert!(link.is_empty());
    }

    #[test]
    fn dequeue_pumps_bytes_not_yet_reassembled() {
        let enabled = AtomicU8::new(0);
        let mut link = CaptureLink::new(MockSerial::new(), &enabled);
        link.arm();

        link.reader.feed_word(0x5100_0000);
        assert!(link.is_empty(), "raw UART bytes are not counted as words");
        assert_eq!(link.dequeue(), 0x5100_0000);
        assert_eq!(link.dequeue(), 0, "an empty link yields the idle word");
    }

    #[test]
    fn disabled_channels_drop_words() {
        let enabled = AtomicU8::new(0);
        let mut link = CaptureLink::new(MockSerial::new(), &enabled);
        link.arm();
        link.disable_channels(ChannelMask::ALL);
        assert_eq!(enabled.load(Ordering::Relaxed), 0);

        link.reader.feed_word(0x5100_0000);
        assert_eq!(link.try_dequeue(), None);
    }

    #[test]
    fn partial_disable_keeps_capturing() {
        let enabled = AtomicU8::new(0);
        let mut link = CaptureLink::new(MockSerial::new(), &enabled);
        link.arm();
        link.disable_channels(ChannelMask::from_bits(0b001));
        assert_eq!(link.enabled_channels(), ChannelMask::from_bits(0b110));

        link.reader.feed_word(0x0147);
        assert_eq!(link.try_dequeue(), Some(0x0147));
    }

    #[test]
    fn overflow_is_counted() {
        let enabled = AtomicU8::new(0);
        let mut link = CaptureLink::new(MockSerial::new(), &enabled);
        link.arm();
        for word in 0..(CAPTURE_QUEUE_DEPTH as Word + 2) {
            link.reader.feed_word(word);
        }

        assert_eq!(link.try_dequeue(), Some(0));
        assert_eq!(link.dropped(), 2);
    }
}
