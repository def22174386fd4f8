//! Shared tool output buffer.
//!
//! Build jobs push subprocess bytes; the front end drains them once per
//! tick. Pushes and pops hold a single mutex, so bytes from one producer
//! keep their order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Byte FIFO shared between build jobs and the front end.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    bytes: Arc<Mutex<VecDeque<u8>>>,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<u8>> {
        // A panicking producer must not silence later output.
        self.bytes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one byte.
    pub fn push_byte(&self, byte: u8) {
        self.lock().push_back(byte);
    }

    /// Append a run of bytes.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.lock().extend(bytes.iter().copied());
    }

    /// Append a line of text followed by a newline.
    pub fn push_line(&self, line: &str) {
        let mut bytes = self.lock();
        bytes.extend(line.as_bytes().iter().copied());
        bytes.push_back(b'\n');
    }

    /// Remove the oldest byte.
    pub fn pop_byte(&self) -> Option<u8> {
        self.lock().pop_front()
    }

    /// Remove everything buffered so far as text.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; tools print whatever
    /// code page they like. A character still missing its trailing bytes
    /// stays buffered for the next call.
    pub fn drain(&self) -> String {
        let mut buffered = self.lock();
        let complete = complete_len(buffered.make_contiguous());
        let bytes: Vec<u8> = buffered.drain(..complete).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Length of `bytes` without a trailing incomplete UTF-8 sequence.
///
/// Invalid sequences in the middle count as complete; only a valid prefix
/// cut off by the end of the buffer is held back.
fn complete_len(bytes: &[u8]) -> usize {
    let mut offset = 0;
    loop {
        match std::str::from_utf8(&bytes[offset..]) {
            Ok(_) => return bytes.len(),
            Err(e) => match e.error_len() {
                Some(invalid) => offset += e.valid_up_to() + invalid,
                None => return offset + e.valid_up_to(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_push_and_pop_in_order() {
        let buffer = OutputBuffer::new();
        buffer.push_bytes(b"ab");
        buffer.push_byte(b'c');

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.pop_byte(), Some(b'a'));
        assert_eq!(buffer.pop_byte(), Some(b'b'));
        assert_eq!(buffer.pop_byte(), Some(b'c'));
        assert_eq!(buffer.pop_byte(), None);
    }

    #[test]
    fn test_drain_empties_buffer() {
        let buffer = OutputBuffer::new();
        buffer.push_line("compiling");
        buffer.push_line("done");

        assert_eq!(buffer.drain(), "compiling\ndone\n");
        assert!(buffer.is_empty());
        assert_eq!(buffer.drain(), "");
    }

    #[test]
    fn test_drain_replaces_invalid_utf8() {
        let buffer = OutputBuffer::new();
        buffer.push_bytes(&[b'o', b'k', 0xff]);
        assert_eq!(buffer.drain(), "ok\u{fffd}");
    }

    #[test]
    fn test_drain_keeps_split_character() {
        let buffer = OutputBuffer::new();
        buffer.push_bytes("compiling ".as_bytes());
        buffer.push_byte(0xC3);
        assert_eq!(buffer.drain(), "compiling ");
        assert_eq!(buffer.len(), 1);

        buffer.push_byte(0xA9);
        buffer.push_line("");
        assert_eq!(buffer.drain(), "\u{e9}\n");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_replaces_truncated_sequence_in_middle() {
        let buffer = OutputBuffer::new();
        buffer.push_bytes(&[0xE2, 0x82, b'x', 0xC3]);
        assert_eq!(buffer.drain(), "\u{fffd}x");
        assert_eq!(buffer.pop_byte(), Some(0xC3));
    }

    #[test]
    fn test_clones_share_storage() {
        let buffer = OutputBuffer::new();
        let producer = buffer.clone();

        let handle = thread::spawn(move || {
            for _ in 0..100 {
                producer.push_byte(b'x');
            }
        });
        handle.join().unwrap();

        assert_eq!(buffer.drain(), "x".repeat(100));
    }
}
