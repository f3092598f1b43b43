//! Bounded output buffers for child processes.
//!
//! Two retention policies:
//! - [`CappedBuffer`] keeps the first `cap` bytes of a stream and drops the rest
//!   as it arrives (synchronous commands).
//! - [`TailBuffer`] keeps the most recent `cap` bytes as a sliding window
//!   (background sessions, where the latest output matters most).

use std::collections::VecDeque;

/// Head-retaining buffer: bytes past the cap are dropped, never the earlier ones.
#[derive(Debug)]
pub struct CappedBuffer {
    data: Vec<u8>,
    cap: usize,
    dropped: usize,
}

impl CappedBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            data: Vec::new(),
            cap,
            dropped: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        let room = self.cap.saturating_sub(self.data.len());
        let take = room.min(chunk.len());
        self.data.extend_from_slice(&chunk[..take]);
        self.dropped += chunk.len() - take;
    }

    /// Whether any bytes were discarded because of the cap.
    pub fn truncated(&self) -> bool {
        self.dropped > 0
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Trailing-window buffer: once full, every new byte evicts the oldest one.
#[derive(Debug)]
pub struct TailBuffer {
    data: VecDeque<u8>,
    cap: usize,
    total: u64,
}

impl TailBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            data: VecDeque::new(),
            cap,
            total: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.total += chunk.len() as u64;
        if self.cap == 0 {
            return;
        }

        // A chunk larger than the window only contributes its tail.
        let chunk = if chunk.len() > self.cap {
            &chunk[chunk.len() - self.cap..]
        } else {
            chunk
        };

        let overflow = (self.data.len() + chunk.len()).saturating_sub(self.cap);
        self.data.drain(..overflow);
        self.data.extend(chunk.iter().copied());
    }

    /// Total bytes ever written, including evicted ones.
    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    /// Bytes evicted from the front of the window.
    pub fn dropped_bytes(&self) -> u64 {
        self.total - self.data.len() as u64
    }

    pub fn snapshot(&self) -> String {
        let (front, back) = self.data.as_slices();
        let mut bytes = Vec::with_capacity(self.data.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capped_buffer_keeps_head() {
        let mut buf = CappedBuffer::new(8);
        buf.push(b"hello ");
        buf.push(b"world");
        assert_eq!(buf.to_string_lossy(), "hello wo");
        assert!(buf.truncated());

        let mut exact = CappedBuffer::new(5);
        exact.push(b"12345");
        assert!(!exact.truncated());
        assert_eq!(exact.to_string_lossy(), "12345");
    }

    #[test]
    fn test_tail_buffer_keeps_most_recent_bytes() {
        let mut buf = TailBuffer::new(10);
        buf.push(b"0123456789");
        buf.push(b"abc");
        assert_eq!(buf.snapshot(), "3456789abc");
        assert_eq!(buf.total_bytes(), 13);
        assert_eq!(buf.dropped_bytes(), 3);
    }

    #[test]
    fn test_tail_buffer_oversized_chunk() {
        let mut buf = TailBuffer::new(4);
        buf.push(b"xy");
        buf.push(b"abcdefgh");
        assert_eq!(buf.snapshot(), "efgh");
        assert_eq!(buf.dropped_bytes(), 6);
    }

    #[test]
    fn test_tail_buffer_chunking_does_not_matter() {
        let input: Vec<u8> = (0..200u8).collect();

        let mut whole = TailBuffer::new(37);
        whole.push(&input);

        let mut pieces = TailBuffer::new(37);
        for chunk in input.chunks(7) {
            pieces.push(chunk);
        }

        assert_eq!(whole.snapshot(), pieces.snapshot());
        assert_eq!(whole.total_bytes(), pieces.total_bytes());
    }
}
