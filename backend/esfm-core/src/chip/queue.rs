//! Timestamped register write buffer
//!
//! Hosts replaying captured register logs can enqueue writes against the
//! chip's sample clock instead of interleaving them manually. Entries become
//! due a fixed two-sample delay after they are enqueued and are applied in
//! order before the due sample is synthesized.

use bincode::{Decode, Encode};
use std::cmp;
use std::collections::VecDeque;

// Writes land this many samples after they are enqueued
const WRITE_DELAY_SAMPLES: u64 = 2;

#[derive(Debug, Clone, Copy, Encode, Decode)]
struct BufferedWrite {
    timestamp: u64,
    address: u16,
    data: u8,
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub(super) struct WriteBuffer {
    queue: VecDeque<BufferedWrite>,
    last_timestamp: u64,
}

impl WriteBuffer {
    pub(super) fn new() -> Self {
        Self::default()
    }

    // Timestamps are kept monotonic so entries always apply in enqueue order
    pub(super) fn push(&mut self, sample_count: u64, address: u16, data: u8) {
        let timestamp = cmp::max(sample_count + WRITE_DELAY_SAMPLES, self.last_timestamp);
        self.last_timestamp = timestamp;
        self.queue.push_back(BufferedWrite { timestamp, address, data });
    }

    pub(super) fn pop_due(&mut self, sample_count: u64) -> Option<(u16, u8)> {
        if self.queue.front().is_some_and(|write| write.timestamp <= sample_count) {
            self.queue.pop_front().map(|write| (write.address, write.data))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_become_due_after_fixed_delay() {
        let mut buffer = WriteBuffer::new();
        buffer.push(0, 0x100, 0xAB);

        assert_eq!(buffer.pop_due(0), None);
        assert_eq!(buffer.pop_due(1), None);
        assert_eq!(buffer.pop_due(2), Some((0x100, 0xAB)));
        assert_eq!(buffer.pop_due(2), None);
    }

    #[test]
    fn entries_drain_in_order() {
        let mut buffer = WriteBuffer::new();
        buffer.push(0, 0x100, 0x01);
        buffer.push(0, 0x101, 0x02);
        buffer.push(5, 0x102, 0x03);

        assert_eq!(buffer.pop_due(10), Some((0x100, 0x01)));
        assert_eq!(buffer.pop_due(10), Some((0x101, 0x02)));
        assert_eq!(buffer.pop_due(10), Some((0x102, 0x03)));
        assert_eq!(buffer.pop_due(10), None);
    }
}
