//! Cross-domain transfer queue.

use std::collections::VecDeque;

/// Capacity of the receive-to-transfer crossing queue.
pub const QUEUE_DEPTH: usize = 4;

/// Bounded FIFO relaying deframed bytes from the bus-sampling (receive)
/// domain to the transfer domain.
///
/// Strict arrival order is preserved and nothing is dropped or duplicated
/// across the boundary: when no slot is free the producer must stall
/// (check `is_full` before sampling) rather than overwrite.
#[derive(Debug)]
pub struct TransferQueue {
    buf: VecDeque<u8>,
}

impl TransferQueue {
    pub fn new() -> Self {
        TransferQueue {
            buf: VecDeque::with_capacity(QUEUE_DEPTH),
        }
    }

    /// Append a byte; returns `false` and leaves the queue unchanged when
    /// it is at capacity.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.buf.len() == QUEUE_DEPTH {
            return false;
        }
        self.buf.push_back(byte);
        true
    }

    /// Remove and return the oldest byte.
    pub fn pop(&mut self) -> Option<u8> {
        self.buf.pop_front()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() == QUEUE_DEPTH
    }

    /// Discard all queued bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for TransferQueue {
    fn default() -> Self {
        Self::new()
    }
}
