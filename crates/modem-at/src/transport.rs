//! Byte transport abstraction.

use std::collections::VecDeque;

use bytes::{BufMut, BytesMut};

/// Non-blocking byte link (UART, SPI bridge, pipe).
///
/// Both calls must return immediately. `read` yields `None` when nothing is
/// available; `write` returns `false` when the byte cannot be accepted right
/// now, in which case the engine offers the same byte again on a later step.
pub trait Transport {
    fn read(&mut self) -> Option<u8>;
    fn write(&mut self, byte: u8) -> bool;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn read(&mut self) -> Option<u8> {
        (**self).read()
    }

    fn write(&mut self, byte: u8) -> bool {
        (**self).write(byte)
    }
}

/// In-memory transport for tests and host-side simulation.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    rx: VecDeque<u8>,
    tx: BytesMut,
    stalls: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the engine to read.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Everything the engine has written so far.
    pub fn output(&self) -> &[u8] {
        &self.tx
    }

    /// Take the written bytes, leaving the output empty.
    pub fn take_output(&mut self) -> Vec<u8> {
        self.tx.split().to_vec()
    }

    /// Refuse the next `count` writes.
    pub fn stall_next_writes(&mut self, count: usize) {
        self.stalls = count;
    }

    /// Bytes fed but not yet read.
    pub fn pending_input(&self) -> usize {
        self.rx.len()
    }
}

impl Transport for MemoryTransport {
    fn read(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn write(&mut self, byte: u8) -> bool {
        if self.stalls > 0 {
            self.stalls -= 1;
            return false;
        }
        self.tx.put_u8(byte);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_round_trip() {
        let mut t = MemoryTransport::new();
        t.feed(b"AT\r");
        assert_eq!(t.pending_input(), 3);
        assert_eq!(t.read(), Some(b'A'));
        assert!(t.write(b'O'));
        assert_eq!(t.output(), b"O");
        assert_eq!(t.take_output(), b"O".to_vec());
        assert!(t.output().is_empty());
    }

    #[test]
    fn test_stalled_writes_are_refused() {
        let mut t = MemoryTransport::new();
        t.stall_next_writes(2);
        assert!(!t.write(b'x'));
        assert!(!t.write(b'x'));
        assert!(t.write(b'y'));
        assert_eq!(t.output(), b"y");
    }

    #[test]
    fn test_borrowed_transport() {
        let mut t = MemoryTransport::new();
        t.feed(b"Z");
        let mut borrowed = &mut t;
        assert_eq!(Transport::read(&mut borrowed), Some(b'Z'));
    }
}
