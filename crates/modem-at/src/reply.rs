//! Bounded output writer.
//!
//! Responses are composed in place into a borrowed buffer (the engine's
//! working or unsolicited buffer) and never grow past it.

use bytes::BufMut;

use crate::error::{AtError, AtResult};

/// Appends bytes to a fixed slice, failing instead of growing.
#[derive(Debug)]
pub struct ResponseWriter<'b> {
    buf: &'b mut [u8],
    len: usize,
}

/// Writer handed to read, test and run handlers for a custom reply.
///
/// If a handler leaves it empty the engine composes the standard response
/// from the command's variables.
pub type Reply<'b> = ResponseWriter<'b>;

impl<'b> ResponseWriter<'b> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        ResponseWriter { buf, len: 0 }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.len
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Drop everything written so far.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append `bytes`, or fail without writing anything.
    pub fn push(&mut self, bytes: &[u8]) -> AtResult<()> {
        if bytes.len() > self.remaining() {
            return Err(AtError::BufferOverflow {
                capacity: self.buf.len(),
            });
        }
        let mut dst = &mut self.buf[self.len..];
        dst.put_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    pub fn push_byte(&mut self, byte: u8) -> AtResult<()> {
        self.push(&[byte])
    }
}

impl std::fmt::Write for ResponseWriter<'_> {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.push(s.as_bytes()).map_err(|_| std::fmt::Error)
    }
}
