//! Transport over the process's standard streams.
//!
//! A reader thread pulls chunks from stdin and hands them over a channel, so
//! `read()` never blocks. Output is buffered and flushed by the main loop.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::thread::{self, JoinHandle};

use bytes::{BufMut, BytesMut};
use crossbeam_channel::{Receiver, TryRecvError};
use modem_at::Transport;
use tracing::{debug, warn};

pub struct StdioTransport<W: Write> {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    tx: BytesMut,
    writer: W,
    closed: bool,
}

impl<W: Write> StdioTransport<W> {
    /// Wrap an existing chunk channel.
    pub fn from_channel(rx: Receiver<Vec<u8>>, writer: W) -> Self {
        StdioTransport {
            rx,
            pending: VecDeque::new(),
            tx: BytesMut::with_capacity(256),
            writer,
            closed: false,
        }
    }

    /// Whether input reached end of file and every received byte was read.
    pub fn is_closed(&self) -> bool {
        self.closed && self.pending.is_empty()
    }

    /// Write buffered output.
    pub fn flush(&mut self) -> std::io::Result<()> {
        if self.tx.is_empty() {
            return Ok(());
        }
        let out = self.tx.split();
        self.writer.write_all(&out)?;
        self.writer.flush()
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    fn refill(&mut self) {
        if self.closed {
            return;
        }
        match self.rx.try_recv() {
            Ok(chunk) => self.pending.extend(chunk),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                debug!("input closed");
                self.closed = true;
            }
        }
    }
}

impl<W: Write> Transport for StdioTransport<W> {
    fn read(&mut self) -> Option<u8> {
        if self.pending.is_empty() {
            self.refill();
        }
        self.pending.pop_front()
    }

    fn write(&mut self, byte: u8) -> bool {
        self.tx.put_u8(byte);
        true
    }
}

/// Spawn the thread reading from `input` until end of file.
pub fn spawn_reader<R: Read + Send + 'static>(mut input: R) -> (Receiver<Vec<u8>>, JoinHandle<()>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let handle = thread::spawn(move || {
        let mut buf = [0u8; 512];
        loop {
            match input.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("input error: {}", e);
                    break;
                }
            }
        }
    });
    (rx, handle)
}
