//! Unsolicited traffic.
//!
//! Two things share the dedicated unsolicited buffer: report lines the
//! engine emits on its own ([`Engine::trigger_unsolicited`]) and requests it
//! sends to the peer ([`Engine::request`]). Neither touches the working
//! buffer, so a request/response cycle in progress is never disturbed.
//!
//! On the receiving side a report line is either the response to the
//! pending request (same command) or a URC.
//!
//! [`Engine::trigger_unsolicited`]: crate::Engine::trigger_unsolicited
//! [`Engine::request`]: crate::Engine::request

use crate::command::Operation;
use crate::registry::CommandId;

/// Bytes waiting to be drained to the transport.
#[derive(Debug)]
pub struct Outbound<'b> {
    buf: &'b mut [u8],
    len: usize,
    pos: usize,
}

impl<'b> Outbound<'b> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        Outbound { buf, len: 0, pos: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Whether composed bytes remain to be written.
    pub fn is_pending(&self) -> bool {
        self.pos < self.len
    }

    /// Whether a line has been partly written.
    pub fn is_started(&self) -> bool {
        self.pos > 0 && self.is_pending()
    }

    /// Next byte to write.
    pub fn peek(&self) -> Option<u8> {
        if self.is_pending() {
            self.buf.get(self.pos).copied()
        } else {
            None
        }
    }

    /// Mark the byte returned by [`peek`](Self::peek) as written.
    pub fn advance(&mut self) {
        if self.is_pending() {
            self.pos += 1;
        }
    }

    /// Storage to compose into. Only valid while nothing is pending.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut *self.buf
    }

    /// Queue the first `len` bytes of the buffer.
    pub fn arm(&mut self, len: usize) {
        self.len = len.min(self.buf.len());
        self.pos = 0;
    }
}

/// Longest command name [`Engine::request`](crate::Engine::request) accepts.
pub const MAX_REQUEST_NAME: usize = 24;

/// A request sent to the peer that awaits its final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    /// Local command whose variables receive the response, if registered.
    pub target: Option<CommandId>,
    pub op: Operation,
    name: [u8; MAX_REQUEST_NAME],
    name_len: usize,
    echoed: bool,
}

impl PendingRequest {
    /// `None` if `name` is longer than [`MAX_REQUEST_NAME`].
    pub fn new(name: &[u8], target: Option<CommandId>, op: Operation) -> Option<Self> {
        let mut stored = [0u8; MAX_REQUEST_NAME];
        stored.get_mut(..name.len())?.copy_from_slice(name);
        Some(PendingRequest {
            target,
            op,
            name: stored,
            name_len: name.len(),
            echoed: false,
        })
    }

    /// Name of the command as it was sent.
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }

    /// Whether the peer already echoed the request line.
    pub fn echoed(&self) -> bool {
        self.echoed
    }

    /// Consume the echo of this request. Only the first matching line is
    /// taken; later identical lines are genuine requests from the peer.
    pub fn take_echo(&mut self, name: &[u8], op: Operation) -> bool {
        if self.echoed || op != self.op || name != self.name() {
            return false;
        }
        self.echoed = true;
        true
    }
}

/// How an inbound report line is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// Response to the pending request; dispatched with the request's
    /// operation.
    Response(Operation),
    /// Unsolicited result; dispatched as a read.
    Unsolicited,
}

impl ReportKind {
    /// Operation whose handler receives the report.
    pub fn operation(self) -> Operation {
        match self {
            ReportKind::Response(Operation::Test) => Operation::Test,
            _ => Operation::Read,
        }
    }
}

/// Decide whether a report for `id` answers `pending`.
pub fn classify(id: CommandId, pending: Option<&PendingRequest>) -> ReportKind {
    match pending {
        Some(request) if request.target == Some(id) => ReportKind::Response(request.op),
        _ => ReportKind::Unsolicited,
    }
}
