//! The dispatch state machine.
//!
//! ```text
//!            byte                LineReady
//!   Idle ─────────► Accumulating ─────────► Matching
//!    ▲                                      │   │
//!    │                          write/report│   │read/test/run
//!    │                                      ▼   │
//!    │                                 Marshaling
//!    │                                      │   │
//!    │                                      ▼   ▼
//!    │         Responding ◄──────────── Invoking
//!    │              │
//!    └──────────────┘      (any middle state ──► Error ──► Idle)
//! ```
//!
//! Every call to [`Engine::step`] performs one unit of work: one byte in, one
//! byte out, or one transition. Nothing blocks; a slow transport only delays
//! the engine.

use log::{debug, trace, warn};

use crate::codec::{parse_line, Feed, FinalResult, Line, LineCodec, Span};
use crate::command::{is_token_byte, Command, Operation};
use crate::config::EngineConfig;
use crate::error::{AtError, AtResult};
use crate::marshal::{apply_arguments, encode_signatures, encode_values};
use crate::registry::{CommandId, Registry};
use crate::reply::ResponseWriter;
use crate::transport::Transport;
use crate::urc::{classify, Outbound, PendingRequest};

/// Smallest working buffer able to hold `ERROR\r\n`.
pub const MIN_WORKING_BUFFER: usize = 8;

/// Result of one [`Engine::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Nothing to do until more bytes arrive.
    Idle,
    /// Work remains; step again.
    Busy,
}

/// Externally visible engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Accumulating,
    Matching,
    Marshaling,
    Invoking,
    Responding,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    /// An `AT` line from the peer; answered with OK or ERROR.
    Request,
    /// A report line from the peer; never answered.
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Then {
    Idle,
    Help(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Matching,
    Acknowledge,
    Marshaling {
        route: Route,
        id: CommandId,
        op: Operation,
        args: Span,
    },
    Invoking {
        route: Route,
        id: CommandId,
        op: Operation,
        args: Span,
        count: usize,
    },
    Help {
        next: usize,
    },
    Responding {
        pos: usize,
        len: usize,
        then: Then,
    },
    Error {
        error: AtError,
        route: Route,
    },
}

/// Find the command a report line is for, also trying the token without its
/// leading `+` so that `+CMTI` reaches a command declared as `CMTI`.
fn lookup_report<C>(registry: &Registry<'_, C>, name: &[u8]) -> Option<CommandId> {
    registry.find(name).or_else(|| {
        name.strip_prefix(b"+")
            .and_then(|bare| registry.find(bare))
    })
}

/// Standard response after a read, test or run handler returned.
fn compose_reply<C>(
    cmd: &Command<'_, C>,
    op: Operation,
    line_ending: &[u8],
    out: &mut ResponseWriter<'_>,
) -> AtResult<()> {
    if out.is_empty() {
        match op {
            Operation::Read if cmd.variables().iter().any(|v| v.access().is_readable()) => {
                encode_values(cmd, out)?
            }
            Operation::Test if !cmd.variables().is_empty() => {
                out.push(cmd.name().as_bytes())?;
                out.push(b": ")?;
                encode_signatures(cmd, out)?;
            }
            _ => {}
        }
    }
    if !out.is_empty() {
        out.push(line_ending)?;
    }
    out.push(b"OK")?;
    out.push(line_ending)
}

/// `AT+NAME=<A:UINT8[RW]> - description`
fn compose_help_line<C>(
    cmd: &Command<'_, C>,
    line_ending: &[u8],
    out: &mut ResponseWriter<'_>,
) -> AtResult<()> {
    out.push(b"AT")?;
    out.push(cmd.name().as_bytes())?;
    if !cmd.variables().is_empty() {
        out.push_byte(b'=')?;
        encode_signatures(cmd, out)?;
    }
    if !cmd.description().is_empty() {
        out.push(b" - ")?;
        out.push(cmd.description().as_bytes())?;
    }
    out.push(line_ending)
}

/// AT command engine bound to one transport.
///
/// The engine owns the transport, the command registry, the application
/// context handed to every handler, and the buffers. It is driven entirely by
/// [`step`](Self::step).
///
/// ```rust,ignore
/// let mut working = [0u8; 256];
/// let mut urc = [0u8; 128];
/// let mut engine = Engine::new(uart, Registry::new(&mut groups), &mut working, app)?
///     .with_unsolicited(&mut urc);
/// loop {
///     if engine.step() == Status::Idle {
///         sleep_until_rx();
///     }
/// }
/// ```
pub struct Engine<'a, T, C = ()> {
    transport: T,
    registry: Registry<'a, C>,
    context: C,
    config: EngineConfig,
    codec: LineCodec<'a>,
    outbound: Option<Outbound<'a>>,
    pending: Option<PendingRequest>,
    phase: Phase,
    last_error: Option<AtError>,
    last_result: Option<FinalResult>,
}

impl<'a, T: Transport, C> Engine<'a, T, C> {
    /// Create an engine. Every descriptor in the registry is validated and
    /// the working buffer must hold at least [`MIN_WORKING_BUFFER`] bytes.
    pub fn new(
        transport: T,
        registry: Registry<'a, C>,
        working: &'a mut [u8],
        context: C,
    ) -> AtResult<Self> {
        registry.validate()?;
        if working.len() < MIN_WORKING_BUFFER {
            return Err(AtError::InvalidDescriptor("working buffer too small"));
        }
        Ok(Engine {
            transport,
            registry,
            context,
            config: EngineConfig::default(),
            codec: LineCodec::new(working),
            outbound: None,
            pending: None,
            phase: Phase::Idle,
            last_error: None,
            last_result: None,
        })
    }

    /// Attach the buffer used for unsolicited output and host requests.
    pub fn with_unsolicited(mut self, buffer: &'a mut [u8]) -> Self {
        self.outbound = Some(Outbound::new(buffer));
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Advance the machine by one unit of work.
    pub fn step(&mut self) -> Status {
        match self.phase {
            Phase::Idle => {
                if !self.poll_link() {
                    return Status::Idle;
                }
            }
            Phase::Matching => self.phase = self.match_line(),
            Phase::Acknowledge => {
                let le = self.config.line_ending.as_bytes();
                let mut out = ResponseWriter::new(self.codec.buffer_mut());
                self.phase = match out.push(b"OK").and_then(|_| out.push(le)) {
                    Ok(()) => Phase::Responding {
                        pos: 0,
                        len: out.len(),
                        then: Then::Idle,
                    },
                    Err(error) => Phase::Error {
                        error,
                        route: Route::Request,
                    },
                };
            }
            Phase::Marshaling {
                route,
                id,
                op,
                args,
            } => self.marshal(route, id, op, args),
            Phase::Invoking {
                route,
                id,
                op,
                args,
                count,
            } => self.invoke(route, id, op, args, count),
            Phase::Help { next } => self.help(next),
            Phase::Responding { pos, len, then } => self.respond(pos, len, then),
            Phase::Error { error, route } => self.fail(error, route),
        }
        Status::Busy
    }

    /// Drain one unsolicited byte and read one input byte. Returns whether
    /// any byte moved.
    fn poll_link(&mut self) -> bool {
        let mut active = false;

        if let Some(out) = self.outbound.as_mut() {
            if let Some(byte) = out.peek() {
                if self.transport.write(byte) {
                    out.advance();
                    active = true;
                } else {
                    trace!("transport stalled on unsolicited output");
                }
            }
        }

        if let Some(byte) = self.transport.read() {
            active = true;
            match self.codec.feed(byte) {
                Feed::NeedMore => {}
                Feed::LineReady => self.phase = Phase::Matching,
                Feed::Overflow { request } => {
                    let error = AtError::BufferOverflow {
                        capacity: self.codec.capacity(),
                    };
                    warn!("line dropped: {}", error);
                    self.last_error = Some(error);
                    if request {
                        self.phase = Phase::Error {
                            error,
                            route: Route::Request,
                        };
                    }
                }
            }
        }

        active
    }

    /// Decide what the completed line is.
    fn match_line(&mut self) -> Phase {
        let line = self.codec.line();
        trace!("line {:?}", String::from_utf8_lossy(line));

        match parse_line(line) {
            Line::Attention => Phase::Acknowledge,
            Line::Malformed => Phase::Error {
                error: AtError::MalformedRequest,
                route: Route::Request,
            },
            Line::Request { name, op, args } => {
                let name = name.of(line);
                if let Some(pending) = self.pending.as_mut() {
                    if pending.take_echo(name, op) {
                        trace!("echo of pending request dropped");
                        self.codec.clear();
                        return Phase::Idle;
                    }
                }
                if self.config.help_command && op == Operation::Run && name == b"#HELP" {
                    return Phase::Help { next: 0 };
                }
                let resolved = self.registry.find(name).ok_or(AtError::NoSuchCommand).and_then(
                    |id| {
                        let cmd = self.registry.get(id).ok_or(AtError::NoSuchCommand)?;
                        debug!("{} {:?}", cmd.name(), op);
                        cmd.resolve(op).map(|op| (id, op))
                    },
                );
                match resolved {
                    Ok((id, Operation::Write)) => Phase::Marshaling {
                        route: Route::Request,
                        id,
                        op: Operation::Write,
                        args,
                    },
                    Ok((id, op)) => Phase::Invoking {
                        route: Route::Request,
                        id,
                        op,
                        args,
                        count: 0,
                    },
                    Err(error) => Phase::Error {
                        error,
                        route: Route::Request,
                    },
                }
            }
            Line::Report { name, args } => match lookup_report(&self.registry, name.of(line)) {
                Some(id) => {
                    let kind = classify(id, self.pending.as_ref());
                    debug!(
                        "report {} as {:?}",
                        String::from_utf8_lossy(name.of(line)),
                        kind
                    );
                    match kind.operation() {
                        Operation::Test => Phase::Invoking {
                            route: Route::Report,
                            id,
                            op: Operation::Test,
                            args,
                            count: 0,
                        },
                        op => Phase::Marshaling {
                            route: Route::Report,
                            id,
                            op,
                            args,
                        },
                    }
                }
                None => {
                    trace!("unknown report ignored");
                    self.codec.clear();
                    Phase::Idle
                }
            },
            Line::Final(result) => {
                match self.pending.take() {
                    Some(request) => {
                        debug!("request {:?} completed with {:?}", request.op, result);
                        self.last_result = Some(result);
                    }
                    None => trace!("final result {:?} without a pending request", result),
                }
                self.codec.clear();
                Phase::Idle
            }
            Line::Noise => {
                self.codec.clear();
                Phase::Idle
            }
        }
    }

    fn marshal(&mut self, route: Route, id: CommandId, op: Operation, args: Span) {
        let Engine {
            codec, registry, ..
        } = self;
        let result = match registry.get_mut(id) {
            Some(cmd) => apply_arguments(cmd, args.of(codec.line()), route == Route::Request),
            None => Err(AtError::NoSuchCommand),
        };
        self.phase = match result {
            Ok(count) => Phase::Invoking {
                route,
                id,
                op,
                args,
                count,
            },
            Err(error) => Phase::Error { error, route },
        };
    }

    fn invoke(&mut self, route: Route, id: CommandId, op: Operation, args: Span, count: usize) {
        let Engine {
            codec,
            registry,
            context,
            config,
            ..
        } = self;
        let Some(cmd) = registry.get_mut(id) else {
            self.phase = Phase::Error {
                error: AtError::NoSuchCommand,
                route,
            };
            return;
        };
        let le = config.line_ending.as_bytes();

        if op == Operation::Write {
            let accepted = match cmd.write_handler() {
                Some(handler) => handler(context, cmd, args.of(codec.line()), count),
                None => Ok(()),
            };
            let composed = accepted.map_err(|_| AtError::HandlerRejected).and_then(|()| {
                let mut out = ResponseWriter::new(codec.buffer_mut());
                out.push(b"OK")?;
                out.push(le)?;
                Ok(out.len())
            });
            self.phase = match composed {
                Ok(len) => Phase::Responding {
                    pos: 0,
                    len,
                    then: Then::Idle,
                },
                Err(error) => Phase::Error { error, route },
            };
            return;
        }

        let handler = match op {
            Operation::Run => cmd.run_handler(),
            Operation::Test => cmd.test_handler(),
            _ => cmd.read_handler(),
        };
        let mut out = ResponseWriter::new(codec.buffer_mut());
        let accepted = match handler {
            Some(handler) => handler(context, cmd, &mut out),
            None => Ok(()),
        };

        if route == Route::Report {
            match accepted {
                Ok(()) => {
                    trace!("{} updated from report ({} values)", cmd.name(), count);
                    codec.clear();
                    self.phase = Phase::Idle;
                }
                Err(_) => {
                    self.phase = Phase::Error {
                        error: AtError::HandlerRejected,
                        route,
                    }
                }
            }
            return;
        }

        let composed = accepted
            .map_err(|_| AtError::HandlerRejected)
            .and_then(|()| compose_reply(cmd, op, le, &mut out));
        self.phase = match composed {
            Ok(()) => Phase::Responding {
                pos: 0,
                len: out.len(),
                then: Then::Idle,
            },
            Err(error) => Phase::Error { error, route },
        };
    }

    fn help(&mut self, next: usize) {
        let Engine {
            codec,
            registry,
            config,
            ..
        } = self;
        let le = config.line_ending.as_bytes();
        let mut out = ResponseWriter::new(codec.buffer_mut());
        let composed = match registry.enabled().nth(next) {
            Some(cmd) => compose_help_line(cmd, le, &mut out).map(|()| Then::Help(next + 1)),
            None => out
                .push(b"OK")
                .and_then(|()| out.push(le))
                .map(|()| Then::Idle),
        };
        self.phase = match composed {
            Ok(then) => Phase::Responding {
                pos: 0,
                len: out.len(),
                then,
            },
            Err(error) => Phase::Error {
                error,
                route: Route::Request,
            },
        };
    }

    fn respond(&mut self, pos: usize, len: usize, then: Then) {
        // Finish an unsolicited line already on the wire before starting ours.
        if let Some(out) = self.outbound.as_mut() {
            if out.is_started() {
                if let Some(byte) = out.peek() {
                    if self.transport.write(byte) {
                        out.advance();
                    }
                }
                return;
            }
        }

        let next = if pos < len {
            self.codec.buffer().get(pos).copied()
        } else {
            None
        };
        let Some(byte) = next else {
            self.finish_response(then);
            return;
        };
        if !self.transport.write(byte) {
            trace!("transport stalled at byte {} of {}", pos, len);
            return;
        }
        if pos + 1 == len {
            self.finish_response(then);
        } else {
            self.phase = Phase::Responding {
                pos: pos + 1,
                len,
                then,
            };
        }
    }

    fn finish_response(&mut self, then: Then) {
        match then {
            Then::Idle => {
                self.codec.clear();
                self.phase = Phase::Idle;
            }
            Then::Help(next) => self.phase = Phase::Help { next },
        }
    }

    fn fail(&mut self, error: AtError, route: Route) {
        warn!("{:?} failed: {}", route, error);
        self.last_error = Some(error);

        if route == Route::Report {
            self.codec.clear();
            self.phase = Phase::Idle;
            return;
        }

        let le = self.config.line_ending.as_bytes();
        let mut out = ResponseWriter::new(self.codec.buffer_mut());
        self.phase = match out.push(b"ERROR").and_then(|()| out.push(le)) {
            Ok(()) => Phase::Responding {
                pos: 0,
                len: out.len(),
                then: Then::Idle,
            },
            Err(_) => {
                self.codec.clear();
                Phase::Idle
            }
        };
    }

    /// Emit `NAME: values` for a command without being asked.
    ///
    /// The read handler (or the test handler for [`Operation::Test`]) runs
    /// first and may write the line itself. The bytes are drained between
    /// commands.
    pub fn trigger_unsolicited(&mut self, name: &str, op: Operation) -> AtResult<()> {
        if !matches!(op, Operation::Read | Operation::Test) {
            return Err(AtError::OperationNotSupported(op));
        }
        let Engine {
            registry,
            context,
            outbound,
            config,
            ..
        } = self;
        let out = outbound.as_mut().ok_or(AtError::NoUnsolicitedBuffer)?;
        if out.is_pending() {
            return Err(AtError::UnsolicitedBusy);
        }
        let id = lookup_report(registry, name.as_bytes()).ok_or(AtError::NoSuchCommand)?;
        let cmd = registry.get_mut(id).ok_or(AtError::NoSuchCommand)?;

        let mut w = ResponseWriter::new(out.buffer_mut());
        let handler = match op {
            Operation::Test => cmd.test_handler(),
            _ => cmd.read_handler(),
        };
        if let Some(handler) = handler {
            handler(context, cmd, &mut w).map_err(|_| AtError::HandlerRejected)?;
        }
        if w.is_empty() {
            if op == Operation::Test {
                w.push(cmd.name().as_bytes())?;
                w.push(b": ")?;
                encode_signatures(cmd, &mut w)?;
            } else {
                encode_values(cmd, &mut w)?;
            }
        }
        w.push(config.line_ending.as_bytes())?;
        let len = w.len();
        out.arm(len);
        debug!("unsolicited {} queued ({} bytes)", cmd.name(), len);
        Ok(())
    }

    /// Send `AT<name><marker><args>` to the peer and wait for its final
    /// result. Report lines for `name` received meanwhile are treated as the
    /// response, and the first echo of the request line is dropped.
    pub fn request(&mut self, name: &str, op: Operation, args: &str) -> AtResult<()> {
        if self.pending.is_some() {
            return Err(AtError::RequestInFlight);
        }
        if name.is_empty()
            || !name.bytes().all(is_token_byte)
            || args.bytes().any(|b| b == b'\r' || b == b'\n')
        {
            return Err(AtError::MalformedRequest);
        }
        let target = lookup_report(&self.registry, name.as_bytes());
        let pending =
            PendingRequest::new(name.as_bytes(), target, op).ok_or(AtError::MalformedRequest)?;
        let Engine {
            outbound, config, ..
        } = self;
        let out = outbound.as_mut().ok_or(AtError::NoUnsolicitedBuffer)?;
        if out.is_pending() {
            return Err(AtError::UnsolicitedBusy);
        }

        let mut w = ResponseWriter::new(out.buffer_mut());
        w.push(b"AT")?;
        w.push(name.as_bytes())?;
        w.push(op.marker().as_bytes())?;
        if op == Operation::Write {
            w.push(args.as_bytes())?;
        }
        w.push(config.line_ending.as_bytes())?;
        let len = w.len();
        out.arm(len);

        debug!("request {}{} sent, target {:?}", name, op.marker(), target);
        self.pending = Some(pending);
        self.last_result = None;
        Ok(())
    }

    /// Forget the pending request, if any.
    pub fn cancel_request(&mut self) -> Option<PendingRequest> {
        self.pending.take()
    }

    pub fn pending_request(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// Final result of the last completed request.
    pub fn last_result(&self) -> Option<FinalResult> {
        self.last_result
    }

    /// Most recent error, including ones already answered with `ERROR`.
    pub fn last_error(&self) -> Option<AtError> {
        self.last_error
    }

    pub fn take_last_error(&mut self) -> Option<AtError> {
        self.last_error.take()
    }

    /// Whether a line, a response or unsolicited output is in progress.
    pub fn is_busy(&self) -> bool {
        self.phase != Phase::Idle
            || self.codec.in_progress()
            || self.outbound.as_ref().is_some_and(Outbound::is_pending)
    }

    pub fn state(&self) -> State {
        match self.phase {
            Phase::Idle if self.codec.in_progress() => State::Accumulating,
            Phase::Idle => State::Idle,
            Phase::Matching => State::Matching,
            Phase::Marshaling { .. } => State::Marshaling,
            Phase::Acknowledge | Phase::Invoking { .. } => State::Invoking,
            Phase::Help { .. } | Phase::Responding { .. } => State::Responding,
            Phase::Error { .. } => State::Error,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry<'a, C> {
        &self.registry
    }

    /// Toggle commands or groups between steps.
    pub fn registry_mut(&mut self) -> &mut Registry<'a, C> {
        &mut self.registry
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Tear the engine down, returning the transport and the context.
    pub fn release(self) -> (T, C) {
        (self.transport, self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Group;
    use crate::transport::MemoryTransport;

    fn drive<T: Transport, C>(engine: &mut Engine<'_, T, C>) {
        for _ in 0..10_000 {
            if engine.step() == Status::Idle {
                return;
            }
        }
        panic!("engine did not settle");
    }

    #[test]
    fn test_attention_answers_ok() {
        let mut groups: [Group<'_>; 0] = [];
        let mut working = [0u8; 32];
        let mut transport = MemoryTransport::new();
        transport.feed(b"AT\r\n");
        let mut engine =
            Engine::new(&mut transport, Registry::new(&mut groups), &mut working, ()).unwrap();
        drive(&mut engine);
        assert_eq!(engine.state(), State::Idle);
        drop(engine);
        assert_eq!(transport.output(), b"OK\r\n");
    }

    #[test]
    fn test_working_buffer_minimum() {
        let mut groups: [Group<'_>; 0] = [];
        let mut working = [0u8; 4];
        let result = Engine::new(
            MemoryTransport::new(),
            Registry::new(&mut groups),
            &mut working,
            (),
        );
        assert!(matches!(result, Err(AtError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_states_while_accumulating() {
        let mut groups: [Group<'_>; 0] = [];
        let mut working = [0u8; 32];
        let mut transport = MemoryTransport::new();
        transport.feed(b"AT");
        let mut engine =
            Engine::new(&mut transport, Registry::new(&mut groups), &mut working, ()).unwrap();
        assert_eq!(engine.step(), Status::Busy);
        assert_eq!(engine.state(), State::Accumulating);
        assert_eq!(engine.step(), Status::Busy);
        assert_eq!(engine.step(), Status::Idle);
        assert!(engine.is_busy());

        engine.transport_mut().feed(b"\r");
        assert_eq!(engine.step(), Status::Busy);
        assert_eq!(engine.state(), State::Matching);
        assert_eq!(engine.step(), Status::Busy);
        assert_eq!(engine.state(), State::Invoking);
        drive(&mut engine);
        assert!(!engine.is_busy());
    }

    #[test]
    fn test_unknown_command_is_error() {
        let mut groups: [Group<'_>; 0] = [];
        let mut working = [0u8; 32];
        let mut transport = MemoryTransport::new();
        transport.feed(b"AT+NOPE?\r");
        let mut engine =
            Engine::new(&mut transport, Registry::new(&mut groups), &mut working, ()).unwrap();
        drive(&mut engine);
        assert_eq!(engine.last_error(), Some(AtError::NoSuchCommand));
        drop(engine);
        assert_eq!(transport.output(), b"ERROR\r\n");
    }

    #[test]
    fn test_compose_help_line() {
        let mut apn = [0u8; 16];
        let mut vars = [crate::Variable::string("APN", &mut apn)];
        let cmd: Command<'_> = Command::new("+CGDCONT")
            .with_variables(&mut vars)
            .with_description("Set APN");
        let mut buf = [0u8; 64];
        let mut out = ResponseWriter::new(&mut buf);
        compose_help_line(&cmd, b"\r\n", &mut out).unwrap();
        assert_eq!(out.as_bytes(), b"AT+CGDCONT=<APN:STRING[RW]> - Set APN\r\n");
    }
}
