//! Command descriptors and groups.
//!
//! A [`Command`] names one AT command, owns the ordered list of variables its
//! arguments map onto, and carries an optional handler per operation. A
//! missing handler means the operation is not supported.
//!
//! Handlers are plain function pointers generic over an application context
//! `C`, which the engine owns and passes to every call.
//!
//! ```rust,ignore
//! fn apn_written(_: &mut (), cmd: &mut Command<'_>, _args: &[u8], _n: usize) -> HandlerResult {
//!     log::info!("APN is now {:?}", cmd.variable("APN").and_then(|v| v.as_str()));
//!     Ok(())
//! }
//!
//! let mut apn = [0u8; 64];
//! let mut vars = [Variable::string("APN", &mut apn)];
//! let cmd = Command::new("+CGDCONT")
//!     .with_description("Set APN configuration")
//!     .with_variables(&mut vars)
//!     .on_write(apn_written)
//!     .need_all_vars(true);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AtError, AtResult, HandlerResult};
use crate::reply::Reply;
use crate::variable::Variable;

/// Operation requested on a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// `AT+NAME` with no marker.
    Run,
    /// `AT+NAME?`
    Read,
    /// `AT+NAME=args`
    Write,
    /// `AT+NAME=?`
    Test,
}

impl Operation {
    /// Marker following the command name on the wire.
    pub fn marker(self) -> &'static str {
        match self {
            Operation::Run => "",
            Operation::Read => "?",
            Operation::Write => "=",
            Operation::Test => "=?",
        }
    }
}

/// Handler for `AT+NAME`. May write a custom reply.
pub type RunFn<C> = fn(&mut C, &mut Command<'_, C>, &mut Reply<'_>) -> HandlerResult;

/// Handler for `AT+NAME?` and for inbound reports of the command.
///
/// It runs before the engine encodes the variables, so it may refresh them.
pub type ReadFn<C> = fn(&mut C, &mut Command<'_, C>, &mut Reply<'_>) -> HandlerResult;

/// Handler for `AT+NAME=?`.
pub type TestFn<C> = fn(&mut C, &mut Command<'_, C>, &mut Reply<'_>) -> HandlerResult;

/// Handler for `AT+NAME=args`, called after the arguments were decoded into
/// the variables. Receives the raw argument tail and the argument count.
pub type WriteFn<C> = fn(&mut C, &mut Command<'_, C>, &[u8], usize) -> HandlerResult;

/// Token characters allowed in command names.
pub(crate) fn is_token_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'+' | b'_' | b'#' | b'$' | b'%' | b'&')
}

/// One named AT command.
pub struct Command<'a, C = ()> {
    name: &'a str,
    description: &'a str,
    variables: &'a mut [Variable<'a>],
    run: Option<RunFn<C>>,
    read: Option<ReadFn<C>>,
    write: Option<WriteFn<C>>,
    test: Option<TestFn<C>>,
    need_all_vars: bool,
    only_test: bool,
    implicit_write: bool,
    disabled: bool,
}

impl<'a, C> Command<'a, C> {
    /// Create a command with no variables and no handlers.
    pub fn new(name: &'a str) -> Self {
        Command {
            name,
            description: "",
            variables: &mut [],
            run: None,
            read: None,
            write: None,
            test: None,
            need_all_vars: false,
            only_test: false,
            implicit_write: false,
            disabled: false,
        }
    }

    pub fn with_description(mut self, description: &'a str) -> Self {
        self.description = description;
        self
    }

    pub fn with_variables(mut self, variables: &'a mut [Variable<'a>]) -> Self {
        self.variables = variables;
        self
    }

    pub fn on_run(mut self, handler: RunFn<C>) -> Self {
        self.run = Some(handler);
        self
    }

    pub fn on_read(mut self, handler: ReadFn<C>) -> Self {
        self.read = Some(handler);
        self
    }

    pub fn on_write(mut self, handler: WriteFn<C>) -> Self {
        self.write = Some(handler);
        self
    }

    pub fn on_test(mut self, handler: TestFn<C>) -> Self {
        self.test = Some(handler);
        self
    }

    /// Require every variable to be supplied by writes and reports.
    pub fn need_all_vars(mut self, enabled: bool) -> Self {
        self.need_all_vars = enabled;
        self
    }

    /// Answer only the test operation.
    pub fn only_test(mut self, enabled: bool) -> Self {
        self.only_test = enabled;
        self
    }

    /// Accept writes without a write handler by storing the variables.
    pub fn implicit_write(mut self, enabled: bool) -> Self {
        self.implicit_write = enabled;
        self
    }

    /// Start out hidden from the matcher.
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn description(&self) -> &'a str {
        self.description
    }

    pub fn variables(&self) -> &[Variable<'a>] {
        &*self.variables
    }

    pub fn variables_mut(&mut self) -> &mut [Variable<'a>] {
        &mut *self.variables
    }

    /// Find a variable by exact name.
    pub fn variable(&self, name: &str) -> Option<&Variable<'a>> {
        self.variables.iter().find(|v| v.name() == name)
    }

    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable<'a>> {
        self.variables.iter_mut().find(|v| v.name() == name)
    }

    pub fn run_handler(&self) -> Option<RunFn<C>> {
        self.run
    }

    pub fn read_handler(&self) -> Option<ReadFn<C>> {
        self.read
    }

    pub fn write_handler(&self) -> Option<WriteFn<C>> {
        self.write
    }

    pub fn test_handler(&self) -> Option<TestFn<C>> {
        self.test
    }

    pub fn needs_all_vars(&self) -> bool {
        self.need_all_vars
    }

    pub fn is_only_test(&self) -> bool {
        self.only_test
    }

    pub fn is_implicit_write(&self) -> bool {
        self.implicit_write
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Hide or reveal the command. Takes effect at the next line.
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// Decide which handler serves a requested operation.
    ///
    /// A bare `AT+NAME` falls back to the read handler when there is no run
    /// handler. Writes are served by the write handler or, with
    /// `implicit_write`, by storing the variables alone.
    pub fn resolve(&self, op: Operation) -> AtResult<Operation> {
        if self.only_test && op != Operation::Test {
            return Err(AtError::OperationNotSupported(op));
        }
        let resolved = match op {
            Operation::Test => self.test.map(|_| Operation::Test),
            Operation::Read => self.read.map(|_| Operation::Read),
            Operation::Run => self
                .run
                .map(|_| Operation::Run)
                .or(self.read.map(|_| Operation::Read)),
            Operation::Write => {
                (self.write.is_some() || self.implicit_write).then_some(Operation::Write)
            }
        };
        resolved.ok_or(AtError::OperationNotSupported(op))
    }

    /// Check the name and every variable.
    pub fn validate(&self) -> AtResult<()> {
        if self.name.is_empty() || !self.name.bytes().all(is_token_byte) {
            return Err(AtError::InvalidDescriptor(
                "command name must be a non-empty token",
            ));
        }
        self.variables.iter().try_for_each(Variable::validate)
    }
}

impl<C> std::fmt::Debug for Command<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("variables", &self.variables)
            .field("run", &self.run.is_some())
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .field("test", &self.test.is_some())
            .field("need_all_vars", &self.need_all_vars)
            .field("only_test", &self.only_test)
            .field("implicit_write", &self.implicit_write)
            .field("disabled", &self.disabled)
            .finish()
    }
}

/// An ordered collection of commands.
pub struct Group<'a, C = ()> {
    name: &'a str,
    commands: &'a mut [Command<'a, C>],
    disabled: bool,
}

impl<'a, C> Group<'a, C> {
    pub fn new(name: &'a str, commands: &'a mut [Command<'a, C>]) -> Self {
        Group {
            name,
            commands,
            disabled: false,
        }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn commands(&self) -> &[Command<'a, C>] {
        &*self.commands
    }

    pub fn commands_mut(&mut self) -> &mut [Command<'a, C>] {
        &mut *self.commands
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Hide or reveal every command of the group.
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }
}

impl<C> std::fmt::Debug for Group<'_, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("commands", &self.commands)
            .field("disabled", &self.disabled)
            .finish()
    }
}
