//! Error types for the AT engine.

use thiserror::Error;

use crate::command::Operation;

/// Why a single argument could not be decoded into its variable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFault {
    /// A numeric argument contained no digits.
    #[error("no digits")]
    NoDigits,
    /// The value does not fit the declared storage width.
    #[error("value out of range")]
    OutOfRange,
    /// A string or buffer is longer than the variable can hold.
    #[error("value too long")]
    TooLong,
    /// A hexadecimal argument contained a non-hex digit or an odd digit count.
    #[error("invalid hexadecimal")]
    InvalidHex,
    /// A quoted string is missing its closing quote.
    #[error("unterminated quote")]
    UnterminatedQuote,
    /// Characters follow the value inside the same argument.
    #[error("trailing characters")]
    TrailingCharacters,
}

/// Errors surfaced by the engine.
///
/// None of these are fatal: the engine always returns to idle and accepts
/// the next line.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtError {
    /// A line or a composed response exceeded the buffer capacity.
    #[error("buffer overflow: capacity {capacity} bytes")]
    BufferOverflow {
        /// Capacity of the buffer that overflowed.
        capacity: usize,
    },

    /// No enabled command matches the requested name.
    #[error("no such command")]
    NoSuchCommand,

    /// The number of arguments does not fit the command's variables.
    #[error("argument count mismatch: expected {expected}, got {actual}")]
    ArgumentCountMismatch {
        /// Number of declared variables.
        expected: usize,
        /// Number of arguments supplied.
        actual: usize,
    },

    /// An argument could not be decoded.
    #[error("argument {index} could not be decoded: {fault}")]
    Decode {
        /// Position of the argument in the line.
        index: usize,
        /// What was wrong with it.
        fault: DecodeFault,
    },

    /// A command handler or variable hook refused the operation.
    #[error("handler rejected the operation")]
    HandlerRejected,

    /// The command has no handler for the requested operation.
    #[error("operation not supported: {0:?}")]
    OperationNotSupported(Operation),

    /// A write targeted a read-only variable.
    #[error("variable {index} is read-only")]
    AccessDenied {
        /// Position of the variable in the command.
        index: usize,
    },

    /// An `AT` line whose tail is not a recognised operation.
    #[error("malformed request")]
    MalformedRequest,

    /// A descriptor or buffer failed validation at construction.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(&'static str),

    /// Unsolicited output needs an unsolicited buffer.
    #[error("no unsolicited buffer configured")]
    NoUnsolicitedBuffer,

    /// The unsolicited buffer still holds bytes that were not written.
    #[error("unsolicited buffer busy")]
    UnsolicitedBusy,

    /// A host request is already waiting for its final result.
    #[error("a request is already in flight")]
    RequestInFlight,
}

/// Result type alias for engine operations.
pub type AtResult<T> = Result<T, AtError>;

/// Returned by application handlers and variable hooks to refuse an operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("rejected")]
pub struct Rejected;

impl From<std::fmt::Error> for Rejected {
    fn from(_: std::fmt::Error) -> Self {
        Rejected
    }
}

impl From<AtError> for Rejected {
    fn from(_: AtError) -> Self {
        Rejected
    }
}

/// Result type returned by handlers and hooks.
pub type HandlerResult = Result<(), Rejected>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fault_messages() {
        assert_eq!(DecodeFault::NoDigits.to_string(), "no digits");
        let error = AtError::Decode {
            index: 2,
            fault: DecodeFault::UnterminatedQuote,
        };
        assert_eq!(
            error.to_string(),
            "argument 2 could not be decoded: unterminated quote"
        );
    }
}
