//! AT Command Protocol Engine
//!
//! This crate implements the device side (and the host side, for requests it
//! sends) of the AT command convention used by cellular modems over a UART:
//! an incremental tokenizer, typed argument marshaling, the
//! run/read/write/test dispatch state machine and unsolicited result
//! handling, all sharing one byte stream.
//!
//! # Protocol Overview
//!
//! - **Requests**: `AT+NAME` (run), `AT+NAME?` (read), `AT+NAME=a,b` (write),
//!   `AT+NAME=?` (test), each terminated by CR and/or LF
//! - **Responses**: `+NAME: v1,v2` followed by `OK`, or `ERROR` alone
//! - **Unsolicited results**: `+NAME: args` or `NAME: args`, unprompted and
//!   never answered
//!
//! # Memory
//!
//! The engine never allocates. The application lends it a working buffer,
//! an optional unsolicited buffer and the storage of every variable; the
//! engine reaches them only through bounds-checked slices.
//!
//! # Example
//!
//! ```rust,ignore
//! use modem_at::{Command, Engine, Group, Registry, Status, Variable};
//!
//! let mut attached = [0u8; 1];
//! let mut vars = [Variable::uint("STATE", &mut attached)];
//! let mut cmds = [Command::new("+CGATT").with_variables(&mut vars).on_read(report_state)];
//! let mut groups = [Group::new("packet", &mut cmds)];
//!
//! let mut working = [0u8; 128];
//! let mut engine = Engine::new(uart, Registry::new(&mut groups), &mut working, ())?;
//! while engine.step() == Status::Busy {}
//! ```

mod codec;
mod command;
mod config;
mod engine;
mod error;
mod marshal;
mod registry;
mod reply;
mod transport;
mod urc;
mod variable;

pub use codec::*;
pub use command::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use marshal::*;
pub use registry::*;
pub use reply::*;
pub use transport::*;
pub use urc::*;
pub use variable::*;
