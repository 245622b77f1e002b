//! Variable descriptors.
//!
//! A [`Variable`] binds one typed argument/response field to storage owned by
//! the application. The engine only ever reaches that storage through the
//! bounds-checked accessors defined here.
//!
//! Integers are stored little-endian in `size` bytes (1, 2 or 4). Strings are
//! stored zero-terminated, so a string variable holds at most `size - 1`
//! bytes of text.

use serde::{Deserialize, Serialize};

use crate::error::{AtError, AtResult, DecodeFault, HandlerResult};

/// Hook invoked after a variable has been written, with the number of bytes
/// the decoder produced. Returning an error aborts the rest of the command.
pub type WriteHook = fn(&Variable<'_>, usize) -> HandlerResult;

/// Wire representation of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarType {
    /// Unsigned decimal integer.
    UintDec,
    /// Signed decimal integer.
    IntDec,
    /// Unsigned integer rendered as `0x`-prefixed hexadecimal.
    Hex,
    /// Byte buffer rendered as hexadecimal digit pairs.
    HexBuf,
    /// Text buffer rendered as a quoted string.
    String,
}

impl VarType {
    /// Whether this type is stored as a fixed-width integer.
    pub fn is_integer(self) -> bool {
        matches!(self, VarType::UintDec | VarType::IntDec | VarType::Hex)
    }
}

/// Access rights of a variable as seen by `AT` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Reported by reads, rejected by writes.
    ReadOnly,
    /// Accepted by writes, omitted from reads.
    WriteOnly,
    /// Both.
    #[default]
    ReadWrite,
}

impl Access {
    /// Whether reads report this variable.
    pub fn is_readable(self) -> bool {
        !matches!(self, Access::WriteOnly)
    }

    /// Whether writes may change this variable.
    pub fn is_writable(self) -> bool {
        !matches!(self, Access::ReadOnly)
    }

    pub(crate) fn tag(self) -> &'static str {
        match self {
            Access::ReadOnly => "RO",
            Access::WriteOnly => "WO",
            Access::ReadWrite => "RW",
        }
    }
}

/// A typed field bound to application storage.
pub struct Variable<'a> {
    name: &'a str,
    kind: VarType,
    data: &'a mut [u8],
    size: usize,
    access: Access,
    on_write: Option<WriteHook>,
}

impl<'a> Variable<'a> {
    /// Create a variable over `data`. The declared size defaults to the
    /// full length of the storage.
    pub fn new(name: &'a str, kind: VarType, data: &'a mut [u8]) -> Self {
        let size = data.len();
        Variable {
            name,
            kind,
            data,
            size,
            access: Access::ReadWrite,
            on_write: None,
        }
    }

    /// Unsigned decimal variable.
    pub fn uint(name: &'a str, data: &'a mut [u8]) -> Self {
        Self::new(name, VarType::UintDec, data)
    }

    /// Signed decimal variable.
    pub fn int(name: &'a str, data: &'a mut [u8]) -> Self {
        Self::new(name, VarType::IntDec, data)
    }

    /// Hexadecimal number variable.
    pub fn hex(name: &'a str, data: &'a mut [u8]) -> Self {
        Self::new(name, VarType::Hex, data)
    }

    /// Hexadecimal byte buffer variable.
    pub fn hex_buf(name: &'a str, data: &'a mut [u8]) -> Self {
        Self::new(name, VarType::HexBuf, data)
    }

    /// String buffer variable.
    pub fn string(name: &'a str, data: &'a mut [u8]) -> Self {
        Self::new(name, VarType::String, data)
    }

    /// Declare a size smaller than the storage. Checked when the engine is
    /// constructed.
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Set the access rights.
    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Attach a hook run after every successful write.
    pub fn on_write(mut self, hook: WriteHook) -> Self {
        self.on_write = Some(hook);
        self
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn kind(&self) -> VarType {
        self.kind
    }

    /// Declared size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn write_hook(&self) -> Option<WriteHook> {
        self.on_write
    }

    /// The declared region of the storage.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.size.min(self.data.len())]
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        let size = self.size.min(self.data.len());
        &mut self.data[..size]
    }

    /// Check the descriptor invariants.
    pub fn validate(&self) -> AtResult<()> {
        if self.name.is_empty() {
            return Err(AtError::InvalidDescriptor("variable name is empty"));
        }
        if self.size > self.data.len() {
            return Err(AtError::InvalidDescriptor(
                "variable size exceeds its storage",
            ));
        }
        if self.kind.is_integer() && !matches!(self.size, 1 | 2 | 4) {
            return Err(AtError::InvalidDescriptor(
                "integer variables must be 1, 2 or 4 bytes wide",
            ));
        }
        if self.size == 0 {
            return Err(AtError::InvalidDescriptor("variable has no storage"));
        }
        Ok(())
    }

    /// Current value of an integer variable, zero-extended.
    pub fn as_uint(&self) -> u32 {
        let mut raw = [0u8; 4];
        let data = self.data();
        let width = data.len().min(4);
        raw[..width].copy_from_slice(&data[..width]);
        u32::from_le_bytes(raw)
    }

    /// Current value of an integer variable, sign-extended from its width.
    pub fn as_int(&self) -> i32 {
        match self.size {
            1 => self.as_uint() as u8 as i8 as i32,
            2 => self.as_uint() as u16 as i16 as i32,
            _ => self.as_uint() as i32,
        }
    }

    /// Text of a string variable up to its terminator.
    pub fn text(&self) -> &[u8] {
        let data = self.data();
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        &data[..end]
    }

    /// Text of a string variable, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.text()).ok()
    }

    /// Store an unsigned value, failing if it does not fit the width.
    pub fn set_uint(&mut self, value: u32) -> AtResult<()> {
        self.store_uint(u64::from(value))
            .map_err(|fault| AtError::Decode { index: 0, fault })
    }

    /// Store a signed value, failing if it does not fit the width.
    pub fn set_int(&mut self, value: i32) -> AtResult<()> {
        self.store_int(i64::from(value))
            .map_err(|fault| AtError::Decode { index: 0, fault })
    }

    /// Replace the text of a string variable.
    pub fn set_str(&mut self, value: &str) -> AtResult<()> {
        self.store_text(value.as_bytes())
            .map_err(|fault| AtError::Decode { index: 0, fault })
    }

    pub(crate) fn store_uint(&mut self, value: u64) -> Result<(), DecodeFault> {
        let max = match self.size {
            1 => u64::from(u8::MAX),
            2 => u64::from(u16::MAX),
            4 => u64::from(u32::MAX),
            _ => return Err(DecodeFault::OutOfRange),
        };
        if value > max {
            return Err(DecodeFault::OutOfRange);
        }
        self.store_le(&(value as u32).to_le_bytes())
    }

    pub(crate) fn store_int(&mut self, value: i64) -> Result<(), DecodeFault> {
        let (min, max) = match self.size {
            1 => (i64::from(i8::MIN), i64::from(i8::MAX)),
            2 => (i64::from(i16::MIN), i64::from(i16::MAX)),
            4 => (i64::from(i32::MIN), i64::from(i32::MAX)),
            _ => return Err(DecodeFault::OutOfRange),
        };
        if value < min || value > max {
            return Err(DecodeFault::OutOfRange);
        }
        self.store_le(&(value as i32).to_le_bytes())
    }

    fn store_le(&mut self, bytes: &[u8; 4]) -> Result<(), DecodeFault> {
        let data = self.data_mut();
        if data.len() > bytes.len() {
            return Err(DecodeFault::OutOfRange);
        }
        let width = data.len();
        data.copy_from_slice(&bytes[..width]);
        Ok(())
    }

    /// Copy text and append the terminator.
    pub(crate) fn store_text(&mut self, text: &[u8]) -> Result<(), DecodeFault> {
        let data = self.data_mut();
        if text.len() + 1 > data.len() {
            return Err(DecodeFault::TooLong);
        }
        data[..text.len()].copy_from_slice(text);
        data[text.len()] = 0;
        Ok(())
    }
}

impl std::fmt::Debug for Variable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("access", &self.access)
            .field("hook", &self.on_write.is_some())
            .finish()
    }
}
