//! Conversion between wire text and variable storage.
//!
//! | type       | wire form            | storage                   |
//! |------------|----------------------|---------------------------|
//! | `UintDec`  | `42`                 | LE integer, 1/2/4 bytes   |
//! | `IntDec`   | `-7`, `+7`           | LE integer, 1/2/4 bytes   |
//! | `Hex`      | `0x1F`, `1f`         | LE integer, 1/2/4 bytes   |
//! | `HexBuf`   | `DEADBEEF`           | raw bytes                 |
//! | `String`   | `"a \"b\""`, `abc`   | zero-terminated text      |

use std::fmt::Write as _;

use log::warn;

use crate::codec::Arguments;
use crate::command::Command;
use crate::error::{AtError, AtResult, DecodeFault};
use crate::reply::ResponseWriter;
use crate::variable::{VarType, Variable};

/// Decode one argument into `var`, returning the number of bytes produced.
///
/// Integers are parsed in full before the storage is touched; a failure
/// leaves the previous value in place.
pub fn decode(var: &mut Variable<'_>, raw: &[u8]) -> Result<usize, DecodeFault> {
    match var.kind() {
        VarType::UintDec => {
            let value = parse_unsigned(raw, 10)?;
            var.store_uint(value)?;
            Ok(var.size())
        }
        VarType::IntDec => {
            let value = parse_signed(raw)?;
            var.store_int(value)?;
            Ok(var.size())
        }
        VarType::Hex => {
            let digits = match raw {
                [b'0', b'x' | b'X', rest @ ..] => rest,
                _ => raw,
            };
            let value = parse_unsigned(digits, 16)?;
            var.store_uint(value)?;
            Ok(var.size())
        }
        VarType::HexBuf => decode_hex_buf(var, unquote_plain(raw)),
        VarType::String => decode_string(var, raw),
    }
}

fn digit_value(byte: u8, radix: u32) -> Option<u64> {
    (byte as char).to_digit(radix).map(u64::from)
}

fn parse_unsigned(raw: &[u8], radix: u32) -> Result<u64, DecodeFault> {
    let digits = raw
        .iter()
        .take_while(|&&b| digit_value(b, radix).is_some())
        .count();
    if digits == 0 {
        return Err(DecodeFault::NoDigits);
    }
    if digits < raw.len() {
        return Err(DecodeFault::TrailingCharacters);
    }

    raw.iter().try_fold(0u64, |acc, &b| {
        let digit = digit_value(b, radix).ok_or(DecodeFault::NoDigits)?;
        acc.checked_mul(u64::from(radix))
            .and_then(|v| v.checked_add(digit))
            .ok_or(DecodeFault::OutOfRange)
    })
}

fn parse_signed(raw: &[u8]) -> Result<i64, DecodeFault> {
    let (negative, digits) = match raw {
        [b'-', rest @ ..] => (true, rest),
        [b'+', rest @ ..] => (false, rest),
        _ => (false, raw),
    };
    let magnitude = parse_unsigned(digits, 10)?;
    let magnitude = i64::try_from(magnitude).map_err(|_| DecodeFault::OutOfRange)?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Strip a surrounding pair of quotes, if any. Used for hex buffers, which
/// some peers send quoted.
fn unquote_plain(raw: &[u8]) -> &[u8] {
    match raw {
        [b'"', inner @ .., b'"'] => inner,
        _ => raw,
    }
}

fn decode_hex_buf(var: &mut Variable<'_>, digits: &[u8]) -> Result<usize, DecodeFault> {
    if digits.len() % 2 != 0 {
        return Err(DecodeFault::InvalidHex);
    }
    if digits.iter().any(|b| !b.is_ascii_hexdigit()) {
        return Err(DecodeFault::InvalidHex);
    }
    let count = digits.len() / 2;
    let data = var.data_mut();
    if count > data.len() {
        return Err(DecodeFault::TooLong);
    }

    for (slot, pair) in data.iter_mut().zip(digits.chunks_exact(2)) {
        let hi = digit_value(pair[0], 16).unwrap_or(0);
        let lo = digit_value(pair[1], 16).unwrap_or(0);
        *slot = ((hi << 4) | lo) as u8;
    }
    data[count..].fill(0);
    Ok(count)
}

/// Walk a quoted string, feeding each unescaped byte to `sink`.
fn unescape(raw: &[u8], mut sink: impl FnMut(u8)) -> Result<(), DecodeFault> {
    let mut bytes = raw.iter().skip(1);
    let mut closed_at = None;
    let mut pos = 1;
    while let Some(&byte) = bytes.next() {
        match byte {
            b'\\' => {
                let &escaped = bytes.next().ok_or(DecodeFault::UnterminatedQuote)?;
                sink(escaped);
                pos += 2;
            }
            b'"' => {
                closed_at = Some(pos);
                break;
            }
            other => {
                sink(other);
                pos += 1;
            }
        }
    }

    match closed_at {
        None => Err(DecodeFault::UnterminatedQuote),
        Some(end) if end + 1 < raw.len() => Err(DecodeFault::TrailingCharacters),
        Some(_) => Ok(()),
    }
}

fn decode_string(var: &mut Variable<'_>, raw: &[u8]) -> Result<usize, DecodeFault> {
    if raw.first() != Some(&b'"') {
        var.store_text(raw)?;
        return Ok(raw.len());
    }

    // Measure first so an oversized argument does not clobber the old value.
    let mut len = 0usize;
    unescape(raw, |_| len += 1)?;
    let data = var.data_mut();
    if len + 1 > data.len() {
        return Err(DecodeFault::TooLong);
    }

    let mut at = 0usize;
    unescape(raw, |byte| {
        data[at] = byte;
        at += 1;
    })?;
    data[at] = 0;
    Ok(len)
}

/// Decode an argument tail into the command's variables, in order.
///
/// With `strict` (an `AT` write) more arguments than variables is an error and
/// read-only variables refuse to be written. Without it (an inbound report)
/// surplus arguments are ignored. In both modes `need_all_vars` rejects a
/// short list, and counts are checked before any variable changes.
///
/// Returns the number of arguments applied.
pub fn apply_arguments<C>(cmd: &mut Command<'_, C>, tail: &[u8], strict: bool) -> AtResult<usize> {
    let expected = cmd.variables().len();
    let actual = Arguments::new(tail).count();

    if strict && actual > expected {
        return Err(AtError::ArgumentCountMismatch { expected, actual });
    }
    if cmd.needs_all_vars() && actual < expected {
        return Err(AtError::ArgumentCountMismatch { expected, actual });
    }

    let mut applied = 0;
    for (index, (var, raw)) in cmd
        .variables_mut()
        .iter_mut()
        .zip(Arguments::new(tail))
        .enumerate()
    {
        if strict && !var.access().is_writable() {
            return Err(AtError::AccessDenied { index });
        }
        let produced = decode(var, raw).map_err(|fault| {
            warn!("argument {} for {} rejected: {}", index, var.name(), fault);
            AtError::Decode { index, fault }
        })?;
        if let Some(hook) = var.write_hook() {
            hook(var, produced).map_err(|_| AtError::HandlerRejected)?;
        }
        applied += 1;
    }
    Ok(applied)
}

/// Append the wire form of one variable.
pub fn encode(var: &Variable<'_>, out: &mut ResponseWriter<'_>) -> AtResult<()> {
    let overflow = AtError::BufferOverflow {
        capacity: out.capacity(),
    };
    match var.kind() {
        VarType::UintDec => write!(out, "{}", var.as_uint()).map_err(|_| overflow),
        VarType::IntDec => write!(out, "{}", var.as_int()).map_err(|_| overflow),
        VarType::Hex => write!(out, "0x{:0width$X}", var.as_uint(), width = var.size() * 2)
            .map_err(|_| overflow),
        VarType::HexBuf => var
            .data()
            .iter()
            .try_for_each(|b| write!(out, "{:02X}", b))
            .map_err(|_| overflow),
        VarType::String => {
            out.push_byte(b'"')?;
            for &byte in var.text() {
                if byte == b'"' || byte == b'\\' {
                    out.push_byte(b'\\')?;
                }
                out.push_byte(byte)?;
            }
            out.push_byte(b'"')
        }
    }
}

/// `NAME: v1,v2,...` over the readable variables in declaration order.
pub fn encode_values<C>(cmd: &Command<'_, C>, out: &mut ResponseWriter<'_>) -> AtResult<()> {
    out.push(cmd.name().as_bytes())?;
    out.push(b": ")?;
    for (i, var) in cmd
        .variables()
        .iter()
        .filter(|v| v.access().is_readable())
        .enumerate()
    {
        if i > 0 {
            out.push_byte(b',')?;
        }
        encode(var, out)?;
    }
    Ok(())
}

/// Type label used in signatures.
pub fn type_label(var: &Variable<'_>) -> &'static str {
    match (var.kind(), var.size()) {
        (VarType::UintDec, 1) => "UINT8",
        (VarType::UintDec, 2) => "UINT16",
        (VarType::UintDec, _) => "UINT32",
        (VarType::IntDec, 1) => "INT8",
        (VarType::IntDec, 2) => "INT16",
        (VarType::IntDec, _) => "INT32",
        (VarType::Hex, 1) => "HEX8",
        (VarType::Hex, 2) => "HEX16",
        (VarType::Hex, _) => "HEX32",
        (VarType::HexBuf, _) => "HEXBUF",
        (VarType::String, _) => "STRING",
    }
}

/// `<NAME:TYPE[RW]>,...` for every variable of the command.
pub fn encode_signatures<C>(cmd: &Command<'_, C>, out: &mut ResponseWriter<'_>) -> AtResult<()> {
    let overflow = AtError::BufferOverflow {
        capacity: out.capacity(),
    };
    for (i, var) in cmd.variables().iter().enumerate() {
        if i > 0 {
            out.push_byte(b',')?;
        }
        write!(
            out,
            "<{}:{}[{}]>",
            var.name(),
            type_label(var),
            var.access().tag()
        )
        .map_err(|_| overflow)?;
    }
    Ok(())
}
