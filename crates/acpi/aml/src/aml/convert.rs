//! Implicit and explicit data conversions between Integer, String and Buffer.

extern crate alloc;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt::Write;

use super::interpreter::IntegerFormat;
use super::value::{IntegerWidth, Object, ObjectType};
use crate::AmlError;

/// Implicit conversion to Integer.
///
/// Strings are read as hexadecimal (an optional `0x` prefix is accepted) up
/// to the first non-hex character; buffers are assembled little-endian from
/// their first `width` bytes.
///
/// # Errors
///
/// Returns [`AmlError::Type`] for objects that are not data.
pub fn to_integer(obj: &Object, width: IntegerWidth) -> Result<u64, AmlError> {
    match obj {
        Object::Integer(v) => Ok(width.truncate(*v)),
        Object::String(s) => Ok(width.truncate(parse_radix(strip_hex_prefix(s), 16))),
        Object::Buffer(b) => Ok(bytes_to_integer(&b.read(), width)),
        other => Err(other.type_error(ObjectType::Integer)),
    }
}

/// `ToInteger`: like [`to_integer`], but strings are decimal unless they
/// carry a `0x` prefix.
///
/// # Errors
///
/// Returns [`AmlError::Type`] for objects that are not data.
pub fn explicit_to_integer(obj: &Object, width: IntegerWidth) -> Result<u64, AmlError> {
    match obj {
        Object::String(s) => {
            let s = s.trim_start();
            let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => parse_radix(hex, 16),
                None => parse_radix(s, 10),
            };
            Ok(width.truncate(value))
        }
        other => to_integer(other, width),
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    let s = s.trim_start();
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn parse_radix(s: &str, radix: u32) -> u64 {
    let mut value: u64 = 0;
    for c in s.chars() {
        let Some(digit) = c.to_digit(radix) else { break };
        value = value.wrapping_mul(u64::from(radix)).wrapping_add(u64::from(digit));
    }
    value
}

fn bytes_to_integer(bytes: &[u8], width: IntegerWidth) -> u64 {
    bytes
        .iter()
        .take(width.bytes())
        .enumerate()
        .fold(0, |acc, (i, &b)| acc | (u64::from(b) << (i * 8)))
}

/// Implicit conversion to String.
///
/// Integers are formatted according to `format`: decimal, or hexadecimal
/// padded to the full integer width. Buffers become space-separated hex
/// byte pairs.
///
/// # Errors
///
/// Returns [`AmlError::Type`] for objects that are not data.
pub fn to_string(
    obj: &Object,
    width: IntegerWidth,
    format: IntegerFormat,
) -> Result<String, AmlError> {
    match obj {
        Object::Integer(v) => Ok(integer_to_string(width.truncate(*v), width, format)),
        Object::String(s) => Ok(s.clone()),
        Object::Buffer(b) => {
            let bytes = b.read();
            let mut out = String::with_capacity(bytes.len() * 3);
            for (i, byte) in bytes.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let _ = write!(out, "{byte:02X}");
            }
            Ok(out)
        }
        other => Err(other.type_error(ObjectType::String)),
    }
}

/// Formats an integer the way implicit conversion does.
#[must_use]
pub fn integer_to_string(value: u64, width: IntegerWidth, format: IntegerFormat) -> String {
    match format {
        IntegerFormat::Decimal => format!("{value}"),
        IntegerFormat::Hex => format!("{value:0digits$X}", digits = width.bytes() * 2),
    }
}

/// Implicit conversion to Buffer.
///
/// Integers become `width` little-endian bytes; strings keep their NUL
/// terminator.
///
/// # Errors
///
/// Returns [`AmlError::Type`] for objects that are not data.
pub fn to_buffer(obj: &Object, width: IntegerWidth) -> Result<Vec<u8>, AmlError> {
    match obj {
        Object::Integer(v) => Ok(v.to_le_bytes()[..width.bytes()].to_vec()),
        Object::String(s) => {
            let mut bytes = s.as_bytes().to_vec();
            bytes.push(0);
            Ok(bytes)
        }
        Object::Buffer(b) => Ok(b.read().clone()),
        other => Err(other.type_error(ObjectType::Buffer)),
    }
}

/// `ToDecimalString`.
///
/// # Errors
///
/// Returns [`AmlError::Type`] for objects that are not data.
pub fn to_decimal_string(obj: &Object, width: IntegerWidth) -> Result<String, AmlError> {
    match obj {
        Object::Integer(v) => Ok(format!("{}", width.truncate(*v))),
        Object::String(s) => Ok(s.clone()),
        Object::Buffer(b) => Ok(join(&b.read(), |out, byte| {
            let _ = write!(out, "{byte}");
        })),
        other => Err(other.type_error(ObjectType::String)),
    }
}

/// `ToHexString`.
///
/// # Errors
///
/// Returns [`AmlError::Type`] for objects that are not data.
pub fn to_hex_string(obj: &Object, width: IntegerWidth) -> Result<String, AmlError> {
    match obj {
        Object::Integer(v) => Ok(integer_to_string(
            width.truncate(*v),
            width,
            IntegerFormat::Hex,
        )),
        Object::String(s) => Ok(s.clone()),
        Object::Buffer(b) => Ok(join(&b.read(), |out, byte| {
            let _ = write!(out, "0x{byte:02X}");
        })),
        other => Err(other.type_error(ObjectType::String)),
    }
}

fn join(bytes: &[u8], mut each: impl FnMut(&mut String, u8)) -> String {
    let mut out = String::new();
    for (i, &byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        each(&mut out, byte);
    }
    out
}

/// `ToString(buffer, length)`: bytes up to the first NUL or `max_len`.
///
/// # Errors
///
/// Returns [`AmlError::Type`] unless `obj` is a buffer (or already a string).
pub fn buffer_to_string(obj: &Object, max_len: Option<usize>) -> Result<String, AmlError> {
    let bytes = match obj {
        Object::Buffer(b) => b.read().clone(),
        Object::String(s) => s.as_bytes().to_vec(),
        other => return Err(other.type_error(ObjectType::Buffer)),
    };
    let limit = max_len.unwrap_or(usize::MAX);
    let text: Vec<u8> = bytes
        .into_iter()
        .take_while(|&b| b != 0)
        .take(limit)
        .collect();
    Ok(String::from_utf8_lossy(&text).into_owned())
}

/// Converts `obj` to the type of `like`, as the logical comparison and
/// `Concatenate` operators do with their second operand.
///
/// # Errors
///
/// Returns [`AmlError::Type`] if either side is not data.
pub fn convert_like(
    obj: &Object,
    like: &Object,
    width: IntegerWidth,
    format: IntegerFormat,
) -> Result<Object, AmlError> {
    Ok(match like {
        Object::Integer(_) => Object::Integer(to_integer(obj, width)?),
        Object::String(_) => Object::String(to_string(obj, width, format)?),
        Object::Buffer(_) => Object::buffer(to_buffer(obj, width)?),
        other => return Err(other.type_error(ObjectType::Integer)),
    })
}

/// Compares two data objects after converting `b` to the type of `a`.
///
/// Strings and buffers compare byte-wise, shorter-is-less on a common prefix.
///
/// # Errors
///
/// Returns [`AmlError::Type`] if either side cannot take part.
pub fn compare(
    a: &Object,
    b: &Object,
    width: IntegerWidth,
    format: IntegerFormat,
) -> Result<Ordering, AmlError> {
    match (a, convert_like(b, a, width, format)?) {
        (Object::Integer(x), Object::Integer(y)) => Ok(width.truncate(*x).cmp(&y)),
        (Object::String(x), Object::String(y)) => Ok(x.as_bytes().cmp(y.as_bytes())),
        (Object::Buffer(x), Object::Buffer(y)) => Ok(x.read().as_slice().cmp(y.read().as_slice())),
        (other, _) => Err(other.type_error(ObjectType::Integer)),
    }
}

/// Packed BCD to binary (`FromBCD`).
#[must_use]
pub fn from_bcd(mut value: u64) -> u64 {
    let mut result = 0;
    let mut scale = 1u64;
    while value != 0 {
        result += (value & 0xF) * scale;
        scale = scale.saturating_mul(10);
        value >>= 4;
    }
    result
}

/// Binary to packed BCD (`ToBCD`).
#[must_use]
pub fn to_bcd(mut value: u64) -> u64 {
    let mut result = 0;
    let mut shift = 0;
    while value != 0 && shift < 64 {
        result |= (value % 10) << shift;
        value /= 10;
        shift += 4;
    }
    result
}
