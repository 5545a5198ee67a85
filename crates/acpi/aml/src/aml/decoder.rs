//! AML term decoder.
//!
//! [`decode_term`] reads exactly one term header from a [`BinaryReader`]:
//! the opcode (single byte or `0x5B`-prefixed extended), its package length
//! if it has one, and any name strings or immediate constants that precede
//! its variable operands. Operands that are themselves terms (TermArg,
//! SuperName, Target) are left in the stream for the executor to decode
//! recursively, which is what lets method bodies stay unparsed until they
//! are invoked.
//!
//! The decoder never reads past the reader's limit; running off the end of
//! a span is reported as [`ParseErrorKind::UnexpectedEnd`].

use crate::aml::field::FieldFlags;
use crate::aml::opcode::*;
use crate::aml::path::{AmlName, NameSeg, is_lead_name_char};
use crate::handler::RegionSpace;
use crate::reader::BinaryReader;
use crate::{AmlError, ParseErrorKind};

extern crate alloc;
use alloc::vec::Vec;

/// Largest value a 4-byte PkgLength can carry (28 bits).
pub const MAX_PKG_LENGTH: usize = 0x0FFF_FFFF;

/// One decoded term.
///
/// `end` fields are absolute offsets (exclusive) of the term's package, as
/// derived from its PkgLength.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term<'a> {
    /// `Zero`, `One`, or a Byte/Word/DWord/QWord constant.
    Integer(u64),
    /// `Ones`; its value depends on the integer width in effect.
    Ones,
    /// `Revision`.
    Revision,
    /// A string constant, without its terminator.
    String(&'a [u8]),
    /// `Buffer`: a BufferSize TermArg and the initializer bytes follow.
    Buffer { end: usize },
    /// `Package`: `count` elements follow.
    Package { end: usize, count: u8 },
    /// `VarPackage`: a NumElements TermArg and the elements follow.
    VarPackage { end: usize },
    /// `Local0`..`Local7`.
    Local(u8),
    /// `Arg0`..`Arg6`.
    Arg(u8),
    /// The `Debug` object.
    Debug,
    /// A name used as a term: an object reference or a method invocation.
    NameRef(AmlName),

    /// `Alias(source, alias)`.
    Alias { source: AmlName, alias: AmlName },
    /// `Name(name, DataRefObject)`; the value follows.
    Name { name: AmlName },
    /// `Scope(name) { ... }`.
    Scope { end: usize, name: AmlName },
    /// `Method(name, flags) { ... }`; the body spans up to `end`.
    Method {
        end: usize,
        name: AmlName,
        flags: MethodFlags,
    },
    /// `External(name, type, args)`.
    External {
        name: AmlName,
        object_type: u8,
        arg_count: u8,
    },
    /// `Device(name) { ... }`.
    Device { end: usize, name: AmlName },
    /// `Processor(name, id, pblk, pblk_len) { ... }`.
    Processor {
        end: usize,
        name: AmlName,
        proc_id: u8,
        pblk_address: u32,
        pblk_len: u8,
    },
    /// `PowerResource(name, level, order) { ... }`.
    PowerResource {
        end: usize,
        name: AmlName,
        system_level: u8,
        resource_order: u16,
    },
    /// `ThermalZone(name) { ... }`.
    ThermalZone { end: usize, name: AmlName },
    /// `Mutex(name, sync_level)`.
    Mutex { name: AmlName, sync_level: u8 },
    /// `Event(name)`.
    Event { name: AmlName },
    /// `OperationRegion(name, space, ...)`; offset and length TermArgs follow.
    OpRegion { name: AmlName, space: RegionSpace },
    /// `DataTableRegion(name, ...)`; three TermArgs follow.
    DataRegion { name: AmlName },
    /// `Field(region, flags) { ... }`; field elements follow up to `end`.
    Field {
        end: usize,
        region: AmlName,
        flags: FieldFlags,
    },
    /// `IndexField(index, data, flags) { ... }`.
    IndexField {
        end: usize,
        index: AmlName,
        data: AmlName,
        flags: FieldFlags,
    },
    /// `BankField(region, bank, ...)`; a BankValue TermArg, a flags byte and
    /// the field elements follow.
    BankField {
        end: usize,
        region: AmlName,
        bank: AmlName,
    },

    /// `If (predicate) { ... }`.
    If { end: usize },
    /// `Else { ... }`.
    Else { end: usize },
    /// `While (predicate) { ... }`.
    While { end: usize },
    /// `Break`.
    Break,
    /// `Continue`.
    Continue,
    /// `Noop`.
    Noop,
    /// `BreakPoint`.
    BreakPoint,
    /// `Return(value)`; the value TermArg follows.
    Return,
    /// `Fatal(type, code, arg)`; the arg TermArg follows.
    Fatal { fatal_type: u8, code: u32 },

    /// Any operator whose operands are further terms.
    Op(Opcode),
}

/// Method flags byte: argument count, serialization and sync level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodFlags(pub u8);

impl MethodFlags {
    /// Declared argument count (0-7).
    #[must_use]
    pub fn arg_count(self) -> u8 {
        self.0 & 0x07
    }

    /// Whether the method is `Serialized`.
    #[must_use]
    pub fn serialized(self) -> bool {
        self.0 & 0x08 != 0
    }

    /// Sync level for serialized methods (0-15).
    #[must_use]
    pub fn sync_level(self) -> u8 {
        self.0 >> 4
    }
}

/// A decoded PkgLength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PkgLength {
    /// The encoded value. For packages it counts the length bytes themselves.
    pub value: usize,
    /// Number of bytes the encoding occupied (1-4).
    pub encoded_len: usize,
}

/// One element of a `FieldList`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldElement {
    /// A named field unit of `bits` bits.
    Named { name: NameSeg, bits: usize },
    /// An unnamed gap of `bits` bits.
    Reserved { bits: usize },
    /// Changes the access type (and attributes) for following elements.
    Access { flags: FieldFlags, attrib: u8 },
    /// Extended access attributes; treated like [`FieldElement::Access`].
    ExtendedAccess {
        flags: FieldFlags,
        attrib: u8,
        length: u8,
    },
    /// A `Connection` element (serial bus / GPIO); carries no layout.
    Connection,
}

fn error(r: &BinaryReader<'_>, kind: ParseErrorKind) -> AmlError {
    AmlError::Parse {
        offset: r.position(),
        kind,
    }
}

fn truncated(r: &BinaryReader<'_>) -> AmlError {
    error(r, ParseErrorKind::UnexpectedEnd)
}

/// Reads one byte or fails with [`ParseErrorKind::UnexpectedEnd`].
pub fn read_byte(r: &mut BinaryReader<'_>) -> Result<u8, AmlError> {
    r.read_u8().ok_or_else(|| truncated(r))
}

/// Reads a little-endian word or fails with [`ParseErrorKind::UnexpectedEnd`].
pub fn read_word(r: &mut BinaryReader<'_>) -> Result<u16, AmlError> {
    r.read_u16().ok_or_else(|| truncated(r))
}

fn read_dword(r: &mut BinaryReader<'_>) -> Result<u32, AmlError> {
    r.read_u32().ok_or_else(|| truncated(r))
}

fn read_qword(r: &mut BinaryReader<'_>) -> Result<u64, AmlError> {
    r.read_u64().ok_or_else(|| truncated(r))
}

// ─── PkgLength ─────────────────────────────────────────────────────────────

/// Decode an ACPI PkgLength field (1-4 bytes).
///
/// The lead byte's top two bits give the number of following bytes. With no
/// following bytes the low six bits are the value; otherwise the low nibble
/// is the least significant nibble and each following byte supplies the
/// next eight bits. Bits 4-5 of a multi-byte lead must be zero.
pub fn parse_pkg_length(r: &mut BinaryReader<'_>) -> Result<PkgLength, AmlError> {
    let start = r.position();
    let lead = read_byte(r)?;
    let follow = usize::from(lead >> 6);

    if follow == 0 {
        return Ok(PkgLength {
            value: usize::from(lead & 0x3F),
            encoded_len: 1,
        });
    }

    if lead & 0x30 != 0 {
        return Err(AmlError::Parse {
            offset: start,
            kind: ParseErrorKind::InvalidPkgLength,
        });
    }

    let mut value = usize::from(lead & 0x0F);
    for i in 0..follow {
        let b = read_byte(r)?;
        value |= usize::from(b) << (4 + i * 8);
    }

    Ok(PkgLength {
        value,
        encoded_len: 1 + follow,
    })
}

/// Decode a PkgLength that delimits a package and return the absolute end
/// offset of the package.
///
/// The package starts at the first byte of the PkgLength encoding. The end
/// must not precede the bytes already consumed and must not exceed the
/// reader's limit.
pub fn parse_package_end(r: &mut BinaryReader<'_>) -> Result<usize, AmlError> {
    let start = r.position();
    let pkg = parse_pkg_length(r)?;
    let end = start
        .checked_add(pkg.value)
        .ok_or(AmlError::Parse {
            offset: start,
            kind: ParseErrorKind::InvalidPkgLength,
        })?;
    if end < r.position() {
        return Err(AmlError::Parse {
            offset: start,
            kind: ParseErrorKind::InvalidPkgLength,
        });
    }
    if end > r.end() {
        return Err(AmlError::Parse {
            offset: start,
            kind: ParseErrorKind::UnexpectedEnd,
        });
    }
    Ok(end)
}

/// Encode `value` as a PkgLength using the smallest width that can hold it.
///
/// Returns the encoded bytes and how many of them are used, or `None` if the
/// value exceeds [`MAX_PKG_LENGTH`].
#[must_use]
pub fn encode_pkg_length(value: usize) -> Option<([u8; 4], usize)> {
    let mut bytes = [0u8; 4];
    let size = match value {
        0..=0x3F => 1,
        0x40..=0xFFF => 2,
        0x1000..=0xF_FFFF => 3,
        0x10_0000..=MAX_PKG_LENGTH => 4,
        _ => return None,
    };
    if size == 1 {
        bytes[0] = value as u8;
        return Some((bytes, 1));
    }
    bytes[0] = (((size - 1) as u8) << 6) | (value & 0x0F) as u8;
    for (i, byte) in bytes.iter_mut().enumerate().take(size).skip(1) {
        *byte = ((value >> (4 + (i - 1) * 8)) & 0xFF) as u8;
    }
    Some((bytes, size))
}

// ─── Names ─────────────────────────────────────────────────────────────────

/// Returns `true` if `b` can start a NameString.
#[must_use]
pub fn is_name_string_lead(b: u8) -> bool {
    is_lead_name_char(b)
        || matches!(
            b,
            ROOT_PREFIX | PARENT_PREFIX | DUAL_NAME_PREFIX | MULTI_NAME_PREFIX
        )
}

/// Read a single 4-byte NameSeg.
pub fn parse_name_seg(r: &mut BinaryReader<'_>) -> Result<NameSeg, AmlError> {
    let start = r.position();
    let bytes = r.read_bytes(4).ok_or_else(|| truncated(r))?;
    NameSeg::from_bytes(bytes).ok_or(AmlError::Parse {
        offset: start,
        kind: ParseErrorKind::InvalidName,
    })
}

/// Read a full NameString: optional `\` or `^` prefixes, then a NullName,
/// single segment, DualNamePath or MultiNamePath.
pub fn parse_name_string(r: &mut BinaryReader<'_>) -> Result<AmlName, AmlError> {
    let mut root = false;
    let mut parents = 0;

    match r.peek().ok_or_else(|| truncated(r))? {
        ROOT_PREFIX => {
            r.skip(1);
            root = true;
        }
        PARENT_PREFIX => {
            while r.peek() == Some(PARENT_PREFIX) {
                r.skip(1);
                parents += 1;
            }
        }
        _ => {}
    }

    let mut segments = Vec::new();
    match r.peek().ok_or_else(|| truncated(r))? {
        NULL_NAME => {
            r.skip(1);
        }
        DUAL_NAME_PREFIX => {
            r.skip(1);
            segments.push(parse_name_seg(r)?);
            segments.push(parse_name_seg(r)?);
        }
        MULTI_NAME_PREFIX => {
            r.skip(1);
            let count = read_byte(r)?;
            for _ in 0..count {
                segments.push(parse_name_seg(r)?);
            }
        }
        b if is_lead_name_char(b) => segments.push(parse_name_seg(r)?),
        _ => return Err(error(r, ParseErrorKind::InvalidName)),
    }

    Ok(AmlName::new(root, parents, segments))
}

/// Read a null-terminated string constant body (after the `0x0D` prefix).
pub fn parse_string_const<'a>(r: &mut BinaryReader<'a>) -> Result<&'a [u8], AmlError> {
    let rest = r.remaining();
    let len = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| error(r, ParseErrorKind::UnterminatedString))?;
    let s = r.read_bytes(len).ok_or_else(|| truncated(r))?;
    r.skip(1);
    Ok(s)
}

// ─── Terms ─────────────────────────────────────────────────────────────────

/// Decode one term header starting at the reader's position.
pub fn decode_term<'a>(r: &mut BinaryReader<'a>) -> Result<Term<'a>, AmlError> {
    let start = r.position();
    let op = r.peek().ok_or_else(|| truncated(r))?;

    if is_name_string_lead(op) {
        return Ok(Term::NameRef(parse_name_string(r)?));
    }

    r.skip(1);
    let term = match op {
        ZERO_OP => Term::Integer(0),
        ONE_OP => Term::Integer(1),
        ONES_OP => Term::Ones,
        BYTE_PREFIX => Term::Integer(u64::from(read_byte(r)?)),
        WORD_PREFIX => Term::Integer(u64::from(read_word(r)?)),
        DWORD_PREFIX => Term::Integer(u64::from(read_dword(r)?)),
        QWORD_PREFIX => Term::Integer(read_qword(r)?),
        STRING_PREFIX => Term::String(parse_string_const(r)?),
        ALIAS_OP => Term::Alias {
            source: parse_name_string(r)?,
            alias: parse_name_string(r)?,
        },
        NAME_OP => Term::Name {
            name: parse_name_string(r)?,
        },
        SCOPE_OP => {
            let end = parse_package_end(r)?;
            let mut body = sub(r, end)?;
            let name = parse_name_string(&mut body)?;
            r.seek(body.position());
            Term::Scope { end, name }
        }
        BUFFER_OP => Term::Buffer {
            end: parse_package_end(r)?,
        },
        PACKAGE_OP => {
            let end = parse_package_end(r)?;
            let mut body = sub(r, end)?;
            let count = read_byte(&mut body)?;
            r.seek(body.position());
            Term::Package { end, count }
        }
        VAR_PACKAGE_OP => Term::VarPackage {
            end: parse_package_end(r)?,
        },
        METHOD_OP => {
            let end = parse_package_end(r)?;
            let mut body = sub(r, end)?;
            let name = parse_name_string(&mut body)?;
            let flags = MethodFlags(read_byte(&mut body)?);
            r.seek(body.position());
            Term::Method { end, name, flags }
        }
        EXTERNAL_OP => Term::External {
            name: parse_name_string(r)?,
            object_type: read_byte(r)?,
            arg_count: read_byte(r)?,
        },
        LOCAL0_OP..=LOCAL7_OP => Term::Local(op - LOCAL0_OP),
        ARG0_OP..=ARG6_OP => Term::Arg(op - ARG0_OP),
        IF_OP => Term::If {
            end: parse_package_end(r)?,
        },
        ELSE_OP => Term::Else {
            end: parse_package_end(r)?,
        },
        WHILE_OP => Term::While {
            end: parse_package_end(r)?,
        },
        NOOP_OP => Term::Noop,
        RETURN_OP => Term::Return,
        BREAK_OP => Term::Break,
        CONTINUE_OP => Term::Continue,
        BREAK_POINT_OP => Term::BreakPoint,
        EXT_OP_PREFIX => decode_extended(r, start)?,
        other => match Opcode::from_base(other) {
            Some(op) => Term::Op(op),
            None => {
                return Err(AmlError::Parse {
                    offset: start,
                    kind: ParseErrorKind::UnknownOpcode(u16::from(other)),
                });
            }
        },
    };
    Ok(term)
}

fn sub<'a>(r: &BinaryReader<'a>, end: usize) -> Result<BinaryReader<'a>, AmlError> {
    r.sub(end).ok_or_else(|| error(r, ParseErrorKind::InvalidPkgLength))
}

fn decode_extended<'a>(r: &mut BinaryReader<'a>, start: usize) -> Result<Term<'a>, AmlError> {
    let ext = read_byte(r)?;
    let term = match ext {
        MUTEX_OP => Term::Mutex {
            name: parse_name_string(r)?,
            sync_level: read_byte(r)? & 0x0F,
        },
        EVENT_OP => Term::Event {
            name: parse_name_string(r)?,
        },
        REVISION_OP => Term::Revision,
        DEBUG_OP => Term::Debug,
        FATAL_OP => Term::Fatal {
            fatal_type: read_byte(r)?,
            code: read_dword(r)?,
        },
        OP_REGION_OP => Term::OpRegion {
            name: parse_name_string(r)?,
            space: RegionSpace::from(read_byte(r)?),
        },
        DATA_REGION_OP => Term::DataRegion {
            name: parse_name_string(r)?,
        },
        FIELD_OP => {
            let end = parse_package_end(r)?;
            let mut body = sub(r, end)?;
            let region = parse_name_string(&mut body)?;
            let flags = FieldFlags(read_byte(&mut body)?);
            r.seek(body.position());
            Term::Field { end, region, flags }
        }
        INDEX_FIELD_OP => {
            let end = parse_package_end(r)?;
            let mut body = sub(r, end)?;
            let index = parse_name_string(&mut body)?;
            let data = parse_name_string(&mut body)?;
            let flags = FieldFlags(read_byte(&mut body)?);
            r.seek(body.position());
            Term::IndexField {
                end,
                index,
                data,
                flags,
            }
        }
        BANK_FIELD_OP => {
            let end = parse_package_end(r)?;
            let mut body = sub(r, end)?;
            let region = parse_name_string(&mut body)?;
            let bank = parse_name_string(&mut body)?;
            r.seek(body.position());
            Term::BankField { end, region, bank }
        }
        DEVICE_OP => {
            let end = parse_package_end(r)?;
            let mut body = sub(r, end)?;
            let name = parse_name_string(&mut body)?;
            r.seek(body.position());
            Term::Device { end, name }
        }
        PROCESSOR_OP => {
            let end = parse_package_end(r)?;
            let mut body = sub(r, end)?;
            let name = parse_name_string(&mut body)?;
            let proc_id = read_byte(&mut body)?;
            let pblk_address = read_dword(&mut body)?;
            let pblk_len = read_byte(&mut body)?;
            r.seek(body.position());
            Term::Processor {
                end,
                name,
                proc_id,
                pblk_address,
                pblk_len,
            }
        }
        POWER_RES_OP => {
            let end = parse_package_end(r)?;
            let mut body = sub(r, end)?;
            let name = parse_name_string(&mut body)?;
            let system_level = read_byte(&mut body)?;
            let resource_order = read_word(&mut body)?;
            r.seek(body.position());
            Term::PowerResource {
                end,
                name,
                system_level,
                resource_order,
            }
        }
        THERMAL_ZONE_OP => {
            let end = parse_package_end(r)?;
            let mut body = sub(r, end)?;
            let name = parse_name_string(&mut body)?;
            r.seek(body.position());
            Term::ThermalZone { end, name }
        }
        other => match Opcode::from_extended(other) {
            Some(op) => Term::Op(op),
            None => {
                return Err(AmlError::Parse {
                    offset: start,
                    kind: ParseErrorKind::UnknownOpcode(
                        u16::from(EXT_OP_PREFIX) << 8 | u16::from(other),
                    ),
                });
            }
        },
    };
    Ok(term)
}

/// Decode one element of a `FieldList`.
pub fn decode_field_element(r: &mut BinaryReader<'_>) -> Result<FieldElement, AmlError> {
    let lead = r.peek().ok_or_else(|| truncated(r))?;
    match lead {
        RESERVED_FIELD => {
            r.skip(1);
            let bits = parse_pkg_length(r)?.value;
            Ok(FieldElement::Reserved { bits })
        }
        ACCESS_FIELD => {
            r.skip(1);
            let flags = FieldFlags(read_byte(r)?);
            let attrib = read_byte(r)?;
            Ok(FieldElement::Access { flags, attrib })
        }
        CONNECT_FIELD => {
            r.skip(1);
            if r.peek() == Some(BUFFER_OP) {
                r.skip(1);
                let end = parse_package_end(r)?;
                r.seek(end);
            } else {
                parse_name_string(r)?;
            }
            Ok(FieldElement::Connection)
        }
        EXTENDED_ACCESS_FIELD => {
            r.skip(1);
            let flags = FieldFlags(read_byte(r)?);
            let attrib = read_byte(r)?;
            let length = read_byte(r)?;
            Ok(FieldElement::ExtendedAccess {
                flags,
                attrib,
                length,
            })
        }
        b if is_lead_name_char(b) => {
            let name = parse_name_seg(r)?;
            let bits = parse_pkg_length(r)?.value;
            Ok(FieldElement::Named { name, bits })
        }
        other => Err(error(r, ParseErrorKind::InvalidFieldElement(other))),
    }
}
