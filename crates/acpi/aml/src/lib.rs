//! `hadron-aml` --- an ACPI Machine Language interpreter.
//!
//! The crate loads DSDT/SSDT tables into a hierarchical namespace and
//! executes control methods on demand. Hardware side effects (region I/O,
//! PCI configuration, thread parking, the firmware Global Lock) are routed
//! through a caller-supplied [`Handler`], so the interpreter itself carries
//! no platform code and runs unchanged on the host for testing.
//!
//! # Usage
//!
//! ```ignore
//! let mut aml = Interpreter::new(my_handler, InterpreterConfig::default());
//! for table in [dsdt, ssdt0, ssdt1] {
//!     if let Err(e) = aml.load_table(table) {
//!         log::warn!("aml: skipping table: {e}");
//!     }
//! }
//! let sta = aml.evaluate("\\_SB.PCI0._STA", &[])?;
//! ```
//!
//! Table loading is expected to happen on one thread during boot. After
//! that, [`Interpreter::evaluate`] may be called concurrently; AML `Mutex`
//! objects are the only cross-invocation synchronization.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

pub mod aml;
pub mod handler;
pub mod reader;
pub mod resource;
pub mod sdt;

use alloc::string::String;

pub use aml::device::DeviceStatus;
pub use aml::interpreter::{IntegerFormat, Interpreter, InterpreterConfig};
pub use aml::namespace::{Namespace, NodeHandle};
pub use aml::path::{AmlName, NameSeg};
pub use aml::value::{EisaId, Object, ObjectType};
pub use handler::{AccessWidth, GlobalLock, Handler, PciAddress, RegionSpace, ThreadId};
pub use resource::{Resource, decode_resource_template};
pub use sdt::{AmlTable, SdtHeader};

/// Reasons the decoder can reject a byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    /// A read would cross the end of the enclosing span.
    #[error("unexpected end of stream")]
    UnexpectedEnd,
    /// A PkgLength had reserved bits set or pointed backwards.
    #[error("malformed package length")]
    InvalidPkgLength,
    /// The opcode is not in the base or extended table.
    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),
    /// A name segment contained characters outside `[A-Z0-9_]`.
    #[error("invalid name string")]
    InvalidName,
    /// A field list element started with an unrecognised byte.
    #[error("invalid field list element {0:#04x}")]
    InvalidFieldElement(u8),
    /// A string constant had no NUL terminator.
    #[error("unterminated string constant")]
    UnterminatedString,
    /// A term was found where a different kind was required.
    #[error("unexpected term")]
    UnexpectedTerm,
    /// A resource template descriptor was malformed.
    #[error("malformed resource descriptor")]
    InvalidResource,
}

/// Reasons a table header is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    /// Fewer than 36 bytes were supplied.
    #[error("table shorter than its header")]
    TooShort,
    /// The signature is not `DSDT`, `SSDT` or `PSDT`.
    #[error("signature {0:?} does not describe an AML table")]
    BadSignature([u8; 4]),
    /// The header's length field is smaller than the header or larger than
    /// the supplied buffer.
    #[error("header length {declared} does not fit buffer of {available} bytes")]
    BadLength {
        /// Length claimed by the header.
        declared: u32,
        /// Bytes actually supplied.
        available: usize,
    },
}

/// Failures reported by region accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    /// The access falls outside the declared region length.
    #[error("access at bit {bit_offset} (+{bit_length}) exceeds region of {region_length} bytes")]
    OutOfBounds {
        /// Bit offset of the access within the region.
        bit_offset: u64,
        /// Bit length of the access.
        bit_length: u64,
        /// Declared region length in bytes.
        region_length: u64,
    },
    /// The handler reported an I/O failure.
    #[error("backend failure in {0:?} space")]
    Backend(RegionSpace),
    /// The handler does not implement this address space.
    #[error("address space {0:?} is not supported")]
    UnsupportedSpace(RegionSpace),
    /// Region base plus access offset does not fit the address space.
    #[error("access at offset {byte_offset:#x} of a {space:?} region at {base:#x} overflows the address space")]
    AddressOverflow {
        /// Address space of the region.
        space: RegionSpace,
        /// Declared region base.
        base: u64,
        /// Byte offset of the access within the region.
        byte_offset: u64,
    },
    /// Resolving a PCI region's `_ADR`, `_BBN` or `_SEG` accessed the same
    /// region again.
    #[error("PCI address of the region depends on the region itself")]
    PciAddressCycle,
    /// The firmware Global Lock could not be taken for a locked field.
    #[error("firmware Global Lock unavailable")]
    GlobalLockUnavailable,
}

/// Errors raised while loading tables or evaluating methods.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmlError {
    /// The byte stream could not be decoded.
    #[error("parse error at offset {offset:#x}: {kind}")]
    Parse {
        /// Absolute offset into the table where decoding failed.
        offset: usize,
        /// What went wrong.
        kind: ParseErrorKind,
    },
    /// A table header failed validation.
    #[error("malformed table header: {0}")]
    MalformedTableHeader(HeaderError),
    /// A name did not resolve under the applicable search rule.
    #[error("name not found: {0}")]
    NameNotFound(String),
    /// An object of the wrong type was supplied and could not be converted.
    #[error("type error: expected {expected:?}, found {found:?}")]
    Type {
        /// Type the operation required.
        expected: ObjectType,
        /// Type actually supplied.
        found: ObjectType,
    },
    /// More arguments were passed than the method declares.
    #[error("method takes {expected} arguments, {given} given")]
    ArgumentCountMismatch {
        /// Declared argument count.
        expected: u8,
        /// Arguments supplied.
        given: usize,
    },
    /// A mutex acquisition would break sync-level ordering.
    #[error("cannot acquire sync level {requested} while holding level {held}")]
    MutexOrderViolation {
        /// Highest sync level currently held by the thread.
        held: u8,
        /// Sync level of the requested mutex.
        requested: u8,
    },
    /// An operation region access failed.
    #[error("region access failed: {0}")]
    RegionAccess(RegionError),
    /// The method executed `Fatal`.
    #[error("firmware fatal: type {fatal_type:#x}, code {code:#x}, arg {arg:#x}")]
    MethodFault {
        /// Fatal type byte.
        fatal_type: u8,
        /// Fatal code.
        code: u32,
        /// Fatal argument.
        arg: u64,
    },
    /// A scope already holds a child with this name.
    #[error("name collision: {0}")]
    NameCollision(String),
    /// `Divide` or `Mod` by zero.
    #[error("division by zero")]
    DivideByZero,
    /// `Index`, `Mid` or a buffer field reached past the end of its source.
    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// Requested index.
        index: u64,
        /// Length of the indexed object.
        length: usize,
    },
    /// `Release` of a mutex the thread does not own.
    #[error("mutex not owned by the current thread")]
    MutexNotOwned,
    /// An `Arg` slot beyond the supplied arguments was read.
    #[error("Arg{0} read before being set")]
    UninitializedArgument(u8),
    /// Method nesting exceeded the configured call depth.
    #[error("call depth limit of {0} exceeded")]
    StackExhausted(usize),
    /// The construct is recognised but not implemented.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl From<RegionError> for AmlError {
    fn from(e: RegionError) -> Self {
        Self::RegionAccess(e)
    }
}

impl From<HeaderError> for AmlError {
    fn from(e: HeaderError) -> Self {
        Self::MalformedTableHeader(e)
    }
}
