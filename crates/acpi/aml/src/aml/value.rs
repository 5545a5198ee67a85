//! AML objects.
//!
//! [`Object`] is the value held by every namespace node, local, argument and
//! package element. Buffers and packages are reference-counted behind a
//! lock so that `Index` references and buffer fields can alias their storage;
//! copying semantics (for `Store` and argument passing) are explicit through
//! [`Object::deep_copy`].

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use spin::RwLock;

use crate::AmlError;
use crate::aml::field::{FieldUnit, OpRegion};
use crate::aml::namespace::NodeHandle;
use crate::aml::sync::{AmlEvent, AmlMutex};

/// Shared, mutable buffer storage.
pub type SharedBuffer = Arc<RwLock<Vec<u8>>>;

/// Shared, mutable package storage.
pub type SharedPackage = Arc<RwLock<Vec<Object>>>;

/// Callback implementing a method in Rust rather than AML.
pub type NativeMethod = Arc<dyn Fn(&[Object]) -> Result<Object, AmlError> + Send + Sync>;

/// Integer width in effect for a table and every method it defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegerWidth {
    /// Revision 1 tables: integers wrap at 32 bits.
    Bits32,
    /// Revision 2+ tables.
    #[default]
    Bits64,
}

impl IntegerWidth {
    /// All-ones value (`Ones`).
    #[must_use]
    pub const fn ones(self) -> u64 {
        match self {
            Self::Bits32 => 0xFFFF_FFFF,
            Self::Bits64 => u64::MAX,
        }
    }

    /// Truncates `value` to this width.
    #[must_use]
    pub const fn truncate(self, value: u64) -> u64 {
        value & self.ones()
    }

    /// Width in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }
}

/// ACPI object type codes, as returned by `ObjectType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// 0
    Uninitialized,
    /// 1
    Integer,
    /// 2
    String,
    /// 3
    Buffer,
    /// 4
    Package,
    /// 5
    FieldUnit,
    /// 6
    Device,
    /// 7
    Event,
    /// 8
    Method,
    /// 9
    Mutex,
    /// 10
    OperationRegion,
    /// 11
    PowerResource,
    /// 12
    Processor,
    /// 13
    ThermalZone,
    /// 14
    BufferField,
    /// 16
    Debug,
    /// An object reference (`RefOf`, `Index`).
    Reference,
}

impl ObjectType {
    /// The numeric code `ObjectType` reports.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Uninitialized | Self::Reference => 0,
            Self::Integer => 1,
            Self::String => 2,
            Self::Buffer => 3,
            Self::Package => 4,
            Self::FieldUnit => 5,
            Self::Device => 6,
            Self::Event => 7,
            Self::Method => 8,
            Self::Mutex => 9,
            Self::OperationRegion => 10,
            Self::PowerResource => 11,
            Self::Processor => 12,
            Self::ThermalZone => 13,
            Self::BufferField => 14,
            Self::Debug => 16,
        }
    }
}

/// Where a method's code comes from.
#[derive(Clone)]
pub enum MethodBody {
    /// Unparsed AML bytes `table[start..end]`.
    Aml {
        /// The whole table the method was defined in.
        table: Arc<[u8]>,
        /// Absolute offset of the first body byte.
        start: usize,
        /// Absolute offset one past the last body byte.
        end: usize,
    },
    /// A method provided by the interpreter itself (e.g. `_OSI`).
    Native(NativeMethod),
}

/// A control method.
#[derive(Clone)]
pub struct Method {
    /// Declared argument count (0-7).
    pub arg_count: u8,
    /// Whether invocations are serialized through an implicit mutex.
    pub serialized: bool,
    /// Sync level of the implicit mutex.
    pub sync_level: u8,
    /// Integer width of the defining table.
    pub width: IntegerWidth,
    /// The code to run.
    pub body: MethodBody,
    /// Implicit mutex for serialized methods.
    pub serial_lock: Option<Arc<AmlMutex>>,
}

impl Method {
    /// A native method taking `arg_count` arguments.
    #[must_use]
    pub fn native(arg_count: u8, f: NativeMethod) -> Self {
        Self {
            arg_count,
            serialized: false,
            sync_level: 0,
            width: IntegerWidth::Bits64,
            body: MethodBody::Native(f),
            serial_lock: None,
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Method");
        s.field("arg_count", &self.arg_count)
            .field("serialized", &self.serialized)
            .field("sync_level", &self.sync_level);
        match &self.body {
            MethodBody::Aml { start, end, .. } => s.field("span", &(*start..*end)),
            MethodBody::Native(_) => s.field("span", &"native"),
        };
        s.finish()
    }
}

/// A reference produced by `RefOf`, `CondRefOf` or `Index`.
#[derive(Debug, Clone)]
pub enum Reference {
    /// A namespace node.
    Node(NodeHandle),
    /// One element of a package.
    Element {
        /// The package storage.
        package: SharedPackage,
        /// Element index.
        index: usize,
    },
    /// One byte of a buffer, or of a string that is not a named object.
    BufferByte {
        /// The buffer storage.
        buffer: SharedBuffer,
        /// Byte index.
        index: usize,
    },
    /// One character of the String stored at a namespace node.
    StringByte {
        /// The node holding the string.
        node: NodeHandle,
        /// Byte index.
        index: usize,
    },
}

/// An AML object.
#[derive(Debug, Clone, Default)]
pub enum Object {
    /// No value yet.
    #[default]
    Uninitialized,
    /// An integer; its meaningful width depends on the executing table.
    Integer(u64),
    /// An ASCII string without its terminator.
    String(String),
    /// A byte buffer.
    Buffer(SharedBuffer),
    /// A fixed-length sequence of objects.
    Package(SharedPackage),
    /// A device scope.
    Device,
    /// A control method.
    Method(Arc<Method>),
    /// A synchronization mutex.
    Mutex(Arc<AmlMutex>),
    /// A counting event.
    Event(Arc<AmlEvent>),
    /// A processor declaration.
    Processor {
        /// Processor id.
        proc_id: u8,
        /// Processor block address.
        pblk_address: u32,
        /// Processor block length.
        pblk_len: u8,
    },
    /// A power resource.
    PowerResource {
        /// Deepest system sleep level the resource must stay on for.
        system_level: u8,
        /// Order relative to other power resources.
        resource_order: u16,
    },
    /// A thermal zone scope.
    ThermalZone,
    /// An operation region.
    OperationRegion(Arc<OpRegion>),
    /// A field unit over a region, or a buffer field.
    FieldUnit(Arc<FieldUnit>),
    /// An object reference.
    Reference(Reference),
    /// An alias; reads and writes go to the target node.
    Alias(NodeHandle),
}

impl Object {
    /// Wraps bytes in a new buffer.
    #[must_use]
    pub fn buffer(bytes: Vec<u8>) -> Self {
        Self::Buffer(Arc::new(RwLock::new(bytes)))
    }

    /// Wraps objects in a new package.
    #[must_use]
    pub fn package(elements: Vec<Object>) -> Self {
        Self::Package(Arc::new(RwLock::new(elements)))
    }

    /// A string object.
    #[must_use]
    pub fn string(s: &str) -> Self {
        Self::String(String::from(s))
    }

    /// Builds a string from raw AML bytes, replacing non-ASCII bytes.
    #[must_use]
    pub fn string_from_bytes(bytes: &[u8]) -> Self {
        Self::String(String::from_utf8_lossy(bytes).into_owned())
    }

    /// The object's ACPI type.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Uninitialized | Self::Alias(_) => ObjectType::Uninitialized,
            Self::Integer(_) => ObjectType::Integer,
            Self::String(_) => ObjectType::String,
            Self::Buffer(_) => ObjectType::Buffer,
            Self::Package(_) => ObjectType::Package,
            Self::Device => ObjectType::Device,
            Self::Method(_) => ObjectType::Method,
            Self::Mutex(_) => ObjectType::Mutex,
            Self::Event(_) => ObjectType::Event,
            Self::Processor { .. } => ObjectType::Processor,
            Self::PowerResource { .. } => ObjectType::PowerResource,
            Self::ThermalZone => ObjectType::ThermalZone,
            Self::OperationRegion(_) => ObjectType::OperationRegion,
            Self::FieldUnit(f) if f.is_buffer_field() => ObjectType::BufferField,
            Self::FieldUnit(_) => ObjectType::FieldUnit,
            Self::Reference(_) => ObjectType::Reference,
        }
    }

    /// Builds the [`AmlError::Type`] for this object not being `expected`.
    #[must_use]
    pub fn type_error(&self, expected: ObjectType) -> AmlError {
        AmlError::Type {
            expected,
            found: self.object_type(),
        }
    }

    /// The integer value, without any conversion.
    #[must_use]
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// The string value, without any conversion.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// A copy of the buffer contents, without any conversion.
    #[must_use]
    pub fn buffer_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Buffer(b) => Some(b.read().clone()),
            _ => None,
        }
    }

    /// A snapshot of the package elements (shallow).
    #[must_use]
    pub fn package_elements(&self) -> Option<Vec<Object>> {
        match self {
            Self::Package(p) => Some(p.read().clone()),
            _ => None,
        }
    }

    /// Duplicates buffers and packages (recursively) so the result shares no
    /// storage with `self`. Other objects are cloned by handle.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::Buffer(b) => Self::buffer(b.read().clone()),
            Self::Package(p) => Self::package(p.read().iter().map(Object::deep_copy).collect()),
            other => other.clone(),
        }
    }

    /// Whether this is a data object (Integer, String, Buffer, Package).
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            Self::Integer(_) | Self::String(_) | Self::Buffer(_) | Self::Package(_)
        )
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Uninitialized, Self::Uninitialized)
            | (Self::Device, Self::Device)
            | (Self::ThermalZone, Self::ThermalZone) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Buffer(a), Self::Buffer(b)) => {
                Arc::ptr_eq(a, b) || *a.read() == *b.read()
            }
            (Self::Package(a), Self::Package(b)) => {
                Arc::ptr_eq(a, b) || *a.read() == *b.read()
            }
            (Self::Method(a), Self::Method(b)) => Arc::ptr_eq(a, b),
            (Self::Mutex(a), Self::Mutex(b)) => Arc::ptr_eq(a, b),
            (Self::Event(a), Self::Event(b)) => Arc::ptr_eq(a, b),
            (Self::OperationRegion(a), Self::OperationRegion(b)) => Arc::ptr_eq(a, b),
            (Self::FieldUnit(a), Self::FieldUnit(b)) => Arc::ptr_eq(a, b),
            (
                Self::Processor {
                    proc_id: a,
                    pblk_address: b,
                    pblk_len: c,
                },
                Self::Processor {
                    proc_id: x,
                    pblk_address: y,
                    pblk_len: z,
                },
            ) => (a, b, c) == (x, y, z),
            (
                Self::PowerResource {
                    system_level: a,
                    resource_order: b,
                },
                Self::PowerResource {
                    system_level: x,
                    resource_order: y,
                },
            ) => (a, b) == (x, y),
            (Self::Alias(a), Self::Alias(b)) => a == b,
            (Self::Reference(Reference::Node(a)), Self::Reference(Reference::Node(b))) => a == b,
            _ => false,
        }
    }
}

impl From<u64> for Object {
    fn from(v: u64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

/// A compressed EISA/PnP device identifier.
///
/// EISA IDs are stored as 32-bit compressed values in AML bytecode
/// (via the `EisaId()` macro in ASL). The 3-letter manufacturer code
/// is packed into the upper 16 bits and the product ID into the lower 16,
/// big-endian, so the AML integer is the byte-swapped form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EisaId {
    /// The raw 32-bit value as it appears in AML.
    pub raw: u32,
}

impl EisaId {
    /// Compresses a 7-character ID such as `"PNP0A03"`.
    ///
    /// Returns `None` unless the input is three uppercase letters followed by
    /// four hex digits.
    #[must_use]
    pub fn encode(id: &str) -> Option<Self> {
        let b = id.as_bytes();
        if b.len() != 7 || !b[..3].iter().all(u8::is_ascii_uppercase) {
            return None;
        }
        let product = u16::from_str_radix(id.get(3..)?, 16).ok()?;
        let letter = |c: u8| u32::from(c - b'@') & 0x1F;
        let swapped = (letter(b[0]) << 26)
            | (letter(b[1]) << 21)
            | (letter(b[2]) << 16)
            | u32::from(product);
        Some(Self {
            raw: swapped.swap_bytes(),
        })
    }

    /// Decodes the EISA ID into a 7-character ASCII string (e.g., `"PNP0A03"`).
    #[must_use]
    pub fn decode(&self) -> [u8; 7] {
        let swapped = self.raw.swap_bytes();
        let c1 = (((swapped >> 26) & 0x1F) as u8) + b'@';
        let c2 = (((swapped >> 21) & 0x1F) as u8) + b'@';
        let c3 = (((swapped >> 16) & 0x1F) as u8) + b'@';
        let product = swapped as u16;

        let hex_digit = |nibble: u8| -> u8 {
            if nibble < 10 {
                b'0' + nibble
            } else {
                b'A' + nibble - 10
            }
        };

        [
            c1,
            c2,
            c3,
            hex_digit((product >> 12) as u8 & 0xF),
            hex_digit((product >> 8) as u8 & 0xF),
            hex_digit((product >> 4) as u8 & 0xF),
            hex_digit(product as u8 & 0xF),
        ]
    }
}

impl fmt::Display for EisaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.decode();
        f.write_str(core::str::from_utf8(&id).unwrap_or("???????"))
    }
}
