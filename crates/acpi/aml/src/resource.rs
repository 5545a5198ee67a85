//! Resource template decoder.
//!
//! Decodes the byte-encoded resource descriptors returned by `_CRS`, `_PRS`
//! and friends. Small descriptors carry their length in the tag byte; large
//! descriptors follow the tag with a 16-bit length (ACPI 6.5 §6.4).

extern crate alloc;

use alloc::vec::Vec;

use crate::reader::BinaryReader;
use crate::{AmlError, ParseErrorKind};

const SMALL_IRQ: u8 = 0x04;
const SMALL_DMA: u8 = 0x05;
const SMALL_START_DEPENDENT: u8 = 0x06;
const SMALL_END_DEPENDENT: u8 = 0x07;
const SMALL_IO: u8 = 0x08;
const SMALL_FIXED_IO: u8 = 0x09;
const SMALL_VENDOR: u8 = 0x0E;
const SMALL_END_TAG: u8 = 0x0F;

const LARGE_MEMORY24: u8 = 0x01;
const LARGE_VENDOR: u8 = 0x04;
const LARGE_MEMORY32: u8 = 0x05;
const LARGE_FIXED_MEMORY32: u8 = 0x06;
const LARGE_DWORD_ADDRESS: u8 = 0x07;
const LARGE_WORD_ADDRESS: u8 = 0x08;
const LARGE_EXTENDED_IRQ: u8 = 0x09;
const LARGE_QWORD_ADDRESS: u8 = 0x0A;

/// What an address space descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    /// Memory range; `type_flags` bit 0 is the read-write bit.
    Memory,
    /// I/O port range.
    Io,
    /// PCI bus number range.
    BusNumber,
    /// Vendor-defined resource type (192-255) or a reserved value.
    Other(u8),
}

impl From<u8> for AddressKind {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Memory,
            1 => Self::Io,
            2 => Self::BusNumber,
            other => Self::Other(other),
        }
    }
}

/// A Word, DWord or QWord address space descriptor, widened to 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    /// Resource type.
    pub kind: AddressKind,
    /// Encoded width of the descriptor (16, 32 or 64).
    pub width: u8,
    /// Whether the device consumes (rather than produces) the range.
    pub consumer: bool,
    /// Type-specific flags (cacheability, read-write, ISA ranges...).
    pub type_flags: u8,
    /// Address decode granularity mask.
    pub granularity: u64,
    /// Minimum base address.
    pub min: u64,
    /// Maximum base address.
    pub max: u64,
    /// Offset from the secondary to the primary side of a bridge.
    pub translation: u64,
    /// Length of the range.
    pub length: u64,
}

impl AddressSpace {
    /// Whether a memory range is writable.
    #[must_use]
    pub fn writable(&self) -> bool {
        self.kind == AddressKind::Memory && self.type_flags & 0x01 != 0
    }
}

/// A decoded resource descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// Legacy IRQ descriptor (small tag 0x04).
    Irq {
        /// Every IRQ set in the 16-bit mask, ascending.
        irqs: Vec<u8>,
        /// Edge-triggered (vs level-triggered).
        edge_triggered: bool,
        /// Active-low (vs active-high).
        active_low: bool,
        /// Shareable with other devices.
        shared: bool,
        /// Capable of waking the system.
        wake_capable: bool,
    },
    /// DMA descriptor (small tag 0x05).
    Dma {
        /// Every channel set in the 8-bit mask, ascending.
        channels: Vec<u8>,
        /// Bus master capable.
        bus_master: bool,
        /// Channel speed: 0 compatibility, 1 type A, 2 type B, 3 type F.
        speed: u8,
        /// Transfer width: 0 8-bit, 1 8- and 16-bit, 2 16-bit.
        transfer_width: u8,
    },
    /// Start of a dependent function set.
    StartDependent {
        /// Compatibility/performance priority byte, if present.
        priority: Option<u8>,
    },
    /// End of the dependent function sets.
    EndDependent,
    /// Variable I/O port range (small tag 0x08).
    Io {
        /// Full 16-bit decode (vs 10-bit ISA decode).
        decodes_16bit: bool,
        /// Minimum base port.
        min: u16,
        /// Maximum base port.
        max: u16,
        /// Base alignment.
        alignment: u8,
        /// Number of ports.
        length: u8,
    },
    /// Fixed I/O port range (small tag 0x09).
    FixedIo {
        /// Base port (10-bit decode).
        base: u16,
        /// Number of ports.
        length: u8,
    },
    /// Vendor-defined data, small or large.
    Vendor(Vec<u8>),
    /// 24-bit memory range (large tag 0x01), in bytes.
    Memory24 {
        /// Writable.
        writable: bool,
        /// Minimum base address.
        min: u32,
        /// Maximum base address.
        max: u32,
        /// Base alignment (0 encodes 64 KiB).
        alignment: u32,
        /// Length of the range.
        length: u32,
    },
    /// 32-bit memory range (large tag 0x05).
    Memory32 {
        /// Writable.
        writable: bool,
        /// Minimum base address.
        min: u32,
        /// Maximum base address.
        max: u32,
        /// Base alignment.
        alignment: u32,
        /// Length of the range.
        length: u32,
    },
    /// 32-bit fixed memory range (large tag 0x06).
    FixedMemory32 {
        /// Writable.
        writable: bool,
        /// Base address.
        base: u32,
        /// Length of the range.
        length: u32,
    },
    /// Word, DWord or QWord address space (large tags 0x08, 0x07, 0x0A).
    Address(AddressSpace),
    /// Extended interrupt descriptor (large tag 0x09).
    ExtendedIrq {
        /// Global System Interrupts.
        interrupts: Vec<u32>,
        /// Consumed by the device (vs produced for children).
        consumer: bool,
        /// Edge-triggered.
        edge_triggered: bool,
        /// Active-low.
        active_low: bool,
        /// Shareable.
        shared: bool,
        /// Capable of waking the system.
        wake_capable: bool,
    },
}

/// Iterator over the descriptors in a resource template.
///
/// Yields one `Err` and then stops on malformed input. Iteration ends at the
/// End Tag; running out of bytes first is an error.
#[derive(Clone)]
pub struct ResourceIter<'a> {
    r: BinaryReader<'a>,
    done: bool,
}

impl<'a> ResourceIter<'a> {
    /// Iterate over the descriptors in `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            r: BinaryReader::new(data),
            done: false,
        }
    }

    /// Splits off the body of the descriptor starting at the current
    /// position, `len` bytes long.
    fn body(&mut self, len: usize) -> Result<BinaryReader<'a>, AmlError> {
        let start = self.r.position();
        let end = start + len;
        let body = self
            .r
            .sub(end)
            .ok_or_else(|| parse_error(start, ParseErrorKind::UnexpectedEnd))?;
        self.r.seek(end);
        Ok(body)
    }

    /// Decode the next known descriptor. `Ok(None)` means an unknown
    /// descriptor was skipped or the End Tag was reached.
    fn next_descriptor(&mut self) -> Result<Option<Resource>, AmlError> {
        let offset = self.r.position();
        let tag = self
            .r
            .read_u8()
            .ok_or_else(|| parse_error(offset, ParseErrorKind::UnexpectedEnd))?;

        if tag & 0x80 == 0 {
            let kind = (tag >> 3) & 0x0F;
            let mut body = self.body(usize::from(tag & 0x07))?;
            if kind == SMALL_END_TAG {
                self.done = true;
                return Ok(None);
            }
            parse_small(kind, &mut body)
                .ok_or_else(|| parse_error(offset, ParseErrorKind::InvalidResource))
        } else {
            let len = self
                .r
                .read_u16()
                .ok_or_else(|| parse_error(offset, ParseErrorKind::UnexpectedEnd))?;
            let mut body = self.body(usize::from(len))?;
            parse_large(tag & 0x7F, &mut body)
                .ok_or_else(|| parse_error(offset, ParseErrorKind::InvalidResource))
        }
    }
}

impl Iterator for ResourceIter<'_> {
    type Item = Result<Resource, AmlError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.next_descriptor() {
                Ok(Some(resource)) => return Some(Ok(resource)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

fn parse_error(offset: usize, kind: ParseErrorKind) -> AmlError {
    AmlError::Parse { offset, kind }
}

/// Indices of the set bits in `mask`, ascending.
fn set_bits(mask: u16) -> Vec<u8> {
    (0..16u8).filter(|i| mask & (1 << i) != 0).collect()
}

/// A known small descriptor. `Some(None)` for types that are skipped, `None`
/// when the body is too short for its type.
fn parse_small(kind: u8, body: &mut BinaryReader<'_>) -> Option<Option<Resource>> {
    let len = body.remaining().len();
    let resource = match kind {
        SMALL_IRQ => {
            let mask = body.read_u16()?;
            let (edge_triggered, active_low, shared, wake_capable) = match body.read_u8() {
                Some(flags) => (
                    flags & 0x01 != 0,
                    flags & 0x08 != 0,
                    flags & 0x10 != 0,
                    flags & 0x20 != 0,
                ),
                // Without a flags byte: edge-triggered, active-high, exclusive.
                None => (true, false, false, false),
            };
            Resource::Irq {
                irqs: set_bits(mask),
                edge_triggered,
                active_low,
                shared,
                wake_capable,
            }
        }
        SMALL_DMA => {
            let mask = body.read_u8()?;
            let flags = body.read_u8()?;
            Resource::Dma {
                channels: set_bits(u16::from(mask)),
                bus_master: flags & 0x04 != 0,
                speed: (flags >> 5) & 0x03,
                transfer_width: flags & 0x03,
            }
        }
        SMALL_START_DEPENDENT => Resource::StartDependent {
            priority: body.read_u8(),
        },
        SMALL_END_DEPENDENT => Resource::EndDependent,
        SMALL_IO => {
            let info = body.read_u8()?;
            Resource::Io {
                decodes_16bit: info & 0x01 != 0,
                min: body.read_u16()?,
                max: body.read_u16()?,
                alignment: body.read_u8()?,
                length: body.read_u8()?,
            }
        }
        SMALL_FIXED_IO => Resource::FixedIo {
            base: body.read_u16()? & 0x03FF,
            length: body.read_u8()?,
        },
        SMALL_VENDOR => Resource::Vendor(body.read_bytes(len)?.to_vec()),
        _ => return Some(None),
    };
    Some(Some(resource))
}

/// A known large descriptor; see [`parse_small`] for the return convention.
fn parse_large(kind: u8, body: &mut BinaryReader<'_>) -> Option<Option<Resource>> {
    let len = body.remaining().len();
    let resource = match kind {
        LARGE_MEMORY24 => {
            let info = body.read_u8()?;
            Resource::Memory24 {
                writable: info & 0x01 != 0,
                min: u32::from(body.read_u16()?) << 8,
                max: u32::from(body.read_u16()?) << 8,
                alignment: u32::from(body.read_u16()?),
                length: u32::from(body.read_u16()?) << 8,
            }
        }
        LARGE_VENDOR => Resource::Vendor(body.read_bytes(len)?.to_vec()),
        LARGE_MEMORY32 => {
            let info = body.read_u8()?;
            Resource::Memory32 {
                writable: info & 0x01 != 0,
                min: body.read_u32()?,
                max: body.read_u32()?,
                alignment: body.read_u32()?,
                length: body.read_u32()?,
            }
        }
        LARGE_FIXED_MEMORY32 => {
            let info = body.read_u8()?;
            Resource::FixedMemory32 {
                writable: info & 0x01 != 0,
                base: body.read_u32()?,
                length: body.read_u32()?,
            }
        }
        LARGE_WORD_ADDRESS => parse_address(body, 16, |b| b.read_u16().map(u64::from))?,
        LARGE_DWORD_ADDRESS => parse_address(body, 32, |b| b.read_u32().map(u64::from))?,
        LARGE_QWORD_ADDRESS => parse_address(body, 64, |b| b.read_u64())?,
        LARGE_EXTENDED_IRQ => {
            let flags = body.read_u8()?;
            let count = body.read_u8()?;
            let interrupts = (0..count)
                .map(|_| body.read_u32())
                .collect::<Option<Vec<_>>>()?;
            Resource::ExtendedIrq {
                interrupts,
                consumer: flags & 0x01 != 0,
                edge_triggered: flags & 0x02 != 0,
                active_low: flags & 0x04 != 0,
                shared: flags & 0x08 != 0,
                wake_capable: flags & 0x10 != 0,
            }
        }
        _ => return Some(None),
    };
    Some(Some(resource))
}

fn parse_address(
    body: &mut BinaryReader<'_>,
    width: u8,
    read: impl Fn(&mut BinaryReader<'_>) -> Option<u64>,
) -> Option<Resource> {
    let kind = AddressKind::from(body.read_u8()?);
    let general = body.read_u8()?;
    let type_flags = body.read_u8()?;
    Some(Resource::Address(AddressSpace {
        kind,
        width,
        consumer: general & 0x01 != 0,
        type_flags,
        granularity: read(body)?,
        min: read(body)?,
        max: read(body)?,
        translation: read(body)?,
        length: read(body)?,
    }))
}

/// Decode a whole resource template.
///
/// Unknown descriptor types are skipped.
///
/// # Errors
///
/// [`AmlError::Parse`] if a descriptor is truncated or shorter than its
/// type requires, or the template has no End Tag.
pub fn decode_resource_template(data: &[u8]) -> Result<Vec<Resource>, AmlError> {
    ResourceIter::new(data).collect()
}
