//! Operation regions and field units.
//!
//! A field unit is a bit range inside an operation region (or a buffer, for
//! `CreateXxxField`). Reads and writes are split into naturally aligned
//! accesses of the field's access width and bit-packed across unit
//! boundaries in offset order. Partial-unit writes apply the field's update
//! rule to the bits outside the field.
//!
//! Actual I/O is delegated to a [`RegionIo`] implementation, which the
//! interpreter provides on top of the kernel [`Handler`](crate::Handler).

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use super::namespace::NodeHandle;
use super::path::NameSeg;
use super::decoder::FieldElement;
use super::sync::AmlMutex;
use super::value::{IntegerWidth, Object, ObjectType, SharedBuffer};
use crate::handler::{AccessWidth, PciAddress, RegionSpace, ThreadId};
use crate::{AmlError, RegionError};

/// The flags byte of `Field`, `IndexField`, `BankField` and access elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldFlags(pub u8);

impl FieldFlags {
    /// Bits 0-3.
    #[must_use]
    pub fn access_type(self) -> AccessType {
        match self.0 & 0x0F {
            1 => AccessType::Byte,
            2 => AccessType::Word,
            3 => AccessType::DWord,
            4 => AccessType::QWord,
            5 => AccessType::Buffer,
            _ => AccessType::Any,
        }
    }

    /// Bit 4: accesses must hold the Global Lock.
    #[must_use]
    pub fn lock(self) -> bool {
        self.0 & 0x10 != 0
    }

    /// Bits 5-6.
    #[must_use]
    pub fn update_rule(self) -> UpdateRule {
        match (self.0 >> 5) & 0x03 {
            1 => UpdateRule::WriteAsOnes,
            2 => UpdateRule::WriteAsZeros,
            _ => UpdateRule::Preserve,
        }
    }

    /// The same flags with the access type replaced (for `AccessAs`).
    #[must_use]
    pub fn with_access(self, access: FieldFlags) -> Self {
        Self((self.0 & !0x0F) | (access.0 & 0x0F))
    }
}

/// Field access type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// Smallest aligned width covering the field.
    Any,
    /// 8-bit accesses.
    Byte,
    /// 16-bit accesses.
    Word,
    /// 32-bit accesses.
    DWord,
    /// 64-bit accesses.
    QWord,
    /// Buffer access (serial-bus protocols); treated as byte access.
    Buffer,
}

/// What happens to bits outside the field on a partial-unit write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRule {
    /// Read-modify-write.
    Preserve,
    /// Fill with ones.
    WriteAsOnes,
    /// Fill with zeros.
    WriteAsZeros,
}

/// An `OperationRegion`.
#[derive(Debug)]
pub struct OpRegion {
    /// Address space.
    pub space: RegionSpace,
    /// Base offset within the space.
    pub offset: u64,
    /// Length in bytes.
    pub length: u64,
    /// Scope the region was declared in; PCI regions take their address
    /// from it.
    pub scope: NodeHandle,
    /// Implicit lock for accesses to a lock-requiring region.
    pub lock: AmlMutex,
    lock_required: AtomicBool,
    pci: spin::RwLock<Option<PciAddress>>,
    /// Threads currently evaluating `_ADR`/`_BBN`/`_SEG` for this region.
    pci_resolvers: spin::Mutex<Vec<ThreadId>>,
}

impl OpRegion {
    /// A region of `length` bytes at `offset` in `space`.
    #[must_use]
    pub fn new(space: RegionSpace, offset: u64, length: u64, scope: NodeHandle) -> Self {
        Self {
            space,
            offset,
            length,
            scope,
            lock: AmlMutex::new(0),
            lock_required: AtomicBool::new(false),
            pci: spin::RwLock::new(None),
            pci_resolvers: spin::Mutex::new(Vec::new()),
        }
    }

    /// Whether some field of this region was declared with `Lock`. Every
    /// field access on the region then takes the region and Global Lock.
    #[must_use]
    pub fn lock_required(&self) -> bool {
        self.lock_required.load(Ordering::Acquire)
    }

    /// Marks the region as lock-requiring.
    pub fn require_lock(&self) {
        self.lock_required.store(true, Ordering::Release);
    }

    /// Cached PCI address, once resolved.
    #[must_use]
    pub fn pci_address(&self) -> Option<PciAddress> {
        *self.pci.read()
    }

    /// Caches the PCI address for later accesses.
    pub fn set_pci_address(&self, address: PciAddress) {
        *self.pci.write() = Some(address);
    }

    /// Records that `thread` is resolving this region's PCI address.
    ///
    /// # Errors
    ///
    /// [`RegionError::PciAddressCycle`] if `thread` is already resolving it,
    /// i.e. the address methods reached this region again.
    pub fn begin_pci_resolution(&self, thread: ThreadId) -> Result<(), AmlError> {
        let mut resolvers = self.pci_resolvers.lock();
        if resolvers.contains(&thread) {
            return Err(RegionError::PciAddressCycle.into());
        }
        resolvers.push(thread);
        Ok(())
    }

    /// Counterpart of [`OpRegion::begin_pci_resolution`].
    pub fn end_pci_resolution(&self, thread: ThreadId) {
        self.pci_resolvers.lock().retain(|t| *t != thread);
    }

    fn check_bounds(&self, byte_offset: u64, width: AccessWidth) -> Result<(), AmlError> {
        if byte_offset.saturating_add(width.bytes()) > self.length {
            return Err(RegionError::OutOfBounds {
                bit_offset: byte_offset * 8,
                bit_length: width.bits(),
                region_length: self.length,
            }
            .into());
        }
        Ok(())
    }
}

/// Unit-level I/O on a region, supplied by the interpreter.
pub trait RegionIo {
    /// Read one `width` unit at `byte_offset` from the start of `region`.
    ///
    /// # Errors
    ///
    /// Backend failures are reported as [`AmlError::RegionAccess`].
    fn read_unit(&self, region: &OpRegion, byte_offset: u64, width: AccessWidth)
    -> Result<u64, AmlError>;

    /// Write one `width` unit at `byte_offset` from the start of `region`.
    ///
    /// # Errors
    ///
    /// Backend failures are reported as [`AmlError::RegionAccess`].
    fn write_unit(
        &self,
        region: &OpRegion,
        byte_offset: u64,
        width: AccessWidth,
        value: u64,
    ) -> Result<(), AmlError>;

    /// Serialize a locked field access on `region`.
    ///
    /// # Errors
    ///
    /// [`RegionError::GlobalLockUnavailable`] if the firmware lock could not
    /// be taken; nothing is held in that case.
    fn lock_region(&self, region: &OpRegion) -> Result<(), AmlError>;

    /// End a locked field access.
    fn unlock_region(&self, region: &OpRegion);
}

/// What a field unit is backed by.
#[derive(Debug)]
pub enum FieldKind {
    /// A `Field` in an operation region.
    Region(Arc<OpRegion>),
    /// A `BankField`: `bank` is written with `value` before each access.
    Bank {
        /// The banked region.
        region: Arc<OpRegion>,
        /// The bank selector field.
        bank: Arc<FieldUnit>,
        /// Bank selector value.
        value: u64,
    },
    /// An `IndexField`: the unit offset goes to `index`, data moves through
    /// `data`.
    Index {
        /// Index register field.
        index: Arc<FieldUnit>,
        /// Data register field.
        data: Arc<FieldUnit>,
    },
    /// A buffer field created by `CreateXxxField`.
    Buffer(SharedBuffer),
}

/// A named bit range.
#[derive(Debug)]
pub struct FieldUnit {
    /// Backing storage.
    pub kind: FieldKind,
    /// Offset in bits from the start of the backing storage.
    pub bit_offset: u64,
    /// Length in bits.
    pub bit_length: u64,
    /// Declared access type.
    pub access: AccessType,
    /// Whether accesses take the region lock and Global Lock.
    pub lock: bool,
    /// Update rule for partial writes.
    pub update: UpdateRule,
    /// Integer width of the table that declared the field; reads from
    /// outside any method use it.
    pub width: IntegerWidth,
}

impl FieldUnit {
    /// A field over a buffer, byte-accessed, with `Preserve` semantics.
    #[must_use]
    pub fn buffer_field(
        buffer: SharedBuffer,
        bit_offset: u64,
        bit_length: u64,
        width: IntegerWidth,
    ) -> Self {
        Self {
            kind: FieldKind::Buffer(buffer),
            bit_offset,
            bit_length,
            access: AccessType::Byte,
            lock: false,
            update: UpdateRule::Preserve,
            width,
        }
    }

    /// Whether this is a buffer field rather than a region field.
    #[must_use]
    pub fn is_buffer_field(&self) -> bool {
        matches!(self.kind, FieldKind::Buffer(_))
    }

    pub(crate) fn lock_target(&self) -> Option<&OpRegion> {
        match &self.kind {
            FieldKind::Region(region) | FieldKind::Bank { region, .. } => Some(region),
            FieldKind::Index { index, .. } => index.lock_target(),
            FieldKind::Buffer(_) => None,
        }
    }

    fn region_length(&self) -> Option<u64> {
        match &self.kind {
            FieldKind::Region(region) | FieldKind::Bank { region, .. } => Some(region.length),
            FieldKind::Index { .. } | FieldKind::Buffer(_) => None,
        }
    }

    /// Whether the field lies entirely inside its region. Always `true` for
    /// index and buffer fields.
    #[must_use]
    pub fn fits_region(&self) -> bool {
        self.region_length().is_none_or(|len| {
            self.bit_offset.saturating_add(self.bit_length) <= len.saturating_mul(8)
        })
    }

    /// The access width actually used for each unit.
    #[must_use]
    pub fn unit_width(&self) -> AccessWidth {
        match self.access {
            AccessType::Byte | AccessType::Buffer => AccessWidth::Byte,
            AccessType::Word => AccessWidth::Word,
            AccessType::DWord => AccessWidth::DWord,
            AccessType::QWord => AccessWidth::QWord,
            AccessType::Any => {
                let end = self.bit_offset + self.bit_length.max(1) - 1;
                [
                    AccessWidth::Byte,
                    AccessWidth::Word,
                    AccessWidth::DWord,
                    AccessWidth::QWord,
                ]
                .into_iter()
                .find(|w| {
                    let unit = self.bit_offset / w.bits();
                    let fits = self
                        .region_length()
                        .is_none_or(|len| (unit + 1) * w.bytes() <= len);
                    unit == end / w.bits() && fits
                })
                .unwrap_or(AccessWidth::Byte)
            }
        }
    }

    /// Read the field. Fields no wider than the integer width read as
    /// Integer, wider ones as Buffer.
    ///
    /// # Errors
    ///
    /// Propagates region failures; buffer fields past the end of their
    /// buffer fail with [`AmlError::IndexOutOfBounds`].
    pub fn read(&self, io: &dyn RegionIo, width: IntegerWidth) -> Result<Object, AmlError> {
        let bytes = self.with_lock(io, || self.read_bytes(io))?;
        if self.bit_length <= (width.bytes() as u64) * 8 {
            let value = bytes
                .iter()
                .enumerate()
                .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (i * 8)));
            Ok(Object::Integer(value))
        } else {
            Ok(Object::buffer(bytes))
        }
    }

    /// Read the field as an integer, regardless of its width.
    ///
    /// # Errors
    ///
    /// See [`FieldUnit::read`].
    pub fn read_integer(&self, io: &dyn RegionIo) -> Result<u64, AmlError> {
        match self.read(io, IntegerWidth::Bits64)? {
            Object::Integer(v) => Ok(v),
            other => Err(other.type_error(ObjectType::Integer)),
        }
    }

    /// Write the low `bit_length` bits of `data` (little-endian,
    /// zero-extended if short) into the field.
    ///
    /// # Errors
    ///
    /// See [`FieldUnit::read`].
    pub fn write(&self, io: &dyn RegionIo, data: &[u8]) -> Result<(), AmlError> {
        self.with_lock(io, || self.write_bytes(io, data))
    }

    fn with_lock<T>(
        &self,
        io: &dyn RegionIo,
        f: impl FnOnce() -> Result<T, AmlError>,
    ) -> Result<T, AmlError> {
        let target = self
            .lock_target()
            .filter(|region| self.lock || region.lock_required());
        if let Some(region) = target {
            io.lock_region(region)?;
        }
        let result = f();
        if let Some(region) = target {
            io.unlock_region(region);
        }
        result
    }

    fn read_bytes(&self, io: &dyn RegionIo) -> Result<Vec<u8>, AmlError> {
        let mut out = vec![0u8; self.bit_length.div_ceil(8) as usize];
        if self.bit_length == 0 {
            return Ok(out);
        }
        if let FieldKind::Buffer(buffer) = &self.kind {
            let buffer = buffer.read();
            self.check_buffer(buffer.len())?;
            for i in 0..self.bit_length {
                let bit = get_bits(&buffer, self.bit_offset + i, 1);
                put_bits(&mut out, i, 1, bit);
            }
            return Ok(out);
        }

        self.select_bank(io)?;
        let width = self.unit_width();
        for (unit_offset, shift, field_pos, count) in self.units(width) {
            let raw = self.read_unit(io, unit_offset, width)?;
            put_bits(&mut out, field_pos, count, (raw >> shift) & mask(count));
        }
        Ok(out)
    }

    fn write_bytes(&self, io: &dyn RegionIo, data: &[u8]) -> Result<(), AmlError> {
        if self.bit_length == 0 {
            return Ok(());
        }
        if let FieldKind::Buffer(buffer) = &self.kind {
            let mut buffer = buffer.write();
            self.check_buffer(buffer.len())?;
            for i in 0..self.bit_length {
                let bit = get_bits(data, i, 1);
                put_bits(&mut buffer, self.bit_offset + i, 1, bit);
            }
            return Ok(());
        }

        self.select_bank(io)?;
        let width = self.unit_width();
        for (unit_offset, shift, field_pos, count) in self.units(width) {
            let bits = get_bits(data, field_pos, count);
            let value = if count == width.bits() {
                bits
            } else {
                let base = match self.update {
                    UpdateRule::Preserve => self.read_unit(io, unit_offset, width)?,
                    UpdateRule::WriteAsOnes => width.mask(),
                    UpdateRule::WriteAsZeros => 0,
                };
                let m = mask(count) << shift;
                (base & !m) | (bits << shift)
            };
            self.write_unit(io, unit_offset, width, value & width.mask())?;
        }
        Ok(())
    }

    /// Splits the field into aligned units of `width`, yielding
    /// `(unit byte offset, bit shift within unit, bit position within field,
    /// bit count)`.
    fn units(&self, width: AccessWidth) -> impl Iterator<Item = (u64, u64, u64, u64)> {
        let unit_bits = width.bits();
        let start = self.bit_offset;
        let end = self.bit_offset + self.bit_length;
        let first = start / unit_bits;
        let last = (end - 1) / unit_bits;
        (first..=last).map(move |unit| {
            let unit_start = unit * unit_bits;
            let lo = start.max(unit_start);
            let hi = end.min(unit_start + unit_bits);
            (unit * width.bytes(), lo - unit_start, lo - start, hi - lo)
        })
    }

    fn check_buffer(&self, len: usize) -> Result<(), AmlError> {
        if self.bit_offset + self.bit_length > (len as u64) * 8 {
            return Err(AmlError::IndexOutOfBounds {
                index: (self.bit_offset + self.bit_length).div_ceil(8),
                length: len,
            });
        }
        Ok(())
    }

    fn select_bank(&self, io: &dyn RegionIo) -> Result<(), AmlError> {
        if let FieldKind::Bank { bank, value, .. } = &self.kind {
            bank.write(io, &value.to_le_bytes())?;
        }
        Ok(())
    }

    fn read_unit(
        &self,
        io: &dyn RegionIo,
        byte_offset: u64,
        width: AccessWidth,
    ) -> Result<u64, AmlError> {
        match &self.kind {
            FieldKind::Region(region) | FieldKind::Bank { region, .. } => {
                region.check_bounds(byte_offset, width)?;
                io.read_unit(region, byte_offset, width)
            }
            FieldKind::Index { index, data } => {
                index.write(io, &byte_offset.to_le_bytes())?;
                Ok(data.read_integer(io)? & width.mask())
            }
            FieldKind::Buffer(_) => Err(AmlError::Unsupported("unit access to buffer field")),
        }
    }

    fn write_unit(
        &self,
        io: &dyn RegionIo,
        byte_offset: u64,
        width: AccessWidth,
        value: u64,
    ) -> Result<(), AmlError> {
        match &self.kind {
            FieldKind::Region(region) | FieldKind::Bank { region, .. } => {
                region.check_bounds(byte_offset, width)?;
                io.write_unit(region, byte_offset, width, value)
            }
            FieldKind::Index { index, data } => {
                index.write(io, &byte_offset.to_le_bytes())?;
                data.write(io, &value.to_le_bytes())
            }
            FieldKind::Buffer(_) => Err(AmlError::Unsupported("unit access to buffer field")),
        }
    }
}

/// One named field produced by walking a field list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldEntry {
    /// Field name.
    pub name: NameSeg,
    /// Bit offset from the start of the region.
    pub bit_offset: u64,
    /// Length in bits.
    pub bit_length: u64,
    /// Flags in effect for this field (after any `AccessAs`).
    pub flags: FieldFlags,
}

/// Walks a field list, tracking the running bit offset and the access type
/// changes made by `AccessAs` elements.
#[derive(Debug, Clone, Copy)]
pub struct FieldLayout {
    flags: FieldFlags,
    offset: u64,
}

impl FieldLayout {
    /// Starts a layout at bit 0 with the list's declared flags.
    #[must_use]
    pub fn new(flags: FieldFlags) -> Self {
        Self { flags, offset: 0 }
    }

    /// Applies one element, returning the named field it defines, if any.
    pub fn apply(&mut self, element: &FieldElement) -> Option<FieldEntry> {
        match *element {
            FieldElement::Named { name, bits } => {
                let entry = FieldEntry {
                    name,
                    bit_offset: self.offset,
                    bit_length: bits as u64,
                    flags: self.flags,
                };
                self.offset += bits as u64;
                Some(entry)
            }
            FieldElement::Reserved { bits } => {
                self.offset += bits as u64;
                None
            }
            FieldElement::Access { flags, .. } | FieldElement::ExtendedAccess { flags, .. } => {
                self.flags = self.flags.with_access(flags);
                None
            }
            FieldElement::Connection => None,
        }
    }
}

fn mask(bits: u64) -> u64 {
    if bits >= 64 { u64::MAX } else { (1 << bits) - 1 }
}

/// Reads `count` (at most 64) bits starting at bit `pos` of `bytes`; bits
/// past the end read as zero.
fn get_bits(bytes: &[u8], pos: u64, count: u64) -> u64 {
    let mut value = 0;
    for i in 0..count {
        let bit = pos + i;
        let byte = bytes.get((bit / 8) as usize).copied().unwrap_or(0);
        value |= u64::from((byte >> (bit % 8)) & 1) << i;
    }
    value
}

/// Writes the low `count` bits of `value` at bit `pos` of `bytes`; bits past
/// the end are dropped.
fn put_bits(bytes: &mut [u8], pos: u64, count: u64, value: u64) {
    for i in 0..count {
        let bit = pos + i;
        let Some(byte) = bytes.get_mut((bit / 8) as usize) else {
            return;
        };
        let m = 1u8 << (bit % 8);
        if (value >> i) & 1 != 0 {
            *byte |= m;
        } else {
            *byte &= !m;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aml::namespace::Namespace;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    /// Byte-addressed memory that logs every access.
    struct Memory {
        bytes: RefCell<Vec<u8>>,
        log: RefCell<Vec<(char, u64, AccessWidth)>>,
        locked: RefCell<u32>,
    }

    impl Memory {
        fn new(bytes: &[u8]) -> Self {
            Self {
                bytes: RefCell::new(bytes.to_vec()),
                log: RefCell::new(Vec::new()),
                locked: RefCell::new(0),
            }
        }
    }

    impl RegionIo for Memory {
        fn read_unit(&self, _: &OpRegion, off: u64, width: AccessWidth) -> Result<u64, AmlError> {
            self.log.borrow_mut().push(('r', off, width));
            let bytes = self.bytes.borrow();
            Ok((0..width.bytes()).fold(0, |acc, i| {
                acc | (u64::from(bytes[(off + i) as usize]) << (i * 8))
            }))
        }

        fn write_unit(
            &self,
            _: &OpRegion,
            off: u64,
            width: AccessWidth,
            value: u64,
        ) -> Result<(), AmlError> {
            self.log.borrow_mut().push(('w', off, width));
            let mut bytes = self.bytes.borrow_mut();
            for i in 0..width.bytes() {
                bytes[(off + i) as usize] = (value >> (i * 8)) as u8;
            }
            Ok(())
        }

        fn lock_region(&self, _: &OpRegion) -> Result<(), AmlError> {
            *self.locked.borrow_mut() += 1;
            Ok(())
        }
        fn unlock_region(&self, _: &OpRegion) {}
    }

    fn region(len: u64) -> Arc<OpRegion> {
        let ns = Namespace::new();
        Arc::new(OpRegion::new(RegionSpace::SystemMemory, 0, len, ns.root()))
    }

    fn field(region: Arc<OpRegion>, off: u64, len: u64, flags: u8) -> FieldUnit {
        let flags = FieldFlags(flags);
        FieldUnit {
            kind: FieldKind::Region(region),
            bit_offset: off,
            bit_length: len,
            access: flags.access_type(),
            lock: flags.lock(),
            update: flags.update_rule(),
            width: IntegerWidth::Bits64,
        }
    }

    #[test]
    fn one_locked_field_locks_the_whole_region() {
        let mem = Memory::new(&[0; 2]);
        let r = region(2);
        let plain = field(r.clone(), 0, 8, 0x01);
        plain.read(&mem, IntegerWidth::Bits64).unwrap();
        assert_eq!(*mem.locked.borrow(), 0);

        // A sibling declared with Lock marks the region.
        let locked = field(r.clone(), 8, 8, 0x01 | 0x10);
        r.require_lock();
        locked.write(&mem, &[1]).unwrap();
        plain.write(&mem, &[2]).unwrap();
        plain.read(&mem, IntegerWidth::Bits64).unwrap();
        assert_eq!(*mem.locked.borrow(), 3);
    }

    #[test]
    fn pci_resolution_detects_reentry() {
        let r = region(4);
        r.begin_pci_resolution(ThreadId(1)).unwrap();
        // Another thread may resolve concurrently; the same thread may not.
        r.begin_pci_resolution(ThreadId(2)).unwrap();
        assert_eq!(
            r.begin_pci_resolution(ThreadId(1)),
            Err(AmlError::RegionAccess(RegionError::PciAddressCycle))
        );
        r.end_pci_resolution(ThreadId(1));
        r.begin_pci_resolution(ThreadId(1)).unwrap();
    }

    #[test]
    fn twelve_bit_field_at_bit_four_byte_access() {
        let mem = Memory::new(&[0xAB, 0xCD, 0xEF]);
        let f = field(region(3), 4, 12, 0x01);

        // 0xCDAB >> 4 = 0xCDA
        assert_eq!(f.read(&mem, IntegerWidth::Bits64).unwrap(), Object::Integer(0xCDA));
        assert_eq!(
            *mem.log.borrow(),
            vec![('r', 0, AccessWidth::Byte), ('r', 1, AccessWidth::Byte)]
        );

        mem.log.borrow_mut().clear();
        f.write(&mem, &0x123u64.to_le_bytes()).unwrap();
        // Low nibble of byte 0 untouched, byte 2 untouched.
        assert_eq!(*mem.bytes.borrow(), vec![0x3B, 0x12, 0xEF]);
        // Only the partial unit is read back.
        assert_eq!(
            *mem.log.borrow(),
            vec![
                ('r', 0, AccessWidth::Byte),
                ('w', 0, AccessWidth::Byte),
                ('w', 1, AccessWidth::Byte)
            ]
        );
    }

    #[test]
    fn update_rules_fill_without_reading() {
        let mem = Memory::new(&[0x00]);
        let ones = field(region(1), 2, 3, 0x01 | (1 << 5));
        ones.write(&mem, &[0b000]).unwrap();
        assert_eq!(mem.bytes.borrow()[0], 0b1110_0011);
        assert!(mem.log.borrow().iter().all(|(op, ..)| *op == 'w'));

        let mem = Memory::new(&[0xFF]);
        let zeros = field(region(1), 2, 3, 0x01 | (2 << 5));
        zeros.write(&mem, &[0b101]).unwrap();
        assert_eq!(mem.bytes.borrow()[0], 0b0001_0100);
    }

    #[test]
    fn any_access_picks_smallest_covering_width() {
        let r = region(8);
        assert_eq!(field(r.clone(), 4, 4, 0).unit_width(), AccessWidth::Byte);
        assert_eq!(field(r.clone(), 4, 8, 0).unit_width(), AccessWidth::Word);
        assert_eq!(field(r.clone(), 8, 24, 0).unit_width(), AccessWidth::DWord);
        assert_eq!(field(r, 24, 16, 0).unit_width(), AccessWidth::QWord);
    }

    #[test]
    fn wide_field_reads_as_buffer() {
        let mem = Memory::new(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let f = field(region(10), 0, 80, 0x01);
        assert_eq!(
            f.read(&mem, IntegerWidth::Bits64).unwrap(),
            Object::buffer(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10])
        );
        let f = field(region(10), 0, 40, 0x01);
        assert_eq!(
            f.read(&mem, IntegerWidth::Bits32).unwrap(),
            Object::buffer(vec![1, 2, 3, 4, 5])
        );
    }

    #[test]
    fn access_past_region_is_rejected() {
        let mem = Memory::new(&[0; 8]);
        let f = field(region(2), 8, 16, 0x01);
        assert!(!f.fits_region());
        assert!(matches!(
            f.read(&mem, IntegerWidth::Bits64),
            Err(AmlError::RegionAccess(RegionError::OutOfBounds { .. }))
        ));
    }

    #[test]
    fn index_field_writes_offset_then_data() {
        // Index register at byte 0, data register at byte 1.
        let mem = Memory::new(&[0, 0]);
        let r = region(2);
        let index = Arc::new(field(r.clone(), 0, 8, 0x01));
        let data = Arc::new(field(r, 8, 8, 0x01));
        let f = FieldUnit {
            kind: FieldKind::Index { index, data },
            bit_offset: 16,
            bit_length: 8,
            access: AccessType::Byte,
            lock: false,
            update: UpdateRule::Preserve,
            width: IntegerWidth::Bits64,
        };
        f.write(&mem, &[0x5A]).unwrap();
        assert_eq!(*mem.bytes.borrow(), vec![2, 0x5A]);
    }

    #[test]
    fn buffer_field_round_trip() {
        let buf: SharedBuffer = Arc::new(spin::RwLock::new(vec![0u8; 4]));
        let f = FieldUnit::buffer_field(buf.clone(), 12, 8, IntegerWidth::Bits64);
        let mem = Memory::new(&[]);
        f.write(&mem, &[0xFF]).unwrap();
        assert_eq!(*buf.read(), vec![0, 0xF0, 0x0F, 0]);
        assert_eq!(f.read(&mem, IntegerWidth::Bits64).unwrap(), Object::Integer(0xFF));

        let past = FieldUnit::buffer_field(buf, 30, 8, IntegerWidth::Bits64);
        assert!(matches!(
            past.read(&mem, IntegerWidth::Bits64),
            Err(AmlError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn layout_tracks_offsets_and_access() {
        let mut layout = FieldLayout::new(FieldFlags(0x01));
        let a = layout
            .apply(&FieldElement::Named { name: NameSeg(*b"AAAA"), bits: 4 })
            .unwrap();
        assert_eq!(layout.apply(&FieldElement::Reserved { bits: 4 }), None);
        layout.apply(&FieldElement::Access { flags: FieldFlags(0x03), attrib: 0 });
        let b = layout
            .apply(&FieldElement::Named { name: NameSeg(*b"BBBB"), bits: 32 })
            .unwrap();
        assert_eq!((a.bit_offset, a.flags.access_type()), (0, AccessType::Byte));
        assert_eq!((b.bit_offset, b.flags.access_type()), (8, AccessType::DWord));
    }
}
