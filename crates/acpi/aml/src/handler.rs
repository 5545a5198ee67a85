//! Kernel capabilities the interpreter calls out to.
//!
//! The interpreter never touches hardware or the scheduler directly. Every
//! region access, PCI configuration cycle, sleep and thread park goes through
//! a [`Handler`] supplied by the kernel at construction time. The firmware
//! Global Lock handshake is a separate, optional [`GlobalLock`] capability.

use core::sync::atomic::AtomicU32;

use crate::RegionError;
use crate::aml::path::AmlName;

/// Address space of an `OperationRegion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionSpace {
    /// Physical memory.
    SystemMemory,
    /// x86 port I/O.
    SystemIo,
    /// PCI configuration space of the owning device.
    PciConfig,
    /// Embedded controller.
    EmbeddedController,
    /// SMBus.
    SmBus,
    /// CMOS RAM.
    SystemCmos,
    /// Memory behind a PCI BAR.
    PciBarTarget,
    /// IPMI.
    Ipmi,
    /// General-purpose I/O.
    GeneralPurposeIo,
    /// Generic serial bus.
    GenericSerialBus,
    /// Platform communications channel.
    Pcc,
    /// Any other (OEM-defined) space identifier.
    Other(u8),
}

impl From<u8> for RegionSpace {
    fn from(id: u8) -> Self {
        match id {
            0x00 => Self::SystemMemory,
            0x01 => Self::SystemIo,
            0x02 => Self::PciConfig,
            0x03 => Self::EmbeddedController,
            0x04 => Self::SmBus,
            0x05 => Self::SystemCmos,
            0x06 => Self::PciBarTarget,
            0x07 => Self::Ipmi,
            0x08 => Self::GeneralPurposeIo,
            0x09 => Self::GenericSerialBus,
            0x0A => Self::Pcc,
            other => Self::Other(other),
        }
    }
}

impl From<RegionSpace> for u8 {
    fn from(space: RegionSpace) -> Self {
        match space {
            RegionSpace::SystemMemory => 0x00,
            RegionSpace::SystemIo => 0x01,
            RegionSpace::PciConfig => 0x02,
            RegionSpace::EmbeddedController => 0x03,
            RegionSpace::SmBus => 0x04,
            RegionSpace::SystemCmos => 0x05,
            RegionSpace::PciBarTarget => 0x06,
            RegionSpace::Ipmi => 0x07,
            RegionSpace::GeneralPurposeIo => 0x08,
            RegionSpace::GenericSerialBus => 0x09,
            RegionSpace::Pcc => 0x0A,
            RegionSpace::Other(id) => id,
        }
    }
}

/// Width of a single region access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessWidth {
    /// 8 bits.
    Byte,
    /// 16 bits.
    Word,
    /// 32 bits.
    DWord,
    /// 64 bits.
    QWord,
}

impl AccessWidth {
    /// Size in bytes.
    #[must_use]
    pub const fn bytes(self) -> u64 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::DWord => 4,
            Self::QWord => 8,
        }
    }

    /// Size in bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.bytes() * 8
    }

    /// Mask covering the low `bits()` bits.
    #[must_use]
    pub const fn mask(self) -> u64 {
        match self {
            Self::QWord => u64::MAX,
            _ => (1 << self.bits()) - 1,
        }
    }
}

/// Segment/bus/device/function of a PCI function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PciAddress {
    /// PCI segment group (`_SEG`).
    pub segment: u16,
    /// Bus number (`_BBN`).
    pub bus: u8,
    /// Device number (`_ADR` bits 16-31).
    pub device: u8,
    /// Function number (`_ADR` bits 0-15).
    pub function: u8,
}

/// Opaque identity of a kernel thread, used for mutex ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

/// The firmware Global Lock handshake.
///
/// On x86 this is the FACS lock word protocol: set the pending bit, wait for
/// the owned bit, and signal firmware through the GBL_RLS bit on release.
/// The interpreter only needs to know whether the lock was obtained.
pub trait GlobalLock: Send + Sync {
    /// Try to take the lock, waiting at most `timeout_ms` (`None` waits
    /// forever). Returns `false` on timeout.
    fn acquire(&self, timeout_ms: Option<u64>) -> bool;

    /// Give the lock back to firmware.
    fn release(&self);
}

/// Services the kernel provides to the interpreter.
///
/// Region accesses are naturally aligned to `width` and never exceed it.
/// Only [`read_region`](Handler::read_region),
/// [`write_region`](Handler::write_region),
/// [`current_thread`](Handler::current_thread) and
/// [`uptime_ms`](Handler::uptime_ms) are required; the rest have defaults
/// suitable for a single-threaded environment.
pub trait Handler: Send + Sync {
    /// Read `width` bytes at `address` in `space`.
    ///
    /// # Errors
    ///
    /// Any [`RegionError`] is surfaced to the executing method as a
    /// `RegionAccess` fault.
    fn read_region(
        &self,
        space: RegionSpace,
        address: u64,
        width: AccessWidth,
    ) -> Result<u64, RegionError>;

    /// Write the low `width` bytes of `value` at `address` in `space`.
    ///
    /// # Errors
    ///
    /// See [`Handler::read_region`].
    fn write_region(
        &self,
        space: RegionSpace,
        address: u64,
        width: AccessWidth,
        value: u64,
    ) -> Result<(), RegionError>;

    /// Read from the configuration space of a PCI function.
    ///
    /// # Errors
    ///
    /// The default reports the PCI space as unsupported.
    fn read_pci(
        &self,
        address: PciAddress,
        offset: u16,
        width: AccessWidth,
    ) -> Result<u64, RegionError> {
        let _ = (address, offset, width);
        Err(RegionError::UnsupportedSpace(RegionSpace::PciConfig))
    }

    /// Write to the configuration space of a PCI function.
    ///
    /// # Errors
    ///
    /// The default reports the PCI space as unsupported.
    fn write_pci(
        &self,
        address: PciAddress,
        offset: u16,
        width: AccessWidth,
        value: u64,
    ) -> Result<(), RegionError> {
        let _ = (address, offset, width, value);
        Err(RegionError::UnsupportedSpace(RegionSpace::PciConfig))
    }

    /// Identity of the calling thread.
    fn current_thread(&self) -> ThreadId;

    /// Monotonic milliseconds since boot.
    fn uptime_ms(&self) -> u64;

    /// Park the calling thread while `word` still equals `expected`.
    ///
    /// Returns early on [`wake`](Handler::wake), on timeout, or spuriously;
    /// callers always re-check their condition. The default returns
    /// immediately, turning waits into polling.
    fn wait_on(&self, word: &AtomicU32, expected: u32, timeout_ms: Option<u64>) {
        let _ = (word, expected, timeout_ms);
        core::hint::spin_loop();
    }

    /// Wake up to `count` threads parked on `word`.
    fn wake(&self, word: &AtomicU32, count: usize) {
        let _ = (word, count);
    }

    /// `Sleep`: yield the CPU for at least `ms` milliseconds.
    fn sleep_ms(&self, ms: u64) {
        let deadline = self.uptime_ms().saturating_add(ms);
        while self.uptime_ms() < deadline {
            core::hint::spin_loop();
        }
    }

    /// `Stall`: busy-wait for `us` microseconds.
    fn stall_us(&self, us: u64) {
        self.sleep_ms(us.div_ceil(1000));
    }

    /// `Timer`: a monotonic count of 100 ns ticks.
    fn timer(&self) -> u64 {
        self.uptime_ms().saturating_mul(10_000)
    }

    /// `Notify(device, value)`.
    fn notify(&self, device: &AmlName, value: u64) {
        log::info!("aml: Notify({device}, {value:#x})");
    }

    /// `Fatal(type, code, arg)`; the method faults after this returns.
    fn fatal(&self, fatal_type: u8, code: u32, arg: u64) {
        log::error!("aml: Fatal(type={fatal_type:#x}, code={code:#x}, arg={arg:#x})");
    }

    /// The firmware Global Lock, if the platform has one.
    fn global_lock(&self) -> Option<&dyn GlobalLock> {
        None
    }
}
