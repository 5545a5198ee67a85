//! Shared fixtures for the integration tests: a byte-level AML builder and
//! a [`Handler`] backed by host memory and threads.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hadron_aml::aml::decoder::encode_pkg_length;
use hadron_aml::aml::opcode::*;
use hadron_aml::{
    AccessWidth, AmlName, Handler, Interpreter, InterpreterConfig, PciAddress, RegionError,
    RegionSpace, ThreadId,
};

// ---------------------------------------------------------------------------
// AML builder
// ---------------------------------------------------------------------------

/// `lead` followed by a PkgLength covering itself and `body`.
pub fn pkg(lead: &[u8], body: &[u8]) -> Vec<u8> {
    let mut len = body.len() + 1;
    loop {
        let (bytes, n) = encode_pkg_length(len).expect("package too large");
        if body.len() + n == len {
            return [lead, &bytes[..n], body].concat();
        }
        len = body.len() + n;
    }
}

/// A definition block with a valid header around `body`.
pub fn table(signature: &[u8; 4], revision: u8, body: &[u8]) -> Vec<u8> {
    let mut t = Vec::with_capacity(36 + body.len());
    t.extend_from_slice(signature);
    t.extend_from_slice(&((36 + body.len()) as u32).to_le_bytes());
    t.push(revision);
    t.push(0);
    t.extend_from_slice(b"HADRON");
    t.extend_from_slice(b"INTGTEST");
    t.extend_from_slice(&1u32.to_le_bytes());
    t.extend_from_slice(b"HAML");
    t.extend_from_slice(&1u32.to_le_bytes());
    t.extend_from_slice(body);
    t
}

/// A revision 2 DSDT.
pub fn dsdt(body: &[u8]) -> Vec<u8> {
    table(b"DSDT", 2, body)
}

/// The shortest constant encoding of `v`.
pub fn int(v: u64) -> Vec<u8> {
    match v {
        0 => vec![ZERO_OP],
        1 => vec![ONE_OP],
        u64::MAX => vec![ONES_OP],
        2..=0xFF => vec![BYTE_PREFIX, v as u8],
        0x100..=0xFFFF => [&[WORD_PREFIX][..], &(v as u16).to_le_bytes()].concat(),
        0x1_0000..=0xFFFF_FFFF => [&[DWORD_PREFIX][..], &(v as u32).to_le_bytes()].concat(),
        _ => [&[QWORD_PREFIX][..], &v.to_le_bytes()].concat(),
    }
}

/// A String constant.
pub fn string(s: &str) -> Vec<u8> {
    [&[STRING_PREFIX][..], s.as_bytes(), &[0]].concat()
}

/// `EisaId("PNP0A03")` as the DWord the compiler emits.
pub fn eisa(id: &str) -> Vec<u8> {
    let raw = hadron_aml::EisaId::encode(id).expect("bad EISA id").raw;
    [&[DWORD_PREFIX][..], &raw.to_le_bytes()].concat()
}

/// `Buffer () { bytes }`.
pub fn buffer(bytes: &[u8]) -> Vec<u8> {
    pkg(&[BUFFER_OP], &[int(bytes.len() as u64).as_slice(), bytes].concat())
}

/// `Package () { elements }`.
pub fn package(elements: &[Vec<u8>]) -> Vec<u8> {
    let mut body = vec![elements.len() as u8];
    for element in elements {
        body.extend_from_slice(element);
    }
    pkg(&[PACKAGE_OP], &body)
}

/// `Name (seg, value)`.
pub fn name(seg: &[u8; 4], value: &[u8]) -> Vec<u8> {
    [&[NAME_OP][..], seg, value].concat()
}

/// `Scope (path) { body }`; `path` is a raw NameString.
pub fn scope(path: &[u8], body: &[u8]) -> Vec<u8> {
    pkg(&[SCOPE_OP], &[path, body].concat())
}

/// `Device (seg) { body }`.
pub fn device(seg: &[u8; 4], body: &[u8]) -> Vec<u8> {
    pkg(&[EXT_OP_PREFIX, DEVICE_OP], &[seg.as_slice(), body].concat())
}

/// `Method (seg, flags) { body }`.
pub fn method(seg: &[u8; 4], flags: u8, body: &[u8]) -> Vec<u8> {
    pkg(&[METHOD_OP], &[seg.as_slice(), &[flags], body].concat())
}

/// `Return (value)`.
pub fn ret(value: &[u8]) -> Vec<u8> {
    [&[RETURN_OP][..], value].concat()
}

/// `Store (value, target)`.
pub fn store(value: &[u8], target: &[u8]) -> Vec<u8> {
    [&[STORE_OP][..], value, target].concat()
}

/// `Mutex (seg, level)`.
pub fn mutex(seg: &[u8; 4], sync_level: u8) -> Vec<u8> {
    [&[EXT_OP_PREFIX, MUTEX_OP][..], seg, &[sync_level]].concat()
}

/// `Acquire (target, timeout)`; evaluates to Ones on timeout.
pub fn acquire(target: &[u8], timeout: u16) -> Vec<u8> {
    [&[EXT_OP_PREFIX, ACQUIRE_OP][..], target, &timeout.to_le_bytes()].concat()
}

/// `Release (target)`.
pub fn release(target: &[u8]) -> Vec<u8> {
    [&[EXT_OP_PREFIX, RELEASE_OP][..], target].concat()
}

/// `OperationRegion (seg, space, offset, length)`.
pub fn op_region(seg: &[u8; 4], space: u8, offset: u64, length: u64) -> Vec<u8> {
    [
        &[EXT_OP_PREFIX, OP_REGION_OP][..],
        seg,
        &[space],
        &int(offset),
        &int(length),
    ]
    .concat()
}

/// `Field (region, flags) { elements }`.
pub fn field(region: &[u8; 4], flags: u8, elements: &[Vec<u8>]) -> Vec<u8> {
    let mut body = region.to_vec();
    body.push(flags);
    for element in elements {
        body.extend_from_slice(element);
    }
    pkg(&[EXT_OP_PREFIX, FIELD_OP], &body)
}

/// `IndexField (index, data, flags) { elements }`.
pub fn index_field(index: &[u8; 4], data: &[u8; 4], flags: u8, elements: &[Vec<u8>]) -> Vec<u8> {
    let mut body = [index.as_slice(), data].concat();
    body.push(flags);
    for element in elements {
        body.extend_from_slice(element);
    }
    pkg(&[EXT_OP_PREFIX, INDEX_FIELD_OP], &body)
}

/// A named entry of a field list.
pub fn field_unit(seg: &[u8; 4], bits: usize) -> Vec<u8> {
    let (len, n) = encode_pkg_length(bits).expect("field too wide");
    [seg.as_slice(), &len[..n]].concat()
}

/// An `Offset`/reserved entry of a field list.
pub fn reserved(bits: usize) -> Vec<u8> {
    let (len, n) = encode_pkg_length(bits).expect("gap too wide");
    [&[RESERVED_FIELD][..], &len[..n]].concat()
}

/// Field flag bytes: access type in bits 0-3, lock in bit 4, update rule in
/// bits 5-6.
pub mod flags {
    pub const ANY: u8 = 0x00;
    pub const BYTE: u8 = 0x01;
    pub const WORD: u8 = 0x02;
    pub const DWORD: u8 = 0x03;
    pub const LOCK: u8 = 0x10;
    pub const WRITE_AS_ONES: u8 = 0x20;
    pub const WRITE_AS_ZEROS: u8 = 0x40;
}

/// Region space identifiers.
pub mod space {
    pub const SYSTEM_MEMORY: u8 = 0x00;
    pub const SYSTEM_IO: u8 = 0x01;
    pub const PCI_CONFIG: u8 = 0x02;
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// One region access seen by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub space: RegionSpace,
    pub address: u64,
    pub width: AccessWidth,
    /// `Some(value)` for writes.
    pub written: Option<u64>,
}

/// Sparse byte memory per address space, with an access log.
///
/// PCI configuration space is folded into the same map, keyed by
/// `bus << 20 | device << 15 | function << 12 | offset`.
pub struct TestHandler {
    memory: Mutex<BTreeMap<(u8, u64), u8>>,
    accesses: Mutex<Vec<Access>>,
    notifications: Mutex<Vec<(String, u64)>>,
    start: Instant,
}

impl Default for TestHandler {
    fn default() -> Self {
        Self {
            memory: Mutex::new(BTreeMap::new()),
            accesses: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            start: Instant::now(),
        }
    }
}

impl TestHandler {
    /// Preload bytes at `address` in `space`.
    pub fn poke(&self, space: RegionSpace, address: u64, bytes: &[u8]) {
        let mut memory = self.memory.lock().unwrap();
        for (i, &b) in bytes.iter().enumerate() {
            memory.insert((u8::from(space), address + i as u64), b);
        }
    }

    /// Read back `len` bytes at `address` in `space`.
    pub fn peek(&self, space: RegionSpace, address: u64, len: usize) -> Vec<u8> {
        let memory = self.memory.lock().unwrap();
        (0..len as u64)
            .map(|i| memory.get(&(u8::from(space), address + i)).copied().unwrap_or(0))
            .collect()
    }

    /// Every access so far, oldest first.
    pub fn accesses(&self) -> Vec<Access> {
        self.accesses.lock().unwrap().clone()
    }

    /// Every `Notify` so far as `(path, value)`.
    pub fn notifications(&self) -> Vec<(String, u64)> {
        self.notifications.lock().unwrap().clone()
    }

    fn load(&self, space: RegionSpace, address: u64, width: AccessWidth) -> u64 {
        let memory = self.memory.lock().unwrap();
        (0..width.bytes()).fold(0, |acc, i| {
            let b = memory.get(&(u8::from(space), address + i)).copied().unwrap_or(0);
            acc | u64::from(b) << (i * 8)
        })
    }

    fn save(&self, space: RegionSpace, address: u64, width: AccessWidth, value: u64) {
        let mut memory = self.memory.lock().unwrap();
        for i in 0..width.bytes() {
            memory.insert((u8::from(space), address + i), (value >> (i * 8)) as u8);
        }
    }

    fn log(&self, access: Access) {
        self.accesses.lock().unwrap().push(access);
    }
}

fn pci_key(address: PciAddress, offset: u16) -> u64 {
    u64::from(address.bus) << 20
        | u64::from(address.device) << 15
        | u64::from(address.function) << 12
        | u64::from(offset)
}

static NEXT_THREAD: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD: u64 = NEXT_THREAD.fetch_add(1, Ordering::Relaxed);
}

impl Handler for TestHandler {
    fn read_region(
        &self,
        space: RegionSpace,
        address: u64,
        width: AccessWidth,
    ) -> Result<u64, RegionError> {
        if let RegionSpace::Other(_) = space {
            return Err(RegionError::UnsupportedSpace(space));
        }
        self.log(Access {
            space,
            address,
            width,
            written: None,
        });
        Ok(self.load(space, address, width))
    }

    fn write_region(
        &self,
        space: RegionSpace,
        address: u64,
        width: AccessWidth,
        value: u64,
    ) -> Result<(), RegionError> {
        if let RegionSpace::Other(_) = space {
            return Err(RegionError::UnsupportedSpace(space));
        }
        self.log(Access {
            space,
            address,
            width,
            written: Some(value),
        });
        self.save(space, address, width, value);
        Ok(())
    }

    fn read_pci(
        &self,
        address: PciAddress,
        offset: u16,
        width: AccessWidth,
    ) -> Result<u64, RegionError> {
        self.read_region(RegionSpace::PciConfig, pci_key(address, offset), width)
    }

    fn write_pci(
        &self,
        address: PciAddress,
        offset: u16,
        width: AccessWidth,
        value: u64,
    ) -> Result<(), RegionError> {
        self.write_region(RegionSpace::PciConfig, pci_key(address, offset), width, value)
    }

    fn current_thread(&self) -> ThreadId {
        ThreadId(THREAD.with(|id| *id))
    }

    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    // Waiters re-check their condition, so a short nap stands in for a
    // futex.
    fn wait_on(&self, word: &AtomicU32, expected: u32, _timeout_ms: Option<u64>) {
        if word.load(Ordering::Acquire) == expected {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }

    fn notify(&self, device: &AmlName, value: u64) {
        self.notifications
            .lock()
            .unwrap()
            .push((device.to_string(), value));
    }
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

/// An interpreter with `body` loaded as a revision 2 DSDT.
pub fn load(body: &[u8]) -> Interpreter<TestHandler> {
    let aml = Interpreter::new(TestHandler::default(), InterpreterConfig::default());
    aml.load_table(&dsdt(body)).expect("table failed to load");
    aml
}
