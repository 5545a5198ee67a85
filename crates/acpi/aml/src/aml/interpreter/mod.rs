//! The AML interpreter.
//!
//! [`Interpreter`] owns the namespace and evaluates AML against it. Tables
//! are executed once at load time (definitions create nodes, method bodies
//! are skipped); methods run later through [`Interpreter::evaluate`] with a
//! fresh [`Frame`] per invocation.

extern crate alloc;

mod exec;
mod expr;
mod store;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::field::{FieldUnit, OpRegion, RegionIo};
use super::namespace::{Namespace, NodeHandle};
use super::path::{AmlName, NameSeg};
use super::sync::{AmlMutex, SyncTracker, WAIT_FOREVER, lock_internal, unlock_internal};
use super::value::{IntegerWidth, Method, MethodBody, Object, ObjectType};
use crate::handler::{AccessWidth, Handler, PciAddress, RegionSpace};
use crate::reader::BinaryReader;
use crate::sdt::AmlTable;
use crate::{AmlError, ParseErrorKind, RegionError};

/// Value of the `Revision` opcode.
pub const INTERPRETER_REVISION: u64 = 1;

/// How Integers are rendered when implicitly converted to String.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegerFormat {
    /// `10` becomes `"10"`.
    #[default]
    Decimal,
    /// `10` becomes `"000000000000000A"` (padded to the integer width).
    Hex,
}

/// Interpreter settings.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Implicit Integer to String conversion mode.
    pub integer_format: IntegerFormat,
    /// Interface strings `_OSI` answers true for.
    pub osi_interfaces: Vec<String>,
    /// Value of `\_OS_`.
    pub os_name: String,
    /// Value of `\_REV`.
    pub revision: u64,
    /// Maximum method nesting depth.
    pub max_call_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        let osi = [
            "Windows 2000",
            "Windows 2001",
            "Windows 2001 SP1",
            "Windows 2001.1",
            "Windows 2006",
            "Windows 2009",
            "Windows 2012",
            "Windows 2013",
            "Windows 2015",
            "Module Device",
            "Processor Device",
            "3.0 Thermal Model",
            "Extended Address Space Descriptor",
        ];
        Self {
            integer_format: IntegerFormat::Decimal,
            osi_interfaces: osi.into_iter().map(String::from).collect(),
            os_name: String::from("Microsoft Windows NT"),
            revision: 2,
            max_call_depth: 64,
        }
    }
}

/// Control flow out of a term list.
#[derive(Debug)]
pub(crate) enum Flow {
    Next,
    Break,
    Continue,
    Return(Object),
}

/// Per-invocation state.
pub(crate) struct Frame {
    /// Scope unqualified names are resolved from and definitions go into.
    /// For a method this is a private scope owned by the invocation.
    pub scope: NodeHandle,
    pub width: IntegerWidth,
    pub args: [Option<Object>; 7],
    pub locals: [Object; 8],
    /// Nodes created by this invocation, removed when it returns.
    pub created: Vec<NodeHandle>,
    /// The table the executing code lives in.
    pub code: Arc<[u8]>,
    pub in_method: bool,
    pub depth: usize,
}

impl Frame {
    fn new(scope: NodeHandle, width: IntegerWidth, code: Arc<[u8]>, depth: usize) -> Self {
        Self {
            scope,
            width,
            args: core::array::from_fn(|_| None),
            locals: core::array::from_fn(|_| Object::Uninitialized),
            created: Vec::new(),
            code,
            in_method: false,
            depth,
        }
    }
}

/// An AML interpreter bound to a kernel [`Handler`].
pub struct Interpreter<H: Handler> {
    handler: H,
    config: InterpreterConfig,
    namespace: Namespace,
    sync: SyncTracker,
    global_lock: Arc<AmlMutex>,
}

impl<H: Handler> Interpreter<H> {
    /// Create an interpreter with the predefined root objects in place.
    pub fn new(handler: H, config: InterpreterConfig) -> Self {
        let interp = Self {
            handler,
            config,
            namespace: Namespace::new(),
            sync: SyncTracker::new(),
            global_lock: Arc::new(AmlMutex::global()),
        };
        interp.add_predefined();
        interp
    }

    fn add_predefined(&self) {
        let ns = &self.namespace;
        let root = ns.root();
        let osi = self.config.osi_interfaces.clone();
        let predefined = [
            (*b"_GPE", Object::Uninitialized),
            (*b"_PR_", Object::Uninitialized),
            (*b"_SB_", Object::Device),
            (*b"_SI_", Object::Uninitialized),
            (*b"_TZ_", Object::Uninitialized),
            (*b"_GL_", Object::Mutex(Arc::clone(&self.global_lock))),
            (*b"_OS_", Object::string(&self.config.os_name)),
            (*b"_REV", Object::Integer(self.config.revision)),
            (
                *b"_OSI",
                Object::Method(Arc::new(Method::native(
                    1,
                    Arc::new(move |args: &[Object]| -> Result<Object, AmlError> {
                        let supported = match args.first() {
                            Some(Object::String(s)) => osi.iter().any(|i| i == s),
                            _ => false,
                        };
                        log::debug!("aml: _OSI({:?}) = {supported}", args.first());
                        Ok(Object::Integer(if supported { u64::MAX } else { 0 }))
                    }),
                ))),
            ),
        ];
        for (name, object) in predefined {
            if let Err(e) = ns.add_child(root, NameSeg(name), object) {
                log::warn!("aml: could not create predefined object: {e}");
            }
        }
    }

    /// The kernel handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The active configuration.
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Read access to the namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Load one DSDT/SSDT: validate its header, then execute its TermList at
    /// the root scope.
    ///
    /// A failure aborts this table only. Nodes created before the failure
    /// stay in the namespace.
    ///
    /// # Errors
    ///
    /// [`AmlError::MalformedTableHeader`] for bad headers, otherwise the
    /// first error raised while executing the table body.
    pub fn load_table(&self, data: &[u8]) -> Result<(), AmlError> {
        let table = AmlTable::parse(data)?;
        log::info!(
            "aml: loading {} ({}) rev {} with {} bytes of AML",
            table.header.signature_str(),
            table.header.oem_table_id_str(),
            table.header.revision,
            table.data.len() - table.body_start(),
        );

        let code: Arc<[u8]> = Arc::from(table.data);
        let mut frame = Frame::new(
            self.namespace.root(),
            table.integer_width(),
            Arc::clone(&code),
            0,
        );
        let mut r = BinaryReader::with_range(&code, table.body_start(), code.len()).ok_or(
            AmlError::Parse {
                offset: table.body_start(),
                kind: ParseErrorKind::UnexpectedEnd,
            },
        )?;

        let result = self.exec_term_list(&mut frame, &mut r).map(|_| ());
        if let Err(e) = &result {
            log::warn!(
                "aml: aborted loading {}: {e}",
                table.header.signature_str()
            );
        }
        result
    }

    /// Load tables in order, continuing past failures.
    pub fn load_tables<'a>(
        &self,
        tables: impl IntoIterator<Item = &'a [u8]>,
    ) -> Vec<Result<(), AmlError>> {
        tables.into_iter().map(|t| self.load_table(t)).collect()
    }

    /// Resolve a textual path from the root.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NameNotFound`] if the path is malformed or absent.
    pub fn resolve(&self, path: &str) -> Result<NodeHandle, AmlError> {
        let name = AmlName::parse(path)?;
        self.namespace.resolve(self.namespace.root(), &name)
    }

    /// Evaluate the object at `path`: methods are invoked with `args`,
    /// fields are read, other objects are returned as copies.
    ///
    /// # Errors
    ///
    /// Any fault raised by the method, plus [`AmlError::NameNotFound`].
    pub fn evaluate(&self, path: &str, args: &[Object]) -> Result<Object, AmlError> {
        let handle = self.resolve(path)?;
        self.evaluate_node(handle, args)
    }

    /// Like [`Interpreter::evaluate`], for a resolved node.
    ///
    /// Mutexes a method leaves acquired are released afterwards.
    ///
    /// # Errors
    ///
    /// Any fault raised by the method.
    pub fn evaluate_node(&self, handle: NodeHandle, args: &[Object]) -> Result<Object, AmlError> {
        let me = self.handler.current_thread();
        let held = self.sync.held_count(me);
        let result = self.evaluate_at_depth(handle, args.iter().map(Object::deep_copy).collect(), 0);
        let leaked = self.sync.release_beyond(&self.handler, held);
        if leaked > 0 {
            log::warn!(
                "aml: {} returned holding {leaked} mutex(es); released",
                self.namespace.path_of(handle)
            );
        }
        if let Err(e) = &result {
            log::debug!("aml: {} faulted: {e}", self.namespace.path_of(handle));
        }
        result.map(|v| v.deep_copy())
    }

    fn evaluate_at_depth(
        &self,
        handle: NodeHandle,
        args: Vec<Object>,
        depth: usize,
    ) -> Result<Object, AmlError> {
        let handle = self.namespace.follow_alias(handle)?;
        match self.namespace.object(handle)? {
            Object::Method(method) => self.invoke(handle, &method, args, depth),
            Object::FieldUnit(field) => field.read(&self.region_io(depth), field.width),
            other => Ok(other),
        }
    }

    /// Read a named field.
    ///
    /// # Errors
    ///
    /// [`AmlError::Type`] if `path` is not a field, otherwise region faults.
    pub fn read_field(&self, path: &str) -> Result<Object, AmlError> {
        let field = self.field_at(path)?;
        field.read(&self.region_io(0), field.width)
    }

    /// Write a named field, converting `value` to bytes first.
    ///
    /// # Errors
    ///
    /// [`AmlError::Type`] if `path` is not a field or `value` is not data,
    /// otherwise region faults.
    pub fn write_field(&self, path: &str, value: Object) -> Result<(), AmlError> {
        let field = self.field_at(path)?;
        let bytes = super::convert::to_buffer(&value, field.width)?;
        field.write(&self.region_io(0), &bytes)
    }

    fn field_at(&self, path: &str) -> Result<Arc<FieldUnit>, AmlError> {
        match self.namespace.object(self.resolve(path)?)? {
            Object::FieldUnit(field) => Ok(field),
            other => Err(other.type_error(ObjectType::FieldUnit)),
        }
    }

    /// Run a method with a new frame.
    ///
    /// The frame's scope is a private node beside the method, so concurrent
    /// or recursive invocations never see each other's names.
    pub(crate) fn invoke(
        &self,
        node: NodeHandle,
        method: &Arc<Method>,
        args: Vec<Object>,
        depth: usize,
    ) -> Result<Object, AmlError> {
        if args.len() > usize::from(method.arg_count) {
            return Err(AmlError::ArgumentCountMismatch {
                expected: method.arg_count,
                given: args.len(),
            });
        }
        if depth >= self.config.max_call_depth {
            return Err(AmlError::StackExhausted(self.config.max_call_depth));
        }
        log::trace!("aml: invoking {} with {} args", self.namespace.path_of(node), args.len());

        let (table, start, end) = match &method.body {
            MethodBody::Native(f) => return f(&args),
            MethodBody::Aml { table, start, end } => (Arc::clone(table), *start, *end),
        };

        let parent = self.namespace.parent(node).unwrap_or(self.namespace.root());
        let name = self.namespace.name(node).unwrap_or(NameSeg::ROOT);
        let scope = self.namespace.add_private_scope(parent, name)?;

        if let Some(lock) = &method.serial_lock {
            if let Err(e) = self.sync.acquire(&self.handler, lock, WAIT_FOREVER) {
                self.namespace.remove(scope);
                return Err(e);
            }
        }

        let mut frame = Frame::new(scope, method.width, Arc::clone(&table), depth + 1);
        frame.in_method = true;
        for (slot, arg) in frame.args.iter_mut().zip(args) {
            *slot = Some(arg);
        }

        let result = match BinaryReader::with_range(&table, start, end) {
            Some(mut r) => self.exec_term_list(&mut frame, &mut r).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => Object::Uninitialized,
            }),
            None => Err(AmlError::Parse {
                offset: start,
                kind: ParseErrorKind::UnexpectedEnd,
            }),
        };

        for handle in frame.created.iter().rev() {
            self.namespace.remove(*handle);
        }
        self.namespace.remove(scope);
        if let Some(lock) = &method.serial_lock {
            if let Err(e) = self.sync.release(&self.handler, lock) {
                log::warn!("aml: releasing serialization lock: {e}");
            }
        }
        result
    }

    /// Region I/O for code running at call depth `depth`.
    pub(crate) fn region_io(&self, depth: usize) -> RegionAccess<'_, H> {
        RegionAccess {
            interp: self,
            depth,
        }
    }

    /// PCI address of a PCI_Config region, from `_ADR` of its scope and the
    /// nearest `_BBN`/`_SEG` above it.
    ///
    /// The address methods run one level below the access that needs them.
    /// If they touch the same region again the access fails instead of
    /// recursing.
    fn pci_address(&self, region: &OpRegion, depth: usize) -> Result<PciAddress, AmlError> {
        if let Some(address) = region.pci_address() {
            return Ok(address);
        }
        let me = self.handler.current_thread();
        region.begin_pci_resolution(me)?;
        let result = self.resolve_pci_address(region, depth);
        region.end_pci_resolution(me);
        let address = result?;
        region.set_pci_address(address);
        Ok(address)
    }

    fn resolve_pci_address(&self, region: &OpRegion, depth: usize) -> Result<PciAddress, AmlError> {
        let ns = &self.namespace;
        let integer = |scope: NodeHandle, name: &[u8; 4]| -> Result<Option<u64>, AmlError> {
            match ns.lookup_child(scope, NameSeg(*name)) {
                Some(node) => {
                    let value = self.evaluate_at_depth(node, Vec::new(), depth)?;
                    Ok(Some(super::convert::to_integer(&value, IntegerWidth::Bits64)?))
                }
                None => Ok(None),
            }
        };

        let adr = integer(region.scope, b"_ADR")?.unwrap_or(0);
        let mut bus = None;
        let mut segment = None;
        let mut current = Some(region.scope);
        while let Some(scope) = current {
            if bus.is_none() {
                bus = integer(scope, b"_BBN")?;
            }
            if segment.is_none() {
                segment = integer(scope, b"_SEG")?;
            }
            current = ns.parent(scope);
        }
        Ok(PciAddress {
            segment: segment.unwrap_or(0) as u16,
            bus: bus.unwrap_or(0) as u8,
            device: (adr >> 16) as u8,
            function: adr as u8,
        })
    }
}

/// [`RegionIo`] on top of the kernel handler for code at a given call depth.
pub(crate) struct RegionAccess<'a, H: Handler> {
    interp: &'a Interpreter<H>,
    depth: usize,
}

impl<H: Handler> RegionAccess<'_, H> {
    /// Absolute address of the unit at `byte_offset`.
    fn address(region: &OpRegion, byte_offset: u64) -> Result<u64, AmlError> {
        region.offset.checked_add(byte_offset).ok_or_else(|| {
            RegionError::AddressOverflow {
                space: region.space,
                base: region.offset,
                byte_offset,
            }
            .into()
        })
    }

    /// Configuration-space register for the unit at `byte_offset`.
    fn pci_register(region: &OpRegion, byte_offset: u64) -> Result<u16, AmlError> {
        let address = Self::address(region, byte_offset)?;
        u16::try_from(address).map_err(|_| {
            RegionError::AddressOverflow {
                space: region.space,
                base: region.offset,
                byte_offset,
            }
            .into()
        })
    }
}

impl<H: Handler> RegionIo for RegionAccess<'_, H> {
    fn read_unit(
        &self,
        region: &OpRegion,
        byte_offset: u64,
        width: AccessWidth,
    ) -> Result<u64, AmlError> {
        let handler = &self.interp.handler;
        let value = match region.space {
            RegionSpace::PciConfig => {
                let register = Self::pci_register(region, byte_offset)?;
                let pci = self.interp.pci_address(region, self.depth)?;
                handler.read_pci(pci, register, width)?
            }
            space => handler.read_region(space, Self::address(region, byte_offset)?, width)?,
        };
        Ok(value & width.mask())
    }

    fn write_unit(
        &self,
        region: &OpRegion,
        byte_offset: u64,
        width: AccessWidth,
        value: u64,
    ) -> Result<(), AmlError> {
        let handler = &self.interp.handler;
        match region.space {
            RegionSpace::PciConfig => {
                let register = Self::pci_register(region, byte_offset)?;
                let pci = self.interp.pci_address(region, self.depth)?;
                handler.write_pci(pci, register, width, value)?;
            }
            space => {
                handler.write_region(space, Self::address(region, byte_offset)?, width, value)?;
            }
        }
        Ok(())
    }

    fn lock_region(&self, region: &OpRegion) -> Result<(), AmlError> {
        let handler = &self.interp.handler;
        lock_internal(handler, &region.lock)?;
        if let Err(e) = lock_internal(handler, &self.interp.global_lock) {
            unlock_internal(handler, &region.lock);
            return Err(e);
        }
        Ok(())
    }

    fn unlock_region(&self, region: &OpRegion) {
        let handler = &self.interp.handler;
        unlock_internal(handler, &self.interp.global_lock);
        unlock_internal(handler, &region.lock);
    }
}

#[cfg(test)]
mod tests;
