//! Statement execution: namespace definitions and control flow.

extern crate alloc;

use alloc::sync::Arc;

use super::{Flow, Frame, Interpreter};
use crate::aml::decoder::{Term, decode_field_element, decode_term, read_byte};
use crate::aml::field::{FieldFlags, FieldKind, FieldLayout, FieldUnit, OpRegion};
use crate::aml::namespace::NodeHandle;
use crate::aml::opcode::ELSE_OP;
use crate::aml::path::AmlName;
use crate::aml::sync::{AmlEvent, AmlMutex};
use crate::aml::value::{Method, MethodBody, Object, ObjectType};
use crate::handler::Handler;
use crate::reader::BinaryReader;
use crate::{AmlError, ParseErrorKind};

/// A reader over `r`'s bytes from its current position up to `end`.
pub(super) fn sub<'a>(r: &BinaryReader<'a>, end: usize) -> Result<BinaryReader<'a>, AmlError> {
    r.sub(end).ok_or(AmlError::Parse {
        offset: r.position(),
        kind: ParseErrorKind::InvalidPkgLength,
    })
}

/// Move `r` to `end`.
pub(super) fn seek(r: &mut BinaryReader<'_>, end: usize) -> Result<(), AmlError> {
    r.seek(end).ok_or(AmlError::Parse {
        offset: end,
        kind: ParseErrorKind::InvalidPkgLength,
    })
}

impl<H: Handler> Interpreter<H> {
    /// Execute terms until the reader is exhausted or control leaves the
    /// list (`Break`, `Continue`, `Return`).
    pub(super) fn exec_term_list(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
    ) -> Result<Flow, AmlError> {
        while !r.is_at_end() {
            match self.exec_statement(frame, r)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn exec_statement(&self, frame: &mut Frame, r: &mut BinaryReader<'_>) -> Result<Flow, AmlError> {
        let term = decode_term(r)?;
        match term {
            Term::Scope { end, name } => {
                let scope = match self.namespace.resolve(frame.scope, &name) {
                    Ok(node) => self.namespace.follow_alias(node)?,
                    Err(_) => {
                        log::warn!("aml: Scope({name}) names a missing object; creating it");
                        self.define_or_existing(frame, &name, Object::Uninitialized)?
                    }
                };
                self.exec_in_scope(frame, r, end, scope)
            }
            Term::Device { end, name } => {
                let node = self.define_or_existing(frame, &name, Object::Device)?;
                self.exec_in_scope(frame, r, end, node)
            }
            Term::Processor {
                end,
                name,
                proc_id,
                pblk_address,
                pblk_len,
            } => {
                let object = Object::Processor {
                    proc_id,
                    pblk_address,
                    pblk_len,
                };
                let node = self.define_or_existing(frame, &name, object)?;
                self.exec_in_scope(frame, r, end, node)
            }
            Term::PowerResource {
                end,
                name,
                system_level,
                resource_order,
            } => {
                let object = Object::PowerResource {
                    system_level,
                    resource_order,
                };
                let node = self.define_or_existing(frame, &name, object)?;
                self.exec_in_scope(frame, r, end, node)
            }
            Term::ThermalZone { end, name } => {
                let node = self.define_or_existing(frame, &name, Object::ThermalZone)?;
                self.exec_in_scope(frame, r, end, node)
            }
            Term::Method { end, name, flags } => {
                let serialized = flags.serialized();
                let method = Method {
                    arg_count: flags.arg_count(),
                    serialized,
                    sync_level: flags.sync_level(),
                    width: frame.width,
                    body: MethodBody::Aml {
                        table: Arc::clone(&frame.code),
                        start: r.position(),
                        end,
                    },
                    serial_lock: serialized.then(|| Arc::new(AmlMutex::new(flags.sync_level()))),
                };
                seek(r, end)?;
                self.define(frame, &name, Object::Method(Arc::new(method)))?;
                Ok(Flow::Next)
            }
            Term::Name { name } => {
                let value = self.eval(frame, r)?;
                self.define(frame, &name, value.deep_copy())?;
                Ok(Flow::Next)
            }
            Term::Alias { source, alias } => {
                let target = self.namespace.resolve(frame.scope, &source)?;
                self.define(frame, &alias, Object::Alias(target))?;
                Ok(Flow::Next)
            }
            Term::Mutex { name, sync_level } => {
                let mutex = Arc::new(AmlMutex::new(sync_level));
                self.define(frame, &name, Object::Mutex(mutex))?;
                Ok(Flow::Next)
            }
            Term::Event { name } => {
                self.define(frame, &name, Object::Event(Arc::new(AmlEvent::new())))?;
                Ok(Flow::Next)
            }
            Term::OpRegion { name, space } => {
                let offset = self.eval_integer(frame, r)?;
                let length = self.eval_integer(frame, r)?;
                let (scope, _) = self.namespace.resolve_parent(frame.scope, &name)?;
                let region = OpRegion::new(space, offset, length, scope);
                self.define(frame, &name, Object::OperationRegion(Arc::new(region)))?;
                Ok(Flow::Next)
            }
            Term::Field { end, region, flags } => {
                let region = self.region_named(frame, &region)?;
                let mut body = sub(r, end)?;
                self.define_fields(frame, &mut body, flags, || {
                    FieldKind::Region(Arc::clone(&region))
                })?;
                seek(r, end)?;
                Ok(Flow::Next)
            }
            Term::IndexField {
                end,
                index,
                data,
                flags,
            } => {
                let index = self.field_named(frame, &index)?;
                let data = self.field_named(frame, &data)?;
                let mut body = sub(r, end)?;
                self.define_fields(frame, &mut body, flags, || FieldKind::Index {
                    index: Arc::clone(&index),
                    data: Arc::clone(&data),
                })?;
                seek(r, end)?;
                Ok(Flow::Next)
            }
            Term::BankField { end, region, bank } => {
                let region = self.region_named(frame, &region)?;
                let bank = self.field_named(frame, &bank)?;
                let mut body = sub(r, end)?;
                let value = self.eval_integer(frame, &mut body)?;
                let flags = FieldFlags(read_byte(&mut body)?);
                self.define_fields(frame, &mut body, flags, || FieldKind::Bank {
                    region: Arc::clone(&region),
                    bank: Arc::clone(&bank),
                    value,
                })?;
                seek(r, end)?;
                Ok(Flow::Next)
            }
            Term::External { .. } => Ok(Flow::Next),
            Term::DataRegion { .. } => Err(AmlError::Unsupported("DataTableRegion")),
            Term::If { end } => self.exec_if(frame, r, end),
            // An Else not preceded by an If is skipped.
            Term::Else { end } => {
                seek(r, end)?;
                Ok(Flow::Next)
            }
            Term::While { end } => self.exec_while(frame, r, end),
            Term::Break => Ok(Flow::Break),
            Term::Continue => Ok(Flow::Continue),
            Term::Noop | Term::BreakPoint => Ok(Flow::Next),
            Term::Return => {
                let value = if r.is_at_end() {
                    Object::Uninitialized
                } else {
                    self.eval(frame, r)?
                };
                Ok(Flow::Return(value))
            }
            Term::Fatal { fatal_type, code } => {
                let arg = self.eval_integer(frame, r)?;
                self.handler.fatal(fatal_type, code, arg);
                Err(AmlError::MethodFault {
                    fatal_type,
                    code,
                    arg,
                })
            }
            other => {
                self.eval_term(frame, r, other)?;
                Ok(Flow::Next)
            }
        }
    }

    fn exec_in_scope(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
        end: usize,
        scope: NodeHandle,
    ) -> Result<Flow, AmlError> {
        let mut body = sub(r, end)?;
        let saved = core::mem::replace(&mut frame.scope, scope);
        let flow = self.exec_term_list(frame, &mut body);
        frame.scope = saved;
        seek(r, end)?;
        flow
    }

    fn exec_if(&self, frame: &mut Frame, r: &mut BinaryReader<'_>, end: usize) -> Result<Flow, AmlError> {
        let mut body = sub(r, end)?;
        let taken = self.eval_integer(frame, &mut body)? != 0;
        let flow = if taken {
            self.exec_term_list(frame, &mut body)?
        } else {
            Flow::Next
        };
        seek(r, end)?;

        if r.peek() == Some(ELSE_OP) {
            let offset = r.position();
            let Term::Else { end: else_end } = decode_term(r)? else {
                return Err(AmlError::Parse {
                    offset,
                    kind: ParseErrorKind::UnexpectedTerm,
                });
            };
            if !taken {
                let mut body = sub(r, else_end)?;
                let flow = self.exec_term_list(frame, &mut body)?;
                seek(r, else_end)?;
                return Ok(flow);
            }
            seek(r, else_end)?;
        }
        Ok(flow)
    }

    fn exec_while(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
        end: usize,
    ) -> Result<Flow, AmlError> {
        let start = r.position();
        loop {
            let mut body = BinaryReader::with_range(r.data(), start, end).ok_or(AmlError::Parse {
                offset: start,
                kind: ParseErrorKind::InvalidPkgLength,
            })?;
            if self.eval_integer(frame, &mut body)? == 0 {
                break;
            }
            match self.exec_term_list(frame, &mut body)? {
                Flow::Break => break,
                Flow::Next | Flow::Continue => {}
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        seek(r, end)?;
        Ok(Flow::Next)
    }

    /// Create `name` relative to the frame's scope.
    ///
    /// A duplicate met while loading a table is logged and skipped
    /// (`Ok(None)`); inside a method it is an error. Nodes created by a
    /// method are recorded so they disappear when it returns.
    pub(super) fn define(
        &self,
        frame: &mut Frame,
        name: &AmlName,
        object: Object,
    ) -> Result<Option<NodeHandle>, AmlError> {
        let (parent, seg) = self.namespace.resolve_parent(frame.scope, name)?;
        match self.namespace.add_child(parent, seg, object) {
            Ok(node) => {
                if frame.in_method {
                    frame.created.push(node);
                }
                Ok(Some(node))
            }
            Err(AmlError::NameCollision(path)) if !frame.in_method => {
                log::warn!("aml: {path} is already defined; keeping the first definition");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`Interpreter::define`], but a duplicate scope-like object is
    /// reopened instead of skipped so its body still runs.
    fn define_or_existing(
        &self,
        frame: &mut Frame,
        name: &AmlName,
        object: Object,
    ) -> Result<NodeHandle, AmlError> {
        if let Some(node) = self.define(frame, name, object)? {
            return Ok(node);
        }
        let (parent, seg) = self.namespace.resolve_parent(frame.scope, name)?;
        let node = self
            .namespace
            .lookup_child(parent, seg)
            .ok_or_else(|| AmlError::NameNotFound(alloc::format!("{name}")))?;
        self.namespace.follow_alias(node)
    }

    fn define_fields(
        &self,
        frame: &mut Frame,
        body: &mut BinaryReader<'_>,
        flags: FieldFlags,
        kind: impl Fn() -> FieldKind,
    ) -> Result<(), AmlError> {
        let mut layout = FieldLayout::new(flags);
        while !body.is_at_end() {
            let element = decode_field_element(body)?;
            let Some(entry) = layout.apply(&element) else {
                continue;
            };
            let unit = FieldUnit {
                kind: kind(),
                bit_offset: entry.bit_offset,
                bit_length: entry.bit_length,
                access: entry.flags.access_type(),
                lock: entry.flags.lock(),
                update: entry.flags.update_rule(),
                width: frame.width,
            };
            if unit.lock {
                if let Some(region) = unit.lock_target() {
                    region.require_lock();
                }
            }
            if !unit.fits_region() {
                log::warn!(
                    "aml: field {} (bits {}..{}) extends past its region",
                    entry.name,
                    entry.bit_offset,
                    entry.bit_offset + entry.bit_length
                );
            }
            let name = AmlName::from_seg(entry.name);
            self.define(frame, &name, Object::FieldUnit(Arc::new(unit)))?;
        }
        Ok(())
    }

    fn region_named(&self, frame: &Frame, name: &AmlName) -> Result<Arc<OpRegion>, AmlError> {
        match self.namespace.object(self.namespace.resolve(frame.scope, name)?)? {
            Object::OperationRegion(region) => Ok(region),
            other => Err(other.type_error(ObjectType::OperationRegion)),
        }
    }

    fn field_named(&self, frame: &Frame, name: &AmlName) -> Result<Arc<FieldUnit>, AmlError> {
        match self.namespace.object(self.namespace.resolve(frame.scope, name)?)? {
            Object::FieldUnit(field) => Ok(field),
            other => Err(other.type_error(ObjectType::FieldUnit)),
        }
    }
}
