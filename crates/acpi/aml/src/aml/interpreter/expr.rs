//! Expression evaluation: data objects, name references and operators.

extern crate alloc;

use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cmp::Ordering;

use super::exec::{seek, sub};
use super::store::Target;
use super::{Frame, INTERPRETER_REVISION, Interpreter};
use crate::aml::convert;
use crate::aml::decoder::{Term, decode_term, parse_name_string, read_byte, read_word};
use crate::aml::field::FieldUnit;
use crate::aml::namespace::NodeHandle;
use crate::aml::opcode::Opcode;
use crate::aml::path::AmlName;
use crate::aml::sync::{AmlEvent, AmlMutex, WAIT_FOREVER};
use crate::aml::value::{Object, ObjectType, Reference};
use crate::handler::Handler;
use crate::reader::BinaryReader;
use crate::{AmlError, ParseErrorKind};

/// Largest buffer or package a table may ask for.
const MAX_OBJECT_SIZE: u64 = 0x0100_0000;

impl<H: Handler> Interpreter<H> {
    /// Evaluate one TermArg.
    pub(super) fn eval(&self, frame: &mut Frame, r: &mut BinaryReader<'_>) -> Result<Object, AmlError> {
        let term = decode_term(r)?;
        self.eval_term(frame, r, term)
    }

    /// Evaluate one TermArg and convert it to an Integer of the frame's width.
    pub(super) fn eval_integer(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
    ) -> Result<u64, AmlError> {
        let value = self.eval(frame, r)?;
        convert::to_integer(&value, frame.width)
    }

    /// Evaluate an already-decoded term whose operands follow in `r`.
    pub(super) fn eval_term(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
        term: Term<'_>,
    ) -> Result<Object, AmlError> {
        match term {
            Term::Integer(v) => Ok(Object::Integer(frame.width.truncate(v))),
            Term::Ones => Ok(Object::Integer(frame.width.ones())),
            Term::Revision => Ok(Object::Integer(INTERPRETER_REVISION)),
            Term::String(bytes) => Ok(Object::string_from_bytes(bytes)),
            Term::Buffer { end } => self.eval_buffer(frame, r, end),
            Term::Package { end, count } => {
                let mut body = sub(r, end)?;
                let package = self.eval_package_elements(frame, &mut body, u64::from(count))?;
                seek(r, end)?;
                Ok(package)
            }
            Term::VarPackage { end } => {
                let mut body = sub(r, end)?;
                let count = self.eval_integer(frame, &mut body)?;
                let package = self.eval_package_elements(frame, &mut body, count)?;
                seek(r, end)?;
                Ok(package)
            }
            Term::Local(n) => Ok(frame.locals[usize::from(n)].clone()),
            Term::Arg(n) => frame.args[usize::from(n)]
                .clone()
                .ok_or(AmlError::UninitializedArgument(n)),
            Term::NameRef(name) => self.eval_name(frame, r, &name),
            Term::Op(op) => self.eval_op(frame, r, op),
            Term::Debug => Err(AmlError::Unsupported("Debug used as an operand")),
            _ => Err(AmlError::Parse {
                offset: r.position(),
                kind: ParseErrorKind::UnexpectedTerm,
            }),
        }
    }

    fn eval_buffer(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
        end: usize,
    ) -> Result<Object, AmlError> {
        let mut body = sub(r, end)?;
        let size = self.eval_integer(frame, &mut body)?;
        if size > MAX_OBJECT_SIZE {
            return Err(AmlError::IndexOutOfBounds {
                index: size,
                length: MAX_OBJECT_SIZE as usize,
            });
        }
        let mut bytes = body.remaining().to_vec();
        if bytes.len() < size as usize {
            bytes.resize(size as usize, 0);
        }
        seek(r, end)?;
        Ok(Object::buffer(bytes))
    }

    /// Package elements up to the end of `body`. Names become references
    /// when they resolve and strings holding the path when they do not.
    fn eval_package_elements(
        &self,
        frame: &mut Frame,
        body: &mut BinaryReader<'_>,
        count: u64,
    ) -> Result<Object, AmlError> {
        if count > MAX_OBJECT_SIZE {
            return Err(AmlError::IndexOutOfBounds {
                index: count,
                length: MAX_OBJECT_SIZE as usize,
            });
        }
        let count = count as usize;
        let mut elements = Vec::new();
        while !body.is_at_end() {
            let element = match decode_term(body)? {
                Term::NameRef(name) => match self.namespace.resolve(frame.scope, &name) {
                    Ok(node) => Object::Reference(Reference::Node(node)),
                    Err(_) => Object::String(format!("{name}")),
                },
                term => self.eval_term(frame, body, term)?,
            };
            elements.push(element);
        }
        if elements.len() > count {
            log::warn!(
                "aml: package declares {count} elements but has {}; truncating",
                elements.len()
            );
        }
        elements.resize(count, Object::Uninitialized);
        Ok(Object::package(elements))
    }

    fn eval_name(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
        name: &AmlName,
    ) -> Result<Object, AmlError> {
        let node = self
            .namespace
            .follow_alias(self.namespace.resolve(frame.scope, name)?)?;
        match self.namespace.object(node)? {
            Object::Method(method) => {
                let mut args = Vec::with_capacity(usize::from(method.arg_count));
                for _ in 0..method.arg_count {
                    args.push(self.eval(frame, r)?.deep_copy());
                }
                self.invoke(node, &method, args, frame.depth)
            }
            Object::FieldUnit(field) => field.read(&self.region_io(frame.depth), frame.width),
            other => Ok(other),
        }
    }

    /// Store `value` into `target` and hand it back as the expression's
    /// result.
    fn store_result(
        &self,
        frame: &mut Frame,
        target: &Target,
        value: Object,
    ) -> Result<Object, AmlError> {
        self.store(frame, target, value.clone())?;
        Ok(value)
    }

    fn binary(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
        op: impl FnOnce(u64, u64) -> Result<u64, AmlError>,
    ) -> Result<Object, AmlError> {
        let a = self.eval_integer(frame, r)?;
        let b = self.eval_integer(frame, r)?;
        let target = self.parse_target(frame, r)?;
        let result = Object::Integer(frame.width.truncate(op(a, b)?));
        self.store_result(frame, &target, result)
    }

    fn unary(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
        op: impl FnOnce(u64) -> u64,
    ) -> Result<Object, AmlError> {
        let a = self.eval_integer(frame, r)?;
        let target = self.parse_target(frame, r)?;
        let result = Object::Integer(frame.width.truncate(op(a)));
        self.store_result(frame, &target, result)
    }

    /// An operand and a target, with `op` turning the operand into the result.
    fn convert_op(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
        op: impl FnOnce(&Object, &Frame) -> Result<Object, AmlError>,
    ) -> Result<Object, AmlError> {
        let value = self.eval(frame, r)?;
        let target = self.parse_target(frame, r)?;
        let result = op(&value, frame)?;
        self.store_result(frame, &target, result)
    }

    fn logical(&self, frame: &Frame, value: bool) -> Object {
        Object::Integer(if value { frame.width.ones() } else { 0 })
    }

    fn compare_op(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
        want: Ordering,
    ) -> Result<Object, AmlError> {
        let a = self.eval(frame, r)?;
        let b = self.eval(frame, r)?;
        let ordering = convert::compare(&a, &b, frame.width, self.config.integer_format)?;
        Ok(self.logical(frame, ordering == want))
    }

    /// Evaluate an operator whose operands follow in `r`.
    #[allow(clippy::too_many_lines)]
    pub(super) fn eval_op(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
        op: Opcode,
    ) -> Result<Object, AmlError> {
        match op {
            Opcode::Store => {
                let value = self.eval(frame, r)?;
                let target = self.parse_super_name(frame, r)?;
                self.store(frame, &target, value.clone())?;
                Ok(value)
            }
            Opcode::CopyObject => {
                let value = self.eval(frame, r)?;
                let target = self.parse_super_name(frame, r)?;
                self.copy_object(frame, &target, value.clone())?;
                Ok(value)
            }

            Opcode::Add => self.binary(frame, r, |a, b| Ok(a.wrapping_add(b))),
            Opcode::Subtract => self.binary(frame, r, |a, b| Ok(a.wrapping_sub(b))),
            Opcode::Multiply => self.binary(frame, r, |a, b| Ok(a.wrapping_mul(b))),
            Opcode::ShiftLeft => self.binary(frame, r, |a, b| Ok(if b >= 64 { 0 } else { a << b })),
            Opcode::ShiftRight => {
                self.binary(frame, r, |a, b| Ok(if b >= 64 { 0 } else { a >> b }))
            }
            Opcode::And => self.binary(frame, r, |a, b| Ok(a & b)),
            Opcode::Nand => self.binary(frame, r, |a, b| Ok(!(a & b))),
            Opcode::Or => self.binary(frame, r, |a, b| Ok(a | b)),
            Opcode::Nor => self.binary(frame, r, |a, b| Ok(!(a | b))),
            Opcode::Xor => self.binary(frame, r, |a, b| Ok(a ^ b)),
            Opcode::Mod => self.binary(frame, r, |a, b| {
                a.checked_rem(b).ok_or(AmlError::DivideByZero)
            }),
            Opcode::Divide => {
                let dividend = self.eval_integer(frame, r)?;
                let divisor = self.eval_integer(frame, r)?;
                let remainder_target = self.parse_target(frame, r)?;
                let quotient_target = self.parse_target(frame, r)?;
                if divisor == 0 {
                    return Err(AmlError::DivideByZero);
                }
                self.store(frame, &remainder_target, Object::Integer(dividend % divisor))?;
                self.store_result(frame, &quotient_target, Object::Integer(dividend / divisor))
            }
            Opcode::Not => self.unary(frame, r, |a| !a),
            Opcode::FindSetLeftBit => {
                self.unary(frame, r, |a| if a == 0 { 0 } else { 64 - u64::from(a.leading_zeros()) })
            }
            Opcode::FindSetRightBit => {
                self.unary(frame, r, |a| if a == 0 { 0 } else { u64::from(a.trailing_zeros()) + 1 })
            }
            Opcode::Increment | Opcode::Decrement => {
                let target = self.parse_super_name(frame, r)?;
                let current = convert::to_integer(&self.read_target(frame, &target)?, frame.width)?;
                let next = if op == Opcode::Increment {
                    current.wrapping_add(1)
                } else {
                    current.wrapping_sub(1)
                };
                let result = Object::Integer(frame.width.truncate(next));
                self.store_result(frame, &target, result)
            }

            Opcode::LAnd => {
                let a = self.eval_integer(frame, r)?;
                let b = self.eval_integer(frame, r)?;
                Ok(self.logical(frame, a != 0 && b != 0))
            }
            Opcode::LOr => {
                let a = self.eval_integer(frame, r)?;
                let b = self.eval_integer(frame, r)?;
                Ok(self.logical(frame, a != 0 || b != 0))
            }
            Opcode::LNot => {
                let a = self.eval_integer(frame, r)?;
                Ok(self.logical(frame, a == 0))
            }
            Opcode::LEqual => self.compare_op(frame, r, Ordering::Equal),
            Opcode::LGreater => self.compare_op(frame, r, Ordering::Greater),
            Opcode::LLess => self.compare_op(frame, r, Ordering::Less),

            Opcode::ToBuffer => self.convert_op(frame, r, |v, f| {
                Ok(Object::buffer(convert::to_buffer(v, f.width)?))
            }),
            Opcode::ToDecimalString => self.convert_op(frame, r, |v, f| {
                Ok(Object::String(convert::to_decimal_string(v, f.width)?))
            }),
            Opcode::ToHexString => self.convert_op(frame, r, |v, f| {
                Ok(Object::String(convert::to_hex_string(v, f.width)?))
            }),
            Opcode::ToInteger => self.convert_op(frame, r, |v, f| {
                Ok(Object::Integer(convert::explicit_to_integer(v, f.width)?))
            }),
            Opcode::FromBcd => self.convert_op(frame, r, |v, f| {
                Ok(Object::Integer(convert::from_bcd(convert::to_integer(v, f.width)?)))
            }),
            Opcode::ToBcd => self.convert_op(frame, r, |v, f| {
                let value = convert::to_bcd(convert::to_integer(v, f.width)?);
                Ok(Object::Integer(f.width.truncate(value)))
            }),
            Opcode::ToString => {
                let value = self.eval(frame, r)?;
                let length = self.eval_integer(frame, r)?;
                let target = self.parse_target(frame, r)?;
                let limit = (length < frame.width.ones()).then_some(length as usize);
                let result = Object::String(convert::buffer_to_string(&value, limit)?);
                self.store_result(frame, &target, result)
            }
            Opcode::Mid => {
                let source = self.eval(frame, r)?;
                let index = self.eval_integer(frame, r)?;
                let length = self.eval_integer(frame, r)?;
                let target = self.parse_target(frame, r)?;
                let result = mid(&source, index, length)?;
                self.store_result(frame, &target, result)
            }
            Opcode::Concat => {
                let a = self.eval(frame, r)?;
                let b = self.eval(frame, r)?;
                let target = self.parse_target(frame, r)?;
                let result = self.concat(frame, &a, &b)?;
                self.store_result(frame, &target, result)
            }
            Opcode::ConcatRes => {
                let a = self.eval(frame, r)?;
                let b = self.eval(frame, r)?;
                let target = self.parse_target(frame, r)?;
                let mut bytes = strip_end_tag(&convert::to_buffer(&a, frame.width)?);
                bytes.extend_from_slice(&strip_end_tag(&convert::to_buffer(&b, frame.width)?));
                bytes.extend_from_slice(&[0x79, 0x00]);
                self.store_result(frame, &target, Object::buffer(bytes))
            }

            Opcode::SizeOf => {
                let target = self.parse_super_name(frame, r)?;
                let size = match self.read_target(frame, &target)? {
                    Object::String(s) => s.len(),
                    Object::Buffer(b) => b.read().len(),
                    Object::Package(p) => p.read().len(),
                    other => return Err(other.type_error(ObjectType::Buffer)),
                };
                Ok(Object::Integer(size as u64))
            }
            Opcode::Index => {
                let named = self.named_string(frame, r)?;
                let source = match named {
                    Some(_) => Object::Uninitialized,
                    None => self.eval(frame, r)?,
                };
                let index = self.eval_integer(frame, r)?;
                let target = self.parse_target(frame, r)?;
                let reference = match named {
                    Some((node, length)) => Reference::StringByte {
                        node,
                        index: checked_index(index, length)?,
                    },
                    None => index_of(source, index)?,
                };
                self.store_result(frame, &target, Object::Reference(reference))
            }
            Opcode::Match => self.eval_match(frame, r),
            Opcode::DerefOf => match self.eval(frame, r)? {
                Object::Reference(reference) => self.deref(frame, &reference),
                Object::String(path) => {
                    let node = self.resolve_string(frame, &path)?;
                    self.read_node(frame, node)
                }
                other => Err(other.type_error(ObjectType::Reference)),
            },
            Opcode::RefOf => Ok(Object::Reference(self.parse_reference(frame, r)?)),
            Opcode::CondRefOf => {
                let found = match decode_term(r)? {
                    Term::NameRef(name) => self
                        .namespace
                        .resolve(frame.scope, &name)
                        .ok()
                        .map(Reference::Node),
                    Term::Local(n) => match &frame.locals[usize::from(n)] {
                        Object::Reference(reference) => Some(reference.clone()),
                        _ => None,
                    },
                    Term::Arg(n) => match &frame.args[usize::from(n)] {
                        Some(Object::Reference(reference)) => Some(reference.clone()),
                        _ => None,
                    },
                    Term::Op(inner) => match self.eval_op(frame, r, inner)? {
                        Object::Reference(reference) => Some(reference),
                        _ => None,
                    },
                    _ => None,
                };
                let target = self.parse_target(frame, r)?;
                match found {
                    Some(reference) => {
                        self.store(frame, &target, Object::Reference(reference))?;
                        Ok(self.logical(frame, true))
                    }
                    None => Ok(Object::Integer(0)),
                }
            }
            Opcode::ObjectType => {
                let ty = match decode_term(r)? {
                    Term::NameRef(name) => {
                        let node = self.namespace.resolve(frame.scope, &name)?;
                        self.namespace.object(node)?.object_type()
                    }
                    Term::Local(n) => frame.locals[usize::from(n)].object_type(),
                    Term::Arg(n) => frame.args[usize::from(n)]
                        .as_ref()
                        .map_or(ObjectType::Uninitialized, Object::object_type),
                    Term::Debug => ObjectType::Debug,
                    Term::Op(inner) => self.eval_op(frame, r, inner)?.object_type(),
                    _ => {
                        return Err(AmlError::Parse {
                            offset: r.position(),
                            kind: ParseErrorKind::UnexpectedTerm,
                        });
                    }
                };
                Ok(Object::Integer(ty.code()))
            }

            Opcode::CreateBitField => self.create_field(frame, r, Some(1), false),
            Opcode::CreateByteField => self.create_field(frame, r, Some(8), true),
            Opcode::CreateWordField => self.create_field(frame, r, Some(16), true),
            Opcode::CreateDWordField => self.create_field(frame, r, Some(32), true),
            Opcode::CreateQWordField => self.create_field(frame, r, Some(64), true),
            Opcode::CreateField => self.create_field(frame, r, None, false),

            Opcode::Timer => Ok(Object::Integer(self.handler.timer())),
            Opcode::Stall => {
                let us = self.eval_integer(frame, r)?;
                self.handler.stall_us(us);
                Ok(Object::Uninitialized)
            }
            Opcode::Sleep => {
                let ms = self.eval_integer(frame, r)?;
                self.handler.sleep_ms(ms);
                Ok(Object::Uninitialized)
            }
            Opcode::Acquire => {
                let mutex = self.mutex_operand(frame, r)?;
                let timeout = read_word(r)?;
                let acquired = self.sync.acquire(&self.handler, &mutex, timeout)?;
                Ok(self.logical(frame, !acquired))
            }
            Opcode::Release => {
                let mutex = self.mutex_operand(frame, r)?;
                self.sync.release(&self.handler, &mutex)?;
                Ok(Object::Uninitialized)
            }
            Opcode::Signal => {
                let event = self.event_operand(frame, r)?;
                event.signal(&self.handler);
                Ok(Object::Uninitialized)
            }
            Opcode::Reset => {
                self.event_operand(frame, r)?.reset();
                Ok(Object::Uninitialized)
            }
            Opcode::Wait => {
                let event = self.event_operand(frame, r)?;
                let timeout = self.eval_integer(frame, r)?.min(u64::from(WAIT_FOREVER)) as u16;
                let signalled = event.wait(&self.handler, timeout);
                Ok(self.logical(frame, !signalled))
            }
            Opcode::Notify => {
                let target = self.parse_super_name(frame, r)?;
                let value = self.eval_integer(frame, r)?;
                let node = match target {
                    Target::Node(node) | Target::Reference(Reference::Node(node)) => node,
                    Target::Local(n) => match &frame.locals[usize::from(n)] {
                        Object::Reference(Reference::Node(node)) => *node,
                        other => return Err(other.type_error(ObjectType::Device)),
                    },
                    _ => return Err(AmlError::Unsupported("Notify on a non-node target")),
                };
                let path = self.namespace.path_of(node);
                log::debug!("aml: Notify({path}, {value:#x})");
                self.handler.notify(&path, value);
                Ok(Object::Uninitialized)
            }

            Opcode::Load | Opcode::LoadTable | Opcode::Unload => {
                Err(AmlError::Unsupported("dynamic table loading"))
            }
        }
    }

    /// `Concatenate`: the result type follows the first operand, except
    /// that an Integer followed by a String yields a String.
    fn concat(&self, frame: &Frame, a: &Object, b: &Object) -> Result<Object, AmlError> {
        let width = frame.width;
        let format = self.config.integer_format;
        match (a, b) {
            (Object::String(_), _) | (Object::Integer(_), Object::String(_)) => {
                let mut s = convert::to_string(a, width, format)?;
                s.push_str(&convert::to_string(b, width, format)?);
                Ok(Object::String(s))
            }
            (Object::Integer(_) | Object::Buffer(_), _) => {
                let mut bytes = convert::to_buffer(a, width)?;
                bytes.extend_from_slice(&convert::to_buffer(b, width)?);
                Ok(Object::buffer(bytes))
            }
            (other, _) => Err(other.type_error(ObjectType::Buffer)),
        }
    }

    fn eval_match(&self, frame: &mut Frame, r: &mut BinaryReader<'_>) -> Result<Object, AmlError> {
        let package = match self.eval(frame, r)? {
            Object::Package(p) => p,
            other => return Err(other.type_error(ObjectType::Package)),
        };
        let op1 = read_byte(r)?;
        let obj1 = self.eval(frame, r)?;
        let op2 = read_byte(r)?;
        let obj2 = self.eval(frame, r)?;
        let start = self.eval_integer(frame, r)?;

        let elements = package.read().clone();
        let format = self.config.integer_format;
        let matches = |element: &Object, op: u8, obj: &Object| -> bool {
            if op == 0 {
                return true;
            }
            let Ok(ordering) = convert::compare(element, obj, frame.width, format) else {
                return false;
            };
            match op {
                1 => ordering == Ordering::Equal,
                2 => ordering != Ordering::Greater,
                3 => ordering == Ordering::Less,
                4 => ordering != Ordering::Less,
                5 => ordering == Ordering::Greater,
                _ => false,
            }
        };
        let found = elements
            .iter()
            .enumerate()
            .skip(usize::try_from(start).unwrap_or(usize::MAX))
            .find(|(_, e)| matches(e, op1, &obj1) && matches(e, op2, &obj2))
            .map(|(i, _)| i as u64);
        Ok(Object::Integer(found.unwrap_or(frame.width.ones())))
    }

    /// `CreateXxxField(buffer, index, name)` and `CreateField(buffer, bit,
    /// bits, name)`. Byte-granular forms take a byte index.
    fn create_field(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
        bits: Option<u64>,
        byte_index: bool,
    ) -> Result<Object, AmlError> {
        let buffer = match self.eval(frame, r)? {
            Object::Buffer(b) => b,
            other => return Err(other.type_error(ObjectType::Buffer)),
        };
        let index = self.eval_integer(frame, r)?;
        let bit_length = match bits {
            Some(bits) => bits,
            None => self.eval_integer(frame, r)?,
        };
        let name = parse_name_string(r)?;
        let bit_offset = if byte_index {
            index.saturating_mul(8)
        } else {
            index
        };
        let length = buffer.read().len() as u64;
        if bit_offset.saturating_add(bit_length) > length * 8 {
            return Err(AmlError::IndexOutOfBounds {
                index: bit_offset.saturating_add(bit_length).div_ceil(8),
                length: length as usize,
            });
        }
        let field = FieldUnit::buffer_field(buffer, bit_offset, bit_length, frame.width);
        self.define(frame, &name, Object::FieldUnit(Arc::new(field)))?;
        Ok(Object::Uninitialized)
    }

    /// The operand of `RefOf`.
    fn parse_reference(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
    ) -> Result<Reference, AmlError> {
        match self.parse_super_name(frame, r)? {
            Target::Node(node) => Ok(Reference::Node(node)),
            Target::Reference(reference) => Ok(reference),
            Target::Local(n) => match &frame.locals[usize::from(n)] {
                Object::Reference(reference) => Ok(reference.clone()),
                _ => Err(AmlError::Unsupported("RefOf a local variable")),
            },
            Target::Arg(n) => match &frame.args[usize::from(n)] {
                Some(Object::Reference(reference)) => Ok(reference.clone()),
                _ => Err(AmlError::Unsupported("RefOf an argument")),
            },
            Target::Null | Target::Debug => Err(AmlError::Unsupported("RefOf Debug")),
        }
    }

    /// The object named by a SuperName operand, without reading fields or
    /// invoking methods.
    fn object_operand(&self, frame: &mut Frame, r: &mut BinaryReader<'_>) -> Result<Object, AmlError> {
        let value = match self.parse_super_name(frame, r)? {
            Target::Node(node) => return self.namespace.object(node),
            Target::Local(n) => frame.locals[usize::from(n)].clone(),
            Target::Arg(n) => frame.args[usize::from(n)]
                .clone()
                .ok_or(AmlError::UninitializedArgument(n))?,
            Target::Reference(reference) => Object::Reference(reference),
            Target::Null | Target::Debug => return Err(AmlError::Unsupported("Debug operand")),
        };
        match value {
            Object::Reference(Reference::Node(node)) => self.namespace.object(node),
            other => Ok(other),
        }
    }

    /// If the next term names a String object, consume it and return the
    /// node and the string's length. Otherwise leave the reader untouched.
    fn named_string(
        &self,
        frame: &Frame,
        r: &mut BinaryReader<'_>,
    ) -> Result<Option<(NodeHandle, usize)>, AmlError> {
        let start = r.position();
        if let Term::NameRef(name) = decode_term(r)? {
            let node = self
                .namespace
                .follow_alias(self.namespace.resolve(frame.scope, &name)?)?;
            if let Object::String(s) = self.namespace.object(node)? {
                return Ok(Some((node, s.len())));
            }
        }
        seek(r, start)?;
        Ok(None)
    }

    fn mutex_operand(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
    ) -> Result<Arc<AmlMutex>, AmlError> {
        match self.object_operand(frame, r)? {
            Object::Mutex(mutex) => Ok(mutex),
            other => Err(other.type_error(ObjectType::Mutex)),
        }
    }

    fn event_operand(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
    ) -> Result<Arc<AmlEvent>, AmlError> {
        match self.object_operand(frame, r)? {
            Object::Event(event) => Ok(event),
            other => Err(other.type_error(ObjectType::Event)),
        }
    }
}

fn checked_index(index: u64, length: usize) -> Result<usize, AmlError> {
    if index < length as u64 {
        Ok(index as usize)
    } else {
        Err(AmlError::IndexOutOfBounds { index, length })
    }
}

/// `Index(source, index)` on a computed value. Strings that are not named
/// objects are indexed through a private copy.
fn index_of(source: Object, index: u64) -> Result<Reference, AmlError> {
    let check = |length: usize| checked_index(index, length);
    match source {
        Object::Package(package) => {
            let index = check(package.read().len())?;
            Ok(Reference::Element { package, index })
        }
        Object::Buffer(buffer) => {
            let index = check(buffer.read().len())?;
            Ok(Reference::BufferByte { buffer, index })
        }
        Object::String(s) => {
            let index = check(s.len())?;
            let buffer = Arc::new(spin::RwLock::new(s.into_bytes()));
            Ok(Reference::BufferByte { buffer, index })
        }
        other => Err(other.type_error(ObjectType::Package)),
    }
}

/// `Mid(source, index, length)`; out-of-range requests are clipped.
fn mid(source: &Object, index: u64, length: u64) -> Result<Object, AmlError> {
    let clip = |len: usize| {
        let start = usize::try_from(index).unwrap_or(usize::MAX).min(len);
        let end = start.saturating_add(usize::try_from(length).unwrap_or(usize::MAX)).min(len);
        start..end
    };
    match source {
        Object::String(s) => {
            let range = clip(s.len());
            Ok(Object::string_from_bytes(&s.as_bytes()[range]))
        }
        Object::Buffer(b) => {
            let bytes = b.read();
            let range = clip(bytes.len());
            Ok(Object::buffer(bytes[range].to_vec()))
        }
        other => Err(other.type_error(ObjectType::Buffer)),
    }
}

/// Resource template bytes without a trailing end tag.
fn strip_end_tag(bytes: &[u8]) -> Vec<u8> {
    match bytes {
        [rest @ .., 0x79, _] => rest.to_vec(),
        _ => bytes.to_vec(),
    }
}
