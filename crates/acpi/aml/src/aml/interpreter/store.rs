//! Targets and the `Store`/`CopyObject` write paths.

extern crate alloc;

use alloc::format;

use super::{Frame, Interpreter};
use crate::aml::convert;
use crate::aml::decoder::{Term, decode_term};
use crate::aml::namespace::NodeHandle;
use crate::aml::opcode::{Opcode, ZERO_OP};
use crate::aml::path::AmlName;
use crate::aml::value::{Object, ObjectType, Reference};
use crate::handler::Handler;
use crate::reader::BinaryReader;
use crate::{AmlError, ParseErrorKind};

/// Where a result goes.
#[derive(Debug, Clone)]
pub(crate) enum Target {
    /// `NullName`: discard.
    Null,
    /// The `Debug` object.
    Debug,
    Local(u8),
    Arg(u8),
    Node(NodeHandle),
    Reference(Reference),
}

impl<H: Handler> Interpreter<H> {
    /// Decode a `Target`: a `SuperName` or the null name.
    pub(super) fn parse_target(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
    ) -> Result<Target, AmlError> {
        if r.peek() == Some(ZERO_OP) {
            r.skip(1);
            return Ok(Target::Null);
        }
        self.parse_super_name(frame, r)
    }

    /// Decode a `SuperName` without reading through it.
    pub(super) fn parse_super_name(
        &self,
        frame: &mut Frame,
        r: &mut BinaryReader<'_>,
    ) -> Result<Target, AmlError> {
        let offset = r.position();
        match decode_term(r)? {
            Term::Local(n) => Ok(Target::Local(n)),
            Term::Arg(n) => Ok(Target::Arg(n)),
            Term::Debug => Ok(Target::Debug),
            Term::NameRef(name) => Ok(Target::Node(self.namespace.resolve(frame.scope, &name)?)),
            Term::Op(Opcode::DerefOf) => match self.eval(frame, r)? {
                Object::Reference(reference) => Ok(Target::Reference(reference)),
                Object::String(path) => Ok(Target::Node(self.resolve_string(frame, &path)?)),
                other => Err(other.type_error(ObjectType::Reference)),
            },
            Term::Op(op @ (Opcode::Index | Opcode::RefOf)) => {
                match self.eval_op(frame, r, op)? {
                    Object::Reference(reference) => Ok(Target::Reference(reference)),
                    other => Err(other.type_error(ObjectType::Reference)),
                }
            }
            _ => Err(AmlError::Parse {
                offset,
                kind: ParseErrorKind::UnexpectedTerm,
            }),
        }
    }

    /// Resolve a path held in a String object (used by `DerefOf("\\FOO")`).
    pub(super) fn resolve_string(&self, frame: &Frame, path: &str) -> Result<NodeHandle, AmlError> {
        let name = AmlName::parse(path)?;
        self.namespace.resolve(frame.scope, &name)
    }

    /// `Store(value, target)`: convert to the type already held by a named
    /// target; replace locals outright.
    pub(super) fn store(
        &self,
        frame: &mut Frame,
        target: &Target,
        value: Object,
    ) -> Result<(), AmlError> {
        match target {
            Target::Null => Ok(()),
            Target::Debug => {
                log::debug!("aml: Debug = {}", describe(&value));
                Ok(())
            }
            Target::Local(n) => {
                frame.locals[usize::from(*n)] = value.deep_copy();
                Ok(())
            }
            Target::Arg(n) => {
                if let Some(Object::Reference(reference)) = &frame.args[usize::from(*n)] {
                    let reference = reference.clone();
                    return self.store_reference(frame, &reference, value);
                }
                frame.args[usize::from(*n)] = Some(value.deep_copy());
                Ok(())
            }
            Target::Node(handle) => self.store_node(frame, *handle, value),
            Target::Reference(reference) => self.store_reference(frame, reference, value),
        }
    }

    fn store_node(&self, frame: &Frame, handle: NodeHandle, value: Object) -> Result<(), AmlError> {
        let width = frame.width;
        match self.namespace.object(handle)? {
            Object::FieldUnit(field) => {
                let bytes = convert::to_buffer(&value, width)?;
                field.write(&self.region_io(frame.depth), &bytes)
            }
            Object::Integer(_) => self
                .namespace
                .set_object(handle, Object::Integer(convert::to_integer(&value, width)?)),
            Object::String(_) => {
                let s = convert::to_string(&value, width, self.config.integer_format)?;
                self.namespace.set_object(handle, Object::String(s))
            }
            Object::Buffer(buffer) => {
                let bytes = convert::to_buffer(&value, width)?;
                *buffer.write() = bytes;
                Ok(())
            }
            Object::Package(_) => match value {
                Object::Package(_) => self.namespace.set_object(handle, value.deep_copy()),
                other => Err(other.type_error(ObjectType::Package)),
            },
            Object::Uninitialized | Object::Reference(_) => {
                self.namespace.set_object(handle, value.deep_copy())
            }
            other => Err(AmlError::Type {
                expected: value.object_type(),
                found: other.object_type(),
            }),
        }
    }

    fn store_reference(
        &self,
        frame: &Frame,
        reference: &Reference,
        value: Object,
    ) -> Result<(), AmlError> {
        match reference {
            Reference::Node(handle) => self.store_node(frame, *handle, value),
            Reference::Element { package, index } => {
                let value = value.deep_copy();
                let mut elements = package.write();
                let length = elements.len();
                let slot = elements.get_mut(*index).ok_or(AmlError::IndexOutOfBounds {
                    index: *index as u64,
                    length,
                })?;
                *slot = value;
                Ok(())
            }
            Reference::BufferByte { buffer, index } => {
                let byte = convert::to_integer(&value, frame.width)? as u8;
                let mut bytes = buffer.write();
                let length = bytes.len();
                let slot = bytes.get_mut(*index).ok_or(AmlError::IndexOutOfBounds {
                    index: *index as u64,
                    length,
                })?;
                *slot = byte;
                Ok(())
            }
            Reference::StringByte { node, index } => {
                let byte = convert::to_integer(&value, frame.width)? as u8;
                let mut bytes = match self.namespace.object(*node)? {
                    Object::String(s) => s.into_bytes(),
                    other => return Err(other.type_error(ObjectType::String)),
                };
                let length = bytes.len();
                let slot = bytes.get_mut(*index).ok_or(AmlError::IndexOutOfBounds {
                    index: *index as u64,
                    length,
                })?;
                *slot = byte;
                self.namespace.set_object(*node, Object::string_from_bytes(&bytes))
            }
        }
    }

    /// `CopyObject(value, target)`: replace the target wholesale.
    pub(super) fn copy_object(
        &self,
        frame: &mut Frame,
        target: &Target,
        value: Object,
    ) -> Result<(), AmlError> {
        match target {
            Target::Node(handle)
            | Target::Reference(Reference::Node(handle)) => {
                self.namespace.set_object(*handle, value.deep_copy())
            }
            Target::Arg(n) => {
                frame.args[usize::from(*n)] = Some(value.deep_copy());
                Ok(())
            }
            other => self.store(frame, other, value),
        }
    }

    /// The current value behind a target, reading fields and following
    /// references held in arguments.
    pub(super) fn read_target(&self, frame: &Frame, target: &Target) -> Result<Object, AmlError> {
        match target {
            Target::Null | Target::Debug => Err(AmlError::Unsupported("reading Debug or NullName")),
            Target::Local(n) => Ok(frame.locals[usize::from(*n)].clone()),
            Target::Arg(n) => match &frame.args[usize::from(*n)] {
                Some(Object::Reference(reference)) => self.deref(frame, reference),
                Some(value) => Ok(value.clone()),
                None => Err(AmlError::UninitializedArgument(*n)),
            },
            Target::Node(handle) => self.read_node(frame, *handle),
            Target::Reference(reference) => self.deref(frame, reference),
        }
    }

    /// The value of a node: fields are read, everything else is returned
    /// as stored.
    pub(super) fn read_node(&self, frame: &Frame, handle: NodeHandle) -> Result<Object, AmlError> {
        match self.namespace.object(handle)? {
            Object::FieldUnit(field) => field.read(&self.region_io(frame.depth), frame.width),
            other => Ok(other),
        }
    }

    /// `DerefOf` on a reference.
    pub(super) fn deref(&self, frame: &Frame, reference: &Reference) -> Result<Object, AmlError> {
        match reference {
            Reference::Node(handle) => self.read_node(frame, *handle),
            Reference::Element { package, index } => {
                let elements = package.read();
                elements
                    .get(*index)
                    .cloned()
                    .ok_or(AmlError::IndexOutOfBounds {
                        index: *index as u64,
                        length: elements.len(),
                    })
            }
            Reference::BufferByte { buffer, index } => {
                let bytes = buffer.read();
                bytes
                    .get(*index)
                    .map(|&b| Object::Integer(u64::from(b)))
                    .ok_or(AmlError::IndexOutOfBounds {
                        index: *index as u64,
                        length: bytes.len(),
                    })
            }
            Reference::StringByte { node, index } => match self.namespace.object(*node)? {
                Object::String(s) => s
                    .as_bytes()
                    .get(*index)
                    .map(|&b| Object::Integer(u64::from(b)))
                    .ok_or(AmlError::IndexOutOfBounds {
                        index: *index as u64,
                        length: s.len(),
                    }),
                other => Err(other.type_error(ObjectType::String)),
            },
        }
    }
}

/// Short human-readable form for `Debug` output.
fn describe(value: &Object) -> alloc::string::String {
    match value {
        Object::Integer(v) => format!("{v:#x}"),
        Object::String(s) => format!("\"{s}\""),
        Object::Buffer(b) => format!("Buffer {:02x?}", &*b.read()),
        Object::Package(p) => format!("Package ({} elements)", p.read().len()),
        other => format!("{:?}", other.object_type()),
    }
}
