//! AML (ACPI Machine Language) decoding and execution.
//!
//! Tables are decoded term by term straight from their byte slices. The load
//! pass builds the [`namespace::Namespace`] and records method bodies as byte
//! spans; the [`interpreter::Interpreter`] decodes those spans again each
//! time a method is invoked.

pub mod convert;
pub mod decoder;
pub mod device;
pub mod field;
pub mod interpreter;
pub mod namespace;
pub mod opcode;
pub mod path;
pub mod sync;
pub mod value;

pub use interpreter::{IntegerFormat, Interpreter, InterpreterConfig};
pub use namespace::{Namespace, NodeHandle};
pub use path::{AmlName, NameSeg};
pub use value::{EisaId, Object, ObjectType};
