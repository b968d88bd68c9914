//! Minimal JVM class-file reader.
//!
//! Parses just enough of a class file to find what it references: the
//! constant pool, the class header, member names and descriptors, method
//! bytecode and the `BootstrapMethods` table. Annotations, signatures and
//! stack maps are skipped.

mod class;
mod code;
mod constant_pool;
mod descriptor;
mod error;
mod reader;

#[cfg(test)]
pub(crate) mod fixture;

pub use class::{Bootstrap, BootstrapMethod, ClassFile, FieldInfo, MethodInfo};
pub use code::Instruction;
pub use constant_pool::{HandleTarget, MemberSymbol};
pub use descriptor::{
    ElementType, FieldType, MAX_ARRAY_DIMENSIONS, MethodDescriptor, class_operand_name, parse_field_descriptor,
    parse_method_descriptor,
};
pub use error::{ClassFileError, Result};
