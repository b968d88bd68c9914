use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClassFileError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid classfile magic: 0x{0:08x}")]
    InvalidMagic(u32),
    #[error("invalid constant pool index: {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("invalid constant pool tag: {0}")]
    InvalidConstantPoolTag(u8),
    #[error("constant pool type mismatch at index {index}: expected {expected}, found {found}")]
    ConstantPoolTypeMismatch {
        index: u16,
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid modified UTF-8 constant")]
    InvalidModifiedUtf8,
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
    #[error("invalid opcode 0x{opcode:02x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },
    #[error("invalid method handle kind: {0}")]
    InvalidHandleKind(u8),
    #[error("invalid bootstrap method index: {0}")]
    InvalidBootstrapIndex(u16),
    #[error("malformed {0} attribute")]
    MalformedAttribute(&'static str),
}
