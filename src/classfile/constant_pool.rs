use super::error::{ClassFileError, Result};
use super::reader::Reader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Constant {
    /// Slot 0 and the second slot of long/double constants.
    Unusable,
    Utf8(String),
    Integer,
    Float,
    Long,
    Double,
    Class { name_index: u16 },
    String,
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic,
    InvokeDynamic { bootstrap_index: u16, name_and_type_index: u16 },
    Module,
    Package,
}

impl Constant {
    fn kind(&self) -> &'static str {
        match self {
            Constant::Unusable => "unusable",
            Constant::Utf8(_) => "Utf8",
            Constant::Integer => "Integer",
            Constant::Float => "Float",
            Constant::Long => "Long",
            Constant::Double => "Double",
            Constant::Class { .. } => "Class",
            Constant::String => "String",
            Constant::FieldRef { .. } => "Fieldref",
            Constant::MethodRef { .. } => "Methodref",
            Constant::InterfaceMethodRef { .. } => "InterfaceMethodref",
            Constant::NameAndType { .. } => "NameAndType",
            Constant::MethodHandle { .. } => "MethodHandle",
            Constant::MethodType { .. } => "MethodType",
            Constant::Dynamic => "Dynamic",
            Constant::InvokeDynamic { .. } => "InvokeDynamic",
            Constant::Module => "Module",
            Constant::Package => "Package",
        }
    }
}

/// A field or method reference resolved through the constant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberSymbol<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleTarget<'a> {
    Field(MemberSymbol<'a>),
    Method(MemberSymbol<'a>),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let tag = reader.read_u1()?;
            let constant = match tag {
                1 => {
                    let len = reader.read_u2()? as usize;
                    Constant::Utf8(decode_modified_utf8(reader.read_bytes(len)?)?)
                }
                3 => {
                    reader.skip(4)?;
                    Constant::Integer
                }
                4 => {
                    reader.skip(4)?;
                    Constant::Float
                }
                5 => {
                    reader.skip(8)?;
                    Constant::Long
                }
                6 => {
                    reader.skip(8)?;
                    Constant::Double
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 => {
                    reader.skip(2)?;
                    Constant::String
                }
                9 => Constant::FieldRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                10 => Constant::MethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                11 => Constant::InterfaceMethodRef {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                12 => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                15 => Constant::MethodHandle {
                    kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                16 => Constant::MethodType {
                    descriptor_index: reader.read_u2()?,
                },
                17 => {
                    reader.skip(4)?;
                    Constant::Dynamic
                }
                18 => Constant::InvokeDynamic {
                    bootstrap_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                19 => {
                    reader.skip(2)?;
                    Constant::Module
                }
                20 => {
                    reader.skip(2)?;
                    Constant::Package
                }
                other => return Err(ClassFileError::InvalidConstantPoolTag(other)),
            };

            let wide = matches!(constant, Constant::Long | Constant::Double);
            entries.push(constant);
            if wide {
                entries.push(Constant::Unusable);
            }
        }

        Ok(Self { entries })
    }

    pub(crate) fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => Err(ClassFileError::InvalidConstantPoolIndex(index)),
            Some(constant) => Ok(constant),
        }
    }

    pub(crate) fn get_utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            other => Err(mismatch(index, "Utf8", other)),
        }
    }

    pub(crate) fn get_class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.get_utf8(*name_index),
            other => Err(mismatch(index, "Class", other)),
        }
    }

    pub(crate) fn get_name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.get_utf8(*name_index)?, self.get_utf8(*descriptor_index)?)),
            other => Err(mismatch(index, "NameAndType", other)),
        }
    }

    /// Resolves a `Fieldref`, `Methodref` or `InterfaceMethodref`.
    pub(crate) fn get_member(&self, index: u16) -> Result<MemberSymbol<'_>> {
        let (class_index, name_and_type_index) = match self.get(index)? {
            Constant::FieldRef {
                class_index,
                name_and_type_index,
            }
            | Constant::MethodRef {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            } => (*class_index, *name_and_type_index),
            other => return Err(mismatch(index, "member reference", other)),
        };
        let owner = self.get_class_name(class_index)?;
        let (name, descriptor) = self.get_name_and_type(name_and_type_index)?;
        Ok(MemberSymbol {
            owner,
            name,
            descriptor,
        })
    }

    pub(crate) fn get_method_handle(&self, index: u16) -> Result<HandleTarget<'_>> {
        match self.get(index)? {
            Constant::MethodHandle {
                kind,
                reference_index,
            } => {
                let member = self.get_member(*reference_index)?;
                match kind {
                    1..=4 => Ok(HandleTarget::Field(member)),
                    5..=9 => Ok(HandleTarget::Method(member)),
                    other => Err(ClassFileError::InvalidHandleKind(*other)),
                }
            }
            other => Err(mismatch(index, "MethodHandle", other)),
        }
    }

    pub(crate) fn get_method_type(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::MethodType { descriptor_index } => self.get_utf8(*descriptor_index),
            other => Err(mismatch(index, "MethodType", other)),
        }
    }

    pub(crate) fn get_invoke_dynamic(&self, index: u16) -> Result<(u16, &str, &str)> {
        match self.get(index)? {
            Constant::InvokeDynamic {
                bootstrap_index,
                name_and_type_index,
            } => {
                let (name, descriptor) = self.get_name_and_type(*name_and_type_index)?;
                Ok((*bootstrap_index, name, descriptor))
            }
            other => Err(mismatch(index, "InvokeDynamic", other)),
        }
    }
}

fn mismatch(index: u16, expected: &'static str, found: &Constant) -> ClassFileError {
    ClassFileError::ConstantPoolTypeMismatch {
        index,
        expected,
        found: found.kind(),
    }
}

/// Decodes the JVM's modified UTF-8 (two-byte NUL, surrogate pairs encoded
/// as separate three-byte sequences).
pub(crate) fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    if bytes.iter().all(|b| (0x01..0x80).contains(b)) {
        return std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| ClassFileError::InvalidModifiedUtf8);
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return Err(ClassFileError::InvalidModifiedUtf8);
            }
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let b1 = continuation(bytes, i + 1)?;
            units.push((((b0 & 0x1F) as u16) << 6) | b1);
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let b1 = continuation(bytes, i + 1)?;
            let b2 = continuation(bytes, i + 2)?;
            units.push((((b0 & 0x0F) as u16) << 12) | (b1 << 6) | b2);
            i += 3;
        } else {
            return Err(ClassFileError::InvalidModifiedUtf8);
        }
    }

    String::from_utf16(&units).map_err(|_| ClassFileError::InvalidModifiedUtf8)
}

fn continuation(bytes: &[u8], at: usize) -> Result<u16> {
    match bytes.get(at) {
        Some(b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
        _ => Err(ClassFileError::InvalidModifiedUtf8),
    }
}
