use super::code::{Instruction, decode_instructions};
use super::constant_pool::{ConstantPool, HandleTarget};
use super::error::{ClassFileError, Result};
use super::reader::Reader;

const MAGIC: u32 = 0xCAFEBABE;

#[derive(Debug, Clone)]
pub struct ClassFile<'a> {
    pub(crate) constant_pool: ConstantPool,
    pub major_version: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo<'a>>,
    pub bootstrap_methods: Vec<BootstrapMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo<'a> {
    pub name: String,
    pub descriptor: String,
    /// Raw bytecode; `None` for abstract and native methods.
    pub code: Option<&'a [u8]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    pub method_ref: u16,
    pub arguments: Vec<u16>,
}

/// A resolved `BootstrapMethods` entry.
#[derive(Debug, Clone)]
pub struct Bootstrap<'a> {
    pub handle: HandleTarget<'a>,
    pub arguments: &'a [u16],
}

impl<'a> ClassFile<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let _minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let _access_flags = reader.read_u2()?;
        let this_class = cp.get_class_name(reader.read_u2()?)?.to_string();
        let super_index = reader.read_u2()?;
        let super_class = if super_index == 0 {
            None
        } else {
            Some(cp.get_class_name(super_index)?.to_string())
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(cp.get_class_name(reader.read_u2()?)?.to_string());
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            let (name, descriptor, _) = parse_member(&mut reader, &cp)?;
            fields.push(FieldInfo { name, descriptor });
        }

        let methods_count = reader.read_u2()? as usize;
        let mut methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            let (name, descriptor, code) = parse_member(&mut reader, &cp)?;
            methods.push(MethodInfo {
                name,
                descriptor,
                code,
            });
        }

        let bootstrap_methods = parse_class_attributes(&mut reader, &cp)?;

        Ok(Self {
            constant_pool: cp,
            major_version,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            bootstrap_methods,
        })
    }

    pub fn instructions(&self, method: &MethodInfo<'a>) -> Result<Vec<Instruction<'_>>> {
        match method.code {
            Some(code) => decode_instructions(code, &self.constant_pool),
            None => Ok(Vec::new()),
        }
    }

    pub fn bootstrap(&self, index: u16) -> Result<Bootstrap<'_>> {
        let method = self
            .bootstrap_methods
            .get(index as usize)
            .ok_or(ClassFileError::InvalidBootstrapIndex(index))?;
        Ok(Bootstrap {
            handle: self.constant_pool.get_method_handle(method.method_ref)?,
            arguments: &method.arguments,
        })
    }

    pub fn method_handle(&self, index: u16) -> Result<HandleTarget<'_>> {
        self.constant_pool.get_method_handle(index)
    }

    pub fn method_type(&self, index: u16) -> Result<&str> {
        self.constant_pool.get_method_type(index)
    }
}

fn parse_member<'a>(
    reader: &mut Reader<'a>,
    cp: &ConstantPool,
) -> Result<(String, String, Option<&'a [u8]>)> {
    let _access_flags = reader.read_u2()?;
    let name = cp.get_utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.get_utf8(reader.read_u2()?)?.to_string();

    let mut code = None;
    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        if cp.get_utf8(name_index)? == "Code" {
            code = Some(parse_code(info)?);
        }
    }

    Ok((name, descriptor, code))
}

fn parse_code(info: &[u8]) -> Result<&[u8]> {
    let mut sub = Reader::new(info);
    let _max_stack = sub.read_u2()?;
    let _max_locals = sub.read_u2()?;
    let code_length = sub.read_u4()? as usize;
    sub.read_bytes(code_length)
        .map_err(|_| ClassFileError::MalformedAttribute("Code"))
}

fn parse_class_attributes(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Vec<BootstrapMethod>> {
    let mut bootstrap_methods = Vec::new();
    let attributes_count = reader.read_u2()? as usize;
    for _ in 0..attributes_count {
        let name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        if cp.get_utf8(name_index)? != "BootstrapMethods" {
            continue;
        }

        let mut sub = Reader::new(info);
        let malformed = |_| ClassFileError::MalformedAttribute("BootstrapMethods");
        let count = sub.read_u2().map_err(malformed)? as usize;
        for _ in 0..count {
            let method_ref = sub.read_u2().map_err(malformed)?;
            let argc = sub.read_u2().map_err(malformed)? as usize;
            let mut arguments = Vec::with_capacity(argc);
            for _ in 0..argc {
                arguments.push(sub.read_u2().map_err(malformed)?);
            }
            bootstrap_methods.push(BootstrapMethod {
                method_ref,
                arguments,
            });
        }
    }
    Ok(bootstrap_methods)
}
