//! Bytecode walker.
//!
//! Decodes a method's `Code` array just far enough to surface the
//! instructions that reference other classes, fields or methods. Every other
//! opcode is skipped by its operand width.

use super::constant_pool::{Constant, ConstantPool, MemberSymbol};
use super::error::{ClassFileError, Result};
use super::reader::Reader;

const LDC: u8 = 0x12;
const LDC_W: u8 = 0x13;
const TABLESWITCH: u8 = 0xaa;
const LOOKUPSWITCH: u8 = 0xab;
const GETSTATIC: u8 = 0xb2;
const PUTFIELD: u8 = 0xb5;
const INVOKEVIRTUAL: u8 = 0xb6;
const INVOKESTATIC: u8 = 0xb8;
const INVOKEINTERFACE: u8 = 0xb9;
const INVOKEDYNAMIC: u8 = 0xba;
const CHECKCAST: u8 = 0xc0;
const INSTANCEOF: u8 = 0xc1;
const WIDE: u8 = 0xc4;
const IINC: u8 = 0x84;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction<'a> {
    /// `getstatic`, `putstatic`, `getfield`, `putfield`.
    FieldAccess(MemberSymbol<'a>),
    /// `invokevirtual`, `invokespecial`, `invokestatic`, `invokeinterface`.
    Invoke(MemberSymbol<'a>),
    /// `checkcast` or `instanceof`; the operand may be an array descriptor.
    TypeCheck(&'a str),
    /// `ldc` / `ldc_w` of a class constant.
    LoadClass(&'a str),
    InvokeDynamic {
        bootstrap_index: u16,
        name: &'a str,
        descriptor: &'a str,
    },
}

pub(crate) fn decode_instructions<'a>(code: &[u8], cp: &'a ConstantPool) -> Result<Vec<Instruction<'a>>> {
    let mut reader = Reader::new(code);
    let mut out = Vec::new();

    while !reader.is_empty() {
        let offset = reader.position();
        let opcode = reader.read_u1()?;
        match opcode {
            LDC => {
                let index = reader.read_u1()? as u16;
                push_class_constant(cp, index, &mut out)?;
            }
            LDC_W => {
                let index = reader.read_u2()?;
                push_class_constant(cp, index, &mut out)?;
            }
            GETSTATIC..=PUTFIELD => {
                out.push(Instruction::FieldAccess(cp.get_member(reader.read_u2()?)?));
            }
            INVOKEVIRTUAL..=INVOKESTATIC => {
                out.push(Instruction::Invoke(cp.get_member(reader.read_u2()?)?));
            }
            INVOKEINTERFACE => {
                out.push(Instruction::Invoke(cp.get_member(reader.read_u2()?)?));
                reader.skip(2)?;
            }
            INVOKEDYNAMIC => {
                let (bootstrap_index, name, descriptor) = cp.get_invoke_dynamic(reader.read_u2()?)?;
                reader.skip(2)?;
                out.push(Instruction::InvokeDynamic {
                    bootstrap_index,
                    name,
                    descriptor,
                });
            }
            CHECKCAST | INSTANCEOF => {
                out.push(Instruction::TypeCheck(cp.get_class_name(reader.read_u2()?)?));
            }
            TABLESWITCH => {
                skip_padding(&mut reader, offset)?;
                let _default = reader.read_i4()?;
                let low = reader.read_i4()?;
                let high = reader.read_i4()?;
                let entries = (high as i64) - (low as i64) + 1;
                if entries < 0 {
                    return Err(ClassFileError::MalformedAttribute("Code"));
                }
                reader.skip(entries as usize * 4)?;
            }
            LOOKUPSWITCH => {
                skip_padding(&mut reader, offset)?;
                let _default = reader.read_i4()?;
                let pairs = reader.read_i4()?;
                if pairs < 0 {
                    return Err(ClassFileError::MalformedAttribute("Code"));
                }
                reader.skip(pairs as usize * 8)?;
            }
            WIDE => {
                let widened = reader.read_u1()?;
                reader.skip(if widened == IINC { 4 } else { 2 })?;
            }
            other => {
                let width = operand_width(other).ok_or(ClassFileError::InvalidOpcode {
                    opcode: other,
                    offset,
                })?;
                reader.skip(width)?;
            }
        }
    }

    Ok(out)
}

fn push_class_constant<'a>(cp: &'a ConstantPool, index: u16, out: &mut Vec<Instruction<'a>>) -> Result<()> {
    if let Constant::Class { .. } = cp.get(index)? {
        out.push(Instruction::LoadClass(cp.get_class_name(index)?));
    }
    Ok(())
}

/// Switch operands start on the next four-byte boundary of the code array.
fn skip_padding(reader: &mut Reader<'_>, opcode_offset: usize) -> Result<()> {
    let pad = (4 - (opcode_offset + 1) % 4) % 4;
    reader.skip(pad)
}

/// Operand width of fixed-size opcodes not handled explicitly.
fn operand_width(opcode: u8) -> Option<usize> {
    let width = match opcode {
        0x00..=0x0f => 0,
        0x10 => 1,
        0x11 => 2,
        0x14 => 2,
        0x15..=0x19 => 1,
        0x1a..=0x35 => 0,
        0x36..=0x3a => 1,
        0x3b..=0x83 => 0,
        IINC => 2,
        0x85..=0x98 => 0,
        0x99..=0xa8 => 2,
        0xa9 => 1,
        0xac..=0xb1 => 0,
        0xbb => 2,
        0xbc => 1,
        0xbd => 2,
        0xbe | 0xbf => 0,
        0xc2 | 0xc3 => 0,
        0xc5 => 3,
        0xc6 | 0xc7 => 2,
        0xc8 | 0xc9 => 4,
        0xca | 0xfe | 0xff => 0,
        _ => return None,
    };
    Some(width)
}

#[cfg(test)]
mod tests {
    use crate::classfile::ClassFile;
    use crate::classfile::fixture::{ClassBuilder, CodeBuilder};

    use super::*;

    #[test]
    fn surfaces_references_and_skips_other_opcodes() {
        let mut class = ClassBuilder::new("a/A", Some("java/lang/Object"));
        let field = class.field_ref("a/B", "count", "I");
        let method = class.interface_method_ref("a/C", "call", "()V");
        let cast = class.class_ref("[La/D;");
        let literal = class.class_ref("a/E");
        let text = class.string("hello");

        let mut code = CodeBuilder::new();
        code.op(0x03) // iconst_0
            .op_u1(0x10, 7) // bipush
            .op_u2(0x11, 300) // sipush
            .field(0xb4, field)
            .invoke_interface(method)
            .type_insn(0xc0, cast)
            .ldc(literal)
            .ldc(text)
            .op_u2(0xa7, 3) // goto
            .op(0xb1);
        class.method("run", "()V", Some(code.finish()));
        let bytes = class.finish();

        let parsed = ClassFile::parse(&bytes).unwrap();
        let instructions = parsed.instructions(&parsed.methods[0]).unwrap();
        assert_eq!(
            instructions,
            vec![
                Instruction::FieldAccess(MemberSymbol {
                    owner: "a/B",
                    name: "count",
                    descriptor: "I"
                }),
                Instruction::Invoke(MemberSymbol {
                    owner: "a/C",
                    name: "call",
                    descriptor: "()V"
                }),
                Instruction::TypeCheck("[La/D;"),
                Instruction::LoadClass("a/E"),
            ]
        );
    }

    #[test]
    fn switch_padding_is_relative_to_code_start() {
        let mut class = ClassBuilder::new("a/A", None);
        let target = class.method_ref("a/B", "after", "()V");

        let mut code = CodeBuilder::new();
        code.op(0x03).tableswitch(0, 2).lookupswitch(&[1, 5]).invoke(0xb8, target).op(0xb1);
        class.method("run", "()V", Some(code.finish()));
        let bytes = class.finish();

        let parsed = ClassFile::parse(&bytes).unwrap();
        let instructions = parsed.instructions(&parsed.methods[0]).unwrap();
        assert_eq!(instructions.len(), 1);
        assert!(matches!(
            instructions[0],
            Instruction::Invoke(MemberSymbol { name: "after", .. })
        ));
    }

    #[test]
    fn wide_iinc_is_skipped_whole() {
        let mut class = ClassBuilder::new("a/A", None);
        let target = class.method_ref("a/B", "after", "()V");
        let mut code = CodeBuilder::new();
        code.raw(&[WIDE, IINC, 0, 1, 0, 2]).raw(&[WIDE, 0x15, 0, 1]).invoke(0xb8, target);
        class.method("run", "()V", Some(code.finish()));
        let bytes = class.finish();

        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.instructions(&parsed.methods[0]).unwrap().len(), 1);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let mut class = ClassBuilder::new("a/A", None);
        let mut code = CodeBuilder::new();
        code.op(0x00).op(0xd0);
        class.method("run", "()V", Some(code.finish()));
        let bytes = class.finish();

        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(
            parsed.instructions(&parsed.methods[0]).unwrap_err(),
            ClassFileError::InvalidOpcode {
                opcode: 0xd0,
                offset: 1
            }
        );
    }
}
