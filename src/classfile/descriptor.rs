use super::error::{ClassFileError, Result};

/// Upper bound on array dimensions in a descriptor (JVMS 4.4.1).
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Non-array type a descriptor bottoms out in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType<'a> {
    Base(char),
    Object(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType<'a> {
    Base(char),
    Object(&'a str),
    Array {
        dimensions: u8,
        element: ElementType<'a>,
    },
}

impl<'a> FieldType<'a> {
    /// Internal name of the object type, looking through array dimensions.
    pub fn object_name(&self) -> Option<&'a str> {
        match self {
            FieldType::Object(name)
            | FieldType::Array {
                element: ElementType::Object(name),
                ..
            } => Some(*name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor<'a> {
    pub params: Vec<FieldType<'a>>,
    /// `None` for `void`.
    pub return_type: Option<FieldType<'a>>,
}

impl<'a> MethodDescriptor<'a> {
    pub fn object_names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.params
            .iter()
            .chain(self.return_type.iter())
            .filter_map(FieldType::object_name)
    }
}

pub fn parse_field_descriptor(desc: &str) -> Result<FieldType<'_>> {
    let (ty, rest) = parse_field_type(desc)?;
    if !rest.is_empty() {
        return Err(ClassFileError::InvalidDescriptor(desc.to_string()));
    }
    Ok(ty)
}

pub fn parse_method_descriptor(desc: &str) -> Result<MethodDescriptor<'_>> {
    let invalid = || ClassFileError::InvalidDescriptor(desc.to_string());
    let mut rest = desc.strip_prefix('(').ok_or_else(invalid)?;

    let mut params = Vec::new();
    loop {
        if let Some(after) = rest.strip_prefix(')') {
            rest = after;
            break;
        }
        if rest.is_empty() {
            return Err(invalid());
        }
        let (param, after) = parse_field_type(rest).map_err(|_| invalid())?;
        params.push(param);
        rest = after;
    }

    let return_type = if rest == "V" {
        None
    } else {
        Some(parse_field_descriptor(rest).map_err(|_| invalid())?)
    };

    Ok(MethodDescriptor {
        params,
        return_type,
    })
}

/// Class operand of `checkcast`, `instanceof` or a class `ldc`: either an
/// internal name or an array descriptor. Primitive arrays have no class.
pub fn class_operand_name(operand: &str) -> Result<Option<&str>> {
    if operand.starts_with('[') {
        return Ok(parse_field_descriptor(operand)?.object_name());
    }
    Ok(Some(operand))
}

fn parse_field_type(input: &str) -> Result<(FieldType<'_>, &str)> {
    let invalid = || ClassFileError::InvalidDescriptor(input.to_string());
    let dimensions = input.bytes().take_while(|&b| b == b'[').count();
    if dimensions > MAX_ARRAY_DIMENSIONS {
        return Err(invalid());
    }

    let (element, rest) = parse_element_type(&input[dimensions..]).ok_or_else(invalid)?;
    let ty = match (dimensions, element) {
        (0, ElementType::Base(base)) => FieldType::Base(base),
        (0, ElementType::Object(name)) => FieldType::Object(name),
        (dimensions, element) => FieldType::Array {
            dimensions: dimensions as u8,
            element,
        },
    };
    Ok((ty, rest))
}

fn parse_element_type(input: &str) -> Option<(ElementType<'_>, &str)> {
    let first = input.chars().next()?;
    match first {
        'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => Some((ElementType::Base(first), &input[1..])),
        'L' => {
            let end = input.find(';')?;
            if end == 1 {
                return None;
            }
            Some((ElementType::Object(&input[1..end]), &input[end + 1..]))
        }
        _ => None,
    }
}
