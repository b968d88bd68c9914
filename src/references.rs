//! Reference index held privately by one shard.
//!
//! Each ingested class file is turned into `(key, site)` records: the key is
//! the class or member being referenced, the site is the class, field or
//! method whose definition contains the reference.

use std::collections::{HashMap, HashSet};

use crate::classfile::{
    ClassFile, ClassFileError, HandleTarget, Instruction, MemberSymbol, class_operand_name,
    parse_field_descriptor, parse_method_descriptor,
};
use crate::usage::{MemberRef, UsageKey, UsageString};

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

#[derive(Debug, Default)]
pub struct ReferenceIndex {
    usages: HashMap<String, HashSet<UsageString>>,
    records: usize,
    namespaces: Vec<String>,
}

impl ReferenceIndex {
    /// `namespaces` restricts stored keys to those prefixes; empty keeps all.
    pub fn new(namespaces: Vec<String>) -> Self {
        Self {
            usages: HashMap::new(),
            records: 0,
            namespaces,
        }
    }

    /// Indexes one class file. A malformed file leaves the index untouched.
    pub fn ingest(&mut self, bytes: &[u8]) -> Result<usize, ClassFileError> {
        let class = ClassFile::parse(bytes)?;
        let found = collect_references(&class)?;

        let mut added = 0usize;
        for (key, site) in found {
            if !self.accepts(&key) {
                continue;
            }
            if self.usages.entry(key).or_default().insert(site) {
                added += 1;
            }
        }
        self.records += added;
        Ok(added)
    }

    pub fn get_usage(&self, key: &UsageKey) -> Vec<UsageString> {
        self.usages
            .get(&key.to_string())
            .map(|sites| sites.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct `(key, site)` records.
    pub fn usage_size(&self) -> usize {
        self.records
    }

    pub fn clear(&mut self) {
        self.usages.clear();
        self.records = 0;
    }

    fn accepts(&self, key: &str) -> bool {
        self.namespaces.is_empty() || self.namespaces.iter().any(|ns| key.starts_with(ns.as_str()))
    }
}

fn collect_references(class: &ClassFile<'_>) -> Result<Vec<(String, UsageString)>, ClassFileError> {
    let this = class.this_class.as_str();
    let mut out = Vec::new();

    let class_site = UsageString::Class(this.to_string());
    for parent in class.super_class.iter().chain(class.interfaces.iter()) {
        out.push((parent.clone(), class_site.clone()));
    }

    // Field sites keep the declared descriptor, array dimensions included.
    for field in &class.fields {
        let site = UsageString::Field(MemberRef::new(this, &field.name, &field.descriptor));
        if let Some(name) = parse_field_descriptor(&field.descriptor)?.object_name() {
            out.push((name.to_string(), site));
        }
    }

    for method in &class.methods {
        let site = UsageString::Method(MemberRef::new(this, &method.name, &method.descriptor));
        push_descriptor_types(&method.descriptor, &site, &mut out)?;

        for instruction in class.instructions(method)? {
            match instruction {
                Instruction::FieldAccess(field) => out.push((member_key(field), site.clone())),
                Instruction::Invoke(target) => push_method_reference(target, &site, &mut out),
                Instruction::TypeCheck(operand) | Instruction::LoadClass(operand) => {
                    if let Some(name) = class_operand_name(operand)? {
                        out.push((name.to_string(), site.clone()));
                    }
                }
                Instruction::InvokeDynamic {
                    bootstrap_index,
                    descriptor,
                    ..
                } => push_lambda_references(class, bootstrap_index, descriptor, &site, &mut out)?,
            }
        }
    }

    Ok(out)
}

fn push_method_reference(target: MemberSymbol<'_>, site: &UsageString, out: &mut Vec<(String, UsageString)>) {
    out.push((member_key(target), site.clone()));
    if target.name == "<init>" {
        out.push((target.owner.to_string(), site.clone()));
    }
}

fn push_descriptor_types(
    descriptor: &str,
    site: &UsageString,
    out: &mut Vec<(String, UsageString)>,
) -> Result<(), ClassFileError> {
    let parsed = parse_method_descriptor(descriptor)?;
    for name in parsed.object_names() {
        out.push((name.to_string(), site.clone()));
    }
    Ok(())
}

/// Lambdas compile to `invokedynamic` against `LambdaMetafactory`; the real
/// target is the implementation handle in the bootstrap arguments.
fn push_lambda_references(
    class: &ClassFile<'_>,
    bootstrap_index: u16,
    call_site_descriptor: &str,
    site: &UsageString,
    out: &mut Vec<(String, UsageString)>,
) -> Result<(), ClassFileError> {
    let bootstrap = class.bootstrap(bootstrap_index)?;
    let HandleTarget::Method(factory) = bootstrap.handle else {
        return Ok(());
    };
    if factory.owner != LAMBDA_METAFACTORY
        || !matches!(factory.name, "metafactory" | "altMetafactory")
    {
        return Ok(());
    }
    let [sam_type, implementation, instantiated_type, ..] = *bootstrap.arguments else {
        return Ok(());
    };

    match class.method_handle(implementation)? {
        HandleTarget::Field(field) => out.push((member_key(field), site.clone())),
        HandleTarget::Method(method) => out.push((member_key(method), site.clone())),
    }

    push_descriptor_types(call_site_descriptor, site, out)?;
    push_descriptor_types(class.method_type(sam_type)?, site, out)?;
    push_descriptor_types(class.method_type(instantiated_type)?, site, out)?;
    Ok(())
}

fn member_key(symbol: MemberSymbol<'_>) -> String {
    format!("{}:{}:{}", symbol.owner, symbol.name, symbol.descriptor)
}
