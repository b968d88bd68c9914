//! Test-only class-file assembler.

use std::collections::HashMap;

pub(crate) struct ClassBuilder {
    pool: Vec<u8>,
    next_index: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<(u16, u16)>,
    methods: Vec<(u16, u16, Option<Vec<u8>>)>,
    bootstrap_methods: Vec<(u16, Vec<u16>)>,
}

impl ClassBuilder {
    pub(crate) fn new(this_class: &str, super_class: Option<&str>) -> Self {
        let mut builder = Self {
            pool: Vec::new(),
            next_index: 1,
            utf8: HashMap::new(),
            classes: HashMap::new(),
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            bootstrap_methods: Vec::new(),
        };
        builder.this_class = builder.class_ref(this_class);
        if let Some(super_class) = super_class {
            builder.super_class = builder.class_ref(super_class);
        }
        builder
    }

    fn push(&mut self, bytes: &[u8]) -> u16 {
        let index = self.next_index;
        self.pool.extend_from_slice(bytes);
        self.next_index += 1;
        index
    }

    pub(crate) fn utf8(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8.get(value) {
            return *index;
        }
        let mut bytes = vec![1];
        bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        bytes.extend_from_slice(value.as_bytes());
        let index = self.push(&bytes);
        self.utf8.insert(value.to_string(), index);
        index
    }

    pub(crate) fn class_ref(&mut self, name: &str) -> u16 {
        if let Some(index) = self.classes.get(name) {
            return *index;
        }
        let name_index = self.utf8(name);
        let mut bytes = vec![7];
        bytes.extend_from_slice(&name_index.to_be_bytes());
        let index = self.push(&bytes);
        self.classes.insert(name.to_string(), index);
        index
    }

    pub(crate) fn string(&mut self, value: &str) -> u16 {
        let utf8 = self.utf8(value);
        let mut bytes = vec![8];
        bytes.extend_from_slice(&utf8.to_be_bytes());
        self.push(&bytes)
    }

    pub(crate) fn long(&mut self, value: i64) -> u16 {
        let mut bytes = vec![5];
        bytes.extend_from_slice(&value.to_be_bytes());
        let index = self.push(&bytes);
        self.next_index += 1;
        index
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut bytes = vec![12];
        bytes.extend_from_slice(&name.to_be_bytes());
        bytes.extend_from_slice(&descriptor.to_be_bytes());
        self.push(&bytes)
    }

    fn member_ref(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class_ref(owner);
        let nat = self.name_and_type(name, descriptor);
        let mut bytes = vec![tag];
        bytes.extend_from_slice(&class.to_be_bytes());
        bytes.extend_from_slice(&nat.to_be_bytes());
        self.push(&bytes)
    }

    pub(crate) fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(9, owner, name, descriptor)
    }

    pub(crate) fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(10, owner, name, descriptor)
    }

    pub(crate) fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(11, owner, name, descriptor)
    }

    pub(crate) fn method_handle(&mut self, kind: u8, reference: u16) -> u16 {
        let mut bytes = vec![15, kind];
        bytes.extend_from_slice(&reference.to_be_bytes());
        self.push(&bytes)
    }

    pub(crate) fn method_type(&mut self, descriptor: &str) -> u16 {
        let descriptor = self.utf8(descriptor);
        let mut bytes = vec![16];
        bytes.extend_from_slice(&descriptor.to_be_bytes());
        self.push(&bytes)
    }

    pub(crate) fn bootstrap_method(&mut self, handle: u16, arguments: &[u16]) -> u16 {
        self.bootstrap_methods.push((handle, arguments.to_vec()));
        (self.bootstrap_methods.len() - 1) as u16
    }

    pub(crate) fn invoke_dynamic(&mut self, bootstrap: u16, name: &str, descriptor: &str) -> u16 {
        let nat = self.name_and_type(name, descriptor);
        let mut bytes = vec![18];
        bytes.extend_from_slice(&bootstrap.to_be_bytes());
        bytes.extend_from_slice(&nat.to_be_bytes());
        self.push(&bytes)
    }

    pub(crate) fn interface(&mut self, name: &str) {
        let index = self.class_ref(name);
        self.interfaces.push(index);
    }

    pub(crate) fn field(&mut self, name: &str, descriptor: &str) {
        let entry = (self.utf8(name), self.utf8(descriptor));
        self.fields.push(entry);
    }

    pub(crate) fn method(&mut self, name: &str, descriptor: &str, code: Option<Vec<u8>>) {
        let entry = (self.utf8(name), self.utf8(descriptor), code);
        self.methods.push(entry);
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        let code_name = self.utf8("Code");
        let bootstrap_name = self.utf8("BootstrapMethods");

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&52u16.to_be_bytes());
        out.extend_from_slice(&self.next_index.to_be_bytes());
        out.extend_from_slice(&self.pool);

        out.extend_from_slice(&0x0021u16.to_be_bytes());
        out.extend_from_slice(&self.this_class.to_be_bytes());
        out.extend_from_slice(&self.super_class.to_be_bytes());

        out.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            out.extend_from_slice(&interface.to_be_bytes());
        }

        out.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for (name, descriptor) in &self.fields {
            out.extend_from_slice(&0x0002u16.to_be_bytes());
            out.extend_from_slice(&name.to_be_bytes());
            out.extend_from_slice(&descriptor.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
        }

        out.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for (name, descriptor, code) in &self.methods {
            out.extend_from_slice(&0x0001u16.to_be_bytes());
            out.extend_from_slice(&name.to_be_bytes());
            out.extend_from_slice(&descriptor.to_be_bytes());
            match code {
                Some(code) => {
                    out.extend_from_slice(&1u16.to_be_bytes());
                    out.extend_from_slice(&code_name.to_be_bytes());
                    out.extend_from_slice(&(12 + code.len() as u32).to_be_bytes());
                    out.extend_from_slice(&8u16.to_be_bytes());
                    out.extend_from_slice(&8u16.to_be_bytes());
                    out.extend_from_slice(&(code.len() as u32).to_be_bytes());
                    out.extend_from_slice(code);
                    out.extend_from_slice(&0u16.to_be_bytes());
                    out.extend_from_slice(&0u16.to_be_bytes());
                }
                None => out.extend_from_slice(&0u16.to_be_bytes()),
            }
        }

        if self.bootstrap_methods.is_empty() {
            out.extend_from_slice(&0u16.to_be_bytes());
        } else {
            let mut body = Vec::new();
            body.extend_from_slice(&(self.bootstrap_methods.len() as u16).to_be_bytes());
            for (handle, arguments) in &self.bootstrap_methods {
                body.extend_from_slice(&handle.to_be_bytes());
                body.extend_from_slice(&(arguments.len() as u16).to_be_bytes());
                for argument in arguments {
                    body.extend_from_slice(&argument.to_be_bytes());
                }
            }
            out.extend_from_slice(&1u16.to_be_bytes());
            out.extend_from_slice(&bootstrap_name.to_be_bytes());
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(&body);
        }

        out
    }
}

#[derive(Default)]
pub(crate) struct CodeBuilder {
    code: Vec<u8>,
}

impl CodeBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    pub(crate) fn op(&mut self, opcode: u8) -> &mut Self {
        self.raw(&[opcode])
    }

    pub(crate) fn op_u1(&mut self, opcode: u8, operand: u8) -> &mut Self {
        self.raw(&[opcode, operand])
    }

    pub(crate) fn op_u2(&mut self, opcode: u8, operand: u16) -> &mut Self {
        let [hi, lo] = operand.to_be_bytes();
        self.raw(&[opcode, hi, lo])
    }

    pub(crate) fn field(&mut self, opcode: u8, field_ref: u16) -> &mut Self {
        self.op_u2(opcode, field_ref)
    }

    pub(crate) fn invoke(&mut self, opcode: u8, method_ref: u16) -> &mut Self {
        self.op_u2(opcode, method_ref)
    }

    pub(crate) fn invoke_interface(&mut self, method_ref: u16) -> &mut Self {
        self.op_u2(0xb9, method_ref).raw(&[1, 0])
    }

    pub(crate) fn invoke_dynamic(&mut self, call_site: u16) -> &mut Self {
        self.op_u2(0xba, call_site).raw(&[0, 0])
    }

    pub(crate) fn type_insn(&mut self, opcode: u8, class_ref: u16) -> &mut Self {
        self.op_u2(opcode, class_ref)
    }

    pub(crate) fn ldc(&mut self, constant: u16) -> &mut Self {
        match u8::try_from(constant) {
            Ok(index) => self.op_u1(0x12, index),
            Err(_) => self.op_u2(0x13, constant),
        }
    }

    fn align(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
    }

    pub(crate) fn tableswitch(&mut self, low: i32, high: i32) -> &mut Self {
        self.op(0xaa);
        self.align();
        for value in [0, low, high] {
            self.raw(&value.to_be_bytes());
        }
        for _ in low..=high {
            self.raw(&0i32.to_be_bytes());
        }
        self
    }

    pub(crate) fn lookupswitch(&mut self, keys: &[i32]) -> &mut Self {
        self.op(0xab);
        self.align();
        self.raw(&0i32.to_be_bytes());
        self.raw(&(keys.len() as i32).to_be_bytes());
        for key in keys {
            self.raw(&key.to_be_bytes());
            self.raw(&0i32.to_be_bytes());
        }
        self
    }

    pub(crate) fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.code)
    }
}
