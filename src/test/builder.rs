use crate::{
    classfile::{constpool::ConstantPool, reader::MAGIC},
    file::ByteWriter,
};

struct RawMethod {
    access: u16,
    name: String,
    desc: String,
    max_stack: u16,
    max_locals: u16,
    code: Vec<u8>,
    annotations: Vec<String>,
}

/// Assembles class file bytes directly, without going through the class writer, so that reader
/// tests exercise hand-written bytecode.
pub struct ClassFileBuilder {
    name: String,
    super_name: String,
    major_version: u16,
    annotations: Vec<String>,
    methods: Vec<RawMethod>,
}

impl ClassFileBuilder {
    pub fn new(name: &str) -> Self {
        ClassFileBuilder {
            name: name.to_string(),
            super_name: "java/lang/Object".to_string(),
            major_version: 52,
            annotations: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn major_version(mut self, major_version: u16) -> Self {
        self.major_version = major_version;
        self
    }

    pub fn class_annotation(mut self, desc: &str) -> Self {
        self.annotations.push(desc.to_string());
        self
    }

    pub fn method(
        mut self,
        access: u16,
        name: &str,
        desc: &str,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
    ) -> Self {
        self.methods.push(RawMethod {
            access,
            name: name.to_string(),
            desc: desc.to_string(),
            max_stack,
            max_locals,
            code: code.to_vec(),
            annotations: Vec::new(),
        });
        self
    }

    /// `public static` method
    pub fn static_method(
        self,
        name: &str,
        desc: &str,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
    ) -> Self {
        self.method(0x0009, name, desc, max_stack, max_locals, code)
    }

    /// Visible marker annotation on the most recently added method
    pub fn method_annotation(mut self, desc: &str) -> Self {
        if let Some(method) = self.methods.last_mut() {
            method.annotations.push(desc.to_string());
        }
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut pool = ConstantPool::new();
        let mut body = ByteWriter::new();

        body.put(0x0021u16);
        body.put(pool.add_class(&self.name).unwrap());
        body.put(pool.add_class(&self.super_name).unwrap());
        body.put(0u16);
        body.put(0u16);

        body.put(self.methods.len() as u16);
        for method in &self.methods {
            body.put(method.access);
            body.put(pool.add_utf8(&method.name).unwrap());
            body.put(pool.add_utf8(&method.desc).unwrap());

            let attributes = 1 + u16::from(!method.annotations.is_empty());
            body.put(attributes);

            body.put(pool.add_utf8("Code").unwrap());
            body.put(12 + method.code.len() as u32);
            body.put(method.max_stack);
            body.put(method.max_locals);
            body.put(method.code.len() as u32);
            body.put_bytes(&method.code);
            body.put(0u16);
            body.put(0u16);

            if !method.annotations.is_empty() {
                write_markers(&mut pool, &mut body, &method.annotations);
            }
        }

        if self.annotations.is_empty() {
            body.put(0u16);
        } else {
            body.put(1u16);
            write_markers(&mut pool, &mut body, &self.annotations);
        }

        let mut out = ByteWriter::new();
        out.put(MAGIC);
        out.put(0u16);
        out.put(self.major_version);
        pool.write(&mut out).unwrap();
        out.put_bytes(body.as_slice());
        out.into_inner()
    }
}

fn write_markers(pool: &mut ConstantPool, out: &mut ByteWriter, annotations: &[String]) {
    out.put(pool.add_utf8("RuntimeVisibleAnnotations").unwrap());
    out.put(2 + 4 * annotations.len() as u32);
    out.put(annotations.len() as u16);
    for desc in annotations {
        out.put(pool.add_utf8(desc).unwrap());
        out.put(0u16);
    }
}
