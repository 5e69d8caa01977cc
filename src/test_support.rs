// Builders for synthetic class files and archives used by tests
//
// Kept free of crate-internal imports so integration tests can include it
// with `#[path]`.

#![allow(dead_code)]

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use std::collections::HashMap;
use std::io::Write;

/// Value of an annotation element
#[derive(Debug, Clone)]
pub enum ElementValue {
    Int(i32),
    Str(String),
    Enum { descriptor: String, constant: String },
    /// Class literal by return descriptor (`La/B;`, `[I`, `V`)
    Class(String),
    Nested(Annotation),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    pub fn enumeration(descriptor: &str, constant: &str) -> Self {
        ElementValue::Enum {
            descriptor: descriptor.to_string(),
            constant: constant.to_string(),
        }
    }

    pub fn class(descriptor: &str) -> Self {
        ElementValue::Class(descriptor.to_string())
    }

    fn encode(&self, pool: &mut PoolBuilder, out: &mut Vec<u8>) {
        match self {
            ElementValue::Int(value) => {
                out.push(b'I');
                out.extend_from_slice(&pool.integer(*value).to_be_bytes());
            }
            ElementValue::Str(value) => {
                out.push(b's');
                out.extend_from_slice(&pool.utf8(value).to_be_bytes());
            }
            ElementValue::Enum { descriptor, constant } => {
                out.push(b'e');
                out.extend_from_slice(&pool.utf8(descriptor).to_be_bytes());
                out.extend_from_slice(&pool.utf8(constant).to_be_bytes());
            }
            ElementValue::Class(descriptor) => {
                out.push(b'c');
                out.extend_from_slice(&pool.utf8(descriptor).to_be_bytes());
            }
            ElementValue::Nested(annotation) => {
                out.push(b'@');
                annotation.encode(pool, out);
            }
            ElementValue::Array(values) => {
                out.push(b'[');
                out.extend_from_slice(&(values.len() as u16).to_be_bytes());
                for value in values {
                    value.encode(pool, out);
                }
            }
        }
    }
}

/// An annotation with its element-value pairs
#[derive(Debug, Clone)]
pub struct Annotation {
    descriptor: String,
    elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub fn new(descriptor: &str) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            elements: Vec::new(),
        }
    }

    pub fn with(mut self, name: &str, value: ElementValue) -> Self {
        self.elements.push((name.to_string(), value));
        self
    }

    fn encode(&self, pool: &mut PoolBuilder, out: &mut Vec<u8>) {
        out.extend_from_slice(&pool.utf8(&self.descriptor).to_be_bytes());
        out.extend_from_slice(&(self.elements.len() as u16).to_be_bytes());
        for (name, value) in &self.elements {
            out.extend_from_slice(&pool.utf8(name).to_be_bytes());
            value.encode(pool, out);
        }
    }
}

/// A type annotation; `target_info` is written verbatim after the target type
#[derive(Debug, Clone)]
pub struct TypeAnnotation {
    target_type: u8,
    target_info: Vec<u8>,
    type_path: Vec<(u8, u8)>,
    annotation: Annotation,
}

impl TypeAnnotation {
    pub fn new(target_type: u8, target_info: &[u8], annotation: Annotation) -> Self {
        Self {
            target_type,
            target_info: target_info.to_vec(),
            type_path: Vec::new(),
            annotation,
        }
    }

    /// Append a `type_path` step
    pub fn path(mut self, kind: u8, argument_index: u8) -> Self {
        self.type_path.push((kind, argument_index));
        self
    }

    fn encode(&self, pool: &mut PoolBuilder, out: &mut Vec<u8>) {
        out.push(self.target_type);
        out.extend_from_slice(&self.target_info);
        out.push(self.type_path.len() as u8);
        for (kind, index) in &self.type_path {
            out.push(*kind);
            out.push(*index);
        }
        self.annotation.encode(pool, out);
    }
}

/// Attributes the builder can attach to a class, method or `Code`
#[derive(Debug, Clone)]
pub enum Attribute {
    Annotations { visible: bool, annotations: Vec<Annotation> },
    ParameterAnnotations { visible: bool, parameters: Vec<Vec<Annotation>> },
    TypeAnnotations { visible: bool, annotations: Vec<TypeAnnotation> },
    AnnotationDefault(ElementValue),
    /// `(name, descriptor)` per local
    LocalVariables(Vec<(String, String)>),
    /// `(name, signature)` per local
    LocalVariableTypes(Vec<(String, String)>),
    /// `(name, descriptor, signature)` per record component
    Record(Vec<(String, String, Option<String>)>),
}

impl Attribute {
    fn encode(&self, pool: &mut PoolBuilder) -> Vec<u8> {
        let mut body = Vec::new();
        let name = match self {
            Attribute::Annotations { visible, annotations } => {
                body.extend_from_slice(&(annotations.len() as u16).to_be_bytes());
                for annotation in annotations {
                    annotation.encode(pool, &mut body);
                }
                if *visible {
                    "RuntimeVisibleAnnotations"
                } else {
                    "RuntimeInvisibleAnnotations"
                }
            }
            Attribute::ParameterAnnotations { visible, parameters } => {
                body.push(parameters.len() as u8);
                for annotations in parameters {
                    body.extend_from_slice(&(annotations.len() as u16).to_be_bytes());
                    for annotation in annotations {
                        annotation.encode(pool, &mut body);
                    }
                }
                if *visible {
                    "RuntimeVisibleParameterAnnotations"
                } else {
                    "RuntimeInvisibleParameterAnnotations"
                }
            }
            Attribute::TypeAnnotations { visible, annotations } => {
                body.extend_from_slice(&(annotations.len() as u16).to_be_bytes());
                for annotation in annotations {
                    annotation.encode(pool, &mut body);
                }
                if *visible {
                    "RuntimeVisibleTypeAnnotations"
                } else {
                    "RuntimeInvisibleTypeAnnotations"
                }
            }
            Attribute::AnnotationDefault(value) => {
                value.encode(pool, &mut body);
                "AnnotationDefault"
            }
            Attribute::LocalVariables(locals) | Attribute::LocalVariableTypes(locals) => {
                body.extend_from_slice(&(locals.len() as u16).to_be_bytes());
                for (slot, (name, descriptor)) in locals.iter().enumerate() {
                    body.extend_from_slice(&0u16.to_be_bytes());
                    body.extend_from_slice(&1u16.to_be_bytes());
                    body.extend_from_slice(&pool.utf8(name).to_be_bytes());
                    body.extend_from_slice(&pool.utf8(descriptor).to_be_bytes());
                    body.extend_from_slice(&(slot as u16).to_be_bytes());
                }
                if matches!(self, Attribute::LocalVariables(_)) {
                    "LocalVariableTable"
                } else {
                    "LocalVariableTypeTable"
                }
            }
            Attribute::Record(components) => {
                body.extend_from_slice(&(components.len() as u16).to_be_bytes());
                for (name, descriptor, signature) in components {
                    body.extend_from_slice(&pool.utf8(name).to_be_bytes());
                    body.extend_from_slice(&pool.utf8(descriptor).to_be_bytes());
                    match signature {
                        Some(signature) => {
                            body.extend_from_slice(&1u16.to_be_bytes());
                            body.extend_from_slice(&pool.utf8("Signature").to_be_bytes());
                            body.extend_from_slice(&2u32.to_be_bytes());
                            body.extend_from_slice(&pool.utf8(signature).to_be_bytes());
                        }
                        None => body.extend_from_slice(&0u16.to_be_bytes()),
                    }
                }
                "Record"
            }
        };

        let mut out = Vec::with_capacity(body.len() + 6);
        out.extend_from_slice(&pool.utf8(name).to_be_bytes());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }
}

#[derive(Debug, Clone)]
struct MethodSpec {
    name: String,
    descriptor: String,
    attributes: Vec<Attribute>,
    code_attributes: Vec<Attribute>,
}

/// Minimal class file writer producing structurally valid class files
#[derive(Debug, Clone)]
pub struct ClassFileBuilder {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<(String, String)>,
    methods: Vec<MethodSpec>,
    class_refs: Vec<String>,
    method_refs: Vec<(String, String, String)>,
    strings: Vec<String>,
    signature: Option<String>,
    annotations: Vec<String>,
    attributes: Vec<Attribute>,
    major: u16,
    magic: u32,
}

impl ClassFileBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            class_refs: Vec::new(),
            method_refs: Vec::new(),
            strings: Vec::new(),
            signature: None,
            annotations: Vec::new(),
            attributes: Vec::new(),
            major: 52,
            magic: 0xCAFE_BABE,
        }
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    pub fn no_superclass(mut self) -> Self {
        self.super_name = None;
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push((name.to_string(), descriptor.to_string()));
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(MethodSpec {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            attributes: Vec::new(),
            code_attributes: Vec::new(),
        });
        self
    }

    /// Attach an attribute to the most recently added method
    pub fn method_attribute(mut self, attribute: Attribute) -> Self {
        let method = self.methods.last_mut().expect("method_attribute needs a method");
        method.attributes.push(attribute);
        self
    }

    /// Attach an attribute to the `Code` of the most recently added method
    pub fn code_attribute(mut self, attribute: Attribute) -> Self {
        let method = self.methods.last_mut().expect("code_attribute needs a method");
        method.code_attributes.push(attribute);
        self
    }

    /// Attach a class-level attribute
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Reference a class through the constant pool (`new`, `checkcast`, ...)
    pub fn uses_class(mut self, name: &str) -> Self {
        self.class_refs.push(name.to_string());
        self
    }

    /// Reference a method of another class (`invokestatic`, ...)
    pub fn calls(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.method_refs
            .push((owner.to_string(), name.to_string(), descriptor.to_string()));
        self
    }

    /// Add a string constant (`ldc "..."`)
    pub fn string(mut self, value: &str) -> Self {
        self.strings.push(value.to_string());
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.signature = Some(signature.to_string());
        self
    }

    /// Add a class-level runtime visible annotation by descriptor
    pub fn annotated(mut self, descriptor: &str) -> Self {
        self.annotations.push(descriptor.to_string());
        self
    }

    pub fn major_version(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    pub fn magic(mut self, magic: u32) -> Self {
        self.magic = magic;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = PoolBuilder::default();

        let this_class = pool.class(&self.name);
        let super_class = self.super_name.as_deref().map(|s| pool.class(s)).unwrap_or(0);
        let interfaces: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();
        for class in &self.class_refs {
            pool.class(class);
        }
        for (owner, name, descriptor) in &self.method_refs {
            pool.method_ref(owner, name, descriptor);
        }
        for value in &self.strings {
            pool.string(value);
        }

        // Everything after the pool, encoded first so the pool is complete
        let mut body = Vec::new();
        body.extend_from_slice(&0x0021u16.to_be_bytes());
        body.extend_from_slice(&this_class.to_be_bytes());
        body.extend_from_slice(&super_class.to_be_bytes());
        body.extend_from_slice(&(interfaces.len() as u16).to_be_bytes());
        for interface in &interfaces {
            body.extend_from_slice(&interface.to_be_bytes());
        }

        body.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for (name, descriptor) in &self.fields {
            body.extend_from_slice(&0x0002u16.to_be_bytes());
            body.extend_from_slice(&pool.utf8(name).to_be_bytes());
            body.extend_from_slice(&pool.utf8(descriptor).to_be_bytes());
            body.extend_from_slice(&0u16.to_be_bytes());
        }

        body.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            body.extend_from_slice(&0x0001u16.to_be_bytes());
            body.extend_from_slice(&pool.utf8(&method.name).to_be_bytes());
            body.extend_from_slice(&pool.utf8(&method.descriptor).to_be_bytes());
            body.extend_from_slice(&(1 + method.attributes.len() as u16).to_be_bytes());

            let code_attributes: Vec<u8> = method
                .code_attributes
                .iter()
                .flat_map(|a| a.encode(&mut pool))
                .collect();
            // Code: max_stack, max_locals, code_length, `return`, no handlers, attributes
            body.extend_from_slice(&pool.utf8("Code").to_be_bytes());
            body.extend_from_slice(&(13 + code_attributes.len() as u32).to_be_bytes());
            body.extend_from_slice(&1u16.to_be_bytes());
            body.extend_from_slice(&1u16.to_be_bytes());
            body.extend_from_slice(&1u32.to_be_bytes());
            body.push(0xB1);
            body.extend_from_slice(&0u16.to_be_bytes());
            body.extend_from_slice(&(method.code_attributes.len() as u16).to_be_bytes());
            body.extend_from_slice(&code_attributes);

            for attribute in &method.attributes {
                body.extend_from_slice(&attribute.encode(&mut pool));
            }
        }

        let mut class_attributes: Vec<Vec<u8>> = Vec::new();
        if let Some(signature) = &self.signature {
            let mut attribute = pool.utf8("Signature").to_be_bytes().to_vec();
            attribute.extend_from_slice(&2u32.to_be_bytes());
            attribute.extend_from_slice(&pool.utf8(signature).to_be_bytes());
            class_attributes.push(attribute);
        }
        if !self.annotations.is_empty() {
            let annotations = Attribute::Annotations {
                visible: true,
                annotations: self.annotations.iter().map(|a| Annotation::new(a)).collect(),
            };
            class_attributes.push(annotations.encode(&mut pool));
        }
        for attribute in &self.attributes {
            class_attributes.push(attribute.encode(&mut pool));
        }
        body.extend_from_slice(&(class_attributes.len() as u16).to_be_bytes());
        for attribute in &class_attributes {
            body.extend_from_slice(attribute);
        }

        let mut out = Vec::new();
        out.extend_from_slice(&self.magic.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&self.major.to_be_bytes());
        out.extend_from_slice(&(pool.entries.len() as u16 + 1).to_be_bytes());
        for entry in &pool.entries {
            out.extend_from_slice(entry);
        }
        out.extend_from_slice(&body);
        out
    }
}

#[derive(Default)]
struct PoolBuilder {
    entries: Vec<Vec<u8>>,
    cache: HashMap<(u8, String), u16>,
}

impl PoolBuilder {
    fn push(&mut self, key: (u8, String), entry: Vec<u8>) -> u16 {
        if let Some(&index) = self.cache.get(&key) {
            return index;
        }
        self.entries.push(entry);
        let index = self.entries.len() as u16;
        self.cache.insert(key, index);
        index
    }

    fn utf8(&mut self, value: &str) -> u16 {
        let mut entry = vec![1];
        entry.extend_from_slice(&(value.len() as u16).to_be_bytes());
        entry.extend_from_slice(value.as_bytes());
        self.push((1, value.to_string()), entry)
    }

    fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend_from_slice(&value.to_be_bytes());
        self.push((3, value.to_string()), entry)
    }

    fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        let mut entry = vec![7];
        entry.extend_from_slice(&name_index.to_be_bytes());
        self.push((7, name.to_string()), entry)
    }

    fn string(&mut self, value: &str) -> u16 {
        let value_index = self.utf8(value);
        let mut entry = vec![8];
        entry.extend_from_slice(&value_index.to_be_bytes());
        self.push((8, value.to_string()), entry)
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut entry = vec![12];
        entry.extend_from_slice(&name_index.to_be_bytes());
        entry.extend_from_slice(&descriptor_index.to_be_bytes());
        self.push((12, format!("{}:{}", name, descriptor)), entry)
    }

    fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let nat_index = self.name_and_type(name, descriptor);
        let mut entry = vec![10];
        entry.extend_from_slice(&class_index.to_be_bytes());
        entry.extend_from_slice(&nat_index.to_be_bytes());
        self.push((10, format!("{}.{}:{}", owner, name, descriptor)), entry)
    }
}

/// Minimal ZIP writer producing archives in the layout `jar` emits
#[derive(Debug, Default, Clone)]
pub struct ZipBuilder {
    entries: Vec<(String, Vec<u8>, bool)>,
    comment: Vec<u8>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push((name.to_string(), data.to_vec(), false));
        self
    }

    pub fn deflated(mut self, name: &str, data: &[u8]) -> Self {
        self.entries.push((name.to_string(), data.to_vec(), true));
        self
    }

    pub fn directory(self, name: &str) -> Self {
        self.stored(name, b"")
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();

        for (name, data, deflate) in &self.entries {
            let mut crc = Crc::new();
            crc.update(data);
            let (method, stored) = if *deflate {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data).unwrap();
                (8u16, encoder.finish().unwrap())
            } else {
                (0u16, data.clone())
            };
            let offset = out.len() as u32;

            out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&0x0800u16.to_le_bytes());
            out.extend_from_slice(&method.to_le_bytes());
            out.extend_from_slice(&0x6000u16.to_le_bytes());
            out.extend_from_slice(&0x5821u16.to_le_bytes());
            out.extend_from_slice(&crc.sum().to_le_bytes());
            out.extend_from_slice(&(stored.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&stored);

            central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            central.extend_from_slice(&0x031eu16.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&0x0800u16.to_le_bytes());
            central.extend_from_slice(&method.to_le_bytes());
            central.extend_from_slice(&0x6000u16.to_le_bytes());
            central.extend_from_slice(&0x5821u16.to_le_bytes());
            central.extend_from_slice(&crc.sum().to_le_bytes());
            central.extend_from_slice(&(stored.len() as u32).to_le_bytes());
            central.extend_from_slice(&(data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(name.len() as u16).to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&0u32.to_le_bytes());
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
        }

        let central_offset = out.len() as u32;
        out.extend_from_slice(&central);
        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.comment);
        out
    }
}
