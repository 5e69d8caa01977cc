use super::constant_pool::{Constant, ConstantPool};
use super::descriptor::{descriptor_types, return_descriptor_types, signature_types};
use super::reader::ClassReader;
use super::{ClassDescriptor, ClassFormatError, TypeReference, MAX_MAJOR_VERSION, MIN_MAJOR_VERSION};
use crate::archive::ArchiveMember;
use crate::error::{Result, ShrinkError};
use crate::graph::ReferenceKind;
use std::collections::HashSet;
use tracing::{debug, warn};

const MAGIC: u32 = 0xCAFE_BABE;
const ACC_MODULE: u16 = 0x8000;
const JAVA_LANG_OBJECT: &str = "java/lang/Object";

/// Maximum nesting of annotation values followed
const MAX_ANNOTATION_DEPTH: usize = 64;

/// Reads class members into [`ClassDescriptor`]s
pub struct ReferenceExtractor;

impl ReferenceExtractor {
    /// Decompress and parse a class member
    pub fn extract(member: &ArchiveMember) -> Result<ClassDescriptor> {
        let data = member.data()?;
        let descriptor = Self::parse(&member.path, &data)
            .map_err(|e| ShrinkError::malformed(&member.path, e.to_string()))?;

        if let Some(expected) = member.type_name() {
            if descriptor.name != expected {
                warn!(
                    "{} declares class {} which does not match its path",
                    member.path, descriptor.name
                );
            }
        }

        Ok(descriptor)
    }

    /// Parse class file bytes
    pub fn parse(path: &str, bytes: &[u8]) -> std::result::Result<ClassDescriptor, ClassFormatError> {
        let mut reader = ClassReader::new(bytes);

        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let _minor = reader.u16()?;
        let major = reader.u16()?;
        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major) {
            return Err(ClassFormatError::UnsupportedVersion { major });
        }

        let pool = ConstantPool::parse(&mut reader)?;
        let access_flags = reader.u16()?;
        let name = pool.class_name(reader.u16()?)?.to_string();

        let super_index = reader.u16()?;
        let super_name = if super_index == 0 {
            if name != JAVA_LANG_OBJECT && access_flags & ACC_MODULE == 0 {
                return Err(ClassFormatError::MissingSuperclass(name));
            }
            None
        } else {
            Some(pool.class_name(super_index)?.to_string())
        };

        let interface_count = reader.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(reader.u16()?)?.to_string());
        }

        let mut collector = Collector::new(&pool, &name);
        if let Some(super_name) = &super_name {
            collector.add(super_name, ReferenceKind::Supertype);
        }
        for interface in &interfaces {
            collector.add(interface, ReferenceKind::Interface);
        }
        collector.constant_pool()?;

        // Fields and methods share a layout
        for _ in 0..2 {
            let count = reader.u16()?;
            for _ in 0..count {
                let _access = reader.u16()?;
                let _name = reader.u16()?;
                let descriptor = pool.utf8(reader.u16()?)?;
                collector.descriptor(descriptor, ReferenceKind::MemberDescriptor)?;
                collector.attributes(&mut reader)?;
            }
        }

        collector.attributes(&mut reader)?;

        if !reader.is_empty() {
            return Err(ClassFormatError::TrailingBytes(bytes.len() - reader.pos()));
        }

        let string_literals = pool
            .iter()
            .filter_map(|c| match c {
                Constant::String(index) => pool.utf8(*index).ok().map(str::to_string),
                _ => None,
            })
            .collect();

        debug!(
            "{}: {} references, major version {}",
            path,
            collector.references.len(),
            major
        );

        Ok(ClassDescriptor {
            path: path.to_string(),
            name: name.clone(),
            super_name,
            interfaces,
            references: collector.references,
            string_literals,
            major_version: major,
        })
    }
}

/// Accumulates deduplicated type references for one class
struct Collector<'a> {
    pool: &'a ConstantPool,
    this_name: &'a str,
    seen: HashSet<String>,
    references: Vec<TypeReference>,
}

impl<'a> Collector<'a> {
    fn new(pool: &'a ConstantPool, this_name: &'a str) -> Self {
        Self {
            pool,
            this_name,
            seen: HashSet::new(),
            references: Vec::new(),
        }
    }

    /// Record a reference; the first kind seen for a type wins
    fn add(&mut self, name: &str, kind: ReferenceKind) {
        if name == self.this_name || !self.seen.insert(name.to_string()) {
            return;
        }
        self.references.push(TypeReference {
            name: name.to_string(),
            kind,
        });
    }

    fn descriptor(&mut self, descriptor: &str, kind: ReferenceKind) -> std::result::Result<(), ClassFormatError> {
        for name in descriptor_types(descriptor)? {
            self.add(&name, kind);
        }
        Ok(())
    }

    fn signature(&mut self, signature: &str) {
        match signature_types(signature) {
            Some(types) => {
                for name in types {
                    self.add(&name, ReferenceKind::GenericSignature);
                }
            }
            None => debug!("Ignoring unparseable signature {}", signature),
        }
    }

    /// Class constants, name-and-type descriptors and method types
    fn constant_pool(&mut self) -> std::result::Result<(), ClassFormatError> {
        let pool = self.pool;
        for constant in pool.iter() {
            match *constant {
                Constant::Class(index) => {
                    let name = pool.utf8(index)?;
                    if name.starts_with('[') {
                        self.descriptor(name, ReferenceKind::ConstantPoolClass)?;
                    } else {
                        self.add(name, ReferenceKind::ConstantPoolClass);
                    }
                }
                Constant::NameAndType { descriptor, .. } => {
                    let descriptor = pool.utf8(descriptor)?;
                    self.descriptor(descriptor, ReferenceKind::MemberDescriptor)?;
                }
                Constant::MethodType(descriptor) => {
                    let descriptor = pool.utf8(descriptor)?;
                    self.descriptor(descriptor, ReferenceKind::MemberDescriptor)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn attributes(&mut self, reader: &mut ClassReader<'_>) -> std::result::Result<(), ClassFormatError> {
        let count = reader.u16()?;
        for _ in 0..count {
            let name = self.pool.utf8(reader.u16()?)?;
            let len = reader.u32()? as usize;
            let mut body = reader.sub(len)?;
            self.attribute(name, &mut body)?;
        }
        Ok(())
    }

    fn attribute(&mut self, name: &str, body: &mut ClassReader<'_>) -> std::result::Result<(), ClassFormatError> {
        match name {
            "Signature" => {
                let signature = self.pool.utf8(body.u16()?)?;
                self.signature(signature);
            }
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                let count = body.u16()?;
                for _ in 0..count {
                    self.annotation(body, 0)?;
                }
            }
            "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
                let parameters = body.u8()?;
                for _ in 0..parameters {
                    let count = body.u16()?;
                    for _ in 0..count {
                        self.annotation(body, 0)?;
                    }
                }
            }
            "RuntimeVisibleTypeAnnotations" | "RuntimeInvisibleTypeAnnotations" => {
                let count = body.u16()?;
                for _ in 0..count {
                    self.type_annotation(body)?;
                }
            }
            "AnnotationDefault" => self.element_value(body, 0)?,
            "Code" => {
                let _max_stack = body.u16()?;
                let _max_locals = body.u16()?;
                let code_len = body.u32()? as usize;
                body.skip(code_len)?;
                // Catch types are class constants, already collected
                let handlers = body.u16()? as usize;
                body.skip(handlers * 8)?;
                self.attributes(body)?;
            }
            "LocalVariableTable" => {
                let count = body.u16()?;
                for _ in 0..count {
                    body.skip(4)?;
                    let _name = body.u16()?;
                    let descriptor = self.pool.utf8(body.u16()?)?;
                    self.descriptor(descriptor, ReferenceKind::MemberDescriptor)?;
                    body.skip(2)?;
                }
            }
            "LocalVariableTypeTable" => {
                let count = body.u16()?;
                for _ in 0..count {
                    body.skip(4)?;
                    let _name = body.u16()?;
                    let signature = self.pool.utf8(body.u16()?)?;
                    self.signature(signature);
                    body.skip(2)?;
                }
            }
            "Record" => {
                let count = body.u16()?;
                for _ in 0..count {
                    let _name = body.u16()?;
                    let descriptor = self.pool.utf8(body.u16()?)?;
                    self.descriptor(descriptor, ReferenceKind::MemberDescriptor)?;
                    self.attributes(body)?;
                }
            }
            // Everything else names types only through class constants
            _ => return Ok(()),
        }

        if !body.is_empty() {
            return Err(ClassFormatError::Truncated { offset: body.pos() });
        }
        Ok(())
    }

    fn annotation(&mut self, body: &mut ClassReader<'_>, depth: usize) -> std::result::Result<(), ClassFormatError> {
        if depth > MAX_ANNOTATION_DEPTH {
            return Err(ClassFormatError::TooDeep(MAX_ANNOTATION_DEPTH));
        }

        let type_descriptor = self.pool.utf8(body.u16()?)?;
        self.descriptor(type_descriptor, ReferenceKind::Annotation)?;

        let pairs = body.u16()?;
        for _ in 0..pairs {
            let _element_name = body.u16()?;
            self.element_value(body, depth + 1)?;
        }
        Ok(())
    }

    fn element_value(&mut self, body: &mut ClassReader<'_>, depth: usize) -> std::result::Result<(), ClassFormatError> {
        if depth > MAX_ANNOTATION_DEPTH {
            return Err(ClassFormatError::TooDeep(MAX_ANNOTATION_DEPTH));
        }

        let tag = body.u8()?;
        match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
                let _const_value = body.u16()?;
            }
            b'e' => {
                let type_descriptor = self.pool.utf8(body.u16()?)?;
                self.descriptor(type_descriptor, ReferenceKind::Annotation)?;
                let _const_name = body.u16()?;
            }
            b'c' => {
                let class_descriptor = self.pool.utf8(body.u16()?)?;
                for name in return_descriptor_types(class_descriptor)? {
                    self.add(&name, ReferenceKind::Annotation);
                }
            }
            b'@' => self.annotation(body, depth + 1)?,
            b'[' => {
                let count = body.u16()?;
                for _ in 0..count {
                    self.element_value(body, depth + 1)?;
                }
            }
            other => return Err(ClassFormatError::BadElementTag(other as char)),
        }
        Ok(())
    }

    fn type_annotation(&mut self, body: &mut ClassReader<'_>) -> std::result::Result<(), ClassFormatError> {
        let target_type = body.u8()?;
        let target_len = match target_type {
            0x00 | 0x01 | 0x16 => 1,
            0x10 | 0x17 | 0x42 | 0x43..=0x46 => 2,
            0x11 | 0x12 => 2,
            0x13..=0x15 => 0,
            0x47..=0x4B => 3,
            0x40 | 0x41 => {
                let entries = body.u16()? as usize;
                entries * 6
            }
            other => return Err(ClassFormatError::BadTargetType(other)),
        };
        body.skip(target_len)?;

        let path_len = body.u8()? as usize;
        body.skip(path_len * 2)?;

        self.annotation(body, 0)
    }
}
