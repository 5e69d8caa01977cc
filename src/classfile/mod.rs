//! Class file parsing
//!
//! Only what is needed to discover type references is decoded. Method
//! bytecode is skipped: every type an instruction can name is already
//! present in the constant pool.

mod constant_pool;
pub mod descriptor;
mod extractor;
mod reader;

pub use extractor::ReferenceExtractor;

use crate::graph::ReferenceKind;
use thiserror::Error;

/// First class file major version accepted (JDK 1.1)
pub const MIN_MAJOR_VERSION: u16 = 45;
/// Last class file major version accepted (JDK 25)
pub const MAX_MAJOR_VERSION: u16 = 69;

/// Convert a binary (`a.b.C`) or path-like (`a/b/C.class`) class name to internal form
pub fn internal_name(name: &str) -> String {
    let name = name.trim();
    let name = name.strip_suffix(".class").unwrap_or(name);
    name.replace('.', "/")
}

/// A type named by a class, with the way it was first named
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeReference {
    /// Internal type name (`a/b/C`)
    pub name: String,
    pub kind: ReferenceKind,
}

/// References extracted from one class member
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDescriptor {
    /// Member path the class was read from
    pub path: String,
    /// Internal name declared by the class itself
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    /// Every referenced type except the class itself, deduplicated, in discovery order
    pub references: Vec<TypeReference>,
    /// Every string constant of the constant pool, in pool order
    pub string_literals: Vec<String>,
    pub major_version: u16,
}

impl ClassDescriptor {
    /// Referenced type names in discovery order
    pub fn referenced_types(&self) -> impl Iterator<Item = &str> {
        self.references.iter().map(|r| r.name.as_str())
    }
}

/// Structural problems found while reading a class file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassFormatError {
    #[error("unexpected end of data at offset {offset}")]
    Truncated { offset: usize },

    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),

    #[error("unsupported class file version {major}")]
    UnsupportedVersion { major: u16 },

    #[error("constant pool entry {index} has unknown tag {tag}")]
    BadConstantTag { index: u16, tag: u8 },

    #[error("constant pool index {index} does not refer to a {expected} entry")]
    BadConstantIndex { index: u16, expected: &'static str },

    #[error("constant pool entry {index} is not valid modified UTF-8")]
    InvalidUtf8 { index: u16 },

    #[error("invalid descriptor `{0}`")]
    BadDescriptor(String),

    #[error("class `{0}` declares no superclass")]
    MissingSuperclass(String),

    #[error("unknown annotation element tag `{0}`")]
    BadElementTag(char),

    #[error("unknown type annotation target 0x{0:02x}")]
    BadTargetType(u8),

    #[error("annotations nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("{0} trailing bytes after the last attribute")]
    TrailingBytes(usize),
}
