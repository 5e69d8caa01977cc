use serde::{Deserialize, Serialize};
use std::fmt;

/// Why one archive member depends on another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    /// Superclass in `extends`
    Supertype,

    /// Directly implemented interface
    Interface,

    /// Class constant (`new`, casts, static calls, catch types, class literals)
    ConstantPoolClass,

    /// Type in a field, method or method-type descriptor
    MemberDescriptor,

    /// Type named only by generic signature metadata
    GenericSignature,

    /// Annotation type or class value inside an annotation
    Annotation,

    /// String constant naming a resource path
    ResourceLiteral,

    /// String constant naming a class by binary name (`a.b.C`)
    ClassNameLiteral,

    /// `META-INF/services` registration
    ServiceProvider,

    /// Class named by a manifest attribute
    Manifest,

    /// Member to the directory marker that contains it
    Directory,
}

impl ReferenceKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            ReferenceKind::Supertype => "supertype",
            ReferenceKind::Interface => "interface",
            ReferenceKind::ConstantPoolClass => "constant pool class",
            ReferenceKind::MemberDescriptor => "member descriptor",
            ReferenceKind::GenericSignature => "generic signature",
            ReferenceKind::Annotation => "annotation",
            ReferenceKind::ResourceLiteral => "resource literal",
            ReferenceKind::ClassNameLiteral => "class name literal",
            ReferenceKind::ServiceProvider => "service provider",
            ReferenceKind::Manifest => "manifest",
            ReferenceKind::Directory => "directory",
        }
    }

    /// Whether the edge comes from bytecode structure rather than string matching
    pub fn is_structural(&self) -> bool {
        !matches!(
            self,
            ReferenceKind::ResourceLiteral
                | ReferenceKind::ClassNameLiteral
                | ReferenceKind::ServiceProvider
                | ReferenceKind::Manifest
                | ReferenceKind::Directory
        )
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
