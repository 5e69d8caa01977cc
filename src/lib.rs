//! jarprune - shrink Java archives to what their entry point can reach
//!
//! This library reads a JAR (or any ZIP of compiled classes and resources),
//! discovers every reference between its members and writes a new archive
//! holding only the members reachable from the declared roots.
//!
//! # Architecture
//!
//! The pipeline consists of:
//! 1. **Indexing** - Read the central directory into ordered [`ArchiveMember`]s
//! 2. **Root resolution** - Entry point, keep patterns, manifest and service roots
//! 3. **Extraction** - Parse class files into outbound type and literal references
//! 4. **Graph building** - Link members into a [`ReferenceGraph`]
//! 5. **Reachability** - Breadth-first closure over the graph from the roots
//! 6. **Writing** - Copy retained members verbatim into the output archive
//! 7. **Reporting** - Summarize what was pruned, in various formats

pub mod analysis;
pub mod archive;
pub mod classfile;
pub mod config;
pub mod error;
pub mod graph;
pub mod hash;
pub mod pipeline;
pub mod report;

#[cfg(test)]
mod test_support;

pub use analysis::{CycleDetector, KeepRuleEvaluator, KeepRules, KeepSet, ReachabilityResolver, RetainedSet};
pub use archive::{ArchiveIndex, ArchiveMember, ArchiveWriter, MemberKind};
pub use classfile::{ClassDescriptor, ReferenceExtractor};
pub use config::Config;
pub use error::{Result, ShrinkError};
pub use graph::{GraphBuilder, MalformedClassPolicy, ReferenceGraph, ReferenceKind, ResourceMatching};
pub use hash::{ContentHasher, DuplicateFinder, Md5Hasher};
pub use pipeline::{CancellationToken, Pipeline, ShrinkOptions, Stage};
pub use report::{ReportFormat, Reporter, ShrinkReport};
