use super::{ReferenceGraph, ReferenceKind};
use crate::archive::manifest::MANIFEST_PATH;
use crate::archive::{parent_directory, ArchiveIndex, ArchiveMember, Manifest, MemberKind};
use crate::classfile::{internal_name, ClassDescriptor, ReferenceExtractor};
use crate::error::{Result, ShrinkError};
use crate::pipeline::{CancellationToken, Stage};
use aho_corasick::{AhoCorasick, MatchKind};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Directory holding `ServiceLoader` registrations
pub const SERVICES_DIR: &str = "META-INF/services/";

/// Shortest member path searched for inside string literals
const MIN_CONTAINED_PATH_LEN: usize = 4;

/// How string constants are matched against resource paths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceMatching {
    /// Literal equals a member path after normalization, or its package-relative form
    Normalized,
    /// Like `Normalized`, plus any member path occurring inside a literal
    #[default]
    Contains,
}

/// What to do with a class member that fails to parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedClassPolicy {
    /// Abort the run
    #[default]
    Fail,
    /// Keep going; the member adds no references and is kept only if referenced
    TreatAsResource,
}

/// Options controlling reference discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionOptions {
    pub resource_matching: ResourceMatching,
    /// Link string constants equal to a binary class name (`a.b.C`)
    pub class_name_literals: bool,
    pub malformed_classes: MalformedClassPolicy,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            resource_matching: ResourceMatching::default(),
            class_name_literals: true,
            malformed_classes: MalformedClassPolicy::default(),
        }
    }
}

/// Output of the extraction stage
#[derive(Debug, Default)]
pub struct Extraction {
    /// One descriptor per parsed class, in archive order
    pub descriptors: Vec<ClassDescriptor>,
    /// Class members that failed to parse and were treated as resources
    pub opaque: Vec<String>,
    pub warnings: Vec<String>,
}

/// Builds the reference graph for one archive
pub struct GraphBuilder<'a> {
    index: &'a ArchiveIndex,
    options: ExtractionOptions,
    cancel: CancellationToken,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(index: &'a ArchiveIndex, options: ExtractionOptions) -> Self {
        Self {
            index,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Parse every class member in parallel
    pub fn extract(&self) -> Result<Extraction> {
        let classes: Vec<&ArchiveMember> = self.index.classes().collect();
        info!("Extracting references from {} classes in parallel...", classes.len());

        let results: Vec<Result<ClassDescriptor>> = classes
            .par_iter()
            .map(|member| {
                self.cancel.check(Stage::Extracting)?;
                ReferenceExtractor::extract(member)
            })
            .collect();

        self.cancel.check(Stage::Extracting)?;

        let mut extraction = Extraction::default();
        for result in results {
            match result {
                Ok(descriptor) => extraction.descriptors.push(descriptor),
                Err(ShrinkError::MalformedClass { member, reason })
                    if self.options.malformed_classes == MalformedClassPolicy::TreatAsResource =>
                {
                    let message = format!("{}: {} (treated as a resource)", member, reason);
                    warn!("{}", message);
                    extraction.warnings.push(message);
                    extraction.opaque.push(member);
                }
                Err(e) => return Err(e),
            }
        }

        let references: usize = extraction.descriptors.iter().map(|d| d.references.len()).sum();
        info!(
            "Extracted {} type references from {} classes",
            references,
            extraction.descriptors.len()
        );
        Ok(extraction)
    }

    /// Assemble the graph from extracted descriptors and archive metadata
    pub fn build(&self, descriptors: &[ClassDescriptor]) -> Result<ReferenceGraph> {
        self.cancel.check(Stage::Extracting)?;
        let mut graph = ReferenceGraph::new(self.index);

        self.add_type_references(&mut graph, descriptors);
        self.add_literal_references(&mut graph, descriptors);
        self.add_service_references(&mut graph)?;
        self.add_manifest_references(&mut graph)?;
        self.add_directory_references(&mut graph);

        info!(
            "Built reference graph: {} members, {} references",
            graph.member_count(),
            graph.reference_count()
        );
        Ok(graph)
    }

    fn add_type_references(&self, graph: &mut ReferenceGraph, descriptors: &[ClassDescriptor]) {
        for descriptor in descriptors {
            for reference in &descriptor.references {
                for target in self.index.find_class(&reference.name) {
                    graph.add_reference(&descriptor.path, &target.path, reference.kind);
                }
            }
        }
    }

    fn add_literal_references(&self, graph: &mut ReferenceGraph, descriptors: &[ClassDescriptor]) {
        let matcher = LiteralMatcher::new(self.index, self.options.resource_matching);

        for descriptor in descriptors {
            for literal in &descriptor.string_literals {
                for target in matcher.matches(&descriptor.path, literal) {
                    graph.add_reference(&descriptor.path, target, ReferenceKind::ResourceLiteral);
                }

                if self.options.class_name_literals && looks_like_binary_name(literal) {
                    for target in self.index.find_class(&internal_name(literal)) {
                        graph.add_reference(&descriptor.path, &target.path, ReferenceKind::ClassNameLiteral);
                    }
                }
            }
        }
    }

    /// Interface -> registration file -> listed implementations
    fn add_service_references(&self, graph: &mut ReferenceGraph) -> Result<()> {
        for file in self.index.members().iter().filter(|m| is_service_file(m)) {
            let service = &file.path[SERVICES_DIR.len()..];
            for interface in self.index.find_class(&internal_name(service)) {
                graph.add_reference(&interface.path, &file.path, ReferenceKind::ServiceProvider);
            }

            let data = file.data()?;
            let text = String::from_utf8_lossy(&data);
            for provider in service_providers(&text) {
                let mut found = false;
                for implementation in self.index.find_class(&internal_name(provider)) {
                    graph.add_reference(&file.path, &implementation.path, ReferenceKind::ServiceProvider);
                    found = true;
                }
                if !found {
                    debug!("{} lists {} which is not in the archive", file.path, provider);
                }
            }
        }
        Ok(())
    }

    fn add_manifest_references(&self, graph: &mut ReferenceGraph) -> Result<()> {
        let Some(manifest) = Manifest::read(self.index)? else {
            return Ok(());
        };

        for class_name in manifest.referenced_classes() {
            for target in self.index.find_class(&internal_name(class_name)) {
                graph.add_reference(MANIFEST_PATH, &target.path, ReferenceKind::Manifest);
            }
        }
        Ok(())
    }

    /// Link each member to its nearest enclosing marker, skipping absent ones
    fn add_directory_references(&self, graph: &mut ReferenceGraph) {
        for member in self.index.members() {
            let mut directory = member.parent_directory();
            while let Some(path) = directory {
                if self.index.get(path).is_some() {
                    graph.add_reference(&member.path, path, ReferenceKind::Directory);
                    break;
                }
                directory = parent_directory(path);
            }
        }
    }
}

/// Whether a member is a `META-INF/services/<name>` registration file
pub fn is_service_file(member: &ArchiveMember) -> bool {
    member.kind == MemberKind::Resource
        && member
            .path
            .strip_prefix(SERVICES_DIR)
            .is_some_and(|name| !name.is_empty() && !name.contains('/'))
}

/// Provider class names listed in a service registration file
pub fn service_providers(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
}

fn looks_like_binary_name(literal: &str) -> bool {
    !literal.is_empty()
        && literal.len() <= 1024
        && !literal.starts_with('.')
        && !literal.ends_with('.')
        && literal
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '$'))
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '$')
}

/// Strip `classpath:` prefixes, leading slashes and `.` segments
fn normalize_literal(literal: &str) -> (String, bool) {
    let stripped = literal
        .strip_prefix("classpath*:")
        .or_else(|| literal.strip_prefix("classpath:"))
        .unwrap_or(literal);
    let absolute = stripped.starts_with('/');
    let normalized = stripped
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/");
    (normalized, absolute)
}

/// Finds member paths named by a string constant
struct LiteralMatcher<'a> {
    index: &'a ArchiveIndex,
    /// Candidate paths for substring search, indexed by automaton pattern id
    paths: Vec<&'a str>,
    automaton: Option<AhoCorasick>,
}

impl<'a> LiteralMatcher<'a> {
    fn new(index: &'a ArchiveIndex, mode: ResourceMatching) -> Self {
        if mode == ResourceMatching::Normalized {
            return Self {
                index,
                paths: Vec::new(),
                automaton: None,
            };
        }

        let paths: Vec<&str> = index
            .members()
            .iter()
            .filter(|m| m.kind != MemberKind::Directory && m.path.len() >= MIN_CONTAINED_PATH_LEN)
            .map(|m| m.path.as_str())
            .collect();

        let automaton = match AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(&paths)
        {
            Ok(automaton) => Some(automaton),
            Err(e) => {
                warn!("Falling back to normalized resource matching: {}", e);
                None
            }
        };

        Self {
            index,
            paths,
            automaton,
        }
    }

    fn is_file(&self, path: &str) -> Option<&'a str> {
        self.index
            .get(path)
            .filter(|m| m.kind != MemberKind::Directory)
            .map(|m| m.path.as_str())
    }

    /// Member paths a literal found in the class at `from` refers to
    fn matches(&self, from: &str, literal: &str) -> Vec<&'a str> {
        let mut found: Vec<&'a str> = Vec::new();
        let mut push = |path: &'a str| {
            if path != from && !found.contains(&path) {
                found.push(path);
            }
        };

        let (normalized, absolute) = normalize_literal(literal);
        if !normalized.is_empty() {
            if let Some(path) = self.is_file(&normalized) {
                push(path);
            }
            // Class.getResource resolves relative names against the class's package
            if !absolute {
                if let Some(cut) = from.rfind('/') {
                    let relative = format!("{}{}", &from[..=cut], normalized);
                    if let Some(path) = self.is_file(&relative) {
                        push(path);
                    }
                }
            }
        }

        if let Some(automaton) = &self.automaton {
            for m in automaton.find_overlapping_iter(literal) {
                let before = literal[..m.start()].chars().next_back();
                let after = literal[m.end()..].chars().next();
                if before.map_or(true, |c| !is_name_char(c)) && after.map_or(true, |c| !is_name_char(c)) {
                    push(self.paths[m.pattern().as_usize()]);
                }
            }
        }

        found
    }
}
