use crate::archive::manifest::MANIFEST_PATH;
use crate::archive::{ArchiveIndex, ArchiveMember, Manifest, MemberKind};
use crate::classfile::internal_name;
use crate::error::{Result, ShrinkError};
use crate::graph::{is_service_file, SERVICES_DIR};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// User-declared roots and forced retentions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepRules {
    /// Entry point class (`a.b.Main`, `a/b/Main` or `a/b/Main.class`)
    #[serde(alias = "entryPoint")]
    pub entry_point: Option<String>,

    /// Class name patterns to keep regardless of reachability
    #[serde(alias = "keepPatterns")]
    pub keep_patterns: Vec<String>,

    /// Resource path patterns to keep regardless of reachability
    #[serde(alias = "keepResourcesMatching")]
    pub keep_resources_matching: Vec<String>,
}

impl KeepRules {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: Some(entry_point.into()),
            ..Default::default()
        }
    }

    pub fn with_keep_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.keep_patterns.push(pattern.into());
        self
    }

    pub fn with_resource_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.keep_resources_matching.push(pattern.into());
        self
    }
}

/// An exact name or glob pattern
///
/// `*` and `?` stay within one name segment, `**` crosses segments.
#[derive(Debug, Clone)]
pub struct KeepPattern {
    source: String,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Glob(Regex),
}

impl KeepPattern {
    /// Pattern over binary class names (`a.b.C`)
    pub fn class(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        let normalized = trimmed.strip_suffix(".class").unwrap_or(trimmed).replace('/', ".");
        Self::compile(pattern, &normalized, '.')
    }

    /// Pattern over member paths (`a/b/c.txt`)
    pub fn resource(pattern: &str) -> Result<Self> {
        let trimmed = pattern.trim();
        Self::compile(pattern, trimmed.trim_start_matches('/'), '/')
    }

    fn compile(source: &str, text: &str, separator: char) -> Result<Self> {
        if !text.contains(['*', '?']) {
            return Ok(Self {
                source: source.to_string(),
                matcher: Matcher::Exact(text.to_string()),
            });
        }

        let regex = Regex::new(&glob_to_regex(text, separator)).map_err(|e| {
            ShrinkError::InvalidKeepPattern {
                pattern: source.to_string(),
                source: e,
            }
        })?;
        Ok(Self {
            source: source.to_string(),
            matcher: Matcher::Glob(regex),
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(name) => name == candidate,
            Matcher::Glob(regex) => regex.is_match(candidate),
        }
    }

    /// Pattern as written by the user
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn glob_to_regex(glob: &str, separator: char) -> String {
    let any_in_segment = format!("[^{}]", regex::escape(&separator.to_string()));
    let mut regex = String::from("^");
    let mut chars = glob.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                regex.push_str(".*");
            }
            '*' => {
                regex.push_str(&any_in_segment);
                regex.push('*');
            }
            '?' => regex.push_str(&any_in_segment),
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Members that seed the reachability search
#[derive(Debug, Clone, Default)]
pub struct KeepSet {
    roots: Vec<String>,
    members: HashSet<String>,
    /// Entry point names as resolved, in internal form
    pub entry_points: Vec<String>,
    /// Patterns that matched no member
    pub unmatched_patterns: Vec<String>,
}

impl KeepSet {
    pub(crate) fn insert(&mut self, path: &str) -> bool {
        if !self.members.insert(path.to_string()) {
            return false;
        }
        self.roots.push(path.to_string());
        true
    }

    pub fn contains(&self, path: &str) -> bool {
        self.members.contains(path)
    }

    /// Root paths in the order they were added
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Turns [`KeepRules`] into a [`KeepSet`] for one archive
pub struct KeepRuleEvaluator {
    entry_point: Option<String>,
    class_patterns: Vec<KeepPattern>,
    resource_patterns: Vec<KeepPattern>,
    external_services: bool,
}

impl KeepRuleEvaluator {
    /// Compile the patterns of a rule set
    pub fn new(rules: &KeepRules) -> Result<Self> {
        let class_patterns = rules
            .keep_patterns
            .iter()
            .map(|p| KeepPattern::class(p))
            .collect::<Result<Vec<_>>>()?;
        let resource_patterns = rules
            .keep_resources_matching
            .iter()
            .map(|p| KeepPattern::resource(p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            entry_point: rules.entry_point.clone().filter(|e| !e.trim().is_empty()),
            class_patterns,
            resource_patterns,
            external_services: true,
        })
    }

    /// Keep service registrations for interfaces that are not in the archive
    pub fn with_external_services(mut self, keep: bool) -> Self {
        self.external_services = keep;
        self
    }

    /// Whether a keep pattern forces this member to be retained
    pub fn is_forced(&self, member: &ArchiveMember) -> bool {
        self.forcing_patterns(member).next().is_some()
    }

    fn forcing_patterns<'s>(&'s self, member: &'s ArchiveMember) -> Box<dyn Iterator<Item = usize> + 's> {
        match member.kind {
            MemberKind::Class => {
                let Some(name) = member.type_name() else {
                    return Box::new(std::iter::empty());
                };
                let binary = name.replace('/', ".");
                Box::new(
                    self.class_patterns
                        .iter()
                        .enumerate()
                        .filter(move |(_, p)| p.matches(&binary))
                        .map(|(i, _)| i),
                )
            }
            MemberKind::Resource => Box::new(
                self.resource_patterns
                    .iter()
                    .enumerate()
                    .filter(move |(_, p)| p.matches(&member.path))
                    .map(|(i, _)| i),
            ),
            MemberKind::Directory => Box::new(std::iter::empty()),
        }
    }

    /// Compute the roots for an archive
    ///
    /// Fails when no entry point can be determined or the entry point is
    /// not a class of the archive.
    pub fn resolve_roots(&self, index: &ArchiveIndex) -> Result<KeepSet> {
        let entry_point = match &self.entry_point {
            Some(entry) => entry.trim().to_string(),
            None => {
                let manifest = Manifest::read(index)?;
                let main_class = manifest.as_ref().and_then(Manifest::main_class);
                match main_class {
                    Some(main) => {
                        info!("Using Main-Class {} from the manifest", main);
                        main.to_string()
                    }
                    None => return Err(ShrinkError::MissingEntryPoint),
                }
            }
        };

        let type_name = internal_name(&entry_point);
        let entries: Vec<&ArchiveMember> = index.find_class(&type_name).collect();
        if entries.is_empty() {
            return Err(ShrinkError::UnknownEntryPoint { entry_point });
        }

        let mut keep = KeepSet::default();
        keep.entry_points.push(type_name);
        for member in entries {
            keep.insert(&member.path);
        }

        let mut class_matched = vec![false; self.class_patterns.len()];
        let mut resource_matched = vec![false; self.resource_patterns.len()];

        for member in index.members() {
            let mut forced = false;
            for i in self.forcing_patterns(member) {
                forced = true;
                match member.kind {
                    MemberKind::Class => class_matched[i] = true,
                    _ => resource_matched[i] = true,
                }
            }
            if forced && keep.insert(&member.path) {
                debug!("Forcing retention of {}", member.path);
            }

            if is_archive_metadata(member) {
                keep.insert(&member.path);
            }

            if self.external_services
                && is_service_file(member)
                && index
                    .find_class(&internal_name(&member.path[SERVICES_DIR.len()..]))
                    .next()
                    .is_none()
            {
                debug!("Keeping registration for external service {}", member.path);
                keep.insert(&member.path);
            }
        }

        let unmatched = self
            .class_patterns
            .iter()
            .zip(&class_matched)
            .chain(self.resource_patterns.iter().zip(&resource_matched))
            .filter(|(_, matched)| !**matched)
            .map(|(pattern, _)| pattern.as_str().to_string());
        for pattern in unmatched {
            warn!("Keep pattern `{}` matched no members", pattern);
            keep.unmatched_patterns.push(pattern);
        }

        info!("Resolved {} roots", keep.len());
        Ok(keep)
    }
}

/// Manifest and module descriptors are always kept
fn is_archive_metadata(member: &ArchiveMember) -> bool {
    member.path == MANIFEST_PATH
        || member.path == "module-info.class"
        || member.path.ends_with("/module-info.class")
}
