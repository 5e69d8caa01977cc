//! The shrink pipeline
//!
//! A run moves through [`Stage`]s strictly forward: the archive is indexed,
//! roots are resolved, classes are parsed into a reference graph, the
//! reachable closure is computed and finally written out. Any failure
//! aborts the run and leaves the output path untouched.

mod context;

pub use context::{CancellationToken, RunContext, StageObserver};

use crate::analysis::{CycleDetector, KeepRuleEvaluator, KeepRules, ReachabilityResolver};
use crate::archive::{ArchiveIndex, ArchiveWriter};
use crate::error::Result;
use crate::graph::{ExtractionOptions, GraphBuilder, MalformedClassPolicy, ResourceMatching};
use crate::hash::DuplicateFinder;
use crate::report::{PrunedMember, ShrinkReport};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Idle,
    Indexing,
    Extracting,
    Resolving,
    Writing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Indexing => "indexing",
            Stage::Extracting => "extracting",
            Stage::Resolving => "resolving",
            Stage::Writing => "writing",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavior switches for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkOptions {
    pub resource_matching: ResourceMatching,
    pub class_name_literals: bool,
    pub malformed_classes: MalformedClassPolicy,
    /// Deflate stored members when that makes them smaller
    pub recompress: bool,
    /// Report retained resources with identical content
    pub find_duplicates: bool,
    /// Keep `META-INF/services` files for interfaces outside the archive
    pub keep_external_services: bool,
}

impl Default for ShrinkOptions {
    fn default() -> Self {
        Self {
            resource_matching: ResourceMatching::default(),
            class_name_literals: true,
            malformed_classes: MalformedClassPolicy::default(),
            recompress: false,
            find_duplicates: false,
            keep_external_services: true,
        }
    }
}

impl ShrinkOptions {
    pub fn extraction(&self) -> ExtractionOptions {
        ExtractionOptions {
            resource_matching: self.resource_matching,
            class_name_literals: self.class_name_literals,
            malformed_classes: self.malformed_classes,
        }
    }
}

/// Entry point to the shrinker
pub struct Pipeline {
    options: ShrinkOptions,
    cancel: CancellationToken,
    observer: Option<StageObserver>,
}

impl Pipeline {
    pub fn new(options: ShrinkOptions) -> Self {
        Self {
            options,
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Register a callback for stage transitions
    pub fn on_stage<F>(mut self, observer: F) -> Self
    where
        F: Fn(Stage) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// Token that cancels runs of this pipeline
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Shrink `input` into `output`
    pub fn run(&self, input: &Path, output: &Path, rules: &KeepRules) -> Result<ShrinkReport> {
        self.execute(input, Some(output), rules)
    }

    /// Compute what would be pruned without writing anything
    pub fn analyze(&self, input: &Path, rules: &KeepRules) -> Result<ShrinkReport> {
        self.execute(input, None, rules)
    }

    fn execute(&self, input: &Path, output: Option<&Path>, rules: &KeepRules) -> Result<ShrinkReport> {
        let mut ctx = RunContext::new(self.options, self.cancel.clone(), self.observer.clone());

        ctx.enter(Stage::Indexing)?;
        let index = ArchiveIndex::open(input)?;
        if index.skipped_duplicates() > 0 {
            ctx.warn(format!(
                "Skipped {} duplicate entries with identical content",
                index.skipped_duplicates()
            ));
        }

        // Roots are resolved before any class is parsed so a bad entry point fails fast
        let keep = KeepRuleEvaluator::new(rules)?
            .with_external_services(ctx.options.keep_external_services)
            .resolve_roots(&index)?;
        ctx.extend_warnings(
            keep.unmatched_patterns
                .iter()
                .map(|p| format!("Keep pattern `{}` matched no members", p)),
        );

        ctx.enter(Stage::Extracting)?;
        let builder = GraphBuilder::new(&index, ctx.options.extraction()).with_cancellation(ctx.cancel.clone());
        let graph = {
            let extraction = builder.extract()?;
            ctx.extend_warnings(extraction.warnings);
            builder.build(&extraction.descriptors)?
        };

        ctx.enter(Stage::Resolving)?;
        let resolver = ReachabilityResolver::new();
        let retained = resolver.resolve(&graph, &keep);
        let pruned = resolver.find_pruned(&index, &retained);
        let pruned_cycles = CycleDetector::new().find_pruned_cycles(&graph, &retained);
        let duplicates = if ctx.options.find_duplicates {
            DuplicateFinder::md5().find(&index, &retained)?
        } else {
            Vec::new()
        };

        let stored_bytes_after: u64 = index
            .members()
            .iter()
            .filter(|m| retained.contains(&m.path))
            .map(|m| m.stored_size())
            .sum();

        let mut report = ShrinkReport {
            input: input.to_path_buf(),
            output: None,
            entry_points: keep.entry_points.clone(),
            members_before: index.len(),
            members_after: retained.len(),
            stored_bytes_before: index.stored_size(),
            stored_bytes_after,
            written_bytes: None,
            recompressed: 0,
            references: graph.reference_count(),
            pruned: pruned.iter().map(|m| PrunedMember::from_member(m)).collect(),
            pruned_cycles,
            duplicates,
            unmatched_patterns: keep.unmatched_patterns.clone(),
            warnings: Vec::new(),
        };

        if let Some(output) = output {
            ctx.enter(Stage::Writing)?;
            let summary = ArchiveWriter::new(output)
                .with_recompression(ctx.options.recompress)
                .with_cancellation(ctx.cancel.clone())
                .write(&index, &retained)?;
            report.output = Some(output.to_path_buf());
            report.written_bytes = Some(summary.bytes_written);
            report.recompressed = summary.recompressed;
        }

        ctx.finish();
        report.warnings = ctx.take_warnings();
        Ok(report)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(ShrinkOptions::default())
    }
}
