mod json;
mod terminal;

pub use json::JsonReporter;
pub use terminal::TerminalReporter;

use crate::analysis::PrunedCycle;
use crate::archive::{ArchiveMember, MemberKind};
use crate::hash::DuplicateGroup;
use miette::Result;
use serde::Serialize;
use std::path::PathBuf;

/// Output format for reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Terminal,
    Json,
}

/// A member that was left out of the output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrunedMember {
    pub path: String,
    pub kind: MemberKind,
    pub stored_size: u64,
}

impl PrunedMember {
    pub fn from_member(member: &ArchiveMember) -> Self {
        Self {
            path: member.path.clone(),
            kind: member.kind,
            stored_size: member.stored_size(),
        }
    }
}

/// Outcome of a shrink run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShrinkReport {
    pub input: PathBuf,
    /// `None` for a dry run
    pub output: Option<PathBuf>,
    pub entry_points: Vec<String>,
    pub members_before: usize,
    pub members_after: usize,
    pub stored_bytes_before: u64,
    pub stored_bytes_after: u64,
    /// Size of the written archive including headers
    pub written_bytes: Option<u64>,
    pub recompressed: usize,
    pub references: usize,
    pub pruned: Vec<PrunedMember>,
    pub pruned_cycles: Vec<PrunedCycle>,
    pub duplicates: Vec<DuplicateGroup>,
    pub unmatched_patterns: Vec<String>,
    pub warnings: Vec<String>,
}

impl ShrinkReport {
    pub fn is_dry_run(&self) -> bool {
        self.output.is_none()
    }

    pub fn pruned_bytes(&self) -> u64 {
        self.stored_bytes_before.saturating_sub(self.stored_bytes_after)
    }

    /// Share of stored bytes removed, in percent
    pub fn reduction_percent(&self) -> f64 {
        if self.stored_bytes_before == 0 {
            return 0.0;
        }
        self.pruned_bytes() as f64 * 100.0 / self.stored_bytes_before as f64
    }

    pub fn pruned_of_kind(&self, kind: MemberKind) -> usize {
        self.pruned.iter().filter(|m| m.kind == kind).count()
    }
}

/// Reporter for shrink results
///
/// With an output path the JSON report always goes to that file; the
/// terminal format still prints its summary to stdout.
pub struct Reporter {
    format: ReportFormat,
    output_path: Option<PathBuf>,
}

impl Reporter {
    pub fn new(format: ReportFormat, output_path: Option<PathBuf>) -> Self {
        Self { format, output_path }
    }

    pub fn report(&self, report: &ShrinkReport) -> Result<()> {
        match self.format {
            ReportFormat::Terminal => {
                TerminalReporter::new().report(report)?;
                if self.output_path.is_some() {
                    JsonReporter::new(self.output_path.clone()).report(report)?;
                }
                Ok(())
            }
            ReportFormat::Json => JsonReporter::new(self.output_path.clone()).report(report),
        }
    }
}
