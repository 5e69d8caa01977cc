use super::ShrinkReport;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Serialize;
use std::path::PathBuf;

/// JSON reporter for programmatic output
pub struct JsonReporter {
    output_path: Option<PathBuf>,
}

impl JsonReporter {
    pub fn new(output_path: Option<PathBuf>) -> Self {
        Self { output_path }
    }

    pub fn report(&self, report: &ShrinkReport) -> Result<()> {
        let json = Self::render(report)?;

        if let Some(path) = &self.output_path {
            std::fs::write(path, &json)
                .into_diagnostic()
                .wrap_err_with(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("Report written to: {}", path.display());
        } else {
            println!("{}", json);
        }

        Ok(())
    }

    pub fn render(report: &ShrinkReport) -> Result<String> {
        serde_json::to_string_pretty(&JsonReport::new(report)).into_diagnostic()
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    version: &'static str,
    dry_run: bool,
    summary: JsonSummary,
    #[serde(flatten)]
    report: &'a ShrinkReport,
}

#[derive(Serialize)]
struct JsonSummary {
    pruned_members: usize,
    pruned_bytes: u64,
    reduction_percent: f64,
}

impl<'a> JsonReport<'a> {
    fn new(report: &'a ShrinkReport) -> Self {
        Self {
            version: "1.0",
            dry_run: report.is_dry_run(),
            summary: JsonSummary {
                pruned_members: report.pruned.len(),
                pruned_bytes: report.pruned_bytes(),
                reduction_percent: report.reduction_percent(),
            },
            report,
        }
    }
}
