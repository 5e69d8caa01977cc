use super::ShrinkReport;
use crate::archive::MemberKind;
use colored::Colorize;
use miette::Result;

/// Terminal reporter with colored output
pub struct TerminalReporter {
    /// Pruned members listed before the rest are summarized
    max_listed: usize,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self { max_listed: 20 }
    }

    pub fn report(&self, report: &ShrinkReport) -> Result<()> {
        println!();
        if report.is_dry_run() {
            println!("{}", "Dry run: nothing was written".yellow().bold());
        }

        if !report.entry_points.is_empty() {
            println!("{} {}", "Entry point:".dimmed(), report.entry_points.join(", ").white());
        }

        self.print_pruned(report);
        self.print_cycles(report);
        self.print_duplicates(report);
        self.print_warnings(report);
        self.print_summary(report);

        Ok(())
    }

    fn print_pruned(&self, report: &ShrinkReport) {
        if report.pruned.is_empty() {
            println!("{}", "Every member is reachable, nothing to prune!".green().bold());
            return;
        }

        println!();
        println!(
            "{}",
            format!("Pruned {} members:", report.pruned.len()).yellow().bold()
        );

        for member in report.pruned.iter().take(self.max_listed) {
            let kind = match member.kind {
                MemberKind::Class => "class".cyan(),
                MemberKind::Resource => "resource".magenta(),
                MemberKind::Directory => "dir".dimmed(),
            };
            println!(
                "  {} {:>8} {}",
                kind,
                human_bytes(member.stored_size).dimmed(),
                member.path
            );
        }

        let hidden = report.pruned.len().saturating_sub(self.max_listed);
        if hidden > 0 {
            println!("  {}", format!("... and {} more", hidden).dimmed());
        }
    }

    fn print_cycles(&self, report: &ShrinkReport) {
        if report.pruned_cycles.is_empty() {
            return;
        }

        println!();
        println!(
            "{}",
            format!("{} pruned reference cycles:", report.pruned_cycles.len()).cyan().bold()
        );
        for cycle in &report.pruned_cycles {
            println!("  {} {}", format!("[{}]", cycle.size).dimmed(), cycle.members.join(" ↔ "));
        }
    }

    fn print_duplicates(&self, report: &ShrinkReport) {
        if report.duplicates.is_empty() {
            return;
        }

        println!();
        println!(
            "{}",
            format!("{} groups of identical resources:", report.duplicates.len())
                .cyan()
                .bold()
        );
        for group in &report.duplicates {
            println!(
                "  {} {}",
                human_bytes(group.size).dimmed(),
                group.paths.join(", ")
            );
        }
    }

    fn print_warnings(&self, report: &ShrinkReport) {
        if report.warnings.is_empty() {
            return;
        }

        println!();
        for warning in &report.warnings {
            println!("{} {}", "warning:".yellow().bold(), warning);
        }
    }

    fn print_summary(&self, report: &ShrinkReport) {
        println!();
        println!("{}", "─".repeat(60).dimmed());

        let classes = report.pruned_of_kind(MemberKind::Class);
        let resources = report.pruned_of_kind(MemberKind::Resource);
        let directories = report.pruned_of_kind(MemberKind::Directory);

        println!(
            "Members: {} → {} ({} classes, {} resources, {} directories pruned)",
            report.members_before,
            report.members_after.to_string().green(),
            classes,
            resources,
            directories
        );
        println!(
            "Stored:  {} → {} ({})",
            human_bytes(report.stored_bytes_before),
            human_bytes(report.stored_bytes_after).green(),
            format!("-{:.1}%", report.reduction_percent()).green().bold()
        );

        if let (Some(output), Some(written)) = (&report.output, report.written_bytes) {
            let recompressed = if report.recompressed > 0 {
                format!(", {} recompressed", report.recompressed)
            } else {
                String::new()
            };
            println!(
                "Wrote {} ({}{})",
                output.display().to_string().cyan().bold(),
                human_bytes(written),
                recompressed
            );
        }
    }
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
