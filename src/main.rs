use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

use jarprune::graph::{MalformedClassPolicy, ResourceMatching};
use jarprune::{CancellationToken, Config, Pipeline, ReportFormat, Reporter, ShrinkError, Stage};

/// jarprune - Shrink Java archives to what their entry point can reach
#[derive(Parser, Debug)]
#[command(name = "jarprune")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Archive to shrink
    input: PathBuf,

    /// Output archive (default: <input stem>.min.jar next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Entry point class (a.b.Main); defaults to the manifest Main-Class
    #[arg(short, long)]
    entry_point: Option<String>,

    /// Class patterns to keep regardless of reachability (can be specified multiple times)
    #[arg(short, long, value_name = "PATTERN")]
    keep: Vec<String>,

    /// Resource path patterns to keep regardless of reachability (can be specified multiple times)
    #[arg(long, value_name = "PATTERN")]
    keep_resource: Vec<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How string literals are matched against resource paths
    #[arg(long, value_enum)]
    resource_matching: Option<MatchingArg>,

    /// Do not treat string literals naming a class as references
    #[arg(long)]
    no_class_literals: bool,

    /// What to do with class files that fail to parse
    #[arg(long, value_enum)]
    on_malformed: Option<MalformedArg>,

    /// Deflate stored members when that makes them smaller
    #[arg(long)]
    recompress: bool,

    /// Report retained resources with identical content
    #[arg(long)]
    duplicates: bool,

    /// Dry run - show what would be pruned without writing an archive
    #[arg(long)]
    dry_run: bool,

    /// Report format
    #[arg(short, long, value_enum, default_value = "terminal")]
    format: OutputFormat,

    /// Also write a JSON report to a file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Worker threads (default: one per core)
    #[arg(long)]
    threads: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode - only output results
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default)]
enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Terminal => ReportFormat::Terminal,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MatchingArg {
    Normalized,
    Contains,
}

impl From<MatchingArg> for ResourceMatching {
    fn from(arg: MatchingArg) -> Self {
        match arg {
            MatchingArg::Normalized => ResourceMatching::Normalized,
            MatchingArg::Contains => ResourceMatching::Contains,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MalformedArg {
    Fail,
    TreatAsResource,
}

impl From<MalformedArg> for MalformedClassPolicy {
    fn from(arg: MalformedArg) -> Self {
        match arg {
            MalformedArg::Fail => MalformedClassPolicy::Fail,
            MalformedArg::TreatAsResource => MalformedClassPolicy::TreatAsResource,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    if let Err(report) = run(&cli) {
        let code = report
            .downcast_ref::<ShrinkError>()
            .map(ShrinkError::exit_code)
            .unwrap_or(1);
        eprintln!("{:?}", report);
        std::process::exit(code);
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        // Try to load from next to the input
        Config::from_default_locations(input_dir(&cli.input))?
    };

    // Override with CLI arguments
    if let Some(entry_point) = &cli.entry_point {
        config.keep.entry_point = Some(entry_point.clone());
    }
    config.keep.keep_patterns.extend(cli.keep.iter().cloned());
    config
        .keep
        .keep_resources_matching
        .extend(cli.keep_resource.iter().cloned());
    if let Some(matching) = cli.resource_matching {
        config.resource_matching = matching.into();
    }
    if cli.no_class_literals {
        config.class_name_literals = false;
    }
    if let Some(policy) = cli.on_malformed {
        config.malformed_classes = policy.into();
    }
    config.recompress |= cli.recompress;
    config.duplicates |= cli.duplicates;
    if let Some(threads) = cli.threads {
        config.threads = threads;
    }

    Ok(config)
}

fn input_dir(input: &Path) -> &Path {
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// `<stem>.min.jar` next to the input
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    input_dir(input).join(format!("{}.min.jar", stem))
}

fn configure_threads(threads: usize) -> Result<()> {
    if threads == 0 {
        return Ok(());
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .into_diagnostic()
        .wrap_err("Failed to configure worker threads")
}

fn stage_spinner(hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .into_diagnostic()?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    Ok(spinner)
}

fn run(cli: &Cli) -> Result<()> {
    let start_time = Instant::now();
    info!("jarprune v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli)?;
    configure_threads(config.threads)?;

    // Ctrl-C trips the token; the pipeline stops at its next checkpoint
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .into_diagnostic()
        .wrap_err("Failed to install Ctrl-C handler")?;

    let spinner = stage_spinner(cli.quiet)?;
    let progress = spinner.clone();
    let pipeline = Pipeline::new(config.shrink_options())
        .with_cancellation(cancel)
        .on_stage(move |stage| {
            if stage != Stage::Done {
                progress.set_message(format!("{}...", stage));
            }
        });

    let result = if cli.dry_run {
        pipeline.analyze(&cli.input, &config.keep)
    } else {
        let output = cli.output.clone().unwrap_or_else(|| default_output(&cli.input));
        pipeline.run(&cli.input, &output, &config.keep)
    };
    spinner.finish_and_clear();
    let report = result?;

    let reporter = Reporter::new(cli.format.into(), cli.report.clone());
    reporter.report(&report)?;

    let elapsed = start_time.elapsed();
    if !cli.quiet && matches!(cli.format, OutputFormat::Terminal) {
        println!(
            "{}",
            format!("Finished in {:.2}s", elapsed.as_secs_f64()).dimmed()
        );
    }
    info!("Done in {:.2}s", elapsed.as_secs_f64());

    Ok(())
}
