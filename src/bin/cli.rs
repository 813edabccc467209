//! jobwatch CLI
//!
//! One invocation of `run` is one pipeline execution; schedule it externally.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use jobwatch::{
    error::Result,
    models::Config,
    pipeline::{self, ListingView, ViewFilter},
    utils,
};

/// jobwatch - job listing watcher
#[derive(Parser, Debug)]
#[command(
    name = "jobwatch",
    version,
    about = "Collects job listings, stores new ones once, and announces them"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "jobwatch.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one batch, store new listings and notify (default)
    Run,

    /// Print stored listings, newest first
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Print at most this many listings
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show counts over all stored listings
    Stats,

    /// Validate the configuration file
    Validate,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Case-insensitive substring of the title
    #[arg(long)]
    title: Option<String>,

    /// Case-insensitive substring of the company
    #[arg(long)]
    company: Option<String>,

    /// Exact location to include (repeatable)
    #[arg(long = "location")]
    locations: Vec<String>,
}

impl From<FilterArgs> for ViewFilter {
    fn from(args: FilterArgs) -> Self {
        ViewFilter {
            title: args.title,
            company: args.company,
            locations: args.locations,
        }
    }
}

/// Install the logger, then load configuration.
///
/// The logger needs the `[logging]` section, so it is read first; load
/// problems are reported once logging is up.
fn bootstrap(cli: &Cli) -> Config {
    let logging = Config::load(&cli.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = utils::log::init(&logging, cli.verbose) {
        eprintln!("{e}");
    }

    let config = Config::load_or_default(&cli.config);
    log::debug!("Configuration source: {}", cli.config.display());
    config
}

async fn run(config: Config) -> ExitCode {
    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return ExitCode::FAILURE;
    }

    let report = pipeline::run_pipeline(Arc::new(config)).await;
    log::info!(
        "Run finished: state={:?} fetched={} new={} duplicates={} unkeyed={} notified={}/{} in {:.1?}",
        report.state,
        report.fetched,
        report.new_records,
        report.duplicates,
        report.unkeyed,
        report.notify.sent,
        report.notify.attempts(),
        report.elapsed
    );
    ExitCode::from(report.exit_code())
}

async fn list(config: &Config, filter: ViewFilter, limit: Option<usize>) -> Result<()> {
    let view = ListingView::load(&config.store).await?;
    let shown: Vec<_> = view
        .filter(&filter)
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    println!("date_added\ttitle\tcompany\tlocation\tsite\tjob_url");
    for record in &shown {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            record.observed_at.format("%Y-%m-%d %H:%M"),
            record.title,
            record.company,
            record.location,
            record.site.as_deref().unwrap_or(""),
            record.job_url
        );
    }
    log::info!("{} of {} listings shown", shown.len(), view.len());
    Ok(())
}

async fn stats(config: &Config) -> Result<()> {
    let view = ListingView::load(&config.store).await?;
    let stats = view.stats();

    println!("Total listings:    {}", stats.total);
    println!("Added today:       {}", stats.today);
    match &stats.top_company {
        Some((company, count)) => println!("Top company:       {} ({})", company, count),
        None => println!("Top company:       -"),
    }
    match &stats.top_location {
        Some((location, count)) => println!("Top location:      {} ({})", location, count),
        None => println!("Top location:      -"),
    }
    let locations = view.locations();
    if !locations.is_empty() {
        println!("Locations:         {}", locations.join(", "));
    }
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = bootstrap(&cli);

    let outcome = match cli.command.unwrap_or(Command::Run) {
        Command::Run => return run(config).await,
        Command::List { filter, limit } => list(&config, filter.into(), limit).await,
        Command::Stats => stats(&config).await,
        Command::Validate => {
            log::info!("Validating {}...", cli.config.display());
            config.validate().map(|()| log::info!("✓ Config OK"))
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
