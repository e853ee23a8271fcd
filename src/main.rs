//! Sitebinder command-line entry point

use clap::{Parser, Subcommand, ValueEnum};
use sitebinder::assemble::{
    generate_chunked, parse_size, presentable, CommandRenderer, Generator, MarkdownGenerator,
    OutputContext, PagePartitioner, Partitioner, PdfGenerator, SizePartitioner,
};
use sitebinder::cache::{doctor, SessionCache};
use sitebinder::config::{load_config, Config};
use sitebinder::crawler::{crawl, CrawlOptions, CrawlReport};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sitebinder: a polite site archiver
///
/// Crawls an owner-scoped section of a website, caches every page record
/// incrementally, and binds the session into a PDF or Markdown archive.
#[derive(Parser, Debug)]
#[command(name = "sitebinder")]
#[command(version)]
#[command(about = "A polite site archiver", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Markdown,
    Pdf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl a site and export the archive
    Crawl {
        /// Seed URL; its path defines the crawl scope
        url: String,

        /// Regex patterns excluding URLs from the crawl (repeatable)
        #[arg(long = "exclude", value_name = "PATTERN")]
        exclude_patterns: Vec<String>,

        /// Resume an interrupted session by id
        #[arg(long, value_name = "SESSION")]
        resume: Option<String>,

        /// Restrict the crawl to a preview session's approved URLs
        #[arg(long, value_name = "PREVIEW")]
        from_preview: Option<String>,

        /// Output format for the final artifact
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,

        /// Directory output files are written into
        #[arg(long, default_value = "output")]
        output_dir: PathBuf,

        /// Split the output into chunks of at most this size (e.g. "10MB")
        #[arg(long, value_name = "SIZE")]
        chunk_size: Option<String>,

        /// Split the output into chunks of this many pages
        #[arg(long, value_name = "N")]
        chunk_pages: Option<usize>,

        /// Crawl and cache only; skip output generation
        #[arg(long)]
        no_export: bool,
    },

    /// Regenerate output from a cached session
    Export {
        /// Session id to export
        session: String,

        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,

        #[arg(long, default_value = "output")]
        output_dir: PathBuf,

        #[arg(long, value_name = "SIZE")]
        chunk_size: Option<String>,

        #[arg(long, value_name = "N")]
        chunk_pages: Option<usize>,
    },

    /// Manage the session cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// List cached sessions
    List,

    /// Show aggregate cache statistics
    Stats,

    /// Remove old sessions
    Clean {
        /// Remove sessions older than this many days
        #[arg(long, default_value_t = 30)]
        older_than_days: u32,

        /// Always keep this many most recent completed sessions
        #[arg(long, default_value_t = 10)]
        keep_completed: usize,

        /// Report what would be removed without removing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate sessions and optionally repair them
    Doctor {
        /// Remove corrupt page files, reconcile counts, fail stale sessions
        #[arg(long)]
        fix: bool,

        /// With --fix, report the repairs without applying them
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete one session
    Delete {
        session: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let config = match resolve_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let exit_code = match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            1
        }
    };

    std::process::exit(exit_code);
}

/// Sets up the tracing subscriber from verbosity flags and DEBUG_MODE
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("DEBUG_MODE").is_ok() {
        EnvFilter::new("sitebinder=debug,info")
    } else {
        match verbose {
            0 => EnvFilter::new("sitebinder=info,warn"),
            1 => EnvFilter::new("sitebinder=debug,info"),
            2 => EnvFilter::new("sitebinder=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Explicit config path, else ./sitebinder.toml if present, else defaults
fn resolve_config(path: Option<&Path>) -> Result<Config, sitebinder::ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => {
            let default_path = Path::new("sitebinder.toml");
            if default_path.exists() {
                load_config(default_path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

async fn run(command: Commands, config: Config) -> sitebinder::Result<i32> {
    match command {
        Commands::Crawl {
            url,
            exclude_patterns,
            resume,
            from_preview,
            format,
            output_dir,
            chunk_size,
            chunk_pages,
            no_export,
        } => {
            let cache = SessionCache::new(&config.cache);
            let preview = match from_preview {
                Some(id) => Some(
                    cache
                        .load_preview(&id)
                        .map_err(|_| sitebinder::SitebinderError::PreviewNotFound(id))?,
                ),
                None => None,
            };

            let options = CrawlOptions {
                exclude_patterns,
                preview,
                resume_session: resume,
            };

            let cancel = CancellationToken::new();
            spawn_ctrl_c_handler(cancel.clone());

            let report = crawl(config.clone(), &url, options, cancel).await?;
            print_report(&report);

            if !report.is_success() {
                return Ok(1);
            }

            if no_export {
                return Ok(0);
            }

            export_session(
                &config,
                &report.session_id,
                format,
                &output_dir,
                chunk_size,
                chunk_pages,
            )?;
            Ok(0)
        }

        Commands::Export {
            session,
            format,
            output_dir,
            chunk_size,
            chunk_pages,
        } => {
            export_session(&config, &session, format, &output_dir, chunk_size, chunk_pages)?;
            Ok(0)
        }

        Commands::Cache { command } => run_cache_command(command, &config),
    }
}

fn run_cache_command(command: CacheCommands, config: &Config) -> sitebinder::Result<i32> {
    let cache = SessionCache::new(&config.cache);

    match command {
        CacheCommands::List => {
            let sessions = cache.list_sessions();
            if sessions.is_empty() {
                println!("No cached sessions.");
                return Ok(0);
            }
            println!(
                "{:<44} {:<10} {:>6}  {:>9}  {}",
                "SESSION", "STATUS", "PAGES", "SIZE", "URL"
            );
            for session in sessions {
                println!(
                    "{:<44} {:<10} {:>6}  {:>9}  {}",
                    session.session_id,
                    session.status.to_string(),
                    session.pages_scraped,
                    format_size(session.cache_size),
                    session.base_url,
                );
            }
            Ok(0)
        }

        CacheCommands::Stats => {
            let stats = cache.stats();
            println!("Total sessions:     {}", stats.total_sessions);
            println!("  active:           {}", stats.active_sessions);
            println!("  completed:        {}", stats.completed_sessions);
            println!("  failed:           {}", stats.failed_sessions);
            println!("Total cache size:   {}", format_size(stats.total_bytes));
            println!("Cache directory:    {}", cache.root().display());
            Ok(0)
        }

        CacheCommands::Clean {
            older_than_days,
            keep_completed,
            dry_run,
        } => {
            let removed = cache
                .cleanup(older_than_days, keep_completed, dry_run)
                .map_err(sitebinder::SitebinderError::Cache)?;
            if removed.is_empty() {
                println!("Nothing to clean up.");
            } else if dry_run {
                println!("Would remove {} session(s):", removed.len());
                for id in removed {
                    println!("  {}", id);
                }
            } else {
                println!("Removed {} session(s).", removed.len());
            }
            Ok(0)
        }

        CacheCommands::Doctor { fix, dry_run } => {
            let report = doctor(&cache, fix, dry_run, config.cache.session_timeout_hours)
                .map_err(sitebinder::SitebinderError::Cache)?;

            if report.sessions.is_empty() {
                println!("No sessions to examine.");
                return Ok(0);
            }

            for session in &report.sessions {
                if session.is_healthy() {
                    println!(
                        "ok      {} ({} pages)",
                        session.session_id, session.readable_pages
                    );
                } else {
                    let marker = if session.partial { "partial" } else { "issues" };
                    println!("{} {}", marker, session.session_id);
                    for issue in &session.issues {
                        println!("        - {}", issue);
                    }
                }
            }

            if report.repaired {
                println!("Repairs applied.");
            } else if report.issue_count() > 0 && fix {
                println!("Dry run: no changes made.");
            }

            Ok(if report.is_healthy() || report.repaired { 0 } else { 1 })
        }

        CacheCommands::Delete { session } => {
            cache
                .delete_session(&session)
                .map_err(sitebinder::SitebinderError::Cache)?;
            println!("Deleted session {}.", session);
            Ok(0)
        }
    }
}

/// Generates output from a cached session
fn export_session(
    config: &Config,
    session_id: &str,
    format: OutputFormat,
    output_dir: &Path,
    chunk_size: Option<String>,
    chunk_pages: Option<usize>,
) -> sitebinder::Result<Vec<PathBuf>> {
    let cache = SessionCache::new(&config.cache);
    let loaded = cache
        .load_session(session_id)
        .map_err(sitebinder::SitebinderError::Cache)?;

    if loaded.corrupt_pages > 0 {
        tracing::warn!(
            "Session {} has {} unreadable page file(s); exporting the rest",
            session_id,
            loaded.corrupt_pages
        );
    }

    let records = presentable(loaded.records);
    if records.is_empty() {
        return Err(sitebinder::SitebinderError::Assemble(
            sitebinder::assemble::AssembleError::NoRecords,
        ));
    }

    let generator: Box<dyn Generator> = match format {
        OutputFormat::Markdown => Box::new(MarkdownGenerator),
        OutputFormat::Pdf => Box::new(PdfGenerator::new(CommandRenderer::default())),
    };

    let ctx = OutputContext {
        base_url: &loaded.metadata.base_url,
        config,
        output_dir,
    };

    // Size-based chunking wins when both bounds are given
    let partitioner: Option<Box<dyn Partitioner>> = if let Some(size) = &chunk_size {
        let max_bytes = parse_size(size)
            .map_err(|e| sitebinder::SitebinderError::Assemble(
                sitebinder::assemble::AssembleError::InvalidSize(e),
            ))?;
        Some(Box::new(SizePartitioner {
            max_bytes,
            overhead: generator.size_overhead(config),
        }) as Box<dyn Partitioner>)
    } else {
        chunk_pages.map(|pages| {
            Box::new(PagePartitioner {
                pages_per_chunk: pages,
            }) as Box<dyn Partitioner>
        })
    };

    let written = match partitioner {
        Some(partitioner) => {
            let prefix = ctx.default_stem();
            generate_chunked(generator.as_ref(), partitioner.as_ref(), &records, &ctx, &prefix)?
        }
        None => generator.generate(&records, &ctx)?,
    };

    for path in &written {
        println!("Wrote {}", path.display());
    }
    Ok(written)
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing current page and stopping");
            cancel.cancel();
        }
    });
}

fn print_report(report: &CrawlReport) {
    println!("Session:  {}", report.session_id);
    println!("Status:   {}", report.status);
    println!("Pages:    {}", report.pages_scraped);
    if let Some(reason) = &report.failure_reason {
        println!("Reason:   {}", reason);
    }
}

fn format_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} TB", value)
}
