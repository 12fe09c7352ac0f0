//! # CLI Module
//!
//! Command-line interface for the image library.
//!
//! ## Usage
//! ```bash
//! # Create the managed folder and index
//! imshelf init
//!
//! # Add images, tagged
//! imshelf add ~/Downloads/scan.png --tag receipts
//!
//! # Bring the index in line with the folder
//! imshelf refresh
//!
//! # Query
//! imshelf search --tag receipts --since 2024-01-01T00:00:00Z --output json
//! ```

use chrono::{DateTime, Utc};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use imshelf::config::LibraryConfig;
use imshelf::core::index::InfoMap;
use imshelf::core::ingest::{ImportReport, OutcomeKind};
use imshelf::core::refresh::{RefreshReport, RehashReport};
use imshelf::core::watcher::watch_library;
use imshelf::error::Result;
use imshelf::events::{
    Event, EventChannel, EventReceiver, IngestEvent, RefreshEvent, RehashEvent, WatcherEvent,
};
use imshelf::{AddRequest, FilenameMatch, Image, Library, Outcome, SearchQuery};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::thread::{self, JoinHandle};

/// imshelf - a personal image library without duplicates
#[derive(Parser, Debug)]
#[command(name = "imshelf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Managed image folder (overrides the config file)
    #[arg(long, global = true)]
    folder: Option<PathBuf>,

    /// Index database path (overrides the config file)
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the managed folder and index
    Init,

    /// Add image files to the library
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Tag to attach (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Path inside the library (single file only)
        #[arg(short, long)]
        name: Option<PathBuf>,

        /// Skip near-duplicate detection
        #[arg(long)]
        skip_hash: bool,

        /// Store the file as-is (no trimming or shrinking)
        #[arg(long)]
        raw: bool,
    },

    /// Add every image under a folder; source files are left in place
    Import {
        folder: PathBuf,

        /// Tag to attach (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Skip near-duplicate detection
        #[arg(long)]
        skip_hash: bool,

        /// Store files as-is (no trimming or shrinking)
        #[arg(long)]
        raw: bool,
    },

    /// Reconcile the index with the managed folder
    Refresh {
        /// Leave rejected duplicates and non-image files in place
        #[arg(long)]
        keep_unrecognized: bool,
    },

    /// Recompute perceptual fingerprints and drop near-duplicates
    Rehash {
        /// Clear every fingerprint first
        #[arg(long)]
        reset: bool,
    },

    /// Search indexed images, most recently modified first
    Search {
        /// Filename substring
        #[arg(short, long)]
        name: Option<String>,

        /// Tag substring (repeatable, all must match)
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// Info KEY=VALUE substring match (repeatable)
        #[arg(short, long = "info", value_parser = parse_key_value)]
        info: Vec<(String, String)>,

        /// Modified at or after (RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        since: Option<DateTime<Utc>>,

        /// Modified at or before (RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        until: Option<DateTime<Utc>>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Find files on disk by case-insensitive regex over their library path
    Find {
        pattern: String,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
    },

    /// Add or remove tags
    Tag {
        path: PathBuf,

        #[arg(short, long)]
        add: Vec<String>,

        #[arg(short, long)]
        remove: Vec<String>,
    },

    /// Set or unset info values
    Info {
        path: PathBuf,

        /// KEY=VALUE; numbers, booleans and null are stored typed
        #[arg(short, long, value_parser = parse_key_value)]
        set: Vec<(String, String)>,

        #[arg(short, long)]
        unset: Vec<String>,
    },

    /// Move an image inside the library
    Mv { path: PathBuf, new_path: PathBuf },

    /// Delete an image record and move its file to the trash
    Rm { path: PathBuf },

    /// Print every record as JSON
    Export,

    /// Refresh whenever images in the folder change
    Watch,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
    /// Minimal output (paths only)
    Minimal,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{}`", raw)),
    }
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

/// Typed scalar when the text is a JSON number, boolean or null
fn info_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => value,
        _ => Value::String(raw.to_string()),
    }
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    imshelf::init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => LibraryConfig::load(path)?,
        None => LibraryConfig::default(),
    };
    if let Some(folder) = cli.folder {
        config.folder = folder;
    }
    if let Some(index) = cli.index {
        config.index_path = index;
    }

    let term = Term::stderr();

    if let Commands::Init = cli.command {
        let library = Library::open_creating(config)?;
        term.write_line(&format!(
            "{} Library ready at {}",
            style("✓").green().bold(),
            style(library.store().root().display()).cyan()
        ))
        .ok();
        return Ok(());
    }

    let library = Library::open(config)?;

    match cli.command {
        Commands::Init => Ok(()),
        Commands::Add {
            files,
            tags,
            name,
            skip_hash,
            raw,
        } => run_add(&term, &library, files, tags, name, skip_hash, raw),
        Commands::Import {
            folder,
            tags,
            skip_hash,
            raw,
        } => run_import(&term, &library, folder, tags, skip_hash, raw),
        Commands::Refresh { keep_unrecognized } => {
            let remove = library.config().remove_unrecognized && !keep_unrecognized;
            run_refresh(&term, &library, remove)?;
            if library.config().watch_folder {
                run_watch(&term, &library)?;
            }
            Ok(())
        }
        Commands::Rehash { reset } => run_rehash(&term, &library, reset),
        Commands::Search {
            name,
            tags,
            info,
            since,
            until,
            limit,
            output,
        } => {
            let mut query = SearchQuery::new();
            if let Some(name) = name {
                query = query.filename(name);
            }
            for tag in tags {
                query = query.tag(tag);
            }
            for (key, value) in info {
                query = query.info(key, value);
            }
            if let Some(since) = since {
                query = query.since(since);
            }
            if let Some(until) = until {
                query = query.until(until);
            }
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            print_images(&library.search(&query)?, output);
            Ok(())
        }
        Commands::Find { pattern, output } => {
            print_matches(&library.search_filename(&pattern)?, output);
            Ok(())
        }
        Commands::Tag { path, add, remove } => {
            let image = library.require(&path)?;
            let image = library.add_tags(&image, &add)?;
            let image = library.remove_tags(&image, &remove)?;
            print_images(&[image], OutputFormat::Pretty);
            Ok(())
        }
        Commands::Info { path, set, unset } => {
            let image = library.require(&path)?;
            let values: InfoMap = set
                .into_iter()
                .map(|(key, raw)| (key, info_value(&raw)))
                .collect();
            let image = library.add_info(&image, &values)?;
            let image = library.remove_info(&image, &unset)?;
            print_json(&image.to_export());
            Ok(())
        }
        Commands::Mv { path, new_path } => {
            let image = library.require(&path)?;
            let moved = library.move_image(&image, &new_path)?;
            term.write_line(&format!(
                "{} {} → {}",
                style("✓").green().bold(),
                image.path,
                style(&moved.path).cyan()
            ))
            .ok();
            Ok(())
        }
        Commands::Rm { path } => {
            let image = library.require(&path)?;
            library.delete_image(&image)?;
            term.write_line(&format!(
                "{} Moved {} to the trash",
                style("✓").green().bold(),
                image.path
            ))
            .ok();
            Ok(())
        }
        Commands::Export => {
            print_json(&library.export()?);
            Ok(())
        }
        Commands::Watch => {
            run_refresh(&term, &library, library.config().remove_unrecognized)?;
            run_watch(&term, &library)
        }
    }
}

fn run_add(
    term: &Term,
    library: &Library,
    files: Vec<PathBuf>,
    tags: Vec<String>,
    name: Option<PathBuf>,
    skip_hash: bool,
    raw: bool,
) -> Result<()> {
    if name.is_some() && files.len() > 1 {
        Cli::command()
            .error(
                clap::error::ErrorKind::ArgumentConflict,
                "--name can only be used with a single file",
            )
            .exit();
    }

    for file in files {
        let mut request = AddRequest::from_path(&file)
            .tags(tags.iter().cloned())
            .skip_hash(skip_hash || library.config().skip_hash)
            .normalize(!raw)
            .trash_rejected(false);
        if let Some(name) = &name {
            request = request.filename(name);
        }

        let outcome = library.add(request)?;
        let line = match &outcome {
            Outcome::Created(image) => format!(
                "{} {} → {}",
                style("✓").green().bold(),
                file.display(),
                style(&image.path).cyan()
            ),
            Outcome::Reused(image) => format!(
                "{} {} already stored as {}",
                style("=").dim(),
                file.display(),
                style(&image.path).cyan()
            ),
            Outcome::Conflict { existing } => format!(
                "{} {} duplicates {}",
                style("⚠").yellow().bold(),
                file.display(),
                style(&existing.path).yellow()
            ),
            Outcome::Error(e) => format!("{} {}", style("✗").red().bold(), e),
        };
        term.write_line(&line).ok();
    }
    Ok(())
}

fn run_import(
    term: &Term,
    library: &Library,
    folder: PathBuf,
    tags: Vec<String>,
    skip_hash: bool,
    raw: bool,
) -> Result<()> {
    let (sender, receiver) = EventChannel::new();
    let progress = progress_bar();
    let renderer = render_events(receiver, progress.clone());

    let result = library.import_folder_with_events(
        &folder,
        &tags,
        skip_hash || library.config().skip_hash,
        !raw,
        &sender,
    );

    drop(sender);
    renderer.join().ok();
    progress.finish_and_clear();

    print_import_report(term, &result?);
    Ok(())
}

fn run_refresh(term: &Term, library: &Library, remove_unrecognized: bool) -> Result<()> {
    let (sender, receiver) = EventChannel::new();
    let progress = progress_bar();
    let renderer = render_events(receiver, progress.clone());

    let result = library.refresh_with_events(remove_unrecognized, &sender);

    drop(sender);
    renderer.join().ok();
    progress.finish_and_clear();

    print_refresh_report(term, &result?);
    Ok(())
}

fn run_rehash(term: &Term, library: &Library, reset: bool) -> Result<()> {
    let (sender, receiver) = EventChannel::new();
    let progress = progress_bar();
    let renderer = render_events(receiver, progress.clone());

    let result = library.calculate_hash_with_events(reset, &sender);

    drop(sender);
    renderer.join().ok();
    progress.finish_and_clear();

    print_rehash_report(term, &result?);
    Ok(())
}

/// Runs until the process is interrupted
fn run_watch(term: &Term, library: &Library) -> Result<()> {
    let (sender, receiver) = EventChannel::new();
    let watch_term = term.clone();

    let renderer = thread::spawn(move || {
        for event in receiver.iter() {
            let line = match event {
                Event::Watcher(WatcherEvent::Started { path }) => format!(
                    "{} Watching {} (Ctrl-C to stop)",
                    style("👀").cyan(),
                    style(path.display()).cyan()
                ),
                Event::Watcher(WatcherEvent::Changed { paths }) => format!(
                    "{} {} image(s) changed, refreshing",
                    style("↻").cyan(),
                    paths.len()
                ),
                Event::Watcher(WatcherEvent::Error { message }) => {
                    format!("{} {}", style("✗").red().bold(), message)
                }
                Event::Watcher(WatcherEvent::Stopped { .. }) => {
                    format!("{} Stopped watching", style("■").dim())
                }
                Event::Refresh(RefreshEvent::Completed { report }) => format!(
                    "  {} new, {} updated, {} removed, {} duplicates",
                    style(report.discovered).cyan(),
                    style(report.updated).cyan(),
                    style(report.pruned).cyan(),
                    style(report.conflicts).yellow()
                ),
                _ => continue,
            };
            watch_term.write_line(&line).ok();
        }
    });

    let shutdown = AtomicBool::new(false);
    let result = watch_library(library, &sender, &shutdown);

    drop(sender);
    renderer.join().ok();
    result
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .map(|s| s.progress_chars("█▓░"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Drive a progress bar from batch events until every sender is dropped
fn render_events(receiver: EventReceiver, pb: ProgressBar) -> JoinHandle<()> {
    thread::spawn(move || {
        for event in receiver.iter() {
            match event {
                Event::Ingest(IngestEvent::Started { total })
                | Event::Rehash(RehashEvent::Started { total }) => {
                    pb.set_length(total as u64);
                    pb.set_position(0);
                }
                Event::Refresh(RefreshEvent::PhaseChanged { phase, total }) => {
                    pb.set_length(total as u64);
                    pb.set_position(0);
                    pb.set_message(phase.to_string());
                }
                Event::Ingest(IngestEvent::Progress(p))
                | Event::Refresh(RefreshEvent::Progress(p))
                | Event::Rehash(RehashEvent::Progress(p)) => {
                    pb.set_position(p.completed as u64);
                }
                Event::Ingest(IngestEvent::Outcome { path, kind }) => {
                    if kind != OutcomeKind::Created {
                        pb.println(format!("  {} {}", style(kind).dim(), path.display()));
                    }
                }
                Event::Rehash(RehashEvent::Completed { .. }) => {
                    pb.set_message("Refreshing");
                }
                _ => {}
            }
        }
    })
}

fn print_import_report(term: &Term, report: &ImportReport) {
    term.write_line(&format!("{} Import Complete", style("✓").green().bold()))
        .ok();
    term.write_line(&format!("  {} added", style(report.created).cyan()))
        .ok();
    term.write_line(&format!("  {} already stored", style(report.reused).cyan()))
        .ok();
    term.write_line(&format!("  {} duplicates", style(report.conflicts).yellow()))
        .ok();
    if report.errors > 0 {
        term.write_line(&format!("  {} failed", style(report.errors).red()))
            .ok();
        for (path, reason) in &report.failed {
            term.write_line(&format!("    {} {}", style(path.display()).dim(), reason))
                .ok();
        }
    }
}

fn print_refresh_report(term: &Term, report: &RefreshReport) {
    term.write_line(&format!("{} Refresh Complete", style("✓").green().bold()))
        .ok();
    term.write_line(&format!("  {} records checked", style(report.checked).cyan()))
        .ok();
    term.write_line(&format!("  {} removed (file gone)", style(report.pruned).cyan()))
        .ok();
    term.write_line(&format!(
        "  {} updated, {} superseded",
        style(report.updated).cyan(),
        style(report.superseded).cyan()
    ))
    .ok();
    term.write_line(&format!("  {} new files added", style(report.discovered).cyan()))
        .ok();
    term.write_line(&format!("  {} duplicates", style(report.conflicts).yellow()))
        .ok();
    if report.swept > 0 {
        term.write_line(&format!(
            "  {} non-image files moved to the trash",
            style(report.swept).yellow()
        ))
        .ok();
    }
    if report.errors > 0 {
        term.write_line(&format!("  {} errors (see log)", style(report.errors).red()))
            .ok();
    }
}

fn print_rehash_report(term: &Term, report: &RehashReport) {
    term.write_line(&format!("{} Rehash Complete", style("✓").green().bold()))
        .ok();
    if report.cleared > 0 {
        term.write_line(&format!("  {} fingerprints cleared", style(report.cleared).dim()))
            .ok();
    }
    term.write_line(&format!("  {} fingerprints computed", style(report.hashed).cyan()))
        .ok();
    term.write_line(&format!(
        "  {} near-duplicates removed",
        style(report.duplicates).yellow()
    ))
    .ok();
    term.write_line(&format!(
        "  {} records dropped ({} missing, {} unreadable)",
        style(report.pruned + report.unreadable).cyan(),
        report.pruned,
        report.unreadable
    ))
    .ok();
    term.write_line("").ok();
    print_refresh_report(term, &report.refresh);
}

fn print_images(images: &[Image], output: OutputFormat) {
    match output {
        OutputFormat::Json => print_json(&images),
        OutputFormat::Minimal => {
            for image in images {
                println!("{}", image.path);
            }
        }
        OutputFormat::Pretty => {
            if images.is_empty() {
                println!("{}", style("No images found").dim());
            }
            for image in images {
                let tags = image.tags.iter().cloned().collect::<Vec<_>>().join(", ");
                println!(
                    "{}  {}  {}",
                    style(&image.path).cyan(),
                    style(image.modified.format("%Y-%m-%d %H:%M")).dim(),
                    style(tags).yellow()
                );
            }
        }
    }
}

fn print_matches(matches: &[FilenameMatch], output: OutputFormat) {
    match output {
        OutputFormat::Json => print_json(&matches),
        OutputFormat::Minimal => {
            for m in matches {
                match m {
                    FilenameMatch::Indexed(image) => println!("{}", image.path),
                    FilenameMatch::Unindexed(path) => println!("{}", path.display()),
                }
            }
        }
        OutputFormat::Pretty => {
            for m in matches {
                match m {
                    FilenameMatch::Indexed(image) => {
                        println!("{} {}", style("●").green(), style(&image.path).cyan())
                    }
                    FilenameMatch::Unindexed(path) => println!(
                        "{} {} {}",
                        style("○").dim(),
                        path.display(),
                        style("(not indexed, run refresh)").dim()
                    ),
                }
            }
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("{} {}", style("✗").red().bold(), e),
    }
}
