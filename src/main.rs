//! sizetree - find the biggest files under a folder.
//!
//! Usage:
//!   sizetree [PATH]                 Scan and list files by size
//!   sizetree scan [PATH]            Same, explicitly
//!   sizetree delete PATH...         Delete files or folders
//!   sizetree --help                 Show help

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tracing::debug;

use sizetree_core::{FileRecord, Settings, SortKey, SortMode, TreeEntry, format_size};
use sizetree_ops::{DeleteOptions, delete_paths};
use sizetree_scan::{FsStat, ScanConfig, ScanOrchestrator, ScanOutcome, WalkSearch};

#[derive(Parser)]
#[command(
    name = "sizetree",
    version,
    about = "Find the biggest files under a folder",
    long_about = "sizetree stats every file under a folder on a pool of workers and \
                  lists them by size, optionally grouped by extension.\n\n\
                  Exclusions come from ~/.config/sizetree/settings.toml and --exclude.",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(flatten)]
    scan: ScanArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a folder and list its files by size
    Scan(ScanArgs),

    /// Delete files or folders
    Delete {
        /// Paths to delete
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Move to the system trash instead of deleting
        #[arg(short, long)]
        trash: bool,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Folder to scan (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Sort key; names sort ascending, sizes descending unless overridden
    #[arg(short, long)]
    sort: Option<SortArg>,

    /// Sort ascending
    #[arg(long, conflicts_with = "desc")]
    asc: bool,

    /// Sort descending
    #[arg(long)]
    desc: bool,

    /// Group files by extension
    #[arg(short, long, conflicts_with = "flat")]
    group: bool,

    /// List files without grouping
    #[arg(long)]
    flat: bool,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Number of worker units (0 = auto)
    #[arg(short, long, default_value = "0")]
    workers: usize,

    /// Stop searching after this many files
    #[arg(long, default_value = "100000")]
    max_results: usize,

    /// Extra glob to exclude (repeatable)
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Number of entries to print (0 = all)
    #[arg(short = 'n', long, default_value = "50")]
    top: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Size,
    Name,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Size => SortKey::Size,
            SortArg::Name => SortKey::Name,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Logs go to stderr so they never mix with listings.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Scan(args)) => run_scan(args).await,
        Some(Command::Delete { paths, trash, yes }) => run_delete(paths, trash, yes).await,
        None => run_scan(cli.scan).await,
    }
}

/// Scan once and print the results.
async fn run_scan(args: ScanArgs) -> Result<()> {
    let root = args.path.canonicalize().context("Invalid path")?;
    let settings = Settings::load();
    debug!(config = ?Settings::config_path(), "settings loaded");

    let mut exclude = settings.exclude_patterns();
    exclude.extend(args.exclude.iter().cloned());

    let config = ScanConfig::builder()
        .root(&root)
        .exclude_patterns(exclude)
        .workers(args.workers)
        .max_results(args.max_results)
        .build()
        .context("Invalid scan options")?;

    let orchestrator = ScanOrchestrator::new(config, Arc::new(WalkSearch), Arc::new(FsStat))
        .context("Failed to start workers")?;

    let mode = sort_mode(&args, settings.view.sort);
    orchestrator.sort(mode);

    let grouped = if args.group {
        true
    } else if args.flat {
        false
    } else {
        settings.view.group
    };
    orchestrator.set_grouped(grouped);

    if !args.json {
        eprintln!("Scanning {}...", root.display());
    }

    match orchestrator.refresh().await {
        ScanOutcome::Completed { .. } => {}
        ScanOutcome::Failed { message } => bail!("Scan failed: {message}"),
        ScanOutcome::Cancelled | ScanOutcome::Skipped => bail!("Scan did not complete"),
    }

    let files = orchestrator.files();
    let tree = orchestrator.tree();
    orchestrator.shutdown()?;

    if args.json {
        let json = if grouped {
            serde_json::to_string_pretty(&tree)?
        } else {
            serde_json::to_string_pretty(&files)?
        };
        println!("{json}");
        return Ok(());
    }

    print_summary(&root, &files, mode);
    print_entries(&root, &tree, args.top);
    Ok(())
}

/// Sort mode from the flags, falling back to the configured one.
fn sort_mode(args: &ScanArgs, configured: SortMode) -> SortMode {
    let base = args
        .sort
        .map(|key| SortMode::for_key(key.into()))
        .unwrap_or(configured);

    match (args.asc, args.desc) {
        (true, _) => SortMode::new(base.key(), true),
        (_, true) => SortMode::new(base.key(), false),
        _ => base,
    }
}

fn print_summary(root: &Path, files: &[FileRecord], mode: SortMode) {
    let total: u64 = files.iter().map(|f| f.size).sum();

    println!();
    println!("{}", "─".repeat(70));
    println!(" {} - {}", root.display(), format_size(total));
    let direction = if mode.is_ascending() { "ascending" } else { "descending" };
    println!(" {} files, sorted by {} {}", files.len(), mode.key(), direction);
    println!("{}", "─".repeat(70));
    println!();
}

fn print_entries(root: &Path, entries: &[TreeEntry], top: usize) {
    let limit = if top == 0 { usize::MAX } else { top };

    for entry in entries.iter().take(limit) {
        match entry {
            TreeEntry::Group(group) => {
                println!(
                    " ▼ {:<30} {:>10} {:>5.1}%  {} files",
                    group.label(),
                    group.human_readable_size(),
                    group.percent,
                    group.count()
                );
                for file in group.files.iter().take(limit) {
                    print_file(root, file, "     ");
                }
                if group.files.len() > limit {
                    println!("     ... and {} more", group.files.len() - limit);
                }
            }
            TreeEntry::File(file) => print_file(root, file, "   "),
        }
    }

    if entries.len() > limit {
        println!("   ... and {} more", entries.len() - limit);
    }
}

fn print_file(root: &Path, file: &FileRecord, indent: &str) {
    let relative = file.path.strip_prefix(root).unwrap_or(&file.path);
    println!(
        "{}{:>10}  {}",
        indent,
        file.human_readable_size,
        relative.display()
    );
}

/// Delete paths after confirmation and print the report.
async fn run_delete(paths: Vec<PathBuf>, trash: bool, yes: bool) -> Result<()> {
    if !yes && !confirm(&paths, trash)? {
        eprintln!("Aborted");
        return Ok(());
    }

    let options = if trash {
        DeleteOptions::with_trash()
    } else {
        DeleteOptions::default()
    };
    let report = delete_paths(paths, options).await;

    for error in &report.errors {
        eprintln!("  {error}");
    }
    println!("{}", report.summary());

    if !report.is_success() {
        bail!("{} item(s) could not be deleted", report.failed);
    }
    Ok(())
}

fn confirm(paths: &[PathBuf], trash: bool) -> Result<bool> {
    let action = if trash { "Move to trash" } else { "Permanently delete" };
    for path in paths {
        eprintln!("  {}", path.display());
    }
    eprint!("{} {} item(s)? [y/N] ", action, paths.len());
    std::io::stderr().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
