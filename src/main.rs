mod classifier;
mod config;
mod models;
mod session;
mod source;
mod store;
mod table;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use classifier::Classifier;
use config::Config;
use session::RunSession;
use source::ReplaySource;
use std::path::PathBuf;
use tracing::{debug, trace};

#[derive(Parser)]
#[command(name = "jobsift")]
#[command(about = "Filter scraped LinkedIn postings by keyword and keep a running spreadsheet")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init,

    /// Classify scraped postings and merge accepted ones into the spreadsheet
    Run {
        /// JSON Lines file of postings exported by the scraper
        #[arg(short, long)]
        input: PathBuf,

        /// Spreadsheet to write (defaults to the configured, dated file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Classify and report without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Check a description against the keyword lists
    Classify {
        /// Description text
        text: Option<String>,

        /// Read the description from a file instead
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },

    /// List rows in the spreadsheet
    List {
        /// Spreadsheet to read (defaults to today's file)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Only rows not yet applied to
        #[arg(short, long)]
        pending: bool,
    },

    /// Show one row in full
    Show {
        /// Row number as printed by `list`
        row: usize,

        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Mark a row as applied
    Mark {
        /// Row number as printed by `list`
        row: usize,

        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Clear the mark instead
        #[arg(long)]
        undo: bool,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 2)
        .init();

    debug!("jobsift started with verbosity level: {}", verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config;
    let load_config = || Config::load(config_path.as_deref());

    match cli.command {
        Commands::Init => {
            let path = init_config(config_path.clone())?;
            println!("Config written to {}", path.display());
        }

        Commands::Run {
            input,
            output,
            dry_run,
        } => {
            let config = load_config()?;
            let classifier = Classifier::from_config(&config.keywords)?;
            let output = output.unwrap_or_else(|| config.output.today_path());

            let summary = RunSession::new(classifier, &output)
                .with_policy(config.output.merge)
                .dry_run(dry_run)
                .run(&ReplaySource::new(input), &config.queries, &config.scraper)?;

            println!("\nResults:");
            println!("  Accepted: {}", summary.accepted);
            println!("  Rejected: {}", summary.rejected);
            if summary.errors > 0 {
                println!("  Errors:   {}", summary.errors);
            }
            match &summary.flush {
                Some(stats) => {
                    println!("  Written:  {} rows to {}", stats.written_rows, output.display());
                    if stats.applied_overwritten > 0 {
                        println!(
                            "  Warning:  {} applied mark(s) replaced by re-scraped postings",
                            stats.applied_overwritten
                        );
                    }
                }
                None => println!("\n(Dry run - nothing was written)"),
            }
        }

        Commands::Classify { text, file } => {
            let description = match (text, file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => return Err(anyhow!("Provide description text or --file")),
            };

            let config = load_config()?;
            let result = Classifier::from_config(&config.keywords)?.classify(&description);
            println!("Accepted:   {}", if result.accepted { "yes" } else { "no" });
            println!("Stack:      {}", display_list(&result.matched));
            println!("Excluded:   {}", display_list(&result.excluded));
            match result.experience_years {
                Some(years) => println!("Experience: {} years", years),
                None => println!("Experience: -"),
            }
        }

        Commands::List { file, pending } => {
            let config = load_config()?;
            let path = file.unwrap_or_else(|| config.output.today_path());
            let rows = store::load(&path)?.unwrap_or_default();

            let rows: Vec<_> = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| !pending || !row.applied)
                .collect();

            if rows.is_empty() {
                println!("No jobs found in {}.", path.display());
            } else {
                println!(
                    "{:<5} {:<3} {:<30} {:<20} {:<18} {:>4} {:<20}",
                    "ROW", "APP", "TITLE", "COMPANY", "PLACE", "EXP", "STACK"
                );
                println!("{}", "-".repeat(104));
                for (idx, row) in rows {
                    println!(
                        "{:<5} {:<3} {:<30} {:<20} {:<18} {:>4} {:<20}",
                        idx + 1,
                        if row.applied { "+" } else { " " },
                        truncate(&row.title, 28),
                        truncate(&row.company, 18),
                        truncate(&row.place, 16),
                        row.experience_years
                            .map(|y| y.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        truncate(&row.stack_display(), 20)
                    );
                }
            }
        }

        Commands::Show { row, file } => {
            let config = load_config()?;
            let path = file.unwrap_or_else(|| config.output.today_path());
            let rows = store::load(&path)?
                .ok_or_else(|| anyhow!("No job table at {}", path.display()))?;
            let job = row
                .checked_sub(1)
                .and_then(|idx| rows.get(idx))
                .ok_or_else(|| anyhow!("Row {} not found.", row))?;

            println!("Row {}", row);
            println!("Title: {}", job.title);
            println!("Company: {}", job.company);
            println!("Place: {}", job.place);
            println!("Date: {}", job.posted_date);
            println!("Link: {}", job.link);
            if let Some(years) = job.experience_years {
                println!("Experience: {} years", years);
            }
            println!("Stack: {}", job.stack_display());
            println!("Applied: {}", if job.applied { "yes" } else { "no" });
            println!("\n--- Description ---");
            for line in textwrap::fill(&job.description, 80).lines() {
                println!("{}", line);
            }
        }

        Commands::Mark { row, file, undo } => {
            let config = load_config()?;
            let path = file.unwrap_or_else(|| config.output.today_path());
            let idx = row
                .checked_sub(1)
                .ok_or_else(|| anyhow!("Rows are numbered from 1"))?;
            let job = store::mark_applied(&path, idx, !undo)?;
            if undo {
                println!("Cleared applied mark on '{}' at {}.", job.title, job.company);
            } else {
                println!("Marked '{}' at {} as applied.", job.title, job.company);
            }
        }
    }

    Ok(())
}

fn init_config(path: Option<PathBuf>) -> Result<PathBuf> {
    let path = match path {
        Some(path) => path,
        None => Config::default_path()?,
    };
    Config::write_default(&path)?;
    Ok(path)
}

fn display_list(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Software Developer", 10), "Softwar...");
        assert_eq!(truncate("Développeur Python", 8), "Dével...");
    }

    #[test]
    fn test_display_list_placeholder() {
        assert_eq!(display_list(&[]), "-");
        assert_eq!(
            display_list(&["python".to_string(), "react".to_string()]),
            "python, react"
        );
    }

    #[test]
    fn test_cli_parses_run_and_mark() {
        let cli = Cli::try_parse_from(["jobsift", "-v", "run", "--input", "p.jsonl", "--dry-run"])
            .unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Commands::Run { dry_run: true, .. }));

        let cli = Cli::try_parse_from(["jobsift", "mark", "3", "--undo"]).unwrap();
        assert!(matches!(cli.command, Commands::Mark { row: 3, undo: true, .. }));
    }

    #[test]
    fn test_init_writes_config_without_loading_one() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let cli = Cli::try_parse_from(["jobsift", "--config", path.to_str().unwrap(), "init"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Init));

        let written = init_config(cli.config).unwrap();
        assert_eq!(written, path);
        assert_eq!(Config::load(Some(&path)).unwrap(), Config::default());
        assert!(init_config(Some(path)).is_err());
    }

    #[test]
    fn test_cli_classify_text_conflicts_with_file() {
        let result = Cli::try_parse_from(["jobsift", "classify", "python", "--file", "d.txt"]);
        assert!(result.is_err());
    }
}
