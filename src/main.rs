use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use csvdex::error::{ErrorKind, IndexError};
use csvdex::index::compact::compact_index;
use csvdex::index::stats::collect_stats;
use csvdex::index::{IndexSummary, Indexer, OpenMode};
use csvdex::ingest::SourceOptions;
use csvdex::output;
use csvdex::query::find;
use csvdex::utils::AppConfig;
use std::io::{self, IsTerminal, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

const USAGE_NOTES: &str = "\
Usage forms:
  csvdex create <INPUT> <OUTPUT>
  csvdex append <INPUT> <OUTPUT>
  csvdex update <INPUT> <OUTPUT>
  csvdex drop <OUTPUT>
  csvdex find <all|N> [return] <FIELDS> [from] <INDEX> [where] <QUERY>

The input file must have a header row with a column named 'id'.
Example:
  csvdex find 10 return \"id,name\" from people.idx where \"city:paris AND NOT name:bob\"";

#[derive(Parser)]
#[command(name = "csvdex", version)]
#[command(about = "Index CSV files and query them back out as CSV")]
#[command(after_help = USAGE_NOTES)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Input field delimiter (overrides the config file)
    #[arg(short, long, global = true)]
    delimiter: Option<char>,

    /// Suppress progress and timing output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an index from a CSV file, replacing any existing index
    Create {
        /// CSV file to index
        input: PathBuf,
        /// Index directory
        output: PathBuf,
    },
    /// Add the rows of a CSV file to an existing index
    Append {
        /// CSV file to index
        input: PathBuf,
        /// Index directory
        output: PathBuf,
    },
    /// Insert or replace rows by id, creating the index if needed
    Update {
        /// CSV file to index
        input: PathBuf,
        /// Index directory
        output: PathBuf,
    },
    /// Remove an index
    Drop {
        /// Index directory
        output: PathBuf,
    },
    /// Query an index and print the requested fields as CSV
    Find {
        /// <all|N> [return] <FIELDS> [from] <INDEX> [where] <QUERY>
        #[arg(
            required = true,
            num_args = 4..=7,
            allow_hyphen_values = true,
            trailing_var_arg = true,
            value_name = "ARGS"
        )]
        args: Vec<String>,
    },
    /// Show index statistics
    Stats {
        /// Index directory
        index: PathBuf,
    },
    /// Merge segments and purge replaced documents
    Compact {
        /// Index directory
        index: PathBuf,
    },
}

/// Arguments of `find` once the optional keywords are stripped
#[derive(Debug, PartialEq, Eq)]
struct FindArgs {
    limit: Option<NonZeroUsize>,
    fields: Vec<String>,
    index: PathBuf,
    query: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let (code, message) = match err.downcast_ref::<IndexError>() {
                Some(e) if e.kind() == ErrorKind::EmptyResult => (1, e.to_string()),
                Some(e) => (2, e.to_string()),
                None => (2, format!("{err:#}")),
            };
            tracing::debug!(error = ?err, "command failed");
            let _ = output::print_error(&message, io::stderr().is_terminal());
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load()?;
    let delimiter = match cli.delimiter {
        Some(delimiter) => AppConfig {
            delimiter,
            ..config.clone()
        }
        .delimiter_byte()?,
        None => config.delimiter_byte()?,
    };
    let show_progress = config.progress && !cli.quiet && io::stderr().is_terminal();

    let indexer = Indexer::new(config.index_config())
        .with_source_options(SourceOptions { delimiter })
        .with_progress(show_progress);

    match cli.command {
        Commands::Create { input, output } => {
            timed(cli.quiet, &format!("Creating index {} from {}", output.display(), input.display()), || {
                indexer.insert(&input, &output, OpenMode::Create)
            })?;
        }
        Commands::Append { input, output } => {
            timed(cli.quiet, &format!("Appending index {} with {}", output.display(), input.display()), || {
                indexer.insert(&input, &output, OpenMode::Append)
            })?;
        }
        Commands::Update { input, output } => {
            timed(cli.quiet, &format!("Updating index {} with {}", output.display(), input.display()), || {
                indexer.update(&input, &output)
            })?;
        }
        Commands::Drop { output } => {
            timed(cli.quiet, &format!("Dropping index {}", output.display()), || {
                indexer.drop_index(&output).map(|()| IndexSummary::default())
            })?;
        }
        Commands::Find { args } => {
            let args = parse_find_args(&args)?;
            let result = find(&args.index, &args.fields, &args.query, args.limit)?;
            output::print_result_set(&result)?;
        }
        Commands::Stats { index } => {
            let stats = collect_stats(&index)?;
            output::print_stats(&mut io::stdout().lock(), &stats)?;
        }
        Commands::Compact { index } => {
            let summary = compact_index(&index, &config.index_config())?;
            if !cli.quiet {
                output::print_compact_summary(&mut io::stdout().lock(), &summary)?;
            }
        }
    }

    Ok(())
}

/// Run an indexing command between "<label> ..." and "Finished in X seconds." lines
fn timed<F>(quiet: bool, label: &str, op: F) -> Result<()>
where
    F: FnOnce() -> csvdex::error::Result<IndexSummary>,
{
    let start = Instant::now();
    if !quiet {
        print!("{label} ... ");
        io::stdout().flush()?;
    }

    let summary = match op() {
        Ok(summary) => summary,
        Err(e) => {
            if !quiet {
                println!();
            }
            return Err(e.into());
        }
    };

    if !quiet {
        println!("Finished in {:.2} seconds.", start.elapsed().as_secs_f64());
        if summary.rows > 0 {
            println!(
                "{} rows read, {} documents added, {} replaced.",
                summary.rows, summary.added, summary.replaced
            );
        }
    }
    Ok(())
}

/// Split `<all|N> [return] <FIELDS> [from] <INDEX> [where] <QUERY>`
fn parse_find_args(args: &[String]) -> Result<FindArgs> {
    let Some((limit, rest)) = args.split_first() else {
        bail!("find needs a limit, a field list, an index, and a query");
    };
    let limit = parse_limit(limit)?;

    let mut rest = rest;
    let mut slots = Vec::with_capacity(3);
    for (keyword, remaining) in [("return", 3), ("from", 2), ("where", 1)] {
        let Some((first, tail)) = rest.split_first() else {
            bail!("find needs a limit, a field list, an index, and a query");
        };
        // A keyword is only skipped when enough values remain after it
        let (value, tail) = if first.eq_ignore_ascii_case(keyword) && tail.len() >= remaining {
            match tail.split_first() {
                Some((value, tail)) => (value, tail),
                None => bail!("missing value after '{keyword}'"),
            }
        } else {
            (first, tail)
        };
        slots.push(value.clone());
        rest = tail;
    }

    if !rest.is_empty() {
        bail!("unexpected argument '{}'", rest[0]);
    }

    let [fields, index, query]: [String; 3] = match slots.try_into() {
        Ok(slots) => slots,
        Err(_) => bail!("find needs a limit, a field list, an index, and a query"),
    };

    Ok(FindArgs {
        limit,
        fields: parse_fields(&fields)?,
        index: PathBuf::from(index),
        query,
    })
}

fn parse_limit(value: &str) -> Result<Option<NonZeroUsize>> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    match value.parse::<NonZeroUsize>() {
        Ok(n) => Ok(Some(n)),
        Err(_) => bail!("invalid limit '{value}': expected 'all' or a positive integer"),
    }
}

fn parse_fields(value: &str) -> Result<Vec<String>> {
    let fields: Vec<String> = value.split(',').map(|f| f.trim().to_string()).collect();
    if fields.iter().any(String::is_empty) {
        bail!("invalid field list '{value}': field names must not be empty");
    }
    Ok(fields)
}
