//! logspan command-line interface.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use logspan::extract::Registry;
use logspan::{extract, Config, DataSource, FileSpan, IndexBuilder, Window};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "logspan", about = "Resolve log files by time interval")]
struct Cli {
    /// Path to the configuration file
    #[arg(short = 'c', long, global = true, default_value = "logspan.toml")]
    config: PathBuf,

    /// Enable verbose logging (debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print configured source names
    List,

    /// Print known extractor names and descriptions
    Listx,

    /// Resolve files overlapping a time window
    Query {
        /// Source names to query
        #[arg(required = true)]
        sources: Vec<String>,

        /// Window start (smart timestamp or @epoch)
        #[arg(long)]
        begin: Option<String>,

        /// Window end (smart timestamp or @epoch)
        #[arg(long)]
        end: Option<String>,

        /// Use the persisted index instead of fuzzy resolution
        #[arg(long)]
        index: bool,

        /// Print begin/end epochs alongside each path
        #[arg(long)]
        times: bool,

        /// Aggregate file sizes per calendar date
        #[arg(long, conflicts_with = "times")]
        bytes: bool,
    },

    /// Build or extend the persisted index
    Index {
        /// Source names to index
        #[arg(required = true)]
        sources: Vec<String>,

        /// Window start (smart timestamp or @epoch)
        #[arg(long)]
        begin: Option<String>,

        /// Window end (smart timestamp or @epoch)
        #[arg(long)]
        end: Option<String>,

        /// Worker pool size (default: CPU count)
        #[arg(long)]
        processes: Option<usize>,

        /// Drop rows for vanished files before indexing
        #[arg(long)]
        clean: bool,
    },
}

fn parse_window(begin: Option<&str>, end: Option<&str>) -> anyhow::Result<Window> {
    let parse = |text: &str| {
        extract::extract(text)
            .with_context(|| format!("unrecognized timestamp '{text}'"))
    };
    let begin = begin.map(parse).transpose()?;
    let end = end.map(parse).transpose()?;
    if let (Some(b), Some(e)) = (begin, end) {
        if b > e {
            bail!("window begin is after window end");
        }
    }
    Ok(Window::new(begin, end))
}

fn select<'a>(sources: &'a [DataSource], names: &[String]) -> anyhow::Result<Vec<&'a DataSource>> {
    names
        .iter()
        .map(|name| {
            sources
                .iter()
                .find(|s| &s.name == name)
                .ok_or_else(|| logspan::Error::SourceNotFound(name.clone()).into())
        })
        .collect()
}

fn print_paths(spans: &[FileSpan]) {
    for span in spans {
        println!("{}", span.path.display());
    }
}

fn print_times(spans: &[FileSpan]) {
    for span in spans {
        println!(
            "{}\t{}\t{}",
            span.path.display(),
            logspan::epoch::to_epoch(&span.begin),
            logspan::epoch::to_epoch(&span.end)
        );
    }
}

/// Aggregate file sizes per calendar date of each file's interval start,
/// filling zero for absent dates across the window.
fn print_bytes(spans: &[FileSpan], window: &Window) {
    let mut per_date: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for span in spans {
        let size = std::fs::metadata(&span.path).map(|m| m.len()).unwrap_or(0);
        *per_date.entry(span.begin.date_naive()).or_insert(0) += size;
    }
    let first = window
        .begin
        .map(|b| b.date_naive())
        .or_else(|| per_date.keys().next().copied());
    let last = window
        .end
        .map(|e| e.date_naive())
        .or_else(|| per_date.keys().next_back().copied());
    let (Some(first), Some(last)) = (first, last) else {
        return;
    };

    let mut date = first;
    while date <= last {
        println!("{}\t{}", date, per_date.get(&date).copied().unwrap_or(0));
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::List => {
            let sources = Config::load(&cli.config)?.sources()?;
            for source in &sources {
                println!("{}", source.name);
            }
        }
        Commands::Listx => {
            let registry = Registry::builtin();
            for (name, description) in registry.entries() {
                println!("{name}\t{description}");
            }
        }
        Commands::Query {
            sources: names,
            begin,
            end,
            index,
            times,
            bytes,
        } => {
            let sources = Config::load(&cli.config)?.sources()?;
            let window = parse_window(begin.as_deref(), end.as_deref())?;
            let mut spans = Vec::new();
            for source in select(&sources, &names)? {
                if index {
                    spans.extend(source.resolve_indexed(&window).await?);
                } else {
                    spans.extend(source.resolve_fuzzy(&window)?);
                }
            }
            if bytes {
                print_bytes(&spans, &window);
            } else if times {
                print_times(&spans);
            } else {
                print_paths(&spans);
            }
        }
        Commands::Index {
            sources: names,
            begin,
            end,
            processes,
            clean,
        } => {
            let sources = Config::load(&cli.config)?.sources()?;
            let window = parse_window(begin.as_deref(), end.as_deref())?;
            let builder = match processes {
                Some(n) => IndexBuilder::new(n),
                None => IndexBuilder::default(),
            };
            for source in select(&sources, &names)? {
                source.index(&window, &builder, clean).await?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
