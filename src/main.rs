use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use usage_finder::archive::{JarArchive, outer_classes};
use usage_finder::builder::BuildReport;
use usage_finder::cli::{Cli, Commands, OutputFormat};
use usage_finder::config::resolve_index_config;
use usage_finder::progress::{IDLE, ProgressReceiver};
use usage_finder::session::UsageIndex;
use usage_finder::usage::{UsageKey, UsageString};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = parse_cli()?;

    match cli.command.clone() {
        Commands::Classes { jar_path } => {
            let archive = JarArchive::open(&jar_path)?;
            let classes = outer_classes(&archive)?;
            println!("{}", serde_json::to_string_pretty(&classes)?);
        }
        Commands::Stats { jar_path } => {
            let index = open_index(&cli, &jar_path)?;
            let report = build_with_progress(&index, cli.quiet).await;
            index.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&report?)?);
        }
        Commands::Usages {
            jar_path,
            key,
            format,
        } => {
            let key: UsageKey = key
                .trim()
                .parse()
                .with_context(|| format!("Invalid usage key: {key}"))?;
            let index = open_index(&cli, &jar_path)?;
            let result = find_usages(&index, &jar_path, key, cli.quiet).await;
            index.shutdown().await;
            write_usages_output(&result?, format)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_cli() -> Result<Cli> {
    let args: Vec<String> = std::env::args().collect();
    Ok(Cli::parse_from(rewrite_args_for_implicit_usages(args)))
}

fn rewrite_args_for_implicit_usages(mut args: Vec<String>) -> Vec<String> {
    if args.len() <= 1 {
        return args;
    }

    let subcommands = ["usages", "classes", "stats", "help"];

    let mut idx = 1usize;
    while idx < args.len() {
        let a = args[idx].as_str();
        if a == "--" {
            idx += 1;
            break;
        }

        if a == "--workers" || a == "--namespace" {
            idx += 2;
            continue;
        }

        if a.starts_with('-') {
            idx += 1;
            continue;
        }

        break;
    }

    if idx < args.len() {
        let token = args[idx].as_str();
        if !subcommands.contains(&token) {
            args.insert(idx, "usages".to_string());
        }
    }

    args
}

fn open_index(cli: &Cli, jar_path: &Path) -> Result<UsageIndex> {
    let config = resolve_index_config(cli)?;
    let archive = JarArchive::open(jar_path)?;
    let opened = archive.path().display().to_string();
    UsageIndex::open(Arc::new(archive), &config)
        .with_context(|| format!("Failed to start usage index for {opened}"))
}

async fn build_with_progress(index: &UsageIndex, quiet: bool) -> Result<BuildReport> {
    let printer = (!quiet).then(|| spawn_progress_printer(index.progress()));
    let report = index.build().await;
    if let Some(printer) = printer {
        let last = printer.await.unwrap_or(IDLE);
        // Fast builds can finish before the printer sees the last step.
        if report.is_ok() && last < 100 {
            eprintln!("[usage-finder] indexing 100%");
        }
    }
    Ok(report?)
}

/// Prints each progress step; returns the last percentage printed.
fn spawn_progress_printer(mut rx: ProgressReceiver) -> JoinHandle<i32> {
    tokio::spawn(async move {
        let mut last = IDLE;
        while rx.changed().await.is_ok() {
            let percent = *rx.borrow_and_update();
            if percent == IDLE {
                break;
            }
            eprintln!("[usage-finder] indexing {percent}%");
            last = percent;
        }
        last
    })
}

#[derive(Debug, Serialize)]
struct UsageEntry {
    usage: UsageString,
    label: String,
    entry: String,
}

#[derive(Debug, Serialize)]
struct UsagesResult {
    archive: String,
    key: UsageKey,
    label: String,
    duration_ms: u64,
    build: BuildReport,
    usages: Vec<UsageEntry>,
}

async fn find_usages(
    index: &UsageIndex,
    jar_path: &Path,
    key: UsageKey,
    quiet: bool,
) -> Result<UsagesResult> {
    let start = Instant::now();
    let build = build_with_progress(index, quiet).await?;
    let mut found = index.get_usage(&key).await?;
    found.sort();

    Ok(UsagesResult {
        archive: jar_path.to_string_lossy().to_string(),
        label: key.label(),
        key,
        duration_ms: start.elapsed().as_millis() as u64,
        build,
        usages: found
            .into_iter()
            .map(|usage| UsageEntry {
                label: usage.label(),
                entry: usage.target_entry(),
                usage,
            })
            .collect(),
    })
}

fn write_usages_output(result: &UsagesResult, format: OutputFormat) -> Result<()> {
    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(result)?,
        OutputFormat::Text => render_text(result),
    };

    print!("{content}");
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn render_text(result: &UsagesResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("key: {} ({})\n", result.key, result.label));
    out.push_str(&format!("usages: {}\n", result.usages.len()));
    out.push_str(&format!("duration_ms: {}\n", result.duration_ms));
    for u in &result.usages {
        out.push_str(&format!("- {}  [{}]\n", u.usage, u.label));
    }
    out
}
