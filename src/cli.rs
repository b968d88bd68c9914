use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "usage-finder")]
#[command(about = "Find every usage of a Java class, method or field inside a jar")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Shards and scan workers [default: host parallelism]
    #[arg(long, value_name = "N", global = true)]
    pub workers: Option<usize>,

    /// Only index keys under this internal-name prefix (repeatable)
    #[arg(long, value_name = "PREFIX", global = true)]
    pub namespace: Vec<String>,

    /// Do not print indexing progress
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// List the sites referencing KEY (`a/b/C` or `a/b/C:name:descriptor`)
    Usages {
        jar_path: PathBuf,

        key: String,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// List the outer classes of a jar
    Classes { jar_path: PathBuf },
    /// Build the index and print the build report
    Stats { jar_path: PathBuf },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
