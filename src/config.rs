use anyhow::{Context, Result};
use serde::Serialize;
use std::env;

use crate::cli::Cli;
use crate::pool::default_parallelism;

pub const WORKERS_ENV: &str = "USAGE_FINDER_WORKERS";
pub const NAMESPACES_ENV: &str = "USAGE_FINDER_NAMESPACES";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexConfig {
    /// Number of shards, and of scan workers.
    pub workers: usize,
    /// Key prefixes to keep. Empty keeps every key.
    pub namespaces: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            workers: default_parallelism(),
            namespaces: Vec::new(),
        }
    }
}

pub fn resolve_index_config(cli: &Cli) -> Result<IndexConfig> {
    resolve_with(cli.workers, &cli.namespace, |name| env::var(name).ok())
}

fn resolve_with(
    workers: Option<usize>,
    namespaces: &[String],
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<IndexConfig> {
    let mut config = IndexConfig::default();

    if let Some(n) = workers {
        config.workers = n;
    } else if let Some(raw) = lookup(WORKERS_ENV) {
        config.workers = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {WORKERS_ENV} value: {raw}"))?;
    }
    config.workers = config.workers.max(1);

    if !namespaces.is_empty() {
        config.namespaces = namespaces.to_vec();
    } else if let Some(raw) = lookup(NAMESPACES_ENV) {
        config.namespaces = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
    }

    Ok(config)
}
