//! vhash CLI - drive the virtual tree hasher from the command line
//!
//! Builds synthetic trees, rehashes them incrementally and reports what
//! each pass did. Handy for checking a configuration or timing a machine.

use anyhow::{bail, Context};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;
use virtual_hasher::{
    rebuild_root, HasherConfig, LeafExtent, VirtualHasher, VirtualLeaf, VirtualTree,
};

#[derive(Parser)]
#[command(name = "vhash")]
#[command(about = "Incremental hashing of virtual binary Merkle trees")]
#[command(version)]
struct Cli {
    /// Hashing threads (overrides the config file)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    /// Path to a JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json", global = true)]
    format: OutputFormat,

    /// More logging (-v, -vv, -vvv). RUST_LOG wins when set.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a synthetic tree from scratch
    Root {
        /// Number of leaves
        #[arg(short, long)]
        leaves: u64,
    },

    /// Rewrite some leaves of a synthetic tree and rehash incrementally
    Update {
        /// Number of leaves
        #[arg(short, long)]
        leaves: u64,
        /// Leaf paths to rewrite, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        paths: Vec<u64>,
    },

    /// Append leaves to a synthetic tree and rehash incrementally
    Grow {
        /// Starting number of leaves
        #[arg(long)]
        from: u64,
        /// Final number of leaves
        #[arg(long)]
        to: u64,
    },

    /// Show the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = HasherConfig::load(cli.config.as_deref())?;
    if let Some(threads) = cli.threads {
        config.hash_threads = Some(threads);
    }

    match cli.command {
        Commands::Root { leaves } => {
            let hasher = Arc::new(VirtualHasher::with_config(config)?);
            let started = Instant::now();
            let mut tree = synthetic_tree(&hasher, leaves);
            let root = tree.root_hash()?;
            output(
                &cli.format,
                &serde_json::json!({
                    "leaves": leaves,
                    "extent": extent_json(tree.extent()),
                    "root": root.to_hex(),
                    "stats": tree.last_stats(),
                    "elapsed_ms": started.elapsed().as_millis() as u64
                }),
            )?;
        }

        Commands::Update { leaves, paths } => {
            let hasher = Arc::new(VirtualHasher::with_config(config)?);
            let mut tree = synthetic_tree(&hasher, leaves);
            let old_root = tree.root_hash()?;

            for path in &paths {
                let key = match tree.leaf_at(*path) {
                    Some(leaf) => leaf.key.clone(),
                    None => bail!("path {} is not a leaf of a {}-leaf tree", path, leaves),
                };
                tree.put(key, format!("updated-{path}"));
            }

            let started = Instant::now();
            let new_root = tree.root_hash()?;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            let expected = rebuild_root(tree.extent(), |p| tree.leaf_at(p).map(|l| l.leaf_hash()))?;
            let verified = expected == new_root;

            output(
                &cli.format,
                &serde_json::json!({
                    "leaves": leaves,
                    "extent": extent_json(tree.extent()),
                    "updated": paths,
                    "old_root": old_root.to_hex(),
                    "new_root": new_root.to_hex(),
                    "verified": verified,
                    "stats": tree.last_stats(),
                    "elapsed_ms": elapsed_ms
                }),
            )?;
            if !verified {
                std::process::exit(1);
            }
        }

        Commands::Grow { from, to } => {
            if to <= from {
                bail!("--to ({}) must be greater than --from ({})", to, from);
            }
            let hasher = Arc::new(VirtualHasher::with_config(config)?);
            let mut tree = synthetic_tree(&hasher, from);
            let old_root = tree.root_hash()?;

            for i in from..to {
                tree.put(leaf_key(i), leaf_value(i));
            }
            let dirty = tree.dirty_count();
            let started = Instant::now();
            let new_root = tree.root_hash()?;

            output(
                &cli.format,
                &serde_json::json!({
                    "from": from,
                    "to": to,
                    "extent": extent_json(tree.extent()),
                    "dirty_leaves": dirty,
                    "old_root": old_root.to_hex(),
                    "new_root": new_root.to_hex(),
                    "stats": tree.last_stats(),
                    "elapsed_ms": started.elapsed().as_millis() as u64
                }),
            )?;
        }

        Commands::Config => {
            config.validate()?;
            output(
                &cli.format,
                &serde_json::json!({
                    "config": config,
                    "threads": config.thread_count(),
                    "in_flight_chunks": config.in_flight_chunks(),
                    "config_path": HasherConfig::default_path()
                        .map(|p| p.display().to_string())
                }),
            )?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn leaf_key(i: u64) -> String {
    format!("leaf-{i:012}")
}

fn leaf_value(i: u64) -> String {
    format!("value-{i}")
}

/// Tree of `leaves` deterministic entries, not yet hashed
fn synthetic_tree(hasher: &Arc<VirtualHasher>, leaves: u64) -> VirtualTree {
    let mut tree = VirtualTree::new(Arc::clone(hasher));
    for i in 0..leaves {
        tree.put(leaf_key(i), leaf_value(i));
    }
    info!(leaves, "built synthetic tree");
    tree
}

fn extent_json(extent: Option<LeafExtent>) -> serde_json::Value {
    match extent {
        Some(extent) => serde_json::json!({
            "first": extent.first(),
            "last": extent.last()
        }),
        None => serde_json::Value::Null,
    }
}

fn output(format: &OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string(value),
        OutputFormat::Text => serde_json::to_string_pretty(value),
    }
    .context("failed to render output")?;
    println!("{}", rendered);
    Ok(())
}
