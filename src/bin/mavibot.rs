//! Command-line front end for a Mavibot store (spec.md §6.2 "[ADDED]
//! Configuration & CLI"), grounded on the teacher's `clap`-derived
//! `bin/nexuslite.rs`: a top-level `Cli` with a `#[command(subcommand)]`
//! and one `Command` variant per verb, each run inside a single read or
//! write transaction.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use mavibot::btree::RemoveOutcome;
use mavibot::{Engine, MavibotConfig, MavibotError, TreeConfig};

#[derive(Parser, Debug)]
#[command(name = "mavibot", version, about = "Inspect and manipulate a Mavibot store", long_about = None)]
struct Cli {
    /// Path to the store file. Created if it does not already exist.
    #[arg(long, short, global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new, empty tree in the store.
    #[command(name = "create-tree")]
    CreateTree {
        name: String,
        /// Minimum fan-out; rounded up to the next power of two.
        #[arg(long, default_value_t = mavibot::config::DEFAULT_FAN_OUT)]
        fan_out: usize,
        /// Allow more than one value per key.
        #[arg(long)]
        allow_duplicates: bool,
        #[arg(long, default_value = "bytes", help = "\"bytes\" or \"u64-be\"")]
        key_codec: String,
        #[arg(long, default_value = "bytes", help = "\"bytes\" or \"u64-be\"")]
        value_codec: String,
    },
    /// List every tree currently open in the store.
    #[command(name = "list-trees")]
    ListTrees,
    /// Look up a key. Exits non-zero if it is not present.
    Get { tree: String, key: String },
    /// Insert or overwrite a key's value.
    Put { tree: String, key: String, value: String },
    /// Remove a key, or one duplicate value under it with `--value`.
    Del {
        tree: String,
        key: String,
        #[arg(long)]
        value: Option<String>,
    },
    /// Print store-wide statistics.
    Stats,
    /// Run one reclamation pass, freeing pages no live reader still needs.
    Reclaim,
}

fn main() -> ExitCode {
    mavibot::logging::configure_from_env();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), MavibotError> {
    let engine = Engine::open(&cli.db, MavibotConfig::default())?;
    match &cli.command {
        Command::CreateTree { name, fan_out, allow_duplicates, key_codec, value_codec } => {
            let config = TreeConfig {
                page_nb_elem: *fan_out,
                allow_duplicates: *allow_duplicates,
                key_codec_id: key_codec.clone(),
                value_codec_id: value_codec.clone(),
                ..TreeConfig::default()
            };
            engine.create_tree(name, key_codec, value_codec, &config)?;
            println!("created tree {name}");
        }
        Command::ListTrees => {
            for name in engine.tree_names() {
                println!("{name}");
            }
        }
        Command::Get { tree, key } => match engine.begin_read(None).get(tree, key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => return Err(MavibotError::KeyNotFound),
        },
        Command::Put { tree, key, value } => {
            let mut txn = engine.begin_write();
            txn.insert(tree, key.as_bytes(), value.as_bytes())?;
            txn.commit()?;
            println!("ok");
        }
        Command::Del { tree, key, value } => {
            let mut txn = engine.begin_write();
            let outcome = txn.delete(tree, key.as_bytes(), value.as_deref().map(str::as_bytes))?;
            match outcome {
                RemoveOutcome::NotPresent => {
                    txn.abort();
                    return Err(MavibotError::KeyNotFound);
                }
                RemoveOutcome::Removed { .. } => {
                    txn.commit()?;
                    println!("ok");
                }
            }
        }
        Command::Stats => {
            let stats = engine.stats();
            println!("revision: {}", stats.revision);
            println!("trees: {}", stats.tree_count);
            println!("page_size: {}", stats.page_size);
            println!("open_snapshots: {}", stats.open_snapshots);
            println!(
                "cache hits/misses/insertions: {}/{}/{}",
                stats.cache.hits, stats.cache.misses, stats.cache.insertions
            );
        }
        Command::Reclaim => {
            let report = engine.reclaim()?;
            println!("freed {} pages, pruned {} catalog entries", report.freed_pages, report.pruned_entries);
        }
    }
    Ok(())
}
