#![forbid(unsafe_code)]
//! Two-node simulation: a miner produces blocks, a validator ingests them.

use clap::Parser;
use forkchain::config::load_config;
use forkchain::miner::{CancelToken, MiningEngine};
use forkchain::node::{spawn_node, Node};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of blocks the miner produces
    #[arg(long, default_value_t = 8)]
    blocks: usize,

    /// Path to a TOML config file; defaults apply when it does not exist
    #[arg(long, default_value = "forkchain.toml")]
    config: PathBuf,

    /// Deliver blocks to the validator newest first
    #[arg(long)]
    reverse: bool,

    /// Print the summaries as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let engine = Arc::new(MiningEngine::new(&config));
    let (miner, miner_worker) = spawn_node(Node::new(config.clone())?, 64);
    let (validator, validator_worker) = spawn_node(Node::new(config)?, 64);

    let started = Instant::now();
    for _ in 0..cli.blocks {
        let (block, status) = miner
            .mine_block(Arc::clone(&engine), CancelToken::new())
            .await?;
        info!(hash = %block.hash_hex(), level = block.difficulty, status = status.label(), "miner produced block");
    }
    info!(
        blocks = cli.blocks,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "mining finished"
    );

    let mut delivery: Vec<_> = miner.main_chain().await?.into_iter().skip(1).collect();
    if cli.reverse {
        delivery.reverse();
    }
    let report = validator.sync(delivery).await?;

    let miner_summary = miner.summary().await?;
    let validator_summary = validator.summary().await?;
    let converged = miner.main_chain().await? == validator.main_chain().await?;

    if cli.json {
        let output = serde_json::json!({
            "miner": miner_summary,
            "validator": validator_summary,
            "attached": report.attached,
            "reattached": report.reattached,
            "unresolved": report.unresolved.len(),
            "converged": converged,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Miner:     height {} tip {}", miner_summary.height, miner_summary.tip);
        println!("Validator: height {} tip {}", validator_summary.height, validator_summary.tip);
        println!(
            "Sync:      {} attached, {} reattached, {} unresolved, {} passes",
            report.attached,
            report.reattached,
            report.unresolved.len(),
            report.passes
        );
        println!("Converged: {}", converged);
    }

    drop(miner);
    drop(validator);
    miner_worker.await?;
    validator_worker.await?;
    Ok(())
}
