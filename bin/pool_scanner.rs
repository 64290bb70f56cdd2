//! # Pool Scanner
//!
//! One-shot scan: discovers pools for every configured protocol, fetches
//! their state in bulk, classifies them under the configured whitelist and
//! liquidity policy, and writes the accepted records as one JSON batch file.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin pool_scanner -- --config Config.toml --output-dir out
//! ```

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ethers::prelude::{Http, Provider};
use pool_census::records::{run_file_name, write_records};
use pool_census::scanner::PoolScanner;
use pool_census::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "pool_scanner", about = "Batched DEX pool discovery and classification")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "Config.toml")]
    config: String,

    /// Directory for the per-run records file
    #[arg(long, default_value = "out")]
    output_dir: PathBuf,

    /// Scan only the named protocol (default: all configured protocols)
    #[arg(long)]
    protocol: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    println!("🚀 Starting pool scanner");

    // 1. Load and validate settings — configuration errors are fatal before
    //    any network work begins
    let settings = Settings::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config))?;
    let mut plan = settings.plan().context("invalid configuration")?;
    println!("✅ Settings loaded ({} protocols)", plan.protocols.len());

    if let Some(ref only) = args.protocol {
        plan.protocols.retain(|p| &p.name == only);
        if plan.protocols.is_empty() {
            anyhow::bail!("no configured protocol named '{only}'");
        }
        println!("✅ Restricted to protocol {only}");
    }

    // 2. Create provider
    let provider = Provider::<Http>::try_from(plan.rpc_url.as_str())
        .with_context(|| format!("invalid RPC url {}", plan.rpc_url))?;
    let provider = Arc::new(provider);
    println!("✅ Provider created");

    // 3. Run the scan
    let scanner = PoolScanner::new(provider, plan);
    let outcome = scanner.run().await?;
    outcome.stats.report();

    // 4. Write the batch file
    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("failed to create output dir {}", args.output_dir.display())
    })?;
    let path = args.output_dir.join(run_file_name());
    write_records(&path, &outcome.records)?;
    println!(
        "✅ Wrote {} records to {}",
        outcome.records.len(),
        path.display()
    );

    Ok(())
}
