use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use revshare::script::{generate, GeneratorConfig};

/// Generate a random operation script for `revshare replay` / `revshare compare`.
#[derive(Parser)]
#[command(name = "revshare-gen", version)]
struct Args {
    /// Number of distinct accounts operations draw from.
    #[arg(long, default_value_t = 16)]
    accounts: usize,
    /// Accounts that start with stake.
    #[arg(long, default_value_t = 8)]
    initial: usize,
    #[arg(long, default_value_t = 200)]
    operations: usize,
    /// Defaults to a random seed, which is logged.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value_t = 1_000)]
    max_stake: u64,
    #[arg(long, default_value_t = 1_000.0)]
    max_revenue: f64,
    /// Fraction of deliberately invalid operations (0.0..=1.0).
    #[arg(long, default_value_t = 0.05)]
    invalid_ratio: f64,
    /// Draw stakes in hundredths instead of whole units.
    #[arg(long)]
    fractional: bool,
    /// Write to this file instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "revshare=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = GeneratorConfig {
        accounts: args.accounts,
        initial_accounts: args.initial,
        operations: args.operations,
        seed: args.seed.unwrap_or_else(rand::random),
        max_stake: args.max_stake,
        max_revenue: args.max_revenue,
        invalid_ratio: args.invalid_ratio,
        fractional: args.fractional,
    };
    info!(seed = config.seed, operations = config.operations, "generating script");

    let json = generate(&config).to_json()?;
    match args.out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "script written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
