use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use revshare::{
    script::{compare, settle, Comparison},
    ReplayReport, RevenueLedger, Script, Strategy,
};

#[derive(Parser)]
#[command(name = "revshare", version, about = "Replay revenue-distribution scripts")]
struct Cli {
    /// Log every committed and rejected operation.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a script through one strategy and print the resulting ledger.
    Replay {
        script: PathBuf,
        #[arg(long, value_enum, default_value_t = Strategy::Indexed, env = "REVSHARE_STRATEGY")]
        strategy: Strategy,
        /// Checkpoint every account before printing.
        #[arg(long)]
        settle: bool,
        /// Print the snapshot and report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Replay a script through both strategies and compare settled revenue.
    Compare {
        script: PathBuf,
        /// Allowed difference, relative to the injected revenue.
        #[arg(long, default_value_t = 1e-6, env = "REVSHARE_TOLERANCE")]
        tolerance: f64,
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "revshare=debug" } else { "revshare=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Replay {
            script,
            strategy,
            settle,
            json,
        } => replay_cmd(&script, strategy, settle, json),
        Command::Compare {
            script,
            tolerance,
            json,
        } => compare_cmd(&script, tolerance, json),
    }
}

fn load(path: &Path) -> Result<Script> {
    let script =
        Script::load(path).with_context(|| format!("loading script {}", path.display()))?;
    info!(
        accounts = script.initial.len(),
        operations = script.operations.len(),
        "script loaded"
    );
    Ok(script)
}

fn replay_cmd(path: &Path, strategy: Strategy, do_settle: bool, json: bool) -> Result<ExitCode> {
    let script = load(path)?;
    let (mut ledger, report) = script
        .run(strategy)
        .context("building ledger from initial stakes")?;
    if do_settle {
        let settled = settle(&mut *ledger).context("settling accounts")?;
        info!(settled, "accounts checkpointed");
    }

    if json {
        let out = serde_json::json!({
            "report": report,
            "snapshot": ledger.snapshot(),
            "fingerprint": ledger.snapshot().fingerprint_hex(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_ledger(&*ledger, &report);
    }
    Ok(ExitCode::SUCCESS)
}

fn compare_cmd(path: &Path, tolerance: f64, json: bool) -> Result<ExitCode> {
    let script = load(path)?;
    let (mut naive, naive_report) = script.run(Strategy::Naive)?;
    let (mut indexed, indexed_report) = script.run(Strategy::Indexed)?;
    if naive_report != indexed_report {
        warn!(
            naive_rejected = naive_report.rejected.len(),
            indexed_rejected = indexed_report.rejected.len(),
            "strategies rejected different operations"
        );
    }
    settle(&mut *naive).context("settling naive ledger")?;
    settle(&mut *indexed).context("settling indexed ledger")?;

    let comparison = compare(&*naive, &*indexed, naive_report.injected, tolerance);
    let consistent = comparison.is_consistent() && naive_report == indexed_report;
    if json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
    } else {
        print_comparison(&comparison);
    }

    if consistent {
        info!("strategies agree");
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(divergences = comparison.divergences.len(), "strategies diverge");
        Ok(ExitCode::FAILURE)
    }
}

fn print_ledger(ledger: &dyn RevenueLedger, report: &ReplayReport) {
    println!(
        "strategy: {}   applied: {}   rejected: {}   injected: {}",
        ledger.strategy(),
        report.applied,
        report.rejected.len(),
        report.injected
    );
    println!(
        "{:<20} {:>16} {:>20} {:>20}",
        "account", "stake", "settled", "projected"
    );
    for account in ledger.accounts() {
        println!(
            "{:<20} {:>16.6} {:>20.6} {:>20.6}",
            account,
            ledger.stake_of(&account),
            ledger.settled_revenue(&account),
            ledger.projected_revenue(&account)
        );
    }
    println!("total stake: {}", ledger.total_stake());
    for rejection in &report.rejected {
        println!("  step {:>6}: {}", rejection.step, rejection.error);
    }
    println!("fingerprint: {}", ledger.snapshot().fingerprint_hex());
}

fn print_comparison(comparison: &Comparison) {
    println!(
        "injected: {}   {} total: {}   {} total: {}   bound: {:e}",
        comparison.injected,
        comparison.left,
        comparison.left_total,
        comparison.right,
        comparison.right_total,
        comparison.bound
    );
    if comparison.divergences.is_empty() {
        println!("no per-account divergence");
    }
    for d in &comparison.divergences {
        println!(
            "  {:<20} {} {:>20.6}   {} {:>20.6}   diff {:e}",
            d.account,
            comparison.left,
            d.left,
            comparison.right,
            d.right,
            d.difference()
        );
    }
    if !comparison.conserves() {
        println!("conservation violated");
    }
}
