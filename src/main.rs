//! Round Keeper daemon
//!
//! Bootstraps genesis on the prediction contract and keeps its rounds moving.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use round_keeper::contract::format_native;
use round_keeper::{
    CastClient, ChainClient, Config, ContractReader, Metrics, PriceFetcher, RoundData, RoundScheduler,
    RoundSnapshot, StatusReporter,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "round-keeper")]
#[command(about = "Operator daemon for prediction market rounds")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print contract state and exit
    #[arg(long)]
    inspect: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides the level picked by --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let chain: Arc<dyn ChainClient> = Arc::new(CastClient::new(
        config.cast_bin.clone(),
        config.rpc_url.clone(),
        config.private_key.clone(),
    ));
    let reader = ContractReader::new(chain.clone(), config.contract_address);

    if cli.inspect {
        return inspect(&config, &reader).await;
    }

    config.require_signer()?;
    print_banner(&config);

    // On-chain timing wins for status display; the tick cadence is ours
    let buffer = match reader.round_config().await {
        Some(round_config) => {
            info!(
                "Round config: interval {}s, buffer {}s, betting window {}s",
                round_config.interval_seconds,
                round_config.buffer_seconds,
                round_config.betting_window_seconds()
            );
            if round_config.interval_seconds != config.timing.round_interval.as_secs() {
                warn!(
                    "On-chain intervalSeconds ({}s) differs from ROUND_INTERVAL_SECONDS ({}s)",
                    round_config.interval_seconds,
                    config.timing.round_interval.as_secs()
                );
            }
            Duration::from_secs(round_config.buffer_seconds)
        }
        None => {
            warn!("Could not read round config, using bufferSeconds {}s", config.buffer_seconds);
            Duration::from_secs(config.buffer_seconds)
        }
    };

    let metrics = Metrics::new();
    let mut scheduler = RoundScheduler::new(
        chain.clone(),
        config.contract_address,
        config.timing,
        config.check_paused,
        config.genesis_max_attempts,
        metrics.clone(),
    );

    let prices = match &config.oracle {
        Some(oracle) => Some(
            PriceFetcher::new(oracle.source.clone(), oracle.price_id, chain.clone())
                .context("Failed to set up price fetcher")?,
        ),
        None => None,
    };
    let reporter = StatusReporter::new(
        scheduler.subscribe(),
        config.timing.status_interval,
        config.timing.round_interval,
        buffer,
        prices,
    );
    let status_task = tokio::spawn(reporter.run());

    let result = tokio::select! {
        result = scheduler.run() => result,
        signal = shutdown_signal() => {
            info!("Received {}, shutting down", signal);
            Ok(())
        }
    };
    status_task.abort();

    let summary = serde_json::to_string(&metrics.snapshot()).unwrap_or_default();
    let state = scheduler.state();
    info!(
        "Final state: round {} | {} round(s) since genesis | metrics {}",
        state.current_round, state.rounds_since_genesis, summary
    );

    if let Err(e) = result {
        error!("Genesis failed, cannot continue: {}", e);
        return Err(e.into());
    }
    Ok(())
}

fn print_banner(config: &Config) {
    let operator = config
        .operator
        .map(|a| a.to_string())
        .unwrap_or_else(|| "NOT SET".to_string());

    println!();
    println!("╔════════════════════════════════════════════════════════════════════╗");
    println!("║       ROUND KEEPER - PREDICTION ROUND AUTOMATION                   ║");
    println!("╠════════════════════════════════════════════════════════════════════╣");
    println!("║  Contract: {:<55} ║", config.contract_address.to_string());
    println!("║  RPC:      {:<55} ║", truncate(&config.rpc_url, 55));
    println!("║  Interval: {:<55} ║", format!("{}s", config.timing.round_interval.as_secs()));
    println!("║  Operator: {:<55} ║", operator);
    println!("║  Paused check: {:<51} ║", if config.check_paused { "ENABLED" } else { "DISABLED" });
    println!("╚════════════════════════════════════════════════════════════════════╝");
    println!();
}

async fn inspect(config: &Config, reader: &ContractReader) -> Result<()> {
    println!("\n{}", "=".repeat(70));
    println!("  CONTRACT STATE - {}", config.contract_address);
    println!("{}\n", "=".repeat(70));

    match reader.round_config().await {
        Some(rc) => println!(
            "Round config:   interval {}s | buffer {}s | betting window {}s",
            rc.interval_seconds,
            rc.buffer_seconds,
            rc.betting_window_seconds()
        ),
        None => println!("Round config:   {}", "unavailable".red()),
    }

    let status = reader.genesis_status().await;
    println!("Genesis start:  {}", yes_no(status.start_once));
    println!("Genesis lock:   {}", yes_no(status.lock_once));
    println!("Paused:         {}", yes_no(reader.is_paused().await));

    match reader.current_epoch().await {
        Some(epoch) => println!("Current epoch:  {}", epoch),
        None => println!("Current epoch:  {}", "unavailable".red()),
    }

    println!();
    match reader.current_round().await {
        RoundSnapshot::NotStarted => println!("No rounds started yet"),
        RoundSnapshot::Unavailable => println!("{}", "Current round unavailable".red()),
        RoundSnapshot::Active(round) => print_round(&round),
    }

    Ok(())
}

fn print_round(round: &RoundData) {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let fmt_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("{}", format!("Round {}", round.epoch).bold());
    println!("  Lock:   {} ({}s left)", fmt_time(round.lock_time()), round.seconds_until_lock(now));
    println!("  Close:  {} ({}s left)", fmt_time(round.close_time()), round.seconds_until_close(now));
    println!("  Prices: lock {} | close {}", round.lock_price, round.close_price);
    println!(
        "  Pool:   {} total | {} bull | {} bear",
        format_native(round.total_amount),
        format_native(round.bull_amount).green(),
        format_native(round.bear_amount).red()
    );
    println!("  Oracle called: {}", yes_no(round.oracle_called));
}

fn yes_no(value: bool) -> colored::ColoredString {
    if value {
        "yes".green()
    } else {
        "no".yellow()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
