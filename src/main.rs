//! Diagnostic CLI for the market data backend.
//!
//! One subcommand per fetch area, printing records as JSON. This is the
//! debugging surface; the desktop UI talks to the library through its own
//! IPC layer.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use stockai_backend::models::{Config, KlinePeriod};
use stockai_backend::{
    FileSnapshotStore, Gateway, MemoryCache, Orchestrator, RateLimiter, SourceRegistry,
};

#[derive(Parser)]
#[command(name = "stockai", about = "Stock-AI market data backend CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Real-time quotes for one or more A-share codes
    Quotes {
        /// Codes like sh600519 or bare 600519
        codes: Vec<String>,
    },
    /// Domestic benchmark indices
    Indices,
    /// Global index board
    Global,
    /// Candlestick history
    Kline {
        code: String,
        #[arg(long, default_value = "daily")]
        period: String,
        #[arg(long, default_value_t = 100)]
        count: usize,
    },
    /// Latest market news
    News {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Per-stock capital flow
    Fundflow { codes: Vec<String> },
    /// Research reports for a stock
    Reports { code: String },
    /// Company notices for a stock
    Notices { code: String },
    /// Open-fund detail
    Fund { code: String },
    /// Intraday fund net-value estimates
    FundEst { codes: Vec<String> },
    /// Hong Kong quotes
    Hk { codes: Vec<String> },
    /// US quotes
    Us { codes: Vec<String> },
    /// Forex pair quotes
    Forex { pairs: Vec<String> },
    /// Futures contract quotes
    Futures { codes: Vec<String> },
    /// Industry board ranking
    Industry,
    /// Dragon-tiger leaderboard
    Leaderboard,
    /// Hot topics
    Hot,
    /// Market breadth overview
    Overview,
    /// Market sentiment composite
    Sentiment,
    /// Source health report
    Health,
}

fn period_from(name: &str) -> KlinePeriod {
    match name {
        "weekly" => KlinePeriod::Weekly,
        "monthly" => KlinePeriod::Monthly,
        "60m" => KlinePeriod::Min60,
        _ => KlinePeriod::Daily,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockai_backend=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;

    let limiter = Arc::new(RateLimiter::new());
    let gateway = Arc::new(Gateway::new(limiter, config.proxy_url.as_deref()));
    let registry = Arc::new(SourceRegistry::new());
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(FileSnapshotStore::new(config.snapshot_path()));

    let eviction = stockai_backend::cache::spawn_eviction(cache.clone());
    let orchestrator =
        Orchestrator::new(gateway, registry, cache, Some(store));

    let snapshot = orchestrator.warm_snapshot();
    if snapshot.quotes.is_some() || snapshot.global_indices.is_some() {
        info!("warm snapshot loaded from {}", config.snapshot_path().display());
    }

    match cli.command {
        Command::Quotes { codes } => print_json(&orchestrator.get_quotes(&codes).await?)?,
        Command::Indices => print_json(&orchestrator.get_index_quotes().await?)?,
        Command::Global => print_json(&orchestrator.get_global_indices().await?)?,
        Command::Kline { code, period, count } => {
            print_json(&orchestrator.get_klines(&code, period_from(&period), count).await?)?
        }
        Command::News { limit } => print_json(&orchestrator.get_news(limit).await?)?,
        Command::Fundflow { codes } => print_json(&orchestrator.get_fund_flow(&codes).await?)?,
        Command::Reports { code } => print_json(&orchestrator.get_research_reports(&code).await?)?,
        Command::Notices { code } => print_json(&orchestrator.get_notices(&code).await?)?,
        Command::Fund { code } => print_json(&orchestrator.get_fund_detail(&code).await?)?,
        Command::FundEst { codes } => print_json(&orchestrator.get_fund_estimates(&codes).await?)?,
        Command::Hk { codes } => print_json(&orchestrator.get_hk_quotes(&codes).await?)?,
        Command::Us { codes } => print_json(&orchestrator.get_us_quotes(&codes).await?)?,
        Command::Forex { pairs } => print_json(&orchestrator.get_forex(&pairs).await?)?,
        Command::Futures { codes } => print_json(&orchestrator.get_futures(&codes).await?)?,
        Command::Industry => print_json(&orchestrator.get_industry_ranking().await?)?,
        Command::Leaderboard => print_json(&orchestrator.get_leaderboard().await?)?,
        Command::Hot => print_json(&orchestrator.get_hot_topics().await?)?,
        Command::Overview => print_json(&orchestrator.get_market_overview().await?)?,
        Command::Sentiment => {
            print_json(&stockai_backend::sentiment::collect(&orchestrator).await?)?
        }
        Command::Health => {
            let report: Vec<_> = orchestrator
                .registry()
                .health_report()
                .into_iter()
                .map(|(id, fails, disabled)| {
                    serde_json::json!({"source": id, "fails": fails, "disabled": disabled})
                })
                .collect();
            print_json(&report)?;
        }
    }

    eviction.abort();
    Ok(())
}
