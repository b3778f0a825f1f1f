//! Run wiring: build the context, select engines, own the lifecycle

use super::Cli;
use crate::config::Config;
use crate::dashboard::{self, DashboardHandle};
use crate::engine::{AppContext, ArbScanner, DirectionalLane, Engine, HedgeEngine, LateWindowScanner, MarketMaker};
use crate::execution::{ClobApi, ExecutorConfig, HttpClobClient, OrderExecutor, WalletCredentials};
use crate::feed::{CandleClient, PriceFeed};
use crate::journal::Journal;
use crate::market::GammaClient;
use crate::risk::RiskManager;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Graceful shutdown
    Clean,
    /// A fatal runtime error forced the shutdown
    Fatal,
}

/// Apply CLI flags, build everything, run until shutdown.
///
/// Errors returned here are startup failures; once the engines are running,
/// runtime fatals surface through `RunOutcome::Fatal`.
pub async fn run(cli: Cli, mut config: Config) -> anyhow::Result<RunOutcome> {
    config.bankroll = cli.bankroll;
    config.arb.enabled = cli.arb || cli.arb_only;
    config.late_window.enabled = cli.late_window;
    config.five_min.enabled = cli.five_min;
    config.market_maker.enabled = cli.mm;
    config.hedge.enabled = cli.hedge;
    config.dashboard.enabled = cli.dashboard;
    config.clob.sync_live_bankroll = cli.sync_live_bankroll || cli.arb_only;
    // The arb bucket's absolute ceiling tracks the arb config
    config.risk.arb.budget_cap_usd = Some(config.arb.max_daily_budget);

    // Startup; any failure here is fatal with exit code 1
    let wallet = WalletCredentials::from_env()?;
    let clob: Arc<dyn ClobApi> = Arc::new(HttpClobClient::new(
        &config.clob.clob_api_url,
        wallet,
        config.clob.fee_cache_ttl_secs,
    )?);
    let executor = OrderExecutor::new(clob, ExecutorConfig::from_clob_config(&config.clob));
    let gamma = GammaClient::new(&config.clob.gamma_api_url)?;
    let candles = CandleClient::new(&config.oracle.binance_base_url)?;
    let journal = Journal::new(
        config.journal.log_dir.clone(),
        config.journal.performance_file.clone(),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed = PriceFeed::start(config.oracle.clone(), shutdown_rx);
    let risk = RiskManager::new(&config.risk, config.bankroll, Utc::now());
    let dashboard = config.dashboard.enabled.then(DashboardHandle::new);

    let ctx = Arc::new(AppContext::new(
        config.clone(),
        feed,
        candles,
        gamma,
        executor,
        risk,
        journal,
        dashboard.clone(),
        shutdown_tx,
    ));

    banner(&cli, &config);

    if let Some(handle) = dashboard {
        let port = config.dashboard.port;
        let server_shutdown = ctx.shutdown_signal();
        let server_handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = dashboard::serve(port, server_handle, server_shutdown).await {
                tracing::error!(error = %e, "Dashboard server failed");
            }
        });
        tokio::spawn(price_push_loop(ctx.clone(), handle));
    }

    if config.clob.sync_live_bankroll {
        tokio::spawn(bankroll_sync_loop(ctx.clone()));
    }

    // Engine selection: a tagged union per lane, spawned as its own task
    let mut engines: Vec<Engine> = Vec::new();
    if !cli.arb_only {
        engines.push(Engine::Directional(DirectionalLane::fifteen_min(
            &config, cli.cycles,
        )));
        if config.five_min.enabled {
            engines.push(Engine::Directional(DirectionalLane::five_min(&config)));
        }
        if config.late_window.enabled {
            engines.push(Engine::LateWindow(LateWindowScanner::new(
                config.late_window.clone(),
                config.clob.min_liquidity_usd,
            )));
        }
        if config.market_maker.enabled {
            engines.push(Engine::Maker(MarketMaker::new(config.market_maker.clone())));
        }
        if config.hedge.enabled {
            engines.push(Engine::Hedge(HedgeEngine::new(
                config.hedge.clone(),
                config.strategy.clone(),
                config.clob.min_liquidity_usd,
            )));
        }
    }
    if config.arb.enabled {
        engines.push(Engine::Arb(ArbScanner::new(
            config.arb.clone(),
            config.clob.fee_fallback_pct,
        )));
    }

    let mut tasks = JoinSet::new();
    for engine in engines {
        let ctx = ctx.clone();
        let name = engine.name();
        tracing::info!(engine = name, "Engine launched");
        tasks.spawn(async move {
            if let Err(e) = engine.run(ctx).await {
                tracing::error!(engine = name, error = %e, "Engine exited with error");
            }
        });
    }

    // Wait for an interrupt or an internal shutdown request
    let mut shutdown = ctx.shutdown_signal();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, shutting down");
            ctx.request_shutdown();
        }
        _ = shutdown.wait_for(|stop| *stop) => {}
    }

    // Graceful stop: pull open orders, then bounded join, then force
    ctx.executor.cancel_all_open().await;
    let drained = tokio::time::timeout(SHUTDOWN_JOIN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!("Engines did not stop in time, aborting");
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }

    let (bankroll, statuses) = {
        let risk = ctx.risk.lock().await;
        (risk.bankroll(), risk.status(Utc::now()))
    };
    if let Err(e) = ctx.journal.save_performance(json!({
        "status": "shutdown",
        "bankroll": bankroll,
        "buckets": statuses,
    })) {
        tracing::warn!(error = %e, "Final performance snapshot failed");
    }

    tracing::info!("Shutdown complete");
    Ok(if ctx.is_fatal() {
        RunOutcome::Fatal
    } else {
        RunOutcome::Clean
    })
}

/// Push the latest oracle price to the dashboard every couple of seconds
async fn price_push_loop(ctx: Arc<AppContext>, handle: DashboardHandle) {
    let mut shutdown = ctx.shutdown_signal();
    let mut interval = tokio::time::interval(Duration::from_secs(2));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if handle.client_count() == 0 {
                    continue;
                }
                if let Ok(tick) = ctx.feed.latest().await {
                    handle.broadcast(&json!({
                        "type": "price_tick",
                        "price": tick.price,
                        "source": tick.source.as_str(),
                    }));
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Overwrite the working bankroll from the live balance on a slow cadence
async fn bankroll_sync_loop(ctx: Arc<AppContext>) {
    let mut shutdown = ctx.shutdown_signal();
    let cadence = Duration::from_secs(ctx.config.clob.live_bankroll_poll_secs.max(5));
    let mut interval = tokio::time::interval(cadence);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(balance) = ctx.executor.live_balance_usd().await {
                    let rounded = balance.round_dp(2);
                    let mut risk = ctx.risk.lock().await;
                    risk.set_bankroll(rounded);
                    tracing::info!(bankroll = %rounded, "Synced live bankroll");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn banner(cli: &Cli, config: &Config) {
    tracing::info!(
        bankroll = %config.bankroll,
        cycles = cli.cycles,
        arb = config.arb.enabled,
        arb_only = cli.arb_only,
        five_min = config.five_min.enabled,
        late_window = config.late_window.enabled,
        market_maker = config.market_maker.enabled,
        hedge = config.hedge.enabled,
        dashboard = config.dashboard.enabled,
        "poly-updown starting"
    );
}
