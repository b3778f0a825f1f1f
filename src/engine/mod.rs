//! Engines and orchestration
//!
//! The scheduler owns all timing; every other component is reactive. Each
//! engine lane runs as an independent task over a shared `AppContext` and
//! owns its own risk bucket.

mod arb;
mod directional;
mod hedge;
mod late_window;
mod maker;
pub mod window;

pub use arb::{ArbScanner, NearMiss};
pub use directional::DirectionalLane;
pub use hedge::HedgeEngine;
pub use late_window::LateWindowScanner;
pub use maker::MarketMaker;
pub use window::{SkipReason, Window, WindowId, WindowState};

use crate::config::Config;
use crate::dashboard::DashboardHandle;
use crate::execution::OrderExecutor;
use crate::feed::{CandleClient, PriceFeed};
use crate::journal::{Journal, Stream};
use crate::market::GammaClient;
use crate::risk::RiskManager;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// Everything a lane needs; passed explicitly, no globals
pub struct AppContext {
    pub config: Config,
    pub feed: PriceFeed,
    pub candles: CandleClient,
    pub gamma: GammaClient,
    pub executor: OrderExecutor,
    pub risk: Mutex<RiskManager>,
    pub journal: Journal,
    pub dashboard: Option<DashboardHandle>,
    /// Anchor prices by window, shared read-only across lanes
    anchors: Mutex<HashMap<WindowId, Decimal>>,
    shutdown_tx: watch::Sender<bool>,
    fatal: AtomicBool,
}

impl AppContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        feed: PriceFeed,
        candles: CandleClient,
        gamma: GammaClient,
        executor: OrderExecutor,
        risk: RiskManager,
        journal: Journal,
        dashboard: Option<DashboardHandle>,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            config,
            feed,
            candles,
            gamma,
            executor,
            risk: Mutex::new(risk),
            journal,
            dashboard,
            anchors: Mutex::new(HashMap::new()),
            shutdown_tx,
            fatal: AtomicBool::new(false),
        }
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn request_shutdown(&self) {
        // send_replace flips the flag even when every receiver is gone
        self.shutdown_tx.send_replace(true);
    }

    /// Unrecoverable error: log, flag, and bring everything down
    pub fn flag_fatal(&self, context: &str, error: &anyhow::Error) {
        tracing::error!(context, error = %error, "Fatal error");
        self.fatal.store(true, Ordering::SeqCst);
        self.request_shutdown();
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }

    /// Journal writes that fail (disk full, permissions) are fatal
    pub fn journal_entry(&self, stream: Stream, record: serde_json::Value) {
        if let Err(e) = self.journal.append(stream, record) {
            self.flag_fatal("journal", &e);
        }
    }

    pub async fn record_anchor(&self, id: WindowId, price: Decimal) {
        let mut anchors = self.anchors.lock().await;
        anchors.insert(id, price);
        // Windows two days gone can no longer resolve
        anchors.retain(|k, _| id.open_ts - k.open_ts < 172_800);
    }

    pub async fn anchor_for(&self, id: &WindowId) -> Option<Decimal> {
        self.anchors.lock().await.get(id).copied()
    }

    /// Push a dashboard event if the dashboard is running
    pub fn notify_dashboard(&self, event: &serde_json::Value) {
        if let Some(dashboard) = &self.dashboard {
            dashboard.broadcast(event);
        }
    }

    /// Journal a skipped window and tell the dashboard
    pub fn journal_skip(&self, window: &Window, reason: SkipReason, detail: &str) {
        tracing::info!(window = %window.id, reason = reason.as_str(), detail, "Window skipped");
        self.journal_entry(
            Stream::Strategy,
            json!({
                "window": window.id.to_string(),
                "event": "skipped",
                "reason": reason.as_str(),
                "detail": detail,
            }),
        );
    }
}

/// One engine lane, selected at orchestrator start
pub enum Engine {
    Directional(DirectionalLane),
    LateWindow(LateWindowScanner),
    Arb(ArbScanner),
    Maker(MarketMaker),
    Hedge(HedgeEngine),
}

impl Engine {
    pub fn name(&self) -> &'static str {
        match self {
            Engine::Directional(lane) => lane.name(),
            Engine::LateWindow(_) => "late_window",
            Engine::Arb(_) => "arb",
            Engine::Maker(_) => "mm",
            Engine::Hedge(_) => "hedge",
        }
    }

    /// Run until shutdown. Everything below Fatal is caught inside the
    /// lane loops; an Err here is a lane that could not keep running.
    pub async fn run(self, ctx: Arc<AppContext>) -> anyhow::Result<()> {
        match self {
            Engine::Directional(lane) => lane.run(ctx).await,
            Engine::LateWindow(scanner) => scanner.run(ctx).await,
            Engine::Arb(scanner) => scanner.run(ctx).await,
            Engine::Maker(maker) => maker.run(ctx).await,
            Engine::Hedge(hedge) => hedge.run(ctx).await,
        }
    }
}

/// Sleep until a UTC instant, re-reading the wall clock in chunks so
/// monotonic drift never accumulates. Returns false on shutdown.
pub async fn sleep_until_utc(target: DateTime<Utc>, shutdown: &mut watch::Receiver<bool>) -> bool {
    loop {
        let now = Utc::now();
        let remaining = (target - now).num_milliseconds();
        if remaining <= 0 {
            return true;
        }
        let chunk = std::time::Duration::from_millis(remaining.min(5_000) as u64);
        tokio::select! {
            _ = tokio::time::sleep(chunk) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_until_past_instant_returns_immediately() {
        let (_tx, mut rx) = watch::channel(false);
        let target = Utc::now() - chrono::Duration::seconds(10);
        assert!(sleep_until_utc(target, &mut rx).await);
    }

    #[tokio::test]
    async fn test_sleep_until_aborts_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let target = Utc::now() + chrono::Duration::seconds(3600);
        let handle = tokio::spawn(async move { sleep_until_utc(target, &mut rx).await });
        tx.send(true).unwrap();
        let completed = handle.await.unwrap();
        assert!(!completed);
    }
}
