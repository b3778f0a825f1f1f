//! poly-updown: Clock-synced trading agent for Polymarket BTC up/down markets
//!
//! This library provides the core components for:
//! - Persistent oracle price feed with multi-source reconciliation
//! - Market discovery via Gamma API deterministic slugs
//! - Drift-dominant signal engine with dead-zone and agreement filters
//! - Multi-bucket risk management with independent budgets and cooldowns
//! - CLOB order execution with FoK/GTC fallback and fill verification
//! - Boundary-aligned scheduler driving 15m and 5m lanes in parallel
//! - Late-window conviction, cross-timeframe arbitrage, market making, hedge
//! - JSONL journaling and a push-only live dashboard

pub mod cli;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod execution;
pub mod feed;
pub mod journal;
pub mod market;
pub mod risk;
pub mod signal;
pub mod telemetry;
pub mod ws;
