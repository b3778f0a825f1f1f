//! Risk manager: bucket map and bankroll

use super::{BucketName, BucketStatus, RiskBucket, RiskVeto};
use crate::config::RiskConfig;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Holds one isolated bucket per engine lane plus the working bankroll.
///
/// The manager is a passive target of `record_*` calls from the lanes after
/// resolution; it subscribes to nothing.
pub struct RiskManager {
    buckets: HashMap<BucketName, RiskBucket>,
    bankroll: Decimal,
}

impl RiskManager {
    pub fn new(config: &RiskConfig, bankroll: Decimal, now: DateTime<Utc>) -> Self {
        let mut buckets = HashMap::new();
        buckets.insert(
            BucketName::FifteenMin,
            RiskBucket::new(BucketName::FifteenMin, config.fifteen_min.clone(), now),
        );
        buckets.insert(
            BucketName::FiveMin,
            RiskBucket::new(BucketName::FiveMin, config.five_min.clone(), now),
        );
        buckets.insert(
            BucketName::LateWindow,
            RiskBucket::new(BucketName::LateWindow, config.late_window.clone(), now),
        );
        buckets.insert(
            BucketName::Arb,
            RiskBucket::new(BucketName::Arb, config.arb.clone(), now),
        );
        buckets.insert(
            BucketName::MarketMaker,
            RiskBucket::new(BucketName::MarketMaker, config.market_maker.clone(), now),
        );
        Self { buckets, bankroll }
    }

    pub fn bankroll(&self) -> Decimal {
        self.bankroll
    }

    /// Overwrite the working bankroll (live balance sync)
    pub fn set_bankroll(&mut self, bankroll: Decimal) {
        self.bankroll = bankroll;
    }

    fn bucket_mut(&mut self, name: BucketName) -> Result<&mut RiskBucket, RiskVeto> {
        self.buckets.get_mut(&name).ok_or(RiskVeto::UnknownBucket)
    }

    /// Ask a bucket for a sized stake
    pub fn size(
        &mut self,
        name: BucketName,
        confidence: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, RiskVeto> {
        let bankroll = self.bankroll;
        self.bucket_mut(name)?.size(confidence, bankroll, now)
    }

    /// Reserve a fixed amount against a bucket's budget up front
    pub fn reserve(
        &mut self,
        name: BucketName,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), RiskVeto> {
        let bankroll = self.bankroll;
        self.bucket_mut(name)?.reserve(amount, bankroll, now)
    }

    /// Reserve budget once an order was actually submitted
    pub fn record_stake(&mut self, name: BucketName, usd: Decimal, now: DateTime<Utc>) {
        if let Ok(bucket) = self.bucket_mut(name) {
            bucket.record_stake(usd, now);
        }
    }

    pub fn record_win(&mut self, name: BucketName, pnl: Decimal, now: DateTime<Utc>) {
        self.bankroll += pnl;
        if let Ok(bucket) = self.bucket_mut(name) {
            bucket.record_win(pnl, now);
        }
    }

    pub fn record_loss(&mut self, name: BucketName, pnl: Decimal, now: DateTime<Utc>) {
        self.bankroll += pnl;
        if let Ok(bucket) = self.bucket_mut(name) {
            bucket.record_loss(pnl, now);
        }
    }

    pub fn record_push(&mut self, name: BucketName, now: DateTime<Utc>) {
        if let Ok(bucket) = self.bucket_mut(name) {
            bucket.record_push(now);
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> Vec<BucketStatus> {
        let mut statuses: Vec<BucketStatus> = BucketName::all()
            .iter()
            .filter_map(|name| self.buckets.get(name).map(|b| b.status(now)))
            .collect();
        statuses.sort_by_key(|s| s.name.as_str());
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn manager(now: DateTime<Utc>) -> RiskManager {
        RiskManager::new(&RiskConfig::default(), dec!(500), now)
    }

    #[test]
    fn test_bucket_isolation() {
        let now = Utc::now();
        let mut m = manager(now);

        // Hammer the 5m bucket
        for _ in 0..10 {
            m.record_stake(BucketName::FiveMin, dec!(5), now);
            m.record_loss(BucketName::FiveMin, dec!(-5), now);
        }

        // 15m bucket is untouched
        let statuses = m.status(now);
        let fifteen = statuses
            .iter()
            .find(|s| s.name == BucketName::FifteenMin)
            .unwrap();
        assert_eq!(fifteen.trades_today, 0);
        assert_eq!(fifteen.used_usd, Decimal::ZERO);
        assert_eq!(fifteen.daily_pnl, Decimal::ZERO);
        assert_eq!(fifteen.losses_streak, 0);
        assert!(!fifteen.in_cooldown);

        // And still sizes normally while 5m is in cooldown
        assert!(m.size(BucketName::FifteenMin, dec!(0.82), now).is_ok());
        assert!(matches!(
            m.size(BucketName::FiveMin, dec!(0.82), now),
            Err(RiskVeto::Cooldown { .. })
        ));
    }

    #[test]
    fn test_pnl_moves_bankroll() {
        let now = Utc::now();
        let mut m = manager(now);
        m.record_win(BucketName::FifteenMin, dec!(20), now);
        assert_eq!(m.bankroll(), dec!(520));
        m.record_loss(BucketName::Arb, dec!(-10), now);
        assert_eq!(m.bankroll(), dec!(510));
    }

    #[test]
    fn test_set_bankroll_for_live_sync() {
        let now = Utc::now();
        let mut m = manager(now);
        m.set_bankroll(dec!(1234.56));
        assert_eq!(m.bankroll(), dec!(1234.56));
    }
}
