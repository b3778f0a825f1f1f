//! Per-lane risk accounting

use super::{BucketName, RiskVeto};
use crate::config::BucketLimits;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Snapshot of a bucket's daily state
#[derive(Debug, Clone, Serialize)]
pub struct BucketStatus {
    pub name: BucketName,
    pub trades_today: u32,
    pub used_usd: Decimal,
    /// Today's budget, once the day's reference bankroll is pinned
    pub daily_budget_usd: Option<Decimal>,
    pub daily_pnl: Decimal,
    pub losses_streak: u32,
    pub in_cooldown: bool,
}

/// Independent budget, trade-count, loss-streak and circuit-breaker state
/// for one engine lane
#[derive(Debug, Clone)]
pub struct RiskBucket {
    name: BucketName,
    limits: BucketLimits,
    day: NaiveDate,
    /// Bankroll at the first sizing of the day; budgets are measured
    /// against this, not the shrinking intraday balance
    day_reference: Option<Decimal>,
    trades_today: u32,
    used_usd: Decimal,
    daily_pnl: Decimal,
    losses_streak: u32,
    cooldown_until: Option<DateTime<Utc>>,
}

impl RiskBucket {
    pub fn new(name: BucketName, limits: BucketLimits, now: DateTime<Utc>) -> Self {
        Self {
            name,
            limits,
            day: now.date_naive(),
            day_reference: None,
            trades_today: 0,
            used_usd: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            losses_streak: 0,
            cooldown_until: None,
        }
    }

    pub fn name(&self) -> BucketName {
        self.name
    }

    /// Daily counters reset at 00:00 UTC. The loss streak and any active
    /// cooldown survive the reset.
    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.day != today {
            tracing::info!(
                bucket = %self.name,
                trades = self.trades_today,
                pnl = %self.daily_pnl,
                "Daily reset (UTC midnight)"
            );
            self.day = today;
            self.day_reference = None;
            self.trades_today = 0;
            self.used_usd = Decimal::ZERO;
            self.daily_pnl = Decimal::ZERO;
        }
    }

    /// Today's budget for this bucket in USD. The first sizing of the day
    /// pins the reference bankroll.
    fn budget_usd(&mut self, bankroll: Decimal) -> Decimal {
        let reference = *self.day_reference.get_or_insert(bankroll);
        self.budget_for_reference(reference)
    }

    fn budget_for_reference(&self, reference: Decimal) -> Decimal {
        let pct_based = reference * self.limits.budget_pct / Decimal::ONE_HUNDRED;
        match self.limits.budget_cap_usd {
            Some(cap) => pct_based.min(cap),
            None => pct_based,
        }
    }

    /// Produce a sized stake or a veto
    pub fn size(
        &mut self,
        confidence: Decimal,
        bankroll: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, RiskVeto> {
        self.roll_day(now);

        if let Some(until) = self.cooldown_until {
            if now < until {
                return Err(RiskVeto::Cooldown {
                    remaining_secs: (until - now).num_seconds(),
                });
            }
        }

        if self.trades_today >= self.limits.max_trades {
            return Err(RiskVeto::TradeCap {
                max: self.limits.max_trades,
            });
        }

        if bankroll <= Decimal::ZERO {
            return Err(RiskVeto::NoCapital);
        }

        let realized_loss = (-self.daily_pnl).max(Decimal::ZERO);
        let loss_cap = self.limits.daily_loss_cap_pct / Decimal::ONE_HUNDRED * bankroll;
        if realized_loss >= loss_cap {
            let loss_pct = (realized_loss / bankroll * Decimal::ONE_HUNDRED).round_dp(1);
            return Err(RiskVeto::CircuitBreaker { loss_pct });
        }

        // Quarter-Kelly on the binary edge
        let edge = (confidence * Decimal::TWO - Decimal::ONE).max(Decimal::ZERO);
        let mut stake = bankroll * edge * self.limits.kelly_fraction;
        stake = stake.min(self.limits.hard_cap_usd);

        let remaining = self.budget_usd(bankroll) - self.used_usd;
        if remaining <= Decimal::ZERO {
            return Err(RiskVeto::BudgetExhausted);
        }
        stake = stake.min(remaining);

        if stake < dec!(1) {
            return Err(RiskVeto::StakeTooSmall);
        }
        Ok(stake.round_dp(2))
    }

    /// Reserve a fixed amount up front (arb pairs, maker quotes). Refuses
    /// rather than overdrawing the bucket.
    pub fn reserve(
        &mut self,
        amount: Decimal,
        bankroll: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), RiskVeto> {
        self.roll_day(now);
        if self.trades_today >= self.limits.max_trades {
            return Err(RiskVeto::TradeCap {
                max: self.limits.max_trades,
            });
        }
        if self.used_usd + amount > self.budget_usd(bankroll) {
            return Err(RiskVeto::BudgetExhausted);
        }
        self.trades_today += 1;
        self.used_usd += amount;
        Ok(())
    }

    /// Reserve budget after an order is actually submitted
    pub fn record_stake(&mut self, usd: Decimal, now: DateTime<Utc>) {
        self.roll_day(now);
        self.trades_today += 1;
        self.used_usd += usd.max(Decimal::ZERO);
    }

    /// A resolved win clears the loss streak
    pub fn record_win(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.roll_day(now);
        self.daily_pnl += pnl;
        self.losses_streak = 0;
    }

    /// A resolved loss extends the streak; a full streak starts the cooldown
    pub fn record_loss(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.roll_day(now);
        self.daily_pnl += pnl;
        self.losses_streak += 1;
        if self.losses_streak >= self.limits.max_streak {
            let until = now + Duration::minutes(self.limits.cooldown_mins);
            self.cooldown_until = Some(until);
            tracing::warn!(
                bucket = %self.name,
                streak = self.losses_streak,
                until = %until,
                "Loss streak cooldown engaged"
            );
        }
    }

    /// A push leaves the streak untouched
    pub fn record_push(&mut self, now: DateTime<Utc>) {
        self.roll_day(now);
    }

    pub fn status(&self, now: DateTime<Utc>) -> BucketStatus {
        BucketStatus {
            name: self.name,
            trades_today: self.trades_today,
            used_usd: self.used_usd,
            daily_budget_usd: self.day_reference.map(|r| self.budget_for_reference(r)),
            daily_pnl: self.daily_pnl,
            losses_streak: self.losses_streak,
            in_cooldown: self.cooldown_until.map(|t| now < t).unwrap_or(false),
        }
    }

    #[cfg(test)]
    pub(crate) fn used_usd(&self) -> Decimal {
        self.used_usd
    }

    #[cfg(test)]
    pub(crate) fn budget_for(&mut self, bankroll: Decimal) -> Decimal {
        self.budget_usd(bankroll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use chrono::TimeZone;

    fn bucket(now: DateTime<Utc>) -> RiskBucket {
        RiskBucket::new(
            BucketName::FifteenMin,
            RiskConfig::default().fifteen_min,
            now,
        )
    }

    #[test]
    fn test_kelly_sizing_clean_case() {
        // conf=0.82, bankroll=500, kelly=0.25, hard_cap=25:
        // 500 * 0.64 * 0.25 = 80, capped to 25
        let now = Utc::now();
        let mut b = bucket(now);
        let stake = b.size(dec!(0.82), dec!(500), now).unwrap();
        assert_eq!(stake, dec!(25));
    }

    #[test]
    fn test_small_stake_vetoed() {
        let now = Utc::now();
        let mut b = bucket(now);
        // conf 0.501 → edge 0.002 → stake 0.25
        let result = b.size(dec!(0.501), dec!(500), now);
        assert_eq!(result, Err(RiskVeto::StakeTooSmall));
    }

    #[test]
    fn test_trade_cap() {
        let now = Utc::now();
        let mut b = bucket(now);
        for _ in 0..20 {
            b.record_stake(dec!(5), now);
        }
        let result = b.size(dec!(0.82), dec!(500), now);
        assert_eq!(result, Err(RiskVeto::TradeCap { max: 20 }));
    }

    #[test]
    fn test_loss_streak_cooldown_and_recovery() {
        let now = Utc::now();
        let mut b = bucket(now);
        for _ in 0..5 {
            b.record_loss(dec!(-5), now);
        }
        assert!(matches!(
            b.size(dec!(0.82), dec!(500), now),
            Err(RiskVeto::Cooldown { .. })
        ));

        // After the cooldown passes the bucket sizes again
        let later = now + Duration::minutes(61);
        assert!(b.size(dec!(0.82), dec!(500), later).is_ok());
    }

    #[test]
    fn test_win_resets_streak() {
        let now = Utc::now();
        let mut b = bucket(now);
        for _ in 0..4 {
            b.record_loss(dec!(-5), now);
        }
        b.record_win(dec!(10), now);
        b.record_loss(dec!(-5), now);
        // Streak is 1, no cooldown
        assert!(b.size(dec!(0.82), dec!(500), now).is_ok());
    }

    #[test]
    fn test_push_leaves_streak() {
        let now = Utc::now();
        let mut b = bucket(now);
        for _ in 0..4 {
            b.record_loss(dec!(-5), now);
        }
        b.record_push(now);
        b.record_loss(dec!(-5), now);
        // Fifth loss in the streak → cooldown
        assert!(matches!(
            b.size(dec!(0.82), dec!(500), now),
            Err(RiskVeto::Cooldown { .. })
        ));
    }

    #[test]
    fn test_circuit_breaker() {
        let now = Utc::now();
        let mut b = bucket(now);
        // 25% daily loss cap of a 500 bankroll is 125
        b.record_loss(dec!(-70), now);
        b.record_win(dec!(5), now);
        b.record_loss(dec!(-60), now);
        assert!(matches!(
            b.size(dec!(0.82), dec!(500), now),
            Err(RiskVeto::CircuitBreaker { .. })
        ));
    }

    #[test]
    fn test_daily_reset_preserves_streak_and_cooldown() {
        // Streak completes just before UTC midnight; the 60 minute cooldown
        // straddles the reset
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 23, 50, 0).single().unwrap();
        let mut b = bucket(now);
        for _ in 0..3 {
            b.record_stake(dec!(5), now);
        }
        for _ in 0..5 {
            b.record_loss(dec!(-5), now);
        }

        // Ten minutes into the new day: counters reset, cooldown active
        let next_day = now + Duration::minutes(20);
        assert!(matches!(
            b.size(dec!(0.82), dec!(500), next_day),
            Err(RiskVeto::Cooldown { .. })
        ));
        let status = b.status(next_day);
        assert_eq!(status.trades_today, 0);
        assert_eq!(status.used_usd, Decimal::ZERO);
        assert_eq!(status.daily_pnl, Decimal::ZERO);
        assert_eq!(status.losses_streak, 5);
    }

    #[test]
    fn test_budget_cap_bounds_stake() {
        let now = Utc::now();
        let mut b = RiskBucket::new(
            BucketName::FiveMin,
            RiskConfig::default().five_min,
            now,
        );
        // 30% of 500 = 150 budget; spend most of it
        b.record_stake(dec!(145), now);
        let stake = b.size(dec!(0.95), dec!(500), now).unwrap();
        assert!(stake <= dec!(5));
        assert!(b.used_usd() + stake <= b.budget_for(dec!(500)));
    }

    #[test]
    fn test_budget_exhausted() {
        let now = Utc::now();
        let mut b = RiskBucket::new(BucketName::FiveMin, RiskConfig::default().five_min, now);
        b.record_stake(dec!(150), now);
        assert_eq!(
            b.size(dec!(0.95), dec!(500), now),
            Err(RiskVeto::BudgetExhausted)
        );
    }

    #[test]
    fn test_reserve_respects_budget_cap() {
        let now = Utc::now();
        let mut b = RiskBucket::new(BucketName::Arb, RiskConfig::default().arb, now);
        // Arb carries a $20/day absolute cap regardless of bankroll
        b.reserve(dec!(10), dec!(500), now).unwrap();
        b.reserve(dec!(10), dec!(500), now).unwrap();
        assert_eq!(
            b.reserve(dec!(10), dec!(500), now),
            Err(RiskVeto::BudgetExhausted)
        );
        assert_eq!(b.used_usd(), dec!(20));
    }

    #[test]
    fn test_no_capital() {
        let now = Utc::now();
        let mut b = bucket(now);
        assert_eq!(b.size(dec!(0.82), dec!(0), now), Err(RiskVeto::NoCapital));
    }
}
