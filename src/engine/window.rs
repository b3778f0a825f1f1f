//! Windows and wall-clock boundaries
//!
//! Boundaries are UTC minutes divisible by the timeframe. Boundary math
//! always starts from a freshly read UTC clock; nothing accumulates
//! monotonic deltas.

use crate::market::Timeframe;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Globally unique window identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId {
    pub timeframe: Timeframe,
    /// Unix seconds of the window open
    pub open_ts: i64,
}

impl WindowId {
    pub fn new(timeframe: Timeframe, open_ts: i64) -> Self {
        Self { timeframe, open_ts }
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.timeframe, self.open_ts)
    }
}

impl std::str::FromStr for WindowId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, ts) = s.split_once('@').ok_or(())?;
        let timeframe = Timeframe::from_label(label).ok_or(())?;
        let open_ts = ts.parse().map_err(|_| ())?;
        Ok(WindowId { timeframe, open_ts })
    }
}

/// Why a window produced no order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No fresh oracle tick at anchor time
    NoAnchor,
    /// Shared boundary yielded to the slower lane
    Overlap,
    /// Signal held or confidence too low
    Signal,
    /// Risk bucket vetoed the stake
    Risk,
    /// Order submission failed or timed out
    Execution,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoAnchor => "no_anchor",
            SkipReason::Overlap => "overlap",
            SkipReason::Signal => "signal",
            SkipReason::Risk => "risk",
            SkipReason::Execution => "execution",
        }
    }
}

/// Window lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Pending,
    Anchored,
    Evaluated,
    Ordered,
    Resolved,
    Skipped(SkipReason),
}

/// One market window as the scheduler tracks it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Window {
    pub id: WindowId,
    pub open_ts: DateTime<Utc>,
    pub close_ts: DateTime<Utc>,
    pub anchor_price: Option<Decimal>,
    pub anchor_ts: Option<DateTime<Utc>>,
    pub state: WindowState,
}

impl Window {
    /// Create a pending window opening at the given boundary
    pub fn at_boundary(timeframe: Timeframe, boundary: DateTime<Utc>) -> Self {
        let open_ts = boundary;
        let close_ts = boundary + chrono::Duration::seconds(timeframe.secs());
        Self {
            id: WindowId::new(timeframe, boundary.timestamp()),
            open_ts,
            close_ts,
            anchor_price: None,
            anchor_ts: None,
            state: WindowState::Pending,
        }
    }

    /// Record the anchor; legal exactly once, out of Pending
    pub fn anchor(&mut self, price: Decimal, ts: DateTime<Utc>) {
        debug_assert_eq!(self.state, WindowState::Pending);
        if self.state == WindowState::Pending {
            self.anchor_price = Some(price);
            self.anchor_ts = Some(ts);
            self.state = WindowState::Anchored;
        }
    }

    pub fn mark_evaluated(&mut self) {
        self.state = WindowState::Evaluated;
    }

    pub fn mark_ordered(&mut self) {
        self.state = WindowState::Ordered;
    }

    pub fn mark_resolved(&mut self) {
        self.state = WindowState::Resolved;
    }

    pub fn skip(&mut self, reason: SkipReason) {
        self.state = WindowState::Skipped(reason);
    }
}

/// Next boundary strictly after `now` for this timeframe
pub fn next_boundary(now: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let secs = timeframe.secs();
    let ts = (now.timestamp() / secs + 1) * secs;
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or_else(|| now + chrono::Duration::seconds(secs))
}

/// Boundary the instant `now` is inside
pub fn current_boundary(now: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let secs = timeframe.secs();
    let ts = (now.timestamp() / secs) * secs;
    Utc.timestamp_opt(ts, 0).single().unwrap_or(now)
}

/// True when a boundary is shared with the 15-minute grid.
///
/// At shared boundaries the 5m lane yields: {:05 :10 :20 :25 :35 :40 :50 :55}
/// are its own, {:00 :15 :30 :45} belong to the 15m lane.
pub fn shared_with_15m(boundary: DateTime<Utc>) -> bool {
    (boundary.timestamp() / 60) % 15 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).single().unwrap()
    }

    #[test]
    fn test_next_boundary_15m() {
        assert_eq!(next_boundary(at(14, 7, 30), Timeframe::M15), at(14, 15, 0));
        assert_eq!(next_boundary(at(14, 15, 0), Timeframe::M15), at(14, 30, 0));
        assert_eq!(next_boundary(at(23, 59, 59), Timeframe::M15), at(0, 0, 0) + chrono::Duration::days(1));
    }

    #[test]
    fn test_next_boundary_5m() {
        assert_eq!(next_boundary(at(14, 7, 30), Timeframe::M5), at(14, 10, 0));
        assert_eq!(next_boundary(at(14, 10, 0), Timeframe::M5), at(14, 15, 0));
    }

    #[test]
    fn test_current_boundary() {
        assert_eq!(current_boundary(at(14, 7, 30), Timeframe::M15), at(14, 0, 0));
        assert_eq!(current_boundary(at(14, 17, 0), Timeframe::M5), at(14, 15, 0));
    }

    #[test]
    fn test_shared_boundaries() {
        // The 5m boundaries in one hour
        let own = [5u32, 10, 20, 25, 35, 40, 50, 55];
        let shared = [0u32, 15, 30, 45];
        for m in own {
            assert!(!shared_with_15m(at(14, m, 0)), "minute {m} should be own");
        }
        for m in shared {
            assert!(shared_with_15m(at(14, m, 0)), "minute {m} should be shared");
        }
    }

    #[test]
    fn test_window_id_unique_by_timeframe_and_open() {
        let a = WindowId::new(Timeframe::M15, 1_771_591_500);
        let b = WindowId::new(Timeframe::M5, 1_771_591_500);
        let c = WindowId::new(Timeframe::M15, 1_771_592_400);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "15m@1771591500");
    }

    #[test]
    fn test_window_id_round_trips_through_display() {
        let id = WindowId::new(Timeframe::M5, 1_771_591_500);
        let parsed: WindowId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("junk".parse::<WindowId>().is_err());
    }

    #[test]
    fn test_anchor_transitions_once() {
        let mut w = Window::at_boundary(Timeframe::M15, at(14, 15, 0));
        assert_eq!(w.state, WindowState::Pending);
        assert!(w.anchor_price.is_none());

        w.anchor(dec!(60000), at(14, 14, 0));
        assert_eq!(w.state, WindowState::Anchored);
        assert_eq!(w.anchor_price, Some(dec!(60000)));
    }

    #[test]
    fn test_window_close_matches_timeframe() {
        let w = Window::at_boundary(Timeframe::M5, at(14, 20, 0));
        assert_eq!(w.close_ts - w.open_ts, chrono::Duration::minutes(5));
    }

    #[test]
    fn test_skip_reason_strings() {
        assert_eq!(SkipReason::Overlap.as_str(), "overlap");
        assert_eq!(SkipReason::NoAnchor.as_str(), "no_anchor");
    }
}
