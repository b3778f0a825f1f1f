//! Technical indicators
//!
//! Plain f64 math over candle closes; decimal conversion happens at the
//! engine boundary.

use crate::feed::Candle;

/// Exponential moving average series
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    if data.len() < period || period == 0 {
        let mean = data.iter().sum::<f64>() / data.len() as f64;
        return vec![mean; data.len()];
    }
    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = data[..period].iter().sum::<f64>() / period as f64;
    let mut values = Vec::with_capacity(data.len() - period + 1);
    values.push(seed);
    for price in &data[period..] {
        let prev = values[values.len() - 1];
        values.push(price * multiplier + prev * (1.0 - multiplier));
    }
    values
}

/// Wilder's RSI over the close series, neutral 50 when history is short
pub fn rsi(closes: &[f64], period: usize) -> f64 {
    if closes.len() < period + 1 || period == 0 {
        return 50.0;
    }
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let gains: Vec<f64> = deltas.iter().map(|d| d.max(0.0)).collect();
    let losses: Vec<f64> = deltas.iter().map(|d| (-d).max(0.0)).collect();

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    for i in period..deltas.len() {
        avg_gain = (avg_gain * (period as f64 - 1.0) + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + losses[i]) / period as f64;
    }

    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
}

/// MACD line, signal line, histogram
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> (f64, f64, f64) {
    if closes.len() < slow + signal {
        return (0.0, 0.0, 0.0);
    }
    let ema_fast = ema(closes, fast);
    let ema_slow = ema(closes, slow);
    let len = ema_fast.len().min(ema_slow.len());
    let macd_line: Vec<f64> = (0..len)
        .map(|i| ema_fast[ema_fast.len() - len + i] - ema_slow[ema_slow.len() - len + i])
        .collect();
    if macd_line.len() < signal {
        let last = macd_line.last().copied().unwrap_or(0.0);
        return (last, 0.0, 0.0);
    }
    let signal_series = ema(&macd_line, signal);
    let macd_last = macd_line[macd_line.len() - 1];
    let signal_last = signal_series[signal_series.len() - 1];
    (macd_last, signal_last, macd_last - signal_last)
}

/// Close-to-close percent change over the last `lookback` candles
pub fn momentum_pct(closes: &[f64], lookback: usize) -> f64 {
    if closes.len() < lookback + 1 || lookback == 0 {
        return 0.0;
    }
    let current = closes[closes.len() - 1];
    let past = closes[closes.len() - 1 - lookback];
    if past == 0.0 {
        return 0.0;
    }
    (current - past) / past * 100.0
}

/// Standard deviation of close-to-close percent returns
pub fn volatility_pct(candles: &[Candle]) -> f64 {
    if candles.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = candles
        .windows(2)
        .filter(|w| w[0].close != 0.0)
        .map(|w| (w[1].close - w[0].close) / w[0].close * 100.0)
        .collect();
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}
