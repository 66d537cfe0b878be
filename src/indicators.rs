//! Technical indicators over candle sequences.
//!
//! Pure functions returning the final value (or a small tuple) of each
//! indicator; callers that need a series chain over suffixes. Conventions
//! follow the mainland retail terminals: RSI uses Wilder smoothing, KDJ is
//! the (9,3,3) recursion with RSV pinned to 50 on a zero-range window, and
//! the MACD bar is 2x(DIF-DEA). Outputs are rounded to two decimals.

use crate::models::Candle;

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Simple moving average of the last `n` closes.
pub fn ma(candles: &[Candle], n: usize) -> Option<f64> {
    if n == 0 || candles.len() < n {
        return None;
    }
    let closes = closes(candles);
    let sum: f64 = closes[closes.len() - n..].iter().sum();
    Some(round2(sum / n as f64))
}

fn ema_series(values: &[f64], n: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let k = 2.0 / (n as f64 + 1.0);
    let mut prev = match values.first() {
        Some(v) => *v,
        None => return out,
    };
    out.push(prev);
    for v in &values[1..] {
        prev = v * k + prev * (1.0 - k);
        out.push(prev);
    }
    out
}

/// Exponential moving average, seeded with the first close.
pub fn ema(candles: &[Candle], n: usize) -> Option<f64> {
    if n == 0 || candles.len() < n {
        return None;
    }
    ema_series(&closes(candles), n).last().copied().map(round2)
}

/// Relative strength index with Wilder smoothing.
pub fn rsi(candles: &[Candle], n: usize) -> Option<f64> {
    if n == 0 || candles.len() < n + 1 {
        return None;
    }
    let closes = closes(candles);
    let diffs: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = diffs[..n].iter().filter(|d| **d > 0.0).sum::<f64>() / n as f64;
    let mut avg_loss = diffs[..n].iter().filter(|d| **d < 0.0).map(|d| -d).sum::<f64>() / n as f64;
    for d in &diffs[n..] {
        let gain = d.max(0.0);
        let loss = (-d).max(0.0);
        avg_gain = (avg_gain * (n as f64 - 1.0) + gain) / n as f64;
        avg_loss = (avg_loss * (n as f64 - 1.0) + loss) / n as f64;
    }
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(round2(100.0 - 100.0 / (1.0 + rs)))
}

/// MACD (12, 26, 9): returns (DIF, DEA, bar) where bar = 2x(DIF-DEA).
pub fn macd(candles: &[Candle]) -> Option<(f64, f64, f64)> {
    const FAST: usize = 12;
    const SLOW: usize = 26;
    const SIGNAL: usize = 9;
    if candles.len() < SLOW + SIGNAL {
        return None;
    }
    let closes = closes(candles);
    let fast = ema_series(&closes, FAST);
    let slow = ema_series(&closes, SLOW);
    let dif: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let dea = ema_series(&dif, SIGNAL);
    let d = *dif.last()?;
    let e = *dea.last()?;
    Some((round3(d), round3(e), round3((d - e) * 2.0)))
}

/// KDJ (9, 3, 3). RSV defaults to 50 when the window range is zero; K and D
/// start at 50 and follow the Wilder-style 2/3 + 1/3 recursion.
pub fn kdj(candles: &[Candle]) -> Option<(f64, f64, f64)> {
    const WINDOW: usize = 9;
    if candles.len() < WINDOW {
        return None;
    }
    let mut k = 50.0;
    let mut d = 50.0;
    for end in WINDOW..=candles.len() {
        let window = &candles[end - WINDOW..end];
        let high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let close = window[WINDOW - 1].close;
        let rsv = if high > low { (close - low) / (high - low) * 100.0 } else { 50.0 };
        k = k * 2.0 / 3.0 + rsv / 3.0;
        d = d * 2.0 / 3.0 + k / 3.0;
    }
    let j = 3.0 * k - 2.0 * d;
    Some((round2(k), round2(d), round2(j)))
}

/// BRAR (26): returns (BR, AR).
pub fn brar(candles: &[Candle]) -> Option<(f64, f64)> {
    const WINDOW: usize = 26;
    if candles.len() < WINDOW + 1 {
        return None;
    }
    let tail = &candles[candles.len() - WINDOW - 1..];
    let mut ar_up = 0.0;
    let mut ar_down = 0.0;
    let mut br_up = 0.0;
    let mut br_down = 0.0;
    for pair in tail.windows(2) {
        let prev_close = pair[0].close;
        let c = &pair[1];
        ar_up += c.high - c.open;
        ar_down += c.open - c.low;
        br_up += (c.high - prev_close).max(0.0);
        br_down += (prev_close - c.low).max(0.0);
    }
    let ar = if ar_down > 0.0 { ar_up / ar_down * 100.0 } else { 0.0 };
    let br = if br_down > 0.0 { br_up / br_down * 100.0 } else { 0.0 };
    Some((round2(br), round2(ar)))
}

/// DMI (14): returns (+DI, -DI, ADX). ADX is the plain mean of DX over the
/// window rather than a second Wilder pass.
pub fn dmi(candles: &[Candle]) -> Option<(f64, f64, f64)> {
    const WINDOW: usize = 14;
    // DX needs a window per point, plus WINDOW points of DX for the ADX mean.
    if candles.len() < 2 * WINDOW + 1 {
        return None;
    }

    let di_at = |end: usize| -> Option<(f64, f64)> {
        let slice = &candles[end - WINDOW - 1..end];
        let mut tr_sum = 0.0;
        let mut plus_dm = 0.0;
        let mut minus_dm = 0.0;
        for pair in slice.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            let tr = (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs());
            tr_sum += tr;
            let up = cur.high - prev.high;
            let down = prev.low - cur.low;
            if up > down && up > 0.0 {
                plus_dm += up;
            }
            if down > up && down > 0.0 {
                minus_dm += down;
            }
        }
        if tr_sum <= 0.0 {
            return None;
        }
        Some((plus_dm / tr_sum * 100.0, minus_dm / tr_sum * 100.0))
    };

    let mut dx_values = Vec::with_capacity(WINDOW);
    for end in candles.len() - WINDOW + 1..=candles.len() {
        let (pdi, mdi) = di_at(end)?;
        let denom = pdi + mdi;
        dx_values.push(if denom > 0.0 { (pdi - mdi).abs() / denom * 100.0 } else { 0.0 });
    }
    let (pdi, mdi) = di_at(candles.len())?;
    let adx = dx_values.iter().sum::<f64>() / dx_values.len() as f64;
    Some((round2(pdi), round2(mdi), round2(adx)))
}

/// CR (26) over the previous bar's midpoint.
pub fn cr(candles: &[Candle]) -> Option<f64> {
    const WINDOW: usize = 26;
    if candles.len() < WINDOW + 1 {
        return None;
    }
    let tail = &candles[candles.len() - WINDOW - 1..];
    let mut up = 0.0;
    let mut down = 0.0;
    for pair in tail.windows(2) {
        let mid = (pair[0].high + pair[0].low) / 2.0;
        up += (pair[1].high - mid).max(0.0);
        down += (mid - pair[1].low).max(0.0);
    }
    if down > 0.0 {
        Some(round2(up / down * 100.0))
    } else {
        None
    }
}

fn psy_at(candles: &[Candle], end: usize, n: usize) -> f64 {
    let slice = &candles[end - n - 1..end];
    let ups = slice.windows(2).filter(|w| w[1].close > w[0].close).count();
    ups as f64 / n as f64 * 100.0
}

/// PSY (12) with its 6-period mean: returns (PSY, PSYMA).
pub fn psy(candles: &[Candle]) -> Option<(f64, f64)> {
    const WINDOW: usize = 12;
    const MA_WINDOW: usize = 6;
    if candles.len() < WINDOW + MA_WINDOW {
        return None;
    }
    let latest = psy_at(candles, candles.len(), WINDOW);
    let mean = (0..MA_WINDOW)
        .map(|i| psy_at(candles, candles.len() - i, WINDOW))
        .sum::<f64>()
        / MA_WINDOW as f64;
    Some((round2(latest), round2(mean)))
}

fn ma_at(closes: &[f64], end: usize, n: usize) -> f64 {
    closes[end - n..end].iter().sum::<f64>() / n as f64
}

/// DMA (10, 50, 10): returns (DIF, AMA).
pub fn dma(candles: &[Candle]) -> Option<(f64, f64)> {
    const SHORT: usize = 10;
    const LONG: usize = 50;
    const SMOOTH: usize = 10;
    if candles.len() < LONG + SMOOTH - 1 {
        return None;
    }
    let closes = closes(candles);
    let dif_at = |end: usize| ma_at(&closes, end, SHORT) - ma_at(&closes, end, LONG);
    let dif = dif_at(closes.len());
    let ama = (0..SMOOTH).map(|i| dif_at(closes.len() - i)).sum::<f64>() / SMOOTH as f64;
    Some((round3(dif), round3(ama)))
}

/// TRIX (12, 9): returns (TRIX, MATRIX).
pub fn trix(candles: &[Candle]) -> Option<(f64, f64)> {
    const N: usize = 12;
    const M: usize = 9;
    if candles.len() < N + M + 1 {
        return None;
    }
    let closes = closes(candles);
    let tr = ema_series(&ema_series(&ema_series(&closes, N), N), N);
    let mut trix_series = Vec::with_capacity(tr.len().saturating_sub(1));
    for pair in tr.windows(2) {
        if pair[0] != 0.0 {
            trix_series.push((pair[1] - pair[0]) / pair[0] * 100.0);
        } else {
            trix_series.push(0.0);
        }
    }
    if trix_series.len() < M {
        return None;
    }
    let latest = *trix_series.last()?;
    let matrix = trix_series[trix_series.len() - M..].iter().sum::<f64>() / M as f64;
    Some((round3(latest), round3(matrix)))
}
