//! Average True Range (ATR) with Wilder smoothing.
//!
//! TR[0] = high - low; TR[t] = max(high-low, |high-prev_close|, |low-prev_close|).
//! Lookback: period - 1 (the seed uses TR[0..period]).

use crate::components::indicator::Indicator;
use crate::domain::Bar;

use super::rolling::wilder;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

/// True Range series. NaN wherever an input is NaN.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                None => range,
                // f64::max ignores NaN, so check explicitly
                Some(pc) if pc.is_nan() || range.is_nan() => f64::NAN,
                Some(pc) => range.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
            }
        })
        .collect()
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        wilder(&true_range(bars), self.period)
    }
}
