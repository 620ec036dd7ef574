//! Relative Strength Index (RSI), Wilder smoothing of gains and losses.
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss). Lookback: period.
//! avg_loss == 0 → 100; avg_gain == 0 → 0; both zero → 50.

use crate::components::indicator::Indicator;
use crate::domain::Bar;

use super::rolling::wilder;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];
        if n <= self.period {
            return result;
        }

        // changes[k] is the move into bar k + 1
        let changes: Vec<f64> = bars.windows(2).map(|w| w[1].close - w[0].close).collect();
        let gains: Vec<f64> = changes.iter().map(|&c| if c.is_nan() { c } else { c.max(0.0) }).collect();
        let losses: Vec<f64> = changes.iter().map(|&c| if c.is_nan() { c } else { (-c).max(0.0) }).collect();

        let avg_gain = wilder(&gains, self.period);
        let avg_loss = wilder(&losses, self.period);
        for (k, (&g, &l)) in avg_gain.iter().zip(&avg_loss).enumerate() {
            if !g.is_nan() && !l.is_nan() {
                result[k + 1] = rsi_from_averages(g, l);
            }
        }
        result
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
