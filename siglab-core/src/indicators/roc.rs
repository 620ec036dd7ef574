//! Rate of Change (ROC).
//!
//! ROC[t] = (close[t] - close[t-period]) / close[t-period] * 100
//! Lookback: period.

use crate::components::indicator::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
    name: String,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ROC period must be >= 1");
        Self {
            period,
            name: format!("roc_{period}"),
        }
    }
}

impl Indicator for Roc {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];
        let Some(width) = self.period.checked_add(1) else {
            return result;
        };
        for (i, pair) in bars.windows(width).enumerate() {
            let prev = pair[0].close;
            let curr = pair[self.period].close;
            if prev != 0.0 && !prev.is_nan() && !curr.is_nan() {
                result[i + self.period] = (curr - prev) / prev * 100.0;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    #[test]
    fn roc_one_bar() {
        let bars = make_bars(&[100.0, 110.0, 121.0]);
        let result = Roc::new(1).compute(&bars);
        assert!(result[0].is_nan());
        assert_approx(result[1], 10.0, DEFAULT_EPSILON);
        assert_approx(result[2], 10.0, DEFAULT_EPSILON);
    }

    #[test]
    fn roc_huge_period_is_all_nan() {
        let bars = make_bars(&[100.0, 110.0, 121.0]);
        assert!(Roc::new(usize::MAX).compute(&bars).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn roc_zero_base_is_nan() {
        let bars = make_bars(&[0.0, 10.0]);
        assert!(Roc::new(1).compute(&bars)[1].is_nan());
    }
}
