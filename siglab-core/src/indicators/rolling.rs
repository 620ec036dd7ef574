//! Series primitives shared by the indicators.
//!
//! All helpers take a plain `&[f64]` and return a series of the same length.
//! Warm-up positions and any window touching a NaN input are NaN.

use crate::domain::Bar;

/// Which bar field a series is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Close,
    High,
    Low,
    Volume,
}

impl PriceField {
    pub fn extract(&self, bars: &[Bar]) -> Vec<f64> {
        bars.iter()
            .map(|b| match self {
                Self::Close => b.close,
                Self::High => b.high,
                Self::Low => b.low,
                Self::Volume => b.volume,
            })
            .collect()
    }
}

/// Rolling arithmetic mean. First valid value at index `period - 1`.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            nan_count += 1;
        } else {
            sum += v;
        }
        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }
        if i + 1 >= period && nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }
    result
}

/// Exponential moving average, alpha = 2 / (period + 1), seeded with the
/// mean of the first `period` values. A NaN input taints everything after it.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    recursive_smooth(values, period, 2.0 / (period as f64 + 1.0))
}

/// Wilder smoothing, alpha = 1 / period, same seeding as `ema`.
pub fn wilder(values: &[f64], period: usize) -> Vec<f64> {
    recursive_smooth(values, period, 1.0 / period as f64)
}

fn recursive_smooth(values: &[f64], period: usize, alpha: f64) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let seed_window = &values[..period];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let mut prev = seed_window.iter().sum::<f64>() / period as f64;
    result[period - 1] = prev;

    for i in period..n {
        if values[i].is_nan() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

/// Rolling maximum or minimum over `period` values ending at each index.
pub fn rolling_extreme(values: &[f64], period: usize, take_max: bool) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = if take_max {
            window.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        } else {
            window.iter().copied().fold(f64::INFINITY, f64::min)
        };
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn rolling_mean_basic() {
        let r = rolling_mean(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0], 5);
        assert!(r[..4].iter().all(|v| v.is_nan()));
        assert_approx(r[4], 12.0, DEFAULT_EPSILON);
        assert_approx(r[5], 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rolling_mean_nan_window() {
        let r = rolling_mean(&[10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0], 3);
        assert!(r[2].is_nan());
        assert!(r[3].is_nan());
        assert!(r[4].is_nan());
        assert_approx(r[5], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_period_1_is_identity() {
        let r = ema(&[5.0, 6.0, 7.0], 1);
        assert_eq!(r, vec![5.0, 6.0, 7.0]);
    }

    #[test]
    fn ema_seed_and_step() {
        // seed = mean(1,2,3) = 2; alpha = 0.5; next = 0.5*4 + 0.5*2 = 3
        let r = ema(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_approx(r[2], 2.0, DEFAULT_EPSILON);
        assert_approx(r[3], 3.0, DEFAULT_EPSILON);
    }

    #[test]
    fn wilder_step() {
        // seed = mean(2,4) = 3; alpha = 0.5; next = 0.5*5 + 0.5*3 = 4
        let r = wilder(&[2.0, 4.0, 5.0], 2);
        assert_approx(r[2], 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn nan_taints_recursive_tail() {
        let r = ema(&[1.0, 2.0, f64::NAN, 4.0], 2);
        assert_approx(r[1], 1.5, DEFAULT_EPSILON);
        assert!(r[2].is_nan());
        assert!(r[3].is_nan());
    }

    #[test]
    fn rolling_extremes() {
        let v = [3.0, 1.0, 4.0, 1.0, 5.0];
        let hi = rolling_extreme(&v, 3, true);
        let lo = rolling_extreme(&v, 3, false);
        assert!(hi[1].is_nan());
        assert_eq!(&hi[2..], &[4.0, 4.0, 5.0]);
        assert_eq!(&lo[2..], &[1.0, 1.0, 1.0]);
    }
}
