//! Built-in indicators.
//!
//! Every indicator implements `Indicator` from `components::indicator` and is
//! precomputed once before the bar loop. Conditions read the results by key
//! through `BarContext`.

pub mod atr;
pub mod channel;
pub mod moving_average;
pub mod rolling;
pub mod roc;
pub mod rsi;

pub use atr::Atr;
pub use channel::{channel_key, Channel, ChannelBand};
pub use moving_average::MovingAverage;
pub use roc::Roc;
pub use rolling::PriceField;
pub use rsi::Rsi;

/// Synthetic bars from close prices: open = previous close,
/// high/low = max/min(open, close) ± 1, volume = 1000, one bar per day.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<crate::domain::Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            crate::domain::Bar {
                timestamp: i as i64 * 86_400_000_000_000,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Bars from explicit (open, high, low, close) tuples.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<crate::domain::Bar> {
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| crate::domain::Bar {
            timestamp: i as i64 * 86_400_000_000_000,
            open,
            high,
            low,
            close,
            volume: 1000.0,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
