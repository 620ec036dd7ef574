//! Moving averages over a bar field: SMA/EMA of close, SMA of volume.
//!
//! Lookback: period - 1.

use crate::components::indicator::Indicator;
use crate::config::MaKind;
use crate::domain::Bar;

use super::rolling::{ema, rolling_mean, PriceField};

#[derive(Debug, Clone)]
pub struct MovingAverage {
    kind: MaKind,
    field: PriceField,
    period: usize,
    name: String,
}

impl MovingAverage {
    pub fn sma(period: usize) -> Self {
        Self::new(MaKind::Sma, PriceField::Close, period, format!("sma_{period}"))
    }

    pub fn ema(period: usize) -> Self {
        Self::new(MaKind::Ema, PriceField::Close, period, format!("ema_{period}"))
    }

    pub fn of_close(kind: MaKind, period: usize) -> Self {
        match kind {
            MaKind::Sma => Self::sma(period),
            MaKind::Ema => Self::ema(period),
        }
    }

    /// Simple average of volume.
    pub fn volume(period: usize) -> Self {
        Self::new(
            MaKind::Sma,
            PriceField::Volume,
            period,
            format!("volume_sma_{period}"),
        )
    }

    fn new(kind: MaKind, field: PriceField, period: usize, name: String) -> Self {
        assert!(period >= 1, "moving average period must be >= 1");
        Self {
            kind,
            field,
            period,
            name,
        }
    }
}

impl Indicator for MovingAverage {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let values = self.field.extract(bars);
        match self.kind {
            MaKind::Sma => rolling_mean(&values, self.period),
            MaKind::Ema => ema(&values, self.period),
        }
    }
}
