//! Retracement level: proximity of price to a fractional level of the
//! trailing swing range (e.g. the 61.8% pullback).
//!
//! Swing high/low are the highest high and lowest low of the trailing
//! `lookback` bars, current bar included.
//! - `FromHigh`: level = high - level × (high - low)
//! - `FromLow`:  level = low + level × (high - low)
//! Passes when |close - level| <= tolerance × |level|.

use crate::components::indicator::BarContext;
use crate::config::{ConditionKind, RetracementDirection};
use crate::domain::ComponentResult;
use crate::indicators::{channel_key, ChannelBand};

use super::{close_of, warm_value, Condition};

#[derive(Debug, Clone)]
pub struct RetracementLevel {
    name: String,
    pub lookback: usize,
    pub level: f64,
    pub tolerance: f64,
    pub direction: RetracementDirection,
    high_key: String,
    low_key: String,
}

impl RetracementLevel {
    pub fn new(
        name: impl Into<String>,
        lookback: usize,
        level: f64,
        tolerance: f64,
        direction: RetracementDirection,
    ) -> Self {
        assert!(lookback >= 2, "lookback must be >= 2");
        assert!((0.0..=1.0).contains(&level), "level must be within [0, 1]");
        assert!((0.0..=1.0).contains(&tolerance), "tolerance must be within [0, 1]");
        Self {
            name: name.into(),
            lookback,
            level,
            tolerance,
            direction,
            high_key: channel_key(ChannelBand::Upper, lookback),
            low_key: channel_key(ChannelBand::Lower, lookback),
        }
    }

    /// Price of the retracement level for a given swing.
    pub fn level_price(&self, swing_high: f64, swing_low: f64) -> f64 {
        let range = swing_high - swing_low;
        match self.direction {
            RetracementDirection::FromHigh => swing_high - self.level * range,
            RetracementDirection::FromLow => swing_low + self.level * range,
        }
    }
}

impl Condition for RetracementLevel {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConditionKind {
        ConditionKind::RetracementLevel
    }

    fn warmup_bars(&self) -> usize {
        self.lookback - 1
    }

    fn evaluate(&mut self, ctx: &BarContext<'_>) -> ComponentResult {
        let swing = warm_value(ctx, &self.high_key, 0).and_then(|high| {
            let low = warm_value(ctx, &self.low_key, 0)?;
            Ok((high, low, close_of(ctx)?))
        });
        let (high, low, close) = match swing {
            Ok(s) => s,
            Err(detail) => return ComponentResult::insufficient_data(&self.name, detail),
        };

        let level = self.level_price(high, low);
        let band = self.tolerance * level.abs();
        let distance = (close - level).abs();
        let pct = self.level * 100.0;
        if distance <= band {
            ComponentResult::passed(
                &self.name,
                level,
                format!("close {close:.4} within {band:.4} of {pct:.1}% level {level:.4}"),
            )
        } else {
            ComponentResult::failed(
                &self.name,
                level,
                format!("close {close:.4} is {distance:.4} from {pct:.1}% level {level:.4}"),
            )
        }
    }
}
