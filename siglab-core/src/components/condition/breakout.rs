//! Breakout: close beyond the extreme of the previous N bars.
//!
//! The channel is read one bar back so the current bar's own high/low never
//! counts as the level it has to break.

use crate::components::indicator::BarContext;
use crate::config::{BreakoutDirection, ConditionKind};
use crate::domain::ComponentResult;
use crate::indicators::{channel_key, ChannelBand};

use super::{close_of, warm_value, Condition};

#[derive(Debug, Clone)]
pub struct Breakout {
    name: String,
    pub lookback: usize,
    pub direction: BreakoutDirection,
    indicator_key: String,
}

impl Breakout {
    pub fn new(name: impl Into<String>, lookback: usize, direction: BreakoutDirection) -> Self {
        assert!(lookback >= 1, "lookback must be >= 1");
        let band = match direction {
            BreakoutDirection::Up => ChannelBand::Upper,
            BreakoutDirection::Down => ChannelBand::Lower,
        };
        Self {
            name: name.into(),
            lookback,
            direction,
            indicator_key: channel_key(band, lookback),
        }
    }

    pub fn indicator_key(&self) -> &str {
        &self.indicator_key
    }
}

impl Condition for Breakout {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConditionKind {
        ConditionKind::Breakout
    }

    fn warmup_bars(&self) -> usize {
        self.lookback
    }

    fn evaluate(&mut self, ctx: &BarContext<'_>) -> ComponentResult {
        if ctx.bar_index() == 0 {
            return ComponentResult::insufficient_data(&self.name, "no prior bars");
        }
        let reading = warm_value(ctx, &self.indicator_key, 1)
            .and_then(|level| close_of(ctx).map(|close| (level, close)));
        let (level, close) = match reading {
            Ok(pair) => pair,
            Err(detail) => return ComponentResult::insufficient_data(&self.name, detail),
        };

        let n = self.lookback;
        match self.direction {
            BreakoutDirection::Up if close > level => ComponentResult::passed(
                &self.name,
                level,
                format!("close {close:.4} > {n}-bar high {level:.4}"),
            ),
            BreakoutDirection::Up => ComponentResult::failed(
                &self.name,
                level,
                format!("close {close:.4} <= {n}-bar high {level:.4}"),
            ),
            BreakoutDirection::Down if close < level => ComponentResult::passed(
                &self.name,
                level,
                format!("close {close:.4} < {n}-bar low {level:.4}"),
            ),
            BreakoutDirection::Down => ComponentResult::failed(
                &self.name,
                level,
                format!("close {close:.4} >= {n}-bar low {level:.4}"),
            ),
        }
    }
}
