//! Trend filter: price relative to a moving average.
//!
//! Passes when the close is on the configured side of the average
//! (`Above`: close >= MA, `Below`: close <= MA).

use crate::components::indicator::BarContext;
use crate::config::{ConditionKind, MaKind, TrendSide};
use crate::domain::ComponentResult;

use super::{close_of, warm_value, Condition};

#[derive(Debug, Clone)]
pub struct TrendFilter {
    name: String,
    pub period: usize,
    pub side: TrendSide,
    indicator_key: String,
}

impl TrendFilter {
    pub fn new(name: impl Into<String>, period: usize, ma: MaKind, side: TrendSide) -> Self {
        assert!(period >= 1, "period must be >= 1");
        let prefix = match ma {
            MaKind::Sma => "sma",
            MaKind::Ema => "ema",
        };
        Self {
            name: name.into(),
            period,
            side,
            indicator_key: format!("{prefix}_{period}"),
        }
    }

    pub fn indicator_key(&self) -> &str {
        &self.indicator_key
    }
}

impl Condition for TrendFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ConditionKind {
        ConditionKind::TrendFilter
    }

    fn warmup_bars(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn evaluate(&mut self, ctx: &BarContext<'_>) -> ComponentResult {
        let reading = warm_value(ctx, &self.indicator_key, 0)
            .and_then(|ma| close_of(ctx).map(|close| (ma, close)));
        let (ma, close) = match reading {
            Ok(pair) => pair,
            Err(detail) => return ComponentResult::insufficient_data(&self.name, detail),
        };

        let key = &self.indicator_key;
        match self.side {
            TrendSide::Above if close >= ma => {
                ComponentResult::passed(&self.name, ma, format!("close {close:.4} >= {key} {ma:.4}"))
            }
            TrendSide::Above => {
                ComponentResult::failed(&self.name, ma, format!("close {close:.4} < {key} {ma:.4}"))
            }
            TrendSide::Below if close <= ma => {
                ComponentResult::passed(&self.name, ma, format!("close {close:.4} <= {key} {ma:.4}"))
            }
            TrendSide::Below => {
                ComponentResult::failed(&self.name, ma, format!("close {close:.4} > {key} {ma:.4}"))
            }
        }
    }
}
