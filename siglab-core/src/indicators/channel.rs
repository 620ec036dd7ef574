//! Price channel: highest high / lowest low over a trailing window.
//!
//! Used both as the prior N-bar extreme for breakouts and as the swing
//! high/low for retracement levels. Lookback: period - 1.

use crate::components::indicator::Indicator;
use crate::domain::Bar;

use super::rolling::{rolling_extreme, PriceField};

/// Which edge of the channel to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelBand {
    Upper,
    Lower,
}

#[derive(Debug, Clone)]
pub struct Channel {
    period: usize,
    band: ChannelBand,
    name: String,
}

impl Channel {
    pub fn upper(period: usize) -> Self {
        Self::new(period, ChannelBand::Upper)
    }

    pub fn lower(period: usize) -> Self {
        Self::new(period, ChannelBand::Lower)
    }

    fn new(period: usize, band: ChannelBand) -> Self {
        assert!(period >= 1, "channel period must be >= 1");
        Self {
            period,
            band,
            name: channel_key(band, period),
        }
    }
}

/// Indicator key for a channel band.
pub fn channel_key(band: ChannelBand, period: usize) -> String {
    match band {
        ChannelBand::Upper => format!("highest_high_{period}"),
        ChannelBand::Lower => format!("lowest_low_{period}"),
    }
}

impl Indicator for Channel {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        match self.band {
            ChannelBand::Upper => {
                rolling_extreme(&PriceField::High.extract(bars), self.period, true)
            }
            ChannelBand::Lower => {
                rolling_extreme(&PriceField::Low.extract(bars), self.period, false)
            }
        }
    }
}
