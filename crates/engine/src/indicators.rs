//! EMA and MACD computation
//!
//! EMAs are seeded with the first observation (`ema[0] = x[0]`) and then
//! follow `ema[i] = x[i] * alpha + ema[i-1] * (1 - alpha)` with
//! `alpha = 2 / (period + 1)`. `ta::indicators::ExponentialMovingAverage`
//! implements exactly this recursion, so every index carries a value and
//! there is no warm-up window.

use serde::{Deserialize, Serialize};
use ta::indicators::ExponentialMovingAverage;
use ta::Next;
use tracing::warn;

use crate::error::{SimError, SimResult};
use crate::types::{BacktestConfig, IndicatorSeries, PriceSeries};

/// MACD periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacdParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
}

impl From<&BacktestConfig> for MacdParams {
    fn from(config: &BacktestConfig) -> Self {
        Self {
            fast_period: config.fast_period,
            slow_period: config.slow_period,
            signal_period: config.signal_period,
        }
    }
}

impl MacdParams {
    /// Zero periods are rejected. An inverted fast/slow pair is only flagged.
    pub fn validate(&self) -> SimResult<()> {
        for (name, period) in [
            ("fast_period", self.fast_period),
            ("slow_period", self.slow_period),
            ("signal_period", self.signal_period),
        ] {
            if period == 0 {
                return Err(SimError::invalid(name, "must be positive"));
            }
        }
        if self.fast_period >= self.slow_period {
            warn!(
                fast = self.fast_period,
                slow = self.slow_period,
                "MACD fast period is not shorter than slow period"
            );
        }
        Ok(())
    }
}

/// Full-length EMA of `values`
pub fn ema(values: &[f64], period: usize) -> SimResult<Vec<f64>> {
    let mut indicator = ExponentialMovingAverage::new(period)
        .map_err(|_| SimError::invalid("period", "must be positive"))?;
    Ok(values.iter().map(|&v| indicator.next(v)).collect())
}

/// Compute fast/slow EMAs, the MACD line and its signal line
pub fn compute_macd(series: &PriceSeries, params: &MacdParams) -> SimResult<IndicatorSeries> {
    params.validate()?;

    let prices = series.prices();
    let fast_ema = ema(&prices, params.fast_period)?;
    let slow_ema = ema(&prices, params.slow_period)?;
    let macd: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();
    let signal = ema(&macd, params.signal_period)?;

    Ok(IndicatorSeries {
        fast_ema,
        slow_ema,
        macd,
        signal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PricePoint;
    use chrono::{TimeZone, Utc};

    fn series(prices: &[f64]) -> PriceSeries {
        let points = prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint {
                time: Utc.timestamp_opt(i as i64 * 3600, 0).unwrap(),
                price,
            })
            .collect();
        PriceSeries::new(points).unwrap()
    }

    #[test]
    fn test_ema_seeded_with_first_value() {
        // alpha = 2/(3+1) = 0.5
        let out = ema(&[10.0, 11.0, 12.0, 13.0], 3).unwrap();
        let expected = [10.0, 10.5, 11.25, 12.125];
        for (a, b) in out.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12, "{} != {}", a, b);
        }
    }

    #[test]
    fn test_ema_recursion_holds_everywhere() {
        let prices = [100.0, 102.0, 99.5, 101.0, 104.0, 103.0, 98.0];
        let period = 4;
        let alpha = 2.0 / (period as f64 + 1.0);
        let out = ema(&prices, period).unwrap();
        assert_eq!(out[0], prices[0]);
        for i in 1..prices.len() {
            let expected = prices[i] * alpha + out[i - 1] * (1.0 - alpha);
            assert!((out[i] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_macd_lengths_and_definition() {
        let s = series(&[1.0, 2.0, 3.0, 2.5, 2.0, 4.0, 5.0, 4.5]);
        let params = MacdParams {
            fast_period: 2,
            slow_period: 4,
            signal_period: 3,
        };
        let ind = compute_macd(&s, &params).unwrap();
        assert_eq!(ind.fast_ema.len(), s.len());
        assert_eq!(ind.slow_ema.len(), s.len());
        assert_eq!(ind.signal.len(), s.len());
        for i in 0..s.len() {
            assert!((ind.macd[i] - (ind.fast_ema[i] - ind.slow_ema[i])).abs() < 1e-12);
        }
        assert_eq!(ind.macd[0], 0.0);
        assert_eq!(ind.signal[0], ind.macd[0]);
    }

    #[test]
    fn test_zero_period_rejected() {
        let s = series(&[1.0, 2.0]);
        let params = MacdParams {
            fast_period: 0,
            slow_period: 4,
            signal_period: 3,
        };
        let err = compute_macd(&s, &params).unwrap_err();
        assert_eq!(
            err,
            SimError::InvalidParameter {
                name: "fast_period",
                reason: "must be positive".to_string()
            }
        );
    }

    #[test]
    fn test_inverted_periods_allowed() {
        let s = series(&[1.0, 2.0, 3.0]);
        let params = MacdParams {
            fast_period: 26,
            slow_period: 12,
            signal_period: 9,
        };
        assert!(compute_macd(&s, &params).is_ok());
    }
}
