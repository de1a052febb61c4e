//! Synthetic market data
//!
//! Geometric random walk driven by a seeded PRNG, standing in for real
//! exchange klines. The same parameters always produce the same series.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::types::{BacktestConfig, PricePoint, PriceSeries};

/// 2024-01-01T00:00:00Z, first bar of every synthetic series
pub const SERIES_EPOCH_SECS: i64 = 1_704_067_200;

/// Upper bound on generated bars
pub const MAX_LENGTH: usize = 1_000_000;

/// Parameters for a synthetic price path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSeriesConfig {
    pub seed: u64,
    pub length: usize,
    pub start_price: f64,
    pub drift_scale: f64,
    pub bar_interval_secs: i64,
}

impl From<&BacktestConfig> for SyntheticSeriesConfig {
    fn from(config: &BacktestConfig) -> Self {
        Self {
            seed: config.seed,
            length: config.length,
            start_price: config.start_price,
            drift_scale: config.drift_scale,
            bar_interval_secs: config.bar_interval_secs,
        }
    }
}

impl SyntheticSeriesConfig {
    pub fn validate(&self) -> SimResult<()> {
        if self.length == 0 {
            return Err(SimError::invalid("length", "must be positive"));
        }
        if self.length > MAX_LENGTH {
            return Err(SimError::invalid(
                "length",
                format!("must not exceed {}, got {}", MAX_LENGTH, self.length),
            ));
        }
        if !self.start_price.is_finite() || self.start_price <= 0.0 {
            return Err(SimError::invalid(
                "start_price",
                format!("must be a positive number, got {}", self.start_price),
            ));
        }
        if !self.drift_scale.is_finite() || self.drift_scale < 0.0 {
            return Err(SimError::invalid(
                "drift_scale",
                format!("must be a non-negative number, got {}", self.drift_scale),
            ));
        }
        if self.bar_interval_secs <= 0 {
            return Err(SimError::invalid("bar_interval_secs", "must be positive"));
        }
        Ok(())
    }
}

fn series_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(SERIES_EPOCH_SECS, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Generate a reproducible price series: `price[i] = price[i-1] * (1 + shock)`
/// with `shock ~ N(0, drift_scale)`.
pub fn generate_price_series(config: &SyntheticSeriesConfig) -> SimResult<PriceSeries> {
    config.validate()?;

    let normal = Normal::new(0.0, config.drift_scale)
        .map_err(|e| SimError::invalid("drift_scale", e.to_string()))?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let epoch = series_epoch();
    let step = Duration::seconds(config.bar_interval_secs);

    let mut points = Vec::with_capacity(config.length);
    let mut price = config.start_price;
    let mut time = epoch;

    for i in 0..config.length {
        if i > 0 {
            let shock: f64 = normal.sample(&mut rng);
            price *= 1.0 + shock;
            time += step;
        }
        points.push(PricePoint { time, price });
    }

    debug!(
        seed = config.seed,
        bars = points.len(),
        first = config.start_price,
        last = price,
        "Generated synthetic price series"
    );

    PriceSeries::new(points)
}
