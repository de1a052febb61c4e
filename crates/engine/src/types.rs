//! Types for the backtest simulator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{SimError, SimResult};

/// A single (timestamp, price) observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub time: DateTime<Utc>,
    pub price: f64,
}

/// Ordered price observations, strictly increasing in time, never empty.
///
/// Zero prices are accepted; the equity simulator rejects them where they
/// would be a return denominator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> SimResult<Self> {
        if points.is_empty() {
            return Err(SimError::invalid("length", "price series must not be empty"));
        }
        for (i, p) in points.iter().enumerate() {
            if !p.price.is_finite() {
                return Err(SimError::invalid(
                    "price",
                    format!("price at bar {} is not finite", i),
                ));
            }
        }
        if let Some(i) = points.windows(2).position(|w| w[1].time <= w[0].time) {
            return Err(SimError::invalid(
                "time",
                format!("timestamps must strictly increase (bar {})", i + 1),
            ));
        }
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn time(&self, i: usize) -> DateTime<Utc> {
        self.points[i].time
    }
}

/// EMA / MACD output. Every vector has the same length as the price series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub fast_ema: Vec<f64>,
    pub slow_ema: Vec<f64>,
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.macd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macd.is_empty()
    }
}

/// Discrete market exposure held during a bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Position {
    Short,
    #[default]
    Flat,
    Long,
}

impl Position {
    pub fn as_i8(self) -> i8 {
        match self {
            Position::Short => -1,
            Position::Flat => 0,
            Position::Long => 1,
        }
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.as_i8())
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.as_i8())
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i8::deserialize(deserializer)? {
            -1 => Ok(Position::Short),
            0 => Ok(Position::Flat),
            1 => Ok(Position::Long),
            other => Err(serde::de::Error::custom(format!(
                "position must be -1, 0 or 1, got {}",
                other
            ))),
        }
    }
}

/// A point on the equity curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub equity: f64,
}

/// Configuration for a synthetic MACD backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// PRNG seed for the synthetic price path
    pub seed: u64,
    /// Number of bars
    pub length: usize,
    pub start_price: f64,
    /// Standard deviation of the per-bar multiplicative shock
    pub drift_scale: f64,
    pub bar_interval_secs: i64,
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    pub initial_capital: f64,
    /// Proportional fee charged on every position change, in [0, 1)
    pub fee_rate: f64,
    /// Annualization factor for the Sharpe ratio (8760 = hourly bars)
    pub periods_per_year: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            length: 500,
            start_price: 20_000.0,
            drift_scale: 0.01,
            bar_interval_secs: 3600,
            fast_period: 8,
            slow_period: 21,
            signal_period: 5,
            initial_capital: 10_000.0,
            fee_rate: 0.001,
            periods_per_year: 24.0 * 365.0,
        }
    }
}

/// Gross profit over gross loss, with an explicit marker for a zero loss side
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfitFactor {
    Finite(f64),
    Infinite,
}

impl ProfitFactor {
    pub fn is_infinite(&self) -> bool {
        matches!(self, ProfitFactor::Infinite)
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            ProfitFactor::Finite(v) => Some(*v),
            ProfitFactor::Infinite => None,
        }
    }
}

impl std::fmt::Display for ProfitFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfitFactor::Finite(v) => write!(f, "{:.2}", v),
            ProfitFactor::Infinite => write!(f, "inf"),
        }
    }
}

impl Serialize for ProfitFactor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ProfitFactor::Finite(v) => serializer.serialize_f64(*v),
            ProfitFactor::Infinite => serializer.serialize_str("inf"),
        }
    }
}

impl<'de> Deserialize<'de> for ProfitFactor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(v) if v.is_finite() => Ok(ProfitFactor::Finite(v)),
            Raw::Number(_) => Ok(ProfitFactor::Infinite),
            Raw::Text(s) => match s.to_ascii_lowercase().as_str() {
                "inf" | "infinite" | "infinity" => Ok(ProfitFactor::Infinite),
                _ => Err(serde::de::Error::custom(format!(
                    "profit_factor must be a number or \"inf\", got {:?}",
                    s
                ))),
            },
        }
    }
}

/// Summary metrics of one run. Percentages are decimal fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BacktestSummary {
    pub final_equity: f64,
    pub total_return_pct: f64,
    pub n_trades: u32,
    pub wins: u32,
    pub win_rate: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub profit_factor: ProfitFactor,
    /// Reserved, always 0
    #[serde(default)]
    pub max_consecutive_losses: u32,
    pub max_drawdown: f64,
    pub sharpe: f64,
}

/// Full output of a backtest invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Hex SHA-256 of the canonical config JSON
    pub config_hash: String,
    pub config: BacktestConfig,
    pub summary: BacktestSummary,
    pub equity_curve: Vec<EquityPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(hour * 3600, 0).unwrap()
    }

    #[test]
    fn test_price_series_rejects_empty() {
        let err = PriceSeries::new(vec![]).unwrap_err();
        assert_eq!(err.kind(), "invalid_parameter");
    }

    #[test]
    fn test_price_series_rejects_non_increasing_time() {
        let points = vec![
            PricePoint { time: at(1), price: 1.0 },
            PricePoint { time: at(1), price: 2.0 },
        ];
        assert!(PriceSeries::new(points).is_err());
    }

    #[test]
    fn test_price_series_accepts_zero_price() {
        let points = vec![
            PricePoint { time: at(0), price: 0.0 },
            PricePoint { time: at(1), price: 2.0 },
        ];
        assert_eq!(PriceSeries::new(points).unwrap().len(), 2);
    }

    #[test]
    fn test_profit_factor_serialization() {
        assert_eq!(serde_json::to_string(&ProfitFactor::Finite(1.5)).unwrap(), "1.5");
        assert_eq!(serde_json::to_string(&ProfitFactor::Infinite).unwrap(), "\"inf\"");

        let pf: ProfitFactor = serde_json::from_str("\"Infinity\"").unwrap();
        assert!(pf.is_infinite());
        let pf: ProfitFactor = serde_json::from_str("2.25").unwrap();
        assert_eq!(pf.value(), Some(2.25));
        assert!(serde_json::from_str::<ProfitFactor>("\"lots\"").is_err());
    }

    #[test]
    fn test_position_serializes_as_integer() {
        let json = serde_json::to_string(&vec![Position::Short, Position::Flat, Position::Long])
            .unwrap();
        assert_eq!(json, "[-1,0,1]");
        assert!(serde_json::from_str::<Position>("2").is_err());
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: BacktestConfig = serde_json::from_str(r#"{"seed": 7}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.length, 500);
        assert_eq!(config.slow_period, 21);
    }
}
