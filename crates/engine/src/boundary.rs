//! Validation of JSON produced by the external AI service
//!
//! Responses arrive as free text that should contain a JSON object, often
//! wrapped in Markdown fences and prose. The object is deserialized into
//! strict wire types (unknown fields rejected), then range and ordering
//! checks run before anything is handed to the rest of the crate.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{BacktestSummary, EquityPoint};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundaryError {
    #[error("No JSON object found in response")]
    NoJson,

    #[error("Malformed JSON: {0}")]
    Malformed(String),

    #[error("Schema mismatch at `{field}`: {reason}")]
    Schema { field: String, reason: String },
}

impl BoundaryError {
    fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        BoundaryError::Schema {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BoundaryError::NoJson => "no_json",
            BoundaryError::Malformed(_) => "malformed_json",
            BoundaryError::Schema { .. } => "schema_mismatch",
        }
    }
}

pub type BoundaryResult<T> = Result<T, BoundaryError>;

/// Overall risk rating of an analysed script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
}

/// Typed result of a code analysis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
    pub risk_level: RiskLevel,
    /// 0–100
    pub score: u8,
}

/// A backtest produced outside this crate, after validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalBacktest {
    pub summary: BacktestSummary,
    pub equity_curve: Vec<EquityPoint>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalysisWire {
    summary: String,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(alias = "riskLevel")]
    risk_level: RiskLevel,
    score: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct BacktestWire {
    summary: Value,
    #[serde(alias = "equityCurve")]
    equity_curve: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CurvePointWire {
    #[serde(alias = "time", alias = "index")]
    timestamp: DateTime<Utc>,
    equity: f64,
}

fn is_json_object(text: &str) -> bool {
    text.starts_with('{')
        && serde_json::from_str::<Value>(text)
            .map(|v| v.is_object())
            .unwrap_or(false)
}

/// Pull the JSON object text out of a free-form response.
///
/// Every fenced block is tried in order and the first whose body is a JSON
/// object wins; otherwise the span from the first `{` to the last `}` is used.
pub fn extract_json_payload(text: &str) -> BoundaryResult<&str> {
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        // Skip the language tag, if any
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        let Some(end) = body.find("```") else {
            break;
        };
        let inner = body[..end].trim();
        if is_json_object(inner) {
            return Ok(inner);
        }
        rest = &body[end + 3..];
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(open), Some(close)) if open < close => Ok(&text[open..=close]),
        _ => Err(BoundaryError::NoJson),
    }
}

fn parse_value(text: &str) -> BoundaryResult<Value> {
    let payload = extract_json_payload(text)?;
    match serde_json::from_str::<Value>(payload) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(BoundaryError::schema("$", "expected a JSON object")),
        Err(e) => Err(BoundaryError::Malformed(e.to_string())),
    }
}

/// Deserialize `value` into `T`, reporting failures under `section`.
///
/// Missing and unknown field errors name the offending field.
fn decode<T: DeserializeOwned>(value: Value, section: &str) -> BoundaryResult<T> {
    serde_json::from_value(value).map_err(|e| {
        let reason = e.to_string();
        let named = ["missing field `", "unknown field `"]
            .iter()
            .find_map(|prefix| reason.strip_prefix(prefix))
            .and_then(|rest| rest.split('`').next());
        let field = match (named, section.is_empty()) {
            (Some(name), true) => name.to_string(),
            (Some(name), false) => format!("{}.{}", section, name),
            (None, true) => "$".to_string(),
            (None, false) => section.to_string(),
        };
        BoundaryError::schema(field, reason)
    })
}

fn trimmed(items: Vec<String>) -> Vec<String> {
    items.into_iter().map(|s| s.trim().to_string()).collect()
}

/// Validate an analysis response
pub fn parse_analysis(text: &str) -> BoundaryResult<AnalysisResult> {
    let wire: AnalysisWire = decode(parse_value(text)?, "")?;

    let summary = wire.summary.trim().to_string();
    if summary.is_empty() {
        return Err(BoundaryError::schema("summary", "must not be empty"));
    }
    if !wire.score.is_finite() || !(0.0..=100.0).contains(&wire.score) {
        return Err(BoundaryError::schema("score", "must be between 0 and 100"));
    }

    let result = AnalysisResult {
        summary,
        strengths: trimmed(wire.strengths),
        weaknesses: trimmed(wire.weaknesses),
        suggestions: trimmed(wire.suggestions),
        risk_level: wire.risk_level,
        score: wire.score.round() as u8,
    };

    debug!(
        risk = ?result.risk_level,
        score = result.score,
        suggestions = result.suggestions.len(),
        "Validated analysis response"
    );
    Ok(result)
}

fn parse_curve(items: Vec<Value>) -> BoundaryResult<Vec<EquityPoint>> {
    if items.is_empty() {
        return Err(BoundaryError::schema("equity_curve", "must not be empty"));
    }

    let mut curve: Vec<EquityPoint> = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let path = format!("equity_curve[{}]", i);
        let point: CurvePointWire = decode(item, &path)?;

        if let Some(prev) = curve.last() {
            if point.timestamp <= prev.time {
                return Err(BoundaryError::schema(
                    format!("{}.timestamp", path),
                    "timestamps must strictly increase",
                ));
            }
        }
        curve.push(EquityPoint {
            time: point.timestamp,
            equity: point.equity,
        });
    }
    Ok(curve)
}

/// Validate a backtest response: `{ "summary": {...}, "equity_curve": [...] }`
pub fn parse_external_backtest(text: &str) -> BoundaryResult<ExternalBacktest> {
    let wire: BacktestWire = decode(parse_value(text)?, "")?;
    let summary: BacktestSummary = decode(wire.summary, "summary")?;

    if !(0.0..=1.0).contains(&summary.max_drawdown) {
        return Err(BoundaryError::schema(
            "summary.max_drawdown",
            "must be a fraction in [0, 1]",
        ));
    }

    let equity_curve = parse_curve(wire.equity_curve)?;

    if let Some(last) = equity_curve.last() {
        if (last.equity - summary.final_equity).abs() > 1e-6 * summary.final_equity.abs().max(1.0) {
            warn!(
                curve_last = last.equity,
                final_equity = summary.final_equity,
                "External backtest: final equity does not match last curve point"
            );
        }
    }

    Ok(ExternalBacktest {
        summary,
        equity_curve,
    })
}
