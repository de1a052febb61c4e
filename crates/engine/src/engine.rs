//! Bar-by-bar backtesting engine
//!
//! Pipeline: synthetic prices → MACD → lagged positions → equity walk →
//! summary statistics. Each run owns all of its data; nothing is shared
//! between invocations, so independent runs can execute concurrently.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{SimError, SimResult};
use crate::indicators::{compute_macd, MacdParams};
use crate::signals::build_positions;
use crate::stats::summarize;
use crate::synthetic::{generate_price_series, SyntheticSeriesConfig};
use crate::types::*;

/// Output of the equity walk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityRun {
    /// Equity after each bar, `equity[0]` is the initial capital
    pub equity: Vec<f64>,
    /// `market_return * position` per bar, 0.0 at bar 0
    pub strategy_returns: Vec<f64>,
    pub n_trades: u32,
}

/// Every intermediate series of one run, for charting and inspection
#[derive(Debug, Clone, Serialize)]
pub struct BacktestTrace {
    pub prices: PriceSeries,
    pub indicators: IndicatorSeries,
    pub positions: Vec<Position>,
    pub run: EquityRun,
}

fn validate_capital_and_fee(initial_capital: f64, fee_rate: f64) -> SimResult<()> {
    if !initial_capital.is_finite() || initial_capital <= 0.0 {
        return Err(SimError::invalid(
            "initial_capital",
            format!("must be a positive number, got {}", initial_capital),
        ));
    }
    if !fee_rate.is_finite() || !(0.0..1.0).contains(&fee_rate) {
        return Err(SimError::invalid(
            "fee_rate",
            format!("must be in [0, 1), got {}", fee_rate),
        ));
    }
    Ok(())
}

fn validate_periods_per_year(periods_per_year: f64) -> SimResult<()> {
    if !periods_per_year.is_finite() || periods_per_year <= 0.0 {
        return Err(SimError::invalid("periods_per_year", "must be positive"));
    }
    Ok(())
}

/// Walk the series applying positions and a proportional fee per position change.
///
/// The fee is taken from equity before the bar's return is applied. Equity is
/// not floored at zero.
pub fn simulate_equity(
    series: &PriceSeries,
    positions: &[Position],
    initial_capital: f64,
    fee_rate: f64,
) -> SimResult<EquityRun> {
    validate_capital_and_fee(initial_capital, fee_rate)?;
    if positions.len() != series.len() {
        return Err(SimError::invalid(
            "positions",
            format!(
                "length {} does not match price series length {}",
                positions.len(),
                series.len()
            ),
        ));
    }

    let prices = series.prices();
    let n = prices.len();

    // Every price except the last is a return denominator
    if let Some(bar) = prices[..n - 1].iter().position(|&p| p == 0.0) {
        return Err(SimError::DivisionByZero { bar });
    }

    let mut equity = Vec::with_capacity(n);
    let mut strategy_returns = Vec::with_capacity(n);
    equity.push(initial_capital);
    strategy_returns.push(0.0);

    let mut current_position = Position::Flat;
    let mut n_trades: u32 = 0;
    let mut running = initial_capital;

    for i in 1..n {
        let market_return = (prices[i] - prices[i - 1]) / prices[i - 1];
        let strategy_return = market_return * positions[i].as_f64();

        if positions[i] != current_position {
            n_trades += 1;
            running *= 1.0 - fee_rate;
            debug!(
                bar = i,
                from = current_position.as_i8(),
                to = positions[i].as_i8(),
                price = prices[i],
                "Position change"
            );
        }

        running *= 1.0 + strategy_return;
        equity.push(running);
        strategy_returns.push(strategy_return);
        current_position = positions[i];
    }

    Ok(EquityRun {
        equity,
        strategy_returns,
        n_trades,
    })
}

/// Two independent runs side by side (e.g. original vs enhanced script)
#[derive(Debug, Clone, Serialize)]
pub struct BacktestComparison {
    pub original: BacktestReport,
    pub enhanced: BacktestReport,
    /// `enhanced - original`
    pub total_return_delta: f64,
    pub sharpe_delta: f64,
    pub max_drawdown_delta: f64,
}

impl BacktestComparison {
    pub fn new(original: BacktestReport, enhanced: BacktestReport) -> Self {
        Self {
            total_return_delta: enhanced.summary.total_return_pct
                - original.summary.total_return_pct,
            sharpe_delta: enhanced.summary.sharpe - original.summary.sharpe,
            max_drawdown_delta: enhanced.summary.max_drawdown - original.summary.max_drawdown,
            original,
            enhanced,
        }
    }
}

/// Hex SHA-256 of the config's canonical JSON
pub fn config_fingerprint(config: &BacktestConfig) -> String {
    let bytes = serde_json::to_vec(config).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

/// Backtesting engine for the synthetic MACD strategy
pub struct BacktestEngine;

impl BacktestEngine {
    /// Check every parameter up front so a bad config never starts a run
    pub fn validate(config: &BacktestConfig) -> SimResult<()> {
        SyntheticSeriesConfig::from(config).validate()?;
        MacdParams::from(config).validate()?;
        validate_capital_and_fee(config.initial_capital, config.fee_rate)?;
        validate_periods_per_year(config.periods_per_year)
    }

    /// Generate the synthetic series for `config` and backtest it
    pub fn run(config: &BacktestConfig) -> SimResult<BacktestReport> {
        Self::validate(config)?;
        let series = generate_price_series(&SyntheticSeriesConfig::from(config))?;
        Self::run_on_series(config, &series)
    }

    /// Backtest an already loaded price series. Series-generation fields of
    /// `config` are ignored.
    pub fn run_on_series(config: &BacktestConfig, series: &PriceSeries) -> SimResult<BacktestReport> {
        let trace = Self::trace_series(config, series)?;
        Ok(Self::report(config, &trace))
    }

    /// Same as [`BacktestEngine::run`] but keeps every intermediate series
    pub fn trace(config: &BacktestConfig) -> SimResult<BacktestTrace> {
        Self::validate(config)?;
        let series = generate_price_series(&SyntheticSeriesConfig::from(config))?;
        Self::trace_series(config, &series)
    }

    fn trace_series(config: &BacktestConfig, series: &PriceSeries) -> SimResult<BacktestTrace> {
        let params = MacdParams::from(config);
        params.validate()?;
        validate_capital_and_fee(config.initial_capital, config.fee_rate)?;
        validate_periods_per_year(config.periods_per_year)?;

        info!(
            bars = series.len(),
            capital = config.initial_capital,
            fee_rate = config.fee_rate,
            fast = params.fast_period,
            slow = params.slow_period,
            signal = params.signal_period,
            "Starting backtest"
        );

        let indicators = compute_macd(series, &params)?;
        let positions = build_positions(&indicators);
        let run = simulate_equity(series, &positions, config.initial_capital, config.fee_rate)?;

        Ok(BacktestTrace {
            prices: series.clone(),
            indicators,
            positions,
            run,
        })
    }

    fn report(config: &BacktestConfig, trace: &BacktestTrace) -> BacktestReport {
        let summary = summarize(
            &trace.run,
            config.initial_capital,
            config.periods_per_year,
        );

        info!(
            n_trades = summary.n_trades,
            wins = summary.wins,
            final_equity = summary.final_equity,
            total_return_pct = summary.total_return_pct,
            max_drawdown = summary.max_drawdown,
            sharpe = summary.sharpe,
            "Backtest complete"
        );

        let equity_curve = trace
            .prices
            .points()
            .iter()
            .zip(trace.run.equity.iter())
            .map(|(p, &equity)| EquityPoint {
                time: p.time,
                equity,
            })
            .collect();

        BacktestReport {
            config_hash: config_fingerprint(config),
            config: config.clone(),
            summary,
            equity_curve,
        }
    }
}
