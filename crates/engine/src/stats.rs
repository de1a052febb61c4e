//! Performance statistics — pure functions over the equity walk.

use crate::engine::EquityRun;
use crate::types::{BacktestSummary, ProfitFactor};

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1)
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// `equity[N-1] / initial_capital - 1`
pub fn total_return(equity: &[f64], initial_capital: f64) -> f64 {
    match equity.last() {
        Some(last) => last / initial_capital - 1.0,
        None => 0.0,
    }
}

/// Bar-over-bar equity changes, fee drag included. A zero previous equity
/// contributes 0.0.
pub fn bar_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] == 0.0 { 0.0 } else { w[1] / w[0] - 1.0 })
        .collect()
}

/// `sqrt(periods_per_year) * mean / stdev`, 0 when the deviation is below 1e-12
pub fn sharpe_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    let sd = std_dev(returns);
    if sd < 1e-12 || !sd.is_finite() {
        return 0.0;
    }
    periods_per_year.sqrt() * mean(returns) / sd
}

/// Largest peak-to-trough decline as a fraction of the running peak, in [0, 1]
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (peak - eq) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd.clamp(0.0, 1.0)
}

/// Gross gains over gross losses in currency terms
pub fn profit_factor(strategy_returns: &[f64], initial_capital: f64) -> ProfitFactor {
    let gross_profit: f64 = strategy_returns
        .iter()
        .filter(|&&r| r > 0.0)
        .map(|r| r * initial_capital)
        .sum();
    let gross_loss: f64 = strategy_returns
        .iter()
        .filter(|&&r| r < 0.0)
        .map(|r| r * initial_capital)
        .sum::<f64>()
        .abs();

    if gross_loss == 0.0 {
        ProfitFactor::Infinite
    } else {
        ProfitFactor::Finite(gross_profit / gross_loss)
    }
}

/// Reduce an equity run to its summary record.
///
/// `win_rate` divides winning bars by position changes, not by bars held.
pub fn summarize(run: &EquityRun, initial_capital: f64, periods_per_year: f64) -> BacktestSummary {
    let returns = &run.strategy_returns;

    let gains: Vec<f64> = returns.iter().copied().filter(|&r| r > 0.0).collect();
    let losses: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();

    let wins = gains.len() as u32;
    let win_rate = if run.n_trades > 0 {
        f64::from(wins) / f64::from(run.n_trades)
    } else {
        0.0
    };

    BacktestSummary {
        final_equity: run.equity.last().copied().unwrap_or(initial_capital),
        total_return_pct: total_return(&run.equity, initial_capital),
        n_trades: run.n_trades,
        wins,
        win_rate,
        avg_win: mean(&gains) * initial_capital,
        avg_loss: mean(&losses) * initial_capital,
        profit_factor: profit_factor(returns, initial_capital),
        max_consecutive_losses: 0,
        max_drawdown: max_drawdown(&run.equity),
        sharpe: sharpe_ratio(&bar_returns(&run.equity), periods_per_year),
    }
}
