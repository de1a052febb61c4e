//! End-to-end properties of the synthetic MACD backtest pipeline

use engine::signals::count_changes;
use engine::synthetic::MAX_LENGTH;
use engine::{
    build_positions, compute_macd, equity_curve_csv, generate_price_series, simulate_equity,
    summarize, BacktestConfig, BacktestEngine, MacdParams, Position, PricePoint, PriceSeries,
    SimError, SyntheticSeriesConfig,
};

fn default_series() -> PriceSeries {
    generate_price_series(&SyntheticSeriesConfig::from(&BacktestConfig::default())).unwrap()
}

fn with_price(series: &PriceSeries, bar: usize, price: f64) -> PriceSeries {
    let mut points = series.points().to_vec();
    points[bar].price = price;
    PriceSeries::new(points).unwrap()
}

#[test]
fn loader_is_deterministic() {
    let a = default_series();
    let b = default_series();
    assert_eq!(a.len(), 500);
    assert_eq!(
        serde_json::to_vec(&a).unwrap(),
        serde_json::to_vec(&b).unwrap()
    );
}

#[test]
fn ema_continuity_on_synthetic_prices() {
    let series = default_series();
    let params = MacdParams::from(&BacktestConfig::default());
    let ind = compute_macd(&series, &params).unwrap();
    let prices = series.prices();

    let alpha = 2.0 / (params.fast_period as f64 + 1.0);
    assert_eq!(ind.fast_ema[0], prices[0]);
    for i in 1..prices.len() {
        let expected = prices[i] * alpha + ind.fast_ema[i - 1] * (1.0 - alpha);
        assert!((ind.fast_ema[i] - expected).abs() <= 1e-9 * expected.abs());
    }
}

#[test]
fn positions_never_look_ahead() {
    let series = default_series();
    let params = MacdParams::from(&BacktestConfig::default());
    let base = build_positions(&compute_macd(&series, &params).unwrap());

    for bar in [0, 1, 57, 250, 498, 499] {
        let bumped = with_price(&series, bar, series.prices()[bar] * 1.25);
        let positions = build_positions(&compute_macd(&bumped, &params).unwrap());
        assert_eq!(
            &positions[..=bar],
            &base[..=bar],
            "position at or before bar {} changed",
            bar
        );
    }
}

#[test]
fn trade_count_equals_position_changes() {
    use Position::*;
    let series = default_series();
    let pattern = [Flat, Long, Long, Short, Short, Short, Flat, Long];
    let positions: Vec<Position> = (0..series.len()).map(|i| pattern[i % pattern.len()]).collect();

    let run = simulate_equity(&series, &positions, 10_000.0, 0.001).unwrap();
    assert_eq!(run.n_trades as usize, count_changes(&positions));
    assert!((run.n_trades as usize) < series.len());
}

#[test]
fn flat_positions_without_fee_keep_capital() {
    let series = default_series();
    let positions = vec![Position::Flat; series.len()];
    let run = simulate_equity(&series, &positions, 10_000.0, 0.0).unwrap();
    assert!(run.equity.iter().all(|&e| e == 10_000.0));
}

#[test]
fn drawdown_is_a_fraction() {
    for seed in [1, 42, 1234] {
        for fee_rate in [0.0, 0.001, 0.05] {
            let report = BacktestEngine::run(&BacktestConfig {
                seed,
                fee_rate,
                drift_scale: 0.03,
                ..Default::default()
            })
            .unwrap();
            let dd = report.summary.max_drawdown;
            assert!((0.0..=1.0).contains(&dd), "drawdown {} out of range", dd);
        }
    }
}

#[test]
fn reference_scenario_is_stable() {
    let config = BacktestConfig {
        length: 500,
        start_price: 20_000.0,
        seed: 42,
        fast_period: 8,
        slow_period: 21,
        signal_period: 5,
        initial_capital: 10_000.0,
        fee_rate: 0.001,
        ..Default::default()
    };
    let first = BacktestEngine::run(&config).unwrap();
    let second = BacktestEngine::run(&config).unwrap();

    assert_eq!(first.equity_curve.len(), 500);
    assert_eq!(first.equity_curve[0].equity, 10_000.0);
    assert!(first.summary.total_return_pct.is_finite());
    assert!(first.summary.sharpe.is_finite());
    assert_eq!(first.summary, second.summary);
    assert_eq!(first.config_hash, second.config_hash);

    let last = first.equity_curve.last().unwrap().equity;
    assert!((first.summary.total_return_pct - (last / 10_000.0 - 1.0)).abs() < 1e-12);
}

#[test]
fn no_losing_bars_gives_infinite_profit_factor() {
    // Strictly rising prices held long: every strategy return is positive
    let rising: Vec<PricePoint> = default_series()
        .points()
        .iter()
        .enumerate()
        .map(|(i, p)| PricePoint {
            time: p.time,
            price: 100.0 + i as f64,
        })
        .collect();
    let series = PriceSeries::new(rising).unwrap();
    let mut positions = vec![Position::Long; series.len()];
    positions[0] = Position::Flat;

    let run = simulate_equity(&series, &positions, 10_000.0, 0.001).unwrap();
    let summary = summarize(&run, 10_000.0, 8760.0);
    assert!(summary.profit_factor.is_infinite());
    assert_eq!(summary.n_trades, 1);
    assert_eq!(summary.wins as usize, series.len() - 1);
}

#[test]
fn zero_price_aborts_the_run() {
    let series = with_price(&default_series(), 100, 0.0);
    let err = BacktestEngine::run_on_series(&BacktestConfig::default(), &series).unwrap_err();
    assert_eq!(err, SimError::DivisionByZero { bar: 100 });
}

#[test]
fn report_serializes_for_the_dashboard() {
    let report = BacktestEngine::run(&BacktestConfig {
        length: 24,
        ..Default::default()
    })
    .unwrap();
    let csv = equity_curve_csv(&report.equity_curve).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("index,equity"));
    assert_eq!(lines.next(), Some("2024-01-01T00:00:00Z,10000"));
    assert_eq!(csv.lines().count(), 25);

    let json = serde_json::to_value(&report).unwrap();
    assert!(json["summary"]["total_return_pct"].is_number());
}

#[test]
fn oversized_length_is_rejected_before_allocating() {
    let err = BacktestEngine::run(&BacktestConfig {
        length: MAX_LENGTH + 1,
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, SimError::InvalidParameter { name: "length", .. }));
}
