//! Botdash Engine — synthetic MACD backtesting and simulated exchange sessions
//!
//! Provides:
//! - Seeded synthetic price series
//! - EMA / MACD indicators and lagged crossover positions
//! - Fee-adjusted equity simulation and summary statistics
//! - Validation of backtest / analysis JSON returned by external AI services
//! - Per-session simulated exchange balances

pub mod boundary;
pub mod engine;
pub mod error;
pub mod export;
pub mod indicators;
pub mod session;
pub mod signals;
pub mod stats;
pub mod synthetic;
pub mod types;

// Re-exports for convenience
pub use boundary::{
    extract_json_payload, parse_analysis, parse_external_backtest, AnalysisResult, BoundaryError,
    ExternalBacktest, RiskLevel,
};
pub use engine::{
    config_fingerprint, simulate_equity, BacktestComparison, BacktestEngine, BacktestTrace,
    EquityRun,
};
pub use error::{SimError, SimResult};
pub use export::{equity_curve_csv, summary_json, write_report_files, ExportError};
pub use indicators::{compute_macd, MacdParams};
pub use session::{
    ExchangeSession, Fill, MarketOrder, OrderSide, SessionError, SessionId, SessionRegistry,
};
pub use signals::build_positions;
pub use stats::summarize;
pub use synthetic::{generate_price_series, SyntheticSeriesConfig};
pub use types::*;
