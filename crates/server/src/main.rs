//! Botdash — trading bot dashboard backend
//!
//! Usage:
//!   botdash serve --port 3001           — Launch web server with UI
//!   botdash run --seed 7 --fast 12      — Run one synthetic MACD backtest
//!   botdash compare --enhanced-fast 5   — Original vs enhanced parameters
//!   botdash settings list               — Inspect the settings store

mod api;

use api::AppState;
use clap::{Args, Parser, Subcommand};
use engine::{write_report_files, BacktestComparison, BacktestConfig, BacktestReport, SessionRegistry};
use persistence::repository::SettingsRepository;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "botdash")]
#[command(about = "Trading bot dashboard backend with a synthetic MACD backtester", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the dashboard web server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3001)]
        port: u16,
    },
    /// Run one backtest from CLI and print its summary
    Run {
        #[command(flatten)]
        backtest: BacktestArgs,
        /// Write the equity curve as CSV
        #[arg(long)]
        equity_csv: Option<PathBuf>,
        /// Write the summary as JSON
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },
    /// Compare the base configuration against an enhanced one
    Compare {
        #[command(flatten)]
        backtest: BacktestArgs,
        #[command(flatten)]
        enhanced: EnhancedArgs,
    },
    /// Manage stored dashboard settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// List every setting
    List,
    /// Print one setting
    Get { key: String },
    /// Create or replace a setting
    Set { key: String, value: String },
    /// Remove a setting
    Delete { key: String },
}

/// Backtest parameters; defaults match `BacktestConfig::default()`
#[derive(Args, Debug, Clone)]
struct BacktestArgs {
    /// Random seed of the synthetic series
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Number of bars
    #[arg(long, default_value_t = 500)]
    length: usize,
    #[arg(long, default_value_t = 20000.0)]
    start_price: f64,
    /// Standard deviation of the per-bar shock
    #[arg(long, default_value_t = 0.01)]
    drift_scale: f64,
    #[arg(long, default_value_t = 8)]
    fast: usize,
    #[arg(long, default_value_t = 21)]
    slow: usize,
    #[arg(long, default_value_t = 5)]
    signal: usize,
    #[arg(long, default_value_t = 10000.0)]
    capital: f64,
    /// Proportional fee per position change
    #[arg(long, default_value_t = 0.001)]
    fee: f64,
}

impl From<&BacktestArgs> for BacktestConfig {
    fn from(args: &BacktestArgs) -> Self {
        BacktestConfig {
            seed: args.seed,
            length: args.length,
            start_price: args.start_price,
            drift_scale: args.drift_scale,
            fast_period: args.fast,
            slow_period: args.slow,
            signal_period: args.signal,
            initial_capital: args.capital,
            fee_rate: args.fee,
            ..Default::default()
        }
    }
}

/// Overrides applied on top of the base configuration for `compare`
#[derive(Args, Debug, Clone, Default)]
struct EnhancedArgs {
    #[arg(long)]
    enhanced_seed: Option<u64>,
    #[arg(long)]
    enhanced_fast: Option<usize>,
    #[arg(long)]
    enhanced_slow: Option<usize>,
    #[arg(long)]
    enhanced_signal: Option<usize>,
    #[arg(long)]
    enhanced_fee: Option<f64>,
}

impl EnhancedArgs {
    fn apply(&self, base: &BacktestConfig) -> BacktestConfig {
        BacktestConfig {
            seed: self.enhanced_seed.unwrap_or(base.seed),
            fast_period: self.enhanced_fast.unwrap_or(base.fast_period),
            slow_period: self.enhanced_slow.unwrap_or(base.slow_period),
            signal_period: self.enhanced_signal.unwrap_or(base.signal_period),
            fee_rate: self.enhanced_fee.unwrap_or(base.fee_rate),
            ..base.clone()
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,persistence=debug,botdash=debug")
    } else {
        EnvFilter::new("info,engine=info,persistence=info,botdash=info,sqlx=warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn db_path() -> String {
    std::env::var("BOTDASH_DB_PATH").unwrap_or_else(|_| "data/settings.db".to_string())
}

async fn open_database(path: &str) -> anyhow::Result<persistence::Database> {
    persistence::Database::new(path).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&host, port).await?;
        }
        Commands::Run {
            backtest,
            equity_csv,
            summary_json,
        } => {
            cmd_run(&backtest, equity_csv, summary_json).await?;
        }
        Commands::Compare { backtest, enhanced } => {
            cmd_compare(&backtest, &enhanced).await?;
        }
        Commands::Settings { action } => {
            cmd_settings(action).await?;
        }
    }

    Ok(())
}

// ============================================================================
// Serve command — Axum web server
// ============================================================================

async fn cmd_serve(host: &str, port: u16) -> anyhow::Result<()> {
    info!("Botdash v{} starting...", APP_VERSION);

    let db_path = db_path();
    let db = open_database(&db_path).await?;
    info!("Database initialized: {}", db_path);

    let state = AppState {
        db: Arc::new(db),
        sessions: Arc::new(SessionRegistry::new()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Static UI: `dist` next to the executable, else relative to cwd
    let exe_path = std::env::current_exe().unwrap_or_default();
    let exe_dir = exe_path.parent().unwrap_or(std::path::Path::new("."));
    let dist_dir = exe_dir.join("dist");
    let static_dir = if dist_dir.exists() {
        dist_dir
    } else {
        PathBuf::from("dist")
    };

    let app = axum::Router::new()
        .nest("/api", api::router(state))
        .fallback_service(ServeDir::new(&static_dir))
        .layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Botdash v{} ===", APP_VERSION);
    println!("Trading Bot Dashboard Server");
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET    /api/health                - Health check");
    println!("  POST   /api/backtest              - Run synthetic MACD backtest");
    println!("  POST   /api/backtest/compare      - Original vs enhanced backtest");
    println!("  GET    /api/backtest/equity.csv   - Equity curve as CSV");
    println!("  POST   /api/backtest/validate     - Validate an external backtest");
    println!("  POST   /api/analysis/validate     - Validate a code analysis response");
    println!("  GET    /api/settings              - List settings");
    println!("  GET    /api/settings/:key         - Read a setting");
    println!("  PUT    /api/settings/:key         - Save a setting");
    println!("  DELETE /api/settings/:key         - Remove a setting");
    println!("  POST   /api/sessions              - Open a simulated exchange session");
    println!("  GET    /api/sessions/:id          - Session balances and fills");
    println!("  POST   /api/sessions/:id/orders   - Simulated market order");
    println!("  DELETE /api/sessions/:id          - Close a session");
    println!("\n  Database: {}", db_path);
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Run / compare commands — CLI mode (no web server)
// ============================================================================

async fn cmd_run(
    args: &BacktestArgs,
    equity_csv: Option<PathBuf>,
    summary_json: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("\n=== Botdash v{} ===", APP_VERSION);

    let config = BacktestConfig::from(args);
    println!(
        "Seed: {} | Bars: {} | MACD: {}/{}/{} | Fee: {}",
        config.seed,
        config.length,
        config.fast_period,
        config.slow_period,
        config.signal_period,
        config.fee_rate
    );

    let report = api::run_backtest(config)
        .await
        .map_err(|e| anyhow::anyhow!("Backtest failed: {}", e))?;

    print_summary(&[("Run", &report)]);

    write_report_files(&report, equity_csv.as_deref(), summary_json.as_deref())?;
    if let Some(path) = &equity_csv {
        println!("\nEquity curve written to {}", path.display());
    }
    if let Some(path) = &summary_json {
        println!("Summary written to {}", path.display());
    }

    Ok(())
}

async fn cmd_compare(args: &BacktestArgs, enhanced: &EnhancedArgs) -> anyhow::Result<()> {
    println!("\n=== Botdash v{} ===", APP_VERSION);

    let original = BacktestConfig::from(args);
    let improved = enhanced.apply(&original);

    let comparison: BacktestComparison = api::run_comparison(original, improved)
        .await
        .map_err(|e| anyhow::anyhow!("Comparison failed: {}", e))?;

    print_summary(&[
        ("Original", &comparison.original),
        ("Enhanced", &comparison.enhanced),
    ]);
    println!(
        "\n  Delta: return {:+.2}% | sharpe {:+.2} | max DD {:+.2}%",
        comparison.total_return_delta * 100.0,
        comparison.sharpe_delta,
        comparison.max_drawdown_delta * 100.0
    );

    Ok(())
}

fn print_summary(rows: &[(&str, &BacktestReport)]) {
    println!("\nResults:");
    println!(
        "  {:<10} {:>12} {:>9} {:>7} {:>7} {:>8} {:>8} {:>7}",
        "", "Equity", "Return", "Trades", "WR%", "PF", "MaxDD%", "Sharpe"
    );
    println!("  {}", "-".repeat(75));
    for (label, report) in rows {
        let s = &report.summary;
        println!(
            "  {:<10} {:>12.2} {:>+8.2}% {:>7} {:>6.1}% {:>8} {:>7.2}% {:>7.2}",
            label,
            s.final_equity,
            s.total_return_pct * 100.0,
            s.n_trades,
            s.win_rate * 100.0,
            s.profit_factor.to_string(),
            s.max_drawdown * 100.0,
            s.sharpe,
        );
    }
}

// ============================================================================
// Settings command
// ============================================================================

async fn cmd_settings(action: SettingsAction) -> anyhow::Result<()> {
    let db = open_database(&db_path()).await?;
    let repo = SettingsRepository::new(db.pool());

    match action {
        SettingsAction::List => {
            let records = repo.list().await?;
            if records.is_empty() {
                println!("No settings stored");
            }
            for record in records {
                println!("{} = {}", record.key, record.value);
            }
        }
        SettingsAction::Get { key } => match repo.get(&key).await? {
            Some(record) => println!("{}", record.value),
            None => anyhow::bail!("No setting named {:?}", key),
        },
        SettingsAction::Set { key, value } => {
            repo.set(&key, &value).await?;
            info!(key = %key, "Setting saved");
        }
        SettingsAction::Delete { key } => {
            if repo.delete(&key).await? {
                info!(key = %key, "Setting removed");
            } else {
                println!("No setting named {:?}", key);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_config_defaults() {
        let cli = Cli::parse_from(["botdash", "run"]);
        let Commands::Run { backtest, .. } = cli.command else {
            panic!("expected run command");
        };
        let config = BacktestConfig::from(&backtest);
        let defaults = BacktestConfig::default();
        assert_eq!(config.seed, defaults.seed);
        assert_eq!(config.length, defaults.length);
        assert_eq!(config.fast_period, defaults.fast_period);
        assert_eq!(config.slow_period, defaults.slow_period);
        assert_eq!(config.signal_period, defaults.signal_period);
        assert_eq!(config.initial_capital, defaults.initial_capital);
        assert_eq!(config.fee_rate, defaults.fee_rate);
        assert_eq!(config.start_price, defaults.start_price);
    }

    #[test]
    fn test_enhanced_overrides() {
        let cli = Cli::parse_from([
            "botdash",
            "compare",
            "--seed",
            "7",
            "--enhanced-fast",
            "5",
            "--enhanced-fee",
            "0",
        ]);
        let Commands::Compare { backtest, enhanced } = cli.command else {
            panic!("expected compare command");
        };
        let base = BacktestConfig::from(&backtest);
        let improved = enhanced.apply(&base);
        assert_eq!(improved.seed, 7);
        assert_eq!(improved.fast_period, 5);
        assert_eq!(improved.slow_period, base.slow_period);
        assert_eq!(improved.fee_rate, 0.0);
    }
}
