//! Strategy Lab — backtest and optimize trading strategies from the CLI
//!
//! Usage:
//!   strategy-lab backtest --bars 500 --sma 30 --stop-loss 5
//!   strategy-lab optimize --optimizer hill-climb --start 5 --end 50
//!   strategy-lab walk-forward --in-sample 120 --out-sample 40
//!
//! Runs against a seeded synthetic price series generated in memory, so
//! results are reproducible without any market-data files.

use chrono::Utc;
use clap::{Parser, Subcommand};
use engine::{
    backtest, mean_reversion, optimize, to_sma_bars, walk_forward_optimize, BacktestOptions,
    Bar, MeanReversionConfig, OptimizationType, OptimizeOptions, ParameterDef, Random,
    SearchDirection, Trade,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

const BAR_INTERVAL_MS: i64 = 60_000;

#[derive(Parser)]
#[command(name = "strategy-lab")]
#[command(about = "Backtest and optimize trading strategies", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest the mean-reversion strategy over a synthetic series
    Backtest {
        /// Number of synthetic bars to generate
        #[arg(long, default_value_t = 500)]
        bars: usize,
        /// Seed for the synthetic series
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Moving-average period
        #[arg(long, default_value_t = 30)]
        sma: u32,
        /// Stop-loss distance as a percent of the entry price
        #[arg(long)]
        stop_loss: Option<Decimal>,
        /// Trailing-stop distance as a percent of the close
        #[arg(long)]
        trailing_stop: Option<Decimal>,
        /// Profit-target distance as a percent of the entry price
        #[arg(long)]
        profit_target: Option<Decimal>,
        /// Optional JSON export path for the trade list
        #[arg(long)]
        export: Option<String>,
    },
    /// Optimize the moving-average period over a synthetic series
    Optimize {
        #[arg(long, default_value_t = 500)]
        bars: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Search type: grid or hill-climb
        #[arg(long, default_value = "grid")]
        optimizer: String,
        /// Search direction: max or min
        #[arg(long, default_value = "max")]
        direction: String,
        /// First moving-average period to try
        #[arg(long, default_value = "5")]
        start: Decimal,
        /// Last moving-average period to try
        #[arg(long, default_value = "50")]
        end: Decimal,
        /// Step between periods
        #[arg(long, default_value = "5")]
        step: Decimal,
        /// Number of hill-climb restarts
        #[arg(long, default_value_t = 4)]
        starting_points: usize,
        /// Optional JSON export path for all evaluated iterations
        #[arg(long)]
        export: Option<String>,
    },
    /// Walk-forward optimize over a synthetic series
    WalkForward {
        #[arg(long, default_value_t = 500)]
        bars: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// In-sample window size in bars
        #[arg(long, default_value_t = 120)]
        in_sample: usize,
        /// Out-of-sample window size in bars
        #[arg(long, default_value_t = 40)]
        out_sample: usize,
        /// Search type: grid or hill-climb
        #[arg(long, default_value = "grid")]
        optimizer: String,
        /// Optional JSON export path for the out-of-sample trades
        #[arg(long)]
        export: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,strategy_lab=debug")
    } else {
        EnvFilter::new("info,engine=info,strategy_lab=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn parse_optimizer(s: &str) -> OptimizationType {
    match s.to_lowercase().as_str() {
        "hill-climb" => OptimizationType::HillClimb,
        _ => OptimizationType::Grid,
    }
}

fn parse_direction(s: &str) -> SearchDirection {
    match s.to_lowercase().as_str() {
        "min" => SearchDirection::Min,
        _ => SearchDirection::Max,
    }
}

/// Seeded random-walk OHLCV series anchored to the current time
fn synthetic_series(num_bars: usize, seed: u64) -> Vec<Bar> {
    let mut random = Random::new(seed);
    let start_time = Utc::now().timestamp_millis() - num_bars as i64 * BAR_INTERVAL_MS;
    let mut close = dec!(100);
    let mut bars = Vec::with_capacity(num_bars);
    for i in 0..num_bars {
        let open = close;
        let drift = Decimal::from_f64(random.real_in_range(-1.0, 1.0))
            .unwrap_or(Decimal::ZERO)
            .round_dp(4);
        close = (open + drift).max(dec!(1));
        let wick = Decimal::from_f64(random.real_in_range(0.0, 0.5))
            .unwrap_or(Decimal::ZERO)
            .round_dp(4);
        bars.push(Bar {
            time: start_time + i as i64 * BAR_INTERVAL_MS,
            open,
            high: open.max(close) + wick,
            low: (open.min(close) - wick).max(dec!(0.5)),
            close,
            volume: Decimal::from(random.int_in_range(100, 10_000)),
        });
    }
    bars
}

fn total_profit(trades: &[Trade]) -> Decimal {
    trades.iter().map(|trade| trade.profit).sum()
}

fn export_json<T: serde::Serialize>(path: &str, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    info!(path, "exported results");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Backtest {
            bars,
            seed,
            sma,
            stop_loss,
            trailing_stop,
            profit_target,
            export,
        } => cmd_backtest(bars, seed, sma, stop_loss, trailing_stop, profit_target, export),
        Commands::Optimize {
            bars,
            seed,
            optimizer,
            direction,
            start,
            end,
            step,
            starting_points,
            export,
        } => {
            let parameter = ParameterDef {
                name: "sma_period".to_string(),
                starting_value: start,
                ending_value: end,
                step_size: step,
            };
            let options = OptimizeOptions {
                search_direction: parse_direction(&direction),
                optimization_type: parse_optimizer(&optimizer),
                record_all_results: true,
                record_duration: true,
                random_seed: seed,
                num_starting_points: starting_points,
            };
            cmd_optimize(bars, seed, parameter, options, export)
        }
        Commands::WalkForward {
            bars,
            seed,
            in_sample,
            out_sample,
            optimizer,
            export,
        } => cmd_walk_forward(bars, seed, in_sample, out_sample, &optimizer, export),
    }
}

fn cmd_backtest(
    num_bars: usize,
    seed: u64,
    sma: u32,
    stop_loss: Option<Decimal>,
    trailing_stop: Option<Decimal>,
    profit_target: Option<Decimal>,
    export: Option<String>,
) -> anyhow::Result<()> {
    let series = to_sma_bars(&synthetic_series(num_bars, seed));
    let strategy = mean_reversion(&MeanReversionConfig {
        sma_period: sma,
        stop_loss_pct: stop_loss,
        trailing_stop_pct: trailing_stop,
        profit_target_pct: profit_target,
    });

    let options = BacktestOptions {
        record_stop_price: true,
        record_risk: true,
    };
    let trades = backtest(&strategy, &series, options)?;

    let winners = trades
        .iter()
        .filter(|trade| trade.profit > Decimal::ZERO)
        .count();
    println!("bars:         {num_bars}");
    println!("trades:       {}", trades.len());
    println!("winners:      {winners}");
    println!("total profit: {}", total_profit(&trades).round_dp(4));

    if let Some(path) = export {
        export_json(&path, &trades)?;
    }
    Ok(())
}

fn cmd_optimize(
    num_bars: usize,
    seed: u64,
    parameter: ParameterDef,
    options: OptimizeOptions,
    export: Option<String>,
) -> anyhow::Result<()> {
    let series = to_sma_bars(&synthetic_series(num_bars, seed));
    let strategy = mean_reversion(&MeanReversionConfig::default());
    let parameters = [parameter];

    let result = optimize(&strategy, &parameters, &total_profit, &series, &options)?;

    println!("best metric:  {}", result.best_result.round_dp(4));
    println!(
        "best period:  {}",
        result.best_parameter_values["sma_period"]
    );
    if let Some(all) = &result.all_results {
        println!("evaluations:  {}", all.len());
    }
    if let Some(duration) = result.duration_ms {
        println!("duration:     {duration} ms");
    }

    if let Some(path) = export {
        export_json(&path, &result)?;
    }
    Ok(())
}

fn cmd_walk_forward(
    num_bars: usize,
    seed: u64,
    in_sample: usize,
    out_sample: usize,
    optimizer: &str,
    export: Option<String>,
) -> anyhow::Result<()> {
    let series = to_sma_bars(&synthetic_series(num_bars, seed));
    let strategy = mean_reversion(&MeanReversionConfig::default());
    let parameters = [ParameterDef {
        name: "sma_period".to_string(),
        starting_value: dec!(5),
        ending_value: dec!(50),
        step_size: dec!(5),
    }];
    let options = OptimizeOptions {
        optimization_type: parse_optimizer(optimizer),
        random_seed: seed,
        ..Default::default()
    };

    let result = walk_forward_optimize(
        &strategy,
        &parameters,
        &total_profit,
        &series,
        in_sample,
        out_sample,
        &options,
    )?;

    println!("out-of-sample trades: {}", result.trades.len());
    println!(
        "total profit:         {}",
        total_profit(&result.trades).round_dp(4)
    );

    if let Some(path) = export {
        export_json(&path, &result.trades)?;
    }
    Ok(())
}
