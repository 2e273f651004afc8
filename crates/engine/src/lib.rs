//! Strategy Lab engine — rule-based backtesting and parameter optimization
//!
//! Provides:
//! - Bar-by-bar backtest state machine driven by injected strategy rules
//! - Grid-search and hill-climb parameter optimization with result caching
//! - Walk-forward optimization driver
//! - Monte Carlo resampling of trade lists
//! - Seeded random source for reproducible searches

pub mod engine;
pub mod monte_carlo;
pub mod optimizer;
pub mod random;
pub mod strategies;
pub mod strategy;
pub mod types;
pub mod walk_forward;

use thiserror::Error;

/// Errors surfaced to callers of the engine.
///
/// Input validation failures are raised before any simulation work begins.
/// Errors from user rule functions pass through unmodified.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input series must contain at least one bar")]
    EmptySeries,

    #[error("input series has {bars} bars, fewer than the lookback period of {lookback}")]
    InsufficientData { bars: usize, lookback: usize },

    #[error("at least one parameter definition is required")]
    NoParameters,

    #[error("parameter '{name}' needs a positive step size and starting value <= ending value")]
    InvalidParameterRange { name: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Rule(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

// Re-exports for convenience
pub use engine::{backtest, Position};
pub use monte_carlo::monte_carlo;
pub use optimizer::{
    optimize, OptimizationIteration, OptimizationType, OptimizeOptions, OptimizeResult,
    SearchDirection,
};
pub use random::Random;
pub use strategies::{mean_reversion, to_sma_bars, MeanReversionConfig, SmaBar};
pub use strategy::{
    EntryOrder, EntryRuleFn, ExitRuleFn, PositionRuleArgs, PrepIndicatorsFn, PriceRuleFn,
    RuleArgs, Strategy,
};
pub use types::{
    BacktestOptions, Bar, BarLike, ExitReason, ParameterDef, StrategyParams, TimestampedValue,
    Trade, TradeDirection,
};
pub use walk_forward::{walk_forward_optimize, WalkForwardResult};
