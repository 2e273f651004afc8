//! Types for the backtesting engine

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single price bar (OHLCV), stamped with an epoch-millisecond time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Read access to the base OHLCV fields of a bar.
///
/// Strategies that precompute indicators define their own bar type wrapping
/// [`Bar`] plus the extra fields, and implement this trait by delegation.
/// The engine only ever touches bars through these accessors.
pub trait BarLike {
    fn time(&self) -> i64;
    fn open(&self) -> Decimal;
    fn high(&self) -> Decimal;
    fn low(&self) -> Decimal;
    fn close(&self) -> Decimal;
    fn volume(&self) -> Decimal;
}

impl BarLike for Bar {
    fn time(&self) -> i64 {
        self.time
    }
    fn open(&self) -> Decimal {
        self.open
    }
    fn high(&self) -> Decimal {
        self.high
    }
    fn low(&self) -> Decimal {
        self.low
    }
    fn close(&self) -> Decimal {
        self.close
    }
    fn volume(&self) -> Decimal {
        self.volume
    }
}

/// Direction of a position or trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Long,
    Short,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    StopLoss,
    ProfitTarget,
    ExitRule,
    Finalize,
}

/// A value recorded against a bar time (stop price, risk percentage)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampedValue {
    pub time: i64,
    pub value: Decimal,
}

/// A completed trade emitted by the backtest engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub direction: TradeDirection,
    pub entry_time: i64,
    pub entry_price: Decimal,
    pub exit_time: i64,
    pub exit_price: Decimal,
    /// Per-unit profit in price terms
    pub profit: Decimal,
    pub profit_pct: Decimal,
    /// Capital multiplier for one unit: exit/entry for long, entry/exit for short
    pub growth: Decimal,
    /// Initial risk as a percentage of the entry price, when a stop was set
    pub risk_pct: Option<Decimal>,
    /// Profit divided by the initial per-unit risk, when a stop was set
    pub rmultiple: Option<Decimal>,
    /// Number of bars the position was held
    pub holding_period: u32,
    pub exit_reason: ExitReason,
    /// Initial stop price, when a stop was set
    pub stop_price: Option<Decimal>,
    pub profit_target: Option<Decimal>,
    pub stop_price_series: Option<Vec<TimestampedValue>>,
    pub risk_series: Option<Vec<TimestampedValue>>,
}

/// Per-bar recording switches for a backtest run
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BacktestOptions {
    /// Record the stop price against every bar the position is open
    pub record_stop_price: bool,
    /// Record the risk percentage against every bar the position is open
    pub record_risk: bool,
}

/// Resolved parameter values handed to strategy rules
pub type StrategyParams = HashMap<String, Decimal>;

/// One discretized axis of an optimization search space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub name: String,
    pub starting_value: Decimal,
    pub ending_value: Decimal,
    pub step_size: Decimal,
}
