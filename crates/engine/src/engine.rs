//! Bar-by-bar backtesting engine
//!
//! Replays an ordered bar series through a position state machine and emits
//! one [`Trade`] per completed position. Per bar, at most one transition:
//! Flat -> EnterPending -> InPosition -> ExitPending, with intrabar stop and
//! profit-target fills taking priority over rule-driven exits.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use tracing::debug;

use crate::strategy::{PositionRuleArgs, RuleArgs, Strategy};
use crate::types::{
    BacktestOptions, BarLike, ExitReason, TimestampedValue, Trade, TradeDirection,
};
use crate::{EngineError, EngineResult};

/// Mutable position state while a trade is open.
///
/// Owned by the engine for the duration of one trade and converted into an
/// immutable [`Trade`] on close. Exit and stop rules receive a read-only view.
#[derive(Debug, Clone)]
pub struct Position {
    pub direction: TradeDirection,
    pub entry_time: i64,
    pub entry_price: Decimal,
    /// Running per-unit profit, marked to the most recent close
    pub profit: Decimal,
    pub profit_pct: Decimal,
    pub growth: Decimal,
    /// Bars held so far
    pub holding_period: u32,
    pub initial_stop_price: Option<Decimal>,
    pub cur_stop_price: Option<Decimal>,
    pub initial_unit_risk: Option<Decimal>,
    pub initial_risk_pct: Option<Decimal>,
    pub cur_risk_pct: Option<Decimal>,
    pub cur_rmultiple: Option<Decimal>,
    pub profit_target: Option<Decimal>,
    pub stop_price_series: Option<Vec<TimestampedValue>>,
    pub risk_series: Option<Vec<TimestampedValue>>,
}

/// Position status across bars. Open-position states own the position, so an
/// exit-pending state without a position cannot be represented.
enum PositionStatus {
    Flat,
    EnterPending {
        direction: TradeDirection,
        conditional_entry_price: Option<Decimal>,
    },
    InPosition(Position),
    ExitPending(Position),
}

/// Backtest a strategy against a bar series and produce the completed trades.
///
/// Fails before any simulation work if the series is empty or shorter than
/// the strategy's lookback period. Errors raised by rule functions propagate
/// unmodified.
pub fn backtest<B>(
    strategy: &Strategy<B>,
    bars: &[B],
    options: BacktestOptions,
) -> EngineResult<Vec<Trade>>
where
    B: BarLike + Clone,
{
    if bars.is_empty() {
        return Err(EngineError::EmptySeries);
    }
    let lookback_period = strategy.lookback_period.max(1);
    if bars.len() < lookback_period {
        return Err(EngineError::InsufficientData {
            bars: bars.len(),
            lookback: lookback_period,
        });
    }

    let prepared;
    let series: &[B] = match &strategy.prep_indicators {
        Some(prep) => {
            prepared = prep(&strategy.parameters, bars)?;
            &prepared
        }
        None => bars,
    };

    debug!(
        bars = series.len(),
        lookback = lookback_period,
        "starting backtest"
    );

    let mut completed_trades: Vec<Trade> = Vec::new();
    let mut status = PositionStatus::Flat;
    let mut lookback_buffer: VecDeque<B> = VecDeque::with_capacity(lookback_period + 1);

    for bar in series {
        lookback_buffer.push_back(bar.clone());
        if lookback_buffer.len() > lookback_period {
            lookback_buffer.pop_front();
        }
        if lookback_buffer.len() < lookback_period {
            continue; // Don't invoke rules until the lookback is satisfied.
        }
        let lookback: &[B] = lookback_buffer.make_contiguous();

        status = match status {
            PositionStatus::Flat => {
                let args = RuleArgs {
                    bar,
                    lookback,
                    parameters: &strategy.parameters,
                };
                match (strategy.entry_rule)(&args)? {
                    Some(order) => PositionStatus::EnterPending {
                        direction: order.direction,
                        conditional_entry_price: order.entry_price,
                    },
                    None => PositionStatus::Flat,
                }
            }
            PositionStatus::EnterPending {
                direction,
                conditional_entry_price,
            } => try_enter_position(
                strategy,
                direction,
                conditional_entry_price,
                bar,
                lookback,
                options,
            )?,
            PositionStatus::InPosition(position) => in_position_bar(
                strategy,
                position,
                bar,
                lookback,
                options,
                &mut completed_trades,
            )?,
            PositionStatus::ExitPending(position) => {
                debug!(price = %bar.open(), time = bar.time(), "closing position on exit rule");
                completed_trades.push(finalize_position(
                    position,
                    bar.time(),
                    bar.open(),
                    ExitReason::ExitRule,
                ));
                PositionStatus::Flat
            }
        };
    }

    // A position still open after the last bar is closed at its close price.
    if let PositionStatus::InPosition(position) | PositionStatus::ExitPending(position) = status {
        let last = series
            .last()
            .expect("an open position implies at least one bar");
        completed_trades.push(finalize_position(
            position,
            last.time(),
            last.close(),
            ExitReason::Finalize,
        ));
    }

    debug!(trades = completed_trades.len(), "backtest complete");
    Ok(completed_trades)
}

/// Handle one bar in the enter-pending state: wait for a conditional entry
/// price to be breached, then open the position at this bar's open.
fn try_enter_position<B>(
    strategy: &Strategy<B>,
    direction: TradeDirection,
    conditional_entry_price: Option<Decimal>,
    bar: &B,
    lookback: &[B],
    options: BacktestOptions,
) -> EngineResult<PositionStatus>
where
    B: BarLike,
{
    if let Some(required) = conditional_entry_price {
        let breached = match direction {
            TradeDirection::Long => bar.high() >= required,
            TradeDirection::Short => bar.low() <= required,
        };
        if !breached {
            // Remain pending until the conditional price is reached.
            return Ok(PositionStatus::EnterPending {
                direction,
                conditional_entry_price,
            });
        }
    }

    let entry_price = bar.open();
    let mut position = Position {
        direction,
        entry_time: bar.time(),
        entry_price,
        profit: Decimal::ZERO,
        profit_pct: Decimal::ZERO,
        growth: Decimal::ONE,
        holding_period: 0,
        initial_stop_price: None,
        cur_stop_price: None,
        initial_unit_risk: None,
        initial_risk_pct: None,
        cur_risk_pct: None,
        cur_rmultiple: None,
        profit_target: None,
        stop_price_series: None,
        risk_series: None,
    };

    if let Some(stop_rule) = &strategy.stop_loss {
        let distance = stop_rule(&PositionRuleArgs {
            entry_price,
            position: &position,
            bar,
            lookback,
            parameters: &strategy.parameters,
        })?;
        let stop_price = match direction {
            TradeDirection::Long => entry_price - distance,
            TradeDirection::Short => entry_price + distance,
        };
        position.initial_stop_price = Some(stop_price);
        position.cur_stop_price = Some(stop_price);
    }

    if let Some(trailing_rule) = &strategy.trailing_stop_loss {
        let distance = trailing_rule(&PositionRuleArgs {
            entry_price,
            position: &position,
            bar,
            lookback,
            parameters: &strategy.parameters,
        })?;
        let trailing_stop = match direction {
            TradeDirection::Long => entry_price - distance,
            TradeDirection::Short => entry_price + distance,
        };
        // When a fixed stop is also defined, keep whichever is tighter.
        let merged = match (position.initial_stop_price, direction) {
            (None, _) => trailing_stop,
            (Some(existing), TradeDirection::Long) => existing.max(trailing_stop),
            (Some(existing), TradeDirection::Short) => existing.min(trailing_stop),
        };
        position.initial_stop_price = Some(merged);
        position.cur_stop_price = Some(merged);
    }

    if options.record_stop_price {
        if let Some(stop) = position.cur_stop_price {
            position.stop_price_series = Some(vec![TimestampedValue {
                time: bar.time(),
                value: stop,
            }]);
        }
    }

    if let Some(stop) = position.cur_stop_price {
        let unit_risk = match direction {
            TradeDirection::Long => entry_price - stop,
            TradeDirection::Short => stop - entry_price,
        };
        let risk_pct = if entry_price.is_zero() {
            Decimal::ZERO
        } else {
            unit_risk / entry_price * dec!(100)
        };
        position.initial_unit_risk = Some(unit_risk);
        position.initial_risk_pct = Some(risk_pct);
        position.cur_risk_pct = Some(risk_pct);
        position.cur_rmultiple = Some(Decimal::ZERO);
        if options.record_risk {
            position.risk_series = Some(vec![TimestampedValue {
                time: bar.time(),
                value: risk_pct,
            }]);
        }
    }

    if let Some(target_rule) = &strategy.profit_target {
        let distance = target_rule(&PositionRuleArgs {
            entry_price,
            position: &position,
            bar,
            lookback,
            parameters: &strategy.parameters,
        })?;
        position.profit_target = Some(match direction {
            TradeDirection::Long => entry_price + distance,
            TradeDirection::Short => entry_price - distance,
        });
    }

    debug!(
        direction = ?direction,
        price = %entry_price,
        time = bar.time(),
        "opened position"
    );
    Ok(PositionStatus::InPosition(position))
}

/// Handle one bar with an open position, in fixed priority order: intrabar
/// stop fill, trailing-stop tighten, intrabar profit-target fill, then mark
/// to the close and evaluate the exit rule.
fn in_position_bar<B>(
    strategy: &Strategy<B>,
    mut position: Position,
    bar: &B,
    lookback: &[B],
    options: BacktestOptions,
    completed_trades: &mut Vec<Trade>,
) -> EngineResult<PositionStatus>
where
    B: BarLike,
{
    if let Some(stop) = position.cur_stop_price {
        let breached = match position.direction {
            TradeDirection::Long => bar.low() <= stop,
            TradeDirection::Short => bar.high() >= stop,
        };
        if breached {
            debug!(price = %stop, time = bar.time(), "stop-loss hit");
            completed_trades.push(finalize_position(
                position,
                bar.time(),
                stop,
                ExitReason::StopLoss,
            ));
            return Ok(PositionStatus::Flat);
        }
    }

    if let Some(trailing_rule) = &strategy.trailing_stop_loss {
        let distance = trailing_rule(&PositionRuleArgs {
            entry_price: position.entry_price,
            position: &position,
            bar,
            lookback,
            parameters: &strategy.parameters,
        })?;
        if let Some(current) = position.cur_stop_price {
            let candidate = match position.direction {
                TradeDirection::Long => bar.close() - distance,
                TradeDirection::Short => bar.close() + distance,
            };
            let tightened = match position.direction {
                TradeDirection::Long => candidate > current,
                TradeDirection::Short => candidate < current,
            };
            if tightened {
                position.cur_stop_price = Some(candidate);
            }
        }
    }

    if options.record_stop_price {
        if let (Some(stop), Some(series)) =
            (position.cur_stop_price, position.stop_price_series.as_mut())
        {
            series.push(TimestampedValue {
                time: bar.time(),
                value: stop,
            });
        }
    }

    if let Some(target) = position.profit_target {
        let breached = match position.direction {
            TradeDirection::Long => bar.high() >= target,
            TradeDirection::Short => bar.low() <= target,
        };
        if breached {
            debug!(price = %target, time = bar.time(), "profit target hit");
            completed_trades.push(finalize_position(
                position,
                bar.time(),
                target,
                ExitReason::ProfitTarget,
            ));
            return Ok(PositionStatus::Flat);
        }
    }

    update_position(&mut position, bar);
    if options.record_risk {
        if let (Some(risk), Some(series)) = (position.cur_risk_pct, position.risk_series.as_mut())
        {
            series.push(TimestampedValue {
                time: bar.time(),
                value: risk,
            });
        }
    }

    if let Some(exit_rule) = &strategy.exit_rule {
        let should_exit = exit_rule(&PositionRuleArgs {
            entry_price: position.entry_price,
            position: &position,
            bar,
            lookback,
            parameters: &strategy.parameters,
        })?;
        if should_exit {
            // Exit executes at the next bar's open.
            return Ok(PositionStatus::ExitPending(position));
        }
    }

    Ok(PositionStatus::InPosition(position))
}

/// Mark an open position to a bar's close
fn update_position<B: BarLike>(position: &mut Position, bar: &B) {
    let close = bar.close();
    position.profit = match position.direction {
        TradeDirection::Long => close - position.entry_price,
        TradeDirection::Short => position.entry_price - close,
    };
    position.profit_pct = if position.entry_price.is_zero() {
        Decimal::ZERO
    } else {
        position.profit / position.entry_price * dec!(100)
    };
    position.growth = growth(position.direction, position.entry_price, close);
    if let Some(stop) = position.cur_stop_price {
        let unit_risk = match position.direction {
            TradeDirection::Long => close - stop,
            TradeDirection::Short => stop - close,
        };
        position.cur_risk_pct = if close.is_zero() {
            None
        } else {
            Some(unit_risk / close * dec!(100))
        };
        position.cur_rmultiple = if unit_risk.is_zero() {
            None
        } else {
            Some(position.profit / unit_risk)
        };
    }
    position.holding_period += 1;
}

/// Convert an exited position into an immutable trade
fn finalize_position(
    position: Position,
    exit_time: i64,
    exit_price: Decimal,
    exit_reason: ExitReason,
) -> Trade {
    let profit = match position.direction {
        TradeDirection::Long => exit_price - position.entry_price,
        TradeDirection::Short => position.entry_price - exit_price,
    };
    let profit_pct = if position.entry_price.is_zero() {
        Decimal::ZERO
    } else {
        profit / position.entry_price * dec!(100)
    };
    let rmultiple = position
        .initial_unit_risk
        .and_then(|risk| (!risk.is_zero()).then(|| profit / risk));
    Trade {
        direction: position.direction,
        entry_time: position.entry_time,
        entry_price: position.entry_price,
        exit_time,
        exit_price,
        profit,
        profit_pct,
        growth: growth(position.direction, position.entry_price, exit_price),
        risk_pct: position.initial_risk_pct,
        rmultiple,
        holding_period: position.holding_period,
        exit_reason,
        stop_price: position.initial_stop_price,
        profit_target: position.profit_target,
        stop_price_series: position.stop_price_series,
        risk_series: position.risk_series,
    }
}

fn growth(direction: TradeDirection, entry_price: Decimal, exit_price: Decimal) -> Decimal {
    match direction {
        TradeDirection::Long => {
            if entry_price.is_zero() {
                Decimal::ZERO
            } else {
                exit_price / entry_price
            }
        }
        TradeDirection::Short => {
            if exit_price.is_zero() {
                Decimal::ZERO
            } else {
                entry_price / exit_price
            }
        }
    }
}
