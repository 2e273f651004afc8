//! Walk-forward optimization driver
//!
//! Repeatedly optimizes a strategy over an in-sample window, then backtests
//! the chosen parameters over the immediately following out-of-sample window.
//! Only the out-of-sample trades are returned, giving an unbiased estimate of
//! how the re-optimized strategy would have performed on unseen data.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::backtest;
use crate::optimizer::{optimize, OptimizeOptions};
use crate::random::Random;
use crate::strategy::Strategy;
use crate::types::{BacktestOptions, BarLike, ParameterDef, Trade};
use crate::{EngineError, EngineResult};

/// Concatenated out-of-sample trades from every full walk-forward window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub trades: Vec<Trade>,
}

/// Run a walk-forward optimization over the bar series.
///
/// Each iteration optimizes over `in_sample_size` bars, backtests the best
/// parameter values over the next `out_sample_size` bars, then advances by
/// the out-of-sample size. A trailing window that cannot supply a full
/// out-of-sample slice is discarded. Every iteration feeds the optimizer a
/// fresh seed drawn from a generator seeded once with
/// `options.random_seed`, so successive optimizations are decorrelated but
/// the whole run is reproducible.
pub fn walk_forward_optimize<B>(
    strategy: &Strategy<B>,
    parameters: &[ParameterDef],
    objective_fn: &dyn Fn(&[Trade]) -> Decimal,
    bars: &[B],
    in_sample_size: usize,
    out_sample_size: usize,
    options: &OptimizeOptions,
) -> EngineResult<WalkForwardResult>
where
    B: BarLike + Clone,
{
    if in_sample_size == 0 {
        return Err(EngineError::InvalidArgument(
            "in_sample_size must be greater than zero".to_string(),
        ));
    }
    if out_sample_size == 0 {
        return Err(EngineError::InvalidArgument(
            "out_sample_size must be greater than zero".to_string(),
        ));
    }

    info!(
        bars = bars.len(),
        in_sample = in_sample_size,
        out_sample = out_sample_size,
        "starting walk-forward optimization"
    );

    let mut random = Random::new(options.random_seed);
    let mut offset = 0usize;
    let mut trades: Vec<Trade> = Vec::new();
    let mut windows = 0usize;

    while offset + in_sample_size + out_sample_size <= bars.len() {
        let in_sample = &bars[offset..offset + in_sample_size];
        let out_sample =
            &bars[offset + in_sample_size..offset + in_sample_size + out_sample_size];

        let mut window_options = options.clone();
        window_options.random_seed = random.next_seed();

        let optimized = optimize(strategy, parameters, objective_fn, in_sample, &window_options)?;

        let mut tuned_parameters = strategy.parameters.clone();
        tuned_parameters.extend(optimized.best_parameter_values);
        let tuned = strategy.with_parameters(tuned_parameters);

        let out_sample_trades = backtest(&tuned, out_sample, BacktestOptions::default())?;
        debug!(
            window = windows,
            offset,
            trades = out_sample_trades.len(),
            "walk-forward window complete"
        );
        trades.extend(out_sample_trades);

        offset += out_sample_size;
        windows += 1;
    }

    info!(windows, trades = trades.len(), "walk-forward optimization complete");
    Ok(WalkForwardResult { trades })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::EntryOrder;
    use crate::types::Bar;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn make_bars(count: usize) -> Vec<Bar> {
        (0..count)
            .map(|i| {
                let price = Decimal::from(100 + i as i64);
                Bar {
                    time: i as i64,
                    open: price,
                    high: price + dec!(1),
                    low: price - dec!(1),
                    close: price,
                    volume: dec!(1000),
                }
            })
            .collect()
    }

    fn always_enter() -> Strategy<Bar> {
        Strategy::new(Arc::new(|_args| Ok(Some(EntryOrder::default()))))
    }

    fn total_profit(trades: &[Trade]) -> Decimal {
        trades.iter().map(|trade| trade.profit).sum()
    }

    fn single_param() -> Vec<ParameterDef> {
        vec![ParameterDef {
            name: "P".to_string(),
            starting_value: dec!(1),
            ending_value: dec!(1),
            step_size: dec!(1),
        }]
    }

    #[test]
    fn test_partial_trailing_window_is_discarded() {
        // 10 bars, in-sample 4, out-of-sample 3: windows at offsets 0 and 3,
        // then offset 6 would need bars 10..13 and is discarded.
        let bars = make_bars(10);
        let strategy = always_enter();
        let parameters = single_param();

        let result = walk_forward_optimize(
            &strategy,
            &parameters,
            &total_profit,
            &bars,
            4,
            3,
            &OptimizeOptions::default(),
        )
        .unwrap();

        assert_eq!(result.trades.len(), 2);
        // First window tests bars 4..7: entry at bar 5's open, finalized at bar 6.
        assert_eq!(result.trades[0].entry_time, 5);
        assert_eq!(result.trades[0].exit_time, 6);
        // Second window tests bars 7..10.
        assert_eq!(result.trades[1].entry_time, 8);
        assert_eq!(result.trades[1].exit_time, 9);
    }

    #[test]
    fn test_series_shorter_than_one_window_yields_no_trades() {
        let bars = make_bars(5);
        let strategy = always_enter();
        let parameters = single_param();

        let result = walk_forward_optimize(
            &strategy,
            &parameters,
            &total_profit,
            &bars,
            4,
            3,
            &OptimizeOptions::default(),
        )
        .unwrap();
        assert!(result.trades.is_empty());
    }

    #[test]
    fn test_window_sizes_are_validated() {
        let bars = make_bars(10);
        let strategy = always_enter();
        let parameters = single_param();

        let result = walk_forward_optimize(
            &strategy,
            &parameters,
            &total_profit,
            &bars,
            0,
            3,
            &OptimizeOptions::default(),
        );
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));

        let result = walk_forward_optimize(
            &strategy,
            &parameters,
            &total_profit,
            &bars,
            4,
            0,
            &OptimizeOptions::default(),
        );
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn test_hill_climb_walk_forward_is_reproducible() {
        let bars = make_bars(30);
        let strategy = always_enter();
        let parameters = vec![ParameterDef {
            name: "P".to_string(),
            starting_value: dec!(1),
            ending_value: dec!(5),
            step_size: dec!(1),
        }];
        let options = OptimizeOptions {
            optimization_type: crate::optimizer::OptimizationType::HillClimb,
            random_seed: 99,
            ..Default::default()
        };

        let first = walk_forward_optimize(
            &strategy,
            &parameters,
            &total_profit,
            &bars,
            10,
            5,
            &options,
        )
        .unwrap();
        let second = walk_forward_optimize(
            &strategy,
            &parameters,
            &total_profit,
            &bars,
            10,
            5,
            &options,
        )
        .unwrap();
        assert_eq!(first.trades, second.trades);
        assert!(!first.trades.is_empty());
    }
}
