//! End-to-end run of the mean-reversion strategy through backtest, optimize,
//! walk-forward and Monte Carlo resampling over a synthetic oscillating series.

use engine::{
    backtest, mean_reversion, monte_carlo, optimize, to_sma_bars, walk_forward_optimize,
    BacktestOptions, Bar, ExitReason, MeanReversionConfig, OptimizationType, OptimizeOptions,
    ParameterDef, SearchDirection, Trade, TradeDirection,
};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Deterministic oscillating price series around 100
fn synthetic_series(count: usize) -> Vec<Bar> {
    (0..count)
        .map(|i| {
            let phase = i as f64 * 0.35;
            let close = 100.0 + 12.0 * phase.sin();
            let open = 100.0 + 12.0 * ((i as f64 - 1.0) * 0.35).sin();
            let close = Decimal::from_f64(close).unwrap().round_dp(2);
            let open = Decimal::from_f64(open).unwrap().round_dp(2);
            Bar {
                time: i as i64 * 60_000,
                open,
                high: open.max(close) + dec!(0.5),
                low: open.min(close) - dec!(0.5),
                close,
                volume: dec!(5000),
            }
        })
        .collect()
}

fn total_profit(trades: &[Trade]) -> Decimal {
    trades.iter().map(|trade| trade.profit).sum()
}

fn check_trade_invariants(trades: &[Trade]) {
    for trade in trades {
        match trade.direction {
            TradeDirection::Long => {
                assert_eq!(trade.profit, trade.exit_price - trade.entry_price);
                assert_eq!(trade.growth, trade.exit_price / trade.entry_price);
            }
            TradeDirection::Short => {
                assert_eq!(trade.profit, trade.entry_price - trade.exit_price);
                assert_eq!(trade.growth, trade.entry_price / trade.exit_price);
            }
        }
        assert!(trade.exit_time >= trade.entry_time);
    }
}

#[test]
fn backtest_mean_reversion_with_stops() {
    let bars = synthetic_series(240);
    let strategy = mean_reversion(&MeanReversionConfig {
        sma_period: 20,
        stop_loss_pct: Some(dec!(5)),
        trailing_stop_pct: Some(dec!(8)),
        profit_target_pct: Some(dec!(10)),
    });

    let options = BacktestOptions {
        record_stop_price: true,
        record_risk: true,
    };
    let trades = backtest(&strategy, &to_sma_bars(&bars), options).unwrap();
    assert!(!trades.is_empty());
    check_trade_invariants(&trades);

    for trade in &trades {
        // Long-only strategy: the trailing stop never loosens.
        let series = trade.stop_price_series.as_ref().unwrap();
        assert!(series.windows(2).all(|pair| pair[0].value <= pair[1].value));
        assert!(trade.risk_pct.is_some());
        assert!(trade.rmultiple.is_some());
    }

    // Any position still open at the end was finalized at the last close.
    if let Some(last_trade) = trades.last() {
        if last_trade.exit_reason == ExitReason::Finalize {
            let last_bar = bars.last().unwrap();
            assert_eq!(last_trade.exit_time, last_bar.time);
            assert_eq!(last_trade.exit_price, last_bar.close);
        }
    }
}

#[test]
fn grid_optimize_mean_reversion() {
    let bars = synthetic_series(240);
    let strategy = mean_reversion(&MeanReversionConfig::default());
    let parameters = [ParameterDef {
        name: "sma_period".to_string(),
        starting_value: dec!(5),
        ending_value: dec!(25),
        step_size: dec!(10),
    }];
    let options = OptimizeOptions {
        record_all_results: true,
        record_duration: true,
        ..Default::default()
    };

    let result = optimize(&strategy, &parameters, &total_profit, &to_sma_bars(&bars), &options)
        .unwrap();

    let all = result.all_results.as_ref().unwrap();
    assert_eq!(all.len(), 3);
    let best_period = result.best_parameter_values["sma_period"];
    assert!([dec!(5), dec!(15), dec!(25)].contains(&best_period));
    // The reported best really is the best recorded metric.
    assert!(all.iter().all(|it| it.metric <= result.best_result));
    assert!(result.duration_ms.is_some());
    // The caller's strategy still carries its original parameter value.
    assert_eq!(strategy.parameters["sma_period"], dec!(30));
}

#[test]
fn hill_climb_optimize_matches_grid_space() {
    let bars = synthetic_series(240);
    let strategy = mean_reversion(&MeanReversionConfig::default());
    let parameters = [ParameterDef {
        name: "sma_period".to_string(),
        starting_value: dec!(5),
        ending_value: dec!(25),
        step_size: dec!(5),
    }];
    let options = OptimizeOptions {
        optimization_type: OptimizationType::HillClimb,
        search_direction: SearchDirection::Max,
        random_seed: 17,
        ..Default::default()
    };

    let first = optimize(&strategy, &parameters, &total_profit, &to_sma_bars(&bars), &options)
        .unwrap();
    let second = optimize(&strategy, &parameters, &total_profit, &to_sma_bars(&bars), &options)
        .unwrap();
    assert_eq!(first.best_result, second.best_result);
    assert_eq!(first.best_parameter_values, second.best_parameter_values);

    // Hill climb can only land on grid points of the axis.
    let best_period = first.best_parameter_values["sma_period"];
    assert_eq!((best_period - dec!(5)) % dec!(5), dec!(0));
}

#[test]
fn walk_forward_produces_out_of_sample_trades_only() {
    let bars = synthetic_series(240);
    let strategy = mean_reversion(&MeanReversionConfig::default());
    let parameters = [ParameterDef {
        name: "sma_period".to_string(),
        starting_value: dec!(5),
        ending_value: dec!(15),
        step_size: dec!(5),
    }];

    let in_sample = 60;
    let out_sample = 30;
    let result = walk_forward_optimize(
        &strategy,
        &parameters,
        &total_profit,
        &to_sma_bars(&bars),
        in_sample,
        out_sample,
        &OptimizeOptions::default(),
    )
    .unwrap();

    assert!(!result.trades.is_empty());
    check_trade_invariants(&result.trades);

    // Every trade happens after the first in-sample window.
    let first_out_sample_time = bars[in_sample].time;
    for trade in &result.trades {
        assert!(trade.entry_time >= first_out_sample_time);
    }
}

#[test]
fn monte_carlo_resampling_is_reproducible() {
    let bars = synthetic_series(240);
    let strategy = mean_reversion(&MeanReversionConfig::default());
    let trades = backtest(&strategy, &to_sma_bars(&bars), BacktestOptions::default()).unwrap();
    assert!(!trades.is_empty());

    let first = monte_carlo(&trades, 50, 10, 7).unwrap();
    let second = monte_carlo(&trades, 50, 10, 7).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 50);
}
