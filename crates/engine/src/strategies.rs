//! Ready-made example strategies
//!
//! A small catalog of strategies built on the public [`Strategy`] surface,
//! used by the CLI and the integration tests. Also demonstrates the
//! indicator-augmented bar pattern: [`SmaBar`] wraps a [`Bar`] plus a moving
//! average computed by the prep-indicators step.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ta::indicators::SimpleMovingAverage;
use ta::Next;

use crate::strategy::{EntryOrder, RuleArgs, Strategy};
use crate::types::{Bar, BarLike, StrategyParams};

/// A bar augmented with a simple moving average of the close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmaBar {
    pub bar: Bar,
    pub sma: Decimal,
}

impl BarLike for SmaBar {
    fn time(&self) -> i64 {
        self.bar.time
    }
    fn open(&self) -> Decimal {
        self.bar.open
    }
    fn high(&self) -> Decimal {
        self.bar.high
    }
    fn low(&self) -> Decimal {
        self.bar.low
    }
    fn close(&self) -> Decimal {
        self.bar.close
    }
    fn volume(&self) -> Decimal {
        self.bar.volume
    }
}

/// Wrap raw bars for a strategy whose prep step fills in the moving average
pub fn to_sma_bars(bars: &[Bar]) -> Vec<SmaBar> {
    bars.iter()
        .map(|bar| SmaBar {
            bar: bar.clone(),
            sma: Decimal::ZERO,
        })
        .collect()
}

/// Configuration for [`mean_reversion`]
#[derive(Debug, Clone)]
pub struct MeanReversionConfig {
    /// Moving-average period; also exposed as the "sma_period" parameter
    pub sma_period: u32,
    /// Fixed stop distance as a percentage of the entry price
    pub stop_loss_pct: Option<Decimal>,
    /// Trailing stop distance as a percentage of the current close
    pub trailing_stop_pct: Option<Decimal>,
    /// Profit target distance as a percentage of the entry price
    pub profit_target_pct: Option<Decimal>,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            sma_period: 30,
            stop_loss_pct: None,
            trailing_stop_pct: None,
            profit_target_pct: None,
        }
    }
}

/// Compute the moving average and drop the warm-up bars.
///
/// The period comes from the resolved "sma_period" parameter so the
/// optimizer can vary it per iteration.
fn prep_sma(parameters: &StrategyParams, bars: &[SmaBar]) -> anyhow::Result<Vec<SmaBar>> {
    let period = parameters
        .get("sma_period")
        .and_then(|value| value.to_u64())
        .unwrap_or(30) as usize;
    if period == 0 {
        anyhow::bail!("sma_period must be at least 1");
    }
    let mut sma = SimpleMovingAverage::new(period).expect("a positive period is always valid");

    let mut prepped = Vec::with_capacity(bars.len().saturating_sub(period - 1));
    for (i, source) in bars.iter().enumerate() {
        let value = sma.next(source.bar.close.to_f64().unwrap_or(0.0));
        if i + 1 >= period {
            let mut enriched = source.clone();
            enriched.sma = Decimal::from_f64(value).unwrap_or(Decimal::ZERO);
            prepped.push(enriched);
        }
    }
    Ok(prepped)
}

/// Classic long-only mean reversion: enter below the moving average, exit
/// above it, with optional stop and target rules layered on top.
pub fn mean_reversion(config: &MeanReversionConfig) -> Strategy<SmaBar> {
    let mut strategy = Strategy::new(Arc::new(|args: &RuleArgs<'_, SmaBar>| {
        if args.bar.close() < args.bar.sma {
            Ok(Some(EntryOrder::default()))
        } else {
            Ok(None)
        }
    }));
    strategy.prep_indicators = Some(Arc::new(prep_sma));
    strategy.exit_rule = Some(Arc::new(|args| Ok(args.bar.close() > args.bar.sma)));
    strategy
        .parameters
        .insert("sma_period".to_string(), Decimal::from(config.sma_period));

    if let Some(pct) = config.stop_loss_pct {
        strategy.stop_loss = Some(Arc::new(move |args| Ok(args.entry_price * pct / dec!(100))));
    }
    if let Some(pct) = config.trailing_stop_pct {
        strategy.trailing_stop_loss =
            Some(Arc::new(move |args| Ok(args.bar.close() * pct / dec!(100))));
    }
    if let Some(pct) = config.profit_target_pct {
        strategy.profit_target =
            Some(Arc::new(move |args| Ok(args.entry_price * pct / dec!(100))));
    }

    strategy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backtest;
    use crate::types::{BacktestOptions, ExitReason, TradeDirection};

    fn flat_bar(time: i64, price: Decimal) -> Bar {
        Bar {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: dec!(1000),
        }
    }

    #[test]
    fn test_prep_drops_warmup_bars_and_fills_sma() {
        let bars: Vec<Bar> = (0..6).map(|i| flat_bar(i, dec!(10))).collect();
        let mut parameters = StrategyParams::new();
        parameters.insert("sma_period".to_string(), dec!(3));

        let prepped = prep_sma(&parameters, &to_sma_bars(&bars)).unwrap();
        assert_eq!(prepped.len(), 4);
        assert_eq!(prepped[0].bar.time, 2);
        assert!(prepped.iter().all(|bar| bar.sma == dec!(10)));
    }

    #[test]
    fn test_mean_reversion_round_trip() {
        let closes = [
            dec!(100),
            dec!(100),
            dec!(100),
            dec!(90),  // dips below the average: entry requested
            dec!(90),  // entry fills here
            dec!(120), // back above the average: exit requested
            dec!(120), // exit fills here
            dec!(120),
        ];
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &price)| flat_bar(i as i64, price))
            .collect();

        let strategy = mean_reversion(&MeanReversionConfig {
            sma_period: 3,
            ..Default::default()
        });
        let trades = backtest(&strategy, &to_sma_bars(&bars), BacktestOptions::default()).unwrap();

        assert_eq!(trades.len(), 1);
        let trade = &trades[0];
        assert_eq!(trade.direction, TradeDirection::Long);
        assert_eq!(trade.entry_time, 4);
        assert_eq!(trade.entry_price, dec!(90));
        assert_eq!(trade.exit_time, 6);
        assert_eq!(trade.exit_price, dec!(120));
        assert_eq!(trade.exit_reason, ExitReason::ExitRule);
    }

    #[test]
    fn test_mean_reversion_with_stop_records_risk() {
        let strategy = mean_reversion(&MeanReversionConfig {
            sma_period: 3,
            stop_loss_pct: Some(dec!(5)),
            ..Default::default()
        });
        let closes = [
            dec!(100),
            dec!(100),
            dec!(100),
            dec!(90),
            dec!(90),
            dec!(120),
            dec!(120),
        ];
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &price)| flat_bar(i as i64, price))
            .collect();

        let trades = backtest(&strategy, &to_sma_bars(&bars), BacktestOptions::default()).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].risk_pct, Some(dec!(5)));
        assert_eq!(trades[0].stop_price, Some(dec!(85.50)));
    }
}
