//! Strategy definition: user-supplied rule functions plus fixed values
//!
//! A [`Strategy`] bundles the entry/exit/stop rules the engine calls once per
//! bar. Rules are plain closures behind `Arc`, so a strategy can be cloned
//! cheaply when the optimizer overrides its parameters per iteration.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::engine::Position;
use crate::types::{StrategyParams, TradeDirection};

/// Arguments handed to the entry rule while flat
pub struct RuleArgs<'a, B> {
    pub bar: &'a B,
    /// The most recent `lookback_period` bars, oldest first (includes `bar`)
    pub lookback: &'a [B],
    pub parameters: &'a StrategyParams,
}

/// Arguments handed to rules that run against an open position
pub struct PositionRuleArgs<'a, B> {
    pub entry_price: Decimal,
    pub position: &'a Position,
    pub bar: &'a B,
    /// The most recent `lookback_period` bars, oldest first (includes `bar`)
    pub lookback: &'a [B],
    pub parameters: &'a StrategyParams,
}

/// An entry requested by the entry rule, executed on the next bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryOrder {
    pub direction: TradeDirection,
    /// Conditional entry price that must be breached intrabar before entering
    pub entry_price: Option<Decimal>,
}

impl EntryOrder {
    /// Enter at the next bar's open
    pub fn market(direction: TradeDirection) -> Self {
        Self {
            direction,
            entry_price: None,
        }
    }

    /// Enter at the next bar's open once `entry_price` has been breached
    pub fn conditional(direction: TradeDirection, entry_price: Decimal) -> Self {
        Self {
            direction,
            entry_price: Some(entry_price),
        }
    }
}

impl Default for EntryOrder {
    fn default() -> Self {
        Self::market(TradeDirection::Long)
    }
}

/// Augments the input series with computed indicator fields before simulation
pub type PrepIndicatorsFn<B> =
    Arc<dyn Fn(&StrategyParams, &[B]) -> anyhow::Result<Vec<B>> + Send + Sync>;

/// Called once per bar while flat; returns an order to request entry
pub type EntryRuleFn<B> =
    Arc<dyn Fn(&RuleArgs<'_, B>) -> anyhow::Result<Option<EntryOrder>> + Send + Sync>;

/// Called once per bar while in a position; returns true to request exit
pub type ExitRuleFn<B> =
    Arc<dyn Fn(&PositionRuleArgs<'_, B>) -> anyhow::Result<bool> + Send + Sync>;

/// Returns a price distance (stop-loss, trailing stop or profit target)
pub type PriceRuleFn<B> =
    Arc<dyn Fn(&PositionRuleArgs<'_, B>) -> anyhow::Result<Decimal> + Send + Sync>;

/// A rule-based trading strategy over bars of type `B`
pub struct Strategy<B = crate::types::Bar> {
    /// Minimum bars buffered before any rule fires (>= 1)
    pub lookback_period: usize,
    pub prep_indicators: Option<PrepIndicatorsFn<B>>,
    pub entry_rule: EntryRuleFn<B>,
    pub exit_rule: Option<ExitRuleFn<B>>,
    /// Distance below (long) / above (short) the entry price for the initial stop
    pub stop_loss: Option<PriceRuleFn<B>>,
    /// Re-evaluated every bar; the stop only ever tightens
    pub trailing_stop_loss: Option<PriceRuleFn<B>>,
    /// Distance above (long) / below (short) the entry price
    pub profit_target: Option<PriceRuleFn<B>>,
    pub parameters: StrategyParams,
}

impl<B> Strategy<B> {
    /// Create a strategy with just an entry rule; everything else defaults off
    pub fn new(entry_rule: EntryRuleFn<B>) -> Self {
        Self {
            lookback_period: 1,
            prep_indicators: None,
            entry_rule,
            exit_rule: None,
            stop_loss: None,
            trailing_stop_loss: None,
            profit_target: None,
            parameters: StrategyParams::new(),
        }
    }

    /// Clone this strategy with a replacement parameter map.
    ///
    /// The original strategy is left untouched; the optimizer uses this to
    /// try parameter overrides without mutating the caller's definition.
    pub fn with_parameters(&self, parameters: StrategyParams) -> Self {
        let mut cloned = self.clone();
        cloned.parameters = parameters;
        cloned
    }
}

impl<B> Clone for Strategy<B> {
    fn clone(&self) -> Self {
        Self {
            lookback_period: self.lookback_period,
            prep_indicators: self.prep_indicators.clone(),
            entry_rule: self.entry_rule.clone(),
            exit_rule: self.exit_rule.clone(),
            stop_loss: self.stop_loss.clone(),
            trailing_stop_loss: self.trailing_stop_loss.clone(),
            profit_target: self.profit_target.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bar;
    use rust_decimal_macros::dec;

    #[test]
    fn test_with_parameters_does_not_mutate_original() {
        let mut strategy: Strategy<Bar> =
            Strategy::new(Arc::new(|_args| Ok(Some(EntryOrder::default()))));
        strategy
            .parameters
            .insert("period".to_string(), dec!(10));

        let mut overridden = strategy.parameters.clone();
        overridden.insert("period".to_string(), dec!(20));
        let candidate = strategy.with_parameters(overridden);

        assert_eq!(strategy.parameters["period"], dec!(10));
        assert_eq!(candidate.parameters["period"], dec!(20));
        assert_eq!(candidate.lookback_period, 1);
    }

    #[test]
    fn test_entry_order_defaults_to_market_long() {
        let order = EntryOrder::default();
        assert_eq!(order.direction, TradeDirection::Long);
        assert!(order.entry_price.is_none());
    }
}
