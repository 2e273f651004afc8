//! Parameter optimization over the backtest engine
//!
//! Searches the discretized space defined by a list of [`ParameterDef`] axes
//! for the coordinate that maximizes (or minimizes) a caller-supplied
//! objective over the resulting trades. Two search types: exhaustive grid
//! search and seeded multi-start hill climbing.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

use crate::engine::backtest;
use crate::random::Random;
use crate::strategy::Strategy;
use crate::types::{BacktestOptions, BarLike, ParameterDef, StrategyParams, Trade};
use crate::{EngineError, EngineResult};

// ============================================================================
// Types
// ============================================================================

/// Whether the objective is to be maximized or minimized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDirection {
    Max,
    Min,
}

impl fmt::Display for SearchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchDirection::Max => write!(f, "max"),
            SearchDirection::Min => write!(f, "min"),
        }
    }
}

/// Search strategy used by [`optimize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptimizationType {
    Grid,
    HillClimb,
}

impl fmt::Display for OptimizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationType::Grid => write!(f, "grid"),
            OptimizationType::HillClimb => write!(f, "hill-climb"),
        }
    }
}

/// Options for a single optimization run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeOptions {
    pub search_direction: SearchDirection,
    pub optimization_type: OptimizationType,
    /// Record every evaluated coordinate in [`OptimizeResult::all_results`]
    pub record_all_results: bool,
    /// Record the total wall-clock duration of the search
    pub record_duration: bool,
    /// Seed for the hill climb's starting-point selection
    pub random_seed: u64,
    /// Number of hill-climb restarts
    pub num_starting_points: usize,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            search_direction: SearchDirection::Max,
            optimization_type: OptimizationType::Grid,
            record_all_results: false,
            record_duration: false,
            random_seed: 0,
            num_starting_points: 4,
        }
    }
}

/// One recorded objective evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationIteration {
    pub parameter_values: StrategyParams,
    pub metric: Decimal,
    pub num_trades: usize,
}

/// Result of an optimization run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeResult {
    /// Best objective value found
    pub best_result: Decimal,
    /// Parameter values at the best coordinate
    pub best_parameter_values: StrategyParams,
    pub all_results: Option<Vec<OptimizationIteration>>,
    pub duration_ms: Option<u64>,
}

/// Backtest outcome at one coordinate
#[derive(Debug, Clone)]
struct Evaluation {
    metric: Decimal,
    num_trades: usize,
}

// ============================================================================
// Coordinate space
// ============================================================================

/// Number of grid points along one axis
fn axis_cardinality(parameter: &ParameterDef) -> u64 {
    let span = (parameter.ending_value - parameter.starting_value) / parameter.step_size;
    span.floor().to_u64().unwrap_or(0) + 1
}

/// Value of one axis at a given step count
fn coordinate_value(parameter: &ParameterDef, step_count: u64) -> Decimal {
    parameter.starting_value + Decimal::from(step_count) * parameter.step_size
}

/// Lazy mixed-radix odometer over the full Cartesian product of all axes.
///
/// The last parameter varies fastest, so the first parameter varies slowest.
struct CoordinateGrid<'a> {
    parameters: &'a [ParameterDef],
    counts: Vec<u64>,
    odometer: Option<Vec<u64>>,
}

impl<'a> CoordinateGrid<'a> {
    fn new(parameters: &'a [ParameterDef]) -> Self {
        let counts = parameters.iter().map(axis_cardinality).collect();
        Self {
            parameters,
            counts,
            odometer: Some(vec![0; parameters.len()]),
        }
    }
}

impl Iterator for CoordinateGrid<'_> {
    type Item = Vec<Decimal>;

    fn next(&mut self) -> Option<Self::Item> {
        let odometer = self.odometer.as_mut()?;
        let coordinates = odometer
            .iter()
            .zip(self.parameters)
            .map(|(&step_count, parameter)| coordinate_value(parameter, step_count))
            .collect();

        let mut rolled_over = true;
        for axis in (0..odometer.len()).rev() {
            odometer[axis] += 1;
            if odometer[axis] < self.counts[axis] {
                rolled_over = false;
                break;
            }
            odometer[axis] = 0;
        }
        if rolled_over {
            self.odometer = None;
        }
        Some(coordinates)
    }
}

/// Coordinates one step away along each axis, forward steps first, clipped to
/// the axis bounds. Each neighbour differs in exactly one dimension.
fn neighbours(coordinates: &[Decimal], parameters: &[ParameterDef]) -> Vec<Vec<Decimal>> {
    let mut out = Vec::with_capacity(parameters.len() * 2);
    for (axis, parameter) in parameters.iter().enumerate() {
        let stepped = coordinates[axis] + parameter.step_size;
        if stepped <= parameter.ending_value {
            let mut next = coordinates.to_vec();
            next[axis] = stepped;
            out.push(next);
        }
    }
    for (axis, parameter) in parameters.iter().enumerate() {
        let stepped = coordinates[axis] - parameter.step_size;
        if stepped >= parameter.starting_value {
            let mut next = coordinates.to_vec();
            next[axis] = stepped;
            out.push(next);
        }
    }
    out
}

// ============================================================================
// Objective evaluation
// ============================================================================

/// Run one backtest with the strategy's parameters overridden by a coordinate.
///
/// The override is applied to a clone; the caller's strategy and parameter
/// map are never mutated.
fn optimization_iteration<B>(
    strategy: &Strategy<B>,
    parameters: &[ParameterDef],
    objective_fn: &dyn Fn(&[Trade]) -> Decimal,
    bars: &[B],
    coordinates: &[Decimal],
) -> EngineResult<Evaluation>
where
    B: BarLike + Clone,
{
    let mut overridden = strategy.parameters.clone();
    for (parameter, value) in parameters.iter().zip(coordinates) {
        overridden.insert(parameter.name.clone(), *value);
    }
    let candidate = strategy.with_parameters(overridden);
    let trades = backtest(&candidate, bars, BacktestOptions::default())?;
    Ok(Evaluation {
        metric: objective_fn(&trades),
        num_trades: trades.len(),
    })
}

fn parameter_values(parameters: &[ParameterDef], coordinates: &[Decimal]) -> StrategyParams {
    parameters
        .iter()
        .zip(coordinates)
        .map(|(parameter, value)| (parameter.name.clone(), *value))
        .collect()
}

/// Strict improvement only: ties keep the incumbent
fn improves(direction: SearchDirection, current: Decimal, candidate: Decimal) -> bool {
    match direction {
        SearchDirection::Max => candidate > current,
        SearchDirection::Min => candidate < current,
    }
}

fn validate_parameters(parameters: &[ParameterDef]) -> EngineResult<()> {
    if parameters.is_empty() {
        return Err(EngineError::NoParameters);
    }
    for parameter in parameters {
        if parameter.step_size <= Decimal::ZERO
            || parameter.starting_value > parameter.ending_value
        {
            return Err(EngineError::InvalidParameterRange {
                name: parameter.name.clone(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Grid search
// ============================================================================

fn grid_search<B>(
    strategy: &Strategy<B>,
    parameters: &[ParameterDef],
    objective_fn: &dyn Fn(&[Trade]) -> Decimal,
    bars: &[B],
    options: &OptimizeOptions,
) -> EngineResult<OptimizeResult>
where
    B: BarLike + Clone,
{
    let started = Instant::now();
    let mut best: Option<(Decimal, Vec<Decimal>)> = None;
    let mut all_results = options.record_all_results.then(Vec::new);
    let mut evaluations = 0usize;

    for coordinates in CoordinateGrid::new(parameters) {
        let evaluation = optimization_iteration(strategy, parameters, objective_fn, bars, &coordinates)?;
        if let Some(results) = all_results.as_mut() {
            results.push(OptimizationIteration {
                parameter_values: parameter_values(parameters, &coordinates),
                metric: evaluation.metric,
                num_trades: evaluation.num_trades,
            });
        }
        let better = best
            .as_ref()
            .map_or(true, |(metric, _)| {
                improves(options.search_direction, *metric, evaluation.metric)
            });
        if better {
            best = Some((evaluation.metric, coordinates));
        }
        evaluations += 1;
    }

    let (best_result, best_coordinates) =
        best.expect("a validated parameter space contains at least one coordinate");
    info!(evaluations, best = %best_result, "grid search complete");

    Ok(OptimizeResult {
        best_result,
        best_parameter_values: parameter_values(parameters, &best_coordinates),
        all_results,
        duration_ms: options
            .record_duration
            .then(|| started.elapsed().as_millis() as u64),
    })
}

// ============================================================================
// Hill climb
// ============================================================================

/// Bookkeeping shared across all hill-climb restarts
struct ClimbState {
    direction: SearchDirection,
    /// Coordinates already evaluated in this invocation and their results
    visited: HashMap<Vec<Decimal>, Evaluation>,
    best: Option<(Decimal, Vec<Decimal>)>,
    all_results: Option<Vec<OptimizationIteration>>,
}

impl ClimbState {
    /// Evaluate a coordinate through the visited-coordinate cache.
    ///
    /// Fresh evaluations are cached under the coordinate they were computed
    /// for, recorded, and checked against the best result so far. Cache hits
    /// were already accounted for when first evaluated.
    fn evaluate<B>(
        &mut self,
        strategy: &Strategy<B>,
        parameters: &[ParameterDef],
        objective_fn: &dyn Fn(&[Trade]) -> Decimal,
        bars: &[B],
        coordinates: &[Decimal],
    ) -> EngineResult<Evaluation>
    where
        B: BarLike + Clone,
    {
        if let Some(cached) = self.visited.get(coordinates) {
            return Ok(cached.clone());
        }
        let evaluation =
            optimization_iteration(strategy, parameters, objective_fn, bars, coordinates)?;
        self.visited
            .insert(coordinates.to_vec(), evaluation.clone());
        if let Some(results) = self.all_results.as_mut() {
            results.push(OptimizationIteration {
                parameter_values: parameter_values(parameters, coordinates),
                metric: evaluation.metric,
                num_trades: evaluation.num_trades,
            });
        }
        let better = self.best.as_ref().map_or(true, |(metric, _)| {
            improves(self.direction, *metric, evaluation.metric)
        });
        if better {
            self.best = Some((evaluation.metric, coordinates.to_vec()));
        }
        Ok(evaluation)
    }
}

fn hill_climb<B>(
    strategy: &Strategy<B>,
    parameters: &[ParameterDef],
    objective_fn: &dyn Fn(&[Trade]) -> Decimal,
    bars: &[B],
    options: &OptimizeOptions,
) -> EngineResult<OptimizeResult>
where
    B: BarLike + Clone,
{
    let started = Instant::now();
    let mut random = Random::new(options.random_seed);
    let mut state = ClimbState {
        direction: options.search_direction,
        visited: HashMap::new(),
        best: None,
        all_results: options.record_all_results.then(Vec::new),
    };

    for starting_point in 0..options.num_starting_points {
        let mut working: Vec<Decimal> = parameters
            .iter()
            .map(|parameter| {
                let max_steps = (axis_cardinality(parameter) - 1) as i64;
                let step_count = random.int_in_range(0, max_steps) as u64;
                coordinate_value(parameter, step_count)
            })
            .collect();
        if state.visited.contains_key(&working) {
            debug!(starting_point, "starting point already visited");
            continue;
        }

        let mut working_eval =
            state.evaluate(strategy, parameters, objective_fn, bars, &working)?;

        // Greedy first-improvement climb: move to the first neighbour that
        // strictly improves on the working result, stop when none does.
        loop {
            let mut improved = false;
            for neighbour in neighbours(&working, parameters) {
                let evaluation =
                    state.evaluate(strategy, parameters, objective_fn, bars, &neighbour)?;
                if improves(options.search_direction, working_eval.metric, evaluation.metric) {
                    working = neighbour;
                    working_eval = evaluation;
                    improved = true;
                    break;
                }
            }
            if !improved {
                break;
            }
        }
    }

    let evaluations = state.visited.len();
    let (best_result, best_coordinates) = state
        .best
        .expect("at least one starting point is always evaluated");
    info!(evaluations, best = %best_result, "hill climb complete");

    Ok(OptimizeResult {
        best_result,
        best_parameter_values: parameter_values(parameters, &best_coordinates),
        all_results: state.all_results,
        duration_ms: options
            .record_duration
            .then(|| started.elapsed().as_millis() as u64),
    })
}

// ============================================================================
// Entry point
// ============================================================================

/// Search the parameter space for the best objective value.
///
/// Validates the parameter definitions, then dispatches to grid search or
/// hill climbing per `options.optimization_type`.
pub fn optimize<B>(
    strategy: &Strategy<B>,
    parameters: &[ParameterDef],
    objective_fn: &dyn Fn(&[Trade]) -> Decimal,
    bars: &[B],
    options: &OptimizeOptions,
) -> EngineResult<OptimizeResult>
where
    B: BarLike + Clone,
{
    validate_parameters(parameters)?;
    match options.optimization_type {
        OptimizationType::Grid => {
            info!(
                parameters = parameters.len(),
                direction = %options.search_direction,
                "starting grid search"
            );
            grid_search(strategy, parameters, objective_fn, bars, options)
        }
        OptimizationType::HillClimb => {
            if options.num_starting_points == 0 {
                return Err(EngineError::InvalidArgument(
                    "num_starting_points must be at least 1".to_string(),
                ));
            }
            info!(
                parameters = parameters.len(),
                direction = %options.search_direction,
                starting_points = options.num_starting_points,
                seed = options.random_seed,
                "starting hill climb"
            );
            hill_climb(strategy, parameters, objective_fn, bars, options)
        }
    }
}
