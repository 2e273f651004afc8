//! Monte Carlo resampling of a trade population
//!
//! Draws repeated bootstrap samples (with replacement) from a list of
//! completed trades. Downstream analysis runs its statistics over each sample
//! to estimate the distribution of outcomes rather than a single path.

use crate::random::Random;
use crate::types::Trade;
use crate::{EngineError, EngineResult};

/// Produce `num_iterations` samples of `num_samples` trades each, drawn with
/// replacement from `trades`. An empty population yields no samples. Fully
/// reproducible for a fixed seed.
pub fn monte_carlo(
    trades: &[Trade],
    num_iterations: usize,
    num_samples: usize,
    seed: u64,
) -> EngineResult<Vec<Vec<Trade>>> {
    if num_iterations < 1 {
        return Err(EngineError::InvalidArgument(
            "num_iterations must be at least 1".to_string(),
        ));
    }
    if num_samples < 1 {
        return Err(EngineError::InvalidArgument(
            "num_samples must be at least 1".to_string(),
        ));
    }
    if trades.is_empty() {
        return Ok(Vec::new());
    }

    let mut random = Random::new(seed);
    let mut samples = Vec::with_capacity(num_iterations);
    for _ in 0..num_iterations {
        let mut sample = Vec::with_capacity(num_samples);
        for _ in 0..num_samples {
            let index = random.int_in_range(0, trades.len() as i64 - 1) as usize;
            sample.push(trades[index].clone());
        }
        samples.push(sample);
    }
    Ok(samples)
}
