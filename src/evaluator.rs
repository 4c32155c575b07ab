//! Pluggable scoring of simulator snapshots.

use crate::sim::SimState;

/// Scores a state for sampling and leaf selection. Higher is better.
pub trait Evaluator<S: SimState>: Send + Sync {
    fn evaluate(&self, state: &S) -> f32;
}

/// The same score for every state. Useful when a test needs backpropagation
/// arithmetic to be exact.
#[derive(Clone, Copy, Debug)]
pub struct ConstantEvaluator {
    pub value: f32,
}

impl<S: SimState> Evaluator<S> for ConstantEvaluator {
    fn evaluate(&self, _state: &S) -> f32 {
        self.value
    }
}

/// Uniform noise in `[0, 1)`. Diagnostics only: a search driven by this
/// should spread out and converge on nothing in particular.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomEvaluator;

impl<S: SimState> Evaluator<S> for RandomEvaluator {
    fn evaluate(&self, _state: &S) -> f32 {
        rand::random::<f32>()
    }
}
