//! Evaluators over runner states.

use crate::evaluator::Evaluator;
use crate::runner::state::RunnerState;

/// Forward progress only.
#[derive(Clone, Copy, Debug, Default)]
pub struct DistanceEvaluator;

impl Evaluator<RunnerState> for DistanceEvaluator {
    fn evaluate(&self, state: &RunnerState) -> f32 {
        state.torso_x()
    }
}

/// Forward progress plus lean and speed, the classic hand-tuned mix.
#[derive(Clone, Copy, Debug, Default)]
pub struct HandTunedEvaluator;

impl Evaluator<RunnerState> for HandTunedEvaluator {
    fn evaluate(&self, state: &RunnerState) -> f32 {
        state.torso_pitch() + state.torso_x() + state.torso_speed()
    }
}
