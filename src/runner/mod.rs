//! A bundled, deterministic runner game.
//!
//! The search core is game-agnostic; this module gives it a realistic
//! in-crate workload: a four-key running figure with a 25 Hz timestep,
//! 12 tracked body segments, pitch/collapse failure and menus that reward
//! a well-timed alternating gait. See [`world`] for what the surrogate
//! does and does not model.

mod command;
mod score;
mod state;
mod world;

pub use command::RunnerCommand;
pub use score::{DistanceEvaluator, HandTunedEvaluator};
pub use state::{
    Component, RunnerState, Segment, COMPONENTS_PER_SEGMENT, SEGMENT_COUNT, STATE_LEN,
};
pub use world::{RunnerWorld, TIMESTEP_S};

use std::collections::HashMap;
use std::ops::Range;

use crate::action::{ActionList, TimedAction};
use crate::generator::FixedCycleGenerator;

fn menu(durations: Range<u32>, command: RunnerCommand) -> ActionList<RunnerCommand> {
    durations
        .map(|ticks| TimedAction::new(ticks, command))
        .collect()
}

/// The four-beat menu cycle the engine was tuned on: relax, drive one leg
/// pair, relax, drive the other. The first four depths get narrower menus
/// while the figure is still getting moving.
pub fn default_gait_generator() -> FixedCycleGenerator<RunnerCommand> {
    let cycle = vec![
        menu(1..25, RunnerCommand::NIL),
        menu(20..60, RunnerCommand::WO),
        menu(1..25, RunnerCommand::NIL),
        menu(20..60, RunnerCommand::QP),
    ];
    let mut exceptions = HashMap::new();
    exceptions.insert(0, menu(1..25, RunnerCommand::NIL));
    exceptions.insert(1, menu(30..50, RunnerCommand::WO));
    exceptions.insert(2, menu(1..20, RunnerCommand::NIL));
    exceptions.insert(3, menu(15..30, RunnerCommand::QP));
    FixedCycleGenerator::with_exceptions(cycle, exceptions)
}
