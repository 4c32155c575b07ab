//! Concurrent tree search over timed control-input sequences.
//!
//! The engine grows one shared tree of [`TimedAction`] sequences for an
//! externally simulated game: each node is a control input held for a fixed
//! number of ticks, each root-to-node path a complete run. Worker threads
//! replay paths into the tree, expand them and score the resulting games,
//! coordinated only through per-node expansion rights, so no global lock
//! sits on the hot path. [`stage`] predicates decide when a burst of
//! parallel search against one root is over and what it hands back.
//!
//! The tree core is game-agnostic behind the [`sim::Simulator`] seam. The
//! [`runner`] module ships a deterministic surrogate of the planar running
//! game the engine was built around.

// Search tree and action plumbing
pub mod action; // timed actions, cursors, run-length consolidation
pub mod error;
pub mod evaluator; // state scoring for samplers and leaf selection
pub mod generator; // untried-action menus by tree depth
pub mod node; // shared tree nodes and detached playout nodes
pub mod queue; // per-worker tick-by-tick execution queue
pub mod sim; // simulator-facing traits
pub mod stats;

// Search drivers
pub mod pool; // bounded worker pool and stage execution
pub mod report; // episode observers and run export
pub mod sampler; // random / greedy / UCB strategies
pub mod stage; // termination predicates for search bursts
pub mod worker; // the per-thread state machine

// Bundled demo game
pub mod runner;

// Tests
#[cfg(test)]
mod action_tests;
#[cfg(test)]
mod runner_tests;
#[cfg(test)]
mod worker_tests;

pub use crate::action::{consolidate, ActionCursor, ActionList, ActionSequence, TimedAction};
pub use crate::error::{Result, SearchError};
pub use crate::evaluator::{ConstantEvaluator, Evaluator, RandomEvaluator};
pub use crate::generator::{ActionGenerator, FixedCycleGenerator, NullGenerator};
pub use crate::node::{ScratchNode, SearchNode};
pub use crate::pool::{PoolConfig, StageOutcome, WorkerPool};
pub use crate::queue::ActionQueue;
pub use crate::report::{export_run, LogReporter, NullReporter, RunExport, RunReporter, RunStep};
pub use crate::sampler::{
    GreedyConfig, GreedySampler, RandomSampler, RolloutStart, Sampler, UcbSampler,
};
pub use crate::sim::{Command, SimState, Simulator, StepLimitSim, TickState};
pub use crate::stage::{FixedGamesStage, MaxDepthStage, MinDepthStage, SearchStage};
pub use crate::stats::{SearchStats, StatsSnapshot};
pub use crate::worker::{Worker, WorkerControl, WorkerState};
