//! Sampling strategies driving the worker state machine.
//!
//! A sampler owns one worker's per-episode posture and answers three
//! symmetric questions per phase: pick a target (`*_policy`), is the phase
//! finished (`*_policy_guard`), and bookkeeping once the chosen target has
//! been simulated (`*_policy_done`).
//!
//! Policy calls return `Ok(None)` when concurrency got the sampler jammed
//! (every attractive branch locked, an untried action claimed first). Jams
//! are normal under contention; the worker reroutes or restarts the episode.
//! `Err` is reserved for contract violations and stops the worker.

mod greedy;
mod random;
mod ucb;

pub use greedy::{GreedyConfig, GreedySampler};
pub use random::RandomSampler;
pub use ucb::UcbSampler;

use std::sync::Arc;

use crate::action::ActionList;
use crate::error::Result;
use crate::node::{ScratchNode, SearchNode};
use crate::sim::{Command, SimState};

/// Where a rollout step continues from: the tree node the playout left
/// from, or the previous detached step.
pub enum RolloutStart<'a, C: Command, S: SimState> {
    Tree(&'a Arc<SearchNode<C, S>>),
    Scratch(&'a ScratchNode<C, S>),
}

impl<C: Command, S: SimState> RolloutStart<'_, C, S> {
    pub fn depth(&self) -> u32 {
        match self {
            RolloutStart::Tree(node) => node.depth(),
            RolloutStart::Scratch(scratch) => scratch.depth(),
        }
    }

    pub fn state_failed(&self) -> bool {
        match self {
            RolloutStart::Tree(node) => node.state_failed(),
            RolloutStart::Scratch(scratch) => scratch.state_failed(),
        }
    }

    pub fn untried_actions(&self) -> ActionList<C> {
        match self {
            RolloutStart::Tree(node) => node.untried_snapshot(),
            RolloutStart::Scratch(scratch) => scratch.untried().clone(),
        }
    }
}

/// One worker's sampling strategy. Implementations are owned by a single
/// worker and carry mutable per-episode state; a fresh instance is built per
/// worker rather than shared.
pub trait Sampler<C: Command, S: SimState>: Send {
    /// Clear per-episode posture. Called when an episode starts and when
    /// the worker reroutes after a jam.
    fn reset(&mut self);

    /// Pick the node a new child should be added under, descending from
    /// `start` through already-expanded ground only.
    ///
    /// Must not target a fully-explored subtree, and fails loudly if
    /// `start` itself is already fully explored.
    fn tree_policy(&mut self, start: &Arc<SearchNode<C, S>>)
        -> Result<Option<Arc<SearchNode<C, S>>>>;
    fn tree_policy_guard(&self, current: &Arc<SearchNode<C, S>>) -> bool;
    fn tree_policy_done(&mut self, current: &Arc<SearchNode<C, S>>);

    /// Claim one untried action under `start` and link the new child.
    /// `Ok(None)` means other workers emptied the untried set first.
    fn expansion_policy(
        &mut self,
        start: &Arc<SearchNode<C, S>>,
    ) -> Result<Option<Arc<SearchNode<C, S>>>>;
    fn expansion_policy_guard(&self, current: &Arc<SearchNode<C, S>>) -> bool;
    fn expansion_policy_done(&mut self, current: &Arc<SearchNode<C, S>>);

    /// Continue the playout one detached step past the tree boundary.
    /// Samplers without a rollout keep the defaults: never called, guard
    /// always satisfied.
    fn rollout_policy(
        &mut self,
        start: RolloutStart<'_, C, S>,
    ) -> Result<Option<ScratchNode<C, S>>> {
        let _ = start;
        Ok(None)
    }

    fn rollout_policy_guard(&self, start: RolloutStart<'_, C, S>) -> bool {
        let _ = start;
        true
    }

    fn rollout_policy_done(&mut self, current: &ScratchNode<C, S>) {
        let _ = current;
    }
}
