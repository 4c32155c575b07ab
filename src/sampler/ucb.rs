//! Upper-confidence-bound sampling with detached playouts.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::warn;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::error::{Result, SearchError};
use crate::evaluator::Evaluator;
use crate::generator::ActionGenerator;
use crate::node::{ScratchNode, SearchNode};
use crate::sampler::{RolloutStart, Sampler};
use crate::sim::{Command, SimState};
use crate::stats::SearchStats;

/// Back off exponentially while jammed; past this, report the jam instead.
const JAM_DELAY_CAP_MS: u64 = 5_000;

/// UCB1 selection, single expansion per cycle, one detached playout per
/// expansion scored through [`Evaluator`] and backpropagated to every
/// ancestor below the absolute root.
pub struct UcbSampler<C: Command, S: SimState> {
    generator: Arc<dyn ActionGenerator<C>>,
    stats: Arc<SearchStats>,
    evaluator: Arc<dyn Evaluator<S>>,
    rng: Pcg64,
    exploration: f32,
    jam_delay_ms: u64,

    tree_done: bool,
    expansion_done: bool,
    rollout_done: bool,
}

impl<C: Command, S: SimState> UcbSampler<C, S> {
    /// The effective exploration constant is jittered per instance so
    /// parallel workers spread over near-equal branches instead of herding.
    pub fn new(
        generator: Arc<dyn ActionGenerator<C>>,
        stats: Arc<SearchStats>,
        evaluator: Arc<dyn Evaluator<S>>,
        exploration_constant: f32,
        exploration_random_factor: f32,
        seed: u64,
    ) -> Self {
        let mut rng = Pcg64::seed_from_u64(seed);
        let exploration = exploration_random_factor * rng.random::<f32>() + exploration_constant;
        UcbSampler {
            generator,
            stats,
            evaluator,
            rng,
            exploration,
            jam_delay_ms: 0,
            tree_done: false,
            expansion_done: false,
            rollout_done: false,
        }
    }

    #[inline]
    pub fn exploration(&self) -> f32 {
        self.exploration
    }

    /// Add `value` to the running mean of `node` and every ancestor below
    /// the absolute root.
    fn backpropagate(node: &Arc<SearchNode<C, S>>, value: f32) {
        let mut cursor = node.clone();
        while !cursor.is_root() {
            cursor.record_score(value);
            match cursor.parent() {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
    }
}

impl<C: Command, S: SimState> Sampler<C, S> for UcbSampler<C, S> {
    fn reset(&mut self) {
        self.jam_delay_ms = 0;
        self.tree_done = false;
        self.expansion_done = false;
        self.rollout_done = false;
    }

    fn tree_policy(
        &mut self,
        start: &Arc<SearchNode<C, S>>,
    ) -> Result<Option<Arc<SearchNode<C, S>>>> {
        if start.is_fully_explored() {
            return Err(SearchError::TreePolicyDeadEnd {
                depth: start.depth(),
            });
        }
        let mut node = start.clone();
        loop {
            // A node with untried ground is the target, provided we win the
            // expansion rights. Losing the race is not a dead end; the
            // children below may still be open.
            if node.has_untried() && node.reserve_expansion_rights() {
                self.jam_delay_ms = 0;
                return Ok(Some(node));
            }
            let parent_visits = node.visits();
            let mut best: Option<Arc<SearchNode<C, S>>> = None;
            let mut best_score = f32::NEG_INFINITY;
            for child in node.children_snapshot() {
                if child.is_fully_explored() || child.is_locked() {
                    continue;
                }
                let score = child.ucb_score(parent_visits, self.exploration);
                if score > best_score {
                    best_score = score;
                    best = Some(child);
                }
            }
            match best {
                Some(child) => node = child,
                None => {
                    // Everything below is claimed or explored right now.
                    // Back off and rescore the same node; contention this
                    // local usually clears in a few rounds.
                    if self.jam_delay_ms > JAM_DELAY_CAP_MS {
                        warn!(
                            "ucb selection jammed at depth {} after {} ms backoff",
                            node.depth(),
                            self.jam_delay_ms
                        );
                        self.jam_delay_ms = 0;
                        return Ok(None);
                    }
                    thread::sleep(Duration::from_millis(self.jam_delay_ms));
                    self.jam_delay_ms = self.jam_delay_ms * 2 + 1;
                }
            }
        }
    }

    fn tree_policy_guard(&self, _current: &Arc<SearchNode<C, S>>) -> bool {
        self.tree_done
    }

    fn tree_policy_done(&mut self, _current: &Arc<SearchNode<C, S>>) {
        self.tree_done = true;
        self.expansion_done = false;
    }

    fn expansion_policy(
        &mut self,
        start: &Arc<SearchNode<C, S>>,
    ) -> Result<Option<Arc<SearchNode<C, S>>>> {
        loop {
            let untried = start.untried_snapshot();
            let action = match untried.choose(&mut self.rng) {
                Some(action) => *action,
                None => return Ok(None),
            };
            match start.add_child(action, &*self.generator, &self.stats) {
                Ok(child) => return Ok(Some(child)),
                Err(SearchError::ActionNotUntried { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn expansion_policy_guard(&self, _current: &Arc<SearchNode<C, S>>) -> bool {
        self.expansion_done
    }

    fn expansion_policy_done(&mut self, current: &Arc<SearchNode<C, S>>) {
        self.tree_done = false;
        // One expansion per cycle regardless of outcome.
        self.expansion_done = true;
        if current.state_failed() {
            // The expansion itself ended the game; no playout needed.
            self.rollout_done = true;
            if let Some(score) = current.score_with(&*self.evaluator) {
                Self::backpropagate(current, score);
            }
        } else {
            self.rollout_done = false;
        }
    }

    fn rollout_policy(
        &mut self,
        start: RolloutStart<'_, C, S>,
    ) -> Result<Option<ScratchNode<C, S>>> {
        if start.state_failed() {
            return Err(SearchError::RolloutFromFailed {
                depth: start.depth(),
            });
        }
        let menu = start.untried_actions();
        let action = match menu.choose(&mut self.rng) {
            Some(action) => *action,
            // An empty menu below the tree boundary starves every playout;
            // that is a generator configuration error, not a jam.
            None => {
                return Err(SearchError::RolloutDeadEnd {
                    depth: start.depth(),
                })
            }
        };
        Ok(Some(match start {
            RolloutStart::Tree(node) => ScratchNode::from_tree(node, action, &*self.generator),
            RolloutStart::Scratch(prev) => ScratchNode::extend(prev, action, &*self.generator),
        }))
    }

    fn rollout_policy_guard(&self, _start: RolloutStart<'_, C, S>) -> bool {
        self.rollout_done
    }

    fn rollout_policy_done(&mut self, current: &ScratchNode<C, S>) {
        if current.state_failed() {
            self.rollout_done = true;
            if let Some(state) = current.state() {
                let score = self.evaluator.evaluate(state);
                Self::backpropagate(current.anchor(), score);
            }
        } else {
            self.rollout_done = false;
        }
    }
}
