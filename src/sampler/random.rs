//! Uniform exploration without playout scoring.
//!
//! Every expansion is linked straight into the tree and the episode keeps
//! expanding deeper until the simulator fails, so no rollout phase is
//! needed. Descent stops to expand with probability
//! `untried / (untried + live_children)`, which weights new actions and
//! existing subtrees equally.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::error::{Result, SearchError};
use crate::generator::ActionGenerator;
use crate::node::SearchNode;
use crate::sampler::Sampler;
use crate::sim::{Command, SimState};
use crate::stats::SearchStats;

/// Give up and report a jam after this many from-the-top restarts.
const MAX_RESTARTS: u32 = 32;

pub struct RandomSampler<C: Command> {
    generator: Arc<dyn ActionGenerator<C>>,
    stats: Arc<SearchStats>,
    rng: Pcg64,
    tree_done: bool,
    expansion_done: bool,
}

impl<C: Command> RandomSampler<C> {
    pub fn new(generator: Arc<dyn ActionGenerator<C>>, stats: Arc<SearchStats>, seed: u64) -> Self {
        RandomSampler {
            generator,
            stats,
            rng: Pcg64::seed_from_u64(seed),
            tree_done: false,
            expansion_done: false,
        }
    }
}

impl<C: Command, S: SimState> Sampler<C, S> for RandomSampler<C> {
    fn reset(&mut self) {
        self.tree_done = false;
        self.expansion_done = false;
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
        let mut restarts = 0;
        let mut node = start.clone();
        loop {
            let live: Vec<Arc<SearchNode<C, S>>> = node
                .children_snapshot()
                .into_iter()
                .filter(|c| !c.is_fully_explored())
                .collect();
            let untried = node.untried_count();

            if untried == 0 && live.is_empty() {
                // Another worker is mid-way through marking this branch
                // explored; start over rather than trust the stale path.
                restarts += 1;
                if restarts > MAX_RESTARTS {
                    return Ok(None);
                }
                node = start.clone();
                continue;
            }

            // One draw decides stop-vs-descend and the child in one go.
            let draw = self.rng.random_range(0..untried + live.len());
            if draw >= live.len() {
                return Ok(Some(node));
            }
            node = live[draw].clone();
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
                // Claimed by someone else between snapshot and claim.
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
        // Keep expanding deeper until the episode actually ends.
        self.expansion_done = current.state_failed();
    }
}
