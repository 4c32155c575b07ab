//! Receding-horizon greedy sampling.
//!
//! Keeps a private "current root" pointer into the tree and plays random
//! games below it for a depth-dependent budget, then commits: scores every
//! leaf under the current root, walks the best leaf back to a point just
//! ahead of the root, and re-anchors there. When a current root runs out of
//! unexplored ground it retreats a growing number of levels and tries a
//! different branch.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::error::{Result, SearchError};
use crate::evaluator::Evaluator;
use crate::generator::ActionGenerator;
use crate::node::SearchNode;
use crate::sampler::Sampler;
use crate::sim::{Command, SimState};
use crate::stats::SearchStats;

/// Give up and report a jam after this many from-the-top restarts.
const MAX_RESTARTS: u32 = 32;

/// Tunables for the greedy advance schedule. The sampling budget follows
/// the top half of a hyperbola over tree depth: `samples_at_depth0` at the
/// root, through `samples_at_depth_n` at depth `depth_n`, asymptoting to
/// `samples_at_inf`.
#[derive(Clone, Copy, Debug)]
pub struct GreedyConfig {
    pub samples_at_depth0: u32,
    pub depth_n: u32,
    pub samples_at_depth_n: u32,
    pub samples_at_inf: u32,
    /// How far past the old root the new root lands after a commit.
    pub forward_jump: u32,
    /// Levels to retreat when the current root is exhausted.
    pub backwards_jump: u32,
    pub backwards_jump_min: u32,
    /// Retreat growth per consecutive exhaustion.
    pub backwards_jump_growth: f32,
}

impl Default for GreedyConfig {
    fn default() -> Self {
        GreedyConfig {
            samples_at_depth0: 1000,
            depth_n: 5,
            samples_at_depth_n: 200,
            samples_at_inf: 75,
            forward_jump: 1,
            backwards_jump: 10,
            backwards_jump_min: 5,
            backwards_jump_growth: 1.5,
        }
    }
}

pub struct GreedySampler<C: Command, S: SimState> {
    config: GreedyConfig,
    generator: Arc<dyn ActionGenerator<C>>,
    stats: Arc<SearchStats>,
    evaluator: Arc<dyn Evaluator<S>>,
    rng: Pcg64,

    current_root: Option<Arc<SearchNode<C, S>>>,
    samples_budget: u32,
    samples_so_far: u32,
    backwards_jump: u32,

    tree_done: bool,
    expansion_done: bool,
}

impl<C: Command, S: SimState> GreedySampler<C, S> {
    pub fn new(
        generator: Arc<dyn ActionGenerator<C>>,
        stats: Arc<SearchStats>,
        evaluator: Arc<dyn Evaluator<S>>,
        config: GreedyConfig,
        seed: u64,
    ) -> Self {
        GreedySampler {
            backwards_jump: config.backwards_jump,
            config,
            generator,
            stats,
            evaluator,
            rng: Pcg64::seed_from_u64(seed),
            current_root: None,
            samples_budget: 0,
            samples_so_far: 0,
            tree_done: false,
            expansion_done: false,
        }
    }

    /// Game budget before advancing past a root at `depth`.
    pub fn samples_at_depth(&self, depth: u32) -> u32 {
        let c = &self.config;
        let a = (c.depth_n * c.depth_n) as f32
            * (c.samples_at_depth_n as f32 - c.samples_at_inf as f32)
            / (c.samples_at_depth0 as f32 - c.samples_at_depth_n as f32);
        let d2 = (depth as f32) * (depth as f32);
        let samples =
            a * (c.samples_at_depth0 as f32 - c.samples_at_inf as f32) / (d2 + a)
                + c.samples_at_inf as f32;
        samples.round() as u32
    }

    fn adopt_root(&mut self, node: Arc<SearchNode<C, S>>) {
        self.samples_budget = self.samples_at_depth(node.depth());
        self.samples_so_far = 0;
        self.current_root = Some(node);
    }

    /// Resolve where this episode samples from, given the worker's start
    /// node. The current root survives only while it sits at or below the
    /// start; anything else adopts the start.
    fn reanchor(&mut self, start: &Arc<SearchNode<C, S>>) -> Arc<SearchNode<C, S>> {
        let keep = match &self.current_root {
            None => false,
            Some(cr) => Arc::ptr_eq(cr, start) || cr.has_ancestor(start),
        };
        if keep {
            self.current_root.clone().unwrap_or_else(|| start.clone())
        } else {
            self.adopt_root(start.clone());
            start.clone()
        }
    }

    /// Retreat from an exhausted root, skipping explored ancestors, without
    /// rising above the worker's start node. Each retreat reaches further
    /// than the last.
    fn walk_back(&mut self, from: Arc<SearchNode<C, S>>, floor: u32) -> Arc<SearchNode<C, S>> {
        let mut node = from;
        let mut count = 0;
        while node.depth() > floor && (node.is_fully_explored() || count < self.backwards_jump) {
            match node.parent() {
                Some(parent) => node = parent,
                None => break,
            }
            count += 1;
        }
        self.backwards_jump =
            (self.backwards_jump as f32 * self.config.backwards_jump_growth) as u32;
        self.adopt_root(node.clone());
        node
    }

    /// Random stop-or-descend walk below `root`, reserving expansion rights
    /// at the stopping point.
    fn descend(&mut self, root: &Arc<SearchNode<C, S>>) -> Result<Option<Arc<SearchNode<C, S>>>> {
        let mut restarts = 0;
        let mut node = root.clone();
        loop {
            if node.is_locked() || node.is_fully_explored() {
                restarts += 1;
                if restarts > MAX_RESTARTS {
                    return Ok(None);
                }
                node = root.clone();
                continue;
            }
            let live: Vec<Arc<SearchNode<C, S>>> = node
                .children_snapshot()
                .into_iter()
                .filter(|c| !c.is_fully_explored())
                .collect();
            let untried = node.untried_count();
            if untried == 0 && live.is_empty() {
                restarts += 1;
                if restarts > MAX_RESTARTS {
                    return Ok(None);
                }
                node = root.clone();
                continue;
            }
            let draw = self.rng.random_range(0..untried + live.len());
            if draw >= live.len() {
                if node.reserve_expansion_rights() {
                    return Ok(Some(node));
                }
                restarts += 1;
                if restarts > MAX_RESTARTS {
                    return Ok(None);
                }
                node = root.clone();
                continue;
            }
            node = live[draw].clone();
        }
    }

    /// Budget spent: score every leaf under the current root and move the
    /// root to the best leaf's ancestor just ahead of it.
    fn advance_root(&mut self) {
        let Some(root) = self.current_root.clone() else {
            return;
        };
        let mut best = root.clone();
        let mut best_score = f32::NEG_INFINITY;
        for leaf in root.collect_leaves() {
            // In-flight leaves have no state yet; they cannot be scored.
            if let Some(score) = leaf.score_with(&*self.evaluator) {
                if score > best_score {
                    best_score = score;
                    best = leaf;
                }
            }
        }
        let target_depth = root.depth() + self.config.forward_jump;
        let mut node = best;
        while node.depth() > target_depth {
            match node.parent() {
                Some(parent) => node = parent,
                None => break,
            }
        }
        self.backwards_jump = self
            .backwards_jump
            .saturating_sub(1)
            .max(self.config.backwards_jump_min);
        self.adopt_root(node);
    }
}

impl<C: Command, S: SimState> Sampler<C, S> for GreedySampler<C, S> {
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
        let mut root = self.reanchor(start);
        if root.is_fully_explored() {
            root = self.walk_back(root, start.depth());
        }
        self.descend(&root)
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
        if !current.state_failed() {
            self.expansion_done = false;
            return;
        }
        self.expansion_done = true;
        self.samples_so_far += 1;
        if self.samples_so_far >= self.samples_budget {
            self.advance_root();
        }
    }
}
