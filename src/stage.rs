//! Stage predicates for search campaigns.
//!
//! A stage describes when a burst of parallel search against one root is
//! over and what it hands back. Stages are plain predicates over the shared
//! tree and counters; [`WorkerPool::run_stage`](crate::pool::WorkerPool)
//! owns the workers and the polling.

use std::collections::HashSet;
use std::sync::Arc;

use crate::action::ActionSequence;
use crate::error::{Result, SearchError};
use crate::node::SearchNode;
use crate::sim::{Command, SimState};
use crate::stats::SearchStats;

/// Termination and result extraction for one search burst.
///
/// `finished` is polled between worker transitions and must latch: once it
/// has returned true it keeps returning true. Every stage also finishes
/// when the root becomes fully explored, since no further work is possible.
pub trait SearchStage<C: Command, S: SimState>: Send {
    /// Capture baselines against the root this stage will drive.
    fn begin(&mut self, root: &Arc<SearchNode<C, S>>, stats: &SearchStats);

    /// The termination predicate.
    fn finished(&mut self, root: &Arc<SearchNode<C, S>>, stats: &SearchStats) -> bool;

    /// Outcome sequences. Fails if the stage has not finished.
    fn results(&self, root: &Arc<SearchNode<C, S>>) -> Result<Vec<ActionSequence<C>>>;
}

// ============================================================================
// MAX-DEPTH STAGE
// ============================================================================

/// Search until any branch reaches a target depth below the root, with a
/// game budget as the fallback. The result is the action sequence to the
/// first such branch, trimmed to the target depth; empty when the budget
/// was spent or the subtree closed before getting there.
#[derive(Debug)]
pub struct MaxDepthStage {
    target_depth: u32,
    max_games: u64,
    effective_depth: u32,
    games_at_begin: u64,
    done: bool,
}

impl MaxDepthStage {
    /// `target_depth` is relative to the root the stage is started on.
    pub fn new(target_depth: u32, max_games: u64) -> Self {
        MaxDepthStage {
            target_depth,
            max_games,
            effective_depth: 0,
            games_at_begin: 0,
            done: false,
        }
    }

    #[inline]
    pub fn effective_depth(&self) -> u32 {
        self.effective_depth
    }
}

impl<C: Command, S: SimState> SearchStage<C, S> for MaxDepthStage {
    fn begin(&mut self, root: &Arc<SearchNode<C, S>>, stats: &SearchStats) {
        self.effective_depth = root.depth() + self.target_depth;
        self.games_at_begin = stats.games_played();
        self.done = false;
    }

    fn finished(&mut self, root: &Arc<SearchNode<C, S>>, stats: &SearchStats) -> bool {
        if !self.done {
            let deep_enough = root.max_branch_depth() >= self.effective_depth;
            let budget_spent =
                stats.games_played().saturating_sub(self.games_at_begin) >= self.max_games;
            self.done = deep_enough || budget_spent || root.is_fully_explored();
        }
        self.done
    }

    fn results(&self, root: &Arc<SearchNode<C, S>>) -> Result<Vec<ActionSequence<C>>> {
        if !self.done {
            return Err(SearchError::StageIncomplete);
        }
        for leaf in root.collect_leaves() {
            if leaf.depth() < self.effective_depth {
                continue;
            }
            if let Some(node) = leaf.ancestor_at_depth(self.effective_depth) {
                return Ok(vec![node.sequence()]);
            }
        }
        Ok(Vec::new())
    }
}

// ============================================================================
// MIN-DEPTH STAGE
// ============================================================================

/// Search until every branch below the root reaches at least a minimum
/// depth, breadth-first fashion: failed branches may stop short, and every
/// untried action above the horizon must have been expanded before the
/// stage counts as done. May never finish under a sampler that refuses to
/// widen shallow ground. Results are the de-duplicated sequences at exactly
/// the minimum depth, one per branch that made it.
#[derive(Debug)]
pub struct MinDepthStage {
    min_depth: u32,
    effective_depth: u32,
    done: bool,
}

/// Every branch is either failed or realized down to `depth`: no live leaf
/// above the horizon, no untried actions strictly above it.
fn branches_covered<C: Command, S: SimState>(node: &Arc<SearchNode<C, S>>, depth: u32) -> bool {
    let children = node.children_snapshot();
    if children.is_empty() {
        return node.state_failed() || node.depth() >= depth;
    }
    if node.depth() < depth && node.has_untried() {
        return false;
    }
    children.iter().all(|c| branches_covered(c, depth))
}

impl MinDepthStage {
    pub fn new(min_depth: u32) -> Self {
        MinDepthStage {
            min_depth,
            effective_depth: 0,
            done: false,
        }
    }
}

impl<C: Command, S: SimState> SearchStage<C, S> for MinDepthStage {
    fn begin(&mut self, root: &Arc<SearchNode<C, S>>, _stats: &SearchStats) {
        self.effective_depth = root.depth() + self.min_depth;
        self.done = false;
    }

    fn finished(&mut self, root: &Arc<SearchNode<C, S>>, _stats: &SearchStats) -> bool {
        if !self.done {
            self.done =
                root.is_fully_explored() || branches_covered(root, self.effective_depth);
        }
        self.done
    }

    fn results(&self, root: &Arc<SearchNode<C, S>>) -> Result<Vec<ActionSequence<C>>> {
        if !self.done {
            return Err(SearchError::StageIncomplete);
        }
        let mut seen = HashSet::new();
        let mut sequences = Vec::new();
        for leaf in root.collect_leaves() {
            if leaf.depth() < self.effective_depth {
                continue;
            }
            if let Some(node) = leaf.ancestor_at_depth(self.effective_depth) {
                let sequence = node.sequence();
                if seen.insert(sequence.clone()) {
                    sequences.push(sequence);
                }
            }
        }
        Ok(sequences)
    }
}

// ============================================================================
// FIXED-GAMES STAGE
// ============================================================================

/// Play a fixed number of games below the root and hand back the sequence
/// of the deepest branch found.
#[derive(Debug)]
pub struct FixedGamesStage {
    games: u64,
    games_at_begin: u64,
    done: bool,
}

impl FixedGamesStage {
    pub fn new(games: u64) -> Self {
        FixedGamesStage {
            games,
            games_at_begin: 0,
            done: false,
        }
    }
}

impl<C: Command, S: SimState> SearchStage<C, S> for FixedGamesStage {
    fn begin(&mut self, _root: &Arc<SearchNode<C, S>>, stats: &SearchStats) {
        self.games_at_begin = stats.games_played();
        self.done = false;
    }

    fn finished(&mut self, root: &Arc<SearchNode<C, S>>, stats: &SearchStats) -> bool {
        if !self.done {
            self.done = stats.games_played().saturating_sub(self.games_at_begin) >= self.games
                || root.is_fully_explored();
        }
        self.done
    }

    fn results(&self, root: &Arc<SearchNode<C, S>>) -> Result<Vec<ActionSequence<C>>> {
        if !self.done {
            return Err(SearchError::StageIncomplete);
        }
        let deepest = root
            .collect_leaves()
            .into_iter()
            .max_by_key(|leaf| leaf.depth());
        Ok(deepest
            .map(|leaf| vec![leaf.sequence()])
            .unwrap_or_default())
    }
}
