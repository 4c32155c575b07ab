//! The shared search tree.
//!
//! Nodes are `Arc`-linked with weak parent backreferences. Structural
//! mutation (claiming an untried action, linking a child, the expansion
//! rights protocol) is serialized through a per-node protocol mutex;
//! everything read on the hot path (visit counters, terminal and
//! fully-explored flags, lock state) is atomic so traversal never touches a
//! global lock. Simulator snapshots are write-once per node.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use crate::action::{ActionList, ActionSequence, TimedAction};
use crate::error::{Result, SearchError};
use crate::evaluator::Evaluator;
use crate::generator::ActionGenerator;
use crate::sim::{Command, SimState};
use crate::stats::SearchStats;

/// Value totals are accumulated in thousandths so they fit an atomic.
const VALUE_SCALE: f32 = 1000.0;

// Expansion-rights lock states. A node a worker reserved for expansion and
// an ancestor locked because its whole brood is spoken for must never be
// confused: releasing rights only ever clears RESERVED on the released node
// and PROPAGATED on ancestors, so one worker cannot steal another's
// reservation.
const LOCK_NONE: u8 = 0;
const LOCK_RESERVED: u8 = 1;
const LOCK_PROPAGATED: u8 = 2;

/// Dedup a generator menu while keeping its order.
fn seed_untried<C: Command>(generator: &dyn ActionGenerator<C>, depth: u32) -> ActionList<C> {
    let mut menu = ActionList::new();
    for action in generator.actions_at_depth(depth) {
        if !menu.contains(&action) {
            menu.push(action);
        }
    }
    menu
}

// ============================================================================
// SEARCH NODE
// ============================================================================

/// One point in the explored action-sequence space.
pub struct SearchNode<C: Command, S: SimState> {
    depth: u32,
    /// The action that produced this node from its parent. `None` only for
    /// the root.
    action: Option<TimedAction<C>>,
    parent: Option<Weak<SearchNode<C, S>>>,

    children: RwLock<Vec<Arc<SearchNode<C, S>>>>,
    untried: Mutex<ActionList<C>>,

    /// Simulator snapshot, assigned exactly once when this node's
    /// simulation first completes.
    state: RwLock<Option<S>>,

    terminal: AtomicBool,
    fully_explored: AtomicBool,
    lock_state: AtomicU8,

    visits: AtomicU64,
    total_value: AtomicI64,

    /// Deepest tree depth reached anywhere below (and including) this node.
    max_branch_depth: AtomicU32,

    /// Per-node monitor serializing structural mutation and the expansion
    /// rights protocol. Acquired strictly child before parent.
    protocol: Mutex<()>,
}

impl<C: Command, S: SimState> SearchNode<C, S> {
    /// Create a tree root around an externally supplied initial state.
    pub fn new_root(state: S, generator: &dyn ActionGenerator<C>) -> Arc<Self> {
        Arc::new(SearchNode {
            depth: 0,
            action: None,
            parent: None,
            children: RwLock::new(Vec::new()),
            untried: Mutex::new(seed_untried(generator, 0)),
            state: RwLock::new(Some(state)),
            terminal: AtomicBool::new(false),
            fully_explored: AtomicBool::new(false),
            lock_state: AtomicU8::new(LOCK_NONE),
            visits: AtomicU64::new(0),
            total_value: AtomicI64::new(0),
            max_branch_depth: AtomicU32::new(0),
            protocol: Mutex::new(()),
        })
    }

    /// Claim `action` from the untried set and link a new child under this
    /// node. The child's own untried menu is seeded from the generator.
    ///
    /// Fails without mutating anything if the action is not untried or a
    /// sibling with an equal action already exists.
    pub fn add_child(
        self: &Arc<Self>,
        action: TimedAction<C>,
        generator: &dyn ActionGenerator<C>,
        stats: &SearchStats,
    ) -> Result<Arc<Self>> {
        let _monitor = self.protocol.lock().unwrap();
        {
            let children = self.children.read().unwrap();
            if children.iter().any(|c| c.action == Some(action)) {
                return Err(SearchError::DuplicateChildAction {
                    depth: self.depth,
                    action: format!("{:?}", action),
                });
            }
        }
        {
            let mut untried = self.untried.lock().unwrap();
            match untried.iter().position(|a| *a == action) {
                Some(at) => {
                    untried.remove(at);
                }
                None => {
                    return Err(SearchError::ActionNotUntried {
                        depth: self.depth,
                        action: format!("{:?}", action),
                    });
                }
            }
        }

        let depth = self.depth + 1;
        let child = Arc::new(SearchNode {
            depth,
            action: Some(action),
            parent: Some(Arc::downgrade(self)),
            children: RwLock::new(Vec::new()),
            untried: Mutex::new(seed_untried(generator, depth)),
            state: RwLock::new(None),
            terminal: AtomicBool::new(false),
            fully_explored: AtomicBool::new(false),
            lock_state: AtomicU8::new(LOCK_NONE),
            visits: AtomicU64::new(0),
            total_value: AtomicI64::new(0),
            max_branch_depth: AtomicU32::new(depth),
            protocol: Mutex::new(()),
        });
        self.children.write().unwrap().push(child.clone());
        stats.record_node();
        self.raise_branch_depth(depth);
        Ok(child)
    }

    // ------------------------------------------------------------------
    // Identity and navigation
    // ------------------------------------------------------------------

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn action(&self) -> Option<TimedAction<C>> {
        self.action
    }

    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    /// Snapshot of the current children. Safe to iterate while other
    /// workers keep appending.
    pub fn children_snapshot(&self) -> Vec<Arc<Self>> {
        self.children.read().unwrap().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().unwrap().len()
    }

    pub fn untried_snapshot(&self) -> ActionList<C> {
        self.untried.lock().unwrap().clone()
    }

    pub fn untried_count(&self) -> usize {
        self.untried.lock().unwrap().len()
    }

    pub fn has_untried(&self) -> bool {
        !self.untried.lock().unwrap().is_empty()
    }

    /// Ordered incoming actions from the root to this node. Empty for the
    /// root itself.
    pub fn sequence(&self) -> ActionSequence<C> {
        let mut actions = Vec::with_capacity(self.depth as usize);
        if let Some(action) = self.action {
            actions.push(action);
        }
        let mut cursor = self.parent();
        while let Some(node) = cursor {
            if let Some(action) = node.action {
                actions.push(action);
            }
            cursor = node.parent();
        }
        actions.reverse();
        actions
    }

    /// The action suffix that leads from `ancestor` down to this node.
    ///
    /// Fails if this node is not strictly below `ancestor`, or sits in a
    /// different branch entirely.
    pub fn actions_from(self: &Arc<Self>, ancestor: &Arc<Self>) -> Result<ActionSequence<C>> {
        if self.depth <= ancestor.depth {
            return Err(SearchError::TargetNotDeeper {
                target: self.depth,
                current: ancestor.depth,
            });
        }
        let mut actions = Vec::with_capacity((self.depth - ancestor.depth) as usize);
        let mut cursor = self.clone();
        while cursor.depth > ancestor.depth {
            match (cursor.action, cursor.parent()) {
                (Some(action), Some(parent)) => {
                    actions.push(action);
                    cursor = parent;
                }
                _ => {
                    return Err(SearchError::TargetNotDescendant {
                        target: self.depth,
                        current: ancestor.depth,
                    });
                }
            }
        }
        if !Arc::ptr_eq(&cursor, ancestor) {
            return Err(SearchError::TargetNotDescendant {
                target: self.depth,
                current: ancestor.depth,
            });
        }
        actions.reverse();
        Ok(actions)
    }

    /// Whether `other` sits on this node's path to the root.
    pub fn has_ancestor(&self, other: &Arc<Self>) -> bool {
        let mut cursor = self.parent();
        while let Some(node) = cursor {
            if node.depth < other.depth {
                return false;
            }
            if Arc::ptr_eq(&node, other) {
                return true;
            }
            cursor = node.parent();
        }
        false
    }

    /// Walk up to the ancestor at exactly `depth` (this node itself when
    /// depths match).
    pub fn ancestor_at_depth(self: &Arc<Self>, depth: u32) -> Option<Arc<Self>> {
        if depth > self.depth {
            return None;
        }
        let mut cursor = self.clone();
        while cursor.depth > depth {
            cursor = cursor.parent()?;
        }
        Some(cursor)
    }

    /// All childless nodes in this subtree, this node included when bare.
    pub fn collect_leaves(self: &Arc<Self>) -> Vec<Arc<Self>> {
        let mut leaves = Vec::new();
        self.collect_leaves_into(&mut leaves);
        leaves
    }

    fn collect_leaves_into(self: &Arc<Self>, out: &mut Vec<Arc<Self>>) {
        let children = self.children_snapshot();
        if children.is_empty() {
            out.push(self.clone());
            return;
        }
        for child in &children {
            child.collect_leaves_into(out);
        }
    }

    /// Every node in this subtree, this node included, in breadth-first
    /// order.
    pub fn nodes_below(self: &Arc<Self>) -> Vec<Arc<Self>> {
        let mut nodes = vec![self.clone()];
        let mut at = 0;
        while at < nodes.len() {
            let children = nodes[at].children_snapshot();
            nodes.extend(children);
            at += 1;
        }
        nodes
    }

    pub fn count_nodes_below(&self) -> usize {
        let children = self.children_snapshot();
        1 + children.iter().map(|c| c.count_nodes_below()).sum::<usize>()
    }

    #[inline]
    pub fn max_branch_depth(&self) -> u32 {
        self.max_branch_depth.load(Ordering::Relaxed)
    }

    fn raise_branch_depth(&self, depth: u32) {
        self.max_branch_depth.fetch_max(depth, Ordering::Relaxed);
        let mut cursor = self.parent();
        while let Some(node) = cursor {
            node.max_branch_depth.fetch_max(depth, Ordering::Relaxed);
            cursor = node.parent();
        }
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    /// Record the simulator snapshot for this node. Write-once.
    pub fn assign_state(&self, state: S) -> Result<()> {
        let mut slot = self.state.write().unwrap();
        if slot.is_some() {
            return Err(SearchError::StateAlreadyAssigned { depth: self.depth });
        }
        *slot = Some(state);
        Ok(())
    }

    pub fn has_state(&self) -> bool {
        self.state.read().unwrap().is_some()
    }

    /// Run `f` against the assigned state without cloning it.
    pub fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        self.state.read().unwrap().as_ref().map(f)
    }

    pub fn state_clone(&self) -> Option<S> {
        self.state.read().unwrap().clone()
    }

    /// False while the state is unassigned.
    pub fn state_failed(&self) -> bool {
        self.with_state(S::is_failed).unwrap_or(false)
    }

    /// Evaluator score of the assigned state, if any.
    pub fn score_with(&self, evaluator: &dyn Evaluator<S>) -> Option<f32> {
        self.with_state(|s| evaluator.evaluate(s))
    }

    // ------------------------------------------------------------------
    // Terminal / fully-explored flags
    // ------------------------------------------------------------------

    /// The simulator failed at this node. Stronger than fully-explored;
    /// follow with [`propagate_fully_explored`](Self::propagate_fully_explored).
    pub fn mark_terminal(&self) {
        self.terminal.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.terminal.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_fully_explored(&self) -> bool {
        self.fully_explored.load(Ordering::Relaxed)
    }

    fn compute_fully_explored(&self) -> bool {
        if self.is_terminal() {
            return true;
        }
        if !self.untried.lock().unwrap().is_empty() {
            return false;
        }
        let children = self.children.read().unwrap();
        children.iter().all(|c| c.is_fully_explored())
    }

    /// Flip the flag to true when warranted; reports whether this call won
    /// the flip (losers leave the upward walk to the winner).
    fn refresh_fully_explored(&self) -> bool {
        if !self.compute_fully_explored() {
            return false;
        }
        self.fully_explored
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Incremental bottom-up maintenance. Call after this node became
    /// terminal, its untried set emptied, or a subtree below it was
    /// destroyed; recurses toward the root only while flags keep flipping.
    pub fn propagate_fully_explored(&self) {
        if !self.refresh_fully_explored() {
            return;
        }
        let mut cursor = self.parent();
        while let Some(node) = cursor {
            if !node.refresh_fully_explored() {
                return;
            }
            cursor = node.parent();
        }
    }

    /// From-scratch re-derivation over this subtree: reset every flag below,
    /// then rebuild bottom-up from the leaves. Quiescent use only; must
    /// agree with the incremental flags once it returns.
    pub fn recompute_fully_explored(self: &Arc<Self>) {
        self.reset_fully_explored_below();
        for leaf in self.collect_leaves() {
            leaf.propagate_fully_explored();
        }
    }

    fn reset_fully_explored_below(&self) {
        self.fully_explored.store(false, Ordering::Relaxed);
        for child in self.children_snapshot() {
            child.reset_fully_explored_below();
        }
    }

    // ------------------------------------------------------------------
    // Expansion rights
    // ------------------------------------------------------------------

    /// Claim exclusive expansion rights here. Fails fast when the node is
    /// already locked or has nothing left to try; on success the lock
    /// bubbles up through any ancestor whose children are all spoken for.
    pub fn reserve_expansion_rights(self: &Arc<Self>) -> bool {
        {
            let _monitor = self.protocol.lock().unwrap();
            if self.lock_state.load(Ordering::Relaxed) != LOCK_NONE {
                return false;
            }
            if self.untried.lock().unwrap().is_empty() {
                return false;
            }
            self.lock_state.store(LOCK_RESERVED, Ordering::Relaxed);
        }
        if let Some(parent) = self.parent() {
            parent.propagate_lock();
        }
        true
    }

    /// Give the rights back and unwind any ancestor locks this branch no
    /// longer justifies. Only clears a reservation on the node itself.
    pub fn release_expansion_rights(self: &Arc<Self>) {
        {
            let _monitor = self.protocol.lock().unwrap();
            if self.lock_state.load(Ordering::Relaxed) == LOCK_RESERVED {
                self.lock_state.store(LOCK_NONE, Ordering::Relaxed);
            }
        }
        if let Some(parent) = self.parent() {
            parent.propagate_unlock();
        }
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.lock_state.load(Ordering::Relaxed) != LOCK_NONE
    }

    fn propagate_lock(self: &Arc<Self>) {
        let mut cursor = self.clone();
        loop {
            {
                let _monitor = cursor.protocol.lock().unwrap();
                if cursor.lock_state.load(Ordering::Relaxed) != LOCK_NONE {
                    return;
                }
                let children = cursor.children.read().unwrap();
                if !children.iter().all(|c| c.is_terminal() || c.is_locked()) {
                    return;
                }
                cursor.lock_state.store(LOCK_PROPAGATED, Ordering::Relaxed);
            }
            match cursor.parent() {
                Some(parent) => cursor = parent,
                None => return,
            }
        }
    }

    fn propagate_unlock(self: &Arc<Self>) {
        let mut cursor = self.clone();
        loop {
            {
                let _monitor = cursor.protocol.lock().unwrap();
                if cursor.lock_state.load(Ordering::Relaxed) != LOCK_PROPAGATED {
                    return;
                }
                let children = cursor.children.read().unwrap();
                if !children.iter().any(|c| !c.is_terminal() && !c.is_locked()) {
                    return;
                }
                cursor.lock_state.store(LOCK_NONE, Ordering::Relaxed);
            }
            match cursor.parent() {
                Some(parent) => cursor = parent,
                None => return,
            }
        }
    }

    // ------------------------------------------------------------------
    // Sampling statistics
    // ------------------------------------------------------------------

    /// Fold one playout score into this node's running statistics.
    pub fn record_score(&self, value: f32) {
        self.visits.fetch_add(1, Ordering::Relaxed);
        self.total_value
            .fetch_add((value * VALUE_SCALE) as i64, Ordering::Relaxed);
    }

    #[inline]
    pub fn visits(&self) -> u64 {
        self.visits.load(Ordering::Relaxed)
    }

    /// Mean playout value, 0.0 before the first visit.
    pub fn mean_value(&self) -> f32 {
        let visits = self.visits();
        if visits == 0 {
            return 0.0;
        }
        let total = self.total_value.load(Ordering::Relaxed);
        (total as f32) / VALUE_SCALE / (visits as f32)
    }

    /// Upper-confidence score of this node as a child choice. Never-visited
    /// nodes rank above everything, since the formula is singular there.
    pub fn ucb_score(&self, parent_visits: u64, exploration: f32) -> f32 {
        let visits = self.visits();
        if visits == 0 {
            return f32::INFINITY;
        }
        let bonus = (2.0 * (parent_visits.max(1) as f32).ln() / (visits as f32)).sqrt();
        self.mean_value() + exploration * bonus
    }

    // ------------------------------------------------------------------
    // Reclamation
    // ------------------------------------------------------------------

    /// Sever and clear everything below this node and empty its untried
    /// set, reclaiming the subtree. The excised branch must not be touched
    /// again; follow with
    /// [`propagate_fully_explored`](Self::propagate_fully_explored) so the
    /// stump is fenced off from further sampling. Not safe to run while
    /// workers are active in this subtree.
    pub fn destroy_below(&self) {
        let drained: Vec<Arc<Self>> = {
            let mut children = self.children.write().unwrap();
            children.drain(..).collect()
        };
        self.untried.lock().unwrap().clear();
        for child in drained {
            *child.state.write().unwrap() = None;
            child.destroy_below();
        }
    }
}

// ============================================================================
// SCRATCH NODE
// ============================================================================

/// A detached playout position used by rollouts.
///
/// Scratch nodes are plain values owned by a single worker. They carry the
/// real tree node the rollout left from (the backpropagation anchor) but are
/// never linked into the shared tree, so a rollout can never alias a real
/// node.
pub struct ScratchNode<C: Command, S: SimState> {
    anchor: Arc<SearchNode<C, S>>,
    depth: u32,
    action: TimedAction<C>,
    untried: ActionList<C>,
    state: Option<S>,
}

impl<C: Command, S: SimState> ScratchNode<C, S> {
    /// First playout step beyond the tree boundary at `anchor`.
    pub fn from_tree(
        anchor: &Arc<SearchNode<C, S>>,
        action: TimedAction<C>,
        generator: &dyn ActionGenerator<C>,
    ) -> Self {
        let depth = anchor.depth() + 1;
        ScratchNode {
            anchor: anchor.clone(),
            depth,
            action,
            untried: seed_untried(generator, depth),
            state: None,
        }
    }

    /// Continue a playout one step past `prev`.
    pub fn extend(
        prev: &ScratchNode<C, S>,
        action: TimedAction<C>,
        generator: &dyn ActionGenerator<C>,
    ) -> Self {
        let depth = prev.depth + 1;
        ScratchNode {
            anchor: prev.anchor.clone(),
            depth,
            action,
            untried: seed_untried(generator, depth),
            state: None,
        }
    }

    /// The tree node playout scores backpropagate from.
    #[inline]
    pub fn anchor(&self) -> &Arc<SearchNode<C, S>> {
        &self.anchor
    }

    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[inline]
    pub fn action(&self) -> TimedAction<C> {
        self.action
    }

    #[inline]
    pub fn untried(&self) -> &ActionList<C> {
        &self.untried
    }

    /// Write-once, same contract as the tree nodes.
    pub fn assign_state(&mut self, state: S) -> Result<()> {
        if self.state.is_some() {
            return Err(SearchError::StateAlreadyAssigned { depth: self.depth });
        }
        self.state = Some(state);
        Ok(())
    }

    pub fn state(&self) -> Option<&S> {
        self.state.as_ref()
    }

    pub fn state_failed(&self) -> bool {
        self.state.as_ref().map(S::is_failed).unwrap_or(false)
    }
}
