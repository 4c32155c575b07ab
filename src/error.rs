use thiserror::Error;

/// Errors surfaced by the search core.
///
/// Most variants are contract violations: they indicate a bug in a sampler,
/// generator, or caller, and the worker that hits one stops (after releasing
/// any expansion rights it holds) rather than risk corrupting the shared
/// tree. `PoolExhausted` is the exception: callers are expected to retry or
/// lower their worker request.
#[derive(Debug, Error)]
pub enum SearchError {
    /// `poll()` on an action cursor with no ticks remaining.
    #[error("action cursor exhausted after {ticks} ticks")]
    ActionExhausted { ticks: u32 },

    /// `poll_command()` on a queue with nothing left to execute.
    #[error("polled an empty action queue")]
    EmptyQueue,

    /// `add_sequence()` given no actions.
    #[error("cannot enqueue an empty action sequence")]
    EmptySequence,

    /// Run-length consolidation removed every action.
    #[error("consolidation left no actions (all durations were zero)")]
    EmptyConsolidation,

    /// `add_child` given an action that is not in the node's untried set.
    #[error("action {action} is not untried at depth {depth}")]
    ActionNotUntried { depth: u32, action: String },

    /// `add_child` would have created a sibling with an equal action.
    #[error("duplicate child action {action} at depth {depth}")]
    DuplicateChildAction { depth: u32, action: String },

    /// A node's state may be assigned exactly once.
    #[error("state already assigned to node at depth {depth}")]
    StateAlreadyAssigned { depth: u32 },

    /// Tree policy produced a target at or above the worker's current depth.
    #[error("tree policy target at depth {target} is not below the current node at depth {current}")]
    TargetNotDeeper { target: u32, current: u32 },

    /// Tree policy produced a target outside the current node's subtree.
    #[error("tree policy target at depth {target} is not a descendant of the current node at depth {current}")]
    TargetNotDescendant { target: u32, current: u32 },

    /// The simulator failed while replaying already-validated tree ground.
    #[error("simulator failed during tree policy replay toward depth {target}")]
    TreePolicyFailure { target: u32 },

    /// Tree policy fell into a node with nowhere to go; fully-explored
    /// propagation should have fenced it off.
    #[error("tree policy dead end at depth {depth}")]
    TreePolicyDeadEnd { depth: u32 },

    /// Expansion must create a child exactly one level below its start node.
    #[error("expansion produced depth {got}, expected {expected}")]
    ExpansionNotChild { expected: u32, got: u32 },

    /// Rollout asked to continue from a state that already failed.
    #[error("rollout started from a failed state at depth {depth}")]
    RolloutFromFailed { depth: u32 },

    /// Rollout has a live state but the generator offers nothing to play.
    #[error("rollout has no candidate actions at depth {depth}")]
    RolloutDeadEnd { depth: u32 },

    /// Game evaluation is only reachable once the simulator has failed.
    #[error("evaluation reached with a live state at depth {depth}")]
    EvaluateOnLiveState { depth: u32 },

    /// Run export needs a state at every node along the path.
    #[error("run export missing a state at depth {depth}")]
    MissingState { depth: u32 },

    /// Not enough free workers to satisfy a stage request.
    #[error("worker pool exhausted: requested {requested}, available {available}")]
    PoolExhausted { requested: usize, available: usize },

    /// The underlying thread pool could not be constructed.
    #[error("failed to build worker thread pool")]
    PoolBuild(#[from] rayon::ThreadPoolBuildError),

    /// Stage results queried before its termination predicate fired.
    #[error("stage results requested before the stage finished")]
    StageIncomplete,
}

pub type Result<T> = std::result::Result<T, SearchError>;
