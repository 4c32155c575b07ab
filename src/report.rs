//! Episode reporting and run export.
//!
//! Reporters are passive observers: the worker calls them at fixed
//! lifecycle points and ignores anything they might think about it, so a
//! data archiver, a plotter, or nothing at all can be swapped in without
//! touching control flow.

use std::sync::Arc;

use log::{debug, trace};

use crate::action::{ActionSequence, TimedAction};
use crate::error::{Result, SearchError};
use crate::node::SearchNode;
use crate::sim::{Command, SimState};

/// Observes one worker's episodes. All hooks default to no-ops.
pub trait RunReporter<C: Command, S: SimState>: Send {
    /// A fresh world was created and the episode restarted from the root.
    fn report_init(&mut self) {}

    /// One simulator tick executed with `command`.
    fn report_step(&mut self, command: C) {
        let _ = command;
    }

    /// The episode reached a failed state. `actions` is everything enqueued
    /// since the last init, in execution order.
    fn report_end(&mut self, actions: &[TimedAction<C>], final_state: &S) {
        let _ = (actions, final_state);
    }
}

/// Reports nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullReporter;

impl<C: Command, S: SimState> RunReporter<C, S> for NullReporter {}

/// Writes episode summaries to the `log` facade. Per-tick output is at
/// trace level; leave it off unless debugging a simulator.
#[derive(Debug, Default)]
pub struct LogReporter {
    episodes: u64,
    ticks: u64,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Command, S: SimState> RunReporter<C, S> for LogReporter {
    fn report_init(&mut self) {
        self.episodes += 1;
        self.ticks = 0;
        debug!("episode {} started", self.episodes);
    }

    fn report_step(&mut self, command: C) {
        self.ticks += 1;
        trace!("tick {}: {:?}", self.ticks, command);
    }

    fn report_end(&mut self, actions: &[TimedAction<C>], final_state: &S) {
        debug!(
            "episode {} ended after {} ticks, {} actions, final state {:?}",
            self.episodes,
            self.ticks,
            actions.len(),
            final_state
        );
    }
}

// ============================================================================
// RUN EXPORT
// ============================================================================

/// One archived step: the action taken and the state it produced.
#[derive(Clone, Debug)]
pub struct RunStep<C: Command, S: SimState> {
    pub action: TimedAction<C>,
    pub state: S,
}

/// A complete root-to-node run in execution order, ready for an external
/// serializer.
#[derive(Clone, Debug)]
pub struct RunExport<C: Command, S: SimState> {
    pub initial_state: S,
    pub steps: Vec<RunStep<C, S>>,
}

impl<C: Command, S: SimState> RunExport<C, S> {
    pub fn actions(&self) -> ActionSequence<C> {
        self.steps.iter().map(|s| s.action).collect()
    }
}

/// Reconstruct the archived form of the run ending at `node`.
///
/// Every node on the path must carry its state; a gap means the run was
/// never fully simulated and cannot be archived.
pub fn export_run<C: Command, S: SimState>(
    node: &Arc<SearchNode<C, S>>,
) -> Result<RunExport<C, S>> {
    let mut chain = Vec::with_capacity(node.depth() as usize + 1);
    let mut cursor = Some(node.clone());
    while let Some(n) = cursor {
        cursor = n.parent();
        chain.push(n);
    }
    chain.reverse();

    let initial_state = chain[0]
        .state_clone()
        .ok_or(SearchError::MissingState { depth: 0 })?;

    let actions = node.sequence();
    let mut steps = Vec::with_capacity(actions.len());
    for (action, n) in actions.into_iter().zip(chain[1..].iter()) {
        let state = n
            .state_clone()
            .ok_or(SearchError::MissingState { depth: n.depth() })?;
        steps.push(RunStep { action, state });
    }
    Ok(RunExport {
        initial_state,
        steps,
    })
}
