//! The per-thread search driver.
//!
//! A worker owns one simulator and one action queue and repeatedly plays
//! episodes: replay a path into the shared tree, expand it by at least one
//! node, optionally continue with a detached playout, then score the
//! episode and start over. All tree coordination happens through the
//! sampler and the node protocol; workers never talk to each other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use log::{debug, warn};

use crate::error::{Result, SearchError};
use crate::node::{ScratchNode, SearchNode};
use crate::queue::ActionQueue;
use crate::report::RunReporter;
use crate::sampler::{RolloutStart, Sampler};
use crate::sim::Simulator;
use crate::stats::SearchStats;

type NodeRef<Sim> =
    Arc<SearchNode<<Sim as Simulator>::Command, <Sim as Simulator>::State>>;

// ============================================================================
// WORKER STATES
// ============================================================================

/// One step of the worker loop is one transition between these states.
/// `step()` performs exactly one transition (a single simulator tick counts
/// as one), which is the granularity at which stop requests take effect.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WorkerState {
    Idle,
    Initialize,
    TreePolicyChoosing,
    TreePolicyExecuting,
    ExpansionPolicyChoosing,
    ExpansionPolicyExecuting,
    RolloutPolicyChoosing,
    RolloutPolicyExecuting,
    EvaluateGame,
    Exhausted,
}

// ============================================================================
// SHARED RUN CONTROL
// ============================================================================

/// Pause/stop switchboard shared by every worker attached to a stage.
/// Paused workers block on a condvar instead of spinning; a stop request
/// wakes them so it is never masked by a pause.
pub struct WorkerControl {
    stop: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
}

impl WorkerControl {
    pub fn new() -> Self {
        WorkerControl {
            stop: AtomicBool::new(false),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
        }
    }

    /// Ask every attached worker to finish its current transition and stop.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        let _guard = self.paused.lock().unwrap();
        self.resumed.notify_all();
    }

    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Re-arm a control that served a previous stage.
    pub fn clear_stop(&self) {
        self.stop.store(false, Ordering::Relaxed);
    }

    pub fn pause(&self) {
        *self.paused.lock().unwrap() = true;
    }

    pub fn resume(&self) {
        let mut paused = self.paused.lock().unwrap();
        *paused = false;
        self.resumed.notify_all();
    }

    fn wait_while_paused(&self) {
        let mut paused = self.paused.lock().unwrap();
        while *paused && !self.stop_requested() {
            paused = self.resumed.wait(paused).unwrap();
        }
    }
}

impl Default for WorkerControl {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// WORKER
// ============================================================================

pub struct Worker<Sim: Simulator> {
    id: usize,
    sim: Sim,
    queue: ActionQueue<Sim::Command>,
    sampler: Box<dyn Sampler<Sim::Command, Sim::State>>,
    reporter: Box<dyn RunReporter<Sim::Command, Sim::State>>,
    stats: Arc<SearchStats>,
    control: Arc<WorkerControl>,
    root: NodeRef<Sim>,

    state: WorkerState,
    current: NodeRef<Sim>,
    /// Tree-policy destination while its action suffix is being replayed.
    target: Option<NodeRef<Sim>>,
    /// The node this cycle's expansions hang under; its reservation is held
    /// until the episode is scored or abandoned.
    expansion_node: Option<NodeRef<Sim>>,
    /// Freshly linked child waiting for its simulated state.
    expansion_child: Option<NodeRef<Sim>>,
    /// Last realized playout step beyond the tree boundary.
    scratch: Option<ScratchNode<Sim::Command, Sim::State>>,
    /// Playout step chosen but not yet simulated.
    scratch_next: Option<ScratchNode<Sim::Command, Sim::State>>,
    /// Simulated ticks not yet flushed to the shared counters.
    ticks_this_episode: u64,
}

impl<Sim: Simulator> Worker<Sim> {
    pub fn new(
        id: usize,
        sim: Sim,
        sampler: Box<dyn Sampler<Sim::Command, Sim::State>>,
        reporter: Box<dyn RunReporter<Sim::Command, Sim::State>>,
        stats: Arc<SearchStats>,
        control: Arc<WorkerControl>,
        root: NodeRef<Sim>,
    ) -> Self {
        Worker {
            id,
            sim,
            queue: ActionQueue::new(),
            sampler,
            reporter,
            stats,
            control,
            current: root.clone(),
            root,
            state: WorkerState::Idle,
            target: None,
            expansion_node: None,
            expansion_child: None,
            scratch: None,
            scratch_next: None,
            ticks_this_episode: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    #[inline]
    pub fn current(&self) -> &NodeRef<Sim> {
        &self.current
    }

    /// Point this worker at a different shared root, dropping all episode
    /// state. Used when a pooled worker moves between stages.
    pub fn attach(&mut self, root: NodeRef<Sim>) {
        self.abandon_reservation();
        self.flush_steps();
        self.current = root.clone();
        self.root = root;
        self.target = None;
        self.expansion_child = None;
        self.scratch = None;
        self.scratch_next = None;
        self.queue.clear_all();
        self.sampler.reset();
        self.state = WorkerState::Idle;
    }

    /// Drive transitions until stopped, exhausted, or broken by a contract
    /// violation. Any held expansion reservation is released on the way out.
    pub fn run(&mut self) -> Result<()> {
        let outcome = loop {
            self.control.wait_while_paused();
            if self.control.stop_requested() {
                break Ok(());
            }
            if self.state == WorkerState::Exhausted {
                break Ok(());
            }
            if let Err(e) = self.step() {
                warn!("worker {}: stopping on error: {}", self.id, e);
                break Err(e);
            }
        };
        self.abandon_reservation();
        self.flush_steps();
        outcome
    }

    /// Execute exactly one state transition.
    pub fn step(&mut self) -> Result<()> {
        match self.state {
            WorkerState::Idle => {
                self.state = WorkerState::Initialize;
            }
            WorkerState::Initialize => self.initialize(),
            WorkerState::TreePolicyChoosing => self.tree_policy_choosing()?,
            WorkerState::TreePolicyExecuting => self.tree_policy_executing()?,
            WorkerState::ExpansionPolicyChoosing => self.expansion_policy_choosing()?,
            WorkerState::ExpansionPolicyExecuting => self.expansion_policy_executing()?,
            WorkerState::RolloutPolicyChoosing => self.rollout_policy_choosing()?,
            WorkerState::RolloutPolicyExecuting => self.rollout_policy_executing()?,
            WorkerState::EvaluateGame => self.evaluate_game()?,
            WorkerState::Exhausted => {}
        }
        Ok(())
    }

    fn initialize(&mut self) {
        // Reroutes land here with an episode abandoned midway.
        self.abandon_reservation();
        self.flush_steps();
        self.queue.clear_all();
        self.sim.make_new_world();
        self.current = self.root.clone();
        self.target = None;
        self.expansion_child = None;
        self.scratch = None;
        self.scratch_next = None;
        self.sampler.reset();
        self.reporter.report_init();
        self.state = WorkerState::TreePolicyChoosing;
    }

    fn tree_policy_choosing(&mut self) -> Result<()> {
        if self.current.is_fully_explored() {
            // The ground under us closed; with it the whole tree may have.
            self.state = if Arc::ptr_eq(&self.current, &self.root) {
                debug!("worker {}: root fully explored", self.id);
                WorkerState::Exhausted
            } else {
                WorkerState::Initialize
            };
            return Ok(());
        }
        if self.sampler.tree_policy_guard(&self.current) {
            self.state = WorkerState::ExpansionPolicyChoosing;
            return Ok(());
        }
        match self.sampler.tree_policy(&self.current)? {
            None => {
                // Jammed by contention. Retry from the top unless the tree
                // closed underneath the jam.
                self.state = if self.root.is_fully_explored() {
                    WorkerState::Exhausted
                } else {
                    WorkerState::Initialize
                };
            }
            Some(target) => {
                if Arc::ptr_eq(&target, &self.current) {
                    // Nothing to traverse.
                    self.expansion_node = Some(target);
                    self.sampler.tree_policy_done(&self.current);
                    self.state = WorkerState::ExpansionPolicyChoosing;
                    return Ok(());
                }
                let actions = target.actions_from(&self.current)?;
                self.queue.add_sequence(&actions)?;
                self.expansion_node = Some(target.clone());
                self.target = Some(target);
                self.state = WorkerState::TreePolicyExecuting;
            }
        }
        Ok(())
    }

    fn tree_policy_executing(&mut self) -> Result<()> {
        let command = self.queue.poll_command()?;
        let failed = self.sim.step(command);
        self.reporter.report_step(command);
        self.ticks_this_episode += 1;
        if failed {
            // Replay may legitimately end on a node the tree already knows
            // is terminal. Anything else means the simulator and the tree
            // disagree about validated ground.
            let consistent = self.queue.is_empty()
                && self.target.as_ref().map_or(false, |t| t.state_failed());
            if !consistent {
                let target = self.target.as_ref().map_or(0, |t| t.depth());
                return Err(SearchError::TreePolicyFailure { target });
            }
            if let Some(target) = self.target.take() {
                self.current = target;
                self.sampler.tree_policy_done(&self.current);
            }
            self.state = WorkerState::EvaluateGame;
            return Ok(());
        }
        if self.queue.is_empty() {
            if let Some(target) = self.target.take() {
                self.current = target;
                self.sampler.tree_policy_done(&self.current);
            }
            self.state = WorkerState::TreePolicyChoosing;
        }
        Ok(())
    }

    fn expansion_policy_choosing(&mut self) -> Result<()> {
        if self.sampler.expansion_policy_guard(&self.current) {
            self.state = WorkerState::RolloutPolicyChoosing;
            return Ok(());
        }
        match self.sampler.expansion_policy(&self.current)? {
            None => {
                // Other workers drained the untried set between our tree
                // policy and now. Walk the tree again.
                self.abandon_reservation();
                self.sampler.reset();
                self.state = if self.current.is_fully_explored() {
                    if Arc::ptr_eq(&self.current, &self.root) {
                        WorkerState::Exhausted
                    } else {
                        WorkerState::Initialize
                    }
                } else {
                    WorkerState::TreePolicyChoosing
                };
            }
            Some(child) => {
                let expected = self.current.depth() + 1;
                if child.depth() != expected {
                    return Err(SearchError::ExpansionNotChild {
                        expected,
                        got: child.depth(),
                    });
                }
                match child.action() {
                    Some(action) => self.queue.add_action(action),
                    None => {
                        return Err(SearchError::ExpansionNotChild {
                            expected,
                            got: child.depth(),
                        })
                    }
                }
                self.expansion_child = Some(child);
                self.state = WorkerState::ExpansionPolicyExecuting;
            }
        }
        Ok(())
    }

    fn expansion_policy_executing(&mut self) -> Result<()> {
        let command = self.queue.poll_command()?;
        let failed = self.sim.step(command);
        self.reporter.report_step(command);
        self.ticks_this_episode += 1;
        if failed || self.queue.is_empty() {
            if let Some(child) = self.expansion_child.take() {
                child.assign_state(self.sim.state())?;
                self.current = child;
                self.sampler.expansion_policy_done(&self.current);
            }
            self.state = WorkerState::ExpansionPolicyChoosing;
        }
        Ok(())
    }

    fn rollout_policy_choosing(&mut self) -> Result<()> {
        let ready = match &self.scratch {
            Some(prev) => self.sampler.rollout_policy_guard(RolloutStart::Scratch(prev)),
            None => self.sampler.rollout_policy_guard(RolloutStart::Tree(&self.current)),
        };
        if ready {
            self.state = WorkerState::EvaluateGame;
            return Ok(());
        }
        let step = match &self.scratch {
            Some(prev) => self.sampler.rollout_policy(RolloutStart::Scratch(prev))?,
            None => self.sampler.rollout_policy(RolloutStart::Tree(&self.current))?,
        };
        match step {
            None => {
                warn!(
                    "worker {}: playout stalled at depth {}; restarting",
                    self.id,
                    self.scratch.as_ref().map_or(self.current.depth(), |s| s.depth())
                );
                self.state = WorkerState::Initialize;
            }
            Some(next) => {
                self.queue.add_action(next.action());
                self.scratch_next = Some(next);
                self.state = WorkerState::RolloutPolicyExecuting;
            }
        }
        Ok(())
    }

    fn rollout_policy_executing(&mut self) -> Result<()> {
        let command = self.queue.poll_command()?;
        let failed = self.sim.step(command);
        self.reporter.report_step(command);
        self.ticks_this_episode += 1;
        if failed || self.queue.is_empty() {
            if let Some(mut next) = self.scratch_next.take() {
                next.assign_state(self.sim.state())?;
                self.sampler.rollout_policy_done(&next);
                self.scratch = Some(next);
            }
            self.state = WorkerState::RolloutPolicyChoosing;
        }
        Ok(())
    }

    fn evaluate_game(&mut self) -> Result<()> {
        match self.scratch.take() {
            Some(scratch) => {
                // Detached playouts were already scored through the sampler
                // hooks; the tree is left untouched.
                if !scratch.state_failed() {
                    return Err(SearchError::EvaluateOnLiveState {
                        depth: scratch.depth(),
                    });
                }
            }
            None => {
                if !self.current.state_failed() {
                    return Err(SearchError::EvaluateOnLiveState {
                        depth: self.current.depth(),
                    });
                }
                self.current.mark_terminal();
                self.current.propagate_fully_explored();
            }
        }
        self.stats.record_game();
        self.abandon_reservation();
        self.flush_steps();
        let actions = self.queue.actions_in_run();
        let final_state = self.sim.state();
        self.reporter.report_end(&actions, &final_state);
        self.state = if self.root.is_fully_explored() {
            debug!("worker {}: root fully explored", self.id);
            WorkerState::Exhausted
        } else {
            WorkerState::Idle
        };
        Ok(())
    }

    fn abandon_reservation(&mut self) {
        if let Some(node) = self.expansion_node.take() {
            node.release_expansion_rights();
        }
    }

    fn flush_steps(&mut self) {
        if self.ticks_this_episode > 0 {
            self.stats.record_steps(self.ticks_this_episode);
            self.ticks_this_episode = 0;
        }
    }
}
