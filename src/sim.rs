//! Simulator-facing traits.
//!
//! The search core never implements game dynamics. It drives an external
//! simulator through this seam: one fixed-duration step per polled command,
//! with a failure flag deciding when an episode is over. Each worker owns
//! its simulator exclusively, so implementations need `Send` but never
//! `Sync`.

use std::fmt::Debug;
use std::hash::Hash;

/// A single-tick control input (e.g. a set of pressed keys).
///
/// Commands are tiny value types: they are copied into every queued action
/// cursor and hashed/compared when de-duplicating sibling actions.
pub trait Command: Copy + Eq + Hash + Debug + Send + Sync + 'static {}

/// A snapshot of simulator output attached to a tree node.
pub trait SimState: Clone + Debug + Send + Sync + 'static {
    /// Whether this snapshot represents a failed (terminal) configuration.
    fn is_failed(&self) -> bool;
}

/// The external game being searched.
pub trait Simulator: Send {
    type Command: Command;
    type State: SimState;

    /// Reset to the canonical initial configuration.
    fn make_new_world(&mut self);

    /// Advance one fixed timestep under `command`. Returns the failure flag
    /// as of the end of the step.
    fn step(&mut self, command: Self::Command) -> bool;

    /// Snapshot the current state.
    fn state(&self) -> Self::State;

    /// Whether a failure condition has occurred this episode.
    fn failed(&self) -> bool;
}

// ===== STEP-LIMIT REFERENCE SIMULATOR =====

/// Tick counter state reported by [`StepLimitSim`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickState {
    pub ticks: u32,
    pub failed: bool,
}

impl SimState for TickState {
    fn is_failed(&self) -> bool {
        self.failed
    }
}

/// A trivial simulator that fails after a fixed number of ticks regardless
/// of input. Useful wherever a predictable, instantly-computed world is
/// needed: unit tests, stage plumbing checks, throughput measurements.
#[derive(Debug)]
pub struct StepLimitSim<C: Command> {
    horizon: u32,
    ticks: u32,
    _marker: std::marker::PhantomData<C>,
}

impl<C: Command> StepLimitSim<C> {
    pub fn new(horizon: u32) -> Self {
        StepLimitSim {
            horizon,
            ticks: 0,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<C: Command> Simulator for StepLimitSim<C> {
    type Command = C;
    type State = TickState;

    fn make_new_world(&mut self) {
        self.ticks = 0;
    }

    fn step(&mut self, _command: C) -> bool {
        self.ticks += 1;
        self.failed()
    }

    fn state(&self) -> TickState {
        TickState {
            ticks: self.ticks,
            failed: self.failed(),
        }
    }

    fn failed(&self) -> bool {
        self.ticks >= self.horizon
    }
}
