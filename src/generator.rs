//! Candidate-action seeding for newly created tree nodes.

use std::collections::HashMap;

use crate::action::ActionList;
use crate::sim::Command;

/// Supplies the untried-action menu for a node at a given tree depth.
///
/// Implementations must be pure: many node constructions may query the same
/// generator concurrently.
pub trait ActionGenerator<C: Command>: Send + Sync {
    fn actions_at_depth(&self, tree_depth: u32) -> ActionList<C>;
}

/// Cycles through a fixed list of action menus by depth, with optional
/// exact-depth overrides (useful for a different menu while getting moving).
pub struct FixedCycleGenerator<C: Command> {
    cycle: Vec<ActionList<C>>,
    exceptions: HashMap<u32, ActionList<C>>,
}

impl<C: Command> FixedCycleGenerator<C> {
    /// Panics if `cycle` is empty.
    pub fn new(cycle: Vec<ActionList<C>>) -> Self {
        Self::with_exceptions(cycle, HashMap::new())
    }

    /// Panics if `cycle` is empty. Exception menus are keyed by the exact
    /// tree depth they replace.
    pub fn with_exceptions(cycle: Vec<ActionList<C>>, exceptions: HashMap<u32, ActionList<C>>) -> Self {
        assert!(!cycle.is_empty(), "action cycle must have at least one menu");
        FixedCycleGenerator { cycle, exceptions }
    }

    #[inline]
    pub fn cycle_len(&self) -> usize {
        self.cycle.len()
    }
}

impl<C: Command> ActionGenerator<C> for FixedCycleGenerator<C> {
    fn actions_at_depth(&self, tree_depth: u32) -> ActionList<C> {
        if let Some(menu) = self.exceptions.get(&tree_depth) {
            return menu.clone();
        }
        self.cycle[tree_depth as usize % self.cycle.len()].clone()
    }
}

/// Generates nothing. Terminal layers and hand-built test trees use this.
#[derive(Clone, Copy, Default)]
pub struct NullGenerator;

impl<C: Command> ActionGenerator<C> for NullGenerator {
    fn actions_at_depth(&self, _tree_depth: u32) -> ActionList<C> {
        ActionList::new()
    }
}
