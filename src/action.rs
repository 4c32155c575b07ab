//! Timed actions: a control command held for a fixed number of ticks.
//!
//! A [`TimedAction`] is an immutable (duration, command) pair shared freely
//! across the tree; nodes reached by the same keypress-run at different
//! depths compare equal by value. Execution state lives only in
//! [`ActionCursor`], a fresh countdown copy minted per enqueue, so two
//! workers replaying the same action can never corrupt a shared counter.

use smallvec::SmallVec;

use crate::error::{Result, SearchError};
use crate::sim::Command;

/// Candidate action menus. Menus per depth are small, so they live inline
/// most of the time.
pub type ActionList<C> = SmallVec<[TimedAction<C>; 8]>;

/// An ordered root-to-node action sequence.
pub type ActionSequence<C> = Vec<TimedAction<C>>;

/// An immutable command held for a whole number of simulator ticks.
///
/// Equality and hashing are by value: same command, same duration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TimedAction<C: Command> {
    ticks: u32,
    command: C,
}

impl<C: Command> TimedAction<C> {
    pub fn new(ticks: u32, command: C) -> Self {
        TimedAction { ticks, command }
    }

    #[inline]
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    #[inline]
    pub fn command(&self) -> C {
        self.command
    }

    /// Mint a fresh, independent countdown copy for execution.
    pub fn cursor(&self) -> ActionCursor<C> {
        ActionCursor {
            base: *self,
            remaining: self.ticks,
        }
    }
}

/// An in-flight copy of a [`TimedAction`] with ticks remaining.
///
/// Only cursors can be polled; the shared base action carries no execution
/// state at all.
#[derive(Clone, Debug)]
pub struct ActionCursor<C: Command> {
    base: TimedAction<C>,
    remaining: u32,
}

impl<C: Command> ActionCursor<C> {
    /// Consume one tick and return the command to apply for it.
    pub fn poll(&mut self) -> Result<C> {
        if self.remaining == 0 {
            return Err(SearchError::ActionExhausted {
                ticks: self.base.ticks,
            });
        }
        self.remaining -= 1;
        Ok(self.base.command)
    }

    #[inline]
    pub fn has_next(&self) -> bool {
        self.remaining > 0
    }

    #[inline]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[inline]
    pub fn base(&self) -> TimedAction<C> {
        self.base
    }

    /// Restore the full duration.
    pub fn reset(&mut self) {
        self.remaining = self.base.ticks;
    }

    /// The unconsumed remainder re-expressed as an action, used when
    /// copying a queue from its execution point.
    pub fn remainder_action(&self) -> TimedAction<C> {
        TimedAction::new(self.remaining, self.base.command)
    }
}

/// Run-length merge of a sequence: adjacent actions sharing a command are
/// combined and zero-duration entries dropped, repeated until stable.
///
/// Errors if nothing survives, since an all-zero sequence cannot be
/// executed.
pub fn consolidate<C: Command>(actions: &[TimedAction<C>]) -> Result<ActionList<C>> {
    let mut current: ActionList<C> = actions
        .iter()
        .copied()
        .filter(|a| a.ticks > 0)
        .collect();

    loop {
        let mut merged: ActionList<C> = ActionList::new();
        let mut changed = false;
        for action in current.drain(..) {
            match merged.last_mut() {
                Some(tail) if tail.command == action.command => {
                    tail.ticks += action.ticks;
                    changed = true;
                }
                _ => merged.push(action),
            }
        }
        current = merged;
        if !changed {
            break;
        }
    }

    if current.is_empty() {
        return Err(SearchError::EmptyConsolidation);
    }
    Ok(current)
}
