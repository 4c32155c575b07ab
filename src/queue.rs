//! Per-worker execution queue feeding the simulator one command per tick.
//!
//! Every enqueue mints an independent [`ActionCursor`] copy, so the queue
//! never shares countdown state with the tree. The queue is fully mutexed;
//! only the empty flag is readable lock-free because workers check it every
//! tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::action::{ActionCursor, ActionList, TimedAction};
use crate::error::{Result, SearchError};
use crate::sim::Command;

struct QueueInner<C: Command> {
    /// Every cursor enqueued this run, in order. Finished cursors stay in
    /// place so the run can be replayed or exported.
    run: Vec<ActionCursor<C>>,
    /// Index of the cursor currently being drained. May lag one behind the
    /// next pollable cursor until the next poll advances it.
    index: usize,
}

impl<C: Command> QueueInner<C> {
    /// Index of the cursor the next poll would draw from (== `run.len()`
    /// when the queue is drained).
    fn effective(&self) -> usize {
        let mut i = self.index;
        while i < self.run.len() && !self.run[i].has_next() {
            i += 1;
        }
        i
    }
}

pub struct ActionQueue<C: Command> {
    inner: Mutex<QueueInner<C>>,
    empty: AtomicBool,
}

impl<C: Command> ActionQueue<C> {
    pub fn new() -> Self {
        ActionQueue {
            inner: Mutex::new(QueueInner {
                run: Vec::new(),
                index: 0,
            }),
            empty: AtomicBool::new(true),
        }
    }

    /// Enqueue a fresh cursor for `action`. Zero-duration actions are
    /// accepted but never enqueued.
    pub fn add_action(&self, action: TimedAction<C>) {
        if action.ticks() == 0 {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        inner.run.push(action.cursor());
        self.empty.store(false, Ordering::Relaxed);
    }

    /// Enqueue a whole sequence atomically. An empty slice is an error, and
    /// nothing is enqueued in that case.
    pub fn add_sequence(&self, actions: &[TimedAction<C>]) -> Result<()> {
        if actions.is_empty() {
            return Err(SearchError::EmptySequence);
        }
        let mut inner = self.inner.lock().unwrap();
        let mut enqueued = false;
        for action in actions {
            if action.ticks() == 0 {
                continue;
            }
            inner.run.push(action.cursor());
            enqueued = true;
        }
        if enqueued {
            self.empty.store(false, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Pop the command for the next tick, auto-advancing past the current
    /// action once it is exhausted (resetting it so the run can be replayed).
    pub fn poll_command(&self) -> Result<C> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        while inner.index < inner.run.len() {
            if inner.run[inner.index].has_next() {
                break;
            }
            inner.run[inner.index].reset();
            inner.index += 1;
        }
        let at = inner.index;
        if at >= inner.run.len() {
            self.empty.store(true, Ordering::Relaxed);
            return Err(SearchError::EmptyQueue);
        }
        let command = inner.run[at].poll()?;
        let drained = !inner.run[at].has_next() && at + 1 == inner.run.len();
        self.empty.store(drained, Ordering::Relaxed);
        Ok(command)
    }

    /// Lock-free: checked by workers every simulated tick.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.empty.load(Ordering::Relaxed)
    }

    /// Discard queued and in-progress actions.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.run.clear();
        inner.index = 0;
        self.empty.store(true, Ordering::Relaxed);
    }

    /// Rewind the whole run so it can be polled again from the first tick.
    pub fn restart(&self) {
        let mut inner = self.inner.lock().unwrap();
        for cursor in &mut inner.run {
            cursor.reset();
        }
        inner.index = 0;
        self.empty.store(inner.run.is_empty(), Ordering::Relaxed);
    }

    /// The action the next poll draws from, if any.
    pub fn peek_this_action(&self) -> Option<TimedAction<C>> {
        let inner = self.inner.lock().unwrap();
        let eff = inner.effective();
        inner.run.get(eff).map(ActionCursor::base)
    }

    /// The action after the current one, if any.
    pub fn peek_next_action(&self) -> Option<TimedAction<C>> {
        let inner = self.inner.lock().unwrap();
        let eff = inner.effective();
        inner.run.get(eff + 1).map(ActionCursor::base)
    }

    /// The command the next poll would return, without consuming a tick.
    pub fn peek_command(&self) -> Option<C> {
        let inner = self.inner.lock().unwrap();
        let eff = inner.effective();
        inner.run.get(eff).map(|c| c.base().command())
    }

    /// Everything enqueued this run, consumed or not.
    pub fn actions_in_run(&self) -> ActionList<C> {
        let inner = self.inner.lock().unwrap();
        inner.run.iter().map(ActionCursor::base).collect()
    }

    /// Index of the action the next poll draws from (== number of actions
    /// enqueued once the run is drained).
    pub fn current_action_index(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.effective()
    }

    /// Sum of the enqueued durations, regardless of consumption.
    pub fn total_ticks(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        inner.run.iter().map(|c| u64::from(c.base().ticks())).sum()
    }

    /// Actions not yet finished, at their full durations.
    pub fn pending_actions(&self) -> ActionList<C> {
        let inner = self.inner.lock().unwrap();
        let eff = inner.effective();
        inner.run[eff..].iter().map(ActionCursor::base).collect()
    }

    /// Actions not yet finished, with the in-progress one trimmed to its
    /// remaining ticks.
    pub fn pending_actions_from_now(&self) -> ActionList<C> {
        let inner = self.inner.lock().unwrap();
        let eff = inner.effective();
        let mut out = ActionList::new();
        for (i, cursor) in inner.run.iter().enumerate().skip(eff) {
            if i == eff {
                out.push(cursor.remainder_action());
            } else {
                out.push(cursor.base());
            }
        }
        out
    }
}

impl<C: Command> Default for ActionQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}
