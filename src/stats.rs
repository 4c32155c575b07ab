use std::sync::atomic::{AtomicU64, Ordering};

/// Shared search counters, updated lock-free from every worker.
///
/// One instance is created per tree and handed around explicitly (workers,
/// stages, tests); nothing here is global. `nodes_created` counts nodes
/// linked into the shared tree, so after a quiescent point it equals the
/// total number of successful expansions.
#[derive(Debug, Default)]
pub struct SearchStats {
    pub games_played: AtomicU64,
    pub steps_simulated: AtomicU64,
    pub nodes_created: AtomicU64,
}

/// Point-in-time copy of the counters, used for stage deltas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub games_played: u64,
    pub steps_simulated: u64,
    pub nodes_created: u64,
}

impl SearchStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn record_game(&self) {
        self.games_played.fetch_add(1, Ordering::Relaxed);
    }

    /// Workers tally simulated ticks locally and flush per episode.
    #[inline(always)]
    pub fn record_steps(&self, steps: u64) {
        self.steps_simulated.fetch_add(steps, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_node(&self) {
        self.nodes_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn games_played(&self) -> u64 {
        self.games_played.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn steps_simulated(&self) -> u64 {
        self.steps_simulated.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn nodes_created(&self) -> u64 {
        self.nodes_created.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            games_played: self.games_played(),
            steps_simulated: self.steps_simulated(),
            nodes_created: self.nodes_created(),
        }
    }
}

impl StatsSnapshot {
    /// Counter movement since `earlier`, saturating so a stale baseline
    /// cannot underflow.
    pub fn since(&self, earlier: &StatsSnapshot) -> StatsSnapshot {
        StatsSnapshot {
            games_played: self.games_played.saturating_sub(earlier.games_played),
            steps_simulated: self.steps_simulated.saturating_sub(earlier.steps_simulated),
            nodes_created: self.nodes_created.saturating_sub(earlier.nodes_created),
        }
    }
}
