//! Bounded worker pool and stage execution.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::action::ActionSequence;
use crate::error::{Result, SearchError};
use crate::node::SearchNode;
use crate::report::RunReporter;
use crate::sampler::Sampler;
use crate::sim::{Command, Simulator};
use crate::stage::SearchStage;
use crate::stats::{SearchStats, StatsSnapshot};
use crate::worker::{Worker, WorkerControl};

type NodeRef<Sim> =
    Arc<SearchNode<<Sim as Simulator>::Command, <Sim as Simulator>::State>>;
type SimFactory<Sim> = Box<dyn Fn(usize) -> Sim + Send + Sync>;
type SamplerFactory<Sim> = Box<
    dyn Fn(usize) -> Box<dyn Sampler<<Sim as Simulator>::Command, <Sim as Simulator>::State>>
        + Send
        + Sync,
>;
type ReporterFactory<Sim> = Box<
    dyn Fn(usize) -> Box<dyn RunReporter<<Sim as Simulator>::Command, <Sim as Simulator>::State>>
        + Send
        + Sync,
>;

/// Sizing and polling knobs for [`WorkerPool`].
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Fraction of `available_parallelism` handed to search threads.
    pub parallelism_fraction: f32,
    /// How often stage predicates are re-evaluated while workers run.
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            parallelism_fraction: 0.5,
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// What one finished stage produced.
#[derive(Debug)]
pub struct StageOutcome<C: Command> {
    pub results: Vec<ActionSequence<C>>,
    /// Counter movement over the stage (games, steps, nodes).
    pub deltas: StatsSnapshot,
    pub elapsed: Duration,
    /// Workers that stopped on a contract violation instead of a stop
    /// request. The stage still reports whatever the others built.
    pub worker_errors: Vec<(usize, SearchError)>,
}

/// A bounded set of search workers multiplexed over one OS thread pool.
///
/// The pool is built once per campaign; stages borrow workers from it one
/// burst at a time. A stage that asks for more workers than are free fails
/// with [`SearchError::PoolExhausted`] so the caller can retry smaller.
pub struct WorkerPool<Sim: Simulator + 'static> {
    threads: ThreadPool,
    capacity: usize,
    free: Mutex<usize>,
    stats: Arc<SearchStats>,
    config: PoolConfig,
    sim_factory: SimFactory<Sim>,
    sampler_factory: SamplerFactory<Sim>,
    reporter_factory: ReporterFactory<Sim>,
}

impl<Sim: Simulator + 'static> WorkerPool<Sim> {
    pub fn new(
        config: PoolConfig,
        stats: Arc<SearchStats>,
        sim_factory: SimFactory<Sim>,
        sampler_factory: SamplerFactory<Sim>,
        reporter_factory: ReporterFactory<Sim>,
    ) -> Result<Self> {
        let available = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let capacity =
            ((config.parallelism_fraction * available as f32).ceil() as usize).max(1);
        let threads = ThreadPoolBuilder::new()
            .num_threads(capacity)
            .thread_name(|i| format!("search-worker-{i}"))
            .build()?;
        info!("worker pool ready: {capacity} of {available} hardware threads");
        Ok(WorkerPool {
            threads,
            capacity,
            free: Mutex::new(capacity),
            stats,
            config,
            sim_factory,
            sampler_factory,
            reporter_factory,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        *self.free.lock().unwrap()
    }

    #[inline]
    pub fn stats(&self) -> &Arc<SearchStats> {
        &self.stats
    }

    fn checkout(&self, requested: usize) -> Result<()> {
        let mut free = self.free.lock().unwrap();
        if *free < requested {
            return Err(SearchError::PoolExhausted {
                requested,
                available: *free,
            });
        }
        *free -= requested;
        Ok(())
    }

    fn checkin(&self, count: usize) {
        *self.free.lock().unwrap() += count;
    }

    /// Run `stage` with `workers` fresh workers attached to `root` and
    /// block until it finishes, the root is fully explored, or every worker
    /// exhausts or errors out.
    pub fn run_stage(
        &self,
        stage: &mut dyn SearchStage<Sim::Command, Sim::State>,
        root: &NodeRef<Sim>,
        workers: usize,
    ) -> Result<StageOutcome<Sim::Command>> {
        self.checkout(workers)?;
        let control = Arc::new(WorkerControl::new());
        let baseline = self.stats.snapshot();
        stage.begin(root, &self.stats);
        info!("stage started: {workers} workers below depth {}", root.depth());
        let started = Instant::now();

        let (tx, rx) = mpsc::channel();
        for index in 0..workers {
            let mut worker = Worker::new(
                index,
                (self.sim_factory)(index),
                (self.sampler_factory)(index),
                (self.reporter_factory)(index),
                Arc::clone(&self.stats),
                Arc::clone(&control),
                Arc::clone(root),
            );
            let tx = tx.clone();
            self.threads.spawn(move || {
                let outcome = worker.run();
                let _ = tx.send((worker.id(), outcome));
            });
        }
        drop(tx);

        let mut remaining = workers;
        let mut worker_errors = Vec::new();
        loop {
            while let Ok((id, outcome)) = rx.try_recv() {
                remaining -= 1;
                if let Err(e) = outcome {
                    warn!("worker {id} stopped on error: {e}");
                    worker_errors.push((id, e));
                }
            }
            if remaining == 0 {
                break;
            }
            if stage.finished(root, &self.stats) || root.is_fully_explored() {
                break;
            }
            thread::sleep(self.config.poll_interval);
        }
        control.request_stop();
        while remaining > 0 {
            match rx.recv() {
                Ok((id, outcome)) => {
                    remaining -= 1;
                    if let Err(e) = outcome {
                        warn!("worker {id} stopped on error: {e}");
                        worker_errors.push((id, e));
                    }
                }
                Err(_) => break,
            }
        }
        // Final poll so the stage latches conditions reached at the very
        // end (workers exhausting the subtree on their own).
        stage.finished(root, &self.stats);
        self.checkin(workers);

        let deltas = self.stats.snapshot().since(&baseline);
        let elapsed = started.elapsed();
        let results = stage.results(root)?;
        info!(
            "stage finished in {:.2?}: {} games, {} steps, {} nodes, {} result(s)",
            elapsed,
            deltas.games_played,
            deltas.steps_simulated,
            deltas.nodes_created,
            results.len()
        );
        Ok(StageOutcome {
            results,
            deltas,
            elapsed,
            worker_errors,
        })
    }
}
