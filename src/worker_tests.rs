#[cfg(test)]
mod tests {
    use super::super::worker::*;
    use crate::action::{ActionList, TimedAction};
    use crate::error::SearchError;
    use crate::evaluator::ConstantEvaluator;
    use crate::generator::{ActionGenerator, FixedCycleGenerator};
    use crate::node::SearchNode;
    use crate::report::{LogReporter, NullReporter, RunReporter};
    use crate::runner::RunnerCommand;
    use crate::sampler::{GreedyConfig, GreedySampler, RandomSampler, UcbSampler};
    use crate::sim::{StepLimitSim, TickState};
    use crate::stats::SearchStats;
    use smallvec::smallvec;
    use std::collections::HashMap;
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn live(ticks: u32) -> TickState {
        TickState {
            ticks,
            failed: false,
        }
    }

    fn dead(ticks: u32) -> TickState {
        TickState {
            ticks,
            failed: true,
        }
    }

    fn nil(ticks: u32) -> TimedAction<RunnerCommand> {
        TimedAction::new(ticks, RunnerCommand::NIL)
    }

    fn wo(ticks: u32) -> TimedAction<RunnerCommand> {
        TimedAction::new(ticks, RunnerCommand::WO)
    }

    fn qp(ticks: u32) -> TimedAction<RunnerCommand> {
        TimedAction::new(ticks, RunnerCommand::QP)
    }

    /// Three two-tick choices at every depth.
    fn menu3() -> Arc<FixedCycleGenerator<RunnerCommand>> {
        Arc::new(FixedCycleGenerator::new(vec![smallvec![
            nil(2),
            wo(2),
            qp(2)
        ]]))
    }

    /// `root_menu` at depth 0, `deeper` everywhere below.
    fn layered(
        root_menu: ActionList<RunnerCommand>,
        deeper: ActionList<RunnerCommand>,
    ) -> Arc<FixedCycleGenerator<RunnerCommand>> {
        let mut exceptions = HashMap::new();
        exceptions.insert(0, root_menu);
        Arc::new(FixedCycleGenerator::with_exceptions(vec![deeper], exceptions))
    }

    fn random_worker(
        gen: &Arc<FixedCycleGenerator<RunnerCommand>>,
        root: &Arc<SearchNode<RunnerCommand, TickState>>,
        stats: &Arc<SearchStats>,
        control: &Arc<WorkerControl>,
        horizon: u32,
    ) -> Worker<StepLimitSim<RunnerCommand>> {
        init_logging();
        Worker::new(
            0,
            StepLimitSim::new(horizon),
            Box::new(RandomSampler::new(
                Arc::clone(gen) as Arc<dyn ActionGenerator<RunnerCommand>>,
                Arc::clone(stats),
                1,
            )),
            Box::new(NullReporter),
            Arc::clone(stats),
            Arc::clone(control),
            Arc::clone(root),
        )
    }

    #[test]
    fn one_episode_one_transition_at_a_time() {
        use WorkerState::*;

        // One two-tick action per depth and a four-tick horizon: the only
        // episode expands twice and the second expansion fails the game.
        let gen = Arc::new(FixedCycleGenerator::new(vec![smallvec![nil(2)]]));
        let stats = Arc::new(SearchStats::new());
        let control = Arc::new(WorkerControl::new());
        let root = SearchNode::new_root(live(0), &*gen);
        let mut worker = random_worker(&gen, &root, &stats, &control, 4);

        assert_eq!(worker.state(), Idle);
        let expected = [
            Initialize,
            TreePolicyChoosing,
            // The tree policy lands on the node we already stand on.
            ExpansionPolicyChoosing,
            ExpansionPolicyExecuting,
            // First tick of the two-tick action.
            ExpansionPolicyExecuting,
            ExpansionPolicyChoosing,
            ExpansionPolicyExecuting,
            ExpansionPolicyExecuting,
            ExpansionPolicyChoosing,
            RolloutPolicyChoosing,
            EvaluateGame,
            Exhausted,
        ];
        for (step, state) in expected.iter().enumerate() {
            worker.step().unwrap();
            assert_eq!(worker.state(), *state, "after transition {}", step + 1);
            match step + 1 {
                6 => assert_eq!(worker.current().depth(), 1),
                9 => {
                    assert_eq!(worker.current().depth(), 2);
                    assert!(worker.current().state_failed());
                }
                _ => {}
            }
        }

        // Exhausted is absorbing.
        worker.step().unwrap();
        assert_eq!(worker.state(), Exhausted);

        assert!(root.is_fully_explored());
        assert_eq!(stats.games_played(), 1);
        assert_eq!(stats.steps_simulated(), 4);
        assert_eq!(stats.nodes_created(), 2);
    }

    #[derive(Default)]
    struct Tally {
        inits: usize,
        steps: usize,
        /// One entry per episode end: actions in the run, failed flag,
        /// final tick count.
        ends: Vec<(usize, bool, u32)>,
    }

    struct TallyReporter(Arc<Mutex<Tally>>);

    impl RunReporter<RunnerCommand, TickState> for TallyReporter {
        fn report_init(&mut self) {
            self.0.lock().unwrap().inits += 1;
        }

        fn report_step(&mut self, _command: RunnerCommand) {
            self.0.lock().unwrap().steps += 1;
        }

        fn report_end(&mut self, actions: &[TimedAction<RunnerCommand>], final_state: &TickState) {
            self.0.lock().unwrap().ends.push((
                actions.len(),
                final_state.failed,
                final_state.ticks,
            ));
        }
    }

    #[test]
    fn reporters_see_the_episode_lifecycle() {
        init_logging();
        let gen = Arc::new(FixedCycleGenerator::new(vec![smallvec![nil(2)]]));
        let stats = Arc::new(SearchStats::new());
        let control = Arc::new(WorkerControl::new());
        let root = SearchNode::new_root(live(0), &*gen);
        let tally = Arc::new(Mutex::new(Tally::default()));
        let mut worker = Worker::new(
            0,
            StepLimitSim::<RunnerCommand>::new(4),
            Box::new(RandomSampler::new(
                Arc::clone(&gen) as Arc<dyn ActionGenerator<RunnerCommand>>,
                Arc::clone(&stats),
                1,
            )),
            Box::new(TallyReporter(Arc::clone(&tally))),
            Arc::clone(&stats),
            Arc::clone(&control),
            Arc::clone(&root),
        );

        worker.run().unwrap();

        // One episode: init, four executed ticks, one terminal report
        // carrying both enqueued actions and the failed final state.
        let tally = tally.lock().unwrap();
        assert_eq!(tally.inits, 1);
        assert_eq!(tally.steps, 4);
        assert_eq!(tally.ends.as_slice(), &[(2, true, 4)]);
    }

    #[test]
    fn random_worker_exhausts_the_whole_tree() {
        // Three actions of two ticks each, failure at tick eight: the full
        // tree is 3 + 9 + 27 + 81 nodes and every episode simulates exactly
        // eight ticks before terminating a fresh depth-four node.
        let gen = menu3();
        let stats = Arc::new(SearchStats::new());
        let control = Arc::new(WorkerControl::new());
        let root = SearchNode::new_root(live(0), &*gen);
        let mut worker = random_worker(&gen, &root, &stats, &control, 8);

        worker.run().unwrap();

        assert_eq!(worker.state(), WorkerState::Exhausted);
        assert!(root.is_fully_explored());
        assert_eq!(root.child_count(), 3);
        assert_eq!(root.count_nodes_below(), 121);
        assert_eq!(stats.nodes_created(), 120);
        assert_eq!(stats.games_played(), 81);
        assert_eq!(stats.steps_simulated(), 648);
    }

    #[test]
    fn ucb_worker_exhausts_the_whole_tree() {
        // One expansion per episode: 120 episodes of exactly eight ticks.
        let gen = menu3();
        let stats = Arc::new(SearchStats::new());
        let control = Arc::new(WorkerControl::new());
        let root = SearchNode::new_root(live(0), &*gen);
        let mut worker = Worker::new(
            0,
            StepLimitSim::<RunnerCommand>::new(8),
            Box::new(UcbSampler::new(
                Arc::clone(&gen) as Arc<dyn ActionGenerator<RunnerCommand>>,
                Arc::clone(&stats),
                Arc::new(ConstantEvaluator { value: 1.0 }),
                0.7,
                0.0,
                5,
            )),
            Box::new(LogReporter::new()),
            Arc::clone(&stats),
            Arc::clone(&control),
            Arc::clone(&root),
        );

        worker.run().unwrap();

        assert_eq!(worker.state(), WorkerState::Exhausted);
        assert!(root.is_fully_explored());
        assert_eq!(root.count_nodes_below(), 121);
        assert_eq!(stats.nodes_created(), 120);
        assert_eq!(stats.games_played(), 120);
        assert_eq!(stats.steps_simulated(), 960);

        // Every episode was scored through exactly one depth-one ancestor,
        // and none of the scores reached the root.
        let child_visits: u64 = root.children_snapshot().iter().map(|c| c.visits()).sum();
        assert_eq!(child_visits, 120);
        assert_eq!(root.visits(), 0);
    }

    #[test]
    fn greedy_worker_exhausts_the_whole_tree() {
        // Budgets small enough that the sampler advances and retreats its
        // private root several times along the way.
        let config = GreedyConfig {
            samples_at_depth0: 4,
            depth_n: 2,
            samples_at_depth_n: 3,
            samples_at_inf: 2,
            forward_jump: 1,
            backwards_jump: 2,
            backwards_jump_min: 1,
            backwards_jump_growth: 1.5,
        };
        let gen = menu3();
        let stats = Arc::new(SearchStats::new());
        let control = Arc::new(WorkerControl::new());
        let root = SearchNode::new_root(live(0), &*gen);
        let mut worker = Worker::new(
            0,
            StepLimitSim::<RunnerCommand>::new(8),
            Box::new(GreedySampler::new(
                Arc::clone(&gen) as Arc<dyn ActionGenerator<RunnerCommand>>,
                Arc::clone(&stats),
                Arc::new(ConstantEvaluator { value: 1.0 }),
                config,
                5,
            )),
            Box::new(NullReporter),
            Arc::clone(&stats),
            Arc::clone(&control),
            Arc::clone(&root),
        );

        worker.run().unwrap();

        assert_eq!(worker.state(), WorkerState::Exhausted);
        assert!(root.is_fully_explored());
        assert_eq!(root.count_nodes_below(), 121);
        assert_eq!(stats.nodes_created(), 120);
        assert_eq!(stats.games_played(), 81);
        assert_eq!(stats.steps_simulated(), 648);
    }

    #[test]
    fn inconsistent_replay_failure_breaks_the_worker() {
        // The tree claims a ten-tick action survived; the simulator dies at
        // tick four with the queue still loaded. That contradiction must
        // surface instead of being scored as a game.
        let gen = layered(smallvec![nil(10)], smallvec![wo(2)]);
        let stats = Arc::new(SearchStats::new());
        let control = Arc::new(WorkerControl::new());
        let root = SearchNode::new_root(live(0), &*gen);
        let poisoned = root.add_child(nil(10), &*gen, &stats).unwrap();
        poisoned.assign_state(live(10)).unwrap();

        let mut worker = random_worker(&gen, &root, &stats, &control, 4);
        let err = worker.run().unwrap_err();
        assert!(matches!(err, SearchError::TreePolicyFailure { target: 1 }));
        assert_eq!(stats.games_played(), 0);
        assert_eq!(stats.steps_simulated(), 4);
    }

    #[test]
    fn consistent_replay_failure_is_scored_as_a_game() {
        // Replaying onto a node the tree already knows is failed is a
        // legitimate episode end, not a contract violation.
        let gen = layered(smallvec![nil(4)], smallvec![wo(2)]);
        let stats = Arc::new(SearchStats::new());
        let control = Arc::new(WorkerControl::new());
        let root = SearchNode::new_root(live(0), &*gen);
        let failed = root.add_child(nil(4), &*gen, &stats).unwrap();
        failed.assign_state(dead(4)).unwrap();

        let mut worker = random_worker(&gen, &root, &stats, &control, 4);
        worker.run().unwrap();

        assert_eq!(worker.state(), WorkerState::Exhausted);
        assert!(failed.is_terminal());
        assert!(root.is_fully_explored());
        assert_eq!(stats.games_played(), 1);
        assert_eq!(stats.steps_simulated(), 4);
    }

    #[test]
    fn stop_request_precedes_the_first_transition() {
        let gen = menu3();
        let stats = Arc::new(SearchStats::new());
        let control = Arc::new(WorkerControl::new());
        let root = SearchNode::new_root(live(0), &*gen);
        let mut worker = random_worker(&gen, &root, &stats, &control, 8);

        control.request_stop();
        worker.run().unwrap();

        assert_eq!(worker.state(), WorkerState::Idle);
        assert_eq!(stats.games_played(), 0);
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn paused_worker_blocks_until_stopped() {
        let gen = menu3();
        let stats = Arc::new(SearchStats::new());
        let control = Arc::new(WorkerControl::new());
        let root = SearchNode::new_root(live(0), &*gen);
        let mut worker = random_worker(&gen, &root, &stats, &control, 8);

        control.pause();
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let outcome = worker.run();
            tx.send(outcome).unwrap();
        });

        thread::sleep(Duration::from_millis(50));
        assert!(matches!(rx.try_recv(), Err(mpsc::TryRecvError::Empty)));

        // A stop request must cut through the pause.
        control.request_stop();
        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(outcome.is_ok());
        handle.join().unwrap();
        assert_eq!(stats.games_played(), 0);
    }

    #[test]
    fn attach_rebases_the_worker_on_a_new_root() {
        let gen = Arc::new(FixedCycleGenerator::new(vec![smallvec![nil(2)]]));
        let stats = Arc::new(SearchStats::new());
        let control = Arc::new(WorkerControl::new());
        let first = SearchNode::new_root(live(0), &*gen);
        let mut worker = random_worker(&gen, &first, &stats, &control, 2);

        worker.run().unwrap();
        assert_eq!(worker.state(), WorkerState::Exhausted);
        assert!(first.is_fully_explored());
        assert_eq!(stats.games_played(), 1);

        let second = SearchNode::new_root(live(0), &*gen);
        worker.attach(Arc::clone(&second));
        assert_eq!(worker.state(), WorkerState::Idle);
        assert!(Arc::ptr_eq(worker.current(), &second));

        worker.run().unwrap();
        assert!(second.is_fully_explored());
        assert_eq!(stats.games_played(), 2);
        assert_eq!(stats.steps_simulated(), 4);
    }
}
