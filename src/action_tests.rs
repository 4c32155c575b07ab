#[cfg(test)]
mod tests {
    use super::super::action::*;
    use crate::error::SearchError;
    use crate::generator::{ActionGenerator, FixedCycleGenerator, NullGenerator};
    use crate::queue::ActionQueue;
    use crate::runner::RunnerCommand;
    use smallvec::smallvec;
    use std::collections::HashMap;

    fn nil(ticks: u32) -> TimedAction<RunnerCommand> {
        TimedAction::new(ticks, RunnerCommand::NIL)
    }

    fn wo(ticks: u32) -> TimedAction<RunnerCommand> {
        TimedAction::new(ticks, RunnerCommand::WO)
    }

    fn qp(ticks: u32) -> TimedAction<RunnerCommand> {
        TimedAction::new(ticks, RunnerCommand::QP)
    }

    #[test]
    fn actions_compare_by_value() {
        assert_eq!(wo(5), wo(5));
        assert_ne!(wo(5), wo(4));
        assert_ne!(wo(5), qp(5));
        assert_eq!(
            nil(3),
            TimedAction::new(3, RunnerCommand::from_keys(false, false, false, false))
        );
    }

    #[test]
    fn cursor_polls_exactly_duration_times() {
        let mut cursor = wo(4).cursor();
        for remaining in (0..4).rev() {
            assert!(cursor.has_next());
            assert_eq!(cursor.poll().unwrap(), RunnerCommand::WO);
            assert_eq!(cursor.remaining(), remaining);
        }
        assert!(!cursor.has_next());
        assert!(matches!(
            cursor.poll(),
            Err(SearchError::ActionExhausted { ticks: 4 })
        ));
    }

    #[test]
    fn cursor_reset_restores_full_duration() {
        let mut cursor = qp(3).cursor();
        cursor.poll().unwrap();
        cursor.poll().unwrap();
        cursor.reset();
        assert_eq!(cursor.remaining(), 3);
        for _ in 0..3 {
            cursor.poll().unwrap();
        }
        assert!(!cursor.has_next());
    }

    #[test]
    fn cursors_are_independent_copies() {
        let action = qp(3);
        let mut first = action.cursor();
        let second = action.cursor();
        first.poll().unwrap();
        assert_eq!(first.remaining(), 2);
        assert_eq!(second.remaining(), 3);
        assert_eq!(first.base(), second.base());
    }

    #[test]
    fn consolidate_merges_adjacent_equal_commands() {
        // (nil x3, nil x2, qp x5) collapses to (nil x5, qp x5).
        let merged = consolidate(&[nil(3), nil(2), qp(5)]).unwrap();
        assert_eq!(merged.as_slice(), &[nil(5), qp(5)]);
    }

    #[test]
    fn consolidate_drops_zero_durations_and_remerges() {
        // Removing the zero-length nil makes the two wo runs adjacent.
        let merged = consolidate(&[wo(2), nil(0), wo(3), qp(1)]).unwrap();
        assert_eq!(merged.as_slice(), &[wo(5), qp(1)]);
    }

    #[test]
    fn consolidate_of_nothing_playable_errs() {
        assert!(matches!(
            consolidate(&[nil(0), wo(0)]),
            Err(SearchError::EmptyConsolidation)
        ));
        assert!(matches!(
            consolidate::<RunnerCommand>(&[]),
            Err(SearchError::EmptyConsolidation)
        ));
    }

    #[test]
    fn queue_yields_one_command_per_tick() {
        let queue = ActionQueue::new();
        queue.add_action(nil(2));
        queue.add_action(wo(3));
        assert!(!queue.is_empty());
        assert_eq!(queue.total_ticks(), 5);

        let mut commands = Vec::new();
        while !queue.is_empty() {
            commands.push(queue.poll_command().unwrap());
        }
        assert_eq!(
            commands,
            vec![
                RunnerCommand::NIL,
                RunnerCommand::NIL,
                RunnerCommand::WO,
                RunnerCommand::WO,
                RunnerCommand::WO,
            ]
        );
        assert!(matches!(
            queue.poll_command(),
            Err(SearchError::EmptyQueue)
        ));
    }

    #[test]
    fn queue_restart_replays_the_run() {
        let queue = ActionQueue::new();
        queue.add_sequence(&[nil(1), wo(2)]).unwrap();
        let mut first = Vec::new();
        while !queue.is_empty() {
            first.push(queue.poll_command().unwrap());
        }
        queue.restart();
        assert!(!queue.is_empty());
        let mut second = Vec::new();
        while !queue.is_empty() {
            second.push(queue.poll_command().unwrap());
        }
        assert_eq!(first, second);
    }

    #[test]
    fn queue_rejects_empty_sequences() {
        let queue: ActionQueue<RunnerCommand> = ActionQueue::new();
        assert!(matches!(
            queue.add_sequence(&[]),
            Err(SearchError::EmptySequence)
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn zero_duration_actions_are_never_enqueued() {
        let queue = ActionQueue::new();
        queue.add_action(nil(0));
        assert!(queue.is_empty());
        queue.add_sequence(&[nil(0), wo(2), qp(0)]).unwrap();
        assert_eq!(queue.actions_in_run().as_slice(), &[wo(2)]);
    }

    #[test]
    fn queue_peeks_do_not_consume() {
        let queue = ActionQueue::new();
        queue.add_sequence(&[nil(1), wo(2)]).unwrap();
        assert_eq!(queue.peek_this_action(), Some(nil(1)));
        assert_eq!(queue.peek_next_action(), Some(wo(2)));
        assert_eq!(queue.peek_command(), Some(RunnerCommand::NIL));
        assert_eq!(queue.total_ticks(), 3);

        queue.poll_command().unwrap();
        // nil's single tick is gone; the peeks land on the next action.
        assert_eq!(queue.peek_this_action(), Some(wo(2)));
        assert_eq!(queue.peek_next_action(), None);
        assert_eq!(queue.peek_command(), Some(RunnerCommand::WO));
    }

    #[test]
    fn queue_pending_views_track_progress() {
        let queue = ActionQueue::new();
        queue.add_sequence(&[nil(3), wo(2)]).unwrap();
        queue.poll_command().unwrap();

        assert_eq!(queue.current_action_index(), 0);
        assert_eq!(queue.actions_in_run().as_slice(), &[nil(3), wo(2)]);
        assert_eq!(queue.pending_actions().as_slice(), &[nil(3), wo(2)]);
        // The in-progress action shrinks to its remaining ticks.
        assert_eq!(queue.pending_actions_from_now().as_slice(), &[nil(2), wo(2)]);

        queue.poll_command().unwrap();
        queue.poll_command().unwrap();
        assert_eq!(queue.current_action_index(), 1);
        assert_eq!(queue.pending_actions().as_slice(), &[wo(2)]);
        assert_eq!(queue.pending_actions_from_now().as_slice(), &[wo(2)]);
    }

    #[test]
    fn queue_clear_all_discards_everything() {
        let queue = ActionQueue::new();
        queue.add_sequence(&[nil(4), wo(4)]).unwrap();
        queue.poll_command().unwrap();
        queue.clear_all();
        assert!(queue.is_empty());
        assert_eq!(queue.total_ticks(), 0);
        assert!(queue.actions_in_run().is_empty());
        assert!(matches!(
            queue.poll_command(),
            Err(SearchError::EmptyQueue)
        ));
    }

    #[test]
    fn fixed_cycle_generator_wraps_and_overrides() {
        let cycle: Vec<ActionList<RunnerCommand>> =
            vec![smallvec![nil(1)], smallvec![wo(2)]];
        let mut exceptions: HashMap<u32, ActionList<RunnerCommand>> = HashMap::new();
        exceptions.insert(1, smallvec![qp(9)]);
        let generator = FixedCycleGenerator::with_exceptions(cycle, exceptions);

        assert_eq!(generator.cycle_len(), 2);
        assert_eq!(generator.actions_at_depth(0).as_slice(), &[nil(1)]);
        assert_eq!(generator.actions_at_depth(1).as_slice(), &[qp(9)]);
        assert_eq!(generator.actions_at_depth(2).as_slice(), &[nil(1)]);
        assert_eq!(generator.actions_at_depth(3).as_slice(), &[wo(2)]);
    }

    #[test]
    fn null_generator_offers_nothing() {
        let generator = NullGenerator;
        let menu = <NullGenerator as ActionGenerator<RunnerCommand>>::actions_at_depth(&generator, 0);
        assert!(menu.is_empty());
    }
}
