#[cfg(test)]
mod tests {
    use super::super::runner::*;
    use crate::action::TimedAction;
    use crate::error::SearchError;
    use crate::evaluator::Evaluator;
    use crate::generator::ActionGenerator;
    use crate::node::SearchNode;
    use crate::report::export_run;
    use crate::sim::{SimState, Simulator};
    use crate::stats::SearchStats;

    const FALL_CAP: u32 = 200;

    /// Step under one command until failure, up to `FALL_CAP` ticks.
    fn run_until_fall(world: &mut RunnerWorld, command: RunnerCommand) {
        while !world.failed() && world.ticks() < FALL_CAP {
            world.step(command);
        }
    }

    #[test]
    fn starting_posture_is_fixed() {
        let world = RunnerWorld::new();
        let state = world.state();
        assert_eq!(world.ticks(), 0);
        assert!(!world.failed());
        assert!(!state.is_failed());
        assert_eq!(state.torso_x(), 2.5);
        assert_eq!(state.torso_height(), 1.2);
        assert_eq!(state.torso_pitch(), 0.4);
        assert_eq!(state.torso_speed(), 0.0);
    }

    #[test]
    fn identical_commands_give_identical_worlds() {
        let script = [
            (RunnerCommand::WO, 5),
            (RunnerCommand::NIL, 3),
            (RunnerCommand::QP, 4),
        ];
        let mut a = RunnerWorld::new();
        let mut b = RunnerWorld::new();
        for (command, ticks) in script {
            for _ in 0..ticks {
                a.step(command);
                b.step(command);
            }
        }
        assert_eq!(a.ticks(), b.ticks());
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn commands_change_the_outcome() {
        let mut driven = RunnerWorld::new();
        let mut idle = RunnerWorld::new();
        for _ in 0..10 {
            driven.step(RunnerCommand::WO);
            idle.step(RunnerCommand::NIL);
        }
        // Leg drive moves the figure; idling leaves it in place, tipping.
        assert!(driven.state().torso_x() > 2.5);
        assert_eq!(idle.state().torso_x(), 2.5);
        assert!(idle.state().torso_pitch() > 0.4);
        assert_ne!(driven.state(), idle.state());
    }

    #[test]
    fn idle_figure_tips_over() {
        let mut world = RunnerWorld::new();
        run_until_fall(&mut world, RunnerCommand::NIL);
        assert!(world.failed());
        assert!(world.state().is_failed());
        assert!(world.ticks() >= 10, "fell unreasonably fast: {}", world.ticks());
        assert!(world.ticks() <= 64, "fell unreasonably late: {}", world.ticks());
    }

    #[test]
    fn held_keys_stall_and_fall() {
        let mut world = RunnerWorld::new();
        run_until_fall(&mut world, RunnerCommand::WO);
        // The first strides carry it forward, then the saturated hip tips
        // it over.
        assert!(world.failed());
        assert!(world.state().torso_x() > 2.5);
        assert!(world.ticks() >= 15, "fell unreasonably fast: {}", world.ticks());
        assert!(world.ticks() <= 80, "fell unreasonably late: {}", world.ticks());
    }

    #[test]
    fn alternating_gait_keeps_running() {
        let phases = [
            (RunnerCommand::NIL, 10),
            (RunnerCommand::WO, 34),
            (RunnerCommand::NIL, 10),
            (RunnerCommand::QP, 34),
        ];
        let mut world = RunnerWorld::new();
        let mut remaining = 600;
        'run: loop {
            for (command, ticks) in phases {
                for _ in 0..ticks {
                    assert!(
                        !world.step(command),
                        "gait fell at tick {}",
                        world.ticks()
                    );
                    remaining -= 1;
                    if remaining == 0 {
                        break 'run;
                    }
                }
            }
        }
        assert!(!world.failed());
        assert!(world.state().torso_x() > 3.0);
    }

    #[test]
    fn fallen_world_stays_down() {
        let mut world = RunnerWorld::new();
        run_until_fall(&mut world, RunnerCommand::NIL);
        let fell_at = world.ticks();

        // Further stepping is inert, whatever the keys.
        assert!(world.step(RunnerCommand::WO));
        assert!(world.step(RunnerCommand::QP));
        assert_eq!(world.ticks(), fell_at);
        assert!(world.state().is_failed());
    }

    #[test]
    fn reset_restores_the_start() {
        let mut world = RunnerWorld::new();
        run_until_fall(&mut world, RunnerCommand::WO);
        assert!(world.failed());

        world.make_new_world();
        assert_eq!(world.ticks(), 0);
        assert!(!world.failed());
        assert_eq!(world.state(), RunnerWorld::new().state());
    }

    #[test]
    fn snapshot_layout_holds_every_segment() {
        assert_eq!(STATE_LEN, 72);
        assert_eq!(Segment::ALL.len(), SEGMENT_COUNT);

        let mut world = RunnerWorld::new();
        for _ in 0..7 {
            world.step(RunnerCommand::WO);
        }
        let state = world.state();
        assert_eq!(state.values().len(), STATE_LEN);
        assert_eq!(state.value(Segment::Torso, Component::X), state.torso_x());

        // Torso-relative form zeroes the torso and shifts everything else.
        let relative = state.relative();
        assert_eq!(relative[Segment::Torso.index() * COMPONENTS_PER_SEGMENT], 0.0);
        assert_eq!(
            relative[Segment::Head.index() * COMPONENTS_PER_SEGMENT],
            state.value(Segment::Head, Component::X) - state.torso_x()
        );
        // Y components are untouched.
        assert_eq!(
            relative[Segment::Head.index() * COMPONENTS_PER_SEGMENT + 1],
            state.value(Segment::Head, Component::Y)
        );
    }

    #[test]
    fn evaluators_read_the_torso() {
        let mut world = RunnerWorld::new();
        for _ in 0..12 {
            world.step(RunnerCommand::WO);
        }
        let state = world.state();
        assert_eq!(DistanceEvaluator.evaluate(&state), state.torso_x());
        assert_eq!(
            HandTunedEvaluator.evaluate(&state),
            state.torso_pitch() + state.torso_x() + state.torso_speed()
        );
    }

    #[test]
    fn key_combinations_map_to_drives() {
        assert_eq!(RunnerCommand::from_keys(false, true, true, false), RunnerCommand::WO);
        assert_eq!(RunnerCommand::from_keys(true, false, false, true), RunnerCommand::QP);
        assert_eq!(RunnerCommand::from_keys(false, false, false, false), RunnerCommand::NIL);

        assert_eq!(RunnerCommand::WO.thigh_drive(), 1.0);
        assert_eq!(RunnerCommand::QP.thigh_drive(), -1.0);
        assert_eq!(RunnerCommand::WO.knee_drive(), 1.0);
        assert_eq!(RunnerCommand::QP.knee_drive(), -1.0);
        // Opposing keys cancel.
        let all = RunnerCommand::from_keys(true, true, true, true);
        assert_eq!(all.thigh_drive(), 0.0);
        assert_eq!(all.knee_drive(), 0.0);
    }

    #[test]
    fn default_menus_follow_the_gait_cycle() {
        let gen = default_gait_generator();
        assert_eq!(gen.cycle_len(), 4);

        let relax = gen.actions_at_depth(0);
        assert_eq!(relax.len(), 24);
        assert!(relax.iter().all(|a| a.command() == RunnerCommand::NIL));
        assert_eq!(relax[0].ticks(), 1);
        assert_eq!(relax[23].ticks(), 24);

        // Narrower launch menus at depths one through three.
        let drive = gen.actions_at_depth(1);
        assert_eq!(drive.len(), 20);
        assert!(drive.iter().all(|a| a.command() == RunnerCommand::WO));
        assert_eq!(drive[0].ticks(), 30);
        assert_eq!(gen.actions_at_depth(2).len(), 19);
        let launch_qp = gen.actions_at_depth(3);
        assert_eq!(launch_qp.len(), 15);
        assert!(launch_qp.iter().all(|a| a.command() == RunnerCommand::QP));

        // Past the exceptions the four-beat cycle takes over.
        let wrapped = gen.actions_at_depth(4);
        assert_eq!(wrapped.len(), 24);
        assert!(wrapped.iter().all(|a| a.command() == RunnerCommand::NIL));
        let wrapped_wo = gen.actions_at_depth(5);
        assert_eq!(wrapped_wo.len(), 40);
        assert!(wrapped_wo.iter().all(|a| a.command() == RunnerCommand::WO));
    }

    #[test]
    fn archived_runs_replay_the_sequence() {
        let gen = default_gait_generator();
        let stats = SearchStats::new();
        let mut world = RunnerWorld::new();
        let root = SearchNode::new_root(world.state(), &gen);

        // Realize the first two tree actions on a live world.
        let first = root.untried_snapshot()[0];
        for _ in 0..first.ticks() {
            world.step(first.command());
        }
        let a = root.add_child(first, &gen, &stats).unwrap();
        a.assign_state(world.state()).unwrap();

        let second = a.untried_snapshot()[0];
        assert_eq!(second, TimedAction::new(30, RunnerCommand::WO));
        for _ in 0..second.ticks() {
            world.step(second.command());
        }
        let b = a.add_child(second, &gen, &stats).unwrap();
        b.assign_state(world.state()).unwrap();

        let export = export_run(&b).unwrap();
        assert_eq!(export.initial_state, RunnerWorld::new().state());
        assert_eq!(export.steps.len(), 2);
        assert_eq!(export.steps[0].action, first);
        assert_eq!(export.steps[1].action, second);
        assert_eq!(export.steps[1].state, world.state());
        assert_eq!(export.actions(), b.sequence());

        // A node that was never simulated cannot be archived.
        let third = b.untried_snapshot()[0];
        let c = b.add_child(third, &gen, &stats).unwrap();
        assert!(matches!(
            export_run(&c),
            Err(SearchError::MissingState { depth: 3 })
        ));
    }
}
