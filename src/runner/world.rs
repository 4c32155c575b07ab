//! Deterministic surrogate dynamics for the runner.
//!
//! This is not a physics port. It is a hand-built reduced model with the
//! properties the search engine cares about: a fixed 25 Hz timestep, failure
//! on excessive torso pitch or torso collapse, and forward progress that
//! requires alternating leg drive. Legs are first-order servos toward the
//! commanded pose; while they swing, foot placement keeps the torso near its
//! running lean, and once they stall (held or idle keys) the torso is an
//! inverted pendulum and tips. Everything is a pure function of the command
//! sequence, so identical runs produce identical states.

use ndarray::Array1;

use crate::runner::command::RunnerCommand;
use crate::runner::state::{RunnerState, Segment, COMPONENTS_PER_SEGMENT, STATE_LEN};
use crate::sim::Simulator;

/// Simulation rate is fixed at 25 Hz.
pub const TIMESTEP_S: f32 = 0.04;

// Starting posture.
const START_X: f32 = 2.5;
const START_PITCH: f32 = 0.4;
const TORSO_HEIGHT: f32 = 1.2;

// Failure thresholds.
const PITCH_LIMIT: f32 = 1.2;
const MIN_HEIGHT: f32 = 0.6;

// Leg servos.
const HIP_RANGE: f32 = 0.8;
const HIP_RATE: f32 = 6.0;
const KNEE_RANGE: f32 = 0.6;
const KNEE_RATE: f32 = 7.0;

// Balance. Legs slower than STRIDE_VEL_MIN no longer catch the fall.
const STRIDE_VEL_MIN: f32 = 0.5;
const UPRIGHT_GAIN: f32 = 40.0;
const UPRIGHT_DAMPING: f32 = 10.0;
const TIP_GAIN: f32 = 1.5;
const LEG_TORQUE: f32 = 0.35;

// Propulsion.
const HIP_PUSH: f32 = 0.35;
const KNEE_PUSH: f32 = 0.15;
const DRAG: f32 = 1.2;

// Crouch and sag geometry feeding the torso height.
const KNEE_CROUCH: f32 = 0.25;
const PITCH_SAG: f32 = 0.55;

// Segment placement.
const TORSO_HALF: f32 = 0.55;
const HEAD_OFFSET: f32 = 0.65;
const THIGH_LEN: f32 = 0.5;
const CALF_LEN: f32 = 0.45;
const KNEE_BEND_BASE: f32 = 0.3;
const SHOULDER_OFFSET: f32 = 0.45;
const UPPER_ARM_LEN: f32 = 0.4;
const LOWER_ARM_LEN: f32 = 0.35;
const ELBOW_BEND: f32 = 0.5;
const ARM_SWING: f32 = 0.6;

pub struct RunnerWorld {
    x: f32,
    vx: f32,
    pitch: f32,
    vpitch: f32,
    hip: f32,
    hip_vel: f32,
    knee: f32,
    knee_vel: f32,
    height: f32,
    prev_height: f32,
    ticks: u32,
    failed: bool,
}

impl RunnerWorld {
    pub fn new() -> Self {
        let mut world = RunnerWorld {
            x: 0.0,
            vx: 0.0,
            pitch: 0.0,
            vpitch: 0.0,
            hip: 0.0,
            hip_vel: 0.0,
            knee: 0.0,
            knee_vel: 0.0,
            height: 0.0,
            prev_height: 0.0,
            ticks: 0,
            failed: false,
        };
        world.make_new_world();
        world
    }

    /// Ticks simulated since the last reset.
    #[inline]
    pub fn ticks(&self) -> u32 {
        self.ticks
    }
}

impl Default for RunnerWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn put(
    values: &mut Array1<f32>,
    segment: Segment,
    x: f32,
    y: f32,
    th: f32,
    dx: f32,
    dy: f32,
    dth: f32,
) {
    let base = segment.index() * COMPONENTS_PER_SEGMENT;
    values[base] = x;
    values[base + 1] = y;
    values[base + 2] = th;
    values[base + 3] = dx;
    values[base + 4] = dy;
    values[base + 5] = dth;
}

impl Simulator for RunnerWorld {
    type Command = RunnerCommand;
    type State = RunnerState;

    fn make_new_world(&mut self) {
        self.x = START_X;
        self.vx = 0.0;
        self.pitch = START_PITCH;
        self.vpitch = 0.0;
        self.hip = 0.0;
        self.hip_vel = 0.0;
        self.knee = 0.0;
        self.knee_vel = 0.0;
        self.height = TORSO_HEIGHT;
        self.prev_height = TORSO_HEIGHT;
        self.ticks = 0;
        self.failed = false;
    }

    fn step(&mut self, command: RunnerCommand) -> bool {
        if self.failed {
            // A fallen world stays down.
            return true;
        }
        let dt = TIMESTEP_S;

        let hip_target = command.thigh_drive() * HIP_RANGE;
        let knee_target = command.knee_drive() * KNEE_RANGE;
        self.hip_vel = (hip_target - self.hip) * HIP_RATE;
        self.knee_vel = (knee_target - self.knee) * KNEE_RATE;
        self.hip += self.hip_vel * dt;
        self.knee += self.knee_vel * dt;

        // Swinging legs place feet under the fall; stalled legs leave an
        // inverted pendulum with the saturated hip pushing it over.
        let striding = self.hip_vel.abs() > STRIDE_VEL_MIN;
        let pitch_accel = if striding {
            -UPRIGHT_GAIN * (self.pitch - START_PITCH) - UPRIGHT_DAMPING * self.vpitch
        } else {
            TIP_GAIN * self.pitch + LEG_TORQUE * self.hip
        };
        self.vpitch += pitch_accel * dt;
        self.pitch += self.vpitch * dt;

        self.vx +=
            (HIP_PUSH * self.hip_vel.abs() + KNEE_PUSH * self.knee_vel.abs() - DRAG * self.vx)
                * dt;
        self.x += self.vx * dt;

        self.prev_height = self.height;
        self.height = TORSO_HEIGHT
            - KNEE_CROUCH * self.knee.abs()
            - PITCH_SAG * (self.pitch - START_PITCH).abs();

        self.ticks += 1;
        if self.pitch.abs() > PITCH_LIMIT || self.height < MIN_HEIGHT {
            self.failed = true;
        }
        self.failed
    }

    fn state(&self) -> RunnerState {
        let mut values = Array1::zeros(STATE_LEN);
        let vy = (self.height - self.prev_height) / TIMESTEP_S;
        let (sin_p, cos_p) = (self.pitch.sin(), self.pitch.cos());

        put(
            &mut values,
            Segment::Torso,
            self.x,
            self.height,
            self.pitch,
            self.vx,
            vy,
            self.vpitch,
        );
        put(
            &mut values,
            Segment::Head,
            self.x + HEAD_OFFSET * sin_p,
            self.height + HEAD_OFFSET * cos_p,
            self.pitch,
            self.vx,
            vy,
            self.vpitch,
        );

        // Legs hang from the hip joint; angles are measured from vertical
        // like the torso's.
        let hip_x = self.x - TORSO_HALF * sin_p;
        let hip_y = self.height - TORSO_HALF * cos_p;
        let right_thigh = self.pitch + self.hip;
        let left_thigh = self.pitch - self.hip;
        let right_calf = right_thigh - KNEE_BEND_BASE - self.knee;
        let left_calf = left_thigh - KNEE_BEND_BASE + self.knee;
        for (thigh_seg, calf_seg, foot_seg, thigh, calf, hip_rate, knee_rate) in [
            (
                Segment::RightThigh,
                Segment::RightCalf,
                Segment::RightFoot,
                right_thigh,
                right_calf,
                self.hip_vel,
                self.knee_vel,
            ),
            (
                Segment::LeftThigh,
                Segment::LeftCalf,
                Segment::LeftFoot,
                left_thigh,
                left_calf,
                -self.hip_vel,
                -self.knee_vel,
            ),
        ] {
            let knee_x = hip_x - THIGH_LEN * thigh.sin();
            let knee_y = hip_y - THIGH_LEN * thigh.cos();
            let ankle_x = knee_x - CALF_LEN * calf.sin();
            let ankle_y = knee_y - CALF_LEN * calf.cos();
            put(
                &mut values,
                thigh_seg,
                hip_x - 0.5 * THIGH_LEN * thigh.sin(),
                hip_y - 0.5 * THIGH_LEN * thigh.cos(),
                thigh,
                self.vx,
                vy,
                self.vpitch + hip_rate,
            );
            put(
                &mut values,
                calf_seg,
                knee_x - 0.5 * CALF_LEN * calf.sin(),
                knee_y - 0.5 * CALF_LEN * calf.cos(),
                calf,
                self.vx,
                vy,
                self.vpitch + hip_rate - knee_rate,
            );
            put(&mut values, foot_seg, ankle_x, ankle_y, 0.0, self.vx, vy, 0.0);
        }

        // Arms counter-swing the legs.
        let shoulder_x = self.x + SHOULDER_OFFSET * sin_p;
        let shoulder_y = self.height + SHOULDER_OFFSET * cos_p;
        let right_arm = self.pitch - ARM_SWING * self.hip;
        let left_arm = self.pitch + ARM_SWING * self.hip;
        for (upper_seg, lower_seg, upper, arm_rate) in [
            (
                Segment::RightUpperArm,
                Segment::RightLowerArm,
                right_arm,
                -ARM_SWING * self.hip_vel,
            ),
            (
                Segment::LeftUpperArm,
                Segment::LeftLowerArm,
                left_arm,
                ARM_SWING * self.hip_vel,
            ),
        ] {
            let elbow_x = shoulder_x - UPPER_ARM_LEN * upper.sin();
            let elbow_y = shoulder_y - UPPER_ARM_LEN * upper.cos();
            let lower = upper + ELBOW_BEND;
            put(
                &mut values,
                upper_seg,
                shoulder_x - 0.5 * UPPER_ARM_LEN * upper.sin(),
                shoulder_y - 0.5 * UPPER_ARM_LEN * upper.cos(),
                upper,
                self.vx,
                vy,
                self.vpitch + arm_rate,
            );
            put(
                &mut values,
                lower_seg,
                elbow_x - 0.5 * LOWER_ARM_LEN * lower.sin(),
                elbow_y - 0.5 * LOWER_ARM_LEN * lower.cos(),
                lower,
                self.vx,
                vy,
                self.vpitch + arm_rate,
            );
        }

        RunnerState::new(values, self.failed)
    }

    fn failed(&self) -> bool {
        self.failed
    }
}
