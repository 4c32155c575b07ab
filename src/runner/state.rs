//! Snapshot layout for the bundled runner.

use ndarray::Array1;

use crate::sim::SimState;

pub const SEGMENT_COUNT: usize = 12;
pub const COMPONENTS_PER_SEGMENT: usize = 6;
pub const STATE_LEN: usize = SEGMENT_COUNT * COMPONENTS_PER_SEGMENT;

/// Tracked body segments, in storage order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Segment {
    Torso,
    Head,
    RightThigh,
    LeftThigh,
    RightCalf,
    LeftCalf,
    RightFoot,
    LeftFoot,
    RightUpperArm,
    LeftUpperArm,
    RightLowerArm,
    LeftLowerArm,
}

impl Segment {
    pub const ALL: [Segment; SEGMENT_COUNT] = [
        Segment::Torso,
        Segment::Head,
        Segment::RightThigh,
        Segment::LeftThigh,
        Segment::RightCalf,
        Segment::LeftCalf,
        Segment::RightFoot,
        Segment::LeftFoot,
        Segment::RightUpperArm,
        Segment::LeftUpperArm,
        Segment::RightLowerArm,
        Segment::LeftLowerArm,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-segment components, in storage order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Component {
    X,
    Y,
    Angle,
    VelX,
    VelY,
    VelAngle,
}

/// One simulator snapshot: position, orientation and velocity for every
/// tracked segment, flattened to 72 floats, plus the failure flag.
#[derive(Clone, Debug, PartialEq)]
pub struct RunnerState {
    values: Array1<f32>,
    failed: bool,
}

impl RunnerState {
    pub(crate) fn new(values: Array1<f32>, failed: bool) -> Self {
        debug_assert_eq!(values.len(), STATE_LEN);
        RunnerState { values, failed }
    }

    #[inline]
    pub fn value(&self, segment: Segment, component: Component) -> f32 {
        self.values[segment.index() * COMPONENTS_PER_SEGMENT + component as usize]
    }

    /// The raw flattened vector, absolute coordinates.
    #[inline]
    pub fn values(&self) -> &Array1<f32> {
        &self.values
    }

    /// Horizontal torso position, the forward-progress measure.
    #[inline]
    pub fn torso_x(&self) -> f32 {
        self.value(Segment::Torso, Component::X)
    }

    #[inline]
    pub fn torso_height(&self) -> f32 {
        self.value(Segment::Torso, Component::Y)
    }

    #[inline]
    pub fn torso_pitch(&self) -> f32 {
        self.value(Segment::Torso, Component::Angle)
    }

    #[inline]
    pub fn torso_speed(&self) -> f32 {
        self.value(Segment::Torso, Component::VelX)
    }

    /// Copy with every x made torso-relative (torso x zeroed), the layout
    /// archived runs use.
    pub fn relative(&self) -> Array1<f32> {
        let mut out = self.values.clone();
        let torso_x = self.torso_x();
        for segment in Segment::ALL {
            out[segment.index() * COMPONENTS_PER_SEGMENT] -= torso_x;
        }
        out
    }
}

impl SimState for RunnerState {
    fn is_failed(&self) -> bool {
        self.failed
    }
}
