//! Key-press control vectors for the bundled runner.

use bitflags::bitflags;

use crate::sim::Command;

bitflags! {
    /// The four control keys. Q and W drive the thighs in opposite
    /// directions, O and P the knees. The useful stride combinations are
    /// [`RunnerCommand::WO`] and [`RunnerCommand::QP`]; everything else is
    /// for the search to discover.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub struct RunnerCommand: u8 {
        const Q = 1 << 0;
        const W = 1 << 1;
        const O = 1 << 2;
        const P = 1 << 3;
    }
}

impl RunnerCommand {
    /// No keys pressed.
    pub const NIL: RunnerCommand = RunnerCommand::empty();
    /// Right leg pair: thigh forward, opposite knee up.
    pub const WO: RunnerCommand = RunnerCommand::W.union(RunnerCommand::O);
    /// Left leg pair.
    pub const QP: RunnerCommand = RunnerCommand::Q.union(RunnerCommand::P);

    pub fn from_keys(q: bool, w: bool, o: bool, p: bool) -> Self {
        let mut command = RunnerCommand::empty();
        if q {
            command |= RunnerCommand::Q;
        }
        if w {
            command |= RunnerCommand::W;
        }
        if o {
            command |= RunnerCommand::O;
        }
        if p {
            command |= RunnerCommand::P;
        }
        command
    }

    /// Net hip drive in [-1, 1]. W swings the right thigh forward, Q the
    /// left; pressing both cancels.
    pub fn thigh_drive(self) -> f32 {
        let mut drive = 0.0;
        if self.contains(RunnerCommand::W) {
            drive += 1.0;
        }
        if self.contains(RunnerCommand::Q) {
            drive -= 1.0;
        }
        drive
    }

    /// Net knee drive in [-1, 1], mirroring [`thigh_drive`](Self::thigh_drive).
    pub fn knee_drive(self) -> f32 {
        let mut drive = 0.0;
        if self.contains(RunnerCommand::O) {
            drive += 1.0;
        }
        if self.contains(RunnerCommand::P) {
            drive -= 1.0;
        }
        drive
    }
}

impl Command for RunnerCommand {}
