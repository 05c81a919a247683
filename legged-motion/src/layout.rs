use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Column layout of a reference motion frame.
///
/// A frame is laid out as
/// `[root_pos(3), root_rot(4, xyzw), lin_vel(3), ang_vel(3),
/// foot_pos(3 * num_feet), joint_pos(num_joints), joint_vel(num_joints)]`.
/// Linear and angular velocities are expressed in the root frame, foot
/// positions relative to the root in the root frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    /// Number of feet.
    pub num_feet: usize,

    /// Number of actuated joints.
    pub num_joints: usize,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            num_feet: 4,
            num_joints: 12,
        }
    }
}

impl FrameLayout {
    /// Creates a layout.
    pub fn new(num_feet: usize, num_joints: usize) -> Self {
        Self {
            num_feet,
            num_joints,
        }
    }

    /// Root position columns.
    pub fn root_pos(&self) -> Range<usize> {
        0..3
    }

    /// Root rotation (xyzw) columns.
    pub fn root_rot(&self) -> Range<usize> {
        3..7
    }

    /// Root linear velocity columns.
    pub fn lin_vel(&self) -> Range<usize> {
        7..10
    }

    /// Root angular velocity columns.
    pub fn ang_vel(&self) -> Range<usize> {
        10..13
    }

    /// Foot position columns, three per foot.
    pub fn foot_pos(&self) -> Range<usize> {
        13..13 + 3 * self.num_feet
    }

    /// Joint position columns.
    pub fn joint_pos(&self) -> Range<usize> {
        let s = self.foot_pos().end;
        s..s + self.num_joints
    }

    /// Joint velocity columns.
    pub fn joint_vel(&self) -> Range<usize> {
        let s = self.joint_pos().end;
        s..s + self.num_joints
    }

    /// Number of columns of a frame.
    pub fn width(&self) -> usize {
        self.joint_vel().end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = FrameLayout::default();
        assert_eq!(layout.foot_pos(), 13..25);
        assert_eq!(layout.joint_pos(), 25..37);
        assert_eq!(layout.joint_vel(), 37..49);
        assert_eq!(layout.width(), 49);
    }

    #[test]
    fn test_biped_layout() {
        let layout = FrameLayout::new(2, 10);
        assert_eq!(layout.foot_pos(), 13..19);
        assert_eq!(layout.width(), 39);
    }
}
