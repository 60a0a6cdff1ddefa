use super::geometry::angle_deg;
use crate::pose::{KeypointIndex, Pose};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Up,
    Down,
}

/// 肘角度の状態遷移で腕立て伏せを数える
///
/// 上 → 下（肘角度 < down）→ 上（肘角度 > up）で1回。
#[derive(Debug, Clone)]
pub struct PushupCounter {
    down_angle: f32,
    up_angle: f32,
    min_confidence: f32,
    phase: Phase,
    count: u32,
}

impl PushupCounter {
    pub fn new(down_angle: f32, up_angle: f32, min_confidence: f32) -> Self {
        Self {
            down_angle,
            up_angle,
            min_confidence,
            phase: Phase::Up,
            count: 0,
        }
    }

    /// 左腕、見えなければ右腕の肘角度
    pub fn elbow_angle(&self, pose: &Pose) -> Option<f32> {
        let arm = |shoulder, elbow, wrist| {
            let s = pose.get_valid(shoulder, self.min_confidence)?;
            let e = pose.get_valid(elbow, self.min_confidence)?;
            let w = pose.get_valid(wrist, self.min_confidence)?;
            angle_deg(s, e, w)
        };
        arm(
            KeypointIndex::LeftShoulder,
            KeypointIndex::LeftElbow,
            KeypointIndex::LeftWrist,
        )
        .or_else(|| {
            arm(
                KeypointIndex::RightShoulder,
                KeypointIndex::RightElbow,
                KeypointIndex::RightWrist,
            )
        })
    }

    pub fn observe(&mut self, pose: &Pose) {
        let Some(angle) = self.elbow_angle(pose) else {
            return;
        };
        match self.phase {
            Phase::Up if angle < self.down_angle => self.phase = Phase::Down,
            Phase::Down if angle > self.up_angle => {
                self.phase = Phase::Up;
                self.count += 1;
            }
            _ => {}
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
