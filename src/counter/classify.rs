use std::collections::VecDeque;

use super::geometry::angle_deg;
use super::ExerciseKind;
use crate::pose::{KeypointIndex, Pose};

const HIP_HISTORY_LEN: usize = 30;
const JUMP_WINDOW: usize = 5;

const PUSHUP_MAX_BODY_ANGLE: f32 = 30.0;
const PUSHUP_MAX_ELBOW_ANGLE: f32 = 120.0;
const SITUP_MIN_HIP_ANGLE: f32 = 60.0;
const SITUP_MAX_KNEE_ANGLE: f32 = 90.0;

/// 1フレームの姿勢から運動の種類を推定する（進行ログ用）
///
/// 判定できないフレームでは直前の種類を引き継ぐ。
#[derive(Debug, Clone)]
pub struct ExerciseClassifier {
    jump_threshold_px: f32,
    min_confidence: f32,
    hip_history: VecDeque<f32>,
    current: Option<ExerciseKind>,
}

impl ExerciseClassifier {
    pub fn new(jump_threshold_px: f32, min_confidence: f32) -> Self {
        Self {
            jump_threshold_px,
            min_confidence,
            hip_history: VecDeque::with_capacity(HIP_HISTORY_LEN),
            current: None,
        }
    }

    pub fn current(&self) -> Option<ExerciseKind> {
        self.current
    }

    /// ポーズを取り込み、現在の種類を返す
    pub fn observe(&mut self, pose: &Pose, hip_y: f32) -> Option<ExerciseKind> {
        if let Some(kind) = self.classify(pose, hip_y) {
            if self.current != Some(kind) {
                tracing::debug!(exercise = %kind, "exercise changed");
            }
            self.current = Some(kind);
        }

        if self.hip_history.len() == HIP_HISTORY_LEN {
            self.hip_history.pop_front();
        }
        self.hip_history.push_back(hip_y);
        self.current
    }

    fn classify(&self, pose: &Pose, hip_y: f32) -> Option<ExerciseKind> {
        let kp = |index| pose.get_valid(index, self.min_confidence);

        let shoulder = kp(KeypointIndex::LeftShoulder);
        let hip = kp(KeypointIndex::LeftHip);
        let knee = kp(KeypointIndex::LeftKnee);
        let ankle = kp(KeypointIndex::LeftAnkle);

        if let (Some(shoulder), Some(hip), Some(knee)) = (shoulder, hip, knee) {
            let hip_angle = angle_deg(shoulder, hip, knee);

            let elbow_bent = [
                (KeypointIndex::LeftShoulder, KeypointIndex::LeftElbow, KeypointIndex::LeftWrist),
                (KeypointIndex::RightShoulder, KeypointIndex::RightElbow, KeypointIndex::RightWrist),
            ]
            .into_iter()
            .filter_map(|(s, e, w)| angle_deg(kp(s)?, kp(e)?, kp(w)?))
            .any(|angle| angle < PUSHUP_MAX_ELBOW_ANGLE);

            if let Some(hip_angle) = hip_angle {
                // 肩-腰-膝の角が小さく肘が曲がっている
                if hip_angle < PUSHUP_MAX_BODY_ANGLE && elbow_bent {
                    return Some(ExerciseKind::Pushup);
                }

                // 肩-腰-膝の角が開いていて膝が曲がっている
                let knee_angle = ankle.and_then(|ankle| angle_deg(hip, knee, ankle));
                if let Some(knee_angle) = knee_angle {
                    if hip_angle > SITUP_MIN_HIP_ANGLE && knee_angle < SITUP_MAX_KNEE_ANGLE {
                        return Some(ExerciseKind::Situp);
                    }
                }
            }
        }

        if self.is_jumping(pose, hip_y) {
            return Some(ExerciseKind::Jump);
        }
        None
    }

    fn is_jumping(&self, pose: &Pose, hip_y: f32) -> bool {
        if self.hip_history.len() >= JUMP_WINDOW {
            let recent = self.hip_history.iter().rev().take(JUMP_WINDOW);
            let mean = recent.sum::<f32>() / JUMP_WINDOW as f32;
            if hip_y < mean - self.jump_threshold_px {
                return true;
            }
        }

        // 両足首が膝より上
        let kp = |index| pose.get_valid(index, self.min_confidence);
        match (
            kp(KeypointIndex::LeftAnkle),
            kp(KeypointIndex::LeftKnee),
            kp(KeypointIndex::RightAnkle),
            kp(KeypointIndex::RightKnee),
        ) {
            (Some(la), Some(lk), Some(ra), Some(rk)) => la.y < lk.y && ra.y < rk.y,
            _ => false,
        }
    }
}
