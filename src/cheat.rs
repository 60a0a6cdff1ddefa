//! Duplicate-frame detection for static, looped or replayed recordings.
//!
//! Best-effort only: catches gross duplication of consecutive frames, not
//! subtle loops.

use serde::{Deserialize, Serialize};

use crate::config::CheatConfig;
use crate::pose::{Pose, PoseSequence};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheatReport {
    /// 重複フレームの疑いあり
    pub duplicate_frames: bool,
    /// 直前と完全一致したフレームペア数
    pub duplicate_pairs: u32,
}

/// 整数に丸めた全キーポイント座標。再推定によるサブピクセルの揺れを吸収する
pub fn signature(pose: &Pose) -> Vec<(i64, i64)> {
    pose.keypoints
        .iter()
        .map(|k| (round_coord(k.x), round_coord(k.y)))
        .collect()
}

fn round_coord(v: f32) -> i64 {
    if v.is_finite() {
        v.round() as i64
    } else {
        0
    }
}

pub struct CheatDetector {
    threshold: u32,
}

impl CheatDetector {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    pub fn from_config(config: &CheatConfig) -> Self {
        Self::new(config.duplicate_threshold)
    }

    /// 連続するフレームの署名を比較する
    ///
    /// 検出なしのサンプルは空の署名になるため、人物のいない静止映像が
    /// 続いた場合も一致として数える。
    pub fn detect(&self, sequence: &PoseSequence) -> CheatReport {
        let mut duplicate_pairs = 0u32;
        let mut prev: Option<Vec<(i64, i64)>> = None;

        for sample in sequence {
            let sig = sample.pose.as_ref().map(signature).unwrap_or_default();
            if prev.as_ref() == Some(&sig) {
                duplicate_pairs += 1;
            }
            prev = Some(sig);
        }

        let duplicate_frames = duplicate_pairs > self.threshold;
        if duplicate_frames {
            tracing::warn!(duplicate_pairs, "duplicate frames suspected");
        }
        CheatReport {
            duplicate_frames,
            duplicate_pairs,
        }
    }
}

impl Default for CheatDetector {
    fn default() -> Self {
        Self::from_config(&CheatConfig::default())
    }
}
