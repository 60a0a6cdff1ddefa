use anyhow::{anyhow, Result};

use super::keypoint::{Keypoint, KeypointIndex, Pose};
use crate::config::LandmarkConfig;

/// カウントに使う2つのランドマーク（頭・腰）の割り当て
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkMap {
    pub head: KeypointIndex,
    pub hip: KeypointIndex,
    /// これ未満の信頼度のランドマークは欠損扱い
    pub min_confidence: f32,
}

/// 解決済みのランドマーク座標
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmarks {
    pub head: Keypoint,
    pub hip: Keypoint,
}

impl LandmarkMap {
    pub fn new(head: KeypointIndex, hip: KeypointIndex) -> Self {
        Self {
            head,
            hip,
            min_confidence: 0.0,
        }
    }

    /// 設定から作成。未知のランドマーク名はエラー
    pub fn from_config(config: &LandmarkConfig) -> Result<Self> {
        let head = KeypointIndex::from_name(&config.head)
            .ok_or_else(|| anyhow!("unknown head landmark: {}", config.head))?;
        let hip = KeypointIndex::from_name(&config.hip)
            .ok_or_else(|| anyhow!("unknown hip landmark: {}", config.hip))?;
        Ok(Self {
            head,
            hip,
            min_confidence: config.min_confidence,
        })
    }

    /// 両方のランドマークが揃っていれば返す。欠けていれば検出なしと同じ扱い
    pub fn resolve(&self, pose: &Pose) -> Option<Landmarks> {
        let head = *pose.get_valid(self.head, self.min_confidence)?;
        let hip = *pose.get_valid(self.hip, self.min_confidence)?;
        Some(Landmarks { head, hip })
    }
}

impl Default for LandmarkMap {
    fn default() -> Self {
        Self::new(KeypointIndex::Nose, KeypointIndex::LeftHip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose_with(head: Keypoint, hip: Keypoint) -> Pose {
        let mut keypoints = vec![Keypoint::default(); KeypointIndex::COUNT];
        keypoints[KeypointIndex::Nose as usize] = head;
        keypoints[KeypointIndex::LeftHip as usize] = hip;
        Pose::new(keypoints)
    }

    #[test]
    fn test_resolve_both_present() {
        let map = LandmarkMap::default();
        let pose = pose_with(Keypoint::new(10.0, 50.0, 0.9), Keypoint::new(12.0, 100.0, 0.9));
        let lm = map.resolve(&pose).unwrap();
        assert_eq!(lm.head.y, 50.0);
        assert_eq!(lm.hip.y, 100.0);
    }

    #[test]
    fn test_resolve_missing_hip() {
        let map = LandmarkMap::default();
        // 腰まで届かない短いポーズ
        let pose = Pose::new(vec![Keypoint::new(10.0, 50.0, 0.9); 5]);
        assert!(map.resolve(&pose).is_none());
    }

    #[test]
    fn test_resolve_low_confidence() {
        let mut map = LandmarkMap::default();
        map.min_confidence = 0.3;
        let pose = pose_with(Keypoint::new(10.0, 50.0, 0.1), Keypoint::new(12.0, 100.0, 0.9));
        assert!(map.resolve(&pose).is_none());
    }

    #[test]
    fn test_from_config() {
        let config = LandmarkConfig {
            head: "nose".to_string(),
            hip: "right_hip".to_string(),
            min_confidence: 0.2,
        };
        let map = LandmarkMap::from_config(&config).unwrap();
        assert_eq!(map.hip, KeypointIndex::RightHip);
        assert_eq!(map.min_confidence, 0.2);

        let bad = LandmarkConfig {
            hip: "pelvis".to_string(),
            ..config
        };
        assert!(LandmarkMap::from_config(&bad).is_err());
    }
}
