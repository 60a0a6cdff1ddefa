use serde::{Deserialize, Serialize};

/// MoveNet の 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;

    pub const ALL: [KeypointIndex; KeypointIndex::COUNT] = [
        Self::Nose,
        Self::LeftEye,
        Self::RightEye,
        Self::LeftEar,
        Self::RightEar,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// 設定ファイル用の名前 (snake_case)
    pub fn name(self) -> &'static str {
        match self {
            Self::Nose => "nose",
            Self::LeftEye => "left_eye",
            Self::RightEye => "right_eye",
            Self::LeftEar => "left_ear",
            Self::RightEar => "right_ear",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftWrist => "left_wrist",
            Self::RightWrist => "right_wrist",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    /// 名前からインデックスを引く（大文字小文字・ハイフンは無視）
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.iter().copied().find(|k| k.name() == normalized)
    }
}

/// 単一キーポイント
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// X座標 (ピクセル)
    pub x: f32,
    /// Y座標 (ピクセル、下向きが正)
    pub y: f32,
    /// 信頼度スコア (0.0〜1.0)
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    /// 座標が有限かつ信頼度が閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.confidence >= threshold
    }

    /// 正規化座標 (0.0〜1.0) をピクセル座標に変換
    pub fn to_pixel(&self, width: u32, height: u32) -> Keypoint {
        Keypoint::new(
            self.x * width as f32,
            self.y * height as f32,
            self.confidence,
        )
    }
}

impl Default for Keypoint {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            confidence: 0.0,
        }
    }
}

/// 1フレーム・1人分の姿勢推定結果
///
/// キーポイントは `KeypointIndex` の順に並ぶ。外部ソースからの入力では
/// 17点に満たないことがあり、その場合欠けた点は `get` で `None` になる。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub keypoints: Vec<Keypoint>,
}

impl Pose {
    pub fn new(keypoints: Vec<Keypoint>) -> Self {
        Self { keypoints }
    }

    /// インデックスでキーポイントを取得
    pub fn get(&self, index: KeypointIndex) -> Option<&Keypoint> {
        self.keypoints.get(index as usize)
    }

    /// 閾値を満たすキーポイントのみ取得
    pub fn get_valid(&self, index: KeypointIndex, threshold: f32) -> Option<&Keypoint> {
        self.get(index).filter(|k| k.is_valid(threshold))
    }

    /// 全キーポイントの平均信頼度
    pub fn average_confidence(&self) -> f32 {
        if self.keypoints.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.keypoints.iter().map(|k| k.confidence).sum();
        sum / self.keypoints.len() as f32
    }

    /// 正規化座標のポーズをピクセル座標に変換
    pub fn to_pixels(&self, width: u32, height: u32) -> Pose {
        Pose::new(
            self.keypoints
                .iter()
                .map(|k| k.to_pixel(width, height))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypoint_index_count() {
        assert_eq!(KeypointIndex::COUNT, 17);
        assert_eq!(KeypointIndex::ALL.len(), KeypointIndex::COUNT);
    }

    #[test]
    fn test_keypoint_index_from_index() {
        assert_eq!(KeypointIndex::from_index(0), Some(KeypointIndex::Nose));
        assert_eq!(KeypointIndex::from_index(16), Some(KeypointIndex::RightAnkle));
        assert_eq!(KeypointIndex::from_index(17), None);
    }

    #[test]
    fn test_keypoint_index_from_name() {
        assert_eq!(KeypointIndex::from_name("left_hip"), Some(KeypointIndex::LeftHip));
        assert_eq!(KeypointIndex::from_name(" Right-Ankle "), Some(KeypointIndex::RightAnkle));
        assert_eq!(KeypointIndex::from_name("pelvis"), None);
        for k in KeypointIndex::ALL {
            assert_eq!(KeypointIndex::from_name(k.name()), Some(k));
        }
    }

    #[test]
    fn test_keypoint_is_valid() {
        let kp = Keypoint::new(0.5, 0.5, 0.7);
        assert!(kp.is_valid(0.5));
        assert!(!kp.is_valid(0.8));
        assert!(!Keypoint::new(f32::NAN, 0.5, 1.0).is_valid(0.0));
    }

    #[test]
    fn test_keypoint_to_pixel() {
        let kp = Keypoint::new(0.5, 0.25, 1.0).to_pixel(640, 480);
        assert_eq!(kp.x, 320.0);
        assert_eq!(kp.y, 120.0);
    }

    #[test]
    fn test_pose_get_short() {
        let pose = Pose::new(vec![Keypoint::new(10.0, 20.0, 0.9)]);
        assert_eq!(pose.get(KeypointIndex::Nose).map(|k| k.y), Some(20.0));
        assert!(pose.get(KeypointIndex::LeftHip).is_none());
    }

    #[test]
    fn test_pose_average_confidence() {
        let pose = Pose::new(vec![Keypoint::new(0.0, 0.0, 0.5); KeypointIndex::COUNT]);
        assert!((pose.average_confidence() - 0.5).abs() < 0.001);
        assert_eq!(Pose::default().average_confidence(), 0.0);
    }

    #[test]
    fn test_keypoint_default_confidence_on_deserialize() {
        let kp: Keypoint = serde_json::from_str(r#"{"x": 1.0, "y": 2.0}"#).unwrap();
        assert_eq!(kp.confidence, 1.0);
    }
}
