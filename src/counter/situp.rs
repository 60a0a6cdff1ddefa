use crate::pose::Landmarks;

/// 頭と腰の上下関係の立ち上がりで腹筋を数える
///
/// 画像座標は下向きが正なので、`head.y + offset < hip.y` が「起き上がり」。
/// 検出なしのフレームでは呼ばれないので、上下状態はそのまま保持される。
#[derive(Debug, Clone)]
pub struct SitupCounter {
    offset_px: f32,
    rising_edges: u32,
    up: bool,
}

impl SitupCounter {
    pub fn new(offset_px: f32) -> Self {
        Self {
            offset_px,
            rising_edges: 0,
            up: false,
        }
    }

    pub fn observe(&mut self, landmarks: &Landmarks) {
        let up = landmarks.head.y + self.offset_px < landmarks.hip.y;
        if up && !self.up {
            self.rising_edges += 1;
        }
        self.up = up;
    }

    /// 立ち上がり回数（補正前）
    pub fn rising_edges(&self) -> u32 {
        self.rising_edges
    }

    pub fn is_up(&self) -> bool {
        self.up
    }

    /// 報告値。最初の立ち上がりは開始姿勢とみなして1回引く（経験的な補正）
    pub fn count(&self) -> u32 {
        self.rising_edges.saturating_sub(1)
    }
}
