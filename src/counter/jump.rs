use std::collections::VecDeque;

const HISTORY_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Ground,
    Air,
}

/// 腰のY座標からジャンプの変位と回数を求める
#[derive(Debug, Clone)]
pub struct JumpTracker {
    threshold_px: f32,
    min_y: Option<f32>,
    max_y: Option<f32>,
    history: VecDeque<f32>,
    phase: Phase,
    count: u32,
}

impl JumpTracker {
    pub fn new(threshold_px: f32) -> Self {
        Self {
            threshold_px,
            min_y: None,
            max_y: None,
            history: VecDeque::with_capacity(HISTORY_LEN),
            phase: Phase::Ground,
            count: 0,
        }
    }

    pub fn observe(&mut self, hip_y: f32) {
        self.min_y = Some(self.min_y.map_or(hip_y, |m| m.min(hip_y)));
        self.max_y = Some(self.max_y.map_or(hip_y, |m| m.max(hip_y)));

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(hip_y);
        if self.history.len() < HISTORY_LEN {
            return;
        }

        // 直前4サンプルの平均を基準にする
        let previous = HISTORY_LEN - 1;
        let baseline = self.history.iter().take(previous).sum::<f32>() / previous as f32;
        let change = (hip_y - baseline).abs();

        match self.phase {
            Phase::Ground if change > self.threshold_px => self.phase = Phase::Air,
            Phase::Air if change < self.threshold_px => {
                self.phase = Phase::Ground;
                self.count += 1;
            }
            _ => {}
        }
    }

    /// 腰の最大変位（ピクセル）。一度も観測していなければ 0
    pub fn peak_displacement_px(&self) -> f32 {
        match (self.min_y, self.max_y) {
            (Some(min), Some(max)) => max - min,
            _ => 0.0,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn in_air(&self) -> bool {
        self.phase == Phase::Air
    }
}
