//! Repetition counting over a pose sequence.
//!
//! `RepCountState` is the per-pass accumulator. Every usable pose is fed to
//! all three counters; absent or malformed poses only lower the detection
//! rate and never reset counter state.

pub mod classify;
pub mod geometry;
pub mod jump;
pub mod pushup;
pub mod situp;

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use classify::ExerciseClassifier;
pub use jump::JumpTracker;
pub use pushup::PushupCounter;
pub use situp::SitupCounter;

use crate::config::CounterConfig;
use crate::pose::{LandmarkMap, PoseSequence, Sample};

/// 運動の種類。列挙順は同数時の優先順でもある
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseKind {
    Pushup,
    Situp,
    Jump,
}

impl ExerciseKind {
    pub const ALL: [ExerciseKind; 3] = [Self::Pushup, Self::Situp, Self::Jump];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pushup => "pushup",
            Self::Situp => "situp",
            Self::Jump => "jump",
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExerciseKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "pushup" | "pushups" | "push_up" | "push_ups" => Ok(Self::Pushup),
            "situp" | "situps" | "sit_up" | "sit_ups" => Ok(Self::Situp),
            "jump" | "jumps" | "vertical_jump" => Ok(Self::Jump),
            other => anyhow::bail!("unknown exercise type: {other}"),
        }
    }
}

/// 種類ごとの回数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepCounts {
    pub pushup: u32,
    pub situp: u32,
    pub jump: u32,
}

impl RepCounts {
    pub fn get(&self, kind: ExerciseKind) -> u32 {
        match kind {
            ExerciseKind::Pushup => self.pushup,
            ExerciseKind::Situp => self.situp,
            ExerciseKind::Jump => self.jump,
        }
    }

    /// 最多の種類。同数なら列挙順で先のもの、全て0なら None
    pub fn dominant(&self) -> Option<ExerciseKind> {
        let mut best: Option<(ExerciseKind, u32)> = None;
        for kind in ExerciseKind::ALL {
            let count = self.get(kind);
            if count > best.map_or(0, |(_, c)| c) {
                best = Some((kind, count));
            }
        }
        best.map(|(kind, _)| kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisQuality {
    Analyzed,
    /// 使えるフレームが1枚もなかった
    NoAnalysis,
}

/// 進行ログの1行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub sample_index: usize,
    pub time_secs: f64,
    pub exercise: Option<ExerciseKind>,
    pub count: u32,
    pub pose_detected: bool,
}

/// 1パス分の集計結果
#[derive(Debug, Clone, PartialEq)]
pub struct RepReport {
    pub counts: RepCounts,
    pub peak_displacement_px: f32,
    pub detected_exercise: Option<ExerciseKind>,
    pub form_score: u8,
    pub pose_detection_rate: f32,
    pub analysis_quality: AnalysisQuality,
    pub total_frames: usize,
    pub usable_frames: usize,
    pub progression: Vec<ProgressEntry>,
}

/// 解析パス中の可変な集計状態
#[derive(Debug, Clone)]
pub struct RepCountState {
    landmarks: LandmarkMap,
    situp: SitupCounter,
    pushup: PushupCounter,
    jump: JumpTracker,
    classifier: ExerciseClassifier,
    total_frames: usize,
    usable_frames: usize,
    progression_tail: usize,
    progression: VecDeque<ProgressEntry>,
}

impl RepCountState {
    pub fn new(config: &CounterConfig, landmarks: LandmarkMap) -> Self {
        let min_confidence = landmarks.min_confidence;
        Self {
            landmarks,
            situp: SitupCounter::new(config.situp_offset_px),
            pushup: PushupCounter::new(
                config.pushup_down_angle,
                config.pushup_up_angle,
                min_confidence,
            ),
            jump: JumpTracker::new(config.jump_threshold_px),
            classifier: ExerciseClassifier::new(config.jump_threshold_px, min_confidence),
            total_frames: 0,
            usable_frames: 0,
            progression_tail: config.progression_tail,
            progression: VecDeque::new(),
        }
    }

    /// サンプルを1つ取り込む
    pub fn observe(&mut self, sample: &Sample) {
        self.total_frames += 1;

        let usable = sample
            .pose
            .as_ref()
            .and_then(|pose| self.landmarks.resolve(pose).map(|lm| (pose, lm)));

        let exercise = match usable {
            Some((pose, lm)) => {
                self.usable_frames += 1;
                self.situp.observe(&lm);
                self.jump.observe(lm.hip.y);
                self.pushup.observe(pose);
                self.classifier.observe(pose, lm.hip.y)
            }
            None => self.classifier.current(),
        };

        if self.progression_tail > 0 {
            if self.progression.len() == self.progression_tail {
                self.progression.pop_front();
            }
            let count = exercise.map_or(0, |kind| self.counts().get(kind));
            self.progression.push_back(ProgressEntry {
                sample_index: sample.index,
                time_secs: sample.time_secs,
                exercise,
                count,
                pose_detected: usable.is_some(),
            });
        }
    }

    pub fn observe_all(&mut self, sequence: &PoseSequence) {
        for sample in sequence {
            self.observe(sample);
        }
    }

    /// 現時点の回数
    pub fn counts(&self) -> RepCounts {
        RepCounts {
            pushup: self.pushup.count(),
            situp: self.situp.count(),
            jump: self.jump.count(),
        }
    }

    pub fn usable_frames(&self) -> usize {
        self.usable_frames
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// 集計を確定する
    pub fn finish(self) -> RepReport {
        let counts = self.counts();
        let rate = if self.total_frames == 0 {
            0.0
        } else {
            self.usable_frames as f32 / self.total_frames as f32
        };
        let analysis_quality = if self.usable_frames == 0 {
            AnalysisQuality::NoAnalysis
        } else {
            AnalysisQuality::Analyzed
        };

        RepReport {
            counts,
            peak_displacement_px: self.jump.peak_displacement_px(),
            detected_exercise: counts.dominant(),
            form_score: (rate * 100.0).floor().clamp(0.0, 100.0) as u8,
            pose_detection_rate: rate * 100.0,
            analysis_quality,
            total_frames: self.total_frames,
            usable_frames: self.usable_frames,
            progression: self.progression.into_iter().collect(),
        }
    }
}

/// 姿勢列を一括で集計する
pub fn count_reps(
    sequence: &PoseSequence,
    config: &CounterConfig,
    landmarks: LandmarkMap,
) -> RepReport {
    let mut state = RepCountState::new(config, landmarks);
    state.observe_all(sequence);
    state.finish()
}
