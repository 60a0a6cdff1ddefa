use serde::{Deserialize, Serialize};

use super::keypoint::Pose;

/// サンプリング1回分の結果。`pose` が `None` は「検出なし」
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub index: usize,
    pub time_secs: f64,
    #[serde(default)]
    pub pose: Option<Pose>,
}

/// 時刻順に並んだ姿勢推定列。1回の解析パスの入力
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseSequence {
    samples: Vec<Sample>,
}

impl PoseSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// 等間隔の時刻を振って作成
    pub fn from_poses<I>(poses: I, stride_secs: f64) -> Self
    where
        I: IntoIterator<Item = Option<Pose>>,
    {
        let samples = poses
            .into_iter()
            .enumerate()
            .map(|(index, pose)| Sample {
                index,
                time_secs: index as f64 * stride_secs,
                pose,
            })
            .collect();
        Self { samples }
    }

    /// 末尾に追加。時刻は単調増加でなければならない
    pub(crate) fn push(&mut self, time_secs: f64, pose: Option<Pose>) {
        debug_assert!(self
            .samples
            .last()
            .map_or(true, |last| last.time_secs < time_secs));
        let index = self.samples.len();
        self.samples.push(Sample {
            index,
            time_secs,
            pose,
        });
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 姿勢が得られたサンプル数
    pub fn detected(&self) -> usize {
        self.samples.iter().filter(|s| s.pose.is_some()).count()
    }
}

impl<'a> IntoIterator for &'a PoseSequence {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
