use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cheat::{CheatDetector, CheatReport};
use crate::config::{Config, CounterConfig};
use crate::counter::{self, AnalysisQuality, ExerciseKind, ProgressEntry, RepCounts};
use crate::error::AnalysisError;
use crate::pose::{KeypointSource, LandmarkMap, PoseSequence, SharedSource};
use crate::sampler::{FrameSampler, VideoSource};

/// 提出用の解析結果（フラットなレコード）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 申告された種目
    pub test_type: ExerciseKind,
    /// 申告種目の回数
    pub reps: u32,
    pub final_counts: RepCounts,
    pub peak_displacement_px: f32,
    pub detected_exercise: Option<ExerciseKind>,
    /// 0〜100
    pub form_score: u8,
    /// 0.0〜100.0
    pub pose_detection_rate: f32,
    pub analysis_quality: AnalysisQuality,
    pub cheat: CheatReport,
    pub samples: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub progression: Vec<ProgressEntry>,
}

impl AnalysisResult {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// 姿勢列から結果を作る。副作用なし、同じ入力には同じ結果
#[derive(Debug, Clone)]
pub struct SequenceAnalyzer {
    counter: CounterConfig,
    landmarks: LandmarkMap,
    cheat_threshold: u32,
}

impl SequenceAnalyzer {
    pub fn new(counter: CounterConfig, landmarks: LandmarkMap, cheat_threshold: u32) -> Self {
        Self {
            counter,
            landmarks,
            cheat_threshold,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.counter.clone(),
            LandmarkMap::from_config(&config.landmarks)?,
            config.cheat.duplicate_threshold,
        ))
    }

    pub fn analyze(&self, sequence: &PoseSequence, test_type: ExerciseKind) -> AnalysisResult {
        let report = counter::count_reps(sequence, &self.counter, self.landmarks);
        let cheat = CheatDetector::new(self.cheat_threshold).detect(sequence);

        tracing::info!(
            %test_type,
            samples = sequence.len(),
            pushup = report.counts.pushup,
            situp = report.counts.situp,
            jump = report.counts.jump,
            form_score = report.form_score,
            duplicate_frames = cheat.duplicate_frames,
            "analysis complete"
        );

        AnalysisResult {
            test_type,
            reps: report.counts.get(test_type),
            final_counts: report.counts,
            peak_displacement_px: report.peak_displacement_px,
            detected_exercise: report.detected_exercise,
            form_score: report.form_score,
            pose_detection_rate: report.pose_detection_rate,
            analysis_quality: report.analysis_quality,
            cheat,
            samples: report.total_frames,
            progression: report.progression,
        }
    }

    pub fn counter_config(&self) -> &CounterConfig {
        &self.counter
    }

    pub fn landmarks(&self) -> LandmarkMap {
        self.landmarks
    }
}

impl Default for SequenceAnalyzer {
    fn default() -> Self {
        Self::new(
            CounterConfig::default(),
            LandmarkMap::default(),
            crate::config::CheatConfig::default().duplicate_threshold,
        )
    }
}

/// 動画1本の解析パス: サンプリング → 集計 → 不正検出
pub struct Analyzer<S> {
    sampler: FrameSampler,
    sequence: SequenceAnalyzer,
    source: Arc<SharedSource<S>>,
}

impl<S: KeypointSource + 'static> Analyzer<S> {
    pub fn new(sampler: FrameSampler, sequence: SequenceAnalyzer, source: Arc<SharedSource<S>>) -> Self {
        Self {
            sampler,
            sequence,
            source,
        }
    }

    pub fn from_config(config: &Config, source: Arc<SharedSource<S>>) -> anyhow::Result<Self> {
        Ok(Self::new(
            FrameSampler::from_config(&config.sampler),
            SequenceAnalyzer::from_config(config)?,
            source,
        ))
    }

    pub fn source(&self) -> &Arc<SharedSource<S>> {
        &self.source
    }

    pub fn sequence_analyzer(&self) -> &SequenceAnalyzer {
        &self.sequence
    }

    /// キーポイントソースが使えなければ `SourceUnavailable`。フレーム単位の失敗は結果の品質にのみ反映される
    pub async fn analyze_video<V>(
        &self,
        video: &mut V,
        test_type: ExerciseKind,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AnalysisError>
    where
        V: VideoSource + ?Sized,
    {
        let source = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalysisError::Cancelled),
            source = self.source.get() => source?,
        };
        let sequence = self.sampler.sample(video, &*source, cancel).await?;
        Ok(self.analyze_sequence(&sequence, test_type))
    }

    /// 記録済みの姿勢列を解析する（検出器不要）
    pub fn analyze_sequence(&self, sequence: &PoseSequence, test_type: ExerciseKind) -> AnalysisResult {
        self.sequence.analyze(sequence, test_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Keypoint, KeypointIndex, Pose, RasterImage};
    use crate::sampler::tests::FakeVideo;
    use async_trait::async_trait;

    fn body(head_y: f32, hip_y: f32) -> Pose {
        let mut keypoints = vec![Keypoint::new(0.0, 0.0, 0.0); KeypointIndex::COUNT];
        keypoints[KeypointIndex::Nose as usize] = Keypoint::new(100.0, head_y, 0.9);
        keypoints[KeypointIndex::LeftHip as usize] = Keypoint::new(100.0, hip_y, 0.9);
        Pose::new(keypoints)
    }

    /// フレームの時刻から腹筋の上下を交互に返す
    struct SitupSource;

    #[async_trait]
    impl KeypointSource for SitupSource {
        async fn estimate(&self, frame: &RasterImage) -> anyhow::Result<Option<Pose>> {
            let tick = frame.data[0] / 2;
            Ok(Some(if tick % 2 == 0 {
                body(50.0, 100.0)
            } else {
                body(110.0, 100.0)
            }))
        }
    }

    #[test]
    fn test_analyze_sequence_situps() {
        let mut poses = Vec::new();
        for _ in 0..5 {
            poses.push(Some(body(50.0, 100.0)));
            poses.push(Some(body(110.0, 100.0)));
        }
        let seq = PoseSequence::from_poses(poses, 0.2);
        let result = SequenceAnalyzer::default().analyze(&seq, ExerciseKind::Situp);
        assert_eq!(result.reps, 4);
        assert_eq!(result.final_counts.situp, 4);
        assert_eq!(result.form_score, 100);
        assert_eq!(result.samples, 10);
        assert!(!result.cheat.duplicate_frames);
    }

    #[test]
    fn test_analyze_sequence_empty() {
        let result = SequenceAnalyzer::default().analyze(&PoseSequence::new(), ExerciseKind::Jump);
        assert_eq!(result.reps, 0);
        assert_eq!(result.peak_displacement_px, 0.0);
        assert_eq!(result.form_score, 0);
        assert_eq!(result.detected_exercise, None);
        assert_eq!(result.analysis_quality, AnalysisQuality::NoAnalysis);
        assert!(!result.cheat.duplicate_frames);
    }

    #[test]
    fn test_analyze_sequence_deterministic() {
        let poses: Vec<_> = (0..30)
            .map(|i| match i % 4 {
                0 => None,
                1 => Some(body(40.0, 100.0 + i as f32)),
                _ => Some(body(120.0, 100.0)),
            })
            .collect();
        let seq = PoseSequence::from_poses(poses, 0.2);
        let analyzer = SequenceAnalyzer::default();
        assert_eq!(
            analyzer.analyze(&seq, ExerciseKind::Situp),
            analyzer.analyze(&seq, ExerciseKind::Situp)
        );
    }

    #[test]
    fn test_result_json_fields() {
        let result = SequenceAnalyzer::default().analyze(&PoseSequence::new(), ExerciseKind::Situp);
        let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(value["test_type"], "situp");
        assert_eq!(value["analysis_quality"], "no_analysis");
        assert_eq!(value["cheat"]["duplicate_frames"], false);
        assert_eq!(value["final_counts"]["pushup"], 0);
        assert!(value["detected_exercise"].is_null());
        assert!(value.get("progression").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyze_video_end_to_end() {
        let source = Arc::new(SharedSource::ready(SitupSource));
        let analyzer = Analyzer::new(FrameSampler::new(0.2, 200), SequenceAnalyzer::default(), source);
        // 2.0秒 = 10サンプル、上下5往復
        let mut video = FakeVideo::new(2.0);
        let result = analyzer
            .analyze_video(&mut video, ExerciseKind::Situp, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.samples, 10);
        assert_eq!(result.reps, 4);
        assert_eq!(result.detected_exercise, Some(ExerciseKind::Situp));
    }

    #[tokio::test]
    async fn test_analyze_video_source_unavailable() {
        let source = Arc::new(SharedSource::<SitupSource>::new(|| async {
            Err(anyhow::anyhow!("no backend"))
        }));
        let analyzer = Analyzer::new(FrameSampler::default(), SequenceAnalyzer::default(), source);
        let mut video = FakeVideo::new(2.0);
        let err = analyzer
            .analyze_video(&mut video, ExerciseKind::Situp, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
        assert!(video.seeks.is_empty());
    }

    #[test]
    fn test_from_config_rejects_unknown_landmark() {
        let mut config = Config::default();
        config.landmarks.head = "forehead".to_string();
        assert!(SequenceAnalyzer::from_config(&config).is_err());
    }
}
