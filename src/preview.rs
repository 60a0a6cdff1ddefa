//! Live preview loop: low-rate advisory counting while recording.
//!
//! The preview never waits for the detector to load and never blocks the
//! caller's capture pipeline. Its numbers are for display only; the
//! authoritative count comes from the full post-recording pass.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::analysis::SequenceAnalyzer;
use crate::config::CounterConfig;
use crate::counter::{ExerciseKind, RepCountState};
use crate::pose::{KeypointSource, LandmarkMap, Pose, RasterImage, Sample, SharedSource};

/// 最新のカメラフレームを待たずに返す
pub trait FrameGrabber: Send + Sync {
    /// 初回フレーム到着前は None
    fn latest_frame(&self) -> Option<RasterImage>;
}

/// 表示用のプレビュー状態
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewState {
    pub ticks: u64,
    pub detections: u64,
    pub reps: u32,
    /// これまでに観測した最大回数
    pub max_reps: u32,
}

pub struct LivePreview {
    interval: Duration,
    test_type: ExerciseKind,
    counter: CounterConfig,
    landmarks: LandmarkMap,
}

impl LivePreview {
    pub fn new(interval: Duration, test_type: ExerciseKind, analyzer: &SequenceAnalyzer) -> Self {
        let counter = CounterConfig {
            progression_tail: 0,
            ..analyzer.counter_config().clone()
        };
        Self {
            interval,
            test_type,
            counter,
            landmarks: analyzer.landmarks(),
        }
    }

    /// 別タスクで実行する
    pub fn spawn<G, S>(
        self,
        camera: Arc<G>,
        source: Arc<SharedSource<S>>,
        cancel: CancellationToken,
    ) -> (watch::Receiver<PreviewState>, JoinHandle<PreviewState>)
    where
        G: FrameGrabber + 'static,
        S: KeypointSource + 'static,
    {
        let (tx, rx) = watch::channel(PreviewState::default());
        let handle = tokio::spawn(async move { self.run(&*camera, &source, &cancel, &tx).await });
        (rx, handle)
    }

    /// キャンセルされるまで一定間隔で回す
    pub async fn run<G, S>(
        &self,
        camera: &G,
        source: &SharedSource<S>,
        cancel: &CancellationToken,
        tx: &watch::Sender<PreviewState>,
    ) -> PreviewState
    where
        G: FrameGrabber + ?Sized,
        S: KeypointSource + 'static,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let started = Instant::now();
        let mut counts = RepCountState::new(&self.counter, self.landmarks);
        let mut state = PreviewState::default();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let pose = self.detect(camera, source).await;
            if pose.is_some() {
                state.detections += 1;
            }
            counts.observe(&Sample {
                index: state.ticks as usize,
                time_secs: started.elapsed().as_secs_f64(),
                pose,
            });
            state.ticks += 1;
            state.reps = counts.counts().get(self.test_type);
            state.max_reps = state.max_reps.max(state.reps);
            tx.send_replace(state);
        }

        tracing::debug!(ticks = state.ticks, max_reps = state.max_reps, "preview stopped");
        state
    }

    /// 1ティック分の検出。未初期化・失敗・時間切れはすべて検出なし
    async fn detect<G, S>(&self, camera: &G, source: &SharedSource<S>) -> Option<Pose>
    where
        G: FrameGrabber + ?Sized,
        S: KeypointSource + 'static,
    {
        let frame = camera.latest_frame()?;
        let Some(detector) = source.peek() else {
            source.warm_up();
            return None;
        };
        match tokio::time::timeout(self.interval, detector.estimate(&frame)).await {
            Ok(Ok(pose)) => pose,
            Ok(Err(e)) => {
                tracing::debug!("preview estimate failed: {e:#}");
                None
            }
            Err(_) => {
                tracing::debug!("preview estimate timed out");
                None
            }
        }
    }
}
