//! Frame sampler: walks a video at a fixed stride and asks the keypoint
//! source for a pose at each instant.
//!
//! Seeks are awaited one at a time and samples are appended in time order.
//! A failing frame is recorded as absent; only cancellation stops the pass.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::SamplerConfig;
use crate::error::AnalysisError;
use crate::pose::{KeypointSource, Pose, PoseSequence, RasterImage};

/// シーク可能な動画
#[async_trait]
pub trait VideoSource: Send {
    /// 動画の長さ（秒）
    fn duration_secs(&self) -> f64;

    /// 指定時刻へシークし、完了まで待つ
    async fn seek(&mut self, time_secs: f64) -> Result<()>;

    /// 現在のフレームを `frame` に描画する
    async fn rasterize(&mut self, frame: &mut RasterImage) -> Result<()>;
}

/// サンプル時刻 0, s, 2s, … < D（最大 `max_samples` 個）
pub fn sample_times(duration_secs: f64, stride_secs: f64, max_samples: usize) -> Vec<f64> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 || !stride_secs.is_finite() || stride_secs <= 0.0 {
        return Vec::new();
    }
    (0..max_samples)
        .map(|i| i as f64 * stride_secs)
        .take_while(|t| *t < duration_secs)
        .collect()
}

/// フレームバッファの確保・解放回数
#[derive(Debug, Default)]
pub struct CanvasStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl CanvasStats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Acquire)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::Acquire)
    }

    /// 解放されていないバッファ数
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

/// オフスクリーンのフレームバッファ。スコープを抜けると解放される
struct Canvas<'a> {
    frame: RasterImage,
    stats: &'a CanvasStats,
}

impl<'a> Canvas<'a> {
    fn acquire(stats: &'a CanvasStats) -> Self {
        stats.acquired.fetch_add(1, Ordering::AcqRel);
        tracing::trace!("canvas acquired");
        Self {
            frame: RasterImage::default(),
            stats,
        }
    }
}

impl Drop for Canvas<'_> {
    fn drop(&mut self) {
        self.frame.release();
        self.stats.released.fetch_add(1, Ordering::AcqRel);
        tracing::trace!("canvas released");
    }
}

pub struct FrameSampler {
    stride_secs: f64,
    max_samples: usize,
    canvases: CanvasStats,
}

impl FrameSampler {
    pub fn new(stride_secs: f64, max_samples: usize) -> Self {
        Self {
            stride_secs,
            max_samples,
            canvases: CanvasStats::default(),
        }
    }

    pub fn canvas_stats(&self) -> &CanvasStats {
        &self.canvases
    }

    pub fn from_config(config: &SamplerConfig) -> Self {
        Self::new(config.stride_secs, config.max_samples)
    }

    /// 動画全体をサンプリングして姿勢列を作る
    pub async fn sample<V, S>(
        &self,
        video: &mut V,
        source: &S,
        cancel: &CancellationToken,
    ) -> Result<PoseSequence, AnalysisError>
    where
        V: VideoSource + ?Sized,
        S: KeypointSource + ?Sized,
    {
        let duration = video.duration_secs();
        let times = sample_times(duration, self.stride_secs, self.max_samples);
        let full = if duration.is_finite() && self.stride_secs > 0.0 {
            (duration / self.stride_secs).ceil() as usize
        } else {
            0
        };
        if full > times.len() {
            tracing::debug!(
                cap = self.max_samples,
                would_take = full,
                "sample cap reached, analysing partial video"
            );
        }

        let mut canvas = Canvas::acquire(&self.canvases);
        let mut sequence = PoseSequence::with_capacity(times.len());
        for t in times {
            let pose = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(at = t, "sampling cancelled");
                    return Err(AnalysisError::Cancelled);
                }
                pose = sample_at(video, source, &mut canvas.frame, t) => pose,
            };
            sequence.push(t, pose);
        }

        tracing::info!(
            samples = sequence.len(),
            detected = sequence.detected(),
            "sampling finished"
        );
        Ok(sequence)
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::from_config(&SamplerConfig::default())
    }
}

/// 1時刻分。失敗はすべて「検出なし」に畳む
async fn sample_at<V, S>(video: &mut V, source: &S, frame: &mut RasterImage, t: f64) -> Option<Pose>
where
    V: VideoSource + ?Sized,
    S: KeypointSource + ?Sized,
{
    if let Err(e) = video.seek(t).await {
        tracing::debug!(at = t, "seek failed: {e:#}");
        return None;
    }
    if let Err(e) = video.rasterize(frame).await {
        tracing::debug!(at = t, "rasterize failed: {e:#}");
        return None;
    }
    match source.estimate(frame).await {
        Ok(pose) => pose,
        Err(e) => {
            tracing::debug!(at = t, "pose estimate failed: {e:#}");
            None
        }
    }
}
