use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::keypoint::{Keypoint, KeypointIndex, Pose};
use super::preprocess::preprocess_for_movenet;
use super::raster::RasterImage;
use super::source::KeypointSource;
use crate::config::DetectorConfig;

/// MoveNet を使用した姿勢検出器
///
/// 推論は tokio のブロッキングスレッドで実行する。
pub struct PoseDetector {
    session: Arc<Mutex<Session>>,
    min_pose_confidence: f32,
}

impl PoseDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P, min_pose_confidence: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path.as_ref())
            .with_context(|| {
                format!("Failed to load ONNX model: {}", model_path.as_ref().display())
            })?;

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            min_pose_confidence,
        })
    }

    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        Self::new(&config.model_path, config.min_pose_confidence)
    }

    /// ラスタ画像から姿勢を検出（正規化座標）
    ///
    /// 入力: RGB 画像（任意サイズ、内部で 192x192 に変換）
    /// 出力: Pose (17キーポイント、0.0〜1.0)
    pub fn detect(&self, frame: &RasterImage) -> Result<Pose> {
        run_movenet(&self.session, frame)
    }
}

/// セッションをロックして1フレーム推論する（同期）
fn run_movenet(session: &Mutex<Session>, frame: &RasterImage) -> Result<Pose> {
    let input = preprocess_for_movenet(frame)?;
    let input_tensor = Tensor::from_array(input)?;
    let mut session = session
        .lock()
        .map_err(|_| anyhow::anyhow!("detector session poisoned"))?;
    let outputs = session
        .run(ort::inputs!["serving_default_input_0" => input_tensor])
        .context("Inference failed")?;

    // MoveNet の出力は [1, 1, 17, 3] (y, x, confidence)
    let output: ndarray::ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
        .try_extract_array()
        .context("Failed to extract output tensor")?;

    let keypoints = (0..KeypointIndex::COUNT)
        .map(|i| {
            let y = output[[0, 0, i, 0]];
            let x = output[[0, 0, i, 1]];
            let confidence = output[[0, 0, i, 2]];
            Keypoint::new(x, y, confidence)
        })
        .collect();

    Ok(Pose::new(keypoints))
}

#[async_trait]
impl KeypointSource for PoseDetector {
    /// ピクセル座標のポーズを返す。平均信頼度が低ければ人物なし
    async fn estimate(&self, frame: &RasterImage) -> Result<Option<Pose>> {
        let session = self.session.clone();
        let input = frame.clone();
        let pose = tokio::task::spawn_blocking(move || run_movenet(&session, &input))
            .await
            .context("inference task failed")??;
        if pose.average_confidence() < self.min_pose_confidence {
            return Ok(None);
        }
        Ok(Some(pose.to_pixels(frame.width, frame.height)))
    }
}
