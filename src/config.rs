use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub sampler: SamplerConfig,
    #[serde(default)]
    pub landmarks: LandmarkConfig,
    #[serde(default)]
    pub counter: CounterConfig,
    #[serde(default)]
    pub cheat: CheatConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SamplerConfig {
    /// サンプリング間隔（秒）
    #[serde(default = "default_stride_secs")]
    pub stride_secs: f64,
    /// 1動画あたりの最大サンプル数
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

fn default_stride_secs() -> f64 { 0.2 }
fn default_max_samples() -> usize { 200 }

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            stride_secs: default_stride_secs(),
            max_samples: default_max_samples(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LandmarkConfig {
    /// 頭部ランドマーク名 (e.g. "nose")
    #[serde(default = "default_head")]
    pub head: String,
    /// 腰ランドマーク名 (e.g. "left_hip")
    #[serde(default = "default_hip")]
    pub hip: String,
    /// ランドマークとして採用する最低信頼度
    #[serde(default)]
    pub min_confidence: f32,
}

fn default_head() -> String { "nose".to_string() }
fn default_hip() -> String { "left_hip".to_string() }

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            head: default_head(),
            hip: default_hip(),
            min_confidence: 0.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CounterConfig {
    /// 腹筋判定のマージン（ピクセル）
    #[serde(default = "default_situp_offset_px")]
    pub situp_offset_px: f32,
    /// ジャンプ判定の腰変位閾値（ピクセル）
    #[serde(default = "default_jump_threshold_px")]
    pub jump_threshold_px: f32,
    /// 腕立て「下」判定の肘角度（度）
    #[serde(default = "default_pushup_down_angle")]
    pub pushup_down_angle: f32,
    /// 腕立て「上」判定の肘角度（度）
    #[serde(default = "default_pushup_up_angle")]
    pub pushup_up_angle: f32,
    /// 結果に残す進行ログの件数 (0 で無効)
    #[serde(default = "default_progression_tail")]
    pub progression_tail: usize,
}

fn default_situp_offset_px() -> f32 { 20.0 }
fn default_jump_threshold_px() -> f32 { 15.0 }
fn default_pushup_down_angle() -> f32 { 90.0 }
fn default_pushup_up_angle() -> f32 { 150.0 }
fn default_progression_tail() -> usize { 10 }

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            situp_offset_px: default_situp_offset_px(),
            jump_threshold_px: default_jump_threshold_px(),
            pushup_down_angle: default_pushup_down_angle(),
            pushup_up_angle: default_pushup_up_angle(),
            progression_tail: default_progression_tail(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheatConfig {
    /// この数を超える連続一致ペアで重複フレームと判定
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: u32,
}

fn default_duplicate_threshold() -> u32 { 10 }

impl Default for CheatConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: default_duplicate_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PreviewConfig {
    /// プレビュー更新間隔（ミリ秒）
    #[serde(default = "default_preview_interval_ms")]
    pub interval_ms: u64,
}

fn default_preview_interval_ms() -> u64 { 200 }

impl PreviewConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_preview_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    /// 完了確認の間隔（ミリ秒）
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 完了確認の最大回数
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_poll_interval_ms() -> u64 { 2000 }
fn default_max_attempts() -> u32 { 60 }

impl CompletionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// 待機時間の上限 = 間隔 × 最大回数
    pub fn deadline(&self) -> Duration {
        self.poll_interval() * self.max_attempts
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorConfig {
    /// MoveNet ONNX モデルのパス
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// 平均信頼度がこれ未満なら人物なしとみなす
    #[serde(default = "default_min_pose_confidence")]
    pub min_pose_confidence: f32,
}

fn default_model_path() -> String { "models/movenet_lightning.onnx".to_string() }
fn default_min_pose_confidence() -> f32 { 0.2 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            min_pose_confidence: default_min_pose_confidence(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// 読み込めなければデフォルト設定
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("config not loaded, using defaults: {e:#}");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sampler.stride_secs, 0.2);
        assert_eq!(config.sampler.max_samples, 200);
        assert_eq!(config.counter.situp_offset_px, 20.0);
        assert_eq!(config.cheat.duplicate_threshold, 10);
        assert_eq!(config.preview.interval(), Duration::from_millis(200));
        assert_eq!(config.landmarks.head, "nose");
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [sampler]
            max_samples = 50

            [landmarks]
            hip = "right_hip"
            "#,
        )
        .unwrap();
        assert_eq!(config.sampler.max_samples, 50);
        assert_eq!(config.sampler.stride_secs, 0.2);
        assert_eq!(config.landmarks.hip, "right_hip");
        assert_eq!(config.landmarks.head, "nose");
        assert_eq!(config.counter.progression_tail, 10);
    }

    #[test]
    fn test_completion_deadline() {
        let c = CompletionConfig {
            poll_interval_ms: 500,
            max_attempts: 4,
        };
        assert_eq!(c.deadline(), Duration::from_secs(2));
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = Config::load_or_default("does/not/exist.toml");
        assert_eq!(config.sampler.max_samples, 200);
    }
}
