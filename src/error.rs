use std::sync::Arc;
use std::time::Duration;

/// 解析パスの呼び出し側に届くエラー
///
/// フレーム単位の失敗（検出なし・不正な推定）はここに現れない。
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    /// キーポイントソースを初期化できなかった。解析機能を無効化して手動提出に切り替える
    #[error("keypoint source unavailable: {0:#}")]
    SourceUnavailable(Arc<anyhow::Error>),
    #[error("analysis cancelled")]
    Cancelled,
    #[error("analysis did not complete within {waited:?}")]
    TimedOut { waited: Duration },
    #[error("analysis task failed: {0}")]
    Task(String),
}

impl AnalysisError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }
}
