//! Background analysis jobs with a bounded completion wait.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::analysis::{AnalysisResult, Analyzer};
use crate::config::CompletionConfig;
use crate::counter::ExerciseKind;
use crate::error::AnalysisError;
use crate::pose::KeypointSource;
use crate::sampler::VideoSource;

/// 実行中の解析パス
pub struct AnalysisJob {
    cancel: CancellationToken,
    handle: JoinHandle<Result<AnalysisResult, AnalysisError>>,
}

/// 動画の解析を別タスクで開始する
pub fn spawn_analysis<S, V>(analyzer: Arc<Analyzer<S>>, mut video: V, test_type: ExerciseKind) -> AnalysisJob
where
    S: KeypointSource + 'static,
    V: VideoSource + 'static,
{
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let handle = tokio::spawn(async move { analyzer.analyze_video(&mut video, test_type, &token).await });
    AnalysisJob { cancel, handle }
}

impl AnalysisJob {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 完了を待つ。上限（間隔 × 最大回数）を過ぎたらタスクを止めて `TimedOut`
    pub async fn wait(self, completion: &CompletionConfig) -> Result<AnalysisResult, AnalysisError> {
        let AnalysisJob { cancel, mut handle } = self;
        let deadline = completion.deadline();

        match tokio::time::timeout(deadline, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(AnalysisError::Task(e.to_string())),
            Err(_) => {
                tracing::warn!(waited = ?deadline, "analysis did not complete in time");
                cancel.cancel();
                // フレームバッファ等の解放を待つ
                let _ = handle.await;
                Err(AnalysisError::TimedOut { waited: deadline })
            }
        }
    }
}

/// `poll` が値を返すまで一定間隔で問い合わせる。回数を使い切ったら `TimedOut`
///
/// 問い合わせ自体の失敗は次の試行に回す。
pub async fn poll_until<T, F, Fut>(completion: &CompletionConfig, mut poll: F) -> Result<T, AnalysisError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    for attempt in 0..completion.max_attempts {
        match poll(attempt).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(e) => tracing::debug!(attempt, "status check failed: {e:#}"),
        }
        if attempt + 1 < completion.max_attempts {
            tokio::time::sleep(completion.poll_interval()).await;
        }
    }
    Err(AnalysisError::TimedOut {
        waited: completion.deadline(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SequenceAnalyzer;
    use crate::pose::{Pose, RasterImage, SharedSource};
    use crate::sampler::tests::FakeVideo;
    use crate::sampler::FrameSampler;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Nobody;

    #[async_trait]
    impl KeypointSource for Nobody {
        async fn estimate(&self, _frame: &RasterImage) -> anyhow::Result<Option<Pose>> {
            Ok(None)
        }
    }

    fn analyzer() -> Arc<Analyzer<Nobody>> {
        Arc::new(Analyzer::new(
            FrameSampler::new(0.2, 200),
            SequenceAnalyzer::default(),
            Arc::new(SharedSource::ready(Nobody)),
        ))
    }

    fn completion(poll_interval_ms: u64, max_attempts: u32) -> CompletionConfig {
        CompletionConfig {
            poll_interval_ms,
            max_attempts,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_completes() {
        // 10サンプル × 10ms
        let job = spawn_analysis(analyzer(), FakeVideo::new(2.0), ExerciseKind::Pushup);
        let result = job.wait(&completion(100, 5)).await.unwrap();
        assert_eq!(result.samples, 10);
        assert_eq!(result.reps, 0);
        assert_eq!(result.pose_detection_rate, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_times_out() {
        let mut video = FakeVideo::new(40.0);
        video.seek_delay = Duration::from_millis(100);
        let job = spawn_analysis(analyzer(), video, ExerciseKind::Jump);
        let err = job.wait(&completion(100, 3)).await.unwrap_err();
        match err {
            AnalysisError::TimedOut { waited } => assert_eq!(waited, Duration::from_millis(300)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_cancelled() {
        let mut video = FakeVideo::new(40.0);
        video.seek_delay = Duration::from_millis(100);
        let job = spawn_analysis(analyzer(), video, ExerciseKind::Situp);
        let token = job.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            token.cancel();
        });
        let err = job.wait(&completion(1000, 60)).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_ready() {
        let calls = AtomicU32::new(0);
        let value = poll_until(&completion(2000, 60), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match attempt {
                    0 => anyhow::bail!("not reachable yet"),
                    1 | 2 => Ok(None),
                    _ => Ok(Some(attempt)),
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_gives_up() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();
        let err = poll_until(&completion(2000, 60), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<Option<()>, anyhow::Error>(None) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AnalysisError::TimedOut { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 60);
        // 最後の試行の後は待たない
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(118) && elapsed < Duration::from_secs(120));
    }
}
