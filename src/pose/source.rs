//! Keypoint source abstraction and the process-wide shared instance.
//!
//! `SharedSource` loads the underlying detector at most once. Every caller
//! that arrives while the load is in flight awaits the same future and sees
//! the same instance, or the same failure.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};

use super::keypoint::Pose;
use super::raster::RasterImage;
use crate::error::AnalysisError;

/// 1フレームから姿勢を推定する外部機能
///
/// 人物が見つからなければ `Ok(None)`。エラーも呼び出し側では検出なしと同じ扱い。
#[async_trait]
pub trait KeypointSource: Send + Sync {
    async fn estimate(&self, frame: &RasterImage) -> anyhow::Result<Option<Pose>>;
}

#[async_trait]
impl<T: KeypointSource + ?Sized> KeypointSource for Arc<T> {
    async fn estimate(&self, frame: &RasterImage) -> anyhow::Result<Option<Pose>> {
        (**self).estimate(frame).await
    }
}

type LoadOutcome<S> = Result<Arc<S>, Arc<anyhow::Error>>;
type Loader<S> = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<S>> + Send + Sync>;

/// 遅延初期化される共有キーポイントソース（single-flight）
pub struct SharedSource<S> {
    loader: Loader<S>,
    pending: Mutex<Option<Shared<BoxFuture<'static, LoadOutcome<S>>>>>,
    warming: AtomicBool,
}

impl<S: Send + Sync + 'static> SharedSource<S> {
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<S>> + Send + 'static,
    {
        Self {
            loader: Box::new(move || loader().boxed()),
            pending: Mutex::new(None),
            warming: AtomicBool::new(false),
        }
    }

    /// 初期化済みのインスタンスから作成
    pub fn ready(source: S) -> Self {
        let shared = Self::new(|| async { Err(anyhow::anyhow!("already initialized")) });
        let fut: Shared<BoxFuture<'static, LoadOutcome<S>>> =
            futures::future::ready(Ok(Arc::new(source))).boxed().shared();
        // 即座に完了させて peek() から見えるようにする
        let _ = fut.clone().now_or_never();
        *shared.pending.lock().unwrap_or_else(PoisonError::into_inner) = Some(fut);
        shared
    }

    fn load_future(&self) -> Shared<BoxFuture<'static, LoadOutcome<S>>> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending
            .get_or_insert_with(|| {
                tracing::info!("initializing keypoint source");
                let load = (self.loader)();
                async move {
                    match load.await {
                        Ok(source) => Ok(Arc::new(source)),
                        Err(e) => {
                            tracing::warn!("keypoint source failed to initialize: {e:#}");
                            Err(Arc::new(e))
                        }
                    }
                }
                .boxed()
                .shared()
            })
            .clone()
    }

    /// インスタンスを取得。初回は読み込みを開始し、並行する呼び出しは同じ結果を待つ
    pub async fn get(&self) -> Result<Arc<S>, AnalysisError> {
        self.load_future()
            .await
            .map_err(AnalysisError::SourceUnavailable)
    }

    /// 初期化済みならインスタンスを返す。待たない
    pub fn peek(&self) -> Option<Arc<S>> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.as_ref()?.peek()?.as_ref().ok().cloned()
    }

    /// 初期化が失敗で終わっているか
    pub fn has_failed(&self) -> bool {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(pending.as_ref().and_then(|f| f.peek()), Some(Err(_)))
    }

    /// バックグラウンドで初期化を進める。呼び出しは何度でもよい
    pub fn warm_up(&self) {
        if self.warming.swap(true, Ordering::AcqRel) {
            return;
        }
        let load = self.load_future();
        tokio::spawn(async move {
            let _ = load.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug)]
    struct Fixed;

    #[async_trait]
    impl KeypointSource for Fixed {
        async fn estimate(&self, _frame: &RasterImage) -> anyhow::Result<Option<Pose>> {
            Ok(Some(Pose::default()))
        }
    }

    fn counting_loader(
        loads: Arc<AtomicUsize>,
        fail: bool,
    ) -> impl Fn() -> BoxFuture<'static, anyhow::Result<Fixed>> + Send + Sync + 'static {
        move || {
            let loads = loads.clone();
            async move {
                loads.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                if fail {
                    anyhow::bail!("model download failed");
                }
                Ok(Fixed)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_get_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let source = SharedSource::new(counting_loader(loads.clone(), false));

        let (a, b, c) = tokio::join!(source.get(), source.get(), source.get());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));

        let later = source.get().await.unwrap();
        assert!(Arc::ptr_eq(&a, &later));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failure_shared() {
        let loads = Arc::new(AtomicUsize::new(0));
        let source = SharedSource::new(counting_loader(loads.clone(), true));

        let (a, b) = tokio::join!(source.get(), source.get());
        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        assert!(a.is_unavailable());
        match (a, b) {
            (AnalysisError::SourceUnavailable(x), AnalysisError::SourceUnavailable(y)) => {
                assert!(Arc::ptr_eq(&x, &y));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(source.has_failed());
        assert!(source.get().await.is_err());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_and_warm_up() {
        let loads = Arc::new(AtomicUsize::new(0));
        let source = SharedSource::new(counting_loader(loads.clone(), false));
        assert!(source.peek().is_none());

        source.warm_up();
        source.warm_up();
        assert!(source.peek().is_none());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(source.peek().is_some());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ready_is_immediately_visible() {
        let source = SharedSource::ready(Fixed);
        let peeked = source.peek().unwrap();
        let got = source.get().await.unwrap();
        assert!(Arc::ptr_eq(&peeked, &got));
        let pose = got.estimate(&RasterImage::blank(1, 1)).await.unwrap();
        assert!(pose.is_some());
    }
}
