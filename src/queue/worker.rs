/// タスクオーケストレーター。
///
/// バックグラウンドのポーリングループでpendingタスクを発見し、セマフォで
/// 上限を設けたワーカーへディスパッチする明示的なサービスオブジェクトです。
/// ライフサイクルは `start()` / `stop()` で管理し、停止時は実行中のワーカーを
/// ジョインしてから戻ります。隠れたグローバル状態は持ちません。
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::store::TaskQueue;
use super::types::ClaimedTask;
use crate::observability::metrics::Metrics;
use crate::pipeline::{ReconcilePipeline, SimilarityRanker, TagGenerator};
use crate::store::dao::ScribeDao;

pub struct TaskOrchestrator {
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn ScribeDao>,
    pipeline: Arc<ReconcilePipeline>,
    ranker: Arc<SimilarityRanker>,
    tags: Arc<TagGenerator>,
    metrics: Arc<Metrics>,
    poll_interval: Duration,
    concurrency: u32,
    permits: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    running: AtomicBool,
    loop_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TaskOrchestrator {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        store: Arc<dyn ScribeDao>,
        pipeline: Arc<ReconcilePipeline>,
        ranker: Arc<SimilarityRanker>,
        tags: Arc<TagGenerator>,
        metrics: Arc<Metrics>,
        poll_interval: Duration,
        concurrency: NonZeroUsize,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let concurrency = u32::try_from(concurrency.get()).unwrap_or(u32::MAX);

        Arc::new(Self {
            queue,
            store,
            pipeline,
            ranker,
            tags,
            metrics,
            poll_interval,
            concurrency,
            permits: Arc::new(Semaphore::new(concurrency as usize)),
            shutdown_tx,
            running: AtomicBool::new(false),
            loop_handle: std::sync::Mutex::new(None),
        })
    }

    /// ポーリングループを開始する。二重起動は無視される。
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("task orchestrator already running");
            return;
        }

        info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            concurrency = self.concurrency,
            "starting task orchestrator"
        );

        let orchestrator = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                orchestrator.drain_pending().await;

                tokio::select! {
                    () = tokio::time::sleep(orchestrator.poll_interval) => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }

                if *shutdown_rx.borrow() {
                    break;
                }
            }
            debug!("task orchestrator poll loop exited");
        });

        *self.loop_handle.lock().expect("loop handle lock") = Some(handle);
    }

    /// ポーリングループを停止し、実行中のワーカーをジョインしてから戻る。
    pub async fn stop(&self) {
        info!("stopping task orchestrator");
        let _ = self.shutdown_tx.send(true);

        let handle = self.loop_handle.lock().expect("loop handle lock").take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                error!(error = %error, "poll loop join failed");
            }
        }

        // 全パーミットを取得できた時点で実行中のワーカーはいない
        match self.permits.acquire_many(self.concurrency).await {
            Ok(_permits) => {}
            Err(_) => warn!("worker semaphore closed before shutdown"),
        }

        self.running.store(false, Ordering::SeqCst);
        info!("task orchestrator stopped");
    }

    /// pendingタスクを尽きるまでクレームし、ワーカーへディスパッチする。
    ///
    /// ループ自体はタスクの完了を待たない。同時実行数はセマフォで抑える。
    pub async fn drain_pending(self: &Arc<Self>) {
        loop {
            let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
                return;
            };

            match self.queue.claim_next().await {
                Ok(Some(task)) => {
                    debug!(task_id = task.id, user_id = task.user_id, "claimed task");
                    let orchestrator = Arc::clone(self);
                    tokio::spawn(async move {
                        orchestrator.process_task(task).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    return;
                }
                Err(error) => {
                    error!(error = %error, "failed to claim next task");
                    return;
                }
            }
        }
    }

    /// 1タスク分のワーカー手順。
    ///
    /// いかなる失敗もタスクの失敗として記録し、ループや他のタスクへ
    /// 伝播させない。タグ生成の失敗は完了済みステータスを覆さない。
    async fn process_task(&self, task: ClaimedTask) {
        let run_id = Uuid::new_v4();
        info!(task_id = task.id, user_id = task.user_id, %run_id, "processing task");

        let Some(transcript_id) = task.transcript_id else {
            self.fail_task(task.id, "task has no transcript mapping").await;
            return;
        };

        let transcript = match self.store.get_transcript(transcript_id).await {
            Ok(Some(t)) if !t.body.trim().is_empty() => t,
            Ok(_) => {
                self.fail_task(
                    task.id,
                    &format!("transcript {transcript_id} is missing or contains no text"),
                )
                .await;
                return;
            }
            Err(error) => {
                self.fail_task(task.id, &format!("failed to load transcript: {error:#}"))
                    .await;
                return;
            }
        };

        // 候補記事の選定。公開済み記事が無ければ新規作成の単独パス
        let candidate_ids = match self.store.list_published_by_author(task.user_id).await {
            Ok(articles) if articles.is_empty() => {
                debug!(task_id = task.id, "user has no published articles");
                Vec::new()
            }
            Ok(articles) => match self.ranker.rank(&transcript.body, &articles).await {
                Ok(ranked) => {
                    debug!(
                        task_id = task.id,
                        candidate_count = ranked.len(),
                        "selected candidate articles"
                    );
                    ranked.iter().map(|r| r.id).collect()
                }
                Err(error) => {
                    self.fail_task(task.id, &format!("similarity ranking failed: {error:#}"))
                        .await;
                    return;
                }
            },
            Err(error) => {
                self.fail_task(task.id, &format!("failed to list articles: {error:#}"))
                    .await;
                return;
            }
        };

        match self
            .pipeline
            .process_transcript(transcript_id, &candidate_ids, task.user_id)
            .await
        {
            Ok(outcome) => {
                let created = outcome.created_ids();
                let updated = outcome.updated_ids();

                if let Err(error) = self.queue.mark_completed(task.id, &created, &updated).await {
                    error!(task_id = task.id, error = %error, "failed to record task completion");
                    self.metrics.record_task_failed();
                    return;
                }

                self.metrics.record_task_completed(created.len(), updated.len());
                info!(
                    task_id = task.id,
                    %run_id,
                    created = created.len(),
                    updated = updated.len(),
                    "task completed"
                );

                // 新規作成記事のみタグ生成の対象とする
                for article_id in created {
                    if let Err(error) = self.tags.generate_for_article(article_id, task.user_id).await
                    {
                        warn!(
                            task_id = task.id,
                            article_id,
                            error = %error,
                            "tag generation failed, task stays completed"
                        );
                    }
                }
            }
            Err(error) => {
                error!(
                    task_id = task.id,
                    %run_id,
                    error_code = error.error_code(),
                    error = %error,
                    "task failed"
                );
                self.fail_task(task.id, &error.to_string()).await;
            }
        }
    }

    async fn fail_task(&self, task_id: i64, message: &str) {
        self.metrics.record_task_failed();
        if let Err(error) = self.queue.mark_failed(task_id, message).await {
            error!(task_id, error = %error, "failed to record task failure");
        }
    }
}
