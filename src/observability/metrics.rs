/// Prometheusメトリクス。
use anyhow::Result;
use prometheus::{IntCounter, Registry};

/// ワーカーの主要カウンター群。
#[derive(Debug)]
pub struct Metrics {
    tasks_completed_total: IntCounter,
    tasks_failed_total: IntCounter,
    articles_created_total: IntCounter,
    articles_updated_total: IntCounter,
}

impl Metrics {
    /// カウンターを作成してレジストリとデフォルトレジストリに登録する。
    ///
    /// # Errors
    /// カウンターの登録に失敗した場合はエラーを返す。
    pub fn new(registry: &Registry) -> Result<Self> {
        let tasks_completed_total = IntCounter::new(
            "scribe_tasks_completed_total",
            "Number of reconciliation tasks that completed successfully",
        )?;
        let tasks_failed_total = IntCounter::new(
            "scribe_tasks_failed_total",
            "Number of reconciliation tasks that terminally failed",
        )?;
        let articles_created_total = IntCounter::new(
            "scribe_articles_created_total",
            "Number of articles created by the reconcile pipeline",
        )?;
        let articles_updated_total = IntCounter::new(
            "scribe_articles_updated_total",
            "Number of articles updated by the reconcile pipeline",
        )?;

        registry.register(Box::new(tasks_completed_total.clone()))?;
        registry.register(Box::new(tasks_failed_total.clone()))?;
        registry.register(Box::new(articles_created_total.clone()))?;
        registry.register(Box::new(articles_updated_total.clone()))?;

        // /metrics はグローバルレジストリからgatherするため、そちらにも登録する。
        // 既に登録済み（テストで複数回構築した場合）のエラーは無視する。
        let _ = prometheus::register(Box::new(tasks_completed_total.clone()));
        let _ = prometheus::register(Box::new(tasks_failed_total.clone()));
        let _ = prometheus::register(Box::new(articles_created_total.clone()));
        let _ = prometheus::register(Box::new(articles_updated_total.clone()));

        Ok(Self {
            tasks_completed_total,
            tasks_failed_total,
            articles_created_total,
            articles_updated_total,
        })
    }

    pub fn record_task_completed(&self, created: usize, updated: usize) {
        self.tasks_completed_total.inc();
        self.articles_created_total.inc_by(created as u64);
        self.articles_updated_total.inc_by(updated as u64);
    }

    pub fn record_task_failed(&self) {
        self.tasks_failed_total.inc();
    }
}
