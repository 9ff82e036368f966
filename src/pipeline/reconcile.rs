/// 照合エンジン。
///
/// 検証済みアクション列を記事ストアへ適用する状態機械です。各アクションは
/// `received → applying → {applied, skipped-on-error}` と遷移し、1件の失敗は
/// 残りの処理を妨げません。引用エッジは常に最新本文から再導出されます。
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::citation::extract_citations;
use super::parse::ReconcileItem;
use crate::store::dao::ScribeDao;
use crate::store::models::NewArticle;

/// 適用された1記事分の結果。
#[derive(Debug, Clone, Serialize)]
pub struct ArticleChange {
    pub id: i64,
    pub title: String,
    pub summary: String,
    pub content_length: usize,
    pub citations: Vec<i64>,
}

/// バッチ全体の集計結果。
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileOutcome {
    pub created_count: usize,
    pub updated_count: usize,
    pub total_processed: usize,
    pub created_articles: Vec<ArticleChange>,
    pub updated_articles: Vec<ArticleChange>,
}

impl ReconcileOutcome {
    /// このバッチで作成された記事のID列。
    #[must_use]
    pub fn created_ids(&self) -> Vec<i64> {
        self.created_articles.iter().map(|a| a.id).collect()
    }

    /// このバッチで更新された記事のID列。
    #[must_use]
    pub fn updated_ids(&self) -> Vec<i64> {
        self.updated_articles.iter().map(|a| a.id).collect()
    }
}

/// 照合アクションの適用エンジン。
pub struct ReconcileEngine {
    store: Arc<dyn ScribeDao>,
}

impl ReconcileEngine {
    #[must_use]
    pub fn new(store: Arc<dyn ScribeDao>) -> Self {
        Self { store }
    }

    /// アクション列を適用し、集計結果を返す。
    ///
    /// 1件の失敗（対象記事の不在、書き込み失敗）はログに残して読み飛ばし、
    /// バッチ全体を中断しない。引用処理の失敗は本文の書き込みに影響しない。
    pub async fn apply(&self, user_id: i64, items: Vec<ReconcileItem>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        for (index, item) in items.into_iter().enumerate() {
            match item {
                ReconcileItem::Create {
                    title,
                    summary,
                    content,
                } => match self.apply_create(user_id, &title, &summary, &content).await {
                    Ok(change) => {
                        outcome.created_count += 1;
                        outcome.total_processed += 1;
                        outcome.created_articles.push(change);
                    }
                    Err(error) => {
                        warn!(index, error = %error, "skipped article creation");
                    }
                },
                ReconcileItem::Update {
                    id,
                    title,
                    summary,
                    content,
                } => match self.apply_update(id, &title, &summary, &content).await {
                    Ok(Some(change)) => {
                        outcome.updated_count += 1;
                        outcome.total_processed += 1;
                        outcome.updated_articles.push(change);
                    }
                    Ok(None) => {
                        warn!(index, article_id = id, "skipped update of missing article");
                    }
                    Err(error) => {
                        warn!(index, article_id = id, error = %error, "skipped article update");
                    }
                },
            }
        }

        debug!(
            created = outcome.created_count,
            updated = outcome.updated_count,
            total = outcome.total_processed,
            "reconcile batch applied"
        );
        outcome
    }

    async fn apply_create(
        &self,
        user_id: i64,
        title: &str,
        summary: &str,
        content: &str,
    ) -> anyhow::Result<ArticleChange> {
        let article_id = self
            .store
            .insert_article(NewArticle {
                author_id: user_id,
                title: title.to_string(),
                summary: summary.to_string(),
                content: content.to_string(),
            })
            .await?;

        let citations = self.persist_citations(article_id, content).await;

        Ok(ArticleChange {
            id: article_id,
            title: title.to_string(),
            summary: summary.to_string(),
            content_length: content.chars().count(),
            citations,
        })
    }

    async fn apply_update(
        &self,
        article_id: i64,
        title: &str,
        summary: &str,
        content: &str,
    ) -> anyhow::Result<Option<ArticleChange>> {
        let updated = self
            .store
            .update_article(article_id, title, summary, content)
            .await?;
        if !updated {
            return Ok(None);
        }

        let citations = self.persist_citations(article_id, content).await;

        Ok(Some(ArticleChange {
            id: article_id,
            title: title.to_string(),
            summary: summary.to_string(),
            content_length: content.chars().count(),
            citations,
        }))
    }

    /// 本文から引用エッジを再導出して永続化する。
    ///
    /// 自己参照と実在しない参照先は警告を出して除外する。ここでの失敗は
    /// 「エッジなし」へ縮退するだけで、呼び出し元へは伝播しない。
    async fn persist_citations(&self, article_id: i64, content: &str) -> Vec<i64> {
        let extracted = extract_citations(content);

        let mut referenced: BTreeSet<i64> = extracted;
        if referenced.remove(&article_id) {
            warn!(
                article_id,
                "dropped self-citation marker pointing at the article itself"
            );
        }

        let candidate_ids: Vec<i64> = referenced.iter().copied().collect();
        let existing = match self.store.filter_existing_article_ids(&candidate_ids).await {
            Ok(existing) => existing,
            Err(error) => {
                warn!(article_id, error = %error, "citation existence check failed, storing no edges");
                BTreeSet::new()
            }
        };

        let dropped: Vec<i64> = referenced.difference(&existing).copied().collect();
        if !dropped.is_empty() {
            warn!(
                article_id,
                dropped = ?dropped,
                "dropped citations to nonexistent articles"
            );
        }

        let final_ids: Vec<i64> = referenced.intersection(&existing).copied().collect();

        // 旧エッジの削除と再作成は本文が更新されるたびに必ず行う
        match self.store.replace_citations(article_id, &final_ids).await {
            Ok(inserted) => {
                debug!(article_id, edge_count = inserted, "citation edges replaced");
                final_ids
            }
            Err(error) => {
                warn!(article_id, error = %error, "failed to persist citation edges");
                Vec::new()
            }
        }
    }
}
