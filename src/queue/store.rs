use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use super::types::{ClaimedTask, GenerationTask, Submission, TaskStatus};

/// タスクキューの永続化層。
///
/// 本番実装は [`PgTaskStore`]、テストはインメモリのフェイクを使用します。
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 投稿を受理する。転記レコード・pendingタスク・両者の対応を
    /// 1トランザクションで作成する。
    async fn create_with_transcript(
        &self,
        user_id: i64,
        body: &str,
        title: Option<&str>,
    ) -> Result<Submission>;

    /// 次のpendingタスクを1件クレームする。
    ///
    /// pending → processing の遷移は単一の条件付きUPDATEで行い、
    /// 複数のポーリングサイクルが同じタスクを取り合っても
    /// at-most-onceディスパッチが成立する。
    async fn claim_next(&self) -> Result<Option<ClaimedTask>>;

    /// タスクを完了にする。照合パイプラインが要約も担うため、
    /// `summary_status`も同時に完了へ遷移し、結果台帳を書き込む。
    async fn mark_completed(&self, task_id: i64, created: &[i64], updated: &[i64]) -> Result<()>;

    /// タスクを失敗にする。失敗は粘着的で、自動再キューはされない。
    async fn mark_failed(&self, task_id: i64, error: &str) -> Result<()>;

    /// タスクを取得する。
    async fn get_task(&self, task_id: i64) -> Result<Option<GenerationTask>>;
}

/// PostgreSQLバックエンドのタスクストア。
#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &PgRow) -> Result<GenerationTask> {
        let summary_str: String = row
            .try_get("summary_status")
            .context("failed to get summary_status")?;
        let reconcile_str: String = row
            .try_get("reconcile_status")
            .context("failed to get reconcile_status")?;

        let summary_status = TaskStatus::from_str(&summary_str)
            .with_context(|| format!("invalid summary_status: {summary_str}"))?;
        let reconcile_status = TaskStatus::from_str(&reconcile_str)
            .with_context(|| format!("invalid reconcile_status: {reconcile_str}"))?;

        Ok(GenerationTask {
            id: row.try_get("id").context("failed to get id")?,
            user_id: row.try_get("user_id").context("failed to get user_id")?,
            summary_status,
            reconcile_status,
            error_message: row.try_get("error_message").ok(),
            created_articles: row.try_get("created_articles").unwrap_or_default(),
            updated_articles: row.try_get("updated_articles").unwrap_or_default(),
            created_at: row
                .try_get("created_at")
                .context("failed to get created_at")?,
            updated_at: row
                .try_get("updated_at")
                .context("failed to get updated_at")?,
        })
    }
}

#[async_trait]
impl TaskQueue for PgTaskStore {
    async fn create_with_transcript(
        &self,
        user_id: i64,
        body: &str,
        title: Option<&str>,
    ) -> Result<Submission> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin submission transaction")?;

        let transcript_row = sqlx::query(
            r"
            INSERT INTO transcripts (user_id, body, title, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(body)
        .bind(title)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert transcript")?;
        let transcript_id: i64 = transcript_row.try_get("id")?;

        let task_row = sqlx::query(
            r"
            INSERT INTO generation_tasks
                (user_id, summary_status, reconcile_status, created_at, updated_at)
            VALUES ($1, 'pending', 'pending', NOW(), NOW())
            RETURNING id
            ",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await
        .context("failed to insert generation task")?;
        let task_id: i64 = task_row.try_get("id")?;

        sqlx::query(
            r"
            INSERT INTO task_transcripts (task_id, transcript_id)
            VALUES ($1, $2)
            ",
        )
        .bind(task_id)
        .bind(transcript_id)
        .execute(&mut *tx)
        .await
        .context("failed to map task to transcript")?;

        tx.commit().await.context("failed to commit submission")?;

        Ok(Submission {
            task_id,
            transcript_id,
        })
    }

    async fn claim_next(&self) -> Result<Option<ClaimedTask>> {
        // クレームは単一の条件付きUPDATE。select-then-updateの
        // TOCTOU窓を作らない
        let row = sqlx::query(
            r"
            UPDATE generation_tasks AS t
            SET reconcile_status = 'processing',
                updated_at = NOW()
            WHERE t.id = (
                SELECT id
                FROM generation_tasks
                WHERE reconcile_status = 'pending'
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING t.id, t.user_id,
                (
                    SELECT transcript_id
                    FROM task_transcripts
                    WHERE task_id = t.id
                    ORDER BY id ASC
                    LIMIT 1
                ) AS transcript_id
            ",
        )
        .fetch_optional(&self.pool)
        .await
        .context("failed to claim next task")?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ClaimedTask {
            id: row.try_get("id").context("failed to get id")?,
            user_id: row.try_get("user_id").context("failed to get user_id")?,
            transcript_id: row
                .try_get::<Option<i64>, _>("transcript_id")
                .ok()
                .flatten(),
        }))
    }

    async fn mark_completed(&self, task_id: i64, created: &[i64], updated: &[i64]) -> Result<()> {
        sqlx::query(
            r"
            UPDATE generation_tasks
            SET reconcile_status = 'completed',
                summary_status = 'completed',
                created_articles = $2,
                updated_articles = $3,
                error_message = NULL,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(task_id)
        .bind(created)
        .bind(updated)
        .execute(&self.pool)
        .await
        .context("failed to mark task as completed")?;

        Ok(())
    }

    async fn mark_failed(&self, task_id: i64, error: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE generation_tasks
            SET reconcile_status = 'failed',
                error_message = $2,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(task_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("failed to mark task as failed")?;

        Ok(())
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<GenerationTask>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, summary_status, reconcile_status, error_message,
                   created_articles, updated_articles, created_at, updated_at
            FROM generation_tasks
            WHERE id = $1
            ",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to get task")?;

        row.as_ref().map(Self::row_to_task).transpose()
    }
}
