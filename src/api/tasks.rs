use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::app::AppState;
use crate::queue::TaskQueue;
use crate::queue::types::TaskStatus;
use crate::store::dao::ScribeDao;
use crate::store::models::Tag;

#[derive(Debug, Serialize)]
struct ArticleInfo {
    id: i64,
    title: String,
    summary: String,
    status: &'static str,
    tags: Vec<Tag>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct TaskStatusResponse {
    task_id: i64,
    user_id: i64,
    summary_status: TaskStatus,
    reconcile_status: TaskStatus,
    error_message: Option<String>,
    created_articles_info: Vec<ArticleInfo>,
    updated_articles_info: Vec<ArticleInfo>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// タスクの状態を照会する。
///
/// 失敗したタスクの`error_message`はそのまま返す。結果台帳の記事IDは
/// タイトル・要約・タグ付きの詳細に展開する。
pub(crate) async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<i64>,
) -> impl IntoResponse {
    let task = match state.queue().get_task(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            let body = Json(ErrorResponse {
                error: format!("task {task_id} not found"),
            });
            return (StatusCode::NOT_FOUND, body).into_response();
        }
        Err(err) => {
            error!(task_id, error = %err, "failed to load task");
            let body = Json(ErrorResponse {
                error: "failed to load task".to_string(),
            });
            return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        }
    };

    let created_articles_info = collect_article_info(&state, &task.created_articles).await;
    let updated_articles_info = collect_article_info(&state, &task.updated_articles).await;

    let body = Json(TaskStatusResponse {
        task_id: task.id,
        user_id: task.user_id,
        summary_status: task.summary_status,
        reconcile_status: task.reconcile_status,
        error_message: task.error_message,
        created_articles_info,
        updated_articles_info,
        created_at: task.created_at,
        updated_at: task.updated_at,
    });
    (StatusCode::OK, body).into_response()
}

/// 結果台帳のID列を記事詳細へ展開する。
///
/// 記事が後から削除されていた場合は黙って読み飛ばす。
async fn collect_article_info(state: &AppState, article_ids: &[i64]) -> Vec<ArticleInfo> {
    let mut infos = Vec::with_capacity(article_ids.len());

    for &article_id in article_ids {
        let article = match state.dao().get_article(article_id).await {
            Ok(Some(article)) => article,
            Ok(None) => continue,
            Err(err) => {
                error!(article_id, error = %err, "failed to load ledger article");
                continue;
            }
        };

        let tags = state
            .dao()
            .list_tags_for_article(article_id)
            .await
            .unwrap_or_default();

        infos.push(ArticleInfo {
            id: article.id,
            title: article.title,
            summary: article.summary,
            status: article.status.as_str(),
            tags,
            created_at: article.created_at,
            updated_at: article.updated_at,
            finished_at: article.finished_at,
        });
    }

    infos
}
