use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::app::AppState;
use crate::queue::TaskQueue;

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRecordRequest {
    user_id: i64,
    text: String,
}

#[derive(Debug, Serialize)]
struct SubmitRecordResponse {
    message: &'static str,
    title: String,
    task_id: i64,
    record_id: i64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// 文字レコードの投稿を受理し、pendingの照合タスクを作成する。
///
/// タイトルは軽量なLLM呼び出しで補完する（失敗しても投稿は成功する）。
/// 記事はこの時点では作られず、オーケストレーターのタスク処理で生成される。
pub(crate) async fn submit(
    State(state): State<AppState>,
    Json(payload): Json<SubmitRecordRequest>,
) -> impl IntoResponse {
    let validated = match state
        .validator()
        .validate_submission(payload.user_id, &payload.text)
    {
        Ok(text) => text,
        Err(error) => {
            let body = Json(ErrorResponse {
                error: error.to_string(),
            });
            return (StatusCode::BAD_REQUEST, body).into_response();
        }
    };

    let title = state.title_generator().generate(&validated).await;

    match state
        .queue()
        .create_with_transcript(payload.user_id, &validated, Some(&title))
        .await
    {
        Ok(submission) => {
            info!(
                task_id = submission.task_id,
                record_id = submission.transcript_id,
                user_id = payload.user_id,
                "submission accepted"
            );
            let body = Json(SubmitRecordResponse {
                message: "record accepted",
                title,
                task_id: submission.task_id,
                record_id: submission.transcript_id,
            });
            (StatusCode::OK, body).into_response()
        }
        Err(error) => {
            error!(user_id = payload.user_id, error = %error, "failed to accept submission");
            let body = Json(ErrorResponse {
                error: "failed to create record, please retry later".to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}
