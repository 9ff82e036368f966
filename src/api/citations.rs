use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::app::AppState;
use crate::store::dao::ScribeDao;
use crate::store::models::CitationEdge;

#[derive(Debug, Deserialize)]
pub(crate) struct CitationQuery {
    user_id: i64,
}

#[derive(Debug, Serialize)]
struct CitationListResponse {
    edges: Vec<CitationEdge>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// ユーザーの記事が張る引用グラフのエッジ一覧。
pub(crate) async fn list_citations(
    State(state): State<AppState>,
    Query(query): Query<CitationQuery>,
) -> impl IntoResponse {
    if query.user_id <= 0 {
        let body = Json(ErrorResponse {
            error: "user_id must be a positive integer".to_string(),
        });
        return (StatusCode::BAD_REQUEST, body).into_response();
    }

    match state.dao().list_citations_by_author(query.user_id).await {
        Ok(edges) => (StatusCode::OK, Json(CitationListResponse { edges })).into_response(),
        Err(err) => {
            error!(user_id = query.user_id, error = %err, "failed to list citations");
            let body = Json(ErrorResponse {
                error: "failed to list citations".to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}
