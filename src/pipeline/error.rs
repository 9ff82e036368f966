use thiserror::Error;

use crate::clients::chat::GatewayError;

/// 照合パイプラインのエラー分類。
///
/// 数値コードはタスクの失敗台帳と状態照会APIに記録され、機械判読に使われます。
/// 採番はストア契約と揃えてあります（データベース 1000番台、ゲートウェイ
/// 2000番台、検証 3000番台、その他 9000番台）。
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("transcript {id} is missing or contains no text")]
    TranscriptNotFound { id: i64 },

    #[error("articles not found: {ids:?}")]
    ArticleNotFound { ids: Vec<i64> },

    #[error("database operation failed: {source}")]
    Database {
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("invalid model response: {detail}")]
    InvalidResponse { detail: String, raw: String },

    #[error("content validation failed: {detail}")]
    Validation { detail: String },

    #[error("invalid article format: {detail}")]
    InvalidArticleFormat { detail: String },

    #[error("missing required fields: {detail}")]
    MissingFields { detail: String },

    #[error("unexpected error: {detail}")]
    Unknown { detail: String },
}

impl ReconcileError {
    #[must_use]
    pub fn database(source: anyhow::Error) -> Self {
        ReconcileError::Database { source }
    }

    /// 機械判読用のエラーコード。
    #[must_use]
    pub fn error_code(&self) -> u16 {
        match self {
            ReconcileError::TranscriptNotFound { .. } => 1001,
            ReconcileError::ArticleNotFound { .. } => 1002,
            ReconcileError::Database { .. } => 1003,
            ReconcileError::Gateway(inner) => inner.code(),
            ReconcileError::InvalidResponse { .. } => 3001,
            ReconcileError::Validation { .. } => 3002,
            ReconcileError::InvalidArticleFormat { .. } => 3003,
            ReconcileError::MissingFields { .. } => 3004,
            ReconcileError::Unknown { .. } => 9001,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            ReconcileError::TranscriptNotFound { id: 1 }.error_code(),
            1001
        );
        assert_eq!(
            ReconcileError::ArticleNotFound { ids: vec![5] }.error_code(),
            1002
        );
        assert_eq!(
            ReconcileError::Validation {
                detail: "x".into()
            }
            .error_code(),
            3002
        );
        assert_eq!(
            ReconcileError::Gateway(GatewayError::Timeout {
                detail: "t".into()
            })
            .error_code(),
            2001
        );
    }
}
