use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a generation task dimension.
///
/// Failure is sticky: a failed task is never re-queued automatically.
/// Retries happen only inside the model gateway call, not at task level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

/// A persisted reconciliation task.
///
/// `summary_status` and `reconcile_status` are independent dimensions, but the
/// reconcile pipeline covers summarization too, so both complete together.
/// `created_articles` / `updated_articles` are a result ledger of this task's
/// own run, never a live query.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub id: i64,
    pub user_id: i64,
    pub summary_status: TaskStatus,
    pub reconcile_status: TaskStatus,
    pub error_message: Option<String>,
    pub created_articles: Vec<i64>,
    pub updated_articles: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task claimed for processing (already flipped to `processing`).
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub id: i64,
    pub user_id: i64,
    /// Transcript mapped to this task; `None` means the mapping row is
    /// missing and the task must be failed.
    pub transcript_id: Option<i64>,
}

/// Result of accepting a new submission.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub task_id: i64,
    pub transcript_id: i64,
}
