pub mod store;
pub mod types;
pub mod worker;

pub use store::{PgTaskStore, TaskQueue};
pub use types::{ClaimedTask, GenerationTask, Submission, TaskStatus};
pub use worker::TaskOrchestrator;
