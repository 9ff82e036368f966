pub mod chat;
pub mod embeddings;

pub use chat::{ChatClient, ChatClientConfig, ChatMessage, GatewayError};
pub use embeddings::{EmbeddingClient, EmbeddingClientConfig};
