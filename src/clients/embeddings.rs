/// OpenAI互換埋め込みエンドポイントのクライアント。
///
/// 外部呼び出し回数を抑えるため、テキストは設定されたバッチサイズで
/// まとめて送信します。
use std::num::NonZeroUsize;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::try_join_all;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 埋め込みクライアントの設定。
#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub dimensions: u32,
    pub batch_size: NonZeroUsize,
    pub timeout: Duration,
}

/// 埋め込みエンドポイントとの通信を管理するクライアント。
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    model: String,
    dimensions: u32,
    batch_size: usize,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: u32,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    /// 新しい埋め込みクライアントを作成する。
    ///
    /// # Errors
    /// ベースURLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(config: EmbeddingClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("failed to build embedding HTTP client")?;

        let mut raw_url = config.base_url;
        if !raw_url.ends_with('/') {
            raw_url.push('/');
        }
        let base_url = Url::parse(&raw_url).context("invalid embedding base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            model: config.model,
            dimensions: config.dimensions,
            batch_size: config.batch_size.get(),
            timeout: config.timeout,
        })
    }

    /// テキスト列の埋め込みベクトルを取得する。
    ///
    /// 入力順を保ったままバッチ単位で並行リクエストします。
    ///
    /// # Errors
    /// いずれかのバッチのHTTPリクエストまたはデシリアライズに失敗した場合はエラーを返します。
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            count = texts.len(),
            batch_size = self.batch_size,
            "requesting embeddings"
        );

        let batches = try_join_all(texts.chunks(self.batch_size).map(|chunk| self.embed_batch(chunk)))
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self
            .base_url
            .join("embeddings")
            .context("failed to build embeddings URL")?;

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
            encoding_format: "float",
        };

        let mut request = self.client.post(url).json(&body).timeout(self.timeout);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("embedding request failed")?
            .error_for_status()
            .context("embedding endpoint returned error status")?;

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("failed to deserialize embedding response")?;

        if parsed.data.len() != texts.len() {
            anyhow::bail!(
                "embedding response size mismatch: sent {}, received {}",
                texts.len(),
                parsed.data.len()
            );
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
