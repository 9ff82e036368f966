/// OpenAI互換チャット補完エンドポイントのゲートウェイクライアント。
///
/// タイムアウト、指数バックオフ+ジッター付き再試行、エラー分類をサポートします。
/// 認証エラーとクォータ超過は再試行せず即座に失敗させます。
use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::util::redact::redact;
use crate::util::retry::RetryConfig;

/// チャットAPIに送るメッセージ。
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// ゲートウェイ呼び出しの失敗分類。
///
/// 数値コードはタスクのエラー台帳と状態照会APIで機械判読されます。
/// 分類は上流のHTTPステータスを優先し、ステータスが得られない場合のみ
/// エラーメッセージの小文字部分一致で推定します（ヒューリスティック）。
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("chat completion timed out: {detail}")]
    Timeout { detail: String },
    #[error("chat completion quota exceeded or rate limited: {detail}")]
    QuotaExceeded { detail: String },
    #[error("chat completion unauthorized - check API key: {detail}")]
    Unauthorized { detail: String },
    #[error("chat completion request rejected: {detail}")]
    InvalidRequest { detail: String },
    #[error("chat completion server error: {detail}")]
    Server { detail: String },
}

impl GatewayError {
    /// 機械判読用のエラーコード。
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            GatewayError::Timeout { .. } => 2001,
            GatewayError::QuotaExceeded { .. } => 2002,
            GatewayError::Unauthorized { .. } => 2003,
            GatewayError::InvalidRequest { .. } => 2004,
            GatewayError::Server { .. } => 2005,
        }
    }

    /// タイムアウトとサーバー側エラーのみ再試行可能。
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Server { .. }
        )
    }
}

/// エラーメッセージの部分一致による分類。
///
/// HTTPステータスが得られなかった場合のフォールバック。上流クライアントの
/// 文言変更に弱いため、ステータス分類が常に優先されます。
fn classify_detail(detail: String) -> GatewayError {
    let lowered = detail.to_lowercase();

    if lowered.contains("timeout") || lowered.contains("timed out") {
        GatewayError::Timeout { detail }
    } else if lowered.contains("quota") || lowered.contains("rate limit") {
        GatewayError::QuotaExceeded { detail }
    } else if lowered.contains("unauthorized") || lowered.contains("401") {
        GatewayError::Unauthorized { detail }
    } else {
        GatewayError::Server { detail }
    }
}

fn classify_status(status: StatusCode, detail: String) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized { detail },
        StatusCode::TOO_MANY_REQUESTS | StatusCode::PAYMENT_REQUIRED => {
            GatewayError::QuotaExceeded { detail }
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            GatewayError::Timeout { detail }
        }
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
            GatewayError::InvalidRequest { detail }
        }
        status if status.is_server_error() => GatewayError::Server { detail },
        _ => classify_detail(detail),
    }
}

/// チャットクライアントの設定。
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

/// チャット補完エンドポイントとの通信を管理するクライアント。
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    retry: RetryConfig,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

impl ChatClient {
    /// 新しいチャットクライアントを作成する。
    ///
    /// # Errors
    /// ベースURLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返します。
    pub fn new(config: ChatClientConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("failed to build chat completion HTTP client")?;

        let mut raw_url = config.base_url;
        if !raw_url.ends_with('/') {
            raw_url.push('/');
        }
        let base_url = Url::parse(&raw_url).context("invalid chat completion base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            model: config.model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout,
            retry: config.retry,
        })
    }

    /// エンドポイントへの疎通確認。
    ///
    /// # Errors
    /// ベースURLに到達できない場合はエラーを返します。
    pub async fn ping(&self) -> anyhow::Result<()> {
        use anyhow::Context;

        self.client
            .get(self.base_url.clone())
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("chat completion endpoint unreachable")?;
        Ok(())
    }

    /// メッセージ列を送信し、モデルの応答テキストを返す。
    ///
    /// 再試行可能なエラー（タイムアウト、5xx）は設定された回数まで
    /// バックオフを挟んで再試行します。認証・クォータエラーは即座に返します。
    ///
    /// # Errors
    /// 再試行が尽きた場合、または致命的エラーの場合は [`GatewayError`] を返します。
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GatewayError> {
        let mut attempt = 0;

        loop {
            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "waiting before retry");
                tokio::time::sleep(delay).await;
            }

            let started = Instant::now();
            match self.send(messages).await {
                Ok(text) => {
                    debug!(
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        response_chars = text.chars().count(),
                        "chat completion succeeded"
                    );
                    return Ok(text);
                }
                Err(error) => {
                    attempt += 1;
                    if error.is_retryable() && self.retry.can_retry(attempt) {
                        warn!(
                            attempt,
                            max_attempts = self.retry.max_attempts,
                            error = %error,
                            "chat completion failed, will retry"
                        );
                        continue;
                    }
                    warn!(
                        attempt,
                        code = error.code(),
                        error = %error,
                        "chat completion failed permanently"
                    );
                    return Err(error);
                }
            }
        }
    }

    async fn send(&self, messages: &[ChatMessage]) -> Result<String, GatewayError> {
        let url = self
            .base_url
            .join("chat/completions")
            .map_err(|e| GatewayError::InvalidRequest {
                detail: format!("failed to build completion URL: {e}"),
            })?;

        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        debug!(
            url = %url,
            model = %self.model,
            api_key = %self.api_key.as_deref().map(redact).unwrap_or_default(),
            message_count = messages.len(),
            "sending chat completion request"
        );

        let mut request = self.client.post(url).json(&body).timeout(self.timeout);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                GatewayError::Timeout {
                    detail: error.to_string(),
                }
            } else if error.is_connect() {
                GatewayError::Server {
                    detail: error.to_string(),
                }
            } else {
                classify_detail(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(
                status,
                format!("status {status}: {body}"),
            ));
        }

        let completion: CompletionResponse =
            response.json().await.map_err(|error| GatewayError::Server {
                detail: format!("failed to deserialize completion response: {error}"),
            })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GatewayError::Server {
                detail: "empty completion response".to_string(),
            })
    }
}
