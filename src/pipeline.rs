/// 照合パイプライン。
///
/// 転記テキスト1件を、検証 → 候補整形 → プロンプト構築 → モデル呼び出し →
/// 応答パース → ストア適用 の順で処理します。各段の失敗は型付きエラーで
/// 上位（タスクオーケストレーター）へ伝播し、タスクの失敗台帳に記録されます。
use std::sync::Arc;

use tracing::{debug, info};

pub mod citation;
pub mod error;
pub mod parse;
pub mod prompt;
pub mod rank;
pub mod reconcile;
pub mod tags;
pub mod title;
pub mod validate;

pub use error::ReconcileError;
pub use parse::ReconcileItem;
pub use rank::{RankedArticle, SimilarityRanker};
pub use reconcile::{ArticleChange, ReconcileEngine, ReconcileOutcome};
pub use tags::TagGenerator;
pub use title::TitleGenerator;
pub use validate::ContentValidator;

use crate::clients::chat::ChatClient;
use crate::store::dao::ScribeDao;
use crate::util::text::{normalize_article_content, normalize_transcript};

/// 照合パイプライン本体。
pub struct ReconcilePipeline {
    validator: ContentValidator,
    chat: Arc<ChatClient>,
    store: Arc<dyn ScribeDao>,
    engine: ReconcileEngine,
    candidate_excerpt_chars: usize,
}

impl ReconcilePipeline {
    #[must_use]
    pub fn new(
        validator: ContentValidator,
        chat: Arc<ChatClient>,
        store: Arc<dyn ScribeDao>,
        candidate_excerpt_chars: usize,
    ) -> Self {
        let engine = ReconcileEngine::new(Arc::clone(&store));
        Self {
            validator,
            chat,
            store,
            engine,
            candidate_excerpt_chars,
        }
    }

    /// 転記テキストと候補記事ID列を照合し、作成/更新の集計結果を返す。
    ///
    /// タスク単位の同期エントリポイント。候補が空の場合は「既存記事なし」
    /// の分岐として新規作成のみをモデルに委ねる。
    ///
    /// # Errors
    /// 入力検証、転記/候補記事の取得、ゲートウェイ呼び出し、応答パースの
    /// いずれかが失敗した場合は [`ReconcileError`] を返す。個々の記事適用の
    /// 失敗はエラーにならず、集計結果から除外される。
    pub async fn process_transcript(
        &self,
        transcript_id: i64,
        article_ids: &[i64],
        user_id: i64,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        validate::validate_positive_id(transcript_id, "transcript_id")?;
        validate::validate_positive_id(user_id, "user_id")?;
        validate::validate_article_ids(article_ids)?;

        // 転記テキストの解決。欠落・空文字はタスクの致命エラー
        let transcript = self
            .store
            .get_transcript(transcript_id)
            .await
            .map_err(ReconcileError::database)?
            .ok_or(ReconcileError::TranscriptNotFound { id: transcript_id })?;

        if transcript.body.trim().is_empty() {
            return Err(ReconcileError::TranscriptNotFound { id: transcript_id });
        }

        let normalized = normalize_transcript(&transcript.body);
        let text = self.validator.validate_text(&normalized)?;

        // 候補記事の解決。要求したIDが欠けていたら致命エラー
        let articles = self
            .store
            .get_articles_by_ids(article_ids)
            .await
            .map_err(ReconcileError::database)?;

        if articles.len() != article_ids.len() {
            let found: Vec<i64> = articles.iter().map(|a| a.id).collect();
            let missing: Vec<i64> = article_ids
                .iter()
                .copied()
                .filter(|id| !found.contains(id))
                .collect();
            return Err(ReconcileError::ArticleNotFound { ids: missing });
        }

        let candidates: Vec<prompt::PromptCandidate> = articles
            .iter()
            .map(|article| prompt::PromptCandidate {
                id: article.id,
                content: normalize_article_content(&article.content),
            })
            .collect();

        debug!(
            transcript_id,
            user_id,
            candidate_count = candidates.len(),
            text_chars = text.chars().count(),
            "starting reconcile run"
        );

        let messages = prompt::create_chat_messages(&text, &candidates, self.candidate_excerpt_chars);
        let raw_response = self.chat.complete(&messages).await?;
        let items = parse::parse_reconcile_response(&raw_response)?;

        let outcome = self.engine.apply(user_id, items).await;

        info!(
            transcript_id,
            user_id,
            created = outcome.created_count,
            updated = outcome.updated_count,
            total_processed = outcome.total_processed,
            "reconcile run finished"
        );

        Ok(outcome)
    }
}
