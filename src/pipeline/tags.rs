/// 記事へのトピックタグ付与。
///
/// 記事本文（タイトル+本文+要約）とユーザーの既存タグ名からプロンプトを組み、
/// タグ生成用のスキーマでLLM応答を検証して永続化します。既存タグの再利用を
/// 優先させ、結果が空の場合は既定ラベルへフォールバックします。
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::parse::extract_object_span;
use crate::clients::chat::{ChatClient, ChatMessage};
use crate::schema::{tags::TAGS_RESPONSE_SCHEMA, validate_json};
use crate::store::dao::ScribeDao;

/// タグが得られなかった場合の既定ラベル。
pub const DEFAULT_TAG: &str = "other";

/// 1記事に付与するタグの上限。
const MAX_TAGS_PER_ARTICLE: usize = 3;

const TAG_SYSTEM_MESSAGE: &str =
    "你是一个智能助手，请根据用户输入的文章内容生成相关的标签。";

/// タグ生成器。
pub struct TagGenerator {
    chat: Arc<ChatClient>,
    store: Arc<dyn ScribeDao>,
}

impl TagGenerator {
    #[must_use]
    pub fn new(chat: Arc<ChatClient>, store: Arc<dyn ScribeDao>) -> Self {
        Self { chat, store }
    }

    /// 記事のタグを生成して永続化し、付与したタグ名を返す。
    ///
    /// タグ行は(user, name)単位で取得または作成し、記事との関連は
    /// 既に存在すればスキップする。
    ///
    /// # Errors
    /// 記事が存在しない場合、またはストアへの書き込みに失敗した場合はエラーを返す。
    pub async fn generate_for_article(&self, article_id: i64, user_id: i64) -> Result<Vec<String>> {
        let article = self
            .store
            .get_article(article_id)
            .await?
            .with_context(|| format!("article {article_id} not found for tagging"))?;

        let full_text = format!(
            "{}\n\n{}\n\n{}",
            article.title, article.content, article.summary
        );
        let existing = self.store.list_tag_names(user_id).await?;

        let prompt = build_tag_prompt(&full_text, &existing);
        let messages = [
            ChatMessage::system(TAG_SYSTEM_MESSAGE),
            ChatMessage::user(prompt),
        ];

        let tags = match self.chat.complete(&messages).await {
            Ok(raw) => parse_tag_response(&raw),
            Err(error) => {
                warn!(article_id, error = %error, "tag generation call failed");
                Vec::new()
            }
        };

        // 空結果はタグ無しのまま残さず、既定ラベルへフォールバック
        let tags = if tags.is_empty() {
            vec![DEFAULT_TAG.to_string()]
        } else {
            tags
        };

        for name in &tags {
            let tag_id = self.store.ensure_tag(user_id, name).await?;
            self.store.attach_tag(article_id, tag_id).await?;
        }

        debug!(article_id, tags = ?tags, "article tagged");
        Ok(tags)
    }
}

/// タグ生成プロンプトを構築する。
///
/// 既存タグがある場合は再利用を優先させる（再利用率 ≥70% を要求）。
#[must_use]
pub(crate) fn build_tag_prompt(article_text: &str, existing_tags: &[String]) -> String {
    if existing_tags.is_empty() {
        format!(
            r#"# 角色
资深内容策略专家，擅长提炼文本核心概念为概括性标签

# 任务
为【文章内容】生成1-3个高度概括的标签（Tags）

# 核心原则
1. 概括性优先：每个标签必须代表一个核心概念类别（如"旅行"而非"三亚自由行"）
2. 简洁表达：主要使用2-3字短标签，禁用具体描述性词汇
3. 概念覆盖：组合标签需覆盖文章核心主题

# 硬性要求
- 标签数量：1-3个
- 输出格式：严格使用 {{"tags": ["标签1", "标签2"]}}
- 禁止：具体描述、专有名词、细节特征

### 文章内容
```text
{article_text}
```"#
        )
    } else {
        let tag_names = serde_json::to_string(existing_tags).unwrap_or_else(|_| "[]".to_string());
        format!(
            r#"# 角色
资深内容策略专家，擅长复用现有标签体系

# 任务
为【文章内容】匹配1-3个标签，优先使用【已有Tag库】中的概括性标签

# 核心原则
1. 标签优先级：首选直接复用【已有Tag库】中匹配的概括性标签，仅当库中无合适标签时创建新概括标签
2. 概括性标准：所有标签必须代表概念类别，新标签以2-3字为主，禁用具体描述

# 硬性要求
- 复用率：库中标签优先使用率 ≥70%
- 新标签需通过概括性测试：能否适用于同类内容
- 输出格式：严格使用 {{"tags": ["标签1", "标签2"]}}

### 已有Tag库
```json
{tag_names}
```

### 文章内容
```text
{article_text}
```"#
        )
    }
}

/// タグ応答をパースして検証する。
///
/// 形状が契約を満たさない場合は空リストを返す（呼び出し側でフォールバック）。
#[must_use]
pub(crate) fn parse_tag_response(raw: &str) -> Vec<String> {
    let span = extract_object_span(raw);
    let Ok(value) = serde_json::from_str::<serde_json::Value>(span) else {
        warn!("tag response is not valid JSON");
        return Vec::new();
    };

    let validation = validate_json(&TAGS_RESPONSE_SCHEMA, &value);
    if !validation.valid {
        warn!(errors = ?validation.errors, "tag response failed schema validation");
        return Vec::new();
    }

    let mut seen = std::collections::HashSet::new();
    value["tags"]
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str())
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .filter(|t| seen.insert(t.to_string()))
                .map(ToString::to_string)
                .take(MAX_TAGS_PER_ARTICLE)
                .collect()
        })
        .unwrap_or_default()
}
