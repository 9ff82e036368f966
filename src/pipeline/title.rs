/// 投稿テキストからのタイトル生成。
///
/// 投稿エンドポイントが使う単一フィールドのLLM呼び出しです。照合パイプライン
/// とは独立しており、失敗しても投稿自体は成功させるため、常に文字列を返します。
use std::sync::Arc;

use tracing::warn;

use super::parse::extract_object_span;
use crate::clients::chat::{ChatClient, ChatMessage};

/// タイトル生成に失敗した場合のフォールバック。
pub const FALLBACK_TITLE: &str = "未能生成标题";

const TITLE_SYSTEM_MESSAGE: &str =
    "你是一个智能助手，请根据用户输入的文字内容生成一个简洁明了的标题。";

/// タイトル生成器。
pub struct TitleGenerator {
    chat: Arc<ChatClient>,
}

impl TitleGenerator {
    #[must_use]
    pub fn new(chat: Arc<ChatClient>) -> Self {
        Self { chat }
    }

    /// テキストの要点を表すタイトルを生成する。
    ///
    /// ゲートウェイ呼び出しや応答パースに失敗した場合は
    /// [`FALLBACK_TITLE`] を返し、エラーを伝播しない。
    pub async fn generate(&self, text: &str) -> String {
        let messages = [
            ChatMessage::system(TITLE_SYSTEM_MESSAGE),
            ChatMessage::user(build_title_prompt(text)),
        ];

        match self.chat.complete(&messages).await {
            Ok(raw) => parse_title_response(&raw).unwrap_or_else(|| {
                warn!("title response did not contain a usable title");
                FALLBACK_TITLE.to_string()
            }),
            Err(error) => {
                warn!(error = %error, "title generation call failed");
                FALLBACK_TITLE.to_string()
            }
        }
    }
}

#[must_use]
pub(crate) fn build_title_prompt(text: &str) -> String {
    format!(
        r#"# 角色
您是一位资深的内容编辑专家，擅长撰写精准传达核心信息的标题。

# 任务
基于提供的【待处理文本】，创作一个直接明确的标题（Title）。

# 技术规范
1. 禁止使用以下手法：疑问句式、悬念设置、夸张比较（"震惊"等）、过度承诺（"必看"等）
2. 格式要求：
   - 长度控制在8-18字之间
   - 使用主谓宾完整结构
   - 输出纯JSON格式：{{"title": "标题内容"}}

# 示例参考
正确案例：{{"title": "A市6月房价环比下降2.3% 刚需户型成交量领跌"}}
错误案例：{{"title": "楼市惊现逆转！这个信号预示房价要崩？"}}

## 待处理文本
{text}"#
    )
}

#[must_use]
pub(crate) fn parse_title_response(raw: &str) -> Option<String> {
    let span = extract_object_span(raw);
    let value: serde_json::Value = serde_json::from_str(span).ok()?;
    let title = value.get("title")?.as_str()?.trim();
    if title.is_empty() {
        return None;
    }
    Some(title.to_string())
}
