/// モデルに渡すプロンプトの構築。
///
/// 決定的な純関数です。候補記事の本文はトークンコストを抑えるため
/// 規定の文字数に切り詰めてから埋め込みます。
use crate::clients::chat::ChatMessage;
use crate::util::text::truncate_graphemes;

/// プロンプトに埋め込む候補記事。
#[derive(Debug, Clone)]
pub struct PromptCandidate {
    pub id: i64,
    pub content: String,
}

/// システムメッセージ。出力契約と引用マーカー規約を固定する。
const SYSTEM_MESSAGE: &str = r#"你是一个专业的内容分析助手。你的任务是分析新的文本内容与现有文章的关系，并决定是否需要更新现有文章或创建新文章。

重要原则：
1. 仔细比较新内容与现有文章的相关性和重复性
2. 只有在新内容能够补充、改进或修正现有文章时才进行更新
3. 只有在新内容是全新主题且与现有文章无关时才创建新文章
4. 如果新内容与现有文章完全重复或无实质性补充，返回空数组
5. 返回的JSON格式必须严格正确，不包含任何额外的文本说明

引用标记使用规范：
1. 当内容与现有文章相关时，在相关部分添加引用标记 [[cite:id]]
2. 引用标记应该放在相关语句、概念或数据之后
3. 引用要自然融入文本，保持良好的阅读体验
4. 不要过度引用，只在确实相关时使用
5. 引用格式严格按照 [[cite:数字ID]] 的格式
6. 严禁自引用：文章不能引用自己的ID，更新现有文章时不要引用该文章本身

返回格式要求：
- 返回一个JSON数组，每个元素必须包含：id、title、summary、content 四个字段
- id: 更新现有文章时为该文章的数字ID，创建新文章时为字符串 "new"
- title: 简洁明确的文章标题（10-30字）
- summary: 文章核心内容摘要（50-150字）
- content: 完整的文章内容（Markdown格式），包含适当的引用标记
- 空数组 [] 表示无需任何修改

请始终返回有效的JSON数组格式。"#;

/// 候補記事が無い場合のプレースホルダ。
const NO_ARTICLES_PLACEHOLDER: &str = "（无现有文章）";

/// ユーザーメッセージを構築する。
#[must_use]
pub fn format_user_message(
    new_text: &str,
    candidates: &[PromptCandidate],
    excerpt_chars: usize,
) -> String {
    let formatted_articles = format_candidates(candidates, excerpt_chars);

    format!(
        r#"分析任务：
新内容：{new_text}

现有文章：
{formatted_articles}

请分析新内容与现有文章的关系：
1. 如果新内容可以补充或修改现有文章，请更新相应文章的内容
2. 如果新内容是全新主题，或现有文章中没有任何相关内容，请创建id为"new"的新文章
3. 如果现有文章和新内容完全重合，或有含义一样的内容，则返回空数组[]
4. 重要：只返回确实需要修改或创建的文章，不要返回未修改的原文章

引用标记规则：
- 当新内容引用、补充或与某篇现有文章相关时，在相关语段后添加 [[cite:文章ID]] 标记
- 示例："根据之前的研究[[cite:5]]，我们发现..."
- 只有在内容确实相关时才添加引用标记
- 重要：文章不能引用自己，更新现有文章时不要添加对该文章本身ID的引用

返回格式（有效的JSON数组，元素包含id、title、summary、content字段）：
- 更新文章：[{{"id": "1", "title": "文章标题", "summary": "文章摘要", "content": "更新后的内容，含[[cite:5]]引用"}}]
- 新文章：[{{"id": "new", "title": "新文章标题", "summary": "新文章摘要", "content": "新内容，含[[cite:3]]引用"}}]
- 无需修改：[]"#,
        new_text = new_text.trim(),
        formatted_articles = formatted_articles,
    )
}

fn format_candidates(candidates: &[PromptCandidate], excerpt_chars: usize) -> String {
    if candidates.is_empty() {
        return NO_ARTICLES_PLACEHOLDER.to_string();
    }

    candidates
        .iter()
        .map(|candidate| {
            format!(
                "```\nID: {}\nContent: {}\n```",
                candidate.id,
                truncate_graphemes(&candidate.content, excerpt_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// チャットAPI形式のメッセージ列（system + user）を構築する。
#[must_use]
pub fn create_chat_messages(
    new_text: &str,
    candidates: &[PromptCandidate],
    excerpt_chars: usize,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_MESSAGE),
        ChatMessage::user(format_user_message(new_text, candidates, excerpt_chars)),
    ]
}
