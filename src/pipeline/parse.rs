/// モデル応答のパースと検証。
///
/// 生成モデルの出力は信頼できない入力として扱います。Markdownフェンスや
/// 前後の散文を許容しつつJSON配列部分のみを取り出し、各要素の形状を
/// 検証してから型付きの [`ReconcileItem`] に変換します。形状が確認できる
/// までは緩いマップのまま扱わず、ここを通過したデータだけがストアに
/// 到達します。
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::error::ReconcileError;
use super::validate::validate_article_content;
use crate::util::text::postprocess_model_content;

static FENCE_JSON: Lazy<Regex> = Lazy::new(|| Regex::new(r"```json\s*").expect("valid regex"));
static FENCE_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"```\s*$").expect("valid regex"));

/// 検証済みの照合アクション。
///
/// `id`が`"new"`なら作成、数値なら既存記事の更新。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileItem {
    Create {
        title: String,
        summary: String,
        content: String,
    },
    Update {
        id: i64,
        title: String,
        summary: String,
        content: String,
    },
}

impl ReconcileItem {
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            ReconcileItem::Create { content, .. } | ReconcileItem::Update { content, .. } => {
                content
            }
        }
    }
}

/// テキストからJSON部分（最外の`[...]`、なければ`{...}`）を切り出す。
///
/// どちらも見つからない場合はトリムした全文を返し、後段のパースに委ねる。
#[must_use]
pub(crate) fn extract_json_span(text: &str) -> &str {
    let start = text.find('[');
    let end = text.rfind(']');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            return text[start..=end].trim();
        }
    }

    let start = text.find('{');
    let end = text.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            return text[start..=end].trim();
        }
    }

    text.trim()
}

/// テキストから最外の`{...}`を切り出す。
///
/// オブジェクト契約の応答（タグ、タイトル）向け。値に配列が含まれて
/// いても配列側を誤って切り出さない。
#[must_use]
pub(crate) fn extract_object_span(text: &str) -> &str {
    let start = text.find('{');
    let end = text.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            return text[start..=end].trim();
        }
    }

    text.trim()
}

/// モデル応答をパースし、正規化済みの照合アクション列を返す。
///
/// # Errors
/// - 空応答、JSONとして不正、または配列でない場合は [`ReconcileError::InvalidResponse`]
/// - 要素に必須フィールドが欠けている場合は [`ReconcileError::MissingFields`]
/// - id・title・summary・contentの値域違反は [`ReconcileError::InvalidArticleFormat`]
pub fn parse_reconcile_response(response: &str) -> Result<Vec<ReconcileItem>, ReconcileError> {
    if response.trim().is_empty() {
        return Err(ReconcileError::InvalidResponse {
            detail: "empty model response".to_string(),
            raw: response.to_string(),
        });
    }

    let stripped = FENCE_TAIL.replace_all(&FENCE_JSON.replace_all(response, ""), "");
    let span = extract_json_span(&stripped);

    let parsed: Value =
        serde_json::from_str(span).map_err(|error| ReconcileError::InvalidResponse {
            detail: format!("invalid JSON in model response: {error}"),
            raw: response.to_string(),
        })?;

    let Value::Array(elements) = parsed else {
        return Err(ReconcileError::InvalidResponse {
            detail: "model response must be a JSON array".to_string(),
            raw: response.to_string(),
        });
    };

    let mut items = Vec::with_capacity(elements.len());
    for (index, element) in elements.into_iter().enumerate() {
        items.push(parse_item(index, element)?);
    }
    Ok(items)
}

fn parse_item(index: usize, element: Value) -> Result<ReconcileItem, ReconcileError> {
    let Value::Object(object) = element else {
        return Err(ReconcileError::InvalidResponse {
            detail: format!("item {index} must be a JSON object"),
            raw: String::new(),
        });
    };

    let missing: Vec<&str> = ["id", "title", "summary", "content"]
        .into_iter()
        .filter(|field| !object.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        return Err(ReconcileError::MissingFields {
            detail: format!("item {index} missing required fields: {missing:?}"),
        });
    }

    let title = required_string(&object, index, "title")?;
    let summary = required_string(&object, index, "summary")?;
    let raw_content = required_string(&object, index, "content")?;

    // 本文はMarkdownとして整形してから長さを検証する
    let content = postprocess_model_content(&raw_content);
    validate_article_content(&content)?;

    match parse_id(index, &object["id"])? {
        None => Ok(ReconcileItem::Create {
            title,
            summary,
            content,
        }),
        Some(id) => Ok(ReconcileItem::Update {
            id,
            title,
            summary,
            content,
        }),
    }
}

/// idフィールドを解釈する。`"new"`は`None`、数値/数字文字列は`Some(id)`。
fn parse_id(index: usize, value: &Value) -> Result<Option<i64>, ReconcileError> {
    match value {
        Value::String(s) if s == "new" => Ok(None),
        Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
            let id = s
                .parse::<i64>()
                .map_err(|_| ReconcileError::InvalidArticleFormat {
                    detail: format!("item {index} id out of range: {s}"),
                })?;
            if id <= 0 {
                return Err(ReconcileError::InvalidArticleFormat {
                    detail: format!("item {index} id must be positive, got {id}"),
                });
            }
            Ok(Some(id))
        }
        Value::Number(n) => {
            let id = n
                .as_i64()
                .ok_or_else(|| ReconcileError::InvalidArticleFormat {
                    detail: format!("item {index} id must be an integer, got {n}"),
                })?;
            if id <= 0 {
                return Err(ReconcileError::InvalidArticleFormat {
                    detail: format!("item {index} id must be positive, got {id}"),
                });
            }
            Ok(Some(id))
        }
        other => Err(ReconcileError::InvalidArticleFormat {
            detail: format!("item {index} invalid id format: must be \"new\" or numeric, got {other}"),
        }),
    }
}

fn required_string(
    object: &serde_json::Map<String, Value>,
    index: usize,
    field: &str,
) -> Result<String, ReconcileError> {
    match object.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.clone()),
        _ => Err(ReconcileError::InvalidArticleFormat {
            detail: format!("item {index} {field} must be a non-empty string"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const VALID_CONTENT: &str = "这是一段足够长的文章内容，用于通过长度检查。";

    fn valid_item(id: &str) -> String {
        format!(
            r#"{{"id": {id}, "title": "标题", "summary": "摘要", "content": "{VALID_CONTENT}"}}"#
        )
    }

    #[test]
    fn parses_new_article_item() {
        let raw = format!("[{}]", valid_item("\"new\""));
        let items = parse_reconcile_response(&raw).expect("should parse");

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], ReconcileItem::Create { .. }));
    }

    #[test]
    fn coerces_digit_string_id_to_update() {
        let raw = format!("[{}]", valid_item("\"5\""));
        let items = parse_reconcile_response(&raw).expect("should parse");

        match &items[0] {
            ReconcileItem::Update { id, .. } => assert_eq!(*id, 5),
            ReconcileItem::Create { .. } => panic!("expected update"),
        }
    }

    #[test]
    fn accepts_integer_id() {
        let raw = format!("[{}]", valid_item("12"));
        let items = parse_reconcile_response(&raw).expect("should parse");

        assert!(matches!(items[0], ReconcileItem::Update { id: 12, .. }));
    }

    #[test]
    fn parses_empty_array() {
        let items = parse_reconcile_response("[]").expect("empty array is valid");
        assert!(items.is_empty());
    }

    #[test]
    fn tolerates_markdown_fences() {
        let raw = format!("```json\n[{}]\n```", valid_item("\"new\""));
        let items = parse_reconcile_response(&raw).expect("should parse fenced JSON");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn tolerates_surrounding_prose() {
        let raw = format!(
            "根据分析，结果如下：\n[{}]\n以上就是全部结果。",
            valid_item("\"new\"")
        );
        let items = parse_reconcile_response(&raw).expect("should parse with prose");
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn round_trip_preserves_item_shape() {
        let raw = format!("[{}, {}]", valid_item("\"3\""), valid_item("\"new\""));
        let items = parse_reconcile_response(&raw).expect("should parse");

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], ReconcileItem::Update { id: 3, .. }));
        assert!(matches!(items[1], ReconcileItem::Create { .. }));
        assert_eq!(items[0].content(), VALID_CONTENT);
    }

    #[test]
    fn rejects_missing_summary() {
        let raw = format!(
            r#"[{{"id": "new", "title": "标题", "content": "{VALID_CONTENT}"}}]"#
        );
        let error = parse_reconcile_response(&raw).expect_err("missing field should fail");
        assert_eq!(error.error_code(), 3004);
    }

    #[rstest]
    #[case("\"abc\"")]
    #[case("\"0\"")]
    #[case("0")]
    #[case("-3")]
    #[case("1.5")]
    #[case("null")]
    fn rejects_malformed_ids(#[case] id: &str) {
        let raw = format!("[{}]", valid_item(id));
        let error = parse_reconcile_response(&raw).expect_err("bad id should fail");
        assert_eq!(error.error_code(), 3003);
    }

    #[test]
    fn rejects_top_level_object() {
        let raw = format!("{}", valid_item("\"new\""));
        let error = parse_reconcile_response(&raw).expect_err("object should fail");
        assert_eq!(error.error_code(), 3001);
    }

    #[test]
    fn rejects_unparseable_text() {
        let error =
            parse_reconcile_response("抱歉，我无法处理这个请求。").expect_err("prose should fail");
        assert_eq!(error.error_code(), 3001);
        assert!(matches!(error, ReconcileError::InvalidResponse { .. }));
    }

    #[test]
    fn rejects_empty_response() {
        let error = parse_reconcile_response("   ").expect_err("empty should fail");
        assert_eq!(error.error_code(), 3001);
    }

    #[test]
    fn rejects_empty_content() {
        let raw = r#"[{"id": "new", "title": "标题", "summary": "摘要", "content": "  "}]"#;
        let error = parse_reconcile_response(raw).expect_err("empty content should fail");
        assert_eq!(error.error_code(), 3003);
    }

    #[test]
    fn normalizes_fenced_content_field() {
        let raw = format!(
            r#"[{{"id": "new", "title": "标题", "summary": "摘要", "content": "```markdown\n# 标题\n\n这是正文内容，长度足够通过检查。\n```"}}]"#
        );
        let items = parse_reconcile_response(&raw).expect("should parse");
        assert_eq!(items[0].content(), "# 标题\n\n这是正文内容，长度足够通过检查。");
    }

    #[test]
    fn extract_json_span_prefers_array() {
        let text = "prefix {\"a\": 1} [1, 2] suffix";
        assert_eq!(extract_json_span(text), "[1, 2]");
    }

    #[test]
    fn extract_json_span_falls_back_to_object() {
        let text = "prefix {\"a\": 1} suffix";
        assert_eq!(extract_json_span(text), "{\"a\": 1}");
    }

    #[test]
    fn extract_object_span_keeps_object_with_nested_array() {
        let text = "结果如下：{\"tags\": [\"旅行\"]} 以上。";
        assert_eq!(extract_object_span(text), "{\"tags\": [\"旅行\"]}");
    }
}
