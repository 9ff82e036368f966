/// テキスト処理ユーティリティ。
///
/// 音声転記テキストの正規化、Markdown本文の整形、文字数ベースの切り詰めを提供します。
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static BRACKET_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]]*?\]|（[^（）]*?）|\([^()]*?\)").expect("valid regex"));
static BLANK_LINE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n\s*\n+").expect("valid regex"));
static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^```[^\n]*\n").expect("valid regex"));
static FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n```\s*$").expect("valid regex"));
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(#+)\s*(.+)$").expect("valid regex"));
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-*+]\s+").expect("valid regex"));
static ORDERED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(\d+)\.\s+").expect("valid regex"));

/// 音声転記テキストを正規化する。
///
/// 余分な空白の圧縮、括弧内ノイズ（転記マーカー）の除去、
/// CJK句読点の統一を行います。
#[must_use]
pub fn normalize_transcript(transcript: &str) -> String {
    if transcript.trim().is_empty() {
        return String::new();
    }

    let mut text = WHITESPACE_RUN
        .replace_all(transcript.trim(), " ")
        .into_owned();
    text = BRACKET_NOISE.replace_all(&text, "").into_owned();

    // 句読点を全角へ統一
    let mut unified = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        let replacement = match ch {
            ',' | '，' => '，',
            '.' | '。' => '。',
            '?' | '？' => '？',
            '!' | '！' => '！',
            other => {
                unified.push(other);
                continue;
            }
        };
        unified.push(replacement);
        // 句読点直後の空白は吸収する
        while matches!(chars.peek(), Some(' ')) {
            chars.next();
        }
    }

    WHITESPACE_RUN.replace_all(&unified, " ").trim().to_string()
}

/// 既存記事の本文をプロンプト投入向けに正規化する。
///
/// 改行コードの統一、3連以上の空行の圧縮、各行の前後空白除去を行います。
#[must_use]
pub fn normalize_article_content(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }

    let content = content.trim().replace("\r\n", "\n").replace('\r', "\n");
    let content = BLANK_LINE_RUN.replace_all(&content, "\n\n");

    content
        .split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}

/// モデルが生成したMarkdown本文を整形する。
///
/// 先頭・末尾のコードフェンス除去、見出し・箇条書き記法の正規化、
/// 段落間隔の統一を行います。
#[must_use]
pub fn postprocess_model_content(content: &str) -> String {
    if content.trim().is_empty() {
        return String::new();
    }

    let mut text = content.trim().to_string();
    text = FENCE_OPEN.replace_all(&text, "").into_owned();
    text = FENCE_CLOSE.replace_all(&text, "").into_owned();

    text = HEADING.replace_all(&text, "$1 $2").into_owned();
    text = BULLET.replace_all(&text, "- ").into_owned();
    text = ORDERED.replace_all(&text, "$1. ").into_owned();
    text = BLANK_LINE_RUN.replace_all(&text, "\n\n").into_owned();

    let trimmed_lines: Vec<&str> = text.split('\n').map(str::trim_end).collect();
    trimmed_lines.join("\n").trim_end_matches('\n').to_string()
}

/// 書記素単位で最大`max`個まで切り詰める。
///
/// マルチバイト文字の途中で切れないことを保証します。
#[must_use]
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    let mut graphemes = text.grapheme_indices(true);
    match graphemes.nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
