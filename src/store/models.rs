use chrono::{DateTime, Utc};
use serde::Serialize;

/// ユーザーが投稿した文字/音声転記レコード。
///
/// 作成後は不変。タイトルのみ投稿時にLLMで補完されます。
#[derive(Debug, Clone)]
pub struct Transcript {
    pub id: i64,
    pub user_id: i64,
    pub body: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Publication status of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Published,
    Archived,
}

impl ArticleStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStatus::Published => "published",
            ArticleStatus::Archived => "archived",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "published" => Some(ArticleStatus::Published),
            "archived" => Some(ArticleStatus::Archived),
            _ => None,
        }
    }
}

/// 記事レコード。
///
/// 本文はMarkdown形式で、引用マーカー `[[cite:<id>]]` を含み得ます。
/// 内容の書き換えは照合エンジンのみが行います。
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub status: ArticleStatus,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 候補ランキング用の記事サマリ（本文は含まない）。
#[derive(Debug, Clone)]
pub struct ArticleSummary {
    pub id: i64,
    pub title: String,
    pub summary: String,
}

/// New article to be inserted by the reconciliation engine.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub author_id: i64,
    pub title: String,
    pub summary: String,
    pub content: String,
}

/// ユーザー単位で一意なタグ。
#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// 記事間の引用エッジ（引用元 → 被引用）。
#[derive(Debug, Clone, Serialize)]
pub struct CitationEdge {
    pub citing_article_id: i64,
    pub citing_title: String,
    pub referenced_article_id: i64,
    pub referenced_title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_status_round_trips() {
        assert_eq!(ArticleStatus::from_str("published"), Some(ArticleStatus::Published));
        assert_eq!(ArticleStatus::from_str("archived"), Some(ArticleStatus::Archived));
        assert_eq!(ArticleStatus::from_str("draft"), None);
        assert_eq!(ArticleStatus::Published.as_str(), "published");
    }
}
