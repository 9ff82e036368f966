/// データアクセス層の抽象化。
///
/// パイプラインとタグ生成はこのトレイト越しにストアへアクセスします。
/// 本番実装は [`PgDao`]、テストはインメモリのフェイクを使用します。
pub mod pg;

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::models::{Article, ArticleSummary, CitationEdge, NewArticle, Tag, Transcript};

pub use pg::PgDao;

#[async_trait]
pub trait ScribeDao: Send + Sync {
    /// 転記レコードを取得する。
    async fn get_transcript(&self, id: i64) -> anyhow::Result<Option<Transcript>>;

    /// 記事を取得する。
    async fn get_article(&self, id: i64) -> anyhow::Result<Option<Article>>;

    /// ID列に対応する記事を、要求順を保って取得する。
    ///
    /// 見つからないIDは結果から除かれる（存在チェックは呼び出し側の責務）。
    async fn get_articles_by_ids(&self, ids: &[i64]) -> anyhow::Result<Vec<Article>>;

    /// 指定ユーザーの公開済み記事サマリを取得する。
    async fn list_published_by_author(&self, author_id: i64)
    -> anyhow::Result<Vec<ArticleSummary>>;

    /// 記事を新規作成し、採番されたIDを返す。
    ///
    /// ステータスはpublished、完了時刻は現在時刻で登録される。
    async fn insert_article(&self, article: NewArticle) -> anyhow::Result<i64>;

    /// 記事のタイトル・要約・本文を上書きする。
    ///
    /// 対象が存在しない場合は`false`を返す（エラーにはしない）。
    async fn update_article(
        &self,
        id: i64,
        title: &str,
        summary: &str,
        content: &str,
    ) -> anyhow::Result<bool>;

    /// 与えられたIDのうち実在する記事IDの集合を返す。
    async fn filter_existing_article_ids(&self, ids: &[i64]) -> anyhow::Result<BTreeSet<i64>>;

    /// 指定記事の引用エッジを全削除し、新しい参照先で置き換える。
    ///
    /// エッジ集合は常に最新本文から導出された純関数になる。挿入件数を返す。
    async fn replace_citations(
        &self,
        citing_article_id: i64,
        referenced: &[i64],
    ) -> anyhow::Result<usize>;

    /// 指定ユーザーの記事が張る引用エッジの一覧（タイトル付き）。
    async fn list_citations_by_author(&self, author_id: i64)
    -> anyhow::Result<Vec<CitationEdge>>;

    /// ユーザーの既存タグ名一覧。
    async fn list_tag_names(&self, user_id: i64) -> anyhow::Result<Vec<String>>;

    /// タグを取得または作成し、IDを返す（(user, name)で一意）。
    async fn ensure_tag(&self, user_id: i64, name: &str) -> anyhow::Result<i64>;

    /// 記事とタグを関連付ける。既に存在する場合は何もせず`false`を返す。
    async fn attach_tag(&self, article_id: i64, tag_id: i64) -> anyhow::Result<bool>;

    /// 記事に付与されたタグの一覧。
    async fn list_tags_for_article(&self, article_id: i64) -> anyhow::Result<Vec<Tag>>;
}
