use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::ScribeDao;
use crate::store::models::{
    Article, ArticleStatus, ArticleSummary, CitationEdge, NewArticle, Tag, Transcript,
};

/// PostgreSQLバックエンドのDAO実装。
#[derive(Debug, Clone)]
pub struct PgDao {
    pool: PgPool,
}

impl PgDao {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_article(row: &PgRow) -> Result<Article> {
        let status_str: String = row.try_get("status").context("failed to get status")?;
        let status = ArticleStatus::from_str(&status_str)
            .with_context(|| format!("invalid article status: {status_str}"))?;

        Ok(Article {
            id: row.try_get("id").context("failed to get id")?,
            author_id: row.try_get("author_id").context("failed to get author_id")?,
            title: row.try_get("title").context("failed to get title")?,
            summary: row
                .try_get::<Option<String>, _>("summary")
                .context("failed to get summary")?
                .unwrap_or_default(),
            content: row
                .try_get::<Option<String>, _>("content")
                .context("failed to get content")?
                .unwrap_or_default(),
            status,
            finished_at: row.try_get("finished_at").ok(),
            created_at: row
                .try_get("created_at")
                .context("failed to get created_at")?,
            updated_at: row
                .try_get("updated_at")
                .context("failed to get updated_at")?,
        })
    }
}

#[async_trait]
impl ScribeDao for PgDao {
    async fn get_transcript(&self, id: i64) -> Result<Option<Transcript>> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, body, title, created_at
            FROM transcripts
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch transcript")?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Transcript {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            body: row.try_get("body")?,
            title: row.try_get("title").ok(),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        }))
    }

    async fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let row = sqlx::query(
            r"
            SELECT id, author_id, title, summary, content, status,
                   finished_at, created_at, updated_at
            FROM articles
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch article")?;

        row.as_ref().map(Self::row_to_article).transpose()
    }

    async fn get_articles_by_ids(&self, ids: &[i64]) -> Result<Vec<Article>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r"
            SELECT id, author_id, title, summary, content, status,
                   finished_at, created_at, updated_at
            FROM articles
            WHERE id = ANY($1)
            ORDER BY array_position($1::bigint[], id)
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch articles by ids")?;

        rows.iter().map(Self::row_to_article).collect()
    }

    async fn list_published_by_author(&self, author_id: i64) -> Result<Vec<ArticleSummary>> {
        let rows = sqlx::query(
            r"
            SELECT id, title, summary
            FROM articles
            WHERE author_id = $1 AND status = 'published'
            ORDER BY id ASC
            ",
        )
        .bind(author_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list published articles")?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            summaries.push(ArticleSummary {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                summary: row
                    .try_get::<Option<String>, _>("summary")?
                    .unwrap_or_default(),
            });
        }
        Ok(summaries)
    }

    async fn insert_article(&self, article: NewArticle) -> Result<i64> {
        let row = sqlx::query(
            r"
            INSERT INTO articles
                (author_id, title, summary, content, status, finished_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'published', NOW(), NOW(), NOW())
            RETURNING id
            ",
        )
        .bind(article.author_id)
        .bind(&article.title)
        .bind(&article.summary)
        .bind(&article.content)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert article")?;

        let id: i64 = row.try_get("id").context("failed to get inserted id")?;
        Ok(id)
    }

    async fn update_article(
        &self,
        id: i64,
        title: &str,
        summary: &str,
        content: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE articles
            SET title = $2,
                summary = $3,
                content = $4,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(title)
        .bind(summary)
        .bind(content)
        .execute(&self.pool)
        .await
        .context("failed to update article")?;

        Ok(result.rows_affected() > 0)
    }

    async fn filter_existing_article_ids(&self, ids: &[i64]) -> Result<BTreeSet<i64>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }

        let rows = sqlx::query(
            r"
            SELECT id FROM articles WHERE id = ANY($1)
            ",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .context("failed to check article existence")?;

        let mut existing = BTreeSet::new();
        for row in rows {
            existing.insert(row.try_get::<i64, _>("id")?);
        }
        Ok(existing)
    }

    async fn replace_citations(&self, citing_article_id: i64, referenced: &[i64]) -> Result<usize> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        sqlx::query(
            r"
            DELETE FROM article_citations WHERE citing_article_id = $1
            ",
        )
        .bind(citing_article_id)
        .execute(&mut *tx)
        .await
        .context("failed to delete old citation edges")?;

        let mut inserted = 0_usize;
        for referenced_id in referenced {
            let result = sqlx::query(
                r"
                INSERT INTO article_citations (citing_article_id, referenced_article_id)
                VALUES ($1, $2)
                ON CONFLICT (citing_article_id, referenced_article_id) DO NOTHING
                ",
            )
            .bind(citing_article_id)
            .bind(referenced_id)
            .execute(&mut *tx)
            .await
            .context("failed to insert citation edge")?;
            inserted += usize::try_from(result.rows_affected()).unwrap_or(0);
        }

        tx.commit().await.context("failed to commit citation edges")?;
        Ok(inserted)
    }

    async fn list_citations_by_author(&self, author_id: i64) -> Result<Vec<CitationEdge>> {
        let rows = sqlx::query(
            r"
            SELECT c.citing_article_id,
                   citing.title AS citing_title,
                   c.referenced_article_id,
                   referenced.title AS referenced_title
            FROM article_citations c
            JOIN articles citing ON citing.id = c.citing_article_id
            JOIN articles referenced ON referenced.id = c.referenced_article_id
            WHERE citing.author_id = $1
            ORDER BY c.citing_article_id, c.referenced_article_id
            ",
        )
        .bind(author_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list citation edges")?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            edges.push(CitationEdge {
                citing_article_id: row.try_get("citing_article_id")?,
                citing_title: row.try_get("citing_title")?,
                referenced_article_id: row.try_get("referenced_article_id")?,
                referenced_title: row.try_get("referenced_title")?,
            });
        }
        Ok(edges)
    }

    async fn list_tag_names(&self, user_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r"
            SELECT name FROM tags WHERE user_id = $1 ORDER BY id ASC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list tag names")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(Into::into))
            .collect()
    }

    async fn ensure_tag(&self, user_id: i64, name: &str) -> Result<i64> {
        // 既存行があればそのIDを返し、なければ作成する
        let row = sqlx::query(
            r"
            INSERT INTO tags (user_id, name)
            VALUES ($1, $2)
            ON CONFLICT (user_id, name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .context("failed to ensure tag")?;

        let id: i64 = row.try_get("id").context("failed to get tag id")?;
        Ok(id)
    }

    async fn attach_tag(&self, article_id: i64, tag_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO article_tags (article_id, tag_id)
            VALUES ($1, $2)
            ON CONFLICT (article_id, tag_id) DO NOTHING
            ",
        )
        .bind(article_id)
        .bind(tag_id)
        .execute(&self.pool)
        .await
        .context("failed to attach tag")?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_tags_for_article(&self, article_id: i64) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            r"
            SELECT t.id, t.name
            FROM article_tags at
            JOIN tags t ON t.id = at.tag_id
            WHERE at.article_id = $1
            ORDER BY t.id ASC
            ",
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to list tags for article")?;

        let mut tags = Vec::with_capacity(rows.len());
        for row in rows {
            tags.push(Tag {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
            });
        }
        Ok(tags)
    }
}
