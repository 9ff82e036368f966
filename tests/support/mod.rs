//! テスト用のインメモリストア。
//!
//! DB接続なしでDAOとタスクキューの両方の契約を満たします。

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use scribe_worker::queue::store::TaskQueue;
use scribe_worker::queue::types::{ClaimedTask, GenerationTask, Submission, TaskStatus};
use scribe_worker::store::dao::ScribeDao;
use scribe_worker::store::models::{
    Article, ArticleStatus, ArticleSummary, CitationEdge, NewArticle, Tag, Transcript,
};

#[derive(Default)]
pub struct InMemoryStore {
    articles: Mutex<BTreeMap<i64, Article>>,
    transcripts: Mutex<BTreeMap<i64, Transcript>>,
    citations: Mutex<BTreeSet<(i64, i64)>>,
    tags: Mutex<BTreeMap<i64, (i64, String)>>,
    article_tags: Mutex<BTreeSet<(i64, i64)>>,
    tasks: Mutex<BTreeMap<i64, GenerationTask>>,
    task_transcripts: Mutex<BTreeMap<i64, i64>>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn seed_transcript(&self, user_id: i64, body: &str) -> i64 {
        let id = self.allocate_id();
        self.transcripts.lock().unwrap().insert(
            id,
            Transcript {
                id,
                user_id,
                body: body.to_string(),
                title: None,
                created_at: Utc::now(),
            },
        );
        id
    }

    pub fn seed_article(&self, author_id: i64, title: &str, summary: &str, content: &str) -> i64 {
        let id = self.allocate_id();
        let now = Utc::now();
        self.articles.lock().unwrap().insert(
            id,
            Article {
                id,
                author_id,
                title: title.to_string(),
                summary: summary.to_string(),
                content: content.to_string(),
                status: ArticleStatus::Published,
                finished_at: Some(now),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn seed_task(&self, user_id: i64, transcript_id: i64) -> i64 {
        let id = self.allocate_id();
        let now = Utc::now();
        self.tasks.lock().unwrap().insert(
            id,
            GenerationTask {
                id,
                user_id,
                summary_status: TaskStatus::Pending,
                reconcile_status: TaskStatus::Pending,
                error_message: None,
                created_articles: Vec::new(),
                updated_articles: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        );
        self.task_transcripts
            .lock()
            .unwrap()
            .insert(id, transcript_id);
        id
    }

    /// タスクを作るが転記との対応行は作らない（欠損ケースの再現用）。
    pub fn seed_unmapped_task(&self, user_id: i64) -> i64 {
        let id = self.allocate_id();
        let now = Utc::now();
        self.tasks.lock().unwrap().insert(
            id,
            GenerationTask {
                id,
                user_id,
                summary_status: TaskStatus::Pending,
                reconcile_status: TaskStatus::Pending,
                error_message: None,
                created_articles: Vec::new(),
                updated_articles: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    pub fn article(&self, id: i64) -> Option<Article> {
        self.articles.lock().unwrap().get(&id).cloned()
    }

    pub fn article_count(&self) -> usize {
        self.articles.lock().unwrap().len()
    }

    pub fn citations_for(&self, citing_article_id: i64) -> Vec<i64> {
        self.citations
            .lock()
            .unwrap()
            .iter()
            .filter(|(citing, _)| *citing == citing_article_id)
            .map(|(_, referenced)| *referenced)
            .collect()
    }

    pub fn task(&self, id: i64) -> Option<GenerationTask> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    pub fn tag_names_for_article(&self, article_id: i64) -> Vec<String> {
        let tags = self.tags.lock().unwrap();
        self.article_tags
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| *a == article_id)
            .filter_map(|(_, tag_id)| tags.get(tag_id).map(|(_, name)| name.clone()))
            .collect()
    }
}

#[async_trait]
impl ScribeDao for InMemoryStore {
    async fn get_transcript(&self, id: i64) -> Result<Option<Transcript>> {
        Ok(self.transcripts.lock().unwrap().get(&id).cloned())
    }

    async fn get_article(&self, id: i64) -> Result<Option<Article>> {
        Ok(self.articles.lock().unwrap().get(&id).cloned())
    }

    async fn get_articles_by_ids(&self, ids: &[i64]) -> Result<Vec<Article>> {
        let articles = self.articles.lock().unwrap();
        Ok(ids.iter().filter_map(|id| articles.get(id).cloned()).collect())
    }

    async fn list_published_by_author(&self, author_id: i64) -> Result<Vec<ArticleSummary>> {
        Ok(self
            .articles
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.author_id == author_id && a.status == ArticleStatus::Published)
            .map(|a| ArticleSummary {
                id: a.id,
                title: a.title.clone(),
                summary: a.summary.clone(),
            })
            .collect())
    }

    async fn insert_article(&self, article: NewArticle) -> Result<i64> {
        let id = self.allocate_id();
        let now = Utc::now();
        self.articles.lock().unwrap().insert(
            id,
            Article {
                id,
                author_id: article.author_id,
                title: article.title,
                summary: article.summary,
                content: article.content,
                status: ArticleStatus::Published,
                finished_at: Some(now),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }

    async fn update_article(
        &self,
        id: i64,
        title: &str,
        summary: &str,
        content: &str,
    ) -> Result<bool> {
        let mut articles = self.articles.lock().unwrap();
        match articles.get_mut(&id) {
            Some(article) => {
                article.title = title.to_string();
                article.summary = summary.to_string();
                article.content = content.to_string();
                article.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn filter_existing_article_ids(&self, ids: &[i64]) -> Result<BTreeSet<i64>> {
        let articles = self.articles.lock().unwrap();
        Ok(ids
            .iter()
            .copied()
            .filter(|id| articles.contains_key(id))
            .collect())
    }

    async fn replace_citations(
        &self,
        citing_article_id: i64,
        referenced: &[i64],
    ) -> Result<usize> {
        let mut citations = self.citations.lock().unwrap();
        citations.retain(|(citing, _)| *citing != citing_article_id);
        let mut inserted = 0;
        for referenced_id in referenced {
            if citations.insert((citing_article_id, *referenced_id)) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_citations_by_author(&self, author_id: i64) -> Result<Vec<CitationEdge>> {
        let articles = self.articles.lock().unwrap();
        Ok(self
            .citations
            .lock()
            .unwrap()
            .iter()
            .filter(|(citing, _)| {
                articles
                    .get(citing)
                    .is_some_and(|a| a.author_id == author_id)
            })
            .map(|(citing, referenced)| CitationEdge {
                citing_article_id: *citing,
                citing_title: articles
                    .get(citing)
                    .map(|a| a.title.clone())
                    .unwrap_or_default(),
                referenced_article_id: *referenced,
                referenced_title: articles
                    .get(referenced)
                    .map(|a| a.title.clone())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn list_tag_names(&self, user_id: i64) -> Result<Vec<String>> {
        Ok(self
            .tags
            .lock()
            .unwrap()
            .values()
            .filter(|(owner, _)| *owner == user_id)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn ensure_tag(&self, user_id: i64, name: &str) -> Result<i64> {
        let mut tags = self.tags.lock().unwrap();
        if let Some((id, _)) = tags
            .iter()
            .find(|(_, (owner, tag_name))| *owner == user_id && tag_name == name)
        {
            return Ok(*id);
        }
        let id = self.allocate_id();
        tags.insert(id, (user_id, name.to_string()));
        Ok(id)
    }

    async fn attach_tag(&self, article_id: i64, tag_id: i64) -> Result<bool> {
        Ok(self.article_tags.lock().unwrap().insert((article_id, tag_id)))
    }

    async fn list_tags_for_article(&self, article_id: i64) -> Result<Vec<Tag>> {
        let tags = self.tags.lock().unwrap();
        Ok(self
            .article_tags
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| *a == article_id)
            .filter_map(|(_, tag_id)| {
                tags.get(tag_id).map(|(_, name)| Tag {
                    id: *tag_id,
                    name: name.clone(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl TaskQueue for InMemoryStore {
    async fn create_with_transcript(
        &self,
        user_id: i64,
        body: &str,
        title: Option<&str>,
    ) -> Result<Submission> {
        let transcript_id = self.allocate_id();
        self.transcripts.lock().unwrap().insert(
            transcript_id,
            Transcript {
                id: transcript_id,
                user_id,
                body: body.to_string(),
                title: title.map(ToString::to_string),
                created_at: Utc::now(),
            },
        );
        let task_id = self.seed_task(user_id, transcript_id);
        Ok(Submission {
            task_id,
            transcript_id,
        })
    }

    async fn claim_next(&self) -> Result<Option<ClaimedTask>> {
        let mut tasks = self.tasks.lock().unwrap();
        let next_id = tasks
            .values()
            .filter(|t| t.reconcile_status == TaskStatus::Pending)
            .map(|t| t.id)
            .min();

        let Some(task_id) = next_id else {
            return Ok(None);
        };

        let task = tasks.get_mut(&task_id).expect("task exists");
        task.reconcile_status = TaskStatus::Processing;
        task.updated_at = Utc::now();

        let transcript_id = self.task_transcripts.lock().unwrap().get(&task_id).copied();

        Ok(Some(ClaimedTask {
            id: task_id,
            user_id: task.user_id,
            transcript_id,
        }))
    }

    async fn mark_completed(&self, task_id: i64, created: &[i64], updated: &[i64]) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.get_mut(&task_id) {
            task.reconcile_status = TaskStatus::Completed;
            task.summary_status = TaskStatus::Completed;
            task.created_articles = created.to_vec();
            task.updated_articles = updated.to_vec();
            task.error_message = None;
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, task_id: i64, error: &str) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks.get_mut(&task_id) {
            task.reconcile_status = TaskStatus::Failed;
            task.error_message = Some(error.to_string());
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<GenerationTask>> {
        Ok(self.tasks.lock().unwrap().get(&task_id).cloned())
    }
}
