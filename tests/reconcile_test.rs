//! 照合エンジンの性質テスト。
//!
//! 引用エッジの純関数性（常に最新本文から再導出）、自己引用の除外、
//! 欠損記事の読み飛ばしをインメモリストアで検証する。

mod support;

use std::sync::Arc;

use scribe_worker::pipeline::ReconcileItem;
use scribe_worker::pipeline::reconcile::ReconcileEngine;
use support::InMemoryStore;

const LONG_CONTENT: &str = "这是一段足够长的正文内容，用来通过内容长度检查。";

fn content_with_citation(id: i64) -> String {
    format!("{LONG_CONTENT}参考之前的讨论[[cite:{id}]]。")
}

#[tokio::test]
async fn create_persists_article_and_citations() {
    let store = Arc::new(InMemoryStore::new());
    let referenced = store.seed_article(2, "旧文章", "旧摘要", "旧内容");
    let engine = ReconcileEngine::new(store.clone());

    let outcome = engine
        .apply(
            2,
            vec![ReconcileItem::Create {
                title: "新文章".to_string(),
                summary: "新摘要".to_string(),
                content: content_with_citation(referenced),
            }],
        )
        .await;

    assert_eq!(outcome.created_count, 1);
    assert_eq!(outcome.updated_count, 0);
    assert_eq!(outcome.total_processed, 1);

    let new_id = outcome.created_articles[0].id;
    let stored = store.article(new_id).expect("article persisted");
    assert_eq!(stored.title, "新文章");
    assert_eq!(store.citations_for(new_id), vec![referenced]);
    assert_eq!(outcome.created_articles[0].citations, vec![referenced]);
}

#[tokio::test]
async fn self_citation_edge_is_never_persisted() {
    let store = Arc::new(InMemoryStore::new());
    let article_id = store.seed_article(2, "文章", "摘要", "原始内容");
    let engine = ReconcileEngine::new(store.clone());

    let outcome = engine
        .apply(
            2,
            vec![ReconcileItem::Update {
                id: article_id,
                title: "文章".to_string(),
                summary: "摘要".to_string(),
                content: content_with_citation(article_id),
            }],
        )
        .await;

    assert_eq!(outcome.updated_count, 1);
    // 本文は書き換わるが自己引用エッジは作られない
    assert!(store.citations_for(article_id).is_empty());
    let stored = store.article(article_id).expect("article exists");
    assert!(stored.content.contains("[[cite:"));
}

#[tokio::test]
async fn citation_edges_are_a_pure_function_of_latest_content() {
    let store = Arc::new(InMemoryStore::new());
    let first = store.seed_article(2, "文章一", "摘要", "内容一");
    let second = store.seed_article(2, "文章二", "摘要", "内容二");
    let target = store.seed_article(2, "目标文章", "摘要", "目标内容");
    let engine = ReconcileEngine::new(store.clone());

    engine
        .apply(
            2,
            vec![ReconcileItem::Update {
                id: target,
                title: "目标文章".to_string(),
                summary: "摘要".to_string(),
                content: content_with_citation(first),
            }],
        )
        .await;
    assert_eq!(store.citations_for(target), vec![first]);

    engine
        .apply(
            2,
            vec![ReconcileItem::Update {
                id: target,
                title: "目标文章".to_string(),
                summary: "摘要".to_string(),
                content: content_with_citation(second),
            }],
        )
        .await;

    // 旧エッジ(target→first)は残らず、(target→second)だけになる
    assert_eq!(store.citations_for(target), vec![second]);
}

#[tokio::test]
async fn citations_to_nonexistent_articles_are_dropped() {
    let store = Arc::new(InMemoryStore::new());
    let engine = ReconcileEngine::new(store.clone());

    let outcome = engine
        .apply(
            2,
            vec![ReconcileItem::Create {
                title: "新文章".to_string(),
                summary: "摘要".to_string(),
                content: content_with_citation(999),
            }],
        )
        .await;

    // 記事の作成自体は成功し、エッジだけが落ちる
    assert_eq!(outcome.created_count, 1);
    let new_id = outcome.created_articles[0].id;
    assert!(store.citations_for(new_id).is_empty());
    assert!(outcome.created_articles[0].citations.is_empty());
}

#[tokio::test]
async fn missing_update_target_does_not_abort_batch() {
    let store = Arc::new(InMemoryStore::new());
    let engine = ReconcileEngine::new(store.clone());

    let outcome = engine
        .apply(
            2,
            vec![
                ReconcileItem::Update {
                    id: 999,
                    title: "不存在".to_string(),
                    summary: "摘要".to_string(),
                    content: LONG_CONTENT.to_string(),
                },
                ReconcileItem::Create {
                    title: "仍然创建".to_string(),
                    summary: "摘要".to_string(),
                    content: LONG_CONTENT.to_string(),
                },
            ],
        )
        .await;

    assert_eq!(outcome.created_count, 1);
    assert_eq!(outcome.updated_count, 0);
    assert_eq!(outcome.total_processed, 1);
    assert_eq!(store.article_count(), 1);
}

#[tokio::test]
async fn update_overwrites_title_summary_and_content() {
    let store = Arc::new(InMemoryStore::new());
    let article_id = store.seed_article(2, "旧标题", "旧摘要", "旧内容");
    let engine = ReconcileEngine::new(store.clone());

    let outcome = engine
        .apply(
            2,
            vec![ReconcileItem::Update {
                id: article_id,
                title: "新标题".to_string(),
                summary: "新摘要".to_string(),
                content: LONG_CONTENT.to_string(),
            }],
        )
        .await;

    assert_eq!(outcome.updated_count, 1);
    let stored = store.article(article_id).expect("article exists");
    assert_eq!(stored.title, "新标题");
    assert_eq!(stored.summary, "新摘要");
    assert_eq!(stored.content, LONG_CONTENT);
}
