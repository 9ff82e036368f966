/// 候補記事の関連度ランキング。
///
/// 外部埋め込みエンドポイントでクエリと候補テキストをベクトル化し、
/// コサイン類似度の降順で閾値を超えるものだけを上限件数まで返します。
/// 類似度はスコア降順に並ぶため、閾値を下回った時点で打ち切れます。
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::clients::EmbeddingClient;
use crate::store::models::ArticleSummary;

/// ランキング結果の1件。
#[derive(Debug, Clone)]
pub struct RankedArticle {
    pub id: i64,
    pub title: String,
    pub summary: String,
    pub score: f32,
}

/// 類似度ランカー。
pub struct SimilarityRanker {
    embeddings: Arc<EmbeddingClient>,
    threshold: f32,
    max_candidates: usize,
}

impl SimilarityRanker {
    #[must_use]
    pub fn new(embeddings: Arc<EmbeddingClient>, threshold: f32, max_candidates: usize) -> Self {
        Self {
            embeddings,
            threshold,
            max_candidates,
        }
    }

    /// クエリテキストに関連する候補記事を返す。
    ///
    /// 比較対象テキストは「タイトル + 要約」。閾値を超える候補が
    /// 無ければ空リストを返します（エラーではない）。
    ///
    /// # Errors
    /// 埋め込み呼び出しに失敗した場合はエラーを返します。
    pub async fn rank(
        &self,
        query: &str,
        candidates: &[ArticleSummary],
    ) -> Result<Vec<RankedArticle>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embeddings
            .embed(std::slice::from_ref(&query.to_string()))
            .await?;
        let Some(query_vec) = query_vec.first() else {
            anyhow::bail!("embedding endpoint returned no vector for query");
        };

        let texts: Vec<String> = candidates
            .iter()
            .map(|c| format!("{} {}", c.title, c.summary))
            .collect();
        let vectors = self.embeddings.embed(&texts).await?;

        let scores: Vec<f32> = vectors
            .iter()
            .map(|v| cosine_similarity(query_vec, v))
            .collect();

        let selected = shortlist(&scores, self.threshold, self.max_candidates);

        debug!(
            candidate_count = candidates.len(),
            selected_count = selected.len(),
            threshold = self.threshold,
            "ranked candidate articles"
        );

        Ok(selected
            .into_iter()
            .map(|(index, score)| RankedArticle {
                id: candidates[index].id,
                title: candidates[index].title.clone(),
                summary: candidates[index].summary.clone(),
                score,
            })
            .collect())
    }
}

/// コサイン類似度。ゼロベクトルに対しては0.0を返す。
#[must_use]
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// スコア列から採用する候補のインデックスを選ぶ。
///
/// 降順に走査し、閾値以下に達した時点で打ち切る（以降はすべて閾値以下）。
#[must_use]
pub(crate) fn shortlist(scores: &[f32], threshold: f32, max_candidates: usize) -> Vec<(usize, f32)> {
    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected = Vec::new();
    for (index, score) in indexed {
        if score <= threshold || selected.len() >= max_candidates {
            break;
        }
        selected.push((index, score));
    }
    selected
}
