use doc_core::model::PromotionLevel;
use doc_core::tenant::TenantKey;
use doc_embeddings::EmbeddingClient;
use doc_storage::{DocumentStore, SearchFilters};
use serde::Serialize;

use crate::error::RetrievalError;
use crate::snippet::default_preview_snippet;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 50;
const DEFAULT_MIN_RELEVANCE_SCORE: f32 = 0.5;

/// Wire shape per §4.8: `{path, title, score, snippet}`, plus `doc_type` and
/// `promotion_level` which the spec's hit shape doesn't forbid as extras.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(rename = "path")]
    pub relative_path: String,
    pub title: Option<String>,
    pub doc_type: Option<String>,
    pub promotion_level: PromotionLevel,
    pub score: f32,
    pub snippet: String,
}

/// `semantic_search` tool (§4.8): embed `query`, rank by cosine similarity
/// above `min_relevance_score`, and return the top `limit` hits with a
/// generated preview snippet.
#[allow(clippy::too_many_arguments)]
pub async fn semantic_search(
    store: &DocumentStore,
    embeddings: &EmbeddingClient,
    tenant: &TenantKey,
    query: &str,
    limit: Option<usize>,
    doc_types: Vec<String>,
    min_relevance_score: Option<f32>,
    min_promotion_level: Option<PromotionLevel>,
) -> Result<Vec<SearchHit>, RetrievalError> {
    if query.trim().is_empty() {
        return Err(RetrievalError::EmptyQuery);
    }
    let limit = resolve_limit(limit)?;
    let min_score = min_relevance_score.unwrap_or(DEFAULT_MIN_RELEVANCE_SCORE);

    let query_embedding = embeddings.embed(query).await?;
    let filters = SearchFilters {
        doc_types,
        min_promotion_level,
        min_score: Some(min_score),
    };
    let hits = store.search_similar(tenant, &query_embedding, limit, &filters)?;

    Ok(hits
        .into_iter()
        .map(|hit| SearchHit {
            relative_path: hit.document.relative_path.clone(),
            title: hit.document.frontmatter.title.clone(),
            doc_type: hit.document.frontmatter.doc_type.clone(),
            promotion_level: hit.document.promotion_level(),
            score: hit.score,
            snippet: default_preview_snippet(&hit.document.body),
        })
        .collect())
}

fn resolve_limit(limit: Option<usize>) -> Result<usize, RetrievalError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(RetrievalError::InvalidLimit { max: MAX_LIMIT, got: limit });
    }
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limit_is_used_when_absent() {
        assert_eq!(resolve_limit(None).unwrap(), DEFAULT_LIMIT);
    }

    #[test]
    fn limit_above_max_is_rejected() {
        let err = resolve_limit(Some(500)).unwrap_err();
        assert_eq!(err.code(), "INVALID_LIMIT");
    }

    #[test]
    fn limit_of_zero_is_rejected() {
        assert!(resolve_limit(Some(0)).is_err());
    }
}
