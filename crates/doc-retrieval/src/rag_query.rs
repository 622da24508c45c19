use std::collections::HashSet;

use doc_core::model::{Document, PromotionLevel};
use doc_core::tenant::TenantKey;
use doc_embeddings::EmbeddingClient;
use doc_storage::{DocumentStore, SearchFilters};
use serde::Serialize;

use crate::error::RetrievalError;
use crate::links::extract_markdown_links;

const DEFAULT_MAX_SOURCES: usize = 3;
const MAX_MAX_SOURCES: usize = 20;
const DEFAULT_MIN_RELEVANCE_SCORE: f32 = 0.7;
const NO_RESULTS_ANSWER: &str = "No relevant documents were found.";

/// Wire shape per §4.8: `{path, title, char_count, score}`.
#[derive(Debug, Clone, Serialize)]
pub struct RagSource {
    #[serde(rename = "path")]
    pub relative_path: String,
    pub title: Option<String>,
    pub char_count: usize,
    /// `1.0` for critical documents injected regardless of similarity.
    pub score: f32,
}

/// Wire shape per §4.8: `{path, title, char_count, linked_from}`.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedDoc {
    #[serde(rename = "path")]
    pub relative_path: String,
    pub title: Option<String>,
    pub char_count: usize,
    /// Relative path of the source document whose body linked to this one.
    pub linked_from: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<RagSource>,
    pub linked_docs: Vec<LinkedDoc>,
}

/// `rag_query` tool (§4.8): semantic search + optional critical-doc
/// injection + depth-1 link traversal, assembled into a synthesis prompt and
/// answered by the generation collaborator.
#[allow(clippy::too_many_arguments)]
pub async fn rag_query(
    store: &DocumentStore,
    embeddings: &EmbeddingClient,
    tenant: &TenantKey,
    query: &str,
    max_sources: Option<usize>,
    doc_types: Vec<String>,
    min_relevance_score: Option<f32>,
    min_promotion_level: Option<PromotionLevel>,
    include_critical: bool,
) -> Result<RagAnswer, RetrievalError> {
    if query.trim().is_empty() {
        return Err(RetrievalError::EmptyQuery);
    }
    let max_sources = resolve_max_sources(max_sources)?;
    let min_score = min_relevance_score.unwrap_or(DEFAULT_MIN_RELEVANCE_SCORE);

    let query_embedding = embeddings.embed(query).await?;

    let mut critical_docs = if include_critical {
        let mut docs = store.get_by_promotion_level(tenant, PromotionLevel::Critical)?;
        if !doc_types.is_empty() {
            docs.retain(|doc| doc.frontmatter.doc_type.as_deref().is_some_and(|t| doc_types.contains(&t.to_string())));
        }
        docs
    } else {
        Vec::new()
    };
    critical_docs.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let filters = SearchFilters {
        doc_types,
        min_promotion_level,
        min_score: Some(min_score),
    };
    let semantic_hits = store.search_similar(tenant, &query_embedding, max_sources, &filters)?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut assembled: Vec<(Document, f32)> = Vec::new();

    for doc in critical_docs {
        if seen.insert(doc.relative_path.clone()) {
            assembled.push((doc, 1.0));
        }
    }

    let critical_count = assembled.len();
    let cap = max_sources + critical_count;
    for hit in semantic_hits {
        if assembled.len() >= cap {
            break;
        }
        if seen.insert(hit.document.relative_path.clone()) {
            assembled.push((hit.document, hit.score));
        }
    }

    if assembled.is_empty() {
        return Ok(RagAnswer {
            answer: NO_RESULTS_ANSWER.to_string(),
            sources: Vec::new(),
            linked_docs: Vec::new(),
        });
    }

    let mut linked: Vec<LinkedDoc> = Vec::new();
    let mut link_targets: Vec<(String, String)> = Vec::new();
    for (doc, _) in &assembled {
        for target in extract_markdown_links(&doc.body, &doc.relative_path) {
            if !seen.contains(&target) {
                link_targets.push((target, doc.relative_path.clone()));
            }
        }
    }
    link_targets.sort_by(|a, b| a.0.cmp(&b.0));
    link_targets.dedup_by(|a, b| a.0 == b.0);

    let mut linked_docs_for_prompt: Vec<Document> = Vec::new();
    for (target, linked_from) in link_targets {
        if seen.insert(target.clone()) {
            if let Some(doc) = store.get_by_path(tenant, &target)? {
                linked.push(LinkedDoc {
                    relative_path: doc.relative_path.clone(),
                    title: doc.frontmatter.title.clone(),
                    char_count: doc.body.chars().count(),
                    linked_from: linked_from.clone(),
                });
                linked_docs_for_prompt.push(doc);
            }
        }
    }

    let sources: Vec<RagSource> = assembled
        .iter()
        .map(|(doc, score)| RagSource {
            relative_path: doc.relative_path.clone(),
            title: doc.frontmatter.title.clone(),
            char_count: doc.body.chars().count(),
            score: *score,
        })
        .collect();

    let prompt = build_synthesis_prompt(query, &assembled, &linked_docs_for_prompt);
    let answer = embeddings.generate(&prompt).await?;

    Ok(RagAnswer { answer, sources, linked_docs: linked })
}

fn build_synthesis_prompt(query: &str, primary: &[(Document, f32)], linked: &[Document]) -> String {
    let mut prompt = String::new();
    prompt.push_str("Answer the question using only the context below.\n\n");
    for (doc, _) in primary {
        prompt.push_str(&format!("### {}\n{}\n\n", doc.relative_path, doc.body));
    }
    for doc in linked {
        prompt.push_str(&format!("### {} (linked)\n{}\n\n", doc.relative_path, doc.body));
    }
    prompt.push_str(&format!("Question: {query}\n"));
    prompt
}

fn resolve_max_sources(max_sources: Option<usize>) -> Result<usize, RetrievalError> {
    let max_sources = max_sources.unwrap_or(DEFAULT_MAX_SOURCES);
    if !(1..=MAX_MAX_SOURCES).contains(&max_sources) {
        return Err(RetrievalError::InvalidLimit { max: MAX_MAX_SOURCES, got: max_sources });
    }
    Ok(max_sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_sources_is_used_when_absent() {
        assert_eq!(resolve_max_sources(None).unwrap(), DEFAULT_MAX_SOURCES);
    }

    #[test]
    fn max_sources_above_cap_is_rejected() {
        assert!(resolve_max_sources(Some(1000)).is_err());
    }
}
