use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tenant::TenantKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionLevel {
    Standard,
    Important,
    Critical,
}

impl PromotionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Important => "important",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(Self::Standard),
            "important" => Some(Self::Important),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl Default for PromotionLevel {
    fn default() -> Self {
        Self::Standard
    }
}

/// Frontmatter fields common to every doc-type, plus the typed metadata §3
/// requires. `doc_type`-specific required/optional fields live in the schema
/// file on disk, not in this struct — validation is schema-driven (§9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frontmatter {
    pub doc_type: Option<String>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub summary: Option<String>,
    pub significance: Option<String>,
    #[serde(default)]
    pub promotion_level: Option<PromotionLevel>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub related_docs: Vec<String>,
    #[serde(default)]
    pub supersedes: Option<String>,
    /// Remaining doc-type-specific fields, preserved verbatim for schema
    /// validation and for the embedding surface.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The indexed representation of one authored markdown file (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    #[serde(skip)]
    pub tenant: TenantKey,
    /// Repository-relative path, forward-slash normalized.
    pub relative_path: String,
    pub content_hash: String,
    pub frontmatter: Frontmatter,
    /// Markdown body with frontmatter stripped, kept so retrieval can build
    /// snippets without re-reading the file from disk.
    pub body: String,
    /// Absent until embedding succeeds (invariant 4).
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn promotion_level(&self) -> PromotionLevel {
        self.frontmatter.promotion_level.unwrap_or_default()
    }

    pub fn doc_type(&self) -> Option<&str> {
        self.frontmatter.doc_type.as_deref()
    }
}

/// A span of a document's body, produced only when the body exceeds the
/// chunking threshold. Exclusively owned by its parent (invariant 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub parent_id: Uuid,
    #[serde(skip)]
    pub tenant: TenantKey,
    pub chunk_index: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
}

/// Lightweight projection used by `list_all`; avoids shipping embeddings and
/// full frontmatter for listing operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLite {
    pub id: Uuid,
    pub relative_path: String,
    pub doc_type: Option<String>,
    pub title: Option<String>,
    pub promotion_level: PromotionLevel,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    pub document: Document,
    /// Cosine similarity in `[0, 1]`.
    pub score: f32,
}
