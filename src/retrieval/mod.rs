//! Document retrieval for grounding generation
//!
//! The index is an external collaborator behind [`DocumentIndex`]: a query
//! in, an ordered sequence of documents out. [`KeywordIndex`] is the
//! built-in implementation, loaded from a docs directory at boot.

pub mod prompt;

use anyhow::{Context, Result};
use std::path::Path;

/// A retrieved context document
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub source: Option<String>,
}

/// Ordered similarity search over a document corpus
pub trait DocumentIndex: Send + Sync {
    /// Return up to `k` documents most relevant to `query`, best first
    fn search(&self, query: &str, k: usize) -> Vec<Document>;
}

/// Term-overlap index over an in-memory corpus
///
/// Scores documents by occurrence counts of the query terms. Good enough to
/// ground answers in a small curated corpus; a vector store can be swapped
/// in behind the same trait.
pub struct KeywordIndex {
    docs: Vec<Document>,
}

impl KeywordIndex {
    pub fn new(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    /// Index with no documents; search always returns nothing
    pub fn empty() -> Self {
        Self { docs: Vec::new() }
    }

    /// Load every .md/.txt file under `dir` as one document each
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut docs = Vec::new();
        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            let is_text = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("md") | Some("txt")
            );
            if !is_text {
                continue;
            }

            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read document {}", path.display()))?;
            docs.push(Document {
                content,
                source: Some(path.display().to_string()),
            });
        }

        tracing::info!("Loaded {} documents from {}", docs.len(), dir.display());
        Ok(Self { docs })
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn score(content: &str, terms: &[String]) -> usize {
        let haystack = content.to_lowercase();
        terms
            .iter()
            .map(|term| haystack.matches(term.as_str()).count())
            .sum()
    }
}

impl DocumentIndex for KeywordIndex {
    fn search(&self, query: &str, k: usize) -> Vec<Document> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, &Document)> = self
            .docs
            .iter()
            .map(|doc| (Self::score(&doc.content, &terms), doc))
            .filter(|(score, _)| *score > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        scored.into_iter().take(k).map(|(_, doc)| doc.clone()).collect()
    }
}
