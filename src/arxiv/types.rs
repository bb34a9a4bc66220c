use chrono::{DateTime, Utc};

/// One search result as returned by the arXiv API.
#[derive(Debug, Clone, PartialEq)]
pub struct Paper {
    /// Versioned identifier, e.g. `http://arxiv.org/abs/2401.00001v2`.
    pub entry_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub link: String,
}

/// A single page of results from `GET /api/query`.
#[derive(Debug, Default)]
pub struct Page {
    pub papers: Vec<Paper>,
    /// `opensearch:totalResults`, when the feed reports it.
    pub total_results: Option<usize>,
}
