//! arXiv search API client: paged Atom queries exposed as a lazy stream of papers.

mod feed;
pub mod types;

#[cfg(test)]
pub(crate) use feed::{atom_entry, atom_feed};

use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::{self, Stream};
use reqwest::Client;
use tracing::{debug, warn};

use types::{Page, Paper};

const API_BASE: &str = "https://export.arxiv.org/api/query";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ArxivError {
    #[error("arXiv API error ({code}): {message}")]
    Status { code: u16, message: String },

    #[error("arXiv rejected the query: {0}")]
    Api(String),

    #[error("malformed arXiv feed: {0}")]
    Feed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// One page of search results, sorted by last-updated date, newest first.
///
/// Implemented by `ArxivClient` for production; mock implementations used in tests.
pub trait PaperFeed {
    async fn page(&self, query: &str, start: usize, max_results: usize)
    -> Result<Page, ArxivError>;
}

#[derive(Clone)]
pub struct ArxivClient {
    http: Client,
    base_url: String,
}

impl ArxivClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            base_url: API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }

    fn query_url(&self, query: &str, start: usize, max_results: usize) -> Result<url::Url, ArxivError> {
        let mut url = url::Url::parse(&self.base_url)?;
        url.query_pairs_mut()
            .append_pair("search_query", query)
            .append_pair("start", &start.to_string())
            .append_pair("max_results", &max_results.to_string())
            .append_pair("sortBy", "lastUpdatedDate")
            .append_pair("sortOrder", "descending");
        Ok(url)
    }
}

impl PaperFeed for ArxivClient {
    async fn page(
        &self,
        query: &str,
        start: usize,
        max_results: usize,
    ) -> Result<Page, ArxivError> {
        let url = self.query_url(query, start, max_results)?;
        let response = self
            .http
            .get(url)
            .header("User-Agent", crate::USER_AGENT)
            .header("Accept", "application/atom+xml")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(200).collect();
            warn!(status = %status, "arXiv API error");
            return Err(ArxivError::Status {
                code: status.as_u16(),
                message: format!("HTTP {status}: {snippet}"),
            });
        }

        let body = response.text().await?;
        let page = feed::parse_page(&body)?;
        debug!(start, count = page.papers.len(), total = ?page.total_results, "arXiv page fetched");
        Ok(page)
    }
}

struct Cursor<'a, F> {
    feed: &'a F,
    query: &'a str,
    page_size: usize,
    page_delay: Duration,
    next_start: usize,
    buffered: VecDeque<Paper>,
    exhausted: bool,
}

/// Lazily walk every result for `query`, fetching a page only when the buffer runs dry.
///
/// Dropping the stream stops all further requests.
pub fn papers<'a, F: PaperFeed>(
    feed: &'a F,
    query: &'a str,
    page_size: usize,
    page_delay: Duration,
) -> impl Stream<Item = Result<Paper, ArxivError>> + 'a {
    let cursor = Cursor {
        feed,
        query,
        page_size: page_size.max(1),
        page_delay,
        next_start: 0,
        buffered: VecDeque::new(),
        exhausted: false,
    };

    stream::try_unfold(cursor, next_paper)
}

async fn next_paper<F: PaperFeed>(
    mut cur: Cursor<'_, F>,
) -> Result<Option<(Paper, Cursor<'_, F>)>, ArxivError> {
    loop {
        if let Some(paper) = cur.buffered.pop_front() {
            return Ok(Some((paper, cur)));
        }
        if cur.exhausted {
            return Ok(None);
        }
        if cur.next_start > 0 && !cur.page_delay.is_zero() {
            tokio::time::sleep(cur.page_delay).await;
        }

        let page = cur.feed.page(cur.query, cur.next_start, cur.page_size).await?;
        let count = page.papers.len();
        // With a reported total, short pages are not the end; only an empty page
        // short of the total is, and that means the listing is inconsistent.
        match page.total_results {
            Some(total) if count == 0 && cur.next_start < total => {
                return Err(ArxivError::Feed(format!(
                    "unexpected empty page at offset {} of {total} results",
                    cur.next_start
                )));
            }
            Some(total) => {
                cur.next_start += count;
                cur.exhausted = cur.next_start >= total;
            }
            None => {
                cur.next_start += count;
                cur.exhausted = count < cur.page_size;
            }
        }
        cur.buffered.extend(page.papers);
    }
}
