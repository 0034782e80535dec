//! Wikipedia search backend.
//!
//! Uses the MediaWiki action API: one `list=search` call for page titles
//! (retried with the "did you mean" suggestion when one is offered), then one
//! plain-text extract per page, fetched concurrently. Pages are split into
//! passages and scored by lexical overlap with the query.

use crate::backend::SearchBackend;
use crate::chunker::split_into_passages;
use crate::lexical::{coverage, term_set};
use crate::types::{ScoreScale, SearchHit, SearchResults};
use futures::future::join_all;
use ragent_core::{AppError, AppResult};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// English Wikipedia action API.
pub const DEFAULT_WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";

const USER_AGENT: &str = concat!("ragent/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    searchinfo: Option<SearchInfo>,
    #[serde(default)]
    search: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchInfo {
    #[serde(default)]
    suggestion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: Vec<ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    title: String,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    missing: bool,
}

/// Titles and optional spelling suggestion from a search response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TitleSearch {
    pub titles: Vec<String>,
    pub suggestion: Option<String>,
}

/// A fetched article.
#[derive(Debug, Clone, PartialEq)]
pub struct WikiPage {
    pub title: String,
    pub text: String,
}

impl WikiPage {
    /// Document URI used as the prefix of passage source ids.
    pub fn uri(&self) -> String {
        format!("wiki:{}", self.title.replace(' ', "_"))
    }
}

/// Parse a `list=search` response body.
pub fn parse_search_response(body: &str) -> AppResult<TitleSearch> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Retrieval(format!("Malformed Wikipedia search response: {}", e)))?;

    let Some(query) = response.query else {
        return Ok(TitleSearch::default());
    };

    Ok(TitleSearch {
        titles: query.search.into_iter().map(|entry| entry.title).collect(),
        suggestion: query
            .searchinfo
            .and_then(|info| info.suggestion)
            .filter(|s| !s.trim().is_empty()),
    })
}

/// Parse a `prop=extracts` response body. Missing or empty pages yield `None`.
pub fn parse_extract_response(body: &str) -> AppResult<Option<WikiPage>> {
    let response: ExtractResponse = serde_json::from_str(body).map_err(|e| {
        AppError::Retrieval(format!("Malformed Wikipedia extract response: {}", e))
    })?;

    let page = response
        .query
        .and_then(|q| q.pages.into_iter().next())
        .filter(|page| !page.missing)
        .and_then(|page| match page.extract {
            Some(text) if !text.trim().is_empty() => Some(WikiPage {
                title: page.title,
                text,
            }),
            _ => None,
        });

    Ok(page)
}

/// Number of titles to request for `limit` hits: `ceil(limit * 1.8)`.
///
/// Some titles resolve to missing pages or duplicate redirects.
pub fn title_limit(limit: usize) -> usize {
    (limit * 9).div_ceil(5)
}

/// Split pages into passages, drop duplicate passage text and score each one.
///
/// Hits come back best first, at most `limit` of them.
pub fn score_pages(
    query: &str,
    pages: &[WikiPage],
    passage_chars: usize,
    limit: usize,
) -> Vec<SearchHit> {
    let query_terms = term_set(query);
    let mut seen_text = HashSet::new();
    let mut hits = Vec::new();

    for page in pages {
        let uri = page.uri();
        for chunk in split_into_passages(&uri, &page.text, passage_chars) {
            if !seen_text.insert(chunk.text.clone()) {
                continue;
            }
            let terms = term_set(&format!("{} {}", page.title, chunk.text));
            let score = coverage(&query_terms, &terms);
            hits.push(
                SearchHit::new(chunk.source_id, chunk.text, score).with_title(page.title.clone()),
            );
        }
    }

    // Stable sort keeps page order for equal scores
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(limit);
    hits
}

/// Wikipedia via the MediaWiki action API.
#[derive(Debug)]
pub struct WikipediaBackend {
    endpoint: String,
    passage_chars: usize,
    client: reqwest::Client,
}

impl WikipediaBackend {
    pub fn new(
        endpoint: impl Into<String>,
        passage_chars: usize,
        timeout: Duration,
    ) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::Retrieval(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            passage_chars,
            client,
        })
    }

    async fn get(&self, params: &[(&str, &str)]) -> AppResult<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!("Wikipedia request timed out: {}", e))
                } else {
                    AppError::Retrieval(format!("Failed to reach Wikipedia: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Retrieval(format!(
                "Wikipedia returned status {}",
                status
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to read Wikipedia response: {}", e)))
    }

    async fn search_titles(&self, query: &str, limit: usize) -> AppResult<TitleSearch> {
        let limit = limit.to_string();
        let body = self
            .get(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", &limit),
                ("srinfo", "suggestion"),
                ("srprop", ""),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .await?;
        parse_search_response(&body)
    }

    async fn fetch_page(&self, title: &str) -> AppResult<Option<WikiPage>> {
        let body = self
            .get(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("titles", title),
                ("format", "json"),
                ("formatversion", "2"),
            ])
            .await?;
        parse_extract_response(&body)
    }
}

#[async_trait::async_trait]
impl SearchBackend for WikipediaBackend {
    fn name(&self) -> &str {
        "wikipedia"
    }

    fn score_scale(&self) -> ScoreScale {
        ScoreScale::Unit
    }

    async fn search(&self, query: &str, limit: usize) -> AppResult<SearchResults> {
        let wanted = title_limit(limit);
        let mut found = self.search_titles(query, wanted).await?;
        let mut effective_query = query.to_string();

        if let Some(suggestion) = found.suggestion.clone() {
            tracing::info!("Wikipedia suggested \"{}\"", suggestion);
            let retried = self.search_titles(&suggestion, wanted).await?;
            found.titles = retried.titles;
            effective_query = suggestion;
        }

        if found.titles.is_empty() {
            tracing::debug!("No Wikipedia pages for \"{}\"", effective_query);
            return Ok(SearchResults {
                hits: Vec::new(),
                suggestion: found.suggestion,
            });
        }

        let fetches = found.titles.iter().map(|title| self.fetch_page(title));
        let mut pages = Vec::new();
        let mut seen_titles = HashSet::new();
        let mut first_error = None;
        let mut failures = 0;
        for (title, result) in found.titles.iter().zip(join_all(fetches).await) {
            match result {
                Ok(Some(page)) => {
                    if seen_titles.insert(page.title.clone()) {
                        pages.push(page);
                    }
                }
                Ok(None) => tracing::debug!("Skipping empty page {}", title),
                Err(e) => {
                    tracing::warn!("Skipping page {}: {}", title, e);
                    failures += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        // Every page failing is an outage, not an empty result
        if failures == found.titles.len() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }
        // Redirects can collapse several titles onto one page
        pages.truncate(limit);

        let hits = score_pages(&effective_query, &pages, self.passage_chars, limit);
        tracing::debug!(
            "Wikipedia: {} pages, {} passages for \"{}\"",
            pages.len(),
            hits.len(),
            effective_query
        );

        Ok(SearchResults {
            hits,
            suggestion: found.suggestion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_limit_overfetches() {
        assert_eq!(title_limit(1), 2);
        assert_eq!(title_limit(5), 9);
        assert_eq!(title_limit(10), 18);
    }

    #[test]
    fn test_parse_search_response() {
        let body = r#"{
            "batchcomplete": true,
            "query": {
                "searchinfo": {"suggestion": "capital of france"},
                "search": [{"ns": 0, "title": "Paris"}, {"ns": 0, "title": "France"}]
            }
        }"#;

        let parsed = parse_search_response(body).unwrap();
        assert_eq!(parsed.titles, vec!["Paris".to_string(), "France".to_string()]);
        assert_eq!(parsed.suggestion.as_deref(), Some("capital of france"));
    }

    #[test]
    fn test_parse_search_response_without_results() {
        let parsed = parse_search_response(r#"{"batchcomplete": true}"#).unwrap();
        assert!(parsed.titles.is_empty());
        assert!(parsed.suggestion.is_none());
    }

    #[test]
    fn test_parse_malformed_search_response() {
        let err = parse_search_response("<html>busy</html>").unwrap_err();
        assert!(matches!(err, AppError::Retrieval(_)));
    }

    #[test]
    fn test_parse_extract_response() {
        let body = r#"{"query": {"pages": [{"pageid": 22989, "title": "Paris",
            "extract": "Paris is the capital and largest city of France."}]}}"#;

        let page = parse_extract_response(body).unwrap().unwrap();
        assert_eq!(page.title, "Paris");
        assert_eq!(page.uri(), "wiki:Paris");
    }

    #[test]
    fn test_parse_missing_page() {
        let body = r#"{"query": {"pages": [{"title": "Nowhere", "missing": true}]}}"#;
        assert!(parse_extract_response(body).unwrap().is_none());
    }

    #[test]
    fn test_score_pages() {
        let pages = vec![
            WikiPage {
                title: "Berlin".to_string(),
                text: "Berlin is the capital of Germany.".to_string(),
            },
            WikiPage {
                title: "Paris".to_string(),
                text: "Paris is the capital and largest city of France.".to_string(),
            },
            WikiPage {
                title: "Paris (mirror)".to_string(),
                text: "Paris is the capital and largest city of France.".to_string(),
            },
        ];

        let hits = score_pages("capital of France", &pages, 1200, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title.as_deref(), Some("Paris"));
        assert!(hits[0].source_id.starts_with("wiki:Paris#"));
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[1].score, 0.5);
    }

    /// Serves `list=search` with two titles and answers everything else
    /// with `extract_status`.
    async fn stub_server(extract_status: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 8192];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();

                    let (status, body) = if request.contains("list=search") {
                        (
                            "200 OK",
                            r#"{"query":{"search":[{"title":"Paris"},{"title":"France"}]}}"#
                                .to_string(),
                        )
                    } else {
                        (extract_status, String::from("{}"))
                    };
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}/w/api.php", addr)
    }

    #[tokio::test]
    async fn test_all_extracts_failing_is_an_error() {
        let endpoint = stub_server("503 Service Unavailable").await;
        let backend = WikipediaBackend::new(endpoint, 1200, Duration::from_secs(5)).unwrap();

        let err = backend.search("capital of France", 3).await.unwrap_err();
        assert!(matches!(err, AppError::Retrieval(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_missing_pages_are_an_empty_result() {
        let endpoint = stub_server("200 OK").await;
        let backend = WikipediaBackend::new(endpoint, 1200, Duration::from_secs(5)).unwrap();

        let results = backend.search("capital of France", 3).await.unwrap();
        assert!(results.hits.is_empty());
    }

    #[test]
    fn test_page_uri_replaces_spaces() {
        let page = WikiPage {
            title: "Eiffel Tower".to_string(),
            text: String::new(),
        };
        assert_eq!(page.uri(), "wiki:Eiffel_Tower");
    }
}
