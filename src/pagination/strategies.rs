//! Pagination strategy implementations
//!
//! Each strategy handles a specific pagination pattern.

use super::types::{NextPage, PaginationState, Paginator};
use crate::endpoint::{ExtractedPage, PageStyle};
use reqwest::header::HeaderMap;
use tracing::warn;

/// Paginator for a descriptor's paging style
pub fn paginator_for(style: &PageStyle) -> Box<dyn Paginator> {
    match style {
        PageStyle::Single => Box::new(NoPaginator),
        PageStyle::Link => Box::new(LinkHeaderPaginator::default()),
        PageStyle::Cursor { .. } => Box::new(CursorPaginator),
    }
}

// ============================================================================
// Cursor Pagination
// ============================================================================

/// Cursor-based pagination (GraphQL `pageInfo`)
///
/// The extractor pulls `endCursor` / `hasNextPage` out of the payload; this
/// paginator only decides. A page that repeats the cursor it was requested
/// with ends the stream instead of looping.
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorPaginator;

impl Paginator for CursorPaginator {
    fn process_response(
        &self,
        page: &ExtractedPage,
        _headers: &HeaderMap,
        state: &mut PaginationState,
    ) -> NextPage {
        state.add_fetched(page.rows.len() as u64);
        state.next_page();

        let next = match (&page.cursor, page.has_next) {
            (Some(cursor), true) if !cursor.is_empty() => cursor,
            _ => {
                state.mark_done();
                return NextPage::Done;
            }
        };

        if state.cursor.as_deref() == Some(next.as_str()) {
            warn!(cursor = %next, "cursor did not advance, stopping");
            state.mark_done();
            return NextPage::Done;
        }

        state.set_cursor(next.clone());
        NextPage::Cursor(next.clone())
    }
}

// ============================================================================
// Link Header Pagination
// ============================================================================

/// Link header pagination (RFC 5988)
///
/// Parses the Link header to find the next page URL.
/// Format: `<https://api.example.com/items?page=2>; rel="next"`
#[derive(Debug, Clone)]
pub struct LinkHeaderPaginator {
    /// Rel value to follow (default: "next")
    pub rel: String,
}

impl Default for LinkHeaderPaginator {
    fn default() -> Self {
        Self {
            rel: "next".to_string(),
        }
    }
}

impl LinkHeaderPaginator {
    /// Create a new link header paginator
    pub fn new(rel: impl Into<String>) -> Self {
        Self { rel: rel.into() }
    }
}

impl Paginator for LinkHeaderPaginator {
    fn process_response(
        &self,
        page: &ExtractedPage,
        headers: &HeaderMap,
        state: &mut PaginationState,
    ) -> NextPage {
        state.add_fetched(page.rows.len() as u64);
        state.next_page();

        if let Some(link_header) = headers.get("link").and_then(|v| v.to_str().ok()) {
            if let Some(next_url) = parse_link_header(link_header, &self.rel) {
                return NextPage::Url(next_url);
            }
        }

        state.mark_done();
        NextPage::Done
    }
}

/// Parse a Link header and extract the URL for the given rel
pub fn parse_link_header(header: &str, target_rel: &str) -> Option<String> {
    // Link header format: <url>; rel="next", <url>; rel="prev"
    for part in header.split(',') {
        let part = part.trim();
        let mut url = None;
        let mut rel = None;

        for segment in part.split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(stripped) = segment.strip_prefix("rel=") {
                let rel_value = stripped.trim_matches('"').trim_matches('\'');
                rel = Some(rel_value);
            }
        }

        if let (Some(u), Some(r)) = (url, rel) {
            if r.split_whitespace().any(|r| r == target_rel) {
                return Some(u.to_string());
            }
        }
    }

    None
}

// ============================================================================
// No Pagination
// ============================================================================

/// No pagination (single page)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPaginator;

impl Paginator for NoPaginator {
    fn process_response(
        &self,
        page: &ExtractedPage,
        _headers: &HeaderMap,
        state: &mut PaginationState,
    ) -> NextPage {
        state.add_fetched(page.rows.len() as u64);
        state.next_page();
        state.mark_done();
        NextPage::Done
    }
}
