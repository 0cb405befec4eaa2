//! Pagination types and traits
//!
//! Defines the core pagination abstractions used by all strategies.

use crate::endpoint::ExtractedPage;
use crate::types::Row;
use reqwest::header::HeaderMap;

/// Result of the next page computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// Follow an absolute next-page URL
    Url(String),
    /// Re-issue the request with this cursor
    Cursor(String),
    /// No more pages
    Done,
}

impl NextPage {
    /// Check if this is a done result
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Check if this is a continue result
    pub fn is_continue(&self) -> bool {
        !self.is_done()
    }
}

/// Tracks pagination state during iteration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    /// Pages processed so far
    pub page: u32,
    /// Cursor to request the next page with (cursor style)
    pub cursor: Option<String>,
    /// Total records fetched so far
    pub total_fetched: u64,
    /// Is pagination complete?
    pub done: bool,
}

impl PaginationState {
    /// Create a new pagination state
    pub fn new() -> Self {
        Self::default()
    }

    /// State that continues after a previously returned cursor
    pub fn resuming(cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            ..Self::default()
        }
    }

    /// Mark pagination as complete
    pub fn mark_done(&mut self) {
        self.done = true;
    }

    /// Count a processed page
    pub fn next_page(&mut self) {
        self.page += 1;
    }

    /// Set cursor
    pub fn set_cursor(&mut self, cursor: String) {
        self.cursor = Some(cursor);
    }

    /// Add to total fetched
    pub fn add_fetched(&mut self, count: u64) {
        self.total_fetched += count;
    }
}

/// Core trait for pagination strategies
pub trait Paginator: Send + Sync {
    /// Process an extracted page and decide what comes next
    fn process_response(
        &self,
        page: &ExtractedPage,
        headers: &HeaderMap,
        state: &mut PaginationState,
    ) -> NextPage;
}

/// One page handed to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based position within this stream
    pub number: u32,
    /// Records on the page
    pub rows: Vec<Row>,
    /// Cursor that resumes right after this page, when more pages follow
    /// and the endpoint is cursor-paged
    pub cursor: Option<String>,
}

/// Why a stream stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The last page said there is nothing more
    Exhausted,
    /// The first request found no such entity
    NotFound,
    /// The entity is absent or empty on the first page
    Empty,
    /// The entity disappeared after `pages` pages were already yielded
    Vanished {
        /// Pages yielded before it disappeared
        pages: u32,
    },
}

impl EndReason {
    /// Whether the stream yielded pages that are now incomplete
    pub fn is_partial(self) -> bool {
        matches!(self, Self::Vanished { .. })
    }
}

/// One step of a page stream
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// A page of results
    Page(Page),
    /// The stream is over; further calls keep returning this
    End(EndReason),
}
