//! Pagination module
//!
//! Supports: Link Header (REST), Payload Cursor (GraphQL), Single Page
//!
//! # Overview
//!
//! Each strategy inspects a fetched page and decides whether and how to
//! request the next one. [`PageStream`] drives a strategy against a
//! [`PageFetcher`](crate::http::PageFetcher): one page per call, cancellable
//! between pages, and restartable from a cursor for cursor-paged endpoints.
//!
//! A missing entity is reported by the stream, not raised: `NotFound` or
//! `Empty` on the first page, `Vanished` once pages have already been
//! yielded (those pages stay with the caller).

mod stream;
mod strategies;
mod types;

pub use stream::{call_paginated, PageStream};
pub use strategies::{
    paginator_for, parse_link_header, CursorPaginator, LinkHeaderPaginator, NoPaginator,
};
pub use types::{EndReason, NextPage, Page, PaginationState, Paginator, Step};

#[cfg(test)]
mod tests;
