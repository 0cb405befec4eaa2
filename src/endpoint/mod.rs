//! Endpoint descriptors
//!
//! An endpoint descriptor is the pluggable part of a harvest: URL template,
//! method, static query, paging style and a pure extractor from a raw JSON
//! page to rows. The core (token pool, executor, pagination, harvester) only
//! ever sees descriptors.
//!
//! # Overview
//!
//! - `EndpointDescriptor` - one logical call, built with a small builder API
//! - `TargetKind` - how target identifiers are validated and normalized
//! - `PageStyle` - single response, `Link` header, or payload cursor
//! - `catalog()` / `find()` - the built-in GitHub v3/v4 endpoints

mod catalog;
mod types;

pub use catalog::{
    catalog, extract_commits_v4, extract_issues, extract_issues_v4, extract_labels, extract_list,
    extract_object, extract_repo_info, extract_search_items, extract_topics, find,
};
pub use types::{EndpointDescriptor, ExtractedPage, Extractor, PageStyle, TargetKind};
