//! Tests for pagination module

use super::*;
use crate::endpoint::{extract_list, EndpointDescriptor, ExtractedPage, PageStyle, TargetKind};
use crate::error::{Error, Result};
use crate::http::{ApiResponse, Fetched, PageFetcher, PreparedRequest};
use crate::template::TargetArgs;
use crate::types::{JsonValue, Row};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;

// ============================================================================
// Fixtures
// ============================================================================

/// Replays canned responses in order and records every request
#[derive(Default)]
struct ScriptedFetcher {
    responses: Mutex<VecDeque<Result<Fetched>>>,
    requests: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedFetcher {
    fn new(responses: Vec<Result<Fetched>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, request: &PreparedRequest) -> Result<Fetched> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected request to {}", request.url))
    }
}

/// Serves a three-page cursor sequence keyed by the requested cursor
struct CursorServer;

#[async_trait]
impl PageFetcher for CursorServer {
    async fn fetch(&self, request: &PreparedRequest) -> Result<Fetched> {
        let cursor = request
            .body
            .as_ref()
            .and_then(|body| body["variables"]["cursor"].as_str().map(ToString::to_string));
        let body = match cursor.as_deref() {
            None => json!({"items": [{"n": 1}, {"n": 2}], "end": "c1", "more": true}),
            Some("c1") => json!({"items": [{"n": 3}, {"n": 4}], "end": "c2", "more": true}),
            Some("c2") => json!({"items": [{"n": 5}], "end": "c3", "more": false}),
            Some(other) => panic!("unknown cursor {other}"),
        };
        Ok(found(body, HeaderMap::new()))
    }
}

fn found(body: JsonValue, headers: HeaderMap) -> Fetched {
    Fetched::Found(ApiResponse {
        status: 200,
        headers,
        body,
        url: String::new(),
    })
}

fn rows(start: usize, count: usize) -> JsonValue {
    JsonValue::Array((start..start + count).map(|id| json!({"id": id})).collect())
}

fn link_headers(next: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "link",
        HeaderValue::from_str(&format!(
            "<{next}>; rel=\"next\", <https://api.github.com/repositories/1/issues?page=3>; rel=\"last\""
        ))
        .unwrap(),
    );
    headers
}

fn extract_items(body: &JsonValue) -> Result<ExtractedPage> {
    if body.is_null() {
        return Ok(ExtractedPage::absent());
    }
    let items = body["items"]
        .as_array()
        .ok_or_else(|| Error::schema("no items"))?;
    let rows = items.iter().filter_map(|i| i.as_object().cloned()).collect();
    Ok(ExtractedPage::rows(rows).with_continuation(
        body["end"].as_str().map(ToString::to_string),
        body["more"].as_bool().unwrap_or(false),
    ))
}

fn link_endpoint() -> EndpointDescriptor {
    EndpointDescriptor::get("issues", "repos/{{ repository }}/issues", TargetKind::Repository, extract_list)
        .query("state", "all")
}

fn cursor_endpoint() -> EndpointDescriptor {
    EndpointDescriptor::graphql(
        "items_v4",
        "query ($cursor: String) { items }",
        json!({"owner": "{{ owner }}", "cursor": "{{ cursor }}"}),
        TargetKind::Repository,
        extract_items,
    )
}

fn numbers(rows: &[Row]) -> Vec<i64> {
    rows.iter().filter_map(|r| r["n"].as_i64()).collect()
}

// ============================================================================
// Paginators
// ============================================================================

#[test]
fn test_parse_link_header() {
    let header = r#"<https://api.github.com/repositories/1/issues?page=2>; rel="next", <https://api.github.com/repositories/1/issues?page=5>; rel="last""#;
    assert_eq!(
        parse_link_header(header, "next"),
        Some("https://api.github.com/repositories/1/issues?page=2".to_string())
    );
    assert_eq!(
        parse_link_header(header, "last"),
        Some("https://api.github.com/repositories/1/issues?page=5".to_string())
    );
    assert_eq!(parse_link_header(header, "prev"), None);
    assert_eq!(parse_link_header("", "next"), None);
}

#[test]
fn test_link_header_paginator_continues() {
    let paginator = LinkHeaderPaginator::default();
    let mut state = PaginationState::new();
    let page = ExtractedPage::rows(vec![Row::new(); 3]);

    let next = paginator.process_response(&page, &link_headers("https://x/issues?page=2"), &mut state);
    assert_eq!(next, NextPage::Url("https://x/issues?page=2".to_string()));
    assert_eq!(state.total_fetched, 3);
    assert_eq!(state.page, 1);
    assert!(!state.done);
}

#[test]
fn test_link_header_paginator_stops_without_next() {
    let paginator = LinkHeaderPaginator::default();
    let mut state = PaginationState::new();
    let mut headers = HeaderMap::new();
    headers.insert(
        "link",
        HeaderValue::from_static(r#"<https://x/issues?page=1>; rel="first""#),
    );

    let next = paginator.process_response(&ExtractedPage::rows(vec![]), &headers, &mut state);
    assert!(next.is_done());
    assert!(state.done);

    let next = paginator.process_response(&ExtractedPage::rows(vec![]), &HeaderMap::new(), &mut state);
    assert!(next.is_done());
}

#[test]
fn test_cursor_paginator() {
    let paginator = CursorPaginator;
    let mut state = PaginationState::new();

    let page = ExtractedPage::rows(vec![Row::new()]).with_continuation(Some("c1".into()), true);
    let next = paginator.process_response(&page, &HeaderMap::new(), &mut state);
    assert_eq!(next, NextPage::Cursor("c1".to_string()));
    assert_eq!(state.cursor.as_deref(), Some("c1"));

    let last = ExtractedPage::rows(vec![Row::new()]).with_continuation(Some("c2".into()), false);
    assert!(paginator
        .process_response(&last, &HeaderMap::new(), &mut state)
        .is_done());
    assert_eq!(state.total_fetched, 2);
    assert!(state.done);
}

#[test]
fn test_cursor_paginator_stops_on_repeated_cursor() {
    let paginator = CursorPaginator;
    let mut state = PaginationState::resuming("same");
    let page = ExtractedPage::rows(vec![]).with_continuation(Some("same".into()), true);
    assert!(paginator
        .process_response(&page, &HeaderMap::new(), &mut state)
        .is_done());
}

#[test]
fn test_no_paginator() {
    let mut state = PaginationState::new();
    let next = NoPaginator.process_response(
        &ExtractedPage::rows(vec![Row::new()]),
        &link_headers("https://x/next"),
        &mut state,
    );
    assert!(next.is_done());
    assert_eq!(state.total_fetched, 1);
}

#[test]
fn test_paginator_for_style() {
    let mut state = PaginationState::new();
    let next = paginator_for(&PageStyle::Link).process_response(
        &ExtractedPage::rows(vec![]),
        &link_headers("https://x/next"),
        &mut state,
    );
    assert!(next.is_continue());
}

// ============================================================================
// Link-paged streams
// ============================================================================

#[tokio::test]
async fn test_link_stream_three_pages() {
    let fetcher = ScriptedFetcher::new(vec![
        Ok(found(rows(0, 10), link_headers("https://api.github.com/repositories/1/issues?state=all&page=2"))),
        Ok(found(rows(10, 10), link_headers("https://api.github.com/repositories/1/issues?state=all&page=3"))),
        Ok(found(rows(20, 4), HeaderMap::new())),
    ]);
    let endpoint = link_endpoint();
    let mut stream = PageStream::for_target(&fetcher, &endpoint, "a/b").unwrap();

    let mut sizes = Vec::new();
    let mut total = 0;
    let reason = loop {
        match stream.next().await.unwrap() {
            Step::Page(page) => {
                assert_eq!(page.number as usize, sizes.len() + 1);
                assert!(page.cursor.is_none());
                sizes.push(page.rows.len());
                total += page.rows.len();
            }
            Step::End(reason) => break reason,
        }
    };

    assert_eq!(sizes, vec![10, 10, 4]);
    assert_eq!(total, 24);
    assert_eq!(reason, EndReason::Exhausted);
    assert_eq!(stream.next().await.unwrap(), Step::End(EndReason::Exhausted));

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].url, "repos/a/b/issues");
    assert_eq!(requests[0].query, vec![("state".to_string(), "all".to_string())]);
    assert_eq!(
        requests[1].url,
        "https://api.github.com/repositories/1/issues?state=all&page=2"
    );
    assert!(requests[1].query.is_empty());
}

#[tokio::test]
async fn test_not_found_on_first_page() {
    let fetcher = ScriptedFetcher::new(vec![Ok(Fetched::NotFound)]);
    let endpoint = link_endpoint();
    let (rows, reason) = PageStream::for_target(&fetcher, &endpoint, "gone/repo")
        .unwrap()
        .collect_rows()
        .await
        .unwrap();

    assert!(rows.is_empty());
    assert_eq!(reason, EndReason::NotFound);
}

#[tokio::test]
async fn test_vanished_keeps_earlier_pages() {
    let fetcher = ScriptedFetcher::new(vec![
        Ok(found(rows(0, 10), link_headers("https://api.github.com/repositories/1/issues?page=2"))),
        Ok(Fetched::NotFound),
    ]);
    let endpoint = link_endpoint();
    let (rows, reason) = PageStream::for_target(&fetcher, &endpoint, "a/b")
        .unwrap()
        .collect_rows()
        .await
        .unwrap();

    assert_eq!(rows.len(), 10);
    assert_eq!(reason, EndReason::Vanished { pages: 1 });
    assert!(reason.is_partial());
}

#[tokio::test]
async fn test_empty_listing_is_one_empty_page() {
    let fetcher = ScriptedFetcher::new(vec![Ok(found(json!([]), HeaderMap::new()))]);
    let endpoint = link_endpoint();
    let mut stream = PageStream::for_target(&fetcher, &endpoint, "a/b").unwrap();

    match stream.next().await.unwrap() {
        Step::Page(page) => assert!(page.rows.is_empty()),
        Step::End(reason) => panic!("expected an empty page, got {reason:?}"),
    }
    assert_eq!(stream.next().await.unwrap(), Step::End(EndReason::Exhausted));
}

#[tokio::test]
async fn test_error_leaves_stream_retryable() {
    let fetcher = ScriptedFetcher::new(vec![
        Ok(found(rows(0, 2), link_headers("https://api.github.com/repositories/1/issues?page=2"))),
        Err(Error::TransientExhausted {
            url: "page2".to_string(),
            attempts: 3,
            cause: "HTTP 502".to_string(),
        }),
        Ok(found(rows(2, 1), HeaderMap::new())),
    ]);
    let endpoint = link_endpoint();
    let mut stream = PageStream::for_target(&fetcher, &endpoint, "a/b").unwrap();

    assert!(matches!(stream.next().await.unwrap(), Step::Page(_)));
    assert!(stream.next().await.is_err());
    match stream.next().await.unwrap() {
        Step::Page(page) => assert_eq!(page.number, 2),
        Step::End(reason) => panic!("expected page 2, got {reason:?}"),
    }

    let requests = fetcher.requests();
    assert_eq!(requests[1].url, requests[2].url);
}

#[tokio::test]
async fn test_schema_error_propagates() {
    let fetcher = ScriptedFetcher::new(vec![Ok(found(json!({"message": "?"}), HeaderMap::new()))]);
    let endpoint = link_endpoint();
    let result = PageStream::for_target(&fetcher, &endpoint, "a/b")
        .unwrap()
        .collect_rows()
        .await;
    assert!(matches!(result, Err(Error::UpstreamSchema { .. })));
}

#[tokio::test]
async fn test_link_stream_cannot_resume() {
    let fetcher = ScriptedFetcher::default();
    let endpoint = link_endpoint();
    let result = call_paginated(&fetcher, &endpoint, TargetArgs::repository("a/b")).resume_from("c1");
    assert!(matches!(result, Err(Error::Config { .. })));
}

#[test]
fn test_invalid_target_is_rejected_up_front() {
    let fetcher = ScriptedFetcher::default();
    let endpoint = link_endpoint();
    assert!(matches!(
        PageStream::for_target(&fetcher, &endpoint, "not a repo"),
        Err(Error::InvalidTarget { .. })
    ));
}

// ============================================================================
// Cursor-paged streams
// ============================================================================

#[tokio::test]
async fn test_cursor_stream_full_run() {
    let endpoint = cursor_endpoint();
    let mut stream = call_paginated(&CursorServer, &endpoint, TargetArgs::repository("a/b"));

    let mut cursors = Vec::new();
    let mut all = Vec::new();
    while let Step::Page(page) = stream.next().await.unwrap() {
        cursors.push(page.cursor.clone());
        all.extend(page.rows);
    }

    assert_eq!(numbers(&all), vec![1, 2, 3, 4, 5]);
    assert_eq!(
        cursors,
        vec![Some("c1".to_string()), Some("c2".to_string()), None]
    );
    assert_eq!(stream.state().total_fetched, 5);
}

#[tokio::test]
async fn test_cursor_resume_is_idempotent() {
    let endpoint = cursor_endpoint();

    let expected_after = [("c1", vec![3, 4, 5]), ("c2", vec![5])];
    for (cursor, expected) in expected_after {
        let (rows, reason) = call_paginated(&CursorServer, &endpoint, TargetArgs::repository("a/b"))
            .resume_from(cursor)
            .unwrap()
            .collect_rows()
            .await
            .unwrap();
        assert_eq!(numbers(&rows), expected, "resuming from {cursor}");
        assert_eq!(reason, EndReason::Exhausted);
    }
}

#[tokio::test]
async fn test_cursor_stream_absent_entity() {
    let endpoint = cursor_endpoint();

    let fetcher = ScriptedFetcher::new(vec![Ok(found(JsonValue::Null, HeaderMap::new()))]);
    let (rows, reason) = call_paginated(&fetcher, &endpoint, TargetArgs::repository("a/b"))
        .collect_rows()
        .await
        .unwrap();
    assert!(rows.is_empty());
    assert_eq!(reason, EndReason::Empty);

    let fetcher = ScriptedFetcher::new(vec![
        Ok(found(json!({"items": [{"n": 1}], "end": "c1", "more": true}), HeaderMap::new())),
        Ok(found(JsonValue::Null, HeaderMap::new())),
    ]);
    let (rows, reason) = call_paginated(&fetcher, &endpoint, TargetArgs::repository("a/b"))
        .collect_rows()
        .await
        .unwrap();
    assert_eq!(numbers(&rows), vec![1]);
    assert_eq!(reason, EndReason::Vanished { pages: 1 });
}

#[tokio::test]
async fn test_cursor_passed_as_variable() {
    let endpoint = cursor_endpoint();
    let fetcher = ScriptedFetcher::new(vec![
        Ok(found(json!({"items": [], "end": "c1", "more": true}), HeaderMap::new())),
        Ok(found(json!({"items": [], "end": null, "more": false}), HeaderMap::new())),
    ]);
    call_paginated(&fetcher, &endpoint, TargetArgs::repository("a/b"))
        .collect_rows()
        .await
        .unwrap();

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 2);
    let body = |i: usize| requests[i].body.clone().unwrap();
    assert_eq!(body(0)["variables"]["cursor"], JsonValue::Null);
    assert_eq!(body(1)["variables"]["cursor"], "c1");
    assert_eq!(body(1)["variables"]["owner"], "a");
}
