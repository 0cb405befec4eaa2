//! Tests for the harvest loop

use super::*;
use crate::endpoint::{extract_list, extract_object, EndpointDescriptor, ExtractedPage, PageStyle, TargetKind};
use crate::error::{Error, Result};
use crate::http::{ApiResponse, Fetched, PageFetcher, PreparedRequest};
use crate::output::MemorySink;
use crate::shutdown::{ShutdownCoordinator, SharedShutdown};
use crate::state::StateManager;
use crate::types::JsonValue;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ============================================================================
// Fixtures
// ============================================================================

type Handler = dyn Fn(&PreparedRequest) -> Result<Fetched> + Send + Sync;

/// Answers every request through a closure and records what was asked
struct RouteFetcher {
    handler: Box<Handler>,
    requests: Mutex<Vec<PreparedRequest>>,
}

impl RouteFetcher {
    fn new(handler: impl Fn(&PreparedRequest) -> Result<Fetched> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for RouteFetcher {
    async fn fetch(&self, request: &PreparedRequest) -> Result<Fetched> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(request)
    }
}

fn found(body: JsonValue) -> Fetched {
    found_with(body, HeaderMap::new())
}

fn found_with(body: JsonValue, headers: HeaderMap) -> Fetched {
    Fetched::Found(ApiResponse {
        status: 200,
        headers,
        body,
        url: String::new(),
    })
}

fn next_link(url: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "link",
        HeaderValue::from_str(&format!("<{url}>; rel=\"next\"")).unwrap(),
    );
    headers
}

fn cursor_of(request: &PreparedRequest) -> Option<String> {
    request
        .body
        .as_ref()
        .and_then(|b| b["variables"]["cursor"].as_str().map(ToString::to_string))
}

fn owner_of(request: &PreparedRequest) -> String {
    request
        .body
        .as_ref()
        .and_then(|b| b["variables"]["owner"].as_str().map(ToString::to_string))
        .unwrap_or_default()
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

/// One row per repository
fn info_endpoint() -> EndpointDescriptor {
    EndpointDescriptor::get("info", "repos/{{ repository }}", TargetKind::Repository, extract_object)
        .paging(PageStyle::Single)
        .tag_target("repository")
}

/// Link-paged listing
fn list_endpoint() -> EndpointDescriptor {
    EndpointDescriptor::get("items", "repos/{{ repository }}/items", TargetKind::Repository, extract_list)
        .tag_target("repository")
}

/// Cursor-paged listing
fn cursor_endpoint() -> EndpointDescriptor {
    EndpointDescriptor::graphql(
        "items_v4",
        "query ($owner: String!, $cursor: String) { items }",
        json!({"owner": "{{ owner }}", "cursor": "{{ cursor }}"}),
        TargetKind::Repository,
        extract_items,
    )
    .tag_target("repository")
}

/// Three cursor pages: n=1,2 then 3,4 then 5
fn cursor_page(cursor: Option<&str>) -> Fetched {
    let body = match cursor {
        None => json!({"items": [{"n": 1}, {"n": 2}], "end": "c1", "more": true}),
        Some("c1") => json!({"items": [{"n": 3}, {"n": 4}], "end": "c2", "more": true}),
        Some("c2") => json!({"items": [{"n": 5}], "end": "c3", "more": false}),
        Some(other) => panic!("unknown cursor {other}"),
    };
    found(body)
}

fn targets(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn config(batch_size: usize) -> HarvestConfig {
    HarvestConfig::new("out/rows.csv")
        .with_batch_size(batch_size)
        .with_probe_on_start(false)
}

fn harvester(fetcher: Arc<RouteFetcher>, sink: &Arc<MemorySink>, batch_size: usize) -> Harvester {
    Harvester::with_fetcher(fetcher, sink.clone(), config(batch_size))
}

fn written(sink: &MemorySink) -> Vec<JsonValue> {
    sink.rows(Path::new("out/rows.csv"))
        .into_iter()
        .map(JsonValue::Object)
        .collect()
}

// ============================================================================
// Config and report
// ============================================================================

#[test]
fn test_config_defaults() {
    let config = HarvestConfig::new("rows.csv");
    assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    assert_eq!(config.sync_window, DEFAULT_SYNC_WINDOW);
    assert!(config.probe_on_start);
    assert_eq!(HarvestConfig::new("x").with_batch_size(0).batch_size, 1);
}

#[test]
fn test_target_state_terminal() {
    assert!(!TargetState::Pending.is_terminal());
    assert!(!TargetState::Paginating.is_terminal());
    assert!(TargetState::Done.is_terminal());
    assert!(TargetState::Skipped.is_terminal());
    assert!(TargetState::Failed.is_terminal());
    assert_eq!(TargetState::Paginating.to_string(), "paginating");
}

// ============================================================================
// Outcomes
// ============================================================================

#[tokio::test]
async fn test_rows_flush_every_batch() {
    let fetcher = RouteFetcher::new(|req| {
        let name = req.url.trim_start_matches("repos/");
        Ok(found(json!({"full_name": name, "stars": 1})))
    });
    let sink = Arc::new(MemorySink::new());
    let report = harvester(fetcher.clone(), &sink, 2)
        .run(&info_endpoint(), &targets(&["a/one", "a/two", "a/three", "a/four", "a/five"]))
        .await
        .unwrap();

    assert_eq!(report.done().count(), 5);
    assert_eq!(report.rows_written, 5);
    assert_eq!(report.flushes, 3);
    assert_eq!(sink.appends(), 3);
    assert!(report.is_clean());

    let rows = written(&sink);
    assert_eq!(rows[0]["repository"], "a/one");
    assert_eq!(rows[4]["repository"], "a/five");
    assert_eq!(
        rows[0].as_object().unwrap().keys().next().map(String::as_str),
        Some("repository")
    );
}

#[tokio::test]
async fn test_not_found_is_skipped_with_no_rows() {
    let fetcher = RouteFetcher::new(|req| {
        if req.url.ends_with("gone") {
            Ok(Fetched::NotFound)
        } else {
            Ok(found(json!({"id": 1})))
        }
    });
    let sink = Arc::new(MemorySink::new());
    let report = harvester(fetcher, &sink, 10)
        .run(&info_endpoint(), &targets(&["a/gone", "a/here"]))
        .await
        .unwrap();

    let skipped: Vec<_> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].target, "a/gone");
    assert_eq!(skipped[0].rows, 0);
    assert_eq!(skipped[0].pages, 0);
    assert_eq!(written(&sink).len(), 1);
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_empty_target_is_done_not_failed() {
    let fetcher = RouteFetcher::new(|_| Ok(found(json!([]))));
    let sink = Arc::new(MemorySink::new());
    let report = harvester(fetcher, &sink, 10)
        .run(&list_endpoint(), &targets(&["a/quiet"]))
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].state, TargetState::Done);
    assert_eq!(report.outcomes[0].rows, 0);
    assert_eq!(report.rows_written, 0);
    assert_eq!(sink.appends(), 0);
}

#[tokio::test]
async fn test_failed_target_does_not_stop_the_run() {
    let fetcher = RouteFetcher::new(|req| {
        if req.url.ends_with("flaky") {
            Err(Error::TransientExhausted {
                url: req.url.clone(),
                attempts: 3,
                cause: "HTTP 502".to_string(),
            })
        } else if req.url.ends_with("odd") {
            Ok(found(json!("not an object")))
        } else {
            Ok(found(json!({"id": 1})))
        }
    });
    let sink = Arc::new(MemorySink::new());
    let state = StateManager::in_memory();
    let report = harvester(fetcher, &sink, 10)
        .with_state(state.clone())
        .run(&info_endpoint(), &targets(&["a/flaky", "a/odd", "a/fine"]))
        .await
        .unwrap();

    let failed: Vec<_> = report.failed().map(|o| o.target.as_str()).collect();
    assert_eq!(failed, vec!["a/flaky", "a/odd"]);
    assert!(matches!(
        report.outcomes[0].error,
        Some(Error::TransientExhausted { attempts: 3, .. })
    ));
    assert!(matches!(report.outcomes[1].error, Some(Error::UpstreamSchema { .. })));
    assert_eq!(report.done().count(), 1);
    assert!(!report.is_clean());

    assert!(state.is_target_completed("info", "a/fine").await);
    assert!(!state.is_target_completed("info", "a/flaky").await);
}

#[tokio::test]
async fn test_invalid_and_duplicate_targets() {
    let fetcher = RouteFetcher::new(|_| Ok(found(json!({"id": 1}))));
    let sink = Arc::new(MemorySink::new());
    let report = harvester(fetcher.clone(), &sink, 10)
        .run(
            &info_endpoint(),
            &targets(&["Owner/Repo", "not-a-repo", "https://github.com/owner/repo"]),
        )
        .await
        .unwrap();

    assert_eq!(fetcher.count(), 1);
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.outcomes[0].target, "owner/repo");
    assert_eq!(report.outcomes[1].state, TargetState::Failed);
    assert!(matches!(report.outcomes[1].error, Some(Error::InvalidTarget { .. })));
}

#[tokio::test]
async fn test_link_pages_are_concatenated() {
    let fetcher = RouteFetcher::new(|req| match req.url.as_str() {
        "repos/a/b/items" => Ok(found_with(
            json!([{"id": 1}, {"id": 2}]),
            next_link("https://api.github.com/repositories/9/items?page=2"),
        )),
        "https://api.github.com/repositories/9/items?page=2" => Ok(found(json!([{"id": 3}]))),
        other => panic!("unexpected {other}"),
    });
    let sink = Arc::new(MemorySink::new());
    let report = harvester(fetcher, &sink, 10)
        .run(&list_endpoint(), &targets(&["a/b"]))
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].pages, 2);
    assert_eq!(report.outcomes[0].rows, 3);
    let ids: Vec<_> = written(&sink).iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
}

#[tokio::test]
async fn test_vanished_target_keeps_fetched_pages() {
    let fetcher = RouteFetcher::new(|req| match req.url.as_str() {
        "repos/a/b/items" => Ok(found_with(
            json!([{"id": 1}, {"id": 2}]),
            next_link("https://api.github.com/repositories/9/items?page=2"),
        )),
        _ => Ok(Fetched::NotFound),
    });
    let sink = Arc::new(MemorySink::new());
    let report = harvester(fetcher, &sink, 10)
        .run(&list_endpoint(), &targets(&["a/b"]))
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.state, TargetState::Done);
    assert!(outcome.partial);
    assert_eq!(outcome.rows, 2);
    assert_eq!(written(&sink).len(), 2);
}

#[tokio::test]
async fn test_fatal_error_flushes_then_stops() {
    let fetcher = RouteFetcher::new(|req| {
        if req.url.ends_with("second") {
            Err(Error::NoUsableTokens)
        } else {
            Ok(found(json!({"id": 1})))
        }
    });
    let sink = Arc::new(MemorySink::new());
    let state = StateManager::in_memory();
    let result = harvester(fetcher.clone(), &sink, 10)
        .with_state(state.clone())
        .run(&info_endpoint(), &targets(&["a/first", "a/second", "a/third"]))
        .await;

    assert!(matches!(result, Err(Error::NoUsableTokens)));
    assert_eq!(fetcher.count(), 2);
    assert_eq!(written(&sink).len(), 1);
    assert!(state.is_target_completed("info", "a/first").await);
    assert!(!state.is_target_completed("info", "a/second").await);
}

// ============================================================================
// Checkpoints and cancellation
// ============================================================================

#[tokio::test]
async fn test_completed_targets_are_not_refetched() {
    let fetcher = RouteFetcher::new(|_| Ok(found(json!({"id": 1}))));
    let sink = Arc::new(MemorySink::new());
    let state = StateManager::in_memory();
    let endpoint = info_endpoint();

    harvester(fetcher.clone(), &sink, 1)
        .with_state(state.clone())
        .run(&endpoint, &targets(&["a/b", "c/d"]))
        .await
        .unwrap();
    assert_eq!(fetcher.count(), 2);

    let report = harvester(fetcher.clone(), &sink, 1)
        .with_state(state)
        .run(&endpoint, &targets(&["a/b", "c/d", "e/f"]))
        .await
        .unwrap();

    assert_eq!(report.resumed, 2);
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(fetcher.count(), 3);
    assert_eq!(fetcher.urls().last().map(String::as_str), Some("repos/e/f"));
}

#[tokio::test]
async fn test_failed_cursor_target_checkpoints_its_position() {
    let fetcher = RouteFetcher::new(|req| match cursor_of(req).as_deref() {
        Some("c1") => Err(Error::TransientExhausted {
            url: "graphql".to_string(),
            attempts: 3,
            cause: "HTTP 502".to_string(),
        }),
        other => Ok(cursor_page(other)),
    });
    let sink = Arc::new(MemorySink::new());
    let state = StateManager::in_memory();
    let report = harvester(fetcher, &sink, 10)
        .with_state(state.clone())
        .run(&cursor_endpoint(), &targets(&["a/b"]))
        .await
        .unwrap();

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.state, TargetState::Failed);
    assert!(outcome.partial);
    assert_eq!(outcome.rows, 2);
    assert_eq!(written(&sink).len(), 2);
    assert_eq!(state.get_cursor("items_v4", "a/b").await, Some("c1".to_string()));
    assert!(!state.is_target_completed("items_v4", "a/b").await);
}

#[tokio::test]
async fn test_cancelled_cursor_target_resumes_without_duplicates() {
    let shutdown: SharedShutdown = ShutdownCoordinator::shared();
    let trigger = shutdown.clone();
    let fetcher = RouteFetcher::new(move |req| {
        let cursor = cursor_of(req);
        // Interrupt right after the first page arrives
        if cursor.is_none() {
            trigger.request_shutdown();
        }
        Ok(cursor_page(cursor.as_deref()))
    });
    let sink = Arc::new(MemorySink::new());
    let state = StateManager::in_memory();
    let endpoint = cursor_endpoint();

    let report = harvester(fetcher.clone(), &sink, 10)
        .with_state(state.clone())
        .with_shutdown(shutdown)
        .run(&endpoint, &targets(&["a/b", "c/d"]))
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(fetcher.count(), 1);
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.outcomes[0].partial);
    assert_eq!(state.get_cursor("items_v4", "a/b").await, Some("c1".to_string()));

    let resumed = RouteFetcher::new(|req| Ok(cursor_page(cursor_of(req).as_deref())));
    let report = harvester(resumed.clone(), &sink, 10)
        .with_state(state.clone())
        .with_shutdown(ShutdownCoordinator::shared())
        .run(&endpoint, &targets(&["a/b", "c/d"]))
        .await
        .unwrap();

    assert!(!report.cancelled);
    assert_eq!(report.done().count(), 2);
    let first_owner = resumed.requests.lock().unwrap()[0].clone();
    assert_eq!(owner_of(&first_owner), "a");
    assert_eq!(cursor_of(&first_owner), Some("c1".to_string()));

    let a_rows: Vec<_> = written(&sink)
        .into_iter()
        .filter(|r| r["repository"] == "a/b")
        .map(|r| r["n"].clone())
        .collect();
    assert_eq!(a_rows, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    assert!(state.is_target_completed("items_v4", "a/b").await);
    assert!(state.get_cursor("items_v4", "a/b").await.is_none());
}

#[tokio::test]
async fn test_cancelled_link_target_discards_partial_rows() {
    let shutdown = ShutdownCoordinator::shared();
    let trigger = shutdown.clone();
    let fetcher = RouteFetcher::new(move |req| match req.url.as_str() {
        "repos/a/b/items" => {
            trigger.request_shutdown();
            Ok(found_with(
                json!([{"id": 1}]),
                next_link("https://api.github.com/repositories/9/items?page=2"),
            ))
        }
        other => panic!("unexpected {other}"),
    });
    let sink = Arc::new(MemorySink::new());
    let state = StateManager::in_memory();
    let report = harvester(fetcher, &sink, 10)
        .with_state(state.clone())
        .with_shutdown(shutdown)
        .run(&list_endpoint(), &targets(&["a/b"]))
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.outcomes[0].rows, 0);
    assert_eq!(report.outcomes[0].state, TargetState::Paginating);
    assert_eq!(sink.total_rows(), 0);
    assert!(!state.is_target_completed("items", "a/b").await);
}

#[tokio::test]
async fn test_shutdown_before_start_fetches_nothing() {
    let fetcher = RouteFetcher::new(|_| Ok(found(json!({"id": 1}))));
    let sink = Arc::new(MemorySink::new());
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();

    let report = harvester(fetcher.clone(), &sink, 10)
        .with_shutdown(shutdown)
        .run(&info_endpoint(), &targets(&["a/b"]))
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(fetcher.count(), 0);
    assert!(report.outcomes.is_empty());
}
