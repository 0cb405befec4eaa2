//! Built-in GitHub endpoint catalog
//!
//! REST v3 endpoints page through the `Link` header; the two GraphQL v4
//! endpoints page through `pageInfo { endCursor hasNextPage }`.

use super::types::{EndpointDescriptor, ExtractedPage, PageStyle, TargetKind};
use crate::error::{Error, Result};
use crate::types::{JsonValue, Row};
use serde_json::json;

const ISSUES_V4_QUERY: &str = "query ($owner: String!, $repo: String!, $cursor: String) {
  repository(name: $repo, owner: $owner) {
    hasIssuesEnabled
    issues(first: 100, after: $cursor, orderBy: {field: CREATED_AT, direction: ASC}) {
      nodes { author { login } closed createdAt updatedAt closedAt number title }
      pageInfo { endCursor hasNextPage }
    }
  }
}";

const COMMITS_V4_QUERY: &str = "query ($owner: String!, $repo: String!, $cursor: String) {
  repository(name: $repo, owner: $owner) {
    defaultBranchRef {
      target {
        ... on Commit {
          history(first: 100, after: $cursor) {
            nodes { oid author { name email user { login } } message authoredDate committedDate }
            pageInfo { endCursor hasNextPage }
          }
        }
      }
    }
  }
}";

/// Every built-in endpoint
pub fn catalog() -> Vec<EndpointDescriptor> {
    use TargetKind::{Issue, Org, Query, Repository, User};

    let repo_vars = json!({"owner": "{{ owner }}", "repo": "{{ repo }}", "cursor": "{{ cursor }}"});

    vec![
        EndpointDescriptor::get("repo_info", "repos/{{ repository }}", Repository, extract_repo_info)
            .paging(PageStyle::Single)
            .tag_target("repository")
            .describe("Repository summary: topics, issue counts, timestamps, forks, stars"),
        EndpointDescriptor::get("repo_issues", "repos/{{ repository }}/issues", Repository, extract_issues)
            .query("state", "all")
            .query("per_page", "100")
            .describe("All issues, open and closed, without pull requests"),
        EndpointDescriptor::get(
            "repo_issue_comments",
            "repos/{{ repository }}/issues/comments",
            Repository,
            extract_list,
        )
        .query("per_page", "100")
        .describe("Comments on all issues and pull requests"),
        EndpointDescriptor::get(
            "repo_issue_events",
            "repos/{{ repository }}/issues/events",
            Repository,
            extract_list,
        )
        .query("per_page", "100")
        .describe("Events on all issues and pull requests"),
        EndpointDescriptor::get("repo_commits", "repos/{{ repository }}/commits", Repository, extract_list)
            .query("per_page", "100")
            .describe("Commits on the default branch"),
        EndpointDescriptor::get("repo_pulls", "repos/{{ repository }}/pulls", Repository, extract_list)
            .query("state", "all")
            .query("per_page", "100")
            .describe("All pull requests, open and closed"),
        EndpointDescriptor::get("repo_topics", "repos/{{ repository }}/topics", Repository, extract_topics)
            .paging(PageStyle::Single)
            .tag_target("repository")
            .describe("Repository topics, one row per topic"),
        EndpointDescriptor::get("repo_labels", "repos/{{ repository }}/labels", Repository, extract_labels)
            .query("per_page", "100")
            .tag_target("repository")
            .describe("Issue label names, one row per label"),
        EndpointDescriptor::get(
            "pull_request_commits",
            "repos/{{ repository }}/pulls/{{ number }}/commits",
            Issue,
            extract_list,
        )
        .query("per_page", "100")
        .tag_target("pull_request")
        .describe("Commits of one pull request (owner/repo#number)"),
        EndpointDescriptor::get(
            "issue_comments",
            "repos/{{ repository }}/issues/{{ number }}/comments",
            Issue,
            extract_list,
        )
        .query("per_page", "100")
        .tag_target("issue")
        .describe("General comments on one issue or pull request (owner/repo#number)"),
        EndpointDescriptor::get(
            "review_comments",
            "repos/{{ repository }}/pulls/{{ number }}/comments",
            Issue,
            extract_list,
        )
        .query("per_page", "100")
        .tag_target("pull_request")
        .describe("Code review comments on one pull request (owner/repo#number)"),
        EndpointDescriptor::get(
            "issue_events",
            "repos/{{ repository }}/issues/{{ number }}/events",
            Issue,
            extract_list,
        )
        .query("per_page", "100")
        .tag_target("issue")
        .describe("Events on one issue (owner/repo#number)"),
        EndpointDescriptor::get("user_info", "users/{{ user }}", User, extract_object)
            .paging(PageStyle::Single)
            .describe("User profile"),
        EndpointDescriptor::get("user_repos", "users/{{ user }}/repos", User, extract_list)
            .query("per_page", "100")
            .describe("Repositories owned by a user"),
        EndpointDescriptor::get("user_orgs", "users/{{ user }}/orgs", User, extract_list)
            .tag_target("user")
            .describe("Public organization memberships of a user"),
        EndpointDescriptor::get("org_members", "orgs/{{ org }}/members", Org, extract_list)
            .query("per_page", "100")
            .tag_target("org")
            .describe("Public members of an organization"),
        EndpointDescriptor::get("org_repos", "orgs/{{ org }}/repos", Org, extract_list)
            .query("per_page", "100")
            .describe("Repositories of an organization"),
        EndpointDescriptor::get("search_repositories", "search/repositories", Query, extract_search_items)
            .query("q", "{{ query }}")
            .query("per_page", "100")
            .tag_target("query")
            .describe("Repository search results (search rate limit)"),
        EndpointDescriptor::graphql(
            "repo_issues_v4",
            ISSUES_V4_QUERY,
            repo_vars.clone(),
            Repository,
            extract_issues_v4,
        )
        .tag_target("repository")
        .describe("Issues through GraphQL, resumable by cursor"),
        EndpointDescriptor::graphql(
            "repo_commits_v4",
            COMMITS_V4_QUERY,
            repo_vars,
            Repository,
            extract_commits_v4,
        )
        .tag_target("repository")
        .describe("Default-branch commits through GraphQL, resumable by cursor"),
    ]
}

/// Look up a built-in endpoint by name
pub fn find(name: &str) -> Result<EndpointDescriptor> {
    catalog()
        .into_iter()
        .find(|endpoint| endpoint.name == name)
        .ok_or_else(|| Error::UnknownEndpoint {
            name: name.to_string(),
        })
}

// ============================================================================
// REST extractors
// ============================================================================

/// A JSON array of records
pub fn extract_list(body: &JsonValue) -> Result<ExtractedPage> {
    match body {
        JsonValue::Null => Ok(ExtractedPage::absent()),
        JsonValue::Array(items) => Ok(ExtractedPage::rows(items.iter().map(into_row).collect())),
        other => Err(Error::schema(format!(
            "expected a list, got {}",
            kind_of(other)
        ))),
    }
}

/// Issues list without the pull requests the endpoint mixes in
pub fn extract_issues(body: &JsonValue) -> Result<ExtractedPage> {
    let mut page = extract_list(body)?;
    page.rows.retain(|row| !row.contains_key("pull_request"));
    Ok(page)
}

/// A single JSON object
pub fn extract_object(body: &JsonValue) -> Result<ExtractedPage> {
    match body {
        JsonValue::Null => Ok(ExtractedPage::absent()),
        JsonValue::Object(object) => Ok(ExtractedPage::rows(vec![object.clone()])),
        other => Err(Error::schema(format!(
            "expected an object, got {}",
            kind_of(other)
        ))),
    }
}

/// The repository summary row of the repo-info crawl
pub fn extract_repo_info(body: &JsonValue) -> Result<ExtractedPage> {
    let repo = match body {
        JsonValue::Null => return Ok(ExtractedPage::absent()),
        JsonValue::Object(repo) => repo,
        other => {
            return Err(Error::schema(format!(
                "expected a repository object, got {}",
                kind_of(other)
            )))
        }
    };

    let field = |name: &str| repo.get(name).cloned().unwrap_or(JsonValue::Null);
    let mut row = Row::new();
    row.insert("topic".into(), repo.get("topics").cloned().unwrap_or_else(|| json!([])));
    row.insert("open_issues_count".into(), field("open_issues_count"));
    row.insert("open_issues".into(), field("open_issues"));
    row.insert("pushed_at".into(), field("pushed_at"));
    row.insert("updated_at".into(), field("updated_at"));
    row.insert("created_at".into(), field("created_at"));
    row.insert("fork_count".into(), field("forks_count"));
    row.insert("stargazer_count".into(), field("stargazers_count"));
    row.insert("description".into(), field("description"));
    row.insert("fork".into(), field("fork"));
    row.insert("language".into(), field("language"));
    Ok(ExtractedPage::rows(vec![row]))
}

/// `{"names": [...]}` into one row per topic
pub fn extract_topics(body: &JsonValue) -> Result<ExtractedPage> {
    if body.is_null() {
        return Ok(ExtractedPage::absent());
    }
    let names = body
        .get("names")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| Error::schema("topics payload has no names list"))?;

    let rows = names
        .iter()
        .map(|name| {
            let mut row = Row::new();
            row.insert("topic".into(), name.clone());
            row
        })
        .collect();
    Ok(ExtractedPage::rows(rows))
}

/// Label objects reduced to their names
pub fn extract_labels(body: &JsonValue) -> Result<ExtractedPage> {
    let mut page = extract_list(body)?;
    page.rows = page
        .rows
        .into_iter()
        .map(|label| {
            let mut row = Row::new();
            row.insert(
                "label".into(),
                label.get("name").cloned().unwrap_or(JsonValue::Null),
            );
            row
        })
        .collect();
    Ok(page)
}

/// Search responses wrap their results in `items`
pub fn extract_search_items(body: &JsonValue) -> Result<ExtractedPage> {
    if body.is_null() {
        return Ok(ExtractedPage::absent());
    }
    match body.get("items") {
        Some(items @ JsonValue::Array(_)) => extract_list(items),
        _ => Err(Error::schema("search payload has no items list")),
    }
}

// ============================================================================
// GraphQL extractors
// ============================================================================

/// `data.repository`, or `None` when the repository is empty, deleted or moved
fn graphql_repository(body: &JsonValue) -> Result<Option<&JsonValue>> {
    let data = body
        .get("data")
        .ok_or_else(|| Error::schema(graphql_error_message(body)))?;
    match data.get("repository") {
        None | Some(JsonValue::Null) => Ok(None),
        Some(repository) => Ok(Some(repository)),
    }
}

fn graphql_error_message(body: &JsonValue) -> String {
    let message = body
        .get("errors")
        .and_then(JsonValue::as_array)
        .and_then(|errors| errors.first())
        .and_then(|error| error.get("message"))
        .and_then(JsonValue::as_str);
    match message {
        Some(message) => format!("GraphQL response has no data: {message}"),
        None => "GraphQL response has no data".to_string(),
    }
}

/// Nodes plus `pageInfo` of a GraphQL connection
fn connection(connection: &JsonValue, name: &str) -> Result<(Vec<JsonValue>, Option<String>, bool)> {
    let nodes = connection
        .get("nodes")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| Error::schema(format!("{name} connection has no nodes")))?;
    let page_info = connection
        .get("pageInfo")
        .ok_or_else(|| Error::schema(format!("{name} connection has no pageInfo")))?;
    let cursor = page_info
        .get("endCursor")
        .and_then(JsonValue::as_str)
        .map(ToString::to_string);
    let has_next = page_info
        .get("hasNextPage")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);
    Ok((nodes.clone(), cursor, has_next))
}

fn pointer(value: &JsonValue, path: &str) -> JsonValue {
    value.pointer(path).cloned().unwrap_or(JsonValue::Null)
}

/// Issues of `repo_issues_v4`
pub fn extract_issues_v4(body: &JsonValue) -> Result<ExtractedPage> {
    let Some(repository) = graphql_repository(body)? else {
        return Ok(ExtractedPage::absent());
    };
    let issues = repository
        .get("issues")
        .ok_or_else(|| Error::schema("repository has no issues connection"))?;
    let (nodes, cursor, has_next) = connection(issues, "issues")?;

    let rows = nodes
        .iter()
        .map(|issue| {
            let mut row = Row::new();
            row.insert("author".into(), pointer(issue, "/author/login"));
            row.insert("closed".into(), pointer(issue, "/closed"));
            row.insert("created_at".into(), pointer(issue, "/createdAt"));
            row.insert("updated_at".into(), pointer(issue, "/updatedAt"));
            row.insert("closed_at".into(), pointer(issue, "/closedAt"));
            row.insert("number".into(), pointer(issue, "/number"));
            row.insert("title".into(), pointer(issue, "/title"));
            row
        })
        .collect();
    Ok(ExtractedPage::rows(rows).with_continuation(cursor, has_next))
}

/// Commits of `repo_commits_v4`
///
/// A repository without a default branch has no history and is reported
/// as absent.
pub fn extract_commits_v4(body: &JsonValue) -> Result<ExtractedPage> {
    let Some(repository) = graphql_repository(body)? else {
        return Ok(ExtractedPage::absent());
    };
    let history = match repository.pointer("/defaultBranchRef/target/history") {
        Some(history) if !history.is_null() => history,
        _ => return Ok(ExtractedPage::absent()),
    };
    let (nodes, cursor, has_next) = connection(history, "history")?;

    let rows = nodes
        .iter()
        .map(|commit| {
            let mut row = Row::new();
            row.insert("sha".into(), pointer(commit, "/oid"));
            row.insert("author".into(), pointer(commit, "/author/user/login"));
            row.insert("author_name".into(), pointer(commit, "/author/name"));
            row.insert("author_email".into(), pointer(commit, "/author/email"));
            row.insert("authored_date".into(), pointer(commit, "/authoredDate"));
            row.insert("message".into(), pointer(commit, "/message"));
            row.insert("committed_date".into(), pointer(commit, "/committedDate"));
            row
        })
        .collect();
    Ok(ExtractedPage::rows(rows).with_continuation(cursor, has_next))
}

// ============================================================================
// Helpers
// ============================================================================

fn into_row(item: &JsonValue) -> Row {
    match item {
        JsonValue::Object(object) => object.clone(),
        other => {
            let mut row = Row::new();
            row.insert("value".into(), other.clone());
            row
        }
    }
}

fn kind_of(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "an object",
    }
}
