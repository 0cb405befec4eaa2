//! Endpoint descriptor types
//!
//! A descriptor is everything the core needs to know about one logical call:
//! how to turn a target identifier into template arguments, how to render the
//! request, how the endpoint pages, and how a raw JSON page becomes rows.

use crate::error::{Error, Result};
use crate::http::PreparedRequest;
use crate::template::{render, render_value, TargetArgs};
use crate::types::{canonical_repo, ApiClass, JsonValue, Method, Row};
use std::fmt;

/// Turns a raw JSON page into rows plus continuation data
pub type Extractor = fn(&JsonValue) -> Result<ExtractedPage>;

/// How an endpoint pages through results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStyle {
    /// One response, no continuation
    Single,
    /// `Link: <...>; rel="next"` response header
    Link,
    /// Cursor and has-next flag extracted from the payload; the cursor is
    /// passed back through the named template variable
    Cursor {
        /// Template variable that receives the cursor
        cursor_var: String,
    },
}

impl PageStyle {
    /// Cursor paging through the `cursor` variable
    pub fn cursor() -> Self {
        Self::Cursor {
            cursor_var: "cursor".to_string(),
        }
    }

    /// Whether a harvest can resume mid-target with this style
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Cursor { .. })
    }
}

/// What one page contributed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    /// Records on this page
    pub rows: Vec<Row>,
    /// False when the upstream entity is absent (null repository, empty body)
    pub entity_present: bool,
    /// Cursor for the next page (cursor style only)
    pub cursor: Option<String>,
    /// Whether the payload says more pages follow (cursor style only)
    pub has_next: bool,
}

impl ExtractedPage {
    /// A page of rows without payload-level continuation
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            entity_present: true,
            cursor: None,
            has_next: false,
        }
    }

    /// The entity the request was about does not exist (any more)
    pub fn absent() -> Self {
        Self::default()
    }

    /// Attach payload-level continuation
    #[must_use]
    pub fn with_continuation(mut self, cursor: Option<String>, has_next: bool) -> Self {
        self.cursor = cursor;
        self.has_next = has_next;
        self
    }
}

/// What kind of identifier an endpoint is harvested for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// `owner/repo` (URLs and `.git` suffixes accepted)
    Repository,
    /// `owner/repo#number`, an issue or pull request
    Issue,
    /// A user login
    User,
    /// An organization login
    Org,
    /// A free-text search query
    Query,
}

impl TargetKind {
    /// Normalize a target identifier and derive the template arguments
    ///
    /// The canonical form is what duplicates and checkpoints are keyed by.
    pub fn parse(self, target: &str) -> Result<(String, TargetArgs)> {
        let trimmed = target.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_target(target, "empty identifier"));
        }

        match self {
            TargetKind::Repository => {
                let repository = parse_repository(trimmed)?;
                let args = TargetArgs::repository(&repository);
                Ok((repository, args))
            }
            TargetKind::Issue => {
                let (repo, number) = trimmed
                    .rsplit_once('#')
                    .ok_or_else(|| Error::invalid_target(trimmed, "expected owner/repo#number"))?;
                let number: u64 = number
                    .trim()
                    .parse()
                    .map_err(|_| Error::invalid_target(trimmed, "issue number is not an integer"))?;
                let repository = parse_repository(repo)?;
                let args = TargetArgs::repository(&repository).with("number", number);
                Ok((format!("{repository}#{number}"), args))
            }
            TargetKind::User | TargetKind::Org => {
                let login = trimmed.trim_start_matches('@').to_lowercase();
                if login.is_empty() || login.contains('/') || login.contains(char::is_whitespace) {
                    return Err(Error::invalid_target(trimmed, "not a login"));
                }
                let var = if self == TargetKind::User { "user" } else { "org" };
                let args = TargetArgs::new().with(var, login.as_str());
                Ok((login, args))
            }
            TargetKind::Query => {
                let args = TargetArgs::new().with("query", trimmed);
                Ok((trimmed.to_string(), args))
            }
        }
    }

    /// Short name for listings
    pub fn as_str(self) -> &'static str {
        match self {
            TargetKind::Repository => "repository",
            TargetKind::Issue => "issue",
            TargetKind::User => "user",
            TargetKind::Org => "org",
            TargetKind::Query => "query",
        }
    }
}

fn parse_repository(reference: &str) -> Result<String> {
    let repository = canonical_repo(reference);
    match repository.split('/').collect::<Vec<_>>().as_slice() {
        [owner, repo] if !owner.is_empty() && !repo.is_empty() => Ok(repository),
        _ => Err(Error::invalid_target(reference, "expected owner/repo")),
    }
}

/// One logical API call
#[derive(Clone)]
pub struct EndpointDescriptor {
    /// Catalog name
    pub name: String,
    /// One-line description for listings
    pub description: String,
    /// HTTP method
    pub method: Method,
    /// Path template relative to the API root
    pub url_template: String,
    /// Static query parameters (values may be templates)
    pub query: Vec<(String, String)>,
    /// JSON body template (GraphQL)
    pub body_template: Option<JsonValue>,
    /// Identifier kind the endpoint is harvested for
    pub target: TargetKind,
    /// Column that receives the target identifier on every row
    pub target_column: Option<String>,
    /// Paging style
    pub paging: PageStyle,
    /// Page extractor
    pub extract: Extractor,
}

impl EndpointDescriptor {
    /// GET endpoint paged by `Link` header
    pub fn get(
        name: impl Into<String>,
        url_template: impl Into<String>,
        target: TargetKind,
        extract: Extractor,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            method: Method::GET,
            url_template: url_template.into(),
            query: Vec::new(),
            body_template: None,
            target,
            target_column: None,
            paging: PageStyle::Link,
            extract,
        }
    }

    /// GraphQL endpoint paged by cursor
    ///
    /// The body is `{"query": ..., "variables": ...}`; variables may
    /// reference target arguments and the `cursor` variable.
    pub fn graphql(
        name: impl Into<String>,
        query: &str,
        variables: JsonValue,
        target: TargetKind,
        extract: Extractor,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            method: Method::POST,
            url_template: "graphql".to_string(),
            query: Vec::new(),
            body_template: Some(serde_json::json!({
                "query": query,
                "variables": variables,
            })),
            target,
            target_column: None,
            paging: PageStyle::cursor(),
            extract,
        }
    }

    /// Set the description
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a static query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the paging style
    #[must_use]
    pub fn paging(mut self, paging: PageStyle) -> Self {
        self.paging = paging;
        self
    }

    /// Prefix every row with the target identifier under `column`
    #[must_use]
    pub fn tag_target(mut self, column: impl Into<String>) -> Self {
        self.target_column = Some(column.into());
        self
    }

    /// Rate-limit class of this endpoint
    pub fn class(&self) -> ApiClass {
        ApiClass::of(&self.url_template)
    }

    /// Canonical identifier and template arguments for a target
    pub fn args_for(&self, target: &str) -> Result<(String, TargetArgs)> {
        self.target.parse(target)
    }

    /// Render the request for the given arguments
    ///
    /// For cursor-paged endpoints a missing cursor variable renders as null,
    /// which requests the first page.
    pub fn prepare(&self, args: &TargetArgs) -> Result<PreparedRequest> {
        let first_page;
        let args = match &self.paging {
            PageStyle::Cursor { cursor_var } if args.get(cursor_var).is_none() => {
                first_page = args.clone().with(cursor_var.as_str(), JsonValue::Null);
                &first_page
            }
            _ => args,
        };

        let url = render(&self.url_template, args)?;
        let mut request = match self.method {
            Method::GET => PreparedRequest::get(url),
            Method::POST => {
                let body = match &self.body_template {
                    Some(template) => render_value(template, args)?,
                    None => JsonValue::Null,
                };
                PreparedRequest::post(url, body)
            }
        };

        for (key, value) in &self.query {
            request = request.query(key.as_str(), render(value, args)?);
        }
        Ok(request)
    }

    /// Apply the extractor and the target column to a raw page
    pub fn extract_page(&self, body: &JsonValue, target: &str) -> Result<ExtractedPage> {
        let mut page = (self.extract)(body)?;
        if let Some(column) = &self.target_column {
            page.rows = page
                .rows
                .into_iter()
                .map(|row| {
                    let mut tagged = Row::new();
                    tagged.insert(column.clone(), JsonValue::from(target));
                    for (key, value) in row {
                        if &key != column {
                            tagged.insert(key, value);
                        }
                    }
                    tagged
                })
                .collect();
        }
        Ok(page)
    }
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("url_template", &self.url_template)
            .field("query", &self.query)
            .field("target", &self.target)
            .field("paging", &self.paging)
            .finish_non_exhaustive()
    }
}
