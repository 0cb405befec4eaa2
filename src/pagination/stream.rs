//! Lazy, restartable page sequence
//!
//! A [`PageStream`] pulls one page per [`next`](PageStream::next) call, so the
//! caller controls pacing and can stop between any two pages. Cursor-paged
//! endpoints can be restarted from any cursor a previous stream handed out.

use super::strategies::paginator_for;
use super::types::{EndReason, NextPage, Page, PaginationState, Paginator, Step};
use crate::endpoint::{EndpointDescriptor, ExtractedPage, PageStyle};
use crate::error::{Error, Result};
use crate::http::{Fetched, PageFetcher, PreparedRequest};
use crate::template::TargetArgs;
use crate::types::{JsonValue, Row};
use tracing::debug;

/// Page sequence for one target of one endpoint
pub struct PageStream<'a, F: PageFetcher + ?Sized> {
    fetcher: &'a F,
    descriptor: &'a EndpointDescriptor,
    args: TargetArgs,
    target: Option<String>,
    paginator: Box<dyn Paginator>,
    state: PaginationState,
    next_url: Option<String>,
    ended: Option<EndReason>,
    yielded: u32,
}

impl<'a, F: PageFetcher + ?Sized> PageStream<'a, F> {
    /// Stream starting at the first page
    pub fn new(fetcher: &'a F, descriptor: &'a EndpointDescriptor, args: TargetArgs) -> Self {
        Self {
            fetcher,
            descriptor,
            args,
            target: None,
            paginator: paginator_for(&descriptor.paging),
            state: PaginationState::new(),
            next_url: None,
            ended: None,
            yielded: 0,
        }
    }

    /// Stream for a raw target identifier
    ///
    /// The identifier is normalized by the descriptor and, if the descriptor
    /// tags rows, written into every row.
    pub fn for_target(fetcher: &'a F, descriptor: &'a EndpointDescriptor, target: &str) -> Result<Self> {
        let (canonical, args) = descriptor.args_for(target)?;
        let mut stream = Self::new(fetcher, descriptor, args);
        stream.target = Some(canonical);
        Ok(stream)
    }

    /// Continue after a cursor returned by an earlier stream
    ///
    /// Only cursor-paged endpoints can resume; link URLs are not stable
    /// across sessions, so link-paged endpoints restart from page one.
    pub fn resume_from(mut self, cursor: impl Into<String>) -> Result<Self> {
        if !self.descriptor.paging.is_resumable() {
            return Err(Error::config(format!(
                "endpoint '{}' is not cursor-paged and can only restart from the first page",
                self.descriptor.name
            )));
        }
        self.state = PaginationState::resuming(cursor);
        Ok(self)
    }

    /// Pagination bookkeeping so far
    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    /// Pages yielded so far
    pub fn pages(&self) -> u32 {
        self.yielded
    }

    /// Fetch the next page, or report why there is none
    ///
    /// Errors (transient budget exhausted, schema problems, cancellation)
    /// leave the stream where it was; calling again retries the same page.
    pub async fn next(&mut self) -> Result<Step> {
        if let Some(reason) = self.ended {
            return Ok(Step::End(reason));
        }

        let request = self.request()?;
        let response = match self.fetcher.fetch(&request).await? {
            Fetched::Found(response) => response,
            Fetched::NotFound => {
                let reason = self.missing(EndReason::NotFound);
                return Ok(self.finish(reason));
            }
        };

        let extracted = self.extract(&response.body)?;
        if !extracted.entity_present {
            let reason = self.missing(EndReason::Empty);
            return Ok(self.finish(reason));
        }

        let next = self
            .paginator
            .process_response(&extracted, &response.headers, &mut self.state);
        self.yielded += 1;

        let cursor = match next {
            NextPage::Url(url) => {
                self.next_url = Some(url);
                None
            }
            NextPage::Cursor(cursor) => Some(cursor),
            NextPage::Done => {
                self.ended = Some(EndReason::Exhausted);
                None
            }
        };

        debug!(
            endpoint = %self.descriptor.name,
            page = self.yielded,
            rows = extracted.rows.len(),
            more = self.ended.is_none(),
            "page fetched"
        );

        Ok(Step::Page(Page {
            number: self.yielded,
            rows: extracted.rows,
            cursor,
        }))
    }

    /// Drain the stream into one row list
    pub async fn collect_rows(mut self) -> Result<(Vec<Row>, EndReason)> {
        let mut rows = Vec::new();
        loop {
            match self.next().await? {
                Step::Page(page) => rows.extend(page.rows),
                Step::End(reason) => return Ok((rows, reason)),
            }
        }
    }

    fn request(&self) -> Result<PreparedRequest> {
        let args = match &self.descriptor.paging {
            PageStyle::Cursor { cursor_var } => {
                let cursor = self
                    .state
                    .cursor
                    .as_deref()
                    .map_or(JsonValue::Null, JsonValue::from);
                self.args.clone().with(cursor_var.as_str(), cursor)
            }
            PageStyle::Link | PageStyle::Single => self.args.clone(),
        };

        let request = self.descriptor.prepare(&args)?;
        Ok(match &self.next_url {
            Some(url) => request.follow(url.as_str()),
            None => request,
        })
    }

    fn extract(&self, body: &JsonValue) -> Result<ExtractedPage> {
        match &self.target {
            Some(target) => self.descriptor.extract_page(body, target),
            None => (self.descriptor.extract)(body),
        }
    }

    /// The entity is gone: terminal on the first page, partial afterwards
    fn missing(&self, first_page: EndReason) -> EndReason {
        if self.yielded == 0 {
            first_page
        } else {
            EndReason::Vanished {
                pages: self.yielded,
            }
        }
    }

    fn finish(&mut self, reason: EndReason) -> Step {
        self.state.mark_done();
        self.ended = Some(reason);
        Step::End(reason)
    }
}

/// Explicit composition of a descriptor and a fetcher into a page stream
pub fn call_paginated<'a, F: PageFetcher + ?Sized>(
    fetcher: &'a F,
    descriptor: &'a EndpointDescriptor,
    args: TargetArgs,
) -> PageStream<'a, F> {
    PageStream::new(fetcher, descriptor, args)
}
