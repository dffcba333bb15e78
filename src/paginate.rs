//! Page-by-page execution of a query.
//!
//! The paginator walks a copy of the query's parameters forward, one request
//! per page, and folds every page into a single [`Report`]. It stops when the
//! remote side stops announcing further pages, when the client-side limit is
//! reached, or after the first page for single-page endpoints.

use tracing::{debug, info, warn};

use crate::error::{QueryError, QueryResult};
use crate::query::{Params, QueryCore, WireRequest};
use crate::report::Report;
use crate::transport::{RawPage, TransportError, TransportErrorKind};

/// Where the walk stands between two pages.
#[derive(Debug)]
enum Step {
    /// Request the page the cursor points at.
    Fetch(Params),
    /// Fold a fetched page and decide whether to continue.
    Merge {
        cursor: Params,
        request: WireRequest,
        page: RawPage,
    },
    Done,
}

pub struct Paginator<'a> {
    core: &'a QueryCore,
    single_page: bool,
    report: Report,
    pages: usize,
}

impl<'a> Paginator<'a> {
    pub fn new(core: &'a QueryCore) -> Self {
        Self {
            core,
            single_page: false,
            report: Report::new(),
            pages: 0,
        }
    }

    /// Stop after the first page regardless of what the response announces.
    pub fn single_page(mut self) -> Self {
        self.single_page = true;
        self
    }

    pub fn run(mut self) -> QueryResult<Report> {
        let mut step = Step::Fetch(self.core.params().clone());
        loop {
            step = match step {
                Step::Fetch(cursor) => self.fetch(cursor)?,
                Step::Merge {
                    cursor,
                    request,
                    page,
                } => self.merge(cursor, request, page)?,
                Step::Done => break,
            };
        }
        info!(
            endpoint = %self.core.endpoint(),
            pages = self.pages,
            rows = self.report.len(),
            complete = self.report.is_complete(),
            "query finished"
        );
        Ok(self.report)
    }

    fn fetch(&mut self, cursor: Params) -> QueryResult<Step> {
        let endpoint = self.core.endpoint();
        let request = WireRequest::from_params(endpoint, &cursor);
        self.core.throttle().wait();
        let page = self
            .core
            .transport()
            .fetch(endpoint, &request.to_params())
            .map_err(|err| remote_error(err, &request))?;
        self.pages += 1;
        Ok(Step::Merge {
            cursor,
            request,
            page,
        })
    }

    fn merge(&mut self, mut cursor: Params, request: WireRequest, page: RawPage) -> QueryResult<Step> {
        self.report
            .append(&page, self.core.registry(), request.to_params())?;
        debug!(
            page = self.pages,
            rows = page.row_count(),
            has_next = page.has_next(),
            start_index = ?cursor.start_index,
            "merged page"
        );

        if let Some(limit) = self.core.limit()
            && self.report.len() >= limit
        {
            self.report.truncate(limit);
            self.report.set_complete(true);
            return Ok(Step::Done);
        }
        if self.single_page || !page.has_next() {
            return Ok(Step::Done);
        }
        if page.row_count() == 0 {
            warn!(page = self.pages, "empty page announced a successor; stopping");
            return Ok(Step::Done);
        }
        cursor.advance(self.core.page_size());
        Ok(Step::Fetch(cursor))
    }
}

/// Invalid requests carry the parameters that were sent, for debugging.
fn remote_error(err: TransportError, request: &WireRequest) -> QueryError {
    match err.kind {
        TransportErrorKind::InvalidRequest => {
            QueryError::InvalidRequest(format!("{}\n{}", err.message, request.dump()))
        }
        _ => err.into(),
    }
}
