//! Lazy, page-backed cursor over a record source.
//!
//! At most one page is buffered. Records are handed out undecoded. Source
//! read errors surface from `peek` or `advance` unchanged; the cursor never
//! retries.

use std::collections::VecDeque;

use tracing::debug;

use crate::connectors::RecordSource;
use crate::error::Result;
use crate::record::RawRecord;

/// Cursor exposing `peek` / `advance` over a paginated source.
pub struct RecordCursor {
    source: Box<dyn RecordSource>,
    page_size: usize,
    buffer: VecDeque<RawRecord>,
    next_key: Option<serde_json::Value>,
    started: bool,
    pages_fetched: u64,
}

impl RecordCursor {
    /// Wraps a connected source. `page_size` is clamped to at least 1.
    pub fn new(source: Box<dyn RecordSource>, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            next_key: None,
            started: false,
            pages_fetched: 0,
        }
    }

    /// Returns the next unconsumed record without consuming it, or `None`
    /// once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates any error from fetching the next page.
    pub async fn peek(&mut self) -> Result<Option<&RawRecord>> {
        self.fill().await?;
        Ok(self.buffer.front())
    }

    /// Discards the current record, fetching the next page if the buffered
    /// one is used up.
    ///
    /// # Errors
    ///
    /// Propagates any error from fetching the next page.
    pub async fn advance(&mut self) -> Result<()> {
        if !self.started {
            self.fill().await?;
        }
        self.buffer.pop_front();
        self.fill().await
    }

    /// Number of pages requested from the source so far.
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// True once every page has been fetched and consumed.
    pub fn is_exhausted(&self) -> bool {
        self.started && self.buffer.is_empty() && self.next_key.is_none()
    }

    /// Closes the underlying source.
    ///
    /// # Errors
    ///
    /// Propagates the source's close error.
    pub async fn close(&mut self) -> Result<()> {
        self.buffer.clear();
        self.source.close().await
    }

    /// Fetches pages until a record is buffered or the source is done.
    /// Empty pages with a continuation key are skipped over.
    async fn fill(&mut self) -> Result<()> {
        while self.buffer.is_empty() && (!self.started || self.next_key.is_some()) {
            let page = self
                .source
                .fetch_page(self.next_key.clone(), self.page_size)
                .await?;
            self.started = true;
            self.pages_fetched += 1;
            debug!(
                "Fetched page {} with {} records from {}",
                self.pages_fetched,
                page.records.len(),
                self.source.source_type()
            );
            self.buffer.extend(page.records);
            self.next_key = page.next_key;
        }
        Ok(())
    }
}
