//! Cursor over matched user documents, fetched in pages as it is iterated.

use std::collections::VecDeque;
use std::fmt;

use crate::models::{FindOptions, Projection, UserRecord};

use super::document;
use super::traits::StoreResult;

/// Number of documents a cursor requests per page unless told otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Runs one page of a query against a backend.
///
/// `skip` and `limit` are absolute positions within the query's sorted
/// matches. Returning fewer than `limit` documents ends the cursor.
pub trait PageSource: Send {
    /// Fetches up to `limit` matches after the first `skip`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn fetch_page(&mut self, skip: usize, limit: usize) -> StoreResult<Vec<UserRecord>>;
}

/// Forward-only cursor over users returned by a find.
///
/// Nothing is read when the cursor is created. The first page is fetched on
/// the first pull, later pages as earlier ones drain, so writes made before
/// a page is fetched are visible in it. Documents are projected as they are
/// pulled. Once exhausted the cursor yields nothing; run the query again for
/// a fresh one.
pub struct UserCursor {
    source: Option<Box<dyn PageSource>>,
    buffer: VecDeque<UserRecord>,
    projection: Projection,
    offset: usize,
    remaining: Option<usize>,
    batch_size: usize,
}

impl UserCursor {
    /// Creates a cursor that runs its query through `source` on demand,
    /// honoring the skip, limit, and projection of `options`.
    #[must_use]
    pub fn new(source: impl PageSource + 'static, options: &FindOptions) -> Self {
        Self {
            source: Some(Box::new(source)),
            buffer: VecDeque::new(),
            projection: options.projection.clone(),
            offset: options.skip,
            // A zero limit means "no limit", as in document databases.
            remaining: options.limit.filter(|&limit| limit > 0),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Creates a cursor over documents that were already selected.
    #[must_use]
    pub fn from_documents(documents: Vec<UserRecord>, projection: Projection) -> Self {
        Self {
            source: None,
            buffer: documents.into(),
            projection,
            offset: 0,
            remaining: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Creates a cursor that yields nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::from_documents(Vec::new(), Projection::Full)
    }

    /// Sets how many documents each page requests (at least one).
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Returns `true` once every match has been pulled.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.buffer.is_empty() && self.source.is_none()
    }

    /// Drains the cursor into a vector.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while fetching a page.
    pub fn fetch(self) -> StoreResult<Vec<UserRecord>> {
        self.collect()
    }

    /// Drains the cursor, keeping only user ids.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while fetching a page.
    pub fn ids(self) -> StoreResult<Vec<String>> {
        self.map(|user| user.map(|user| user.id)).collect()
    }

    /// Pulls the next page into the buffer, closing the source when the
    /// query is done or fails.
    fn fill(&mut self) -> StoreResult<()> {
        let wanted = self
            .remaining
            .map_or(self.batch_size, |left| left.min(self.batch_size));
        let Some(source) = self.source.as_mut() else {
            return Ok(());
        };
        if wanted == 0 {
            self.source = None;
            return Ok(());
        }

        let page = match source.fetch_page(self.offset, wanted) {
            Ok(page) => page,
            Err(err) => {
                self.source = None;
                return Err(err);
            },
        };

        if page.len() < wanted {
            self.source = None;
        }
        self.offset += page.len();
        if let Some(left) = self.remaining.as_mut() {
            *left = left.saturating_sub(page.len());
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Default for UserCursor {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for UserCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCursor")
            .field("buffered", &self.buffer.len())
            .field("offset", &self.offset)
            .field("remaining", &self.remaining)
            .field("projection", &self.projection)
            .field("exhausted", &self.is_exhausted())
            .finish_non_exhaustive()
    }
}

impl Iterator for UserCursor {
    type Item = StoreResult<UserRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty()
            && let Err(err) = self.fill()
        {
            return Some(Err(err));
        }

        self.buffer
            .pop_front()
            .map(|user| Ok(document::project(user, &self.projection)))
    }
}
