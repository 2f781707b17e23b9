//! Fetch provider abstraction.

use crate::error::FetchError;
use async_trait::async_trait;
use feedsync_protocol::{Cursor, FeedItem, FetchedPage, PaginationWindow};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Fetches pages from a remote content source.
///
/// This trait abstracts the transport, allowing for different
/// implementations (HTTP client, local cache, mock for testing). Timeouts are
/// the provider's concern and are reported as ordinary [`FetchError`]s.
#[async_trait]
pub trait FetchProvider<T: FeedItem>: Send + Sync {
    /// Fetches the page described by `cursor`.
    ///
    /// `page_size_hint` is the limit the engine asked for; cursors carrying
    /// their own limit take precedence.
    async fn fetch_page(
        &self,
        cursor: &Cursor,
        page_size_hint: u32,
    ) -> Result<FetchedPage<T>, FetchError>;
}

/// A request recorded by [`MockProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Cursor the engine sent.
    pub cursor: Cursor,
    /// Page size hint the engine sent.
    pub page_size_hint: u32,
}

type FetchHook = Box<dyn Fn(&Cursor) + Send + Sync>;

/// A scripted provider for testing.
///
/// Responses are served in the order they were queued. Once the queue is
/// empty the fallback response is repeated; without a fallback an empty
/// derived page is returned.
pub struct MockProvider<T> {
    responses: Mutex<VecDeque<Result<FetchedPage<T>, FetchError>>>,
    fallback: Mutex<Option<Result<FetchedPage<T>, FetchError>>>,
    requests: Mutex<Vec<FetchRequest>>,
    before_fetch: Mutex<Option<FetchHook>>,
    delay: Mutex<Duration>,
}

impl<T: FeedItem> MockProvider<T> {
    /// Creates a provider with no scripted responses.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            before_fetch: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Queues a successful page.
    pub fn push_page(&self, page: FetchedPage<T>) {
        self.responses.lock().push_back(Ok(page));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: FetchError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Sets the response served once the queue is empty.
    pub fn set_fallback(&self, response: Result<FetchedPage<T>, FetchError>) {
        *self.fallback.lock() = Some(response);
    }

    /// Installs a hook run at the start of every fetch.
    pub fn set_before_fetch<F>(&self, hook: F)
    where
        F: Fn(&Cursor) + Send + Sync + 'static,
    {
        *self.before_fetch.lock() = Some(Box::new(hook));
    }

    /// Delays every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Returns the requests received so far.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns the number of queued responses not yet served.
    pub fn pending(&self) -> usize {
        self.responses.lock().len()
    }

    fn next_response(&self) -> Result<FetchedPage<T>, FetchError> {
        if let Some(response) = self.responses.lock().pop_front() {
            return response;
        }
        match self.fallback.lock().as_ref() {
            Some(response) => response.clone(),
            None => Ok(FetchedPage::new(
                Vec::new(),
                PaginationWindow::derived(None, None),
            )),
        }
    }
}

impl<T: FeedItem> Default for MockProvider<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: FeedItem> FetchProvider<T> for MockProvider<T> {
    async fn fetch_page(
        &self,
        cursor: &Cursor,
        page_size_hint: u32,
    ) -> Result<FetchedPage<T>, FetchError> {
        self.requests.lock().push(FetchRequest {
            cursor: cursor.clone(),
            page_size_hint,
        });
        if let Some(hook) = self.before_fetch.lock().as_ref() {
            hook(cursor);
        }

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.next_response()
    }
}
