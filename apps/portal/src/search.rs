//! Incremental place search: cancel-and-replace lookups over a
//! session-lifetime cache.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::{AbortHandle, Abortable, Aborted};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use urbanshield_common::PlaceResult;

use crate::api::PortalApi;
use crate::error::GatewayError;

pub const MIN_QUERY_CHARS: usize = 2;
/// Quiet period after the last keystroke before [`LiveSearchEngine::input`]
/// issues a lookup.
pub const DEBOUNCE: Duration = Duration::from_millis(250);

const SELECTION_CAPACITY: usize = 16;

/// Normalized query → results. Shared by every search engine of a session.
#[derive(Clone, Default)]
pub struct SearchCache {
    entries: Arc<DashMap<String, Arc<Vec<PlaceResult>>>>,
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(query: &str) -> String {
        query.trim().to_lowercase()
    }

    pub fn get(&self, query: &str) -> Option<Arc<Vec<PlaceResult>>> {
        self.entries
            .get(&Self::normalize(query))
            .map(|entry| entry.value().clone())
    }

    pub fn insert(&self, query: &str, results: Vec<PlaceResult>) {
        self.entries.insert(Self::normalize(query), Arc::new(results));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reset(&self) {
        self.entries.clear();
    }
}

/// What a single [`LiveSearchEngine::query`] call ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Input too short; suggestions cleared.
    Cleared,
    Cached(Vec<PlaceResult>),
    Fetched(Vec<PlaceResult>),
    /// The lookup failed; suggestions cleared.
    Failed,
    /// A newer query, a selection or teardown replaced this one.
    Canceled,
}

impl SearchOutcome {
    pub fn results(&self) -> Option<&[PlaceResult]> {
        match self {
            Self::Cached(results) | Self::Fetched(results) => Some(results),
            _ => None,
        }
    }
}

#[derive(Default)]
struct SearchState {
    generation: u64,
    inflight: Option<AbortHandle>,
}

struct SearchInner {
    api: PortalApi,
    cache: SearchCache,
    state: Mutex<SearchState>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    text: watch::Sender<String>,
    suggestions: watch::Sender<Vec<PlaceResult>>,
    selections: broadcast::Sender<PlaceResult>,
}

/// One search box. Dropping it cancels whatever lookup is outstanding.
pub struct LiveSearchEngine {
    inner: Arc<SearchInner>,
}

impl LiveSearchEngine {
    pub fn new(api: PortalApi, cache: SearchCache) -> Self {
        let (selections, _) = broadcast::channel(SELECTION_CAPACITY);
        Self {
            inner: Arc::new(SearchInner {
                api,
                cache,
                state: Mutex::new(SearchState::default()),
                debounce: Mutex::new(None),
                text: watch::Sender::new(String::new()),
                suggestions: watch::Sender::new(Vec::new()),
                selections,
            }),
        }
    }

    /// Look `text` up now, replacing any lookup still in flight.
    pub async fn query(&self, text: &str) -> SearchOutcome {
        self.inner.text.send_replace(text.to_string());
        self.inner.query(text).await
    }

    /// Keystroke entry point: record the text and look it up once typing
    /// pauses for [`DEBOUNCE`].
    pub fn input(&self, text: &str) {
        self.inner.text.send_replace(text.to_string());
        let owner: Weak<SearchInner> = Arc::downgrade(&self.inner);
        let text = text.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(DEBOUNCE).await;
            if let Some(inner) = owner.upgrade() {
                inner.query(&text).await;
            }
        });
        if let Some(previous) = self.inner.debounce.lock().replace(task) {
            previous.abort();
        }
    }

    /// Choose a suggestion: clears the input and suggestions and announces
    /// the record to selection subscribers.
    pub fn select(&self, result: PlaceResult) -> PlaceResult {
        self.cancel();
        self.inner.text.send_replace(String::new());
        self.inner.suggestions.send_replace(Vec::new());
        tracing::info!(name = %result.name, "search result selected");
        let _ = self.inner.selections.send(result.clone());
        result
    }

    /// The activation key: select the first suggestion, if there is one.
    pub fn activate(&self) -> Option<PlaceResult> {
        let first = self.inner.suggestions.borrow().first().cloned()?;
        Some(self.select(first))
    }

    /// Abort the pending debounce and any in-flight lookup.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn text(&self) -> watch::Receiver<String> {
        self.inner.text.subscribe()
    }

    pub fn suggestions(&self) -> watch::Receiver<Vec<PlaceResult>> {
        self.inner.suggestions.subscribe()
    }

    pub fn current_suggestions(&self) -> Vec<PlaceResult> {
        self.inner.suggestions.borrow().clone()
    }

    pub fn selections(&self) -> broadcast::Receiver<PlaceResult> {
        self.inner.selections.subscribe()
    }

    pub fn cache(&self) -> &SearchCache {
        &self.inner.cache
    }
}

impl Drop for LiveSearchEngine {
    fn drop(&mut self) {
        self.inner.cancel();
    }
}

impl SearchInner {
    async fn query(&self, text: &str) -> SearchOutcome {
        let query = text.trim();
        let (generation, registration) = {
            let mut state = self.state.lock();
            if let Some(previous) = state.inflight.take() {
                previous.abort();
            }
            state.generation += 1;

            if query.chars().count() < MIN_QUERY_CHARS {
                self.suggestions.send_replace(Vec::new());
                return SearchOutcome::Cleared;
            }
            if let Some(hit) = self.cache.get(query) {
                tracing::trace!(%query, "search cache hit");
                let results = hit.as_ref().clone();
                self.suggestions.send_replace(results.clone());
                return SearchOutcome::Cached(results);
            }

            let (handle, registration) = AbortHandle::new_pair();
            state.inflight = Some(handle);
            (state.generation, registration)
        };

        let fetched = Abortable::new(self.api.search_places(query), registration).await;
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(Aborted) => {
                tracing::debug!(%query, "search canceled");
                return SearchOutcome::Canceled;
            }
        };

        if let Ok(results) = &fetched {
            self.cache.insert(query, results.clone());
        }

        let mut state = self.state.lock();
        if state.generation != generation {
            return SearchOutcome::Canceled;
        }
        state.inflight = None;
        match fetched {
            Ok(results) => {
                self.suggestions.send_replace(results.clone());
                SearchOutcome::Fetched(results)
            }
            Err(GatewayError::Canceled) => SearchOutcome::Canceled,
            Err(err) => {
                tracing::warn!(%err, %query, "search failed");
                self.suggestions.send_replace(Vec::new());
                SearchOutcome::Failed
            }
        }
    }

    fn cancel(&self) {
        if let Some(task) = self.debounce.lock().take() {
            task.abort();
        }
        let mut state = self.state.lock();
        if let Some(handle) = state.inflight.take() {
            handle.abort();
        }
        state.generation += 1;
    }
}
