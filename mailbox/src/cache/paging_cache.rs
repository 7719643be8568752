//! In-memory page cache with a pending-invalidation slot
//!
//! Stores the items fetched for the currently active listing and remembers
//! whether the engine has reported a change since the last reconciliation.
//! It knows nothing about sessions or paginators; the paginator manager owns
//! one cache per slot and resets it whenever the listing key changes.
//!
//! Every operation takes the same mutex, so the check-and-clear done by
//! [`PagingCacheWithInvalidationFilter::pop_unseen_data`] is atomic with
//! respect to writes and invalidation submissions.

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::types::{InvalidationEvent, ListingKey, ListingType};

/// Position in the sequence of submitted invalidations, taken before a fetch
/// starts. Only invalidations submitted up to the mark are cleared by
/// [`PagingCacheWithInvalidationFilter::replace_data_since`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct InvalidationMark(u64);

/// Outcome of [`PagingCacheWithInvalidationFilter::take_unseen`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unseen<T> {
    /// Nothing changed since the last reconciliation
    Cached(Vec<T>),
    /// A matching invalidation was pending and has been taken. Hand it back
    /// with `restore_invalidation` if the reload fails.
    Invalidated(InvalidationEvent),
    /// Nothing cached yet
    Empty,
}

struct PendingInvalidation {
    event: InvalidationEvent,
    seq: u64,
}

struct CacheState<T> {
    /// `None` until the first `replace_data` of the current generation
    items: Option<Vec<T>>,
    pending: Option<PendingInvalidation>,
    pages_loaded: usize,
    /// Submissions so far. Survives `reset` so marks stay comparable.
    submitted: u64,
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self {
            items: None,
            pending: None,
            pages_loaded: 0,
            submitted: 0,
        }
    }
}

impl<T> CacheState<T> {
    fn store(&mut self, items: Vec<T>, is_first_page: bool) {
        debug!(
            "Replacing cached data with {} items (first page: {})",
            items.len(),
            is_first_page
        );
        self.items = Some(items);
        self.pages_loaded = if is_first_page {
            1
        } else {
            self.pages_loaded.max(1)
        };
    }
}

pub struct PagingCacheWithInvalidationFilter<T> {
    state: Mutex<CacheState<T>>,
}

impl<T: Clone> PagingCacheWithInvalidationFilter<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Overwrite the stored items with a `First` or `All` result and drop any
    /// pending invalidation.
    ///
    /// `is_first_page` restarts the page count; a full reload keeps it since
    /// the reload covers every page loaded so far.
    pub fn replace_data(&self, items: Vec<T>, is_first_page: bool) {
        let mut state = self.state.lock();
        state.store(items, is_first_page);
        state.pending = None;
    }

    /// Like [`Self::replace_data`], but an invalidation submitted after `mark`
    /// was taken stays pending: the stored result may predate that change.
    pub fn replace_data_since(&self, items: Vec<T>, is_first_page: bool, mark: InvalidationMark) {
        let mut state = self.state.lock();
        state.store(items, is_first_page);
        match &state.pending {
            Some(pending) if pending.seq > mark.0 => {
                debug!("Keeping invalidation submitted during fetch: {:?}", pending.event);
            }
            _ => state.pending = None,
        }
    }

    /// Mark to take before starting a fetch whose result goes to
    /// [`Self::replace_data_since`]
    pub fn invalidation_mark(&self) -> InvalidationMark {
        InvalidationMark(self.state.lock().submitted)
    }

    /// Append a `Next` page. Returns `false` and stores nothing if no
    /// `replace_data` happened first.
    pub fn store_next_page(&self, items: Vec<T>) -> bool {
        let mut state = self.state.lock();
        let state = &mut *state;
        match state.items.as_mut() {
            Some(stored) => {
                stored.extend(items);
                state.pages_loaded += 1;
                debug!(
                    "Stored page {} ({} items cached)",
                    state.pages_loaded,
                    stored.len()
                );
                true
            }
            None => {
                warn!("Next page stored without a first page, cache unavailable");
                false
            }
        }
    }

    /// Queue an invalidation. Later submissions replace earlier ones.
    pub fn submit_invalidation(&self, event: InvalidationEvent) {
        let mut state = self.state.lock();
        if let Some(pending) = &state.pending {
            debug!("Coalescing pending invalidation {:?} into {:?}", pending.event, event);
        }
        state.submitted += 1;
        let seq = state.submitted;
        state.pending = Some(PendingInvalidation { event, seq });
    }

    /// Put back an invalidation taken by [`Self::take_unseen`] whose reload
    /// failed. A newer submission already pending wins.
    pub fn restore_invalidation(&self, event: InvalidationEvent) {
        let mut state = self.state.lock();
        if state.pending.is_none() {
            debug!("Restoring unconsumed invalidation {:?}", event);
            let seq = state.submitted;
            state.pending = Some(PendingInvalidation { event, seq });
        }
    }

    /// Atomically check for a pending invalidation of the given listing.
    ///
    /// A matching one is taken and returned; a pending invalidation for a
    /// different listing is stale and dropped.
    pub fn take_unseen(&self, listing_type: ListingType, key: &ListingKey) -> Unseen<T> {
        let mut state = self.state.lock();
        if let Some(pending) = state.pending.take() {
            if pending.event.applies_to(listing_type, key) {
                debug!("Consumed pending invalidation for {} listing", listing_type);
                return Unseen::Invalidated(pending.event);
            }
            debug!("Dropping invalidation for another listing: {:?}", pending.event);
        }
        match &state.items {
            Some(items) => Unseen::Cached(items.clone()),
            None => Unseen::Empty,
        }
    }

    /// Returns `None` when the caller owes a full reload: a matching
    /// invalidation was pending (it is cleared here) or nothing is cached.
    /// Otherwise returns the cached items unchanged.
    pub fn pop_unseen_data(&self, listing_type: ListingType, key: &ListingKey) -> Option<Vec<T>> {
        match self.take_unseen(listing_type, key) {
            Unseen::Cached(items) => Some(items),
            Unseen::Invalidated(_) | Unseen::Empty => None,
        }
    }

    /// Clear everything, including any pending invalidation
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let submitted = state.submitted;
        *state = CacheState {
            submitted,
            ..CacheState::default()
        };
    }

    pub fn snapshot(&self) -> Option<Vec<T>> {
        self.state.lock().items.clone()
    }

    pub fn has_data(&self) -> bool {
        self.state.lock().items.is_some()
    }

    pub fn has_pending_invalidation(&self) -> bool {
        self.state.lock().pending.is_some()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pages_loaded(&self) -> usize {
        self.state.lock().pages_loaded
    }
}

impl<T: Clone> Default for PagingCacheWithInvalidationFilter<T> {
    fn default() -> Self {
        Self::new()
    }
}
