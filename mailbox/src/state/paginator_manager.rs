//! Paginator lifecycle manager
//!
//! Maps a listing key to exactly one live paginator per user identity and
//! feeds fetched pages into that identity's page cache. A key change
//! disconnects the old paginator and resets the cache before the new
//! paginator is created.
//!
//! All work for one identity runs under that identity's async slot lock, so
//! concurrent requests for the same new key collapse into one creation and a
//! `Next` never observes a half-applied `First`. Unrelated identities use
//! separate slots and never contend.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::backend::{Paginator, PaginatorFactory, SessionResolver, UpdateCallback};
use crate::cache::{PagingCacheWithInvalidationFilter, Unseen};
use crate::services::logger::fmt_ms;
use crate::state::scroller_registry::{Scroller, ScrollerRegistry};
use crate::types::error::{MailboxError, Result};
use crate::types::{
    FetchId, FetchProgress, InvalidationEvent, ListingKey, ListingType, PageKey, PageToLoad,
    ScrollerId, Session, UserId,
};

/// Paginator handle as held by the manager and the scroller registry
struct ManagedPaginator<P> {
    id: ScrollerId,
    listing_type: ListingType,
    paginator: P,
    /// Shared with the engine callback so a disconnected paginator stops
    /// invalidating the cache
    disconnected: Arc<AtomicBool>,
}

impl<P: Paginator> ManagedPaginator<P> {
    fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

impl<P: Paginator> Scroller for ManagedPaginator<P> {
    fn id(&self) -> ScrollerId {
        self.id
    }

    fn disconnect(&self) {
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            debug!("Disconnecting {} paginator {:?}", self.listing_type, self.id);
            self.paginator.disconnect();
        }
    }
}

struct ActivePaginator<P> {
    key: ListingKey,
    handle: Arc<ManagedPaginator<P>>,
}

struct PaginatorSlot<F: PaginatorFactory> {
    active: Option<ActivePaginator<F::Paginator>>,
    cache: Arc<PagingCacheWithInvalidationFilter<F::Item>>,
}

impl<F: PaginatorFactory> PaginatorSlot<F> {
    fn new() -> Self {
        Self {
            active: None,
            cache: Arc::new(PagingCacheWithInvalidationFilter::new()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PageOp {
    Next,
    Reload,
}

pub struct PaginatorManager<F: PaginatorFactory> {
    listing_type: ListingType,
    sessions: Arc<dyn SessionResolver>,
    factory: Arc<F>,
    registry: Arc<ScrollerRegistry>,
    slots: Mutex<HashMap<UserId, Arc<AsyncMutex<PaginatorSlot<F>>>>>,
    progress_tx: broadcast::Sender<FetchProgress>,
    /// Set by `shutdown`; checked under the slot lock before any paginator
    /// is created
    closed: AtomicBool,
}

impl<F: PaginatorFactory> PaginatorManager<F> {
    pub fn new(
        listing_type: ListingType,
        sessions: Arc<dyn SessionResolver>,
        factory: Arc<F>,
        registry: Arc<ScrollerRegistry>,
        progress_capacity: usize,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(progress_capacity.max(1));

        Self {
            listing_type,
            sessions,
            factory,
            registry,
            slots: Mutex::new(HashMap::new()),
            progress_tx,
            closed: AtomicBool::new(false),
        }
    }

    pub fn listing_type(&self) -> ListingType {
        self.listing_type
    }

    /// Fetch-progress events of this manager's paginators. Events missed by a
    /// lagging receiver are skipped.
    pub fn progress_stream(&self) -> impl futures::Stream<Item = FetchProgress> + Send + 'static {
        BroadcastStream::new(self.progress_tx.subscribe()).filter_map(|event| event.ok())
    }

    /// Load a page of the listing described by `page_key`.
    ///
    /// `First` and `Next` return the page that was fetched; `All` returns
    /// everything cached for the listing, reloading first when the engine
    /// reported a change since the last reconciliation.
    pub async fn get_page(&self, user_id: &UserId, page_key: &PageKey) -> Result<Vec<F::Item>> {
        let session = self
            .sessions
            .session(user_id)
            .await
            .ok_or_else(|| MailboxError::SessionUnavailable(user_id.clone()))?;

        let key = ListingKey {
            session_id: session.id.clone(),
            label: page_key.label.clone(),
            read_status: page_key.read_status,
        };

        let slot = self.slot(user_id);
        let mut slot = slot.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(MailboxError::Cancelled(format!(
                "{} paginator manager is shut down",
                self.listing_type
            )));
        }
        let (handle, created) = self.ensure_paginator(&mut slot, &session, &key).await?;
        let cache = slot.cache.clone();

        match page_key.page_to_load {
            PageToLoad::First => self.load_first(&handle, &cache, created).await,
            PageToLoad::Next => {
                if !cache.has_data() {
                    let inconsistency = MailboxError::CacheInconsistency(format!(
                        "next page of {} requested before the first",
                        key.label
                    ));
                    warn!("{}, loading first page instead", inconsistency);
                    return self.load_first(&handle, &cache, created).await;
                }

                let items = self.fetch(&handle, PageOp::Next).await?;
                cache.store_next_page(items.clone());
                Ok(items)
            }
            PageToLoad::All => match cache.take_unseen(self.listing_type, &key) {
                Unseen::Cached(items) => {
                    debug!(
                        "Serving {} cached {} for {}",
                        items.len(),
                        self.listing_type,
                        key.label
                    );
                    Ok(items)
                }
                Unseen::Invalidated(event) => self
                    .load_all(&handle, &cache, PageOp::Reload)
                    .await
                    .map_err(|e| {
                        // Not consumed until a reload succeeds
                        cache.restore_invalidation(event);
                        e
                    }),
                Unseen::Empty => self.load_all(&handle, &cache, PageOp::Reload).await,
            },
        }
    }

    /// Items currently cached for the identity
    pub async fn cached_items(&self, user_id: &UserId) -> Option<Vec<F::Item>> {
        let slot = self.slots.lock().get(user_id).cloned()?;
        let slot = slot.lock().await;
        slot.cache.snapshot()
    }

    /// Listing key currently backed by a live paginator
    pub async fn active_key(&self, user_id: &UserId) -> Option<ListingKey> {
        let slot = self.slots.lock().get(user_id).cloned()?;
        let slot = slot.lock().await;
        slot.active
            .as_ref()
            .filter(|active| !active.handle.is_disconnected())
            .map(|active| active.key.clone())
    }

    /// Disconnect every paginator and drop every cache. Later `get_page`
    /// calls fail with `Cancelled`. Idempotent.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let slots: Vec<_> = self.slots.lock().drain().map(|(_, slot)| slot).collect();
        if slots.is_empty() {
            return;
        }

        info!("Shutting down {} paginator manager ({} slots)", self.listing_type, slots.len());
        for slot in slots {
            let mut slot = slot.lock().await;
            if let Some(active) = slot.active.take() {
                self.release(active);
            }
            slot.cache.reset();
        }
    }

    fn slot(&self, user_id: &UserId) -> Arc<AsyncMutex<PaginatorSlot<F>>> {
        self.slots
            .lock()
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(PaginatorSlot::new())))
            .clone()
    }

    fn release(&self, active: ActivePaginator<F::Paginator>) {
        self.registry.unregister(active.handle.id());
        active.handle.disconnect();
    }

    /// Reuse the live paginator for `key` or replace it. Returns the handle and
    /// whether it was just created.
    async fn ensure_paginator(
        &self,
        slot: &mut PaginatorSlot<F>,
        session: &Session,
        key: &ListingKey,
    ) -> Result<(Arc<ManagedPaginator<F::Paginator>>, bool)> {
        if let Some(active) = &slot.active {
            if &active.key == key && !active.handle.is_disconnected() {
                return Ok((active.handle.clone(), false));
            }
        }

        if let Some(old) = slot.active.take() {
            if old.handle.is_disconnected() {
                debug!("Replacing disconnected {} paginator", self.listing_type);
            } else {
                info!(
                    "{} listing changed from {} to {}, disconnecting old paginator",
                    self.listing_type, old.key.label, key.label
                );
            }
            self.release(old);
        }
        slot.cache.reset();

        let disconnected = Arc::new(AtomicBool::new(false));
        let on_update = self.invalidation_callback(&slot.cache, key, &disconnected);

        info!(
            "Creating {} paginator for {} ({:?})",
            self.listing_type, key.label, key.read_status
        );
        let paginator = self
            .factory
            .create_paginator(session, &key.label, key.read_status, on_update)
            .await
            .map_err(|e| {
                error!("Failed to create {} paginator: {}", self.listing_type, e);
                MailboxError::from(e)
            })?;

        let handle = Arc::new(ManagedPaginator {
            id: ScrollerId::new(),
            listing_type: self.listing_type,
            paginator,
            disconnected,
        });
        self.registry.register(handle.clone());
        slot.active = Some(ActivePaginator {
            key: key.clone(),
            handle: handle.clone(),
        });

        Ok((handle, true))
    }

    /// Engine callback: marks the cache stale without fetching anything
    fn invalidation_callback(
        &self,
        cache: &Arc<PagingCacheWithInvalidationFilter<F::Item>>,
        key: &ListingKey,
        disconnected: &Arc<AtomicBool>,
    ) -> UpdateCallback {
        let cache = Arc::downgrade(cache);
        let disconnected = disconnected.clone();
        let listing_type = self.listing_type;
        let key = key.clone();

        Arc::new(move || {
            if disconnected.load(Ordering::SeqCst) {
                return;
            }
            if let Some(cache) = cache.upgrade() {
                cache.submit_invalidation(InvalidationEvent::for_listing(listing_type, key.clone()));
            }
        })
    }

    async fn load_first(
        &self,
        handle: &ManagedPaginator<F::Paginator>,
        cache: &PagingCacheWithInvalidationFilter<F::Item>,
        created: bool,
    ) -> Result<Vec<F::Item>> {
        // A fresh paginator has nothing to reload yet
        let op = if created { PageOp::Next } else { PageOp::Reload };
        self.load_all(handle, cache, op).await
    }

    /// Fetch and replace the cached listing. Invalidations reported while the
    /// fetch is suspended stay pending.
    async fn load_all(
        &self,
        handle: &ManagedPaginator<F::Paginator>,
        cache: &PagingCacheWithInvalidationFilter<F::Item>,
        op: PageOp,
    ) -> Result<Vec<F::Item>> {
        let mark = cache.invalidation_mark();
        let items = self.fetch(handle, op).await?;
        cache.replace_data_since(items.clone(), true, mark);
        Ok(items)
    }

    async fn fetch(
        &self,
        handle: &ManagedPaginator<F::Paginator>,
        op: PageOp,
    ) -> Result<Vec<F::Item>> {
        let id = FetchId::new();
        let started = Instant::now();
        let _ = self.progress_tx.send(FetchProgress::started(id));

        let result = match op {
            PageOp::Next => handle.paginator.next_page().await,
            PageOp::Reload => handle.paginator.reload().await,
        };

        let _ = self.progress_tx.send(FetchProgress::ended(id));
        debug!(
            "{} {:?} fetch took {}",
            self.listing_type,
            op,
            fmt_ms(started.elapsed())
        );

        if handle.is_disconnected() {
            warn!(
                "Discarding {} fetch from disconnected paginator {:?}",
                self.listing_type, handle.id
            );
            return Err(MailboxError::Cancelled(format!(
                "{} paginator disconnected during fetch",
                self.listing_type
            )));
        }

        result.map_err(|e| {
            error!("{} fetch failed: {}", self.listing_type, e);
            MailboxError::from(e)
        })
    }
}
