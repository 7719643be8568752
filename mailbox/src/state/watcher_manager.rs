//! Live-query watcher manager
//!
//! Keeps at most one engine watcher per user identity, bound to the watch key
//! last requested. Subscribers for the same key share that watcher through a
//! `tokio::sync::watch` channel: a new subscriber first sees the latest
//! published snapshot, then every later one.
//!
//! The engine callback never talks to subscribers. It only queues a refresh
//! signal; a per-watcher task re-reads the item and publishes the result, one
//! signal at a time and in arrival order.
//!
//! A failed re-fetch is published to current subscribers. Subscribers that
//! attach afterwards start from the last good snapshot instead.

use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

use crate::backend::{SessionResolver, UpdateCallback, Watcher, WatcherFactory};
use crate::types::error::{MailboxError, Result};
use crate::types::{ItemId, ItemWithRelated, LabelId, Session, UserId, WatchKey};

/// Snapshots of one watched item, starting with the latest known one
pub type SnapshotStream<I, R> = BoxStream<'static, Result<ItemWithRelated<I, R>>>;

/// Related items (e.g. the messages of a conversation) of one watched item
pub type RelatedStream<R> = BoxStream<'static, Result<Vec<R>>>;

type Snapshot<F> = ItemWithRelated<<F as WatcherFactory>::Item, <F as WatcherFactory>::Related>;

type Published<F> = Result<Snapshot<F>>;

struct ConnectionState<F: WatcherFactory> {
    connected: bool,
    last_good: Snapshot<F>,
}

/// What a new subscriber starts from
struct Subscription<F: WatcherFactory> {
    first: Snapshot<F>,
    changes: watch::Receiver<Published<F>>,
}

impl<F: WatcherFactory> Subscription<F> {
    fn into_stream(self) -> SnapshotStream<F::Item, F::Related> {
        futures::stream::once(futures::future::ready(Ok(self.first)))
            .chain(WatchStream::from_changes(self.changes))
            .boxed()
    }
}

struct WatchConnection<F: WatcherFactory> {
    handle: F::Watcher,
    /// Held while publishing so nothing is published once disconnected
    state: Mutex<ConnectionState<F>>,
    tx: watch::Sender<Published<F>>,
}

impl<F: WatcherFactory> WatchConnection<F> {
    fn new(handle: F::Watcher) -> Self {
        let initial = handle.snapshot();
        let (tx, _) = watch::channel(Ok(initial.clone()));
        Self {
            handle,
            state: Mutex::new(ConnectionState {
                connected: true,
                last_good: initial,
            }),
            tx,
        }
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Subscribe under the publish lock so the first element and the change
    /// feed neither overlap nor leave a gap
    fn attach(&self) -> Subscription<F> {
        let state = self.state.lock();
        Subscription {
            first: state.last_good.clone(),
            changes: self.tx.subscribe(),
        }
    }

    /// Returns `false` if the connection was already torn down
    fn publish(&self, value: Published<F>) -> bool {
        let mut state = self.state.lock();
        if !state.connected {
            return false;
        }
        if let Ok(snapshot) = &value {
            state.last_good = snapshot.clone();
        }
        let _previous = self.tx.send_replace(value);
        true
    }

    fn disconnect(&self) {
        let mut state = self.state.lock();
        if state.connected {
            state.connected = false;
            self.handle.disconnect();
        }
    }
}

struct LiveWatcher<F: WatcherFactory> {
    key: WatchKey,
    connection: Arc<WatchConnection<F>>,
    refresh_task: JoinHandle<()>,
}

impl<F: WatcherFactory> LiveWatcher<F> {
    fn teardown(self) {
        debug!("Tearing down watcher for {}", self.key.item_id);
        self.connection.disconnect();
        self.refresh_task.abort();
    }
}

type WatchSlot<F> = Arc<AsyncMutex<Option<LiveWatcher<F>>>>;

pub struct WatcherManager<F: WatcherFactory> {
    sessions: Arc<dyn SessionResolver>,
    factory: Arc<F>,
    slots: Mutex<HashMap<UserId, WatchSlot<F>>>,
    closed: AtomicBool,
}

impl<F: WatcherFactory> WatcherManager<F> {
    pub fn new(sessions: Arc<dyn SessionResolver>, factory: Arc<F>) -> Self {
        Self {
            sessions,
            factory,
            slots: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Observe an item and its related items.
    ///
    /// Concurrent calls for the same key share one engine watcher. A call with
    /// a different key for the same user replaces the current watcher, which
    /// ends the streams handed out for the old key.
    ///
    /// The first element is always the last good snapshot, even when the
    /// latest re-fetch failed.
    pub async fn observe(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        scope_label: &LabelId,
    ) -> Result<SnapshotStream<F::Item, F::Related>> {
        let subscription = self.subscribe(user_id, item_id, scope_label).await?;
        Ok(subscription.into_stream())
    }

    /// Related items only, served by the same watcher as [`Self::observe`]
    pub async fn observe_related(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        scope_label: &LabelId,
    ) -> Result<RelatedStream<F::Related>> {
        let subscription = self.subscribe(user_id, item_id, scope_label).await?;
        Ok(subscription
            .into_stream()
            .map(|published| published.map(|snapshot| snapshot.related))
            .boxed())
    }

    /// Key currently watched for the identity
    pub async fn current_key(&self, user_id: &UserId) -> Option<WatchKey> {
        let slot = self.slots.lock().get(user_id).cloned()?;
        let slot = slot.lock().await;
        slot.as_ref().map(|live| live.key.clone())
    }

    /// Tear down the identity's watcher. Idempotent.
    pub async fn disconnect(&self, user_id: &UserId) {
        let slot = self.slots.lock().get(user_id).cloned();
        if let Some(slot) = slot {
            if let Some(live) = slot.lock().await.take() {
                info!("Disconnecting watcher for {}", live.key.item_id);
                live.teardown();
            }
        }
    }

    /// Tear down every watcher. Later `observe` calls fail with `Cancelled`.
    /// Idempotent.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let slots: Vec<_> = self.slots.lock().drain().map(|(_, slot)| slot).collect();
        if slots.is_empty() {
            return;
        }

        info!("Shutting down watcher manager ({} slots)", slots.len());
        for slot in slots {
            if let Some(live) = slot.lock().await.take() {
                live.teardown();
            }
        }
    }

    fn slot(&self, user_id: &UserId) -> WatchSlot<F> {
        self.slots
            .lock()
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone()
    }

    async fn subscribe(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        scope_label: &LabelId,
    ) -> Result<Subscription<F>> {
        let session = self
            .sessions
            .session(user_id)
            .await
            .ok_or_else(|| MailboxError::SessionUnavailable(user_id.clone()))?;

        let key = WatchKey {
            user_id: user_id.clone(),
            item_id: item_id.clone(),
            scope_label: scope_label.clone(),
        };

        let slot = self.slot(user_id);
        let mut slot = slot.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(MailboxError::Cancelled(
                "watcher manager is shut down".to_string(),
            ));
        }

        if let Some(live) = slot.as_ref() {
            if live.key == key {
                debug!("Attaching subscriber to watcher for {}", key.item_id);
                return Ok(live.connection.attach());
            }
        }

        if let Some(old) = slot.take() {
            info!(
                "Watch key changed from {} to {}, disconnecting old watcher",
                old.key.item_id, key.item_id
            );
            old.teardown();
        }

        let live = self.connect(session, key).await?;
        let subscription = live.connection.attach();
        *slot = Some(live);
        Ok(subscription)
    }

    async fn connect(&self, session: Session, key: WatchKey) -> Result<LiveWatcher<F>> {
        let (signal_tx, signal_rx) = flume::unbounded::<()>();
        let on_update: UpdateCallback = Arc::new(move || {
            let _ = signal_tx.send(());
        });

        info!(
            "Creating watcher for {} (scope {})",
            key.item_id, key.scope_label
        );
        let handle = self
            .factory
            .create_watcher(&session, &key.item_id, &key.scope_label, on_update)
            .await
            .map_err(|e| {
                error!("Failed to create watcher for {}: {}", key.item_id, e);
                MailboxError::from(e)
            })?;

        let connection = Arc::new(WatchConnection::new(handle));

        let refresh_task = tokio::spawn(refresh_loop(
            self.factory.clone(),
            session,
            key.clone(),
            connection.clone(),
            signal_rx,
        ));

        Ok(LiveWatcher {
            key,
            connection,
            refresh_task,
        })
    }
}

/// Re-read the item once per engine signal and publish the result. Errors are
/// published too; the watcher stays connected.
async fn refresh_loop<F: WatcherFactory>(
    factory: Arc<F>,
    session: Session,
    key: WatchKey,
    connection: Arc<WatchConnection<F>>,
    signals: flume::Receiver<()>,
) {
    while signals.recv_async().await.is_ok() {
        if !connection.is_connected() {
            break;
        }

        debug!("Change signalled for {}, re-fetching", key.item_id);
        let result = factory
            .get_item(&session, &key.item_id, &key.scope_label)
            .await
            .map_err(|e| {
                warn!("Re-fetch of {} failed: {}", key.item_id, e);
                MailboxError::from(e)
            });

        if !connection.publish(result) {
            warn!("Dropping re-fetch of {} after disconnect", key.item_id);
            break;
        }
    }
}
