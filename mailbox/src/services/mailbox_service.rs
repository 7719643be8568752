//! Mailbox data-access facade
//!
//! Owns one paginator manager per listing type, the detail watcher manager
//! and the scroller registry of the owning screen. The owner must call
//! [`MailboxService::shutdown`] when the screen goes away.

use std::sync::Arc;
use tracing::info;

use crate::backend::{PaginatorFactory, SessionResolver, WatcherFactory};
use crate::config::MailboxConfig;
use crate::services::fetch_status::{MergedStatusStream, StatusMerger};
use crate::state::{
    PaginatorManager, RelatedStream, Scroller, ScrollerRegistry, SnapshotStream, WatcherManager,
};
use crate::types::error::Result;
use crate::types::{ItemId, LabelId, ListingType, PageKey, ScrollerId, UserId};

pub struct MailboxService<C, M, W>
where
    C: PaginatorFactory,
    M: PaginatorFactory,
    W: WatcherFactory,
{
    conversations: PaginatorManager<C>,
    messages: PaginatorManager<M>,
    watchers: WatcherManager<W>,
    scrollers: Arc<ScrollerRegistry>,
}

impl<C, M, W> MailboxService<C, M, W>
where
    C: PaginatorFactory,
    M: PaginatorFactory,
    W: WatcherFactory,
{
    pub fn new(
        sessions: Arc<dyn SessionResolver>,
        conversation_factory: Arc<C>,
        message_factory: Arc<M>,
        watcher_factory: Arc<W>,
        config: &MailboxConfig,
    ) -> Self {
        let scrollers = Arc::new(ScrollerRegistry::new());
        let capacity = config.status.channel_capacity;

        Self {
            conversations: PaginatorManager::new(
                ListingType::Conversations,
                sessions.clone(),
                conversation_factory,
                scrollers.clone(),
                capacity,
            ),
            messages: PaginatorManager::new(
                ListingType::Messages,
                sessions.clone(),
                message_factory,
                scrollers.clone(),
                capacity,
            ),
            watchers: WatcherManager::new(sessions, watcher_factory),
            scrollers,
        }
    }

    pub async fn get_conversations_page(
        &self,
        user_id: &UserId,
        page_key: &PageKey,
    ) -> Result<Vec<C::Item>> {
        self.conversations.get_page(user_id, page_key).await
    }

    pub async fn get_messages_page(
        &self,
        user_id: &UserId,
        page_key: &PageKey,
    ) -> Result<Vec<M::Item>> {
        self.messages.get_page(user_id, page_key).await
    }

    pub async fn observe_item(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        scope_label: &LabelId,
    ) -> Result<SnapshotStream<W::Item, W::Related>> {
        self.watchers.observe(user_id, item_id, scope_label).await
    }

    pub async fn observe_related(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        scope_label: &LabelId,
    ) -> Result<RelatedStream<W::Related>> {
        self.watchers
            .observe_related(user_id, item_id, scope_label)
            .await
    }

    pub fn register_scroller(&self, scroller: Arc<dyn Scroller>) {
        self.scrollers.register(scroller);
    }

    pub fn unregister_scroller(&self, id: ScrollerId) {
        self.scrollers.unregister(id);
    }

    pub fn disconnect_all_scrollers(&self) {
        self.scrollers.disconnect_all();
    }

    /// Fetch progress of both listing types, tagged with their source.
    /// Must be called from within a tokio runtime.
    pub fn merged_fetch_status_stream(&self) -> MergedStatusStream {
        let mut merger = StatusMerger::new();
        merger.add_source(ListingType::Conversations, self.conversations.progress_stream());
        merger.add_source(ListingType::Messages, self.messages.progress_stream());
        merger.into_stream()
    }

    pub fn scroller_registry(&self) -> &Arc<ScrollerRegistry> {
        &self.scrollers
    }

    pub fn conversations(&self) -> &PaginatorManager<C> {
        &self.conversations
    }

    pub fn messages(&self) -> &PaginatorManager<M> {
        &self.messages
    }

    pub fn watchers(&self) -> &WatcherManager<W> {
        &self.watchers
    }

    /// Release every paginator and watcher. Page and observe calls made
    /// afterwards fail with `Cancelled`. Idempotent: a repeated call also
    /// disconnects scrollers registered since the previous one.
    pub async fn shutdown(&self) {
        info!("Shutting down mailbox service");
        self.scrollers.disconnect_all();
        self.conversations.shutdown().await;
        self.messages.shutdown().await;
        self.watchers.shutdown().await;
    }
}
