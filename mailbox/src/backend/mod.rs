//! Contracts of the backing query/storage engine
//!
//! The engine itself (network fetch, decryption, local storage) lives outside
//! this crate. These traits are the only surface the managers talk to.

use async_trait::async_trait;
use std::sync::Arc;

use crate::types::error::EngineError;
use crate::types::{ItemId, ItemWithRelated, LabelId, ReadStatus, Session, UserId};

#[cfg(test)]
pub(crate) mod fake;

/// Change notification handed to the engine when a paginator or watcher is
/// created. It carries no payload: "something changed, go re-read".
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Resolves the active session of a user
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// `None` means the user is not authenticated
    async fn session(&self, user_id: &UserId) -> Option<Session>;
}

/// One live paginated query owned by the engine
#[async_trait]
pub trait Paginator: Send + Sync {
    type Item: Send;

    async fn next_page(&self) -> Result<Vec<Self::Item>, EngineError>;

    /// Re-run the query from the start and return everything loaded so far
    async fn reload(&self) -> Result<Vec<Self::Item>, EngineError>;

    /// Must be idempotent
    fn disconnect(&self);
}

/// Creates paginators for one listing type
#[async_trait]
pub trait PaginatorFactory: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;
    type Paginator: Paginator<Item = Self::Item> + 'static;

    async fn create_paginator(
        &self,
        session: &Session,
        label: &LabelId,
        read_status: ReadStatus,
        on_update: UpdateCallback,
    ) -> Result<Self::Paginator, EngineError>;
}

/// Live watch on one item and its related items
pub trait Watcher: Send + Sync {
    type Item;
    type Related;

    /// Latest snapshot known to the engine, read synchronously
    fn snapshot(&self) -> ItemWithRelated<Self::Item, Self::Related>;

    /// Must be idempotent
    fn disconnect(&self);
}

/// Creates watchers and re-reads watched items
#[async_trait]
pub trait WatcherFactory: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;
    type Related: Clone + Send + Sync + 'static;
    type Watcher: Watcher<Item = Self::Item, Related = Self::Related> + 'static;

    async fn create_watcher(
        &self,
        session: &Session,
        item_id: &ItemId,
        scope_label: &LabelId,
        on_update: UpdateCallback,
    ) -> Result<Self::Watcher, EngineError>;

    /// Re-fetch primitive used after a watcher callback fires
    async fn get_item(
        &self,
        session: &Session,
        item_id: &ItemId,
        scope_label: &LabelId,
    ) -> Result<ItemWithRelated<Self::Item, Self::Related>, EngineError>;
}
