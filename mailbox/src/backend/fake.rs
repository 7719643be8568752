//! Scripted in-memory engine used by the unit tests
//!
//! Every fake records its calls in a shared [`EventLog`] so tests can assert
//! ordering across collaborators (e.g. disconnect before create).

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{Paginator, PaginatorFactory, SessionResolver, UpdateCallback, Watcher, WatcherFactory};
use crate::types::error::EngineError;
use crate::types::{ItemId, ItemWithRelated, LabelId, ReadStatus, Session, SessionId, UserId};

#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct FakeSessions {
    sessions: Mutex<HashMap<UserId, Session>>,
}

impl FakeSessions {
    pub fn with_user(user: &str, session: &str) -> Arc<Self> {
        let sessions = Arc::new(Self::default());
        sessions.login(user, session);
        sessions
    }

    pub fn login(&self, user: &str, session: &str) {
        self.sessions.lock().insert(
            UserId::new(user),
            Session {
                id: SessionId::new(session),
                user_id: UserId::new(user),
            },
        );
    }
}

#[async_trait]
impl SessionResolver for FakeSessions {
    async fn session(&self, user_id: &UserId) -> Option<Session> {
        self.sessions.lock().get(user_id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Paginators
// ---------------------------------------------------------------------------

type PageScript = Arc<Mutex<HashMap<String, Vec<Vec<String>>>>>;

#[derive(Default)]
pub(crate) struct FakePaginatorFactory {
    pub log: EventLog,
    pages: PageScript,
    created: AtomicUsize,
    create_delay: Mutex<Duration>,
    fetch_delay: Arc<Mutex<Duration>>,
    failure: Arc<Mutex<Option<EngineError>>>,
    callbacks: Mutex<Vec<UpdateCallback>>,
}

impl FakePaginatorFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_pages(&self, label: &str, pages: Vec<Vec<&str>>) {
        let pages = pages
            .into_iter()
            .map(|page| page.into_iter().map(String::from).collect())
            .collect();
        self.pages.lock().insert(label.to_string(), pages);
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock() = delay;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = delay;
    }

    /// The next fetch on any paginator fails with `err`
    pub fn fail_next_fetch(&self, err: EngineError) {
        *self.failure.lock() = Some(err);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Fire the change callback of the most recently created paginator
    pub fn fire_update(&self) {
        let callback = self.callbacks.lock().last().cloned();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Fire the change callback of the paginator created `index`-th
    pub fn fire_update_of(&self, index: usize) {
        let callback = self.callbacks.lock().get(index).cloned();
        if let Some(callback) = callback {
            callback();
        }
    }
}

#[async_trait]
impl PaginatorFactory for FakePaginatorFactory {
    type Item = String;
    type Paginator = FakePaginator;

    async fn create_paginator(
        &self,
        _session: &Session,
        label: &LabelId,
        _read_status: ReadStatus,
        on_update: UpdateCallback,
    ) -> Result<FakePaginator, EngineError> {
        self.log.push(format!("create:{}", label));
        self.created.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.callbacks.lock().push(on_update);

        Ok(FakePaginator {
            label: label.to_string(),
            pages: self.pages.clone(),
            cursor: AtomicUsize::new(0),
            disconnected: AtomicBool::new(false),
            log: self.log.clone(),
            fetch_delay: self.fetch_delay.clone(),
            failure: self.failure.clone(),
        })
    }
}

pub(crate) struct FakePaginator {
    label: String,
    pages: PageScript,
    cursor: AtomicUsize,
    disconnected: AtomicBool,
    log: EventLog,
    fetch_delay: Arc<Mutex<Duration>>,
    failure: Arc<Mutex<Option<EngineError>>>,
}

impl FakePaginator {
    async fn before_fetch(&self, op: &str) -> Result<(), EngineError> {
        self.log.push(format!("{}:{}", op, self.label));
        let delay = *self.fetch_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn page(&self, index: usize) -> Vec<String> {
        self.pages
            .lock()
            .get(&self.label)
            .and_then(|pages| pages.get(index).cloned())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Paginator for FakePaginator {
    type Item = String;

    async fn next_page(&self) -> Result<Vec<String>, EngineError> {
        self.before_fetch("next_page").await?;
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        Ok(self.page(index))
    }

    async fn reload(&self) -> Result<Vec<String>, EngineError> {
        self.before_fetch("reload").await?;
        let loaded = self.cursor.load(Ordering::SeqCst).max(1);
        self.cursor.store(loaded, Ordering::SeqCst);
        Ok((0..loaded).flat_map(|index| self.page(index)).collect())
    }

    fn disconnect(&self) {
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            self.log.push(format!("disconnect:{}", self.label));
        }
    }
}

// ---------------------------------------------------------------------------
// Watchers
// ---------------------------------------------------------------------------

pub(crate) type FakeSnapshot = ItemWithRelated<String, String>;

type ItemStore = Arc<Mutex<HashMap<ItemId, FakeSnapshot>>>;

#[derive(Default)]
pub(crate) struct FakeWatcherFactory {
    pub log: EventLog,
    items: ItemStore,
    created: AtomicUsize,
    fetches: AtomicUsize,
    create_delay: Mutex<Duration>,
    fetch_delay: Mutex<Duration>,
    failure: Mutex<Option<EngineError>>,
    callbacks: Mutex<Vec<UpdateCallback>>,
}

impl FakeWatcherFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_item(&self, id: &str, item: &str, related: Vec<&str>) {
        self.items.lock().insert(
            ItemId::new(id),
            ItemWithRelated {
                item: item.to_string(),
                related: related.into_iter().map(String::from).collect(),
            },
        );
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock() = delay;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = delay;
    }

    pub fn fail_next_fetch(&self, err: EngineError) {
        *self.failure.lock() = Some(err);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fire_update(&self) {
        let callback = self.callbacks.lock().last().cloned();
        if let Some(callback) = callback {
            callback();
        }
    }

    pub fn fire_update_of(&self, index: usize) {
        let callback = self.callbacks.lock().get(index).cloned();
        if let Some(callback) = callback {
            callback();
        }
    }
}

#[async_trait]
impl WatcherFactory for FakeWatcherFactory {
    type Item = String;
    type Related = String;
    type Watcher = FakeWatcher;

    async fn create_watcher(
        &self,
        _session: &Session,
        item_id: &ItemId,
        scope_label: &LabelId,
        on_update: UpdateCallback,
    ) -> Result<FakeWatcher, EngineError> {
        self.log.push(format!("create:{}:{}", item_id, scope_label));
        self.created.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.items.lock().contains_key(item_id) {
            return Err(EngineError::NotFound(item_id.to_string()));
        }
        self.callbacks.lock().push(on_update);

        Ok(FakeWatcher {
            item_id: item_id.clone(),
            items: self.items.clone(),
            disconnected: AtomicBool::new(false),
            log: self.log.clone(),
        })
    }

    async fn get_item(
        &self,
        _session: &Session,
        item_id: &ItemId,
        _scope_label: &LabelId,
    ) -> Result<FakeSnapshot, EngineError> {
        let delay = *self.fetch_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().take() {
            self.log.push(format!("get_item:{}:error", item_id));
            return Err(err);
        }
        let snapshot = self
            .items
            .lock()
            .get(item_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(item_id.to_string()))?;
        self.log.push(format!("get_item:{}:{}", item_id, snapshot.item));
        Ok(snapshot)
    }
}

pub(crate) struct FakeWatcher {
    item_id: ItemId,
    items: ItemStore,
    disconnected: AtomicBool,
    log: EventLog,
}

impl Watcher for FakeWatcher {
    type Item = String;
    type Related = String;

    fn snapshot(&self) -> FakeSnapshot {
        self.items
            .lock()
            .get(&self.item_id)
            .cloned()
            .unwrap_or_else(|| ItemWithRelated {
                item: String::new(),
                related: Vec::new(),
            })
    }

    fn disconnect(&self) {
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            self.log.push(format!("disconnect:{}", self.item_id));
        }
    }
}
