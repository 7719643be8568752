//! Mailbox data-access coordination
//!
//! Sits between a mail client's presentation layer and its query/storage
//! engine. Owns the lifecycle of engine paginators and watchers, caches
//! fetched pages, and turns engine change callbacks into cache
//! invalidations or snapshot streams.
//!
//! ## Module Organization
//!
//! - `backend/`: Engine contracts (sessions, paginators, watchers)
//! - `cache/`: Page cache with invalidation filter
//! - `state/`: Paginator and watcher managers, scroller registry
//! - `services/`: Mailbox facade, fetch-status merge, logging
//! - `types/`: Keys, events, snapshots and errors
//! - `config/`: Configuration management

pub mod backend;
pub mod cache;
pub mod config;
pub mod services;
pub mod state;
pub mod types;

pub use config::MailboxConfig;
pub use services::{MailboxService, MergedStatusStream, StatusMerger};
pub use state::{PaginatorManager, Scroller, ScrollerRegistry, WatcherManager};
pub use types::error::{EngineError, MailboxError, Result};
