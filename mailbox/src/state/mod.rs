//! Coordination state
//!
//! The managers own every engine handle; callers only ever see items,
//! snapshots and streams. Each manager keeps one slot per user identity so
//! unrelated identities never contend.

pub mod paginator_manager;
pub mod scroller_registry;
pub mod watcher_manager;

pub use paginator_manager::PaginatorManager;
pub use scroller_registry::{Scroller, ScrollerRegistry};
pub use watcher_manager::{RelatedStream, SnapshotStream, WatcherManager};
