//! Services exposed to the presentation layer
//!
//! - `mailbox_service`: facade over the managers and the scroller registry
//! - `fetch_status`: merge of per-listing fetch-progress streams
//! - `logger`: tracing setup helpers

pub mod fetch_status;
pub mod logger;
pub mod mailbox_service;

pub use fetch_status::{MergedStatusStream, StatusMerger};
pub use mailbox_service::MailboxService;
