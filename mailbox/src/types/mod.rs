pub mod error;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a mailbox user (account address or opaque account id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one authenticated session. A re-login yields a new id, which
/// changes every `ListingKey` derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Active session as handed out by the session resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
}

/// Mailbox label (folder or tag)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(String);

impl LabelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn inbox() -> Self {
        Self::new("inbox")
    }

    pub fn archive() -> Self {
        Self::new("archive")
    }

    pub fn sent() -> Self {
        Self::new("sent")
    }

    pub fn drafts() -> Self {
        Self::new("drafts")
    }

    pub fn trash() -> Self {
        Self::new("trash")
    }

    pub fn spam() -> Self {
        Self::new("spam")
    }

    pub fn starred() -> Self {
        Self::new("starred")
    }

    pub fn all_mail() -> Self {
        Self::new("all_mail")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read-status filter applied to a listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadStatus {
    #[default]
    All,
    Read,
    Unread,
}

/// Kind of listing a paginator serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingType {
    Conversations,
    Messages,
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversations => f.write_str("conversations"),
            Self::Messages => f.write_str("messages"),
        }
    }
}

/// Identity of one paginated listing. Equality drives paginator reuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingKey {
    pub session_id: SessionId,
    pub label: LabelId,
    pub read_status: ReadStatus,
}

/// Which page a caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageToLoad {
    /// Replace the cached listing with a fresh first page
    First,
    /// Append the next page
    Next,
    /// Everything loaded so far; served from cache unless an invalidation is pending
    All,
}

/// Page request as issued by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageKey {
    pub label: LabelId,
    pub read_status: ReadStatus,
    pub page_to_load: PageToLoad,
}

impl PageKey {
    pub fn new(label: LabelId, read_status: ReadStatus, page_to_load: PageToLoad) -> Self {
        Self {
            label,
            read_status,
            page_to_load,
        }
    }

    pub fn first(label: LabelId) -> Self {
        Self::new(label, ReadStatus::All, PageToLoad::First)
    }

    pub fn next(label: LabelId) -> Self {
        Self::new(label, ReadStatus::All, PageToLoad::Next)
    }

    pub fn all(label: LabelId) -> Self {
        Self::new(label, ReadStatus::All, PageToLoad::All)
    }
}

/// Identifier of a conversation or message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one live-watched detail item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchKey {
    pub user_id: UserId,
    pub item_id: ItemId,
    /// Label context used to filter the related items (e.g. which messages
    /// of a conversation are shown)
    pub scope_label: LabelId,
}

/// Signal that cached listing data may be stale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationEvent {
    ConversationsInvalidated { key: ListingKey },
    MessagesInvalidated { key: ListingKey },
}

impl InvalidationEvent {
    pub fn for_listing(listing_type: ListingType, key: ListingKey) -> Self {
        match listing_type {
            ListingType::Conversations => Self::ConversationsInvalidated { key },
            ListingType::Messages => Self::MessagesInvalidated { key },
        }
    }

    pub fn key(&self) -> &ListingKey {
        match self {
            Self::ConversationsInvalidated { key } | Self::MessagesInvalidated { key } => key,
        }
    }

    pub fn listing_type(&self) -> ListingType {
        match self {
            Self::ConversationsInvalidated { .. } => ListingType::Conversations,
            Self::MessagesInvalidated { .. } => ListingType::Messages,
        }
    }

    /// Whether this event concerns the given listing
    pub fn applies_to(&self, listing_type: ListingType, key: &ListingKey) -> bool {
        self.listing_type() == listing_type && self.key() == key
    }
}

/// Authoritative snapshot of a watched item plus its related items
/// (a conversation and its messages)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemWithRelated<I, R> {
    pub item: I,
    pub related: Vec<R>,
}

/// Identifier of one background fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FetchId(Uuid);

impl FetchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FetchId {
    fn default() -> Self {
        Self::new()
    }
}

/// Untagged progress event as emitted by one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchProgress {
    Started { id: FetchId, at: DateTime<Utc> },
    Ended { id: FetchId, at: DateTime<Utc> },
}

impl FetchProgress {
    pub fn started(id: FetchId) -> Self {
        Self::Started { id, at: Utc::now() }
    }

    pub fn ended(id: FetchId) -> Self {
        Self::Ended { id, at: Utc::now() }
    }

    /// Attach the producing source
    pub fn tagged(self, source: ListingType) -> FetchStatus {
        match self {
            Self::Started { id, at } => FetchStatus::Started { id, source, at },
            Self::Ended { id, at } => FetchStatus::Ended { id, source, at },
        }
    }
}

/// Progress event after merging, tagged with the source it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FetchStatus {
    Started {
        id: FetchId,
        source: ListingType,
        at: DateTime<Utc>,
    },
    Ended {
        id: FetchId,
        source: ListingType,
        at: DateTime<Utc>,
    },
}

impl FetchStatus {
    pub fn id(&self) -> FetchId {
        match self {
            Self::Started { id, .. } | Self::Ended { id, .. } => *id,
        }
    }

    pub fn source(&self) -> ListingType {
        match self {
            Self::Started { source, .. } | Self::Ended { source, .. } => *source,
        }
    }
}

/// Identity of a resource held in the scroller registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScrollerId(Uuid);

impl ScrollerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScrollerId {
    fn default() -> Self {
        Self::new()
    }
}
