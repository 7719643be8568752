//! Page cache shared by the paginator managers

mod paging_cache;

pub use paging_cache::{InvalidationMark, PagingCacheWithInvalidationFilter, Unseen};
