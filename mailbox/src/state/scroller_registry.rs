//! Registry of paginators currently alive for a screen
//!
//! Torn down in bulk when the owning screen goes away.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::types::ScrollerId;

/// A resource that can be disconnected from the engine
pub trait Scroller: Send + Sync {
    fn id(&self) -> ScrollerId;

    /// Must be idempotent and must not panic
    fn disconnect(&self);
}

#[derive(Default)]
pub struct ScrollerRegistry {
    scrollers: Mutex<HashMap<ScrollerId, Arc<dyn Scroller>>>,
}

impl ScrollerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registering the same scroller twice has no additional effect
    pub fn register(&self, scroller: Arc<dyn Scroller>) {
        let id = scroller.id();
        let mut scrollers = self.scrollers.lock();
        if scrollers.insert(id, scroller).is_none() {
            debug!("Registered scroller {:?} ({} active)", id, scrollers.len());
        }
    }

    /// Safe to call for a scroller that was never registered
    pub fn unregister(&self, id: ScrollerId) {
        if self.scrollers.lock().remove(&id).is_some() {
            debug!("Unregistered scroller {:?}", id);
        }
    }

    /// Disconnect every registered scroller once and empty the registry
    pub fn disconnect_all(&self) {
        let drained: Vec<Arc<dyn Scroller>> = {
            let mut scrollers = self.scrollers.lock();
            scrollers.drain().map(|(_, scroller)| scroller).collect()
        };

        if drained.is_empty() {
            return;
        }

        info!("Disconnecting {} scrollers", drained.len());
        for scroller in drained {
            scroller.disconnect();
        }
    }

    pub fn contains(&self, id: ScrollerId) -> bool {
        self.scrollers.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.scrollers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingScroller {
        id: ScrollerId,
        disconnects: AtomicUsize,
    }

    impl CountingScroller {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                id: ScrollerId::new(),
                disconnects: AtomicUsize::new(0),
            })
        }

        fn disconnects(&self) -> usize {
            self.disconnects.load(Ordering::SeqCst)
        }
    }

    impl Scroller for CountingScroller {
        fn id(&self) -> ScrollerId {
            self.id
        }

        fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_disconnect_all_once() {
        let registry = ScrollerRegistry::new();
        let p1 = CountingScroller::new();
        let p2 = CountingScroller::new();

        registry.register(p1.clone());
        registry.register(p2.clone());
        registry.disconnect_all();

        assert_eq!(p1.disconnects(), 1);
        assert_eq!(p2.disconnects(), 1);
        assert!(registry.is_empty());

        registry.disconnect_all();
        assert_eq!(p1.disconnects(), 1);
        assert_eq!(p2.disconnects(), 1);
    }

    #[test]
    fn test_duplicate_register_disconnects_once() {
        let registry = ScrollerRegistry::new();
        let p1 = CountingScroller::new();

        registry.register(p1.clone());
        registry.register(p1.clone());
        assert_eq!(registry.len(), 1);

        registry.disconnect_all();
        assert_eq!(p1.disconnects(), 1);
    }

    #[test]
    fn test_unregistered_scroller_is_not_disconnected() {
        let registry = ScrollerRegistry::new();
        let p1 = CountingScroller::new();
        let p2 = CountingScroller::new();

        registry.register(p1.clone());
        registry.register(p2.clone());
        registry.unregister(p1.id());
        assert!(!registry.contains(p1.id()));

        registry.disconnect_all();
        assert_eq!(p1.disconnects(), 0);
        assert_eq!(p2.disconnects(), 1);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = ScrollerRegistry::new();
        let p1 = CountingScroller::new();

        registry.unregister(p1.id());
        registry.unregister(p1.id());
        assert!(registry.is_empty());
        registry.disconnect_all();
        assert_eq!(p1.disconnects(), 0);
    }
}
