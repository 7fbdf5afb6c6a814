// MIT License

//! Event fan-out to subscribers.
//!
//! One dispatcher per bridge connection. Subscribers are held weakly: the
//! adapter's own Arc is the owning handle, and a dropped adapter simply
//! stops receiving without anyone having to deregister it. Dead bindings
//! are skipped at dispatch time and left in the list; the bounded leak of
//! inert entries is accepted in exchange for never touching the list from
//! a destructor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::event::BridgeEvent;

/// Receives every event read from the bridge.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn handle_event(
        &self,
        event: &BridgeEvent,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Returned by [`Dispatcher::register`]; identifies the subscription for an
/// explicit [`Dispatcher::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle(u64);

struct Subscription {
    id: u64,
    target: Weak<dyn EventSubscriber>,
}

/// Holds the subscriber list for one bridge connection.
#[derive(Default)]
pub struct Dispatcher {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. Only a weak reference is kept; the caller's
    /// Arc remains the owner of the subscriber's lifetime.
    pub async fn register<S: EventSubscriber + 'static>(
        &self,
        subscriber: &Arc<S>,
    ) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let strong: Arc<dyn EventSubscriber> = subscriber.clone();
        let target: Weak<dyn EventSubscriber> = Arc::downgrade(&strong);
        self.subscriptions
            .lock()
            .await
            .push(Subscription { id, target });
        SubscriptionHandle(id)
    }

    /// Remove a subscription explicitly. Dropping the subscriber works too;
    /// this just makes the removal deterministic.
    pub async fn unregister(&self, handle: SubscriptionHandle) {
        self.subscriptions
            .lock()
            .await
            .retain(|subscription| subscription.id != handle.0);
    }

    /// Deliver one event to every live subscriber, sequentially, in
    /// registration order, awaiting each handler before the next. One slow
    /// handler delays the rest for this event; a failing handler is logged
    /// and never interrupts delivery to the ones after it.
    pub async fn dispatch(&self, event: &BridgeEvent) {
        let targets: Vec<Weak<dyn EventSubscriber>> = {
            let subscriptions = self.subscriptions.lock().await;
            subscriptions.iter().map(|s| s.target.clone()).collect()
        };

        for target in targets {
            let Some(subscriber) = target.upgrade() else {
                continue; // subscriber dropped; binding stays inert
            };
            if let Err(e) = subscriber.handle_event(event).await {
                warn!("Event handler failed: {}", e);
            }
        }
    }
}
