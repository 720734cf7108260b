//! Store change notifications
//!
//! Every store holds a clone of one [`EventBus`] and emits a [`StoreEvent`]
//! after its state changes, so a front-end can re-render without polling.
//!
//! The bus is a `tokio::sync::broadcast` channel. Emitting never blocks: with
//! no subscribers the event is dropped, and a lagging subscriber loses the
//! oldest events rather than holding up the store.
//!
//! # Example
//!
//! ```no_run
//! use libcarenderia::service::events::{EventBus, StoreEvent};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(64);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(StoreEvent::FavoritesChanged { count: 3 });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::CouponId;
use crate::wallet::SyncState;

pub type EventReceiver = broadcast::Receiver<StoreEvent>;

/// Multi-subscriber bus shared by all stores
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before old events are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: StoreEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Why the session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The user asked to log out
    UserRequested,
    /// An authenticated request was rejected
    SessionExpired,
    /// The account was deactivated
    Deactivated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    MenuRefreshed { items: usize },

    FavoritesChanged { count: usize },

    ReviewsRefreshed { shop: usize, food: usize },

    LoggedIn { username: String },

    LoggedOut { reason: LogoutReason },

    /// The coupon wallet mirror changed
    WalletChanged {
        coupons: usize,
        state: SyncState,
    },

    /// Emitted once per forced logout, before `LoggedOut`
    SessionExpired,

    CouponClaimed { id: CouponId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_emission_and_subscription() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.emit(StoreEvent::LoggedIn {
            username: "juan".to_string(),
        });

        match receiver.recv().await.unwrap() {
            StoreEvent::LoggedIn { username } => assert_eq!(username, "juan"),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        event_bus.emit(StoreEvent::FavoritesChanged { count: 2 });

        assert_eq!(
            receiver1.recv().await.unwrap(),
            StoreEvent::FavoritesChanged { count: 2 }
        );
        assert_eq!(
            receiver2.recv().await.unwrap(),
            StoreEvent::FavoritesChanged { count: 2 }
        );
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let event_bus = EventBus::new(10);

        // Must not panic or block
        event_bus.emit(StoreEvent::SessionExpired);

        assert_eq!(event_bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization() {
        let event = StoreEvent::LoggedOut {
            reason: LogoutReason::SessionExpired,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("logged_out"));
        assert!(json.contains("session_expired"));

        let deserialized: StoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[test]
    fn test_wallet_event_carries_sync_state() {
        let json = serde_json::to_string(&StoreEvent::WalletChanged {
            coupons: 1,
            state: SyncState::LocallyAhead,
        })
        .unwrap();
        assert!(json.contains("wallet_changed"));
        assert!(json.contains("locally_ahead"));
    }
}
