//! Favorited menu items
//!
//! The favorites list is device-local: it lives only in [`Storage`] under
//! `favorites` and is written back after every change. A failed write is
//! logged and otherwise ignored; the in-memory list stays authoritative for
//! the rest of the session.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::events::{EventBus, StoreEvent};
use crate::storage::{load_json, save_json, Storage, FAVORITES_KEY};
use crate::types::{FoodId, FoodItem};

pub struct FavoritesStore {
    storage: Arc<dyn Storage>,
    event_bus: EventBus,
    ids: RwLock<Vec<FoodId>>,
}

impl FavoritesStore {
    pub fn new(storage: Arc<dyn Storage>, event_bus: EventBus) -> Self {
        Self {
            storage,
            event_bus,
            ids: RwLock::new(Vec::new()),
        }
    }

    /// Restore the persisted list, dropping duplicate ids
    ///
    /// A missing or unreadable entry leaves the list empty.
    pub async fn load(&self) {
        let stored: Vec<FoodId> = match load_json(self.storage.as_ref(), FAVORITES_KEY).await {
            Ok(Some(ids)) => ids,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load favorites, starting empty");
                Vec::new()
            }
        };

        let mut ids: Vec<FoodId> = Vec::with_capacity(stored.len());
        for id in stored {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }

        debug!(count = ids.len(), "Favorites loaded");
        *self.ids.write().await = ids;
    }

    pub async fn is_favorite(&self, id: FoodId) -> bool {
        self.ids.read().await.contains(&id)
    }

    /// Favorite ids, oldest first
    pub async fn favorites(&self) -> Vec<FoodId> {
        self.ids.read().await.clone()
    }

    /// Resolve favorites against a menu, skipping ids no longer on it
    pub async fn favorite_items(&self, menu: &[FoodItem]) -> Vec<FoodItem> {
        let ids = self.ids.read().await;
        ids.iter()
            .filter_map(|id| menu.iter().find(|item| item.id == *id).cloned())
            .collect()
    }

    /// Returns false if the item was already a favorite
    pub async fn add_favorite(&self, item: &FoodItem) -> bool {
        let mut ids = self.ids.write().await;
        if ids.contains(&item.id) {
            return false;
        }
        ids.push(item.id);
        self.persist(&ids).await;
        true
    }

    /// Returns false if the id was not a favorite
    pub async fn remove_favorite(&self, id: FoodId) -> bool {
        let mut ids = self.ids.write().await;
        let before = ids.len();
        ids.retain(|existing| *existing != id);
        if ids.len() == before {
            return false;
        }
        self.persist(&ids).await;
        true
    }

    async fn persist(&self, ids: &[FoodId]) {
        if let Err(e) = save_json(self.storage.as_ref(), FAVORITES_KEY, ids).await {
            warn!(error = %e, "Failed to persist favorites");
        }
        self.event_bus
            .emit(StoreEvent::FavoritesChanged { count: ids.len() });
    }
}
