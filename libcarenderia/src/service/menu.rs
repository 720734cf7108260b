//! Menu catalogue
//!
//! A read-through cache of the backend's product listing. Nothing here is
//! persisted; the menu is fetched again on every start.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::events::{EventBus, StoreEvent};
use crate::api::Backend;
use crate::types::{FoodId, FoodItem};
use crate::Result;

pub struct MenuStore {
    backend: Arc<dyn Backend>,
    event_bus: EventBus,
    items: RwLock<Vec<FoodItem>>,
}

impl MenuStore {
    pub fn new(backend: Arc<dyn Backend>, event_bus: EventBus) -> Self {
        Self {
            backend,
            event_bus,
            items: RwLock::new(Vec::new()),
        }
    }

    /// Fetch the product listing, replacing the cached menu
    ///
    /// # Errors
    ///
    /// Returns the backend error; the previous menu is kept.
    pub async fn refresh(&self) -> Result<Vec<FoodItem>> {
        let products = self.backend.list_products().await?;
        debug!(count = products.len(), "Menu refreshed");

        *self.items.write().await = products.clone();
        self.event_bus.emit(StoreEvent::MenuRefreshed {
            items: products.len(),
        });
        Ok(products)
    }

    pub async fn items(&self) -> Vec<FoodItem> {
        self.items.read().await.clone()
    }

    pub async fn item(&self, id: FoodId) -> Option<FoodItem> {
        self.items.read().await.iter().find(|i| i.id == id).cloned()
    }

    /// Distinct categories in first-seen order
    pub async fn categories(&self) -> Vec<String> {
        let items = self.items.read().await;
        let mut categories: Vec<String> = Vec::new();
        for item in items.iter() {
            if !categories.iter().any(|c| c == &item.category) {
                categories.push(item.category.clone());
            }
        }
        categories
    }

    pub async fn by_category(&self, category: &str) -> Vec<FoodItem> {
        self.items
            .read()
            .await
            .iter()
            .filter(|i| i.category.eq_ignore_ascii_case(category))
            .cloned()
            .collect()
    }

    /// Case-insensitive match on name or description
    pub async fn search(&self, term: &str) -> Vec<FoodItem> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return self.items().await;
        }

        self.items
            .read()
            .await
            .iter()
            .filter(|i| {
                i.name.to_lowercase().contains(&needle)
                    || i.description.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockBackend;
    use crate::error::ApiError;

    fn food(id: FoodId, name: &str, category: &str) -> FoodItem {
        FoodItem {
            id,
            name: name.to_string(),
            description: format!("Classic {}", name.to_lowercase()),
            image: None,
            category: category.to_string(),
            price: 120.0,
            available: true,
        }
    }

    fn store(backend: MockBackend) -> MenuStore {
        MenuStore::new(Arc::new(backend), EventBus::new(16))
    }

    #[tokio::test]
    async fn test_refresh_and_query() {
        let backend = MockBackend::new().with_products(vec![
            food(1, "Adobo", "Ulam"),
            food(2, "Halo-Halo", "Dessert"),
            food(3, "Sinigang", "Ulam"),
        ]);
        let menu = store(backend);

        assert!(menu.items().await.is_empty());
        assert_eq!(menu.refresh().await.unwrap().len(), 3);

        assert_eq!(menu.categories().await, vec!["Ulam", "Dessert"]);
        assert_eq!(menu.by_category("ulam").await.len(), 2);
        assert_eq!(menu.item(2).await.unwrap().name, "Halo-Halo");
        assert!(menu.item(99).await.is_none());
    }

    #[tokio::test]
    async fn test_search_matches_name_and_description() {
        let backend = MockBackend::new().with_products(vec![
            food(1, "Adobo", "Ulam"),
            food(2, "Halo-Halo", "Dessert"),
        ]);
        let menu = store(backend);
        menu.refresh().await.unwrap();

        assert_eq!(menu.search("ADOBO").await.len(), 1);
        assert_eq!(menu.search("classic").await.len(), 2);
        assert_eq!(menu.search("  ").await.len(), 2);
        assert!(menu.search("lechon").await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_menu() {
        let backend = MockBackend::new().with_products(vec![food(1, "Adobo", "Ulam")]);
        let menu = store(backend.clone());
        menu.refresh().await.unwrap();

        backend.fail("list_products", ApiError::Network("offline".to_string()));
        assert!(menu.refresh().await.is_err());
        assert_eq!(menu.items().await.len(), 1);
    }
}
