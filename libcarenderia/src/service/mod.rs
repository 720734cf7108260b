//! Store layer for Carenderia
//!
//! Front-ends never talk to the backend or local storage directly. They go
//! through [`Storefront`], which is constructed once at startup and hands out
//! the individual stores:
//!
//! - `MenuStore`: the product catalogue
//! - `FavoritesStore`: device-local favorite items
//! - `ReviewsStore`: shop and food reviews with derived averages
//! - `AuthStore`: session, profile and the coupon wallet
//! - `EventBus`: change notifications for re-rendering
//!
//! # Example
//!
//! ```no_run
//! use libcarenderia::service::Storefront;
//!
//! # async fn example() -> libcarenderia::Result<()> {
//! let storefront = Storefront::new().await?;
//!
//! storefront.menu().refresh().await?;
//! for item in storefront.menu().items().await {
//!     let stars = storefront.reviews().average_food_rating(item.id).await;
//!     println!("{} ({:.1})", item.name, stars);
//! }
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod auth;
pub mod events;
pub mod favorites;
pub mod menu;
pub mod reviews;

pub use alert::{Alert, AlertKind};
pub use auth::AuthStore;
pub use events::{EventBus, EventReceiver, LogoutReason, StoreEvent};
pub use favorites::FavoritesStore;
pub use menu::MenuStore;
pub use reviews::ReviewsStore;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{Backend, HttpBackend};
use crate::config::{resolve_storage_path, Config};
use crate::error::{Result, StorefrontError};
use crate::storage::{MemoryStorage, SqliteStorage, Storage};

const EVENT_CAPACITY: usize = 100;

/// Facade owning every store
///
/// All stores share one backend, one storage and one event bus.
pub struct Storefront {
    backend: Arc<dyn Backend>,
    storage: Arc<dyn Storage>,
    menu: MenuStore,
    favorites: FavoritesStore,
    reviews: ReviewsStore,
    auth: AuthStore,
    event_bus: EventBus,
}

impl Storefront {
    /// Build from the configuration file
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or is invalid.
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Build the HTTP backend and on-disk storage described by `config`
    ///
    /// If the local database cannot be opened the storefront still starts,
    /// with volatile storage.
    pub async fn from_config(config: Config) -> Result<Self> {
        let db_path = resolve_storage_path(&config.storage.path);
        let db_path_str = db_path.to_str().ok_or_else(|| {
            StorefrontError::Config(crate::error::ConfigError::InvalidValue(format!(
                "Storage path is not valid UTF-8: {}",
                db_path.display()
            )))
        })?;

        let storage: Arc<dyn Storage> = match SqliteStorage::new(db_path_str).await {
            Ok(storage) => Arc::new(storage),
            Err(e) => {
                warn!(error = %e, path = %db_path.display(), "Local storage unavailable, using memory");
                Arc::new(MemoryStorage::new())
            }
        };

        let backend = HttpBackend::new(&config.api, Arc::clone(&storage))?;
        Ok(Self::from_parts(Arc::new(backend), storage).await)
    }

    /// Assemble from an existing backend and storage, then restore persisted state
    pub async fn from_parts(backend: Arc<dyn Backend>, storage: Arc<dyn Storage>) -> Self {
        let event_bus = EventBus::new(EVENT_CAPACITY);

        let menu = MenuStore::new(Arc::clone(&backend), event_bus.clone());
        let favorites = FavoritesStore::new(Arc::clone(&storage), event_bus.clone());
        let reviews = ReviewsStore::new(Arc::clone(&backend), event_bus.clone());
        let auth = AuthStore::new(Arc::clone(&backend), Arc::clone(&storage), event_bus.clone());

        favorites.load().await;
        auth.load().await;
        debug!(
            backend = backend.name(),
            storage = storage.backend_name(),
            "Storefront ready"
        );

        Self {
            backend,
            storage,
            menu,
            favorites,
            reviews,
            auth,
            event_bus,
        }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn menu(&self) -> &MenuStore {
        &self.menu
    }

    pub fn favorites(&self) -> &FavoritesStore {
        &self.favorites
    }

    pub fn reviews(&self) -> &ReviewsStore {
        &self.reviews
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Turn a failed operation into the alert to show
    ///
    /// An expired session forces a logout first, whichever store the error
    /// came from. Storage errors are logged as well.
    pub async fn handle_error(&self, err: &StorefrontError) -> Alert {
        match err {
            e if e.is_session_expired() => {
                if self.auth.is_logged_in().await {
                    self.auth.expire_session().await;
                }
            }
            StorefrontError::Storage(e) => warn!(error = %e, "Local storage error"),
            e => debug!(error = %e, "Operation failed"),
        }
        Alert::from(err)
    }
}
