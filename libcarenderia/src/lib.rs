//! Carenderia - storefront client for a single restaurant
//!
//! This library holds everything behind the storefront screens: the typed
//! client for the restaurant's HTTP API, the small on-device key-value store,
//! and the state-holder stores (menu, favorites, reviews, session and coupon
//! wallet) that front-ends consume through [`Storefront`].

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod service;
pub mod storage;
pub mod types;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, Result, StorefrontError};
pub use service::{Alert, AlertKind, Storefront};
pub use types::{
    Coupon, CouponId, CouponStatus, FoodId, FoodItem, ImageUpload, ProfileUpdate, Registration,
    Review, ReviewDraft, ReviewTarget, Session, UserData,
};
pub use wallet::SyncState;
