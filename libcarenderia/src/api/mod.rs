//! Backend API abstraction
//!
//! All persistent state (products, reviews, coupons, accounts) lives on the
//! restaurant's backend. The stores only ever talk to it through [`Backend`],
//! which has a real HTTP implementation and an in-memory one for tests.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use libcarenderia::api::{Backend, HttpBackend};
//! use libcarenderia::config::ApiConfig;
//! use libcarenderia::storage::MemoryStorage;
//!
//! # async fn example() -> libcarenderia::Result<()> {
//! let storage = Arc::new(MemoryStorage::new());
//! let backend = HttpBackend::new(&ApiConfig::default(), storage)?;
//!
//! for item in backend.list_products().await? {
//!     println!("{} - PHP {:.2}", item.name, item.price);
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::Result;
use crate::types::{
    Coupon, CouponId, FoodItem, NewReview, ProfileUpdate, Registration, Review, Session, UserData,
};

pub mod dto;
pub mod http;

// Available for all builds (not just tests) so integration tests can use it
pub mod mock;

pub use http::HttpBackend;
pub use mock::MockBackend;

/// Every endpoint the storefront consumes
///
/// Calls marked "authenticated" carry the stored bearer token; an
/// `ApiError::Unauthorized` from them means the session is no longer valid.
/// Unauthenticated calls report rejected credentials as
/// `ApiError::Validation` instead.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Exchange credentials for an access/refresh token pair
    async fn obtain_token(&self, username: &str, password: &SecretString) -> Result<Session>;

    async fn register(&self, registration: &Registration) -> Result<UserData>;

    /// Authenticated
    async fn current_user(&self) -> Result<UserData>;

    /// Authenticated
    async fn update_user(&self, update: &ProfileUpdate) -> Result<UserData>;

    /// Authenticated; the password is re-checked server-side
    async fn deactivate_account(&self, password: &SecretString) -> Result<()>;

    async fn list_products(&self) -> Result<Vec<FoodItem>>;

    /// Every review, shop and food alike
    async fn list_reviews(&self) -> Result<Vec<Review>>;

    /// Authenticated; not idempotent, a resubmission creates a duplicate
    async fn create_review(&self, review: &NewReview) -> Result<Review>;

    /// All promotional coupons
    async fn list_coupons(&self) -> Result<Vec<Coupon>>;

    /// Authenticated; the caller's claimed coupons with their server status
    async fn list_claimed_coupons(&self) -> Result<Vec<Coupon>>;

    /// Authenticated
    async fn claim_coupon(&self, id: CouponId) -> Result<()>;

    /// Send a one-time password to `email`
    async fn request_password_reset(&self, email: &str) -> Result<()>;

    async fn verify_reset_code(&self, email: &str, code: &str) -> Result<()>;

    async fn change_password(
        &self,
        email: &str,
        code: &str,
        new_password: &SecretString,
    ) -> Result<()>;

    /// Lowercase identifier for logs ("http", "mock")
    fn name(&self) -> &str;
}
