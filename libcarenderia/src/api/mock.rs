//! In-memory backend for testing
//!
//! `MockBackend` behaves like a tiny restaurant server: it holds products,
//! reviews, coupons and accounts, issues fake tokens and records claims. Any
//! operation can be made to fail with a chosen [`ApiError`], and every call is
//! counted so tests can assert that an operation did (or did not) reach the
//! network.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

use super::Backend;
use crate::error::{ApiError, Result};
use crate::types::{
    Coupon, CouponId, CouponStatus, FoodItem, NewReview, ProfileUpdate, Registration, Review,
    Session, UserData,
};

#[derive(Default)]
struct MockState {
    products: Vec<FoodItem>,
    reviews: Vec<Review>,
    coupons: Vec<Coupon>,
    /// Server-side status overrides for claimed coupons
    claimed: HashMap<CouponId, CouponStatus>,
    accounts: HashMap<String, (String, UserData)>,
    deactivated: BTreeSet<String>,
    signed_in: Option<String>,
    reset_codes: HashMap<String, String>,
    failures: HashMap<String, ApiError>,
    calls: HashMap<String, usize>,
    holds: HashMap<String, Gate>,
}

/// A parked call, see [`MockBackend::hold`]
#[derive(Clone, Default)]
pub struct Gate {
    reached: Arc<Notify>,
    release: Arc<Notify>,
}

impl Gate {
    /// Wait until the held call has started
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let the held call continue
    pub fn open(&self) {
        self.release.notify_one();
    }
}

/// Mock backend for testing
///
/// Cloning shares state, so a test can keep a handle while the stores own
/// another.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn pause_if_held(&self, op: &str) {
        let gate = self.state().holds.remove(op);
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
    }

    /// Count the call, then fail if a failure was injected for `op`
    fn enter(&self, op: &str) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        *state.calls.entry(op.to_string()).or_insert(0) += 1;
        if let Some(error) = state.failures.get(op) {
            return Err(error.clone().into());
        }
        Ok(state)
    }

    fn require_session(state: &MockState) -> Result<String> {
        state
            .signed_in
            .clone()
            .ok_or_else(|| {
                ApiError::Unauthorized("Authentication credentials were not provided.".to_string())
                    .into()
            })
    }

    pub fn with_products(self, products: Vec<FoodItem>) -> Self {
        self.state().products = products;
        self
    }

    pub fn with_coupons(self, coupons: Vec<Coupon>) -> Self {
        self.state().coupons = coupons;
        self
    }

    pub fn with_reviews(self, reviews: Vec<Review>) -> Self {
        self.state().reviews = reviews;
        self
    }

    pub fn with_account(self, user: UserData, password: &str) -> Self {
        self.state()
            .accounts
            .insert(user.username.clone(), (password.to_string(), user));
        self
    }

    /// Make every subsequent `op` call fail with `error`
    pub fn fail(&self, op: &str, error: ApiError) {
        self.state().failures.insert(op.to_string(), error);
    }

    /// Park the next `op` call before it touches server state, until the
    /// returned gate is opened. Honoured by `claim_coupon` and
    /// `list_claimed_coupons`.
    pub fn hold(&self, op: &str) -> Gate {
        let gate = Gate::default();
        self.state().holds.insert(op.to_string(), gate.clone());
        gate
    }

    pub fn clear_failure(&self, op: &str) {
        self.state().failures.remove(op);
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state().calls.get(op).copied().unwrap_or(0)
    }

    /// Pretend the server changed a claimed coupon's status on its own
    pub fn set_claimed_status(&self, id: CouponId, status: CouponStatus) {
        self.state().claimed.insert(id, status);
    }

    pub fn claimed_ids(&self) -> Vec<CouponId> {
        let mut ids: Vec<CouponId> = self.state().claimed.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn review_count(&self) -> usize {
        self.state().reviews.len()
    }

    pub fn is_deactivated(&self, username: &str) -> bool {
        self.state().deactivated.contains(username)
    }

    /// The one-time code "sent" to `email`
    pub fn reset_code_for(&self, email: &str) -> Option<String> {
        self.state().reset_codes.get(email).cloned()
    }

    /// Forget the server-side session, as if the token expired
    pub fn expire_session(&self) {
        self.state().signed_in = None;
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn obtain_token(&self, username: &str, password: &SecretString) -> Result<Session> {
        let mut state = self.enter("obtain_token")?;
        let valid = !state.deactivated.contains(username)
            && state
                .accounts
                .get(username)
                .map(|(stored, _)| stored == password.expose_secret())
                .unwrap_or(false);
        if !valid {
            return Err(ApiError::Validation(
                "No active account found with the given credentials".to_string(),
            )
            .into());
        }
        state.signed_in = Some(username.to_string());
        Ok(Session::new(
            format!("access-{}", username),
            format!("refresh-{}", username),
        ))
    }

    async fn register(&self, registration: &Registration) -> Result<UserData> {
        let mut state = self.enter("register")?;
        if state.accounts.contains_key(&registration.username) {
            return Err(ApiError::Validation(
                "username: A user with that username already exists.".to_string(),
            )
            .into());
        }
        let user = UserData {
            username: registration.username.clone(),
            email: registration.email.clone(),
            first_name: registration.first_name.clone(),
            middle_name: registration.middle_name.clone(),
            last_name: registration.last_name.clone(),
            profile_picture: None,
            phone: registration.phone.clone(),
            address: registration.address.clone(),
        };
        state.accounts.insert(
            user.username.clone(),
            (registration.password.expose_secret().to_string(), user.clone()),
        );
        Ok(user)
    }

    async fn current_user(&self) -> Result<UserData> {
        let state = self.enter("current_user")?;
        let username = Self::require_session(&state)?;
        state
            .accounts
            .get(&username)
            .map(|(_, user)| user.clone())
            .ok_or_else(|| ApiError::NotFound(format!("user {}", username)).into())
    }

    async fn update_user(&self, update: &ProfileUpdate) -> Result<UserData> {
        let mut state = self.enter("update_user")?;
        let username = Self::require_session(&state)?;
        let (_, user) = state
            .accounts
            .get_mut(&username)
            .ok_or_else(|| ApiError::NotFound(format!("user {}", username)))?;

        let apply = |field: &mut Option<String>, value: &Option<String>| {
            if let Some(v) = value {
                *field = Some(v.clone());
            }
        };
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        apply(&mut user.first_name, &update.first_name);
        apply(&mut user.middle_name, &update.middle_name);
        apply(&mut user.last_name, &update.last_name);
        apply(&mut user.phone, &update.phone);
        apply(&mut user.address, &update.address);
        Ok(user.clone())
    }

    async fn deactivate_account(&self, password: &SecretString) -> Result<()> {
        let mut state = self.enter("deactivate_account")?;
        let username = Self::require_session(&state)?;
        let matches = state
            .accounts
            .get(&username)
            .map(|(stored, _)| stored == password.expose_secret())
            .unwrap_or(false);
        if !matches {
            return Err(ApiError::Validation("Incorrect password.".to_string()).into());
        }
        state.deactivated.insert(username);
        state.signed_in = None;
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<FoodItem>> {
        let state = self.enter("list_products")?;
        Ok(state.products.clone())
    }

    async fn list_reviews(&self) -> Result<Vec<Review>> {
        let state = self.enter("list_reviews")?;
        Ok(state.reviews.clone())
    }

    async fn create_review(&self, review: &NewReview) -> Result<Review> {
        let mut state = self.enter("create_review")?;
        let author = Self::require_session(&state)?;
        let id = state.reviews.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let created = Review {
            id,
            author,
            target: review.target,
            rating: review.rating,
            comment: review.comment.clone(),
            image: review
                .image
                .as_ref()
                .map(|img| format!("/media/reviews/{}", img.file_name)),
            created_at: Utc::now(),
        };
        state.reviews.push(created.clone());
        Ok(created)
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let state = self.enter("list_coupons")?;
        Ok(state.coupons.clone())
    }

    async fn list_claimed_coupons(&self) -> Result<Vec<Coupon>> {
        self.pause_if_held("list_claimed_coupons").await;
        let state = self.enter("list_claimed_coupons")?;
        Self::require_session(&state)?;
        Ok(state
            .coupons
            .iter()
            .filter_map(|c| {
                state.claimed.get(&c.id).map(|status| Coupon {
                    status: *status,
                    ..c.clone()
                })
            })
            .collect())
    }

    async fn claim_coupon(&self, id: CouponId) -> Result<()> {
        self.pause_if_held("claim_coupon").await;
        let mut state = self.enter("claim_coupon")?;
        Self::require_session(&state)?;
        if !state.coupons.iter().any(|c| c.id == id) {
            return Err(ApiError::NotFound(format!("coupon {}", id)).into());
        }
        if state.claimed.contains_key(&id) {
            return Err(ApiError::Validation("Coupon already claimed.".to_string()).into());
        }
        state.claimed.insert(id, CouponStatus::Claimed);
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<()> {
        let mut state = self.enter("request_password_reset")?;
        let known = state.accounts.values().any(|(_, user)| user.email == email);
        if !known {
            return Err(ApiError::NotFound("No account uses that email.".to_string()).into());
        }
        let code = format!("{:06}", 100_000 + state.reset_codes.len());
        state.reset_codes.insert(email.to_string(), code);
        Ok(())
    }

    async fn verify_reset_code(&self, email: &str, code: &str) -> Result<()> {
        let state = self.enter("verify_reset_code")?;
        match state.reset_codes.get(email) {
            Some(expected) if expected == code => Ok(()),
            _ => Err(ApiError::Validation("Invalid or expired code.".to_string()).into()),
        }
    }

    async fn change_password(
        &self,
        email: &str,
        code: &str,
        new_password: &SecretString,
    ) -> Result<()> {
        let mut state = self.enter("change_password")?;
        if state.reset_codes.get(email).map(String::as_str) != Some(code) {
            return Err(ApiError::Validation("Invalid or expired code.".to_string()).into());
        }
        state.reset_codes.remove(email);
        let account = state
            .accounts
            .values_mut()
            .find(|account| account.1.email == email)
            .ok_or_else(|| ApiError::NotFound("No account uses that email.".to_string()))?;
        account.0 = new_password.expose_secret().to_string();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
