//! Session, profile and coupon wallet
//!
//! The store is either logged out or logged in. It moves to logged in once a
//! session has been persisted and the profile fetched, and back to logged out
//! on [`AuthStore::logout`] or whenever an authenticated request comes back
//! `Unauthorized` (the session has expired server-side).
//!
//! The coupon wallet is kept here too, since claimed coupons belong to the
//! logged-in user. See [`crate::wallet`] for how the local mirror is
//! reconciled with the server.
//!
//! Storage failures never fail an operation: they are logged and the in-memory
//! state carries on.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::events::{EventBus, LogoutReason, StoreEvent};
use crate::api::Backend;
use crate::error::{Result, StorefrontError};
use crate::storage::{
    load_json, save_json, Storage, ACCESS_TOKEN_KEY, COUPON_WALLET_KEY, REFRESH_TOKEN_KEY,
    USER_DATA_KEY,
};
use crate::types::{
    Coupon, CouponId, CouponStatus, ProfileUpdate, Registration, Session, UserData,
};
use crate::wallet::{Redemption, SyncState, Wallet, WalletEntry};

#[derive(Debug, Default)]
struct AuthState {
    user: Option<UserData>,
    wallet: Wallet,
}

pub struct AuthStore {
    backend: Arc<dyn Backend>,
    storage: Arc<dyn Storage>,
    event_bus: EventBus,
    state: RwLock<AuthState>,
}

impl AuthStore {
    pub fn new(backend: Arc<dyn Backend>, storage: Arc<dyn Storage>, event_bus: EventBus) -> Self {
        Self {
            backend,
            storage,
            event_bus,
            state: RwLock::new(AuthState::default()),
        }
    }

    /// Restore the persisted session, profile and wallet
    ///
    /// The user counts as logged in only when both an access token and a
    /// cached profile are present.
    pub async fn load(&self) {
        let token = match self.storage.get(ACCESS_TOKEN_KEY).await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read access token");
                None
            }
        };

        let user = match load_json::<UserData>(self.storage.as_ref(), USER_DATA_KEY).await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Failed to read cached profile");
                None
            }
        };

        let wallet = match load_json::<Wallet>(self.storage.as_ref(), COUPON_WALLET_KEY).await {
            Ok(wallet) => wallet.map(Wallet::restored).unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to read coupon wallet");
                Wallet::new()
            }
        };

        let mut state = self.state.write().await;
        state.user = token.and(user);
        // A wallet left behind without a session belongs to nobody
        state.wallet = if state.user.is_some() {
            wallet
        } else {
            Wallet::new()
        };
        debug!(
            logged_in = state.user.is_some(),
            coupons = state.wallet.len(),
            "Auth state loaded"
        );
    }

    pub async fn is_logged_in(&self) -> bool {
        self.state.read().await.user.is_some()
    }

    pub async fn user(&self) -> Option<UserData> {
        self.state.read().await.user.clone()
    }

    /// Claimed coupons in claim order; empty when logged out
    pub async fn claimed_coupons(&self) -> Vec<Coupon> {
        self.state.read().await.wallet.coupons()
    }

    pub async fn wallet_entries(&self) -> Vec<WalletEntry> {
        self.state.read().await.wallet.entries().to_vec()
    }

    pub async fn wallet_sync_state(&self) -> SyncState {
        self.state.read().await.wallet.state()
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Exchange credentials for a session and log in
    ///
    /// # Errors
    ///
    /// Rejected credentials surface as `ApiError::Validation`.
    pub async fn sign_in(&self, username: &str, password: &SecretString) -> Result<UserData> {
        if username.trim().is_empty() || password.expose_secret().is_empty() {
            return Err(StorefrontError::InvalidInput(
                "Username and password are required".to_string(),
            ));
        }

        let session = self.backend.obtain_token(username.trim(), password).await?;
        // The profile request authenticates with the stored token
        self.persist_session(&session).await;

        let user = match self.backend.current_user().await {
            Ok(user) => user,
            Err(e) => {
                self.clear_persisted(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]).await;
                return Err(e);
            }
        };

        self.login(user.clone(), session).await;
        Ok(user)
    }

    /// Persist the session, mark the user logged in and refresh the wallet
    ///
    /// A failed wallet refresh is logged; the login itself still stands unless
    /// the refresh shows the session is already invalid.
    pub async fn login(&self, user: UserData, session: Session) {
        self.persist_session(&session).await;
        if let Err(e) = save_json(self.storage.as_ref(), USER_DATA_KEY, &user).await {
            warn!(error = %e, "Failed to persist profile");
        }

        let username = user.username.clone();
        self.state.write().await.user = Some(user);
        info!(username = %username, "Logged in");
        self.event_bus.emit(StoreEvent::LoggedIn { username });

        if let Err(e) = self.refresh_wallet().await {
            warn!(error = %e, "Wallet refresh after login failed");
        }
    }

    pub async fn logout(&self) {
        self.end_session(LogoutReason::UserRequested).await;
    }

    /// Forced logout after the backend rejected the session
    pub async fn expire_session(&self) {
        self.end_session(LogoutReason::SessionExpired).await;
    }

    async fn end_session(&self, reason: LogoutReason) {
        self.clear_persisted(&[
            ACCESS_TOKEN_KEY,
            REFRESH_TOKEN_KEY,
            USER_DATA_KEY,
            COUPON_WALLET_KEY,
        ])
        .await;

        let was_logged_in = {
            let mut state = self.state.write().await;
            state.wallet.clear();
            state.user.take().is_some()
        };

        if was_logged_in {
            info!(?reason, "Logged out");
            if reason == LogoutReason::SessionExpired {
                self.event_bus.emit(StoreEvent::SessionExpired);
            }
            self.event_bus.emit(StoreEvent::LoggedOut { reason });
        }
    }

    // ------------------------------------------------------------------
    // Account
    // ------------------------------------------------------------------

    /// Create an account. Does not log in.
    pub async fn sign_up(&self, registration: &Registration) -> Result<UserData> {
        if registration.username.trim().is_empty() {
            return Err(StorefrontError::InvalidInput("Username is required".to_string()));
        }
        if !registration.email.contains('@') {
            return Err(StorefrontError::InvalidInput(format!(
                "Invalid email address: {}",
                registration.email
            )));
        }
        if registration.password.expose_secret().is_empty() {
            return Err(StorefrontError::InvalidInput("Password is required".to_string()));
        }

        let user = self.backend.register(registration).await?;
        info!(username = %user.username, "Account created");
        Ok(user)
    }

    /// Re-fetch the profile from the backend
    pub async fn refresh_profile(&self) -> Result<UserData> {
        self.require_login("view your profile").await?;
        let user = self.authenticated(self.backend.current_user().await).await?;
        self.store_profile(&user).await;
        Ok(user)
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserData> {
        self.require_login("edit your profile").await?;
        if update.is_empty() {
            return Err(StorefrontError::InvalidInput("Nothing to update".to_string()));
        }

        let user = self
            .authenticated(self.backend.update_user(update).await)
            .await?;
        self.store_profile(&user).await;
        Ok(user)
    }

    /// Deactivate the account (password re-checked server-side), then log out
    pub async fn deactivate_account(&self, password: &SecretString) -> Result<()> {
        self.require_login("deactivate your account").await?;
        self.authenticated(self.backend.deactivate_account(password).await)
            .await?;
        self.end_session(LogoutReason::Deactivated).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Coupons
    // ------------------------------------------------------------------

    /// Reconcile the wallet with the server's claimed-coupon listing
    pub async fn refresh_wallet(&self) -> Result<SyncState> {
        self.require_login("view your coupons").await?;
        let remote = self
            .authenticated(self.backend.list_claimed_coupons().await)
            .await?;

        let mut state = self.state.write().await;
        if state.user.is_none() {
            // Logged out while the listing was in flight
            return Ok(state.wallet.state());
        }
        let changed = state.wallet.reconcile(remote);
        if changed {
            self.persist_wallet(&state.wallet).await;
        }
        let sync = state.wallet.state();
        debug!(changed, ?sync, "Wallet reconciled");
        self.event_bus.emit(StoreEvent::WalletChanged {
            coupons: state.wallet.len(),
            state: sync,
        });
        Ok(sync)
    }

    /// Every promotional coupon, with wallet status and expiry applied
    pub async fn available_coupons(&self) -> Result<Vec<Coupon>> {
        let coupons = self.backend.list_coupons().await?;
        let today = today();
        let state = self.state.read().await;

        Ok(coupons
            .into_iter()
            .map(|coupon| {
                let mut coupon = match state.wallet.get(coupon.id) {
                    Some(entry) => Coupon {
                        status: entry.coupon.status,
                        ..coupon
                    },
                    None => coupon,
                };
                coupon.status = coupon.effective_status(today);
                coupon
            })
            .collect())
    }

    /// Claim a coupon for the logged-in user
    ///
    /// Returns `Ok(false)` without contacting the backend when the coupon is
    /// already in the wallet.
    ///
    /// # Errors
    ///
    /// `LoginRequired` when logged out, `InvalidInput` for an expired coupon,
    /// otherwise the backend error.
    pub async fn claim_coupon(&self, coupon: &Coupon) -> Result<bool> {
        {
            let state = self.state.read().await;
            if state.user.is_none() {
                return Err(StorefrontError::LoginRequired(format!(
                    "You need to have an account to claim: {}",
                    coupon.name
                )));
            }
            if state.wallet.contains(coupon.id) {
                debug!(coupon_id = coupon.id, "Coupon already in wallet");
                return Ok(false);
            }
        }

        if coupon.is_expired(today()) {
            return Err(StorefrontError::InvalidInput(format!(
                "{} expired on {}",
                coupon.name, coupon.expires_on
            )));
        }

        self.authenticated(self.backend.claim_coupon(coupon.id).await)
            .await?;

        let mut state = self.state.write().await;
        if state.user.is_none() {
            // Logged out while the claim was in flight
            return Err(StorefrontError::LoginRequired(format!(
                "You need to have an account to claim: {}",
                coupon.name
            )));
        }
        let inserted = state.wallet.insert_claimed(coupon);
        if inserted {
            self.persist_wallet(&state.wallet).await;
            info!(coupon_id = coupon.id, "Coupon claimed");
            self.event_bus.emit(StoreEvent::CouponClaimed { id: coupon.id });
            self.emit_wallet_changed(&state.wallet);
        }
        Ok(inserted)
    }

    /// Mark a wallet coupon as used. Local only; see [`crate::wallet`].
    ///
    /// Returns `Ok(false)` when the coupon is not in the wallet.
    ///
    /// # Errors
    ///
    /// `InvalidInput` unless the coupon is claimed and not yet expired.
    pub async fn mark_redeemed(&self, id: CouponId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.wallet.mark_redeemed(id, today()) {
            Redemption::Redeemed => {
                self.persist_wallet(&state.wallet).await;
                info!(coupon_id = id, "Coupon redeemed");
                self.emit_wallet_changed(&state.wallet);
                Ok(true)
            }
            Redemption::NotInWallet => Ok(false),
            Redemption::NotRedeemable(CouponStatus::Redeemed) => Err(
                StorefrontError::InvalidInput(format!("Coupon {} was already redeemed", id)),
            ),
            Redemption::NotRedeemable(status) => Err(StorefrontError::InvalidInput(format!(
                "Coupon {} is {} and cannot be redeemed",
                id,
                status.to_string().to_lowercase()
            ))),
        }
    }

    pub async fn remove_from_wallet(&self, id: CouponId) -> bool {
        let mut state = self.state.write().await;
        if state.wallet.remove(id).is_none() {
            return false;
        }
        self.persist_wallet(&state.wallet).await;
        self.emit_wallet_changed(&state.wallet);
        true
    }

    // ------------------------------------------------------------------
    // Password reset
    // ------------------------------------------------------------------

    /// Ask the backend to email a one-time code
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = validate_email(email)?;
        self.backend.request_password_reset(email).await?;
        info!("Password reset code requested");
        Ok(())
    }

    pub async fn verify_reset_code(&self, email: &str, code: &str) -> Result<()> {
        let email = validate_email(email)?;
        let code = code.trim();
        if code.is_empty() {
            return Err(StorefrontError::InvalidInput("Enter the code from the email".to_string()));
        }
        self.backend.verify_reset_code(email, code).await
    }

    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &SecretString,
    ) -> Result<()> {
        let email = validate_email(email)?;
        if new_password.expose_secret().is_empty() {
            return Err(StorefrontError::InvalidInput("Password is required".to_string()));
        }
        self.backend
            .change_password(email, code.trim(), new_password)
            .await?;
        info!("Password changed");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Force a logout when an authenticated call reports the session expired
    async fn authenticated<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_session_expired() {
                warn!(error = %e, "Session rejected by backend");
                self.expire_session().await;
            }
        }
        result
    }

    async fn require_login(&self, action: &str) -> Result<()> {
        if self.is_logged_in().await {
            Ok(())
        } else {
            Err(StorefrontError::LoginRequired(format!(
                "You need to log in to {}",
                action
            )))
        }
    }

    async fn store_profile(&self, user: &UserData) {
        if let Err(e) = save_json(self.storage.as_ref(), USER_DATA_KEY, user).await {
            warn!(error = %e, "Failed to persist profile");
        }
        let mut state = self.state.write().await;
        if state.user.is_some() {
            state.user = Some(user.clone());
        }
    }

    async fn persist_session(&self, session: &Session) {
        for (key, value) in [
            (ACCESS_TOKEN_KEY, &session.access_token),
            (REFRESH_TOKEN_KEY, &session.refresh_token),
        ] {
            if let Err(e) = self.storage.set(key, value).await {
                warn!(error = %e, key, "Failed to persist session");
            }
        }
    }

    async fn persist_wallet(&self, wallet: &Wallet) {
        if let Err(e) = save_json(self.storage.as_ref(), COUPON_WALLET_KEY, wallet).await {
            warn!(error = %e, "Failed to persist coupon wallet");
        }
    }

    async fn clear_persisted(&self, keys: &[&str]) {
        for key in keys {
            if let Err(e) = self.storage.remove(key).await {
                warn!(error = %e, key = *key, "Failed to clear stored value");
            }
        }
    }

    fn emit_wallet_changed(&self, wallet: &Wallet) {
        self.event_bus.emit(StoreEvent::WalletChanged {
            coupons: wallet.len(),
            state: wallet.state(),
        });
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn validate_email(email: &str) -> Result<&str> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(StorefrontError::InvalidInput(format!(
            "Invalid email address: {}",
            email
        )));
    }
    Ok(email)
}
