//! HTTP implementation of [`Backend`] on top of `reqwest`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::dto::{
    map_lenient, CouponDto, OtpRequestDto, OtpVerifyDto, PasswordChangeDto, PasswordDto,
    ProductDto, RegistrationDto, ReviewDto, TokenPairDto, TokenRequest, UserDto,
};
use super::Backend;
use crate::config::ApiConfig;
use crate::error::{ApiError, Result};
use crate::storage::{Storage, ACCESS_TOKEN_KEY};
use crate::types::{
    Coupon, CouponId, FoodItem, NewReview, ProfileUpdate, Registration, Review, ReviewTarget,
    Session, UserData,
};

pub const TOKEN_PATH: &str = "/api/token/";
pub const REGISTER_PATH: &str = "/firstapp/users/register/";
pub const CURRENT_USER_PATH: &str = "/firstapp/users/me/";
pub const DEACTIVATE_PATH: &str = "/firstapp/users/deactivate/";
pub const PRODUCTS_PATH: &str = "/firstapp/products/";
pub const REVIEWS_PATH: &str = "/firstapp/reviews/";
pub const COUPONS_PATH: &str = "/firstapp/coupons/";
pub const CLAIMED_COUPONS_PATH: &str = "/firstapp/coupons/claimed/";
pub const OTP_REQUEST_PATH: &str = "/firstapp/password-reset/request-otp/";
pub const OTP_VERIFY_PATH: &str = "/firstapp/password-reset/verify-otp/";
pub const PASSWORD_CHANGE_PATH: &str = "/firstapp/password-reset/change-password/";

fn claim_path(id: CouponId) -> String {
    format!("/firstapp/coupons/{}/claim/", id)
}

/// Whether a request carries the stored bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Bearer,
    Anonymous,
}

/// List endpoints may or may not be paginated
#[derive(Deserialize)]
#[serde(untagged)]
enum ListPayload<T> {
    Plain(Vec<T>),
    Paginated { results: Vec<T> },
}

impl<T> ListPayload<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListPayload::Plain(items) => items,
            ListPayload::Paginated { results } => results,
        }
    }
}

/// Backend reached over HTTP
///
/// The access token is read from storage on every authenticated request, so
/// a login or logout takes effect without rebuilding the client.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    storage: Arc<dyn Storage>,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig, storage: Arc<dyn Storage>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            storage,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn access_token(&self) -> Option<String> {
        match self.storage.get(ACCESS_TOKEN_KEY).await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::error!("Error retrieving access token: {}", e);
                None
            }
        }
    }

    async fn execute(&self, request: RequestBuilder, auth: Auth, context: &str) -> Result<Response> {
        let request = match auth {
            Auth::Bearer => match self.access_token().await {
                Some(token) => request.bearer_auth(token),
                None => request,
            },
            Auth::Anonymous => request,
        };

        tracing::debug!("Sending {} request", context);
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(format!("{} failed: {}", context, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify_status(status, &body, auth == Auth::Bearer);
        tracing::warn!("{} rejected with {}: {}", context, status, error);
        Err(error.into())
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        auth: Auth,
        context: &str,
    ) -> Result<T> {
        let response = self.execute(request, auth, context).await?;
        let payload = response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(format!("{}: {}", context, e)))?;
        Ok(payload)
    }
}

/// Map a non-success status to the error taxonomy
///
/// A 401 only means "session expired" on a call that carried a token; on an
/// anonymous call (login, signup) it is a credential problem.
pub fn classify_status(status: StatusCode, body: &str, authenticated: bool) -> ApiError {
    let message = extract_message(body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());

    match status {
        StatusCode::UNAUTHORIZED if authenticated => ApiError::Unauthorized(message),
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        s if s.is_client_error() => ApiError::Validation(message),
        _ => ApiError::Server(message),
    }
}

/// Pull a human-readable message out of an error body
///
/// Understands `{"error": ..}`, `{"detail": ..}`, `{"message": ..}`,
/// `{"non_field_errors": [..]}` and per-field errors such as
/// `{"username": ["already exists"]}` (reported as `username: already exists`).
pub fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    match &value {
        Value::Object(map) => {
            for key in ["error", "detail", "message", "non_field_errors"] {
                if let Some(text) = map.get(key).and_then(first_text) {
                    return Some(text);
                }
            }
            map.iter()
                .find_map(|(field, v)| first_text(v).map(|text| format!("{}: {}", field, text)))
        }
        other => first_text(other),
    }
}

fn first_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items.iter().find_map(first_text),
        _ => None,
    }
}

fn review_form(review: &NewReview) -> Result<Form> {
    let mut form = Form::new()
        .text("rating", review.rating.to_string())
        .text("comment", review.comment.clone());

    form = match review.target {
        ReviewTarget::Shop => form.text("review_type", "shop"),
        ReviewTarget::Food(food_id) => form
            .text("review_type", "food")
            .text("food", food_id.to_string()),
    };

    if let Some(image) = &review.image {
        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(image.mime_type.as_str())
            .map_err(|e| ApiError::Validation(format!("Invalid image type: {}", e)))?;
        form = form.part("image", part);
    }

    Ok(form)
}

#[async_trait]
impl Backend for HttpBackend {
    async fn obtain_token(&self, username: &str, password: &SecretString) -> Result<Session> {
        let body = TokenRequest {
            username,
            password: password.expose_secret(),
        };
        let request = self.client.post(self.url(TOKEN_PATH)).json(&body);
        let tokens: TokenPairDto = self.execute_json(request, Auth::Anonymous, "login").await?;
        Ok(tokens.into())
    }

    async fn register(&self, registration: &Registration) -> Result<UserData> {
        let body = RegistrationDto::from(registration);
        let request = self.client.post(self.url(REGISTER_PATH)).json(&body);
        let user: UserDto = self.execute_json(request, Auth::Anonymous, "signup").await?;
        Ok(user.into())
    }

    async fn current_user(&self) -> Result<UserData> {
        let request = self.client.get(self.url(CURRENT_USER_PATH));
        let user: UserDto = self.execute_json(request, Auth::Bearer, "fetch profile").await?;
        Ok(user.into())
    }

    async fn update_user(&self, update: &ProfileUpdate) -> Result<UserData> {
        let request = self.client.patch(self.url(CURRENT_USER_PATH)).json(update);
        let user: UserDto = self
            .execute_json(request, Auth::Bearer, "update profile")
            .await?;
        Ok(user.into())
    }

    async fn deactivate_account(&self, password: &SecretString) -> Result<()> {
        let body = PasswordDto {
            password: password.expose_secret(),
        };
        let request = self.client.post(self.url(DEACTIVATE_PATH)).json(&body);
        self.execute(request, Auth::Bearer, "deactivate account")
            .await?;
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<FoodItem>> {
        let request = self.client.get(self.url(PRODUCTS_PATH));
        let payload: ListPayload<Value> = self
            .execute_json(request, Auth::Anonymous, "list products")
            .await?;
        Ok(map_lenient::<ProductDto, _>(payload.into_vec(), "product"))
    }

    async fn list_reviews(&self) -> Result<Vec<Review>> {
        let request = self.client.get(self.url(REVIEWS_PATH));
        let payload: ListPayload<Value> = self
            .execute_json(request, Auth::Anonymous, "list reviews")
            .await?;
        Ok(map_lenient::<ReviewDto, _>(payload.into_vec(), "review"))
    }

    async fn create_review(&self, review: &NewReview) -> Result<Review> {
        let form = review_form(review)?;
        let request = self.client.post(self.url(REVIEWS_PATH)).multipart(form);
        let dto: ReviewDto = self
            .execute_json(request, Auth::Bearer, "submit review")
            .await?;
        Ok(Review::try_from(dto)?)
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let request = self.client.get(self.url(COUPONS_PATH));
        let payload: ListPayload<Value> = self
            .execute_json(request, Auth::Anonymous, "list coupons")
            .await?;
        Ok(map_lenient::<CouponDto, _>(payload.into_vec(), "coupon"))
    }

    async fn list_claimed_coupons(&self) -> Result<Vec<Coupon>> {
        let request = self.client.get(self.url(CLAIMED_COUPONS_PATH));
        let payload: ListPayload<Value> = self
            .execute_json(request, Auth::Bearer, "list claimed coupons")
            .await?;
        Ok(map_lenient::<CouponDto, _>(payload.into_vec(), "coupon"))
    }

    async fn claim_coupon(&self, id: CouponId) -> Result<()> {
        let request = self.client.post(self.url(&claim_path(id)));
        self.execute(request, Auth::Bearer, "claim coupon").await?;
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<()> {
        let request = self
            .client
            .post(self.url(OTP_REQUEST_PATH))
            .json(&OtpRequestDto { email });
        self.execute(request, Auth::Anonymous, "request reset code")
            .await?;
        Ok(())
    }

    async fn verify_reset_code(&self, email: &str, code: &str) -> Result<()> {
        let request = self
            .client
            .post(self.url(OTP_VERIFY_PATH))
            .json(&OtpVerifyDto { email, otp: code });
        self.execute(request, Auth::Anonymous, "verify reset code")
            .await?;
        Ok(())
    }

    async fn change_password(
        &self,
        email: &str,
        code: &str,
        new_password: &SecretString,
    ) -> Result<()> {
        let body = PasswordChangeDto {
            email,
            otp: code,
            new_password: new_password.expose_secret(),
        };
        let request = self.client.post(self.url(PASSWORD_CHANGE_PATH)).json(&body);
        self.execute(request, Auth::Anonymous, "change password")
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}
