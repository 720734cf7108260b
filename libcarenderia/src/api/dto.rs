//! Wire shapes of the backend API
//!
//! Field names here follow the backend. Each entity has exactly one mapping
//! into the client model, so schema drift shows up in this file and nowhere
//! else.

use chrono::{DateTime, NaiveDate, Utc};
use secrecy::ExposeSecret;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::types::{
    Coupon, CouponStatus, FoodItem, Registration, Review, ReviewTarget, Session, UserData,
    MAX_RATING, MIN_RATING,
};

/// Decimal fields arrive as either `"120.00"` or `120`
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

fn decimal<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn text_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n.to_string()),
        NumberOrString::Text(s) => Ok(s),
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenPairDto {
    pub access: String,
    pub refresh: String,
}

impl From<TokenPairDto> for Session {
    fn from(dto: TokenPairDto) -> Self {
        Session::new(dto.access, dto.refresh)
    }
}

#[derive(Debug, Serialize)]
pub struct RegistrationDto<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<&'a str>,
}

impl<'a> From<&'a Registration> for RegistrationDto<'a> {
    fn from(form: &'a Registration) -> Self {
        Self {
            username: &form.username,
            email: &form.email,
            password: form.password.expose_secret(),
            first_name: form.first_name.as_deref(),
            middle_name: form.middle_name.as_deref(),
            last_name: form.last_name.as_deref(),
            phone: form.phone.as_deref(),
            address: form.address.as_deref(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PasswordDto<'a> {
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct OtpRequestDto<'a> {
    pub email: &'a str,
}

#[derive(Debug, Serialize)]
pub struct OtpVerifyDto<'a> {
    pub email: &'a str,
    pub otp: &'a str,
}

#[derive(Debug, Serialize)]
pub struct PasswordChangeDto<'a> {
    pub email: &'a str,
    pub otp: &'a str,
    pub new_password: &'a str,
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDto {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

/// Blank strings from the backend mean "not set"
fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl From<UserDto> for UserData {
    fn from(dto: UserDto) -> Self {
        Self {
            username: dto.username,
            email: dto.email,
            first_name: non_blank(dto.first_name),
            middle_name: non_blank(dto.middle_name),
            last_name: non_blank(dto.last_name),
            profile_picture: non_blank(dto.profile_picture),
            phone: non_blank(dto.phone),
            address: non_blank(dto.address),
        }
    }
}

// ============================================================================
// Products
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductDto {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(deserialize_with = "decimal")]
    pub price: f64,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

impl From<ProductDto> for FoodItem {
    fn from(dto: ProductDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
            description: dto.description,
            image: non_blank(dto.image),
            category: dto.category,
            price: dto.price,
            available: dto.is_available,
        }
    }
}

// ============================================================================
// Reviews
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDto {
    pub id: i64,
    pub username: String,
    pub review_type: String,
    #[serde(default)]
    pub food: Option<i64>,
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ReviewDto> for Review {
    type Error = ApiError;

    fn try_from(dto: ReviewDto) -> std::result::Result<Self, Self::Error> {
        let target = match (dto.review_type.to_lowercase().as_str(), dto.food) {
            ("shop", _) => ReviewTarget::Shop,
            ("food", Some(food_id)) => ReviewTarget::Food(food_id),
            ("food", None) => {
                return Err(ApiError::Decode(format!(
                    "food review {} has no food id",
                    dto.id
                )))
            }
            (other, _) => {
                return Err(ApiError::Decode(format!(
                    "review {} has unknown type '{}'",
                    dto.id, other
                )))
            }
        };

        let rating = u8::try_from(dto.rating)
            .ok()
            .filter(|r| (MIN_RATING..=MAX_RATING).contains(r))
            .ok_or_else(|| {
                ApiError::Decode(format!("review {} has rating {}", dto.id, dto.rating))
            })?;

        Ok(Self {
            id: dto.id,
            author: dto.username,
            target,
            rating,
            comment: dto.comment,
            image: non_blank(dto.image),
            created_at: dto.created_at,
        })
    }
}

// ============================================================================
// Coupons
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponDto {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "text_or_number")]
    pub rate: String,
    pub code: String,
    /// `YYYY-MM-DD`
    pub expiration: String,
    #[serde(default)]
    pub terms: String,
    pub status: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl TryFrom<CouponDto> for Coupon {
    type Error = ApiError;

    fn try_from(dto: CouponDto) -> std::result::Result<Self, Self::Error> {
        let expires_on = NaiveDate::parse_from_str(dto.expiration.trim(), "%Y-%m-%d")
            .map_err(|e| {
                ApiError::Decode(format!(
                    "coupon {} has invalid expiration '{}': {}",
                    dto.id, dto.expiration, e
                ))
            })?;

        let status = CouponStatus::parse(&dto.status).ok_or_else(|| {
            ApiError::Decode(format!("coupon {} has unknown status '{}'", dto.id, dto.status))
        })?;

        Ok(Self {
            id: dto.id,
            name: dto.name,
            product_name: dto.product_name,
            description: dto.description,
            discount_rate: dto.rate,
            code: dto.code,
            expires_on,
            terms: dto.terms,
            status,
            image: non_blank(dto.image),
        })
    }
}

/// Decode a list entry by entry
///
/// An entry that does not deserialize as `D`, or whose mapping into `T`
/// fails, is skipped with a warning; the rest of the list survives.
pub fn map_lenient<D, T>(items: Vec<Value>, entity: &str) -> Vec<T>
where
    D: DeserializeOwned,
    T: TryFrom<D>,
    T::Error: fmt::Display,
{
    items
        .into_iter()
        .filter_map(|raw| {
            let id = raw.get("id").cloned().unwrap_or(Value::Null);
            let converted = serde_json::from_value::<D>(raw)
                .map_err(|e| e.to_string())
                .and_then(|dto| T::try_from(dto).map_err(|e| e.to_string()));
            match converted {
                Ok(item) => Some(item),
                Err(error) => {
                    tracing::warn!(%id, %error, "Skipping malformed {}", entity);
                    None
                }
            }
        })
        .collect()
}
