//! Core types for Carenderia
//!
//! These are the client-side shapes. Backend payloads are mapped into them in
//! [`crate::api::dto`], never deserialized into them directly.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorefrontError};

pub type FoodId = i64;
pub type CouponId = i64;
pub type ReviewId = i64;

/// A menu item. Owned by the backend; the client never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FoodItem {
    pub id: FoodId,
    pub name: String,
    pub description: String,
    pub image: Option<String>,
    pub category: String,
    pub price: f64,
    pub available: bool,
}

// ============================================================================
// Reviews
// ============================================================================

/// What a review is about
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "food_id", rename_all = "lowercase")]
pub enum ReviewTarget {
    Shop,
    Food(FoodId),
}

impl ReviewTarget {
    pub fn food_id(&self) -> Option<FoodId> {
        match self {
            ReviewTarget::Shop => None,
            ReviewTarget::Food(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: ReviewId,
    pub author: String,
    pub target: ReviewTarget,
    /// 1 to 5 inclusive
    pub rating: u8,
    pub comment: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

/// A review as typed by the user, before it has a target
#[derive(Debug, Clone)]
pub struct ReviewDraft {
    pub rating: u8,
    pub comment: String,
    pub image: Option<ImageUpload>,
}

impl ReviewDraft {
    pub fn new(rating: u8, comment: impl Into<String>) -> Self {
        Self {
            rating,
            comment: comment.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: ImageUpload) -> Self {
        self.image = Some(image);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(StorefrontError::InvalidInput(format!(
                "Rating must be between {} and {} (got {})",
                MIN_RATING, MAX_RATING, self.rating
            )));
        }
        Ok(())
    }

    pub fn into_submission(self, target: ReviewTarget) -> NewReview {
        NewReview {
            target,
            rating: self.rating,
            comment: self.comment,
            image: self.image,
        }
    }
}

/// Multipart submission payload
#[derive(Debug, Clone)]
pub struct NewReview {
    pub target: ReviewTarget,
    pub rating: u8,
    pub comment: String,
    pub image: Option<ImageUpload>,
}

// ============================================================================
// Image uploads
// ============================================================================

/// Supported image MIME types for review photos
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

impl fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Photo attached to a review, held in memory until submitted
#[derive(Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: ImageMimeType,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ImageUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageUpload")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImageUpload {
    /// Read an image from disk, deriving the MIME type from its extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let mime_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageMimeType::from_extension)
            .ok_or_else(|| {
                StorefrontError::InvalidInput(format!(
                    "Unsupported image type: {} (use jpg, png, gif or webp)",
                    path.display()
                ))
            })?;

        let bytes = std::fs::read(path).map_err(|e| {
            StorefrontError::InvalidInput(format!("Cannot read {}: {}", path.display(), e))
        })?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("review-photo")
            .to_string();

        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }
}

// ============================================================================
// Coupons
// ============================================================================

/// Coupon lifecycle: Active -> Claimed -> Redeemed, or Expired
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CouponStatus {
    Active,
    Claimed,
    Redeemed,
    Expired,
}

impl CouponStatus {
    /// Position in the lifecycle; merges never move to a lower rank.
    pub fn rank(&self) -> u8 {
        match self {
            CouponStatus::Active => 0,
            CouponStatus::Claimed => 1,
            CouponStatus::Expired => 2,
            CouponStatus::Redeemed => 3,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Some(CouponStatus::Active),
            "claimed" => Some(CouponStatus::Claimed),
            "redeemed" | "used" => Some(CouponStatus::Redeemed),
            "expired" => Some(CouponStatus::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for CouponStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CouponStatus::Active => "Active",
            CouponStatus::Claimed => "Claimed",
            CouponStatus::Redeemed => "Redeemed",
            CouponStatus::Expired => "Expired",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coupon {
    pub id: CouponId,
    pub name: String,
    pub product_name: String,
    pub description: String,
    /// Display string such as "50%" or "BOGO"
    pub discount_rate: String,
    pub code: String,
    pub expires_on: NaiveDate,
    pub terms: String,
    pub status: CouponStatus,
    pub image: Option<String>,
}

impl Coupon {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.status == CouponStatus::Expired || self.expires_on < today
    }

    /// Status as it should be shown on `today`; a redeemed coupon stays redeemed.
    pub fn effective_status(&self, today: NaiveDate) -> CouponStatus {
        match self.status {
            CouponStatus::Redeemed => CouponStatus::Redeemed,
            _ if self.is_expired(today) => CouponStatus::Expired,
            status => status,
        }
    }
}

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserData {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl UserData {
    /// "First Middle Last", or the username when no name parts are set
    pub fn full_name(&self) -> String {
        let parts: Vec<&str> = [&self.first_name, &self.middle_name, &self.last_name]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            self.username.clone()
        } else {
            parts.join(" ")
        }
    }

    /// Avatar initials: first+last name if both present, else the username's first letter
    pub fn initials(&self) -> String {
        let first_char = |s: &Option<String>| s.as_deref().and_then(|v| v.trim().chars().next());
        match (first_char(&self.first_name), first_char(&self.last_name)) {
            (Some(f), Some(l)) => format!("{}{}", f, l).to_uppercase(),
            _ => self
                .username
                .chars()
                .next()
                .map(|c| c.to_uppercase().to_string())
                .unwrap_or_default(),
        }
    }
}

/// Partial profile update; `None` fields are left untouched server-side
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.first_name.is_none()
            && self.middle_name.is_none()
            && self.last_name.is_none()
            && self.phone.is_none()
            && self.address.is_none()
    }
}

/// Signup form
#[derive(Debug)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: secrecy::SecretString,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Access/refresh token pair identifying a logged-in user to the backend
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
}

impl Session {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}
