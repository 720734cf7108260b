//! Shop and food reviews
//!
//! The backend serves every review in one listing; the store splits it into
//! shop reviews and food reviews and derives averages on demand. Averages are
//! never stored.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::events::{EventBus, StoreEvent};
use crate::api::Backend;
use crate::types::{FoodId, Review, ReviewDraft, ReviewTarget};
use crate::Result;

#[derive(Debug, Default)]
struct ReviewsState {
    shop: Vec<Review>,
    food: Vec<Review>,
}

pub struct ReviewsStore {
    backend: Arc<dyn Backend>,
    event_bus: EventBus,
    state: RwLock<ReviewsState>,
}

impl ReviewsStore {
    pub fn new(backend: Arc<dyn Backend>, event_bus: EventBus) -> Self {
        Self {
            backend,
            event_bus,
            state: RwLock::new(ReviewsState::default()),
        }
    }

    /// Fetch every review and re-partition
    ///
    /// # Errors
    ///
    /// Returns the backend error; cached reviews are left as they were.
    pub async fn refresh_reviews(&self) -> Result<()> {
        let all = self.backend.list_reviews().await?;
        let (shop, food) = partition(all);
        debug!(shop = shop.len(), food = food.len(), "Reviews refreshed");

        let event = StoreEvent::ReviewsRefreshed {
            shop: shop.len(),
            food: food.len(),
        };
        *self.state.write().await = ReviewsState { shop, food };
        self.event_bus.emit(event);
        Ok(())
    }

    /// Reviews for one food item, newest first
    pub async fn food_reviews(&self, food_id: FoodId) -> Vec<Review> {
        let state = self.state.read().await;
        let mut reviews: Vec<Review> = state
            .food
            .iter()
            .filter(|r| r.target == ReviewTarget::Food(food_id))
            .cloned()
            .collect();
        sort_newest_first(&mut reviews);
        reviews
    }

    /// Shop reviews, newest first
    pub async fn shop_reviews(&self) -> Vec<Review> {
        let mut reviews = self.state.read().await.shop.clone();
        sort_newest_first(&mut reviews);
        reviews
    }

    pub async fn average_food_rating(&self, food_id: FoodId) -> f64 {
        let state = self.state.read().await;
        average_rating(
            state
                .food
                .iter()
                .filter(|r| r.target == ReviewTarget::Food(food_id)),
        )
    }

    pub async fn average_shop_rating(&self) -> f64 {
        average_rating(self.state.read().await.shop.iter())
    }

    /// Submit a review of a food item, then refresh
    ///
    /// Not idempotent: calling twice posts two reviews.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a rating outside 1-5 (nothing is sent), otherwise the
    /// backend error from the submission itself.
    pub async fn add_food_review(&self, food_id: FoodId, draft: ReviewDraft) -> Result<Review> {
        self.submit(ReviewTarget::Food(food_id), draft).await
    }

    /// Submit a review of the shop, then refresh
    pub async fn add_shop_review(&self, draft: ReviewDraft) -> Result<Review> {
        self.submit(ReviewTarget::Shop, draft).await
    }

    async fn submit(&self, target: ReviewTarget, draft: ReviewDraft) -> Result<Review> {
        draft.validate()?;

        let created = self
            .backend
            .create_review(&draft.into_submission(target))
            .await?;
        info!(review_id = created.id, rating = created.rating, "Review submitted");

        if let Err(e) = self.refresh_reviews().await {
            warn!(error = %e, "Failed to refresh reviews after submission, keeping local copy");
            let mut state = self.state.write().await;
            let bucket = match created.target {
                ReviewTarget::Shop => &mut state.shop,
                ReviewTarget::Food(_) => &mut state.food,
            };
            if !bucket.iter().any(|r| r.id == created.id) {
                bucket.push(created.clone());
            }
        }

        Ok(created)
    }
}

/// Split a listing into (shop, food) reviews
pub fn partition(reviews: Vec<Review>) -> (Vec<Review>, Vec<Review>) {
    reviews
        .into_iter()
        .partition(|r| r.target == ReviewTarget::Shop)
}

/// Mean rating rounded to one decimal; 0 for no reviews
pub fn average_rating<'a>(reviews: impl IntoIterator<Item = &'a Review>) -> f64 {
    let (sum, count) = reviews
        .into_iter()
        .fold((0u32, 0u32), |(sum, count), r| (sum + u32::from(r.rating), count + 1));

    if count == 0 {
        return 0.0;
    }
    let mean = f64::from(sum) / f64::from(count);
    (mean * 10.0).round() / 10.0
}

fn sort_newest_first(reviews: &mut [Review]) {
    reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}
