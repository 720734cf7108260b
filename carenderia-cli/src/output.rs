//! Text and JSON rendering of store state

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use serde_json::json;

use libcarenderia::wallet::{SyncState, WalletEntry};
use libcarenderia::{Coupon, FoodId, FoodItem, Review, UserData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON for scripting
    Json,
}

pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    pub fn message(&self, message: &str) -> Result<()> {
        match self.format {
            OutputFormat::Json => self.json(&json!({ "message": message })),
            OutputFormat::Text => {
                println!("{}", message);
                Ok(())
            }
        }
    }

    pub fn menu(&self, items: &[FoodItem]) -> Result<()> {
        if self.format == OutputFormat::Json {
            return self.json(items);
        }
        if items.is_empty() {
            println!("No menu items found");
            return Ok(());
        }
        for item in items {
            println!("{}", menu_line(item));
        }
        Ok(())
    }

    pub fn dish(
        &self,
        item: &FoodItem,
        average: f64,
        favorite: bool,
        reviews: &[Review],
    ) -> Result<()> {
        if self.format == OutputFormat::Json {
            return self.json(&json!({
                "item": item,
                "average_rating": average,
                "favorite": favorite,
                "reviews": reviews,
            }));
        }

        let marker = if favorite { " [favorite]" } else { "" };
        println!("{}{}", item.name, marker);
        println!("{} | PHP {:.2}", item.category, item.price);
        if !item.available {
            println!("Currently sold out");
        }
        if !item.description.is_empty() {
            println!();
            println!("{}", item.description);
        }
        println!();
        self.reviews(reviews, average)
    }

    pub fn favorites(&self, ids: &[FoodId], items: &[FoodItem]) -> Result<()> {
        if self.format == OutputFormat::Json {
            return self.json(&json!({ "ids": ids, "items": items }));
        }
        if ids.is_empty() {
            println!("No favorites yet");
            return Ok(());
        }
        for id in ids {
            match items.iter().find(|item| item.id == *id) {
                Some(item) => println!("{}", menu_line(item)),
                None => println!("{:>4}  (not on the current menu)", id),
            }
        }
        Ok(())
    }

    pub fn reviews(&self, reviews: &[Review], average: f64) -> Result<()> {
        if self.format == OutputFormat::Json {
            return self.json(&json!({ "average_rating": average, "reviews": reviews }));
        }
        if reviews.is_empty() {
            println!("No reviews yet");
            return Ok(());
        }

        println!("Rating: {:.1}/5 ({} reviews)", average, reviews.len());
        println!();
        for review in reviews {
            println!(
                "{} | {} | {}/5",
                review.created_at.format("%Y-%m-%d"),
                review.author,
                review.rating
            );
            if !review.comment.is_empty() {
                println!("  {}", review.comment);
            }
            if let Some(image) = &review.image {
                println!("  photo: {}", image);
            }
        }
        Ok(())
    }

    pub fn review_created(&self, review: &Review) -> Result<()> {
        if self.format == OutputFormat::Json {
            return self.json(review);
        }
        println!("Thanks for your review! ({}/5)", review.rating);
        Ok(())
    }

    pub fn profile(&self, user: &UserData) -> Result<()> {
        if self.format == OutputFormat::Json {
            return self.json(user);
        }
        println!("[{}] {}", user.initials(), user.full_name());
        println!("Username: {}", user.username);
        println!("Email:    {}", user.email);
        if let Some(phone) = &user.phone {
            println!("Phone:    {}", phone);
        }
        if let Some(address) = &user.address {
            println!("Address:  {}", address);
        }
        Ok(())
    }

    pub fn coupons(&self, coupons: &[Coupon]) -> Result<()> {
        if self.format == OutputFormat::Json {
            return self.json(coupons);
        }
        if coupons.is_empty() {
            println!("No coupons available");
            return Ok(());
        }
        for coupon in coupons {
            println!("{}", coupon_line(coupon));
        }
        Ok(())
    }

    pub fn wallet(&self, entries: &[WalletEntry], state: SyncState) -> Result<()> {
        if self.format == OutputFormat::Json {
            return self.json(&json!({ "state": state, "entries": entries }));
        }
        if entries.is_empty() {
            println!("No coupons in your wallet");
            return Ok(());
        }

        println!("{} coupon(s), {}", entries.len(), sync_label(state));
        for entry in entries {
            println!("{}", coupon_line(&entry.coupon));
            println!("      code: {}", entry.coupon.code);
            if !entry.coupon.terms.is_empty() {
                println!("      {}", entry.coupon.terms);
            }
        }
        Ok(())
    }
}

pub fn sync_label(state: SyncState) -> &'static str {
    match state {
        SyncState::Synced => "in sync with the server",
        SyncState::LocallyAhead => "local changes not yet on the server",
        SyncState::Stale => "not refreshed since last start",
    }
}

fn menu_line(item: &FoodItem) -> String {
    let sold_out = if item.available { "" } else { " (sold out)" };
    format!(
        "{:>4}  {:<28} PHP {:>8.2}  {}{}",
        item.id, item.name, item.price, item.category, sold_out
    )
}

fn coupon_line(coupon: &Coupon) -> String {
    format!(
        "{:>4}  {:<28} {:>6}  {:<9} expires {}",
        coupon.id,
        coupon.name,
        coupon.discount_rate,
        coupon.status.to_string(),
        coupon.expires_on
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_line_marks_sold_out() {
        let item = FoodItem {
            id: 3,
            name: "Halo-Halo".to_string(),
            description: String::new(),
            image: None,
            category: "Dessert".to_string(),
            price: 85.0,
            available: false,
        };
        let line = menu_line(&item);
        assert!(line.contains("PHP    85.00"));
        assert!(line.ends_with("Dessert (sold out)"));
    }
}
