//! Catalog items.
//!
//! An item is a piece of text content ("prompt") sold for a fixed coin price.
//! Whether it is locked is derived per viewer from their entitlements; nothing
//! about ownership is stored on the item itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};
use crate::{ItemId, UserId};

/// Minimum number of words in a generated preview.
pub const PREVIEW_MIN_WORDS: usize = 10;

/// Share of the content's words shown in a generated preview, in percent.
const PREVIEW_PERCENT: usize = 20;

/// A purchasable catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item identifier.
    pub item_id: ItemId,
    /// Display title.
    pub title: String,
    /// Short description shown in listings.
    pub description: String,
    /// The full content, only revealed to owners.
    pub content: String,
    /// Explicit preview text. Generated from `content` when absent.
    pub preview: Option<String>,
    /// Price in coins. Always positive.
    pub price_coins: i64,
    /// Optional cover image.
    pub image_url: Option<String>,
    /// Catalog category.
    pub category: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// When the item was created.
    pub created_at: DateTime<Utc>,
    /// When the item was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a catalog item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewItem {
    /// Display title.
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Full content.
    pub content: String,
    /// Explicit preview text.
    #[serde(default)]
    pub preview: Option<String>,
    /// Price in coins.
    pub price_coins: i64,
    /// Optional cover image.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Catalog category.
    pub category: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Item {
    /// Build a new item from validated input.
    ///
    /// # Errors
    ///
    /// Returns `MarketError::InvalidItem` for an empty title, content or
    /// category, and `MarketError::InvalidAmount` for a non-positive price.
    pub fn create(input: NewItem) -> Result<Self> {
        if input.title.trim().is_empty() {
            return Err(MarketError::InvalidItem("title must not be empty".into()));
        }
        if input.content.trim().is_empty() {
            return Err(MarketError::InvalidItem("content must not be empty".into()));
        }
        if input.category.trim().is_empty() {
            return Err(MarketError::InvalidItem("category must not be empty".into()));
        }
        if input.price_coins <= 0 {
            return Err(MarketError::InvalidAmount(input.price_coins));
        }

        let now = Utc::now();
        Ok(Self {
            item_id: ItemId::generate(),
            title: input.title.trim().to_string(),
            description: input.description,
            content: input.content,
            preview: input.preview.filter(|p| !p.trim().is_empty()),
            price_coins: input.price_coins,
            image_url: input.image_url,
            category: input.category.trim().to_string(),
            tags: input.tags,
            created_at: now,
            updated_at: now,
        })
    }

    /// Text shown to viewers who do not own the item.
    #[must_use]
    pub fn preview_text(&self) -> String {
        if let Some(preview) = &self.preview {
            return preview.clone();
        }

        let words: Vec<&str> = self.content.split_whitespace().collect();
        let take = (words.len() * PREVIEW_PERCENT / 100).max(PREVIEW_MIN_WORDS);
        let mut preview = words.iter().take(take).copied().collect::<Vec<_>>().join(" ");
        preview.push_str("...");
        preview
    }

    /// Content as delivered to an owner, stamped with the buyer and item ids.
    #[must_use]
    pub fn watermarked_content(&self, buyer: &UserId) -> String {
        format!(
            "{}\n\n---\nPurchased by: {buyer}\nItem ID: {}\npromptmart - All rights reserved",
            self.content, self.item_id
        )
    }

    /// Catalog filter: exact category (case-insensitive) and a free-text
    /// query over title, description and tags.
    #[must_use]
    pub fn matches(&self, category: Option<&str>, query: Option<&str>) -> bool {
        if let Some(category) = category {
            if !self.category.eq_ignore_ascii_case(category) {
                return false;
            }
        }

        match query.map(str::trim).filter(|q| !q.is_empty()) {
            None => true,
            Some(query) => {
                let query = query.to_lowercase();
                self.title.to_lowercase().contains(&query)
                    || self.description.to_lowercase().contains(&query)
                    || self.tags.iter().any(|t| t.to_lowercase().contains(&query))
            }
        }
    }
}
