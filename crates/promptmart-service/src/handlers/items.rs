//! Catalog, purchase and entitlement handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use promptmart_core::{Item, ItemId};
use promptmart_store::Store;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Catalog query parameters.
#[derive(Debug, Deserialize)]
pub struct ListItemsQuery {
    /// Exact category filter.
    pub category: Option<String>,
    /// Free-text search over title, description and tags.
    pub q: Option<String>,
}

/// Catalog entry without the paid content.
#[derive(Debug, Serialize)]
pub struct ItemSummary {
    /// Item ID.
    pub item_id: String,
    /// Title.
    pub title: String,
    /// Short description.
    pub description: String,
    /// Price in coins.
    pub price_coins: i64,
    /// Category.
    pub category: String,
    /// Tags.
    pub tags: Vec<String>,
    /// Cover image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Item> for ItemSummary {
    fn from(item: &Item) -> Self {
        Self {
            item_id: item.item_id.to_string(),
            title: item.title.clone(),
            description: item.description.clone(),
            price_coins: item.price_coins,
            category: item.category.clone(),
            tags: item.tags.clone(),
            image_url: item.image_url.clone(),
            created_at: item.created_at.to_rfc3339(),
        }
    }
}

/// Catalog response.
#[derive(Debug, Serialize)]
pub struct ListItemsResponse {
    /// Matching items, newest first.
    pub items: Vec<ItemSummary>,
}

/// List the catalog.
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListItemsQuery>,
) -> Result<Json<ListItemsResponse>, ApiError> {
    let items = state.store.list_items().await?;

    let items = items
        .iter()
        .filter(|item| item.matches(query.category.as_deref(), query.q.as_deref()))
        .map(ItemSummary::from)
        .collect();

    Ok(Json(ListItemsResponse { items }))
}

/// Item detail as seen by the caller.
#[derive(Debug, Serialize)]
pub struct ItemDetailResponse {
    /// Catalog fields.
    #[serde(flatten)]
    pub item: ItemSummary,
    /// Whether the caller owns the item.
    pub owned: bool,
    /// Watermarked content for owners, otherwise a preview.
    pub content: String,
}

/// Get one item. Owners receive the full content.
pub async fn get_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(item_id): Path<String>,
) -> Result<Json<ItemDetailResponse>, ApiError> {
    let item_id = parse_item_id(&item_id)?;

    let item = state
        .store
        .get_item(&item_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Item not found".into()))?;

    let owned = state
        .store
        .get_entitlement(&auth.user_id, &item_id)
        .await?
        .is_some();

    let content = if owned {
        item.watermarked_content(&auth.user_id)
    } else {
        item.preview_text()
    };

    Ok(Json(ItemDetailResponse {
        item: ItemSummary::from(&item),
        owned,
        content,
    }))
}

/// Purchase response.
#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    /// Purchased item.
    pub item_id: String,
    /// Coins paid.
    pub price_paid_coins: i64,
    /// Ledger entry of the debit.
    pub entry_id: String,
    /// Balance after the purchase.
    pub balance_coins: i64,
}

/// Buy an item with coins.
pub async fn purchase_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(item_id): Path<String>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let item_id = parse_item_id(&item_id)?;

    let purchase = state.purchases.purchase(auth.user_id, item_id).await?;

    Ok(Json(PurchaseResponse {
        item_id: purchase.entitlement.item_id.to_string(),
        price_paid_coins: purchase.entitlement.price_paid_coins,
        entry_id: purchase.entry_id.to_string(),
        balance_coins: purchase.balance_after,
    }))
}

/// An owned item.
#[derive(Debug, Serialize)]
pub struct EntitlementResponse {
    /// Item ID.
    pub item_id: String,
    /// Item title, when the item is still in the catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Coins paid.
    pub price_paid_coins: i64,
    /// When the item was unlocked.
    pub granted_at: String,
}

/// Entitlement list response.
#[derive(Debug, Serialize)]
pub struct ListEntitlementsResponse {
    /// Owned items, newest first.
    pub entitlements: Vec<EntitlementResponse>,
}

/// List the caller's owned items.
pub async fn list_entitlements(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListEntitlementsResponse>, ApiError> {
    let entitlements = state.store.list_entitlements(&auth.user_id).await?;

    let mut response = Vec::with_capacity(entitlements.len());
    for entitlement in entitlements {
        let title = state
            .store
            .get_item(&entitlement.item_id)
            .await?
            .map(|item| item.title);

        response.push(EntitlementResponse {
            item_id: entitlement.item_id.to_string(),
            title,
            price_paid_coins: entitlement.price_paid_coins,
            granted_at: entitlement.granted_at.to_rfc3339(),
        });
    }

    Ok(Json(ListEntitlementsResponse {
        entitlements: response,
    }))
}

fn parse_item_id(raw: &str) -> Result<ItemId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid item ID".into()))
}
