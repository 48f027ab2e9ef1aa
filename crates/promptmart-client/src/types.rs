//! Request and response types for the promptmart client.

use chrono::{DateTime, Utc};
use promptmart_core::{ItemId, UserId};
use serde::{Deserialize, Serialize};

/// Account view.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: UserId,
    /// Current balance in coins.
    pub balance_coins: i64,
    /// Coins ever credited.
    pub lifetime_purchased_coins: i64,
    /// Coins ever spent.
    pub lifetime_spent_coins: i64,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

/// Balance response.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceResponse {
    /// Current balance in coins.
    pub balance_coins: i64,
}

/// A coin package.
#[derive(Debug, Clone, Deserialize)]
pub struct Package {
    /// Package identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Coins credited on payment.
    pub coins: i64,
    /// Price in the smallest currency unit.
    pub price_minor: i64,
}

/// Package catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct PackagesResponse {
    /// Packages.
    pub packages: Vec<Package>,
    /// Currency of `price_minor`.
    pub currency: String,
}

/// Catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemSummary {
    /// Item ID.
    pub item_id: ItemId,
    /// Title.
    pub title: String,
    /// Short description.
    pub description: String,
    /// Price in coins.
    pub price_coins: i64,
    /// Category.
    pub category: String,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Cover image.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Created timestamp.
    pub created_at: DateTime<Utc>,
}

/// Catalog listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemsResponse {
    /// Items, newest first.
    pub items: Vec<ItemSummary>,
}

/// Item detail.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDetail {
    /// Catalog fields.
    #[serde(flatten)]
    pub item: ItemSummary,
    /// Whether the caller owns the item.
    pub owned: bool,
    /// Full content when owned, otherwise a preview.
    pub content: String,
}

/// A granted purchase.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseResponse {
    /// Purchased item.
    pub item_id: ItemId,
    /// Coins paid.
    pub price_paid_coins: i64,
    /// Ledger entry of the debit.
    pub entry_id: String,
    /// Balance after the purchase.
    pub balance_coins: i64,
}

/// An owned item.
#[derive(Debug, Clone, Deserialize)]
pub struct Entitlement {
    /// Item ID.
    pub item_id: ItemId,
    /// Item title.
    #[serde(default)]
    pub title: Option<String>,
    /// Coins paid.
    pub price_paid_coins: i64,
    /// When the item was unlocked.
    pub granted_at: DateTime<Utc>,
}

/// Owned items.
#[derive(Debug, Clone, Deserialize)]
pub struct EntitlementsResponse {
    /// Owned items, newest first.
    pub entitlements: Vec<Entitlement>,
}

/// Checkout request.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    /// Package to buy.
    pub package_id: String,
}

/// A started checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutResponse {
    /// Session ID for polling.
    pub session_id: String,
    /// Where to send the user to pay.
    pub checkout_url: String,
}

/// Checkout poll result.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutStatus {
    /// Session ID.
    pub session_id: String,
    /// Whether the payment has been credited.
    pub credited: bool,
    /// Coins credited for this session.
    pub credited_coins: i64,
    /// Current balance.
    pub balance: i64,
    /// Stripe payment status, when known.
    #[serde(default)]
    pub payment_status: Option<String>,
}

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorDetail,
}

/// API error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
