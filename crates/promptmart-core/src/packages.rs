//! Coin packages sold through Stripe Checkout.

use serde::Serialize;

/// A purchasable bundle of coins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoinPackage {
    /// Package identifier, echoed back by the payment webhook.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Coins credited on payment.
    pub coins: i64,
    /// Price in the smallest currency unit (paise).
    pub price_minor: i64,
}

/// The package catalog.
pub const COIN_PACKAGES: [CoinPackage; 3] = [
    CoinPackage {
        id: "starter",
        name: "Starter Pack",
        coins: 20,
        price_minor: 9_900,
    },
    CoinPackage {
        id: "popular",
        name: "Popular Pack",
        coins: 50,
        price_minor: 19_900,
    },
    CoinPackage {
        id: "pro",
        name: "Pro Pack",
        coins: 100,
        price_minor: 34_900,
    },
];

/// Look up a package by id.
#[must_use]
pub fn find_package(id: &str) -> Option<&'static CoinPackage> {
    COIN_PACKAGES.iter().find(|p| p.id == id)
}
