//! API handlers.

pub mod accounts;
pub mod admin;
pub mod checkout;
pub mod credits;
pub mod health;
pub mod items;
pub mod webhooks;
