//! Contracts for the services the cart timer coordinates with
//!
//! The engine never owns cart contents, stock, or archived carts. It talks
//! to them through these traits so the backing implementation can be the
//! in-memory one shipped here or a remote API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by a collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },
    #[error("variant {variant_id} is out of stock ({remaining} left)")]
    OutOfStock { variant_id: String, remaining: u32 },
    #[error("variant {0} is not in the cart")]
    NotInCart(String),
    #[error("quantity must be at least 1")]
    InvalidQuantity,
    #[error("cart is empty")]
    EmptyCart,
    #[error("cart is being cleared after expiry, try again shortly")]
    ExpiryInProgress,
}

impl ServiceError {
    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            reason: reason.into(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A single cart line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub variant_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub unit_price_cents: u64,
}

impl CartItem {
    pub fn new(variant_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            variant_id: variant_id.into(),
            quantity,
            unit_price_cents: 0,
        }
    }

    pub fn line(&self) -> ArchivedLine {
        ArchivedLine {
            variant_id: self.variant_id.clone(),
            quantity: self.quantity,
        }
    }
}

/// Cart contents with totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub total_quantity: u32,
    pub subtotal_cents: u64,
}

impl CartView {
    pub fn from_items(items: Vec<CartItem>) -> Self {
        let total_quantity = items
            .iter()
            .fold(0u32, |total, item| total.saturating_add(item.quantity));
        let subtotal_cents = items.iter().fold(0u64, |total, item| {
            total.saturating_add(item.unit_price_cents.saturating_mul(u64::from(item.quantity)))
        });
        Self {
            items,
            total_quantity,
            subtotal_cents,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Variant and quantity, as recorded for later reorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedLine {
    pub variant_id: String,
    pub quantity: u32,
}

/// Cart contents captured right before an automatic clear
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedCart {
    pub archived_at: DateTime<Utc>,
    pub items: Vec<ArchivedLine>,
}

/// Outcome of a stock reservation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub success: bool,
    pub remaining: Option<u32>,
}

/// Severity of a user notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[async_trait]
pub trait CartService: Send + Sync {
    async fn list_items(&self) -> ServiceResult<Vec<CartItem>>;
    /// Add a line, merging quantities for an existing variant
    async fn add_item(&self, item: CartItem) -> ServiceResult<Vec<CartItem>>;
    async fn update_quantity(&self, variant_id: &str, quantity: u32) -> ServiceResult<Vec<CartItem>>;
    async fn remove_item(&self, variant_id: &str) -> ServiceResult<Vec<CartItem>>;
    async fn clear(&self) -> ServiceResult<()>;
}

/// Server-side stock hold ledger
#[async_trait]
pub trait StockReservations: Send + Sync {
    async fn reserve(&self, variant_id: &str, quantity: u32, duration_minutes: u32) -> ServiceResult<Reservation>;
    async fn extend(&self, variant_id: &str, additional_minutes: u32) -> ServiceResult<()>;
    async fn release(&self, variant_id: &str) -> ServiceResult<()>;
    async fn release_all(&self) -> ServiceResult<()>;
}

/// Store of expired carts the user can reorder from
#[async_trait]
pub trait ExpiredItemsArchive: Send + Sync {
    async fn archive(&self, items: &[ArchivedLine]) -> ServiceResult<()>;
    async fn list(&self) -> ServiceResult<Vec<ArchivedCart>>;
}

/// Fire-and-forget user feedback
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, level: NotifyLevel);
}

/// Handles to every collaborator the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub cart: Arc<dyn CartService>,
    pub reservations: Arc<dyn StockReservations>,
    pub archive: Arc<dyn ExpiredItemsArchive>,
    pub notifier: Arc<dyn Notifier>,
}
