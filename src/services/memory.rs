//! In-memory collaborators used by the standalone server

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use super::collaborators::{
    ArchivedCart, ArchivedLine, CartItem, CartService, Collaborators, ExpiredItemsArchive,
    Notifier, NotifyLevel, Reservation, ServiceError, ServiceResult, StockReservations,
};

fn poisoned(service: &'static str) -> ServiceError {
    ServiceError::unavailable(service, "state lock poisoned")
}

/// Cart held in process memory
#[derive(Debug, Default)]
pub struct InMemoryCart {
    items: Mutex<Vec<CartItem>>,
}

impl InMemoryCart {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartService for InMemoryCart {
    async fn list_items(&self) -> ServiceResult<Vec<CartItem>> {
        let items = self.items.lock().map_err(|_| poisoned("cart"))?;
        Ok(items.clone())
    }

    async fn add_item(&self, item: CartItem) -> ServiceResult<Vec<CartItem>> {
        if item.quantity == 0 {
            return Err(ServiceError::InvalidQuantity);
        }
        let mut items = self.items.lock().map_err(|_| poisoned("cart"))?;
        match items.iter_mut().find(|line| line.variant_id == item.variant_id) {
            Some(line) => {
                line.quantity = line
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or(ServiceError::InvalidQuantity)?;
            }
            None => items.push(item),
        }
        Ok(items.clone())
    }

    async fn update_quantity(&self, variant_id: &str, quantity: u32) -> ServiceResult<Vec<CartItem>> {
        if quantity == 0 {
            return Err(ServiceError::InvalidQuantity);
        }
        let mut items = self.items.lock().map_err(|_| poisoned("cart"))?;
        let line = items
            .iter_mut()
            .find(|line| line.variant_id == variant_id)
            .ok_or_else(|| ServiceError::NotInCart(variant_id.to_string()))?;
        line.quantity = quantity;
        Ok(items.clone())
    }

    async fn remove_item(&self, variant_id: &str) -> ServiceResult<Vec<CartItem>> {
        let mut items = self.items.lock().map_err(|_| poisoned("cart"))?;
        let before = items.len();
        items.retain(|line| line.variant_id != variant_id);
        if items.len() == before {
            return Err(ServiceError::NotInCart(variant_id.to_string()));
        }
        Ok(items.clone())
    }

    async fn clear(&self) -> ServiceResult<()> {
        let mut items = self.items.lock().map_err(|_| poisoned("cart"))?;
        items.clear();
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Hold {
    quantity: u32,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Ledger {
    stock: HashMap<String, u32>,
    holds: HashMap<String, Hold>,
}

impl Ledger {
    fn purge_expired(&mut self, now: DateTime<Utc>) {
        let before = self.holds.len();
        self.holds.retain(|_, hold| hold.expires_at > now);
        if self.holds.len() != before {
            debug!("Dropped {} lapsed stock holds", before - self.holds.len());
        }
    }

    fn available(&self, variant_id: &str, default_stock: u32) -> u32 {
        let stock = self.stock.get(variant_id).copied().unwrap_or(default_stock);
        let held = self.holds.get(variant_id).map_or(0, |hold| hold.quantity);
        stock.saturating_sub(held)
    }
}

/// Stock ledger with time-boxed holds
#[derive(Debug)]
pub struct InMemoryStock {
    default_stock: u32,
    ledger: Mutex<Ledger>,
}

impl InMemoryStock {
    pub fn new(default_stock: u32) -> Self {
        Self {
            default_stock,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Set the on-hand stock for one variant
    pub fn set_stock(&self, variant_id: &str, quantity: u32) -> ServiceResult<()> {
        let mut ledger = self.ledger.lock().map_err(|_| poisoned("stock"))?;
        ledger.stock.insert(variant_id.to_string(), quantity);
        Ok(())
    }

    /// Quantity currently held for a variant
    pub fn held(&self, variant_id: &str) -> ServiceResult<u32> {
        let ledger = self.ledger.lock().map_err(|_| poisoned("stock"))?;
        Ok(ledger.holds.get(variant_id).map_or(0, |hold| hold.quantity))
    }
}

#[async_trait]
impl StockReservations for InMemoryStock {
    async fn reserve(&self, variant_id: &str, quantity: u32, duration_minutes: u32) -> ServiceResult<Reservation> {
        let now = Utc::now();
        let mut ledger = self.ledger.lock().map_err(|_| poisoned("stock"))?;
        ledger.purge_expired(now);

        let available = ledger.available(variant_id, self.default_stock);
        if available < quantity {
            debug!("Reservation of {} x {} rejected, {} available", quantity, variant_id, available);
            return Ok(Reservation {
                success: false,
                remaining: Some(available),
            });
        }

        let expires_at = now + Duration::minutes(i64::from(duration_minutes));
        let hold = ledger.holds.entry(variant_id.to_string()).or_insert(Hold {
            quantity: 0,
            expires_at,
        });
        hold.quantity += quantity;
        hold.expires_at = expires_at;

        Ok(Reservation {
            success: true,
            remaining: Some(available - quantity),
        })
    }

    async fn extend(&self, variant_id: &str, additional_minutes: u32) -> ServiceResult<()> {
        let mut ledger = self.ledger.lock().map_err(|_| poisoned("stock"))?;
        match ledger.holds.get_mut(variant_id) {
            Some(hold) => {
                hold.expires_at = hold.expires_at + Duration::minutes(i64::from(additional_minutes));
                Ok(())
            }
            None => Err(ServiceError::NotInCart(variant_id.to_string())),
        }
    }

    async fn release(&self, variant_id: &str) -> ServiceResult<()> {
        let mut ledger = self.ledger.lock().map_err(|_| poisoned("stock"))?;
        ledger.holds.remove(variant_id);
        Ok(())
    }

    async fn release_all(&self) -> ServiceResult<()> {
        let mut ledger = self.ledger.lock().map_err(|_| poisoned("stock"))?;
        ledger.holds.clear();
        Ok(())
    }
}

/// Expired-cart archive held in process memory
#[derive(Debug, Default)]
pub struct InMemoryArchive {
    carts: Mutex<Vec<ArchivedCart>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpiredItemsArchive for InMemoryArchive {
    async fn archive(&self, items: &[ArchivedLine]) -> ServiceResult<()> {
        let mut carts = self.carts.lock().map_err(|_| poisoned("archive"))?;
        carts.push(ArchivedCart {
            archived_at: Utc::now(),
            items: items.to_vec(),
        });
        Ok(())
    }

    async fn list(&self) -> ServiceResult<Vec<ArchivedCart>> {
        let carts = self.carts.lock().map_err(|_| poisoned("archive"))?;
        Ok(carts.clone())
    }
}

/// Notifier that writes user feedback to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, level: NotifyLevel) {
        match level {
            NotifyLevel::Info | NotifyLevel::Success => info!(target: "cart_timer::notify", "{}", message),
            NotifyLevel::Warning => warn!(target: "cart_timer::notify", "{}", message),
            NotifyLevel::Error => error!(target: "cart_timer::notify", "{}", message),
        }
    }
}

impl Collaborators {
    /// Wire up the in-memory collaborators
    pub fn in_memory(default_stock: u32) -> Self {
        Self {
            cart: Arc::new(InMemoryCart::new()),
            reservations: Arc::new(InMemoryStock::new(default_stock)),
            archive: Arc::new(InMemoryArchive::new()),
            notifier: Arc::new(LogNotifier),
        }
    }
}
