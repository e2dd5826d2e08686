#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use cart_timer::{
    services::{
        ArchivedCart, ArchivedLine, CartItem, CartService, Collaborators, ExpiredItemsArchive,
        Notifier, NotifyLevel, Reservation, ServiceError, ServiceResult, StockReservations,
    },
    state::{AppState, MemoryTimerStore, TimerSettings},
    utils::ManualClock,
};
use chrono::Utc;

pub const T0: i64 = 1_735_689_600_000;

#[derive(Default)]
pub struct RecordingCart {
    items: Mutex<Vec<CartItem>>,
    pub fail_clear: AtomicBool,
    pub clear_calls: AtomicUsize,
}

impl RecordingCart {
    pub fn with_items(items: Vec<CartItem>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("cart lock").len()
    }

    /// Empty the cart without going through the engine
    pub fn clear_behind_engine(&self) {
        self.items.lock().expect("cart lock").clear();
    }
}

#[async_trait]
impl CartService for RecordingCart {
    async fn list_items(&self) -> ServiceResult<Vec<CartItem>> {
        Ok(self.items.lock().expect("cart lock").clone())
    }

    async fn add_item(&self, item: CartItem) -> ServiceResult<Vec<CartItem>> {
        let mut items = self.items.lock().expect("cart lock");
        match items.iter_mut().find(|line| line.variant_id == item.variant_id) {
            Some(line) => line.quantity += item.quantity,
            None => items.push(item),
        }
        Ok(items.clone())
    }

    async fn update_quantity(&self, variant_id: &str, quantity: u32) -> ServiceResult<Vec<CartItem>> {
        let mut items = self.items.lock().expect("cart lock");
        let line = items
            .iter_mut()
            .find(|line| line.variant_id == variant_id)
            .ok_or_else(|| ServiceError::NotInCart(variant_id.to_string()))?;
        line.quantity = quantity;
        Ok(items.clone())
    }

    async fn remove_item(&self, variant_id: &str) -> ServiceResult<Vec<CartItem>> {
        let mut items = self.items.lock().expect("cart lock");
        let before = items.len();
        items.retain(|line| line.variant_id != variant_id);
        if items.len() == before {
            return Err(ServiceError::NotInCart(variant_id.to_string()));
        }
        Ok(items.clone())
    }

    async fn clear(&self) -> ServiceResult<()> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(ServiceError::unavailable("cart", "clear rejected"));
        }
        self.items.lock().expect("cart lock").clear();
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingStock {
    pub out_of_stock: AtomicBool,
    pub unavailable: AtomicBool,
    pub reserved: Mutex<Vec<(String, u32, u32)>>,
    pub extended: Mutex<Vec<(String, u32)>>,
    pub released: Mutex<Vec<String>>,
    pub release_all_calls: AtomicUsize,
}

#[async_trait]
impl StockReservations for RecordingStock {
    async fn reserve(&self, variant_id: &str, quantity: u32, duration_minutes: u32) -> ServiceResult<Reservation> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::unavailable("stock", "ledger offline"));
        }
        if self.out_of_stock.load(Ordering::SeqCst) {
            return Ok(Reservation {
                success: false,
                remaining: Some(0),
            });
        }
        self.reserved
            .lock()
            .expect("stock lock")
            .push((variant_id.to_string(), quantity, duration_minutes));
        Ok(Reservation {
            success: true,
            remaining: Some(5),
        })
    }

    async fn extend(&self, variant_id: &str, additional_minutes: u32) -> ServiceResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::unavailable("stock", "ledger offline"));
        }
        self.extended
            .lock()
            .expect("stock lock")
            .push((variant_id.to_string(), additional_minutes));
        Ok(())
    }

    async fn release(&self, variant_id: &str) -> ServiceResult<()> {
        self.released.lock().expect("stock lock").push(variant_id.to_string());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::unavailable("stock", "ledger offline"));
        }
        Ok(())
    }

    async fn release_all(&self) -> ServiceResult<()> {
        self.release_all_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingArchive {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
    pub archived: Mutex<Vec<Vec<ArchivedLine>>>,
}

#[async_trait]
impl ExpiredItemsArchive for RecordingArchive {
    async fn archive(&self, items: &[ArchivedLine]) -> ServiceResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Give a concurrent trigger a chance to run while archival is in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::unavailable("archive", "write failed"));
        }
        self.archived.lock().expect("archive lock").push(items.to_vec());
        Ok(())
    }

    async fn list(&self) -> ServiceResult<Vec<ArchivedCart>> {
        Ok(self
            .archived
            .lock()
            .expect("archive lock")
            .iter()
            .map(|items| ArchivedCart {
                archived_at: Utc::now(),
                items: items.clone(),
            })
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, NotifyLevel)>>,
}

impl RecordingNotifier {
    pub fn count(&self, level: NotifyLevel) -> usize {
        self.messages
            .lock()
            .expect("notifier lock")
            .iter()
            .filter(|(_, l)| *l == level)
            .count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, level: NotifyLevel) {
        self.messages
            .lock()
            .expect("notifier lock")
            .push((message.to_string(), level));
    }
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub cart: Arc<RecordingCart>,
    pub stock: Arc<RecordingStock>,
    pub archive: Arc<RecordingArchive>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<MemoryTimerStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(TimerSettings::default(), RecordingCart::default(), MemoryTimerStore::new())
    }

    pub fn build(settings: TimerSettings, cart: RecordingCart, store: MemoryTimerStore) -> Self {
        let cart = Arc::new(cart);
        let stock = Arc::new(RecordingStock::default());
        let archive = Arc::new(RecordingArchive::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(store);
        let clock = Arc::new(ManualClock::new(T0));

        let collaborators = Collaborators {
            cart: cart.clone(),
            reservations: stock.clone(),
            archive: archive.clone(),
            notifier: notifier.clone(),
        };
        let state = Arc::new(AppState::new(settings, collaborators, store.clone(), clock.clone()));

        Self {
            state,
            cart,
            stock,
            archive,
            notifier,
            store,
            clock,
        }
    }

    pub fn archive_calls(&self) -> usize {
        self.archive.calls.load(Ordering::SeqCst)
    }

    pub fn clear_calls(&self) -> usize {
        self.cart.clear_calls.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> Vec<String> {
        self.stock.released.lock().expect("stock lock").clone()
    }

    /// Tick `n` times, advancing the manual clock in step
    pub fn tick_n(&self, n: usize) {
        for _ in 0..n {
            self.clock.advance_secs(1);
            self.state.tick();
        }
    }
}
