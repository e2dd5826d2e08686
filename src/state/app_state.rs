//! Main application state: the cart timer engine
//!
//! `AppState` is the only writer of the countdown. Every transition goes
//! through [`AppState::transition`], which mirrors the result to the timer
//! store and publishes it on the watch channel the countdown task and the
//! HTTP status endpoint read from.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use super::{
    persistence::{Recovered, TimerStore},
    timer_state::{
        format_clock, TickOutcome, TimerState, TimerStatus, DEFAULT_DURATION_SECONDS,
        DEFAULT_WARNING_THRESHOLD_SECONDS,
    },
};
use crate::{
    policy::{decide, CartEvent, PolicyContext, TimerAction},
    services::{
        ArchivedLine, CartItem, CartView, Collaborators, ExpirationHandler, ExpiryReport,
        NotifyLevel, ServiceError, ServiceResult,
    },
    utils::Clock,
};

/// Countdown and stock-hold tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSettings {
    pub duration_seconds: u64,
    pub warning_threshold_seconds: u64,
    /// Extra stock hold requested for every line when checkout opens
    pub checkout_hold_minutes: u32,
    /// How long duplicate expiry triggers stay suppressed after a run
    pub expiry_cooldown: Duration,
}

impl TimerSettings {
    /// Stock hold length for a newly added item, rounded up to whole minutes
    pub fn reservation_minutes(&self) -> u32 {
        let minutes = self.duration_seconds.div_ceil(60).max(1);
        u32::try_from(minutes).unwrap_or(u32::MAX)
    }
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            duration_seconds: DEFAULT_DURATION_SECONDS,
            warning_threshold_seconds: DEFAULT_WARNING_THRESHOLD_SECONDS,
            checkout_hold_minutes: 15,
            expiry_cooldown: Duration::from_millis(1000),
        }
    }
}

/// One-shot signals for countdown consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Warning { remaining: u64 },
    Extended { remaining: u64 },
    Expired { archived: bool, cleared: bool },
    Stopped,
}

/// Result of restoring the countdown at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Idle,
    Active { remaining: u64 },
    Paused { remaining: u64 },
    /// The window elapsed while the process was down; expiry ran
    Expired(Option<ExpiryReport>),
}

/// Shared application state that owns the cart countdown
pub struct AppState {
    pub settings: TimerSettings,
    timer_state: Mutex<TimerState>,
    store: Arc<dyn TimerStore>,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    expiry: ExpirationHandler,
    checkout_open: AtomicBool,
    /// Server start, for uptime reporting
    pub start_time: Instant,
    /// Latest countdown state, for the countdown task and status readers
    pub timer_update_tx: watch::Sender<TimerState>,
    /// Keep the receiver alive to prevent channel closure
    pub _timer_update_rx: watch::Receiver<TimerState>,
    pub event_tx: broadcast::Sender<TimerEvent>,
}

impl AppState {
    pub fn new(
        settings: TimerSettings,
        collaborators: Collaborators,
        store: Arc<dyn TimerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let timer = TimerState::new(settings.duration_seconds, settings.warning_threshold_seconds);
        let (timer_update_tx, timer_update_rx) = watch::channel(timer.clone());
        let (event_tx, _) = broadcast::channel(32);
        let expiry = ExpirationHandler::new(settings.expiry_cooldown);

        Self {
            settings,
            timer_state: Mutex::new(timer),
            store,
            collaborators,
            clock,
            expiry,
            checkout_open: AtomicBool::new(false),
            start_time: Instant::now(),
            timer_update_tx,
            _timer_update_rx: timer_update_rx,
            event_tx,
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Current countdown state
    pub fn get_timer_state(&self) -> TimerState {
        self.lock_timer().clone()
    }

    pub fn subscribe_timer(&self) -> watch::Receiver<TimerState> {
        self.timer_update_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TimerEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_checkout_open(&self) -> bool {
        self.checkout_open.load(Ordering::SeqCst)
    }

    pub fn is_expiry_in_flight(&self) -> bool {
        self.expiry.is_in_flight()
    }

    // ---- timer state machine -------------------------------------------

    /// Start a countdown for a cart holding `cart_len` lines
    pub fn start(&self, cart_len: usize) -> bool {
        self.transition("start", |timer, now| timer.start(now, cart_len))
    }

    pub fn extend(&self) -> bool {
        let extended = self.transition("extend", |timer, now| timer.extend(now));
        if extended {
            self.emit(TimerEvent::Extended {
                remaining: self.settings.duration_seconds,
            });
        }
        extended
    }

    pub fn pause(&self) -> bool {
        self.transition("pause", |timer, _| timer.pause())
    }

    pub fn resume(&self) -> bool {
        self.transition("resume", |timer, now| timer.resume(now))
    }

    pub fn stop(&self) -> bool {
        let stopped = self.transition("stop", |timer, _| timer.stop());
        // Clear even when already idle so a stale record never outlives the cart.
        self.clear_store();
        if stopped {
            self.emit(TimerEvent::Stopped);
        }
        stopped
    }

    /// Advance the countdown by one second
    pub fn tick(&self) -> TickOutcome {
        let (outcome, snapshot) = {
            let mut timer = self.lock_timer();
            let outcome = timer.tick();
            (outcome, timer.clone())
        };

        match outcome {
            TickOutcome::Skipped => return outcome,
            TickOutcome::Counting { remaining } => {
                debug!("Cart timer: {}s remaining", remaining);
            }
            TickOutcome::Warning { remaining } => {
                info!("Cart timer crossed warning threshold with {}s left", remaining);
                self.collaborators.notifier.notify(
                    &format!(
                        "Your cart expires in {}. Extend to keep your items.",
                        format_clock(remaining)
                    ),
                    NotifyLevel::Warning,
                );
                self.emit(TimerEvent::Warning { remaining });
            }
            TickOutcome::Expired => {
                info!("Cart timer reached zero");
            }
        }

        self.publish(snapshot);
        outcome
    }

    // ---- expiration ----------------------------------------------------

    /// Archive, clear and release the expired cart. Duplicate triggers
    /// while a run is in flight return `None`.
    pub async fn handle_expiry(&self) -> Option<ExpiryReport> {
        let report = self
            .expiry
            .run(&self.collaborators, |report| self.finish_expiry(report))
            .await;
        if let Some(report) = &report {
            self.emit(TimerEvent::Expired {
                archived: report.archived,
                cleared: report.cleared,
            });
            self.restart_if_refilled().await;
        }
        report
    }

    /// An add that slipped past the guard check must not sit in an idle cart
    async fn restart_if_refilled(&self) {
        if self.lock_timer().status() != TimerStatus::Idle {
            return;
        }
        let cart_len = self.cart_len().await;
        if cart_len > 0 && self.start(cart_len) {
            info!("Cart refilled during expiry, countdown restarted");
        }
    }

    fn finish_expiry(&self, report: &ExpiryReport) {
        self.checkout_open.store(false, Ordering::SeqCst);
        if report.cleared {
            self.transition("expired", |timer, _| timer.stop());
        } else {
            // Cart is stuck; keep showing Expired rather than a live 0:00.
            warn!("Expired cart could not be cleared, timer stays expired");
            self.transition("expired", |timer, _| {
                let changed = timer.status() != TimerStatus::Expired;
                timer.expire();
                changed
            });
        }
        self.clear_store();
    }

    // ---- persistence recovery ------------------------------------------

    /// Restore the countdown from the timer store after a restart
    pub async fn recover(&self) -> RecoveryOutcome {
        let record = match self.store.load() {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No persisted cart timer found");
                return RecoveryOutcome::Idle;
            }
            Err(e) => {
                warn!("Failed to load persisted cart timer: {}", e);
                return RecoveryOutcome::Idle;
            }
        };

        let items = match self.collaborators.cart.list_items().await {
            Ok(items) => items,
            Err(e) => {
                warn!("Could not read cart during recovery: {}", e);
                return RecoveryOutcome::Idle;
            }
        };
        if items.is_empty() {
            info!("Persisted cart timer belongs to an empty cart, discarding it");
            self.clear_store();
            return RecoveryOutcome::Idle;
        }

        let now = self.clock.now_millis();
        match record.recover(now, self.settings.duration_seconds) {
            Recovered::Nothing => {
                self.clear_store();
                RecoveryOutcome::Idle
            }
            Recovered::Active { remaining } => {
                info!("Recovered running cart timer with {}s left", remaining);
                self.transition("recover", |timer, now| {
                    timer.restore_active(remaining, now);
                    true
                });
                RecoveryOutcome::Active { remaining }
            }
            Recovered::Paused { remaining, started_at } => {
                info!("Recovered paused cart timer with {}s left", remaining);
                self.checkout_open.store(true, Ordering::SeqCst);
                self.transition("recover", |timer, now| {
                    timer.restore_paused(remaining, started_at, now);
                    true
                });
                RecoveryOutcome::Paused { remaining }
            }
            Recovered::Expired => {
                info!("Cart timer expired while the service was down");
                {
                    let mut timer = self.lock_timer();
                    timer.expire();
                    self.publish(timer.clone());
                }
                RecoveryOutcome::Expired(self.handle_expiry().await)
            }
        }
    }

    // ---- activity policy -----------------------------------------------

    /// Apply the activity rules to one event. Returns the transition that
    /// actually happened, `Ignore` when the rules or the state rejected it.
    pub async fn apply(&self, event: CartEvent) -> TimerAction {
        let ctx = PolicyContext {
            status: self.lock_timer().status(),
            checkout_open: self.is_checkout_open(),
            expiry_in_flight: self.is_expiry_in_flight(),
        };
        let action = decide(event, ctx);
        debug!("Cart event {:?} -> {:?}", event, action);

        let applied = match action {
            TimerAction::Start => {
                let cart_len = self.cart_len().await;
                self.start(cart_len)
            }
            TimerAction::Extend => {
                let extended = self.extend();
                if extended && event == CartEvent::ExtendRequested {
                    self.collaborators.notifier.notify(
                        &format!(
                            "Cart timer reset to {}",
                            format_clock(self.settings.duration_seconds)
                        ),
                        NotifyLevel::Success,
                    );
                }
                extended
            }
            TimerAction::Pause => {
                let paused = self.pause();
                if paused {
                    self.checkout_open.store(true, Ordering::SeqCst);
                    self.extend_holds().await;
                }
                paused
            }
            TimerAction::Resume => {
                self.checkout_open.store(false, Ordering::SeqCst);
                self.resume()
            }
            TimerAction::Stop => {
                self.checkout_open.store(false, Ordering::SeqCst);
                if event == CartEvent::OrderCompleted {
                    if let Err(e) = self.collaborators.reservations.release_all().await {
                        warn!("Failed to release reservations after order: {}", e);
                    }
                }
                self.stop()
            }
            TimerAction::Ignore => false,
        };

        if applied {
            action
        } else {
            TimerAction::Ignore
        }
    }

    /// Stop a countdown that outlived its cart (e.g. cleared elsewhere)
    pub async fn reconcile_with_cart(&self) -> bool {
        if !self.lock_timer().is_running() {
            return false;
        }
        match self.collaborators.cart.list_items().await {
            Ok(items) if items.is_empty() => {
                info!("Cart emptied outside the timer, stopping countdown");
                self.apply(CartEvent::CartEmptied).await == TimerAction::Stop
            }
            Ok(_) => false,
            Err(e) => {
                debug!("Skipping cart reconciliation: {}", e);
                false
            }
        }
    }

    // ---- cart operations -----------------------------------------------

    pub async fn cart_view(&self) -> ServiceResult<CartView> {
        let items = self.collaborators.cart.list_items().await?;
        Ok(CartView::from_items(items))
    }

    /// Reserve stock and add an item, starting or extending the countdown
    pub async fn add_item(&self, item: CartItem) -> ServiceResult<CartView> {
        if item.quantity == 0 {
            return Err(ServiceError::InvalidQuantity);
        }
        // The expiry sequence owns the cart until its guard drops. Items
        // added meanwhile would be cleared unarchived or left without a timer.
        if self.is_expiry_in_flight() {
            info!("Refusing to add {} while expired cart is being cleared", item.variant_id);
            return Err(ServiceError::ExpiryInProgress);
        }

        self.reserve(&item.variant_id, item.quantity).await?;
        // A failed add leaves the hold to lapse on its own.
        let items = self.collaborators.cart.add_item(item).await?;
        self.apply(CartEvent::ItemAdded).await;
        Ok(CartView::from_items(items))
    }

    /// Change a line's quantity, adjusting its stock hold
    pub async fn update_quantity(&self, variant_id: &str, quantity: u32) -> ServiceResult<CartView> {
        if quantity == 0 {
            return Err(ServiceError::InvalidQuantity);
        }
        let current = self
            .collaborators
            .cart
            .list_items()
            .await?
            .into_iter()
            .find(|item| item.variant_id == variant_id)
            .ok_or_else(|| ServiceError::NotInCart(variant_id.to_string()))?;

        if quantity > current.quantity {
            self.reserve(variant_id, quantity - current.quantity).await?;
        } else if quantity < current.quantity {
            self.release(variant_id).await;
            if let Err(e) = self.reserve(variant_id, quantity).await {
                warn!("Failed to re-reserve {} x {}: {}", quantity, variant_id, e);
            }
        }

        let items = self.collaborators.cart.update_quantity(variant_id, quantity).await?;
        Ok(CartView::from_items(items))
    }

    /// Remove a line; removing the last one stops the countdown
    pub async fn remove_item(&self, variant_id: &str) -> ServiceResult<CartView> {
        let items = self.collaborators.cart.remove_item(variant_id).await?;
        self.release(variant_id).await;
        if items.is_empty() {
            self.apply(CartEvent::CartEmptied).await;
        }
        Ok(CartView::from_items(items))
    }

    pub async fn clear_cart(&self) -> ServiceResult<CartView> {
        self.collaborators.cart.clear().await?;
        if let Err(e) = self.collaborators.reservations.release_all().await {
            warn!("Failed to release reservations after clearing cart: {}", e);
        }
        self.apply(CartEvent::CartEmptied).await;
        Ok(CartView::from_items(Vec::new()))
    }

    pub async fn open_checkout(&self) -> TimerAction {
        self.apply(CartEvent::CheckoutOpened).await
    }

    pub async fn cancel_checkout(&self) -> TimerAction {
        self.apply(CartEvent::CheckoutCancelled).await
    }

    /// Confirm the order: empty the cart, then stop the countdown and release
    /// holds. Returns the ordered lines.
    pub async fn complete_order(&self) -> ServiceResult<Vec<ArchivedLine>> {
        let items = self.collaborators.cart.list_items().await?;
        if items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        let lines: Vec<ArchivedLine> = items.iter().map(CartItem::line).collect();

        // Clear first so a failure leaves the countdown and holds in place.
        if let Err(e) = self.collaborators.cart.clear().await {
            warn!("Could not clear cart for order, keeping countdown: {}", e);
            return Err(e);
        }
        self.apply(CartEvent::OrderCompleted).await;
        info!("Order completed with {} lines", lines.len());
        Ok(lines)
    }

    /// Shopper asked for more time from the warning prompt
    pub async fn request_extend(&self) -> bool {
        self.apply(CartEvent::ExtendRequested).await == TimerAction::Extend
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let secs = self.start_time.elapsed().as_secs();
        let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    // ---- internals -----------------------------------------------------

    fn lock_timer(&self) -> MutexGuard<'_, TimerState> {
        self.timer_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a state machine transition, then persist and publish it
    fn transition<F>(&self, action: &str, apply: F) -> bool
    where
        F: FnOnce(&mut TimerState, i64) -> bool,
    {
        let now = self.clock.now_millis();
        let mut timer = self.lock_timer();
        if !apply(&mut timer, now) {
            debug!("Cart timer {} ignored in {:?} state", action, timer.status());
            return false;
        }

        info!(
            "Cart timer {}: status={:?} remaining={:?}",
            action,
            timer.status(),
            timer.remaining_seconds()
        );
        let snapshot = timer.clone();
        self.persist(&snapshot);
        drop(timer);

        self.publish(snapshot);
        true
    }

    fn persist(&self, timer: &TimerState) {
        let result = match timer.persisted() {
            Some(record) => self.store.save(&record),
            None => self.store.clear(),
        };
        if let Err(e) = result {
            warn!("Failed to persist cart timer: {}", e);
        }
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear persisted cart timer: {}", e);
        }
    }

    fn publish(&self, timer: TimerState) {
        if let Err(e) = self.timer_update_tx.send(timer) {
            warn!("Failed to send timer update: {}", e);
        }
    }

    fn emit(&self, event: TimerEvent) {
        // No subscribers is normal; events are advisory.
        let _ = self.event_tx.send(event);
    }

    async fn cart_len(&self) -> usize {
        match self.collaborators.cart.list_items().await {
            Ok(items) => items.len(),
            Err(e) => {
                warn!("Could not read cart: {}", e);
                0
            }
        }
    }

    async fn reserve(&self, variant_id: &str, quantity: u32) -> ServiceResult<()> {
        let minutes = self.settings.reservation_minutes();
        match self.collaborators.reservations.reserve(variant_id, quantity, minutes).await {
            Ok(reservation) if reservation.success => Ok(()),
            Ok(reservation) => Err(ServiceError::OutOfStock {
                variant_id: variant_id.to_string(),
                remaining: reservation.remaining.unwrap_or(0),
            }),
            Err(e @ ServiceError::OutOfStock { .. }) => Err(e),
            Err(e) => {
                // Ledger outages must not block the cart.
                warn!("Stock reservation for {} failed, continuing without hold: {}", variant_id, e);
                Ok(())
            }
        }
    }

    async fn release(&self, variant_id: &str) {
        if let Err(e) = self.collaborators.reservations.release(variant_id).await {
            warn!("Failed to release reservation for {}: {}", variant_id, e);
        }
    }

    async fn extend_holds(&self) {
        let items = match self.collaborators.cart.list_items().await {
            Ok(items) => items,
            Err(e) => {
                warn!("Could not read cart to extend stock holds: {}", e);
                return;
            }
        };
        let minutes = self.settings.checkout_hold_minutes;
        for item in &items {
            if let Err(e) = self.collaborators.reservations.extend(&item.variant_id, minutes).await {
                warn!("Failed to extend hold for {}: {}", item.variant_id, e);
                self.collaborators.notifier.notify(
                    &format!("Stock for {} may not be held during checkout", item.variant_id),
                    NotifyLevel::Warning,
                );
            }
        }
    }
}
