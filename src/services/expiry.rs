//! Archive-then-clear sequence run when a cart countdown reaches zero

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use tokio::time::sleep;
use tracing::{error, info, warn};

use super::collaborators::{ArchivedLine, Collaborators, NotifyLevel};

/// What happened during one expiration run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryReport {
    /// Cart lines captured before anything was mutated
    pub items: Vec<ArchivedLine>,
    pub archived: bool,
    pub cleared: bool,
    /// Number of reservation releases that failed
    pub release_failures: usize,
}

/// Runs the expiration sequence at most once at a time
#[derive(Debug)]
pub struct ExpirationHandler {
    in_flight: AtomicBool,
    cooldown: Duration,
}

impl ExpirationHandler {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            cooldown,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run the sequence unless one is already in flight.
    ///
    /// `on_complete` sees the report before the cooldown starts, so callers
    /// can update their own state while duplicate triggers are still
    /// suppressed. Returns `None` when the call collapsed into a running one.
    pub async fn run<F>(&self, collaborators: &Collaborators, on_complete: F) -> Option<ExpiryReport>
    where
        F: FnOnce(&ExpiryReport),
    {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Expiration already in flight, ignoring duplicate trigger");
            return None;
        }

        let report = execute(collaborators).await;
        on_complete(&report);

        if !self.cooldown.is_zero() {
            sleep(self.cooldown).await;
        }
        self.in_flight.store(false, Ordering::SeqCst);

        Some(report)
    }
}

async fn execute(collaborators: &Collaborators) -> ExpiryReport {
    info!("Cart timer expired, archiving and clearing cart");

    let items: Vec<ArchivedLine> = match collaborators.cart.list_items().await {
        Ok(items) => items.iter().map(|item| item.line()).collect(),
        Err(e) => {
            error!("Failed to snapshot cart before expiry: {}", e);
            Vec::new()
        }
    };

    let archived = if items.is_empty() {
        false
    } else {
        match collaborators.archive.archive(&items).await {
            Ok(()) => {
                info!("Archived {} expired cart lines", items.len());
                true
            }
            Err(e) => {
                warn!("Failed to archive expired cart: {}", e);
                collaborators.notifier.notify(
                    "We couldn't save your expired items for reorder",
                    NotifyLevel::Error,
                );
                false
            }
        }
    };

    let cleared = match collaborators.cart.clear().await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to clear expired cart: {}", e);
            false
        }
    };

    let mut release_failures = 0;
    for line in &items {
        if let Err(e) = collaborators.reservations.release(&line.variant_id).await {
            warn!("Failed to release reservation for {}: {}", line.variant_id, e);
            release_failures += 1;
        }
    }

    let message = if archived {
        "Your cart expired and was cleared. Items were saved to Expired Items."
    } else {
        "Your cart expired and was cleared."
    };
    collaborators.notifier.notify(message, NotifyLevel::Warning);

    ExpiryReport {
        items,
        archived,
        cleared,
        release_failures,
    }
}
