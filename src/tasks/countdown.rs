//! Cart countdown background task

use std::{sync::Arc, time::Duration};

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::state::{AppState, TickOutcome, TimerStatus};

const TICK: Duration = Duration::from_secs(1);

/// Background task that ticks the cart countdown once per second while it
/// is active and parks on the timer watch channel otherwise
pub async fn countdown_task(state: Arc<AppState>) {
    info!("Starting cart countdown task");

    let mut timer_rx = state.subscribe_timer();

    loop {
        let status = timer_rx.borrow_and_update().status();
        if status != TimerStatus::Active {
            if timer_rx.changed().await.is_err() {
                debug!("Timer channel closed, countdown task exiting");
                return;
            }
            continue;
        }

        debug!("Countdown active, ticking every second");
        let mut interval = interval_at(Instant::now() + TICK, TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if state.reconcile_with_cart().await {
                        break;
                    }
                    match state.tick() {
                        TickOutcome::Expired => {
                            state.handle_expiry().await;
                            break;
                        }
                        TickOutcome::Skipped => break,
                        TickOutcome::Counting { .. } | TickOutcome::Warning { .. } => {}
                    }
                }

                changed = timer_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let status = timer_rx.borrow_and_update().status();
                    if status != TimerStatus::Active {
                        debug!("Countdown left active state ({:?}), ticking stopped", status);
                        break;
                    }
                }
            }
        }
    }
}
