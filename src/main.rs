//! Cart Timer - reservation countdown for a sneaker storefront cart
//!
//! This is the main entry point for the cart-timer server.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use cart_timer::{
    api::create_router,
    config::Config,
    services::Collaborators,
    state::{AppState, FileTimerStore},
    tasks::countdown_task,
    utils::{shutdown_signal, SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("cart_timer={},tower_http=info", config.log_level()))
        .init();

    config.validate().map_err(anyhow::Error::msg)?;

    info!("Starting cart-timer server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, duration={}s, warning={}s, state_file={}",
        config.host,
        config.port,
        config.duration,
        config.warning,
        config.state_file.display()
    );

    let store = FileTimerStore::new(&config.state_file)?;
    let state = Arc::new(AppState::new(
        config.timer_settings(),
        Collaborators::in_memory(config.default_stock),
        Arc::new(store),
        Arc::new(SystemClock),
    ));

    // Restore a countdown left over from the previous run
    let recovery = state.recover().await;
    info!("Timer recovery: {:?}", recovery);

    // Start the countdown background task
    let timer_state = Arc::clone(&state);
    tokio::spawn(async move {
        countdown_task(timer_state).await;
    });

    // Create HTTP router with all endpoints
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET    /timer                    - Countdown and cart summary");
    info!("  POST   /timer/extend             - Reset countdown to full duration");
    info!("  GET    /cart                     - Cart contents");
    info!("  DELETE /cart                     - Empty cart");
    info!("  POST   /cart/items               - Reserve stock and add item");
    info!("  PATCH  /cart/items/:variant_id   - Change quantity");
    info!("  DELETE /cart/items/:variant_id   - Remove item");
    info!("  POST   /checkout/open            - Pause countdown");
    info!("  POST   /checkout/cancel          - Resume countdown");
    info!("  POST   /checkout/complete        - Confirm order");
    info!("  GET    /expired-items            - Archived expired carts");
    info!("  GET    /health                   - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        result = shutdown_signal() => {
            match result {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => tracing::error!("Signal handler failed: {}", e),
            }
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
