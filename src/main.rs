// =============================================================================
// Treasury Ledger — Main Entry Point
// =============================================================================
//
// Startup order: environment, settings, journal replay, HTTP server. The
// ledger replays its journal before the listener binds, so no request ever
// sees a partially restored state.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod ledger;
mod settings;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::ledger::{Clock, SystemClock, TreasuryLedger};
use crate::settings::{ServiceSettings, DEFAULT_SETTINGS_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & settings ────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Treasury Ledger — Starting Up                     ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let settings_path =
        std::env::var("LEDGER_SETTINGS").unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
    let mut settings = match ServiceSettings::load(&settings_path) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, path = %settings_path, "Failed to load settings, using defaults");
            let defaults = ServiceSettings::default();
            // First run: leave a template for the operator to fill in.
            if !Path::new(&settings_path).exists() {
                if let Err(e) = defaults.save(&settings_path) {
                    warn!(error = %e, "Failed to write default settings");
                }
            }
            defaults
        }
    };
    settings.apply_env()?;

    if settings.keys.is_empty() {
        warn!("Keyring is empty: every signed command will be rejected");
    }

    // ── 2. Ledger (journal replay) ───────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ledger = TreasuryLedger::open(&settings.journal_path, clock.clone())
        .with_context(|| format!("failed to open ledger journal {}", settings.journal_path))?;
    let ledger = Arc::new(ledger);

    info!(
        operational = ledger.is_operational(),
        total_trades = ledger.get_total_trades(),
        "Ledger ready"
    );

    // ── 3. Shared state & HTTP server ────────────────────────────────────
    let state = Arc::new(AppState::new(ledger, clock, &settings));
    let app = api::rest::router(state.clone());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "API server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        warn!("Shutdown signal received, stopping gracefully");
    });

    if let Err(e) = server.await {
        error!(error = %e, "API server failed");
        return Err(e.into());
    }

    info!(
        state_version = state.current_state_version(),
        "Treasury Ledger stopped"
    );
    Ok(())
}
