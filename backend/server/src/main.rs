//! WeForYou Foundation backend — entry point.
//!
//! Wires the donation ledger, volunteer collection, pledge, and receipt
//! modules behind an Axum REST API backed by SQLite. Identity arrives from
//! an upstream auth proxy; payment processing goes through the configured
//! gateway adapter (Razorpay or the mock stand-in).

mod api;
mod auth;
mod collection;
mod config;
mod db;
mod errors;
mod gateway;
mod ledger;
mod models;
mod notify;
mod pledges;
mod receipts;
#[cfg(test)]
mod testutil;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use ledger::AppState;
use notify::Notifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env()?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // Payment gateway: Razorpay, or the deterministic stand-in in mock mode.
    let gateway = gateway::from_config(&config)?;

    let state = Arc::new(AppState {
        pool,
        gateway,
        config: config.clone(),
        notifier: Notifier::new(),
    });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/campaigns", post(api::create_campaign).get(api::list_campaigns))
        .route("/campaigns/:id", get(api::get_campaign))
        .route("/donations", post(api::create_donation))
        .route("/donations/general", post(api::create_general_donation))
        .route("/donations/my", get(api::my_donations))
        .route("/donations/:id/verify", post(api::verify_donation))
        .route("/donations/:id/receipt", get(api::download_receipt))
        .route("/admin/donations/:id/refund", post(api::refund_donation))
        .route("/webhooks/razorpay", post(api::razorpay_webhook))
        .route("/volunteer/collect", post(api::collect_donation))
        .route(
            "/admin/collections/:id/confirm-deposit",
            post(api::confirm_cash_deposit),
        )
        .route("/volunteers/:id/stats", get(api::volunteer_stats))
        .route("/pledges", post(api::create_pledge))
        .route("/pledges/my", get(api::my_pledges))
        .route("/pledges/:id", get(api::get_pledge).patch(api::update_pledge))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
