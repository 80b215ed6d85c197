mod availability;
mod deep_scan;
mod error;
mod ghl;
mod ghl_types;
mod handlers;
mod identity;
mod reconcile;
mod resolver;
mod retell_types;
#[cfg(test)]
mod test_support;
mod trace;
mod types;

use crate::ghl::GhlClient;
use crate::trace::DebugTrace;
use crate::types::{AppState, IdentityLocks};

use axum::{
    routing::{get, post},
    Router,
};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() {
    // Deployments configure through real env vars; .env is local convenience.
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            ("ghl_voice_bridge", tracing_subscriber::filter::LevelFilter::DEBUG),
        ]));
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let api_key = env::var("GHL_API_KEY").expect("GHL_API_KEY not set!");
    let location_id = env::var("GHL_LOCATION_ID").expect("GHL_LOCATION_ID not set!");
    let calendar_id = env::var("GHL_CALENDAR_ID").expect("GHL_CALENDAR_ID not set!");
    let assigned_user_id = env::var("GHL_ASSIGNED_USER_ID").ok();
    let api_base = env::var("GHL_API_BASE").ok();
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let crm = GhlClient::new(api_key, location_id, assigned_user_id, api_base);
    let app_state = Arc::new(AppState {
        crm,
        calendar_id,
        trace: DebugTrace::new(),
        booking_locks: IdentityLocks::new(),
    });

    let app = Router::new()
        .route("/retell/check_availability", post(handlers::check_availability))
        .route("/retell/book_appointment", post(handlers::book_appointment))
        .route("/retell/cancel_appointment", post(handlers::cancel_appointment))
        .route("/retell/get_contact_info", post(handlers::get_contact_info))
        .route("/retell/update_contact_info", post(handlers::update_contact_info))
        .route(
            "/debug/trace",
            get(handlers::trace_snapshot).delete(handlers::trace_reset),
        )
        .route("/", get(|| async { "ghl-voice-bridge" }))
        .with_state(app_state);

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().unwrap();
    tracing::info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
