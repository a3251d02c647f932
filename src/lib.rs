//! Backend for the To4ka cafe ordering app.
//!
//! Three surfaces share one server:
//! - the customer menu/cart flow (`GET /menu`, `POST /orders`),
//! - the staff active-orders console (`/orders/active`, edit/pay/delete),
//! - reporting (`POST /report/daily`, idempotent per calendar day).
//!
//! Orders live in Postgres; every confirmed order is relayed to a Telegram
//! channel. Orders sharing an order number within one Tashkent business day
//! are merged into a single outbound message which is edited in place as the
//! table's order grows.
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{delete, get, post, put},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod cart;
pub mod config;
pub mod db;
pub mod error;
pub mod menu;
pub mod order;
pub mod report;
pub mod routes;
pub mod state;
pub mod telegram;

use routes::{
    active_orders, create_menu_item, daily_report, delete_menu_item, delete_order, get_menu,
    mark_paid, notify_order, submit_order, update_order,
};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/orders", post(submit_order))
        .route("/orders/active", get(active_orders))
        .route("/orders/notify", post(notify_order))
        .route("/orders/{id}", put(update_order).delete(delete_order))
        .route("/orders/{id}/pay", post(mark_paid))
        .route("/report/daily", post(daily_report))
        .route("/menu", get(get_menu))
        .route("/menu/items", post(create_menu_item))
        .route("/menu/items/{id}", delete(delete_menu_item))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
