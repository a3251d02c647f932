use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    db,
    error::AppError,
    menu::{Category, MenuItem},
    order::{self, LineItem, Order, OrderStore, PaymentMethod},
    report::{self, DailyReport, DayWindow},
    state::AppState,
    telegram::format_order_message,
};

const ORDER_PARSE_MODE: &str = "MarkdownV2";
const REPORT_PARSE_MODE: &str = "HTML";

#[derive(Deserialize)]
pub struct SubmitOrderRequest {
    items: Vec<LineItem>,
    total: i64,
    #[serde(default)]
    payment_method: Option<PaymentMethod>,
}

/// Customer cart submission: persists a draft and relays it to the channel.
/// A delivery failure is reported but the draft stays persisted.
pub async fn submit_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitOrderRequest>,
) -> Result<Json<Value>, AppError> {
    if payload.items.is_empty() {
        return Err(AppError::Validation("no items provided".to_string()));
    }

    let total = order::items_total(&payload.items);
    if payload.total != total {
        warn!(
            "Client total {} disagrees with recomputed total {}",
            payload.total, total
        );
    }

    let payment_method = payload.payment_method.unwrap_or(PaymentMethod::Cash);
    let order = db::insert_draft(&state.db, &payload.items, total, payment_method).await?;
    info!("Order #{} saved as draft", order.order_number);

    let text = format_order_message(
        order.order_number,
        &order.items,
        order.total,
        order.payment_method,
    );
    state
        .telegram
        .send_message(&text, ORDER_PARSE_MODE)
        .await
        .inspect_err(|e| {
            warn!(
                "Order #{} persisted but notification failed: {e}",
                order.order_number
            );
        })?;

    Ok(Json(json!({
        "success": true,
        "order_id": order.id,
        "order_number": order.order_number,
    })))
}

#[derive(Deserialize)]
pub struct NotifyOrderRequest {
    items: Vec<LineItem>,
    total: i64,
    order_number: i32,
    payment_method: PaymentMethod,
    #[serde(default)]
    order_id: Option<Uuid>,
}

/// Relays a paid order to the channel with merge-by-number semantics.
pub async fn notify_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NotifyOrderRequest>,
) -> Result<Json<Value>, AppError> {
    if payload.items.is_empty() {
        return Err(AppError::Validation("no items provided".to_string()));
    }

    if let Some(order_id) = payload.order_id {
        info!(
            "Notify request for order #{} (row {order_id})",
            payload.order_number
        );
    }

    send_merged_notification(
        &state,
        payload.order_number,
        &payload.items,
        payload.total,
        payload.payment_method,
        Utc::now(),
    )
    .await?;

    Ok(Json(json!({ "success": true })))
}

/// Merge-by-number delivery. All rows sharing the order number within the
/// business day around `anchor` are concatenated in creation order; if one of
/// them already references an outbound message that message is edited in
/// place, with a plain send as the fallback. Concurrent submissions for one
/// number can still race and duplicate a message; at this volume that is
/// accepted.
async fn send_merged_notification(
    state: &AppState,
    order_number: i32,
    fallback_items: &[LineItem],
    fallback_total: i64,
    payment_method: PaymentMethod,
    anchor: DateTime<Utc>,
) -> Result<(), AppError> {
    let window = report::business_day(anchor);
    let same_day = db::orders_by_number_in(&state.db, order_number, window).await?;

    let (items, total) = if same_day.is_empty() {
        (fallback_items.to_vec(), fallback_total)
    } else {
        order::merge_orders(&same_day)
    };

    let text = format_order_message(order_number, &items, total, payment_method);

    let existing = same_day.iter().find_map(|o| o.telegram_message_id);
    let message_id = match existing {
        Some(id) => match state.telegram.edit_message(id, &text, ORDER_PARSE_MODE).await {
            Ok(()) => id,
            Err(e) => {
                warn!("Editing message {id} for order #{order_number} failed, sending anew: {e}");
                state.telegram.send_message(&text, ORDER_PARSE_MODE).await?
            }
        },
        None => state.telegram.send_message(&text, ORDER_PARSE_MODE).await?,
    };

    // Losing this write only risks a duplicate message on the next amendment.
    if let Err(e) = db::set_message_id(&state.db, order_number, window, message_id).await {
        warn!("Failed to record message id for order #{order_number}: {e}");
    }

    Ok(())
}

/// Draft orders for the console, newest first.
pub async fn active_orders(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(state.db.drafts().await?))
}

#[derive(Deserialize)]
pub struct UpdateOrderRequest {
    items: Vec<LineItem>,
    #[serde(default)]
    payment_method: Option<PaymentMethod>,
}

/// Console edit of a draft: zero-quantity lines are dropped, the total is
/// recomputed server-side, and an edit that empties the order is rejected.
pub async fn update_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderRequest>,
) -> Result<Json<Value>, AppError> {
    let (items, total) = order::apply_edit(payload.items)?;

    let updated = db::update_draft(&state.db, id, &items, total, payload.payment_method).await?;
    if !updated {
        return Err(AppError::OrderNotFound);
    }

    Ok(Json(json!({ "success": true, "total": total })))
}

/// Marks a draft paid and notifies the channel. The merge window is anchored
/// to the order's creation time so an order paid just after local midnight
/// still finds its own same-day rows.
pub async fn mark_paid(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let order = db::get_order(&state.db, id)
        .await?
        .ok_or(AppError::OrderNotFound)?;

    order::pay(&state.db, &order, || {
        send_merged_notification(
            &state,
            order.order_number,
            &order.items,
            order.total,
            order.payment_method,
            order.created_at,
        )
    })
    .await?;

    info!("Order #{} paid", order.order_number);
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    order::remove(&state.db, id).await?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Serialize)]
pub struct DailyReportResponse {
    success: bool,
    #[serde(rename = "totalOrders")]
    total_orders: u32,
    #[serde(rename = "totalSum")]
    total_sum: i64,
    #[serde(rename = "alreadySent", skip_serializing_if = "std::ops::Not::not")]
    already_sent: bool,
}

/// Sends the end-of-day summary. One report per Tashkent calendar day: the
/// `daily_reports` row is the idempotency key, so an external scheduler can
/// trigger this as often as it likes.
pub async fn daily_report(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DailyReportResponse>, AppError> {
    let window = report::business_day(Utc::now());

    if !db::claim_report_day(&state.db, window.date).await? {
        info!("Daily report for {} already sent, skipping", window.date);
        return Ok(Json(DailyReportResponse {
            success: true,
            total_orders: 0,
            total_sum: 0,
            already_sent: true,
        }));
    }

    match send_daily_report(&state, window).await {
        Ok(summary) => Ok(Json(DailyReportResponse {
            success: true,
            total_orders: summary.total_orders,
            total_sum: summary.total_sum,
            already_sent: false,
        })),
        Err(e) => {
            // Give the claimed slot back so a later trigger can retry.
            if let Err(release) = db::release_report_day(&state.db, window.date).await {
                error!("Failed to release report slot for {}: {release}", window.date);
            }
            Err(e)
        }
    }
}

async fn send_daily_report(state: &AppState, window: DayWindow) -> Result<DailyReport, AppError> {
    let orders = db::paid_orders_in(&state.db, window).await?;
    let summary = report::aggregate(&orders);
    let text = report::format_report(&summary, window.date);

    state.telegram.send_message(&text, REPORT_PARSE_MODE).await?;

    info!(
        "Daily report for {} sent: {} orders, {} total",
        window.date, summary.total_orders, summary.total_sum
    );
    Ok(summary)
}

#[derive(Serialize)]
pub struct MenuResponse {
    categories: Vec<Category>,
    items: Vec<MenuItem>,
}

pub async fn get_menu(State(state): State<Arc<AppState>>) -> Result<Json<MenuResponse>, AppError> {
    let categories = db::list_categories(&state.db).await?;
    let items = db::list_menu_items(&state.db).await?;

    Ok(Json(MenuResponse { categories, items }))
}

#[derive(Deserialize)]
pub struct CreateMenuItemRequest {
    name: String,
    category: String,
    #[serde(default)]
    price: Option<i64>,
    #[serde(default)]
    volume: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

pub async fn create_menu_item(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateMenuItemRequest>,
) -> Result<Json<Value>, AppError> {
    let name = payload.name.trim();
    let category = payload.category.trim();
    if name.is_empty() || category.is_empty() {
        return Err(AppError::Validation(
            "name and category are required".to_string(),
        ));
    }

    let id = menu_item_id(name);
    db::insert_menu_item(
        &state.db,
        &id,
        name,
        category,
        payload.price,
        payload.volume.as_deref().map(str::trim).filter(|v| !v.is_empty()),
        payload
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty()),
    )
    .await?;

    info!("Menu item {id} added");
    Ok(Json(json!({ "success": true, "id": id })))
}

pub async fn delete_menu_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if !db::delete_menu_item(&state.db, &id).await? {
        return Err(AppError::MenuItemNotFound);
    }

    Ok(Json(json!({ "success": true })))
}

/// Item ids are slugged from the name with a timestamp suffix so re-adding a
/// deleted item never collides.
fn menu_item_id(name: &str) -> String {
    let slug = name
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");

    format!("{slug}-{}", Utc::now().timestamp_millis())
}
