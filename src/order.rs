//! Order model and the reconciliation rules around it.
//!
//! A table's order is amended several times before payment, each amendment
//! landing as its own row under the same order number. At payment time all
//! same-day rows for that number are merged into one outbound notification.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub price: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    PaymeClick,
}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "💵 Наличные",
            PaymentMethod::Card => "💳 Карта",
            PaymentMethod::PaymeClick => "📱 Payme/Click",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: i32,
    pub items: Vec<LineItem>,
    pub total: i64,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_message_id: Option<i64>,
}

pub fn items_total(items: &[LineItem]) -> i64 {
    items
        .iter()
        .map(|item| item.price * item.quantity as i64)
        .sum()
}

/// Line items and combined total for a set of same-numbered orders.
/// Items are concatenated in ascending creation order; the total is
/// recomputed from the merged items rather than trusted from the rows.
pub fn merge_orders(orders: &[Order]) -> (Vec<LineItem>, i64) {
    let mut sorted: Vec<&Order> = orders.iter().collect();
    sorted.sort_by_key(|o| o.created_at);

    let items: Vec<LineItem> = sorted
        .into_iter()
        .flat_map(|o| o.items.iter().cloned())
        .collect();
    let total = items_total(&items);

    (items, total)
}

/// Durable order operations the lifecycle transitions run against.
/// `PgPool` is the production implementation.
#[allow(async_fn_in_trait)]
pub trait OrderStore {
    async fn set_status(&self, id: Uuid, status: OrderStatus) -> Result<(), AppError>;
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
    async fn drafts(&self) -> Result<Vec<Order>, AppError>;
}

/// Marks the order paid, then runs the delivery. The paid status is durable
/// before the attempt; a failed delivery reverts the order to draft so the
/// console does not lose it.
pub async fn pay<S, F, Fut>(store: &S, order: &Order, notify: F) -> Result<(), AppError>
where
    S: OrderStore,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), AppError>>,
{
    store.set_status(order.id, OrderStatus::Paid).await?;

    if let Err(e) = notify().await {
        if let Err(revert) = store.set_status(order.id, OrderStatus::Draft).await {
            error!("Failed to revert order {} to draft: {revert}", order.id);
        }
        return Err(e);
    }

    Ok(())
}

pub async fn remove<S: OrderStore>(store: &S, id: Uuid) -> Result<(), AppError> {
    if !store.delete(id).await? {
        return Err(AppError::OrderNotFound);
    }

    Ok(())
}

/// Applies a console edit: zero-quantity lines are dropped, an edit that
/// empties the order is rejected, and the total is recomputed server-side.
pub fn apply_edit(items: Vec<LineItem>) -> Result<(Vec<LineItem>, i64), AppError> {
    let kept: Vec<LineItem> = items.into_iter().filter(|i| i.quantity > 0).collect();

    if kept.is_empty() {
        return Err(AppError::Validation("order cannot be empty".to_string()));
    }

    let total = items_total(&kept);
    Ok((kept, total))
}
