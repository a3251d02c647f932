//! # Postgres
//!
//! Everything durable lives here: orders (line items as JSONB), the menu
//! catalog, and the one-row-per-day report ledger that keeps the daily
//! summary from being sent twice.
//!
//! Queries are plain `query_as` against hand-written SQL; the schema is in
//! `migrations/` and applied at startup.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    FromRow, PgPool,
    postgres::PgPoolOptions,
    types::Json,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::menu::{Category, MenuItem, Pricing, Variant};
use crate::order::{LineItem, Order, OrderStatus, OrderStore, PaymentMethod};
use crate::report::DayWindow;

pub async fn init_postgres(database_url: &str) -> PgPool {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .expect("Database misconfigured!");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Migrations failed!");

    pool
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: i32,
    items: Json<Vec<LineItem>>,
    total: i64,
    payment_method: PaymentMethod,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    telegram_message_id: Option<i64>,
}

impl From<OrderRow> for Order {
    fn from(row: OrderRow) -> Self {
        Order {
            id: row.id,
            order_number: row.order_number,
            items: row.items.0,
            total: row.total,
            payment_method: row.payment_method,
            status: row.status,
            created_at: row.created_at,
            telegram_message_id: row.telegram_message_id,
        }
    }
}

const ORDER_COLUMNS: &str =
    "id, order_number, items, total, payment_method, status, created_at, telegram_message_id";

/// Inserts a draft order; the order number comes from a database sequence.
pub async fn insert_draft(
    pool: &PgPool,
    items: &[LineItem],
    total: i64,
    payment_method: PaymentMethod,
) -> Result<Order, sqlx::Error> {
    let row: OrderRow = sqlx::query_as(&format!(
        "INSERT INTO orders (id, items, total, payment_method, status)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {ORDER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(Json(items))
    .bind(total)
    .bind(payment_method)
    .bind(OrderStatus::Draft)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

pub async fn get_order(pool: &PgPool, id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    let row: Option<OrderRow> =
        sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(Order::from))
}

/// Draft orders for the console, newest first.
pub async fn list_drafts(pool: &PgPool) -> Result<Vec<Order>, sqlx::Error> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE status = $1
         ORDER BY created_at DESC"
    ))
    .bind(OrderStatus::Draft)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Order::from).collect())
}

/// Replaces a draft's items and total, and optionally its payment method.
pub async fn update_draft(
    pool: &PgPool,
    id: Uuid,
    items: &[LineItem],
    total: i64,
    payment_method: Option<PaymentMethod>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE orders
         SET items = $2, total = $3, payment_method = COALESCE($4, payment_method)
         WHERE id = $1 AND status = $5",
    )
    .bind(id)
    .bind(Json(items))
    .bind(total)
    .bind(payment_method)
    .bind(OrderStatus::Draft)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn set_status(pool: &PgPool, id: Uuid, status: OrderStatus) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn delete_order(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

impl OrderStore for PgPool {
    async fn set_status(&self, id: Uuid, status: OrderStatus) -> Result<(), AppError> {
        set_status(self, id, status).await.map_err(AppError::from)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        delete_order(self, id).await.map_err(AppError::from)
    }

    async fn drafts(&self) -> Result<Vec<Order>, AppError> {
        list_drafts(self).await.map_err(AppError::from)
    }
}

/// All orders carrying `order_number` created inside the window, ascending
/// by creation time — the merge-by-number input set.
pub async fn orders_by_number_in(
    pool: &PgPool,
    order_number: i32,
    window: DayWindow,
) -> Result<Vec<Order>, sqlx::Error> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE order_number = $1 AND created_at >= $2 AND created_at < $3
         ORDER BY created_at ASC"
    ))
    .bind(order_number)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Order::from).collect())
}

/// Records the outbound message id on every same-numbered row of the day so
/// the next amendment edits in place instead of sending anew.
pub async fn set_message_id(
    pool: &PgPool,
    order_number: i32,
    window: DayWindow,
    message_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE orders SET telegram_message_id = $4
         WHERE order_number = $1 AND created_at >= $2 AND created_at < $3",
    )
    .bind(order_number)
    .bind(window.start)
    .bind(window.end)
    .bind(message_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn paid_orders_in(pool: &PgPool, window: DayWindow) -> Result<Vec<Order>, sqlx::Error> {
    let rows: Vec<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE status = $1 AND created_at >= $2 AND created_at < $3"
    ))
    .bind(OrderStatus::Paid)
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Order::from).collect())
}

/// Claims the daily report slot for `date`. Returns false when the report
/// for that calendar day was already sent.
pub async fn claim_report_day(pool: &PgPool, date: NaiveDate) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("INSERT INTO daily_reports (report_date) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(date)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Releases a claimed report slot after a failed delivery so a later trigger
/// can try again.
pub async fn release_report_day(pool: &PgPool, date: NaiveDate) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM daily_reports WHERE report_date = $1")
        .bind(date)
        .execute(pool)
        .await?;

    Ok(())
}

#[derive(FromRow)]
struct MenuItemRow {
    id: String,
    name: String,
    category: String,
    price: Option<i64>,
    volume: Option<String>,
    variants: Option<Json<Vec<Variant>>>,
    description: Option<String>,
    image: Option<String>,
}

impl From<MenuItemRow> for MenuItem {
    fn from(row: MenuItemRow) -> Self {
        let pricing = match row.variants {
            Some(Json(variants)) if !variants.is_empty() => Pricing::Variants { variants },
            _ => Pricing::Flat {
                price: row.price.unwrap_or(0),
                volume: row.volume,
            },
        };

        MenuItem {
            id: row.id,
            name: row.name,
            category: row.category,
            pricing,
            description: row.description,
            image: row.image,
        }
    }
}

pub async fn list_categories(pool: &PgPool) -> Result<Vec<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>(
        "SELECT id, name, emoji, sort_order FROM categories ORDER BY sort_order",
    )
    .fetch_all(pool)
    .await
}

pub async fn list_menu_items(pool: &PgPool) -> Result<Vec<MenuItem>, sqlx::Error> {
    let rows: Vec<MenuItemRow> = sqlx::query_as(
        "SELECT id, name, category, price, volume, variants, description, image
         FROM menu_items ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(MenuItem::from).collect())
}

pub async fn insert_menu_item(
    pool: &PgPool,
    id: &str,
    name: &str,
    category: &str,
    price: Option<i64>,
    volume: Option<&str>,
    description: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO menu_items (id, name, category, price, volume, description)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(name)
    .bind(category)
    .bind(price)
    .bind(volume)
    .bind(description)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn delete_menu_item(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM menu_items WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
