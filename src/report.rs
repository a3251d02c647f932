//! Daily report: business-day window and paid-order aggregation.
//!
//! The cafe's books close on Tashkent local midnight (fixed UTC+5, no DST),
//! so the day window is computed in that offset and handed to the store as
//! UTC instants.

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::order::{Order, PaymentMethod};
use crate::telegram::{escape_html, format_sum};

const TASHKENT_OFFSET_SECS: i32 = 5 * 3600;

/// One business day, `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Tashkent calendar date the window covers; doubles as the report's
    /// idempotency key.
    pub date: NaiveDate,
}

/// The business day containing `now`: local midnight to the next local
/// midnight at UTC+5.
pub fn business_day(now: DateTime<Utc>) -> DayWindow {
    let offset = FixedOffset::east_opt(TASHKENT_OFFSET_SECS).unwrap();
    let local_date = now.with_timezone(&offset).date_naive();

    let start_local = offset
        .from_local_datetime(&local_date.and_hms_opt(0, 0, 0).unwrap())
        .unwrap();
    let start = start_local.with_timezone(&Utc);

    DayWindow {
        start,
        end: start + Duration::days(1),
        date: local_date,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MethodStats {
    pub count: u32,
    pub sum: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductStats {
    pub name: String,
    pub quantity: u32,
    pub sum: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyReport {
    pub total_orders: u32,
    pub total_sum: i64,
    pub cash: MethodStats,
    pub card: MethodStats,
    pub payme_click: MethodStats,
    /// Per-product quantity and revenue, descending by revenue.
    pub products: Vec<ProductStats>,
}

pub fn aggregate(orders: &[Order]) -> DailyReport {
    let mut report = DailyReport {
        total_orders: orders.len() as u32,
        ..DailyReport::default()
    };

    let mut products: HashMap<String, (u32, i64)> = HashMap::new();

    for order in orders {
        report.total_sum += order.total;

        let method = match order.payment_method {
            PaymentMethod::Cash => &mut report.cash,
            PaymentMethod::Card => &mut report.card,
            PaymentMethod::PaymeClick => &mut report.payme_click,
        };
        method.count += 1;
        method.sum += order.total;

        for item in &order.items {
            let entry = products.entry(item.name.clone()).or_default();
            entry.0 += item.quantity;
            entry.1 += item.price * item.quantity as i64;
        }
    }

    report.products = products
        .into_iter()
        .map(|(name, (quantity, sum))| ProductStats {
            name,
            quantity,
            sum,
        })
        .collect();
    report
        .products
        .sort_by(|a, b| b.sum.cmp(&a.sum).then_with(|| a.name.cmp(&b.name)));

    report
}

/// The end-of-day summary message (Telegram HTML). The Payme/Click block is
/// omitted on days without such orders.
pub fn format_report(report: &DailyReport, date: NaiveDate) -> String {
    let date_str = date.format("%d.%m.%Y");

    let mut message = format!("📊 <b>Итоги дня — {date_str}</b>\n\n");
    message.push_str(&format!(
        "📦 Заказов было: <b>{}</b>\n\n",
        report.total_orders
    ));

    message.push_str("💵 Оплата наличными:\n");
    message.push_str(&format!(
        "{} заказов — {} сум\n\n",
        report.cash.count,
        format_sum(report.cash.sum)
    ));

    message.push_str("💳 Оплата картой:\n");
    message.push_str(&format!(
        "{} заказов — {} сум\n\n",
        report.card.count,
        format_sum(report.card.sum)
    ));

    if report.payme_click.count > 0 {
        message.push_str("📱 Payme/Click:\n");
        message.push_str(&format!(
            "{} заказов — {} сум\n\n",
            report.payme_click.count,
            format_sum(report.payme_click.sum)
        ));
    }

    message.push_str("———\n\n");

    for product in &report.products {
        message.push_str(&format!(
            "{} × {} — {} сум\n",
            escape_html(&product.name),
            product.quantity,
            format_sum(product.sum)
        ));
    }

    message.push_str("\n———\n\n");
    message.push_str(&format!(
        "💰 <b>Итого за день: {} сум</b>",
        format_sum(report.total_sum)
    ));

    message
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::order::{LineItem, OrderStatus};

    fn paid_order(total: i64, payment_method: PaymentMethod, items: Vec<LineItem>) -> Order {
        Order {
            id: Uuid::new_v4(),
            order_number: 1,
            items,
            total,
            payment_method,
            status: OrderStatus::Paid,
            created_at: Utc::now(),
            telegram_message_id: None,
        }
    }

    fn line(name: &str, quantity: u32, price: i64) -> LineItem {
        LineItem {
            name: name.to_string(),
            quantity,
            price,
            volume: None,
        }
    }

    #[test]
    fn window_covers_local_midnight_to_midnight() {
        // 23:30 Tashkent on March 13 is 18:30 UTC.
        let now = Utc.with_ymd_and_hms(2026, 3, 13, 18, 30, 0).unwrap();
        let window = business_day(now);

        assert_eq!(window.date, NaiveDate::from_ymd_opt(2026, 3, 13).unwrap());
        assert_eq!(
            window.start,
            Utc.with_ymd_and_hms(2026, 3, 12, 19, 0, 0).unwrap()
        );
        assert_eq!(
            window.end,
            Utc.with_ymd_and_hms(2026, 3, 13, 19, 0, 0).unwrap()
        );
    }

    #[test]
    fn window_rolls_over_after_local_midnight() {
        // 19:30 UTC on March 13 is already 00:30 March 14 in Tashkent.
        let now = Utc.with_ymd_and_hms(2026, 3, 13, 19, 30, 0).unwrap();
        let window = business_day(now);

        assert_eq!(window.date, NaiveDate::from_ymd_opt(2026, 3, 14).unwrap());
        assert_eq!(
            window.start,
            Utc.with_ymd_and_hms(2026, 3, 13, 19, 0, 0).unwrap()
        );
    }

    #[test]
    fn creation_anchored_window_keeps_late_night_orders_together() {
        // Created 23:55 Tashkent, paid ten minutes later on the next local day.
        let created_at = Utc.with_ymd_and_hms(2026, 3, 13, 18, 55, 0).unwrap();
        let paid_at = Utc.with_ymd_and_hms(2026, 3, 13, 19, 5, 0).unwrap();

        let window = business_day(created_at);
        assert!(window.start <= created_at && created_at < window.end);

        // Anchoring at payment time instead would land in the next day and
        // miss the order's own rows.
        assert_ne!(business_day(paid_at).date, window.date);
    }

    #[test]
    fn aggregates_counts_and_per_method_subtotals() {
        let orders = vec![
            paid_order(10000, PaymentMethod::Cash, vec![line("Латте", 1, 10000)]),
            paid_order(20000, PaymentMethod::Card, vec![line("Раф", 1, 20000)]),
        ];

        let report = aggregate(&orders);

        assert_eq!(report.total_orders, 2);
        assert_eq!(report.total_sum, 30000);
        assert_eq!(report.cash, MethodStats { count: 1, sum: 10000 });
        assert_eq!(report.card, MethodStats { count: 1, sum: 20000 });
        assert_eq!(report.payme_click, MethodStats::default());
    }

    #[test]
    fn products_grouped_by_name_descending_by_revenue() {
        let orders = vec![
            paid_order(
                71000,
                PaymentMethod::Cash,
                vec![line("Эспрессо", 1, 21000), line("Латте", 1, 50000)],
            ),
            paid_order(42000, PaymentMethod::Card, vec![line("Эспрессо", 2, 21000)]),
        ];

        let report = aggregate(&orders);

        assert_eq!(
            report.products,
            vec![
                ProductStats {
                    name: "Эспрессо".to_string(),
                    quantity: 3,
                    sum: 63000,
                },
                ProductStats {
                    name: "Латте".to_string(),
                    quantity: 1,
                    sum: 50000,
                },
            ]
        );
    }

    #[test]
    fn report_message_skips_empty_payme_block() {
        let orders = vec![paid_order(
            10000,
            PaymentMethod::Cash,
            vec![line("Латте", 1, 10000)],
        )];
        let report = aggregate(&orders);
        let message = format_report(&report, NaiveDate::from_ymd_opt(2026, 3, 13).unwrap());

        assert!(message.contains("Итоги дня — 13.03.2026"));
        assert!(message.contains("Заказов было: <b>1</b>"));
        assert!(message.contains("💵 Оплата наличными:\n1 заказов — 10\u{a0}000 сум"));
        assert!(!message.contains("Payme/Click"));
        assert!(message.ends_with("💰 <b>Итого за день: 10\u{a0}000 сум</b>"));
    }

    #[test]
    fn report_message_includes_payme_block_when_present() {
        let orders = vec![paid_order(
            15000,
            PaymentMethod::PaymeClick,
            vec![line("Мохито", 1, 15000)],
        )];
        let report = aggregate(&orders);
        let message = format_report(&report, NaiveDate::from_ymd_opt(2026, 3, 13).unwrap());

        assert!(message.contains("📱 Payme/Click:\n1 заказов — 15\u{a0}000 сум"));
    }
}
