//! Telegram Bot API client and outbound message formatting.
//!
//! Order notifications go out as MarkdownV2, the daily report as HTML. Each
//! call is attempted exactly once; retrying is the caller's problem (and
//! nobody's, per the no-retry policy).

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::order::{LineItem, PaymentMethod};

const API_BASE: &str = "https://api.telegram.org";

pub struct Telegram {
    http: Client,
    token: String,
    chat_id: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    result: Option<MessageRef>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct MessageRef {
    message_id: i64,
}

impl ApiResponse {
    /// A successful `sendMessage`/`editMessageText` reply always carries the
    /// message; one without it is treated as a failed delivery rather than
    /// inventing a message id.
    fn into_message_id(self, method: &str, status: StatusCode) -> Result<i64, AppError> {
        if !status.is_success() || !self.ok {
            let description = self
                .description
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(AppError::Delivery(format!(
                "{method} [{status}]: {description}"
            )));
        }

        self.result
            .map(|m| m.message_id)
            .ok_or_else(|| AppError::Delivery(format!("{method}: response carried no message")))
    }
}

impl Telegram {
    pub fn new(token: &str, chat_id: &str) -> Self {
        Self {
            http: Client::new(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    /// Sends a new message and returns its message id.
    pub async fn send_message(&self, text: &str, parse_mode: &str) -> Result<i64, AppError> {
        let body = json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": parse_mode,
        });

        self.call("sendMessage", &body).await
    }

    /// Edits an existing message in place.
    pub async fn edit_message(
        &self,
        message_id: i64,
        text: &str,
        parse_mode: &str,
    ) -> Result<(), AppError> {
        let body = json!({
            "chat_id": self.chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": parse_mode,
        });

        self.call("editMessageText", &body).await.map(|_| ())
    }

    async fn call(&self, method: &str, body: &serde_json::Value) -> Result<i64, AppError> {
        let url = format!("{API_BASE}/bot{}/{method}", self.token);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Delivery(e.to_string()))?;

        let status = response.status();
        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| AppError::Delivery(e.to_string()))?;

        parsed.into_message_id(method, status)
    }
}

/// Escapes a dynamic string for Telegram MarkdownV2.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "_*[]()~`>#+-=|{}.!\\".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escapes a dynamic string for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Formats a sum the Russian way: `1234567` → `1 234 567` with non-breaking
/// spaces between groups.
pub fn format_sum(sum: i64) -> String {
    let digits = sum.abs().to_string();
    let mut grouped = String::new();

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('\u{a0}');
        }
        grouped.push(c);
    }

    if sum < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// The order notification body (MarkdownV2). One numbered line per item with
/// its subtotal, then the combined total.
pub fn format_order_message(
    order_number: i32,
    items: &[LineItem],
    total: i64,
    payment_method: PaymentMethod,
) -> String {
    let mut message = String::from("🧾 *Новый заказ — To4kavcentre*\n\n");
    message.push_str(&format!(
        "*Заказ №{order_number}* \\({}\\)\n\n",
        escape_markdown(payment_method.label())
    ));

    for (i, item) in items.iter().enumerate() {
        let subtotal = item.price * item.quantity as i64;
        let volume = match &item.volume {
            Some(v) if !v.is_empty() => format!(" \\({}\\)", escape_markdown(v)),
            _ => String::new(),
        };
        message.push_str(&format!(
            "{}\\. {}{volume} × {} — {} сум\n",
            i + 1,
            escape_markdown(&item.name),
            item.quantity,
            format_sum(subtotal),
        ));
    }

    message.push_str(&format!("\n💰 *Итого: {} сум*", format_sum(total)));
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, quantity: u32, price: i64, volume: Option<&str>) -> LineItem {
        LineItem {
            name: name.to_string(),
            quantity,
            price,
            volume: volume.map(str::to_string),
        }
    }

    #[test]
    fn sums_group_by_thousands() {
        assert_eq!(format_sum(0), "0");
        assert_eq!(format_sum(999), "999");
        assert_eq!(format_sum(21000), "21\u{a0}000");
        assert_eq!(format_sum(1234567), "1\u{a0}234\u{a0}567");
    }

    #[test]
    fn markdown_escaping_covers_reserved_characters() {
        assert_eq!(escape_markdown("Латте (300мл)"), "Латте \\(300мл\\)");
        assert_eq!(escape_markdown("a.b-c!"), "a\\.b\\-c\\!");
    }

    #[test]
    fn html_escaping() {
        assert_eq!(escape_html("Fish & Chips <1>"), "Fish &amp; Chips &lt;1&gt;");
    }

    #[test]
    fn api_reply_yields_the_message_id() {
        let parsed: ApiResponse =
            serde_json::from_str(r#"{"ok": true, "result": {"message_id": 42}}"#).unwrap();

        let id = parsed.into_message_id("sendMessage", StatusCode::OK).unwrap();
        assert_eq!(id, 42);
    }

    #[test]
    fn ok_reply_without_a_message_is_a_delivery_error() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"ok": true}"#).unwrap();

        let err = parsed
            .into_message_id("sendMessage", StatusCode::OK)
            .unwrap_err();
        assert!(matches!(err, AppError::Delivery(_)));
    }

    #[test]
    fn api_error_description_is_surfaced() {
        let parsed: ApiResponse =
            serde_json::from_str(r#"{"ok": false, "description": "chat not found"}"#).unwrap();

        let err = parsed
            .into_message_id("sendMessage", StatusCode::BAD_REQUEST)
            .unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[test]
    fn order_message_lists_items_with_subtotals() {
        let items = vec![
            line("Эспрессо", 2, 21000, Some("50мл")),
            line("Раф", 1, 40000, None),
        ];
        let message = format_order_message(12, &items, 82000, PaymentMethod::Card);

        assert!(message.starts_with("🧾 *Новый заказ — To4kavcentre*"));
        assert!(message.contains("*Заказ №12*"));
        assert!(message.contains("Карта"));
        assert!(message.contains("1\\. Эспрессо \\(50мл\\) × 2 — 42\u{a0}000 сум"));
        assert!(message.contains("2\\. Раф × 1 — 40\u{a0}000 сум"));
        assert!(message.ends_with("💰 *Итого: 82\u{a0}000 сум*"));
    }
}
