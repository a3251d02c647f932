//! Menu catalog types and cart key encoding.
//!
//! An item carries either a flat price (with an optional volume) or a list of
//! volume/price variants, never both. A cart key addresses one concrete
//! selection: `espresso` for a flat item, `cappuccino::1` for the second
//! variant, `custom::1712345678901` for an ad-hoc item typed in by staff.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CUSTOM_PREFIX: &str = "custom";
const KEY_SEPARATOR: &str = "::";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub emoji: String,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub volume: String,
    pub price: i64,
}

/// Flat or variant pricing, one of which is meaningful at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pricing {
    Variants {
        variants: Vec<Variant>,
    },
    Flat {
        price: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        volume: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(flatten)]
    pub pricing: Pricing,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl MenuItem {
    /// Unit price for the given variant selection. `None` when the selection
    /// does not match the item's pricing shape.
    pub fn price(&self, variant: Option<usize>) -> Option<i64> {
        match (&self.pricing, variant) {
            (Pricing::Flat { price, .. }, None) => Some(*price),
            (Pricing::Variants { variants }, Some(i)) => variants.get(i).map(|v| v.price),
            _ => None,
        }
    }

    pub fn volume(&self, variant: Option<usize>) -> Option<String> {
        match (&self.pricing, variant) {
            (Pricing::Flat { volume, .. }, None) => volume.clone(),
            (Pricing::Variants { variants }, Some(i)) => variants.get(i).map(|v| v.volume.clone()),
            _ => None,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
#[error("malformed cart key: {0}")]
pub struct BadCartKey(pub String);

/// Decoded form of a cart key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CartKey {
    Item {
        id: String,
        variant: Option<usize>,
    },
    /// Ad-hoc item minted by staff; the stamp is milliseconds since epoch.
    Custom {
        stamp: i64,
    },
}

impl CartKey {
    pub fn item(id: &str) -> Self {
        CartKey::Item {
            id: id.to_string(),
            variant: None,
        }
    }

    pub fn item_variant(id: &str, variant: usize) -> Self {
        CartKey::Item {
            id: id.to_string(),
            variant: Some(variant),
        }
    }

    pub fn custom(stamp: i64) -> Self {
        CartKey::Custom { stamp }
    }

    pub fn parse(key: &str) -> Result<Self, BadCartKey> {
        match key.split_once(KEY_SEPARATOR) {
            None if !key.is_empty() => Ok(CartKey::item(key)),
            Some((CUSTOM_PREFIX, stamp)) => stamp
                .parse()
                .map(CartKey::custom)
                .map_err(|_| BadCartKey(key.to_string())),
            Some((id, variant)) if !id.is_empty() => variant
                .parse()
                .map(|v| CartKey::item_variant(id, v))
                .map_err(|_| BadCartKey(key.to_string())),
            _ => Err(BadCartKey(key.to_string())),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            CartKey::Item { id, variant: None } => id.clone(),
            CartKey::Item {
                id,
                variant: Some(v),
            } => format!("{id}{KEY_SEPARATOR}{v}"),
            CartKey::Custom { stamp } => format!("{CUSTOM_PREFIX}{KEY_SEPARATOR}{stamp}"),
        }
    }
}
