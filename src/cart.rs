//! Cart state with an injected persistence port.
//!
//! The cart is a mapping from encoded cart keys to quantities plus metadata
//! for ad-hoc custom items. Every mutation saves the whole snapshot through
//! the [`CartStore`] port, mirroring the save-on-mutate behavior of the
//! browser client this backend serves.

use std::{collections::BTreeMap, fs, path::PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::menu::{CartKey, MenuItem};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomItem {
    pub name: String,
    pub price: i64,
}

/// Whole-cart state as persisted: key → quantity, plus custom-item metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CartSnapshot {
    #[serde(default)]
    pub quantities: BTreeMap<String, u32>,
    #[serde(default)]
    pub custom: BTreeMap<String, CustomItem>,
}

/// Persistence port. A missing or corrupt snapshot loads as an empty cart;
/// save failures are the implementation's to report.
pub trait CartStore {
    fn load(&self) -> CartSnapshot;
    fn save(&self, snapshot: &CartSnapshot);
}

/// File-backed store, one JSON document per cart.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CartStore for JsonFileStore {
    fn load(&self) -> CartSnapshot {
        fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn save(&self, snapshot: &CartSnapshot) {
        let bytes = match serde_json::to_vec(snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize cart snapshot: {e}");
                return;
            }
        };

        if let Err(e) = fs::write(&self.path, bytes) {
            warn!("Failed to persist cart to {}: {e}", self.path.display());
        }
    }
}

/// A resolved cart line ready to become an order line item.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub key: String,
    pub name: String,
    pub volume: Option<String>,
    pub price: i64,
    pub quantity: u32,
}

pub struct Cart<S: CartStore> {
    snapshot: CartSnapshot,
    store: S,
    last_stamp: i64,
}

impl<S: CartStore> Cart<S> {
    pub fn load(store: S) -> Self {
        let snapshot = store.load();

        Self {
            snapshot,
            store,
            last_stamp: 0,
        }
    }

    /// Increments the quantity for `key`, starting new entries at 1.
    pub fn add(&mut self, key: &str) {
        *self.snapshot.quantities.entry(key.to_string()).or_insert(0) += 1;
        self.store.save(&self.snapshot);
    }

    /// Decrements the quantity for `key`. The entry (and any custom-item
    /// metadata) disappears exactly on the 1 → 0 transition. Removing an
    /// absent key is a no-op.
    pub fn remove(&mut self, key: &str) {
        let Some(quantity) = self.snapshot.quantities.get_mut(key) else {
            return;
        };

        if *quantity > 1 {
            *quantity -= 1;
        } else {
            self.snapshot.quantities.remove(key);
            self.snapshot.custom.remove(key);
        }

        self.store.save(&self.snapshot);
    }

    /// Mints a fresh `custom::<millis>` key, records the item's metadata and
    /// inserts it with quantity 1. Returns the new key.
    pub fn add_custom(&mut self, name: &str, price: i64) -> String {
        self.last_stamp = Utc::now().timestamp_millis().max(self.last_stamp + 1);
        let key = CartKey::custom(self.last_stamp).encode();

        self.snapshot.custom.insert(
            key.clone(),
            CustomItem {
                name: name.to_string(),
                price,
            },
        );
        self.snapshot.quantities.insert(key.clone(), 1);
        self.store.save(&self.snapshot);

        key
    }

    pub fn clear(&mut self) {
        self.snapshot = CartSnapshot::default();
        self.store.save(&self.snapshot);
    }

    pub fn quantity(&self, key: &str) -> u32 {
        self.snapshot.quantities.get(key).copied().unwrap_or(0)
    }

    pub fn total_item_count(&self) -> u32 {
        self.snapshot.quantities.values().sum()
    }

    /// Resolves every cart entry against the catalog: custom keys through
    /// their recorded metadata, the rest by decoding the key and looking up
    /// flat or variant pricing. Entries that no longer resolve are skipped.
    pub fn resolve(&self, catalog: &[MenuItem]) -> Vec<CartLine> {
        self.snapshot
            .quantities
            .iter()
            .filter_map(|(key, &quantity)| match CartKey::parse(key).ok()? {
                CartKey::Custom { .. } => {
                    let custom = self.snapshot.custom.get(key)?;
                    Some(CartLine {
                        key: key.clone(),
                        name: custom.name.clone(),
                        volume: None,
                        price: custom.price,
                        quantity,
                    })
                }
                CartKey::Item { id, variant } => {
                    let item = catalog.iter().find(|m| m.id == id)?;
                    Some(CartLine {
                        key: key.clone(),
                        name: item.name.clone(),
                        volume: item.volume(variant),
                        price: item.price(variant)?,
                        quantity,
                    })
                }
            })
            .collect()
    }

    pub fn total_price(&self, catalog: &[MenuItem]) -> i64 {
        self.resolve(catalog)
            .iter()
            .map(|line| line.price * line.quantity as i64)
            .sum()
    }

    pub fn snapshot(&self) -> &CartSnapshot {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::menu::{Pricing, Variant};

    #[derive(Default)]
    struct MemoryStore {
        saved: RefCell<CartSnapshot>,
    }

    impl CartStore for MemoryStore {
        fn load(&self) -> CartSnapshot {
            self.saved.borrow().clone()
        }

        fn save(&self, snapshot: &CartSnapshot) {
            *self.saved.borrow_mut() = snapshot.clone();
        }
    }

    fn catalog() -> Vec<MenuItem> {
        vec![
            MenuItem {
                id: "espresso".to_string(),
                name: "Эспрессо".to_string(),
                category: "coffee".to_string(),
                pricing: Pricing::Flat {
                    price: 21000,
                    volume: Some("50мл".to_string()),
                },
                description: None,
                image: None,
            },
            MenuItem {
                id: "cappuccino".to_string(),
                name: "Капучино".to_string(),
                category: "coffee".to_string(),
                pricing: Pricing::Variants {
                    variants: vec![
                        Variant {
                            volume: "200мл".to_string(),
                            price: 25000,
                        },
                        Variant {
                            volume: "300мл".to_string(),
                            price: 38000,
                        },
                    ],
                },
                description: None,
                image: None,
            },
        ]
    }

    #[test]
    fn add_and_remove_track_quantities() {
        let mut cart = Cart::load(MemoryStore::default());

        cart.add("espresso");
        cart.add("espresso");
        assert_eq!(cart.quantity("espresso"), 2);

        cart.remove("espresso");
        assert_eq!(cart.quantity("espresso"), 1);

        // The key disappears exactly on the 1 → 0 transition.
        cart.remove("espresso");
        assert_eq!(cart.quantity("espresso"), 0);
        assert!(!cart.snapshot().quantities.contains_key("espresso"));

        // Removing an absent key never drives the quantity negative.
        cart.remove("espresso");
        assert_eq!(cart.quantity("espresso"), 0);
    }

    #[test]
    fn total_item_count_sums_quantities() {
        let mut cart = Cart::load(MemoryStore::default());

        cart.add("espresso");
        cart.add("espresso");
        cart.add("cappuccino::1");

        assert_eq!(cart.total_item_count(), 3);
    }

    #[test]
    fn custom_items_resolve_from_metadata() {
        let mut cart = Cart::load(MemoryStore::default());

        let key = cart.add_custom("Сырники", 18000);
        assert!(key.starts_with("custom::"));
        assert_eq!(cart.quantity(&key), 1);

        let lines = cart.resolve(&catalog());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].name, "Сырники");
        assert_eq!(lines[0].price, 18000);

        // Dropping the entry discards the metadata too.
        cart.remove(&key);
        assert!(cart.snapshot().custom.is_empty());
    }

    #[test]
    fn custom_keys_are_unique_within_a_session() {
        let mut cart = Cart::load(MemoryStore::default());

        let a = cart.add_custom("Чизкейк", 30000);
        let b = cart.add_custom("Чизкейк", 30000);

        assert_ne!(a, b);
        assert_eq!(cart.total_item_count(), 2);
    }

    #[test]
    fn total_price_matches_resolved_lines() {
        let mut cart = Cart::load(MemoryStore::default());

        cart.add("espresso");
        cart.add("espresso");
        cart.add("cappuccino::1");
        cart.add_custom("Сырники", 18000);

        // 2 × 21000 + 38000 + 18000
        assert_eq!(cart.total_price(&catalog()), 98000);
    }

    #[test]
    fn unresolvable_keys_are_skipped() {
        let mut cart = Cart::load(MemoryStore::default());

        cart.add("discontinued-item");
        cart.add("cappuccino::9");
        cart.add("espresso");

        let lines = cart.resolve(&catalog());
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].key, "espresso");
    }

    #[test]
    fn clear_empties_cart_and_metadata() {
        let mut cart = Cart::load(MemoryStore::default());

        cart.add("espresso");
        cart.add_custom("Сырники", 18000);
        cart.clear();

        assert_eq!(cart.total_item_count(), 0);
        assert!(cart.snapshot().custom.is_empty());
    }

    #[test]
    fn json_file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cart.json");

        {
            let mut cart = Cart::load(JsonFileStore::new(&path));
            cart.add("espresso");
            cart.add_custom("Сырники", 18000);
        }

        let cart = Cart::load(JsonFileStore::new(&path));
        assert_eq!(cart.quantity("espresso"), 1);
        assert_eq!(cart.total_item_count(), 2);
        assert_eq!(cart.snapshot().custom.len(), 1);
    }

    #[test]
    fn missing_or_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cart.json");

        let cart = Cart::load(JsonFileStore::new(&path));
        assert_eq!(cart.total_item_count(), 0);

        fs::write(&path, b"not json").unwrap();
        let cart = Cart::load(JsonFileStore::new(&path));
        assert_eq!(cart.total_item_count(), 0);
    }
}
