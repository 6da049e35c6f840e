//! In-memory entity caches fed by stream updates and REST snapshots
//!
//! Positions and balances are replaced wholesale per key with a
//! timestamp gate; orders additionally respect terminal-status
//! monotonicity.

use crate::adapters::types::{Order, Timestamped};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// Generic keyed cache of the latest entity snapshot.
#[derive(Debug)]
pub struct EntityCache<K, V> {
    inner: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> EntityCache<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn put(&self, key: K, value: V) {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(key, value);
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().ok().and_then(|map| map.get(key).cloned())
    }

    pub fn all(&self) -> Vec<V> {
        self.inner
            .lock()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().ok().and_then(|mut map| map.remove(key))
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.inner.lock() {
            map.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash + Clone, V: Clone + Timestamped> EntityCache<K, V> {
    /// Insert unless an entry with a newer snapshot time already exists.
    /// Equal timestamps overwrite (stream corrections share a tick).
    /// Returns true if the value was stored.
    pub fn put_if_newer(&self, key: K, value: V) -> bool {
        let Ok(mut map) = self.inner.lock() else {
            return false;
        };
        match map.get(&key) {
            Some(existing) if existing.as_of() > value.as_of() => false,
            _ => {
                map.insert(key, value);
                true
            }
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for EntityCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Order cache keyed by the venue-assigned order id, with a
/// terminal-status guard.
///
/// Venue updates do not uniformly carry the client order id (open-order
/// snapshots and unsolicited fills often omit it), so keying must follow
/// the venue id or the same order splits across two entries. Records
/// known only by client id (local acks awaiting the venue record) are
/// held under the client id until an update carrying both ids arrives;
/// that update folds the provisional entry into the venue-id entry and
/// the client id becomes a lookup alias.
#[derive(Debug, Default)]
pub struct OrderCache {
    inner: EntityCache<String, Order>,
    /// client order id -> venue order id
    by_client: Mutex<HashMap<String, String>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn resolve_alias(&self, client_id: &str) -> Option<String> {
        self.by_client
            .lock()
            .ok()
            .and_then(|alias| alias.get(client_id).cloned())
    }

    /// Apply an order update. Updates to orders already in a terminal
    /// state are dropped, so a late `open` replay after `filled` cannot
    /// resurrect the order. Returns true if the update was applied.
    pub fn apply(&self, order: Order) -> bool {
        let key = match (&order.id, &order.client_id) {
            (Some(id), client_id) => {
                if let Some(cl_id) = client_id {
                    if let Ok(mut alias) = self.by_client.lock() {
                        alias.insert(cl_id.clone(), id.clone());
                    }
                    // Fold any provisional client-keyed entry
                    if cl_id != id {
                        self.inner.remove(cl_id);
                    }
                }
                id.clone()
            }
            (None, Some(cl_id)) => self.resolve_alias(cl_id).unwrap_or_else(|| cl_id.clone()),
            (None, None) => {
                tracing::warn!(symbol = %order.symbol, "order update without any id, dropped");
                return false;
            }
        };
        if let Some(existing) = self.inner.get(&key) {
            if existing.is_terminal() {
                tracing::debug!(
                    order_id = %key,
                    stale_status = ?order.status,
                    "dropping update for terminal order"
                );
                return false;
            }
        }
        self.inner.put(key, order);
        true
    }

    /// Look up by venue order id or client order id.
    pub fn get(&self, id: &str) -> Option<Order> {
        if let Some(order) = self.inner.get(&id.to_string()) {
            return Some(order);
        }
        self.resolve_alias(id)
            .and_then(|venue_id| self.inner.get(&venue_id))
    }

    pub fn all(&self) -> Vec<Order> {
        self.inner.all()
    }

    pub fn open_orders(&self) -> Vec<Order> {
        self.inner
            .all()
            .into_iter()
            .filter(|o| !o.is_terminal())
            .collect()
    }

    pub fn clear(&self) {
        self.inner.clear();
        if let Ok(mut alias) = self.by_client.lock() {
            alias.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::types::{
        Balance, OrderSide, OrderStatus, OrderType, Position, PositionSide, MarginMode,
    };
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn order_with(id: Option<&str>, client_id: Option<&str>, status: OrderStatus) -> Order {
        Order {
            id: id.map(str::to_string),
            client_id: client_id.map(str::to_string),
            symbol: "BTC-USDC-PERP".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            amount: Decimal::ONE,
            filled: Decimal::ZERO,
            remaining: Decimal::ONE,
            price: None,
            average: None,
            status,
            created_at: Utc::now(),
            updated_at: None,
            raw: serde_json::Value::Null,
        }
    }

    fn balance(currency: &str, total: Decimal, age_secs: i64) -> Balance {
        Balance {
            currency: currency.to_string(),
            free: total,
            used: Decimal::ZERO,
            total,
            updated_at: Utc::now() - Duration::seconds(age_secs),
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_put_if_newer_rejects_stale_snapshot() {
        let cache: EntityCache<String, Balance> = EntityCache::new();
        let fresh = balance("DUSD", Decimal::from(100), 0);
        let stale = balance("DUSD", Decimal::from(50), 60);

        assert!(cache.put_if_newer("DUSD".into(), fresh));
        assert!(!cache.put_if_newer("DUSD".into(), stale));
        assert_eq!(cache.get(&"DUSD".to_string()).unwrap().total, Decimal::from(100));
    }

    #[test]
    fn test_put_if_newer_accepts_newer_snapshot() {
        let cache: EntityCache<String, Position> = EntityCache::new();
        let older = Position {
            symbol: "BTC-USDC-PERP".to_string(),
            side: PositionSide::Long,
            size: Decimal::ONE,
            entry_price: Decimal::from(42000),
            mark_price: Decimal::from(42100),
            unrealized_pnl: Decimal::from(100),
            realized_pnl: Decimal::ZERO,
            leverage: 1,
            margin_mode: MarginMode::Cross,
            margin: Decimal::from(42000),
            liquidation_price: None,
            updated_at: Utc::now() - Duration::seconds(5),
            raw: serde_json::Value::Null,
        };
        let mut newer = older.clone();
        newer.size = Decimal::TWO;
        newer.updated_at = Utc::now();

        cache.put_if_newer(older.symbol.clone(), older);
        assert!(cache.put_if_newer(newer.symbol.clone(), newer));
        assert_eq!(
            cache.get(&"BTC-USDC-PERP".to_string()).unwrap().size,
            Decimal::TWO
        );
    }

    #[test]
    fn test_terminal_order_not_resurrected() {
        let cache = OrderCache::new();
        assert!(cache.apply(order_with(Some("srv-1"), Some("c-1"), OrderStatus::Filled)));
        assert!(!cache.apply(order_with(Some("srv-1"), Some("c-1"), OrderStatus::Open)));
        assert_eq!(cache.get("srv-1").unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn test_open_order_updates_flow() {
        let cache = OrderCache::new();
        assert!(cache.apply(order_with(Some("srv-2"), Some("c-2"), OrderStatus::Open)));
        assert!(cache.apply(order_with(
            Some("srv-2"),
            Some("c-2"),
            OrderStatus::PartiallyFilled
        )));
        assert_eq!(
            cache.get("c-2").unwrap().status,
            OrderStatus::PartiallyFilled
        );
        assert_eq!(cache.open_orders().len(), 1);

        assert!(cache.apply(order_with(Some("srv-2"), Some("c-2"), OrderStatus::Canceled)));
        assert!(cache.open_orders().is_empty());
    }

    #[test]
    fn test_updates_without_client_id_hit_the_same_entry() {
        let cache = OrderCache::new();
        assert!(cache.apply(order_with(Some("srv-1"), Some("arb-1"), OrderStatus::Open)));
        // Fill notifications carry only the venue id
        assert!(cache.apply(order_with(Some("srv-1"), None, OrderStatus::Filled)));

        assert_eq!(cache.all().len(), 1);
        assert!(cache.open_orders().is_empty());
        // Both lookups see the filled record
        assert_eq!(cache.get("srv-1").unwrap().status, OrderStatus::Filled);
        assert_eq!(cache.get("arb-1").unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn test_provisional_entry_folds_into_venue_record() {
        let cache = OrderCache::new();
        // Local ack known only by client id
        assert!(cache.apply(order_with(None, Some("arb-2"), OrderStatus::PendingLocal)));
        // Venue record arrives with both ids
        assert!(cache.apply(order_with(Some("srv-9"), Some("arb-2"), OrderStatus::Open)));

        assert_eq!(cache.all().len(), 1);
        assert_eq!(cache.get("arb-2").unwrap().id.as_deref(), Some("srv-9"));
    }

    #[test]
    fn test_terminal_guard_holds_across_id_forms() {
        let cache = OrderCache::new();
        assert!(cache.apply(order_with(Some("srv-3"), Some("arb-3"), OrderStatus::Filled)));
        // A late client-id-only replay resolves through the alias
        assert!(!cache.apply(order_with(None, Some("arb-3"), OrderStatus::Open)));
        assert_eq!(cache.get("srv-3").unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn test_order_without_ids_dropped() {
        let cache = OrderCache::new();
        assert!(!cache.apply(order_with(None, None, OrderStatus::Open)));
        assert!(cache.all().is_empty());
    }
}
