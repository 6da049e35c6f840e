//! Per-channel callback registries for stream fan-out
//!
//! Adapters push normalized entities into these registries; consumers
//! subscribe a callback per channel. Registrations survive reconnects;
//! only an explicit reset or unsubscribe removes them.

use crate::adapters::types::{Balance, Order, OrderBook, Position, Ticker};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Handle returned by subscribe; pass back to unsubscribe.
pub type SubscriptionId = u64;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A set of callbacks for one event channel.
///
/// Uses a std Mutex: callbacks are invoked synchronously on the reader
/// task and registration is rare, so no lock is held across awaits.
pub struct CallbackSet<T> {
    inner: Mutex<HashMap<SubscriptionId, Callback<T>>>,
    next_id: AtomicU64,
}

impl<T> CallbackSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut map) = self.inner.lock() {
            map.insert(id, Arc::new(callback));
        }
        id
    }

    /// Returns true if the id was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner
            .lock()
            .map(|mut map| map.remove(&id).is_some())
            .unwrap_or(false)
    }

    pub fn emit(&self, event: &T) {
        let callbacks: Vec<Callback<T>> = match self.inner.lock() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => return,
        };
        for cb in callbacks {
            cb(event);
        }
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

impl<T> Default for CallbackSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CallbackSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet")
            .field("callbacks", &self.len())
            .finish()
    }
}

/// All event channels an adapter fans out to.
#[derive(Debug, Default)]
pub struct EventChannels {
    pub tickers: CallbackSet<Ticker>,
    pub order_books: CallbackSet<OrderBook>,
    pub orders: CallbackSet<Order>,
    pub positions: CallbackSet<Position>,
    pub balances: CallbackSet<Balance>,
}

impl EventChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop market-data callbacks only. Order/position/balance
    /// registrations are left untouched.
    pub fn reset_market_callbacks(&self) {
        self.tickers.clear();
        self.order_books.clear();
        tracing::debug!("market data callbacks cleared");
    }
}
