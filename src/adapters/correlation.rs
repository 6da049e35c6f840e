//! Order confirmation correlation
//!
//! Some venues acknowledge order submission with a bare status code and
//! deliver the real order record on the private stream. The correlator
//! parks a oneshot waiter keyed by client order id before the REST call
//! completes, and the stream reader resolves it when the matching
//! update arrives.

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::types::Order;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
pub struct OrderCorrelator {
    waiters: Mutex<HashMap<String, oneshot::Sender<Order>>>,
}

impl OrderCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a waiter for `client_order_id`. Must be called before the
    /// submission request is sent so a fast confirmation cannot race
    /// past the registration. Re-registering the same id replaces the
    /// previous waiter.
    pub fn register(&self, client_order_id: &str) -> oneshot::Receiver<Order> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut waiters) = self.waiters.lock() {
            if waiters.insert(client_order_id.to_string(), tx).is_some() {
                tracing::warn!(
                    client_order_id = %client_order_id,
                    "replaced existing confirmation waiter"
                );
            }
        }
        rx
    }

    /// Deliver a confirmed order to its waiter, if one is parked.
    /// Resolution is exactly-once: the entry is removed before sending.
    /// Returns true if a waiter was matched.
    pub fn resolve(&self, client_order_id: &str, order: Order) -> bool {
        let sender = self
            .waiters
            .lock()
            .ok()
            .and_then(|mut waiters| waiters.remove(client_order_id));
        match sender {
            Some(tx) => tx.send(order).is_ok(),
            None => false,
        }
    }

    /// Await the confirmation previously registered for
    /// `client_order_id`. On expiry the waiter is discarded and
    /// `CorrelationTimeout` is returned; the order may still be live at
    /// the venue, so callers reconcile via a status query.
    pub async fn await_confirmation(
        &self,
        client_order_id: &str,
        rx: oneshot::Receiver<Order>,
        deadline: Duration,
    ) -> ExchangeResult<Order> {
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(order)) => Ok(order),
            // Sender dropped without resolution (shutdown or replaced)
            Ok(Err(_)) => Err(ExchangeError::Connection(format!(
                "confirmation channel closed for {client_order_id}"
            ))),
            Err(_) => {
                self.discard(client_order_id);
                Err(ExchangeError::CorrelationTimeout {
                    client_order_id: client_order_id.to_string(),
                    timeout_ms: deadline.as_millis() as u64,
                })
            }
        }
    }

    /// Drop a parked waiter without resolving it.
    pub fn discard(&self, client_order_id: &str) {
        if let Ok(mut waiters) = self.waiters.lock() {
            waiters.remove(client_order_id);
        }
    }

    pub fn pending(&self) -> usize {
        self.waiters.lock().map(|w| w.len()).unwrap_or(0)
    }
}
