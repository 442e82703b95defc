//! Connection registry: live canvas peers keyed by an opaque identifier.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

/// Outbound half of a peer's transport. Each message is one serialized frame.
pub type Outbound = mpsc::UnboundedSender<String>;

/// Tracks live connections. Sends that fail evict the connection; evicted ids
/// are held until [`ConnectionRegistry::take_evicted`] collects them.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Outbound>,
    evicted: Vec<String>,
}

/// 128 random bits, hex encoded.
fn generate_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `outbound` under a fresh identifier and return it.
    pub fn register(&mut self, outbound: Outbound) -> String {
        let mut id = generate_id();
        while self.connections.contains_key(&id) {
            id = generate_id();
        }
        self.connections.insert(id.clone(), outbound);
        id
    }

    /// Remove a connection. Unknown ids are ignored. Returns whether anything was removed.
    pub fn unregister(&mut self, id: &str) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Drain the ids evicted by failed sends since the last call.
    pub fn take_evicted(&mut self) -> Vec<String> {
        std::mem::take(&mut self.evicted)
    }

    /// Call `f` for every connection except `except`; connections for which
    /// `f` fails are removed. Returns the number of successful calls.
    pub fn for_each_except<F, E>(&mut self, except: &str, f: F) -> usize
    where
        F: FnMut(&str, &Outbound) -> Result<(), E>,
    {
        self.visit(Some(except), f)
    }

    /// Call `f` for every connection; connections for which `f` fails are removed.
    pub fn for_each_all<F, E>(&mut self, f: F) -> usize
    where
        F: FnMut(&str, &Outbound) -> Result<(), E>,
    {
        self.visit(None, f)
    }

    /// Send one serialized frame to everyone except `except`.
    pub fn broadcast_except(&mut self, except: &str, frame: &str) -> usize {
        self.for_each_except(except, |_, tx| tx.send(frame.to_string()))
    }

    /// Send one serialized frame to every connection.
    pub fn broadcast_all(&mut self, frame: &str) -> usize {
        self.for_each_all(|_, tx| tx.send(frame.to_string()))
    }

    /// Send to a single connection, evicting it on failure.
    pub fn send_to(&mut self, id: &str, frame: &str) -> bool {
        let Some(tx) = self.connections.get(id) else {
            return false;
        };
        if tx.send(frame.to_string()).is_ok() {
            return true;
        }
        debug!(conn_id = %id, "Evicting connection after failed send");
        self.connections.remove(id);
        self.evicted.push(id.to_string());
        false
    }

    fn visit<F, E>(&mut self, except: Option<&str>, mut f: F) -> usize
    where
        F: FnMut(&str, &Outbound) -> Result<(), E>,
    {
        let mut delivered = 0;
        let evicted = &mut self.evicted;
        self.connections.retain(|id, tx| {
            if except == Some(id.as_str()) {
                return true;
            }
            match f(id, tx) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    debug!(conn_id = %id, "Evicting connection after failed send");
                    evicted.push(id.clone());
                    false
                }
            }
        });
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (Outbound, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_register_assigns_unique_ids() {
        let mut registry = ConnectionRegistry::new();
        let mut ids = std::collections::HashSet::new();
        let mut receivers = Vec::new();
        for _ in 0..100 {
            let (tx, rx) = channel();
            receivers.push(rx);
            let id = registry.register(tx);
            assert_eq!(id.len(), 32);
            assert!(ids.insert(id));
        }
        assert_eq!(registry.count(), 100);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx);
        assert!(registry.unregister(&id));
        assert!(!registry.unregister(&id));
        assert!(!registry.unregister("never-registered"));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_broadcast_except_skips_sender() {
        let mut registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        let (tx_c, mut rx_c) = channel();
        let a = registry.register(tx_a);
        registry.register(tx_b);
        registry.register(tx_c);

        assert_eq!(registry.broadcast_except(&a, "hello"), 2);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), "hello");
        assert_eq!(rx_c.try_recv().unwrap(), "hello");
    }

    #[test]
    fn test_dead_connection_is_evicted_without_blocking_others() {
        let mut registry = ConnectionRegistry::new();
        let (tx_a, rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        let dead = registry.register(tx_a);
        registry.register(tx_b);
        drop(rx_a);

        assert_eq!(registry.broadcast_all("one"), 1);
        assert!(!registry.contains(&dead));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.broadcast_all("two"), 1);
        assert_eq!(rx_b.try_recv().unwrap(), "one");
        assert_eq!(rx_b.try_recv().unwrap(), "two");
    }

    #[test]
    fn test_send_to() {
        let mut registry = ConnectionRegistry::new();
        let (tx, mut rx) = channel();
        let id = registry.register(tx);
        assert!(registry.send_to(&id, "direct"));
        assert_eq!(rx.try_recv().unwrap(), "direct");
        drop(rx);
        assert!(!registry.send_to(&id, "lost"));
        assert!(!registry.contains(&id));
        assert!(!registry.send_to("unknown", "x"));
    }

    #[test]
    fn test_for_each_all_custom_failure() {
        let mut registry = ConnectionRegistry::new();
        let (tx_a, _rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        let a = registry.register(tx_a);
        let b = registry.register(tx_b);
        let delivered = registry.for_each_all(|id, _| if id == a { Err(()) } else { Ok(()) });
        assert_eq!(delivered, 1);
        assert!(!registry.contains(&a));
        assert!(registry.contains(&b));
    }

    #[test]
    fn test_take_evicted_reports_each_eviction_once() {
        let mut registry = ConnectionRegistry::new();
        let (tx_a, rx_a) = channel();
        let (tx_b, rx_b) = channel();
        let (tx_c, _rx_c) = channel();
        let a = registry.register(tx_a);
        let b = registry.register(tx_b);
        registry.register(tx_c);
        assert!(registry.take_evicted().is_empty());

        drop(rx_a);
        drop(rx_b);
        registry.broadcast_all("x");
        assert!(!registry.send_to(&b, "gone already"));

        let mut evicted = registry.take_evicted();
        evicted.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(evicted, expected);
        assert!(registry.take_evicted().is_empty());
    }

    #[test]
    fn test_send_to_failure_is_reported() {
        let mut registry = ConnectionRegistry::new();
        let (tx, rx) = channel();
        let id = registry.register(tx);
        drop(rx);
        assert!(!registry.send_to(&id, "lost"));
        assert_eq!(registry.take_evicted(), vec![id]);
    }

    #[test]
    fn test_unregister_is_not_an_eviction() {
        let mut registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let id = registry.register(tx);
        registry.unregister(&id);
        assert!(registry.take_evicted().is_empty());
    }
}
