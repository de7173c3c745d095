use serde::{Deserialize, Serialize};
use std::fmt;

/// Order ID, unique within one strategy instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ord-{}", self.0)
    }
}

/// Deterministic configuration hash (BLAKE3 of the canonical config JSON).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigHash(pub String);

impl ConfigHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// First 12 hex chars, for logs and file names.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic ID generator.
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    next_order: u64,
}

impl IdGen {
    pub fn next_order_id(&mut self) -> OrderId {
        self.next_order += 1;
        OrderId(self.next_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_hash_deterministic() {
        let a = ConfigHash::from_bytes(b"ma_crossover+fixed_stop");
        let b = ConfigHash::from_bytes(b"ma_crossover+fixed_stop");
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn config_hash_differs_on_input() {
        let a = ConfigHash::from_bytes(b"a");
        let b = ConfigHash::from_bytes(b"b");
        assert_ne!(a, b);
    }

    #[test]
    fn id_gen_is_monotonic() {
        let mut ids = IdGen::default();
        assert_eq!(ids.next_order_id(), OrderId(1));
        assert_eq!(ids.next_order_id(), OrderId(2));
        assert!(OrderId(2) > OrderId(1));
    }
}
