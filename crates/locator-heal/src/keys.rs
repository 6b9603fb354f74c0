//! Credential rotation for the repair model.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Cycles through a fixed set of credentials. Individual keys hit quota
/// or auth failures independently; a rotation pass tries each one once.
#[derive(Debug)]
pub struct KeyRing {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl KeyRing {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Current key, if any are configured.
    pub fn current(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let idx = self.cursor.load(Ordering::Relaxed) % self.keys.len();
        Some(&self.keys[idx])
    }

    /// Advance to the next key and return it.
    pub fn rotate(&self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        self.cursor.fetch_add(1, Ordering::Relaxed);
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_wraps_around() {
        let ring = KeyRing::new(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(ring.current(), Some("a"));
        assert_eq!(ring.rotate(), Some("b"));
        assert_eq!(ring.rotate(), Some("c"));
        assert_eq!(ring.rotate(), Some("a"));
    }

    #[test]
    fn empty_ring_yields_none() {
        let ring = KeyRing::new(Vec::new());
        assert_eq!(ring.current(), None);
        assert_eq!(ring.rotate(), None);
    }
}
