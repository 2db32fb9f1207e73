//! In-memory path to value mapping behind one mutex.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::paths::{self, PathError};

/// The registry's only server-side state. Values live for the lifetime of
/// the process; a durable implementation would slot in behind the same
/// three operations.
#[derive(Debug, Clone, Default)]
pub struct Store {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or delete (empty value) an entry. The path is canonicalised;
    /// a path with no elements is rejected.
    pub fn set(&self, path: &str, value: &str) -> Result<(), PathError> {
        let key = paths::canonical(path)?;
        if key.is_empty() {
            return Err(PathError::IllegalSegment(path.to_string()));
        }
        let mut map = self.inner.lock().unwrap();
        if value.is_empty() {
            map.remove(&key);
        } else {
            map.insert(key, value.to_string());
        }
        Ok(())
    }

    /// Exact lookup. Absent entries and unparseable paths read as "".
    pub fn lookup(&self, path: &str) -> String {
        let key = match paths::canonical(path) {
            Ok(key) => key,
            Err(_) => return String::new(),
        };
        self.inner
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Visit every entry until the callback returns false. The mutex is
    /// held for the whole iteration, so the callback must not call back
    /// into the store. Iteration order is unspecified.
    pub fn foreach<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &str) -> bool,
    {
        let map = self.inner.lock().unwrap();
        for (key, value) in map.iter() {
            if !visit(key, value) {
                break;
            }
        }
    }

    /// Every entry whose canonical key equals `prefix` or continues it at
    /// an element boundary. Unordered; callers sort if they need order.
    pub fn get_values(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, String)>, PathError> {
        let prefix = paths::canonical(prefix)?;
        let mut values = Vec::new();
        self.foreach(|key, value| {
            let matches = prefix.is_empty()
                || (key.starts_with(&prefix)
                    && (key.len() == prefix.len()
                        || key.as_bytes()[prefix.len()] == b'/'));
            if matches {
                values.push((key.to_string(), value.to_string()));
            }
            true
        });
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_lookup_delete() {
        let store = Store::new();
        store.set("a/b", "1").unwrap();
        assert_eq!(store.lookup("a/b"), "1");
        assert_eq!(store.lookup("/a//b"), "1");
        assert_eq!(store.lookup("a/c"), "");

        store.set("a/b", "2").unwrap();
        assert_eq!(store.lookup("a/b"), "2");

        store.set("/a/b/", "").unwrap();
        assert_eq!(store.lookup("a/b"), "");
    }

    #[test]
    fn rejects_empty_and_dot_paths() {
        let store = Store::new();
        assert!(store.set("", "x").is_err());
        assert!(store.set("///", "x").is_err());
        assert!(store.set("a/../b", "x").is_err());
    }

    #[test]
    fn prefix_matches_element_boundaries() {
        let store = Store::new();
        store.set("a", "1").unwrap();
        store.set("a/b", "2").unwrap();
        store.set("a/c", "3").unwrap();
        store.set("ab", "4").unwrap();

        let mut values = store.get_values("a").unwrap();
        values.sort();
        assert_eq!(
            values,
            vec![
                ("a".to_string(), "1".to_string()),
                ("a/b".to_string(), "2".to_string()),
                ("a/c".to_string(), "3".to_string()),
            ]
        );

        let all = store.get_values("").unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn foreach_stops_early() {
        let store = Store::new();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.set("c", "3").unwrap();

        let mut seen = 0;
        store.foreach(|_, _| {
            seen += 1;
            false
        });
        assert_eq!(seen, 1);
    }
}
