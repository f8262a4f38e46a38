//! Per-session key/value store with change notification.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use sb_protocol::{sanitize, SanitizeError};

/// Called after every `set`/`remove` with the key and its new value
/// (`Value::Null` on removal).
pub type ChangeCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Cheap to clone; all clones share the same entries.
#[derive(Clone, Default)]
pub struct Datastore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    values: RwLock<HashMap<String, Value>>,
    callbacks: RwLock<Vec<ChangeCallback>>,
}

impl Datastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.values.read().get(key).cloned()
    }

    /// Store a JSON-safe copy of `value` and notify listeners.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), SanitizeError> {
        let value = sanitize(value)?;
        self.inner
            .values
            .write()
            .insert(key.to_owned(), value.clone());
        self.notify(key, &value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.inner.values.write().remove(key);
        if removed.is_some() {
            self.notify(key, &Value::Null);
        }
        removed
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.values.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.inner.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn on_change<F>(&self, callback: F)
    where
        F: Fn(&str, &Value) + Send + Sync + 'static,
    {
        self.inner.callbacks.write().push(Arc::new(callback));
    }

    fn notify(&self, key: &str, value: &Value) {
        // Snapshot so a callback may register further callbacks.
        let callbacks: Vec<ChangeCallback> = self.inner.callbacks.read().clone();
        for cb in callbacks {
            cb(key, value);
        }
    }
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn set_get_remove() {
        let store = Datastore::new();
        store.set("n", &3).unwrap();
        assert_eq!(store.get("n"), Some(json!(3)));
        assert_eq!(store.remove("n"), Some(json!(3)));
        assert!(store.is_empty());
    }

    #[test]
    fn stored_values_are_sanitized() {
        let store = Datastore::new();
        store.set("x", &f64::NAN).unwrap();
        assert_eq!(store.get("x"), Some(json!("NaN")));
    }

    #[test]
    fn change_callbacks_fire() {
        let store = Datastore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.on_change(move |k, v| sink.lock().push((k.to_owned(), v.clone())));

        store.set("a", &1).unwrap();
        store.remove("a");
        store.remove("missing");

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![("a".to_owned(), json!(1)), ("a".to_owned(), Value::Null)]
        );
    }

    #[test]
    fn clones_share_entries() {
        let a = Datastore::new();
        let b = a.clone();
        a.set("k", "v").unwrap();
        assert_eq!(b.keys(), vec!["k".to_owned()]);
    }
}
