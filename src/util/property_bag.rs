//! Open-ended key/value extension point for crawl context and page objects.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// String-keyed map of arbitrary typed values.
///
/// Inserting under an existing key replaces the previous value regardless of
/// its type. Lookups are typed: `get::<T>` only succeeds when the stored
/// value is a `T`.
#[derive(Default)]
pub struct PropertyBag {
    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl PropertyBag {
    /// Empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`. Returns true if a value was replaced.
    pub fn insert<T>(&mut self, key: impl Into<String>, value: T) -> bool
    where
        T: Any + Send + Sync,
    {
        self.values.insert(key.into(), Box::new(value)).is_some()
    }

    /// Value under `key` if it is a `T`.
    #[must_use]
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key)?.downcast_ref()
    }

    /// Mutable value under `key` if it is a `T`.
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key)?.downcast_mut()
    }

    /// Remove and return the value under `key` if it is a `T`. A value of
    /// another type stays in the bag.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        if !self.values.get(key)?.is::<T>() {
            return None;
        }
        let boxed = self.values.remove(key)?;
        boxed.downcast().ok().map(|value| *value)
    }

    /// Whether any value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stored keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}
