//! Scoped variables shared between the steps of one test.
//!
//! Each [`ExecutionContext`](crate::ExecutionContext) owns one
//! [`VariableStore`]. Keys may be any hashable type; two keys match only when
//! they have the same type and compare equal, so `"user"` and
//! `String::from("user")` name different entries. Values are type-erased and
//! read back with the type they were stored as.
//!
//! # Examples
//!
//! ```
//! use stepwise::VariableStore;
//!
//! let mut store = VariableStore::new();
//! store.insert("order id", 1042_u32);
//! assert_eq!(store.get::<_, u32>("order id"), Some(&1042));
//!
//! store.set("order id", None::<u32>);
//! assert!(!store.contains("order id"));
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

use hashbrown::HashMap;

/// Bounds required of variable keys.
pub trait VariableKey: Hash + Eq + fmt::Debug + Send + Sync + 'static {}

impl<K> VariableKey for K where K: Hash + Eq + fmt::Debug + Send + Sync + 'static {}

trait ErasedKey: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_key(&self, other: &dyn ErasedKey) -> bool;
    fn hash_key(&self, state: &mut dyn Hasher);
    fn debug_key(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<K: VariableKey> ErasedKey for K {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_key(&self, other: &dyn ErasedKey) -> bool {
        other
            .as_any()
            .downcast_ref::<K>()
            .is_some_and(|other| other == self)
    }

    fn hash_key(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.hash(&mut state);
    }

    fn debug_key(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct StoredKey(Box<dyn ErasedKey>);

impl StoredKey {
    fn new<K: VariableKey>(key: K) -> Self {
        Self(Box::new(key))
    }
}

impl PartialEq for StoredKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_key(&*other.0)
    }
}

impl Eq for StoredKey {}

impl Hash for StoredKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_key(state);
    }
}

impl fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.debug_key(f)
    }
}

/// Key/value store scoped to one execution context.
#[derive(Default)]
pub struct VariableStore {
    entries: HashMap<StoredKey, Box<dyn Any + Send>>,
}

impl VariableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key` when it has type `V`.
    #[must_use]
    pub fn get<K: VariableKey, V: Any>(&self, key: K) -> Option<&V> {
        self.entries.get(&StoredKey::new(key))?.downcast_ref::<V>()
    }

    /// Returns a mutable reference to the value stored under `key`.
    #[must_use]
    pub fn get_mut<K: VariableKey, V: Any>(&mut self, key: K) -> Option<&mut V> {
        self.entries
            .get_mut(&StoredKey::new(key))?
            .downcast_mut::<V>()
    }

    /// Stores `value` under `key`, or removes the key when `value` is `None`.
    pub fn set<K, V>(&mut self, key: K, value: Option<V>)
    where
        K: VariableKey,
        V: Any + Send,
    {
        match value {
            Some(value) => self.insert(key, value),
            None => self.remove(key),
        }
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<K: VariableKey, V: Any + Send>(&mut self, key: K, value: V) {
        self.entries.insert(StoredKey::new(key), Box::new(value));
    }

    /// Removes the entry stored under `key`.
    pub fn remove<K: VariableKey>(&mut self, key: K) {
        self.entries.remove(&StoredKey::new(key));
    }

    /// Removes and returns the value stored under `key` when it has type `V`.
    ///
    /// An entry of another type is left in place.
    pub fn take<K: VariableKey, V: Any>(&mut self, key: K) -> Option<V> {
        let stored = StoredKey::new(key);
        if !self.entries.get(&stored)?.is::<V>() {
            return None;
        }
        let value = self.entries.remove(&stored)?;
        value.downcast::<V>().ok().map(|boxed| *boxed)
    }

    /// Returns `true` when an entry exists for `key`.
    #[must_use]
    pub fn contains<K: VariableKey>(&self, key: K) -> bool {
        self.entries.contains_key(&StoredKey::new(key))
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for VariableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::VariableStore;

    #[derive(Debug, Hash, PartialEq, Eq)]
    enum Key {
        Customer,
        Basket,
    }

    #[test]
    fn set_none_removes_the_key() {
        let mut store = VariableStore::new();
        store.set("token", Some(String::from("abc")));
        assert!(store.contains("token"));
        store.set("token", None::<String>);
        assert!(!store.contains("token"));
        assert!(store.is_empty());
    }

    #[test]
    fn keys_match_on_type_and_value() {
        let mut store = VariableStore::new();
        store.insert("user", 1_u8);
        store.insert(String::from("user"), 2_u8);
        store.insert(Key::Customer, 3_u8);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get::<_, u8>("user"), Some(&1));
        assert_eq!(store.get::<_, u8>(String::from("user")), Some(&2));
        assert_eq!(store.get::<_, u8>(Key::Customer), Some(&3));
        assert!(!store.contains(Key::Basket));
    }

    #[test]
    fn get_with_wrong_type_returns_none() {
        let mut store = VariableStore::new();
        store.insert(7_i64, "seven");
        assert_eq!(store.get::<_, String>(7_i64), None);
        assert_eq!(store.get::<_, &str>(7_i64), Some(&"seven"));
    }

    #[test]
    fn insert_replaces_previous_value() {
        let mut store = VariableStore::new();
        store.insert(Key::Basket, vec![1, 2]);
        store.insert(Key::Basket, vec![3]);
        assert_eq!(store.get::<_, Vec<i32>>(Key::Basket), Some(&vec![3]));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_mut_and_take() {
        let mut store = VariableStore::new();
        store.insert("count", 1_u32);
        if let Some(count) = store.get_mut::<_, u32>("count") {
            *count += 1;
        }
        assert_eq!(store.take::<_, String>("count"), None);
        assert!(store.contains("count"));
        assert_eq!(store.take::<_, u32>("count"), Some(2));
        assert!(!store.contains("count"));
    }

    #[test]
    fn clear_empties_the_store() {
        let mut store = VariableStore::new();
        store.insert("a", 1);
        store.insert("b", 2);
        store.clear();
        assert!(store.is_empty());
        assert_eq!(format!("{store:?}"), "{}");
    }
}
