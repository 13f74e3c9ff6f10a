//! Read-only views over cache contents
//!
//! Key sets, value collections and entry sets are snapshots handed to the
//! caller. Every mutating operation fails with
//! [`Error::UnsupportedOperation`].

use crate::error::{Error, Result};
use crate::marshall::Object;

/// Snapshot collection that refuses modification
#[derive(Debug, Clone, PartialEq)]
pub struct UnmodifiableCollection<T> {
    items: Vec<T>,
}

pub type KeySet = UnmodifiableCollection<Object>;
pub type Values = UnmodifiableCollection<Object>;
pub type EntrySet = UnmodifiableCollection<UnmodifiableEntry>;

impl<T> UnmodifiableCollection<T> {
    pub(crate) fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn add(&self, _item: T) -> Result<bool> {
        Err(Error::UnsupportedOperation("add"))
    }

    pub fn add_all(&self, _items: impl IntoIterator<Item = T>) -> Result<bool> {
        Err(Error::UnsupportedOperation("add_all"))
    }

    pub fn remove(&self, _item: &T) -> Result<bool> {
        Err(Error::UnsupportedOperation("remove"))
    }

    pub fn remove_all(&self, _items: &[T]) -> Result<bool> {
        Err(Error::UnsupportedOperation("remove_all"))
    }

    pub fn retain_all(&self, _items: &[T]) -> Result<bool> {
        Err(Error::UnsupportedOperation("retain_all"))
    }

    pub fn clear(&self) -> Result<()> {
        Err(Error::UnsupportedOperation("clear"))
    }
}

impl<T: PartialEq> UnmodifiableCollection<T> {
    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }
}

impl<'a, T> IntoIterator for &'a UnmodifiableCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Key/value pair whose value cannot be replaced
#[derive(Debug, Clone, PartialEq)]
pub struct UnmodifiableEntry {
    key: Object,
    value: Object,
}

impl UnmodifiableEntry {
    pub(crate) fn new(key: Object, value: Object) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> &Object {
        &self.key
    }

    pub fn value(&self) -> &Object {
        &self.value
    }

    pub fn set_value(&self, _value: Object) -> Result<Object> {
        Err(Error::UnsupportedOperation("set_value"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn keys() -> KeySet {
        UnmodifiableCollection::new(vec![Object::from("a"), Object::from("b")])
    }

    #[test]
    fn test_reads_work() {
        let set = keys();
        assert_eq!(set.len(), 2);
        assert!(!set.is_empty());
        assert!(set.contains(&Object::from("a")));
        assert!(!set.contains(&Object::from("z")));
        assert_eq!(set.iter().count(), 2);
        assert_eq!((&set).into_iter().filter_map(Object::as_str).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_every_mutation_is_rejected() {
        let set = keys();
        assert_matches!(set.add(Object::from("c")), Err(Error::UnsupportedOperation("add")));
        assert_matches!(set.add_all(vec![Object::from("c")]), Err(Error::UnsupportedOperation("add_all")));
        assert_matches!(set.remove(&Object::from("a")), Err(Error::UnsupportedOperation("remove")));
        assert_matches!(set.remove_all(&[]), Err(Error::UnsupportedOperation("remove_all")));
        assert_matches!(set.retain_all(&[]), Err(Error::UnsupportedOperation("retain_all")));
        assert_matches!(set.clear(), Err(Error::UnsupportedOperation("clear")));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_entry_value_is_fixed() {
        let entry = UnmodifiableEntry::new(Object::from("k"), Object::from(1));
        assert_matches!(entry.set_value(Object::from(2)), Err(Error::UnsupportedOperation("set_value")));
        assert_eq!(entry.value(), &Object::from(1));
        assert_eq!(entry.key(), &Object::from("k"));
    }
}
