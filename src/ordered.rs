//! Insertion-ordered store with producer-assigned order keys.
//!
//! Entries are addressed by `(key, order)`. The order value only drives
//! iteration; it need not be contiguous. Two entries may share a key as long
//! as their orders differ, which lets fragments produced independently be
//! spliced before or after everything already present without clashing.
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub struct OrderedStore<V> {
    // (order, key) so iteration is already in output order
    entries: BTreeMap<(i64, String), V>,
}

impl<V> Default for OrderedStore<V> {
    fn default() -> Self {
        Self { entries: BTreeMap::new() }
    }
}

impl<V> OrderedStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn min_order(&self) -> Option<i64> {
        self.entries.keys().next().map(|(o, _)| *o)
    }

    fn max_order(&self) -> Option<i64> {
        self.entries.keys().next_back().map(|(o, _)| *o)
    }

    /// Insert at an explicit order. Returns the previous value stored under
    /// the same `(key, order)`.
    pub fn insert(&mut self, key: impl Into<String>, order: i64, value: V) -> Option<V> {
        self.entries.insert((order, key.into()), value)
    }

    /// Insert behind every existing entry; returns the allocated order.
    pub fn insert_after_all(&mut self, key: impl Into<String>, value: V) -> i64 {
        let order = self.max_order().map_or(0, |o| o + 1);
        self.entries.insert((order, key.into()), value);
        order
    }

    /// Insert ahead of every existing entry; returns the allocated order.
    pub fn insert_before_all(&mut self, key: impl Into<String>, value: V) -> i64 {
        let order = self.min_order().map_or(0, |o| o - 1);
        self.entries.insert((order, key.into()), value);
        order
    }

    pub fn get(&self, key: &str, order: i64) -> Option<&V> {
        self.entries.get(&(order, key.to_string()))
    }

    /// All entries stored under `key`, in output order.
    pub fn find<'a>(&'a self, key: &'a str) -> impl Iterator<Item = (i64, &'a V)> + 'a {
        self.entries
            .iter()
            .filter(move |((_, k), _)| k == key)
            .map(|((o, _), v)| (*o, v))
    }

    /// Entries in output order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64, &V)> {
        self.entries.iter().map(|((o, k), v)| (k.as_str(), *o, v))
    }

    /// Splice `other` behind everything here, keeping its internal order.
    pub fn append(&mut self, other: OrderedStore<V>) {
        for ((_, key), value) in other.entries {
            self.insert_after_all(key, value);
        }
    }

    /// Splice `other` ahead of everything here, keeping its internal order.
    pub fn prepend(&mut self, other: OrderedStore<V>) {
        for ((_, key), value) in other.entries.into_iter().rev() {
            self.insert_before_all(key, value);
        }
    }
}

impl<V> IntoIterator for OrderedStore<V> {
    type Item = (String, i64, V);
    type IntoIter = std::iter::Map<
        std::collections::btree_map::IntoIter<(i64, String), V>,
        fn(((i64, String), V)) -> (String, i64, V),
    >;

    fn into_iter(self) -> Self::IntoIter {
        fn flip<V>(((o, k), v): ((i64, String), V)) -> (String, i64, V) {
            (k, o, v)
        }
        self.entries.into_iter().map(flip::<V> as fn(_) -> _)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys<V>(s: &OrderedStore<V>) -> Vec<String> {
        s.iter().map(|(k, _, _)| k.to_string()).collect()
    }

    #[test]
    fn output_follows_order_not_key() {
        let mut s = OrderedStore::new();
        s.insert("zeta", 10, 1);
        s.insert("alpha", 20, 2);
        s.insert("mid", 15, 3);
        assert_eq!(keys(&s), ["zeta", "mid", "alpha"]);
    }

    #[test]
    fn before_and_after_all_allocate_outside_current_range() {
        let mut s = OrderedStore::new();
        assert_eq!(s.insert_after_all("a", ()), 0);
        assert_eq!(s.insert_after_all("b", ()), 1);
        assert_eq!(s.insert_before_all("c", ()), -1);
        assert_eq!(keys(&s), ["c", "a", "b"]);
    }

    #[test]
    fn same_key_different_order_coexist() {
        let mut s = OrderedStore::new();
        s.insert("k", 1, "first");
        s.insert("k", 2, "second");
        assert_eq!(s.len(), 2);
        let found: Vec<_> = s.find("k").map(|(_, v)| *v).collect();
        assert_eq!(found, ["first", "second"]);
        assert_eq!(s.insert("k", 1, "replaced"), Some("first"));
    }

    #[test]
    fn fragments_merge_without_collision() {
        let mut main = OrderedStore::new();
        main.insert("b", 0, 2);

        let mut head = OrderedStore::new();
        head.insert("a0", 7, 0);
        head.insert("a1", 9, 1);
        main.prepend(head);

        let mut tail = OrderedStore::new();
        tail.insert("c", -4, 3);
        main.append(tail);

        assert_eq!(keys(&main), ["a0", "a1", "b", "c"]);
    }
}
