use std::collections::{btree_map, BTreeMap};
use std::hash::Hash;

/// A stable-Rust substitute for the nightly `BTreeMap::try_insert()` API:
/// insert a key-value pair only if the key is not already present, returning
/// the previous value (wrapped in an error) if it was.
pub(crate) struct OccupiedEntryError<'a, K, V> {
    pub(crate) entry: btree_map::OccupiedEntry<'a, K, V>,
    pub(crate) value: V,
}

pub(crate) trait BTreeMapTryInsertExt<K, V> {
    fn insert_or_error(&mut self, key: K, value: V) -> Result<&mut V, OccupiedEntryError<'_, K, V>>;
}

impl<K, V> BTreeMapTryInsertExt<K, V> for BTreeMap<K, V>
where
    K: Ord,
{
    fn insert_or_error(&mut self, key: K, value: V) -> Result<&mut V, OccupiedEntryError<'_, K, V>> {
        match self.entry(key) {
            btree_map::Entry::Vacant(v) => Ok(v.insert(value)),
            btree_map::Entry::Occupied(entry) => Err(OccupiedEntryError { entry, value }),
        }
    }
}

/// Collects an iterator of `(key, value)` pairs into a `BTreeMap`, failing with
/// the set of keys that appeared more than once instead of silently dropping data.
pub(crate) fn try_collect_unique<K, V>(
    iter: impl Iterator<Item = (K, V)>,
) -> Result<BTreeMap<K, V>, Vec<K>>
where
    K: Ord + Eq + Hash + Clone,
{
    let mut map = BTreeMap::new();
    let mut duplicates = Vec::new();
    for (key, value) in iter {
        match map.entry(key) {
            btree_map::Entry::Vacant(v) => {
                v.insert(value);
            }
            btree_map::Entry::Occupied(entry) => {
                duplicates.push(entry.key().clone());
            }
        }
    }

    if duplicates.is_empty() {
        Ok(map)
    } else {
        Err(duplicates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_or_error_detects_duplicate() {
        let mut map: BTreeMap<&str, i32> = BTreeMap::new();
        map.insert_or_error("a", 1).unwrap();
        let err = map.insert_or_error("a", 2).unwrap_err();
        assert_eq!(err.value, 2);
    }

    #[test]
    fn try_collect_unique_reports_duplicates() {
        let pairs = vec![("a", 1), ("b", 2), ("a", 3)];
        let err = try_collect_unique(pairs.into_iter()).unwrap_err();
        assert_eq!(err, vec!["a"]);
    }
}
