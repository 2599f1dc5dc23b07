//! Common types used across storage operations.

use std::{collections::BTreeMap, ops::Bound};

use bytes::Bytes;

/// Key-value pair returned from range queries.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use tenantkv_storage::KeyValue;
///
/// let kv = KeyValue::new(Bytes::from("acct-store-a2V5"), Bytes::from("value"));
/// assert_eq!(kv.value, Bytes::from("value"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key identifying this entry.
    pub key: Bytes,

    /// The value stored at this key.
    pub value: Bytes,
}

impl KeyValue {
    /// Creates a new key-value pair.
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// A key range with owned bounds, as accepted by
/// [`Transaction::get_range`](crate::Transaction::get_range).
pub type KeyRange = (Bound<Vec<u8>>, Bound<Vec<u8>>);

/// Returns the range covering exactly the keys that start with `prefix`.
///
/// The upper bound is the prefix with its last non-`0xFF` byte incremented
/// and everything after it dropped. A prefix made only of `0xFF` bytes (or an
/// empty prefix) has no finite successor, so the range is unbounded above.
///
/// # Examples
///
/// ```
/// use std::ops::Bound;
/// use tenantkv_storage::prefix_range;
///
/// let (start, end) = prefix_range(b"ab");
/// assert_eq!(start, Bound::Included(b"ab".to_vec()));
/// assert_eq!(end, Bound::Excluded(b"ac".to_vec()));
/// ```
#[must_use]
pub fn prefix_range(prefix: &[u8]) -> KeyRange {
    let start = Bound::Included(prefix.to_vec());

    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return (start, Bound::Excluded(upper));
        }
    }

    (start, Bound::Unbounded)
}

/// Writes buffered by a transaction; `None` marks a delete.
pub(crate) type PendingWrites = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

pub(crate) fn as_slice_bound(bound: Bound<&Vec<u8>>) -> Bound<&[u8]> {
    match bound {
        Bound::Included(b) => Bound::Included(b.as_slice()),
        Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Returns `true` for empty or inverted ranges, which sorted maps reject.
pub(crate) fn is_degenerate(start: Bound<&[u8]>, end: Bound<&[u8]>) -> bool {
    match (start, end) {
        (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
        (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e) | Bound::Excluded(e)) => {
            s > e
        },
        _ => false,
    }
}

/// Layers a transaction's pending writes over committed entries of the
/// range `(start, end)`, keeping key order.
pub(crate) fn overlay_pending(
    committed: &[KeyValue],
    pending: &PendingWrites,
    start: Bound<&[u8]>,
    end: Bound<&[u8]>,
) -> Vec<KeyValue> {
    let mut merged: BTreeMap<Bytes, Bytes> =
        committed.iter().map(|kv| (kv.key.clone(), kv.value.clone())).collect();
    if !is_degenerate(start, end) {
        for (key, value) in pending.range::<[u8], _>((start, end)) {
            let key = Bytes::copy_from_slice(key);
            match value {
                Some(v) => {
                    merged.insert(key, Bytes::copy_from_slice(v));
                },
                None => {
                    merged.remove(&key);
                },
            }
        }
    }
    merged.into_iter().map(|(k, v)| KeyValue::new(k, v)).collect()
}
