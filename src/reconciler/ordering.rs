//! Pure order-index arithmetic used by the reconciler.

use std::collections::HashSet;

use super::model::{ComponentId, ComponentRecord, PageComponent};

/// Anything that holds an order index and a stable tie-break key.
pub trait Sequenced {
    type Key: Ord + Clone;

    fn order_index(&self) -> i32;
    fn set_order_index(&mut self, index: i32);
    fn sequence_key(&self) -> Self::Key;
}

impl Sequenced for ComponentRecord {
    type Key = i64;

    fn order_index(&self) -> i32 {
        self.order_index
    }

    fn set_order_index(&mut self, index: i32) {
        self.order_index = index;
    }

    fn sequence_key(&self) -> i64 {
        self.id
    }
}

impl Sequenced for PageComponent {
    type Key = ComponentId;

    fn order_index(&self) -> i32 {
        self.order_index
    }

    fn set_order_index(&mut self, index: i32) {
        self.order_index = index;
    }

    fn sequence_key(&self) -> ComponentId {
        self.id.clone()
    }
}

/// Canonical order: sort by `(orderIndex, id)` and renumber from 0.
///
/// Deterministic and idempotent.
pub fn normalize<T: Sequenced>(mut items: Vec<T>) -> Vec<T> {
    items.sort_by_cached_key(|item| (item.order_index(), item.sequence_key()));
    for (position, item) in items.iter_mut().enumerate() {
        item.set_order_index(position as i32);
    }
    items
}

pub fn has_duplicate_indices<T: Sequenced>(items: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(items.len());
    items.iter().any(|item| !seen.insert(item.order_index()))
}

/// `max + 1`, or 0 for an empty page. Gaps are never filled.
///
/// `None` when the highest index is already `i32::MAX`.
pub fn next_order_index<T: Sequenced>(items: &[T]) -> Option<i32> {
    match items.iter().map(Sequenced::order_index).max() {
        Some(max) => max.checked_add(1),
        None => Some(0),
    }
}

/// Smallest non-negative index absent from `taken`.
pub fn lowest_free_index(taken: &[i32]) -> i32 {
    let taken: HashSet<i32> = taken.iter().copied().collect();
    (0..).find(|candidate| !taken.contains(candidate)).unwrap_or(0)
}

/// First index of the parking range used while rewriting a page's order.
/// Every slot at or above it is clear of both current and final indices.
///
/// `None` when the `len` slots of the range would not fit in an `i32`.
pub fn quarantine_base(
    indices: impl IntoIterator<Item = i32>,
    len: usize,
    offset: i32,
) -> Option<i32> {
    let len = i32::try_from(len).ok()?;
    let highest = indices.into_iter().max().unwrap_or(0);
    let base = highest.max(len).checked_add(offset.max(1))?;
    base.checked_add(len)?;
    Some(base)
}
