//! Ordered result lists that stay sorted as records come and go.

use serde::Serialize;
use std::cmp::Ordering;

/// Something a [`ResultList`] can order by.
pub trait Ranked {
    /// Ascending sort key. `None` sorts after every known value.
    fn rank_key(&self) -> Option<f64>;
}

fn compare<T: Ranked>(a: &T, b: &T) -> Ordering {
    match (a.rank_key(), b.rank_key()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultList<T> {
    items: Vec<T>,
}

impl<T> Default for ResultList<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Ranked> ResultList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_unsorted(items: Vec<T>) -> Self {
        let mut list = Self { items };
        list.sort();
        list
    }

    /// Insert and re-sort.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
        self.sort();
    }

    /// Empty the list ahead of a new query cycle.
    pub fn reset(&mut self) {
        self.items.clear();
    }

    /// Replace the whole membership.
    pub fn replace(&mut self, other: ResultList<T>) {
        self.items = other.items;
        self.sort();
    }

    /// Stable, so equal keys keep upstream order.
    pub fn sort(&mut self) {
        self.items.sort_by(compare);
    }

    pub fn is_sorted(&self) -> bool {
        self.items
            .windows(2)
            .all(|w| compare(&w[0], &w[1]) != Ordering::Greater)
    }

    pub fn find_mut(&mut self, pred: impl FnMut(&&mut T) -> bool) -> Option<&mut T> {
        self.items.iter_mut().find(pred)
    }
}

impl<T> ResultList<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T> IntoIterator for &'a ResultList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(&'static str, Option<f64>);

    impl Ranked for Item {
        fn rank_key(&self) -> Option<f64> {
            self.1
        }
    }

    #[test]
    fn test_sorted_with_unknown_last() {
        let list = ResultList::from_unsorted(vec![
            Item("c", Some(3.0)),
            Item("x", None),
            Item("a", Some(1.0)),
            Item("b", Some(2.0)),
        ]);
        let names: Vec<_> = list.iter().map(|i| i.0).collect();
        assert_eq!(names, vec!["a", "b", "c", "x"]);
        assert!(list.is_sorted());
    }

    #[test]
    fn test_push_resorts() {
        let mut list = ResultList::from_unsorted(vec![Item("a", Some(1.0)), Item("c", Some(3.0))]);
        list.push(Item("b", Some(2.0)));
        assert_eq!(list.as_slice()[1].0, "b");
        assert!(list.is_sorted());
    }

    #[test]
    fn test_stable_for_ties() {
        let list = ResultList::from_unsorted(vec![Item("first", Some(1.0)), Item("second", Some(1.0))]);
        assert_eq!(list.as_slice()[0].0, "first");
    }

    #[test]
    fn test_reset() {
        let mut list = ResultList::from_unsorted(vec![Item("a", Some(1.0))]);
        list.reset();
        assert!(list.is_empty());
    }
}
