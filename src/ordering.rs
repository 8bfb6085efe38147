//! Reindexing of ordered collections (missions, slides, catalog cases).
//!
//! Every mutating helper here leaves `order` values at `1..=len`, except
//! [`remove`], which only filters and leaves reindexing to the caller.

use serde::{Deserialize, Serialize};

use crate::domain::{Case, CinematicSlide, Mission};

/// An entry of a 1-based ordered collection.
pub trait Ordered {
  fn id(&self) -> &str;
  fn order(&self) -> u32;
  fn set_order(&mut self, order: u32);
}

impl Ordered for Mission {
  fn id(&self) -> &str { &self.id }
  fn order(&self) -> u32 { self.order }
  fn set_order(&mut self, order: u32) { self.order = order; }
}

impl Ordered for CinematicSlide {
  fn id(&self) -> &str { &self.id }
  fn order(&self) -> u32 { self.order }
  fn set_order(&mut self, order: u32) { self.order = order; }
}

impl Ordered for Case {
  fn id(&self) -> &str { &self.id }
  fn order(&self) -> u32 { self.display_order }
  fn set_order(&mut self, order: u32) { self.display_order = order; }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Up,
  Down,
}

fn position_order(index: usize) -> u32 {
  u32::try_from(index + 1).unwrap_or(u32::MAX)
}

/// Appends `item` at the end and returns the order it was given.
pub fn append<T: Ordered>(items: &mut Vec<T>, mut item: T) -> u32 {
  let order = position_order(items.len());
  item.set_order(order);
  items.push(item);
  order
}

/// Filters out the entry with `id`. Survivors keep their previous orders.
pub fn remove<T: Ordered>(items: &mut Vec<T>, id: &str) -> Option<T> {
  let idx = items.iter().position(|it| it.id() == id)?;
  Some(items.remove(idx))
}

/// Removes the entry with `id` and renumbers the survivors.
pub fn remove_and_reindex<T: Ordered>(items: &mut Vec<T>, id: &str) -> Option<T> {
  let removed = remove(items, id)?;
  reindex(items);
  Some(removed)
}

/// Swaps the entry with its neighbour in `direction`, then renumbers.
/// Returns false (and leaves `items` untouched) at a boundary or for an unknown id.
pub fn move_item<T: Ordered>(items: &mut [T], id: &str, direction: Direction) -> bool {
  let Some(idx) = items.iter().position(|it| it.id() == id) else {
    return false;
  };
  let target = match direction {
    Direction::Up if idx > 0 => idx - 1,
    Direction::Down if idx + 1 < items.len() => idx + 1,
    _ => return false,
  };
  items.swap(idx, target);
  reindex(items);
  true
}

/// Rewrites every order to its 1-based position; returns how many changed.
pub fn reindex<T: Ordered>(items: &mut [T]) -> usize {
  let mut changed = 0;
  for (idx, it) in items.iter_mut().enumerate() {
    let order = position_order(idx);
    if it.order() != order {
      it.set_order(order);
      changed += 1;
    }
  }
  changed
}

/// Stable sort by the current order value.
pub fn sort_by_order<T: Ordered>(items: &mut [T]) {
  items.sort_by_key(|it| it.order());
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::orders_contiguous;

  fn is_contiguous<T: Ordered>(items: &[T]) -> bool {
    orders_contiguous(items.iter().map(|it| it.order()))
  }

  fn missions(ids: &[&str]) -> Vec<Mission> {
    let mut out = Vec::new();
    for id in ids {
      append(&mut out, Mission::new(*id, 0));
    }
    out
  }

  fn ids(items: &[Mission]) -> Vec<&str> {
    items.iter().map(|m| m.id.as_str()).collect()
  }

  fn orders(items: &[Mission]) -> Vec<u32> {
    items.iter().map(|m| m.order).collect()
  }

  #[test]
  fn append_assigns_next_position() {
    let items = missions(&["a", "b", "c"]);
    assert_eq!(orders(&items), vec![1, 2, 3]);
  }

  #[test]
  fn move_up_and_down_swap_and_renumber() {
    let mut items = missions(&["a", "b", "c"]);
    assert!(move_item(&mut items, "c", Direction::Up));
    assert_eq!(ids(&items), vec!["a", "c", "b"]);
    assert_eq!(orders(&items), vec![1, 2, 3]);

    assert!(move_item(&mut items, "a", Direction::Down));
    assert_eq!(ids(&items), vec!["c", "a", "b"]);
    assert!(is_contiguous(&items));
  }

  #[test]
  fn boundary_moves_are_noops() {
    let mut items = missions(&["a", "b", "c"]);
    let before = items.clone();
    assert!(!move_item(&mut items, "a", Direction::Up));
    assert!(!move_item(&mut items, "c", Direction::Down));
    assert!(!move_item(&mut items, "zzz", Direction::Up));
    assert_eq!(items, before);
  }

  #[test]
  fn plain_remove_leaves_gaps() {
    let mut items = missions(&["a", "b", "c"]);
    let removed = remove(&mut items, "a").unwrap();
    assert_eq!(removed.id, "a");
    assert_eq!(orders(&items), vec![2, 3]);
    assert!(!is_contiguous(&items));
  }

  #[test]
  fn remove_and_reindex_keeps_relative_order() {
    let mut items = missions(&["a", "b", "c"]);
    remove_and_reindex(&mut items, "b");
    assert_eq!(ids(&items), vec!["a", "c"]);
    assert_eq!(orders(&items), vec![1, 2]);
    assert!(remove_and_reindex(&mut items, "missing").is_none());
  }

  #[test]
  fn mixed_operation_sequence_stays_contiguous() {
    let mut items = missions(&["a", "b", "c", "d", "e"]);
    let script: &[(&str, Option<Direction>)] = &[
      ("c", Some(Direction::Up)),
      ("a", None),
      ("e", Some(Direction::Down)),
      ("d", Some(Direction::Up)),
      ("b", None),
    ];
    for (id, dir) in script {
      match dir {
        Some(d) => { move_item(&mut items, id, *d); }
        None => { remove_and_reindex(&mut items, id); }
      }
      assert!(is_contiguous(&items), "orders {:?} after touching {id}", orders(&items));
    }
    append(&mut items, Mission::new("f", 99));
    assert_eq!(orders(&items), vec![1, 2, 3, 4]);
  }

  #[test]
  fn sort_then_reindex_normalizes_sparse_orders() {
    let mut items = missions(&["a", "b", "c"]);
    items[0].order = 30;
    items[1].order = 10;
    items[2].order = 20;
    sort_by_order(&mut items);
    assert_eq!(reindex(&mut items), 3);
    assert_eq!(ids(&items), vec!["b", "c", "a"]);
    assert_eq!(orders(&items), vec![1, 2, 3]);
  }
}
