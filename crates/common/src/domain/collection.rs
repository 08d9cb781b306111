use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::utils::{insert_at_index, insert_stable, remove_from, upsert_no_duplicate};

/// Items that may name a parent within their own collection.
pub trait Hierarchical {
    fn parent_id(&self) -> Option<&str>;
    fn created_at(&self) -> i64;
}

/// Ordered `{items, order}` pair. Every mutator touches both halves, so a
/// collection built through this API always has each item listed exactly once.
/// Deserialized snapshots are not trusted and are re-checked by the invariant
/// sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: Deserialize<'de>"))]
pub struct Collection<T> {
    #[serde(default)]
    items: BTreeMap<String, Arc<T>>,
    #[serde(default)]
    order: Vec<String>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { items: BTreeMap::new(), order: Vec::new() }
    }
}

impl<T> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from raw halves without checking them.
    pub fn from_parts(items: BTreeMap<String, Arc<T>>, order: Vec<String>) -> Self {
        Self { items, order }
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.get(id).map(Arc::as_ref)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn items(&self) -> &BTreeMap<String, Arc<T>> {
        &self.items
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn insert_at(&mut self, id: String, item: T, index: Option<usize>) {
        self.items.insert(id.clone(), Arc::new(item));
        upsert_no_duplicate(&mut self.order, id, index);
    }

    pub fn remove(&mut self, id: &str) -> Option<Arc<T>> {
        let removed = self.items.remove(id);
        remove_from(&mut self.order, &id.to_string());
        removed
    }

    /// Moves an existing item; unknown ids are ignored.
    pub fn move_to(&mut self, id: &str, index: Option<usize>) {
        if !self.items.contains_key(id) {
            return;
        }
        remove_from(&mut self.order, &id.to_string());
        insert_at_index(&mut self.order, id.to_string(), index);
    }
}

impl<T: Clone> Collection<T> {
    /// Copy-on-write access to one item.
    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.items.get_mut(id).map(Arc::make_mut)
    }

    pub fn replace(&mut self, id: &str, item: T) {
        if let Some(slot) = self.items.get_mut(id) {
            *slot = Arc::new(item);
        }
    }
}

impl<T: Hierarchical> Collection<T> {
    /// Inserts by explicit index when given, otherwise by `(createdAt, id)`.
    pub fn insert_ordered(&mut self, id: String, item: T, index: Option<usize>) {
        let created_at = item.created_at();
        self.items.insert(id.clone(), Arc::new(item));
        match index {
            Some(_) => upsert_no_duplicate(&mut self.order, id, index),
            None => {
                let items = &self.items;
                insert_stable(&mut self.order, id, created_at, |existing| {
                    items.get(existing).map(|item| item.created_at())
                });
            }
        }
    }

    /// Every transitive child of `root`, breadth first. `root` is excluded.
    pub fn descendants(&self, root: &str) -> Vec<String> {
        let mut found = Vec::new();
        let mut seen = HashSet::from([root.to_string()]);
        let mut queue = VecDeque::from([root.to_string()]);
        while let Some(current) = queue.pop_front() {
            for (id, item) in &self.items {
                if item.parent_id() == Some(current.as_str()) && seen.insert(id.clone()) {
                    found.push(id.clone());
                    queue.push_back(id.clone());
                }
            }
        }
        found
    }

    /// True when `candidate` sits somewhere below `ancestor`.
    pub fn is_descendant(&self, ancestor: &str, candidate: &str) -> bool {
        let mut seen = HashSet::new();
        let mut cursor = self.get(candidate).and_then(|item| item.parent_id());
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            if !seen.insert(parent) {
                return false;
            }
            cursor = self.get(parent).and_then(|item| item.parent_id());
        }
        false
    }

    /// Removes `root` and all its descendants. Returns the removed ids.
    pub fn remove_subtree(&mut self, root: &str) -> Vec<String> {
        if !self.contains(root) {
            return Vec::new();
        }
        let mut removed = vec![root.to_string()];
        removed.extend(self.descendants(root));
        for id in &removed {
            self.remove(id);
        }
        removed
    }
}
