//! # Entity Registry
//!
//! An id-keyed store for one entity kind that remembers insertion order.
//!
//! Entries live in a slot vector; an id index maps each id to its slot.
//! Removal leaves a tombstone so the index stays valid, and the vector is
//! compacted once tombstones outnumber live entries. `add`, `get` and `take`
//! are O(1) amortized, and iteration always follows insertion order.
//!
//! Dependency checks and cascades cross registries, so they belong to
//! [`ModelDocument::remove`](crate::document::ModelDocument::remove). The
//! registry itself only stores.
//!
//! ## Example
//!
//! ```rust
//! use fem_core::model::Node;
//! use fem_core::registry::EntityRegistry;
//!
//! let mut nodes = EntityRegistry::new();
//! nodes.add(Node::new(2, vec![0.0, 0.0]).unwrap()).unwrap();
//! nodes.add(Node::new(1, vec![1.0, 0.0]).unwrap()).unwrap();
//!
//! // Duplicate ids are rejected
//! assert!(nodes.add(Node::new(1, vec![5.0, 5.0]).unwrap()).is_err());
//!
//! // Insertion order, not id order
//! let ids: Vec<u64> = nodes.iter().map(|n| n.id).collect();
//! assert_eq!(ids, vec![2, 1]);
//! ```

use std::collections::HashMap;

use crate::errors::{ModelError, ModelResult};
use crate::model::{Entity, EntityId};

/// Compaction is skipped for small registries.
const COMPACT_THRESHOLD: usize = 32;

#[derive(Debug, Clone)]
pub struct EntityRegistry<T> {
    slots: Vec<Option<T>>,
    index: HashMap<EntityId, usize>,
    tombstones: usize,
    max_id: EntityId,
}

impl<T> Default for EntityRegistry<T> {
    fn default() -> Self {
        EntityRegistry {
            slots: Vec::new(),
            index: HashMap::new(),
            tombstones: 0,
            max_id: 0,
        }
    }
}

impl<T: Entity> EntityRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    /// Insert a new entity. Fails with `DuplicateId` and leaves the registry
    /// unchanged if the id is taken.
    pub fn add(&mut self, entity: T) -> ModelResult<()> {
        let id = entity.id();
        if self.index.contains_key(&id) {
            return Err(ModelError::DuplicateId { kind: T::KIND, id });
        }
        self.index.insert(id, self.slots.len());
        self.slots.push(Some(entity));
        self.max_id = self.max_id.max(id);
        Ok(())
    }

    pub fn get(&self, id: EntityId) -> ModelResult<&T> {
        self.find(id).ok_or(ModelError::NotFound { kind: T::KIND, id })
    }

    /// Like [`get`](Self::get) but without building an error.
    pub fn find(&self, id: EntityId) -> Option<&T> {
        self.index.get(&id).and_then(|slot| self.slots[*slot].as_ref())
    }

    /// Replace the entity with the same id, keeping its position.
    /// Returns the previous value.
    pub fn replace(&mut self, entity: T) -> ModelResult<T> {
        let id = entity.id();
        let slot = *self.index.get(&id).ok_or(ModelError::NotFound { kind: T::KIND, id })?;
        self.slots[slot]
            .replace(entity)
            .ok_or_else(|| ModelError::Internal {
                message: format!("{} {} indexed to an empty slot", T::KIND, id),
            })
    }

    /// Remove an entity without any dependency checks.
    pub fn take(&mut self, id: EntityId) -> ModelResult<T> {
        let slot = self.index.remove(&id).ok_or(ModelError::NotFound { kind: T::KIND, id })?;
        let entity = self.slots[slot].take().ok_or_else(|| ModelError::Internal {
            message: format!("{} {} indexed to an empty slot", T::KIND, id),
        })?;
        self.tombstones += 1;
        if self.tombstones > COMPACT_THRESHOLD && self.tombstones * 2 > self.slots.len() {
            self.compact();
        }
        Ok(entity)
    }

    /// Live entities in insertion order.
    ///
    /// The iterator borrows the registry; call `iter()` again to restart.
    pub fn iter(&self) -> Entities<'_, T> {
        Entities {
            slots: self.slots.iter(),
            remaining: self.index.len(),
        }
    }

    /// Ids in insertion order
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.iter().map(|entity| entity.id())
    }

    /// Smallest id greater than every id ever added.
    pub fn next_id(&self) -> EntityId {
        self.max_id + 1
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.tombstones = 0;
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        self.index.clear();
        for (slot, entity) in self.slots.iter().enumerate() {
            if let Some(entity) = entity {
                self.index.insert(entity.id(), slot);
            }
        }
        self.tombstones = 0;
    }
}

impl<T: Entity> PartialEq for EntityRegistry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<'a, T: Entity> IntoIterator for &'a EntityRegistry<T> {
    type Item = &'a T;
    type IntoIter = Entities<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy insertion-order iterator over a registry's live entities.
#[derive(Debug, Clone)]
pub struct Entities<'a, T> {
    slots: std::slice::Iter<'a, Option<T>>,
    remaining: usize,
}

impl<'a, T> Iterator for Entities<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.slots.by_ref().find_map(|slot| slot.as_ref());
        if next.is_some() {
            self.remaining -= 1;
        }
        next
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Entities<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;

    fn node(id: EntityId) -> Node {
        Node::new(id, vec![id as f64, 0.0]).unwrap()
    }

    #[test]
    fn test_duplicate_add_leaves_registry_unchanged() {
        let mut registry = EntityRegistry::new();
        registry.add(node(1)).unwrap();
        registry.add(node(2)).unwrap();
        let before = registry.clone();

        let replacement = Node::new(1, vec![9.0, 9.0]).unwrap();
        let err = registry.add(replacement).unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_ID");
        assert_eq!(registry, before);
        assert_eq!(registry.get(1).unwrap().coords, vec![1.0, 0.0]);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let registry: EntityRegistry<Node> = EntityRegistry::new();
        assert_eq!(registry.get(4).unwrap_err().error_code(), "NOT_FOUND");
    }

    #[test]
    fn test_iteration_is_restartable_and_ordered() {
        let mut registry = EntityRegistry::new();
        for id in [5, 3, 9] {
            registry.add(node(id)).unwrap();
        }
        let first: Vec<_> = registry.ids().collect();
        let second: Vec<_> = registry.ids().collect();
        assert_eq!(first, vec![5, 3, 9]);
        assert_eq!(first, second);
        assert_eq!(registry.iter().len(), 3);
    }

    #[test]
    fn test_take_keeps_order_of_survivors() {
        let mut registry = EntityRegistry::new();
        for id in 1..=100 {
            registry.add(node(id)).unwrap();
        }
        for id in (1..=100).filter(|id| id % 3 != 0) {
            registry.take(id).unwrap();
        }
        let ids: Vec<_> = registry.ids().collect();
        let expected: Vec<_> = (1..=100).filter(|id| id % 3 == 0).collect();
        assert_eq!(ids, expected);
        for id in &expected {
            assert!(registry.get(*id).is_ok());
        }
        assert!(registry.take(1).is_err());
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut registry = EntityRegistry::new();
        registry.add(node(1)).unwrap();
        registry.add(node(2)).unwrap();
        let old = registry.replace(Node::new(1, vec![7.0, 7.0]).unwrap()).unwrap();
        assert_eq!(old.coords, vec![1.0, 0.0]);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec![1, 2]);
        assert!(registry.replace(node(3)).is_err());
    }

    #[test]
    fn test_next_id() {
        let mut registry = EntityRegistry::new();
        assert_eq!(registry.next_id(), 1);
        registry.add(node(10)).unwrap();
        registry.add(node(4)).unwrap();
        assert_eq!(registry.next_id(), 11);
        registry.take(10).unwrap();
        assert_eq!(registry.next_id(), 11);
    }
}
