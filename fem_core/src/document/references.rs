//! Reverse reference index: for every referenced entity, who refers to it.
//!
//! Targets are tracked whether or not they exist, so adding an entity that
//! was previously dangling finds the entities waiting on it.

use std::collections::{BTreeSet, HashMap};

use crate::model::EntityRef;

#[derive(Debug, Default, Clone)]
pub(crate) struct ReferenceIndex {
    dependents: HashMap<EntityRef, BTreeSet<EntityRef>>,
}

impl ReferenceIndex {
    pub(crate) fn link(&mut self, from: EntityRef, targets: &[EntityRef]) {
        for target in targets {
            self.dependents.entry(*target).or_default().insert(from);
        }
    }

    pub(crate) fn unlink(&mut self, from: EntityRef, targets: &[EntityRef]) {
        for target in targets {
            if let Some(set) = self.dependents.get_mut(target) {
                set.remove(&from);
                if set.is_empty() {
                    self.dependents.remove(target);
                }
            }
        }
    }

    /// Entities referring to `target`, ordered by kind then id.
    pub(crate) fn dependents_of(&self, target: EntityRef) -> impl Iterator<Item = EntityRef> + '_ {
        self.dependents.get(&target).into_iter().flatten().copied()
    }
}
