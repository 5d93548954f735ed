//! Change notifications.
//!
//! Subscribers are called synchronously, in subscription order, after a
//! mutation has been applied and validation has caught up. They receive the
//! event and a read-only view of the document.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::ModelDocument;
use crate::model::EntityRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub change: ChangeKind,
    pub entity: EntityRef,
}

impl ChangeEvent {
    pub fn added(entity: EntityRef) -> Self {
        ChangeEvent {
            change: ChangeKind::Added,
            entity,
        }
    }

    pub fn updated(entity: EntityRef) -> Self {
        ChangeEvent {
            change: ChangeKind::Updated,
            entity,
        }
    }

    pub fn removed(entity: EntityRef) -> Self {
        ChangeEvent {
            change: ChangeKind::Removed,
            entity,
        }
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
pub type SubscriptionId = u64;

type Callback = Box<dyn Fn(&ChangeEvent, &ModelDocument) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: SubscriptionId,
    entries: Vec<(SubscriptionId, Callback)>,
}

impl Subscribers {
    pub(crate) fn add(&mut self, callback: Callback) -> SubscriptionId {
        self.next_id += 1;
        self.entries.push((self.next_id, callback));
        self.next_id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    pub(crate) fn notify(&self, event: &ChangeEvent, document: &ModelDocument) {
        for (_, callback) in &self.entries {
            callback(event, document);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers").field("count", &self.entries.len()).finish()
    }
}
