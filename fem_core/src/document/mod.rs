//! # Model Document
//!
//! One [`EntityRegistry`] per entity kind, the ordered stage list, and the
//! cross-registry concerns: dependency-aware removal, incremental validation
//! and change notification.
//!
//! Every successful mutation runs the same sequence:
//!
//! 1. apply the change to the registry and the reverse reference index
//! 2. mark the touched entities dirty and re-validate them (plus everything
//!    that refers to them)
//! 3. notify subscribers, in subscription order, once per affected entity
//!
//! A failed mutation changes nothing and notifies no one.
//!
//! ## Example
//!
//! ```rust
//! use fem_core::document::ModelDocument;
//! use fem_core::model::{Element, Elastic, ElasticSection, Material, Node, Section, Truss};
//!
//! let mut doc = ModelDocument::new();
//! doc.add(Node::new(1, vec![0.0, 0.0]).unwrap()).unwrap();
//! doc.add(Node::new(2, vec![4.0, 0.0]).unwrap()).unwrap();
//! doc.add(Element::new(1, Truss { area: 0.01 }, vec![1, 2], 1, 1).unwrap()).unwrap();
//!
//! // Material 1 and section 1 do not exist yet
//! assert_eq!(doc.issues().len(), 2);
//!
//! doc.add(Material::new(1, Elastic { e: 200e9 }).unwrap()).unwrap();
//! let section = ElasticSection { e: 200e9, a: 0.01, iz: 1e-5, iy: None, g: None, j: None };
//! doc.add(Section::new(1, section).unwrap()).unwrap();
//! assert!(doc.is_valid());
//!
//! // The element still needs node 1
//! assert!(doc.remove::<Node>(1, false).is_err());
//! ```

mod events;
mod references;
mod validation;

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info};

use crate::errors::{ModelError, ModelResult, ValidationIssue};
use crate::model::{
    Constraint, Element, Entity, EntityId, EntityKind, EntityRef, Load, Material, ModelBuilder, Node,
    Section, Stage,
};
use crate::registry::{Entities, EntityRegistry};

pub use events::{ChangeEvent, ChangeKind, SubscriptionId};

use events::Subscribers;
use references::ReferenceIndex;
use validation::Validator;

/// Entity types a [`ModelDocument`] stores, with access to their registry.
pub trait Stored: Entity + Sized {
    fn registry(document: &ModelDocument) -> &EntityRegistry<Self>;
    fn registry_mut(document: &mut ModelDocument) -> &mut EntityRegistry<Self>;
}

macro_rules! stored {
    ($($ty:ty => $field:ident),+ $(,)?) => {
        $(
            impl Stored for $ty {
                fn registry(document: &ModelDocument) -> &EntityRegistry<Self> {
                    &document.$field
                }

                fn registry_mut(document: &mut ModelDocument) -> &mut EntityRegistry<Self> {
                    &mut document.$field
                }
            }
        )+
    };
}

stored! {
    Material => materials,
    Section => sections,
    Node => nodes,
    Element => elements,
    Constraint => constraints,
    Load => loads,
    Stage => stages,
}

/// The in-memory structural model.
#[derive(Default)]
pub struct ModelDocument {
    materials: EntityRegistry<Material>,
    sections: EntityRegistry<Section>,
    nodes: EntityRegistry<Node>,
    elements: EntityRegistry<Element>,
    constraints: EntityRegistry<Constraint>,
    loads: EntityRegistry<Load>,
    stages: EntityRegistry<Stage>,
    references: ReferenceIndex,
    validator: Validator,
    subscribers: Subscribers,
}

/// Read-only copy of the geometry for visualization.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSnapshot {
    pub nodes: Vec<Node>,
    pub elements: Vec<Element>,
}

impl ModelDocument {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn materials(&self) -> &EntityRegistry<Material> {
        &self.materials
    }

    pub fn sections(&self) -> &EntityRegistry<Section> {
        &self.sections
    }

    pub fn nodes(&self) -> &EntityRegistry<Node> {
        &self.nodes
    }

    pub fn elements(&self) -> &EntityRegistry<Element> {
        &self.elements
    }

    pub fn constraints(&self) -> &EntityRegistry<Constraint> {
        &self.constraints
    }

    pub fn loads(&self) -> &EntityRegistry<Load> {
        &self.loads
    }

    /// Stages in application order
    pub fn stages(&self) -> &EntityRegistry<Stage> {
        &self.stages
    }

    pub fn registry<T: Stored>(&self) -> &EntityRegistry<T> {
        T::registry(self)
    }

    pub fn get<T: Stored>(&self, id: EntityId) -> ModelResult<&T> {
        T::registry(self).get(id)
    }

    /// Entities of one kind in insertion order
    pub fn list<T: Stored>(&self) -> Entities<'_, T> {
        T::registry(self).iter()
    }

    /// Id for a new entity of kind `T`
    pub fn next_id<T: Stored>(&self) -> EntityId {
        T::registry(self).next_id()
    }

    pub fn contains(&self, entity: EntityRef) -> bool {
        let id = entity.id;
        match entity.kind {
            EntityKind::Material => self.materials.contains(id),
            EntityKind::Section => self.sections.contains(id),
            EntityKind::Node => self.nodes.contains(id),
            EntityKind::Element => self.elements.contains(id),
            EntityKind::Constraint => self.constraints.contains(id),
            EntityKind::Load => self.loads.contains(id),
            EntityKind::Stage => self.stages.contains(id),
        }
    }

    /// Total number of entities of every kind
    pub fn len(&self) -> usize {
        self.materials.len()
            + self.sections.len()
            + self.nodes.len()
            + self.elements.len()
            + self.constraints.len()
            + self.loads.len()
            + self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entity, kinds in declaration order, each kind in insertion order.
    pub fn entity_refs(&self) -> impl Iterator<Item = EntityRef> + '_ {
        let materials = self.materials.iter().map(Entity::entity_ref);
        let sections = self.sections.iter().map(Entity::entity_ref);
        let nodes = self.nodes.iter().map(Entity::entity_ref);
        let elements = self.elements.iter().map(Entity::entity_ref);
        let constraints = self.constraints.iter().map(Entity::entity_ref);
        let loads = self.loads.iter().map(Entity::entity_ref);
        let stages = self.stages.iter().map(Entity::entity_ref);
        materials
            .chain(sections)
            .chain(nodes)
            .chain(elements)
            .chain(constraints)
            .chain(loads)
            .chain(stages)
    }

    /// Existing entities that refer to `entity`.
    pub fn dependents_of(&self, entity: EntityRef) -> Vec<EntityRef> {
        self.references
            .dependents_of(entity)
            .filter(|dependent| self.contains(*dependent))
            .collect()
    }

    /// Position of a stage in the stage list
    pub fn stage_position(&self, id: EntityId) -> Option<usize> {
        self.stages.ids().position(|stage| stage == id)
    }

    /// Coordinate count shared by the base-model nodes, if any exist.
    pub fn base_dimension(&self) -> Option<u8> {
        self.validator.context().base_ndm()
    }

    /// Model builder in effect for each stage, in stage order.
    pub fn stage_builders(&self) -> Vec<Option<ModelBuilder>> {
        let context = self.validator.context();
        (0..self.stages.len()).map(|position| context.builder_at(Some(position))).collect()
    }

    /// Stage position at which an entity becomes active. `None` means the
    /// base model for nodes, elements and constraints, and "no stage" for
    /// loads.
    pub fn activation_stage(&self, entity: EntityRef) -> Option<usize> {
        self.validator.context().stage_of(entity)
    }

    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            nodes: self.nodes.iter().cloned().collect(),
            elements: self.elements.iter().cloned().collect(),
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Add a new entity. Fails with `DuplicateId` if the id is taken in its
    /// kind, leaving the document unchanged.
    pub fn add<T: Stored>(&mut self, entity: T) -> ModelResult<EntityId> {
        let me = entity.entity_ref();
        let refs = entity.references();
        T::registry_mut(self).add(entity)?;
        self.references.link(me, &refs);
        self.touch(me);
        self.commit(vec![ChangeEvent::added(me)]);
        Ok(me.id)
    }

    /// Replace an existing entity with a new value of the same id.
    /// Returns the previous value.
    pub fn update<T: Stored>(&mut self, entity: T) -> ModelResult<T> {
        let me = entity.entity_ref();
        let refs = entity.references();
        let previous = T::registry_mut(self).replace(entity)?;
        self.references.unlink(me, &previous.references());
        self.references.link(me, &refs);
        self.touch(me);
        self.commit(vec![ChangeEvent::updated(me)]);
        Ok(previous)
    }

    /// Edit an entity in place through a closure. The id must not change.
    pub fn modify<T: Stored>(&mut self, id: EntityId, edit: impl FnOnce(&mut T)) -> ModelResult<()> {
        let mut entity = T::registry(self).get(id)?.clone();
        edit(&mut entity);
        if entity.id() != id {
            return Err(ModelError::invalid_input(
                format!("{}.id", T::KIND.name().to_lowercase()),
                entity.id().to_string(),
                "An entity's id cannot be changed; remove it and add a new one",
            ));
        }
        self.update(entity).map(|_| ())
    }

    /// Remove an entity.
    ///
    /// Without `force`, fails with `ReferencedByOthers` if anything refers to
    /// it. With `force`, its dependents are removed first, transitively, and
    /// every removal is notified, dependents before the entities they
    /// depended on.
    pub fn remove<T: Stored>(&mut self, id: EntityId, force: bool) -> ModelResult<T> {
        let root = EntityRef::new(T::KIND, id);
        T::registry(self).get(id)?;

        let dependents = self.dependents_of(root);
        if !dependents.is_empty() && !force {
            return Err(ModelError::ReferencedByOthers {
                kind: T::KIND,
                id,
                dependents,
            });
        }

        let order = self.cascade_order(root);
        let mut events = Vec::with_capacity(order.len());
        for entity in order.into_iter().filter(|entity| *entity != root) {
            self.detach(entity)?;
            events.push(ChangeEvent::removed(entity));
        }
        if !events.is_empty() {
            info!(root = %root, cascaded = events.len(), "cascade removal");
        }

        let removed = T::registry_mut(self).take(id)?;
        self.forget(root, &removed.references());
        events.push(ChangeEvent::removed(root));
        self.commit(events);
        Ok(removed)
    }

    /// Kind-erased [`remove`](Self::remove).
    pub fn remove_ref(&mut self, entity: EntityRef, force: bool) -> ModelResult<()> {
        let id = entity.id;
        match entity.kind {
            EntityKind::Material => self.remove::<Material>(id, force).map(|_| ()),
            EntityKind::Section => self.remove::<Section>(id, force).map(|_| ()),
            EntityKind::Node => self.remove::<Node>(id, force).map(|_| ()),
            EntityKind::Element => self.remove::<Element>(id, force).map(|_| ()),
            EntityKind::Constraint => self.remove::<Constraint>(id, force).map(|_| ()),
            EntityKind::Load => self.remove::<Load>(id, force).map(|_| ()),
            EntityKind::Stage => self.remove::<Stage>(id, force).map(|_| ()),
        }
    }

    /// Live dependents of `root`, deepest first, ending with `root`.
    fn cascade_order(&self, root: EntityRef) -> Vec<EntityRef> {
        fn visit(document: &ModelDocument, entity: EntityRef, seen: &mut HashSet<EntityRef>, order: &mut Vec<EntityRef>) {
            if !seen.insert(entity) {
                return;
            }
            for dependent in document.dependents_of(entity) {
                visit(document, dependent, seen, order);
            }
            order.push(entity);
        }

        let mut order = Vec::new();
        visit(self, root, &mut HashSet::new(), &mut order);
        order
    }

    fn detach(&mut self, entity: EntityRef) -> ModelResult<()> {
        let id = entity.id;
        let refs = match entity.kind {
            EntityKind::Material => self.materials.take(id)?.references(),
            EntityKind::Section => self.sections.take(id)?.references(),
            EntityKind::Node => self.nodes.take(id)?.references(),
            EntityKind::Element => self.elements.take(id)?.references(),
            EntityKind::Constraint => self.constraints.take(id)?.references(),
            EntityKind::Load => self.loads.take(id)?.references(),
            EntityKind::Stage => self.stages.take(id)?.references(),
        };
        self.forget(entity, &refs);
        Ok(())
    }

    fn forget(&mut self, entity: EntityRef, refs: &[EntityRef]) {
        self.references.unlink(entity, refs);
        self.touch(entity);
    }

    fn touch(&mut self, entity: EntityRef) {
        self.validator.mark_dirty(entity);
        if entity.kind == EntityKind::Stage {
            self.validator.request_full_sweep();
        }
    }

    fn commit(&mut self, events: Vec<ChangeEvent>) {
        self.run_validation();
        let document: &ModelDocument = self;
        for event in &events {
            debug!(change = ?event.change, entity = %event.entity, "model changed");
            document.subscribers.notify(event, document);
        }
    }

    fn run_validation(&mut self) {
        let mut validator = std::mem::take(&mut self.validator);
        validator.run(self);
        self.validator = validator;
    }

    // ========================================================================
    // Bulk loading
    // ========================================================================

    /// Insert without validation or notification. Used while building a
    /// document from a file; finish with [`finish_loading`](Self::finish_loading).
    pub(crate) fn insert_unchecked<T: Stored>(&mut self, entity: T) -> ModelResult<()> {
        let me = entity.entity_ref();
        let refs = entity.references();
        T::registry_mut(self).add(entity)?;
        self.references.link(me, &refs);
        Ok(())
    }

    pub(crate) fn finish_loading(&mut self) {
        self.validator.request_full_sweep();
        self.run_validation();
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Re-check dirty entities and return every issue, ordered by kind,
    /// then insertion order, then field.
    pub fn validate(&mut self) -> Vec<ValidationIssue> {
        self.run_validation();
        self.issues()
    }

    /// Discard cached results and re-check every entity.
    pub fn validate_full(&mut self) -> Vec<ValidationIssue> {
        self.validator.request_full_sweep();
        self.validate()
    }

    /// Current issues without re-checking. Mutations keep these up to date.
    pub fn issues(&self) -> Vec<ValidationIssue> {
        self.entity_refs()
            .filter_map(|entity| self.validator.issues_for(entity))
            .flat_map(|issues| issues.iter().cloned())
            .collect()
    }

    pub fn is_valid(&self) -> bool {
        self.validator.is_clean()
    }

    /// Fail with the first issue if the model is not valid.
    pub fn require_valid(&self) -> ModelResult<()> {
        match self.issues().first() {
            Some(issue) => Err(issue.to_error()),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Register a callback for change events.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent, &ModelDocument) + Send + Sync + 'static,
    {
        self.subscribers.add(Box::new(callback))
    }

    /// Returns false if the subscription did not exist.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }
}

impl PartialEq for ModelDocument {
    /// Documents are equal when they hold the same entities in the same order.
    fn eq(&self, other: &Self) -> bool {
        self.materials == other.materials
            && self.sections == other.sections
            && self.nodes == other.nodes
            && self.elements == other.elements
            && self.constraints == other.constraints
            && self.loads == other.loads
            && self.stages == other.stages
    }
}

impl fmt::Debug for ModelDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDocument")
            .field("materials", &self.materials.len())
            .field("sections", &self.sections.len())
            .field("nodes", &self.nodes.len())
            .field("elements", &self.elements.len())
            .field("constraints", &self.constraints.len())
            .field("loads", &self.loads.len())
            .field("stages", &self.stages.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::errors::IssueReason;
    use crate::model::{Activation, ElasticSection, ModelBuilder, NodalLoad, StaticAnalysis, Truss};
    use crate::test_support::truss_document;

    fn recorder(document: &mut ModelDocument) -> Arc<Mutex<Vec<ChangeEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        document.subscribe(move |event, _| sink.lock().unwrap().push(*event));
        seen
    }

    #[test]
    fn test_duplicate_add_fails_and_notifies_nobody() {
        let mut doc = truss_document();
        let seen = recorder(&mut doc);
        let err = doc.add(Node::new(1, vec![5.0, 5.0]).unwrap()).unwrap_err();
        assert_eq!(err, ModelError::DuplicateId { kind: EntityKind::Node, id: 1 });
        assert_eq!(doc.get::<Node>(1).unwrap().coords, vec![0.0, 0.0]);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_remove_referenced_node_requires_force() {
        let mut doc = ModelDocument::new();
        doc.add(Node::new(1, vec![0.0, 0.0]).unwrap()).unwrap();
        doc.add(Node::new(2, vec![1.0, 0.0]).unwrap()).unwrap();
        doc.add(Element::new(1, Truss { area: 1.0 }, vec![1, 2], 1, 1).unwrap()).unwrap();
        let seen = recorder(&mut doc);

        let err = doc.remove::<Node>(1, false).unwrap_err();
        match err {
            ModelError::ReferencedByOthers { dependents, .. } => {
                assert_eq!(dependents, vec![EntityRef::new(EntityKind::Element, 1)]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(doc.nodes().contains(1));

        doc.remove::<Node>(1, true).unwrap();
        assert!(!doc.nodes().contains(1));
        assert!(!doc.elements().contains(1));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ChangeEvent::removed(EntityRef::new(EntityKind::Element, 1)),
                ChangeEvent::removed(EntityRef::new(EntityKind::Node, 1)),
            ]
        );
    }

    #[test]
    fn test_cascade_is_transitive() {
        let mut doc = truss_document();
        doc.add(Load::new(1, crate::model::BeamUniform { wy: -1.0, wz: None, wx: None }, 1).unwrap())
            .unwrap();
        doc.add(Stage::new(1, StaticAnalysis::default()).unwrap().with_loads(vec![1]))
            .unwrap();

        doc.remove::<Material>(1, true).unwrap();
        assert!(doc.elements().is_empty());
        assert!(doc.loads().is_empty());
        assert!(doc.stages().is_empty());
        assert_eq!(doc.nodes().len(), 3);
    }

    #[test]
    fn test_subscribers_see_committed_state() {
        let mut doc = truss_document();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        doc.subscribe(move |event, document| {
            sink.lock()
                .unwrap()
                .push((event.entity, document.contains(event.entity), document.is_valid()));
        });

        doc.remove::<Node>(3, true).unwrap();
        let observed = observed.lock().unwrap();
        assert_eq!(observed.len(), 2);
        // Removed entities are gone and the remaining model is consistent.
        assert!(observed.iter().all(|(_, present, valid)| !present && *valid));
    }

    #[test]
    fn test_subscription_order_and_unsubscribe() {
        let mut doc = ModelDocument::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = {
            let order = Arc::clone(&order);
            doc.subscribe(move |_, _| order.lock().unwrap().push("first"))
        };
        {
            let order = Arc::clone(&order);
            doc.subscribe(move |_, _| order.lock().unwrap().push("second"));
        }
        doc.add(Node::new(1, vec![0.0]).unwrap()).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);

        assert!(doc.unsubscribe(first));
        assert!(!doc.unsubscribe(first));
        doc.add(Node::new(2, vec![1.0]).unwrap()).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "second"]);
    }

    #[test]
    fn test_dangling_material_yields_exactly_one_issue() {
        let mut doc = truss_document();
        doc.add(Element::new(3, Truss { area: 0.01 }, vec![1, 3], 99, 1).unwrap())
            .unwrap();
        let issues = doc.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].entity_kind, EntityKind::Element);
        assert_eq!(issues[0].id, 3);
        assert_eq!(issues[0].field, "material");
    }

    #[test]
    fn test_dof_count_mismatch_is_reported_by_validation() {
        let mut doc = ModelDocument::new();
        let node = Node::new(1, vec![0.0, 0.0, 0.0])
            .unwrap()
            .with_fixed_dofs(vec![true, true, true, false]);
        doc.add(node).unwrap();

        let issues = doc.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "fixed_dofs");
        assert_eq!(issues[0].reason, IssueReason::DofCountMismatch { expected: 6, actual: 4 });
    }

    #[test]
    fn test_incremental_validation_follows_references() {
        let mut doc = ModelDocument::new();
        doc.add(Node::new(1, vec![0.0, 0.0]).unwrap()).unwrap();
        doc.add(Load::new(1, NodalLoad { values: vec![1.0, 0.0, 0.0] }, 1).unwrap())
            .unwrap();
        assert!(doc.is_valid());

        doc.update(Load::new(1, NodalLoad { values: vec![1.0, 0.0, 0.0] }, 7).unwrap())
            .unwrap();
        assert_eq!(doc.issues()[0].field, "target");

        // Adding the missing node resolves the dangling reference.
        doc.add(Node::new(7, vec![2.0, 0.0]).unwrap()).unwrap();
        assert!(doc.is_valid());
    }

    #[test]
    fn test_node_dimension_change_rechecks_loads() {
        let mut doc = ModelDocument::new();
        doc.add(Node::new(1, vec![0.0, 0.0]).unwrap()).unwrap();
        doc.add(Node::new(2, vec![1.0, 0.0]).unwrap()).unwrap();
        doc.add(Load::new(1, NodalLoad { values: vec![1.0, 0.0, 0.0] }, 2).unwrap())
            .unwrap();
        assert!(doc.is_valid());

        // Node 1 sets the base dimension; moving it to 3D changes the dof
        // count every base-model load is checked against.
        doc.update(Node::new(1, vec![0.0, 0.0, 0.0]).unwrap()).unwrap();
        assert_eq!(doc.base_dimension(), Some(3));
        let issues = doc.issues();
        let fields: Vec<_> = issues.iter().map(|i| (i.entity_kind, i.id, i.field.as_str())).collect();
        assert_eq!(
            fields,
            vec![(EntityKind::Node, 2, "coords"), (EntityKind::Load, 1, "values")]
        );
    }

    #[test]
    fn test_stage_dimension_override() {
        let mut doc = ModelDocument::new();
        doc.add(Node::new(1, vec![0.0, 0.0]).unwrap()).unwrap();
        doc.add(Node::new(2, vec![0.0, 0.0, 1.0]).unwrap()).unwrap();
        doc.add(
            Stage::new(1, StaticAnalysis::default())
                .unwrap()
                .activating(Activation { nodes: vec![2], ..Activation::default() }),
        )
        .unwrap();

        let issues = doc.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].entity_kind, EntityKind::Stage);
        assert_eq!(issues[0].to_error().error_code(), "STAGE_DIMENSION_MISMATCH");

        doc.modify::<Stage>(1, |stage| stage.builder = ModelBuilder::for_dimension(3))
            .unwrap();
        assert!(doc.is_valid());
    }

    #[test]
    fn test_activation_order() {
        let mut doc = truss_document();
        doc.add(Node::new(4, vec![3.0, 0.0]).unwrap()).unwrap();
        doc.add(Element::new(3, Truss { area: 0.01 }, vec![3, 4], 1, 1).unwrap())
            .unwrap();
        doc.add(Stage::new(1, StaticAnalysis::default()).unwrap()).unwrap();
        doc.add(
            Stage::new(2, StaticAnalysis::default())
                .unwrap()
                .activating(Activation { nodes: vec![4], ..Activation::default() }),
        )
        .unwrap();

        // Element 3 is in the base model but node 4 only arrives in stage 2.
        let issues = doc.validate();
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0].reason, IssueReason::ActivationOrder { target_id: 4, stage_id: 2, .. }));

        doc.modify::<Stage>(2, |stage| stage.activation.elements.push(3)).unwrap();
        assert!(doc.is_valid());
    }

    #[test]
    fn test_modify_cannot_change_id() {
        let mut doc = truss_document();
        let err = doc.modify::<Node>(1, |node| node.id = 50).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert!(doc.nodes().contains(1));
        assert!(!doc.nodes().contains(50));
    }

    #[test]
    fn test_validate_full_matches_incremental() {
        let mut doc = truss_document();
        doc.add(Element::new(3, Truss { area: 0.01 }, vec![1, 9], 1, 4).unwrap())
            .unwrap();
        doc.modify::<Element>(3, |element| element.kind = Truss { area: -1.0 }.into())
            .unwrap();
        let incremental = doc.validate();
        let full = doc.validate_full();
        assert_eq!(incremental, full);
        assert_eq!(full.len(), 3);
    }

    #[test]
    fn test_spatial_sections_need_out_of_plane_constants() {
        let mut doc = ModelDocument::new();
        doc.add(Material::new(1, crate::model::Elastic { e: 200e9 }).unwrap()).unwrap();
        let planar = ElasticSection { e: 200e9, a: 0.01, iz: 1e-5, iy: None, g: None, j: None };
        doc.add(Section::new(1, planar.clone()).unwrap()).unwrap();
        doc.add(Node::new(1, vec![0.0, 0.0, 0.0]).unwrap().fixed()).unwrap();
        doc.add(Node::new(2, vec![3.0, 0.0, 0.0]).unwrap()).unwrap();
        doc.add(Element::new(1, Truss { area: 0.01 }, vec![1, 2], 1, 1).unwrap())
            .unwrap();

        let fields: Vec<_> = doc.issues().iter().map(|i| (i.entity_kind, i.id, i.field.clone())).collect();
        assert_eq!(
            fields,
            vec![
                (EntityKind::Section, 1, "G".to_string()),
                (EntityKind::Section, 1, "J".to_string()),
                (EntityKind::Section, 1, "Iy".to_string()),
            ]
        );
        let err = crate::codegen::CodeGenerator::new()
            .generate(&doc, crate::codegen::Dialect::Tcl)
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        let spatial = ElasticSection { iy: Some(2e-5), g: Some(80e9), j: Some(3e-5), ..planar };
        doc.update(Section::new(1, spatial).unwrap()).unwrap();
        assert!(doc.is_valid(), "{:?}", doc.issues());
        assert!(crate::codegen::CodeGenerator::new()
            .generate(&doc, crate::codegen::Dialect::Tcl)
            .is_ok());
    }

    #[test]
    fn test_planar_model_accepts_planar_sections() {
        let doc = truss_document();
        assert!(doc.is_valid(), "{:?}", doc.issues());
    }

    #[test]
    fn test_snapshot_and_next_id() {
        let doc = truss_document();
        let snapshot = doc.snapshot();
        assert_eq!(snapshot.nodes.len(), 3);
        assert_eq!(snapshot.elements.len(), 2);
        assert_eq!(doc.next_id::<Node>(), 4);
        assert_eq!(doc.list::<Element>().count(), 2);
    }
}
