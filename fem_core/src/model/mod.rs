//! # Model Entities
//!
//! The seven entity kinds that make up a structural model, plus the shared
//! identity types every registry is keyed on.
//!
//! ## Structure
//!
//! ```text
//! Material ─┐
//! Section ──┼─< Element >── Node
//!           │      ^          ^
//!           │      │          │
//!           └── Load (Node or Element target)     Constraint ──> Node
//!                  ^
//!                Stage (load ids, activation lists)
//! ```
//!
//! Every entity is identified by a positive integer id that is unique within
//! its kind only. A node and an element may share id `1`; two nodes may not.
//!
//! Kinds with more than one concrete form (materials, sections, elements,
//! constraints, loads and stage analyses) carry a closed tagged variant with a
//! strongly typed payload. See [`catalog`] for how a `type` tag and a property
//! map become a payload.

pub mod catalog;
pub mod constraint;
pub mod element;
pub mod load;
pub mod material;
pub mod node;
pub mod section;
pub mod stage;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ModelError, ModelResult};

pub use constraint::{Constraint, ConstraintKind, EqualDof, Fix};
pub use element::{
    DispBeamColumn, ElasticBeamColumn, Element, ElementKind, GeomTransform, PlaneType, Quad,
    StdBrick, Truss,
};
pub use load::{BeamUniform, ImposedDisplacement, Load, LoadKind, NodalLoad};
pub use material::{Concrete01, Elastic, ElasticIsotropic, Material, MaterialKind, Steel01};
pub use node::{builder_dof_count, fixed_dof_count, Node};
pub use section::{
    CircularSection, ElasticSection, RectangularSection, Section, SectionKind, SectionProperties,
};
pub use stage::{
    Activation, AnalysisKind, Eigen, ModelBuilder, Stage, StaticAnalysis, Transient, STAGE_RECORD_TYPE,
};

/// Identifier of an entity within its kind. Always positive.
pub type EntityId = u64;

/// The kinds of entity a model document holds.
///
/// Variant order is the declaration order used by script generation and by
/// ordered validation output: materials, sections, nodes, elements,
/// constraints, loads, stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Material,
    Section,
    Node,
    Element,
    Constraint,
    Load,
    Stage,
}

impl EntityKind {
    /// All kinds in declaration order.
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Material,
        EntityKind::Section,
        EntityKind::Node,
        EntityKind::Element,
        EntityKind::Constraint,
        EntityKind::Load,
        EntityKind::Stage,
    ];

    /// Display name of the kind
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Material => "Material",
            EntityKind::Section => "Section",
            EntityKind::Node => "Node",
            EntityKind::Element => "Element",
            EntityKind::Constraint => "Constraint",
            EntityKind::Load => "Load",
            EntityKind::Stage => "Stage",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A weak reference to an entity: its kind and id.
///
/// References may dangle while a model is being edited. Validation reports
/// the ones that do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: EntityId) -> Self {
        EntityRef { kind, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Behaviour shared by every entity stored in an
/// [`EntityRegistry`](crate::registry::EntityRegistry).
pub trait Entity: Clone + fmt::Debug + PartialEq {
    /// The kind this entity type belongs to
    const KIND: EntityKind;

    /// Id of the entity within its kind
    fn id(&self) -> EntityId;

    /// Optional display name
    fn name(&self) -> Option<&str>;

    /// Tag used for emitter lookup. Except for stages it is also the
    /// `type` field of the project record.
    fn type_tag(&self) -> &'static str;

    /// Every entity this one refers to, in field order.
    fn references(&self) -> Vec<EntityRef>;

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::KIND, self.id())
    }
}

/// Reject the zero id at construction time.
pub(crate) fn check_id(kind: EntityKind, id: EntityId) -> ModelResult<()> {
    if id == 0 {
        return Err(ModelError::invalid_input(
            format!("{}.id", kind.name().to_lowercase()),
            "0",
            "Entity ids must be positive integers",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_order_matches_declaration_order() {
        let mut kinds = EntityKind::ALL.to_vec();
        kinds.reverse();
        kinds.sort();
        assert_eq!(kinds, EntityKind::ALL.to_vec());
        assert!(EntityKind::Material < EntityKind::Element);
        assert!(EntityKind::Node < EntityKind::Element);
    }

    #[test]
    fn test_entity_ref_display() {
        let r = EntityRef::new(EntityKind::Element, 7);
        assert_eq!(r.to_string(), "Element 7");
    }

    #[test]
    fn test_zero_id_rejected() {
        let err = check_id(EntityKind::Node, 0).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
        assert!(check_id(EntityKind::Node, 1).is_ok());
    }
}
