//! # Constraints
//!
//! Boundary conditions beyond a node's own fixity flags. The dof pattern
//! has the same layout as a node's fixed-dof vector.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ModelError, ModelResult};
use crate::model::catalog::{check_payload, tagged_kind, take_property, FieldProblem, Payload, Properties};
use crate::model::{check_id, Entity, EntityId, EntityKind, EntityRef};

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub id: EntityId,
    pub name: Option<String>,
    /// Target nodes. For `EqualDof` the first node is the retained node.
    pub nodes: Vec<EntityId>,
    pub kind: ConstraintKind,
}

impl Constraint {
    pub fn new(id: EntityId, kind: impl Into<ConstraintKind>, nodes: Vec<EntityId>) -> ModelResult<Self> {
        check_id(EntityKind::Constraint, id)?;
        if nodes.is_empty() {
            return Err(ModelError::invalid_input(
                "constraint.nodes",
                "[]",
                "A constraint needs at least one target node",
            ));
        }
        let kind: ConstraintKind = kind.into();
        check_payload(EntityKind::Constraint, id, kind.problems())?;
        Ok(Constraint {
            id,
            name: None,
            nodes,
            kind,
        })
    }

    pub fn from_properties(id: EntityId, tag: &str, name: Option<String>, properties: &Properties) -> ModelResult<Self> {
        check_id(EntityKind::Constraint, id)?;
        let mut properties = properties.clone();
        let nodes = take_property(&mut properties, EntityKind::Constraint, id, "nodes")?;
        let kind = ConstraintKind::catalog().construct(id, tag, &properties)?;
        Ok(Constraint { id, name, nodes, kind })
    }

    pub fn to_properties(&self) -> Properties {
        let mut properties = self.kind.properties();
        properties.insert("nodes".into(), Value::from(self.nodes.clone()));
        properties
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Entity for Constraint {
    const KIND: EntityKind = EntityKind::Constraint;

    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    fn references(&self) -> Vec<EntityRef> {
        self.nodes
            .iter()
            .map(|node| EntityRef::new(EntityKind::Node, *node))
            .collect()
    }
}

tagged_kind! {
    pub enum ConstraintKind for EntityKind::Constraint {
        Fix(Fix),
        EqualDof(EqualDof),
    }
}

impl ConstraintKind {
    /// Fixed-dof pattern of the constraint
    pub fn dofs(&self) -> &[bool] {
        match self {
            ConstraintKind::Fix(fix) => &fix.dofs,
            ConstraintKind::EqualDof(equal) => &equal.dofs,
        }
    }

    /// Whether `count` target nodes is acceptable, with a description of
    /// what is expected otherwise.
    pub fn check_node_count(&self, count: usize) -> Result<(), &'static str> {
        match self {
            ConstraintKind::Fix(_) if count != 1 => Err("exactly 1"),
            ConstraintKind::EqualDof(_) if count < 2 => Err("at least 2"),
            _ => Ok(()),
        }
    }
}

/// Single-point restraint of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fix {
    pub dofs: Vec<bool>,
}

impl Payload for Fix {
    type Kind = ConstraintKind;
    const TAG: &'static str = "Fix";

    fn check(&self) -> Vec<FieldProblem> {
        if self.dofs.is_empty() {
            return vec![FieldProblem::new("dofs", "dof pattern must not be empty")];
        }
        Vec::new()
    }
}

/// Ties the flagged dofs of the constrained nodes to the retained node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EqualDof {
    pub dofs: Vec<bool>,
}

impl Payload for EqualDof {
    type Kind = ConstraintKind;
    const TAG: &'static str = "EqualDof";

    fn check(&self) -> Vec<FieldProblem> {
        if !self.dofs.iter().any(|flag| *flag) {
            return vec![FieldProblem::new("dofs", "at least one dof must be tied")];
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_count_rules() {
        let fix = ConstraintKind::from(Fix { dofs: vec![true; 6] });
        assert!(fix.check_node_count(1).is_ok());
        assert_eq!(fix.check_node_count(2), Err("exactly 1"));

        let equal = ConstraintKind::from(EqualDof { dofs: vec![true, false, false, false] });
        assert!(equal.check_node_count(3).is_ok());
        assert_eq!(equal.check_node_count(1), Err("at least 2"));
    }

    #[test]
    fn test_properties_roundtrip() {
        let constraint = Constraint::new(2, EqualDof { dofs: vec![true, true, false, false] }, vec![4, 5]).unwrap();
        let rebuilt = Constraint::from_properties(2, "EqualDof", None, &constraint.to_properties()).unwrap();
        assert_eq!(constraint, rebuilt);
        assert_eq!(rebuilt.references().len(), 2);
    }

    #[test]
    fn test_equal_dof_requires_a_tied_dof() {
        assert!(!EqualDof { dofs: vec![false; 6] }.check().is_empty());
    }
}
