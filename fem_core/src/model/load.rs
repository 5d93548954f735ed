//! # Loads
//!
//! Loads act on a node or an element depending on their type. Which stage
//! applies a load is decided by the stage's `load_ids`, not by the load.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ModelResult;
use crate::model::catalog::{check_payload, require_finite, tagged_kind, take_property, FieldProblem, Payload, Properties};
use crate::model::{check_id, Entity, EntityId, EntityKind, EntityRef};

#[derive(Debug, Clone, PartialEq)]
pub struct Load {
    pub id: EntityId,
    pub name: Option<String>,
    /// Target node or element, depending on `kind`
    pub target: EntityId,
    pub kind: LoadKind,
}

impl Load {
    pub fn new(id: EntityId, kind: impl Into<LoadKind>, target: EntityId) -> ModelResult<Self> {
        check_id(EntityKind::Load, id)?;
        let kind: LoadKind = kind.into();
        check_payload(EntityKind::Load, id, kind.problems())?;
        Ok(Load {
            id,
            name: None,
            target,
            kind,
        })
    }

    pub fn from_properties(id: EntityId, tag: &str, name: Option<String>, properties: &Properties) -> ModelResult<Self> {
        check_id(EntityKind::Load, id)?;
        let mut properties = properties.clone();
        let target = take_property(&mut properties, EntityKind::Load, id, "target")?;
        let kind = LoadKind::catalog().construct(id, tag, &properties)?;
        Ok(Load { id, name, target, kind })
    }

    pub fn to_properties(&self) -> Properties {
        let mut properties = self.kind.properties();
        properties.insert("target".into(), Value::from(self.target));
        properties
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The entity this load acts on
    pub fn target_ref(&self) -> EntityRef {
        EntityRef::new(self.kind.target_kind(), self.target)
    }
}

impl Entity for Load {
    const KIND: EntityKind = EntityKind::Load;

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
        vec![self.target_ref()]
    }
}

tagged_kind! {
    pub enum LoadKind for EntityKind::Load {
        NodalLoad(NodalLoad),
        ImposedDisplacement(ImposedDisplacement),
        BeamUniform(BeamUniform),
    }
}

impl LoadKind {
    /// Kind of entity the load targets
    pub fn target_kind(&self) -> EntityKind {
        match self {
            LoadKind::NodalLoad(_) | LoadKind::ImposedDisplacement(_) => EntityKind::Node,
            LoadKind::BeamUniform(_) => EntityKind::Element,
        }
    }
}

/// Nodal force/moment vector, one value per builder dof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodalLoad {
    pub values: Vec<f64>,
}

impl Payload for NodalLoad {
    type Kind = LoadKind;
    const TAG: &'static str = "NodalLoad";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        if self.values.is_empty() {
            problems.push(FieldProblem::new("values", "load vector must not be empty"));
        }
        for value in &self.values {
            require_finite(&mut problems, "values", *value);
        }
        problems
    }
}

/// Prescribed displacement of one dof (1-based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImposedDisplacement {
    pub dof: usize,
    pub value: f64,
}

impl Payload for ImposedDisplacement {
    type Kind = LoadKind;
    const TAG: &'static str = "ImposedDisplacement";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        if self.dof == 0 {
            problems.push(FieldProblem::new("dof", "dof numbers start at 1"));
        }
        require_finite(&mut problems, "value", self.value);
        problems
    }
}

/// Uniform distributed load in element local axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeamUniform {
    pub wy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wz: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wx: Option<f64>,
}

impl Payload for BeamUniform {
    type Kind = LoadKind;
    const TAG: &'static str = "BeamUniform";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        require_finite(&mut problems, "wy", self.wy);
        if let Some(wz) = self.wz {
            require_finite(&mut problems, "wz", wz);
        }
        if let Some(wx) = self.wx {
            require_finite(&mut problems, "wx", wx);
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind_follows_type() {
        let nodal = Load::new(1, NodalLoad { values: vec![0.0, -10.0, 0.0] }, 3).unwrap();
        assert_eq!(nodal.target_ref(), EntityRef::new(EntityKind::Node, 3));

        let beam = Load::new(2, BeamUniform { wy: -5.0, wz: None, wx: None }, 7).unwrap();
        assert_eq!(beam.references(), vec![EntityRef::new(EntityKind::Element, 7)]);
    }

    #[test]
    fn test_properties_roundtrip() {
        let load = Load::new(4, ImposedDisplacement { dof: 2, value: 0.01 }, 9).unwrap().with_name("settlement");
        let rebuilt = Load::from_properties(4, "ImposedDisplacement", Some("settlement".into()), &load.to_properties()).unwrap();
        assert_eq!(load, rebuilt);
    }

    #[test]
    fn test_checks() {
        assert!(!NodalLoad { values: vec![] }.check().is_empty());
        assert!(!ImposedDisplacement { dof: 0, value: 1.0 }.check().is_empty());
    }
}
