//! # Elements
//!
//! Elements connect an ordered list of nodes and refer to one material and one
//! section. In a project record the references travel inside `properties`
//! next to the type-specific payload:
//!
//! ```text
//! { "id": 1, "type": "Truss",
//!   "properties": { "nodes": [1, 2], "material": 1, "section": 1, "area": 0.01 } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ModelResult;
use crate::model::catalog::{check_payload, require_positive, tagged_kind, take_property, FieldProblem, Payload, Properties};
use crate::model::{check_id, Entity, EntityId, EntityKind, EntityRef};

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: EntityId,
    pub name: Option<String>,
    pub nodes: Vec<EntityId>,
    pub material: EntityId,
    pub section: EntityId,
    pub kind: ElementKind,
}

impl Element {
    /// Create an element. The node list must not be empty; whether it has the
    /// right length for the element type is checked by validation.
    pub fn new(
        id: EntityId,
        kind: impl Into<ElementKind>,
        nodes: Vec<EntityId>,
        material: EntityId,
        section: EntityId,
    ) -> ModelResult<Self> {
        check_id(EntityKind::Element, id)?;
        if nodes.is_empty() {
            return Err(crate::errors::ModelError::invalid_input(
                "element.nodes",
                "[]",
                "An element needs at least one node",
            ));
        }
        let kind: ElementKind = kind.into();
        check_payload(EntityKind::Element, id, kind.problems())?;
        Ok(Element {
            id,
            name: None,
            nodes,
            material,
            section,
            kind,
        })
    }

    /// Create an element from a project record's tag and property map.
    pub fn from_properties(id: EntityId, tag: &str, name: Option<String>, properties: &Properties) -> ModelResult<Self> {
        check_id(EntityKind::Element, id)?;
        let mut properties = properties.clone();
        let nodes: Vec<EntityId> = take_property(&mut properties, EntityKind::Element, id, "nodes")?;
        let material = take_property(&mut properties, EntityKind::Element, id, "material")?;
        let section = take_property(&mut properties, EntityKind::Element, id, "section")?;
        let kind = ElementKind::catalog().construct(id, tag, &properties)?;
        Ok(Element {
            id,
            name,
            nodes,
            material,
            section,
            kind,
        })
    }

    /// Property map of a project record: payload plus references.
    pub fn to_properties(&self) -> Properties {
        let mut properties = self.kind.properties();
        properties.insert("nodes".into(), Value::from(self.nodes.clone()));
        properties.insert("material".into(), Value::from(self.material));
        properties.insert("section".into(), Value::from(self.section));
        properties
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Entity for Element {
    const KIND: EntityKind = EntityKind::Element;

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
        let mut refs: Vec<EntityRef> = self
            .nodes
            .iter()
            .map(|node| EntityRef::new(EntityKind::Node, *node))
            .collect();
        refs.push(EntityRef::new(EntityKind::Material, self.material));
        refs.push(EntityRef::new(EntityKind::Section, self.section));
        refs
    }
}

tagged_kind! {
    /// Closed set of element formulations.
    pub enum ElementKind for EntityKind::Element {
        Truss(Truss),
        ElasticBeamColumn(ElasticBeamColumn),
        DispBeamColumn(DispBeamColumn),
        Quad(Quad),
        StdBrick(StdBrick),
    }
}

impl ElementKind {
    /// Number of nodes the formulation connects
    pub fn node_count(&self) -> usize {
        match self {
            ElementKind::Truss(_) | ElementKind::ElasticBeamColumn(_) | ElementKind::DispBeamColumn(_) => 2,
            ElementKind::Quad(_) => 4,
            ElementKind::StdBrick(_) => 8,
        }
    }

    /// Line elements with flexural stiffness (accept beam loads)
    pub fn is_beam_column(&self) -> bool {
        matches!(self, ElementKind::ElasticBeamColumn(_) | ElementKind::DispBeamColumn(_))
    }

    /// Continuum elements need a multi-dimensional material
    pub fn is_continuum(&self) -> bool {
        matches!(self, ElementKind::Quad(_) | ElementKind::StdBrick(_))
    }
}

/// Geometric transformation of a beam-column's local axes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeomTransform {
    #[default]
    Linear,
    PDelta,
    Corotational,
}

impl GeomTransform {
    pub fn name(&self) -> &'static str {
        match self {
            GeomTransform::Linear => "Linear",
            GeomTransform::PDelta => "PDelta",
            GeomTransform::Corotational => "Corotational",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaneType {
    #[default]
    PlaneStress,
    PlaneStrain,
}

impl PlaneType {
    pub fn name(&self) -> &'static str {
        match self {
            PlaneType::PlaneStress => "PlaneStress",
            PlaneType::PlaneStrain => "PlaneStrain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Truss {
    pub area: f64,
}

impl Payload for Truss {
    type Kind = ElementKind;
    const TAG: &'static str = "Truss";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        require_positive(&mut problems, "area", self.area);
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElasticBeamColumn {
    #[serde(default)]
    pub transform: GeomTransform,
    /// Vector in the local x-z plane; 3D models only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vecxz: Option<[f64; 3]>,
}

impl Payload for ElasticBeamColumn {
    type Kind = ElementKind;
    const TAG: &'static str = "ElasticBeamColumn";

    fn check(&self) -> Vec<FieldProblem> {
        check_vecxz(self.vecxz)
    }
}

fn default_integration_points() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispBeamColumn {
    #[serde(default = "default_integration_points")]
    pub integration_points: u32,
    #[serde(default)]
    pub transform: GeomTransform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vecxz: Option<[f64; 3]>,
}

impl Payload for DispBeamColumn {
    type Kind = ElementKind;
    const TAG: &'static str = "DispBeamColumn";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = check_vecxz(self.vecxz);
        if !(2..=10).contains(&self.integration_points) {
            problems.push(FieldProblem::new(
                "integration_points",
                format!("integration points must be between 2 and 10, got {}", self.integration_points),
            ));
        }
        problems
    }
}

fn check_vecxz(vecxz: Option<[f64; 3]>) -> Vec<FieldProblem> {
    match vecxz {
        Some(v) if v.iter().any(|c| !c.is_finite()) || v.iter().all(|c| *c == 0.0) => {
            vec![FieldProblem::new("vecxz", "orientation vector must be finite and non-zero")]
        }
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Quad {
    pub thickness: f64,
    #[serde(default)]
    pub plane: PlaneType,
}

impl Payload for Quad {
    type Kind = ElementKind;
    const TAG: &'static str = "Quad";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        require_positive(&mut problems, "thickness", self.thickness);
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdBrick {}

impl Payload for StdBrick {
    type Kind = ElementKind;
    const TAG: &'static str = "StdBrick";
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_references_in_field_order() {
        let element = Element::new(1, Truss { area: 0.01 }, vec![1, 2], 5, 6).unwrap();
        let refs = element.references();
        assert_eq!(refs.len(), 4);
        assert_eq!(refs[0], EntityRef::new(EntityKind::Node, 1));
        assert_eq!(refs[2], EntityRef::new(EntityKind::Material, 5));
        assert_eq!(refs[3], EntityRef::new(EntityKind::Section, 6));
    }

    #[test]
    fn test_properties_roundtrip() {
        let element = Element::new(
            3,
            DispBeamColumn {
                integration_points: 4,
                transform: GeomTransform::PDelta,
                vecxz: None,
            },
            vec![1, 2],
            1,
            1,
        )
        .unwrap()
        .with_name("girder");
        let properties = element.to_properties();
        assert_eq!(properties["nodes"], json!([1, 2]));
        let rebuilt = Element::from_properties(3, element.type_tag(), Some("girder".into()), &properties).unwrap();
        assert_eq!(element, rebuilt);
    }

    #[test]
    fn test_missing_reference_names_the_field() {
        let properties = match json!({"nodes": [1, 2], "section": 1, "area": 1.0}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let err = Element::from_properties(9, "Truss", None, &properties).unwrap_err();
        match err {
            crate::errors::ModelError::ValidationError { field, id, .. } => {
                assert_eq!(field, "material");
                assert_eq!(id, 9);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_typed_constructor_checks_payload() {
        let err = Element::new(4, Truss { area: -1.0 }, vec![1, 2], 1, 1).unwrap_err();
        match err {
            crate::errors::ModelError::ValidationError { entity_kind, id, field, .. } => {
                assert_eq!(entity_kind, EntityKind::Element);
                assert_eq!(id, 4);
                assert_eq!(field, "area");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let properties = match json!({"nodes": [1, 2], "material": 1, "section": 1, "area": -1.0}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let from_map = Element::from_properties(4, "Truss", None, &properties).unwrap_err();
        assert_eq!(from_map, Element::new(4, Truss { area: -1.0 }, vec![1, 2], 1, 1).unwrap_err());
    }

    #[test]
    fn test_defaults_apply_when_omitted() {
        let kind = ElementKind::catalog()
            .construct(1, "DispBeamColumn", &Properties::new())
            .unwrap();
        match kind {
            ElementKind::DispBeamColumn(payload) => {
                assert_eq!(payload.integration_points, 5);
                assert_eq!(payload.transform, GeomTransform::Linear);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn test_node_counts() {
        assert_eq!(ElementKind::from(Quad { thickness: 0.1, plane: PlaneType::PlaneStrain }).node_count(), 4);
        assert_eq!(ElementKind::from(StdBrick {}).node_count(), 8);
        assert!(ElementKind::from(ElasticBeamColumn { transform: GeomTransform::Linear, vecxz: None }).is_beam_column());
    }
}
