//! Record types of the current project file layout.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::ModelDocument;
use crate::errors::{ModelError, ModelResult};
use crate::model::catalog::Properties;
use crate::model::{Entity, EntityId, Node, Stage, STAGE_RECORD_TYPE};
use crate::project::ProjectMetadata;

/// A whole project file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub metadata: ProjectMetadata,
    pub model: ModelTree,
    #[serde(default = "empty_object")]
    pub app_settings: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// One array per entity kind, each in registry order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelTree {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub elements: Vec<EntityRecord>,
    #[serde(default)]
    pub materials: Vec<EntityRecord>,
    #[serde(default)]
    pub sections: Vec<EntityRecord>,
    #[serde(default)]
    pub constraints: Vec<EntityRecord>,
    #[serde(default)]
    pub loads: Vec<EntityRecord>,
    #[serde(default)]
    pub stages: Vec<StageRecord>,
}

impl ModelTree {
    /// Records of every entity in `document`, each kind in registry order.
    pub fn from_document(document: &ModelDocument) -> ModelResult<Self> {
        Ok(ModelTree {
            nodes: document.nodes().iter().map(NodeRecord::from_node).collect::<ModelResult<_>>()?,
            elements: document
                .elements()
                .iter()
                .map(|element| EntityRecord::new(element, element.to_properties()))
                .collect(),
            materials: document
                .materials()
                .iter()
                .map(|material| EntityRecord::new(material, material.kind.properties()))
                .collect(),
            sections: document
                .sections()
                .iter()
                .map(|section| EntityRecord::new(section, section.kind.properties()))
                .collect(),
            constraints: document
                .constraints()
                .iter()
                .map(|constraint| EntityRecord::new(constraint, constraint.to_properties()))
                .collect(),
            loads: document
                .loads()
                .iter()
                .map(|load| EntityRecord::new(load, load.to_properties()))
                .collect(),
            stages: document.stages().iter().map(StageRecord::from_stage).collect(),
        })
    }
}

/// Nodes carry their coordinates and fixity directly instead of a property map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub x: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// Fixed-dof flags
    #[serde(default)]
    pub dofs: Vec<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass: Option<Vec<f64>>,
}

impl NodeRecord {
    pub fn from_node(node: &Node) -> ModelResult<Self> {
        let (x, y, z) = match node.coords.as_slice() {
            [x] => (*x, None, None),
            [x, y] => (*x, Some(*y), None),
            [x, y, z] => (*x, Some(*y), Some(*z)),
            coords => {
                return Err(ModelError::validation(
                    Node::KIND,
                    node.id,
                    "coords",
                    format!("a project file stores 1 to 3 coordinates, node has {}", coords.len()),
                ))
            }
        };
        Ok(NodeRecord {
            id: node.id,
            name: node.name.clone(),
            x,
            y,
            z,
            dofs: node.fixed_dofs.clone(),
            mass: node.mass.clone(),
        })
    }

    pub fn to_node(&self) -> ModelResult<Node> {
        let coords = match (self.y, self.z) {
            (None, None) => vec![self.x],
            (Some(y), None) => vec![self.x, y],
            (Some(y), Some(z)) => vec![self.x, y, z],
            (None, Some(_)) => {
                return Err(ModelError::validation(Node::KIND, self.id, "y", "z is given without y"));
            }
        };
        let mut node = Node::new(self.id, coords)?.with_fixed_dofs(self.dofs.clone());
        node.name = self.name.clone();
        node.mass = self.mass.clone();
        Ok(node)
    }
}

/// Generic record for materials, sections, elements, constraints and loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl EntityRecord {
    pub fn new<E: Entity>(entity: &E, properties: Properties) -> Self {
        EntityRecord {
            id: entity.id(),
            type_tag: entity.type_tag().to_string(),
            name: entity.name().map(str::to_string),
            properties,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: EntityId,
    /// Always [`STAGE_RECORD_TYPE`]
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub analysis_type: String,
    #[serde(default)]
    pub load_ids: Vec<EntityId>,
    #[serde(default)]
    pub properties: Properties,
}

impl StageRecord {
    pub fn from_stage(stage: &Stage) -> Self {
        StageRecord {
            id: stage.id,
            type_tag: STAGE_RECORD_TYPE.to_string(),
            name: stage.name.clone(),
            analysis_type: stage.type_tag().to_string(),
            load_ids: stage.load_ids.clone(),
            properties: stage.to_properties(),
        }
    }

    pub fn to_stage(&self) -> ModelResult<Stage> {
        if self.type_tag != STAGE_RECORD_TYPE {
            return Err(ModelError::invalid_input(
                "stage.type",
                self.type_tag.clone(),
                format!("Stage records must have type \"{}\"", STAGE_RECORD_TYPE),
            ));
        }
        Stage::from_properties(
            self.id,
            &self.analysis_type,
            self.name.clone(),
            self.load_ids.clone(),
            &self.properties,
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_node_record_layout() {
        let node = Node::new(7, vec![1.5, -2.0]).unwrap().fixed();
        let record = NodeRecord::from_node(&node).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({ "id": 7, "x": 1.5, "y": -2.0, "dofs": [true, true, true, true] })
        );
        assert_eq!(record.to_node().unwrap(), node);
    }

    #[test]
    fn test_node_record_rejects_z_without_y() {
        let record: NodeRecord = serde_json::from_value(json!({ "id": 1, "x": 0.0, "z": 1.0 })).unwrap();
        assert_eq!(record.to_node().unwrap_err().error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_stage_record_requires_stage_type() {
        let record: StageRecord = serde_json::from_value(json!({
            "id": 1,
            "type": "Static",
            "analysis_type": "Static",
        }))
        .unwrap();
        assert_eq!(record.to_stage().unwrap_err().error_code(), "INVALID_INPUT");
    }
}
