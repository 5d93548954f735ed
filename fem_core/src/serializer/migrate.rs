//! # Schema Migration
//!
//! Older project trees are upgraded by an ordered chain of pure JSON
//! transforms, one per schema version, before they are parsed. Versions are
//! compared on major.minor; patch releases never change the layout.
//!
//! | Version | Layout |
//! |---|---|
//! | 1.0 | entity arrays at the root, `<kind>_type` tags, `coordinates` arrays, references beside `properties`, stages wrapped in `{stages, current_stage_id}` |
//! | 1.1 | arrays under `model`, `{id, type, name?, properties}` records, node `x/y/z/dofs`; stages still wrapped |
//! | 1.2 | flat stage records with `analysis_type`, `load_ids` and activation lists in `properties.activate` |

use semver::Version;
use serde_json::{json, Map, Value};
use tracing::info;

use crate::errors::{ModelError, ModelResult};
use crate::model::fixed_dof_count;
use crate::project::SCHEMA_VERSION;

/// One upgrade step: a pure transform from one schema version to the next.
#[derive(Debug, Clone)]
pub struct Migration {
    pub from: Version,
    pub to: Version,
    pub apply: fn(Value) -> Result<Value, String>,
}

#[derive(Debug, Clone)]
pub struct MigrationChain {
    steps: Vec<Migration>,
    current: Version,
}

impl Default for MigrationChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl MigrationChain {
    /// The chain from the oldest supported layout to [`SCHEMA_VERSION`].
    pub fn standard() -> Self {
        MigrationChain {
            steps: vec![
                Migration {
                    from: Version::new(1, 0, 0),
                    to: Version::new(1, 1, 0),
                    apply: flatten_legacy_layout,
                },
                Migration {
                    from: Version::new(1, 1, 0),
                    to: Version::new(1, 2, 0),
                    apply: unwrap_stage_list,
                },
            ],
            current: current_version(),
        }
    }

    pub fn current(&self) -> &Version {
        &self.current
    }

    /// Upgrade `tree` to the current version.
    ///
    /// Fails with `UnsupportedVersion` for newer or unknown versions and with
    /// `MigrationFailed` if a step rejects the tree. Either way nothing is
    /// returned but the error.
    pub fn upgrade(&self, mut tree: Value) -> ModelResult<Value> {
        let found = file_version(&tree)?;
        let mut version = found.clone();
        while !same_schema(&version, &self.current) {
            if minor_key(&version) > minor_key(&self.current) {
                return Err(self.unsupported(&found));
            }
            let step = self
                .steps
                .iter()
                .find(|step| same_schema(&step.from, &version))
                .ok_or_else(|| self.unsupported(&found))?;

            tree = (step.apply)(tree).map_err(|reason| ModelError::MigrationFailed {
                from: step.from.to_string(),
                to: step.to.to_string(),
                reason,
            })?;
            set_version(&mut tree, &step.to);
            version = step.to.clone();
        }

        if found != version {
            info!(from = %found, to = %version, "upgraded project file");
        }
        Ok(tree)
    }

    fn unsupported(&self, found: &Version) -> ModelError {
        ModelError::UnsupportedVersion {
            file_version: found.to_string(),
            supported: self.current.to_string(),
        }
    }
}

fn current_version() -> Version {
    Version::parse(SCHEMA_VERSION).unwrap_or_else(|_| Version::new(1, 2, 0))
}

fn minor_key(version: &Version) -> (u64, u64) {
    (version.major, version.minor)
}

fn same_schema(a: &Version, b: &Version) -> bool {
    minor_key(a) == minor_key(b)
}

/// Schema version declared by a project tree.
///
/// Legacy files wrote `metadata.version`, sometimes as `major.minor`.
pub fn file_version(tree: &Value) -> ModelResult<Version> {
    let metadata = tree.get("metadata");
    let declared = metadata
        .and_then(|m| m.get("file_format_version").or_else(|| m.get("version")))
        .and_then(Value::as_str)
        .ok_or_else(|| ModelError::UnsupportedVersion {
            file_version: "missing".to_string(),
            supported: SCHEMA_VERSION.to_string(),
        })?;

    Version::parse(declared)
        .or_else(|_| Version::parse(&format!("{declared}.0")))
        .map_err(|_| ModelError::UnsupportedVersion {
            file_version: declared.to_string(),
            supported: SCHEMA_VERSION.to_string(),
        })
}

fn set_version(tree: &mut Value, version: &Version) {
    if let Some(metadata) = tree.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.remove("version");
        metadata.insert("file_format_version".into(), Value::String(version.to_string()));
    }
}

// ============================================================================
// 1.0 -> 1.1
// ============================================================================

/// Legacy field names and the keys they move to.
type ReferenceMoves = &'static [(&'static str, &'static str)];

const LEGACY_KINDS: [(&str, &str, ReferenceMoves); 5] = [
    ("materials", "material_type", &[]),
    ("sections", "section_type", &[]),
    (
        "elements",
        "element_type",
        &[("nodes", "nodes"), ("material_id", "material"), ("section_id", "section")],
    ),
    ("constraints", "constraint_type", &[("nodes", "nodes")]),
    ("loads", "load_type", &[("target", "target")]),
];

fn flatten_legacy_layout(tree: Value) -> Result<Value, String> {
    let Value::Object(mut root) = tree else {
        return Err("project root is not an object".to_string());
    };

    let mut metadata = take_object(&mut root, "metadata")?;
    if let Some(name) = metadata.remove("name") {
        if !name.is_null() {
            metadata.entry("description").or_insert(name);
        }
    }
    if !metadata.contains_key("modified_at") {
        let created = metadata
            .get("created_at")
            .cloned()
            .ok_or("metadata.created_at is missing")?;
        metadata.insert("modified_at".into(), created);
    }
    metadata.entry("file_path").or_insert(Value::Null);

    let mut model = Map::new();
    let nodes = take_array(&mut root, "nodes")?
        .into_iter()
        .map(legacy_node)
        .collect::<Result<Vec<_>, _>>()?;
    model.insert("nodes".into(), Value::Array(nodes));

    for (kind, tag_key, moves) in LEGACY_KINDS {
        let records = take_array(&mut root, kind)?
            .into_iter()
            .map(|record| legacy_record(record, kind, tag_key, moves))
            .collect::<Result<Vec<_>, _>>()?;
        model.insert(kind.into(), Value::Array(records));
    }
    model.insert(
        "stages".into(),
        root.remove("stages").unwrap_or_else(|| json!({ "stages": [] })),
    );

    let mut upgraded = Map::new();
    upgraded.insert("metadata".into(), Value::Object(metadata));
    upgraded.insert("model".into(), Value::Object(model));
    upgraded.insert("app_settings".into(), root.remove("app_settings").unwrap_or_else(|| json!({})));
    Ok(Value::Object(upgraded))
}

fn legacy_node(record: Value) -> Result<Value, String> {
    let Value::Object(mut record) = record else {
        return Err("node record is not an object".to_string());
    };
    let id = record.remove("id").ok_or("node record without id")?;
    let coords = match record.remove("coordinates") {
        Some(Value::Array(coords)) => coords,
        _ => return Err(format!("node {id}: coordinates must be an array")),
    };
    if coords.is_empty() || coords.len() > 3 {
        return Err(format!("node {id}: expected 1 to 3 coordinates, found {}", coords.len()));
    }

    let mut node = Map::new();
    node.insert("id".into(), id);
    if let Some(name) = record.remove("name").filter(|name| !name.is_null()) {
        node.insert("name".into(), name);
    }
    for (axis, value) in ["x", "y", "z"].into_iter().zip(&coords) {
        node.insert(axis.into(), value.clone());
    }
    let dofs = match record.remove("fixed_dofs") {
        Some(Value::Null) | None => {
            let count = fixed_dof_count(coords.len()).unwrap_or(coords.len());
            Value::Array(vec![Value::Bool(false); count])
        }
        Some(flags) => flags,
    };
    node.insert("dofs".into(), dofs);
    if let Some(mass) = record.remove("mass").filter(|mass| !mass.is_null()) {
        node.insert("mass".into(), mass);
    }
    Ok(Value::Object(node))
}

fn legacy_record(record: Value, kind: &str, tag_key: &str, moves: ReferenceMoves) -> Result<Value, String> {
    let Value::Object(mut record) = record else {
        return Err(format!("{kind} record is not an object"));
    };
    let id = record.remove("id").ok_or_else(|| format!("{kind} record without id"))?;
    let tag = match record.remove(tag_key) {
        Some(Value::String(tag)) => tag,
        _ => return Err(format!("{kind} {id}: {tag_key} must be a string")),
    };
    let mut properties = match record.remove("properties") {
        Some(Value::Object(properties)) => properties,
        Some(Value::Null) | None => Map::new(),
        Some(_) => return Err(format!("{kind} {id}: properties must be an object")),
    };
    for (legacy, current) in moves {
        if let Some(value) = record.remove(*legacy) {
            properties.insert((*current).into(), value);
        }
    }

    let mut upgraded = Map::new();
    upgraded.insert("id".into(), id);
    upgraded.insert("type".into(), Value::String(tag));
    if let Some(name) = record.remove("name").filter(|name| !name.is_null()) {
        upgraded.insert("name".into(), name);
    }
    upgraded.insert("properties".into(), Value::Object(properties));
    Ok(Value::Object(upgraded))
}

// ============================================================================
// 1.1 -> 1.2
// ============================================================================

/// Legacy `analysis_parameters` keys and the payload fields they map to.
/// Anything else is dropped.
const STATIC_PARAMETERS: ReferenceMoves = &[
    ("num_steps", "steps"),
    ("tolerance", "tolerance"),
    ("max_iterations", "max_iterations"),
];

const TRANSIENT_PARAMETERS: ReferenceMoves = &[
    ("num_steps", "steps"),
    ("dt", "dt"),
    ("gamma", "gamma"),
    ("beta", "beta"),
    ("tolerance", "tolerance"),
    ("max_iterations", "max_iterations"),
];

const EIGEN_PARAMETERS: ReferenceMoves = &[("num_modes", "modes")];

fn unwrap_stage_list(mut tree: Value) -> Result<Value, String> {
    let model = tree
        .get_mut("model")
        .and_then(Value::as_object_mut)
        .ok_or("model is not an object")?;

    let stages = match model.remove("stages") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(mut wrapper)) => match wrapper.remove("stages") {
            Some(Value::Array(stages)) => stages,
            None => Vec::new(),
            Some(_) => return Err("model.stages.stages must be an array".to_string()),
        },
        Some(_) => return Err("model.stages must be a stage list object".to_string()),
    };

    let stages = stages.into_iter().map(flatten_stage).collect::<Result<Vec<_>, _>>()?;
    model.insert("stages".into(), Value::Array(stages));
    Ok(tree)
}

fn flatten_stage(stage: Value) -> Result<Value, String> {
    let Value::Object(mut stage) = stage else {
        return Err("stage record is not an object".to_string());
    };
    let id = stage.remove("id").ok_or("stage record without id")?;
    let stage_type = stage
        .remove("stage_type")
        .and_then(|value| value.as_str().map(str::to_uppercase))
        .ok_or_else(|| format!("stage {id}: stage_type must be a string"))?;

    // Construction and load-pattern stages ran as static load steps.
    let (analysis_type, parameter_keys) = match stage_type.as_str() {
        "STATIC" | "CONSTRUCTION" | "LOAD_PATTERN" | "CUSTOM" => ("Static", STATIC_PARAMETERS),
        "DYNAMIC" | "TRANSIENT" => ("Transient", TRANSIENT_PARAMETERS),
        "EIGEN" | "MODAL" => ("Eigen", EIGEN_PARAMETERS),
        other => return Err(format!("stage {id}: unknown stage type {other}")),
    };

    let parameters = match stage.remove("analysis_parameters") {
        Some(Value::Object(parameters)) => parameters,
        Some(Value::Null) | None => Map::new(),
        Some(_) => return Err(format!("stage {id}: analysis_parameters must be an object")),
    };
    let mut properties = Map::new();
    for (legacy, current) in parameter_keys {
        if let Some(value) = parameters.get(*legacy) {
            properties.insert((*current).into(), value.clone());
        }
    }

    let mut activate = Map::new();
    for (legacy, current) in [
        ("active_nodes", "nodes"),
        ("active_elements", "elements"),
        ("active_boundary_conditions", "constraints"),
    ] {
        match stage.remove(legacy) {
            Some(Value::Array(ids)) if !ids.is_empty() => {
                activate.insert(current.into(), Value::Array(ids));
            }
            Some(Value::Array(_)) | Some(Value::Null) | None => {}
            Some(_) => return Err(format!("stage {id}: {legacy} must be an array")),
        }
    }
    if !activate.is_empty() {
        properties.insert("activate".into(), Value::Object(activate));
    }

    let mut record = Map::new();
    record.insert("id".into(), id);
    record.insert("type".into(), Value::String("Stage".into()));
    if let Some(name) = stage.remove("name").filter(|name| !name.is_null()) {
        record.insert("name".into(), name);
    }
    record.insert("analysis_type".into(), Value::String(analysis_type.into()));
    record.insert(
        "load_ids".into(),
        stage.remove("active_loads").filter(|loads| !loads.is_null()).unwrap_or_else(|| json!([])),
    );
    record.insert("properties".into(), Value::Object(properties));
    Ok(Value::Object(record))
}

fn take_object(root: &mut Map<String, Value>, key: &str) -> Result<Map<String, Value>, String> {
    match root.remove(key) {
        Some(Value::Object(object)) => Ok(object),
        None => Ok(Map::new()),
        Some(_) => Err(format!("{key} must be an object")),
    }
}

fn take_array(root: &mut Map<String, Value>, key: &str) -> Result<Vec<Value>, String> {
    match root.remove(key) {
        Some(Value::Array(items)) => Ok(items),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(_) => Err(format!("{key} must be an array")),
    }
}
