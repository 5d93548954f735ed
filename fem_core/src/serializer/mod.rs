//! # Serializer
//!
//! Converts between a [`Project`] and its JSON tree.
//!
//! ```text
//! {
//!   "metadata":     { file_format_version, created_by, created_at, modified_at, file_path, description? },
//!   "model":        { nodes[], elements[], materials[], sections[], constraints[], loads[], stages[] },
//!   "app_settings": { ...passed through untouched... }
//! }
//! ```
//!
//! Saving always writes the current schema version. Loading upgrades older
//! trees through the [`MigrationChain`], then builds the whole document; any
//! failure returns the error and no partial project.
//!
//! ## Example
//!
//! ```rust
//! use fem_core::model::Node;
//! use fem_core::project::Project;
//! use fem_core::serializer::Serializer;
//!
//! let mut project = Project::new("Engineer");
//! project.document.add(Node::new(1, vec![0.0, 0.0, 0.0]).unwrap()).unwrap();
//!
//! let serializer = Serializer::new();
//! let text = serializer.to_string(&project).unwrap();
//! let loaded = serializer.from_str(&text).unwrap();
//! assert_eq!(serializer.to_string(&loaded).unwrap(), text);
//! ```

pub mod migrate;
pub mod schema;

use serde_json::Value;
use tracing::{debug, info};

use crate::document::ModelDocument;
use crate::errors::{ModelError, ModelResult};
use crate::model::{Constraint, Element, Load, Material, Section};
use crate::project::{Project, SCHEMA_VERSION};

pub use migrate::{Migration, MigrationChain};
pub use schema::{EntityRecord, ModelTree, NodeRecord, ProjectFile, StageRecord};

/// Project tree reader and writer.
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    migrations: MigrationChain,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom upgrade chain.
    pub fn with_migrations(migrations: MigrationChain) -> Self {
        Serializer { migrations }
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Build the current-version record tree of a project.
    pub fn to_tree(&self, project: &Project) -> ModelResult<ProjectFile> {
        let document = &project.document;
        let mut metadata = project.meta.clone();
        metadata.file_format_version = SCHEMA_VERSION.to_string();

        let model = ModelTree::from_document(document)?;

        Ok(ProjectFile {
            metadata,
            model,
            app_settings: project.app_settings.clone(),
        })
    }

    pub fn to_value(&self, project: &Project) -> ModelResult<Value> {
        serde_json::to_value(self.to_tree(project)?).map_err(ModelError::serialization)
    }

    /// Pretty-printed JSON text of a project.
    pub fn to_string(&self, project: &Project) -> ModelResult<String> {
        serde_json::to_string_pretty(&self.to_tree(project)?).map_err(ModelError::serialization)
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// Parse project JSON text.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(&self, text: &str) -> ModelResult<Project> {
        let tree: Value = serde_json::from_str(text).map_err(|e| ModelError::SerializationError {
            reason: format!("Invalid project JSON: {}", e),
        })?;
        self.from_value(tree)
    }

    /// Upgrade and load a project tree of any supported version.
    pub fn from_value(&self, tree: Value) -> ModelResult<Project> {
        let tree = self.migrations.upgrade(tree)?;
        let file: ProjectFile = serde_json::from_value(tree).map_err(|e| ModelError::SerializationError {
            reason: format!("Project tree does not match schema {}: {}", SCHEMA_VERSION, e),
        })?;
        self.from_tree(file)
    }

    /// Build a project from a current-version record tree.
    pub fn from_tree(&self, file: ProjectFile) -> ModelResult<Project> {
        let ProjectFile {
            metadata,
            model,
            app_settings,
        } = file;

        let mut document = ModelDocument::new();
        for record in &model.materials {
            let material = Material::from_properties(record.id, &record.type_tag, record.name.clone(), &record.properties)?;
            document.insert_unchecked(material)?;
        }
        for record in &model.sections {
            let section = Section::from_properties(record.id, &record.type_tag, record.name.clone(), &record.properties)?;
            document.insert_unchecked(section)?;
        }
        for record in &model.nodes {
            document.insert_unchecked(record.to_node()?)?;
        }
        for record in &model.elements {
            let element = Element::from_properties(record.id, &record.type_tag, record.name.clone(), &record.properties)?;
            document.insert_unchecked(element)?;
        }
        for record in &model.constraints {
            let constraint =
                Constraint::from_properties(record.id, &record.type_tag, record.name.clone(), &record.properties)?;
            document.insert_unchecked(constraint)?;
        }
        for record in &model.loads {
            let load = Load::from_properties(record.id, &record.type_tag, record.name.clone(), &record.properties)?;
            document.insert_unchecked(load)?;
        }
        for record in &model.stages {
            document.insert_unchecked(record.to_stage()?)?;
        }
        document.finish_loading();

        let issues = document.issues();
        if !issues.is_empty() {
            debug!(issues = issues.len(), "loaded project has validation issues");
        }
        info!(entities = document.len(), "loaded project");

        Ok(Project {
            meta: metadata,
            app_settings,
            document,
        })
    }
}
