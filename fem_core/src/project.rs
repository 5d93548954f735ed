//! # Project
//!
//! The `Project` is what a project file holds: metadata, the model document
//! and the GUI's opaque settings. Projects are stored as `.tmf` (Trellis
//! model file) JSON; see [`crate::serializer`] for the file layout and
//! [`crate::file_io`] for atomic saves.
//!
//! ```text
//! Project
//! ├── meta: ProjectMetadata (format version, author, timestamps)
//! ├── app_settings: serde_json::Value (owned by the GUI, passed through)
//! └── document: ModelDocument (all entities and stages)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use fem_core::model::Node;
//! use fem_core::project::{Project, SCHEMA_VERSION};
//!
//! let mut project = Project::new("Jane Engineer").with_description("Footbridge");
//! project.document.add(Node::new(1, vec![0.0, 0.0]).unwrap()).unwrap();
//!
//! assert_eq!(project.meta.file_format_version, SCHEMA_VERSION);
//! assert_eq!(project.document.nodes().len(), 1);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::ModelDocument;

/// Current schema version for project files
pub const SCHEMA_VERSION: &str = "1.2.0";

/// File extension for project files
pub const PROJECT_EXTENSION: &str = "tmf";

/// Root project container.
#[derive(Debug)]
pub struct Project {
    pub meta: ProjectMetadata,

    /// GUI-owned settings. Never interpreted here; saved back as loaded.
    pub app_settings: Value,

    pub document: ModelDocument,
}

impl Project {
    /// Create a new empty project.
    pub fn new(created_by: impl Into<String>) -> Self {
        let now = Utc::now();
        Project {
            meta: ProjectMetadata {
                file_format_version: SCHEMA_VERSION.to_string(),
                created_by: created_by.into(),
                created_at: now,
                modified_at: now,
                file_path: None,
                description: None,
            },
            app_settings: Value::Object(Default::default()),
            document: ModelDocument::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    /// Update the modified timestamp.
    pub fn touch(&mut self) {
        self.meta.modified_at = Utc::now();
    }
}

impl Default for Project {
    fn default() -> Self {
        Project::new("")
    }
}

impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        self.meta == other.meta && self.app_settings == other.app_settings && self.document == other.document
    }
}

/// Project metadata stored in the file header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    /// Schema version (for migration compatibility)
    pub file_format_version: String,

    /// Person or tool that created the project
    pub created_by: String,

    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,

    /// Where the project was last saved
    #[serde(default)]
    pub file_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_creation() {
        let project = Project::new("John Doe");
        assert_eq!(project.meta.created_by, "John Doe");
        assert_eq!(project.meta.file_format_version, SCHEMA_VERSION);
        assert_eq!(project.meta.created_at, project.meta.modified_at);
        assert!(project.document.is_empty());
        assert_eq!(project.app_settings, serde_json::json!({}));
    }

    #[test]
    fn test_touch_moves_modified_forward() {
        let mut project = Project::new("Engineer");
        let created = project.meta.created_at;
        project.touch();
        assert!(project.meta.modified_at >= created);
        assert_eq!(project.meta.created_at, created);
    }

    #[test]
    fn test_metadata_serialization() {
        let project = Project::new("Jane Engineer");
        let json = serde_json::to_value(&project.meta).unwrap();
        assert_eq!(json["created_by"], "Jane Engineer");
        assert_eq!(json["file_path"], Value::Null);
        assert!(json.get("description").is_none());

        let roundtrip: ProjectMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(roundtrip, project.meta);
    }
}
