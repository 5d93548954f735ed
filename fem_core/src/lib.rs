//! # fem_core - Structural Model Core
//!
//! `fem_core` holds the authoritative in-memory model of a finite-element
//! structure: typed entity registries, cross-registry integrity, project
//! files, script generation for the analysis engine and on-disk storage of
//! analysis results.
//!
//! ## Design Philosophy
//!
//! - **One owner**: a [`ModelDocument`] owns every entity; collaborators read
//!   it or subscribe to its change events
//! - **Typed payloads**: each entity type is a closed variant checked when it
//!   is built, not when it is used
//! - **Rich Errors**: structured error values, never bare strings
//! - **Explicit wiring**: documents, serializers, generators and results
//!   stores are constructed and passed around, never looked up globally
//!
//! ## Quick Start
//!
//! ```rust
//! use fem_core::codegen::{CodeGenerator, Dialect};
//! use fem_core::model::{Elastic, ElasticSection, Element, Material, Node, Section, Truss};
//! use fem_core::project::Project;
//!
//! let mut project = Project::new("Engineer");
//! let doc = &mut project.document;
//! doc.add(Material::new(1, Elastic { e: 200e9 }).unwrap()).unwrap();
//! let section = ElasticSection { e: 200e9, a: 0.01, iz: 1e-5, iy: None, g: None, j: None };
//! doc.add(Section::new(1, section).unwrap()).unwrap();
//! doc.add(Node::new(1, vec![0.0, 0.0]).unwrap().fixed()).unwrap();
//! doc.add(Node::new(2, vec![3.0, 0.0]).unwrap()).unwrap();
//! doc.add(Element::new(1, Truss { area: 0.01 }, vec![1, 2], 1, 1).unwrap()).unwrap();
//!
//! let script = CodeGenerator::new().generate(&project.document, Dialect::Python).unwrap();
//! assert!(script.text().starts_with("# Generated by trellis"));
//! ```
//!
//! ## Modules
//!
//! - [`model`] - Entity kinds and their typed payloads
//! - [`registry`] - Per-kind ordered entity storage
//! - [`document`] - The model document: removal, validation, notifications
//! - [`project`] - Project container and metadata
//! - [`serializer`] - Project JSON tree and schema migrations
//! - [`file_io`] - File operations with atomic saves and locking
//! - [`codegen`] - Tcl and OpenSeesPy script generation
//! - [`results`] - Analysis results storage
//! - [`config`] - Tool configuration
//! - [`errors`] - Structured error types

pub mod codegen;
pub mod config;
pub mod document;
pub mod errors;
pub mod file_io;
pub mod model;
pub mod project;
pub mod registry;
pub mod results;
pub mod serializer;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at crate root for convenience
pub use codegen::{CodeGenerator, Dialect, Script};
pub use config::AppConfig;
pub use document::{ChangeEvent, ChangeKind, ModelDocument};
pub use errors::{ModelError, ModelResult, ValidationIssue};
pub use file_io::{load_project, save_project, FileLock};
pub use project::{Project, ProjectMetadata};
pub use results::{ResultKind, ResultsStore, RunId, RunInfo};
pub use serializer::Serializer;
