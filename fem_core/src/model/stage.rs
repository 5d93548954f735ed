//! # Stages
//!
//! Stages are applied in list order and are progressive: everything active
//! in stage k stays active in stage k+1. A stage names the loads it applies,
//! the analysis it runs, and optionally
//!
//! - the nodes, elements and constraints it brings into the model
//!   (construction sequencing). Entities no stage activates belong to the
//!   base model and exist from the first stage on.
//! - a model-builder override. Without one the dimension in effect carries
//!   over from the previous stage.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ModelResult;
use crate::model::catalog::{
    check_payload, require_positive, tagged_kind, take_optional_property, FieldProblem, Payload, Properties,
};
use crate::model::node::builder_dof_count;
use crate::model::{check_id, Entity, EntityId, EntityKind, EntityRef};

/// Value of the `type` field of every stage record.
pub const STAGE_RECORD_TYPE: &str = "Stage";

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub id: EntityId,
    pub name: Option<String>,
    pub analysis: AnalysisKind,
    /// Loads applied by this stage, in application order
    pub load_ids: Vec<EntityId>,
    pub activation: Activation,
    pub builder: Option<ModelBuilder>,
}

impl Stage {
    pub fn new(id: EntityId, analysis: impl Into<AnalysisKind>) -> ModelResult<Self> {
        check_id(EntityKind::Stage, id)?;
        let analysis: AnalysisKind = analysis.into();
        check_payload(EntityKind::Stage, id, analysis.problems())?;
        Ok(Stage {
            id,
            name: None,
            analysis,
            load_ids: Vec::new(),
            activation: Activation::default(),
            builder: None,
        })
    }

    /// Build a stage from a project record.
    pub fn from_properties(
        id: EntityId,
        analysis_type: &str,
        name: Option<String>,
        load_ids: Vec<EntityId>,
        properties: &Properties,
    ) -> ModelResult<Self> {
        check_id(EntityKind::Stage, id)?;
        let mut properties = properties.clone();
        let builder = take_optional_property(&mut properties, EntityKind::Stage, id, "model_builder")?;
        let activation = take_optional_property(&mut properties, EntityKind::Stage, id, "activate")?.unwrap_or_default();
        let analysis = AnalysisKind::catalog().construct(id, analysis_type, &properties)?;
        Ok(Stage {
            id,
            name,
            analysis,
            load_ids,
            activation,
            builder,
        })
    }

    /// Property map of a project record: analysis parameters, builder
    /// override and activation lists (the last two only when present).
    pub fn to_properties(&self) -> Properties {
        let mut properties = self.analysis.properties();
        if let Some(builder) = &self.builder {
            properties.insert("model_builder".into(), builder.to_value());
        }
        if !self.activation.is_empty() {
            properties.insert("activate".into(), self.activation.to_value());
        }
        properties
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_loads(mut self, load_ids: Vec<EntityId>) -> Self {
        self.load_ids = load_ids;
        self
    }

    pub fn with_builder(mut self, builder: ModelBuilder) -> Self {
        self.builder = Some(builder);
        self
    }

    pub fn activating(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    /// Display label, falling back to the id
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("Stage {}", self.id))
    }
}

impl Entity for Stage {
    const KIND: EntityKind = EntityKind::Stage;

    fn id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The analysis type; the record `type` is always [`STAGE_RECORD_TYPE`].
    fn type_tag(&self) -> &'static str {
        self.analysis.type_tag()
    }

    fn references(&self) -> Vec<EntityRef> {
        let loads = self.load_ids.iter().map(|id| EntityRef::new(EntityKind::Load, *id));
        loads.chain(self.activation.references()).collect()
    }
}

/// Entities a stage brings into the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Activation {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<EntityId>,
}

impl Activation {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.elements.is_empty() && self.constraints.is_empty()
    }

    pub fn references(&self) -> impl Iterator<Item = EntityRef> + '_ {
        let nodes = self.nodes.iter().map(|id| EntityRef::new(EntityKind::Node, *id));
        let elements = self.elements.iter().map(|id| EntityRef::new(EntityKind::Element, *id));
        let constraints = self.constraints.iter().map(|id| EntityRef::new(EntityKind::Constraint, *id));
        nodes.chain(elements).chain(constraints)
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Model-builder settings: spatial dimension and dofs per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelBuilder {
    pub ndm: u8,
    pub ndf: u8,
}

impl ModelBuilder {
    /// Builder assumed when the document has no nodes to infer one from.
    pub const FALLBACK: ModelBuilder = ModelBuilder { ndm: 3, ndf: 6 };

    /// Default builder for a dimension: 1→1, 2→3, 3→6 dofs.
    pub fn for_dimension(ndm: u8) -> Option<Self> {
        builder_dof_count(ndm as usize).map(|ndf| ModelBuilder { ndm, ndf: ndf as u8 })
    }

    /// Describe what is wrong with the settings, if anything.
    pub fn problem(&self) -> Option<String> {
        if !(1..=3).contains(&self.ndm) {
            return Some(format!("ndm must be 1, 2 or 3, got {}", self.ndm));
        }
        if !(1..=6).contains(&self.ndf) {
            return Some(format!("ndf must be between 1 and 6, got {}", self.ndf));
        }
        None
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

tagged_kind! {
    /// Analysis a stage runs once its loads are applied.
    pub enum AnalysisKind for EntityKind::Stage {
        Static(StaticAnalysis),
        Transient(Transient),
        Eigen(Eigen),
    }
}

fn default_steps() -> u32 {
    1
}

fn default_tolerance() -> f64 {
    1.0e-6
}

fn default_max_iterations() -> u32 {
    10
}

fn default_gamma() -> f64 {
    0.5
}

fn default_beta() -> f64 {
    0.25
}

fn default_modes() -> u32 {
    10
}

fn check_solver(problems: &mut Vec<FieldProblem>, steps: u32, tolerance: f64, max_iterations: u32) {
    if steps == 0 {
        problems.push(FieldProblem::new("steps", "at least one step is required"));
    }
    require_positive(problems, "tolerance", tolerance);
    if max_iterations == 0 {
        problems.push(FieldProblem::new("max_iterations", "at least one iteration is required"));
    }
}

/// Load-controlled static analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticAnalysis {
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for StaticAnalysis {
    fn default() -> Self {
        StaticAnalysis {
            steps: default_steps(),
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl Payload for StaticAnalysis {
    type Kind = AnalysisKind;
    const TAG: &'static str = "Static";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        check_solver(&mut problems, self.steps, self.tolerance, self.max_iterations);
        problems
    }
}

/// Newmark time-history analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transient {
    pub steps: u32,
    pub dt: f64,
    #[serde(default = "default_gamma")]
    pub gamma: f64,
    #[serde(default = "default_beta")]
    pub beta: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Payload for Transient {
    type Kind = AnalysisKind;
    const TAG: &'static str = "Transient";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        check_solver(&mut problems, self.steps, self.tolerance, self.max_iterations);
        require_positive(&mut problems, "dt", self.dt);
        require_positive(&mut problems, "gamma", self.gamma);
        require_positive(&mut problems, "beta", self.beta);
        problems
    }
}

/// Eigenvalue analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Eigen {
    #[serde(default = "default_modes")]
    pub modes: u32,
}

impl Payload for Eigen {
    type Kind = AnalysisKind;
    const TAG: &'static str = "Eigen";

    fn check(&self) -> Vec<FieldProblem> {
        if self.modes == 0 {
            return vec![FieldProblem::new("modes", "at least one mode is required")];
        }
        Vec::new()
    }
}
