//! # Materials
//!
//! Constitutive models referenced by elements. Property names follow the
//! analysis engine's own argument names (`E`, `Fy`, `fpc`, ...) so project
//! files read like the scripts they become.

use serde::{Deserialize, Serialize};

use crate::errors::ModelResult;
use crate::model::catalog::{check_payload, require_finite, require_positive, tagged_kind, FieldProblem, Payload, Properties};
use crate::model::{check_id, Entity, EntityId, EntityKind, EntityRef};

/// A material definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub id: EntityId,
    pub name: Option<String>,
    pub kind: MaterialKind,
}

impl Material {
    /// Create a material from a typed payload.
    pub fn new(id: EntityId, kind: impl Into<MaterialKind>) -> ModelResult<Self> {
        check_id(EntityKind::Material, id)?;
        let kind: MaterialKind = kind.into();
        check_payload(EntityKind::Material, id, kind.problems())?;
        Ok(Material { id, name: None, kind })
    }

    /// Create a material from a `type` tag and property map via the catalog.
    pub fn from_properties(id: EntityId, tag: &str, name: Option<String>, properties: &Properties) -> ModelResult<Self> {
        check_id(EntityKind::Material, id)?;
        let kind = MaterialKind::catalog().construct(id, tag, properties)?;
        Ok(Material { id, name, kind })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether this is a multi-dimensional (continuum) material
    pub fn is_nd(&self) -> bool {
        matches!(self.kind, MaterialKind::ElasticIsotropic(_))
    }
}

impl Entity for Material {
    const KIND: EntityKind = EntityKind::Material;

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
        Vec::new()
    }
}

tagged_kind! {
    /// Closed set of material models.
    pub enum MaterialKind for EntityKind::Material {
        Elastic(Elastic),
        ElasticIsotropic(ElasticIsotropic),
        Steel01(Steel01),
        Concrete01(Concrete01),
    }
}

/// Linear elastic uniaxial material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Elastic {
    #[serde(rename = "E")]
    pub e: f64,
}

impl Payload for Elastic {
    type Kind = MaterialKind;
    const TAG: &'static str = "Elastic";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        require_positive(&mut problems, "E", self.e);
        problems
    }
}

/// Isotropic linear elastic continuum material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElasticIsotropic {
    #[serde(rename = "E")]
    pub e: f64,
    pub nu: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rho: Option<f64>,
}

impl Payload for ElasticIsotropic {
    type Kind = MaterialKind;
    const TAG: &'static str = "ElasticIsotropic";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        require_positive(&mut problems, "E", self.e);
        if !(0.0..0.5).contains(&self.nu) {
            problems.push(FieldProblem::new("nu", format!("Poisson's ratio must be in [0, 0.5), got {}", self.nu)));
        }
        if let Some(rho) = self.rho {
            if !(rho.is_finite() && rho >= 0.0) {
                problems.push(FieldProblem::new("rho", "density must be non-negative"));
            }
        }
        problems
    }
}

/// Bilinear steel with kinematic hardening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Steel01 {
    /// Yield strength
    #[serde(rename = "Fy")]
    pub fy: f64,
    /// Initial elastic tangent
    #[serde(rename = "E0")]
    pub e0: f64,
    /// Strain-hardening ratio
    pub b: f64,
}

impl Payload for Steel01 {
    type Kind = MaterialKind;
    const TAG: &'static str = "Steel01";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        require_positive(&mut problems, "Fy", self.fy);
        require_positive(&mut problems, "E0", self.e0);
        if !(self.b.is_finite() && (0.0..1.0).contains(&self.b)) {
            problems.push(FieldProblem::new("b", format!("hardening ratio must be in [0, 1), got {}", self.b)));
        }
        problems
    }
}

/// Kent-Scott-Park concrete without tensile strength.
///
/// Compressive values follow the engine convention and are negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Concrete01 {
    pub fpc: f64,
    pub epsc0: f64,
    pub fpcu: f64,
    pub epscu: f64,
}

impl Payload for Concrete01 {
    type Kind = MaterialKind;
    const TAG: &'static str = "Concrete01";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        for (field, value) in [
            ("fpc", self.fpc),
            ("epsc0", self.epsc0),
            ("fpcu", self.fpcu),
            ("epscu", self.epscu),
        ] {
            require_finite(&mut problems, field, value);
            if value > 0.0 {
                problems.push(FieldProblem::new(field, format!("{field} is a compressive value and must not be positive")));
            }
        }
        if self.fpc == 0.0 {
            problems.push(FieldProblem::new("fpc", "compressive strength must be non-zero"));
        }
        problems
    }
}

impl Concrete01 {
    /// Defaults derived from a compressive strength magnitude (MPa):
    /// crushing strain 0.002, ultimate 0.2 f'c at strain 0.006.
    pub fn from_strength(fc: f64) -> Self {
        let fc = fc.abs();
        Concrete01 {
            fpc: -fc,
            epsc0: -0.002,
            fpcu: -0.2 * fc,
            epscu: -0.006,
        }
    }
}
