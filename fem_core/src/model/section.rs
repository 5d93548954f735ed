//! # Sections
//!
//! Cross-section properties for line elements. Geometric sections derive
//! area and inertia from their dimensions; `Elastic` takes them directly.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::errors::ModelResult;
use crate::model::catalog::{check_payload, require_positive, tagged_kind, FieldProblem, Payload, Properties};
use crate::model::{check_id, Entity, EntityId, EntityKind, EntityRef};

/// A section definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub id: EntityId,
    pub name: Option<String>,
    pub kind: SectionKind,
}

impl Section {
    pub fn new(id: EntityId, kind: impl Into<SectionKind>) -> ModelResult<Self> {
        check_id(EntityKind::Section, id)?;
        let kind: SectionKind = kind.into();
        check_payload(EntityKind::Section, id, kind.problems())?;
        Ok(Section { id, name: None, kind })
    }

    /// Create a section from a `type` tag and property map via the catalog.
    pub fn from_properties(id: EntityId, tag: &str, name: Option<String>, properties: &Properties) -> ModelResult<Self> {
        check_id(EntityKind::Section, id)?;
        let kind = SectionKind::catalog().construct(id, tag, properties)?;
        Ok(Section { id, name, kind })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Resolved elastic properties of the section.
    pub fn properties(&self) -> SectionProperties {
        self.kind.section_properties()
    }
}

impl Entity for Section {
    const KIND: EntityKind = EntityKind::Section;

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

/// Elastic section constants. Out-of-plane values are `None` when the
/// section only describes planar behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionProperties {
    pub e: f64,
    pub area: f64,
    pub iz: f64,
    pub iy: Option<f64>,
    pub g: Option<f64>,
    pub j: Option<f64>,
}

tagged_kind! {
    /// Closed set of section shapes.
    pub enum SectionKind for EntityKind::Section {
        Elastic(ElasticSection),
        Rectangular(RectangularSection),
        Circular(CircularSection),
    }
}

impl SectionKind {
    pub fn section_properties(&self) -> SectionProperties {
        match self {
            SectionKind::Elastic(s) => SectionProperties {
                e: s.e,
                area: s.a,
                iz: s.iz,
                iy: s.iy,
                g: s.g,
                j: s.j,
            },
            SectionKind::Rectangular(s) => {
                let (b, h) = (s.width, s.height);
                SectionProperties {
                    e: s.e,
                    area: b * h,
                    iz: b * h.powi(3) / 12.0,
                    iy: Some(h * b.powi(3) / 12.0),
                    g: s.g,
                    j: Some(rectangular_torsion_constant(b, h)),
                }
            }
            SectionKind::Circular(s) => {
                let d = s.diameter;
                let i = PI * d.powi(4) / 64.0;
                SectionProperties {
                    e: s.e,
                    area: PI * d * d / 4.0,
                    iz: i,
                    iy: Some(i),
                    g: s.g,
                    j: Some(2.0 * i),
                }
            }
        }
    }
}

/// Saint-Venant torsion constant of a solid rectangle (series approximation).
fn rectangular_torsion_constant(b: f64, h: f64) -> f64 {
    let (long, short) = if b >= h { (b, h) } else { (h, b) };
    let ratio = short / long;
    long * short.powi(3) * (1.0 / 3.0 - 0.21 * ratio * (1.0 - ratio.powi(4) / 12.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElasticSection {
    #[serde(rename = "E")]
    pub e: f64,
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "Iz")]
    pub iz: f64,
    #[serde(rename = "Iy", default, skip_serializing_if = "Option::is_none")]
    pub iy: Option<f64>,
    #[serde(rename = "G", default, skip_serializing_if = "Option::is_none")]
    pub g: Option<f64>,
    #[serde(rename = "J", default, skip_serializing_if = "Option::is_none")]
    pub j: Option<f64>,
}

impl Payload for ElasticSection {
    type Kind = SectionKind;
    const TAG: &'static str = "Elastic";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        require_positive(&mut problems, "E", self.e);
        require_positive(&mut problems, "A", self.a);
        require_positive(&mut problems, "Iz", self.iz);
        for (field, value) in [("Iy", self.iy), ("G", self.g), ("J", self.j)] {
            if let Some(value) = value {
                require_positive(&mut problems, field, value);
            }
        }
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RectangularSection {
    pub width: f64,
    pub height: f64,
    #[serde(rename = "E")]
    pub e: f64,
    #[serde(rename = "G", default, skip_serializing_if = "Option::is_none")]
    pub g: Option<f64>,
}

impl Payload for RectangularSection {
    type Kind = SectionKind;
    const TAG: &'static str = "Rectangular";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        require_positive(&mut problems, "width", self.width);
        require_positive(&mut problems, "height", self.height);
        require_positive(&mut problems, "E", self.e);
        if let Some(g) = self.g {
            require_positive(&mut problems, "G", g);
        }
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CircularSection {
    pub diameter: f64,
    #[serde(rename = "E")]
    pub e: f64,
    #[serde(rename = "G", default, skip_serializing_if = "Option::is_none")]
    pub g: Option<f64>,
}

impl Payload for CircularSection {
    type Kind = SectionKind;
    const TAG: &'static str = "Circular";

    fn check(&self) -> Vec<FieldProblem> {
        let mut problems = Vec::new();
        require_positive(&mut problems, "diameter", self.diameter);
        require_positive(&mut problems, "E", self.e);
        if let Some(g) = self.g {
            require_positive(&mut problems, "G", g);
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangular_properties() {
        let section = Section::new(
            1,
            RectangularSection {
                width: 0.3,
                height: 0.6,
                e: 30e9,
                g: None,
            },
        )
        .unwrap();
        let p = section.properties();
        assert!((p.area - 0.18).abs() < 1e-12);
        assert!((p.iz - 0.3 * 0.6f64.powi(3) / 12.0).abs() < 1e-12);
        assert!(p.j.unwrap() > 0.0);
        assert!(p.g.is_none());
    }

    #[test]
    fn test_circular_properties() {
        let kind = SectionKind::from(CircularSection {
            diameter: 2.0,
            e: 1.0,
            g: Some(0.4),
        });
        let p = kind.section_properties();
        assert!((p.area - PI).abs() < 1e-12);
        assert!((p.iz - PI / 4.0).abs() < 1e-12);
        assert_eq!(p.iy, Some(p.iz));
    }

    #[test]
    fn test_elastic_tag_shared_with_material_is_kind_scoped() {
        let kind = SectionKind::from(ElasticSection {
            e: 1.0,
            a: 1.0,
            iz: 1.0,
            iy: None,
            g: None,
            j: None,
        });
        assert_eq!(kind.type_tag(), "Elastic");
        assert_eq!(SectionKind::catalog().kind(), EntityKind::Section);
    }

    #[test]
    fn test_checks_reject_zero_dimensions() {
        let problems = RectangularSection {
            width: 0.0,
            height: 1.0,
            e: 1.0,
            g: None,
        }
        .check();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].field, "width");
    }
}
