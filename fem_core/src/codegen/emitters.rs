//! Per-(entity type, dialect) emitters.
//!
//! An emitter turns one entity into the command lines that define it. The
//! [`EmitterRegistry`] is keyed by entity kind, type tag and dialect, so new
//! types or dialects plug in without touching the generator. Stage emitters
//! are keyed by analysis type and produce the analysis commands.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::codegen::format::{args, Arg, CommandWriter};
use crate::codegen::Dialect;
use crate::document::ModelDocument;
use crate::errors::{ModelError, ModelResult};
use crate::model::{
    AnalysisKind, Constraint, ConstraintKind, Element, ElementKind, Entity, EntityId, EntityKind, Load, LoadKind,
    Material, MaterialKind, ModelBuilder, Node, Section, Stage,
};

/// Borrowed view of any entity, handed to emitters.
#[derive(Debug, Clone, Copy)]
pub enum EntityView<'a> {
    Material(&'a Material),
    Section(&'a Section),
    Node(&'a Node),
    Element(&'a Element),
    Constraint(&'a Constraint),
    Load(&'a Load),
    Stage(&'a Stage),
}

impl EntityView<'_> {
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityView::Material(_) => EntityKind::Material,
            EntityView::Section(_) => EntityKind::Section,
            EntityView::Node(_) => EntityKind::Node,
            EntityView::Element(_) => EntityKind::Element,
            EntityView::Constraint(_) => EntityKind::Constraint,
            EntityView::Load(_) => EntityKind::Load,
            EntityView::Stage(_) => EntityKind::Stage,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            EntityView::Material(e) => e.id,
            EntityView::Section(e) => e.id,
            EntityView::Node(e) => e.id,
            EntityView::Element(e) => e.id,
            EntityView::Constraint(e) => e.id,
            EntityView::Load(e) => e.id,
            EntityView::Stage(e) => e.id,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            EntityView::Material(e) => e.type_tag(),
            EntityView::Section(e) => e.type_tag(),
            EntityView::Node(e) => e.type_tag(),
            EntityView::Element(e) => e.type_tag(),
            EntityView::Constraint(e) => e.type_tag(),
            EntityView::Load(e) => e.type_tag(),
            EntityView::Stage(e) => e.type_tag(),
        }
    }
}

/// Everything an emitter may consult besides the entity itself.
#[derive(Clone, Copy)]
pub struct EmitContext<'a> {
    pub writer: CommandWriter,
    /// Model builder in effect for the stage being generated
    pub builder: ModelBuilder,
    pub document: &'a ModelDocument,
}

impl EmitContext<'_> {
    pub fn dialect(&self) -> Dialect {
        self.writer.dialect
    }

    pub fn ndm(&self) -> usize {
        self.builder.ndm as usize
    }

    pub fn ndf(&self) -> usize {
        self.builder.ndf as usize
    }

    pub fn command(&self, name: &str, args: &[Arg]) -> String {
        self.writer.command(name, args)
    }
}

/// Produces the definition lines of one entity.
pub trait Emitter: Send + Sync {
    fn emit(&self, entity: EntityView<'_>, context: &EmitContext<'_>) -> ModelResult<Vec<String>>;
}

impl<F> Emitter for F
where
    F: Fn(EntityView<'_>, &EmitContext<'_>) -> ModelResult<Vec<String>> + Send + Sync,
{
    fn emit(&self, entity: EntityView<'_>, context: &EmitContext<'_>) -> ModelResult<Vec<String>> {
        self(entity, context)
    }
}

type EmitterKey = (EntityKind, String, Dialect);

/// Lookup table from (kind, type tag, dialect) to emitter.
#[derive(Clone, Default)]
pub struct EmitterRegistry {
    emitters: HashMap<EmitterKey, Arc<dyn Emitter>>,
}

impl EmitterRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Emitters for every built-in type in both dialects.
    pub fn builtin() -> Self {
        let mut registry = EmitterRegistry::new();
        for dialect in Dialect::ALL {
            for tag in MaterialKind::catalog().tags() {
                registry.register(EntityKind::Material, tag, dialect, emit_material);
            }
            for tag in crate::model::SectionKind::catalog().tags() {
                registry.register(EntityKind::Section, tag, dialect, emit_section);
            }
            registry.register(EntityKind::Node, "Node", dialect, emit_node);
            for tag in ElementKind::catalog().tags() {
                registry.register(EntityKind::Element, tag, dialect, emit_element);
            }
            for tag in ConstraintKind::catalog().tags() {
                registry.register(EntityKind::Constraint, tag, dialect, emit_constraint);
            }
            for tag in LoadKind::catalog().tags() {
                registry.register(EntityKind::Load, tag, dialect, emit_load);
            }
            for tag in AnalysisKind::catalog().tags() {
                registry.register(EntityKind::Stage, tag, dialect, emit_analysis);
            }
        }
        registry
    }

    /// Add or replace the emitter for one (kind, tag, dialect).
    pub fn register(
        &mut self,
        kind: EntityKind,
        tag: impl Into<String>,
        dialect: Dialect,
        emitter: impl Emitter + 'static,
    ) {
        self.emitters.insert((kind, tag.into(), dialect), Arc::new(emitter));
    }

    pub fn unregister(&mut self, kind: EntityKind, tag: &str, dialect: Dialect) -> bool {
        self.emitters.remove(&(kind, tag.to_string(), dialect)).is_some()
    }

    pub fn contains(&self, kind: EntityKind, tag: &str, dialect: Dialect) -> bool {
        self.emitters.contains_key(&(kind, tag.to_string(), dialect))
    }

    /// Run the emitter registered for `entity`. Fails with
    /// `EntityTypeUnsupported` if there is none.
    pub fn emit(&self, entity: EntityView<'_>, context: &EmitContext<'_>) -> ModelResult<Vec<String>> {
        let key = (entity.kind(), entity.type_tag().to_string(), context.dialect());
        match self.emitters.get(&key) {
            Some(emitter) => emitter.emit(entity, context),
            None => Err(ModelError::EntityTypeUnsupported {
                entity_kind: entity.kind(),
                type_tag: entity.type_tag().to_string(),
                dialect: context.dialect().name().to_string(),
            }),
        }
    }
}

impl fmt::Debug for EmitterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmitterRegistry").field("emitters", &self.emitters.len()).finish()
    }
}

// ============================================================================
// Built-in emitters
// ============================================================================

fn unexpected(entity: EntityView<'_>) -> ModelError {
    ModelError::Internal {
        message: format!("emitter called with {} {}", entity.kind(), entity.id()),
    }
}

/// `count` flags as 0/1 integers, padded with zeros.
fn flag_args(flags: &[bool], count: usize) -> Vec<Arg> {
    (0..count)
        .map(|i| Arg::Int(i64::from(flags.get(i).copied().unwrap_or(false))))
        .collect()
}

fn emit_material(entity: EntityView<'_>, cx: &EmitContext<'_>) -> ModelResult<Vec<String>> {
    let EntityView::Material(material) = entity else {
        return Err(unexpected(entity));
    };
    let id = material.id;
    let line = match &material.kind {
        MaterialKind::Elastic(m) => cx.command("uniaxialMaterial", &args!["Elastic", id, m.e]),
        MaterialKind::Steel01(m) => cx.command("uniaxialMaterial", &args!["Steel01", id, m.fy, m.e0, m.b]),
        MaterialKind::Concrete01(m) => cx.command(
            "uniaxialMaterial",
            &args!["Concrete01", id, m.fpc, m.epsc0, m.fpcu, m.epscu],
        ),
        MaterialKind::ElasticIsotropic(m) => {
            let mut arguments = args!["ElasticIsotropic", id, m.e, m.nu];
            if let Some(rho) = m.rho {
                arguments.push(Arg::Num(rho));
            }
            cx.command("nDMaterial", &arguments)
        }
    };
    Ok(vec![line])
}

/// Elastic constants `A E G J Iy Iz` of a section in 3D, or an error naming
/// the first missing out-of-plane value.
fn spatial_constants(section: &Section) -> ModelResult<(f64, f64, f64, f64)> {
    let p = section.properties();
    let missing = |field: &str| {
        ModelError::validation(
            EntityKind::Section,
            section.id,
            field,
            "3D models need the shear modulus G, torsion constant J and Iy",
        )
    };
    let g = p.g.ok_or_else(|| missing("G"))?;
    let j = p.j.ok_or_else(|| missing("J"))?;
    let iy = p.iy.ok_or_else(|| missing("Iy"))?;
    Ok((g, j, iy, p.iz))
}

fn emit_section(entity: EntityView<'_>, cx: &EmitContext<'_>) -> ModelResult<Vec<String>> {
    let EntityView::Section(section) = entity else {
        return Err(unexpected(entity));
    };
    let p = section.properties();
    let line = if cx.ndm() == 3 {
        let (g, j, iy, iz) = spatial_constants(section)?;
        cx.command("section", &args!["Elastic", section.id, p.e, p.area, iz, iy, g, j])
    } else {
        cx.command("section", &args!["Elastic", section.id, p.e, p.area, p.iz])
    };
    Ok(vec![line])
}

fn emit_node(entity: EntityView<'_>, cx: &EmitContext<'_>) -> ModelResult<Vec<String>> {
    let EntityView::Node(node) = entity else {
        return Err(unexpected(entity));
    };
    let mut arguments: Vec<Arg> = vec![Arg::from(node.id)];
    arguments.extend(node.coords.iter().map(|c| Arg::Num(*c)));
    if let Some(mass) = &node.mass {
        arguments.push(Arg::from("-mass"));
        arguments.extend((0..cx.ndf()).map(|i| Arg::Num(mass.get(i).copied().unwrap_or(0.0))));
    }

    let mut lines = vec![cx.command("node", &arguments)];
    if node.is_restrained() {
        let mut fix = vec![Arg::from(node.id)];
        fix.extend(flag_args(&node.fixed_dofs, cx.ndf()));
        lines.push(cx.command("fix", &fix));
    }
    Ok(lines)
}

/// Orientation vector for a 3D line element: the stored one, or global Z
/// unless the element is vertical, then global X.
fn orientation(element: &Element, vecxz: Option<[f64; 3]>, document: &ModelDocument) -> [f64; 3] {
    if let Some(v) = vecxz {
        return v;
    }
    let ends: Vec<&Node> = element.nodes.iter().filter_map(|id| document.nodes().find(*id)).collect();
    if let [a, b] = ends.as_slice() {
        let axis: Vec<f64> = (0..3)
            .map(|i| b.coords.get(i).copied().unwrap_or(0.0) - a.coords.get(i).copied().unwrap_or(0.0))
            .collect();
        let length = axis.iter().map(|c| c * c).sum::<f64>().sqrt();
        if length > 0.0 && (axis[0].abs() + axis[1].abs()) / length < 1e-9 {
            return [1.0, 0.0, 0.0];
        }
    }
    [0.0, 0.0, 1.0]
}

fn transform_line(
    element: &Element,
    transform: crate::model::GeomTransform,
    vecxz: Option<[f64; 3]>,
    cx: &EmitContext<'_>,
) -> String {
    let mut arguments = args![transform.name(), element.id];
    if cx.ndm() == 3 {
        arguments.extend(orientation(element, vecxz, cx.document).into_iter().map(Arg::Num));
    }
    cx.command("geomTransf", &arguments)
}

fn emit_element(entity: EntityView<'_>, cx: &EmitContext<'_>) -> ModelResult<Vec<String>> {
    let EntityView::Element(element) = entity else {
        return Err(unexpected(entity));
    };
    let id = element.id;
    let nodes = element.nodes.iter().map(|n| Arg::from(*n));

    let lines = match &element.kind {
        ElementKind::Truss(truss) => {
            let mut arguments = args!["truss", id];
            arguments.extend(nodes);
            arguments.extend(args![truss.area, element.material]);
            vec![cx.command("element", &arguments)]
        }
        ElementKind::ElasticBeamColumn(beam) => {
            let section = cx.document.sections().get(element.section)?;
            let p = section.properties();
            let mut arguments = args!["elasticBeamColumn", id];
            arguments.extend(nodes);
            if cx.ndm() == 3 {
                let (g, j, iy, iz) = spatial_constants(section)?;
                arguments.extend(args![p.area, p.e, g, j, iy, iz]);
            } else {
                arguments.extend(args![p.area, p.e, p.iz]);
            }
            arguments.push(Arg::from(id));
            vec![
                transform_line(element, beam.transform, beam.vecxz, cx),
                cx.command("element", &arguments),
            ]
        }
        ElementKind::DispBeamColumn(beam) => {
            let mut arguments = args!["dispBeamColumn", id];
            arguments.extend(nodes);
            arguments.extend(args![id, id]);
            vec![
                transform_line(element, beam.transform, beam.vecxz, cx),
                cx.command(
                    "beamIntegration",
                    &args!["Legendre", id, element.section, beam.integration_points],
                ),
                cx.command("element", &arguments),
            ]
        }
        ElementKind::Quad(quad) => {
            let mut arguments = args!["quad", id];
            arguments.extend(nodes);
            arguments.extend(args![quad.thickness, quad.plane.name(), element.material]);
            vec![cx.command("element", &arguments)]
        }
        ElementKind::StdBrick(_) => {
            let mut arguments = args!["stdBrick", id];
            arguments.extend(nodes);
            arguments.push(Arg::from(element.material));
            vec![cx.command("element", &arguments)]
        }
    };
    Ok(lines)
}

fn emit_constraint(entity: EntityView<'_>, cx: &EmitContext<'_>) -> ModelResult<Vec<String>> {
    let EntityView::Constraint(constraint) = entity else {
        return Err(unexpected(entity));
    };
    let lines = match &constraint.kind {
        ConstraintKind::Fix(fix) => constraint
            .nodes
            .iter()
            .map(|node| {
                let mut arguments = vec![Arg::from(*node)];
                arguments.extend(flag_args(&fix.dofs, cx.ndf()));
                cx.command("fix", &arguments)
            })
            .collect(),
        ConstraintKind::EqualDof(equal) => {
            let tied: Vec<Arg> = equal
                .dofs
                .iter()
                .take(cx.ndf())
                .enumerate()
                .filter(|(_, flag)| **flag)
                .map(|(i, _)| Arg::from(i + 1))
                .collect();
            let (retained, constrained) = constraint.nodes.split_first().ok_or_else(|| unexpected(entity))?;
            constrained
                .iter()
                .map(|node| {
                    let mut arguments = args![*retained, *node];
                    arguments.extend(tied.iter().cloned());
                    cx.command("equalDOF", &arguments)
                })
                .collect()
        }
    };
    Ok(lines)
}

fn emit_load(entity: EntityView<'_>, cx: &EmitContext<'_>) -> ModelResult<Vec<String>> {
    let EntityView::Load(load) = entity else {
        return Err(unexpected(entity));
    };
    let line = match &load.kind {
        LoadKind::NodalLoad(nodal) => {
            let mut arguments = vec![Arg::from(load.target)];
            arguments.extend(nodal.values.iter().map(|v| Arg::Num(*v)));
            cx.command("load", &arguments)
        }
        LoadKind::ImposedDisplacement(imposed) => {
            cx.command("sp", &args![load.target, imposed.dof, imposed.value])
        }
        LoadKind::BeamUniform(beam) => {
            let mut arguments = args!["-ele", load.target, "-type", "-beamUniform", beam.wy];
            if cx.ndm() == 3 {
                arguments.push(Arg::Num(beam.wz.unwrap_or(0.0)));
            }
            if let Some(wx) = beam.wx {
                arguments.push(Arg::Num(wx));
            }
            cx.command("eleLoad", &arguments)
        }
    };
    Ok(vec![line])
}

/// Solver commands of a stage, ending with the command that runs it.
fn emit_analysis(entity: EntityView<'_>, cx: &EmitContext<'_>) -> ModelResult<Vec<String>> {
    let EntityView::Stage(stage) = entity else {
        return Err(unexpected(entity));
    };
    let handler = if cx
        .document
        .constraints()
        .iter()
        .any(|c| matches!(c.kind, ConstraintKind::EqualDof(_)))
    {
        "Transformation"
    } else {
        "Plain"
    };
    let setup = |lines: &mut Vec<String>| {
        lines.push(cx.command("wipeAnalysis", &[]));
        lines.push(cx.command("constraints", &args![handler]));
        lines.push(cx.command("numberer", &args!["RCM"]));
        lines.push(cx.command("system", &args!["BandGeneral"]));
    };

    let mut lines = Vec::new();
    match &stage.analysis {
        AnalysisKind::Static(analysis) => {
            setup(&mut lines);
            lines.push(cx.command("test", &args!["NormDispIncr", analysis.tolerance, analysis.max_iterations]));
            lines.push(cx.command("algorithm", &args!["Newton"]));
            lines.push(cx.command("integrator", &args!["LoadControl", 1.0 / f64::from(analysis.steps.max(1))]));
            lines.push(cx.command("analysis", &args!["Static"]));
            lines.push(cx.command("analyze", &args![analysis.steps]));
        }
        AnalysisKind::Transient(analysis) => {
            setup(&mut lines);
            lines.push(cx.command("test", &args!["NormDispIncr", analysis.tolerance, analysis.max_iterations]));
            lines.push(cx.command("algorithm", &args!["Newton"]));
            lines.push(cx.command("integrator", &args!["Newmark", analysis.gamma, analysis.beta]));
            lines.push(cx.command("analysis", &args!["Transient"]));
            lines.push(cx.command("analyze", &args![analysis.steps, analysis.dt]));
        }
        AnalysisKind::Eigen(eigen) => {
            lines.push(cx.command("eigen", &args![eigen.modes]));
        }
    }
    Ok(lines)
}
