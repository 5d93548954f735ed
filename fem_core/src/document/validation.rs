//! Incremental model validation.
//!
//! Each entity's issues are cached. A mutation marks the touched entity
//! dirty; the next pass re-checks the dirty set plus every entity that refers
//! to it. Stage edits change which entities are active where, so they
//! request a full sweep, as does a change of the base dimension.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::document::ModelDocument;
use crate::errors::{IssueReason, ValidationIssue};
use crate::model::{
    builder_dof_count, fixed_dof_count, Constraint, Element, ElementKind, Entity, EntityId, EntityKind,
    EntityRef, Load, LoadKind, ModelBuilder, Node, Section, Stage,
};

// ============================================================================
// Stage context
// ============================================================================

/// Facts derived from the stage list that per-entity checks depend on.
#[derive(Debug, Default, Clone)]
pub(crate) struct StageContext {
    /// Stage position activating each node, element or constraint
    activation: HashMap<EntityRef, usize>,
    /// First stage position applying each load
    load_stage: HashMap<EntityId, usize>,
    stage_ids: Vec<EntityId>,
    positions: HashMap<EntityId, usize>,
    /// Builder in effect at each stage position
    builders: Vec<Option<ModelBuilder>>,
    base_ndm: Option<u8>,
}

impl StageContext {
    pub(crate) fn build(document: &ModelDocument) -> Self {
        let mut context = StageContext::default();
        for (position, stage) in document.stages.iter().enumerate() {
            context.stage_ids.push(stage.id);
            context.positions.insert(stage.id, position);
            for entity in stage.activation.references() {
                context.activation.entry(entity).or_insert(position);
            }
            for load in &stage.load_ids {
                context.load_stage.entry(*load).or_insert(position);
            }
        }

        context.base_ndm = base_dimension(document, &context.activation);
        let mut current = context.base_ndm.and_then(ModelBuilder::for_dimension);
        for stage in document.stages.iter() {
            if let Some(builder) = stage.builder {
                current = Some(builder);
            }
            context.builders.push(current);
        }
        context
    }

    /// Stage position at which an entity becomes active; `None` for the base
    /// model (or, for loads, when no stage applies it).
    pub(crate) fn stage_of(&self, entity: EntityRef) -> Option<usize> {
        match entity.kind {
            EntityKind::Load => self.load_stage.get(&entity.id).copied(),
            _ => self.activation.get(&entity).copied(),
        }
    }

    pub(crate) fn position_of(&self, stage: EntityId) -> Option<usize> {
        self.positions.get(&stage).copied()
    }

    pub(crate) fn stage_id(&self, position: usize) -> EntityId {
        self.stage_ids.get(position).copied().unwrap_or_default()
    }

    /// Builder in effect at a stage position (or for the base model).
    pub(crate) fn builder_at(&self, position: Option<usize>) -> Option<ModelBuilder> {
        match position {
            Some(position) => self.builders.get(position).copied().flatten(),
            None => self.base_ndm.and_then(ModelBuilder::for_dimension),
        }
    }

    pub(crate) fn base_ndm(&self) -> Option<u8> {
        self.base_ndm
    }

    /// Whether any stage, or the implicit one of an unstaged document,
    /// builds a 3D model. An unknown dimension counts as 3D, the same
    /// fallback script generation uses.
    pub(crate) fn has_spatial_stage(&self) -> bool {
        let spatial = |builder: Option<ModelBuilder>| builder.unwrap_or(ModelBuilder::FALLBACK).ndm == 3;
        if self.builders.is_empty() {
            spatial(self.builder_at(None))
        } else {
            self.builders.iter().copied().any(spatial)
        }
    }
}

/// Dimension of the first base-model node with a valid coordinate count.
pub(crate) fn base_dimension(document: &ModelDocument, activation: &HashMap<EntityRef, usize>) -> Option<u8> {
    document
        .nodes
        .iter()
        .filter(|node| !activation.contains_key(&node.entity_ref()))
        .find_map(|node| fixed_dof_count(node.dimension()).map(|_| node.dimension() as u8))
}

// ============================================================================
// Validator
// ============================================================================

#[derive(Debug)]
pub(crate) struct Validator {
    issues: HashMap<EntityRef, Vec<ValidationIssue>>,
    dirty: BTreeSet<EntityRef>,
    full_sweep: bool,
    context: StageContext,
}

impl Default for Validator {
    fn default() -> Self {
        Validator {
            issues: HashMap::new(),
            dirty: BTreeSet::new(),
            full_sweep: true,
            context: StageContext::default(),
        }
    }
}

impl Validator {
    pub(crate) fn mark_dirty(&mut self, entity: EntityRef) {
        self.dirty.insert(entity);
    }

    pub(crate) fn request_full_sweep(&mut self) {
        self.full_sweep = true;
    }

    pub(crate) fn issues_for(&self, entity: EntityRef) -> Option<&[ValidationIssue]> {
        self.issues.get(&entity).map(Vec::as_slice)
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub(crate) fn context(&self) -> &StageContext {
        &self.context
    }

    /// Bring the cached issues up to date with `document`.
    pub(crate) fn run(&mut self, document: &ModelDocument) {
        let base = base_dimension(document, &self.context.activation);
        if self.full_sweep || base != self.context.base_ndm {
            self.sweep_all(document);
        } else if !self.dirty.is_empty() {
            self.sweep_dirty(document);
        }
    }

    fn sweep_all(&mut self, document: &ModelDocument) {
        self.context = StageContext::build(document);
        self.issues.clear();
        for entity in document.entity_refs() {
            let found = check_entity(document, &self.context, entity);
            self.store(entity, found);
        }
        self.dirty.clear();
        self.full_sweep = false;
        debug!(issues = self.issues.len(), "full validation sweep");
    }

    fn sweep_dirty(&mut self, document: &ModelDocument) {
        let dirty = std::mem::take(&mut self.dirty);
        let mut targets = BTreeSet::new();
        for entity in dirty {
            targets.insert(entity);
            targets.extend(document.references.dependents_of(entity));
        }
        debug!(rechecked = targets.len(), "incremental validation");
        for entity in targets {
            let found = check_entity(document, &self.context, entity);
            self.store(entity, found);
        }
    }

    fn store(&mut self, entity: EntityRef, found: Vec<ValidationIssue>) {
        if found.is_empty() {
            self.issues.remove(&entity);
        } else {
            self.issues.insert(entity, found);
        }
    }
}

// ============================================================================
// Per-entity checks
// ============================================================================

/// All issues of one entity; empty if it does not exist.
pub(crate) fn check_entity(document: &ModelDocument, context: &StageContext, entity: EntityRef) -> Vec<ValidationIssue> {
    let id = entity.id;
    let found = match entity.kind {
        EntityKind::Material => document.materials.find(id).map(|m| payload_issues(entity, m.kind.problems())),
        EntityKind::Section => document.sections.find(id).map(|s| check_section(s, context)),
        EntityKind::Node => document.nodes.find(id).map(|n| check_node(n, context)),
        EntityKind::Element => document.elements.find(id).map(|e| check_element(e, document, context)),
        EntityKind::Constraint => document.constraints.find(id).map(|c| check_constraint(c, document, context)),
        EntityKind::Load => document.loads.find(id).map(|l| check_load(l, document, context)),
        EntityKind::Stage => document.stages.find(id).map(|s| check_stage(s, document, context)),
    };
    found.unwrap_or_default()
}

fn payload_issues(entity: EntityRef, problems: Vec<crate::model::catalog::FieldProblem>) -> Vec<ValidationIssue> {
    problems
        .into_iter()
        .map(|problem| ValidationIssue::new(entity, problem.field, IssueReason::InvalidValue { message: problem.message }))
        .collect()
}

fn dangling(entity: EntityRef, field: &str, target: EntityRef) -> ValidationIssue {
    ValidationIssue::new(
        entity,
        field,
        IssueReason::DanglingReference {
            target_kind: target.kind,
            target_id: target.id,
        },
    )
}

fn invalid(entity: EntityRef, field: &str, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue::new(entity, field, IssueReason::InvalidValue { message: message.into() })
}

/// Flag referenced entities that only become active after `owner` does.
fn check_activation_order(
    issues: &mut Vec<ValidationIssue>,
    context: &StageContext,
    owner: EntityRef,
    owner_stage: Option<usize>,
    field: &str,
    target: EntityRef,
) {
    if let Some(target_stage) = context.stage_of(target) {
        if owner_stage.map_or(true, |own| target_stage > own) {
            issues.push(ValidationIssue::new(
                owner,
                field,
                IssueReason::ActivationOrder {
                    target_kind: target.kind,
                    target_id: target.id,
                    stage_id: context.stage_id(target_stage),
                },
            ));
        }
    }
}

/// Payload checks, plus the out-of-plane constants every section needs once
/// a stage builds a 3D model.
fn check_section(section: &Section, context: &StageContext) -> Vec<ValidationIssue> {
    let me = section.entity_ref();
    let mut issues = payload_issues(me, section.kind.problems());
    if context.has_spatial_stage() {
        let p = section.properties();
        for (field, value) in [("G", p.g), ("J", p.j), ("Iy", p.iy)] {
            if value.is_none() {
                issues.push(invalid(me, field, format!("{} is required in a 3D model", field)));
            }
        }
    }
    issues
}

fn check_node(node: &Node, context: &StageContext) -> Vec<ValidationIssue> {
    let me = node.entity_ref();
    let mut issues = Vec::new();
    let ndm = node.dimension();

    let Some(flags) = fixed_dof_count(ndm) else {
        issues.push(ValidationIssue::new(me, "coords", IssueReason::InvalidDimension { count: ndm }));
        return issues;
    };

    if node.fixed_dofs.len() != flags {
        issues.push(ValidationIssue::new(
            me,
            "fixed_dofs",
            IssueReason::DofCountMismatch {
                expected: flags,
                actual: node.fixed_dofs.len(),
            },
        ));
    }

    if let Some(mass) = &node.mass {
        if mass.len() != ndm {
            issues.push(ValidationIssue::new(
                me,
                "mass",
                IssueReason::LengthMismatch {
                    expected: ndm,
                    actual: mass.len(),
                },
            ));
        } else if mass.iter().any(|m| !(m.is_finite() && *m >= 0.0)) {
            issues.push(invalid(me, "mass", "mass values must be finite and non-negative"));
        }
    }

    // Stage-activated nodes are checked against their stage by the stage itself.
    if context.stage_of(me).is_none() {
        if let Some(base) = context.base_ndm() {
            if base as usize != ndm {
                issues.push(ValidationIssue::new(
                    me,
                    "coords",
                    IssueReason::DimensionMismatch {
                        expected: base,
                        found: ndm as u8,
                    },
                ));
            }
        }
    }
    issues
}

fn check_element(element: &Element, document: &ModelDocument, context: &StageContext) -> Vec<ValidationIssue> {
    let me = element.entity_ref();
    let own_stage = context.stage_of(me);
    let mut issues = Vec::new();

    for node in &element.nodes {
        let target = EntityRef::new(EntityKind::Node, *node);
        if document.nodes.contains(*node) {
            check_activation_order(&mut issues, context, me, own_stage, "nodes", target);
        } else {
            issues.push(dangling(me, "nodes", target));
        }
    }

    let expected = element.kind.node_count();
    if element.nodes.len() != expected {
        issues.push(ValidationIssue::new(
            me,
            "nodes",
            IssueReason::NodeCountMismatch {
                expected: expected.to_string(),
                actual: element.nodes.len(),
            },
        ));
    }
    let distinct: HashSet<_> = element.nodes.iter().collect();
    if distinct.len() != element.nodes.len() {
        issues.push(invalid(me, "nodes", "an element cannot connect the same node twice"));
    }

    match document.materials.find(element.material) {
        None => issues.push(dangling(me, "material", EntityRef::new(EntityKind::Material, element.material))),
        Some(material) => {
            if element.kind.is_continuum() && !material.is_nd() {
                issues.push(invalid(me, "material", format!("{} elements need a continuum material", element.type_tag())));
            } else if matches!(element.kind, ElementKind::Truss(_)) && material.is_nd() {
                issues.push(invalid(me, "material", "truss elements need a uniaxial material"));
            }
        }
    }

    if !document.sections.contains(element.section) {
        issues.push(dangling(me, "section", EntityRef::new(EntityKind::Section, element.section)));
    }

    issues.extend(payload_issues(me, element.kind.problems()));
    issues
}

fn check_constraint(constraint: &Constraint, document: &ModelDocument, context: &StageContext) -> Vec<ValidationIssue> {
    let me = constraint.entity_ref();
    let own_stage = context.stage_of(me);
    let mut issues = Vec::new();

    for node in &constraint.nodes {
        let target = EntityRef::new(EntityKind::Node, *node);
        if document.nodes.contains(*node) {
            check_activation_order(&mut issues, context, me, own_stage, "nodes", target);
        } else {
            issues.push(dangling(me, "nodes", target));
        }
    }

    if let Err(expected) = constraint.kind.check_node_count(constraint.nodes.len()) {
        issues.push(ValidationIssue::new(
            me,
            "nodes",
            IssueReason::NodeCountMismatch {
                expected: expected.to_string(),
                actual: constraint.nodes.len(),
            },
        ));
    }

    let first = constraint.nodes.iter().find_map(|id| document.nodes.find(*id));
    if let Some(flags) = first.and_then(|node| fixed_dof_count(node.dimension())) {
        let actual = constraint.kind.dofs().len();
        if actual != flags {
            issues.push(ValidationIssue::new(
                me,
                "dofs",
                IssueReason::DofCountMismatch { expected: flags, actual },
            ));
        }
    }

    issues.extend(payload_issues(me, constraint.kind.problems()));
    issues
}

fn check_load(load: &Load, document: &ModelDocument, context: &StageContext) -> Vec<ValidationIssue> {
    let me = load.entity_ref();
    let target = load.target_ref();
    let load_stage = context.stage_of(me);
    let mut issues = Vec::new();

    match target.kind {
        EntityKind::Element => match document.elements.find(target.id) {
            None => issues.push(dangling(me, "target", target)),
            Some(element) => {
                if matches!(load.kind, LoadKind::BeamUniform(_)) && !element.kind.is_beam_column() {
                    issues.push(invalid(
                        me,
                        "target",
                        format!("{} element {} does not accept beam loads", element.type_tag(), element.id),
                    ));
                }
            }
        },
        _ => match document.nodes.find(target.id) {
            None => issues.push(dangling(me, "target", target)),
            Some(node) => {
                let ndf = context
                    .builder_at(load_stage)
                    .map(|builder| builder.ndf as usize)
                    .or_else(|| builder_dof_count(node.dimension()));
                if let Some(ndf) = ndf {
                    match &load.kind {
                        LoadKind::NodalLoad(nodal) if nodal.values.len() != ndf => {
                            issues.push(ValidationIssue::new(
                                me,
                                "values",
                                IssueReason::LengthMismatch {
                                    expected: ndf,
                                    actual: nodal.values.len(),
                                },
                            ));
                        }
                        LoadKind::ImposedDisplacement(imposed) if imposed.dof > ndf => {
                            issues.push(invalid(me, "dof", format!("dof {} exceeds the {} dofs per node", imposed.dof, ndf)));
                        }
                        _ => {}
                    }
                }
            }
        },
    }

    if load_stage.is_some() && document.contains(target) {
        check_activation_order(&mut issues, context, me, load_stage, "target", target);
    }

    issues.extend(payload_issues(me, load.kind.problems()));
    issues
}

fn check_stage(stage: &Stage, document: &ModelDocument, context: &StageContext) -> Vec<ValidationIssue> {
    let me = stage.entity_ref();
    let position = context.position_of(stage.id);
    let mut issues = Vec::new();

    for load in &stage.load_ids {
        if !document.loads.contains(*load) {
            issues.push(dangling(me, "load_ids", EntityRef::new(EntityKind::Load, *load)));
        }
    }

    for target in stage.activation.references() {
        let field = match target.kind {
            EntityKind::Node => "node_ids",
            EntityKind::Element => "element_ids",
            _ => "constraint_ids",
        };
        if !document.contains(target) {
            issues.push(dangling(me, field, target));
            continue;
        }
        if let (Some(first), Some(own)) = (context.stage_of(target), position) {
            if first != own {
                issues.push(invalid(
                    me,
                    field,
                    format!("{} is already activated by stage {}", target, context.stage_id(first)),
                ));
            }
        }
    }

    if let Some(builder) = &stage.builder {
        if let Some(problem) = builder.problem() {
            issues.push(invalid(me, "model_builder", problem));
        }
    }

    let expected = context.builder_at(position).map(|builder| builder.ndm);
    if let Some(expected) = expected {
        for node in stage.activation.nodes.iter().filter_map(|id| document.nodes.find(*id)) {
            let found = node.dimension();
            if fixed_dof_count(found).is_none() || found == expected as usize {
                continue;
            }
            let reason = if stage.builder.is_some() {
                IssueReason::DimensionMismatch {
                    expected,
                    found: found as u8,
                }
            } else {
                IssueReason::StageDimensionMismatch {
                    node_id: node.id,
                    expected,
                    found: found as u8,
                }
            };
            issues.push(ValidationIssue::new(me, "node_ids", reason));
        }
    }

    issues.extend(payload_issues(me, stage.analysis.problems()));
    issues
}
