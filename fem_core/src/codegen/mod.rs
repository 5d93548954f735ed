//! # Script Generation
//!
//! Turns a validated [`ModelDocument`] into the command script of an
//! analysis engine, in one of two dialects: Tcl (`.tcl`) or OpenSeesPy (`.py`).
//!
//! Declarations follow the entity kind order (materials, sections, nodes,
//! elements, constraints), then each stage's load pattern and analysis
//! commands. From the second stage on, only entities that are new in that
//! stage, or whose definition changed, are emitted again. The same holds for
//! loads: a load an earlier stage applied stays constant and is not applied
//! a second time.
//!
//! Output is deterministic: generating twice from an unchanged document
//! yields byte-identical text.
//!
//! ## Example
//!
//! ```rust
//! use fem_core::codegen::{CodeGenerator, Dialect};
//! use fem_core::document::ModelDocument;
//! use fem_core::model::{Elastic, ElasticSection, Element, Material, Node, Section, Truss};
//!
//! let mut doc = ModelDocument::new();
//! doc.add(Material::new(1, Elastic { e: 200e9 }).unwrap()).unwrap();
//! let section = ElasticSection { e: 200e9, a: 0.01, iz: 1e-5, iy: None, g: None, j: None };
//! doc.add(Section::new(1, section).unwrap()).unwrap();
//! doc.add(Node::new(1, vec![0.0, 0.0]).unwrap().fixed()).unwrap();
//! doc.add(Node::new(2, vec![4.0, 0.0]).unwrap()).unwrap();
//! doc.add(Element::new(1, Truss { area: 0.01 }, vec![1, 2], 1, 1).unwrap()).unwrap();
//!
//! let script = CodeGenerator::new().generate(&doc, Dialect::Tcl).unwrap();
//! assert!(script.text().contains("element truss 1 1 2 0.01 1"));
//! ```

pub mod emitters;
pub mod format;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::document::ModelDocument;
use crate::errors::{ModelError, ModelResult};
use crate::file_io::write_atomic;
use crate::model::{Entity, EntityKind, EntityRef, ModelBuilder, Stage, StaticAnalysis};

pub use emitters::{EmitContext, Emitter, EmitterRegistry, EntityView};
pub use format::{format_number, Arg, CommandWriter};

use format::args;

/// Target script language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// OpenSees Tcl interpreter
    Tcl,
    /// OpenSeesPy
    Python,
}

impl Dialect {
    pub const ALL: [Dialect; 2] = [Dialect::Tcl, Dialect::Python];

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Tcl => "tcl",
            Dialect::Python => "python",
        }
    }

    /// Significant digits used for numbers unless overridden.
    pub fn significant_digits(&self) -> usize {
        match self {
            Dialect::Tcl => 10,
            Dialect::Python => 12,
        }
    }

    /// File extension of exported scripts
    pub fn extension(&self) -> &'static str {
        match self {
            Dialect::Tcl => "tcl",
            Dialect::Python => "py",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcl" | "opensees" => Ok(Dialect::Tcl),
            "python" | "py" | "openseespy" => Ok(Dialect::Python),
            _ => Err(ModelError::invalid_input("dialect", s, "expected 'tcl' or 'python'")),
        }
    }
}

/// A generated script.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub dialect: Dialect,
    pub lines: Vec<String>,
}

impl Script {
    /// Full text, one command per line, newline-terminated.
    pub fn text(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }

    /// Write the script atomically to `path`.
    pub fn write_to(&self, path: &Path) -> ModelResult<()> {
        write_atomic(path, self.text().as_bytes())?;
        info!(path = %path.display(), dialect = %self.dialect, lines = self.lines.len(), "exported script");
        Ok(())
    }
}

/// Definitions already sent to the engine by earlier stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommittedSet {
    entities: BTreeMap<EntityRef, Vec<String>>,
    builder: Option<ModelBuilder>,
}

impl CommittedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, entity: EntityRef) -> bool {
        self.entities.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Model builder most recently declared
    pub fn builder(&self) -> Option<ModelBuilder> {
        self.builder
    }
}

/// Generates scripts from documents.
///
/// Holds no document state; one generator can serve any number of documents
/// and may be shared across threads.
#[derive(Debug, Clone)]
pub struct CodeGenerator {
    registry: EmitterRegistry,
    digits: Option<usize>,
    header: bool,
}

impl Default for CodeGenerator {
    fn default() -> Self {
        CodeGenerator {
            registry: EmitterRegistry::builtin(),
            digits: None,
            header: true,
        }
    }
}

impl CodeGenerator {
    /// Generator with every built-in emitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator using a caller-assembled emitter registry.
    pub fn with_registry(registry: EmitterRegistry) -> Self {
        CodeGenerator { registry, ..Self::default() }
    }

    /// Override the dialect's significant digit count.
    pub fn with_significant_digits(mut self, digits: Option<usize>) -> Self {
        self.digits = digits;
        self
    }

    /// Toggle the leading comment line.
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn registry(&self) -> &EmitterRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EmitterRegistry {
        &mut self.registry
    }

    fn writer(&self, dialect: Dialect) -> CommandWriter {
        CommandWriter::new(dialect, self.digits.unwrap_or_else(|| dialect.significant_digits()))
    }

    /// Generate the complete script for `document`.
    ///
    /// Fails with the first validation issue if the document is not valid,
    /// and with `EntityTypeUnsupported` if any entity has no emitter for the
    /// dialect.
    pub fn generate(&self, document: &ModelDocument, dialect: Dialect) -> ModelResult<Script> {
        document.require_valid()?;
        let writer = self.writer(dialect);

        let mut lines = Vec::new();
        if self.header {
            lines.push(writer.comment(&format!(
                "Generated by trellis: {} entities, {} stages",
                document.len(),
                document.stages().len().max(1)
            )));
        }
        match dialect {
            Dialect::Python => {
                lines.push("import openseespy.opensees as ops".to_string());
                lines.push(String::new());
            }
            Dialect::Tcl => {}
        }
        lines.push(writer.command("wipe", &[]));

        let mut committed = CommittedSet::new();
        if document.stages().is_empty() {
            let implicit = Stage::new(1, StaticAnalysis::default())?.with_loads(document.loads().ids().collect());
            lines.extend(self.stage_lines(document, writer, 0, &implicit, &mut committed)?);
        } else {
            for load in document.loads().iter() {
                if document.activation_stage(load.entity_ref()).is_none() {
                    warn!(load = load.id, "load is referenced by no stage and will not be exported");
                }
            }
            for (position, stage) in document.stages().iter().enumerate() {
                lines.extend(self.stage_lines(document, writer, position, stage, &mut committed)?);
            }
        }

        info!(dialect = %dialect, lines = lines.len(), "generated script");
        Ok(Script { dialect, lines })
    }

    /// Lines for the stage at `position`, given what earlier stages already
    /// committed. `committed` is only updated if the whole stage succeeds.
    pub fn generate_stage(
        &self,
        document: &ModelDocument,
        dialect: Dialect,
        position: usize,
        committed: &mut CommittedSet,
    ) -> ModelResult<Vec<String>> {
        let stage = document.stages().iter().nth(position).ok_or_else(|| {
            ModelError::invalid_input("stage position", position.to_string(), "no stage at this position")
        })?;
        self.stage_lines(document, self.writer(dialect), position, stage, committed)
    }

    fn stage_lines(
        &self,
        document: &ModelDocument,
        writer: CommandWriter,
        position: usize,
        stage: &Stage,
        committed: &mut CommittedSet,
    ) -> ModelResult<Vec<String>> {
        let builder = builder_at(document, position);
        let context = EmitContext { writer, builder, document };
        let series = position + 1;

        let mut lines = vec![writer.comment(&format!("Stage {}: {}", stage.id, stage.label()))];
        if position > 0 {
            lines.push(writer.command("loadConst", &args!["-time", 0.0]));
        }
        if committed.builder != Some(builder) {
            lines.push(writer.command("model", &args!["basic", "-ndm", builder.ndm, "-ndf", builder.ndf]));
        }

        let mut definitions = Vec::new();
        for entity in document.entity_refs() {
            if entity.kind == EntityKind::Load || entity.kind == EntityKind::Stage {
                continue;
            }
            if document.activation_stage(entity).is_some_and(|active| active > position) {
                continue;
            }
            let rendered = self.registry.emit(view_of(document, entity)?, &context)?;
            if committed.entities.get(&entity) != Some(&rendered) {
                definitions.push((entity, rendered));
            }
        }
        debug!(stage = stage.id, changed = definitions.len(), "stage definitions");
        for (_, rendered) in &definitions {
            lines.extend(rendered.iter().cloned());
        }

        // Loads already applied are held constant by loadConst; only new or
        // changed loads enter this stage's pattern.
        let mut applied = Vec::new();
        for id in &stage.load_ids {
            let load = document.loads().get(*id)?;
            let entity = load.entity_ref();
            let rendered = self.registry.emit(EntityView::Load(load), &context)?;
            if committed.entities.get(&entity) != Some(&rendered) {
                applied.push((entity, rendered));
            }
        }
        debug!(stage = stage.id, applied = applied.len(), "stage loads");
        if !applied.is_empty() {
            lines.push(writer.command("timeSeries", &args!["Linear", series]));
            lines.push(writer.pattern_open(series, series));
            for (_, rendered) in &applied {
                lines.extend(rendered.iter().map(|line| format!("{}{}", writer.pattern_indent(), line)));
            }
            lines.extend(writer.pattern_close());
        }
        lines.extend(self.registry.emit(EntityView::Stage(stage), &context)?);

        committed.builder = Some(builder);
        committed.entities.extend(definitions);
        committed.entities.extend(applied);
        Ok(lines)
    }
}

/// Builder in effect at a stage position, falling back to the base
/// dimension and then to a 3D model.
fn builder_at(document: &ModelDocument, position: usize) -> ModelBuilder {
    document
        .stage_builders()
        .get(position)
        .copied()
        .flatten()
        .or_else(|| document.base_dimension().and_then(ModelBuilder::for_dimension))
        .unwrap_or(ModelBuilder::FALLBACK)
}

fn view_of(document: &ModelDocument, entity: EntityRef) -> ModelResult<EntityView<'_>> {
    let id = entity.id;
    Ok(match entity.kind {
        EntityKind::Material => EntityView::Material(document.materials().get(id)?),
        EntityKind::Section => EntityView::Section(document.sections().get(id)?),
        EntityKind::Node => EntityView::Node(document.nodes().get(id)?),
        EntityKind::Element => EntityView::Element(document.elements().get(id)?),
        EntityKind::Constraint => EntityView::Constraint(document.constraints().get(id)?),
        EntityKind::Load => EntityView::Load(document.loads().get(id)?),
        EntityKind::Stage => EntityView::Stage(document.stages().get(id)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Activation, Eigen, Load, NodalLoad, Node};
    use crate::test_support::{staged_truss_document, truss_document};

    fn position_of(lines: &[String], prefix: &str) -> usize {
        lines
            .iter()
            .position(|line| line.starts_with(prefix))
            .unwrap_or_else(|| panic!("no line starting with {prefix:?}"))
    }

    #[test]
    fn test_dialect_parsing() {
        assert_eq!("tcl".parse::<Dialect>().unwrap(), Dialect::Tcl);
        assert_eq!("OpenSeesPy".parse::<Dialect>().unwrap(), Dialect::Python);
        assert_eq!("py".parse::<Dialect>().unwrap(), Dialect::Python);
        assert_eq!("lua".parse::<Dialect>().unwrap_err().error_code(), "INVALID_INPUT");
        assert_eq!(Dialect::Python.extension(), "py");
    }

    #[test]
    fn test_unstaged_tcl_script() {
        let script = CodeGenerator::new().with_header(false).generate(&truss_document(), Dialect::Tcl).unwrap();
        assert_eq!(
            script.lines,
            vec![
                "wipe",
                "# Stage 1: Stage 1",
                "model basic -ndm 2 -ndf 3",
                "uniaxialMaterial Elastic 1 200000000000.0",
                "section Elastic 1 200000000000.0 0.01 8.33e-6",
                "node 1 0.0 0.0",
                "fix 1 1 1 0",
                "node 2 2.0 0.0",
                "node 3 4.0 0.0",
                "element truss 1 1 2 0.01 1",
                "element truss 2 2 3 0.01 1",
                "wipeAnalysis",
                "constraints Plain",
                "numberer RCM",
                "system BandGeneral",
                "test NormDispIncr 1e-6 10",
                "algorithm Newton",
                "integrator LoadControl 1.0",
                "analysis Static",
                "analyze 1",
            ]
        );
        assert!(script.text().ends_with("analyze 1\n"));
    }

    #[test]
    fn test_declarations_precede_elements_in_every_dialect() {
        let doc = truss_document();
        for dialect in Dialect::ALL {
            let lines = CodeGenerator::new().generate(&doc, dialect).unwrap().lines;
            let element = lines.iter().position(|l| l.contains("element")).unwrap();
            let material = lines.iter().position(|l| l.contains("uniaxialMaterial")).unwrap();
            let node = lines.iter().position(|l| l.contains("node")).unwrap();
            assert!(material < element && node < element, "{dialect}: {lines:?}");
        }
    }

    #[test]
    fn test_python_preamble() {
        let lines = CodeGenerator::new().with_header(false).generate(&truss_document(), Dialect::Python).unwrap().lines;
        assert_eq!(lines[0], "import openseespy.opensees as ops");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "ops.wipe()");
        assert!(lines.contains(&"ops.model('basic', '-ndm', 2, '-ndf', 3)".to_string()));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let doc = staged_truss_document();
        let generator = CodeGenerator::new();
        for dialect in Dialect::ALL {
            let first = generator.generate(&doc, dialect).unwrap().text();
            let second = generator.generate(&doc, dialect).unwrap().text();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_second_stage_emits_only_new_entities() {
        let lines = CodeGenerator::new().with_header(false).generate(&staged_truss_document(), Dialect::Tcl).unwrap().lines;
        let second = position_of(&lines, "# Stage 2");
        let stage_two = &lines[second..];

        assert_eq!(stage_two[1], "loadConst -time 0.0");
        assert!(stage_two.contains(&"node 4 6.0 0.0".to_string()));
        assert!(stage_two.contains(&"element truss 3 3 4 0.01 1".to_string()));
        assert!(stage_two.contains(&"    load 4 0.0 -500.0 0.0".to_string()));
        for unchanged in ["node 1", "node 2", "node 3", "element truss 1", "element truss 2", "uniaxialMaterial", "model"] {
            assert!(!stage_two.iter().any(|l| l.starts_with(unchanged)), "{unchanged} re-emitted");
        }
        // Stage 1 must not see entities activated later
        assert!(!lines[..second].iter().any(|l| l.starts_with("node 4")));
        assert_eq!(lines.last().unwrap(), "analyze 5");
    }

    #[test]
    fn test_stage_with_only_a_new_load() {
        let mut doc = staged_truss_document();
        doc.add(Load::new(3, NodalLoad { values: vec![10.0, 0.0, 0.0] }, 2).unwrap()).unwrap();
        doc.add(Stage::new(3, StaticAnalysis::default()).unwrap().with_loads(vec![3])).unwrap();

        let generator = CodeGenerator::new();
        let mut committed = CommittedSet::new();
        for position in 0..2 {
            generator.generate_stage(&doc, Dialect::Tcl, position, &mut committed).unwrap();
        }
        let lines = generator.generate_stage(&doc, Dialect::Tcl, 2, &mut committed).unwrap();

        let declarations: Vec<&String> = lines
            .iter()
            .filter(|l| l.starts_with("node") || l.starts_with("element") || l.starts_with("fix"))
            .collect();
        assert!(declarations.is_empty(), "{declarations:?}");
        let loads: Vec<&String> = lines.iter().filter(|l| l.trim_start().starts_with("load ")).collect();
        assert_eq!(loads, vec!["    load 2 10.0 0.0 0.0"]);
    }

    #[test]
    fn test_modified_entity_is_redefined() {
        let mut doc = staged_truss_document();
        let generator = CodeGenerator::new();
        let mut committed = CommittedSet::new();
        generator.generate_stage(&doc, Dialect::Tcl, 0, &mut committed).unwrap();

        doc.modify::<Node>(2, |node| node.coords = vec![2.0, 0.5]).unwrap();
        let lines = generator.generate_stage(&doc, Dialect::Tcl, 1, &mut committed).unwrap();
        assert!(lines.contains(&"node 2 2.0 0.5".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("node 1 ")));
    }

    #[test]
    fn test_load_kept_across_stages_is_applied_once() {
        let mut doc = staged_truss_document();
        doc.modify::<Stage>(2, |stage| stage.load_ids = vec![1, 2]).unwrap();
        assert!(doc.is_valid(), "{:?}", doc.issues());

        let lines = CodeGenerator::new().generate(&doc, Dialect::Tcl).unwrap().lines;
        let second = position_of(&lines, "# Stage 2");
        let loads = |lines: &[String]| -> Vec<String> {
            lines.iter().map(|l| l.trim().to_string()).filter(|l| l.starts_with("load ")).collect()
        };
        assert_eq!(loads(&lines[..second]), vec!["load 3 0.0 -1000.0 0.0"]);
        assert_eq!(loads(&lines[second..]), vec!["load 4 0.0 -500.0 0.0"]);
    }

    #[test]
    fn test_stage_repeating_only_old_loads_has_no_pattern() {
        let mut doc = staged_truss_document();
        doc.add(Stage::new(3, StaticAnalysis::default()).unwrap().with_loads(vec![1, 2])).unwrap();

        let lines = CodeGenerator::new().generate(&doc, Dialect::Tcl).unwrap().lines;
        let third = &lines[position_of(&lines, "# Stage 3")..];
        assert!(!third.iter().any(|l| l.contains("pattern") || l.contains("timeSeries")), "{third:?}");
        assert_eq!(third.last().unwrap(), "analyze 1");
    }

    #[test]
    fn test_modified_load_is_reapplied_in_full() {
        let mut doc = staged_truss_document();
        doc.modify::<Stage>(2, |stage| stage.load_ids = vec![1, 2]).unwrap();
        let generator = CodeGenerator::new();
        let mut committed = CommittedSet::new();
        generator.generate_stage(&doc, Dialect::Tcl, 0, &mut committed).unwrap();
        assert!(committed.contains(EntityRef::new(EntityKind::Load, 1)));

        doc.modify::<Load>(1, |load| load.kind = NodalLoad { values: vec![0.0, -1200.0, 0.0] }.into())
            .unwrap();
        let lines = generator.generate_stage(&doc, Dialect::Tcl, 1, &mut committed).unwrap();
        let loads: Vec<&str> = lines.iter().map(|l| l.trim()).filter(|l| l.starts_with("load ")).collect();
        assert_eq!(loads, vec!["load 3 0.0 -1200.0 0.0", "load 4 0.0 -500.0 0.0"]);
    }

    #[test]
    fn test_eigen_stage_has_no_pattern() {
        let mut doc = truss_document();
        doc.add(Stage::new(1, Eigen { modes: 3 }).unwrap()).unwrap();
        let lines = CodeGenerator::new().generate(&doc, Dialect::Python).unwrap().lines;
        assert!(!lines.iter().any(|l| l.contains("pattern")));
        assert_eq!(lines.last().unwrap(), "ops.eigen(3)");
    }

    #[test]
    fn test_unstaged_loads_are_skipped_when_staged() {
        let mut doc = truss_document();
        doc.add(Load::new(1, NodalLoad { values: vec![0.0, -1.0, 0.0] }, 3).unwrap()).unwrap();
        doc.add(Stage::new(1, StaticAnalysis::default()).unwrap().activating(Activation::default())).unwrap();
        let text = CodeGenerator::new().generate(&doc, Dialect::Tcl).unwrap().text();
        assert!(!text.contains("load 3"));
        assert!(!text.contains("pattern"));
    }

    #[test]
    fn test_invalid_document_is_rejected() {
        let mut doc = truss_document();
        doc.add(Node::new(9, vec![1.0, 1.0, 1.0]).unwrap()).unwrap();
        let err = CodeGenerator::new().generate(&doc, Dialect::Tcl).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_unsupported_type_aborts_stage() {
        let doc = truss_document();
        let mut generator = CodeGenerator::new();
        generator.registry_mut().unregister(EntityKind::Element, "Truss", Dialect::Tcl);
        let err = generator.generate(&doc, Dialect::Tcl).unwrap_err();
        assert_eq!(err.error_code(), "ENTITY_TYPE_UNSUPPORTED");

        let staged = staged_truss_document();
        let mut committed = CommittedSet::new();
        assert!(generator.generate_stage(&staged, Dialect::Tcl, 0, &mut committed).is_err());
        assert!(committed.is_empty());
        assert!(committed.builder().is_none());

        // The other dialect still works
        assert!(generator.generate_stage(&staged, Dialect::Python, 0, &mut committed).is_ok());
        assert!(!committed.is_empty());
    }

    #[test]
    fn test_significant_digit_override() {
        let mut doc = truss_document();
        doc.modify::<Node>(3, |node| node.coords = vec![1.0 / 3.0, 0.0]).unwrap();
        let text = CodeGenerator::new().with_significant_digits(Some(4)).generate(&doc, Dialect::Tcl).unwrap().text();
        assert!(text.contains("node 3 0.3333 0.0"));
    }

    #[test]
    fn test_script_written_atomically() {
        let path = std::env::temp_dir().join(format!("trellis_test_script_{}.tcl", std::process::id()));
        let script = CodeGenerator::new().generate(&truss_document(), Dialect::Tcl).unwrap();
        script.write_to(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), script.text());
        let _ = std::fs::remove_file(&path);
    }
}
