//! # Results Store
//!
//! Hierarchical on-disk storage for analysis output.
//!
//! ```text
//! <root>/
//!   ModelDefinition/
//!     Nodes/<id>.json  Elements/<id>.json  Materials/ ...  (frozen model)
//!   AnalysisResults/
//!     <run_id>/
//!       run.json                      run manifest
//!       time_steps                    time value of each committed step
//!       NodeResults/<id>/<field>.series
//!       ElementResults/<id>/<field>.series
//! ```
//!
//! Each series is a fixed-stride file (see [`series`]): appending writes one
//! record at the end, reading step `t` seeks straight to it. A run has one
//! writer at a time, guarded by a lock on its manifest; any number of
//! readers may open series while the writer appends.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fem_core::results::{ResultKind, ResultsStore, RunInfo};
//!
//! let mut store = ResultsStore::open("results")?;
//! let run = store.create_run(RunInfo::generate().with_time_step(0.01))?;
//! store.append_step(&run, ResultKind::Node, 3, "disp", &[0.0, -0.002, 0.0])?;
//! store.finish_run(&run)?;
//!
//! let disp = store.get_series(&run, ResultKind::Node, 3, "disp")?;
//! for record in disp.iter() {
//!     println!("{:?}", record?);
//! }
//! # Ok::<(), fem_core::errors::ModelError>(())
//! ```

pub mod series;
mod writer;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::ModelDocument;
use crate::errors::{ModelError, ModelResult};
use crate::file_io::{read_to_string, write_atomic};
use crate::model::{Element, EntityId, Node};
use crate::serializer::{EntityRecord, ModelTree, NodeRecord};

pub use series::{Series, SeriesIter};

use writer::RunWriter;

pub(crate) const MANIFEST_FILE: &str = "run.json";
pub(crate) const TIME_STEPS_FILE: &str = "time_steps";
pub(crate) const SERIES_EXTENSION: &str = "series";
const MODEL_DIR: &str = "ModelDefinition";
const RUNS_DIR: &str = "AnalysisResults";

/// Values of one field at one step, keyed by entity id.
pub type StepResults = BTreeMap<EntityId, Vec<f64>>;

// ============================================================================
// Identifiers
// ============================================================================

/// Name of a run. Used as a directory name, so limited to letters, digits,
/// `_`, `-` and `.` (not leading).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunId(String);

impl RunId {
    pub fn new(id: impl Into<String>) -> ModelResult<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(ModelError::invalid_input(
                "run_id",
                id,
                "run ids use letters, digits, '_', '-' and '.' and may not start with '.'",
            ));
        }
        Ok(RunId(id))
    }

    /// Fresh random id
    pub fn generate() -> Self {
        RunId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RunId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunId::new(s)
    }
}

impl TryFrom<String> for RunId {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RunId::new(value)
    }
}

impl From<RunId> for String {
    fn from(id: RunId) -> Self {
        id.0
    }
}

/// Which branch of a run a series belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResultKind {
    Node,
    Element,
}

impl ResultKind {
    pub const ALL: [ResultKind; 2] = [ResultKind::Node, ResultKind::Element];

    pub fn name(&self) -> &'static str {
        match self {
            ResultKind::Node => "node",
            ResultKind::Element => "element",
        }
    }

    pub(crate) fn directory(&self) -> &'static str {
        match self {
            ResultKind::Node => "NodeResults",
            ResultKind::Element => "ElementResults",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResultKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "node" | "nodes" => Ok(ResultKind::Node),
            "element" | "elements" => Ok(ResultKind::Element),
            _ => Err(ModelError::invalid_input("kind", s, "expected 'node' or 'element'")),
        }
    }
}

/// Run manifest, stored as `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Time increment per step. Without it the time of step `t` is `t`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_step: Option<f64>,
    pub started_at: DateTime<Utc>,
}

impl RunInfo {
    pub fn new(run_id: RunId) -> Self {
        RunInfo {
            run_id,
            analysis_type: None,
            description: None,
            time_step: None,
            started_at: Utc::now(),
        }
    }

    /// Manifest for a run with a generated id
    pub fn generate() -> Self {
        RunInfo::new(RunId::generate())
    }

    pub fn with_analysis_type(mut self, analysis_type: impl Into<String>) -> Self {
        self.analysis_type = Some(analysis_type.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_time_step(mut self, dt: f64) -> Self {
        self.time_step = Some(dt);
        self
    }
}

pub(crate) fn series_path(run_dir: &Path, kind: ResultKind, entity_id: EntityId, field: &str) -> PathBuf {
    run_dir
        .join(kind.directory())
        .join(entity_id.to_string())
        .join(format!("{}.{}", field, SERIES_EXTENSION))
}

fn io_error(operation: &str, path: &Path, e: std::io::Error) -> ModelError {
    ModelError::file_error(operation, path.display().to_string(), e.to_string())
}

// ============================================================================
// Store
// ============================================================================

/// Handle on a results directory.
///
/// Reads go straight to disk and see whatever the writer has committed.
/// Writes go through one [`RunWriter`] per run, opened on first append and
/// kept until [`ResultsStore::finish_run`] or drop. Dropping a store without
/// finishing leaves the last step uncommitted until a writer reopens the run
/// and finishes it.
#[derive(Debug)]
pub struct ResultsStore {
    root: PathBuf,
    sync_appends: bool,
    writers: HashMap<RunId, RunWriter>,
}

impl ResultsStore {
    /// Open (creating if needed) the store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> ModelResult<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [root.join(MODEL_DIR), root.join(RUNS_DIR)] {
            fs::create_dir_all(&dir).map_err(|e| io_error("create directory", &dir, e))?;
        }
        debug!(root = %root.display(), "opened results store");
        Ok(ResultsStore {
            root,
            sync_appends: false,
            writers: HashMap::new(),
        })
    }

    /// Flush every appended record to disk before returning.
    pub fn with_sync_appends(mut self, sync: bool) -> Self {
        self.sync_appends = sync;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(RUNS_DIR).join(run_id.as_str())
    }

    fn not_found(run_id: &RunId, path: &Path) -> ModelError {
        ModelError::ResultsNotFound {
            run_id: run_id.to_string(),
            path: path.display().to_string(),
        }
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// Start a new run and take the writer role for it.
    pub fn create_run(&mut self, info: RunInfo) -> ModelResult<RunId> {
        let run_id = info.run_id.clone();
        let dir = self.run_dir(&run_id);
        if dir.exists() {
            return Err(ModelError::invalid_input("run_id", run_id.as_str(), "a run with this id already exists"));
        }
        fs::create_dir_all(&dir).map_err(|e| io_error("create directory", &dir, e))?;
        let manifest = serde_json::to_string_pretty(&info).map_err(ModelError::serialization)?;
        write_atomic(&dir.join(MANIFEST_FILE), manifest.as_bytes())?;

        let writer = RunWriter::open(&dir, info, self.sync_appends)?;
        self.writers.insert(run_id.clone(), writer);
        info!(run = %run_id, "started results run");
        Ok(run_id)
    }

    /// Manifest of a run.
    pub fn run_info(&self, run_id: &RunId) -> ModelResult<RunInfo> {
        let path = self.run_dir(run_id).join(MANIFEST_FILE);
        if !path.exists() {
            return Err(Self::not_found(run_id, &path));
        }
        let text = read_to_string(&path)?;
        serde_json::from_str(&text)
            .map_err(|e| ModelError::corrupt_run(run_id.as_str(), format!("unreadable manifest: {}", e)))
    }

    /// Ids of every run with a manifest, sorted.
    pub fn list_runs(&self) -> ModelResult<Vec<RunId>> {
        let dir = self.root.join(RUNS_DIR);
        let entries = fs::read_dir(&dir).map_err(|e| io_error("read directory", &dir, e))?;
        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error("read directory", &dir, e))?;
            if !entry.path().join(MANIFEST_FILE).exists() {
                continue;
            }
            match RunId::new(entry.file_name().to_string_lossy()) {
                Ok(run_id) => runs.push(run_id),
                Err(_) => warn!(path = %entry.path().display(), "ignoring run directory with an invalid name"),
            }
        }
        runs.sort();
        Ok(runs)
    }

    /// Commit the final steps of a run and release the writer role for it.
    /// Returns false if this store was not writing it.
    pub fn finish_run(&mut self, run_id: &RunId) -> ModelResult<bool> {
        match self.writers.remove(run_id) {
            Some(writer) => writer.finish().map(|_| true),
            None => Ok(false),
        }
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Extend one series by one record and return the step index written.
    ///
    /// The first append to a series fixes its width. Every series of a run
    /// must record step 0 before any series records step 1; a series that
    /// shows up later is rejected. A step is committed once every series has
    /// recorded it, and [`ResultsStore::finish_run`] commits the last one.
    pub fn append_step(
        &mut self,
        run_id: &RunId,
        kind: ResultKind,
        entity_id: EntityId,
        field: &str,
        values: &[f64],
    ) -> ModelResult<u64> {
        if !self.writers.contains_key(run_id) {
            let info = self.run_info(run_id)?;
            let writer = RunWriter::open(&self.run_dir(run_id), info, self.sync_appends)?;
            self.writers.insert(run_id.clone(), writer);
        }
        let writer = self
            .writers
            .get_mut(run_id)
            .ok_or_else(|| ModelError::Internal { message: "run writer missing".to_string() })?;
        writer.append(kind, entity_id, field, values)
    }

    // ========================================================================
    // Reading
    // ========================================================================

    fn time_series(&self, run_id: &RunId) -> ModelResult<Option<Series>> {
        let dir = self.run_dir(run_id);
        if !dir.join(MANIFEST_FILE).exists() {
            return Err(Self::not_found(run_id, &dir));
        }
        let path = dir.join(TIME_STEPS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Series::open(&path, run_id.as_str()).map(Some)
    }

    /// Number of fully committed steps.
    pub fn committed_steps(&self, run_id: &RunId) -> ModelResult<usize> {
        Ok(self.time_series(run_id)?.map_or(0, |series| series.len()))
    }

    /// Time value of each committed step.
    pub fn time_steps(&self, run_id: &RunId) -> ModelResult<Vec<f64>> {
        match self.time_series(run_id)? {
            Some(series) => series.iter().map(|record| record.map(|values| values[0])).collect(),
            None => Ok(Vec::new()),
        }
    }

    /// Lazy view of one series.
    pub fn get_series(
        &self,
        run_id: &RunId,
        kind: ResultKind,
        entity_id: EntityId,
        field: &str,
    ) -> ModelResult<Series> {
        let dir = self.run_dir(run_id);
        if !dir.join(MANIFEST_FILE).exists() {
            return Err(Self::not_found(run_id, &dir));
        }
        Series::open(&series_path(&dir, kind, entity_id, field), run_id.as_str())
    }

    /// Values of `field` at a committed `step` for every entity of `kind`
    /// recording that field.
    ///
    /// Fails with `StepOutOfRange` past the committed step count. A committed
    /// step is complete, so a series missing it means the store was damaged
    /// and fails with `CorruptResultsStore` rather than being left out.
    pub fn get_step(&self, run_id: &RunId, kind: ResultKind, field: &str, step: usize) -> ModelResult<StepResults> {
        let committed = self.committed_steps(run_id)?;
        if step >= committed {
            return Err(ModelError::StepOutOfRange {
                run_id: run_id.to_string(),
                step: step as u64,
                committed: committed as u64,
            });
        }

        let mut results = StepResults::new();
        let run_dir = self.run_dir(run_id);
        let kind_dir = run_dir.join(kind.directory());
        if !kind_dir.exists() {
            return Ok(results);
        }
        let entries = fs::read_dir(&kind_dir).map_err(|e| io_error("read directory", &kind_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error("read directory", &kind_dir, e))?;
            let Ok(entity_id) = entry.file_name().to_string_lossy().parse::<EntityId>() else {
                continue;
            };
            let path = series_path(&run_dir, kind, entity_id, field);
            if !path.exists() {
                continue;
            }
            let series = Series::open(&path, run_id.as_str())?;
            if step >= series.len() {
                return Err(ModelError::corrupt_run(
                    run_id.as_str(),
                    format!("{} {} '{}' lacks committed step {}", kind.name(), entity_id, field, step),
                ));
            }
            results.insert(entity_id, series.get(step)?);
        }
        Ok(results)
    }

    // ========================================================================
    // Model definition
    // ========================================================================

    /// Freeze the model the results belong to. Replaces any earlier snapshot.
    pub fn write_model_definition(&self, document: &ModelDocument) -> ModelResult<()> {
        document.require_valid()?;
        let tree = ModelTree::from_document(document)?;
        let groups = [
            ("Nodes", to_values(&tree.nodes)?),
            ("Elements", to_values(&tree.elements)?),
            ("Materials", to_values(&tree.materials)?),
            ("Sections", to_values(&tree.sections)?),
            ("Constraints", to_values(&tree.constraints)?),
            ("Loads", to_values(&tree.loads)?),
            ("Stages", to_values(&tree.stages)?),
        ];

        let model_dir = self.root.join(MODEL_DIR);
        for (name, records) in groups {
            let dir = model_dir.join(name);
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| io_error("clear directory", &dir, e))?;
            }
            fs::create_dir_all(&dir).map_err(|e| io_error("create directory", &dir, e))?;
            for (id, record) in records {
                let text = serde_json::to_string_pretty(&record).map_err(ModelError::serialization)?;
                write_atomic(&dir.join(format!("{}.json", id)), text.as_bytes())?;
            }
        }
        info!(root = %self.root.display(), entities = document.len(), "wrote model definition");
        Ok(())
    }

    /// Nodes of the frozen model, by id.
    pub fn read_model_nodes(&self) -> ModelResult<Vec<Node>> {
        self.read_model_records::<NodeRecord>("Nodes")?
            .iter()
            .map(NodeRecord::to_node)
            .collect()
    }

    /// Elements of the frozen model, by id.
    pub fn read_model_elements(&self) -> ModelResult<Vec<Element>> {
        self.read_model_records::<EntityRecord>("Elements")?
            .iter()
            .map(|record| Element::from_properties(record.id, &record.type_tag, record.name.clone(), &record.properties))
            .collect()
    }

    fn read_model_records<R: DeserializeOwned>(&self, group: &str) -> ModelResult<Vec<R>> {
        let dir = self.root.join(MODEL_DIR).join(group);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|e| io_error("read directory", &dir, e))?;
        let mut records = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error("read directory", &dir, e))?.path();
            let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<EntityId>().ok())
            else {
                continue;
            };
            let record: R = serde_json::from_str(&read_to_string(&path)?).map_err(ModelError::serialization)?;
            records.push((id, record));
        }
        records.sort_by_key(|(id, _)| *id);
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }
}

/// Records as JSON values paired with their ids.
fn to_values<R: Serialize>(records: &[R]) -> ModelResult<Vec<(EntityId, serde_json::Value)>> {
    records
        .iter()
        .map(|record| {
            let value = serde_json::to_value(record).map_err(ModelError::serialization)?;
            let id = value
                .get("id")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| ModelError::Internal { message: "record without an id".to_string() })?;
            Ok((id, value))
        })
        .collect()
}
