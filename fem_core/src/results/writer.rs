//! The single writer of a results run.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{ModelError, ModelResult};
use crate::file_io::FileLock;
use crate::model::EntityId;
use crate::results::series::SeriesWriter;
use crate::results::{io_error, ResultKind, RunId, RunInfo, MANIFEST_FILE, SERIES_EXTENSION, TIME_STEPS_FILE};

type SeriesKey = (ResultKind, EntityId, String);

/// Open append handles for one run, guarded by the run's lock.
///
/// The set of series a run records is fixed during step 0: once any series
/// has written step 1, a series that never wrote step 0 is rejected. Step
/// `t` is committed when every series has written it, or when the run is
/// finished. The committed step count is the length of the `time_steps`
/// series, so readers never see a committed step that some series lacks.
#[derive(Debug)]
pub(crate) struct RunWriter {
    run_id: RunId,
    dir: PathBuf,
    info: RunInfo,
    time: SeriesWriter,
    series: HashMap<SeriesKey, SeriesWriter>,
    /// No new series may join
    closed: bool,
    sync: bool,
    _lock: FileLock,
}

impl RunWriter {
    /// Take the writer role for an existing run directory, picking up every
    /// series already on disk.
    pub(crate) fn open(dir: &Path, info: RunInfo, sync: bool) -> ModelResult<Self> {
        let run_id = info.run_id.clone();
        let lock = FileLock::acquire(&dir.join(MANIFEST_FILE), format!("results writer {}", run_id))?;
        let time = SeriesWriter::open(&dir.join(TIME_STEPS_FILE), 1, run_id.as_str())?;

        let mut series = HashMap::new();
        for kind in ResultKind::ALL {
            for (entity_id, field, path) in existing_series(dir, kind)? {
                series.insert((kind, entity_id, field), SeriesWriter::open(&path, 1, run_id.as_str())?);
            }
        }
        let closed = time.len() > 0 || series.values().any(|writer| writer.len() > 1);

        let mut writer = RunWriter {
            run_id,
            dir: dir.to_path_buf(),
            info,
            time,
            series,
            closed,
            sync,
            _lock: lock,
        };
        writer.commit()?;
        debug!(run = %writer.run_id, series = writer.series.len(), committed = writer.time.len(), "opened run writer");
        Ok(writer)
    }

    /// Append one record to one series and return the step it holds.
    pub(crate) fn append(
        &mut self,
        kind: ResultKind,
        entity_id: EntityId,
        field: &str,
        values: &[f64],
    ) -> ModelResult<u64> {
        check_field(field)?;
        if values.is_empty() {
            return Err(ModelError::invalid_input("values", "[]", "a step needs at least one value"));
        }

        let key = (kind, entity_id, field.to_string());
        if !self.series.contains_key(&key) {
            if self.closed {
                return Err(ModelError::invalid_input(
                    "series",
                    format!("{} {} '{}'", kind.name(), entity_id, field),
                    "every series of a run must record step 0 before any series records step 1",
                ));
            }
            let dir = self.dir.join(kind.directory()).join(entity_id.to_string());
            fs::create_dir_all(&dir).map_err(|e| io_error("create directory", &dir, e))?;
            let path = super::series_path(&self.dir, kind, entity_id, field);
            let writer = SeriesWriter::open(&path, values.len() as u32, self.run_id.as_str())?;
            self.series.insert(key.clone(), writer);
        }
        let writer = self
            .series
            .get_mut(&key)
            .ok_or_else(|| ModelError::Internal { message: "series writer missing".to_string() })?;
        if writer.width() as usize != values.len() {
            return Err(ModelError::invalid_input(
                "values",
                format!("{} values", values.len()),
                format!("{} {} '{}' records {} values per step", kind.name(), entity_id, field, writer.width()),
            ));
        }
        writer.append(values, self.sync)?;
        let step = writer.len() - 1;
        if step > 0 {
            self.closed = true;
        }
        self.commit()?;
        Ok(step)
    }

    /// Extend `time_steps` up to the shortest series. Nothing commits while
    /// step 0 is still open to new series.
    fn commit(&mut self) -> ModelResult<()> {
        if !self.closed {
            return Ok(());
        }
        let complete = self.series.values().map(SeriesWriter::len).min().unwrap_or(0);
        while self.time.len() < complete {
            let next = self.time.len();
            let time = match self.info.time_step {
                Some(dt) => next as f64 * dt,
                None => next as f64,
            };
            self.time.append(&[time], self.sync)?;
        }
        Ok(())
    }

    /// Commit every step all series have written and give up the writer role.
    pub(crate) fn finish(mut self) -> ModelResult<u64> {
        self.closed = true;
        self.commit()?;
        info!(run = %self.run_id, steps = self.time.len(), series = self.series.len(), "closed run writer");
        Ok(self.time.len())
    }
}

/// `(entity id, field, path)` of every series file of one result kind.
fn existing_series(run_dir: &Path, kind: ResultKind) -> ModelResult<Vec<(EntityId, String, PathBuf)>> {
    let kind_dir = run_dir.join(kind.directory());
    if !kind_dir.exists() {
        return Ok(Vec::new());
    }
    let read_dir = |dir: &Path| fs::read_dir(dir).map_err(|e| io_error("read directory", dir, e));
    let mut found = Vec::new();
    for entity in read_dir(&kind_dir)? {
        let entity = entity.map_err(|e| io_error("read directory", &kind_dir, e))?.path();
        let Some(entity_id) = entity
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.parse::<EntityId>().ok())
        else {
            continue;
        };
        for file in read_dir(&entity)? {
            let path = file.map_err(|e| io_error("read directory", &entity, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SERIES_EXTENSION) {
                continue;
            }
            if let Some(field) = path.file_stem().and_then(|stem| stem.to_str()) {
                found.push((entity_id, field.to_string(), path.clone()));
            }
        }
    }
    Ok(found)
}

/// Field names become file names.
fn check_field(field: &str) -> ModelResult<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ModelError::invalid_input(
            "field",
            field,
            "field names use letters, digits, '_' and '-' only",
        ))
    }
}
