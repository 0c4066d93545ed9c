//! End-to-end conversion of a set of CSV files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::declaration::DeclarationWriter;
use crate::emitter::{FactEmitter, FileReport};
use crate::error::{ConvertError, NameCollision};
use crate::mapper::{EntityMapping, MappingTable, RelationMapper};
use crate::options::ConvertOptions;
use crate::schema::{EntitySchema, InputFile, discover_types, read_schema};

/// Summary of a conversion run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub output_dir: PathBuf,
    /// Path of the declaration file, when one was written.
    pub declaration_file: Option<PathBuf>,
    /// Number of relations declared across all files.
    pub relations: usize,
    /// Per-file fact reports, in input order. Empty when only the schema
    /// was emitted.
    pub files: Vec<FileReport>,
    pub collisions: Vec<NameCollision>,
}

impl RunReport {
    pub fn rows_written(&self) -> u64 {
        self.files.iter().map(|f| f.rows_written).sum()
    }

    pub fn rows_skipped(&self) -> u64 {
        self.files.iter().map(|f| f.rows_skipped).sum()
    }

    pub fn values_cleaned(&self) -> u64 {
        self.files.iter().map(|f| f.values_cleaned).sum()
    }

    /// Write the report as pretty-printed JSON.
    pub async fn write_json(&self, path: &Path) -> Result<(), ConvertError> {
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| ConvertError::io(path, e))
    }
}

/// Convert `inputs` into a Soufflé declaration file and fact files in
/// `output_dir`.
///
/// Any schema error aborts the run before output is written. Relation names
/// depend only on input order, so repeated runs over the same inputs produce
/// identical output.
pub async fn convert(
    inputs: Vec<InputFile>,
    output_dir: &Path,
    options: &ConvertOptions,
) -> Result<RunReport, ConvertError> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| ConvertError::io(output_dir, e))?;

    let schemas = read_schemas(&inputs, options)?;

    let types = run_per_file(
        schemas.clone(),
        options,
        |schema: EntitySchema, options: &ConvertOptions, _: &AtomicBool| {
            discover_types(&schema, options)
        },
    )
    .await?;

    let mut mapper = RelationMapper::new(options);
    for (schema, types) in schemas.into_iter().zip(types) {
        mapper.add(schema, types)?;
    }
    let table = mapper.finish();

    let declaration_file = if options.emit.schema() {
        Some(DeclarationWriter::write(
            &table,
            output_dir,
            &options.declaration_file,
        )?)
    } else {
        None
    };

    let files = if options.emit.facts() {
        emit_facts(&table, output_dir, options).await?
    } else {
        Vec::new()
    };

    let report = RunReport {
        output_dir: output_dir.to_path_buf(),
        declaration_file,
        relations: table.relations().count(),
        files,
        collisions: table.collisions,
    };

    info!(
        files = inputs.len(),
        relations = report.relations,
        rows = report.rows_written(),
        "conversion finished"
    );
    if report.rows_skipped() > 0 {
        warn!(skipped = report.rows_skipped(), "some rows were skipped");
    }

    Ok(report)
}

async fn emit_facts(
    table: &MappingTable,
    output_dir: &Path,
    options: &ConvertOptions,
) -> Result<Vec<FileReport>, ConvertError> {
    let output_dir = output_dir.to_path_buf();
    run_per_file(
        table.entities.clone(),
        options,
        move |mapping: EntityMapping, options: &ConvertOptions, cancel: &AtomicBool| {
            FactEmitter::new(options, &output_dir)
                .with_cancel(cancel)
                .emit(&mapping)
        },
    )
    .await
}

/// Run blocking per-file work with at most `options.jobs` files at once.
///
/// Results come back in input order. The first failure raises the cancel
/// flag handed to `work`; files that have not started are skipped, and every
/// task is joined before the failure is returned.
async fn run_per_file<I, T, F>(
    items: Vec<I>,
    options: &ConvertOptions,
    work: F,
) -> Result<Vec<T>, ConvertError>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I, &ConvertOptions, &AtomicBool) -> Result<T, ConvertError> + Clone + Send + 'static,
{
    let limit = Arc::new(Semaphore::new(options.jobs.max(1)));
    let options = Arc::new(options.clone());
    let cancel = Arc::new(AtomicBool::new(false));
    let mut tasks = JoinSet::new();
    let count = items.len();

    for (index, item) in items.into_iter().enumerate() {
        let limit = Arc::clone(&limit);
        let options = Arc::clone(&options);
        let cancel = Arc::clone(&cancel);
        let work = work.clone();
        tasks.spawn(async move {
            let _permit = limit
                .acquire_owned()
                .await
                .map_err(|e| ConvertError::Internal(e.to_string()))?;
            if cancel.load(Ordering::Relaxed) {
                return Err(ConvertError::Cancelled);
            }
            let result = tokio::task::spawn_blocking(move || work(item, &*options, &*cancel))
                .await
                .map_err(|e| ConvertError::Internal(e.to_string()))?;
            result.map(|value| (index, value))
        });
    }

    let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined.map_err(|e| ConvertError::Internal(e.to_string())) {
            Ok(Ok((index, value))) => results[index] = Some(value),
            Ok(Err(e)) | Err(e) => {
                cancel.store(true, Ordering::Relaxed);
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }

    results
        .into_iter()
        .map(|r| r.ok_or_else(|| ConvertError::Internal("missing task result".to_string())))
        .collect()
}

/// Parse every input header, in order. The first bad header aborts.
pub fn read_schemas(
    inputs: &[InputFile],
    options: &ConvertOptions,
) -> Result<Vec<EntitySchema>, ConvertError> {
    let mut schemas = Vec::with_capacity(inputs.len());
    for input in inputs {
        let schema = read_schema(input, options)?;
        debug!(
            file = %schema.display_name(),
            kind = %schema.kind,
            columns = schema.columns.len(),
            "parsed header"
        );
        schemas.push(schema);
    }
    Ok(schemas)
}
