//! Stream CSV rows into Soufflé fact files.
//!
//! Each relation gets a `{relation}.facts` file: one tuple per line, fields
//! separated by a single tab, no header. Files are written to a temporary
//! name in the output directory and renamed into place once the whole input
//! file has been read, so an aborted run never leaves a truncated fact file
//! under its final name.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::coerce::Coercer;
use crate::error::{ConvertError, RowError, RowErrorKind};
use crate::mapper::{EntityMapping, Projection, Relation, RelationGroup, Routing};
use crate::options::ConvertOptions;
use crate::schema::{EntitySchema, reader_builder};

/// Tuples written to one relation.
#[derive(Debug, Clone, Serialize)]
pub struct RelationReport {
    pub relation: String,
    pub fact_file: String,
    pub tuples: u64,
}

/// Outcome of emitting one input file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: PathBuf,
    /// Data rows read (header excluded).
    pub rows_read: u64,
    /// Rows whose facts were written.
    pub rows_written: u64,
    /// Rows rejected in lenient mode.
    pub rows_skipped: u64,
    /// String values that contained tabs or line breaks.
    pub values_cleaned: u64,
    /// The first few row errors, for diagnosis.
    pub errors: Vec<RowError>,
    pub relations: Vec<RelationReport>,
}

impl FileReport {
    fn new(file: &Path) -> Self {
        Self {
            file: file.to_path_buf(),
            rows_read: 0,
            rows_written: 0,
            rows_skipped: 0,
            values_cleaned: 0,
            errors: Vec::new(),
            relations: Vec::new(),
        }
    }
}

/// Buffered writer for one relation's fact file.
struct FactSink {
    relation: String,
    fact_file: String,
    path: PathBuf,
    writer: BufWriter<NamedTempFile>,
    tuples: u64,
}

impl FactSink {
    fn create(output_dir: &Path, relation: &Relation) -> Result<Self, ConvertError> {
        let fact_file = relation.fact_file();
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", fact_file))
            .suffix(".tmp")
            .tempfile_in(output_dir)
            .map_err(|e| ConvertError::io(output_dir, e))?;

        Ok(Self {
            relation: relation.name.clone(),
            path: output_dir.join(&fact_file),
            fact_file,
            writer: BufWriter::new(temp),
            tuples: 0,
        })
    }

    fn write(&mut self, tuple: &str) -> Result<(), ConvertError> {
        writeln!(self.writer, "{}", tuple).map_err(|e| ConvertError::io(&self.path, e))?;
        self.tuples += 1;
        Ok(())
    }

    /// Flush and move the temporary file to its final name.
    fn commit(self) -> Result<RelationReport, ConvertError> {
        let temp = self
            .writer
            .into_inner()
            .map_err(|e| ConvertError::io(&self.path, e.into_error()))?;
        temp.persist(&self.path)
            .map_err(|e| ConvertError::io(&self.path, e.error))?;

        Ok(RelationReport {
            relation: self.relation,
            fact_file: self.fact_file,
            tuples: self.tuples,
        })
    }
}

/// A row-level failure before the file name and line are attached.
struct Rejection {
    column: Option<String>,
    kind: RowErrorKind,
}

impl Rejection {
    fn row(kind: RowErrorKind) -> Self {
        Self { column: None, kind }
    }
}

/// Writes the facts of mapped input files.
pub struct FactEmitter<'a> {
    options: &'a ConvertOptions,
    output_dir: &'a Path,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> FactEmitter<'a> {
    pub fn new(options: &'a ConvertOptions, output_dir: &'a Path) -> Self {
        Self {
            options,
            output_dir,
            cancel: None,
        }
    }

    /// Stop with [`ConvertError::Cancelled`] once `flag` is raised. Fact
    /// files are not committed after that.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn check_cancel(&self) -> Result<(), ConvertError> {
        match self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(ConvertError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Stream one input file into the fact files of its relations.
    ///
    /// Existing fact files are replaced. In strict mode the first bad row
    /// aborts the file and leaves previously written files untouched.
    pub fn emit(&self, mapping: &EntityMapping) -> Result<FileReport, ConvertError> {
        let schema = &mapping.schema;

        let mut sinks = Vec::new();
        let mut sink_index: HashMap<&str, usize> = HashMap::new();
        for relation in mapping.relations() {
            sink_index.insert(relation.name.as_str(), sinks.len());
            sinks.push(FactSink::create(self.output_dir, relation)?);
        }

        let file = File::open(&schema.file).map_err(|e| ConvertError::io(&schema.file, e))?;
        let mut reader = reader_builder(self.options).from_reader(file);
        let mut coercer = Coercer::new(self.options);
        let mut report = FileReport::new(&schema.file);
        let mut record = csv::StringRecord::new();
        let mut tuples: Vec<(usize, String)> = Vec::new();

        loop {
            self.check_cancel()?;
            match reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    let line = match e.kind() {
                        csv::ErrorKind::Utf8 { pos, .. } => pos.as_ref().map(|p| p.line()),
                        _ => None,
                    };
                    let Some(line) = line else {
                        return Err(ConvertError::Csv {
                            path: schema.file.clone(),
                            source: e,
                        });
                    };
                    report.rows_read += 1;
                    self.reject(
                        &mut report,
                        schema,
                        line,
                        Rejection::row(RowErrorKind::InvalidUtf8),
                    )?;
                    continue;
                }
            }

            report.rows_read += 1;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            tuples.clear();
            let built = build_row(mapping, &record, &mut coercer, &sink_index, &mut tuples);
            let cleaned = coercer.take_cleaned();
            match built {
                Ok(()) => {
                    for (sink, tuple) in tuples.drain(..) {
                        sinks[sink].write(&tuple)?;
                    }
                    report.rows_written += 1;
                    report.values_cleaned += cleaned;
                }
                Err(rejection) => self.reject(&mut report, schema, line, rejection)?,
            }
        }

        self.check_cancel()?;
        for sink in sinks {
            report.relations.push(sink.commit()?);
        }

        info!(
            file = %schema.file.display(),
            rows = report.rows_written,
            relations = report.relations.len(),
            "wrote facts"
        );
        if report.rows_skipped > 0 {
            warn!(
                file = %schema.file.display(),
                skipped = report.rows_skipped,
                "skipped rows with invalid values"
            );
        }
        if report.values_cleaned > 0 {
            warn!(
                file = %schema.file.display(),
                cleaned = report.values_cleaned,
                "replaced tabs or line breaks in string values"
            );
        }

        Ok(report)
    }

    fn reject(
        &self,
        report: &mut FileReport,
        schema: &EntitySchema,
        line: u64,
        rejection: Rejection,
    ) -> Result<(), ConvertError> {
        let error = RowError {
            file: schema.file.clone(),
            line,
            column: rejection.column,
            kind: rejection.kind,
        };

        if self.options.is_strict() {
            return Err(ConvertError::Row(error));
        }

        debug!(error = %error, "skipping row");
        report.rows_skipped += 1;
        if report.errors.len() < self.options.max_error_samples {
            report.errors.push(error);
        }
        Ok(())
    }
}

/// Build every tuple a row contributes, without writing any of them.
fn build_row(
    mapping: &EntityMapping,
    record: &csv::StringRecord,
    coercer: &mut Coercer<'_>,
    sink_index: &HashMap<&str, usize>,
    out: &mut Vec<(usize, String)>,
) -> Result<(), Rejection> {
    let schema = &mapping.schema;
    if record.len() != schema.width {
        return Err(Rejection::row(RowErrorKind::FieldCount {
            expected: schema.width,
            actual: record.len(),
        }));
    }

    let group = route(mapping, record)?;
    let mut values: Vec<Option<String>> = vec![None; schema.columns.len()];

    for binding in &group.bindings {
        let sink = sink_index[binding.relation.name.as_str()];
        match &binding.projection {
            Projection::Tuple(columns) => {
                let fields = scalars(schema, record, coercer, &mut values, columns)?;
                out.push((sink, fields.join("\t")));
            }
            Projection::Explode { key, element } => {
                let mut fields = scalars(schema, record, coercer, &mut values, key)?;
                let column = &schema.columns[*element];
                let elements = coercer
                    .elements(&record[column.position], column)
                    .map_err(|kind| Rejection {
                        column: Some(column.name.clone()),
                        kind,
                    })?;
                for value in elements {
                    fields.push(value);
                    out.push((sink, fields.join("\t")));
                    fields.pop();
                }
            }
        }
    }

    Ok(())
}

/// Pick the relation group for a row.
fn route<'m>(
    mapping: &'m EntityMapping,
    record: &csv::StringRecord,
) -> Result<&'m RelationGroup, Rejection> {
    match &mapping.routing {
        Routing::Fixed(group) => Ok(group),
        Routing::ByType {
            column,
            groups,
            fallback,
        } => {
            let raw = &record[mapping.schema.columns[*column].position];
            let key = if raw.is_empty() {
                fallback
                    .as_deref()
                    .ok_or_else(|| Rejection::row(RowErrorKind::MissingType))?
            } else {
                raw
            };
            groups.get(key).ok_or_else(|| {
                Rejection::row(RowErrorKind::UnknownType {
                    value: key.to_string(),
                })
            })
        }
    }
}

/// Coerce the given scalar columns, reusing values already coerced for this
/// row.
fn scalars(
    schema: &EntitySchema,
    record: &csv::StringRecord,
    coercer: &mut Coercer<'_>,
    values: &mut [Option<String>],
    columns: &[usize],
) -> Result<Vec<String>, Rejection> {
    columns
        .iter()
        .map(|&i| {
            if let Some(value) = &values[i] {
                return Ok(value.clone());
            }
            let column = &schema.columns[i];
            let value = coercer
                .scalar(&record[column.position], column)
                .map_err(|kind| Rejection {
                    column: Some(column.name.clone()),
                    kind,
                })?;
            values[i] = Some(value.clone());
            Ok(value)
        })
        .collect()
}
