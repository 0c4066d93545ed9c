//! Error types for the conversion pipeline.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::schema::{ColumnRole, EntityKind};

/// Fatal problem with a CSV header. Aborts the whole file.
#[derive(Debug, Error)]
#[error("{}: {kind}", .file.display())]
pub struct SchemaError {
    /// File whose header is malformed.
    pub file: PathBuf,
    /// What is wrong with it.
    pub kind: SchemaErrorKind,
}

impl SchemaError {
    pub(crate) fn new(file: &Path, kind: SchemaErrorKind) -> Self {
        Self {
            file: file.to_path_buf(),
            kind,
        }
    }

    /// Name of the offending column, if the error concerns a single column.
    pub fn column(&self) -> Option<&str> {
        match &self.kind {
            SchemaErrorKind::UnknownType { column, .. }
            | SchemaErrorKind::DuplicateRole { column, .. }
            | SchemaErrorKind::RoleNotAllowed { column, .. }
            | SchemaErrorKind::MissingKey { column } => Some(column),
            _ => None,
        }
    }
}

/// The different ways a header can be rejected.
#[derive(Debug, Error)]
pub enum SchemaErrorKind {
    /// The file has no header row.
    #[error("missing header row")]
    MissingHeader,

    /// A property column has no name.
    #[error("column {position} has an empty name")]
    EmptyColumnName { position: usize },

    /// The type token after `:` is not a Neo4j type.
    #[error("column `{column}` has unknown type `{token}`")]
    UnknownType { column: String, token: String },

    /// A role that may appear once was found twice.
    #[error("column `{column}` repeats the {role} role")]
    DuplicateRole { column: String, role: ColumnRole },

    /// A role that does not belong in this kind of file.
    #[error("column `{column}` has role {role}, which is not allowed in a {kind} file")]
    RoleNotAllowed {
        column: String,
        role: ColumnRole,
        kind: EntityKind,
    },

    /// A required role is absent.
    #[error("missing required {0} column")]
    MissingRole(ColumnRole),

    /// An array or label column in a node file without an `:ID` to key it.
    #[error("column `{column}` needs an :ID column to key its tuples")]
    MissingKey { column: String },

    /// Column layout was requested for a node file without an `:ID`.
    #[error("column layout requires an :ID column")]
    ColumnLayoutWithoutId,

    /// IO error while reading the header.
    #[error("failed to read header: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV reader rejected the header line.
    #[error("failed to parse header: {0}")]
    Csv(#[from] csv::Error),
}

/// A data row that could not be converted.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{}:{line}{}: {kind}", .file.display(), in_column(.column))]
pub struct RowError {
    /// Source file.
    pub file: PathBuf,
    /// 1-based line number of the record in the source file.
    pub line: u64,
    /// Column the error concerns, when it is tied to one.
    pub column: Option<String>,
    /// What went wrong.
    pub kind: RowErrorKind,
}

fn in_column(column: &Option<String>) -> String {
    column
        .as_deref()
        .map(|c| format!(" column `{}`", c))
        .unwrap_or_default()
}

/// The different ways a data row can be rejected.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowErrorKind {
    /// A value does not parse as its declared type.
    #[error("invalid {expected} value `{value}`")]
    InvalidValue {
        expected: &'static str,
        value: String,
    },

    /// An integer does not fit Soufflé's `number`.
    #[error("`{value}` does not fit a {bits}-bit number")]
    OutOfRange { value: String, bits: u32 },

    /// An identifier column is empty.
    #[error("empty identifier")]
    EmptyId,

    /// The row has a different number of fields than the header.
    #[error("expected {expected} fields, found {actual}")]
    FieldCount { expected: usize, actual: usize },

    /// The `:TYPE` column is empty and no fallback type was given.
    #[error("empty relationship type")]
    MissingType,

    /// The `:TYPE` value was not seen during type discovery.
    #[error("relationship type `{value}` was not discovered")]
    UnknownType { value: String },

    /// The record is not valid UTF-8.
    #[error("invalid UTF-8")]
    InvalidUtf8,
}

/// Two relations asked for the same name. Recovered by suffixing.
#[derive(Debug, Clone, Error, Serialize)]
#[error("relation name `{requested}` from {} already taken, using `{resolved}`", .file.display())]
pub struct NameCollision {
    /// Name after sanitizing, before resolution.
    pub requested: String,
    /// Name actually used.
    pub resolved: String,
    /// File whose relation was renamed.
    pub file: PathBuf,
}

/// Errors that abort a conversion run.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Header error.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Row error in strict mode.
    #[error("row error: {0}")]
    Row(#[from] RowError),

    /// IO error on a specific path.
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV reader failure that cannot be attributed to a single row.
    #[error("CSV error in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Report serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another file failed first and this one was abandoned.
    #[error("cancelled after another file failed")]
    Cancelled,

    /// A worker task panicked or was cancelled.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
