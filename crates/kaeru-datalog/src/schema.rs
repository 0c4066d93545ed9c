//! Parse Neo4j import CSV headers into typed column schemas.
//!
//! Header entries follow the `name:type` convention, with bare `:ROLE`
//! entries for identifiers and relationship endpoints:
//!
//! ```text
//! personId:ID(Person),name,age:int,tags:string[],:LABEL
//! :START_ID(Person),:END_ID(Person),since:int,:TYPE
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{ConvertError, SchemaError, SchemaErrorKind};
use crate::options::{ConvertOptions, IdType};

/// Compiled regex for a single header entry (cached).
///
/// The name is matched lazily so that only the last `:token` suffix is
/// treated as the type or role.
fn header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^(?P<name>.*?)(?::(?P<token>[^:()\[\]]+)(?:\((?P<space>[^)]*)\))?(?P<array>\[\])?)?$")
            .unwrap()
    })
}

/// Whether a CSV file holds nodes or relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Node,
    Relationship,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => write!(f, "node"),
            EntityKind::Relationship => write!(f, "relationship"),
        }
    }
}

/// Semantic role of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Id,
    StartId,
    EndId,
    Type,
    Label,
    Property,
    Ignore,
}

impl ColumnRole {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "ID" => Some(ColumnRole::Id),
            "START_ID" => Some(ColumnRole::StartId),
            "END_ID" => Some(ColumnRole::EndId),
            "TYPE" => Some(ColumnRole::Type),
            "LABEL" => Some(ColumnRole::Label),
            "IGNORE" => Some(ColumnRole::Ignore),
            _ => None,
        }
    }

    fn allowed_in(self, kind: EntityKind) -> bool {
        match self {
            ColumnRole::Property | ColumnRole::Ignore => true,
            ColumnRole::Id | ColumnRole::Label => kind == EntityKind::Node,
            ColumnRole::StartId | ColumnRole::EndId | ColumnRole::Type => {
                kind == EntityKind::Relationship
            }
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnRole::Id => ":ID",
            ColumnRole::StartId => ":START_ID",
            ColumnRole::EndId => ":END_ID",
            ColumnRole::Type => ":TYPE",
            ColumnRole::Label => ":LABEL",
            ColumnRole::Property => "property",
            ColumnRole::Ignore => ":IGNORE",
        };
        f.write_str(s)
    }
}

/// Declared value type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Int,
    Float,
    Boolean,
}

impl ValueType {
    /// Map a Neo4j type token to a value type.
    ///
    /// Temporal and spatial types have no Soufflé counterpart and are kept
    /// as text.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "string" | "char" => Some(ValueType::String),
            "int" | "long" | "short" | "byte" => Some(ValueType::Int),
            "float" | "double" => Some(ValueType::Float),
            "boolean" => Some(ValueType::Boolean),
            "date" | "time" | "localtime" | "datetime" | "localdatetime" | "duration"
            | "point" => Some(ValueType::String),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
        }
    }
}

/// Value type plus array marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnType {
    pub value: ValueType,
    pub array: bool,
}

impl ColumnType {
    pub fn scalar(value: ValueType) -> Self {
        Self {
            value,
            array: false,
        }
    }

    pub fn array(value: ValueType) -> Self {
        Self { value, array: true }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.array {
            write!(f, "array<{}>", self.value.name())
        } else {
            f.write_str(self.value.name())
        }
    }
}

/// One column of a CSV header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    /// Zero-based position in the CSV record.
    pub position: usize,
    /// Column name as written, or the role's default name.
    pub name: String,
    pub role: ColumnRole,
    pub ty: ColumnType,
    /// ID space from a `(Space)` suffix on identifier columns.
    pub id_space: Option<String>,
}

/// Typed schema of one CSV file.
#[derive(Debug, Clone, Serialize)]
pub struct EntitySchema {
    pub file: PathBuf,
    pub kind: EntityKind,
    /// Node label or relationship type supplied by the caller.
    pub label: Option<String>,
    pub columns: Vec<ColumnSpec>,
    /// Number of fields in the header record.
    pub width: usize,
}

impl EntitySchema {
    /// First column with the given role.
    pub fn column(&self, role: ColumnRole) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.role == role)
    }

    pub fn id_column(&self) -> Option<&ColumnSpec> {
        self.column(ColumnRole::Id)
    }

    pub fn type_column(&self) -> Option<&ColumnSpec> {
        self.column(ColumnRole::Type)
    }

    /// Name the relations of this file are derived from, before sanitizing.
    ///
    /// Caller-supplied label first, then the `:ID` space for nodes, then the
    /// file stem.
    pub fn base_name(&self) -> String {
        if let Some(label) = self.label.as_deref().filter(|l| !l.is_empty()) {
            return label.to_string();
        }
        if let Some(space) = self
            .id_column()
            .and_then(|c| c.id_space.as_deref())
            .filter(|s| !s.is_empty())
        {
            return space.to_string();
        }
        self.file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name for log lines and declaration comments.
    pub fn display_name(&self) -> String {
        self.file
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.display().to_string())
    }
}

/// One CSV file to convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    pub path: PathBuf,
    pub kind: EntityKind,
    pub label: Option<String>,
}

impl InputFile {
    pub fn node(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntityKind::Node,
            label: None,
        }
    }

    pub fn relationship(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EntityKind::Relationship,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// CSV reader settings shared by the header parser and the emitter.
pub(crate) fn reader_builder(options: &ConvertOptions) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(options.delimiter)
        .quote(options.quote)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers);
    builder
}

/// Read the header line of an input file and parse it.
///
/// Only the first record is consumed.
pub fn read_schema(input: &InputFile, options: &ConvertOptions) -> Result<EntitySchema, SchemaError> {
    let file = File::open(&input.path).map_err(|e| SchemaError::new(&input.path, e.into()))?;
    let mut reader = reader_builder(options).from_reader(file);
    let header = reader
        .headers()
        .map_err(|e| SchemaError::new(&input.path, e.into()))?
        .clone();

    parse_header(
        &input.path,
        input.kind,
        input.label.as_deref(),
        &header,
        options.id_type,
    )
}

/// Parse an already-read header record into a schema.
pub fn parse_header(
    file: &Path,
    kind: EntityKind,
    label: Option<&str>,
    header: &csv::StringRecord,
    id_type: IdType,
) -> Result<EntitySchema, SchemaError> {
    if header.is_empty() || (header.len() == 1 && header[0].is_empty()) {
        return Err(SchemaError::new(file, SchemaErrorKind::MissingHeader));
    }

    let id_value = match id_type {
        IdType::Number => ValueType::Int,
        IdType::Symbol => ValueType::String,
    };

    let mut columns = Vec::with_capacity(header.len());
    for (position, entry) in header.iter().enumerate() {
        let column = parse_entry(file, position, entry, id_value)?;

        if !column.role.allowed_in(kind) {
            return Err(SchemaError::new(
                file,
                SchemaErrorKind::RoleNotAllowed {
                    column: entry.to_string(),
                    role: column.role,
                    kind,
                },
            ));
        }

        let unique = !matches!(column.role, ColumnRole::Property | ColumnRole::Ignore);
        if unique && columns.iter().any(|c: &ColumnSpec| c.role == column.role) {
            return Err(SchemaError::new(
                file,
                SchemaErrorKind::DuplicateRole {
                    column: entry.to_string(),
                    role: column.role,
                },
            ));
        }

        columns.push(column);
    }

    let schema = EntitySchema {
        file: file.to_path_buf(),
        kind,
        label: label.map(str::to_string),
        columns,
        width: header.len(),
    };

    match kind {
        EntityKind::Relationship => {
            for role in [ColumnRole::StartId, ColumnRole::EndId] {
                if schema.column(role).is_none() {
                    return Err(SchemaError::new(file, SchemaErrorKind::MissingRole(role)));
                }
            }
        }
        EntityKind::Node => {
            if schema.id_column().is_none()
                && let Some(keyed) = schema
                    .columns
                    .iter()
                    .find(|c| c.role == ColumnRole::Label || (c.role == ColumnRole::Property && c.ty.array))
            {
                return Err(SchemaError::new(
                    file,
                    SchemaErrorKind::MissingKey {
                        column: keyed.name.clone(),
                    },
                ));
            }
        }
    }

    Ok(schema)
}

fn parse_entry(
    file: &Path,
    position: usize,
    entry: &str,
    id_value: ValueType,
) -> Result<ColumnSpec, SchemaError> {
    // The pattern accepts any string: the suffix group is optional.
    let caps = header_regex()
        .captures(entry)
        .ok_or_else(|| SchemaError::new(file, SchemaErrorKind::EmptyColumnName { position }))?;

    let name = caps.name("name").map(|m| m.as_str().trim()).unwrap_or("");
    let token = caps.name("token").map(|m| m.as_str().trim());
    let id_space = caps
        .name("space")
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    let array = caps.name("array").is_some();

    let named = |default: &str| {
        if name.is_empty() {
            default.to_string()
        } else {
            name.to_string()
        }
    };

    if let Some(role) = token.and_then(ColumnRole::from_token) {
        let (name, ty) = match role {
            ColumnRole::Id => (named("id"), ColumnType::scalar(id_value)),
            ColumnRole::StartId => ("start_id".to_string(), ColumnType::scalar(id_value)),
            ColumnRole::EndId => ("end_id".to_string(), ColumnType::scalar(id_value)),
            ColumnRole::Type => ("type".to_string(), ColumnType::scalar(ValueType::String)),
            ColumnRole::Label => (named("label"), ColumnType::array(ValueType::String)),
            ColumnRole::Ignore => (named("ignored"), ColumnType::scalar(ValueType::String)),
            ColumnRole::Property => unreachable!("`{}` is not a role token", entry),
        };
        return Ok(ColumnSpec {
            position,
            name,
            role,
            ty,
            id_space,
        });
    }

    if name.is_empty() {
        return Err(SchemaError::new(
            file,
            SchemaErrorKind::EmptyColumnName { position },
        ));
    }

    let value = match token {
        None => ValueType::String,
        Some(token) => ValueType::from_token(token).ok_or_else(|| {
            SchemaError::new(
                file,
                SchemaErrorKind::UnknownType {
                    column: name.to_string(),
                    token: token.to_string(),
                },
            )
        })?,
    };

    Ok(ColumnSpec {
        position,
        name: name.to_string(),
        role: ColumnRole::Property,
        ty: ColumnType { value, array },
        id_space: None,
    })
}

/// Collect the distinct `:TYPE` values of a relationship file.
///
/// Streams the file once, decoding only the type column. Rows with an empty
/// type fall back to the schema's label when one was supplied. Rows that are
/// too short or not valid UTF-8 are left for the emitter to report.
pub fn discover_types(
    schema: &EntitySchema,
    options: &ConvertOptions,
) -> Result<BTreeSet<String>, ConvertError> {
    let mut types = BTreeSet::new();
    let Some(type_column) = schema.type_column() else {
        return Ok(types);
    };

    let file = File::open(&schema.file).map_err(|e| ConvertError::io(&schema.file, e))?;
    let mut reader = reader_builder(options).from_reader(file);
    let mut record = csv::ByteRecord::new();

    loop {
        match reader.read_byte_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) if e.is_io_error() => {
                return Err(ConvertError::Csv {
                    path: schema.file.clone(),
                    source: e,
                });
            }
            Err(_) => continue,
        }

        let Some(raw) = record.get(type_column.position) else {
            continue;
        };
        let Ok(value) = std::str::from_utf8(raw) else {
            continue;
        };

        if !value.is_empty() {
            if !types.contains(value) {
                types.insert(value.to_string());
            }
        } else if let Some(label) = schema.label.as_deref().filter(|l| !l.is_empty()) {
            types.insert(label.to_string());
        }
    }

    Ok(types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    fn header(fields: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    fn parse(kind: EntityKind, fields: &[&str]) -> Result<EntitySchema, SchemaError> {
        parse_header(
            Path::new("people.csv"),
            kind,
            None,
            &header(fields),
            IdType::Number,
        )
    }

    #[test]
    fn test_node_header_basic() {
        let schema = parse(EntityKind::Node, &["id:ID", "name:string", "age:int"]).unwrap();

        assert_eq!(schema.width, 3);
        assert_eq!(schema.columns.len(), 3);
        assert_eq!(schema.columns[0].role, ColumnRole::Id);
        assert_eq!(schema.columns[0].name, "id");
        assert_eq!(schema.columns[0].ty, ColumnType::scalar(ValueType::Int));
        assert_eq!(schema.columns[1].name, "name");
        assert_eq!(schema.columns[1].ty, ColumnType::scalar(ValueType::String));
        assert_eq!(schema.columns[2].ty, ColumnType::scalar(ValueType::Int));
        assert_eq!(schema.base_name(), "people");
    }

    #[test]
    fn test_bare_property_defaults_to_string() {
        let schema = parse(EntityKind::Node, &[":ID", "nickname"]).unwrap();
        assert_eq!(schema.columns[1].ty, ColumnType::scalar(ValueType::String));
    }

    #[test]
    fn test_id_space_names_node_relation() {
        let schema = parse(EntityKind::Node, &["personId:ID(Person)", "name"]).unwrap();
        let id = schema.id_column().unwrap();
        assert_eq!(id.name, "personId");
        assert_eq!(id.id_space.as_deref(), Some("Person"));
        assert_eq!(schema.base_name(), "Person");
    }

    #[test]
    fn test_label_beats_id_space() {
        let schema = parse_header(
            Path::new("people.csv"),
            EntityKind::Node,
            Some("Employee"),
            &header(&[":ID(Person)"]),
            IdType::Number,
        )
        .unwrap();
        assert_eq!(schema.base_name(), "Employee");
    }

    #[test]
    fn test_symbol_id_type() {
        let schema = parse_header(
            Path::new("people.csv"),
            EntityKind::Node,
            None,
            &header(&[":ID", "name"]),
            IdType::Symbol,
        )
        .unwrap();
        assert_eq!(schema.columns[0].ty, ColumnType::scalar(ValueType::String));
    }

    #[test]
    fn test_array_and_label_columns() {
        let schema = parse(EntityKind::Node, &[":ID", "tags:string[]", ":LABEL"]).unwrap();
        assert_eq!(schema.columns[1].ty, ColumnType::array(ValueType::String));
        assert_eq!(schema.columns[1].role, ColumnRole::Property);
        assert_eq!(schema.column(ColumnRole::Label).unwrap().name, "label");
    }

    #[test]
    fn test_name_may_contain_colon() {
        let schema = parse(EntityKind::Node, &[":ID", "a:b:int"]).unwrap();
        assert_eq!(schema.columns[1].name, "a:b");
        assert_eq!(schema.columns[1].ty, ColumnType::scalar(ValueType::Int));
    }

    #[test]
    fn test_ignore_column() {
        let schema = parse(EntityKind::Node, &[":ID", "junk:IGNORE", ":IGNORE", "name"]).unwrap();
        assert_eq!(schema.columns[1].role, ColumnRole::Ignore);
        assert_eq!(schema.columns[1].name, "junk");
        assert_eq!(schema.columns[2].name, "ignored");
        assert_eq!(schema.columns[3].role, ColumnRole::Property);
    }

    #[test]
    fn test_relationship_header() {
        let schema = parse(
            EntityKind::Relationship,
            &["since:int", ":END_ID(Person)", ":TYPE", ":START_ID(Person)"],
        )
        .unwrap();
        assert_eq!(schema.column(ColumnRole::StartId).unwrap().position, 3);
        assert_eq!(schema.column(ColumnRole::EndId).unwrap().position, 1);
        assert_eq!(schema.type_column().unwrap().position, 2);
    }

    #[test_case(&[":START_ID"], ColumnRole::EndId ; "missing end")]
    #[test_case(&[":END_ID", "weight:float"], ColumnRole::StartId ; "missing start")]
    fn test_relationship_requires_endpoints(fields: &[&str], missing: ColumnRole) {
        let err = parse(EntityKind::Relationship, fields).unwrap_err();
        match err.kind {
            SchemaErrorKind::MissingRole(role) => assert_eq!(role, missing),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_type_names_column() {
        let err = parse(EntityKind::Node, &[":ID", "age:integer"]).unwrap_err();
        assert_eq!(err.column(), Some("age"));
        assert!(err.to_string().contains("people.csv"));
        assert!(err.to_string().contains("integer"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = parse(EntityKind::Node, &["a:ID", "b:ID"]).unwrap_err();
        assert!(matches!(
            err.kind,
            SchemaErrorKind::DuplicateRole {
                role: ColumnRole::Id,
                ..
            }
        ));
    }

    #[test_case(EntityKind::Node, ":START_ID" ; "start in node file")]
    #[test_case(EntityKind::Node, ":TYPE" ; "type in node file")]
    #[test_case(EntityKind::Relationship, ":ID" ; "id in relationship file")]
    #[test_case(EntityKind::Relationship, ":LABEL" ; "label in relationship file")]
    fn test_role_not_allowed(kind: EntityKind, entry: &str) {
        let fields = match kind {
            EntityKind::Node => vec![entry],
            EntityKind::Relationship => vec![":START_ID", ":END_ID", entry],
        };
        let err = parse(kind, &fields).unwrap_err();
        assert!(matches!(err.kind, SchemaErrorKind::RoleNotAllowed { .. }));
    }

    #[test]
    fn test_array_without_id_rejected() {
        let err = parse(EntityKind::Node, &["name", "tags:string[]"]).unwrap_err();
        assert_eq!(err.column(), Some("tags"));
    }

    #[test]
    fn test_empty_property_name_rejected() {
        let err = parse(EntityKind::Node, &[":ID", ""]).unwrap_err();
        assert!(matches!(
            err.kind,
            SchemaErrorKind::EmptyColumnName { position: 1 }
        ));
    }

    #[test_case("string", ValueType::String)]
    #[test_case("STRING", ValueType::String)]
    #[test_case("long", ValueType::Int)]
    #[test_case("INT", ValueType::Int)]
    #[test_case("double", ValueType::Float)]
    #[test_case("boolean", ValueType::Boolean)]
    #[test_case("datetime", ValueType::String)]
    fn test_type_tokens(token: &str, expected: ValueType) {
        assert_eq!(ValueType::from_token(token), Some(expected));
    }

    #[test]
    fn test_read_schema_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id:ID, name:string ,age:int").unwrap();
        writeln!(file, "1,Ada,36").unwrap();

        let schema = read_schema(&InputFile::node(file.path()), &ConvertOptions::default()).unwrap();
        assert_eq!(schema.columns[1].name, "name");
        assert_eq!(schema.width, 3);
    }

    #[test]
    fn test_read_schema_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let err =
            read_schema(&InputFile::node(file.path()), &ConvertOptions::default()).unwrap_err();
        assert!(matches!(err.kind, SchemaErrorKind::MissingHeader));
    }

    #[test]
    fn test_discover_types() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, ":START_ID,:END_ID,:TYPE").unwrap();
        writeln!(file, "1,2,KNOWS").unwrap();
        writeln!(file, "2,3,LIKES").unwrap();
        writeln!(file, "3,1,KNOWS").unwrap();
        writeln!(file, "3,4,").unwrap();

        let options = ConvertOptions::default();
        let input = InputFile::relationship(file.path()).with_label("RELATED");
        let schema = read_schema(&input, &options).unwrap();
        let types = discover_types(&schema, &options).unwrap();

        let types: Vec<_> = types.into_iter().collect();
        assert_eq!(types, vec!["KNOWS", "LIKES", "RELATED"]);
    }
}
