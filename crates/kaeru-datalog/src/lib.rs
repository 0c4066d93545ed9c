//! Neo4j bulk-import CSV to Soufflé EDB conversion.
//!
//! This crate provides functionality to:
//! - Parse Neo4j-style CSV headers into typed entity schemas
//! - Map node and relationship files to Soufflé relations
//! - Stream rows into tab-separated `.facts` files
//! - Render the consolidated `.decl`/`.input` declaration file

mod coerce;
mod declaration;
mod emitter;
mod error;
pub mod mapper;
pub mod naming;
pub mod options;
mod pipeline;
pub mod schema;

pub use coerce::{Coercer, clean_symbol};
pub use declaration::DeclarationWriter;
pub use emitter::{FactEmitter, FileReport, RelationReport};
pub use error::{
    ConvertError, NameCollision, RowError, RowErrorKind, SchemaError, SchemaErrorKind,
};
pub use mapper::{EntityMapping, MappingTable, Relation, RelationMapper, SouffleType};
pub use options::{
    ConvertOptions, EmitTarget, ErrorMode, IdType, NodeLayout, NumberWidth, TabPolicy,
};
pub use pipeline::{RunReport, convert, read_schemas};
pub use schema::{
    ColumnRole, ColumnSpec, ColumnType, EntityKind, EntitySchema, InputFile, ValueType,
    discover_types, parse_header, read_schema,
};
