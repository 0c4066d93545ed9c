//! Map entity schemas to Soufflé relations.
//!
//! The mapper is the only place that decides relation names, field names
//! and field types. The emitter replays the projections recorded here.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::{NameCollision, SchemaError, SchemaErrorKind};
use crate::naming::{FieldNames, NameTable};
use crate::options::{ConvertOptions, NodeLayout};
use crate::schema::{ColumnRole, ColumnSpec, EntityKind, EntitySchema, ValueType};

/// Soufflé primitive types used in declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SouffleType {
    Symbol,
    Number,
    Float,
}

impl SouffleType {
    /// Booleans have no Soufflé type and are encoded as `0`/`1` numbers.
    pub fn for_value(value: ValueType) -> Self {
        match value {
            ValueType::String => SouffleType::Symbol,
            ValueType::Int | ValueType::Boolean => SouffleType::Number,
            ValueType::Float => SouffleType::Float,
        }
    }
}

impl fmt::Display for SouffleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SouffleType::Symbol => write!(f, "symbol"),
            SouffleType::Number => write!(f, "number"),
            SouffleType::Float => write!(f, "float"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: SouffleType,
}

/// A Soufflé relation declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relation {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Relation {
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    /// File name Soufflé reads this relation from.
    pub fn fact_file(&self) -> String {
        format!("{}.facts", self.name)
    }

    /// The `.decl` statement for this relation.
    pub fn declaration(&self) -> String {
        let params: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{}:{}", f.name, f.ty))
            .collect();
        format!(".decl {}({})", self.name, params.join(","))
    }

    /// The `.input` directive for this relation.
    pub fn input_directive(&self) -> String {
        format!(
            ".input {}(IO=file, filename=\"{}\")",
            self.name,
            self.fact_file()
        )
    }
}

/// How a relation's tuples are read off a CSV row.
///
/// Indices refer to `EntitySchema::columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// One tuple per row, one field per column.
    Tuple(Vec<usize>),
    /// One tuple per element of an array column, prefixed by the key columns.
    Explode { key: Vec<usize>, element: usize },
}

/// A relation together with the projection that fills it.
#[derive(Debug, Clone)]
pub struct Binding {
    pub relation: Relation,
    pub projection: Projection,
}

/// All relations a single row contributes to.
#[derive(Debug, Clone, Default)]
pub struct RelationGroup {
    pub bindings: Vec<Binding>,
}

impl RelationGroup {
    fn push(&mut self, relation: Relation, projection: Projection) {
        self.bindings.push(Binding {
            relation,
            projection,
        });
    }
}

/// Which group a row is routed to.
#[derive(Debug, Clone)]
pub enum Routing {
    /// Every row goes to the same group.
    Fixed(RelationGroup),
    /// Rows are routed by the value of their `:TYPE` column.
    ByType {
        /// Index of the type column in `EntitySchema::columns`.
        column: usize,
        groups: BTreeMap<String, RelationGroup>,
        /// Type used when the column is empty.
        fallback: Option<String>,
    },
}

/// The relations derived from one input file.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    pub schema: EntitySchema,
    pub routing: Routing,
}

impl EntityMapping {
    /// Relation groups in declaration order.
    pub fn groups(&self) -> Vec<&RelationGroup> {
        match &self.routing {
            Routing::Fixed(group) => vec![group],
            Routing::ByType { groups, .. } => groups.values().collect(),
        }
    }

    /// Relations in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.groups()
            .into_iter()
            .flat_map(|g| g.bindings.iter().map(|b| &b.relation))
    }
}

/// Result of mapping every input of a run.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    pub entities: Vec<EntityMapping>,
    pub collisions: Vec<NameCollision>,
}

impl MappingTable {
    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.entities.iter().flat_map(|e| e.relations())
    }
}

/// Builds relations for a run, one schema at a time, in input order.
pub struct RelationMapper<'a> {
    options: &'a ConvertOptions,
    names: NameTable,
    entities: Vec<EntityMapping>,
}

impl<'a> RelationMapper<'a> {
    pub fn new(options: &'a ConvertOptions) -> Self {
        Self {
            options,
            names: NameTable::new(),
            entities: Vec::new(),
        }
    }

    /// Map one schema. `types` are the discovered `:TYPE` values and are
    /// ignored for node files.
    pub fn add(
        &mut self,
        schema: EntitySchema,
        types: BTreeSet<String>,
    ) -> Result<&EntityMapping, SchemaError> {
        let routing = match schema.kind {
            EntityKind::Node => Routing::Fixed(self.map_node(&schema)?),
            EntityKind::Relationship => self.map_relationship(&schema, types),
        };

        let mapping = EntityMapping { schema, routing };
        debug!(
            file = %mapping.schema.file.display(),
            relations = mapping.relations().count(),
            "mapped schema"
        );
        let index = self.entities.len();
        self.entities.push(mapping);
        Ok(&self.entities[index])
    }

    pub fn finish(self) -> MappingTable {
        MappingTable {
            entities: self.entities,
            collisions: self.names.into_collisions(),
        }
    }

    fn map_node(&mut self, schema: &EntitySchema) -> Result<RelationGroup, SchemaError> {
        let mut group = RelationGroup::default();
        let id = index_of(schema, ColumnRole::Id);
        let name = self.names.claim(&schema.base_name(), &schema.file);

        match self.options.layout {
            NodeLayout::Row => {
                let columns: Vec<usize> = id
                    .into_iter()
                    .chain(scalar_indices(schema))
                    .collect();
                let relation = relation(&name, schema, &columns);
                group.push(relation, Projection::Tuple(columns));
            }
            NodeLayout::Column => {
                let Some(id) = id else {
                    return Err(SchemaError::new(
                        &schema.file,
                        SchemaErrorKind::ColumnLayoutWithoutId,
                    ));
                };
                group.push(relation(&name, schema, &[id]), Projection::Tuple(vec![id]));

                for property in scalar_indices(schema) {
                    let column = &schema.columns[property];
                    let prop_name = self
                        .names
                        .claim(&format!("{}_{}", name, column.name), &schema.file);
                    let columns = vec![id, property];
                    group.push(
                        relation(&prop_name, schema, &columns),
                        Projection::Tuple(columns),
                    );
                }
            }
        }

        // Label and array columns are rejected by the parser without an id.
        if let Some(id) = id {
            for element in junction_indices(schema) {
                self.push_junction(&mut group, &name, schema, vec![id], element);
            }
        }

        Ok(group)
    }

    fn map_relationship(&mut self, schema: &EntitySchema, types: BTreeSet<String>) -> Routing {
        match index_of(schema, ColumnRole::Type) {
            Some(column) => {
                let groups = types
                    .into_iter()
                    .map(|ty| {
                        let group = self.relationship_group(schema, &ty);
                        (ty, group)
                    })
                    .collect();
                Routing::ByType {
                    column,
                    groups,
                    fallback: schema.label.clone().filter(|l| !l.is_empty()),
                }
            }
            None => Routing::Fixed(self.relationship_group(schema, &schema.base_name())),
        }
    }

    /// Relations for one relationship type: `start_id, end_id` first, then
    /// the scalar properties in source order.
    fn relationship_group(&mut self, schema: &EntitySchema, type_name: &str) -> RelationGroup {
        let mut group = RelationGroup::default();
        let name = self.names.claim(type_name, &schema.file);

        let key = endpoint_indices(schema);
        let columns: Vec<usize> = key.iter().copied().chain(scalar_indices(schema)).collect();
        group.push(relation(&name, schema, &columns), Projection::Tuple(columns));

        for element in junction_indices(schema) {
            self.push_junction(&mut group, &name, schema, key.clone(), element);
        }

        group
    }

    fn push_junction(
        &mut self,
        group: &mut RelationGroup,
        owner: &str,
        schema: &EntitySchema,
        key: Vec<usize>,
        element: usize,
    ) {
        let column = &schema.columns[element];
        let name = self
            .names
            .claim(&format!("{}_{}", owner, column.name), &schema.file);
        let columns: Vec<usize> = key.iter().copied().chain([element]).collect();
        group.push(
            relation(&name, schema, &columns),
            Projection::Explode { key, element },
        );
    }
}

fn index_of(schema: &EntitySchema, role: ColumnRole) -> Option<usize> {
    schema.columns.iter().position(|c| c.role == role)
}

fn scalar_indices(schema: &EntitySchema) -> impl Iterator<Item = usize> + '_ {
    schema
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.role == ColumnRole::Property && !c.ty.array)
        .map(|(i, _)| i)
}

/// Columns that become junction relations: `:LABEL` and array properties.
fn junction_indices(schema: &EntitySchema) -> impl Iterator<Item = usize> + '_ {
    schema
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            c.role == ColumnRole::Label || (c.role == ColumnRole::Property && c.ty.array)
        })
        .map(|(i, _)| i)
}

/// `[start, end]` column indices. The parser guarantees both exist.
fn endpoint_indices(schema: &EntitySchema) -> Vec<usize> {
    [ColumnRole::StartId, ColumnRole::EndId]
        .into_iter()
        .filter_map(|role| index_of(schema, role))
        .collect()
}

fn relation(name: &str, schema: &EntitySchema, columns: &[usize]) -> Relation {
    let mut names = FieldNames::new();
    let fields = columns
        .iter()
        .map(|&i| field(&mut names, &schema.columns[i]))
        .collect();
    Relation {
        name: name.to_string(),
        fields,
    }
}

fn field(names: &mut FieldNames, column: &ColumnSpec) -> Field {
    Field {
        name: names.claim(&column.name),
        ty: SouffleType::for_value(column.ty.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::IdType;
    use crate::schema::parse_header;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn schema(file: &str, kind: EntityKind, fields: &[&str]) -> EntitySchema {
        parse_header(
            Path::new(file),
            kind,
            None,
            &csv::StringRecord::from(fields.to_vec()),
            IdType::Number,
        )
        .unwrap()
    }

    fn declarations(mapping: &EntityMapping) -> Vec<String> {
        mapping.relations().map(Relation::declaration).collect()
    }

    #[test]
    fn test_node_row_layout() {
        let options = ConvertOptions::default();
        let mut mapper = RelationMapper::new(&options);
        let mapping = mapper
            .add(
                schema("node.csv", EntityKind::Node, &["id:ID", "name:string", "age:int"]),
                BTreeSet::new(),
            )
            .unwrap();

        assert_eq!(
            declarations(mapping),
            vec![".decl node(id:number,name:symbol,age:number)"]
        );
    }

    #[test]
    fn test_float_and_boolean_types() {
        let options = ConvertOptions::default();
        let mut mapper = RelationMapper::new(&options);
        let mapping = mapper
            .add(
                schema(
                    "city.csv",
                    EntityKind::Node,
                    &[":ID", "score:double", "capital:boolean"],
                ),
                BTreeSet::new(),
            )
            .unwrap();

        assert_eq!(
            declarations(mapping),
            vec![".decl city(id:number,score:float,capital:number)"]
        );
    }

    #[test]
    fn test_node_junctions() {
        let options = ConvertOptions::default();
        let mut mapper = RelationMapper::new(&options);
        let mapping = mapper
            .add(
                schema(
                    "people.csv",
                    EntityKind::Node,
                    &[":ID(Person)", "name", "tags:string[]", ":LABEL", "skip:IGNORE"],
                ),
                BTreeSet::new(),
            )
            .unwrap();

        assert_eq!(
            declarations(mapping),
            vec![
                ".decl Person(id:number,name:symbol)",
                ".decl Person_tags(id:number,tags:symbol)",
                ".decl Person_label(id:number,label:symbol)",
            ]
        );

        let group = mapping.groups()[0];
        assert_eq!(group.bindings[0].projection, Projection::Tuple(vec![0, 1]));
        assert_eq!(
            group.bindings[1].projection,
            Projection::Explode {
                key: vec![0],
                element: 2
            }
        );
    }

    #[test]
    fn test_node_column_layout() {
        let options = ConvertOptions::default().with_layout(NodeLayout::Column);
        let mut mapper = RelationMapper::new(&options);
        let mapping = mapper
            .add(
                schema("city.csv", EntityKind::Node, &[":ID(City)", "name", "score:int"]),
                BTreeSet::new(),
            )
            .unwrap();

        assert_eq!(
            declarations(mapping),
            vec![
                ".decl City(id:number)",
                ".decl City_name(id:number,name:symbol)",
                ".decl City_score(id:number,score:number)",
            ]
        );
    }

    #[test]
    fn test_column_layout_requires_id() {
        let options = ConvertOptions::default().with_layout(NodeLayout::Column);
        let mut mapper = RelationMapper::new(&options);
        let err = mapper
            .add(schema("city.csv", EntityKind::Node, &["name"]), BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err.kind, SchemaErrorKind::ColumnLayoutWithoutId));
    }

    #[test]
    fn test_relationship_field_order_is_fixed() {
        let options = ConvertOptions::default();
        let mut mapper = RelationMapper::new(&options);
        let mapping = mapper
            .add(
                schema(
                    "knows.csv",
                    EntityKind::Relationship,
                    &["since:int", ":END_ID(Person)", "weight:float", ":START_ID(Person)"],
                ),
                BTreeSet::new(),
            )
            .unwrap();

        assert_eq!(
            declarations(mapping),
            vec![".decl knows(start_id:number,end_id:number,since:number,weight:float)"]
        );
        assert_eq!(
            mapping.groups()[0].bindings[0].projection,
            Projection::Tuple(vec![3, 1, 0, 2])
        );
    }

    #[test]
    fn test_relationship_routed_by_type() {
        let options = ConvertOptions::default();
        let mut mapper = RelationMapper::new(&options);
        let types: BTreeSet<String> = ["LIKES", "KNOWS"].into_iter().map(String::from).collect();
        let mapping = mapper
            .add(
                schema(
                    "rels.csv",
                    EntityKind::Relationship,
                    &[":START_ID", ":END_ID", ":TYPE", "tags:string[]"],
                ),
                types,
            )
            .unwrap();

        assert_eq!(
            declarations(mapping),
            vec![
                ".decl KNOWS(start_id:number,end_id:number)",
                ".decl KNOWS_tags(start_id:number,end_id:number,tags:symbol)",
                ".decl LIKES(start_id:number,end_id:number)",
                ".decl LIKES_tags(start_id:number,end_id:number,tags:symbol)",
            ]
        );
        match &mapping.routing {
            Routing::ByType {
                column, fallback, ..
            } => {
                assert_eq!(*column, 2);
                assert_eq!(*fallback, None);
            }
            Routing::Fixed(_) => panic!("expected routing by type"),
        }
    }

    #[test]
    fn test_collisions_across_files_are_suffixed() {
        let options = ConvertOptions::default();
        let mut mapper = RelationMapper::new(&options);
        mapper
            .add(
                schema("a/person.csv", EntityKind::Node, &[":ID", "name"]),
                BTreeSet::new(),
            )
            .unwrap();
        mapper
            .add(
                schema("b/person.csv", EntityKind::Node, &[":ID", "age:int"]),
                BTreeSet::new(),
            )
            .unwrap();

        let table = mapper.finish();
        let names: Vec<&str> = table.relations().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["person", "person_2"]);
        assert_eq!(table.collisions.len(), 1);
        assert_eq!(table.collisions[0].file, Path::new("b/person.csv"));
    }

    #[test]
    fn test_duplicate_field_names_are_suffixed() {
        let options = ConvertOptions::default();
        let mut mapper = RelationMapper::new(&options);
        let mapping = mapper
            .add(
                schema("n.csv", EntityKind::Node, &["id:ID", "id", "first name"]),
                BTreeSet::new(),
            )
            .unwrap();
        assert_eq!(
            declarations(mapping),
            vec![".decl n(id:number,id_2:symbol,first_name:symbol)"]
        );
    }

    #[test]
    fn test_input_directive() {
        let relation = Relation {
            name: "KNOWS".to_string(),
            fields: vec![],
        };
        assert_eq!(
            relation.input_directive(),
            ".input KNOWS(IO=file, filename=\"KNOWS.facts\")"
        );
    }
}
