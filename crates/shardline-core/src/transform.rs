// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Raw record → canonical typed record.
//!
//! A transform runs in two phases. The first is pure: every declared column is
//! checked for presence and cardinality and coerced to its dtype. Only when
//! the whole record passed does the second phase bind string identifiers
//! through the [`IdAllocator`]. A rejected record therefore leaves no trace in
//! shared state, and the caller only ever sees a complete record or an error.

use serde::{Deserialize, Serialize};
use shardline_schema::{Dtype, EntityKind, EntitySchema, EntityType, FieldRole, FieldSpec, Schema};
use thiserror::Error;

use crate::alloc::IdAllocator;
use crate::record::RawRecord;
use crate::value::{coerce, parse_signed, parse_unsigned, AttrValue, CoercionError, EntityId};

/// Why a record could not be transformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// No id is left for a new string identifier.
    #[error("no id left for a new string identifier")]
    IdSpaceExhausted,
    /// Column 0 does not hold exactly one value.
    #[error("entity type column holds {found} values, expected 1")]
    EntityTypeCardinality {
        /// Number of values found.
        found: usize,
    },
    /// Column 0 is not a `u8` code.
    #[error("`{0}` is not an entity type code")]
    BadEntityType(String),
    /// The code is not declared for this kind.
    #[error("{kind} type {entity_type} is not declared in the schema")]
    UnknownEntityType {
        /// Vertex or edge.
        kind: EntityKind,
        /// Undeclared code.
        entity_type: EntityType,
    },
    /// The record has fewer groups than the type declares.
    #[error("column {column} (`{name}`) is missing")]
    MissingField {
        /// First missing column.
        column: usize,
        /// Its declared name.
        name: String,
    },
    /// The record has more groups than the type declares.
    #[error("record has {found} columns, schema declares {expected}")]
    ExtraFields {
        /// Declared column count (including column 0).
        expected: usize,
        /// Columns present.
        found: usize,
    },
    /// A single-valued column does not hold exactly one value.
    #[error("column {column} (`{name}`) holds {found} values, expected 1")]
    Cardinality {
        /// Offending column.
        column: usize,
        /// Its declared name.
        name: String,
        /// Number of values found.
        found: usize,
    },
    /// A value does not parse as its declared dtype.
    #[error("column {column} (`{name}`): {source}")]
    Coercion {
        /// Offending column.
        column: usize,
        /// Its declared name.
        name: String,
        /// Parse failure.
        source: CoercionError,
    },
}

/// Canonical vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexRecord {
    /// Entity-type code.
    pub entity_type: EntityType,
    /// Vertex identifier.
    pub id: EntityId,
    /// Weight, when the type declares one.
    pub weight: Option<f64>,
    /// Attributes in schema order.
    pub attributes: Vec<AttrValue>,
}

/// Canonical edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    /// Entity-type code.
    pub entity_type: EntityType,
    /// Source vertex identifier.
    pub source: EntityId,
    /// Destination vertex identifier.
    pub destination: EntityId,
    /// Weight, when the type declares one.
    pub weight: Option<f64>,
    /// Attributes in schema order.
    pub attributes: Vec<AttrValue>,
}

/// Canonical record written to a partition stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransformedRecord {
    /// A vertex.
    Vertex(VertexRecord),
    /// An edge.
    Edge(EdgeRecord),
}

impl TransformedRecord {
    /// Vertex or edge.
    pub fn kind(&self) -> EntityKind {
        match self {
            TransformedRecord::Vertex(_) => EntityKind::Vertex,
            TransformedRecord::Edge(_) => EntityKind::Edge,
        }
    }

    /// Identifier the record was sliced by (vertex id or edge source).
    pub fn primary_id(&self) -> EntityId {
        match self {
            TransformedRecord::Vertex(v) => v.id,
            TransformedRecord::Edge(e) => e.source,
        }
    }
}

/// Read the entity-type code from column 0.
pub fn entity_type_of(raw: &RawRecord<'_>) -> Result<EntityType, TransformError> {
    let text = raw
        .single(0)
        .map_err(|found| TransformError::EntityTypeCardinality { found })?;
    text.trim_ascii()
        .parse()
        .map_err(|_| TransformError::BadEntityType(text.to_owned()))
}

/// Identifier before allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingId<'a> {
    Numeric(u64),
    Raw(&'a str),
}

/// Result of the pure phase.
struct Parsed<'a> {
    entity_type: EntityType,
    ids: [Option<PendingId<'a>>; 3],
    weight: Option<f64>,
    attributes: Vec<AttrValue>,
}

const ID_SLOT: usize = 0;
const SOURCE_SLOT: usize = 1;
const DESTINATION_SLOT: usize = 2;

fn single<'a>(raw: &RawRecord<'a>, field: &FieldSpec) -> Result<&'a str, TransformError> {
    raw.single(field.column)
        .map_err(|found| TransformError::Cardinality {
            column: field.column,
            name: field.name.clone(),
            found,
        })
}

fn coercion(field: &FieldSpec, source: CoercionError) -> TransformError {
    TransformError::Coercion {
        column: field.column,
        name: field.name.clone(),
        source,
    }
}

fn parse_id<'a>(field: &FieldSpec, text: &'a str) -> Result<PendingId<'a>, TransformError> {
    let dtype = field.dtype;
    if dtype.is_unsigned() {
        parse_unsigned(text, dtype)
            .map(PendingId::Numeric)
            .map_err(|e| coercion(field, e))
    } else if dtype.is_signed() {
        parse_signed(text, dtype)
            .map(|v| PendingId::Numeric(v.cast_unsigned()))
            .map_err(|e| coercion(field, e))
    } else if dtype == Dtype::String {
        Ok(PendingId::Raw(text))
    } else {
        Err(coercion(
            field,
            CoercionError {
                dtype,
                value: text.to_owned(),
            },
        ))
    }
}

fn parse<'a>(entity: &EntitySchema, raw: &RawRecord<'a>) -> Result<Parsed<'a>, TransformError> {
    let expected = entity.column_count();
    if raw.group_count() > expected {
        return Err(TransformError::ExtraFields {
            expected,
            found: raw.group_count(),
        });
    }

    let mut parsed = Parsed {
        entity_type: entity.entity_type(),
        ids: [None; 3],
        weight: None,
        attributes: Vec::new(),
    };

    for field in entity.fields() {
        let Some(values) = raw.group(field.column) else {
            return Err(TransformError::MissingField {
                column: field.column,
                name: field.name.clone(),
            });
        };
        match field.role {
            FieldRole::Id | FieldRole::Source | FieldRole::Destination => {
                let slot = match field.role {
                    FieldRole::Id => ID_SLOT,
                    FieldRole::Source => SOURCE_SLOT,
                    _ => DESTINATION_SLOT,
                };
                parsed.ids[slot] = Some(parse_id(field, single(raw, field)?)?);
            }
            FieldRole::Weight => {
                let scalar = coerce(single(raw, field)?, field.dtype)
                    .map_err(|e| coercion(field, e))?;
                parsed.weight = scalar.as_f64();
            }
            FieldRole::Attribute if field.list => {
                let items = values
                    .iter()
                    .map(|v| coerce(v, field.dtype).map_err(|e| coercion(field, e)))
                    .collect::<Result<Vec<_>, _>>()?;
                parsed.attributes.push(AttrValue::Many(items));
            }
            FieldRole::Attribute => {
                let scalar = coerce(single(raw, field)?, field.dtype)
                    .map_err(|e| coercion(field, e))?;
                parsed.attributes.push(AttrValue::One(scalar));
            }
        }
    }
    Ok(parsed)
}

/// Converts raw records into canonical records for one schema and one run.
#[derive(Clone, Copy)]
pub struct Transformer<'s> {
    schema: &'s Schema,
    allocator: &'s IdAllocator,
}

impl<'s> Transformer<'s> {
    /// Bind a schema and the run's allocator.
    pub fn new(schema: &'s Schema, allocator: &'s IdAllocator) -> Self {
        Self { schema, allocator }
    }

    /// Transform one raw record of `kind`.
    pub fn transform(
        &self,
        kind: EntityKind,
        raw: &RawRecord<'_>,
    ) -> Result<TransformedRecord, TransformError> {
        let entity_type = entity_type_of(raw)?;
        let entity = self
            .schema
            .entity(kind, entity_type)
            .ok_or(TransformError::UnknownEntityType { kind, entity_type })?;
        let parsed = parse(entity, raw)?;

        let raws: Vec<&str> = parsed
            .ids
            .iter()
            .filter_map(|id| match id {
                Some(PendingId::Raw(raw)) => Some(*raw),
                _ => None,
            })
            .collect();
        let mut bound = self
            .allocator
            .resolve_all(&raws)
            .map_err(|_| TransformError::IdSpaceExhausted)?
            .into_iter();
        // Schema validation guarantees the identifier slots for the kind are
        // populated once `parse` succeeded.
        let ids = parsed.ids.map(|id| match id {
            Some(PendingId::Numeric(v)) => EntityId(v),
            Some(PendingId::Raw(_)) => bound.next().map(EntityId).unwrap_or_default(),
            None => EntityId::default(),
        });
        Ok(match kind {
            EntityKind::Vertex => TransformedRecord::Vertex(VertexRecord {
                entity_type: parsed.entity_type,
                id: ids[ID_SLOT],
                weight: parsed.weight,
                attributes: parsed.attributes,
            }),
            EntityKind::Edge => TransformedRecord::Edge(EdgeRecord {
                entity_type: parsed.entity_type,
                source: ids[SOURCE_SLOT],
                destination: ids[DESTINATION_SLOT],
                weight: parsed.weight,
                attributes: parsed.attributes,
            }),
        })
    }
}
