// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! shardline-schema: field layout of vertex and edge records.
//!
//! A [`Schema`] is loaded and validated once before any conversion worker
//! starts. After that it is immutable and shared (`Arc<Schema>`) by every
//! worker without locking.
//!
//! Vertex and edge entity-type codes are separate namespaces: vertex type `0`
//! and edge type `0` are different entities.

mod decl;
mod dtype;
mod schema;

pub use decl::{EntityDecl, FieldDecl, SchemaConfig};
pub use dtype::{Dtype, UnknownDtype};
pub use schema::{EntitySchema, FieldSpec, Schema, SchemaError, SCHEMA_CONFIG_KEY};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Entity-type code carried in column 0 of every raw record.
pub type EntityType = u8;

/// Whether an entity type describes vertices or edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Vertex records, keyed by their own identifier.
    Vertex,
    /// Edge records, keyed by their source identifier.
    Edge,
}

impl EntityKind {
    /// Both kinds, vertices first.
    pub const ALL: [EntityKind; 2] = [EntityKind::Vertex, EntityKind::Edge];

    /// Lowercase name (`"vertex"` / `"edge"`).
    pub const fn name(self) -> &'static str {
        match self {
            EntityKind::Vertex => "vertex",
            EntityKind::Edge => "edge",
        }
    }

    /// Role whose value decides the slice of a record of this kind.
    pub const fn slice_role(self) -> FieldRole {
        match self {
            EntityKind::Vertex => FieldRole::Id,
            EntityKind::Edge => FieldRole::Source,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Semantic meaning of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    /// Primary identifier of a vertex.
    Id,
    /// Identifier of an edge's source vertex.
    Source,
    /// Identifier of an edge's destination vertex.
    Destination,
    /// Sampling weight.
    Weight,
    /// Generic typed attribute.
    Attribute,
}

impl FieldRole {
    /// `true` for roles that must carry exactly one raw value.
    pub const fn is_single_valued(self) -> bool {
        !matches!(self, FieldRole::Attribute)
    }

    /// Lowercase name as used in config files.
    pub const fn name(self) -> &'static str {
        match self {
            FieldRole::Id => "id",
            FieldRole::Source => "source",
            FieldRole::Destination => "destination",
            FieldRole::Weight => "weight",
            FieldRole::Attribute => "attribute",
        }
    }
}

impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
