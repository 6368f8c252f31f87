// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Request categories and typed result arrays.

use std::fmt;
use std::str::FromStr;

use shardline_schema::EntityKind;
use thiserror::Error;

/// Element type of a result array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayDtype {
    /// Signed 64-bit integers (identifiers).
    Long,
    /// Unsigned bytes (entity-type codes).
    Byte,
}

/// Which entities a sampling request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    /// Vertices.
    Vertex,
    /// Edges.
    Edge,
}

const VERTEX_FIELDS: &[ArrayDtype] = &[ArrayDtype::Long];
const EDGE_FIELDS: &[ArrayDtype] = &[ArrayDtype::Long, ArrayDtype::Long, ArrayDtype::Byte];

impl EntityCategory {
    /// Layout of a successful response, one dtype per returned array.
    ///
    /// Vertices yield their ids; edges yield source ids, destination ids and
    /// entity-type codes.
    pub fn fields(self) -> &'static [ArrayDtype] {
        match self {
            EntityCategory::Vertex => VERTEX_FIELDS,
            EntityCategory::Edge => EDGE_FIELDS,
        }
    }

    /// Matching entity kind of the conversion side.
    pub fn kind(self) -> EntityKind {
        match self {
            EntityCategory::Vertex => EntityKind::Vertex,
            EntityCategory::Edge => EntityKind::Edge,
        }
    }
}

impl From<EntityKind> for EntityCategory {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Vertex => EntityCategory::Vertex,
            EntityKind::Edge => EntityCategory::Edge,
        }
    }
}

/// The category tag is neither `"vertex"` nor `"edge"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entity category `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for EntityCategory {
    type Err = UnknownCategory;

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vertex" => Ok(EntityCategory::Vertex),
            "edge" => Ok(EntityCategory::Edge),
            other => Err(UnknownCategory(other.to_owned())),
        }
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind().name())
    }
}

/// One fixed-width result array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedArray {
    /// `Long` elements.
    Long(Vec<i64>),
    /// `Byte` elements.
    Byte(Vec<u8>),
}

impl TypedArray {
    /// Element type.
    pub fn dtype(&self) -> ArrayDtype {
        match self {
            TypedArray::Long(_) => ArrayDtype::Long,
            TypedArray::Byte(_) => ArrayDtype::Byte,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            TypedArray::Long(v) => v.len(),
            TypedArray::Byte(v) => v.len(),
        }
    }

    /// `true` when the array holds no element.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
