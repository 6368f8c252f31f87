// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Declarative (serde) form of the schema, as written in config files.
//!
//! ```json
//! {
//!   "vertices": [
//!     { "entity_type": 0, "fields": [
//!       { "name": "vid", "role": "id", "dtype": "uint64" },
//!       { "name": "tags", "role": "attribute", "dtype": "string", "list": true }
//!     ]}
//!   ],
//!   "edges": [
//!     { "entity_type": 0, "fields": [
//!       { "name": "src", "role": "source", "dtype": "uint64" },
//!       { "name": "dst", "role": "destination", "dtype": "uint64" },
//!       { "name": "w", "role": "weight", "dtype": "float32" }
//!     ]}
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::{Dtype, EntityType, FieldRole};

/// Whole-schema declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Vertex entity types.
    #[serde(default)]
    pub vertices: Vec<EntityDecl>,
    /// Edge entity types.
    #[serde(default)]
    pub edges: Vec<EntityDecl>,
}

/// Declaration of one entity type. Field order is column order, starting at
/// column 1 (column 0 is the entity-type code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityDecl {
    /// Entity-type code carried in column 0 of every raw record.
    pub entity_type: EntityType,
    /// Fields in column order.
    pub fields: Vec<FieldDecl>,
}

/// Declaration of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDecl {
    /// Human-readable name, unique within the entity type.
    pub name: String,
    /// Semantic role.
    pub role: FieldRole,
    /// Declared dtype.
    pub dtype: Dtype,
    /// Whether the field may carry several values (attributes only).
    #[serde(default)]
    pub list: bool,
}

impl FieldDecl {
    /// Single-valued field declaration.
    pub fn new(name: impl Into<String>, role: FieldRole, dtype: Dtype) -> Self {
        Self {
            name: name.into(),
            role,
            dtype,
            list: false,
        }
    }

    /// List-valued attribute declaration.
    pub fn list(name: impl Into<String>, dtype: Dtype) -> Self {
        Self {
            name: name.into(),
            role: FieldRole::Attribute,
            dtype,
            list: true,
        }
    }
}
