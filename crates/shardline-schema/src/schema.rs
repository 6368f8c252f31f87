// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Validated, immutable schema.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use shardline_config::{ConfigError, ConfigKey, ConfigService, ConfigStore};
use thiserror::Error;

use crate::{Dtype, EntityDecl, EntityKind, EntityType, FieldRole, SchemaConfig};

/// Default slot of the schema declaration.
pub const SCHEMA_CONFIG_KEY: ConfigKey<SchemaConfig> = ConfigKey::new("schema");

/// Setup-level schema failure. Always fatal to a conversion run.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The declaration contains no entity types at all.
    #[error("schema declares no entity types")]
    Empty,
    /// The same entity-type code is declared twice for one kind.
    #[error("{kind} type {entity_type} declared more than once")]
    DuplicateEntityType {
        /// Vertex or edge.
        kind: EntityKind,
        /// Offending code.
        entity_type: EntityType,
    },
    /// A role required for the kind is not declared.
    #[error("{kind} type {entity_type} is missing required role `{role}`")]
    MissingRole {
        /// Vertex or edge.
        kind: EntityKind,
        /// Entity-type code.
        entity_type: EntityType,
        /// Missing role.
        role: FieldRole,
    },
    /// A role that may appear at most once is declared several times.
    #[error("{kind} type {entity_type} declares role `{role}` more than once")]
    DuplicateRole {
        /// Vertex or edge.
        kind: EntityKind,
        /// Entity-type code.
        entity_type: EntityType,
        /// Repeated role.
        role: FieldRole,
    },
    /// A role that does not belong to the kind (e.g. `source` on a vertex).
    #[error("{kind} type {entity_type} may not declare role `{role}`")]
    ForbiddenRole {
        /// Vertex or edge.
        kind: EntityKind,
        /// Entity-type code.
        entity_type: EntityType,
        /// Offending role.
        role: FieldRole,
    },
    /// Two fields of one entity type share a name.
    #[error("{kind} type {entity_type} declares field `{name}` more than once")]
    DuplicateFieldName {
        /// Vertex or edge.
        kind: EntityKind,
        /// Entity-type code.
        entity_type: EntityType,
        /// Repeated name.
        name: String,
    },
    /// A single-valued role is declared as a list.
    #[error("{kind} type {entity_type}: field `{name}` has single-valued role `{role}` but is declared as a list")]
    ListOnSingleValuedRole {
        /// Vertex or edge.
        kind: EntityKind,
        /// Entity-type code.
        entity_type: EntityType,
        /// Field name.
        name: String,
        /// The field's role.
        role: FieldRole,
    },
    /// The weight field is not numeric.
    #[error("{kind} type {entity_type}: weight field `{name}` must be numeric, got {dtype}")]
    NonNumericWeight {
        /// Vertex or edge.
        kind: EntityKind,
        /// Entity-type code.
        entity_type: EntityType,
        /// Field name.
        name: String,
        /// Declared dtype.
        dtype: Dtype,
    },
    /// No schema stored under the requested config key.
    #[error("no schema configured under key `{0}`")]
    NotConfigured(String),
    /// Schema JSON could not be parsed.
    #[error("schema parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Config store failure.
    #[error("schema config error: {0}")]
    Config(#[from] ConfigError),
    /// Schema file could not be read.
    #[error("schema io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One resolved field: role, column and dtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name.
    pub name: String,
    /// Semantic role.
    pub role: FieldRole,
    /// Index of the field group in the raw record (`>= 1`).
    pub column: usize,
    /// Declared dtype.
    pub dtype: Dtype,
    /// Whether several values are allowed.
    pub list: bool,
}

/// Field layout of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    kind: EntityKind,
    entity_type: EntityType,
    fields: Vec<FieldSpec>,
}

impl EntitySchema {
    /// Vertex or edge.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Entity-type code.
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Fields in column order (column `i + 1` for index `i`).
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Number of field groups a raw record of this type has, including the
    /// entity-type code in column 0.
    pub fn column_count(&self) -> usize {
        self.fields.len() + 1
    }

    /// First field declared with `role`.
    pub fn field(&self, role: FieldRole) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.role == role)
    }

    /// Field at `column`.
    pub fn column(&self, column: usize) -> Option<&FieldSpec> {
        column.checked_sub(1).and_then(|i| self.fields.get(i))
    }

    fn from_decl(kind: EntityKind, decl: &EntityDecl) -> Result<Self, SchemaError> {
        let entity_type = decl.entity_type;
        let mut names = BTreeSet::new();
        let mut seen_roles = BTreeSet::new();
        let mut fields = Vec::with_capacity(decl.fields.len());

        for (i, f) in decl.fields.iter().enumerate() {
            if !names.insert(f.name.as_str()) {
                return Err(SchemaError::DuplicateFieldName {
                    kind,
                    entity_type,
                    name: f.name.clone(),
                });
            }
            let allowed = match (kind, f.role) {
                (EntityKind::Vertex, FieldRole::Source | FieldRole::Destination)
                | (EntityKind::Edge, FieldRole::Id) => false,
                _ => true,
            };
            if !allowed {
                return Err(SchemaError::ForbiddenRole {
                    kind,
                    entity_type,
                    role: f.role,
                });
            }
            if f.role.is_single_valued() {
                if !seen_roles.insert(f.role) {
                    return Err(SchemaError::DuplicateRole {
                        kind,
                        entity_type,
                        role: f.role,
                    });
                }
                if f.list {
                    return Err(SchemaError::ListOnSingleValuedRole {
                        kind,
                        entity_type,
                        name: f.name.clone(),
                        role: f.role,
                    });
                }
            }
            if f.role == FieldRole::Weight && !f.dtype.is_numeric() {
                return Err(SchemaError::NonNumericWeight {
                    kind,
                    entity_type,
                    name: f.name.clone(),
                    dtype: f.dtype,
                });
            }
            fields.push(FieldSpec {
                name: f.name.clone(),
                role: f.role,
                column: i + 1,
                dtype: f.dtype,
                list: f.list,
            });
        }

        let required: &[FieldRole] = match kind {
            EntityKind::Vertex => &[FieldRole::Id],
            EntityKind::Edge => &[FieldRole::Source, FieldRole::Destination],
        };
        if let Some(&role) = required.iter().find(|r| !seen_roles.contains(*r)) {
            return Err(SchemaError::MissingRole {
                kind,
                entity_type,
                role,
            });
        }

        Ok(Self {
            kind,
            entity_type,
            fields,
        })
    }
}

/// Validated schema for every declared vertex and edge type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    vertices: BTreeMap<EntityType, EntitySchema>,
    edges: BTreeMap<EntityType, EntitySchema>,
}

impl Schema {
    /// Validate a declaration.
    pub fn from_config(config: &SchemaConfig) -> Result<Self, SchemaError> {
        if config.vertices.is_empty() && config.edges.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(Self {
            vertices: Self::build_kind(EntityKind::Vertex, &config.vertices)?,
            edges: Self::build_kind(EntityKind::Edge, &config.edges)?,
        })
    }

    /// Parse and validate a JSON declaration.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, SchemaError> {
        let config: SchemaConfig = serde_json::from_slice(bytes)?;
        Self::from_config(&config)
    }

    /// Read, parse and validate a JSON declaration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let bytes = std::fs::read(path)?;
        Self::from_json_slice(&bytes)
    }

    /// Load the declaration stored under `key` through a config service.
    pub fn load<S: ConfigStore>(
        service: &ConfigService<S>,
        key: &ConfigKey<SchemaConfig>,
    ) -> Result<Self, SchemaError> {
        let config = service
            .get(key)?
            .ok_or_else(|| SchemaError::NotConfigured(key.name().to_owned()))?;
        Self::from_config(&config)
    }

    fn build_kind(
        kind: EntityKind,
        decls: &[EntityDecl],
    ) -> Result<BTreeMap<EntityType, EntitySchema>, SchemaError> {
        let mut out = BTreeMap::new();
        for decl in decls {
            let entity = EntitySchema::from_decl(kind, decl)?;
            if out.insert(decl.entity_type, entity).is_some() {
                return Err(SchemaError::DuplicateEntityType {
                    kind,
                    entity_type: decl.entity_type,
                });
            }
        }
        Ok(out)
    }

    fn table(&self, kind: EntityKind) -> &BTreeMap<EntityType, EntitySchema> {
        match kind {
            EntityKind::Vertex => &self.vertices,
            EntityKind::Edge => &self.edges,
        }
    }

    /// Layout of one entity type.
    pub fn entity(&self, kind: EntityKind, entity_type: EntityType) -> Option<&EntitySchema> {
        self.table(kind).get(&entity_type)
    }

    /// Declared entity-type codes of a kind, ascending.
    pub fn entity_types(&self, kind: EntityKind) -> impl Iterator<Item = EntityType> + '_ {
        self.table(kind).keys().copied()
    }

    /// `true` when at least one entity type of `kind` is declared.
    pub fn declares(&self, kind: EntityKind) -> bool {
        !self.table(kind).is_empty()
    }

    /// Column index of `role` for an entity type, or `None` when the type or
    /// role is undeclared. For `attribute` the first attribute column is
    /// returned.
    pub fn field_index(
        &self,
        kind: EntityKind,
        entity_type: EntityType,
        role: FieldRole,
    ) -> Option<usize> {
        self.entity(kind, entity_type)?
            .field(role)
            .map(|f| f.column)
    }

    /// Declared dtype of `column` for an entity type.
    pub fn field_dtype(
        &self,
        kind: EntityKind,
        entity_type: EntityType,
        column: usize,
    ) -> Option<Dtype> {
        self.entity(kind, entity_type)?
            .column(column)
            .map(|f| f.dtype)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::FieldDecl;
    use proptest::prelude::*;
    use shardline_config::InMemoryConfigStore;

    fn edge_decl(entity_type: EntityType) -> EntityDecl {
        EntityDecl {
            entity_type,
            fields: vec![
                FieldDecl::new("src", FieldRole::Source, Dtype::Uint64),
                FieldDecl::new("dst", FieldRole::Destination, Dtype::Uint64),
                FieldDecl::new("w", FieldRole::Weight, Dtype::Float32),
                FieldDecl::list("labels", Dtype::String),
            ],
        }
    }

    fn vertex_decl(entity_type: EntityType) -> EntityDecl {
        EntityDecl {
            entity_type,
            fields: vec![
                FieldDecl::new("vid", FieldRole::Id, Dtype::String),
                FieldDecl::new("age", FieldRole::Attribute, Dtype::Int32),
            ],
        }
    }

    fn sample() -> SchemaConfig {
        SchemaConfig {
            vertices: vec![vertex_decl(0), vertex_decl(3)],
            edges: vec![edge_decl(0)],
        }
    }

    #[test]
    fn field_index_and_dtype_agree_with_declaration() {
        let schema = Schema::from_config(&sample()).unwrap();
        let src = schema
            .field_index(EntityKind::Edge, 0, FieldRole::Source)
            .unwrap();
        assert_eq!(src, 1);
        assert_eq!(
            schema.field_dtype(EntityKind::Edge, 0, src),
            Some(Dtype::Uint64)
        );
        let w = schema
            .field_index(EntityKind::Edge, 0, FieldRole::Weight)
            .unwrap();
        assert_eq!(schema.field_dtype(EntityKind::Edge, 0, w), Some(Dtype::Float32));
        let id = schema
            .field_index(EntityKind::Vertex, 3, FieldRole::Id)
            .unwrap();
        assert_eq!(schema.field_dtype(EntityKind::Vertex, 3, id), Some(Dtype::String));
    }

    #[test]
    fn undeclared_role_or_type_fails_cleanly() {
        let schema = Schema::from_config(&sample()).unwrap();
        assert_eq!(schema.field_index(EntityKind::Vertex, 0, FieldRole::Weight), None);
        assert_eq!(schema.field_index(EntityKind::Edge, 9, FieldRole::Source), None);
        assert_eq!(schema.field_dtype(EntityKind::Edge, 0, 0), None);
        assert_eq!(schema.field_dtype(EntityKind::Edge, 0, 99), None);
    }

    #[test]
    fn vertex_and_edge_codes_are_separate_namespaces() {
        let schema = Schema::from_config(&sample()).unwrap();
        assert!(schema.entity(EntityKind::Vertex, 0).is_some());
        assert_eq!(
            schema.entity(EntityKind::Edge, 0).map(EntitySchema::kind),
            Some(EntityKind::Edge)
        );
        assert_eq!(
            schema.entity_types(EntityKind::Vertex).collect::<Vec<_>>(),
            vec![0, 3]
        );
    }

    #[test]
    fn edge_without_source_is_a_config_error() {
        let mut config = sample();
        config.edges[0].fields.remove(0);
        let err = Schema::from_config(&config).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::MissingRole {
                kind: EntityKind::Edge,
                entity_type: 0,
                role: FieldRole::Source
            }
        ));
    }

    #[test]
    fn vertex_without_id_is_a_config_error() {
        let config = SchemaConfig {
            vertices: vec![EntityDecl {
                entity_type: 1,
                fields: vec![FieldDecl::new("x", FieldRole::Attribute, Dtype::Int8)],
            }],
            edges: vec![],
        };
        assert!(matches!(
            Schema::from_config(&config),
            Err(SchemaError::MissingRole {
                role: FieldRole::Id,
                ..
            })
        ));
    }

    #[test]
    fn structural_violations_are_rejected() {
        let mut dup_type = sample();
        dup_type.edges.push(edge_decl(0));
        assert!(matches!(
            Schema::from_config(&dup_type),
            Err(SchemaError::DuplicateEntityType { .. })
        ));

        let mut forbidden = sample();
        forbidden.vertices[0]
            .fields
            .push(FieldDecl::new("s", FieldRole::Source, Dtype::Uint64));
        assert!(matches!(
            Schema::from_config(&forbidden),
            Err(SchemaError::ForbiddenRole { .. })
        ));

        let mut list_id = sample();
        list_id.vertices[0].fields[0].list = true;
        assert!(matches!(
            Schema::from_config(&list_id),
            Err(SchemaError::ListOnSingleValuedRole { .. })
        ));

        let mut text_weight = sample();
        text_weight.edges[0].fields[2].dtype = Dtype::String;
        assert!(matches!(
            Schema::from_config(&text_weight),
            Err(SchemaError::NonNumericWeight { .. })
        ));

        let mut dup_name = sample();
        dup_name.edges[0].fields[3].name = "src".into();
        assert!(matches!(
            Schema::from_config(&dup_name),
            Err(SchemaError::DuplicateFieldName { .. })
        ));

        assert!(matches!(
            Schema::from_config(&SchemaConfig::default()),
            Err(SchemaError::Empty)
        ));
    }

    #[test]
    fn loads_through_config_service() {
        let service = ConfigService::new(InMemoryConfigStore::new());
        assert!(matches!(
            Schema::load(&service, &SCHEMA_CONFIG_KEY),
            Err(SchemaError::NotConfigured(_))
        ));
        service.put(&SCHEMA_CONFIG_KEY, &sample()).unwrap();
        let schema = Schema::load(&service, &SCHEMA_CONFIG_KEY).unwrap();
        assert!(schema.declares(EntityKind::Edge));
    }

    #[test]
    fn json_declaration_parses() {
        let json = br#"{
            "edges": [{ "entity_type": 2, "fields": [
                { "name": "a", "role": "source", "dtype": "int64" },
                { "name": "b", "role": "destination", "dtype": "int64" }
            ]}]
        }"#;
        let schema = Schema::from_json_slice(json).unwrap();
        assert!(!schema.declares(EntityKind::Vertex));
        assert_eq!(
            schema.field_index(EntityKind::Edge, 2, FieldRole::Destination),
            Some(2)
        );
    }

    proptest! {
        #[test]
        fn every_declared_attribute_resolves_to_its_dtype(
            dtypes in prop::collection::vec(prop::sample::select(Dtype::ALL.to_vec()), 0..8)
        ) {
            let mut fields = vec![FieldDecl::new("vid", FieldRole::Id, Dtype::Uint64)];
            fields.extend(
                dtypes.iter().enumerate().map(|(i, d)| FieldDecl::new(format!("a{i}"), FieldRole::Attribute, *d)),
            );
            let config = SchemaConfig {
                vertices: vec![EntityDecl { entity_type: 7, fields }],
                edges: vec![],
            };
            let schema = Schema::from_config(&config).unwrap();
            let entity = schema.entity(EntityKind::Vertex, 7).unwrap();
            prop_assert_eq!(entity.column_count(), dtypes.len() + 2);
            for (i, d) in dtypes.iter().enumerate() {
                prop_assert_eq!(schema.field_dtype(EntityKind::Vertex, 7, i + 2), Some(*d));
            }
        }
    }
}
