//! Schema model for queryable entity types.
//!
//! A [`SchemaModel`] describes the queryable shape of one root entity: its
//! fields, their types, nullability, declared choices, and relations to other
//! entities. Relations are stored as entity *names* and re-resolved against
//! the model's entity map on every path step, so cyclic relation graphs (for
//! example a self-relation) cost nothing to represent and path resolution is
//! bounded purely by a depth counter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value as JsonValue};

use crate::ast::FieldPath;
use crate::validate::TranslateError;

/// Default bound for relation traversal depth.
pub const DEFAULT_MAX_RELATION_DEPTH: usize = 5;

/// The closed set of queryable field types. Every new type must be added
/// here and to the operator/coercion tables in the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    Date,
    DateTime,
    Choice,
    Relation,
}

impl FieldType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Choice => "choice",
            FieldType::Relation => "relation",
        }
    }

    /// Ordering operators (`>`, `>=`, `<`, `<=`) are legal only for these.
    pub const fn is_orderable(&self) -> bool {
        matches!(self, FieldType::Number | FieldType::Date | FieldType::DateTime)
    }

    /// Match operators (`~`, `!~`) are legal only for text.
    pub const fn supports_matching(&self) -> bool {
        matches!(self, FieldType::Text)
    }
}

/// One declared value of a choice field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

impl Choice {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Describes a single queryable field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    /// Declared values, only for `FieldType::Choice`. Order is the
    /// declaration order and is used as the completion tiebreak.
    pub choices: Vec<Choice>,
    /// Target entity name, only for `FieldType::Relation`.
    pub relation: Option<String>,
}

impl FieldDescriptor {
    fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            choices: Vec::new(),
            relation: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::DateTime)
    }

    pub fn choice<V, L>(name: impl Into<String>, choices: impl IntoIterator<Item = (V, L)>) -> Self
    where
        V: Into<String>,
        L: Into<String>,
    {
        let mut descriptor = Self::new(name, FieldType::Choice);
        descriptor.choices = choices
            .into_iter()
            .map(|(value, label)| Choice::new(value, label))
            .collect();
        descriptor
    }

    pub fn relation(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut descriptor = Self::new(name, FieldType::Relation);
        descriptor.relation = Some(target.into());
        descriptor
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn has_choice_value(&self, value: &str) -> bool {
        self.choices.iter().any(|c| c.value == value)
    }
}

/// The fields of one entity type, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl EntitySchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A resolved field path: the descriptor chain from the root entity down to
/// the final, comparable field.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    /// Relation steps first, the comparable field last. Never empty.
    pub chain: Vec<FieldDescriptor>,
}

impl ResolvedPath {
    /// The final, non-relation field the comparison applies to.
    pub fn target(&self) -> &FieldDescriptor {
        self.chain.last().expect("resolved path is never empty")
    }

    /// The relation steps leading up to the target.
    pub fn relations(&self) -> &[FieldDescriptor] {
        &self.chain[..self.chain.len() - 1]
    }
}

/// Structural description of a root entity and every entity reachable from
/// it through relations. Immutable once built; safe to share across threads.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaModel {
    root: String,
    entities: HashMap<String, EntitySchema>,
    max_relation_depth: usize,
}

impl SchemaModel {
    pub fn builder(root: impl Into<String>) -> SchemaModelBuilder {
        SchemaModelBuilder {
            root: root.into(),
            entities: HashMap::new(),
            max_relation_depth: DEFAULT_MAX_RELATION_DEPTH,
        }
    }

    pub fn root(&self) -> &EntitySchema {
        self.entities
            .get(&self.root)
            .expect("root entity is validated at build time")
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    pub fn max_relation_depth(&self) -> usize {
        self.max_relation_depth
    }

    /// Walk a dotted field path from the root entity, one name per nesting
    /// level, following relation links. The final name must resolve to a
    /// non-relation field, because a bare relation is not comparable.
    ///
    /// Traversal is bounded by path length against `max_relation_depth`, not
    /// by cycle detection: `a.b.a.b` is valid up to the configured depth even
    /// when the relation graph is cyclic.
    pub fn resolve(&self, path: &FieldPath) -> Result<ResolvedPath, TranslateError> {
        if path.parts.is_empty() {
            return Err(TranslateError::UnknownField {
                segment: String::new(),
                path: String::new(),
            });
        }
        let hops = path.parts.len() - 1;
        if hops > self.max_relation_depth {
            return Err(TranslateError::PathTooDeep {
                path: path.joined(),
                max: self.max_relation_depth,
            });
        }

        let mut entity = self.root();
        let mut chain = Vec::with_capacity(path.parts.len());
        let last = path.parts.len() - 1;
        for (i, segment) in path.parts.iter().enumerate() {
            let unknown = || TranslateError::UnknownField {
                segment: segment.clone(),
                path: path.joined(),
            };
            let field = entity.field(segment).ok_or_else(unknown)?;
            if i < last {
                let target = field
                    .relation
                    .as_deref()
                    .filter(|_| field.field_type == FieldType::Relation)
                    .ok_or_else(unknown)?;
                entity = self.entity(target).ok_or_else(unknown)?;
            } else if field.field_type == FieldType::Relation {
                // A bare relation reference is not itself comparable.
                return Err(unknown());
            }
            chain.push(field.clone());
        }

        Ok(ResolvedPath { chain })
    }

    /// Serializable projection of the model for external consumption:
    /// `{"current_model": ..., "models": {entity: {field: {...}}}}`.
    /// This shape is the stable contract for client-side completion UIs.
    pub fn snapshot(&self) -> JsonValue {
        let mut models = serde_json::Map::new();
        let mut names: Vec<&String> = self.entities.keys().collect();
        names.sort();
        for name in names {
            let entity = &self.entities[name];
            let mut fields = serde_json::Map::new();
            for field in &entity.fields {
                let mut descriptor = serde_json::Map::new();
                descriptor.insert("type".into(), json!(field.field_type.as_str()));
                descriptor.insert("nullable".into(), json!(field.nullable));
                if field.field_type == FieldType::Choice {
                    let options: Vec<&str> =
                        field.choices.iter().map(|c| c.value.as_str()).collect();
                    descriptor.insert("options".into(), json!(options));
                }
                if let Some(target) = &field.relation {
                    descriptor.insert("relation".into(), json!(target));
                }
                fields.insert(field.name.clone(), JsonValue::Object(descriptor));
            }
            models.insert(name.clone(), JsonValue::Object(fields));
        }
        json!({
            "current_model": self.root,
            "models": models,
        })
    }
}

/// Builder for a [`SchemaModel`]. `build` checks that the root entity exists
/// and that every declared relation points at a known entity.
pub struct SchemaModelBuilder {
    root: String,
    entities: HashMap<String, EntitySchema>,
    max_relation_depth: usize,
}

impl SchemaModelBuilder {
    pub fn entity(mut self, entity: EntitySchema) -> Self {
        self.entities.insert(entity.name.clone(), entity);
        self
    }

    pub fn max_relation_depth(mut self, depth: usize) -> Self {
        self.max_relation_depth = depth;
        self
    }

    pub fn build(self) -> Result<SchemaModel, SchemaError> {
        if !self.entities.contains_key(&self.root) {
            return Err(SchemaError::UnknownRootEntity(self.root));
        }
        for entity in self.entities.values() {
            for field in &entity.fields {
                if field.field_type == FieldType::Relation {
                    let target = field.relation.as_deref().unwrap_or_default();
                    if !self.entities.contains_key(target) {
                        return Err(SchemaError::UnknownRelationTarget {
                            entity: entity.name.clone(),
                            field: field.name.clone(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }
        Ok(SchemaModel {
            root: self.root,
            entities: self.entities,
            max_relation_depth: self.max_relation_depth,
        })
    }
}

/// Structural problems caught when assembling a model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("root entity \"{0}\" is not defined")]
    UnknownRootEntity(String),
    #[error("relation field \"{entity}.{field}\" points at unknown entity \"{target}\"")]
    UnknownRelationTarget {
        entity: String,
        field: String,
        target: String,
    },
}

/// Explicit, shareable cache of built schema models, keyed by entity type.
///
/// Schema structure is treated as immutable for the lifetime of the process,
/// so concurrent reads are safe. The lock is held across the build closure,
/// which gives at-most-once construction per key under concurrent first
/// access.
#[derive(Default)]
pub struct SchemaCache {
    models: Mutex<HashMap<String, Arc<SchemaModel>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached model for `entity`, building it on first access.
    pub fn get_or_build<F>(&self, entity: &str, build: F) -> Arc<SchemaModel>
    where
        F: FnOnce() -> SchemaModel,
    {
        let mut models = self.models.lock().unwrap_or_else(|e| e.into_inner());
        models
            .entry(entity.to_string())
            .or_insert_with(|| Arc::new(build()))
            .clone()
    }

    /// Drop the cached model for one entity type, if the underlying
    /// metadata can change.
    pub fn invalidate(&self, entity: &str) {
        let mut models = self.models.lock().unwrap_or_else(|e| e.into_inner());
        models.remove(entity);
    }

    pub fn clear(&self) {
        let mut models = self.models.lock().unwrap_or_else(|e| e.into_inner());
        models.clear();
    }
}
