//! Entity and query model files
//!
//! A model file declares the entities (topic, kind, columns) and named
//! queries written in the text query language:
//!
//! ```yaml
//! entities:
//!   - name: Sale
//!     topic: sales
//!     partitions: 6
//!     columns:
//!       - { name: Id, type: int32, key: true }
//!       - { name: Amount, type: decimal }
//! queries:
//!   - name: large_sales
//!     entity: Sale
//!     query: "from Sale s | where s.Amount > 100"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use streamlinq_ast::{analyze, parse, AnalyzeOptions, ParseError, QueryMode};
use streamlinq_ir::{EntityKind, EntitySchema, QueryPlan, SemanticType, TranslationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Query '{name}' failed to parse: {source}")]
    Parse { name: String, source: ParseError },

    #[error("Query '{name}' failed to translate: {source}")]
    Translation { name: String, source: TranslationError },

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Unknown query: {0}")]
    UnknownQuery(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Push,
    Pull,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnModel {
    pub name: String,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    #[serde(default)]
    pub key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityModel {
    pub name: String,
    pub topic: String,
    #[serde(default = "default_kind")]
    pub kind: EntityKind,
    #[serde(default = "default_count")]
    pub partitions: i32,
    #[serde(default = "default_count")]
    pub replicas: i32,
    pub columns: Vec<ColumnModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryModel {
    pub name: String,
    pub entity: String,
    pub query: String,
    #[serde(default)]
    pub mode: Mode,
    /// Topic named in FROM; defaults to the entity's topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<EntityKind>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub entities: Vec<EntityModel>,
    #[serde(default)]
    pub queries: Vec<QueryModel>,
}

fn default_kind() -> EntityKind {
    EntityKind::Stream
}

fn default_count() -> i32 {
    1
}

impl EntityModel {
    pub fn schema(&self) -> EntitySchema {
        let builder = EntitySchema::builder(&self.name, &self.topic)
            .kind(self.kind)
            .partitions(self.partitions)
            .replicas(self.replicas);

        self.columns
            .iter()
            .fold(builder, |builder, column| {
                if column.key {
                    builder.key_column(&column.name, column.semantic_type.clone())
                } else {
                    builder.column(&column.name, column.semantic_type.clone())
                }
            })
            .build()
    }
}

impl Model {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ModelError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn schemas(&self) -> Vec<EntitySchema> {
        self.entities.iter().map(EntityModel::schema).collect()
    }

    pub fn schema(&self, entity: &str) -> Result<EntitySchema, ModelError> {
        self.entities
            .iter()
            .find(|e| e.name == entity)
            .map(EntityModel::schema)
            .ok_or_else(|| ModelError::UnknownEntity(entity.to_string()))
    }

    pub fn query(&self, name: &str) -> Result<&QueryModel, ModelError> {
        self.queries
            .iter()
            .find(|q| q.name == name)
            .ok_or_else(|| ModelError::UnknownQuery(name.to_string()))
    }

    /// Parse and analyze a named query against its entity
    pub fn plan(&self, query: &QueryModel) -> Result<QueryPlan, ModelError> {
        let schema = self.schema(&query.entity)?;
        let expr = parse(&query.query).map_err(|source| ModelError::Parse {
            name: query.name.clone(),
            source,
        })?;

        let mut options = AnalyzeOptions {
            mode: match query.mode {
                Mode::Push => QueryMode::Push,
                Mode::Pull => QueryMode::Pull,
            },
            sink: None,
        };
        if let Some(sink) = query.sink {
            options = options.with_sink(sink);
        }

        analyze(&schema, &expr, options).map_err(|source| ModelError::Translation {
            name: query.name.clone(),
            source,
        })
    }

    /// Topic a query reads from
    pub fn topic_for(&self, query: &QueryModel) -> Result<String, ModelError> {
        match &query.topic {
            Some(topic) => Ok(topic.clone()),
            None => Ok(self.schema(&query.entity)?.topic().to_string()),
        }
    }
}
