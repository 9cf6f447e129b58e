//! Entity schema descriptors
//!
//! A descriptor is produced once by the configuration layer and read by the
//! translation engine. Column order is declaration order and never changes
//! after `build()`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SemanticType;

/// Stream (append-only log) or table (latest value per key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Stream,
    Table,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Stream => write!(f, "STREAM"),
            EntityKind::Table => write!(f, "TABLE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub semantic_type: SemanticType,
    #[serde(default)]
    pub is_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    entity: String,
    topic: String,
    columns: Vec<ColumnDescriptor>,
    partitions: i32,
    replicas: i32,
    kind: EntityKind,
}

impl EntitySchema {
    pub fn builder(entity: impl Into<String>, topic: impl Into<String>) -> EntitySchemaBuilder {
        EntitySchemaBuilder {
            entity: entity.into(),
            topic: topic.into(),
            columns: Vec::new(),
            partitions: 1,
            replicas: 1,
            kind: EntityKind::Stream,
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Columns in declaration order
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_key)
    }

    /// Declared partition count, as configured (may be non-positive)
    pub fn partitions(&self) -> i32 {
        self.partitions
    }

    pub fn replicas(&self) -> i32 {
        self.replicas
    }

    /// Partition count with the non-positive fallback applied
    pub fn effective_partitions(&self) -> u32 {
        positive_or_one(self.partitions)
    }

    pub fn effective_replicas(&self) -> u32 {
        positive_or_one(self.replicas)
    }
}

fn positive_or_one(n: i32) -> u32 {
    if n <= 0 {
        1
    } else {
        n as u32
    }
}

/// Fluent builder used by the configuration layer
#[derive(Debug, Clone)]
pub struct EntitySchemaBuilder {
    entity: String,
    topic: String,
    columns: Vec<ColumnDescriptor>,
    partitions: i32,
    replicas: i32,
    kind: EntityKind,
}

impl EntitySchemaBuilder {
    pub fn stream(mut self) -> Self {
        self.kind = EntityKind::Stream;
        self
    }

    pub fn table(mut self) -> Self {
        self.kind = EntityKind::Table;
        self
    }

    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn column(mut self, name: impl Into<String>, semantic_type: SemanticType) -> Self {
        self.columns.push(ColumnDescriptor {
            name: name.into(),
            semantic_type,
            is_key: false,
        });
        self
    }

    pub fn key_column(mut self, name: impl Into<String>, semantic_type: SemanticType) -> Self {
        self.columns.push(ColumnDescriptor {
            name: name.into(),
            semantic_type,
            is_key: true,
        });
        self
    }

    pub fn partitions(mut self, partitions: i32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn build(self) -> EntitySchema {
        EntitySchema {
            entity: self.entity,
            topic: self.topic,
            columns: self.columns,
            partitions: self.partitions,
            replicas: self.replicas,
            kind: self.kind,
        }
    }
}
