//! Type system for StreamLinq IR
//!
//! `SemanticType` is what the application model declares; `SqlType` is the
//! column-type token the target streaming engine understands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value type of an entity member as declared by the configuration layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    String,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Timestamp,
    Uuid,
    Decimal,
    Bytes,

    // No target mapping
    Enum(String),
    Composite(String),
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticType::String => write!(f, "string"),
            SemanticType::Int32 => write!(f, "int32"),
            SemanticType::Int64 => write!(f, "int64"),
            SemanticType::Float32 => write!(f, "float32"),
            SemanticType::Float64 => write!(f, "float64"),
            SemanticType::Bool => write!(f, "bool"),
            SemanticType::Timestamp => write!(f, "timestamp"),
            SemanticType::Uuid => write!(f, "uuid"),
            SemanticType::Decimal => write!(f, "decimal"),
            SemanticType::Bytes => write!(f, "bytes"),
            SemanticType::Enum(name) => write!(f, "enum {}", name),
            SemanticType::Composite(name) => write!(f, "composite {}", name),
        }
    }
}

/// Target engine column type token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Varchar,
    Integer,
    Bigint,
    Double,
    Boolean,
    Timestamp,
    Decimal { precision: u8, scale: u8 },
    Bytes,

    // Aggregate result hints only, never emitted in DDL
    Any,
    Array,
    Map,
    Unknown,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Varchar => write!(f, "VARCHAR"),
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::Bigint => write!(f, "BIGINT"),
            SqlType::Double => write!(f, "DOUBLE"),
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::Timestamp => write!(f, "TIMESTAMP"),
            SqlType::Decimal { precision, scale } => write!(f, "DECIMAL({},{})", precision, scale),
            SqlType::Bytes => write!(f, "BYTES"),
            SqlType::Any => write!(f, "ANY"),
            SqlType::Array => write!(f, "ARRAY"),
            SqlType::Map => write!(f, "MAP"),
            SqlType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Global numeric settings applied to every decimal column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalSettings {
    pub precision: u8,
    pub scale: u8,
}

impl Default for DecimalSettings {
    fn default() -> Self {
        Self {
            precision: 18,
            scale: 2,
        }
    }
}

/// Literal values appearing in predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Kept as text so no precision is lost before rendering
    Decimal(String),
    Timestamp(DateTime<Utc>),
    Uuid(uuid::Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}
