//! Structured object-creation definitions built from entity descriptors

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use streamlinq_ir::{DecimalSettings, EntityKind, EntitySchema, Result, SqlType};

use crate::sanitize::{IdentifierSanitizer, KsqlIdentifierSanitizer};
use crate::translate::map_column_type;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlColumn {
    pub name: String,
    pub target_type: SqlType,
    pub is_key: bool,
}

/// What a schema-registration collaborator needs to create one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlSchema {
    pub object_name: String,
    pub topic_name: String,
    pub object_type: EntityKind,
    pub partitions: u32,
    pub replicas: u32,
    /// Declaration order
    pub columns: Vec<DdlColumn>,
}

impl DdlSchema {
    pub fn key_columns(&self) -> impl Iterator<Item = &DdlColumn> {
        self.columns.iter().filter(|c| c.is_key)
    }
}

#[derive(Clone)]
pub struct DdlSchemaBuilder {
    sanitizer: Arc<dyn IdentifierSanitizer>,
    decimal: DecimalSettings,
}

impl DdlSchemaBuilder {
    pub fn new(sanitizer: Arc<dyn IdentifierSanitizer>, decimal: DecimalSettings) -> Self {
        Self { sanitizer, decimal }
    }

    pub fn build(&self, schema: &EntitySchema) -> Result<DdlSchema> {
        let columns = schema
            .columns()
            .iter()
            .map(|c| {
                Ok(DdlColumn {
                    name: self.sanitizer.sanitize(&c.name),
                    target_type: map_column_type(&c.semantic_type, self.decimal)?,
                    is_key: c.is_key,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(DdlSchema {
            object_name: self.sanitizer.sanitize(schema.entity()),
            topic_name: schema.topic().to_string(),
            object_type: schema.kind(),
            partitions: schema.effective_partitions(),
            replicas: schema.effective_replicas(),
            columns,
        })
    }
}

impl Default for DdlSchemaBuilder {
    fn default() -> Self {
        Self::new(Arc::new(KsqlIdentifierSanitizer), DecimalSettings::default())
    }
}
