//! ksqlDB backend: column types, DDL definitions and statement text

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use streamlinq_ir::{DecimalSettings, EntitySchema, QueryPlan, Result};

pub mod cache;
pub mod ddl;
pub mod sanitize;
pub mod statement;
pub mod translate;

pub use cache::StatementCache;
pub use ddl::{DdlColumn, DdlSchema, DdlSchemaBuilder};
pub use sanitize::{IdentifierSanitizer, KsqlIdentifierSanitizer};
pub use statement::{FormatOptions, StatementGenerator};
pub use translate::{infer_aggregate_result_type, map_column_type, map_operator, render_aggregate_call};

/// Global settings shared by DDL and statement rendering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationSettings {
    #[serde(default)]
    pub decimal: DecimalSettings,
    #[serde(default)]
    pub formats: FormatOptions,
}

/// DDL builder and statement generator sharing one sanitizer
#[derive(Clone)]
pub struct Translator {
    ddl: DdlSchemaBuilder,
    statements: StatementGenerator,
}

impl Translator {
    pub fn new(sanitizer: Arc<dyn IdentifierSanitizer>, settings: TranslationSettings) -> Self {
        Self {
            ddl: DdlSchemaBuilder::new(Arc::clone(&sanitizer), settings.decimal),
            statements: StatementGenerator::new(sanitizer, settings.formats),
        }
    }

    pub fn with_settings(settings: TranslationSettings) -> Self {
        Self::new(Arc::new(KsqlIdentifierSanitizer), settings)
    }

    pub fn ddl(&self, schema: &EntitySchema) -> Result<DdlSchema> {
        self.ddl.build(schema)
    }

    pub fn create_statement(&self, schema: &EntitySchema) -> Result<String> {
        Ok(self.statements.render_create(&self.ddl.build(schema)?))
    }

    pub fn statement(&self, plan: &QueryPlan, topic: &str) -> Result<String> {
        self.statements.render(plan, topic)
    }

    pub fn generator(&self) -> &StatementGenerator {
        &self.statements
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::with_settings(TranslationSettings::default())
    }
}
