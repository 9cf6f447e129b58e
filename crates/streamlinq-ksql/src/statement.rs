//! Statement generation: query plans and DDL definitions → statement text
//!
//! Clause order is fixed by the target grammar:
//! `SELECT .. FROM .. [WHERE ..] [WINDOW ..] [GROUP BY ..] [EMIT ..] [LIMIT ..];`

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use streamlinq_ir::{
    BinOp, EmitMode, EntityKind, Projection, QueryPlan, Result, ScalarExpr, TranslationError, UnOp,
    Value, WindowClauseBuilder,
};
use tracing::{debug, warn};

use crate::ddl::DdlSchema;
use crate::sanitize::{IdentifierSanitizer, KsqlIdentifierSanitizer};
use crate::translate::{map_operator, render_aggregate_call};

/// Serialization formats named in `WITH (...)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOptions {
    pub value_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_format: Option<String>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            value_format: "AVRO".to_string(),
            key_format: None,
        }
    }
}

#[derive(Clone)]
pub struct StatementGenerator {
    sanitizer: Arc<dyn IdentifierSanitizer>,
    formats: FormatOptions,
}

impl StatementGenerator {
    pub fn new(sanitizer: Arc<dyn IdentifierSanitizer>, formats: FormatOptions) -> Self {
        Self { sanitizer, formats }
    }

    pub fn with_formats(formats: FormatOptions) -> Self {
        Self::new(Arc::new(KsqlIdentifierSanitizer), formats)
    }

    pub fn formats(&self) -> &FormatOptions {
        &self.formats
    }

    /// Checks that only apply once a plan is about to be rendered
    pub fn validate(&self, plan: &QueryPlan) -> Result<()> {
        if let Some(window) = &plan.window {
            window.validate()?;
        }
        if plan.emit_mode == EmitMode::Final && !plan.window.as_ref().is_some_and(|w| w.finalize) {
            return Err(TranslationError::InvalidEmitMode(
                "EMIT FINAL requires a finalized window".to_string(),
            ));
        }

        if let Some(keys) = plan.group_by.as_ref().filter(|keys| !keys.is_empty()) {
            let projected: Vec<_> = plan
                .projection
                .iter()
                .flatten()
                .filter_map(|p| match p {
                    Projection::GroupKey { col, .. } => Some(col),
                    _ => None,
                })
                .collect();
            let missing: Vec<_> = keys
                .iter()
                .filter(|k| !projected.contains(k))
                .map(|k| k.column.as_str())
                .collect();
            if !missing.is_empty() {
                return Err(TranslationError::MissingGroupKeyProjection(missing.join(", ")));
            }
        }

        if plan.is_pull_query() {
            let has_key_lookup = plan
                .filters
                .iter()
                .filter_map(ScalarExpr::equality_column)
                .any(|col| plan.key_columns.contains(&col.column));
            if !has_key_lookup {
                return Err(TranslationError::PullQueryMissingKey(format!(
                    "pull query on '{}' needs an equality predicate on one of [{}]",
                    plan.source,
                    plan.key_columns.join(", ")
                )));
            }
        }

        for warning in &plan.warnings {
            warn!(source = %plan.source, "{}", warning);
        }
        Ok(())
    }

    /// Push or pull query text reading from `topic`
    pub fn render(&self, plan: &QueryPlan, topic: &str) -> Result<String> {
        let sql = format!("{};", self.render_select(plan, topic)?);
        debug!(source = %plan.source, pull = plan.is_pull_query(), sql = %sql, "Rendered statement");
        Ok(sql)
    }

    /// `CREATE STREAM|TABLE IF NOT EXISTS ..` for a registered entity
    pub fn render_create(&self, ddl: &DdlSchema) -> String {
        let key_marker = match ddl.object_type {
            EntityKind::Stream => "KEY",
            EntityKind::Table => "PRIMARY KEY",
        };
        let columns: Vec<_> = ddl
            .columns
            .iter()
            .map(|c| {
                if c.is_key {
                    format!("{} {} {}", c.name, c.target_type, key_marker)
                } else {
                    format!("{} {}", c.name, c.target_type)
                }
            })
            .collect();

        format!(
            "CREATE {} IF NOT EXISTS {} ({}) WITH ({});",
            ddl.object_type,
            ddl.object_name,
            columns.join(", "),
            self.with_properties(&ddl.topic_name, Some((ddl.partitions, ddl.replicas)))
        )
    }

    /// Persistent query: `CREATE STREAM|TABLE <sink> WITH (..) AS SELECT ..;`
    pub fn render_create_as(
        &self,
        plan: &QueryPlan,
        source_topic: &str,
        sink_name: &str,
        sink_topic: &str,
    ) -> Result<String> {
        if plan.is_pull_query() {
            return Err(TranslationError::unsupported(
                "a pull query cannot back a persistent query",
            ));
        }
        if plan.limit.is_some() {
            return Err(TranslationError::unsupported(
                "LIMIT is not allowed in a persistent query",
            ));
        }

        let sql = format!(
            "CREATE {} {} WITH ({}) AS {};",
            plan.sink_kind,
            self.sanitizer.sanitize(sink_name),
            self.with_properties(sink_topic, None),
            self.render_select(plan, source_topic)?
        );
        debug!(source = %plan.source, sink = sink_name, sql = %sql, "Rendered persistent query");
        Ok(sql)
    }

    fn render_select(&self, plan: &QueryPlan, topic: &str) -> Result<String> {
        self.validate(plan)?;

        let mut sql = format!("SELECT {} FROM {}", self.render_projection(plan), topic);

        if !plan.filters.is_empty() {
            let predicates = plan
                .filters
                .iter()
                .map(|f| self.render_scalar(f))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }

        let mut window = WindowClauseBuilder::for_plan(plan.window.as_ref());
        if let Some(clause) = window.render() {
            sql.push(' ');
            sql.push_str(clause);
        }

        if let Some(keys) = plan.group_by.as_ref().filter(|keys| !keys.is_empty()) {
            let keys: Vec<_> = keys.iter().map(|k| self.sanitizer.sanitize(&k.column)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&keys.join(", "));
        }

        if !plan.is_pull_query() {
            sql.push_str(match plan.emit_mode {
                EmitMode::Changes => " EMIT CHANGES",
                EmitMode::Final => " EMIT FINAL",
            });
        }

        if let Some(limit) = plan.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        Ok(sql)
    }

    fn render_projection(&self, plan: &QueryPlan) -> String {
        let Some(members) = &plan.projection else {
            return "*".to_string();
        };

        members
            .iter()
            .map(|member| match member {
                Projection::Column { col, alias } | Projection::GroupKey { col, alias } => {
                    let name = self.sanitizer.sanitize(&col.column);
                    match alias.as_deref().map(|a| self.sanitizer.sanitize(a)) {
                        Some(alias) if alias != name => format!("{} AS {}", name, alias),
                        _ => name,
                    }
                }
                Projection::Aggregate { call, alias } => {
                    let rendered = render_aggregate_call(&call.func);
                    match alias {
                        Some(alias) => format!("{} AS {}", rendered, self.sanitizer.sanitize(alias)),
                        None => rendered,
                    }
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render_scalar(&self, expr: &ScalarExpr) -> Result<String> {
        match expr {
            ScalarExpr::Column { col } => Ok(self.sanitizer.sanitize(&col.column)),
            ScalarExpr::Literal { value } => Ok(render_literal(value)),
            ScalarExpr::BinaryOp { op, left, right } => {
                if let Some(sql) = self.render_null_check(*op, left, right)? {
                    return Ok(sql);
                }
                let op = match op {
                    BinOp::And => "AND",
                    other => map_operator(*other)?,
                };
                Ok(format!(
                    "{} {} {}",
                    self.render_operand(left)?,
                    op,
                    self.render_operand(right)?
                ))
            }
            ScalarExpr::UnaryOp { op: UnOp::Not, expr } => Ok(format!("NOT ({})", self.render_scalar(expr)?)),
            ScalarExpr::UnaryOp { op: UnOp::Neg, expr } => {
                let operand = self.render_operand(expr)?;
                // A leading '-' on the operand would form a `--` line comment
                if operand.starts_with('-') {
                    Ok(format!("-({})", operand))
                } else {
                    Ok(format!("-{}", operand))
                }
            }
        }
    }

    /// Nested binaries are parenthesized so precedence never depends on the engine
    fn render_operand(&self, expr: &ScalarExpr) -> Result<String> {
        let sql = self.render_scalar(expr)?;
        Ok(match expr {
            ScalarExpr::BinaryOp { .. } => format!("({})", sql),
            _ => sql,
        })
    }

    fn render_null_check(&self, op: BinOp, left: &ScalarExpr, right: &ScalarExpr) -> Result<Option<String>> {
        let suffix = match op {
            BinOp::Eq => "IS NULL",
            BinOp::Ne => "IS NOT NULL",
            _ => return Ok(None),
        };
        let operand = match (left, right) {
            (other, ScalarExpr::Literal { value: Value::Null })
            | (ScalarExpr::Literal { value: Value::Null }, other) => other,
            _ => return Ok(None),
        };
        Ok(Some(format!("{} {}", self.render_operand(operand)?, suffix)))
    }

    fn with_properties(&self, topic: &str, sizing: Option<(u32, u32)>) -> String {
        let mut props = vec![format!("KAFKA_TOPIC='{}'", escape(topic))];
        if let Some(key_format) = &self.formats.key_format {
            props.push(format!("KEY_FORMAT='{}'", escape(key_format)));
        }
        props.push(format!("VALUE_FORMAT='{}'", escape(&self.formats.value_format)));
        if let Some((partitions, replicas)) = sizing {
            props.push(format!("PARTITIONS={}", partitions));
            props.push(format!("REPLICAS={}", replicas));
        }
        props.join(", ")
    }
}

impl Default for StatementGenerator {
    fn default() -> Self {
        Self::with_formats(FormatOptions::default())
    }
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => format!("'{}'", escape(s)),
        Value::Decimal(d) => d.clone(),
        Value::Timestamp(t) => format!("'{}'", t.format("%Y-%m-%dT%H:%M:%S%.3f")),
        Value::Uuid(u) => format!("'{}'", u.hyphenated()),
    }
}

fn escape(text: &str) -> String {
    text.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use streamlinq_ir::{AggCall, ColumnRef, SqlType, WindowDuration, WindowSpec};

    fn base_plan() -> QueryPlan {
        QueryPlan {
            source: "Sale".to_string(),
            source_kind: EntityKind::Stream,
            sink_kind: EntityKind::Stream,
            key_columns: vec!["Id".to_string()],
            filters: vec![],
            group_by: None,
            projection: None,
            window: None,
            limit: None,
            is_pull_query: false,
            emit_mode: EmitMode::Changes,
            warnings: vec![],
        }
    }

    fn sum_amount() -> Projection {
        Projection::Aggregate {
            call: AggCall {
                func: "Sum".to_string(),
                arg: Some(ColumnRef::new("Amount")),
                result_type: SqlType::Double,
                stream_only: false,
                recognized: true,
            },
            alias: Some("Total".to_string()),
        }
    }

    #[test]
    fn test_select_star_push() {
        let sql = StatementGenerator::default().render(&base_plan(), "sales").unwrap();
        assert_eq!(sql, "SELECT * FROM sales EMIT CHANGES;");
    }

    #[test]
    fn test_filters_and_limit() {
        let mut plan = base_plan();
        plan.filters = vec![
            ScalarExpr::binary(
                BinOp::Gt,
                ScalarExpr::binary(BinOp::Mul, ScalarExpr::column("Amount"), ScalarExpr::literal(Value::Int(2))),
                ScalarExpr::literal(Value::Decimal("10.50".to_string())),
            ),
            ScalarExpr::binary(
                BinOp::Ne,
                ScalarExpr::column("Region"),
                ScalarExpr::literal(Value::String("O'Hare".to_string())),
            ),
        ];
        plan.limit = Some(10);

        let sql = StatementGenerator::default().render(&plan, "sales").unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM sales WHERE (AMOUNT * 2) > 10.50 AND REGION != 'O''Hare' EMIT CHANGES LIMIT 10;"
        );
    }

    #[test]
    fn test_null_checks_and_not() {
        let mut plan = base_plan();
        plan.filters = vec![
            ScalarExpr::binary(BinOp::Eq, ScalarExpr::column("Region"), ScalarExpr::literal(Value::Null)),
            ScalarExpr::binary(BinOp::Ne, ScalarExpr::literal(Value::Null), ScalarExpr::column("Amount")),
            ScalarExpr::UnaryOp {
                op: UnOp::Not,
                expr: Box::new(ScalarExpr::binary(
                    BinOp::Eq,
                    ScalarExpr::column("Active"),
                    ScalarExpr::literal(Value::Bool(true)),
                )),
            },
        ];

        let sql = StatementGenerator::default().render(&plan, "sales").unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM sales WHERE REGION IS NULL AND AMOUNT IS NOT NULL AND NOT (ACTIVE = TRUE) EMIT CHANGES;"
        );
    }

    #[test]
    fn test_double_negation_never_forms_comment() {
        let neg = |expr: ScalarExpr| ScalarExpr::UnaryOp {
            op: UnOp::Neg,
            expr: Box::new(expr),
        };
        let mut plan = base_plan();
        plan.filters = vec![
            ScalarExpr::binary(
                BinOp::Gt,
                neg(neg(ScalarExpr::column("Amount"))),
                ScalarExpr::literal(Value::Int(0)),
            ),
            ScalarExpr::binary(
                BinOp::Lt,
                neg(ScalarExpr::literal(Value::Int(-5))),
                ScalarExpr::column("Amount"),
            ),
            ScalarExpr::binary(BinOp::Ne, neg(ScalarExpr::column("Amount")), ScalarExpr::literal(Value::Int(1))),
        ];

        let sql = StatementGenerator::default().render(&plan, "sales").unwrap();
        assert!(!sql.contains("--"), "{}", sql);
        assert_eq!(
            sql,
            "SELECT * FROM sales WHERE -(-AMOUNT) > 0 AND -(-5) < AMOUNT AND -AMOUNT != 1 EMIT CHANGES;"
        );
    }

    #[test]
    fn test_literal_rendering() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(render_literal(&Value::Timestamp(ts)), "'2024-01-15T10:30:00.000'");
        let id = uuid::Uuid::nil();
        assert_eq!(render_literal(&Value::Uuid(id)), "'00000000-0000-0000-0000-000000000000'");
        assert_eq!(render_literal(&Value::Float(1.5)), "1.5");
        assert_eq!(render_literal(&Value::Bool(false)), "FALSE");
    }

    #[test]
    fn test_unmapped_operator_fails() {
        let mut plan = base_plan();
        plan.filters = vec![ScalarExpr::binary(
            BinOp::Or,
            ScalarExpr::column("A"),
            ScalarExpr::column("B"),
        )];
        let err = StatementGenerator::default().render(&plan, "sales").unwrap_err();
        assert!(matches!(err, TranslationError::UnsupportedExpression(_)));
    }

    #[test]
    fn test_missing_group_key_projection() {
        let mut plan = base_plan();
        plan.group_by = Some(vec![ColumnRef::new("ProductId")]);
        plan.projection = Some(vec![sum_amount()]);

        let err = StatementGenerator::default().render(&plan, "sales").unwrap_err();
        assert_eq!(err, TranslationError::MissingGroupKeyProjection("ProductId".to_string()));

        plan.projection = None;
        let err = StatementGenerator::default().render(&plan, "sales").unwrap_err();
        assert!(matches!(err, TranslationError::MissingGroupKeyProjection(_)));
    }

    #[test]
    fn test_alias_rendering() {
        let mut plan = base_plan();
        plan.projection = Some(vec![
            Projection::Column {
                col: ColumnRef::new("ProductId"),
                alias: Some("productId".to_string()),
            },
            Projection::Column {
                col: ColumnRef::new("Amount"),
                alias: Some("Price".to_string()),
            },
        ]);
        let sql = StatementGenerator::default().render(&plan, "sales").unwrap();
        assert_eq!(sql, "SELECT PRODUCTID, AMOUNT AS PRICE FROM sales EMIT CHANGES;");
    }

    #[test]
    fn test_emit_final_requires_finalized_window() {
        let mut plan = base_plan();
        plan.emit_mode = EmitMode::Final;
        let err = StatementGenerator::default().render(&plan, "sales").unwrap_err();
        assert!(matches!(err, TranslationError::InvalidEmitMode(_)));

        plan.window = Some(WindowSpec::session(WindowDuration::minutes(10)).finalized());
        let sql = StatementGenerator::default().render(&plan, "sales").unwrap();
        assert_eq!(sql, "SELECT * FROM sales WINDOW SESSION (GAP 10 MINUTES) EMIT FINAL;");
    }

    #[test]
    fn test_render_create() {
        let ddl = DdlSchema {
            object_name: "PRODUCT_TOTAL".to_string(),
            topic_name: "product-totals".to_string(),
            object_type: EntityKind::Table,
            partitions: 6,
            replicas: 3,
            columns: vec![
                crate::ddl::DdlColumn {
                    name: "PRODUCTID".to_string(),
                    target_type: SqlType::Integer,
                    is_key: true,
                },
                crate::ddl::DdlColumn {
                    name: "TOTAL".to_string(),
                    target_type: SqlType::Double,
                    is_key: false,
                },
            ],
        };
        let generator = StatementGenerator::with_formats(FormatOptions {
            value_format: "JSON".to_string(),
            key_format: Some("KAFKA".to_string()),
        });
        assert_eq!(
            generator.render_create(&ddl),
            "CREATE TABLE IF NOT EXISTS PRODUCT_TOTAL (PRODUCTID INTEGER PRIMARY KEY, TOTAL DOUBLE) \
             WITH (KAFKA_TOPIC='product-totals', KEY_FORMAT='KAFKA', VALUE_FORMAT='JSON', PARTITIONS=6, REPLICAS=3);"
        );
    }

    #[test]
    fn test_render_create_as() {
        let mut plan = base_plan();
        plan.sink_kind = EntityKind::Table;
        plan.group_by = Some(vec![ColumnRef::new("ProductId")]);
        plan.projection = Some(vec![
            Projection::GroupKey {
                col: ColumnRef::new("ProductId"),
                alias: None,
            },
            sum_amount(),
        ]);

        let sql = StatementGenerator::default()
            .render_create_as(&plan, "sales", "ProductTotals", "product-totals")
            .unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE PRODUCTTOTALS WITH (KAFKA_TOPIC='product-totals', VALUE_FORMAT='AVRO') AS \
             SELECT PRODUCTID, SUM(*) AS TOTAL FROM sales GROUP BY PRODUCTID EMIT CHANGES;"
        );

        plan.is_pull_query = true;
        let err = StatementGenerator::default()
            .render_create_as(&plan, "sales", "ProductTotals", "product-totals")
            .unwrap_err();
        assert!(matches!(err, TranslationError::UnsupportedExpression(_)));
    }
}
