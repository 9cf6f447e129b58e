//! StreamLinq Intermediate Representation (IR)
//!
//! Target-neutral query plan that sits between the host expression tree and
//! the streaming SQL text. Plans are deterministically serializable so their
//! fingerprint can key caches and detect duplicate registrations.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub mod error;
mod schema;
mod types;
mod window;

pub use error::{Result, TranslationError};
pub use schema::*;
pub use types::*;
pub use window::*;

/// One query, analyzed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Entity the query reads from
    pub source: String,
    pub source_kind: EntityKind,
    /// Classification of the query's result
    pub sink_kind: EntityKind,
    /// Key columns of the source entity, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_columns: Vec<String>,

    /// Conjunction of filter predicates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<ScalarExpr>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<ColumnRef>>,

    /// `None` selects every column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<Vec<Projection>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    #[serde(default)]
    pub is_pull_query: bool,
    pub emit_mode: EmitMode,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PlanWarning>,
}

impl QueryPlan {
    /// SHA-256 over the canonical JSON form: the plan signature
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("IR should always serialize");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn is_pull_query(&self) -> bool {
        self.is_pull_query
    }

    pub fn is_grouped(&self) -> bool {
        self.group_by.as_ref().is_some_and(|keys| !keys.is_empty())
    }

    pub fn aggregates(&self) -> impl Iterator<Item = &AggCall> {
        self.projection
            .iter()
            .flatten()
            .filter_map(|p| match p {
                Projection::Aggregate { call, .. } => Some(call),
                _ => None,
            })
    }

    pub fn diagnostics(&self) -> PlanDiagnostics {
        let outputs = match &self.projection {
            None => vec![OutputHint {
                name: "*".to_string(),
                kind: OutputKind::Column,
                result_type: None,
            }],
            Some(members) => members
                .iter()
                .map(|p| OutputHint {
                    name: p.output_name().to_string(),
                    kind: p.kind(),
                    result_type: match p {
                        Projection::Aggregate { call, .. } => Some(call.result_type.to_string()),
                        _ => None,
                    },
                })
                .collect(),
        };

        PlanDiagnostics {
            source: self.source.clone(),
            sink: self.sink_kind,
            pull_query: self.is_pull_query,
            emit_mode: self.emit_mode,
            filters: self.filters.len(),
            group_keys: self
                .group_by
                .iter()
                .flatten()
                .map(|c| c.column.clone())
                .collect(),
            window: self.window.as_ref().map(WindowSpec::to_clause),
            finalize: self.window.as_ref().is_some_and(|w| w.finalize),
            outputs,
            limit: self.limit,
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
            fingerprint: self.fingerprint(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmitMode {
    Changes,
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub column: String,
}

impl ColumnRef {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

/// Output member of a projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Projection {
    Column {
        col: ColumnRef,
        #[serde(skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    GroupKey {
        col: ColumnRef,
        #[serde(skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
    Aggregate {
        call: AggCall,
        #[serde(skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
}

impl Projection {
    pub fn alias(&self) -> Option<&str> {
        match self {
            Projection::Column { alias, .. }
            | Projection::GroupKey { alias, .. }
            | Projection::Aggregate { alias, .. } => alias.as_deref(),
        }
    }

    pub fn output_name(&self) -> &str {
        if let Some(alias) = self.alias() {
            return alias;
        }
        match self {
            Projection::Column { col, .. } | Projection::GroupKey { col, .. } => &col.column,
            Projection::Aggregate { call, .. } => &call.func,
        }
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            Projection::Column { .. } => OutputKind::Column,
            Projection::GroupKey { .. } => OutputKind::GroupKey,
            Projection::Aggregate { .. } => OutputKind::Aggregate,
        }
    }
}

/// Aggregate function application, as written in the query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggCall {
    /// Method name as it appeared in the host query
    pub func: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg: Option<ColumnRef>,
    pub result_type: SqlType,
    /// Non-monotonic over a window: unsafe to finalize into a table
    #[serde(default)]
    pub stream_only: bool,
    /// Known to the function registry
    #[serde(default)]
    pub recognized: bool,
}

/// Scalar expressions appearing in filter predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScalarExpr {
    Literal { value: Value },
    Column { col: ColumnRef },
    BinaryOp { op: BinOp, left: Box<ScalarExpr>, right: Box<ScalarExpr> },
    UnaryOp { op: UnOp, expr: Box<ScalarExpr> },
}

impl ScalarExpr {
    pub fn column(name: impl Into<String>) -> Self {
        ScalarExpr::Column {
            col: ColumnRef::new(name),
        }
    }

    pub fn literal(value: Value) -> Self {
        ScalarExpr::Literal { value }
    }

    pub fn binary(op: BinOp, left: ScalarExpr, right: ScalarExpr) -> Self {
        ScalarExpr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `column = literal` (either side), the shape a pull-query key lookup needs
    pub fn equality_column(&self) -> Option<&ColumnRef> {
        match self {
            ScalarExpr::BinaryOp { op: BinOp::Eq, left, right } => match (&**left, &**right) {
                (ScalarExpr::Column { col }, ScalarExpr::Literal { value })
                | (ScalarExpr::Literal { value }, ScalarExpr::Column { col })
                    if !value.is_null() =>
                {
                    Some(col)
                }
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    // Arithmetic
    Add, Sub, Mul, Div, Mod,
    // Comparison
    Eq, Ne, Lt, Le, Gt, Ge,
    // Logical
    And, Or,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        };
        write!(f, "{}", symbol)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

/// Semantic risks detected during analysis. They never block construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlanWarning {
    NonMonotonicFinalAggregate { function: String },
    UnrecognizedAggregate { function: String },
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanWarning::NonMonotonicFinalAggregate { function } => write!(
                f,
                "{} is not monotonic; finalizing it into a table may emit incorrect results",
                function
            ),
            PlanWarning::UnrecognizedAggregate { function } => write!(
                f,
                "{} is not a known aggregate; rendered without validation",
                function
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Column,
    GroupKey,
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputHint {
    pub name: String,
    pub kind: OutputKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,
}

/// Structured summary of a plan for logging and tracing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDiagnostics {
    pub source: String,
    pub sink: EntityKind,
    pub pull_query: bool,
    pub emit_mode: EmitMode,
    pub filters: usize,
    pub group_keys: Vec<String>,
    pub window: Option<String>,
    pub finalize: bool,
    pub outputs: Vec<OutputHint>,
    pub limit: Option<u64>,
    pub warnings: Vec<String>,
    pub fingerprint: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> QueryPlan {
        QueryPlan {
            source: "Sale".to_string(),
            source_kind: EntityKind::Stream,
            sink_kind: EntityKind::Table,
            key_columns: vec!["Id".to_string()],
            filters: vec![ScalarExpr::binary(
                BinOp::Gt,
                ScalarExpr::column("Amount"),
                ScalarExpr::literal(Value::Int(10)),
            )],
            group_by: Some(vec![ColumnRef::new("ProductId")]),
            projection: Some(vec![
                Projection::GroupKey {
                    col: ColumnRef::new("ProductId"),
                    alias: None,
                },
                Projection::Aggregate {
                    call: AggCall {
                        func: "Sum".to_string(),
                        arg: Some(ColumnRef::new("Amount")),
                        result_type: SqlType::Double,
                        stream_only: false,
                        recognized: true,
                    },
                    alias: Some("Total".to_string()),
                },
            ]),
            window: Some(WindowSpec::tumbling(WindowDuration::minutes(1)).finalized()),
            limit: None,
            is_pull_query: false,
            emit_mode: EmitMode::Final,
            warnings: vec![],
        }
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let plan1 = sample_plan();
        let plan2 = plan1.clone();

        assert_eq!(plan1.fingerprint(), plan2.fingerprint());

        let mut plan3 = plan1.clone();
        plan3.limit = Some(5);
        assert_ne!(plan1.fingerprint(), plan3.fingerprint());
    }

    #[test]
    fn test_json_round_trip() {
        let plan = sample_plan();

        let json = serde_json::to_string(&plan).unwrap();
        let parsed: QueryPlan = serde_json::from_str(&json).unwrap();

        assert_eq!(plan, parsed);
        assert_eq!(plan.fingerprint(), parsed.fingerprint());
    }

    #[test]
    fn test_diagnostics() {
        let diag = sample_plan().diagnostics();

        assert_eq!(diag.group_keys, vec!["ProductId"]);
        assert_eq!(diag.window.as_deref(), Some("WINDOW TUMBLING (SIZE 1 MINUTES)"));
        assert!(diag.finalize);
        assert_eq!(diag.outputs.len(), 2);
        assert_eq!(diag.outputs[1].name, "Total");
        assert_eq!(diag.outputs[1].result_type.as_deref(), Some("DOUBLE"));
        assert_eq!(diag.outputs[0].kind, OutputKind::GroupKey);
    }

    #[test]
    fn test_equality_column() {
        let eq = ScalarExpr::binary(
            BinOp::Eq,
            ScalarExpr::literal(Value::Int(123)),
            ScalarExpr::column("Id"),
        );
        assert_eq!(eq.equality_column(), Some(&ColumnRef::new("Id")));

        let null_eq = ScalarExpr::binary(
            BinOp::Eq,
            ScalarExpr::column("Id"),
            ScalarExpr::literal(Value::Null),
        );
        assert_eq!(null_eq.equality_column(), None);

        let gt = ScalarExpr::binary(BinOp::Gt, ScalarExpr::column("Id"), ScalarExpr::literal(Value::Int(1)));
        assert_eq!(gt.equality_column(), None);
    }
}
