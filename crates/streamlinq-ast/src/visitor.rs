//! Expression analysis: host query tree → IR query plan
//!
//! The chain is visited in call order but the plan records clauses by their
//! semantic role, so `Window` before or after `GroupBy` yields the same plan.

use streamlinq_ir::{
    self as ir, AggCall, BinOp, ColumnRef, EmitMode, EntityKind, EntitySchema, PlanWarning,
    Projection, QueryPlan, ScalarExpr, TranslationError, UnOp, WindowClauseBuilder, WindowDuration,
    WindowSpec,
};
use streamlinq_registry::FunctionRegistry;

use crate::ast::{BinaryOp, Expr, MemberBinding, UnaryOp, Value};

type Result<T> = std::result::Result<T, TranslationError>;

/// Member name a grouped lambda uses to reach the group key
const KEY_MEMBER: &str = "Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    #[default]
    Push,
    Pull,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub mode: QueryMode,
    /// Result classification; defaults to `Table` for grouped queries and to
    /// the source's own classification otherwise
    pub sink: Option<EntityKind>,
}

impl AnalyzeOptions {
    pub fn pull() -> Self {
        Self {
            mode: QueryMode::Pull,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: EntityKind) -> Self {
        self.sink = Some(sink);
        self
    }
}

/// Chained operators the visitor understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperatorKind {
    Where,
    Select,
    GroupBy,
    Window,
    EmitFinal,
    Take,
    Skip,
}

impl OperatorKind {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Where" => Some(OperatorKind::Where),
            "Select" => Some(OperatorKind::Select),
            "GroupBy" => Some(OperatorKind::GroupBy),
            "Window" => Some(OperatorKind::Window),
            "EmitFinal" => Some(OperatorKind::EmitFinal),
            "Take" => Some(OperatorKind::Take),
            "Skip" => Some(OperatorKind::Skip),
            _ => None,
        }
    }
}

/// Analyze `query` against `schema` using the built-in function registry
pub fn analyze(schema: &EntitySchema, query: &Expr, options: AnalyzeOptions) -> Result<QueryPlan> {
    ExpressionVisitor::new(schema, FunctionRegistry::builtin(), options).visit(query)
}

pub struct ExpressionVisitor<'a> {
    schema: &'a EntitySchema,
    registry: &'a FunctionRegistry,
    options: AnalyzeOptions,
    filters: Vec<ScalarExpr>,
    group_by: Option<Vec<ColumnRef>>,
    selected: bool,
    projection: Option<Vec<Projection>>,
    window: WindowClauseBuilder,
    finalize_requested: bool,
    limit: Option<u64>,
    warnings: Vec<PlanWarning>,
}

impl<'a> ExpressionVisitor<'a> {
    pub fn new(schema: &'a EntitySchema, registry: &'a FunctionRegistry, options: AnalyzeOptions) -> Self {
        Self {
            schema,
            registry,
            options,
            filters: Vec::new(),
            group_by: None,
            selected: false,
            projection: None,
            window: WindowClauseBuilder::new(),
            finalize_requested: false,
            limit: None,
            warnings: Vec::new(),
        }
    }

    pub fn visit(mut self, query: &Expr) -> Result<QueryPlan> {
        let (entity, chain) = flatten_chain(query)?;
        if entity != self.schema.entity() {
            return Err(TranslationError::unsupported(format!(
                "query source '{}' does not match entity '{}'",
                entity,
                self.schema.entity()
            )));
        }

        // Multiplicity is a structural error and wins over spec validity
        let windows = chain.iter().filter(|(method, _)| *method == "Window").count();
        if windows > 1 {
            return Err(TranslationError::MultipleWindowSpec);
        }

        for (method, args) in chain {
            self.apply(method, args)?;
        }

        self.finish()
    }

    fn apply(&mut self, method: &str, args: &[Expr]) -> Result<()> {
        match OperatorKind::from_name(method) {
            Some(OperatorKind::Where) => self.visit_where(args),
            Some(OperatorKind::Select) => self.visit_select(args),
            Some(OperatorKind::GroupBy) => self.visit_group_by(args),
            Some(OperatorKind::Window) => self.visit_window(args),
            Some(OperatorKind::EmitFinal) => {
                expect_arity(method, args, 0)?;
                self.finalize_requested = true;
                Ok(())
            }
            Some(OperatorKind::Take) => {
                let n = non_negative_int(method, args)?;
                self.limit = Some(self.limit.map_or(n, |current| current.min(n)));
                Ok(())
            }
            Some(OperatorKind::Skip) => match non_negative_int(method, args)? {
                0 => Ok(()),
                n => Err(TranslationError::unsupported(format!(
                    "Skip({}) has no equivalent in the target engine",
                    n
                ))),
            },
            None if self.registry.is_aggregate(method) => self.visit_terminal_aggregate(method, args),
            None => Err(TranslationError::unsupported(format!(
                "unrecognized query operator '{}'",
                method
            ))),
        }
    }

    fn visit_where(&mut self, args: &[Expr]) -> Result<()> {
        let (param, body) = single_lambda("Where", args)?;
        let mut conjuncts = Vec::new();
        split_conjunction(body, &mut conjuncts);
        for conjunct in conjuncts {
            let predicate = self.lower_scalar(conjunct, param)?;
            self.filters.push(predicate);
        }
        Ok(())
    }

    fn visit_group_by(&mut self, args: &[Expr]) -> Result<()> {
        if self.group_by.is_some() {
            return Err(TranslationError::unsupported("GroupBy applied more than once"));
        }
        let (param, body) = single_lambda("GroupBy", args)?;
        let keys = match body {
            Expr::New { members } => members
                .iter()
                .map(|m| self.column_of(&m.expr, param))
                .collect::<Result<Vec<_>>>()?,
            other => vec![self.column_of(other, param)?],
        };
        self.group_by = Some(keys);
        Ok(())
    }

    fn visit_window(&mut self, args: &[Expr]) -> Result<()> {
        let (factory, finalize) = match args {
            [factory] => (factory, false),
            [factory, Expr::Constant { value: Value::Bool(finalize) }] => (factory, *finalize),
            _ => {
                return Err(TranslationError::unsupported(
                    "Window expects a window factory and an optional finalize flag",
                ))
            }
        };

        let mut spec = window_spec(factory)?;
        if finalize {
            spec = spec.finalized();
        }
        self.window.specify(spec)
    }

    fn visit_select(&mut self, args: &[Expr]) -> Result<()> {
        if self.selected {
            return Err(TranslationError::unsupported("Select applied more than once"));
        }
        self.selected = true;

        let (param, body) = single_lambda("Select", args)?;
        self.projection = match body {
            Expr::Parameter { name } if name == param => {
                if self.group_by.is_some() {
                    return Err(TranslationError::unsupported(
                        "a grouped query cannot select the whole group",
                    ));
                }
                None
            }
            Expr::New { members } => Some(
                members
                    .iter()
                    .map(|MemberBinding { name, expr }| self.lower_projection(expr, param, Some(name)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            other => Some(vec![self.lower_projection(other, param, None)?]),
        };
        Ok(())
    }

    fn visit_terminal_aggregate(&mut self, method: &str, args: &[Expr]) -> Result<()> {
        if self.projection.is_some() {
            return Err(TranslationError::unsupported(format!(
                "{} cannot follow a projection",
                method
            )));
        }
        self.selected = true;
        let call = self.lower_aggregate(method, args)?;
        self.projection = Some(vec![Projection::Aggregate { call, alias: None }]);
        Ok(())
    }

    fn lower_projection(&mut self, expr: &Expr, param: &str, alias: Option<&String>) -> Result<Projection> {
        let alias = alias.cloned();
        let grouped = self.group_by.is_some();

        match expr {
            // g.Key
            Expr::Member { target, member } if grouped && member == KEY_MEMBER && is_param(target, param) => {
                match self.group_by.as_deref() {
                    Some([single]) => Ok(Projection::GroupKey {
                        col: single.clone(),
                        alias,
                    }),
                    _ => Err(TranslationError::unsupported(
                        "a composite group key must be projected column by column (g.Key.Column)",
                    )),
                }
            }
            // g.Key.Column
            Expr::Member { target, member } if grouped && is_key_of(target, param) => {
                let col = ColumnRef::new(member.as_str());
                if self.group_by.iter().flatten().any(|k| *k == col) {
                    Ok(Projection::GroupKey { col, alias })
                } else {
                    Err(TranslationError::unsupported(format!(
                        "'{}' is not part of the group key",
                        member
                    )))
                }
            }
            // g.Sum(x => x.Amount)
            Expr::Call { method, target: Some(target), args } if grouped && is_param(target, param) => {
                let call = self.lower_aggregate(method, args)?;
                Ok(Projection::Aggregate { call, alias })
            }
            Expr::Member { .. } if !grouped => Ok(Projection::Column {
                col: self.column_of(expr, param)?,
                alias,
            }),
            Expr::Member { member, .. } => Err(TranslationError::unsupported(format!(
                "'{}' must be aggregated or be part of the group key",
                member
            ))),
            other => Err(TranslationError::unsupported(format!(
                "{} is not supported in a projection",
                other.kind()
            ))),
        }
    }

    fn lower_aggregate(&mut self, method: &str, args: &[Expr]) -> Result<AggCall> {
        let arg = match args {
            [] => None,
            [Expr::Lambda { params, body }] if params.len() == 1 => Some(self.column_of(body, &params[0])?),
            _ => {
                return Err(TranslationError::unsupported(format!(
                    "{} expects an optional column selector",
                    method
                )))
            }
        };

        let recognized = self.registry.is_aggregate(method);
        if !recognized {
            self.warnings.push(PlanWarning::UnrecognizedAggregate {
                function: method.to_string(),
            });
        }

        Ok(AggCall {
            func: method.to_string(),
            arg,
            result_type: self.registry.infer_result_type(method),
            stream_only: self.registry.is_stream_only(method),
            recognized,
        })
    }

    fn lower_scalar(&self, expr: &Expr, param: &str) -> Result<ScalarExpr> {
        match expr {
            Expr::Member { .. } => Ok(ScalarExpr::Column {
                col: self.column_of(expr, param)?,
            }),
            Expr::Constant { value } => Ok(ScalarExpr::Literal {
                value: lower_value(value)?,
            }),
            Expr::Binary { op, left, right } => Ok(ScalarExpr::binary(
                lower_binary_op(*op)?,
                self.lower_scalar(left, param)?,
                self.lower_scalar(right, param)?,
            )),
            Expr::Unary { op, operand } => Ok(ScalarExpr::UnaryOp {
                op: match op {
                    UnaryOp::Not => UnOp::Not,
                    UnaryOp::Negate => UnOp::Neg,
                },
                expr: Box::new(self.lower_scalar(operand, param)?),
            }),
            Expr::Call { method, .. } => Err(TranslationError::unsupported(format!(
                "method '{}' is not supported in a predicate",
                method
            ))),
            other => Err(TranslationError::unsupported(format!(
                "{} is not supported in a predicate",
                other.kind()
            ))),
        }
    }

    /// `param.Column` → a column declared on the entity
    fn column_of(&self, expr: &Expr, param: &str) -> Result<ColumnRef> {
        match expr {
            Expr::Member { target, member } if is_param(target, param) => {
                if self.schema.column(member).is_none() {
                    return Err(TranslationError::UnknownColumn {
                        entity: self.schema.entity().to_string(),
                        column: member.clone(),
                    });
                }
                Ok(ColumnRef::new(member.as_str()))
            }
            Expr::Member { member, .. } => Err(TranslationError::unsupported(format!(
                "'{}' is not a column of the lambda parameter '{}'",
                member, param
            ))),
            other => Err(TranslationError::unsupported(format!(
                "expected a column reference, found {}",
                other.kind()
            ))),
        }
    }

    fn finish(mut self) -> Result<QueryPlan> {
        if self.finalize_requested {
            self.window.finalize()?;
        }

        // A Select written before GroupBy may name key columns directly
        if let (Some(keys), Some(members)) = (&self.group_by, &mut self.projection) {
            for member in members.iter_mut() {
                if let Projection::Column { col, alias } = member {
                    if !keys.contains(col) {
                        return Err(TranslationError::unsupported(format!(
                            "'{}' must be aggregated or be part of the group key",
                            col.column
                        )));
                    }
                    *member = Projection::GroupKey {
                        col: col.clone(),
                        alias: alias.take(),
                    };
                }
            }
        }

        let window = self.window.into_spec();
        let finalize = window.as_ref().is_some_and(|w| w.finalize);
        let sink_kind = self.options.sink.unwrap_or(if self.group_by.is_some() {
            EntityKind::Table
        } else {
            self.schema.kind()
        });

        let mut warnings = self.warnings;
        if finalize && sink_kind == EntityKind::Table {
            for member in self.projection.iter().flatten() {
                if let Projection::Aggregate { call, .. } = member {
                    if call.stream_only {
                        warnings.push(PlanWarning::NonMonotonicFinalAggregate {
                            function: call.func.clone(),
                        });
                    }
                }
            }
        }

        Ok(QueryPlan {
            source: self.schema.entity().to_string(),
            source_kind: self.schema.kind(),
            sink_kind,
            key_columns: self.schema.key_columns().map(|c| c.name.clone()).collect(),
            filters: self.filters,
            group_by: self.group_by,
            projection: self.projection,
            window,
            limit: self.limit,
            is_pull_query: self.options.mode == QueryMode::Pull,
            emit_mode: if finalize { EmitMode::Final } else { EmitMode::Changes },
            warnings,
        })
    }
}

/// Unwind `Source.A(..).B(..).C(..)` into `[A, B, C]`
fn flatten_chain(query: &Expr) -> Result<(&str, Vec<(&str, &[Expr])>)> {
    let mut chain = Vec::new();
    let mut node = query;
    let entity = loop {
        match node {
            Expr::Source { entity } => break entity.as_str(),
            Expr::Call {
                method,
                target: Some(target),
                args,
            } => {
                chain.push((method.as_str(), args.as_slice()));
                node = target.as_ref();
            }
            Expr::Call { method, target: None, .. } => {
                return Err(TranslationError::unsupported(format!(
                    "'{}' is not applied to a query source",
                    method
                )))
            }
            other => {
                return Err(TranslationError::unsupported(format!(
                    "{} cannot appear in a query chain",
                    other.kind()
                )))
            }
        }
    };
    chain.reverse();
    Ok((entity, chain))
}

fn single_lambda<'e>(method: &str, args: &'e [Expr]) -> Result<(&'e str, &'e Expr)> {
    match args {
        [Expr::Lambda { params, body }] if params.len() == 1 => Ok((params[0].as_str(), body)),
        _ => Err(TranslationError::unsupported(format!(
            "{} expects a single-parameter lambda",
            method
        ))),
    }
}

fn expect_arity(method: &str, args: &[Expr], arity: usize) -> Result<()> {
    if args.len() == arity {
        Ok(())
    } else {
        Err(TranslationError::unsupported(format!(
            "{} expects {} argument(s), got {}",
            method,
            arity,
            args.len()
        )))
    }
}

fn non_negative_int(method: &str, args: &[Expr]) -> Result<u64> {
    match args {
        [Expr::Constant { value: Value::Int(n) }] if *n >= 0 => Ok(*n as u64),
        _ => Err(TranslationError::unsupported(format!(
            "{} expects a non-negative integer constant",
            method
        ))),
    }
}

fn is_param(expr: &Expr, param: &str) -> bool {
    matches!(expr, Expr::Parameter { name } if name == param)
}

fn is_key_of(expr: &Expr, param: &str) -> bool {
    matches!(expr, Expr::Member { target, member } if member == KEY_MEMBER && is_param(target, param))
}

fn split_conjunction<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Binary {
            op: BinaryOp::AndAlso,
            left,
            right,
        } => {
            split_conjunction(left, out);
            split_conjunction(right, out);
        }
        other => out.push(other),
    }
}

fn window_spec(factory: &Expr) -> Result<WindowSpec> {
    let Expr::Call {
        method,
        target: None,
        args,
    } = factory
    else {
        return Err(TranslationError::unsupported(format!(
            "expected a window factory, found {}",
            factory.kind()
        )));
    };

    let durations = args.iter().map(duration_of).collect::<Result<Vec<_>>>()?;
    let (spec, grace) = match (method.as_str(), durations.as_slice()) {
        ("Tumbling", [size, rest @ ..]) if rest.len() <= 1 => (WindowSpec::tumbling(*size), rest.first()),
        ("Hopping", [size, advance, rest @ ..]) if rest.len() <= 1 => {
            (WindowSpec::hopping(*size, *advance), rest.first())
        }
        ("Session", [gap, rest @ ..]) if rest.len() <= 1 => (WindowSpec::session(*gap), rest.first()),
        ("Tumbling" | "Hopping" | "Session", _) => {
            return Err(TranslationError::InvalidWindowSpec(format!(
                "wrong number of durations for a {} window",
                method.to_lowercase()
            )))
        }
        (other, _) => {
            return Err(TranslationError::unsupported(format!(
                "unrecognized window kind '{}'",
                other
            )))
        }
    };

    Ok(match grace {
        Some(grace) => spec.with_grace(*grace),
        None => spec,
    })
}

fn duration_of(expr: &Expr) -> Result<WindowDuration> {
    match expr {
        Expr::Constant {
            value: Value::Duration(d),
        } => Ok(*d),
        other => Err(TranslationError::InvalidWindowSpec(format!(
            "expected a duration constant, found {}",
            other.kind()
        ))),
    }
}

fn lower_binary_op(op: BinaryOp) -> Result<BinOp> {
    Ok(match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Subtract => BinOp::Sub,
        BinaryOp::Multiply => BinOp::Mul,
        BinaryOp::Divide => BinOp::Div,
        BinaryOp::Modulo => BinOp::Mod,
        BinaryOp::Equal => BinOp::Eq,
        BinaryOp::NotEqual => BinOp::Ne,
        BinaryOp::GreaterThan => BinOp::Gt,
        BinaryOp::GreaterThanOrEqual => BinOp::Ge,
        BinaryOp::LessThan => BinOp::Lt,
        BinaryOp::LessThanOrEqual => BinOp::Le,
        BinaryOp::AndAlso => BinOp::And,
        BinaryOp::OrElse => {
            return Err(TranslationError::unsupported(
                "disjunction is not supported in filters",
            ))
        }
    })
}

fn lower_value(value: &Value) -> Result<ir::Value> {
    Ok(match value {
        Value::Null => ir::Value::Null,
        Value::Bool(b) => ir::Value::Bool(*b),
        Value::Int(i) => ir::Value::Int(*i),
        Value::Float(f) if !f.is_finite() => {
            return Err(TranslationError::unsupported(format!(
                "non-finite float {} has no literal form",
                f
            )))
        }
        Value::Float(f) => ir::Value::Float(*f),
        Value::String(s) => ir::Value::String(s.clone()),
        Value::Decimal(d) => ir::Value::Decimal(d.clone()),
        Value::Timestamp(t) => ir::Value::Timestamp(*t),
        Value::Uuid(u) => ir::Value::Uuid(*u),
        Value::Duration(d) => {
            return Err(TranslationError::unsupported(format!(
                "duration {} is not a predicate value",
                d
            )))
        }
    })
}
