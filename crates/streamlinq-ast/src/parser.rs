//! Pest-based parser for the textual query form
//!
//! Produces the same chained host tree a LINQ-style front end would, so the
//! text and the builder API share one analysis path.

use chrono::{DateTime, Utc};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use streamlinq_ir::{TimeUnit, WindowDuration};
use thiserror::Error;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "streamlinq.pest"]
pub struct StreamLinqParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Pest error: {0}")]
    Pest(#[from] pest::error::Error<Rule>),
}

/// Lambda parameter for a row when the source carries no alias
const DEFAULT_ROW_PARAM: &str = "it";

/// Parse query text into a host query chain
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let mut pairs = StreamLinqParser::parse(Rule::query, source)?;
    let query = pairs.next().ok_or_else(|| ParseError::Syntax("Empty input".to_string()))?;

    let mut inner = query.into_inner();
    let source_pair = next_inner(&mut inner, "source")?;
    let (entity, scope) = parse_source(source_pair)?;

    let mut chain = Expr::source(entity);
    let mut scope = scope;
    for pair in inner {
        if pair.as_rule() == Rule::EOI {
            break;
        }
        chain = parse_operator(pair, chain, &mut scope)?;
    }

    Ok(chain)
}

/// Names in effect while lowering operators
struct Scope {
    entity: String,
    row: String,
    group: String,
    group_columns: Option<Vec<String>>,
}

impl Scope {
    fn new(entity: String, alias: Option<String>) -> Self {
        let row = alias.unwrap_or_else(|| DEFAULT_ROW_PARAM.to_string());
        let group = if row == "g" { "grp" } else { "g" }.to_string();
        Self {
            entity,
            row,
            group,
            group_columns: None,
        }
    }

    fn is_grouped(&self) -> bool {
        self.group_columns.is_some()
    }

    /// Lambda parameter a projection binds
    fn projection_param(&self) -> &str {
        if self.is_grouped() {
            &self.group
        } else {
            &self.row
        }
    }
}

fn parse_source(pair: Pair<Rule>) -> Result<(String, Scope), ParseError> {
    let mut inner = operands(pair);
    let entity = next_inner(&mut inner, "entity name")?.as_str().to_string();
    let alias = inner.next().map(|p| p.as_str().to_string());
    let scope = Scope::new(entity.clone(), alias);
    Ok((entity, scope))
}

fn parse_operator(pair: Pair<Rule>, chain: Expr, scope: &mut Scope) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::where_op => {
            let expr_pair = next_inner(&mut operands(pair), "predicate")?;
            let body = parse_expr(expr_pair, scope)?;
            Ok(chain.call("Where", vec![Expr::lambda(scope.row.clone(), body)]))
        }
        Rule::group_op => {
            let columns = operands(pair)
                .map(|p| column_name(p, scope))
                .collect::<Result<Vec<_>, _>>()?;
            let body = match columns.as_slice() {
                [single] => row_member(scope, single),
                many => Expr::new_object(many.iter().map(|c| (c.as_str(), row_member(scope, c))).collect()),
            };
            scope.group_columns = Some(columns);
            Ok(chain.call("GroupBy", vec![Expr::lambda(scope.row.clone(), body)]))
        }
        Rule::window_op => {
            let mut inner = operands(pair);
            let kind = window_kind(next_inner(&mut inner, "window kind")?.as_str());
            let mut args = Vec::new();
            for p in inner {
                match p.as_rule() {
                    Rule::duration => args.push(Expr::constant(Value::Duration(parse_duration(p.as_str())?))),
                    Rule::grace => {
                        let d = next_inner(&mut operands(p), "grace period")?;
                        args.push(Expr::constant(Value::Duration(parse_duration(d.as_str())?)));
                    }
                    other => return Err(unexpected(other)),
                }
            }
            Ok(chain.call("Window", vec![Expr::function(kind, args)]))
        }
        Rule::select_op => {
            let param = scope.projection_param().to_string();
            let mut members = Vec::new();
            for p in operands(pair) {
                match p.as_rule() {
                    Rule::select_all => {
                        return Ok(chain.call("Select", vec![Expr::lambda(param.clone(), Expr::param(param))]))
                    }
                    Rule::select_item => members.push(parse_select_item(p, scope)?),
                    other => return Err(unexpected(other)),
                }
            }
            Ok(chain.call("Select", vec![Expr::lambda(param, Expr::New { members })]))
        }
        Rule::emit_op => Ok(chain.call("EmitFinal", vec![])),
        Rule::take_op | Rule::skip_op => {
            let method = if pair.as_rule() == Rule::take_op { "Take" } else { "Skip" };
            let n = next_inner(&mut operands(pair), "count")?;
            Ok(chain.call(method, vec![Expr::constant(Value::Int(parse_int(n.as_str())?))]))
        }
        Rule::agg_op => {
            let mut inner = operands(pair);
            let method = pascal_case(next_inner(&mut inner, "aggregate name")?.as_str());
            let args = match inner.next() {
                Some(col) => {
                    let name = column_name(col, scope)?;
                    vec![Expr::lambda(scope.row.clone(), row_member(scope, &name))]
                }
                None => vec![],
            };
            Ok(chain.call(method, args))
        }
        other => Err(unexpected(other)),
    }
}

fn parse_select_item(pair: Pair<Rule>, scope: &Scope) -> Result<MemberBinding, ParseError> {
    let mut inner = operands(pair);
    let first = next_inner(&mut inner, "select item")?;
    let (alias, value) = if first.as_rule() == Rule::ident {
        (Some(first.as_str().to_string()), next_inner(&mut inner, "select expression")?)
    } else {
        (None, first)
    };

    let group = Expr::param(scope.group.clone());
    let (default_name, expr) = match value.as_rule() {
        Rule::key_ref => match operands(value).next() {
            Some(col) => {
                let col = col.as_str().to_string();
                (col.clone(), group.member("Key").member(col))
            }
            None => {
                let name = match scope.group_columns.as_deref() {
                    Some([single]) => single.clone(),
                    _ => "Key".to_string(),
                };
                (name, group.member("Key"))
            }
        },
        Rule::agg_call => {
            let mut parts = operands(value);
            let method = pascal_case(next_inner(&mut parts, "aggregate name")?.as_str());
            let args = match parts.next() {
                Some(col) => {
                    let name = column_name(col, scope)?;
                    vec![Expr::lambda("x", Expr::param("x").member(name))]
                }
                None => vec![],
            };
            (method.clone(), group.call(method, args))
        }
        Rule::col_ref => {
            let name = column_name(value, scope)?;
            let is_key = scope
                .group_columns
                .as_ref()
                .is_some_and(|keys| keys.contains(&name));
            let expr = if is_key {
                group.member("Key").member(name.clone())
            } else {
                Expr::param(scope.projection_param()).member(name.clone())
            };
            (name, expr)
        }
        other => return Err(unexpected(other)),
    };

    Ok(MemberBinding {
        name: alias.unwrap_or(default_name),
        expr,
    })
}

fn parse_expr(pair: Pair<Rule>, scope: &Scope) -> Result<Expr, ParseError> {
    match pair.as_rule() {
        Rule::expr => parse_expr(next_inner(&mut pair.into_inner(), "expression")?, scope),
        Rule::or_expr | Rule::and_expr | Rule::add_expr | Rule::mul_expr | Rule::cmp_expr => {
            let mut inner = pair.into_inner();
            let mut left = parse_expr(next_inner(&mut inner, "operand")?, scope)?;
            while let Some(op) = inner.next() {
                let op = binary_op(op.as_str())?;
                let right = parse_expr(next_inner(&mut inner, "right operand")?, scope)?;
                left = Expr::binary(op, left, right);
            }
            Ok(left)
        }
        Rule::not_expr => {
            let mut inner = pair.into_inner();
            let first = next_inner(&mut inner, "operand")?;
            if first.as_rule() == Rule::not_op {
                let operand = parse_expr(next_inner(&mut inner, "negated operand")?, scope)?;
                Ok(Expr::unary(UnaryOp::Not, operand))
            } else {
                parse_expr(first, scope)
            }
        }
        Rule::unary => {
            let mut inner = pair.into_inner();
            let first = next_inner(&mut inner, "operand")?;
            if first.as_rule() == Rule::neg_op {
                let operand = parse_expr(next_inner(&mut inner, "negated operand")?, scope)?;
                Ok(negate(operand))
            } else {
                parse_expr(first, scope)
            }
        }
        Rule::col_ref => {
            let name = column_name(pair, scope)?;
            Ok(row_member(scope, &name))
        }
        _ => parse_literal(pair).map(Expr::constant),
    }
}

fn parse_literal(pair: Pair<Rule>) -> Result<Value, ParseError> {
    let text = pair.as_str();
    match pair.as_rule() {
        Rule::null_lit => Ok(Value::Null),
        Rule::bool_lit => Ok(Value::Bool(text.eq_ignore_ascii_case("true"))),
        Rule::int => Ok(Value::Int(parse_int(text)?)),
        Rule::float_lit => text
            .parse()
            .map(Value::Float)
            .map_err(|e| ParseError::Syntax(format!("Invalid float '{}': {}", text, e))),
        Rule::decimal_lit => Ok(Value::Decimal(text[..text.len() - 1].to_string())),
        Rule::string => Ok(Value::String(unquote(text))),
        Rule::timestamp_lit => {
            let raw = unquote(next_inner(&mut operands(pair), "timestamp string")?.as_str());
            DateTime::parse_from_rfc3339(&raw)
                .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
                .map_err(|e| ParseError::Syntax(format!("Invalid timestamp '{}': {}", raw, e)))
        }
        Rule::uuid_lit => {
            let raw = unquote(next_inner(&mut operands(pair), "uuid string")?.as_str());
            uuid::Uuid::parse_str(&raw)
                .map(Value::Uuid)
                .map_err(|e| ParseError::Syntax(format!("Invalid uuid '{}': {}", raw, e)))
        }
        other => Err(unexpected(other)),
    }
}

/// `Sale.Amount`, `s.Amount` or bare `Amount` → `Amount`
fn column_name(pair: Pair<Rule>, scope: &Scope) -> Result<String, ParseError> {
    let parts: Vec<_> = pair.into_inner().map(|p| p.as_str().to_string()).collect();
    match parts.as_slice() {
        [column] => Ok(column.clone()),
        [qualifier, column] if *qualifier == scope.row || *qualifier == scope.entity => Ok(column.clone()),
        [qualifier, _] => Err(ParseError::Syntax(format!("Unknown qualifier '{}'", qualifier))),
        _ => Err(ParseError::Syntax("Empty column reference".to_string())),
    }
}

fn row_member(scope: &Scope, column: &str) -> Expr {
    Expr::param(scope.row.clone()).member(column)
}

fn negate(operand: Expr) -> Expr {
    match operand {
        Expr::Constant { value: Value::Int(i) } => Expr::constant(Value::Int(-i)),
        Expr::Constant { value: Value::Float(f) } => Expr::constant(Value::Float(-f)),
        Expr::Constant { value: Value::Decimal(d) } => Expr::constant(Value::Decimal(format!("-{}", d))),
        other => Expr::unary(UnaryOp::Negate, other),
    }
}

fn binary_op(symbol: &str) -> Result<BinaryOp, ParseError> {
    Ok(match symbol.to_ascii_lowercase().as_str() {
        "||" | "or" => BinaryOp::OrElse,
        "&&" | "and" => BinaryOp::AndAlso,
        "==" | "=" => BinaryOp::Equal,
        "!=" | "<>" => BinaryOp::NotEqual,
        ">" => BinaryOp::GreaterThan,
        ">=" => BinaryOp::GreaterThanOrEqual,
        "<" => BinaryOp::LessThan,
        "<=" => BinaryOp::LessThanOrEqual,
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Subtract,
        "*" => BinaryOp::Multiply,
        "/" => BinaryOp::Divide,
        "%" => BinaryOp::Modulo,
        other => return Err(ParseError::Syntax(format!("Unknown operator: {}", other))),
    })
}

fn parse_duration(text: &str) -> Result<WindowDuration, ParseError> {
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ParseError::Syntax(format!("Duration '{}' has no unit", text)))?;
    let (digits, unit) = text.split_at(split);
    let unit = match unit {
        "ms" => TimeUnit::Milliseconds,
        "s" => TimeUnit::Seconds,
        "m" => TimeUnit::Minutes,
        "h" => TimeUnit::Hours,
        "d" => TimeUnit::Days,
        other => return Err(ParseError::Syntax(format!("Unknown duration unit '{}'", other))),
    };
    Ok(WindowDuration::new(parse_int(digits)?, unit))
}

fn parse_int(text: &str) -> Result<i64, ParseError> {
    text.parse()
        .map_err(|e| ParseError::Syntax(format!("Invalid integer '{}': {}", text, e)))
}

fn unquote(text: &str) -> String {
    text.strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(text)
        .replace("''", "'")
}

fn window_kind(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "tumbling" => "Tumbling".to_string(),
        "hopping" => "Hopping".to_string(),
        "session" => "Session".to_string(),
        _ => pascal_case(name),
    }
}

/// `latest_by_offset` → `LatestByOffset`; already-cased names pass through
fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_from
            | Rule::kw_where
            | Rule::kw_group
            | Rule::kw_by
            | Rule::kw_window
            | Rule::kw_grace
            | Rule::kw_select
            | Rule::kw_emit
            | Rule::kw_final
            | Rule::kw_take
            | Rule::kw_skip
            | Rule::kw_key
            | Rule::kw_timestamp
            | Rule::kw_uuid
    )
}

/// Inner pairs with keyword tokens dropped
fn operands(pair: Pair<Rule>) -> impl Iterator<Item = Pair<Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn next_inner<'i>(
    inner: &mut impl Iterator<Item = Pair<'i, Rule>>,
    what: &str,
) -> Result<Pair<'i, Rule>, ParseError> {
    inner
        .next()
        .ok_or_else(|| ParseError::Syntax(format!("Missing {}", what)))
}

fn unexpected(rule: Rule) -> ParseError {
    ParseError::Syntax(format!("Unexpected {:?}", rule))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_only() {
        let query = parse("from Sale").unwrap();
        assert_eq!(query, Expr::source("Sale"));
    }

    #[test]
    fn test_parse_where_with_alias() {
        let query = parse("from Sale s | where s.Amount > 10 and Id != 0").unwrap();
        let expected = Expr::source("Sale").call(
            "Where",
            vec![Expr::lambda(
                "s",
                Expr::binary(
                    BinaryOp::AndAlso,
                    Expr::binary(
                        BinaryOp::GreaterThan,
                        Expr::param("s").member("Amount"),
                        Expr::constant(Value::Int(10)),
                    ),
                    Expr::binary(
                        BinaryOp::NotEqual,
                        Expr::param("s").member("Id"),
                        Expr::constant(Value::Int(0)),
                    ),
                ),
            )],
        );
        assert_eq!(query, expected);
    }

    #[test]
    fn test_parse_literals() {
        let query = parse(
            "from Sale | where Amount >= -2.5m and Name = 'O''Brien' and Active == true and Note == null",
        )
        .unwrap();
        let Expr::Call { args, .. } = query else {
            panic!("expected a call");
        };
        let json = serde_json::to_string(&args[0]).unwrap();
        assert!(json.contains("\"Decimal\":\"-2.5\""));
        assert!(json.contains("O'Brien"));
        assert!(json.contains("\"Bool\":true"));
        assert!(json.contains("\"Null\""));
    }

    #[test]
    fn test_parse_timestamp_literal() {
        let query = parse("from Sale | where OccurredAt > timestamp '2024-01-15T10:30:00Z'").unwrap();
        let Expr::Call { args, .. } = query else {
            panic!("expected a call");
        };
        let Expr::Lambda { body, .. } = &args[0] else {
            panic!("expected a lambda");
        };
        let Expr::Binary { right, .. } = body.as_ref() else {
            panic!("expected a comparison");
        };
        assert!(matches!(
            right.as_ref(),
            Expr::Constant { value: Value::Timestamp(_) }
        ));
    }

    #[test]
    fn test_parse_window_and_group() {
        let query = parse(
            "from Sale
             | window tumbling(1m) grace 30s
             | group by ProductId
             | select { ProductId = key, Total = sum(Amount) }
             | emit final",
        )
        .unwrap();

        let expected = Expr::source("Sale")
            .call(
                "Window",
                vec![Expr::function(
                    "Tumbling",
                    vec![
                        Expr::constant(Value::Duration(WindowDuration::minutes(1))),
                        Expr::constant(Value::Duration(WindowDuration::seconds(30))),
                    ],
                )],
            )
            .call("GroupBy", vec![Expr::lambda("it", Expr::param("it").member("ProductId"))])
            .call(
                "Select",
                vec![Expr::lambda(
                    "g",
                    Expr::new_object(vec![
                        ("ProductId", Expr::param("g").member("Key")),
                        (
                            "Total",
                            Expr::param("g").call("Sum", vec![Expr::lambda("x", Expr::param("x").member("Amount"))]),
                        ),
                    ]),
                )],
            )
            .call("EmitFinal", vec![]);
        assert_eq!(query, expected);
    }

    #[test]
    fn test_default_binding_names() {
        let query = parse("from Sale | group by Region, ProductId | select { Region, count(), key.ProductId }").unwrap();
        let Expr::Call { args, .. } = query else {
            panic!("expected a call");
        };
        let Expr::Lambda { body, .. } = &args[0] else {
            panic!("expected a lambda");
        };
        let Expr::New { members } = body.as_ref() else {
            panic!("expected an object");
        };
        let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Region", "Count", "ProductId"]);
        assert_eq!(members[0].expr, Expr::param("g").member("Key").member("Region"));
    }

    #[test]
    fn test_parse_terminal_ops() {
        let query = parse("from Sale | skip 0 | take 5 | latest_by_offset(Amount);").unwrap();
        let expected = Expr::source("Sale")
            .call("Skip", vec![Expr::constant(Value::Int(0))])
            .call("Take", vec![Expr::constant(Value::Int(5))])
            .call(
                "LatestByOffset",
                vec![Expr::lambda("it", Expr::param("it").member("Amount"))],
            );
        assert_eq!(query, expected);
    }

    #[test]
    fn test_group_param_avoids_alias() {
        let query = parse("from Sale g | group by g.ProductId | select { key }").unwrap();
        let Expr::Call { args, .. } = query else {
            panic!("expected a call");
        };
        assert!(matches!(&args[0], Expr::Lambda { params, .. } if params == &vec!["grp".to_string()]));
    }

    #[test]
    fn test_unknown_qualifier() {
        let err = parse("from Sale s | where t.Amount > 1").unwrap_err();
        assert!(matches!(err, ParseError::Syntax(msg) if msg.contains("qualifier")));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(parse("select * from Sale"), Err(ParseError::Pest(_))));
        assert!(matches!(parse("from Sale | where"), Err(ParseError::Pest(_))));
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("sum"), "Sum");
        assert_eq!(pascal_case("count_distinct"), "CountDistinct");
        assert_eq!(pascal_case("LatestByOffset"), "LatestByOffset");
        assert_eq!(window_kind("HOPPING"), "Hopping");
    }
}
