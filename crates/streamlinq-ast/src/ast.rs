//! Host query expression tree
//!
//! The shape a LINQ-style front end produces for a chained query such as
//! `sales.Where(s => s.Id == 123).GroupBy(s => s.ProductId).Select(...)`:
//! every chained operator is a `Call` whose `target` is the previous step,
//! bottoming out at a `Source`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use streamlinq_ir::WindowDuration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node")]
pub enum Expr {
    /// Root of a query chain: the entity being queried
    Source { entity: String },
    /// Method call. Chained operators have a target; window factories such
    /// as `Tumbling(...)` do not.
    Call {
        method: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<Box<Expr>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<Expr>,
    },
    Lambda { params: Vec<String>, body: Box<Expr> },
    Parameter { name: String },
    Member { target: Box<Expr>, member: String },
    Constant { value: Value },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Anonymous object construction, e.g. `new { ProductId = g.Key }`
    New { members: Vec<MemberBinding> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberBinding {
    pub name: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    AndAlso,
    OrElse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Decimal(String),
    Timestamp(DateTime<Utc>),
    Uuid(uuid::Uuid),
    Duration(WindowDuration),
}

impl Expr {
    pub fn source(entity: impl Into<String>) -> Self {
        Expr::Source {
            entity: entity.into(),
        }
    }

    /// Chain `method` onto this expression
    pub fn call(self, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            method: method.into(),
            target: Some(Box::new(self)),
            args,
        }
    }

    /// Free-standing call, e.g. `Tumbling(1m)`
    pub fn function(method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            method: method.into(),
            target: None,
            args,
        }
    }

    pub fn lambda(param: impl Into<String>, body: Expr) -> Self {
        Expr::Lambda {
            params: vec![param.into()],
            body: Box::new(body),
        }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expr::Parameter { name: name.into() }
    }

    pub fn member(self, member: impl Into<String>) -> Self {
        Expr::Member {
            target: Box::new(self),
            member: member.into(),
        }
    }

    pub fn constant(value: Value) -> Self {
        Expr::Constant { value }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn new_object(members: Vec<(&str, Expr)>) -> Self {
        Expr::New {
            members: members
                .into_iter()
                .map(|(name, expr)| MemberBinding {
                    name: name.to_string(),
                    expr,
                })
                .collect(),
        }
    }

    /// Short node-kind label used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Source { .. } => "source",
            Expr::Call { .. } => "method call",
            Expr::Lambda { .. } => "lambda",
            Expr::Parameter { .. } => "parameter",
            Expr::Member { .. } => "member access",
            Expr::Constant { .. } => "constant",
            Expr::Binary { .. } => "binary expression",
            Expr::Unary { .. } => "unary expression",
            Expr::New { .. } => "object construction",
        }
    }
}
