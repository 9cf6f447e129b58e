//! Type and operator translation tables

use streamlinq_ir::{BinOp, DecimalSettings, Result, SemanticType, SqlType, TranslationError};

pub use streamlinq_registry::{infer_aggregate_result_type, render_aggregate_call};

/// Column type for a declared member type
pub fn map_column_type(semantic_type: &SemanticType, decimal: DecimalSettings) -> Result<SqlType> {
    Ok(match semantic_type {
        SemanticType::String | SemanticType::Uuid => SqlType::Varchar,
        SemanticType::Int32 => SqlType::Integer,
        SemanticType::Int64 => SqlType::Bigint,
        SemanticType::Float32 | SemanticType::Float64 => SqlType::Double,
        SemanticType::Bool => SqlType::Boolean,
        SemanticType::Timestamp => SqlType::Timestamp,
        SemanticType::Decimal => SqlType::Decimal {
            precision: decimal.precision,
            scale: decimal.scale,
        },
        SemanticType::Bytes => SqlType::Bytes,
        other @ (SemanticType::Enum(_) | SemanticType::Composite(_)) => {
            return Err(TranslationError::UnsupportedType(other.to_string()))
        }
    })
}

/// Operator token; arithmetic and comparison only
pub fn map_operator(op: BinOp) -> Result<&'static str> {
    match op {
        BinOp::Add => Ok("+"),
        BinOp::Sub => Ok("-"),
        BinOp::Mul => Ok("*"),
        BinOp::Div => Ok("/"),
        BinOp::Eq => Ok("="),
        BinOp::Ne => Ok("!="),
        BinOp::Gt => Ok(">"),
        BinOp::Ge => Ok(">="),
        BinOp::Lt => Ok("<"),
        BinOp::Le => Ok("<="),
        BinOp::Mod | BinOp::And | BinOp::Or => Err(TranslationError::unsupported(format!(
            "operator '{}' has no target mapping",
            op
        ))),
    }
}
