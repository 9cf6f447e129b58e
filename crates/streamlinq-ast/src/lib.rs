//! StreamLinq AST - host query trees, the textual parser, and analysis into IR

pub mod ast;
mod parser;
mod visitor;

pub use ast::*;
pub use parser::{parse, ParseError};
pub use visitor::{analyze, AnalyzeOptions, ExpressionVisitor, QueryMode};
