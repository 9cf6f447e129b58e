//! Aggregate function registry
//!
//! Maps host aggregate method names (`Sum`, `LatestByOffset`, ...) to the
//! target engine's function names and result-type hints. Lookups ignore case
//! only: `latestbyoffset` finds `LatestByOffset`, `latest_by_offset` does not.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use streamlinq_ir::SqlType;
use thiserror::Error;

static BUILTINS: LazyLock<FunctionRegistry> = LazyLock::new(FunctionRegistry::default);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Function not found: {0}")]
    FunctionNotFound(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSignature {
    /// Host method name
    pub name: String,
    /// Target engine function name
    pub target: String,
    pub return_type: SqlType,
    pub is_aggregate: bool,
    /// Non-monotonic: correct on a stream, wrong once finalized into a table
    pub stream_only: bool,
}

impl FunctionSignature {
    fn aggregate(name: &str, target: &str, return_type: SqlType) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            return_type,
            is_aggregate: true,
            stream_only: false,
        }
    }

    fn stream_only(mut self) -> Self {
        self.stream_only = true;
        self
    }
}

pub struct FunctionRegistry {
    functions: HashMap<String, FunctionSignature>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };
        registry.register_builtins();
        registry
    }

    /// Process-wide read-only registry of built-in aggregates
    pub fn builtin() -> &'static FunctionRegistry {
        &BUILTINS
    }

    fn register_builtins(&mut self) {
        for sig in [
            FunctionSignature::aggregate("Sum", "SUM", SqlType::Double),
            FunctionSignature::aggregate("Avg", "AVG", SqlType::Double),
            FunctionSignature::aggregate("Count", "COUNT", SqlType::Bigint),
            FunctionSignature::aggregate("Min", "MIN", SqlType::Any).stream_only(),
            FunctionSignature::aggregate("Max", "MAX", SqlType::Any).stream_only(),
            FunctionSignature::aggregate("TopK", "TOPK", SqlType::Array),
            FunctionSignature::aggregate("Histogram", "HISTOGRAM", SqlType::Map),
            FunctionSignature::aggregate("LatestByOffset", "LATEST_BY_OFFSET", SqlType::Unknown),
            FunctionSignature::aggregate("EarliestByOffset", "EARLIEST_BY_OFFSET", SqlType::Unknown),
            FunctionSignature::aggregate("CollectList", "COLLECT_LIST", SqlType::Unknown),
            FunctionSignature::aggregate("CollectSet", "COLLECT_SET", SqlType::Unknown),
            FunctionSignature::aggregate("CountDistinct", "COUNT_DISTINCT", SqlType::Unknown),
        ] {
            self.register(sig);
        }
    }

    pub fn register(&mut self, sig: FunctionSignature) {
        self.functions.insert(normalize(&sig.name), sig);
    }

    pub fn lookup(&self, name: &str) -> Result<&FunctionSignature, RegistryError> {
        self.functions
            .get(&normalize(name))
            .ok_or_else(|| RegistryError::FunctionNotFound(name.to_string()))
    }

    pub fn is_aggregate(&self, name: &str) -> bool {
        self.lookup(name).is_ok_and(|sig| sig.is_aggregate)
    }

    pub fn is_stream_only(&self, name: &str) -> bool {
        self.lookup(name).is_ok_and(|sig| sig.stream_only)
    }

    /// Result-type hint; `UNKNOWN` for anything not registered
    pub fn infer_result_type(&self, name: &str) -> SqlType {
        self.lookup(name)
            .map(|sig| sig.return_type)
            .unwrap_or(SqlType::Unknown)
    }

    /// Target call over the implicit current row-set, e.g. `SUM(*)`.
    ///
    /// Names the registry does not know fall back to `<NAME>(UNKNOWN)` without
    /// checking that the target engine defines such a function.
    pub fn render_call(&self, name: &str) -> String {
        match self.lookup(name) {
            Ok(sig) => format!("{}(*)", sig.target),
            Err(_) => format!("{}(UNKNOWN)", name.to_uppercase()),
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// See [`FunctionRegistry::infer_result_type`]
pub fn infer_aggregate_result_type(name: &str) -> SqlType {
    FunctionRegistry::builtin().infer_result_type(name)
}

/// See [`FunctionRegistry::render_call`]
pub fn render_aggregate_call(name: &str) -> String {
    FunctionRegistry::builtin().render_call(name)
}

fn normalize(name: &str) -> String {
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = FunctionRegistry::builtin();

        let sig = registry.lookup("LatestByOffset").unwrap();
        assert_eq!(sig.target, "LATEST_BY_OFFSET");
        assert!(sig.is_aggregate);

        assert!(registry.lookup("LATESTBYOFFSET").is_ok());
        assert!(registry.lookup("latest_by_offset").is_err());
        assert!(matches!(
            registry.lookup("Median"),
            Err(RegistryError::FunctionNotFound(name)) if name == "Median"
        ));
    }

    #[test]
    fn test_render_aggregate_call() {
        assert_eq!(render_aggregate_call("Sum"), "SUM(*)");
        assert_eq!(render_aggregate_call("Count"), "COUNT(*)");
        assert_eq!(render_aggregate_call("LatestByOffset"), "LATEST_BY_OFFSET(*)");
        assert_eq!(render_aggregate_call("EarliestByOffset"), "EARLIEST_BY_OFFSET(*)");
        assert_eq!(render_aggregate_call("Foo"), "FOO(UNKNOWN)");
    }

    #[test]
    fn test_near_miss_names_use_fallback() {
        assert_eq!(render_aggregate_call("Sum_"), "SUM_(UNKNOWN)");
        assert_eq!(render_aggregate_call("latest_by_offset"), "LATEST_BY_OFFSET(UNKNOWN)");
        assert_eq!(infer_aggregate_result_type("_sum"), SqlType::Unknown);
        assert!(!FunctionRegistry::builtin().is_aggregate("count_"));
    }

    #[test]
    fn test_infer_result_type_is_case_insensitive() {
        assert_eq!(infer_aggregate_result_type("sum"), SqlType::Double);
        assert_eq!(infer_aggregate_result_type("AVG"), SqlType::Double);
        assert_eq!(infer_aggregate_result_type("Count"), SqlType::Bigint);
        assert_eq!(infer_aggregate_result_type("min"), SqlType::Any);
        assert_eq!(infer_aggregate_result_type("MAX"), SqlType::Any);
        assert_eq!(infer_aggregate_result_type("TopK"), SqlType::Array);
        assert_eq!(infer_aggregate_result_type("histogram"), SqlType::Map);
        assert_eq!(infer_aggregate_result_type("whatever"), SqlType::Unknown);
        assert_eq!(infer_aggregate_result_type("LatestByOffset"), SqlType::Unknown);
    }

    #[test]
    fn test_stream_only_classification() {
        let registry = FunctionRegistry::builtin();
        assert!(registry.is_stream_only("Min"));
        assert!(registry.is_stream_only("max"));
        assert!(!registry.is_stream_only("Sum"));
        assert!(!registry.is_stream_only("Foo"));
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = FunctionRegistry::new();
        registry.register(FunctionSignature::aggregate("Stddev", "STDDEV_SAMPLE", SqlType::Double));

        assert_eq!(registry.render_call("stddev"), "STDDEV_SAMPLE(*)");
        // The shared built-in table is untouched
        assert_eq!(FunctionRegistry::builtin().render_call("stddev"), "STDDEV(UNKNOWN)");
    }
}
