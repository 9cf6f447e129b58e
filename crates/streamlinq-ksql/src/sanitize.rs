//! Identifier sanitization

/// Turns a model-level name into a legal, non-reserved target identifier
pub trait IdentifierSanitizer: Send + Sync {
    fn sanitize(&self, name: &str) -> String;
}

impl<F> IdentifierSanitizer for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn sanitize(&self, name: &str) -> String {
        self(name)
    }
}

const RESERVED: &[&str] = &[
    "ADVANCE", "ALL", "AND", "AS", "BETWEEN", "BY", "CASE", "CAST", "CHANGES", "CREATE", "DROP",
    "ELSE", "EMIT", "END", "EXISTS", "FALSE", "FINAL", "FROM", "GAP", "GRACE", "GROUP", "HAVING",
    "HOPPING", "IF", "IN", "INSERT", "INTO", "IS", "JOIN", "KEY", "LIKE", "LIMIT", "NOT", "NULL",
    "ON", "OR", "PARTITION", "PERIOD", "PRIMARY", "SELECT", "SESSION", "SIZE", "STREAM", "TABLE",
    "THEN", "TRUE", "TUMBLING", "VALUES", "WHEN", "WHERE", "WINDOW", "WITH", "WITHIN",
];

/// Uppercases, folds illegal characters to `_`, and back-quotes reserved words
/// and names that start with a digit
#[derive(Debug, Clone, Copy, Default)]
pub struct KsqlIdentifierSanitizer;

impl IdentifierSanitizer for KsqlIdentifierSanitizer {
    fn sanitize(&self, name: &str) -> String {
        let folded: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c.to_ascii_uppercase() } else { '_' })
            .collect();

        if folded.is_empty() {
            return "_".to_string();
        }

        let leading_digit = folded.starts_with(|c: char| c.is_ascii_digit());
        if leading_digit || RESERVED.contains(&folded.as_str()) {
            format!("`{}`", folded)
        } else {
            folded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ksql_sanitizer() {
        let s = KsqlIdentifierSanitizer;
        assert_eq!(s.sanitize("ProductId"), "PRODUCTID");
        assert_eq!(s.sanitize("order-total"), "ORDER_TOTAL");
        assert_eq!(s.sanitize("Größe"), "GR__E");
        assert_eq!(s.sanitize("Window"), "`WINDOW`");
        assert_eq!(s.sanitize("1st"), "`1ST`");
        assert_eq!(s.sanitize(""), "_");
    }

    #[test]
    fn test_closure_sanitizer() {
        let lower = |name: &str| name.to_lowercase();
        assert_eq!(lower.sanitize("ProductId"), "productid");
    }
}
