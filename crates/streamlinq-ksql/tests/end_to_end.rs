use streamlinq_ast::{analyze, parse, AnalyzeOptions, BinaryOp, Expr, Value};
use streamlinq_ir::{
    EntityKind, EntitySchema, SemanticType, TranslationError, WindowDuration,
};
use streamlinq_ksql::{StatementCache, Translator};

fn sale_schema() -> EntitySchema {
    EntitySchema::builder("Sale", "sales")
        .key_column("Id", SemanticType::Int32)
        .column("ProductId", SemanticType::Int32)
        .column("OccurredAt", SemanticType::Timestamp)
        .column("Amount", SemanticType::Decimal)
        .build()
}

fn windowed_total() -> Expr {
    Expr::source("Sale")
        .call(
            "Window",
            vec![
                Expr::function(
                    "Tumbling",
                    vec![Expr::constant(Value::Duration(WindowDuration::minutes(1)))],
                ),
                Expr::constant(Value::Bool(true)),
            ],
        )
        .call("GroupBy", vec![Expr::lambda("s", Expr::param("s").member("ProductId"))])
        .call(
            "Select",
            vec![Expr::lambda(
                "g",
                Expr::new_object(vec![
                    ("ProductId", Expr::param("g").member("Key")),
                    (
                        "Total",
                        Expr::param("g").call(
                            "Sum",
                            vec![Expr::lambda("x", Expr::param("x").member("Amount"))],
                        ),
                    ),
                ]),
            )],
        )
}

fn id_lookup(with_key: bool) -> Expr {
    let predicate = if with_key {
        Expr::binary(
            BinaryOp::Equal,
            Expr::param("s").member("Id"),
            Expr::constant(Value::Int(123)),
        )
    } else {
        Expr::binary(
            BinaryOp::GreaterThan,
            Expr::param("s").member("Amount"),
            Expr::constant(Value::Int(100)),
        )
    };
    Expr::source("Sale").call("Where", vec![Expr::lambda("s", predicate)])
}

/// Positions of each fragment; panics when one is missing
fn positions(sql: &str, fragments: &[&str]) -> Vec<usize> {
    fragments
        .iter()
        .map(|f| sql.find(f).unwrap_or_else(|| panic!("'{}' not found in {}", f, sql)))
        .collect()
}

#[test]
fn test_windowed_finalized_total_into_table() {
    let plan = analyze(
        &sale_schema(),
        &windowed_total(),
        AnalyzeOptions::default().with_sink(EntityKind::Table),
    )
    .unwrap();
    let sql = Translator::default().statement(&plan, "sales").unwrap();

    let found = positions(
        &sql,
        &[
            "SELECT",
            "SUM(*)",
            "FROM sales",
            "WINDOW TUMBLING (SIZE 1 MINUTES)",
            "GROUP BY PRODUCTID",
            "EMIT FINAL",
        ],
    );
    assert!(found.windows(2).all(|w| w[0] < w[1]), "clauses out of order: {}", sql);
    assert_eq!(
        sql,
        "SELECT PRODUCTID, SUM(*) AS TOTAL FROM sales WINDOW TUMBLING (SIZE 1 MINUTES) GROUP BY PRODUCTID EMIT FINAL;"
    );
}

#[test]
fn test_pull_query_by_key() {
    let plan = analyze(&sale_schema(), &id_lookup(true), AnalyzeOptions::pull()).unwrap();
    assert!(plan.is_pull_query());

    let sql = Translator::default().statement(&plan, "sales").unwrap();
    assert_eq!(sql, "SELECT * FROM sales WHERE ID = 123;");
    assert!(!sql.contains("EMIT"));
}

#[test]
fn test_pull_query_without_key_equality() {
    let plan = analyze(&sale_schema(), &id_lookup(false), AnalyzeOptions::pull()).unwrap();
    let err = Translator::default().statement(&plan, "sales").unwrap_err();
    assert!(matches!(err, TranslationError::PullQueryMissingKey(_)));

    // The same predicate is fine as a push query
    let plan = analyze(&sale_schema(), &id_lookup(false), AnalyzeOptions::default()).unwrap();
    assert_eq!(
        Translator::default().statement(&plan, "sales").unwrap(),
        "SELECT * FROM sales WHERE AMOUNT > 100 EMIT CHANGES;"
    );
}

#[test]
fn test_rendering_is_deterministic() {
    let translator = Translator::default();
    let a = analyze(&sale_schema(), &windowed_total(), AnalyzeOptions::default()).unwrap();
    let b = analyze(&sale_schema(), &windowed_total(), AnalyzeOptions::default()).unwrap();

    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(
        translator.statement(&a, "sales").unwrap(),
        translator.statement(&b, "sales").unwrap()
    );

    let cache = StatementCache::new();
    cache.get_or_render(translator.generator(), &a, "sales").unwrap();
    assert!(cache.is_registered(&b, "sales"));
}

#[test]
fn test_text_query_to_statement() {
    let query = parse(
        "from Sale s
         | where s.Amount >= 10.5m and s.OccurredAt > timestamp '2024-01-15T10:30:00Z'
         | window hopping(5m, 1m) grace 30s
         | group by s.ProductId
         | select { ProductId = key, Orders = count(), Latest = latest_by_offset(s.Amount) }
         | take 5",
    )
    .unwrap();
    let plan = analyze(&sale_schema(), &query, AnalyzeOptions::default()).unwrap();
    let sql = Translator::default().statement(&plan, "sales").unwrap();

    assert_eq!(
        sql,
        "SELECT PRODUCTID, COUNT(*) AS ORDERS, LATEST_BY_OFFSET(*) AS LATEST FROM sales \
         WHERE AMOUNT >= 10.5 AND OCCURREDAT > '2024-01-15T10:30:00.000' \
         WINDOW HOPPING (SIZE 5 MINUTES, ADVANCE BY 1 MINUTES, GRACE PERIOD 30 SECONDS) \
         GROUP BY PRODUCTID EMIT CHANGES LIMIT 5;"
    );
}

#[test]
fn test_unrecognized_aggregate_uses_fallback() {
    let query = parse("from Sale | group by ProductId | select { ProductId = key, M = median(Amount) }").unwrap();
    let plan = analyze(&sale_schema(), &query, AnalyzeOptions::default()).unwrap();
    let sql = Translator::default().statement(&plan, "sales").unwrap();
    assert!(sql.contains("MEDIAN(UNKNOWN) AS M"), "{}", sql);
}

#[test]
fn test_persistent_query() {
    let plan = analyze(&sale_schema(), &windowed_total(), AnalyzeOptions::default()).unwrap();
    let sql = Translator::default()
        .generator()
        .render_create_as(&plan, "sales", "ProductTotals", "product-totals")
        .unwrap();
    assert!(sql.starts_with("CREATE TABLE PRODUCTTOTALS WITH (KAFKA_TOPIC='product-totals', VALUE_FORMAT='AVRO') AS SELECT"));
    assert!(sql.ends_with("EMIT FINAL;"));
}

#[test]
fn test_double_negation_from_text_keeps_statement_intact() {
    let query = parse("from Sale s | where - -s.Amount > 0").unwrap();
    let plan = analyze(&sale_schema(), &query, AnalyzeOptions::default()).unwrap();
    let sql = Translator::default().statement(&plan, "sales").unwrap();

    assert!(!sql.contains("--"), "{}", sql);
    assert_eq!(sql, "SELECT * FROM sales WHERE -(-AMOUNT) > 0 EMIT CHANGES;");
}
