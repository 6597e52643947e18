use super::*;
use crate::models::AggregateFunc;

fn must_analyze(sql: &str) -> AnalyzedQuery {
    analyze(sql).unwrap_or_else(|e| panic!("expected `{sql}` to be accepted: {e}"))
}

fn must_reject(sql: &str) -> String {
    match analyze(sql) {
        Err(Error::InvalidQuery(reason)) => reason,
        Err(other) => panic!("expected InvalidQuery for `{sql}`, got {other}"),
        Ok(_) => panic!("expected `{sql}` to be rejected"),
    }
}

#[test]
fn test_grouped_sum_query() {
    let q = must_analyze(
        "SELECT user_id, SUM(cost) AS total_cost FROM transactions GROUP BY user_id",
    );
    assert_eq!(q.base_table, "transactions");
    assert_eq!(q.group_by_cols, vec!["user_id"]);
    assert_eq!(q.aggregates.len(), 1);
    assert_eq!(q.aggregates[0].func, AggregateFunc::Sum);
    assert_eq!(q.aggregates[0].column, "cost");
    assert_eq!(q.aggregates[0].alias, "total_cost");
    assert!(q.where_text.is_none());
}

#[test]
fn test_ungrouped_count_query() {
    let q = must_analyze("SELECT COUNT(*) AS row_count FROM transactions");
    assert_eq!(q.base_table, "transactions");
    assert!(q.group_by_cols.is_empty());
    assert_eq!(q.aggregates, vec![Aggregate::count("row_count")]);
}

#[test]
fn test_default_aliases() {
    let q = must_analyze("SELECT region, SUM(amount), COUNT(*) FROM orders GROUP BY region");
    assert_eq!(q.aggregates[0].alias, "sum_amount");
    assert_eq!(q.aggregates[1].alias, "row_count");
}

#[test]
fn test_where_text_is_extracted() {
    let q = must_analyze(
        "SELECT user_id, SUM(cost) FROM transactions WHERE status = 'active' AND cost > 10 GROUP BY user_id",
    );
    assert_eq!(
        q.where_text.as_deref(),
        Some("status = 'active' AND cost > 10")
    );
}

#[test]
fn test_qualifiers_and_backticks_are_stripped() {
    let q = must_analyze(
        "SELECT t.user_id, SUM(`t`.`cost`) AS c FROM `transactions` t GROUP BY t.user_id",
    );
    assert_eq!(q.base_table, "transactions");
    assert_eq!(q.group_by_cols, vec!["user_id"]);
    assert_eq!(q.aggregates[0].column, "cost");
}

#[test]
fn test_trailing_semicolons_and_whitespace() {
    let q = must_analyze("  SELECT COUNT(*) FROM t ;;  ");
    assert_eq!(q.base_table, "t");
}

#[test]
fn test_multiple_aggregates() {
    let q = must_analyze(
        "SELECT a, b, SUM(x) AS sx, SUM(y) AS sy, COUNT(*) AS n FROM t GROUP BY a, b",
    );
    assert_eq!(q.group_by_cols, vec!["a", "b"]);
    assert_eq!(q.aggregates.len(), 3);
}

#[test]
fn test_rejects_non_select() {
    must_reject("INSERT INTO t (a) VALUES (1)");
    must_reject("UPDATE t SET a = 1");
}

#[test]
fn test_rejects_multiple_statements() {
    let reason = must_reject("SELECT COUNT(*) FROM t; SELECT COUNT(*) FROM u");
    assert!(reason.contains("one statement"), "reason: {reason}");
}

#[test]
fn test_rejects_join() {
    must_reject("SELECT t.a, COUNT(*) FROM t JOIN u ON t.id = u.id GROUP BY t.a");
}

#[test]
fn test_rejects_subquery_from() {
    must_reject("SELECT a, COUNT(*) FROM (SELECT * FROM t) s GROUP BY a");
}

#[test]
fn test_rejects_column_missing_from_group_by() {
    let reason = must_reject("SELECT a, b, COUNT(*) FROM t GROUP BY a");
    assert!(reason.contains('b'), "reason: {reason}");
}

#[test]
fn test_rejects_unsupported_aggregates() {
    must_reject("SELECT a, AVG(x) FROM t GROUP BY a");
    must_reject("SELECT a, MAX(x) FROM t GROUP BY a");
    must_reject("SELECT a, COUNT(x) FROM t GROUP BY a");
    must_reject("SELECT a, COUNT(DISTINCT x) FROM t GROUP BY a");
    must_reject("SELECT a, SUM(x + y) FROM t GROUP BY a");
    must_reject("SELECT a, SUM(ABS(x)) FROM t GROUP BY a");
}

#[test]
fn test_rejects_group_by_expressions() {
    must_reject("SELECT COUNT(*) FROM t GROUP BY DATE(created)");
    must_reject("SELECT COUNT(*) FROM t GROUP BY 1");
}

#[test]
fn test_rejects_missing_aggregate() {
    let reason = must_reject("SELECT a FROM t GROUP BY a");
    assert!(reason.contains("aggregate"), "reason: {reason}");
}

#[test]
fn test_rejects_outer_clauses() {
    must_reject("SELECT a, COUNT(*) FROM t GROUP BY a HAVING COUNT(*) > 1");
    must_reject("SELECT a, COUNT(*) FROM t GROUP BY a ORDER BY a");
    must_reject("SELECT a, COUNT(*) FROM t GROUP BY a LIMIT 10");
    must_reject("SELECT DISTINCT a, COUNT(*) FROM t GROUP BY a");
    must_reject("WITH c AS (SELECT * FROM t) SELECT a, COUNT(*) FROM c GROUP BY a");
}

#[test]
fn test_rejects_wildcard_projection() {
    must_reject("SELECT *, COUNT(*) FROM t GROUP BY a");
}

#[test]
fn test_rejects_duplicate_output_columns() {
    must_reject("SELECT a, SUM(x) AS a FROM t GROUP BY a");
    must_reject("SELECT a, SUM(x) AS s, SUM(y) AS s FROM t GROUP BY a");
    must_reject("SELECT a, COUNT(*) FROM t GROUP BY a, a");
}

#[test]
fn test_rejects_window_function() {
    must_reject("SELECT a, SUM(x) OVER () FROM t GROUP BY a");
}

#[test]
fn test_rejects_empty_input() {
    must_reject("");
    must_reject("   ;  ");
}
