//! Query analysis: validates an input `SELECT` against the accepted
//! aggregation subset and extracts the pieces the generator needs.
//!
//! Accepted shape: `SELECT <bare cols + SUM/COUNT(*)> FROM <one table>
//! [WHERE …] GROUP BY <bare cols>`. Everything else is rejected with a
//! reason.

use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, ObjectName, SelectItem,
    SetExpr, Statement, TableFactor,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use crate::error::{Error, Result};
use crate::models::{Aggregate, AnalyzedQuery};

#[cfg(test)]
mod tests;

/// Analyze a raw SQL string into an [`AnalyzedQuery`].
///
/// The WHERE predicate is kept as text and is not semantically validated;
/// the generator later rewrites its column references for trigger bodies.
pub fn analyze(sql: &str) -> Result<AnalyzedQuery> {
    let normalized = normalize(sql);
    let mut statements = Parser::parse_sql(&MySqlDialect {}, &normalized)
        .map_err(|e| Error::invalid_query(format!("parse error: {e}")))?;

    if statements.len() != 1 {
        return Err(Error::invalid_query(format!(
            "expected exactly one statement, found {}",
            statements.len()
        )));
    }

    let query = match statements.pop() {
        Some(Statement::Query(query)) => query,
        _ => return Err(Error::invalid_query("only SELECT statements are supported")),
    };

    if query.with.is_some() {
        return Err(Error::invalid_query("WITH clauses are not supported"));
    }
    if query.order_by.is_some() {
        return Err(Error::invalid_query("ORDER BY is not supported"));
    }
    if query.limit_clause.is_some() {
        return Err(Error::invalid_query("LIMIT is not supported"));
    }

    let select = match *query.body {
        SetExpr::Select(select) => *select,
        _ => return Err(Error::invalid_query("set operations are not supported")),
    };

    if select.distinct.is_some() {
        return Err(Error::invalid_query("DISTINCT is not supported"));
    }
    if select.having.is_some() {
        return Err(Error::invalid_query("HAVING is not supported"));
    }
    if select.from.len() != 1 {
        return Err(Error::invalid_query("exactly one FROM table is required"));
    }

    let from = &select.from[0];
    if !from.joins.is_empty() {
        return Err(Error::invalid_query("JOINs are not supported"));
    }
    let base_table = match &from.relation {
        TableFactor::Table { name, .. } => object_name_tail(name),
        _ => {
            return Err(Error::invalid_query(
                "FROM must reference a base table, not a subquery",
            ))
        }
    };

    let group_by_cols = extract_group_by(&select.group_by)?;

    let mut aggregates = Vec::new();
    for item in &select.projection {
        match item {
            SelectItem::UnnamedExpr(expr) => {
                classify_item(expr, None, &group_by_cols, &mut aggregates)?;
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                classify_item(expr, Some(alias.value.clone()), &group_by_cols, &mut aggregates)?;
            }
            _ => {
                return Err(Error::invalid_query(
                    "wildcard select items are not supported",
                ))
            }
        }
    }

    if aggregates.is_empty() {
        return Err(Error::invalid_query(
            "at least one SUM or COUNT(*) aggregate is required",
        ));
    }

    // Key columns and aggregate aliases all become physical summary
    // columns, so the combined set must be free of duplicates.
    let mut seen: Vec<&String> = Vec::new();
    for name in group_by_cols
        .iter()
        .chain(aggregates.iter().map(|agg| &agg.alias))
    {
        if seen.contains(&name) {
            return Err(Error::invalid_query(format!(
                "duplicate output column `{name}`"
            )));
        }
        seen.push(name);
    }

    let where_text = select.selection.as_ref().map(|expr| expr.to_string());

    Ok(AnalyzedQuery {
        base_table,
        where_text,
        group_by_cols,
        aggregates,
    })
}

/// Trim trailing whitespace/semicolons and re-append a single terminator.
fn normalize(sql: &str) -> String {
    let mut trimmed = sql.trim();
    while trimmed.ends_with(';') {
        trimmed = trimmed[..trimmed.len() - 1].trim_end();
    }
    format!("{trimmed};")
}

/// Last segment of a possibly-qualified object name, unquoted.
fn object_name_tail(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|part| strip_quotes(&part.to_string()))
        .unwrap_or_default()
}

/// Strip surrounding back-ticks / double-quotes from an identifier so it
/// matches the bare names introspection returns.
fn strip_quotes(s: &str) -> String {
    s.trim_matches('`').trim_matches('"').to_string()
}

/// A bare (optionally table-qualified) column reference, qualifier dropped.
fn bare_column(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|ident| ident.value.clone()),
        _ => None,
    }
}

fn extract_group_by(group_by: &GroupByExpr) -> Result<Vec<String>> {
    let exprs = match group_by {
        GroupByExpr::Expressions(exprs, modifiers) => {
            if !modifiers.is_empty() {
                return Err(Error::invalid_query("GROUP BY modifiers are not supported"));
            }
            exprs
        }
        GroupByExpr::All(_) => {
            return Err(Error::invalid_query("GROUP BY ALL is not supported"));
        }
    };

    let mut cols = Vec::with_capacity(exprs.len());
    for expr in exprs {
        let col = bare_column(expr).ok_or_else(|| {
            Error::invalid_query(format!("GROUP BY items must be bare columns, got `{expr}`"))
        })?;
        if cols.contains(&col) {
            return Err(Error::invalid_query(format!(
                "duplicate GROUP BY column `{col}`"
            )));
        }
        cols.push(col);
    }
    Ok(cols)
}

fn classify_item(
    expr: &Expr,
    alias: Option<String>,
    group_by_cols: &[String],
    aggregates: &mut Vec<Aggregate>,
) -> Result<()> {
    if let Some(col) = bare_column(expr) {
        if !group_by_cols.contains(&col) {
            return Err(Error::invalid_query(format!(
                "select column `{col}` must appear in GROUP BY"
            )));
        }
        return Ok(());
    }

    if let Expr::Function(func) = expr {
        aggregates.push(parse_aggregate(func, alias)?);
        return Ok(());
    }

    Err(Error::invalid_query(format!(
        "select items must be bare columns or SUM/COUNT(*) aggregates, got `{expr}`"
    )))
}

fn parse_aggregate(func: &sqlparser::ast::Function, alias: Option<String>) -> Result<Aggregate> {
    let name = object_name_tail(&func.name).to_uppercase();

    if func.over.is_some() {
        return Err(Error::invalid_query("window functions are not supported"));
    }

    let list = match &func.args {
        FunctionArguments::List(list) => list,
        _ => {
            return Err(Error::invalid_query(format!(
                "unsupported aggregate `{name}`"
            )))
        }
    };
    if list.duplicate_treatment.is_some() {
        return Err(Error::invalid_query("DISTINCT aggregates are not supported"));
    }
    if !list.clauses.is_empty() {
        return Err(Error::invalid_query(
            "aggregate argument clauses are not supported",
        ));
    }
    if list.args.len() != 1 {
        return Err(Error::invalid_query(format!(
            "`{name}` takes exactly one argument"
        )));
    }

    match name.as_str() {
        "SUM" => {
            let col = match &list.args[0] {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(expr)) => bare_column(expr),
                _ => None,
            }
            .ok_or_else(|| Error::invalid_query("SUM argument must be a bare column"))?;
            let alias = alias.unwrap_or_else(|| format!("sum_{col}"));
            Ok(Aggregate::sum(col, alias))
        }
        "COUNT" => {
            match &list.args[0] {
                FunctionArg::Unnamed(FunctionArgExpr::Wildcard) => {}
                _ => return Err(Error::invalid_query("only COUNT(*) is supported")),
            }
            let alias = alias.unwrap_or_else(|| "row_count".to_string());
            Ok(Aggregate::count(alias))
        }
        other => Err(Error::invalid_query(format!(
            "unsupported aggregate `{other}`"
        ))),
    }
}
