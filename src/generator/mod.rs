//! DDL synthesis: turns an [`AnalyzedQuery`] plus probed schema facts into
//! the artifacts bundle (summary-table DDL, the three delta triggers, and
//! the backfill statements).

pub mod predicate;
mod tables;
mod triggers;


use crate::defaults::{
    quote_ident, sanitize_identifier, snake_case, SUMMARY_SUFFIX, SYNTHETIC_KEY_COLUMN,
    TRIGGER_SUFFIX, UPDATED_AT_COLUMN,
};
use crate::error::Result;
use crate::introspection::TableFacts;
use crate::models::{Aggregate, AggregateFunc, AnalyzedQuery, Artifacts, BackfillContext};

pub use tables::summary_ddl;
pub use triggers::build_triggers;

/// Synthesize the full artifacts bundle for an analyzed query.
///
/// Pure: schema facts come in via `facts`, no I/O happens here.
pub fn synthesize(
    query: &AnalyzedQuery,
    facts: &TableFacts,
    name_override: Option<&str>,
) -> Result<Artifacts> {
    let summary_name = match name_override {
        Some(name) => name.to_string(),
        None => summary_table_name(&query.base_table, &query.group_by_cols),
    };

    let summary_ddl = tables::summary_ddl(query, facts, &summary_name)?;
    let triggers = triggers::build_triggers(query, &summary_name)?;

    let backfill = BackfillContext {
        base_table: query.base_table.clone(),
        summary_name: summary_name.clone(),
        group_by_cols: query.group_by_cols.clone(),
        aggregates: query.aggregates.clone(),
        where_text: query.where_text.clone(),
    };

    Ok(Artifacts {
        summary_name,
        summary_ddl,
        triggers,
        backfill,
    })
}

/// Derived summary-table name:
/// `snake_case(base + "_" + group_cols.join("_") + "_summary")`, with the
/// group segment dropped when there is no grouping.
pub fn summary_table_name(base: &str, group_by_cols: &[String]) -> String {
    let mut parts = Vec::with_capacity(group_by_cols.len() + 2);
    parts.push(base.to_string());
    parts.extend(group_by_cols.iter().cloned());
    parts.push(SUMMARY_SUFFIX.to_string());
    snake_case(&parts.join("_"))
}

/// Contractual trigger name: `<base>_after_<event>_lightning`.
pub fn trigger_name(base: &str, event: &str) -> String {
    format!(
        "{}_after_{}_{}",
        sanitize_identifier(base),
        event,
        TRIGGER_SUFFIX
    )
}

/// All three trigger names for a base table, in installation order.
pub fn trigger_names(base: &str) -> [String; 3] {
    ["insert", "update", "delete"].map(|event| trigger_name(base, event))
}

/// The chunked backfill statement, with `?` placeholders for the PK range
/// bounds and the snapshot timestamp:
///
/// `INSERT INTO summary (keys…, aggs…) SELECT keys…, aggregates… FROM base
/// WHERE [<query WHERE> AND] pk BETWEEN ? AND ? AND updated_at <= ?
/// [GROUP BY keys…] ON DUPLICATE KEY UPDATE agg = agg + VALUES(agg)`
///
/// Additive upserts make this commutative across chunks, so chunks may run
/// concurrently and a re-run only ever adds each chunk's own contribution.
pub fn chunk_insert_sql(ctx: &BackfillContext, pk_col: &str) -> String {
    let mut insert_cols = Vec::new();
    let mut select_items = Vec::new();

    if ctx.group_by_cols.is_empty() {
        insert_cols.push(quote_ident(SYNTHETIC_KEY_COLUMN));
        select_items.push("1".to_string());
    } else {
        for col in &ctx.group_by_cols {
            insert_cols.push(quote_ident(col));
            select_items.push(quote_ident(col));
        }
    }
    for agg in &ctx.aggregates {
        insert_cols.push(quote_ident(&agg.alias));
        select_items.push(aggregate_expr(agg));
    }

    let mut conditions = Vec::new();
    if let Some(where_text) = &ctx.where_text {
        conditions.push(format!("({where_text})"));
    }
    conditions.push(format!("{} BETWEEN ? AND ?", quote_ident(pk_col)));
    conditions.push(format!("{} <= ?", quote_ident(UPDATED_AT_COLUMN)));

    let mut sql = format!(
        "INSERT INTO {} ({})\nSELECT {}\nFROM {}\nWHERE {}",
        quote_ident(&ctx.summary_name),
        insert_cols.join(", "),
        select_items.join(", "),
        quote_ident(&ctx.base_table),
        conditions.join(" AND "),
    );
    if !ctx.group_by_cols.is_empty() {
        let keys: Vec<String> = ctx.group_by_cols.iter().map(|c| quote_ident(c)).collect();
        sql.push_str(&format!("\nGROUP BY {}", keys.join(", ")));
    }
    sql.push_str(&format!(
        "\nON DUPLICATE KEY UPDATE {}",
        upsert_assignments(&ctx.aggregates)
    ));
    sql
}

/// Canonical aggregation SELECT for the analyzed query, shaped like the
/// summary table. Collaborators compare its result set against
/// `SELECT * FROM summary` to observe convergence.
pub fn verification_select(query: &AnalyzedQuery) -> String {
    let mut items = Vec::new();
    if query.group_by_cols.is_empty() {
        items.push(format!("1 AS {}", quote_ident(SYNTHETIC_KEY_COLUMN)));
    } else {
        for col in &query.group_by_cols {
            items.push(quote_ident(col));
        }
    }
    for agg in &query.aggregates {
        items.push(format!("{} AS {}", aggregate_expr(agg), quote_ident(&agg.alias)));
    }

    let mut sql = format!(
        "SELECT {}\nFROM {}",
        items.join(", "),
        quote_ident(&query.base_table)
    );
    if let Some(where_text) = &query.where_text {
        sql.push_str(&format!("\nWHERE {where_text}"));
    }
    if !query.group_by_cols.is_empty() {
        let keys: Vec<String> = query.group_by_cols.iter().map(|c| quote_ident(c)).collect();
        sql.push_str(&format!("\nGROUP BY {}", keys.join(", ")));
    }
    sql
}

/// `SUM` aggregates over all-`NULL` groups come back `NULL`; coalesce so
/// the summary's `NOT NULL DEFAULT 0` columns always receive a number.
fn aggregate_expr(agg: &Aggregate) -> String {
    match agg.func {
        AggregateFunc::Sum => format!("COALESCE(SUM({}), 0)", quote_ident(&agg.column)),
        AggregateFunc::Count => "COUNT(*)".to_string(),
    }
}

/// `alias = alias + VALUES(alias)` for every aggregate column.
pub(crate) fn upsert_assignments(aggregates: &[Aggregate]) -> String {
    aggregates
        .iter()
        .map(|agg| {
            let col = quote_ident(&agg.alias);
            format!("{col} = {col} + VALUES({col})")
        })
        .collect::<Vec<_>>()
        .join(", ")
}
