use crate::defaults::{quote_ident, SUMMARY_TABLE_OPTIONS, SYNTHETIC_KEY_COLUMN};
use crate::error::Result;
use crate::introspection::TableFacts;
use crate::models::{AggregateFunc, AnalyzedQuery};

/// Generate the summary-table DDL.
///
/// Key columns copy their SQL type (and nullability) from the base table;
/// `SUM` columns copy the source column's type, `COUNT` columns are
/// `BIGINT UNSIGNED`. All aggregate columns default to zero so trigger
/// deltas can upsert rows that backfill has not reached yet. With no
/// grouping a synthetic constant key keeps the summary at exactly one row.
pub fn summary_ddl(
    query: &AnalyzedQuery,
    facts: &TableFacts,
    summary_name: &str,
) -> Result<String> {
    let mut col_defs = Vec::new();
    let mut key_cols = Vec::new();

    if query.group_by_cols.is_empty() {
        col_defs.push(format!(
            "{} TINYINT UNSIGNED NOT NULL DEFAULT 1",
            quote_ident(SYNTHETIC_KEY_COLUMN)
        ));
        key_cols.push(quote_ident(SYNTHETIC_KEY_COLUMN));
    } else {
        for col in &query.group_by_cols {
            let col_facts = facts.column(col)?;
            let nullability = if col_facts.is_nullable {
                "NULL"
            } else {
                "NOT NULL"
            };
            col_defs.push(format!(
                "{} {} {}",
                quote_ident(col),
                col_facts.column_type,
                nullability
            ));
            key_cols.push(quote_ident(col));
        }
    }

    for agg in &query.aggregates {
        let def = match agg.func {
            AggregateFunc::Sum => {
                let source = facts.column(&agg.column)?;
                format!(
                    "{} {} NOT NULL DEFAULT 0",
                    quote_ident(&agg.alias),
                    source.column_type
                )
            }
            AggregateFunc::Count => format!(
                "{} BIGINT UNSIGNED NOT NULL DEFAULT 0",
                quote_ident(&agg.alias)
            ),
        };
        col_defs.push(def);
    }

    col_defs.push(format!("PRIMARY KEY ({})", key_cols.join(", ")));

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n) {};",
        quote_ident(summary_name),
        col_defs.join(",\n  "),
        SUMMARY_TABLE_OPTIONS
    ))
}
