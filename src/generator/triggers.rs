use super::predicate::{self, RowImage};
use super::{trigger_name, upsert_assignments};
use crate::defaults::{quote_ident, SYNTHETIC_KEY_COLUMN};
use crate::error::Result;
use crate::models::{Aggregate, AggregateFunc, AnalyzedQuery, TriggerSet};

/// Build the three `AFTER` row-level triggers for an analyzed query.
///
/// Each trigger upserts signed deltas into the summary: `+new` image on
/// insert, `-old` image on delete, and both in sequence on update. The
/// query's WHERE predicate guards every upsert, rewritten against the
/// matching row image, so rows outside the query never contribute.
pub fn build_triggers(query: &AnalyzedQuery, summary_name: &str) -> Result<TriggerSet> {
    let insert = build_trigger(
        query,
        summary_name,
        "insert",
        &[RowImage::New],
    )?;
    // Negative old-image delta first: a key moving between groups passes
    // through a clean zero instead of a transient double count.
    let update = build_trigger(
        query,
        summary_name,
        "update",
        &[RowImage::Old, RowImage::New],
    )?;
    let delete = build_trigger(
        query,
        summary_name,
        "delete",
        &[RowImage::Old],
    )?;

    Ok(TriggerSet {
        insert,
        update,
        delete,
    })
}

fn build_trigger(
    query: &AnalyzedQuery,
    summary_name: &str,
    event: &str,
    images: &[RowImage],
) -> Result<String> {
    let name = trigger_name(&query.base_table, event);

    let mut body = String::new();
    for image in images {
        body.push_str(&guarded_upsert(query, summary_name, *image)?);
    }

    Ok(format!(
        "CREATE TRIGGER {} AFTER {} ON {} FOR EACH ROW\nBEGIN\n{}END",
        quote_ident(&name),
        event.to_uppercase(),
        quote_ident(&query.base_table),
        body
    ))
}

/// One upsert wrapped in `IF <predicate> THEN … END IF;`. Without a WHERE
/// clause the predicate is the constant `1`.
fn guarded_upsert(query: &AnalyzedQuery, summary_name: &str, image: RowImage) -> Result<String> {
    let guard = match &query.where_text {
        Some(text) => predicate::rewrite(text, image)?,
        None => "1".to_string(),
    };
    let upsert = upsert_statement(query, summary_name, image);
    Ok(format!("  IF {guard} THEN\n    {upsert};\n  END IF;\n"))
}

fn upsert_statement(query: &AnalyzedQuery, summary_name: &str, image: RowImage) -> String {
    let mut cols = Vec::new();
    let mut values = Vec::new();

    if query.group_by_cols.is_empty() {
        cols.push(quote_ident(SYNTHETIC_KEY_COLUMN));
        values.push("1".to_string());
    } else {
        for col in &query.group_by_cols {
            cols.push(quote_ident(col));
            values.push(format!("{}.{}", image.prefix(), quote_ident(col)));
        }
    }

    for agg in &query.aggregates {
        cols.push(quote_ident(&agg.alias));
        values.push(delta_expr(agg, image));
    }

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
        quote_ident(summary_name),
        cols.join(", "),
        values.join(", "),
        upsert_assignments(&query.aggregates)
    )
}

/// The signed contribution of one row image to one aggregate column.
/// `NULL` source values contribute zero.
fn delta_expr(agg: &Aggregate, image: RowImage) -> String {
    match (agg.func, image) {
        (AggregateFunc::Sum, RowImage::New) => {
            format!("COALESCE(NEW.{}, 0)", quote_ident(&agg.column))
        }
        (AggregateFunc::Sum, RowImage::Old) => {
            format!("-COALESCE(OLD.{}, 0)", quote_ident(&agg.column))
        }
        (AggregateFunc::Count, RowImage::New) => "1".to_string(),
        (AggregateFunc::Count, RowImage::Old) => "-1".to_string(),
    }
}
