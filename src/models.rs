use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_CHUNK_SIZE, DEFAULT_THREAD_COUNT};

/// Aggregate functions the analyzer accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunc {
    Sum,
    Count,
}

/// One aggregate select item. `column` is `*` only for `COUNT(*)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub func: AggregateFunc,
    pub column: String,
    pub alias: String,
}

impl Aggregate {
    pub fn sum(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            func: AggregateFunc::Sum,
            column: column.into(),
            alias: alias.into(),
        }
    }

    pub fn count(alias: impl Into<String>) -> Self {
        Self {
            func: AggregateFunc::Count,
            column: "*".to_string(),
            alias: alias.into(),
        }
    }
}

/// The validated shape of an accepted query. Immutable after analysis.
///
/// Invariants: every non-aggregate select item appears in `group_by_cols`,
/// and at least one aggregate exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedQuery {
    pub base_table: String,
    /// Predicate text between `WHERE` and `GROUP BY` (or end of statement),
    /// kept as-is for trigger embedding. Never semantically validated here.
    pub where_text: Option<String>,
    pub group_by_cols: Vec<String>,
    pub aggregates: Vec<Aggregate>,
}

/// The three row-level trigger statements for a base table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSet {
    pub insert: String,
    pub update: String,
    pub delete: String,
}

impl TriggerSet {
    /// Statements in installation order.
    pub fn statements(&self) -> [&str; 3] {
        [&self.insert, &self.update, &self.delete]
    }
}

/// Everything the backfill coordinator needs to rebuild the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillContext {
    pub base_table: String,
    pub summary_name: String,
    pub group_by_cols: Vec<String>,
    pub aggregates: Vec<Aggregate>,
    pub where_text: Option<String>,
}

/// High-water mark captured inside the lock window.
///
/// Every row with `updated_at <= db_now` is historical and belongs to the
/// backfill; everything after is covered by the installed triggers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackfillSnapshot {
    pub db_now: NaiveDateTime,
    pub min_pk: i64,
    pub max_pk: i64,
}

/// Output bundle of `generate`: ready-to-execute DDL plus the context the
/// coordinator consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifacts {
    pub summary_name: String,
    pub summary_ddl: String,
    pub triggers: TriggerSet,
    pub backfill: BackfillContext,
}

impl Artifacts {
    /// Human-readable concatenation of the generated statements, for
    /// display surfaces.
    pub fn preview(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("-- summary table `{}`\n", self.summary_name));
        out.push_str(&self.summary_ddl);
        out.push_str("\n\n-- insert trigger\n");
        out.push_str(&self.triggers.insert);
        out.push_str("\n\n-- update trigger\n");
        out.push_str(&self.triggers.update);
        out.push_str("\n\n-- delete trigger\n");
        out.push_str(&self.triggers.delete);
        out.push('\n');
        out
    }
}

/// Tunables for the backfill phase. Passed explicitly; there is no global
/// configuration state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeConfig {
    /// Base-table rows per chunk (PK range width).
    pub chunk_size: u64,
    /// Concurrent chunk workers.
    pub thread_count: usize,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            thread_count: DEFAULT_THREAD_COUNT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MaterializeConfig::default();
        assert_eq!(config.chunk_size, 5000);
        assert_eq!(config.thread_count, 4);
    }

    #[test]
    fn test_preview_sections() {
        let artifacts = Artifacts {
            summary_name: "t_summary".into(),
            summary_ddl: "CREATE TABLE IF NOT EXISTS `t_summary` (...)".into(),
            triggers: TriggerSet {
                insert: "CREATE TRIGGER i".into(),
                update: "CREATE TRIGGER u".into(),
                delete: "CREATE TRIGGER d".into(),
            },
            backfill: BackfillContext {
                base_table: "t".into(),
                summary_name: "t_summary".into(),
                group_by_cols: vec![],
                aggregates: vec![Aggregate::count("row_count")],
                where_text: None,
            },
        };

        let preview = artifacts.preview();
        assert!(preview.contains("-- summary table `t_summary`"));
        assert!(preview.contains("-- insert trigger"));
        assert!(preview.contains("-- update trigger"));
        assert!(preview.contains("-- delete trigger"));
        let ddl_pos = preview.find("CREATE TABLE").unwrap();
        let ins_pos = preview.find("CREATE TRIGGER i").unwrap();
        assert!(ddl_pos < ins_pos);
    }
}
