//! Live-schema probing via `INFORMATION_SCHEMA`.
//!
//! The generator copies column types from here into the summary DDL, and
//! the backfill coordinator uses the probed primary key and `updated_at`
//! column for its snapshot arithmetic.

mod queries;

use sqlx::{MySqlPool, Row};

use crate::defaults::UPDATED_AT_COLUMN;
use crate::error::{Error, Result};

/// Facts about one base-table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFacts {
    pub name: String,
    /// Full SQL type as written, e.g. `decimal(10,2)` or `int unsigned`.
    pub column_type: String,
    /// Bare type family, e.g. `decimal`, `int`, `timestamp`.
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary: bool,
}

/// All probed columns of one table, in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFacts {
    pub table: String,
    pub columns: Vec<ColumnFacts>,
}

impl TableFacts {
    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Result<&ColumnFacts> {
        self.columns
            .iter()
            .find(|col| col.name == name)
            .ok_or_else(|| Error::MissingColumn {
                table: self.table.clone(),
                column: name.to_string(),
            })
    }

    /// The table's single integer primary-key column.
    ///
    /// Chunked backfill partitions PK ranges with signed 64-bit
    /// arithmetic and relies on auto-increment handing out keys above the
    /// snapshot maximum, so anything other than one integer key column is
    /// unsupported. `BIGINT UNSIGNED` is rejected too: its upper half
    /// does not fit a signed 64-bit value, and the snapshot's
    /// `CAST(... AS SIGNED)` would saturate silently, so high-key rows
    /// would drop out of the chunk ranges. Every other integer type's
    /// full domain fits.
    pub fn primary_key(&self) -> Result<&ColumnFacts> {
        let mut pk_cols = self.columns.iter().filter(|col| col.is_primary);
        let first = pk_cols.next().ok_or_else(|| {
            Error::unsupported_schema(format!("table `{}` has no primary key", self.table))
        })?;
        if pk_cols.next().is_some() {
            return Err(Error::unsupported_schema(format!(
                "table `{}` must have a single-column primary key",
                self.table
            )));
        }
        if !is_integer_type(&first.data_type) {
            return Err(Error::unsupported_schema(format!(
                "primary key `{}` of `{}` must be an integer type, got {}",
                first.name, self.table, first.data_type
            )));
        }
        if first.data_type == "bigint" && first.column_type.contains("unsigned") {
            return Err(Error::unsupported_schema(format!(
                "primary key `{}` of `{}` is bigint unsigned; keys above the signed 64-bit range cannot be range-chunked",
                first.name, self.table
            )));
        }
        Ok(first)
    }

    /// The mandatory `updated_at` column, checked to be comparable with
    /// `NOW()`.
    pub fn updated_at(&self) -> Result<&ColumnFacts> {
        let col = self
            .columns
            .iter()
            .find(|col| col.name == UPDATED_AT_COLUMN)
            .ok_or_else(|| Error::MissingUpdatedAt(self.table.clone()))?;
        if !matches!(col.data_type.as_str(), "timestamp" | "datetime") {
            return Err(Error::unsupported_schema(format!(
                "`{}` on `{}` must be TIMESTAMP or DATETIME, got {}",
                UPDATED_AT_COLUMN, self.table, col.data_type
            )));
        }
        Ok(col)
    }
}

fn is_integer_type(data_type: &str) -> bool {
    matches!(
        data_type,
        "tinyint" | "smallint" | "mediumint" | "int" | "bigint"
    )
}

/// Reads column metadata for base tables out of `INFORMATION_SCHEMA`.
pub struct SchemaProbe<'a> {
    pool: &'a MySqlPool,
}

impl<'a> SchemaProbe<'a> {
    pub fn new(pool: &'a MySqlPool) -> Self {
        Self { pool }
    }

    /// Fetch facts for every column of `table` in the current database.
    pub async fn table_facts(&self, table: &str) -> Result<TableFacts> {
        let rows = sqlx::query(queries::COLUMNS_QUERY)
            .bind(table)
            .fetch_all(self.pool)
            .await?;

        if rows.is_empty() {
            return Err(Error::unsupported_schema(format!(
                "table `{table}` not found in the current database"
            )));
        }

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let is_nullable: String = row.try_get("is_nullable")?;
            let column_key: String = row.try_get("column_key")?;
            columns.push(ColumnFacts {
                name: row.try_get("column_name")?,
                column_type: row.try_get("column_type")?,
                data_type: row.try_get("data_type")?,
                is_nullable: is_nullable.eq_ignore_ascii_case("yes"),
                is_primary: column_key == "PRI",
            });
        }

        Ok(TableFacts {
            table: table.to_string(),
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts() -> TableFacts {
        TableFacts {
            table: "transactions".into(),
            columns: vec![
                ColumnFacts {
                    name: "id".into(),
                    column_type: "bigint".into(),
                    data_type: "bigint".into(),
                    is_nullable: false,
                    is_primary: true,
                },
                ColumnFacts {
                    name: "user_id".into(),
                    column_type: "int".into(),
                    data_type: "int".into(),
                    is_nullable: false,
                    is_primary: false,
                },
                ColumnFacts {
                    name: "cost".into(),
                    column_type: "decimal(10,2)".into(),
                    data_type: "decimal".into(),
                    is_nullable: true,
                    is_primary: false,
                },
                ColumnFacts {
                    name: "updated_at".into(),
                    column_type: "timestamp".into(),
                    data_type: "timestamp".into(),
                    is_nullable: false,
                    is_primary: false,
                },
            ],
        }
    }

    #[test]
    fn test_column_lookup() {
        let facts = facts();
        assert_eq!(facts.column("cost").unwrap().column_type, "decimal(10,2)");
        assert!(matches!(
            facts.column("missing"),
            Err(Error::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_primary_key_resolution() {
        let facts = facts();
        assert_eq!(facts.primary_key().unwrap().name, "id");
    }

    #[test]
    fn test_compound_primary_key_is_rejected() {
        let mut facts = facts();
        facts.columns[1].is_primary = true;
        assert!(matches!(
            facts.primary_key(),
            Err(Error::UnsupportedSchema(_))
        ));
    }

    #[test]
    fn test_non_integer_primary_key_is_rejected() {
        let mut facts = facts();
        facts.columns[0].data_type = "varchar".into();
        assert!(matches!(
            facts.primary_key(),
            Err(Error::UnsupportedSchema(_))
        ));
    }

    #[test]
    fn test_bigint_unsigned_primary_key_is_rejected() {
        let mut facts = facts();
        facts.columns[0].column_type = "bigint unsigned".into();
        assert!(matches!(
            facts.primary_key(),
            Err(Error::UnsupportedSchema(_))
        ));
        // Smaller unsigned keys fit a signed 64-bit value and stay fine.
        facts.columns[0].column_type = "int unsigned".into();
        facts.columns[0].data_type = "int".into();
        assert!(facts.primary_key().is_ok());
    }

    #[test]
    fn test_missing_updated_at() {
        let mut facts = facts();
        facts.columns.retain(|col| col.name != "updated_at");
        assert!(matches!(
            facts.updated_at(),
            Err(Error::MissingUpdatedAt(_))
        ));
    }

    #[test]
    fn test_updated_at_type_check() {
        let mut facts = facts();
        assert!(facts.updated_at().is_ok());
        facts.columns[3].data_type = "varchar".into();
        assert!(matches!(
            facts.updated_at(),
            Err(Error::UnsupportedSchema(_))
        ));
    }
}
