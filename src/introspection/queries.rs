//! SQL constants for schema probing.
//!
//! All probing goes through `INFORMATION_SCHEMA` scoped to the
//! connection's current database (`DATABASE()`), so the pool decides
//! which schema is inspected.

/// Column facts for one table: full SQL type, bare type family,
/// nullability, and key membership, in ordinal order.
pub const COLUMNS_QUERY: &str = r#"
    SELECT
        COLUMN_NAME AS column_name,
        COLUMN_TYPE AS column_type,
        DATA_TYPE AS data_type,
        IS_NULLABLE AS is_nullable,
        COLUMN_KEY AS column_key
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = DATABASE()
      AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;
