//! Canonical constants and identifier helpers shared across the crate.
//!
//! Trigger and summary-table names are contractual: external tooling finds
//! the generated objects by these rules, so keep them stable.

use once_cell::sync::Lazy;
use regex::Regex;

/// Default number of base-table rows per backfill chunk.
pub const DEFAULT_CHUNK_SIZE: u64 = 5000;

/// Default number of concurrent backfill workers.
pub const DEFAULT_THREAD_COUNT: usize = 4;

/// Suffix appended to every generated trigger name:
/// `<base>_after_{insert|update|delete}_lightning`.
pub const TRIGGER_SUFFIX: &str = "lightning";

/// Suffix appended to every derived summary-table name.
pub const SUMMARY_SUFFIX: &str = "summary";

/// Storage clause appended to generated summary tables.
pub const SUMMARY_TABLE_OPTIONS: &str =
    "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci";

/// Mandatory last-modification column on base tables. The backfill
/// high-water mark (`updated_at <= NOW()` captured under the lock) is what
/// separates historical rows from trigger-covered rows.
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Synthetic key column used when the query has no GROUP BY, so the
/// summary always holds exactly one row.
pub const SYNTHETIC_KEY_COLUMN: &str = "summary_id";

/// Per-chunk retry budget for transient database failures.
pub const CHUNK_RETRIES: u32 = 3;

/// Delay between chunk retries, in milliseconds.
pub const CHUNK_RETRY_DELAY_MS: u64 = 200;

static NON_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());
static NON_SNAKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]").unwrap());

/// Replace anything outside `[A-Za-z0-9_]` so the result is safe inside a
/// generated object name.
pub fn sanitize_identifier(name: &str) -> String {
    NON_IDENTIFIER.replace_all(name, "_").into_owned()
}

/// Lowercase and replace anything outside `[a-z0-9_]` with `_`.
pub fn snake_case(name: &str) -> String {
    NON_SNAKE.replace_all(&name.to_lowercase(), "_").into_owned()
}

/// Backtick-quote an identifier for MySQL statements.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("orders"), "orders");
        assert_eq!(sanitize_identifier("my-table"), "my_table");
        assert_eq!(sanitize_identifier("a.b c"), "a_b_c");
        assert_eq!(sanitize_identifier("Sales2024"), "Sales2024");
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("Transactions"), "transactions");
        assert_eq!(snake_case("My-Table"), "my_table");
        assert_eq!(snake_case("user id"), "user_id");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("user_id"), "`user_id`");
        assert_eq!(quote_ident("odd`name"), "`odd``name`");
    }
}
