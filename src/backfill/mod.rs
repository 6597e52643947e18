//! Lock-and-backfill coordination.
//!
//! Installs the delta triggers and copies historical rows into the summary
//! without losing or double-counting concurrent writes. The invariant the
//! lock window buys: `db_now` is captured while no writer can touch the
//! base table, so every row with `updated_at <= db_now` is backfilled and
//! every later write runs through the already-installed triggers.
//!
//! Concurrent INSERT traffic during the chunked phase is safe (new rows
//! get PKs above the snapshot maximum and `updated_at` above `db_now`);
//! UPDATE/DELETE of rows inside the snapshot range is not, and should be
//! paused until backfill completes.

use std::time::Duration;

use chrono::NaiveDateTime;
use futures::stream::{self, StreamExt};
use sqlx::pool::PoolConnection;
use sqlx::{Executor, MySql, MySqlPool, Row};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::defaults::{
    quote_ident, CHUNK_RETRIES, CHUNK_RETRY_DELAY_MS, SYNTHETIC_KEY_COLUMN, UPDATED_AT_COLUMN,
};
use crate::error::{Error, Result};
use crate::generator;
use crate::introspection::SchemaProbe;
use crate::models::{BackfillContext, BackfillSnapshot, MaterializeConfig, TriggerSet};

/// Progress observer, called as `(completed_chunks, total_chunks)` once
/// per completed chunk.
pub type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// Drives the install-and-backfill protocol against one database.
pub struct BackfillCoordinator<'a> {
    pool: &'a MySqlPool,
    config: MaterializeConfig,
}

impl<'a> BackfillCoordinator<'a> {
    pub fn new(pool: &'a MySqlPool, config: MaterializeConfig) -> Self {
        Self { pool, config }
    }

    /// Install `triggers` (when given) and rebuild the summary from the
    /// base table's history.
    ///
    /// Fails before taking any lock if the base table is missing its
    /// `updated_at` column or a single integer primary key. A lock-window
    /// failure rolls the trigger swap back and leaves the system untouched
    /// apart from the released locks; if even that rollback fails,
    /// [`Error::PartialTriggers`] reports that the base table is left with
    /// incomplete delta coverage. A chunk failure after retries leaves a
    /// mid-backfill state that a re-run converges from (the window
    /// truncates first).
    pub async fn backfill(
        &self,
        ctx: &BackfillContext,
        triggers: Option<&TriggerSet>,
        cancel: &CancellationToken,
        on_progress: &ProgressFn,
    ) -> Result<()> {
        // Pre-flight, outside any lock.
        let probe = SchemaProbe::new(self.pool);
        let facts = probe.table_facts(&ctx.base_table).await?;
        facts.updated_at()?;
        let pk_col = facts.primary_key()?.name.clone();

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let snapshot = self.lock_window(ctx, triggers, &pk_col).await?;

        let Some(snapshot) = snapshot else {
            info!(base = %ctx.base_table, "no historical rows to backfill");
            return Ok(());
        };

        self.run_chunks(ctx, &pk_col, snapshot, cancel, on_progress)
            .await
    }

    /// The critical section, on one dedicated connection: write-lock both
    /// tables, swap the triggers in, capture the snapshot, truncate the
    /// summary, unlock. The locks are released on every exit path.
    async fn lock_window(
        &self,
        ctx: &BackfillContext,
        triggers: Option<&TriggerSet>,
        pk_col: &str,
    ) -> Result<Option<BackfillSnapshot>> {
        let mut conn = self.pool.acquire().await?;

        let lock_sql = format!(
            "LOCK TABLES {} WRITE, {} WRITE",
            quote_ident(&ctx.base_table),
            quote_ident(&ctx.summary_name)
        );
        conn.execute(lock_sql.as_str()).await?;
        debug!(base = %ctx.base_table, summary = %ctx.summary_name, "write locks acquired");

        let outcome = install_and_snapshot(&mut conn, ctx, triggers, pk_col).await;
        let unlock = conn.execute("UNLOCK TABLES").await;

        let snapshot = outcome?;
        unlock?;
        debug!("write locks released");
        Ok(snapshot)
    }

    /// Chunked backfill outside the lock. Chunks are commutative (purely
    /// additive upserts), so they run concurrently in a bounded pool and
    /// complete in any order.
    async fn run_chunks(
        &self,
        ctx: &BackfillContext,
        pk_col: &str,
        snapshot: BackfillSnapshot,
        cancel: &CancellationToken,
        on_progress: &ProgressFn,
    ) -> Result<()> {
        let ranges = chunk_ranges(snapshot.min_pk, snapshot.max_pk, self.config.chunk_size);
        let total = ranges.len();
        let sql = generator::chunk_insert_sql(ctx, pk_col);
        debug!(chunks = total, statement = %sql, "backfill plan");

        let workers = self.config.thread_count.max(1);
        let mut results = stream::iter(ranges.into_iter().enumerate().map(|(index, (lo, hi))| {
            let sql = &sql;
            let pool = self.pool;
            let db_now = snapshot.db_now;
            let cancel = cancel.clone();
            async move {
                // Checked at dispatch time only; a chunk that started
                // always runs to completion.
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                run_chunk(pool, sql, index, lo, hi, db_now).await
            }
        }))
        .buffer_unordered(workers);

        let mut completed = 0;
        let mut cancelled = false;
        while let Some(result) = results.next().await {
            match result {
                Ok(()) => {
                    completed += 1;
                    on_progress(completed, total);
                }
                // Let in-flight chunks finish; nothing new starts because
                // every dispatch re-checks the token.
                Err(Error::Cancelled) => cancelled = true,
                Err(err) => return Err(err),
            }
        }

        if cancelled {
            info!(base = %ctx.base_table, completed, total, "backfill cancelled");
            return Err(Error::Cancelled);
        }

        info!(
            base = %ctx.base_table,
            summary = %ctx.summary_name,
            chunks = total,
            "backfill complete"
        );
        Ok(())
    }
}

/// Body of the lock window: swap the triggers in, capture `NOW()` and the
/// PK range of historical rows, truncate (and, ungrouped, seed) the
/// summary. Returns `None` when there is nothing to backfill.
///
/// Fails closed. The trigger bodies were built before the window opened,
/// so the only failures left are database ones; any statement error after
/// the first trigger drop rolls the whole swap back, leaving the base
/// table with either complete delta coverage or none at all.
async fn install_and_snapshot(
    conn: &mut PoolConnection<MySql>,
    ctx: &BackfillContext,
    triggers: Option<&TriggerSet>,
    pk_col: &str,
) -> Result<Option<BackfillSnapshot>> {
    if let Some(triggers) = triggers {
        if let Err(source) = swap_triggers(conn, &ctx.base_table, triggers).await {
            return Err(rollback_triggers(conn, &ctx.base_table, source).await);
        }
        info!(base = %ctx.base_table, "delta triggers installed");
    }

    match snapshot_and_truncate(conn, ctx, pk_col).await {
        Ok(snapshot) => Ok(snapshot),
        // Triggers went in but the window still failed; take them out
        // again so the window leaves the system untouched.
        Err(source) if triggers.is_some() => {
            Err(rollback_triggers(conn, &ctx.base_table, source).await)
        }
        Err(source) => Err(source.into()),
    }
}

/// Drop any previous lightning triggers and create the new set.
/// Drop-then-create keeps a repeated apply convergent instead of failing
/// on the existing trigger.
async fn swap_triggers(
    conn: &mut PoolConnection<MySql>,
    base_table: &str,
    triggers: &TriggerSet,
) -> sqlx::Result<()> {
    for name in generator::trigger_names(base_table) {
        let drop_sql = format!("DROP TRIGGER IF EXISTS {}", quote_ident(&name));
        conn.execute(drop_sql.as_str()).await?;
    }
    for stmt in triggers.statements() {
        conn.execute(stmt).await?;
    }
    Ok(())
}

/// Remove every lightning trigger from the base table.
async fn remove_triggers(
    conn: &mut PoolConnection<MySql>,
    base_table: &str,
) -> sqlx::Result<()> {
    for name in generator::trigger_names(base_table) {
        let drop_sql = format!("DROP TRIGGER IF EXISTS {}", quote_ident(&name));
        conn.execute(drop_sql.as_str()).await?;
    }
    Ok(())
}

/// Undo a failed trigger swap and decide what to surface. A successful
/// rollback restores the no-triggers state, so the original failure comes
/// back unchanged; a failed rollback means the base table is left with
/// incomplete delta coverage, which gets its own error kind so callers
/// can tell a degraded table from a clean "nothing happened" failure.
async fn rollback_triggers(
    conn: &mut PoolConnection<MySql>,
    base_table: &str,
    source: sqlx::Error,
) -> Error {
    match remove_triggers(conn, base_table).await {
        Ok(()) => {
            warn!(base = %base_table, error = %source, "lock window failed; trigger swap rolled back");
            Error::Database(source)
        }
        Err(rollback_error) => {
            warn!(
                base = %base_table,
                error = %rollback_error,
                "trigger rollback failed; base table left with partial delta coverage"
            );
            Error::PartialTriggers {
                table: base_table.to_string(),
                source,
            }
        }
    }
}

/// Capture the snapshot and reset the summary: `SELECT NOW()`, the PK
/// range of historical rows, `TRUNCATE`, and the ungrouped seed row.
async fn snapshot_and_truncate(
    conn: &mut PoolConnection<MySql>,
    ctx: &BackfillContext,
    pk_col: &str,
) -> sqlx::Result<Option<BackfillSnapshot>> {
    let db_now: NaiveDateTime = sqlx::query_scalar("SELECT NOW()")
        .fetch_one(&mut **conn)
        .await?;

    // The cast is lossless: pre-flight rejects BIGINT UNSIGNED keys, so
    // every accepted key domain fits a signed 64-bit value.
    let range_sql = format!(
        "SELECT CAST(MIN({pk}) AS SIGNED), CAST(MAX({pk}) AS SIGNED) FROM {base} WHERE {updated} <= ?",
        pk = quote_ident(pk_col),
        base = quote_ident(&ctx.base_table),
        updated = quote_ident(UPDATED_AT_COLUMN),
    );
    let row = sqlx::query(&range_sql)
        .bind(db_now)
        .fetch_one(&mut **conn)
        .await?;
    let min_pk: Option<i64> = row.try_get(0)?;
    let max_pk: Option<i64> = row.try_get(1)?;

    // The summary restarts from zero inside the lock so re-runs are
    // deterministic: every chunk contributes exactly its own rows.
    let truncate_sql = format!("TRUNCATE TABLE {}", quote_ident(&ctx.summary_name));
    conn.execute(truncate_sql.as_str()).await?;

    if ctx.group_by_cols.is_empty() {
        // Ungrouped summaries hold exactly one row even with an empty
        // base; the aggregate columns default to zero.
        let seed_sql = format!(
            "INSERT INTO {} ({}) VALUES (1)",
            quote_ident(&ctx.summary_name),
            quote_ident(SYNTHETIC_KEY_COLUMN)
        );
        conn.execute(seed_sql.as_str()).await?;
    }

    let snapshot = match (min_pk, max_pk) {
        (Some(min_pk), Some(max_pk)) => Some(BackfillSnapshot {
            db_now,
            min_pk,
            max_pk,
        }),
        _ => None,
    };
    debug!(?snapshot, "snapshot captured");
    Ok(snapshot)
}

/// Execute one chunk, retrying transient failures a bounded number of
/// times before surfacing. Each attempt is a single autocommitted
/// `INSERT … SELECT`, so a retry never double-applies.
async fn run_chunk(
    pool: &MySqlPool,
    sql: &str,
    index: usize,
    lo: i64,
    hi: i64,
    db_now: NaiveDateTime,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        match sqlx::query(sql)
            .bind(lo)
            .bind(hi)
            .bind(db_now)
            .execute(pool)
            .await
        {
            Ok(_) => {
                debug!(chunk = index, lo, hi, "chunk applied");
                return Ok(());
            }
            Err(source) if attempt < CHUNK_RETRIES => {
                attempt += 1;
                warn!(chunk = index, attempt, error = %source, "chunk failed, retrying");
                tokio::time::sleep(Duration::from_millis(CHUNK_RETRY_DELAY_MS)).await;
            }
            Err(source) => {
                return Err(Error::ChunkFailed {
                    chunk: index,
                    source,
                })
            }
        }
    }
}

/// Split the inclusive key range `[min, max]` into contiguous chunks of
/// `size` keys.
fn chunk_ranges(min: i64, max: i64, size: u64) -> Vec<(i64, i64)> {
    let size = size.clamp(1, i64::MAX as u64) as i64;
    let mut ranges = Vec::new();
    let mut lo = min;
    while lo <= max {
        let hi = lo.saturating_add(size - 1).min(max);
        ranges.push((lo, hi));
        if hi == i64::MAX {
            break;
        }
        lo = hi + 1;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ranges_exact_fit() {
        assert_eq!(chunk_ranges(1, 5000, 5000), vec![(1, 5000)]);
    }

    #[test]
    fn test_chunk_ranges_partial_tail() {
        assert_eq!(
            chunk_ranges(1, 12000, 5000),
            vec![(1, 5000), (5001, 10000), (10001, 12000)]
        );
    }

    #[test]
    fn test_chunk_ranges_single_row() {
        assert_eq!(chunk_ranges(42, 42, 5000), vec![(42, 42)]);
    }

    #[test]
    fn test_chunk_ranges_sparse_keys_are_covered() {
        // Ranges cover the whole span even if most keys are gaps.
        let ranges = chunk_ranges(10, 25, 4);
        assert_eq!(ranges, vec![(10, 13), (14, 17), (18, 21), (22, 25)]);
        assert_eq!(ranges.first().unwrap().0, 10);
        assert_eq!(ranges.last().unwrap().1, 25);
    }

    #[test]
    fn test_chunk_ranges_zero_size_is_clamped() {
        assert_eq!(chunk_ranges(1, 3, 0), vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_chunk_ranges_no_overflow_at_extremes() {
        let ranges = chunk_ranges(i64::MAX - 2, i64::MAX, 2);
        assert_eq!(ranges, vec![(i64::MAX - 2, i64::MAX - 1), (i64::MAX, i64::MAX)]);
    }
}
