//! Thin façade wiring analysis, synthesis, and backfill together.

use sqlx::{Executor, MySqlPool};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::backfill::BackfillCoordinator;
use crate::defaults::quote_ident;
use crate::error::Result;
use crate::generator;
use crate::introspection::SchemaProbe;
use crate::models::{Artifacts, MaterializeConfig};
use crate::parsing;

/// Entry point for callers: owns the connection pool and configuration,
/// exposes `generate` (pure analysis + synthesis, plus one schema probe)
/// and `apply` (DDL, trigger installation, backfill).
pub struct SummaryDriver {
    pool: MySqlPool,
    config: MaterializeConfig,
}

impl SummaryDriver {
    pub fn new(pool: MySqlPool) -> Self {
        Self::with_config(pool, MaterializeConfig::default())
    }

    pub fn with_config(pool: MySqlPool, config: MaterializeConfig) -> Self {
        Self { pool, config }
    }

    /// Analyze `sql` and synthesize the artifacts bundle. Nothing is
    /// written to the database; column types are resolved against the
    /// live schema so the summary DDL mirrors the base table exactly.
    pub async fn generate(&self, sql: &str, summary_name: Option<&str>) -> Result<Artifacts> {
        let query = parsing::analyze(sql)?;
        let probe = SchemaProbe::new(&self.pool);
        let facts = probe.table_facts(&query.base_table).await?;
        generator::synthesize(&query, &facts, summary_name)
    }

    /// Execute the bundle: create the summary table, install the triggers
    /// and backfill under the coordinator's lock protocol.
    ///
    /// `on_progress` is called with `(completed, total)` after each chunk.
    /// Cancelling `cancel` stops dispatching new chunks; already-applied
    /// deltas are harmless because a re-run truncates and converges.
    pub async fn apply<F>(
        &self,
        artifacts: &Artifacts,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<()>
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.pool.execute(artifacts.summary_ddl.as_str()).await?;
        info!(summary = %artifacts.summary_name, "summary table ensured");

        let coordinator = BackfillCoordinator::new(&self.pool, self.config);
        coordinator
            .backfill(
                &artifacts.backfill,
                Some(&artifacts.triggers),
                cancel,
                &on_progress,
            )
            .await
    }

    /// Inverse of [`apply`](Self::apply): drop the three triggers and the
    /// summary table.
    pub async fn teardown(&self, artifacts: &Artifacts) -> Result<()> {
        for name in generator::trigger_names(&artifacts.backfill.base_table) {
            let drop_sql = format!("DROP TRIGGER IF EXISTS {}", quote_ident(&name));
            self.pool.execute(drop_sql.as_str()).await?;
        }
        let drop_table = format!(
            "DROP TABLE IF EXISTS {}",
            quote_ident(&artifacts.summary_name)
        );
        self.pool.execute(drop_table.as_str()).await?;
        info!(summary = %artifacts.summary_name, "summary and triggers dropped");
        Ok(())
    }
}
