use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for the analyze → synthesize → backfill pipeline.
///
/// `InvalidQuery`, `UnsupportedSchema`, `MissingColumn` and
/// `MissingUpdatedAt` are non-retryable caller errors. `ChunkFailed`
/// carries the chunk index so a caller can resume or re-run; re-running
/// the backfill always converges because deltas are purely additive.
#[derive(Error, Debug)]
pub enum Error {
    #[error("query: {0}")]
    InvalidQuery(String),

    #[error("schema: column `{column}` not found on `{table}`")]
    MissingColumn { table: String, column: String },

    #[error("schema: {0}")]
    UnsupportedSchema(String),

    #[error("schema: table `{0}` has no `updated_at` column")]
    MissingUpdatedAt(String),

    #[error("backfill chunk #{chunk}: {source}")]
    ChunkFailed {
        chunk: usize,
        #[source]
        source: sqlx::Error,
    },

    /// A lock-window failure whose trigger rollback also failed. Unlike
    /// every other backfill error this one leaves the base table changed:
    /// its delta coverage is incomplete until a re-run succeeds, so base
    /// writes in the meantime may be missing from the summary.
    #[error("backfill: lock window on `{table}` failed and the trigger rollback did not complete; base-table changes may be untracked until backfill is re-run: {source}")]
    PartialTriggers {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("backfill cancelled")]
    Cancelled,

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    /// Convenience constructor for analyzer rejections.
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery(reason.into())
    }

    /// Convenience constructor for schema-shape rejections.
    pub fn unsupported_schema(reason: impl Into<String>) -> Self {
        Self::UnsupportedSchema(reason.into())
    }
}
