//! Database schema constants.
//!
//! Timestamps are stored as INTEGER milliseconds since the Unix epoch so
//! that ordering and range comparisons are exact.

/// SQL schema for creating the jobs table.
pub const CREATE_JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    target           TEXT    NOT NULL,
    content_snapshot TEXT    NOT NULL,
    correlation_id   TEXT,
    scheduled_time   INTEGER NOT NULL,
    status           TEXT    NOT NULL DEFAULT 'pending',
    attempts         INTEGER NOT NULL DEFAULT 0,
    error_log        TEXT    NOT NULL DEFAULT '',
    created_at       INTEGER NOT NULL,
    updated_at       INTEGER,
    completed_at     INTEGER,
    result_reference TEXT
)
"#;

/// SQL schema for the table recording released content assets.
pub const CREATE_RELEASED_ASSETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS released_assets (
    correlation_id TEXT    PRIMARY KEY,
    released_at    INTEGER NOT NULL
)
"#;

pub const CREATE_STATUS_SCHEDULED_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_jobs_status_scheduled ON jobs(status, scheduled_time)";

pub const CREATE_CORRELATION_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_jobs_correlation_id ON jobs(correlation_id)";

pub const CREATE_CREATED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at)";

/// Named schema migrations, in the order they must be applied.
///
/// Names are recorded in `_migrations`; append new entries, never reorder.
pub const MIGRATIONS: &[(&str, &str)] = &[
    ("0001_create_jobs", CREATE_JOBS_TABLE),
    ("0002_create_released_assets", CREATE_RELEASED_ASSETS_TABLE),
    ("0003_index_status_scheduled", CREATE_STATUS_SCHEDULED_INDEX),
    ("0004_index_correlation_id", CREATE_CORRELATION_INDEX),
    ("0005_index_created_at", CREATE_CREATED_AT_INDEX),
];

/// Table names in the schema.
pub mod tables {
    pub const JOBS: &str = "jobs";
    pub const RELEASED_ASSETS: &str = "released_assets";
    pub const MIGRATIONS: &str = "_migrations";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_order() {
        assert_eq!(MIGRATIONS.len(), 5);
        // Tables before the indexes that reference them
        assert!(MIGRATIONS[0].1.contains(tables::JOBS));
        assert!(MIGRATIONS[1].1.contains(tables::RELEASED_ASSETS));
        assert!(MIGRATIONS[2..]
            .iter()
            .all(|(_, sql)| sql.contains("CREATE INDEX")));
    }

    #[test]
    fn test_migration_names_are_unique() {
        let mut names: Vec<&str> = MIGRATIONS.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), MIGRATIONS.len());
    }
}
