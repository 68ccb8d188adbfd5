use anyhow::Context;
use rusqlite::Connection;
use time::OffsetDateTime;

use super::schema::{IMPORT_SOURCE_SCHEMA, INDEX_META_SCHEMA, TASKS_SCHEMA};

/// Individual migration with version metadata.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

impl Migration {
    pub const fn new(version: u32, description: &'static str, up: &'static str) -> Self {
        Self {
            version,
            description,
            up,
        }
    }

    /// Checks if this migration has been applied to the database.
    pub fn is_applied(&self, conn: &Connection) -> anyhow::Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
            [self.version],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Applies this migration and records it, in one transaction.
    pub fn apply(&self, conn: &mut Connection) -> anyhow::Result<()> {
        let tx = conn.transaction()?;
        tx.execute_batch(self.up)
            .with_context(|| format!("migration {} failed", self.version))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                self.version,
                OffsetDateTime::now_utc().unix_timestamp(),
                self.description
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Registry of all migrations in version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration::new(1, "Create tasks and task_tags tables", TASKS_SCHEMA),
    Migration::new(2, "Add index_meta table with index version", INDEX_META_SCHEMA),
    Migration::new(3, "Record import source root and time", IMPORT_SOURCE_SCHEMA),
];

/// Applies all pending migrations in version order. Migrations are
/// additive-only.
pub fn apply_pending_migrations(conn: &mut Connection) -> anyhow::Result<()> {
    ensure_migration_table_exists(conn)?;

    for migration in MIGRATIONS {
        if !migration.is_applied(conn)? {
            migration.apply(conn)?;
            tracing::debug!(
                version = migration.version,
                description = migration.description,
                "applied migration"
            );
        }
    }
    Ok(())
}

/// Returns the highest applied migration version, or 0.
pub fn current_version(conn: &Connection) -> anyhow::Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

fn ensure_migration_table_exists(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        );
        "#,
    )?;
    Ok(())
}
