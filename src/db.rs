mod migration;
mod schema;

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use time::OffsetDateTime;

pub use migration::{MIGRATIONS, current_version};

use crate::models::{Task, TaskId};
use crate::query::parse_iso_date;

/// Database wrapper providing connection management, schema migrations and
/// task persistence.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens an in-memory SQLite database with the schema applied.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Opens a file-based SQLite database at the given path.
    ///
    /// Creates the database file if it does not exist and applies pending
    /// migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        let mut db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    fn initialize_schema(&mut self) -> Result<()> {
        self.conn.execute("PRAGMA foreign_keys = ON", [])?;
        migration::apply_pending_migrations(&mut self.conn)?;
        Ok(())
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replaces every stored task with `tasks` in one transaction and bumps
    /// the index version.
    ///
    /// Returns the new version.
    pub fn replace_all(&mut self, tasks: &[Task], source_root: Option<&str>) -> Result<u64> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM task_tags", [])?;
        tx.execute("DELETE FROM tasks", [])?;
        {
            let mut insert_task = tx.prepare(
                "INSERT INTO tasks (id, text, status_category, status_symbol, priority, due_date, source_path, source_line)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            let mut insert_tag =
                tx.prepare("INSERT INTO task_tags (task_id, position, tag) VALUES (?1, ?2, ?3)")?;

            for task in tasks {
                insert_task
                    .execute(params![
                        task.id.get(),
                        task.text,
                        task.status_category,
                        task.status_symbol,
                        task.priority,
                        task.due_date.map(|d| d.to_string()),
                        task.source_path,
                        task.source_line as i64,
                    ])
                    .with_context(|| format!("failed to store task {}", task.id))?;
                for (position, tag) in task.tags.iter().enumerate() {
                    insert_tag.execute(params![task.id.get(), position as i64, tag])?;
                }
            }
        }

        let version = read_version(&tx)? + 1;
        tx.execute(
            "UPDATE index_meta SET value = ?1 WHERE key = 'version'",
            [version.to_string()],
        )?;
        tx.execute(
            "UPDATE index_meta SET value = ?1 WHERE key = 'imported_at'",
            [OffsetDateTime::now_utc().unix_timestamp().to_string()],
        )?;
        if let Some(root) = source_root {
            tx.execute(
                "UPDATE index_meta SET value = ?1 WHERE key = 'source_root'",
                [root],
            )?;
        }
        tx.commit()?;

        tracing::info!(tasks = tasks.len(), version, "task store replaced");
        Ok(version)
    }

    /// Loads every task in stored order.
    pub fn load_all(&self) -> Result<Vec<Task>> {
        let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT task_id, tag FROM task_tags ORDER BY task_id, position")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (task_id, tag) = row?;
            tags.entry(task_id).or_default().push(tag);
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, text, status_category, status_symbol, priority, due_date, source_path, source_line
             FROM tasks ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let due: Option<String> = row.get(5)?;
            let line: i64 = row.get(7)?;
            Ok(Task {
                id: TaskId::new(id),
                text: row.get(1)?,
                status_category: row.get(2)?,
                status_symbol: row.get(3)?,
                priority: row.get(4)?,
                due_date: due.as_deref().and_then(parse_iso_date),
                tags: Vec::new(),
                source_path: row.get(6)?,
                source_line: usize::try_from(line).unwrap_or_default(),
            })
        })?;

        let mut tasks = Vec::new();
        for row in rows {
            let mut task = row.context("failed to read task row")?;
            if let Some(t) = tags.remove(&task.id.get()) {
                task.tags = t;
            }
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Current index version; 0 until the first import.
    pub fn index_version(&self) -> Result<u64> {
        read_version(&self.conn)
    }

    pub fn task_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Directory the current task set was imported from, if recorded.
    pub fn source_root(&self) -> Result<Option<String>> {
        let root: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'source_root'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(root.filter(|r| !r.is_empty()))
    }
}

fn read_version(conn: &Connection) -> Result<u64> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = 'version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    match value {
        Some(v) => v
            .parse()
            .with_context(|| format!("corrupt index version '{v}'")),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests;
