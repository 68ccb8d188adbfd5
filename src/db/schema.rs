/// Task tables: one row per checklist line, tags in a junction table.
///
/// Uses CREATE TABLE/INDEX IF NOT EXISTS for idempotent execution.
pub const TASKS_SCHEMA: &str = r#"
-- Tasks table: one row per checklist line, in scan order
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY,
    text TEXT NOT NULL,
    status_category TEXT NOT NULL,
    status_symbol TEXT NOT NULL DEFAULT ' ',
    priority INTEGER CHECK (priority BETWEEN 1 AND 4),
    due_date TEXT,
    source_path TEXT NOT NULL,
    source_line INTEGER NOT NULL
);

-- Tags per task, normalized, kept in source order
CREATE TABLE IF NOT EXISTS task_tags (
    task_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (task_id, position),
    FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_tasks_source ON tasks(source_path, source_line);
CREATE INDEX IF NOT EXISTS idx_task_tags_tag ON task_tags(tag);
"#;

/// Key/value metadata, holding the index version among others.
pub const INDEX_META_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR IGNORE INTO index_meta (key, value) VALUES ('version', '0');
"#;

/// Records where the current task set was imported from.
pub const IMPORT_SOURCE_SCHEMA: &str = r#"
INSERT OR IGNORE INTO index_meta (key, value) VALUES ('source_root', '');
INSERT OR IGNORE INTO index_meta (key, value) VALUES ('imported_at', '0');
"#;
