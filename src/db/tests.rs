use super::*;
use crate::models::TaskBuilder;
use tempfile::tempdir;
use time::macros::date;

fn sample_tasks() -> Vec<Task> {
    vec![
        TaskBuilder::new()
            .id(1)
            .text("Fix login bug")
            .symbol(" ")
            .priority(1)
            .due(date!(2025 - 01 - 15))
            .tags(["work", "work/api"])
            .path("Work/api.md")
            .line(3)
            .build(),
        TaskBuilder::new()
            .id(2)
            .text("Buy milk")
            .status("completed")
            .symbol("x")
            .path("Home/errands.md")
            .line(1)
            .build(),
    ]
}

#[test]
fn in_memory_opens_successfully() {
    let result = Database::in_memory();
    assert!(result.is_ok());
}

#[test]
fn schema_tables_exist() {
    let db = Database::in_memory().unwrap();

    let tables: Vec<String> = db
        .connection()
        .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .filter_map(|r| r.ok())
        .collect();

    assert!(tables.contains(&"tasks".to_string()));
    assert!(tables.contains(&"task_tags".to_string()));
    assert!(tables.contains(&"index_meta".to_string()));
    assert!(tables.contains(&"schema_migrations".to_string()));
}

#[test]
fn all_migrations_are_recorded() {
    let db = Database::in_memory().unwrap();
    let latest = MIGRATIONS.iter().map(|m| m.version).max().unwrap();
    assert_eq!(current_version(db.connection()).unwrap(), latest);
}

#[test]
fn foreign_keys_enabled() {
    let db = Database::in_memory().unwrap();

    let fk_enabled: i32 = db
        .connection()
        .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
        .unwrap();

    assert_eq!(fk_enabled, 1);
}

#[test]
fn fresh_database_has_version_zero_and_no_tasks() {
    let db = Database::in_memory().unwrap();
    assert_eq!(db.index_version().unwrap(), 0);
    assert_eq!(db.task_count().unwrap(), 0);
    assert!(db.load_all().unwrap().is_empty());
    assert!(db.source_root().unwrap().is_none());
}

#[test]
fn replace_all_round_trips_every_field() {
    let mut db = Database::in_memory().unwrap();
    let tasks = sample_tasks();

    let version = db.replace_all(&tasks, Some("/notes")).unwrap();
    assert_eq!(version, 1);

    let loaded = db.load_all().unwrap();
    assert_eq!(loaded, tasks);
    assert_eq!(db.source_root().unwrap().as_deref(), Some("/notes"));
}

#[test]
fn replace_all_swaps_the_whole_set_and_bumps_version() {
    let mut db = Database::in_memory().unwrap();
    db.replace_all(&sample_tasks(), None).unwrap();

    let replacement = vec![TaskBuilder::new().id(1).text("Only task").path("a.md").build()];
    let version = db.replace_all(&replacement, None).unwrap();

    assert_eq!(version, 2);
    assert_eq!(db.task_count().unwrap(), 1);
    let loaded = db.load_all().unwrap();
    assert_eq!(loaded[0].text, "Only task");
    assert!(loaded[0].tags.is_empty());

    let orphan_tags: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM task_tags", [], |row| row.get(0))
        .unwrap();
    assert_eq!(orphan_tags, 0);
}

#[test]
fn failed_replace_keeps_previous_set() {
    let mut db = Database::in_memory().unwrap();
    db.replace_all(&sample_tasks(), None).unwrap();

    // Duplicate IDs violate the primary key, so the transaction rolls back.
    let duplicate = vec![
        TaskBuilder::new().id(7).text("a").path("a.md").build(),
        TaskBuilder::new().id(7).text("b").path("a.md").build(),
    ];
    assert!(db.replace_all(&duplicate, None).is_err());

    assert_eq!(db.index_version().unwrap(), 1);
    assert_eq!(db.load_all().unwrap(), sample_tasks());
}

#[test]
fn open_creates_database_file() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    let result = Database::open(&db_path);
    assert!(result.is_ok());
    assert!(db_path.exists());
}

#[test]
fn reopen_is_idempotent() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    {
        let mut db = Database::open(&db_path).unwrap();
        db.replace_all(&sample_tasks(), None).unwrap();
    }

    let db = Database::open(&db_path).unwrap();
    assert_eq!(db.index_version().unwrap(), 1);
    assert_eq!(db.task_count().unwrap(), 2);
}
