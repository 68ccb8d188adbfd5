//! Markdown checklist scanner.
//!
//! Turns `- [ ] text` style lines in a tree of `.md` files into tasks.
//! Recognized inline metadata:
//!
//! - due dates: `📅 2025-03-01`, `[due:: 2025-03-01]`, `due:2025-03-01`
//! - priority: `🔺`/`⏫` (1), `🔼` (2), `🔽` (3), `⏬` (4), `[priority:: high]`
//! - tags: `#tag`, nested `#area/project`

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::models::{StatusCategories, Task, TaskId};
use crate::query::parse_iso_date;
use crate::tags::TagNormalizer;

static TASK_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+\[(.)\]\s+(.+)$").expect("valid task line regex")
});

static DUE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:📅\s*|\[due::\s*|\bdue:)(\d{4}-\d{2}-\d{2})\]?").expect("valid due regex")
});

static PRIORITY_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[priority::\s*(highest|high|medium|low|lowest|[1-4])\s*\]")
        .expect("valid priority field regex")
});

/// Other Tasks-plugin date markers (done, created, scheduled, start).
static OTHER_DATE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:✅|➕|⏳|🛫)\s*\d{4}-\d{2}-\d{2}").expect("valid date marker regex")
});

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s)#([\p{L}\p{N}_\-/]+)").expect("valid tag regex")
});

const PRIORITY_EMOJI: &[(char, u8)] = &[('🔺', 1), ('⏫', 1), ('🔼', 2), ('🔽', 3), ('⏬', 4)];

/// One recognized checklist line, before an ID is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLine {
    pub symbol: String,
    pub text: String,
    pub priority: Option<u8>,
    pub due_date: Option<time::Date>,
    pub tags: Vec<String>,
}

/// Parses a single line; returns `None` if it is not a checklist item.
pub fn parse_line(line: &str) -> Option<TaskLine> {
    let caps = TASK_LINE.captures(line)?;
    let symbol = caps.get(1)?.as_str().to_string();
    let body = caps.get(2)?.as_str();

    let due_date = DUE_MARKER
        .captures(body)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_iso_date(m.as_str()));

    let priority = PRIORITY_FIELD
        .captures(body)
        .and_then(|c| c.get(1))
        .and_then(|m| field_priority(m.as_str()))
        .or_else(|| {
            body.chars().find_map(|ch| {
                PRIORITY_EMOJI
                    .iter()
                    .find(|(emoji, _)| *emoji == ch)
                    .map(|(_, level)| *level)
            })
        });

    let raw_tags: Vec<&str> = TAG
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('/'))
        .filter(|t| t.chars().any(|c| !c.is_ascii_digit()))
        .collect();
    let tags = TagNormalizer::normalize_tags(raw_tags);

    let mut text = DUE_MARKER.replace_all(body, "").into_owned();
    text = PRIORITY_FIELD.replace_all(&text, "").into_owned();
    text = OTHER_DATE_MARKER.replace_all(&text, "").into_owned();
    text.retain(|ch| !PRIORITY_EMOJI.iter().any(|(emoji, _)| *emoji == ch));
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        return None;
    }

    Some(TaskLine {
        symbol,
        text,
        priority,
        due_date,
        tags,
    })
}

fn field_priority(value: &str) -> Option<u8> {
    match value.to_lowercase().as_str() {
        "highest" | "high" | "1" => Some(1),
        "medium" | "2" => Some(2),
        "low" | "3" => Some(3),
        "lowest" | "4" => Some(4),
        _ => None,
    }
}

/// Scans Markdown documents for tasks.
pub struct MarkdownScanner<'a> {
    categories: &'a StatusCategories,
}

impl<'a> MarkdownScanner<'a> {
    pub fn new(categories: &'a StatusCategories) -> Self {
        Self { categories }
    }

    /// Extracts tasks from one document. IDs continue from `next_id`.
    pub fn parse_document(&self, source_path: &str, content: &str, next_id: &mut i64) -> Vec<Task> {
        let mut tasks = Vec::new();
        let mut in_code_block = false;
        for (line_no, line) in content.lines().enumerate() {
            if line.trim_start().starts_with("```") {
                in_code_block = !in_code_block;
                continue;
            }
            if in_code_block {
                continue;
            }
            let Some(parsed) = parse_line(line) else {
                continue;
            };
            tasks.push(Task {
                id: TaskId::new(*next_id),
                text: parsed.text,
                status_category: self.categories.category_for_symbol(&parsed.symbol).to_string(),
                status_symbol: parsed.symbol,
                priority: parsed.priority,
                due_date: parsed.due_date,
                tags: parsed.tags,
                source_path: source_path.to_string(),
                source_line: line_no,
            });
            *next_id += 1;
        }
        tasks
    }

    /// Scans every `.md` file under `root`, in path order.
    ///
    /// Hidden directories are skipped. Unreadable files are logged and
    /// skipped; an unreadable root is an error.
    pub fn scan_dir(&self, root: &Path) -> Result<Vec<Task>> {
        let mut files = Vec::new();
        fs::read_dir(root).with_context(|| format!("cannot read directory {}", root.display()))?;
        collect_markdown(root, &mut files);
        files.sort();

        let mut tasks = Vec::new();
        let mut next_id = 1;
        for path in &files {
            let content = match fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let relative = relative_path(root, path);
            let found = self.parse_document(&relative, &content, &mut next_id);
            debug!(path = %relative, tasks = found.len(), "scanned document");
            tasks.extend(found);
        }
        Ok(tasks)
    }
}

fn collect_markdown(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read directory");
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_dir() {
            if !hidden {
                collect_markdown(&path, out);
            }
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
        {
            out.push(path);
        }
    }
}

/// `path` relative to `root`, with `/` separators.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use time::macros::date;

    #[test]
    fn parses_plain_checkbox_lines() {
        let line = parse_line("- [ ] Call the plumber").unwrap();
        assert_eq!(line.symbol, " ");
        assert_eq!(line.text, "Call the plumber");
        assert!(line.priority.is_none() && line.due_date.is_none());

        assert_eq!(parse_line("* [x] Done thing").unwrap().symbol, "x");
        assert_eq!(parse_line("  1. [/] Numbered").unwrap().symbol, "/");
        assert!(parse_line("- plain bullet").is_none());
        assert!(parse_line("- [ ]").is_none());
        assert!(parse_line("Some [ ] prose").is_none());
    }

    #[test]
    fn extracts_emoji_metadata() {
        let line = parse_line("- [ ] Pay rent ⏫ 📅 2025-02-01 #home #finance/bills").unwrap();
        assert_eq!(line.text, "Pay rent #home #finance/bills");
        assert_eq!(line.priority, Some(1));
        assert_eq!(line.due_date, Some(date!(2025 - 02 - 01)));
        assert_eq!(line.tags, vec!["home", "finance/bills"]);

        assert_eq!(parse_line("- [ ] a 🔼").unwrap().priority, Some(2));
        assert_eq!(parse_line("- [ ] a 🔽").unwrap().priority, Some(3));
        assert_eq!(parse_line("- [ ] a ⏬").unwrap().priority, Some(4));
    }

    #[test]
    fn extracts_dataview_fields_and_shorthand_due() {
        let line = parse_line("- [ ] Review [due:: 2025-03-10] [priority:: medium]").unwrap();
        assert_eq!(line.text, "Review");
        assert_eq!(line.due_date, Some(date!(2025 - 03 - 10)));
        assert_eq!(line.priority, Some(2));

        let line = parse_line("- [ ] Ship due:2025-04-01").unwrap();
        assert_eq!(line.due_date, Some(date!(2025 - 04 - 01)));
        assert_eq!(line.text, "Ship");
    }

    #[test]
    fn strips_other_date_markers_and_ignores_numeric_tags() {
        let line = parse_line("- [x] Filed taxes ✅ 2025-01-02 #1 #admin").unwrap();
        assert_eq!(line.text, "Filed taxes #1 #admin");
        assert_eq!(line.tags, vec!["admin"]);
    }

    #[test]
    fn maps_symbols_through_category_table() {
        let categories = StatusCategories::default();
        let scanner = MarkdownScanner::new(&categories);
        let mut next_id = 10;
        let tasks = scanner.parse_document(
            "Work/plan.md",
            "# Plan\n- [ ] open\n- [/] doing\n- [x] done\n- [-] dropped\n- [?] odd\n",
            &mut next_id,
        );

        let statuses: Vec<&str> = tasks.iter().map(|t| t.status_category.as_str()).collect();
        assert_eq!(statuses, vec!["open", "in_progress", "completed", "cancelled", "other"]);
        assert_eq!(tasks[0].id, TaskId::new(10));
        assert_eq!(tasks[0].source_line, 1);
        assert_eq!(tasks[4].status_symbol, "?");
        assert_eq!(next_id, 15);
    }

    #[test]
    fn skips_fenced_code_blocks() {
        let categories = StatusCategories::default();
        let scanner = MarkdownScanner::new(&categories);
        let mut next_id = 1;
        let tasks = scanner.parse_document(
            "a.md",
            "- [ ] real\n```\n- [ ] example\n```\n- [ ] also real\n",
            &mut next_id,
        );
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].text, "also real");
    }

    #[test]
    fn scans_a_directory_tree_in_path_order() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Work/Projects")).unwrap();
        fs::create_dir_all(dir.path().join(".obsidian")).unwrap();
        fs::write(dir.path().join("Work/Projects/api.md"), "- [ ] Fix auth\n").unwrap();
        fs::write(dir.path().join("Home.md"), "- [ ] Buy milk\n- [x] Water plants\n").unwrap();
        fs::write(dir.path().join(".obsidian/hidden.md"), "- [ ] ignored\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "- [ ] not markdown\n").unwrap();

        let categories = StatusCategories::default();
        let tasks = MarkdownScanner::new(&categories).scan_dir(dir.path()).unwrap();

        let summary: Vec<(i64, &str, &str)> = tasks
            .iter()
            .map(|t| (t.id.get(), t.source_path.as_str(), t.text.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, "Home.md", "Buy milk"),
                (2, "Home.md", "Water plants"),
                (3, "Work/Projects/api.md", "Fix auth"),
            ]
        );
        assert!(tasks[2].is_in_folder("work"));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        let categories = StatusCategories::default();
        let result = MarkdownScanner::new(&categories).scan_dir(&dir.path().join("nope"));
        assert!(result.is_err());
    }
}
