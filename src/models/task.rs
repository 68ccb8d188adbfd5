use serde::{Deserialize, Serialize};
use time::Date;

use super::TaskId;
use super::status::OTHER_CATEGORY;

/// A single checklist item from the task index.
///
/// Tasks are read-only for the duration of a query. Scores and match
/// information are attached through [`crate::scoring::ScoredTask`], never
/// written back into the task itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier, stable within one index snapshot.
    pub id: TaskId,
    /// Task text with property markers left in place.
    pub text: String,
    /// Key of the status category this task resolved to.
    pub status_category: String,
    /// Raw checkbox symbol, e.g. `" "`, `"x"`, `"/"`.
    pub status_symbol: String,
    /// Priority level, 1 is highest.
    pub priority: Option<u8>,
    /// Due date, if any.
    pub due_date: Option<Date>,
    /// Normalized tags without the leading `#`.
    pub tags: Vec<String>,
    /// Document the task lives in, relative to the scanned root.
    pub source_path: String,
    /// Zero-based line offset in the source document.
    pub source_line: usize,
}

impl Task {
    /// Returns true if the task's document sits inside `folder` (or is the
    /// folder root itself). Comparison is case-insensitive and ignores
    /// leading/trailing slashes.
    pub fn is_in_folder(&self, folder: &str) -> bool {
        let folder = folder.trim_matches('/').to_lowercase();
        if folder.is_empty() {
            return true;
        }
        let path = self.source_path.trim_start_matches('/').to_lowercase();
        path == folder || path.starts_with(&format!("{folder}/"))
    }

    /// Returns true if the task carries `tag` or a nested child of it
    /// (`work` matches `work/project`).
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| {
            t == tag
                || t.strip_prefix(tag)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Returns true if the task lives in the given document.
    pub fn is_in_document(&self, document: &str) -> bool {
        self.source_path
            .trim_start_matches('/')
            .eq_ignore_ascii_case(document.trim_start_matches('/'))
    }
}

/// Builder for constructing `Task` instances with optional fields.
///
/// # Examples
///
/// ```
/// use tasklens::TaskBuilder;
///
/// let task = TaskBuilder::new()
///     .id(1)
///     .text("Write the quarterly report")
///     .build();
///
/// assert_eq!(task.id.get(), 1);
/// assert_eq!(task.status_category, "open");
/// assert!(task.tags.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct TaskBuilder {
    id: Option<i64>,
    text: Option<String>,
    status_category: Option<String>,
    status_symbol: Option<String>,
    priority: Option<u8>,
    due_date: Option<Date>,
    tags: Option<Vec<String>>,
    source_path: Option<String>,
    source_line: Option<usize>,
}

impl TaskBuilder {
    /// Creates a new `TaskBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the task ID.
    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the task text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the status category key.
    pub fn status(mut self, category: impl Into<String>) -> Self {
        self.status_category = Some(category.into());
        self
    }

    /// Sets the raw checkbox symbol.
    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.status_symbol = Some(symbol.into());
        self
    }

    /// Sets the priority level.
    pub fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the due date.
    pub fn due(mut self, due: Date) -> Self {
        self.due_date = Some(due);
        self
    }

    /// Sets the tags.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the source document path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Sets the source line offset.
    pub fn line(mut self, line: usize) -> Self {
        self.source_line = Some(line);
        self
    }

    /// Builds the `Task`, using defaults for optional fields.
    ///
    /// Status defaults to `open` with a blank checkbox; an explicitly empty
    /// status falls back to the `other` category.
    ///
    /// # Panics
    ///
    /// Panics if `id` or `text` have not been set.
    pub fn build(self) -> Task {
        let status_category = match self.status_category {
            Some(s) if s.trim().is_empty() => OTHER_CATEGORY.to_string(),
            Some(s) => s,
            None => "open".to_string(),
        };
        Task {
            id: TaskId::new(self.id.expect("id is required")),
            text: self.text.expect("text is required"),
            status_category,
            status_symbol: self.status_symbol.unwrap_or_else(|| " ".to_string()),
            priority: self.priority,
            due_date: self.due_date,
            tags: self.tags.unwrap_or_default(),
            source_path: self.source_path.unwrap_or_default(),
            source_line: self.source_line.unwrap_or(0),
        }
    }
}
