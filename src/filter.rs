//! Exclusion, inclusion, property and keyword filtering.
//!
//! Stages run in a fixed order and each one only narrows the output of the
//! previous one: global exclusions, then session inclusions, then structured
//! properties, then keywords.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{ParsedQuery, Task};
use crate::tags::TagNormalizer;

/// Folders, tags and documents a rule applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub folders: Vec<String>,
    pub tags: Vec<String>,
    pub documents: Vec<String>,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.tags.is_empty() && self.documents.is_empty()
    }

    /// Returns true if any folder, tag or document criterion matches.
    pub fn matches(&self, task: &Task) -> bool {
        self.folders.iter().any(|f| task.is_in_folder(f))
            || self.tags.iter().any(|t| task.has_tag(t))
            || self.documents.iter().any(|d| task.is_in_document(d))
    }

    fn normalized(&self) -> Self {
        Self {
            folders: self
                .folders
                .iter()
                .map(|f| f.trim().trim_matches('/').to_string())
                .filter(|f| !f.is_empty())
                .collect(),
            tags: TagNormalizer::normalize_tags(&self.tags),
            documents: self
                .documents
                .iter()
                .map(|d| d.trim().trim_start_matches('/').to_string())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }
}

/// Configured filter rules: global exclusions and default inclusions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    pub exclusions: RuleSet,
    pub inclusions: RuleSet,
}

/// Which kind of inclusion target a warning is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Folder,
    Tag,
    Document,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Folder => write!(f, "folder"),
            Self::Tag => write!(f, "tag"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// An inclusion that can never match because an exclusion covers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterWarning {
    pub kind: TargetKind,
    pub target: String,
    pub excluded_by: String,
}

impl fmt::Display for FilterWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "included {} '{}' is excluded by '{}'; exclusions take precedence",
            self.kind, self.target, self.excluded_by
        )
    }
}

/// Active exclusions and inclusions for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    exclusions: RuleSet,
    inclusions: RuleSet,
}

impl FilterSet {
    pub fn new(exclusions: RuleSet, inclusions: RuleSet) -> Self {
        Self {
            exclusions: exclusions.normalized(),
            inclusions: inclusions.normalized(),
        }
    }

    pub fn from_rules(rules: &FilterRules) -> Self {
        Self::new(rules.exclusions.clone(), rules.inclusions.clone())
    }

    pub fn exclusions(&self) -> &RuleSet {
        &self.exclusions
    }

    pub fn inclusions(&self) -> &RuleSet {
        &self.inclusions
    }

    /// Replaces the session inclusions, keeping global exclusions.
    pub fn with_inclusions(&self, inclusions: RuleSet) -> Self {
        Self::new(self.exclusions.clone(), inclusions)
    }

    /// Lists every inclusion wholly shadowed by an exclusion.
    pub fn conflicts(&self) -> Vec<FilterWarning> {
        let mut warnings = Vec::new();
        let ex = &self.exclusions;

        for folder in &self.inclusions.folders {
            if let Some(by) = ex.folders.iter().find(|e| path_within(folder, e)) {
                warnings.push(FilterWarning {
                    kind: TargetKind::Folder,
                    target: folder.clone(),
                    excluded_by: by.clone(),
                });
            }
        }
        for tag in &self.inclusions.tags {
            if let Some(by) = ex.tags.iter().find(|e| tag_within(tag, e)) {
                warnings.push(FilterWarning {
                    kind: TargetKind::Tag,
                    target: tag.clone(),
                    excluded_by: format!("#{by}"),
                });
            }
        }
        for document in &self.inclusions.documents {
            let by = ex
                .documents
                .iter()
                .find(|e| e.eq_ignore_ascii_case(document))
                .or_else(|| ex.folders.iter().find(|e| path_within(document, e)));
            if let Some(by) = by {
                warnings.push(FilterWarning {
                    kind: TargetKind::Document,
                    target: document.clone(),
                    excluded_by: by.clone(),
                });
            }
        }
        warnings
    }
}

/// `path` equals `root` or sits below it.
fn path_within(path: &str, root: &str) -> bool {
    let path = path.to_lowercase();
    let root = root.to_lowercase();
    path == root || path.starts_with(&format!("{root}/"))
}

/// `tag` equals `parent` or is nested under it.
fn tag_within(tag: &str, parent: &str) -> bool {
    tag == parent
        || tag
            .strip_prefix(parent)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Number of tasks left after each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub total: usize,
    pub after_exclusions: usize,
    pub after_inclusions: usize,
    pub after_properties: usize,
    pub after_keywords: usize,
}

/// Result of running the pipeline.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub tasks: Vec<Arc<Task>>,
    pub counts: StageCounts,
}

/// Runs the filter stages over a task snapshot.
pub struct FilterPipeline<'a> {
    filters: &'a FilterSet,
}

impl<'a> FilterPipeline<'a> {
    pub fn new(filters: &'a FilterSet) -> Self {
        Self { filters }
    }

    pub fn run(&self, tasks: &[Arc<Task>], query: &ParsedQuery) -> FilterOutcome {
        let mut counts = StageCounts {
            total: tasks.len(),
            ..Default::default()
        };

        let excluded = &self.filters.exclusions;
        let mut current: Vec<Arc<Task>> = tasks
            .iter()
            .filter(|t| !excluded.matches(t))
            .cloned()
            .collect();
        counts.after_exclusions = current.len();

        let included = &self.filters.inclusions;
        if !included.is_empty() {
            current.retain(|t| included.matches(t));
        }
        counts.after_inclusions = current.len();

        current.retain(|t| matches_properties(t, query));
        counts.after_properties = current.len();

        if query.has_keywords() {
            let terms = query.match_terms();
            current.retain(|t| {
                let text = t.text.to_lowercase();
                terms.iter().any(|term| text.contains(term.as_str()))
            });
        }
        counts.after_keywords = current.len();

        tracing::debug!(
            total = counts.total,
            after_exclusions = counts.after_exclusions,
            after_inclusions = counts.after_inclusions,
            after_properties = counts.after_properties,
            after_keywords = counts.after_keywords,
            "filter pipeline finished"
        );
        FilterOutcome {
            tasks: current,
            counts,
        }
    }
}

/// Structured predicates: AND across properties, OR within each.
pub fn matches_properties(task: &Task, query: &ParsedQuery) -> bool {
    if !query.priority.is_empty() && !task.priority.is_some_and(|p| query.priority.contains(&p)) {
        return false;
    }
    if !query.status.is_empty() && !query.status.contains(&task.status_category) {
        return false;
    }
    if let Some(due) = &query.due_date
        && !due.matches(task.due_date)
    {
        return false;
    }
    if !query.tags.is_empty() && !query.tags.iter().any(|t| task.has_tag(t)) {
        return false;
    }
    if let Some(folder) = &query.folder
        && !task.is_in_folder(folder)
    {
        return false;
    }
    true
}
