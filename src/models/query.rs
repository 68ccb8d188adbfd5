//! Parsed representation of a single user query.

use serde::{Deserialize, Serialize};
use time::Date;

/// Language label used for keywords taken verbatim from the query text.
pub const QUERY_LANGUAGE: &str = "query";

/// A keyword variant produced by expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedKeyword {
    /// The atomic token to match against task text.
    pub keyword: String,
    /// Configured language that produced this variant, or `"query"`.
    pub language: String,
    /// Core keyword this variant expands.
    pub core: String,
}

impl ExpandedKeyword {
    /// Creates a new expanded keyword.
    pub fn new(
        keyword: impl Into<String>,
        language: impl Into<String>,
        core: impl Into<String>,
    ) -> Self {
        Self {
            keyword: keyword.into(),
            language: language.into(),
            core: core.into(),
        }
    }

    /// A core keyword standing in for itself, as used by the keyword-only path.
    pub fn verbatim(core: &str) -> Self {
        Self::new(core, QUERY_LANGUAGE, core)
    }
}

/// Comparison used by a due-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeOperator {
    /// Due on or before the end date, overdue tasks included.
    #[serde(rename = "<=")]
    OnOrBefore,
    /// Due within `[start, end]`, both inclusive.
    #[serde(rename = "between")]
    Between,
}

impl std::fmt::Display for RangeOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnOrBefore => write!(f, "<="),
            Self::Between => write!(f, "between"),
        }
    }
}

/// Inclusive due-date range, used only for vague queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueDateRange {
    pub operator: RangeOperator,
    /// Lower bound; only set for [`RangeOperator::Between`].
    pub start: Option<Date>,
    pub end: Date,
}

impl DueDateRange {
    /// Range matching anything due on or before `end`.
    pub fn on_or_before(end: Date) -> Self {
        Self {
            operator: RangeOperator::OnOrBefore,
            start: None,
            end,
        }
    }

    /// Range matching anything due within `[start, end]`.
    pub fn between(start: Date, end: Date) -> Self {
        Self {
            operator: RangeOperator::Between,
            start: Some(start),
            end,
        }
    }

    /// Returns true if `due` falls inside this range. Undated tasks never do.
    pub fn contains(&self, due: Option<Date>) -> bool {
        let Some(due) = due else {
            return false;
        };
        match self.operator {
            RangeOperator::OnOrBefore => due <= self.end,
            RangeOperator::Between => self.start.is_none_or(|s| due >= s) && due <= self.end,
        }
    }
}

/// One exact due-date condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DueCondition {
    /// Due on exactly this date.
    On { date: Date },
    /// Due within `[start, end]`.
    Within { start: Date, end: Date },
    /// Due strictly before this date (overdue).
    Before { date: Date },
    /// Due strictly after this date.
    After { date: Date },
    /// Has any due date.
    Any,
    /// Has no due date.
    Undated,
}

impl DueCondition {
    /// Returns true if `due` satisfies this condition.
    pub fn matches(&self, due: Option<Date>) -> bool {
        match (self, due) {
            (Self::Undated, None) => true,
            (Self::Undated, Some(_)) => false,
            (_, None) => false,
            (Self::On { date }, Some(d)) => d == *date,
            (Self::Within { start, end }, Some(d)) => d >= *start && d <= *end,
            (Self::Before { date }, Some(d)) => d < *date,
            (Self::After { date }, Some(d)) => d > *date,
            (Self::Any, Some(_)) => true,
        }
    }
}

/// Due-date constraint of a query.
///
/// Exact conditions and a vague-query range are alternatives of one enum, so
/// a query can never carry both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueDateFilter {
    /// Task matches if any condition holds ("today OR tomorrow").
    Matches(Vec<DueCondition>),
    /// Inclusive range for vague queries.
    Range(DueDateRange),
}

impl DueDateFilter {
    /// Returns true if a task with this due date passes the filter.
    pub fn matches(&self, due: Option<Date>) -> bool {
        match self {
            Self::Matches(conditions) => conditions.iter().any(|c| c.matches(due)),
            Self::Range(range) => range.contains(due),
        }
    }

    /// Returns the range, if this is a vague-query range.
    pub fn range(&self) -> Option<&DueDateRange> {
        match self {
            Self::Range(r) => Some(r),
            Self::Matches(_) => None,
        }
    }

    /// Merges another filter into this one. Exact conditions are OR'd; a
    /// range is kept over exact conditions.
    pub fn merge(self, other: DueDateFilter) -> DueDateFilter {
        match (self, other) {
            (Self::Matches(mut a), Self::Matches(b)) => {
                for c in b {
                    if !a.contains(&c) {
                        a.push(c);
                    }
                }
                Self::Matches(a)
            }
            (Self::Range(r), _) | (_, Self::Range(r)) => Self::Range(r),
        }
    }
}

/// Parsed form of one user query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Keywords taken from the query, ordered and deduplicated.
    pub core_keywords: Vec<String>,
    /// Superset of the core keywords including semantic variants.
    pub expanded_keywords: Vec<ExpandedKeyword>,
    /// Priority levels to match (OR).
    pub priority: Vec<u8>,
    /// Status category keys to match (OR).
    pub status: Vec<String>,
    /// Due-date constraint.
    pub due_date: Option<DueDateFilter>,
    /// Tags to match (OR).
    pub tags: Vec<String>,
    /// Folder the task's document must sit in.
    pub folder: Option<String>,
    /// Whether the query is an open-ended request.
    pub is_vague: bool,
    /// Relative-time word detected in the query, for diagnostics only.
    pub time_context_term: Option<String>,
    /// Lowercased tokens consumed by structured filters.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumed_terms: Vec<String>,
}

impl ParsedQuery {
    /// Returns true if the query carries any keyword.
    pub fn has_keywords(&self) -> bool {
        !self.core_keywords.is_empty() || !self.expanded_keywords.is_empty()
    }

    /// Adds a core keyword if not already present (case-insensitive).
    pub fn push_core(&mut self, keyword: &str) {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return;
        }
        if !self
            .core_keywords
            .iter()
            .any(|k| k.eq_ignore_ascii_case(keyword))
        {
            self.core_keywords.push(keyword.to_string());
        }
    }

    /// Records a token consumed by a structured filter.
    pub fn consume(&mut self, term: &str) {
        for word in term.split_whitespace() {
            let word = word.to_lowercase();
            if !self.consumed_terms.contains(&word) {
                self.consumed_terms.push(word);
            }
        }
    }

    /// Makes sure every core keyword is also an expanded keyword.
    pub fn ensure_core_expanded(&mut self) {
        for core in &self.core_keywords {
            if !self
                .expanded_keywords
                .iter()
                .any(|e| e.keyword.eq_ignore_ascii_case(core))
            {
                self.expanded_keywords.push(ExpandedKeyword::verbatim(core));
            }
        }
    }

    /// Drops every keyword that was also consumed as a structured filter.
    ///
    /// A token that narrowed the result set as a property must not score a
    /// second time as a keyword.
    pub fn enforce_exclusivity(&mut self) {
        if self.consumed_terms.is_empty() {
            return;
        }
        let consumed = &self.consumed_terms;
        self.core_keywords
            .retain(|k| !consumed.contains(&k.to_lowercase()));
        self.expanded_keywords.retain(|e| {
            !consumed.contains(&e.keyword.to_lowercase())
                && !consumed.contains(&e.core.to_lowercase())
        });
    }

    /// Clears keywords; vague queries carry no content to match on.
    pub fn clear_keywords(&mut self) {
        self.core_keywords.clear();
        self.expanded_keywords.clear();
    }

    /// Every distinct lowercased keyword to match (expanded plus core).
    pub fn match_terms(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let all = self
            .expanded_keywords
            .iter()
            .map(|e| e.keyword.as_str())
            .chain(self.core_keywords.iter().map(String::as_str));
        for term in all {
            let term = term.to_lowercase();
            if !term.is_empty() && !out.contains(&term) {
                out.push(term);
            }
        }
        out
    }

    /// Distinct languages represented among the expanded keywords.
    pub fn expansion_languages(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for e in &self.expanded_keywords {
            if !out.contains(&e.language) {
                out.push(e.language.clone());
            }
        }
        out
    }
}
