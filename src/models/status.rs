use serde::{Deserialize, Serialize};

/// Key of the fallback category every unrecognized status resolves to.
pub const OTHER_CATEGORY: &str = "other";

/// One user-configurable status category.
///
/// Categories are data, not code: adding a category means adding an entry
/// to [`StatusCategories`], nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCategory {
    /// Stable key used in filters and score tables, e.g. `in_progress`.
    pub key: String,
    /// Human-readable name.
    pub display_name: String,
    /// Checkbox symbols mapping to this category.
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Extra words a query may use to name this category, in any language.
    #[serde(default)]
    pub query_terms: Vec<String>,
    /// Status sub-score used by the scoring engine.
    pub score: f64,
}

impl StatusCategory {
    /// Creates a category with the given key, name, symbols and score.
    pub fn new(key: &str, display_name: &str, symbols: &[&str], score: f64) -> Self {
        Self {
            key: key.to_string(),
            display_name: display_name.to_string(),
            symbols: symbols.iter().map(|s| (*s).to_string()).collect(),
            query_terms: Vec::new(),
            score,
        }
    }

    /// Adds query terms naming this category.
    pub fn with_terms(mut self, terms: &[&str]) -> Self {
        self.query_terms
            .extend(terms.iter().map(|t| (*t).to_string()));
        self
    }
}

/// Ordered, runtime-extensible table of status categories.
///
/// Order matters: the ranker uses a category's position as its sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCategories(Vec<StatusCategory>);

impl Default for StatusCategories {
    fn default() -> Self {
        Self(vec![
            StatusCategory::new("open", "Open", &[" "], 1.0).with_terms(&[
                "todo", "to-do", "incomplete", "pending", "unfinished", "未完成", "待办", "öppen",
                "öppna",
            ]),
            StatusCategory::new("in_progress", "In progress", &["/"], 0.75).with_terms(&[
                "in progress",
                "in-progress",
                "doing",
                "ongoing",
                "started",
                "进行中",
                "pågående",
            ]),
            StatusCategory::new("completed", "Completed", &["x", "X"], 0.2).with_terms(&[
                "done", "finished", "已完成", "klar", "klara", "avklarad",
            ]),
            StatusCategory::new("cancelled", "Cancelled", &["-"], 0.1).with_terms(&[
                "canceled",
                "abandoned",
                "dropped",
                "已取消",
                "avbruten",
            ]),
            StatusCategory::new(OTHER_CATEGORY, "Other", &[], 0.5),
        ])
    }
}

impl StatusCategories {
    /// Creates a table from an explicit list of categories.
    pub fn new(categories: Vec<StatusCategory>) -> Self {
        Self(categories)
    }

    /// Returns all categories in configured order.
    pub fn categories(&self) -> &[StatusCategory] {
        &self.0
    }

    /// Appends a category, replacing any existing one with the same key.
    pub fn insert(&mut self, category: StatusCategory) {
        match self.0.iter_mut().find(|c| c.key == category.key) {
            Some(existing) => *existing = category,
            None => self.0.push(category),
        }
    }

    /// Looks up a category by key.
    pub fn get(&self, key: &str) -> Option<&StatusCategory> {
        self.0.iter().find(|c| c.key == key)
    }

    /// Returns true if `key` names a configured category.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some() || key == OTHER_CATEGORY
    }

    /// Maps a checkbox symbol to a category key.
    ///
    /// Unrecognized symbols resolve to [`OTHER_CATEGORY`].
    pub fn category_for_symbol(&self, symbol: &str) -> &str {
        self.0
            .iter()
            .find(|c| c.symbols.iter().any(|s| s == symbol))
            .map(|c| c.key.as_str())
            .unwrap_or(OTHER_CATEGORY)
    }

    /// Resolves a query word or phrase to a category key.
    ///
    /// Matches the key itself (with `_`, `-` and spaces treated alike), the
    /// display name, or any configured query term, case-insensitively.
    pub fn resolve_term(&self, term: &str) -> Option<&str> {
        let wanted = canonical(term);
        if wanted.is_empty() {
            return None;
        }
        self.0
            .iter()
            .find(|c| {
                canonical(&c.key) == wanted
                    || canonical(&c.display_name) == wanted
                    || c.query_terms.iter().any(|t| canonical(t) == wanted)
            })
            .map(|c| c.key.as_str())
    }

    /// Returns every (term, key) pair a query may use, including keys and
    /// display names. The fallback category is never named by free text.
    pub fn query_vocabulary(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        for category in self.0.iter().filter(|c| c.key != OTHER_CATEGORY) {
            let mut push = |term: &str| {
                let term = term.trim().to_lowercase();
                if !term.is_empty() && !out.iter().any(|(t, _)| *t == term) {
                    out.push((term, category.key.clone()));
                }
            };
            push(&category.key);
            push(&category.key.replace('_', " "));
            push(&category.display_name);
            for t in &category.query_terms {
                push(t);
            }
        }
        out
    }

    /// Position of a category in the configured order; unknown keys sort last.
    pub fn order_of(&self, key: &str) -> usize {
        self.0
            .iter()
            .position(|c| c.key == key)
            .unwrap_or(self.0.len())
    }

    /// Status sub-score for a category; unknown keys use the `other` score.
    pub fn score_of(&self, key: &str) -> f64 {
        self.get(key)
            .or_else(|| self.get(OTHER_CATEGORY))
            .map(|c| c.score)
            .unwrap_or(0.0)
    }

    /// Highest configured status sub-score.
    pub fn max_score(&self) -> f64 {
        self.0.iter().map(|c| c.score).fold(0.0, f64::max)
    }
}

fn canonical(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
