//! Multi-factor task scoring and quality thresholding.
//!
//! A task's score is the sum of up to four factor sub-scores (relevance, due
//! date, priority, status), each multiplied by its coefficient. A factor only
//! contributes when it is *active*: relevance when the query has keywords, the
//! others when the query filters on that dimension or the sort order uses it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Date, Duration};
use tracing::debug;

use crate::models::{ParsedQuery, StatusCategories, Task};
use crate::ranker::SortCriterion;

/// Sub-scores for each due-date bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DueBuckets {
    pub overdue: f64,
    /// Due today or within the next 7 days.
    pub within_week: f64,
    /// Due within the next 30 days.
    pub within_month: f64,
    pub later: f64,
    pub none: f64,
}

impl Default for DueBuckets {
    fn default() -> Self {
        Self {
            overdue: 1.5,
            within_week: 1.0,
            within_month: 0.5,
            later: 0.2,
            none: 0.1,
        }
    }
}

impl DueBuckets {
    pub fn score(&self, due: Option<Date>, today: Date) -> f64 {
        let Some(due) = due else {
            return self.none;
        };
        if due < today {
            self.overdue
        } else if due <= today + Duration::days(7) {
            self.within_week
        } else if due <= today + Duration::days(30) {
            self.within_month
        } else {
            self.later
        }
    }

    fn max(&self) -> f64 {
        [
            self.overdue,
            self.within_week,
            self.within_month,
            self.later,
            self.none,
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }

    fn values(&self) -> [f64; 5] {
        [
            self.overdue,
            self.within_week,
            self.within_month,
            self.later,
            self.none,
        ]
    }
}

/// Sub-scores per priority level, 1 being the highest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityScores {
    pub p1: f64,
    pub p2: f64,
    pub p3: f64,
    pub p4: f64,
    pub none: f64,
}

impl Default for PriorityScores {
    fn default() -> Self {
        Self {
            p1: 1.0,
            p2: 0.75,
            p3: 0.5,
            p4: 0.2,
            none: 0.1,
        }
    }
}

impl PriorityScores {
    pub fn score(&self, priority: Option<u8>) -> f64 {
        match priority {
            Some(1) => self.p1,
            Some(2) => self.p2,
            Some(3) => self.p3,
            Some(4) => self.p4,
            _ => self.none,
        }
    }

    fn values(&self) -> [f64; 5] {
        [self.p1, self.p2, self.p3, self.p4, self.none]
    }

    fn max(&self) -> f64 {
        self.values().into_iter().fold(0.0, f64::max)
    }
}

/// Factor coefficients and sub-score tables.
///
/// Status sub-scores live on the status categories themselves so that a
/// user-defined category carries its own score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub relevance: f64,
    pub due_date: f64,
    pub priority: f64,
    pub status: f64,
    /// Extra relevance for keywords found verbatim rather than via expansion.
    pub core_bonus: f64,
    pub due_buckets: DueBuckets,
    pub priority_levels: PriorityScores,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            relevance: 20.0,
            due_date: 4.0,
            priority: 1.0,
            status: 1.0,
            core_bonus: 0.2,
            due_buckets: DueBuckets::default(),
            priority_levels: PriorityScores::default(),
        }
    }
}

impl ScoringWeights {
    /// Checks every number is finite and non-negative.
    pub fn validate(&self) -> Result<(), String> {
        let named = [
            ("relevance", self.relevance),
            ("due_date", self.due_date),
            ("priority", self.priority),
            ("status", self.status),
            ("core_bonus", self.core_bonus),
        ];
        for (name, value) in named {
            check_weight(name, value)?;
        }
        for value in self.due_buckets.values() {
            check_weight("due_buckets", value)?;
        }
        for value in self.priority_levels.values() {
            check_weight("priority_levels", value)?;
        }
        Ok(())
    }

    /// Highest relevance sub-score: every group hit plus the full bonus.
    pub fn max_relevance(&self) -> f64 {
        1.0 + self.core_bonus
    }
}

fn check_weight(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{name} must be a non-negative number, got {value}"));
    }
    Ok(())
}

/// Which factors contribute for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Activation {
    pub relevance: bool,
    pub due_date: bool,
    pub priority: bool,
    pub status: bool,
}

impl Activation {
    pub fn for_query(query: &ParsedQuery, sort: &[SortCriterion]) -> Self {
        Self {
            relevance: query.has_keywords(),
            due_date: query.due_date.is_some() || sort.contains(&SortCriterion::DueDate),
            priority: !query.priority.is_empty() || sort.contains(&SortCriterion::Priority),
            status: !query.status.is_empty() || sort.contains(&SortCriterion::Status),
        }
    }
}

/// Per-factor detail of one task's score.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub relevance: f64,
    pub due_date: f64,
    pub priority: f64,
    pub status: f64,
    /// Core keywords found verbatim in the text.
    pub core_hits: usize,
    /// Core keywords matched by themselves or any of their expansions.
    pub group_hits: usize,
    pub core_total: usize,
    pub active: Activation,
}

/// A task annotated with its score. The task itself is never modified.
#[derive(Debug, Clone)]
pub struct ScoredTask {
    pub task: Arc<Task>,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// Computes scores for tasks against one parsed query.
pub struct Scorer<'a> {
    weights: &'a ScoringWeights,
    categories: &'a StatusCategories,
    activation: Activation,
    groups: Vec<KeywordGroup>,
    today: Date,
}

/// A core keyword and every term that counts as a hit for it.
struct KeywordGroup {
    core: String,
    terms: Vec<String>,
}

fn keyword_groups(query: &ParsedQuery) -> Vec<KeywordGroup> {
    let mut groups: Vec<KeywordGroup> = query
        .core_keywords
        .iter()
        .map(|core| KeywordGroup {
            core: core.to_lowercase(),
            terms: vec![core.to_lowercase()],
        })
        .collect();

    for expanded in &query.expanded_keywords {
        let core = expanded.core.to_lowercase();
        let keyword = expanded.keyword.to_lowercase();
        let index = match groups.iter().position(|g| g.core == core) {
            Some(index) => index,
            None => {
                groups.push(KeywordGroup {
                    core: core.clone(),
                    terms: vec![core],
                });
                groups.len() - 1
            }
        };
        if !groups[index].terms.contains(&keyword) {
            groups[index].terms.push(keyword);
        }
    }
    groups.retain(|g| !g.core.is_empty());
    groups
}

impl<'a> Scorer<'a> {
    pub fn new(
        weights: &'a ScoringWeights,
        categories: &'a StatusCategories,
        query: &ParsedQuery,
        sort: &[SortCriterion],
        today: Date,
    ) -> Self {
        Self {
            weights,
            categories,
            activation: Activation::for_query(query, sort),
            groups: keyword_groups(query),
            today,
        }
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Highest score any task could reach under the active factors.
    pub fn theoretical_max(&self) -> f64 {
        let w = self.weights;
        let mut max = 0.0;
        if self.activation.relevance {
            max += w.max_relevance() * w.relevance;
        }
        if self.activation.due_date {
            max += w.due_buckets.max() * w.due_date;
        }
        if self.activation.priority {
            max += w.priority_levels.max() * w.priority;
        }
        if self.activation.status {
            max += self.categories.max_score() * w.status;
        }
        max
    }

    fn relevance(&self, text: &str) -> (f64, usize, usize) {
        if self.groups.is_empty() {
            return (0.0, 0, 0);
        }
        let text = text.to_lowercase();
        let core_hits = self
            .groups
            .iter()
            .filter(|g| text.contains(g.core.as_str()))
            .count();
        let group_hits = self
            .groups
            .iter()
            .filter(|g| g.terms.iter().any(|t| text.contains(t.as_str())))
            .count();
        let total = self.groups.len() as f64;
        let score =
            group_hits as f64 / total + self.weights.core_bonus * (core_hits as f64 / total);
        (score, core_hits, group_hits)
    }

    pub fn score(&self, task: &Arc<Task>) -> ScoredTask {
        let w = self.weights;
        let a = self.activation;
        let (relevance, core_hits, group_hits) = self.relevance(&task.text);
        let breakdown = ScoreBreakdown {
            relevance,
            due_date: w.due_buckets.score(task.due_date, self.today),
            priority: w.priority_levels.score(task.priority),
            status: self.categories.score_of(&task.status_category),
            core_hits,
            group_hits,
            core_total: self.groups.len(),
            active: a,
        };

        let factor = |on: bool, sub: f64, coefficient: f64| if on { sub * coefficient } else { 0.0 };
        let score = factor(a.relevance, breakdown.relevance, w.relevance)
            + factor(a.due_date, breakdown.due_date, w.due_date)
            + factor(a.priority, breakdown.priority, w.priority)
            + factor(a.status, breakdown.status, w.status);

        ScoredTask {
            task: Arc::clone(task),
            score,
            breakdown,
        }
    }

    pub fn score_all(&self, tasks: &[Arc<Task>]) -> Vec<ScoredTask> {
        tasks.iter().map(|t| self.score(t)).collect()
    }
}

/// How the quality threshold was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityMode {
    /// Strength derived from the keyword count, with the safety valve.
    Adaptive,
    /// User-configured strength or minimum relevance, honored strictly.
    Explicit,
}

/// What the quality filter did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityStats {
    pub mode: QualityMode,
    pub strength: f64,
    pub theoretical_max: f64,
    pub threshold: f64,
    pub before: usize,
    pub after: usize,
    pub safety_valve: bool,
}

/// Adaptive strength for a given number of distinct keywords.
///
/// Broad expansions match many tasks loosely, so more keywords means a
/// gentler threshold.
pub fn adaptive_strength(keyword_count: usize) -> f64 {
    match keyword_count {
        0 => 0.0,
        n if n >= 20 => 0.1,
        n if n >= 10 => 0.2,
        _ => 0.3,
    }
}

/// Drops low-scoring tasks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityFilter {
    /// Fraction of the theoretical maximum; 0 selects adaptive mode.
    pub strength: f64,
    /// Minimum relevance sub-score when keywords exist; 0 disables it.
    pub min_relevance: f64,
    /// Result count the safety valve tries to preserve in adaptive mode.
    pub requested: usize,
}

impl QualityFilter {
    pub fn is_adaptive(&self) -> bool {
        self.strength <= 0.0 && self.min_relevance <= 0.0
    }

    /// Applies the threshold. Applying it again to its own output with the
    /// same inputs returns the same set.
    pub fn apply(
        &self,
        scored: Vec<ScoredTask>,
        theoretical_max: f64,
        keyword_count: usize,
    ) -> (Vec<ScoredTask>, QualityStats) {
        let before = scored.len();
        let adaptive = self.is_adaptive();
        let strength = if adaptive {
            adaptive_strength(keyword_count)
        } else {
            self.strength.clamp(0.0, 1.0)
        };
        let threshold = strength * theoretical_max;
        let min_relevance = if keyword_count > 0 {
            self.min_relevance
        } else {
            0.0
        };

        let passes = |s: &ScoredTask| {
            s.score >= threshold
                && (min_relevance <= 0.0 || s.breakdown.relevance >= min_relevance)
        };
        let passing = scored.iter().filter(|s| passes(s)).count();

        let mut safety_valve = false;
        let kept = if adaptive && passing < self.requested.min(before) {
            safety_valve = passing < before;
            top_n(scored, self.requested)
        } else {
            scored.into_iter().filter(|s| passes(s)).collect()
        };

        let stats = QualityStats {
            mode: if adaptive {
                QualityMode::Adaptive
            } else {
                QualityMode::Explicit
            },
            strength,
            theoretical_max,
            threshold,
            before,
            after: kept.len(),
            safety_valve,
        };
        debug!(
            mode = ?stats.mode,
            strength,
            threshold,
            before,
            after = stats.after,
            safety_valve,
            "quality filter applied"
        );
        (kept, stats)
    }
}

/// Keeps the `n` highest-scoring tasks, preserving their input order.
fn top_n(scored: Vec<ScoredTask>, n: usize) -> Vec<ScoredTask> {
    if scored.len() <= n {
        return scored;
    }
    let mut order: Vec<usize> = (0..scored.len()).collect();
    order.sort_by(|&a, &b| scored[b].score.total_cmp(&scored[a].score));
    let mut keep = vec![false; scored.len()];
    for &i in order.iter().take(n) {
        keep[i] = true;
    }
    scored
        .into_iter()
        .zip(keep)
        .filter_map(|(s, k)| k.then_some(s))
        .collect()
}
