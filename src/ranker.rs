//! Multi-criteria ordering of scored tasks.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::StatusCategories;
use crate::scoring::ScoredTask;

/// One key of the configured sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortCriterion {
    /// Total score, highest first.
    Relevance,
    /// Earliest due date first, undated last.
    DueDate,
    /// Priority 1 first, no priority last.
    Priority,
    /// Status category table order.
    Status,
}

impl SortCriterion {
    pub fn default_order() -> Vec<SortCriterion> {
        vec![Self::Relevance, Self::DueDate, Self::Priority]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::DueDate => "due_date",
            Self::Priority => "priority",
            Self::Status => "status",
        }
    }
}

impl fmt::Display for SortCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortCriterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "relevance" | "score" => Ok(Self::Relevance),
            "due_date" | "due" => Ok(Self::DueDate),
            "priority" => Ok(Self::Priority),
            "status" => Ok(Self::Status),
            other => Err(format!("unknown sort criterion '{other}'")),
        }
    }
}

/// Orders scored tasks by a list of criteria.
pub struct Ranker<'a> {
    criteria: &'a [SortCriterion],
    categories: &'a StatusCategories,
}

impl<'a> Ranker<'a> {
    pub fn new(criteria: &'a [SortCriterion], categories: &'a StatusCategories) -> Self {
        Self {
            criteria,
            categories,
        }
    }

    /// Sorts in place. The sort is stable, so input order breaks every tie.
    pub fn rank(&self, tasks: &mut [ScoredTask]) {
        tasks.sort_by(|a, b| self.compare(a, b));
    }

    fn compare(&self, a: &ScoredTask, b: &ScoredTask) -> Ordering {
        for criterion in self.criteria {
            let ordering = match criterion {
                SortCriterion::Relevance => b.score.total_cmp(&a.score),
                SortCriterion::DueDate => none_last(a.task.due_date, b.task.due_date),
                SortCriterion::Priority => none_last(a.task.priority, b.task.priority),
                SortCriterion::Status => self
                    .categories
                    .order_of(&a.task.status_category)
                    .cmp(&self.categories.order_of(&b.task.status_category)),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

/// Ascending with `None` after every value.
fn none_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Task, TaskBuilder};
    use crate::scoring::ScoreBreakdown;
    use std::sync::Arc;
    use time::macros::date;

    fn scored(task: Task, score: f64) -> ScoredTask {
        ScoredTask {
            task: Arc::new(task),
            score,
            breakdown: ScoreBreakdown::default(),
        }
    }

    fn ids(tasks: &[ScoredTask]) -> Vec<i64> {
        tasks.iter().map(|s| s.task.id.get()).collect()
    }

    #[test]
    fn parses_and_displays_criteria() {
        assert_eq!("due-date".parse::<SortCriterion>().unwrap(), SortCriterion::DueDate);
        assert_eq!("Relevance".parse::<SortCriterion>().unwrap(), SortCriterion::Relevance);
        assert!("color".parse::<SortCriterion>().is_err());
        assert_eq!(SortCriterion::DueDate.to_string(), "due_date");
        assert_eq!(
            serde_json::to_string(&SortCriterion::default_order()).unwrap(),
            r#"["relevance","due_date","priority"]"#
        );
    }

    #[test]
    fn relevance_then_due_then_priority() {
        let categories = StatusCategories::default();
        let mut tasks = vec![
            scored(TaskBuilder::new().id(1).text("a").build(), 10.0),
            scored(TaskBuilder::new().id(2).text("b").due(date!(2025 - 02 - 01)).build(), 10.0),
            scored(TaskBuilder::new().id(3).text("c").due(date!(2025 - 01 - 20)).priority(3).build(), 10.0),
            scored(TaskBuilder::new().id(4).text("d").due(date!(2025 - 01 - 20)).priority(1).build(), 10.0),
            scored(TaskBuilder::new().id(5).text("e").build(), 12.0),
        ];
        Ranker::new(&SortCriterion::default_order(), &categories).rank(&mut tasks);
        assert_eq!(ids(&tasks), vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn ties_keep_input_order() {
        let categories = StatusCategories::default();
        let mut tasks: Vec<ScoredTask> = (1..=5)
            .map(|i| scored(TaskBuilder::new().id(i).text("same").build(), 1.0))
            .collect();
        Ranker::new(&SortCriterion::default_order(), &categories).rank(&mut tasks);
        assert_eq!(ids(&tasks), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn status_sorts_by_category_table_order() {
        let categories = StatusCategories::default();
        let mut tasks = vec![
            scored(TaskBuilder::new().id(1).text("a").status("completed").build(), 0.0),
            scored(TaskBuilder::new().id(2).text("b").status("open").build(), 0.0),
            scored(TaskBuilder::new().id(3).text("c").status("in_progress").build(), 0.0),
        ];
        Ranker::new(&[SortCriterion::Status], &categories).rank(&mut tasks);
        assert_eq!(ids(&tasks), vec![2, 3, 1]);
    }
}
