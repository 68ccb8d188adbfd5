//! Model-written summaries of ranked search results.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::llm::{CancellationToken, LlmClient, LlmError, LlmRequest, generate_cancellable};
use crate::models::TaskId;
use crate::parser::extract_json;
use crate::scoring::ScoredTask;

const SYSTEM_PROMPT: &str =
    "You help a user decide what to work on. Use only the tasks you are given.";

/// Prompt template for summarizing a ranked task list.
const PROMPT_TEMPLATE: &str = r#"The user searched their tasks and these matched, best first.

CRITICAL RULES:
1. ONLY use the tasks listed below - do not invent tasks
2. Refer to tasks by their ID
3. Recommend at most 5 tasks, most important first
4. Answer in the language of the user's query

USER QUERY:
{query}

TASKS:
{tasks_context}

Respond in JSON format:
{
  "summary": "Two or three sentences on what stands out and what to do first.",
  "recommended": [12, 7]
}

JSON OUTPUT:"#;

const MAX_TASK_TEXT: usize = 300;

/// Why a summary could not be produced.
#[derive(Debug, Error)]
pub enum SummaryFailure {
    #[error("Model request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Model request cancelled")]
    Cancelled,

    #[error("Model response is not usable: {0}")]
    MalformedJson(String),

    #[error("Model returned an empty summary")]
    Empty,
}

/// A model summary of the ranked tasks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub text: String,
    /// Recommended tasks, restricted to the tasks that were sent.
    pub recommended: Vec<TaskId>,
    /// Recommendations dropped because they named unknown tasks.
    pub dropped: usize,
}

/// Summarizes ranked results with a language model.
pub struct ResultSummarizer {
    client: Arc<dyn LlmClient>,
}

impl ResultSummarizer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Summarizes `tasks` for `query`.
    ///
    /// Only IDs present in `tasks` survive in [`Summary::recommended`].
    pub fn summarize(
        &self,
        query: &str,
        tasks: &[ScoredTask],
        cancel: &CancellationToken,
    ) -> Result<Summary, SummaryFailure> {
        let prompt = PROMPT_TEMPLATE
            .replace("{query}", query)
            .replace("{tasks_context}", &format_tasks_context(tasks));
        let request = LlmRequest::new(prompt)
            .with_system(SYSTEM_PROMPT)
            .expect_json();

        let response = generate_cancellable(Arc::clone(&self.client), request, cancel)
            .map_err(|e| match e {
                LlmError::Cancelled => SummaryFailure::Cancelled,
                other => SummaryFailure::Llm(other),
            })?;

        let json = extract_json(&response).ok_or_else(|| {
            SummaryFailure::MalformedJson("no JSON object in response".to_string())
        })?;
        let summary = parse_summary(&json)?;

        let valid: HashSet<TaskId> = tasks.iter().map(|s| s.task.id).collect();
        Ok(validate_recommendations(summary, &valid))
    }
}

/// Formats tasks into context for the prompt.
fn format_tasks_context(tasks: &[ScoredTask]) -> String {
    tasks
        .iter()
        .map(|scored| {
            let task = &scored.task;
            let text: String = task.text.chars().take(MAX_TASK_TEXT).collect();
            let mut line = format!("[TASK ID={}] {}", task.id, text);
            line.push_str(&format!("\n  status: {}", task.status_category));
            if let Some(p) = task.priority {
                line.push_str(&format!(", priority: {p}"));
            }
            if let Some(due) = task.due_date {
                line.push_str(&format!(", due: {due}"));
            }
            if !task.tags.is_empty() {
                line.push_str(&format!(", tags: {}", task.tags.join(", ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_summary(json: &str) -> Result<Summary, SummaryFailure> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| SummaryFailure::MalformedJson(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| SummaryFailure::MalformedJson("expected a JSON object".to_string()))?;

    let text = obj
        .get("summary")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or("")
        .to_string();
    if text.is_empty() {
        return Err(SummaryFailure::Empty);
    }

    // Models sometimes quote IDs; accept both forms.
    let recommended = obj
        .get("recommended")
        .and_then(|v| v.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|id| {
                    id.as_i64()
                        .or_else(|| id.as_str().and_then(|s| s.trim().parse().ok()))
                })
                .map(TaskId::new)
                .collect()
        })
        .unwrap_or_default();

    Ok(Summary {
        text,
        recommended,
        dropped: 0,
    })
}

/// Removes recommendations that name tasks outside the input set.
fn validate_recommendations(summary: Summary, valid: &HashSet<TaskId>) -> Summary {
    let before = summary.recommended.len();
    let mut seen = HashSet::new();
    let recommended: Vec<TaskId> = summary
        .recommended
        .into_iter()
        .filter(|id| valid.contains(id) && seen.insert(*id))
        .collect();
    let dropped = before - recommended.len();
    if dropped > 0 {
        tracing::warn!(dropped, "summary recommended unknown tasks");
    }
    Summary {
        text: summary.text,
        recommended,
        dropped,
    }
}
