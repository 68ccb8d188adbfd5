//! Model-assisted query parsing.
//!
//! The model recognizes properties written in any configured language and
//! expands core keywords into same-meaning variants. Its output is
//! untrusted: a response that violates the contract in any way is rejected
//! whole, and the caller falls back to deterministic parsing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::config::Settings;
use crate::llm::{CancellationToken, LlmClient, LlmError, LlmRequest, generate_cancellable};
use crate::models::{ExpandedKeyword, ParsedQuery};
use crate::query::{PropertyExtractor, TimeContextResolver, TimeTerm, describe_terms};
use crate::tags::TagNormalizer;
use crate::vocabulary::{Vocabulary, time_names};

const SYSTEM_PROMPT: &str = "You convert task-search queries into structured JSON. Reply with one JSON object and nothing else.";

const PROMPT_TEMPLATE: &str = r#"Analyze this task search query and return its structure.

QUERY:
{query}

RULES:
1. coreKeywords: the content words of the query, lowercase, one word each. Leave out stop words and every word you turn into a property below.
2. expandedKeywords: for EVERY core keyword and EVERY language in [{languages}], give up to {expansions} same-meaning variants as {"core": ..., "language": ..., "keyword": ...}. Each keyword is a single word without spaces. Include the core keyword itself under its own language.
3. priority: list of levels 1 (highest) to 4 (lowest) the query asks for, or [].
4. status: list of status keys from [{statuses}], or [].
5. dueDate: list of time names from [{time_names}] or dates as YYYY-MM-DD, or []. Name the term only, never compute dates.
6. tags: list of tags without '#', or []. folder: a folder path or null.
7. isVague: true if the query asks what to work on without naming any subject.
8. timeContext: the relative time name mentioned in the query, or null.

Status words: {status_vocabulary}
Stop words: {stop_words}

Respond in JSON format:
{
  "coreKeywords": ["fix", "bug"],
  "expandedKeywords": [{"core": "fix", "language": "English", "keyword": "repair"}],
  "priority": [],
  "status": [],
  "dueDate": [],
  "tags": [],
  "folder": null,
  "isVague": false,
  "timeContext": null
}

JSON OUTPUT:"#;

/// Why a semantic parse was rejected.
#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("Model request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Model request cancelled")]
    Cancelled,

    #[error("Model response is not JSON: {0}")]
    MalformedJson(String),

    #[error("Model response does not match the expected schema: {0}")]
    Schema(String),

    #[error("Model response violates the query contract: {0}")]
    Violation(String),
}

impl ParseFailure {
    fn violation(message: impl Into<String>) -> Self {
        Self::Violation(message.into())
    }
}

/// Everything a parse depends on besides the query text.
#[derive(Clone, Copy)]
pub struct ParseContext<'a> {
    pub settings: &'a Settings,
    pub vocabulary: &'a Vocabulary,
    pub resolver: TimeContextResolver,
}

/// A JSON field the model may send as one value, a list, or null.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(value: Option<Self>) -> Vec<T> {
        match value {
            None => Vec::new(),
            Some(Self::One(v)) => vec![v],
            Some(Self::Many(v)) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawExpansion {
    core: String,
    language: String,
    keyword: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    core_keywords: Vec<String>,
    #[serde(default)]
    expanded_keywords: Vec<RawExpansion>,
    #[serde(default)]
    priority: Option<OneOrMany<u8>>,
    #[serde(default)]
    status: Option<OneOrMany<String>>,
    #[serde(default)]
    due_date: Option<OneOrMany<String>>,
    #[serde(default)]
    tags: Option<OneOrMany<String>>,
    #[serde(default)]
    folder: Option<String>,
    is_vague: bool,
    #[serde(default)]
    time_context: Option<String>,
}

/// Parses queries with a language model.
pub struct SemanticQueryParser {
    client: Arc<dyn LlmClient>,
}

impl SemanticQueryParser {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Parses `text`, or explains why the model's answer cannot be used.
    ///
    /// Shorthand syntax is extracted locally first; only the residue is sent
    /// to the model. A query made entirely of shorthand never reaches it.
    pub fn parse(
        &self,
        text: &str,
        ctx: ParseContext<'_>,
        cancel: &CancellationToken,
    ) -> Result<ParsedQuery, ParseFailure> {
        let categories = &ctx.settings.status_categories;
        let extractor = PropertyExtractor::new(ctx.vocabulary, categories);
        let syntax = extractor.extract_syntax(text);

        if syntax.residual.is_empty() {
            let mut query = syntax.query;
            query.due_date = ctx.resolver.resolve_all(&syntax.time_terms, false);
            query.time_context_term = describe_terms(&syntax.time_terms);
            return Ok(query);
        }

        let prompt = build_prompt(&syntax.residual, ctx);
        let request = LlmRequest::new(prompt)
            .with_system(SYSTEM_PROMPT)
            .expect_json();
        let response = generate_cancellable(Arc::clone(&self.client), request, cancel)
            .map_err(|e| match e {
                LlmError::Cancelled => ParseFailure::Cancelled,
                other => ParseFailure::Llm(other),
            })?;

        let json = extract_json(&response)
            .ok_or_else(|| ParseFailure::MalformedJson("no JSON object in response".to_string()))?;
        let raw: RawResponse = serde_json::from_str(&json).map_err(|e| {
            if e.is_syntax() || e.is_eof() {
                ParseFailure::MalformedJson(e.to_string())
            } else {
                ParseFailure::Schema(e.to_string())
            }
        })?;

        let (mut query, model_terms) = validate(raw, ctx)?;

        // Shorthand syntax is merged in; an explicit folder replaces the model's.
        merge_unique(&mut query.priority, syntax.query.priority);
        merge_unique(&mut query.status, syntax.query.status);
        merge_unique(&mut query.tags, syntax.query.tags);
        if syntax.query.folder.is_some() {
            query.folder = syntax.query.folder;
        }
        for term in &syntax.query.consumed_terms {
            query.consume(term);
        }
        // Property phrases in the residue never count as keywords, even if
        // the model left them in.
        for term in extractor.extract(&syntax.residual).query.consumed_terms {
            query.consume(&term);
        }

        let mut time_terms = syntax.time_terms;
        merge_unique(&mut time_terms, model_terms);
        for term in &time_terms {
            query.consume(&term.name());
        }

        query.due_date = ctx.resolver.resolve_all(&time_terms, query.is_vague);
        query.time_context_term = query
            .time_context_term
            .take()
            .or_else(|| describe_terms(&time_terms));

        query.enforce_exclusivity();
        if query.is_vague {
            query.clear_keywords();
        } else {
            query.ensure_core_expanded();
        }

        tracing::info!(
            core = query.core_keywords.len(),
            expanded = query.expanded_keywords.len(),
            vague = query.is_vague,
            "semantic parse accepted"
        );
        Ok(query)
    }
}

fn build_prompt(residual: &str, ctx: ParseContext<'_>) -> String {
    let settings = ctx.settings;
    let statuses = settings
        .status_categories
        .categories()
        .iter()
        .map(|c| c.key.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let status_vocabulary = ctx
        .vocabulary
        .status_terms()
        .iter()
        .map(|(term, key)| format!("{term}={key}"))
        .collect::<Vec<_>>()
        .join(", ");
    let time_names = [
        time_names::TODAY,
        time_names::TOMORROW,
        time_names::YESTERDAY,
        time_names::OVERDUE,
        time_names::FUTURE,
        time_names::THIS_WEEK,
        time_names::NEXT_WEEK,
        time_names::LAST_WEEK,
        time_names::THIS_MONTH,
        time_names::NEXT_MONTH,
        time_names::ANY,
        time_names::NONE,
    ]
    .join(", ");
    let expansions = if settings.expansion_enabled {
        settings.expansions_per_language
    } else {
        1
    };

    PROMPT_TEMPLATE
        .replace("{query}", residual)
        .replace("{languages}", &settings.expansion_languages().join(", "))
        .replace("{expansions}", &expansions.to_string())
        .replace("{statuses}", &statuses)
        .replace("{time_names}", &time_names)
        .replace("{status_vocabulary}", &status_vocabulary)
        .replace("{stop_words}", &ctx.vocabulary.stop_word_list().join(", "))
}

/// Checks every field of a model response and converts it. Time terms are
/// returned unresolved.
fn validate(
    raw: RawResponse,
    ctx: ParseContext<'_>,
) -> Result<(ParsedQuery, Vec<TimeTerm>), ParseFailure> {
    let settings = ctx.settings;
    let languages = settings.expansion_languages();
    let mut query = ParsedQuery {
        is_vague: raw.is_vague,
        ..Default::default()
    };

    for keyword in &raw.core_keywords {
        let keyword = atomic(keyword, "core keyword")?;
        query.push_core(&keyword);
    }

    let mut per_slot: HashMap<(String, String), usize> = HashMap::new();
    for entry in raw.expanded_keywords {
        let keyword = atomic(&entry.keyword, "expanded keyword")?;
        let core = entry.core.trim().to_lowercase();
        if !query
            .core_keywords
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&core))
        {
            return Err(ParseFailure::violation(format!(
                "expansion '{keyword}' refers to unknown core keyword '{core}'"
            )));
        }
        let language = languages
            .iter()
            .find(|l| l.eq_ignore_ascii_case(entry.language.trim()))
            .ok_or_else(|| {
                ParseFailure::violation(format!("unconfigured language '{}'", entry.language))
            })?
            .clone();

        if !settings.expansion_enabled {
            continue;
        }
        let slot = per_slot.entry((core.clone(), language.clone())).or_default();
        let duplicate = query
            .expanded_keywords
            .iter()
            .any(|e| e.core == core && e.language == language && e.keyword == keyword);
        if duplicate || *slot >= settings.expansions_per_language {
            continue;
        }
        *slot += 1;
        query
            .expanded_keywords
            .push(ExpandedKeyword::new(keyword, language, core));
    }

    if settings.expansion_enabled && !query.is_vague {
        for core in &query.core_keywords {
            for language in &languages {
                if !per_slot.contains_key(&(core.clone(), language.clone())) {
                    return Err(ParseFailure::violation(format!(
                        "keyword '{core}' has no expansion in {language}"
                    )));
                }
            }
        }
    }

    for level in OneOrMany::into_vec(raw.priority) {
        if !(1..=4).contains(&level) {
            return Err(ParseFailure::violation(format!("priority {level} out of range")));
        }
        if !query.priority.contains(&level) {
            query.priority.push(level);
        }
    }

    for status in OneOrMany::into_vec(raw.status) {
        let key = settings
            .status_categories
            .resolve_term(&status)
            .ok_or_else(|| ParseFailure::violation(format!("unknown status '{status}'")))?
            .to_string();
        query.consume(&status);
        query.consume(&key);
        if !query.status.contains(&key) {
            query.status.push(key);
        }
    }

    for tag in OneOrMany::into_vec(raw.tags) {
        let tag = TagNormalizer::normalize_tag(&tag);
        if tag.is_empty() {
            continue;
        }
        query.consume(&tag);
        if !query.tags.contains(&tag) {
            query.tags.push(tag);
        }
    }

    query.folder = raw
        .folder
        .map(|f| f.trim().trim_matches('/').to_string())
        .filter(|f| !f.is_empty());

    let mut time_names = OneOrMany::into_vec(raw.due_date);
    if let Some(context) = raw.time_context.filter(|t| !t.trim().is_empty()) {
        if TimeTerm::parse(&context).is_none() {
            return Err(ParseFailure::violation(format!(
                "unknown time context '{context}'"
            )));
        }
        query.time_context_term = Some(context.trim().to_lowercase());
        // A named time context without a due filter still constrains the
        // due date.
        if time_names.is_empty() {
            time_names.push(context);
        }
    }
    let mut time_terms = Vec::new();
    for name in time_names {
        let term = TimeTerm::parse(&name)
            .ok_or_else(|| ParseFailure::violation(format!("unknown time term '{name}'")))?;
        if !time_terms.contains(&term) {
            time_terms.push(term);
        }
    }

    Ok((query, time_terms))
}

/// Lowercases a keyword and rejects empty or multi-word values.
fn atomic(keyword: &str, what: &str) -> Result<String, ParseFailure> {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return Err(ParseFailure::violation(format!("empty {what}")));
    }
    if keyword.chars().any(char::is_whitespace) {
        return Err(ParseFailure::violation(format!(
            "{what} '{keyword}' is not a single token"
        )));
    }
    Ok(keyword)
}

fn merge_unique<T: PartialEq>(into: &mut Vec<T>, from: Vec<T>) {
    for value in from {
        if !into.contains(&value) {
            into.push(value);
        }
    }
}

/// Extracts the outermost JSON object from model output, which may wrap it
/// in prose or code fences.
pub(crate) fn extract_json(response: &str) -> Option<String> {
    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;

    if start <= end {
        Some(trimmed[start..=end].to_string())
    } else {
        None
    }
}
