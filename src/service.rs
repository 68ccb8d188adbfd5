use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Arc;

use lru::LruCache;
use serde::Serialize;
use thiserror::Error;
use time::Date;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, Settings};
use crate::filter::{FilterPipeline, FilterSet, FilterWarning, RuleSet, StageCounts};
use crate::index::{IndexState, Snapshot, TaskIndex};
use crate::llm::{CancellationToken, LlmClient};
use crate::models::{ParsedQuery, TaskId};
use crate::parser::{ParseContext, ParseFailure, SemanticQueryParser};
use crate::query::{KeywordQueryParser, TimeContextResolver, local_today};
use crate::ranker::Ranker;
use crate::scoring::{QualityFilter, QualityStats, ScoreBreakdown, ScoredTask, Scorer};
use crate::summarizer::{ResultSummarizer, Summary, SummaryFailure};
use crate::vocabulary::Vocabulary;

/// How much model assistance a search uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Deterministic parsing only; never touches the network.
    #[default]
    Simple,
    /// Model-assisted parsing, no summary.
    Smart,
    /// Model-assisted parsing plus a summary of the results.
    Chat,
}

impl SearchMode {
    pub fn uses_model(self) -> bool {
        !matches!(self, Self::Simple)
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Smart => write!(f, "smart"),
            Self::Chat => write!(f, "chat"),
        }
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "smart" => Ok(Self::Smart),
            "chat" => Ok(Self::Chat),
            other => Err(format!(
                "unknown mode '{other}' (expected simple, smart or chat)"
            )),
        }
    }
}

/// Which parser produced the query that was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseTier {
    Semantic,
    Deterministic,
}

/// What happened to the optional summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryTier {
    /// The mode does not summarize, or there was nothing to summarize.
    NotRequested,
    Generated,
    Failed,
    Cancelled,
}

/// Keyword expansion counts for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpansionStats {
    pub core_keywords: usize,
    pub expanded_keywords: usize,
    /// Expanded keywords per language, in first-seen order.
    pub per_language: Vec<(String, usize)>,
}

impl ExpansionStats {
    fn of(query: &ParsedQuery) -> Self {
        let mut per_language: Vec<(String, usize)> = Vec::new();
        for expanded in &query.expanded_keywords {
            match per_language.iter_mut().find(|(l, _)| *l == expanded.language) {
                Some((_, count)) => *count += 1,
                None => per_language.push((expanded.language.clone(), 1)),
            }
        }
        Self {
            core_keywords: query.core_keywords.len(),
            expanded_keywords: query.expanded_keywords.len(),
            per_language,
        }
    }
}

/// Readiness of the task index at search time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexStatus {
    Ready { version: u64, tasks: usize },
    NotReady { reason: String },
    /// The task store failed.
    Unavailable { reason: String },
}

/// Everything a caller may want to know about how a search was answered.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub mode: SearchMode,
    pub parse_tier: ParseTier,
    /// Why the semantic parse was not used, when it was attempted.
    pub parse_fallback: Option<String>,
    pub summary_tier: SummaryTier,
    /// Why no summary is shown, when one was requested.
    pub summary_error: Option<String>,
    pub expansion: ExpansionStats,
    pub stages: StageCounts,
    pub quality: Option<QualityStats>,
    /// Score detail of the first result.
    pub top_breakdown: Option<ScoreBreakdown>,
    pub index: IndexStatus,
    pub cache_hit: bool,
    /// User-facing explanation of any degradation.
    pub disclosure: Option<String>,
}

impl Diagnostics {
    fn new(mode: SearchMode, index: IndexStatus) -> Self {
        Self {
            mode,
            parse_tier: ParseTier::Deterministic,
            parse_fallback: None,
            summary_tier: SummaryTier::NotRequested,
            summary_error: None,
            expansion: ExpansionStats::default(),
            stages: StageCounts::default(),
            quality: None,
            top_breakdown: None,
            index,
            cache_hit: false,
            disclosure: None,
        }
    }

    fn disclose(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.disclosure = Some(match self.disclosure.take() {
            Some(existing) => format!("{existing} {text}"),
            None => text,
        });
    }
}

/// Result of one search.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    /// The query that was executed.
    pub query: ParsedQuery,
    /// Ranked tasks, cut to `max_direct_results`.
    pub tasks: Vec<ScoredTask>,
    /// Tasks that matched before the display cut.
    pub total_matches: usize,
    pub summary: Option<Summary>,
    pub diagnostics: Diagnostics,
    pub warnings: Vec<FilterWarning>,
}

impl SearchResponse {
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|s| s.task.id).collect()
    }
}

/// Errors a search returns instead of results.
///
/// Parse and summary failures are never errors; they degrade the response.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Filtered, scored and ranked tasks for one query.
#[derive(Debug, Clone)]
struct Evaluation {
    ranked: Vec<ScoredTask>,
    stages: StageCounts,
    quality: QualityStats,
}

type CacheKey = (u64, u64, u64);

/// Distinct queries remembered per snapshot and configuration.
const CACHE_CAPACITY: NonZeroUsize =
    NonZeroUsize::new(128).expect("cache capacity must be non-zero");

/// Scored results keyed by (snapshot version, config fingerprint, query
/// fingerprint). Least recently used queries are evicted; everything is
/// dropped when the version or config changes.
struct SearchCache {
    scope: Option<(u64, u64)>,
    entries: LruCache<CacheKey, Evaluation>,
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }
}

impl SearchCache {
    fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            scope: None,
            entries: LruCache::new(capacity),
        }
    }

    fn get(&mut self, key: CacheKey) -> Option<Evaluation> {
        if self.scope != Some((key.0, key.1)) {
            if !self.entries.is_empty() {
                debug!(entries = self.entries.len(), "search cache cleared");
            }
            self.entries.clear();
            self.scope = Some((key.0, key.1));
        }
        self.entries.get(&key).cloned()
    }

    fn insert(&mut self, key: CacheKey, evaluation: Evaluation) {
        self.entries.put(key, evaluation);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.scope = None;
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn hash_json<T: Serialize>(value: &T, extra: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(value).unwrap_or_default().hash(&mut hasher);
    extra.hash(&mut hasher);
    hasher.finish()
}

/// Builder for [`TaskSearchService`].
pub struct TaskSearchServiceBuilder {
    settings: Settings,
    index: Option<Arc<dyn TaskIndex>>,
    client: Option<Arc<dyn LlmClient>>,
    inclusions: Option<RuleSet>,
    today: Option<Date>,
}

impl TaskSearchServiceBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            index: None,
            client: None,
            inclusions: None,
            today: None,
        }
    }

    pub fn index(mut self, index: Arc<dyn TaskIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Sets the model backend used by the smart and chat modes.
    pub fn client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Session inclusions; defaults to the configured inclusions.
    pub fn inclusions(mut self, inclusions: RuleSet) -> Self {
        self.inclusions = Some(inclusions);
        self
    }

    /// Pins "today" instead of reading the local clock.
    pub fn today(mut self, today: Date) -> Self {
        self.today = Some(today);
        self
    }

    pub fn build(self) -> Result<TaskSearchService, ConfigError> {
        self.settings.validate()?;
        let index = self.index.ok_or_else(|| {
            ConfigError::invalid("index", "a task index is required")
        })?;
        let base = FilterSet::from_rules(&self.settings.filters);
        let filters = match self.inclusions {
            Some(inclusions) => base.with_inclusions(inclusions),
            None => base,
        };
        let mut service = TaskSearchService {
            vocabulary: self.settings.vocabulary(),
            settings: self.settings,
            index,
            client: self.client,
            filters,
            today: self.today,
            config_fingerprint: 0,
            cache: SearchCache::default(),
        };
        service.refresh_fingerprint();
        Ok(service)
    }
}

/// Answers task queries over an index snapshot.
///
/// Stage A always yields a ranked list: a semantic parse if one is available
/// and valid, the deterministic parse otherwise. Stage B adds an optional
/// summary and never removes Stage A results.
pub struct TaskSearchService {
    settings: Settings,
    vocabulary: Vocabulary,
    index: Arc<dyn TaskIndex>,
    client: Option<Arc<dyn LlmClient>>,
    filters: FilterSet,
    today: Option<Date>,
    config_fingerprint: u64,
    cache: SearchCache,
}

impl TaskSearchService {
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    /// Replaces the settings. The cache is cleared.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        self.filters =
            FilterSet::from_rules(&settings.filters).with_inclusions(self.filters.inclusions().clone());
        self.vocabulary = settings.vocabulary();
        self.settings = settings;
        self.refresh_fingerprint();
        self.cache.clear();
        Ok(())
    }

    /// Replaces the session inclusions and returns any conflicts with the
    /// global exclusions.
    pub fn set_inclusions(&mut self, inclusions: RuleSet) -> Vec<FilterWarning> {
        self.filters = self.filters.with_inclusions(inclusions);
        self.refresh_fingerprint();
        self.cache.clear();
        let warnings = self.filters.conflicts();
        for warning in &warnings {
            warn!("{warning}");
        }
        warnings
    }

    fn refresh_fingerprint(&mut self) {
        self.config_fingerprint = hash_json(self.filters.inclusions(), self.settings.fingerprint());
    }

    fn today(&self) -> Date {
        self.today.unwrap_or_else(local_today)
    }

    fn resolver(&self) -> TimeContextResolver {
        TimeContextResolver::new(self.today(), self.settings.week_start)
    }

    /// Parses `text` without the model.
    pub fn parse_deterministic(&self, text: &str) -> ParsedQuery {
        KeywordQueryParser::new(
            &self.vocabulary,
            &self.settings.status_categories,
            self.resolver(),
            self.settings.vague_threshold,
        )
        .parse(text)
        .query
    }

    fn parse_semantic(
        &self,
        client: &Arc<dyn LlmClient>,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<ParsedQuery, ParseFailure> {
        let ctx = ParseContext {
            settings: &self.settings,
            vocabulary: &self.vocabulary,
            resolver: self.resolver(),
        };
        SemanticQueryParser::new(Arc::clone(client)).parse(text, ctx, cancel)
    }

    /// Runs one search.
    ///
    /// Only configuration problems are errors. An index that is not ready
    /// yields an empty response with [`IndexStatus::NotReady`]; a failing
    /// store yields [`IndexStatus::Unavailable`].
    pub fn search(
        &mut self,
        text: &str,
        mode: SearchMode,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse, SearchError> {
        let client = if mode.uses_model() {
            let client = self.client.clone().ok_or_else(|| ConfigError::MissingModel {
                provider: self.settings.provider.kind.to_string(),
            })?;
            Some(client)
        } else {
            None
        };

        let (status, disclosure) = match self.index.snapshot() {
            IndexState::Ready(snapshot) => {
                return self.search_snapshot(text, mode, cancel, client, snapshot);
            }
            IndexState::NotReady { reason } => {
                info!(%reason, "task index not ready");
                let disclosure = format!("Task index is not ready: {reason}.");
                (IndexStatus::NotReady { reason }, disclosure)
            }
            IndexState::Unavailable { reason } => {
                warn!(%reason, "task store unavailable");
                let disclosure = format!("Task store is unavailable: {reason}.");
                (IndexStatus::Unavailable { reason }, disclosure)
            }
        };
        let mut diagnostics = Diagnostics::new(mode, status);
        diagnostics.disclose(disclosure);
        Ok(SearchResponse {
            query: ParsedQuery::default(),
            tasks: Vec::new(),
            total_matches: 0,
            summary: None,
            diagnostics,
            warnings: self.filters.conflicts(),
        })
    }

    fn search_snapshot(
        &mut self,
        text: &str,
        mode: SearchMode,
        cancel: &CancellationToken,
        client: Option<Arc<dyn LlmClient>>,
        snapshot: Snapshot,
    ) -> Result<SearchResponse, SearchError> {
        let mut diagnostics = Diagnostics::new(
            mode,
            IndexStatus::Ready {
                version: snapshot.version,
                tasks: snapshot.len(),
            },
        );

        // Stage A: a parsed query and a ranked list, whatever fails.
        let mut query = match &client {
            Some(client) => match self.parse_semantic(client, text, cancel) {
                Ok(query) => {
                    diagnostics.parse_tier = ParseTier::Semantic;
                    query
                }
                Err(failure) => {
                    warn!(error = %failure, "semantic parse failed; using keyword parsing");
                    diagnostics.parse_fallback = Some(failure.to_string());
                    diagnostics.disclose("Smart parsing was unavailable, so keyword matching was used.");
                    self.parse_deterministic(text)
                }
            },
            None => self.parse_deterministic(text),
        };

        let (mut evaluation, mut cache_hit) = self.evaluate(&query, &snapshot);

        if diagnostics.parse_tier == ParseTier::Semantic && evaluation.ranked.is_empty() {
            let fallback = self.parse_deterministic(text);
            let (alternative, hit) = self.evaluate(&fallback, &snapshot);
            if !alternative.ranked.is_empty() {
                info!(
                    matches = alternative.ranked.len(),
                    "semantic interpretation matched nothing; showing keyword matches"
                );
                diagnostics.parse_tier = ParseTier::Deterministic;
                diagnostics.parse_fallback =
                    Some("semantic interpretation matched no tasks".to_string());
                diagnostics.disclose(
                    "The smart interpretation matched no tasks, so keyword matches are shown instead.",
                );
                query = fallback;
                evaluation = alternative;
                cache_hit = hit;
            }
        }

        diagnostics.cache_hit = cache_hit;
        diagnostics.expansion = ExpansionStats::of(&query);
        diagnostics.stages = evaluation.stages;
        diagnostics.quality = Some(evaluation.quality.clone());
        diagnostics.top_breakdown = evaluation.ranked.first().map(|s| s.breakdown.clone());

        let total_matches = evaluation.ranked.len();
        let mut tasks = evaluation.ranked;

        // Stage B: optional summary over the top of the ranked list.
        let mut summary = None;
        if let (SearchMode::Chat, Some(client)) = (mode, &client) {
            if tasks.is_empty() {
                diagnostics.summary_error = Some("no tasks to summarize".to_string());
            } else {
                let limit = self.settings.max_tasks_for_ai.min(tasks.len());
                match ResultSummarizer::new(Arc::clone(client)).summarize(text, &tasks[..limit], cancel) {
                    Ok(s) => {
                        diagnostics.summary_tier = SummaryTier::Generated;
                        summary = Some(s);
                    }
                    Err(SummaryFailure::Cancelled) => {
                        diagnostics.summary_tier = SummaryTier::Cancelled;
                        diagnostics.summary_error = Some("summary cancelled".to_string());
                        diagnostics.disclose("The summary was cancelled; results are shown without it.");
                    }
                    Err(failure) => {
                        warn!(error = %failure, "summary failed; returning ranked results");
                        diagnostics.summary_tier = SummaryTier::Failed;
                        diagnostics.summary_error = Some(failure.to_string());
                        diagnostics.disclose("The summary could not be generated; results are shown without it.");
                    }
                }
            }
        }

        tasks.truncate(self.settings.max_direct_results);
        info!(
            mode = %mode,
            tier = ?diagnostics.parse_tier,
            shown = tasks.len(),
            total_matches,
            "search finished"
        );

        Ok(SearchResponse {
            query,
            tasks,
            total_matches,
            summary,
            diagnostics,
            warnings: self.filters.conflicts(),
        })
    }

    /// Filters, scores, thresholds and ranks, reusing cached work.
    fn evaluate(&mut self, query: &ParsedQuery, snapshot: &Snapshot) -> (Evaluation, bool) {
        let today = self.today();
        let key = (
            snapshot.version,
            self.config_fingerprint,
            hash_json(query, today.to_julian_day()),
        );
        if let Some(cached) = self.cache.get(key) {
            debug!("search cache hit");
            return (cached, true);
        }

        let settings = &self.settings;
        let outcome = FilterPipeline::new(&self.filters).run(&snapshot.tasks, query);
        let scorer = Scorer::new(
            &settings.weights,
            &settings.status_categories,
            query,
            &settings.sort_criteria,
            today,
        );
        let scored = scorer.score_all(&outcome.tasks);
        let quality_filter = QualityFilter {
            strength: settings.quality_filter_strength,
            min_relevance: settings.min_relevance,
            requested: settings.max_direct_results,
        };
        let (mut ranked, quality) =
            quality_filter.apply(scored, scorer.theoretical_max(), query.match_terms().len());
        Ranker::new(&settings.sort_criteria, &settings.status_categories).rank(&mut ranked);

        let evaluation = Evaluation {
            ranked,
            stages: outcome.counts,
            quality,
        };
        self.cache.insert(key, evaluation.clone());
        (evaluation, false)
    }
}

#[cfg(test)]
mod tests;
