use super::*;
use crate::filter::RuleSet;
use crate::index::{IndexState, MemoryTaskIndex, TaskIndex};
use crate::llm::{LlmError, LlmRequest};
use crate::models::{DueDateFilter, DueDateRange, Task, TaskBuilder};
use std::sync::Mutex;
use time::macros::date;

const TODAY: Date = date!(2025 - 01 - 15);

const FIX_PARSE: &str = r#"{
    "coreKeywords": ["fix"],
    "expandedKeywords": [
        {"core": "fix", "language": "English", "keyword": "fix"},
        {"core": "fix", "language": "English", "keyword": "repair"}
    ],
    "isVague": false
}"#;

/// Answers parse prompts and summary prompts with canned output.
struct ScriptedClient {
    parse: Result<String, ()>,
    summary: Result<String, ()>,
    calls: Mutex<Vec<&'static str>>,
}

impl ScriptedClient {
    fn new(parse: Result<&str, ()>, summary: Result<&str, ()>) -> Arc<Self> {
        Arc::new(Self {
            parse: parse.map(str::to_string),
            summary: summary.map(str::to_string),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl LlmClient for ScriptedClient {
    fn generate(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let (kind, response) = if request.prompt.contains("TASKS:") {
            ("summary", &self.summary)
        } else {
            ("parse", &self.parse)
        };
        self.calls.lock().unwrap().push(kind);
        response.clone().map_err(|_| LlmError::Http {
            status: 503,
            error_type: None,
            message: "model overloaded".to_string(),
        })
    }
}

fn tasks() -> Vec<Task> {
    vec![
        TaskBuilder::new()
            .id(1)
            .text("Fix login bug")
            .priority(1)
            .due(date!(2025 - 01 - 10))
            .tags(["work"])
            .path("Work/api.md")
            .build(),
        TaskBuilder::new()
            .id(2)
            .text("Write quarterly report")
            .priority(2)
            .due(date!(2025 - 01 - 20))
            .path("Work/reports.md")
            .build(),
        TaskBuilder::new().id(3).text("Buy milk").path("Home/errands.md").build(),
        TaskBuilder::new()
            .id(4)
            .text("Repair bike brakes")
            .priority(1)
            .due(date!(2025 - 01 - 12))
            .path("Home/errands.md")
            .build(),
        TaskBuilder::new()
            .id(5)
            .text("Plan vacation")
            .priority(3)
            .due(date!(2025 - 03 - 01))
            .path("Home/travel.md")
            .build(),
        TaskBuilder::new().id(6).text("Old archived idea").path("Archive/old.md").build(),
        TaskBuilder::new()
            .id(7)
            .text("Call dentist")
            .status("completed")
            .symbol("x")
            .path("Home/health.md")
            .build(),
    ]
}

fn settings() -> Settings {
    Settings {
        languages: vec!["English".to_string()],
        expansions_per_language: 2,
        ..Default::default()
    }
}

fn service_with(settings: Settings, client: Option<Arc<ScriptedClient>>) -> TaskSearchService {
    let mut builder = TaskSearchServiceBuilder::new(settings)
        .index(Arc::new(MemoryTaskIndex::with_tasks(tasks())))
        .today(TODAY);
    if let Some(client) = client {
        builder = builder.client(client);
    }
    builder.build().unwrap()
}

fn ids(response: &SearchResponse) -> Vec<i64> {
    response.tasks.iter().map(|s| s.task.id.get()).collect()
}

fn search(service: &mut TaskSearchService, text: &str, mode: SearchMode) -> SearchResponse {
    service
        .search(text, mode, &CancellationToken::new())
        .expect("search should succeed")
}

#[test]
fn simple_mode_matches_keywords_without_a_model() {
    let mut service = service_with(settings(), None);
    let response = search(&mut service, "login", SearchMode::Simple);

    assert_eq!(ids(&response), vec![1]);
    assert_eq!(response.diagnostics.parse_tier, ParseTier::Deterministic);
    assert!(response.diagnostics.parse_fallback.is_none());
    assert!(response.diagnostics.disclosure.is_none());
    assert_eq!(response.diagnostics.summary_tier, SummaryTier::NotRequested);
}

#[test]
fn property_only_query_leaves_relevance_inactive() {
    let mut service = service_with(settings(), None);
    let response = search(&mut service, "p1 overdue", SearchMode::Simple);

    assert_eq!(ids(&response), vec![1, 4]);
    let top = response.diagnostics.top_breakdown.unwrap();
    assert!(!top.active.relevance);
    assert!(top.active.due_date && top.active.priority);
    for scored in &response.tasks {
        // overdue 1.5 * 4 + p1 1.0 * 1; nothing from relevance
        assert!((scored.score - 7.0).abs() < 1e-9);
    }
}

#[test]
fn vague_today_query_shows_everything_due_by_today() {
    let mut service = service_with(settings(), None);
    let response = search(&mut service, "what should I do today", SearchMode::Simple);

    assert!(response.query.is_vague);
    assert_eq!(
        response.query.due_date,
        Some(DueDateFilter::Range(DueDateRange::on_or_before(TODAY)))
    );
    assert_eq!(ids(&response), vec![1, 4]);
}

#[test]
fn smart_mode_without_a_client_is_a_config_error() {
    let mut service = service_with(settings(), None);
    let result = service.search("login", SearchMode::Smart, &CancellationToken::new());
    assert!(matches!(
        result,
        Err(SearchError::Config(ConfigError::MissingModel { .. }))
    ));
}

#[test]
fn failed_semantic_parse_falls_back_to_keywords() {
    let client = ScriptedClient::new(Err(()), Err(()));
    let mut service = service_with(settings(), Some(client.clone()));
    let response = search(&mut service, "fix bug", SearchMode::Smart);

    assert_eq!(ids(&response), vec![1]);
    assert_eq!(response.diagnostics.parse_tier, ParseTier::Deterministic);
    assert!(response.diagnostics.parse_fallback.is_some());
    assert!(response.diagnostics.disclosure.is_some());
    assert_eq!(client.calls(), vec!["parse"]);
}

#[test]
fn malformed_semantic_response_falls_back_to_keywords() {
    let client = ScriptedClient::new(Ok(r#"{"coreKeywords": ["fix"], "isVague": "no"}"#), Err(()));
    let mut service = service_with(settings(), Some(client));
    let response = search(&mut service, "fix bug", SearchMode::Smart);

    assert_eq!(ids(&response), vec![1]);
    assert_eq!(response.diagnostics.parse_tier, ParseTier::Deterministic);
}

#[test]
fn semantic_parse_expands_keywords() {
    let client = ScriptedClient::new(Ok(FIX_PARSE), Err(()));
    let mut service = service_with(settings(), Some(client));
    let response = search(&mut service, "fix", SearchMode::Smart);

    assert_eq!(ids(&response), vec![1, 4]);
    assert_eq!(response.diagnostics.parse_tier, ParseTier::Semantic);
    assert_eq!(
        response.diagnostics.expansion.per_language,
        vec![("English".to_string(), 2)]
    );
    assert!(response.summary.is_none());
}

#[test]
fn empty_semantic_result_is_replaced_by_keyword_matches() {
    let client = ScriptedClient::new(
        Ok(r#"{
            "coreKeywords": ["zzz"],
            "expandedKeywords": [{"core": "zzz", "language": "English", "keyword": "zzz"}],
            "isVague": false
        }"#),
        Err(()),
    );
    let mut service = service_with(settings(), Some(client));
    let response = search(&mut service, "login", SearchMode::Smart);

    assert_eq!(ids(&response), vec![1]);
    assert_eq!(response.diagnostics.parse_tier, ParseTier::Deterministic);
    assert!(
        response
            .diagnostics
            .disclosure
            .as_deref()
            .unwrap()
            .contains("keyword matches")
    );
}

#[test]
fn chat_mode_adds_a_validated_summary() {
    let client = ScriptedClient::new(
        Ok(FIX_PARSE),
        Ok(r#"{"summary": "Start with the login bug.", "recommended": [1, 99]}"#),
    );
    let mut service = service_with(settings(), Some(client.clone()));
    let response = search(&mut service, "fix", SearchMode::Chat);

    assert_eq!(ids(&response), vec![1, 4]);
    let summary = response.summary.unwrap();
    assert_eq!(summary.recommended, vec![TaskId::new(1)]);
    assert_eq!(summary.dropped, 1);
    assert_eq!(response.diagnostics.summary_tier, SummaryTier::Generated);
    assert_eq!(client.calls(), vec!["parse", "summary"]);
}

#[test]
fn failed_summary_keeps_ranked_results() {
    let client = ScriptedClient::new(Ok(FIX_PARSE), Ok("I cannot help with that."));
    let mut service = service_with(settings(), Some(client));
    let response = search(&mut service, "fix", SearchMode::Chat);

    assert_eq!(ids(&response), vec![1, 4]);
    assert!(response.summary.is_none());
    assert_eq!(response.diagnostics.summary_tier, SummaryTier::Failed);
    assert!(response.diagnostics.summary_error.is_some());
    assert_eq!(response.diagnostics.parse_tier, ParseTier::Semantic);
}

#[test]
fn cancellation_degrades_both_stages_but_keeps_results() {
    let client = ScriptedClient::new(Ok(FIX_PARSE), Ok(r#"{"summary": "x"}"#));
    let mut service = service_with(settings(), Some(client.clone()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let response = service.search("fix bug", SearchMode::Chat, &cancel).unwrap();

    assert_eq!(ids(&response), vec![1]);
    assert_eq!(response.diagnostics.parse_tier, ParseTier::Deterministic);
    assert_eq!(response.diagnostics.summary_tier, SummaryTier::Cancelled);
    assert!(client.calls().is_empty());
}

#[test]
fn not_ready_index_is_reported_not_raised() {
    let mut service = TaskSearchServiceBuilder::new(settings())
        .index(Arc::new(MemoryTaskIndex::new()))
        .today(TODAY)
        .build()
        .unwrap();
    let response = search(&mut service, "login", SearchMode::Simple);

    assert!(response.tasks.is_empty());
    assert!(matches!(
        response.diagnostics.index,
        IndexStatus::NotReady { .. }
    ));
    assert!(response.diagnostics.disclosure.is_some());
}

/// Index whose backing store always fails.
struct BrokenIndex;

impl TaskIndex for BrokenIndex {
    fn snapshot(&self) -> IndexState {
        IndexState::Unavailable {
            reason: "database disk image is malformed".to_string(),
        }
    }
}

#[test]
fn failing_store_is_reported_as_unavailable() {
    let mut service = TaskSearchServiceBuilder::new(settings())
        .index(Arc::new(BrokenIndex))
        .today(TODAY)
        .build()
        .unwrap();
    let response = search(&mut service, "login", SearchMode::Simple);

    assert!(response.tasks.is_empty());
    assert_eq!(
        response.diagnostics.index,
        IndexStatus::Unavailable {
            reason: "database disk image is malformed".to_string()
        }
    );
    assert!(
        response
            .diagnostics
            .disclosure
            .as_deref()
            .is_some_and(|d| d.contains("unavailable"))
    );
}

#[test]
fn global_exclusions_apply_first() {
    let mut config = settings();
    config.filters.exclusions.folders = vec!["Archive".to_string()];
    let mut service = service_with(config, None);
    let response = search(&mut service, "idea", SearchMode::Simple);

    assert!(response.tasks.is_empty());
    assert_eq!(response.diagnostics.stages.total, 7);
    assert_eq!(response.diagnostics.stages.after_exclusions, 6);
}

#[test]
fn shadowed_inclusions_produce_warnings() {
    let mut config = settings();
    config.filters.exclusions.folders = vec!["Archive".to_string()];
    let mut service = service_with(config, None);

    let warnings = service.set_inclusions(RuleSet {
        folders: vec!["Archive/old".to_string(), "Home".to_string()],
        ..Default::default()
    });
    assert_eq!(warnings.len(), 1);

    let response = search(&mut service, "", SearchMode::Simple);
    assert_eq!(response.warnings, warnings);
    assert_eq!(ids(&response).len(), 4);
}

#[test]
fn results_are_cut_to_the_display_limit() {
    let config = Settings {
        max_direct_results: 2,
        ..settings()
    };
    let mut service = service_with(config, None);
    let response = search(&mut service, "", SearchMode::Simple);

    assert_eq!(response.tasks.len(), 2);
    assert_eq!(response.total_matches, 7);
}

#[test]
fn cache_is_reused_until_the_snapshot_changes() {
    let index = Arc::new(MemoryTaskIndex::with_tasks(tasks()));
    let mut service = TaskSearchServiceBuilder::new(settings())
        .index(index.clone())
        .today(TODAY)
        .build()
        .unwrap();

    assert!(!search(&mut service, "login", SearchMode::Simple).diagnostics.cache_hit);
    assert!(search(&mut service, "login", SearchMode::Simple).diagnostics.cache_hit);

    index.replace(vec![TaskBuilder::new().id(1).text("Login page copy").build()]);
    let response = search(&mut service, "login", SearchMode::Simple);
    assert!(!response.diagnostics.cache_hit);
    assert_eq!(response.tasks[0].task.text, "Login page copy");
}

#[test]
fn cache_evicts_least_recently_used_queries() {
    let mut service = service_with(settings(), None);
    let capacity = CACHE_CAPACITY.get();

    for n in 0..capacity + 2 {
        search(&mut service, &format!("ticket{n}"), SearchMode::Simple);
    }
    assert_eq!(service.cache.len(), capacity);

    let latest = format!("ticket{}", capacity + 1);
    assert!(search(&mut service, &latest, SearchMode::Simple).diagnostics.cache_hit);
    assert!(!search(&mut service, "ticket0", SearchMode::Simple).diagnostics.cache_hit);
}

#[test]
fn settings_updates_clear_the_cache_and_are_validated() {
    let mut service = service_with(settings(), None);
    search(&mut service, "login", SearchMode::Simple);

    let invalid = Settings {
        vague_threshold: 0.0,
        ..settings()
    };
    assert!(service.update_settings(invalid).is_err());

    let mut changed = settings();
    changed.weights.relevance = 10.0;
    service.update_settings(changed).unwrap();
    let response = search(&mut service, "login", SearchMode::Simple);
    assert!(!response.diagnostics.cache_hit);
}

#[test]
fn mode_parses_from_text() {
    assert_eq!("Chat".parse::<SearchMode>().unwrap(), SearchMode::Chat);
    assert!("fancy".parse::<SearchMode>().is_err());
    assert_eq!(SearchMode::Smart.to_string(), "smart");
    assert!(!SearchMode::Simple.uses_model());
}
