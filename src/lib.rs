//! Natural-language search over personal task lists.
//!
//! A query such as `"p1 overdue"`, `"fix bug #work"` or `"今天做什么"` is
//! parsed into structured filters and keywords, matched against a task
//! snapshot, scored, ranked and optionally summarized by a language model.
//! Every model-assisted step degrades to deterministic logic when it fails.

pub mod config;
pub mod db;
pub mod filter;
pub mod index;
pub mod llm;
pub mod models;
pub mod parser;
pub mod query;
pub mod ranker;
pub mod scanner;
pub mod scoring;
pub mod service;
pub mod summarizer;
pub mod tags;
pub mod vocabulary;

pub use config::{ConfigError, ProviderKind, ProviderSettings, Settings};
pub use db::Database;
pub use filter::{FilterRules, FilterSet, FilterWarning, RuleSet};
pub use index::{IndexState, MemoryTaskIndex, Snapshot, StoreTaskIndex, TaskIndex};
pub use llm::{CancellationToken, LlmClient, LlmError, LlmRequest};
pub use models::{
    DueCondition, DueDateFilter, DueDateRange, ExpandedKeyword, ParsedQuery, StatusCategories,
    StatusCategory, Task, TaskBuilder, TaskId,
};
pub use ranker::SortCriterion;
pub use scanner::MarkdownScanner;
pub use scoring::{ScoreBreakdown, ScoredTask, ScoringWeights};
pub use service::{
    Diagnostics, IndexStatus, ParseTier, SearchError, SearchMode, SearchResponse, SummaryTier,
    TaskSearchService, TaskSearchServiceBuilder,
};
pub use summarizer::Summary;
pub use tags::TagNormalizer;
