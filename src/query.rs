//! Query understanding that never leaves the process: property extraction,
//! vagueness detection and relative-time resolution.

pub mod extractor;
pub mod time_context;
pub mod vague;

pub use extractor::{Extraction, PropertyExtractor};
pub use time_context::{TimeContextResolver, TimeTerm, WeekStart, local_today, parse_iso_date};
pub use vague::{DEFAULT_VAGUE_THRESHOLD, Vagueness, VagueQueryDetector};

use crate::models::{ParsedQuery, StatusCategories};
use crate::vocabulary::Vocabulary;

/// A parsed query together with how it was classified.
#[derive(Debug, Clone)]
pub struct QueryAnalysis {
    pub query: ParsedQuery,
    pub vagueness: Vagueness,
}

/// Deterministic parser used by the simple mode and as the fallback when
/// the semantic parser is unavailable.
pub struct KeywordQueryParser<'a> {
    vocabulary: &'a Vocabulary,
    categories: &'a StatusCategories,
    resolver: TimeContextResolver,
    vague_threshold: f64,
}

impl<'a> KeywordQueryParser<'a> {
    pub fn new(
        vocabulary: &'a Vocabulary,
        categories: &'a StatusCategories,
        resolver: TimeContextResolver,
        vague_threshold: f64,
    ) -> Self {
        Self {
            vocabulary,
            categories,
            resolver,
            vague_threshold,
        }
    }

    /// Parses `text` into a complete [`ParsedQuery`].
    ///
    /// Every core keyword appears once among the expanded keywords, labelled
    /// with the `query` language. Vague queries carry no keywords at all.
    pub fn parse(&self, text: &str) -> QueryAnalysis {
        let extraction = PropertyExtractor::new(self.vocabulary, self.categories).extract(text);
        let vagueness = VagueQueryDetector::new(self.vocabulary, self.vague_threshold)
            .detect(&extraction.raw_tokens);

        let mut query = extraction.query;
        query.is_vague = vagueness.is_vague;
        query.due_date = self
            .resolver
            .resolve_all(&extraction.time_terms, vagueness.is_vague);
        query.time_context_term = describe_terms(&extraction.time_terms);

        if query.is_vague {
            query.clear_keywords();
        } else {
            query.ensure_core_expanded();
        }

        tracing::debug!(
            keywords = query.core_keywords.len(),
            vague = query.is_vague,
            ratio = vagueness.ratio,
            "parsed query deterministically"
        );
        QueryAnalysis { query, vagueness }
    }
}

/// Comma-joined canonical names of the detected time terms.
pub fn describe_terms(terms: &[TimeTerm]) -> Option<String> {
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(TimeTerm::name)
            .collect::<Vec<_>>()
            .join(","),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DueCondition, DueDateFilter, DueDateRange, QUERY_LANGUAGE};
    use time::macros::date;

    fn parse(text: &str) -> QueryAnalysis {
        let vocab = Vocabulary::default();
        let categories = StatusCategories::default();
        let resolver = TimeContextResolver::new(date!(2025 - 01 - 15), WeekStart::Monday);
        KeywordQueryParser::new(&vocab, &categories, resolver, DEFAULT_VAGUE_THRESHOLD).parse(text)
    }

    #[test]
    fn specific_query_gets_exact_due_condition() {
        let analysis = parse("fix login today");
        let query = analysis.query;
        assert!(!query.is_vague);
        assert_eq!(
            query.due_date,
            Some(DueDateFilter::Matches(vec![DueCondition::On {
                date: date!(2025 - 01 - 15)
            }]))
        );
        assert_eq!(query.core_keywords, vec!["fix", "login"]);
        assert_eq!(query.time_context_term.as_deref(), Some("today"));
    }

    #[test]
    fn vague_query_gets_range_and_no_keywords() {
        let query = parse("what should I do today").query;
        assert!(query.is_vague);
        assert!(!query.has_keywords());
        assert_eq!(
            query.due_date,
            Some(DueDateFilter::Range(DueDateRange::on_or_before(date!(
                2025 - 01 - 15
            ))))
        );
    }

    #[test]
    fn shorthand_filters_do_not_make_a_request_specific() {
        let analysis = parse("what should I do today p1");
        assert!(analysis.vagueness.specific_tokens.is_empty());
        assert!(analysis.query.is_vague);
        assert_eq!(analysis.query.priority, vec![1]);
        assert_eq!(
            analysis.query.due_date,
            Some(DueDateFilter::Range(DueDateRange::on_or_before(date!(
                2025 - 01 - 15
            ))))
        );

        let analysis = parse("what should I do status:open");
        assert!(analysis.query.is_vague);
        assert_eq!(analysis.query.status, vec!["open"]);
    }

    #[test]
    fn generic_status_words_leave_vague_requests_unfiltered() {
        let query = parse("what should I be doing today").query;
        assert!(query.is_vague);
        assert!(query.status.is_empty());
    }

    #[test]
    fn vague_next_week_is_a_between_range() {
        let query = parse("what should I work on next week").query;
        assert!(query.is_vague);
        assert_eq!(
            query.due_date,
            Some(DueDateFilter::Range(DueDateRange::between(
                date!(2025 - 01 - 20),
                date!(2025 - 01 - 26)
            )))
        );
    }

    #[test]
    fn core_keywords_are_expanded_verbatim() {
        let query = parse("kitchen renovation").query;
        assert_eq!(query.expanded_keywords.len(), 2);
        assert!(
            query
                .expanded_keywords
                .iter()
                .all(|e| e.language == QUERY_LANGUAGE && e.keyword == e.core)
        );
    }

    #[test]
    fn empty_query_parses_to_nothing() {
        let analysis = parse("   ");
        assert_eq!(analysis.query, ParsedQuery::default());
        assert!(!analysis.vagueness.is_vague);
    }
}
