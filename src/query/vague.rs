//! Heuristic classifier for open-ended requests.

use serde::Serialize;

use crate::vocabulary::{Vocabulary, contains_cjk};

/// Default generic-word ratio at or above which a query counts as vague.
pub const DEFAULT_VAGUE_THRESHOLD: f64 = 0.7;

/// Result of vagueness detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vagueness {
    pub is_vague: bool,
    /// Generic tokens divided by all non-property tokens (0 when there are none).
    pub ratio: f64,
    /// Tokens judged to carry specific content.
    pub specific_tokens: Vec<String>,
}

/// Decides whether a query is an open-ended request or a specific search.
pub struct VagueQueryDetector<'a> {
    vocabulary: &'a Vocabulary,
    threshold: f64,
}

impl<'a> VagueQueryDetector<'a> {
    pub fn new(vocabulary: &'a Vocabulary, threshold: f64) -> Self {
        Self {
            vocabulary,
            threshold,
        }
    }

    /// Classifies raw query tokens (before stop-word removal).
    ///
    /// Property words (time, priority, status) are not counted either way.
    /// A single specific token makes the query non-vague regardless of the
    /// ratio, so "what should I do on the API project today" stays specific.
    pub fn detect(&self, tokens: &[String]) -> Vagueness {
        let mut generic = 0usize;
        let mut counted = 0usize;
        let mut specific_tokens = Vec::new();

        for token in tokens {
            if self.vocabulary.is_generic(token) {
                generic += 1;
                counted += 1;
            } else if self.vocabulary.is_property_token(token) {
                continue;
            } else {
                counted += 1;
                if is_specific(token) {
                    specific_tokens.push(token.clone());
                }
            }
        }

        let ratio = if counted == 0 {
            0.0
        } else {
            generic as f64 / counted as f64
        };
        let is_vague = generic > 0 && ratio >= self.threshold && specific_tokens.is_empty();

        Vagueness {
            is_vague,
            ratio,
            specific_tokens,
        }
    }
}

/// Non-generic tokens count as specific content when they are long enough to
/// name something: three Latin characters, two CJK characters, or any digit.
fn is_specific(token: &str) -> bool {
    if token.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    if contains_cjk(token) {
        token.chars().count() >= 2
    } else {
        token.chars().filter(|c| c.is_alphanumeric()).count() >= 3
    }
}
