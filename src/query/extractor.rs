//! Deterministic extraction of structured properties from query text.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::{ParsedQuery, StatusCategories};
use crate::tags::TagNormalizer;
use crate::vocabulary::{Vocabulary, contains_cjk};

use super::time_context::TimeTerm;

static STATUS_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:status|s):("[^"]+"|[\w\-]+)"#).expect("valid status regex")
});

static PRIORITY_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:p([1-4])|priority:([1-4]|highest|high|medium|low|lowest))\b")
        .expect("valid priority regex")
});

static DUE_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bdue:("[^"]+"|[\w\-+]+)"#).expect("valid due regex")
});

static TAG_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)#([\w\-/]+)").expect("valid tag regex"));

static FOLDER_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:folder|path):("[^"]+"|\S+)"#).expect("valid folder regex")
});

/// Output of property extraction.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Structured fields that matched, plus core keywords when the natural
    /// pass ran. Due dates are carried separately as unresolved terms.
    pub query: ParsedQuery,
    /// Time terms found, in order of appearance per pass.
    pub time_terms: Vec<TimeTerm>,
    /// Text left after every matched span was removed.
    pub residual: String,
    /// Tokens left after the shorthand pass, before natural phrases and
    /// stop words were removed. Shorthand filters never appear here.
    pub raw_tokens: Vec<String>,
}

/// Pure, regex and table driven property extractor.
///
/// When one token could mean several things the first pass that claims it
/// wins; passes run status, then priority, then due date, then keywords.
pub struct PropertyExtractor<'a> {
    vocabulary: &'a Vocabulary,
    categories: &'a StatusCategories,
}

impl<'a> PropertyExtractor<'a> {
    pub fn new(vocabulary: &'a Vocabulary, categories: &'a StatusCategories) -> Self {
        Self {
            vocabulary,
            categories,
        }
    }

    /// Extracts shorthand syntax only (`p1`, `status:open`, `due:today`,
    /// `#tag`, `folder:x`). The residual keeps its original casing; this is
    /// what the semantic parser receives.
    pub fn extract_syntax(&self, text: &str) -> Extraction {
        let mut out = Extraction::default();
        let mut remaining = text.to_string();

        remaining = self.take_status_syntax(&remaining, &mut out);
        remaining = take_priority_syntax(&remaining, &mut out);
        remaining = take_due_syntax(&remaining, &mut out);
        remaining = take_tag_syntax(&remaining, &mut out);
        remaining = take_folder_syntax(&remaining, &mut out);

        out.residual = collapse_whitespace(&remaining);
        out.raw_tokens = self.vocabulary.tokenize(&out.residual);
        out
    }

    /// Full deterministic extraction: shorthand syntax, natural-language
    /// property phrases, then keywords from whatever is left.
    pub fn extract(&self, text: &str) -> Extraction {
        let mut out = self.extract_syntax(text);
        let mut remaining = out.residual.to_lowercase();

        // Generic words never become filters, even when a status or priority
        // table lists them.
        for (phrase, key) in self.vocabulary.status_terms() {
            if self.vocabulary.is_generic(phrase) {
                continue;
            }
            if take_phrase(&mut remaining, phrase) {
                push_unique(&mut out.query.status, key.clone());
                out.query.consume(phrase);
            }
        }
        for (phrase, level) in self.vocabulary.priority_terms() {
            if self.vocabulary.is_generic(phrase) {
                continue;
            }
            if take_phrase(&mut remaining, phrase) {
                push_unique(&mut out.query.priority, *level);
                out.query.consume(phrase);
            }
        }
        for (phrase, name) in self.vocabulary.due_terms() {
            if take_phrase(&mut remaining, phrase) {
                if let Some(term) = TimeTerm::parse(name) {
                    push_unique(&mut out.time_terms, term);
                }
                out.query.consume(phrase);
            }
        }

        out.residual = collapse_whitespace(&remaining);
        for token in self.vocabulary.tokenize(&out.residual) {
            if self.vocabulary.is_generic(&token) {
                continue;
            }
            out.query.push_core(&token);
        }
        out.query.enforce_exclusivity();
        out
    }

    fn take_status_syntax(&self, text: &str, out: &mut Extraction) -> String {
        STATUS_SYNTAX
            .replace_all(text, |caps: &Captures| {
                let value = unquote(&caps[1]);
                match self.categories.resolve_term(value) {
                    Some(key) => {
                        push_unique(&mut out.query.status, key.to_string());
                        out.query.consume(&caps[0]);
                        out.query.consume(value);
                        " ".to_string()
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

fn take_priority_syntax(text: &str, out: &mut Extraction) -> String {
    PRIORITY_SYNTAX
        .replace_all(text, |caps: &Captures| {
            let level = caps
                .get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| priority_level(m.as_str()));
            match level {
                Some(level) => {
                    push_unique(&mut out.query.priority, level);
                    out.query.consume(&caps[0]);
                    " ".to_string()
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn take_due_syntax(text: &str, out: &mut Extraction) -> String {
    DUE_SYNTAX
        .replace_all(text, |caps: &Captures| match TimeTerm::parse(unquote(&caps[1])) {
            Some(term) => {
                push_unique(&mut out.time_terms, term);
                out.query.consume(&caps[0]);
                out.query.consume(unquote(&caps[1]));
                " ".to_string()
            }
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn take_tag_syntax(text: &str, out: &mut Extraction) -> String {
    TAG_SYNTAX
        .replace_all(text, |caps: &Captures| {
            let tag = TagNormalizer::normalize_tag(&caps[1]);
            if tag.is_empty() {
                return caps[0].to_string();
            }
            out.query.consume(&tag);
            push_unique(&mut out.query.tags, tag);
            " ".to_string()
        })
        .into_owned()
}

fn take_folder_syntax(text: &str, out: &mut Extraction) -> String {
    FOLDER_SYNTAX
        .replace_all(text, |caps: &Captures| {
            let folder = unquote(&caps[1]).trim_matches('/').to_string();
            if folder.is_empty() {
                return caps[0].to_string();
            }
            out.query.consume(&folder);
            out.query.folder = Some(folder);
            " ".to_string()
        })
        .into_owned()
}

fn priority_level(value: &str) -> Option<u8> {
    match value.to_lowercase().as_str() {
        "1" | "highest" | "high" => Some(1),
        "2" | "medium" => Some(2),
        "3" | "low" => Some(3),
        "4" | "lowest" => Some(4),
        _ => None,
    }
}

/// Removes every whole-word occurrence of `phrase` from `text`. CJK phrases
/// match anywhere since CJK text has no word separators.
fn take_phrase(text: &mut String, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let cjk = contains_cjk(phrase);
    let mut found = false;
    let mut from = 0;

    while let Some(pos) = text[from..].find(phrase) {
        let start = from + pos;
        let end = start + phrase.len();
        let before_ok = cjk
            || text[..start]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = cjk || text[end..].chars().next().is_none_or(|c| !c.is_alphanumeric());

        if before_ok && after_ok {
            text.replace_range(start..end, " ");
            found = true;
            from = start + 1;
        } else {
            from = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
    }
    found
}

fn unquote(value: &str) -> &str {
    value.trim_matches('"').trim()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_unique<T: PartialEq>(values: &mut Vec<T>, value: T) {
    if !values.contains(&value) {
        values.push(value);
    }
}
