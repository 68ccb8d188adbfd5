//! Multilingual term tables and tokenization.
//!
//! Built-in tables cover English, Chinese and Swedish. Stop words, generic
//! words and status terms can be extended from configuration; everything
//! above this module reads terms only through [`Vocabulary`].

use std::collections::HashSet;

use crate::models::StatusCategories;

/// Canonical time-term names produced by the due-date table.
pub mod time_names {
    pub const TODAY: &str = "today";
    pub const TOMORROW: &str = "tomorrow";
    pub const YESTERDAY: &str = "yesterday";
    pub const OVERDUE: &str = "overdue";
    pub const FUTURE: &str = "future";
    pub const THIS_WEEK: &str = "this-week";
    pub const NEXT_WEEK: &str = "next-week";
    pub const LAST_WEEK: &str = "last-week";
    pub const THIS_MONTH: &str = "this-month";
    pub const NEXT_MONTH: &str = "next-month";
    pub const ANY: &str = "any";
    pub const NONE: &str = "none";
}

const STOP_WORDS_EN: &[&str] = &[
    "a", "an", "the", "and", "or", "of", "to", "in", "on", "at", "for", "with", "by", "from",
    "about", "into", "is", "are", "was", "were", "be", "been", "am", "it", "its", "this", "that",
    "these", "those", "my", "me", "i", "you", "your", "we", "our", "us", "they", "them", "their",
    "he", "she", "his", "her", "do", "does", "did", "can", "could", "should", "would", "will",
    "shall", "may", "might", "must", "what", "which", "who", "whom", "when", "where", "why",
    "how", "all", "any", "some", "please", "there", "here", "so", "just", "also", "than", "then",
    "not", "no", "yes", "let", "lets", "let's", "what's", "whats", "i'm", "due", "if", "as",
    "but", "up", "out",
];

const STOP_WORDS_ZH: &[&str] = &[
    "的", "了", "是", "吗", "呢", "吧", "啊", "和", "与", "或", "在", "我", "你", "他", "她",
    "它", "我们", "你们", "他们", "这", "那", "这些", "那些", "一个", "有", "没", "也", "都",
    "就", "还", "要", "把", "被", "给", "请",
];

const STOP_WORDS_SV: &[&str] = &[
    "och", "att", "det", "som", "en", "ett", "är", "på", "med", "för", "till", "av", "i", "jag",
    "du", "vi", "min", "mina", "mitt", "den", "de", "har", "om", "vad", "hur", "vilka", "vilken",
    "kan", "ska", "skulle", "borde", "inte",
];

/// Words that say nothing about *which* tasks the user means.
const GENERIC_WORDS: &[&str] = &[
    // English
    "task", "tasks", "todo", "todos", "work", "thing", "things", "item", "items", "stuff", "job",
    "jobs", "anything", "something", "everything", "next", "now", "focus", "recommend",
    "recommendation", "recommendations", "suggest", "suggestion", "help", "start", "begin",
    "need", "needs", "want", "have", "has", "had", "show", "find", "list", "give", "get", "tell",
    "see", "look", "doing", "should", "first", "priorities", "plan", "on", "working",
    // Chinese
    "什么", "应该", "做", "任务", "事情", "事", "哪些", "哪个", "需要", "先", "可以", "推荐",
    "建议", "帮", "帮我", "看看", "显示", "列出", "工作", "处理",
    // Swedish
    "göra", "uppgift", "uppgifter", "saker", "sak", "behöver", "nästa", "nu", "visa", "hitta",
    "börja", "jobba", "arbeta",
];

const PRIORITY_TERMS: &[(&str, u8)] = &[
    ("highest priority", 1),
    ("high priority", 1),
    ("top priority", 1),
    ("urgent", 1),
    ("critical", 1),
    ("asap", 1),
    ("important", 1),
    ("最高优先级", 1),
    ("高优先级", 1),
    ("紧急", 1),
    ("重要", 1),
    ("högsta prioritet", 1),
    ("hög prioritet", 1),
    ("brådskande", 1),
    ("viktig", 1),
    ("viktiga", 1),
    ("medium priority", 2),
    ("normal priority", 2),
    ("中优先级", 2),
    ("中等优先级", 2),
    ("medelprioritet", 2),
    ("medel prioritet", 2),
    ("low priority", 3),
    ("低优先级", 3),
    ("låg prioritet", 3),
    ("lowest priority", 4),
    ("最低优先级", 4),
    ("lägsta prioritet", 4),
];

const DUE_TERMS: &[(&str, &str)] = &[
    ("due today", time_names::TODAY),
    ("today", time_names::TODAY),
    ("tonight", time_names::TODAY),
    ("今天", time_names::TODAY),
    ("今日", time_names::TODAY),
    ("idag", time_names::TODAY),
    ("i dag", time_names::TODAY),
    ("due tomorrow", time_names::TOMORROW),
    ("tomorrow", time_names::TOMORROW),
    ("明天", time_names::TOMORROW),
    ("imorgon", time_names::TOMORROW),
    ("i morgon", time_names::TOMORROW),
    ("yesterday", time_names::YESTERDAY),
    ("昨天", time_names::YESTERDAY),
    ("igår", time_names::YESTERDAY),
    ("overdue", time_names::OVERDUE),
    ("past due", time_names::OVERDUE),
    ("已过期", time_names::OVERDUE),
    ("过期", time_names::OVERDUE),
    ("逾期", time_names::OVERDUE),
    ("försenad", time_names::OVERDUE),
    ("försenade", time_names::OVERDUE),
    ("förfallen", time_names::OVERDUE),
    ("förfallna", time_names::OVERDUE),
    ("upcoming", time_names::FUTURE),
    ("future", time_names::FUTURE),
    ("未来", time_names::FUTURE),
    ("将来", time_names::FUTURE),
    ("kommande", time_names::FUTURE),
    ("framtida", time_names::FUTURE),
    ("this week", time_names::THIS_WEEK),
    ("本周", time_names::THIS_WEEK),
    ("这周", time_names::THIS_WEEK),
    ("这个星期", time_names::THIS_WEEK),
    ("denna vecka", time_names::THIS_WEEK),
    ("den här veckan", time_names::THIS_WEEK),
    ("next week", time_names::NEXT_WEEK),
    ("下周", time_names::NEXT_WEEK),
    ("下个星期", time_names::NEXT_WEEK),
    ("nästa vecka", time_names::NEXT_WEEK),
    ("last week", time_names::LAST_WEEK),
    ("上周", time_names::LAST_WEEK),
    ("förra veckan", time_names::LAST_WEEK),
    ("this month", time_names::THIS_MONTH),
    ("本月", time_names::THIS_MONTH),
    ("这个月", time_names::THIS_MONTH),
    ("denna månad", time_names::THIS_MONTH),
    ("next month", time_names::NEXT_MONTH),
    ("下个月", time_names::NEXT_MONTH),
    ("下月", time_names::NEXT_MONTH),
    ("nästa månad", time_names::NEXT_MONTH),
    ("no due date", time_names::NONE),
    ("without due date", time_names::NONE),
    ("undated", time_names::NONE),
    ("没有截止日期", time_names::NONE),
    ("无截止日期", time_names::NONE),
    ("utan datum", time_names::NONE),
    ("with due date", time_names::ANY),
    ("has due date", time_names::ANY),
    ("any due date", time_names::ANY),
    ("有截止日期", time_names::ANY),
    ("med datum", time_names::ANY),
];

/// Returns true for characters written without word separators.
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30ff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{4e00}'..='\u{9fff}'
        | '\u{f900}'..='\u{faff}'
        | '\u{ac00}'..='\u{d7af}')
}

/// Returns true if the string contains any CJK character.
pub fn contains_cjk(s: &str) -> bool {
    s.chars().any(is_cjk)
}

/// Term tables used by extraction, vagueness detection and prompts.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    stop_words: HashSet<String>,
    generic_words: HashSet<String>,
    priority_terms: Vec<(String, u8)>,
    due_terms: Vec<(String, String)>,
    status_terms: Vec<(String, String)>,
    cjk_dictionary: HashSet<String>,
    max_cjk_len: usize,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(&StatusCategories::default(), &[], &[])
    }
}

impl Vocabulary {
    /// Builds the vocabulary from the built-in tables, the configured status
    /// categories, and user-supplied stop and generic words.
    pub fn new(
        categories: &StatusCategories,
        extra_stop_words: &[String],
        extra_generic_words: &[String],
    ) -> Self {
        let stop_words: HashSet<String> = STOP_WORDS_EN
            .iter()
            .chain(STOP_WORDS_ZH)
            .chain(STOP_WORDS_SV)
            .map(|w| (*w).to_string())
            .chain(extra_stop_words.iter().map(|w| w.trim().to_lowercase()))
            .filter(|w| !w.is_empty())
            .collect();

        let generic_words: HashSet<String> = GENERIC_WORDS
            .iter()
            .map(|w| (*w).to_string())
            .chain(extra_generic_words.iter().map(|w| w.trim().to_lowercase()))
            .filter(|w| !w.is_empty())
            .collect();

        let mut priority_terms: Vec<(String, u8)> = PRIORITY_TERMS
            .iter()
            .map(|(t, p)| ((*t).to_string(), *p))
            .collect();
        let mut due_terms: Vec<(String, String)> = DUE_TERMS
            .iter()
            .map(|(t, n)| ((*t).to_string(), (*n).to_string()))
            .collect();
        let mut status_terms = categories.query_vocabulary();

        // Longest phrase first so "high priority" wins over any shorter overlap.
        priority_terms.sort_by_key(|(t, _)| std::cmp::Reverse(t.chars().count()));
        due_terms.sort_by_key(|(t, _)| std::cmp::Reverse(t.chars().count()));
        status_terms.sort_by_key(|(t, _)| std::cmp::Reverse(t.chars().count()));

        let cjk_dictionary: HashSet<String> = stop_words
            .iter()
            .chain(generic_words.iter())
            .chain(priority_terms.iter().map(|(t, _)| t))
            .chain(due_terms.iter().map(|(t, _)| t))
            .chain(status_terms.iter().map(|(t, _)| t))
            .filter(|t| t.chars().all(is_cjk))
            .cloned()
            .collect();
        let max_cjk_len = cjk_dictionary
            .iter()
            .map(|t| t.chars().count())
            .max()
            .unwrap_or(1);

        Self {
            stop_words,
            generic_words,
            priority_terms,
            due_terms,
            status_terms,
            cjk_dictionary,
            max_cjk_len,
        }
    }

    /// Returns true if the token carries no meaning on its own.
    pub fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.contains(&token.to_lowercase())
    }

    /// Returns true for stop words and generic task words.
    pub fn is_generic(&self, token: &str) -> bool {
        let token = token.to_lowercase();
        self.stop_words.contains(&token) || self.generic_words.contains(&token)
    }

    /// Returns true if the token is, or is part of, a property phrase.
    pub fn is_property_token(&self, token: &str) -> bool {
        let token = token.to_lowercase();
        let in_phrase = |phrase: &String| {
            *phrase == token || phrase.split_whitespace().any(|w| w == token && w.len() > 2)
        };
        self.priority_terms.iter().any(|(t, _)| in_phrase(t))
            || self.due_terms.iter().any(|(t, _)| in_phrase(t))
            || self.status_terms.iter().any(|(t, _)| in_phrase(t))
    }

    /// Priority phrases, longest first.
    pub fn priority_terms(&self) -> &[(String, u8)] {
        &self.priority_terms
    }

    /// Due-date phrases mapped to canonical time names, longest first.
    pub fn due_terms(&self) -> &[(String, String)] {
        &self.due_terms
    }

    /// Status phrases mapped to category keys, longest first.
    pub fn status_terms(&self) -> &[(String, String)] {
        &self.status_terms
    }

    /// Sorted stop-word list, for prompts.
    pub fn stop_word_list(&self) -> Vec<&str> {
        let mut words: Vec<&str> = self.stop_words.iter().map(String::as_str).collect();
        words.sort_unstable();
        words
    }

    /// Splits text into lowercased tokens.
    ///
    /// Latin-script words split on whitespace and punctuation (inner `-`,
    /// `_` and `'` are kept). CJK runs are segmented by longest dictionary
    /// match; unknown stretches are cut into two-character chunks.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut word = String::new();
        let mut cjk = String::new();

        for c in text.chars() {
            if is_cjk(c) {
                self.flush_word(&mut word, &mut tokens);
                cjk.push(c);
            } else if c.is_alphanumeric() || matches!(c, '-' | '_' | '\'') {
                self.flush_cjk(&mut cjk, &mut tokens);
                word.extend(c.to_lowercase());
            } else {
                self.flush_word(&mut word, &mut tokens);
                self.flush_cjk(&mut cjk, &mut tokens);
            }
        }
        self.flush_word(&mut word, &mut tokens);
        self.flush_cjk(&mut cjk, &mut tokens);
        tokens
    }

    fn flush_word(&self, word: &mut String, tokens: &mut Vec<String>) {
        let trimmed = word.trim_matches(|c| matches!(c, '-' | '_' | '\''));
        if !trimmed.is_empty() {
            tokens.push(trimmed.to_string());
        }
        word.clear();
    }

    fn flush_cjk(&self, run: &mut String, tokens: &mut Vec<String>) {
        if !run.is_empty() {
            tokens.extend(self.segment_cjk(run));
        }
        run.clear();
    }

    fn segment_cjk(&self, run: &str) -> Vec<String> {
        let chars: Vec<char> = run.chars().collect();
        let mut out = Vec::new();
        let mut unknown = String::new();
        let mut i = 0;

        while i < chars.len() {
            let longest = (1..=self.max_cjk_len.min(chars.len() - i))
                .rev()
                .find(|&len| {
                    let candidate: String = chars[i..i + len].iter().collect();
                    self.cjk_dictionary.contains(&candidate)
                });
            match longest {
                Some(len) => {
                    push_chunks(&mut unknown, &mut out);
                    out.push(chars[i..i + len].iter().collect());
                    i += len;
                }
                None => {
                    unknown.push(chars[i]);
                    i += 1;
                }
            }
        }
        push_chunks(&mut unknown, &mut out);
        out
    }
}

fn push_chunks(unknown: &mut String, out: &mut Vec<String>) {
    let chars: Vec<char> = unknown.chars().collect();
    for chunk in chars.chunks(2) {
        out.push(chunk.iter().collect());
    }
    unknown.clear();
}
