/// Normalization for task tags.
///
/// Tags are compared in one canonical form regardless of how they were typed
/// in a task line, a query, or a configuration file: lowercase, no leading
/// `#`, nested segments separated by `/`.
pub struct TagNormalizer;

impl TagNormalizer {
    /// Normalizes a single tag.
    ///
    /// # Normalization rules
    ///
    /// - Converts to lowercase
    /// - Strips leading `#` characters
    /// - Replaces spaces with hyphens
    /// - Keeps alphanumerics, `-`, `_` and `/`, drops everything else
    /// - Collapses empty nested segments and trims stray separators
    ///
    /// # Examples
    ///
    /// ```
    /// use tasklens::TagNormalizer;
    ///
    /// assert_eq!(TagNormalizer::normalize_tag("#Work"), "work");
    /// assert_eq!(TagNormalizer::normalize_tag("#work/API"), "work/api");
    /// assert_eq!(TagNormalizer::normalize_tag("deep work"), "deep-work");
    /// assert_eq!(TagNormalizer::normalize_tag("#a//b/"), "a/b");
    /// assert_eq!(TagNormalizer::normalize_tag("#项目"), "项目");
    /// ```
    #[must_use]
    pub fn normalize_tag(tag: &str) -> String {
        let normalized = tag
            .trim()
            .trim_start_matches('#')
            .to_lowercase()
            .replace(' ', "-")
            .chars()
            .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '/'))
            .collect::<String>();

        normalized
            .split('/')
            .map(|segment| segment.trim_matches('-'))
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Normalizes a collection of tags, removing duplicates and empty strings.
    ///
    /// Order of first occurrence is preserved.
    ///
    /// # Examples
    ///
    /// ```
    /// use tasklens::TagNormalizer;
    ///
    /// let tags = vec!["#Work".to_string(), "work".to_string(), "#".to_string()];
    /// assert_eq!(TagNormalizer::normalize_tags(tags), vec!["work"]);
    /// ```
    #[must_use]
    pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = std::collections::HashSet::new();
        tags.into_iter()
            .map(|tag| Self::normalize_tag(tag.as_ref()))
            .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
            .collect()
    }
}
