use regex::Regex;

use super::AnalyzerError;

/// Built-in topic vocabulary: tag name and the word-bounded pattern that triggers it.
pub const DEFAULT_TAGS: &[(&str, &str)] = &[
    ("malware", r"\b(malware|virus|trojan|spyware|rootkit|worm)\b"),
    ("ransomware", r"\b(ransomware|crypto|encryption)\b"),
    ("phishing", r"\b(phishing|social engineering|scam)\b"),
    ("vulnerability", r"\b(vulnerability|cve|exploit|zero-day)\b"),
    ("data-breach", r"\b(data breach|leak|stolen data)\b"),
    ("apt", r"\b(apt|advanced persistent threat)\b"),
    ("mobile", r"\b(android|ios|mobile|smartphone)\b"),
    ("cloud", r"\b(cloud|aws|azure|google cloud)\b"),
    ("iot", r"\b(iot|internet of things)\b"),
    ("cryptocurrency", r"\b(bitcoin|cryptocurrency|crypto|blockchain)\b"),
];

/// Presence-test tagger over a fixed vocabulary.
pub struct TagExtractor {
    vocabulary: Vec<(String, Regex)>,
}

impl TagExtractor {
    /// Builds a tagger from `(tag, pattern)` pairs. Patterns are matched
    /// against lower-cased text, so they should be written in lower case.
    pub fn new(vocabulary: &[(&str, &str)]) -> Result<Self, AnalyzerError> {
        let vocabulary = vocabulary
            .iter()
            .map(|(name, pattern)| {
                Regex::new(pattern)
                    .map(|re| ((*name).to_owned(), re))
                    .map_err(|source| AnalyzerError::Pattern {
                        name: (*name).to_owned(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { vocabulary })
    }

    /// Returns every tag whose pattern occurs at least once, in vocabulary order.
    pub fn extract(&self, title: &str, content: &str) -> Vec<String> {
        let text = format!("{title} {content}").to_lowercase();
        let mut tags: Vec<String> = Vec::new();
        for (name, pattern) in &self.vocabulary {
            if pattern.is_match(&text) && !tags.contains(name) {
                tags.push(name.clone());
            }
        }
        tags
    }
}

impl Default for TagExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_TAGS).expect("built-in tag patterns compile")
    }
}
