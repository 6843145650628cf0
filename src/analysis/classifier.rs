use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::AnalyzerError;

/// Confidence reported when no tier keyword matched.
pub const BASELINE_CONFIDENCE: f64 = 0.3;

// ============================================================================
// Threat Level
// ============================================================================

/// Severity tier assigned to an article.
///
/// Ordering follows severity, so `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub const ALL: [ThreatLevel; 4] = [
        ThreatLevel::Low,
        ThreatLevel::Medium,
        ThreatLevel::High,
        ThreatLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown threat level: {0}")]
pub struct UnknownThreatLevel(pub String);

impl FromStr for ThreatLevel {
    type Err = UnknownThreatLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(ThreatLevel::Low),
            "medium" => Ok(ThreatLevel::Medium),
            "high" => Ok(ThreatLevel::High),
            "critical" => Ok(ThreatLevel::Critical),
            other => Err(UnknownThreatLevel(other.to_owned())),
        }
    }
}

// ============================================================================
// Taxonomy
// ============================================================================

/// Keyword lists for each severity tier.
///
/// The `low` list is informational; an article lands in `low` only because
/// nothing in the higher tiers matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Taxonomy {
    pub critical: Vec<String>,
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| (*w).to_owned()).collect()
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self {
            critical: owned(&[
                "zero-day",
                "0day",
                "critical vulnerability",
                "ransomware",
                "data breach",
                "supply chain attack",
                "rce",
                "remote code execution",
                "critical security flaw",
                "emergency patch",
                "actively exploited",
            ]),
            high: owned(&[
                "vulnerability",
                "exploit",
                "malware",
                "phishing",
                "apt",
                "backdoor",
                "trojan",
                "sql injection",
                "privilege escalation",
                "security flaw",
                "code execution",
                "buffer overflow",
            ]),
            medium: owned(&[
                "security update",
                "patch",
                "warning",
                "alert",
                "mitigation",
                "workaround",
                "security advisory",
                "authentication bypass",
                "information disclosure",
                "denial of service",
            ]),
            low: owned(&[
                "security news",
                "announcement",
                "report",
                "advisory",
                "awareness",
                "security tip",
                "best practices",
            ]),
        }
    }
}

// ============================================================================
// Classifier
// ============================================================================

/// Result of severity scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Severity {
    pub level: ThreatLevel,
    pub confidence: f64,
}

struct Tier {
    level: ThreatLevel,
    /// Matches needed for full confidence.
    normalizer: f64,
    keywords: Vec<Regex>,
}

impl Tier {
    fn build(level: ThreatLevel, normalizer: f64, words: &[String]) -> Result<Self, AnalyzerError> {
        let keywords = words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .map(|w| {
                Regex::new(&format!(r"\b{}\b", regex::escape(&w))).map_err(|source| {
                    AnalyzerError::Pattern {
                        name: w.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            level,
            normalizer,
            keywords,
        })
    }

    fn count(&self, text: &str) -> usize {
        self.keywords.iter().map(|re| re.find_iter(text).count()).sum()
    }
}

/// Keyword-tier severity classifier.
///
/// Tiers are checked critical → high → medium and the first tier with any
/// whole-word keyword hit decides the level, however many hits lower tiers
/// have. Confidence is `min(hits / normalizer, 1.0)` with normalizers 3, 2
/// and 1.5. No hits at all yields `low` at [`BASELINE_CONFIDENCE`].
pub struct SeverityClassifier {
    tiers: Vec<Tier>,
}

impl SeverityClassifier {
    pub fn new(taxonomy: &Taxonomy) -> Result<Self, AnalyzerError> {
        Ok(Self {
            tiers: vec![
                Tier::build(ThreatLevel::Critical, 3.0, &taxonomy.critical)?,
                Tier::build(ThreatLevel::High, 2.0, &taxonomy.high)?,
                Tier::build(ThreatLevel::Medium, 1.5, &taxonomy.medium)?,
            ],
        })
    }

    pub fn classify(&self, title: &str, content: &str) -> Severity {
        let text = format!("{title} {content}").to_lowercase();

        for tier in &self.tiers {
            let hits = tier.count(&text);
            if hits > 0 {
                return Severity {
                    level: tier.level,
                    confidence: (hits as f64 / tier.normalizer).min(1.0),
                };
            }
        }

        Severity {
            level: ThreatLevel::Low,
            confidence: BASELINE_CONFIDENCE,
        }
    }
}
