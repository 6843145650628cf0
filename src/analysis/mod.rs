//! Text analysis: severity scoring, IOC extraction and topic tagging.
//!
//! All three are pure functions of their input text. [`ThreatAnalyzer`]
//! bundles them behind one call so the ingest pipeline and ad-hoc
//! classification share identical behaviour.
//!
//! - [`classifier`] - keyword-tier severity scoring over a [`Taxonomy`]
//! - [`ioc`] - typed indicator extraction with per-type validation
//! - [`tags`] - presence tests over a fixed topic vocabulary

pub mod classifier;
pub mod ioc;
pub mod tags;

use serde::Serialize;
use thiserror::Error;

pub use classifier::{Severity, SeverityClassifier, Taxonomy, ThreatLevel};
pub use ioc::{extract_iocs, IocKind};
pub use tags::TagExtractor;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// A keyword or tag pattern did not compile
    #[error("invalid pattern for {name}: {source}")]
    Pattern {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// Everything the analyzer derives from one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub level: ThreatLevel,
    pub confidence: f64,
    pub iocs: Vec<String>,
    pub tags: Vec<String>,
}

/// Severity classifier, IOC extractor and tagger configured once and shared.
pub struct ThreatAnalyzer {
    classifier: SeverityClassifier,
    tagger: TagExtractor,
}

impl ThreatAnalyzer {
    pub fn new(taxonomy: &Taxonomy) -> Result<Self, AnalyzerError> {
        Ok(Self {
            classifier: SeverityClassifier::new(taxonomy)?,
            tagger: TagExtractor::default(),
        })
    }

    /// Analyzes an article's title and body.
    pub fn analyze(&self, title: &str, content: &str) -> Analysis {
        let severity = self.classifier.classify(title, content);
        Analysis {
            level: severity.level,
            confidence: severity.confidence,
            iocs: extract_iocs(&format!("{title} {content}")),
            tags: self.tagger.extract(title, content),
        }
    }

    /// Analyzes arbitrary text that has no separate title.
    pub fn classify(&self, text: &str) -> Analysis {
        self.analyze("", text)
    }
}

impl Default for ThreatAnalyzer {
    fn default() -> Self {
        Self::new(&Taxonomy::default()).expect("built-in taxonomy compiles")
    }
}
