//! Tail-anchored stop detection over token ids.

use genie_domain::error::Result;

use crate::traits::GenerationEngine;

/// Multi-pattern exact-suffix matcher: fires once the output's trailing
/// tokens equal any configured stop phrase's token encoding.
///
/// No partial or fuzzy matching; patterns are checked in configured order and
/// the first hit wins. A stop phrase that decodes across token boundaries can
/// escape this layer, which is why the consumer loop also runs a substring
/// check on decoded fragments.
#[derive(Debug, Clone, Default)]
pub struct StopTokenMatcher {
    phrases: Vec<String>,
    patterns: Vec<Vec<u32>>,
}

impl StopTokenMatcher {
    /// Tokenize each stop phrase once up front.
    pub async fn compile(engine: &dyn GenerationEngine, phrases: &[String]) -> Result<Self> {
        let mut patterns = Vec::with_capacity(phrases.len());
        for phrase in phrases {
            patterns.push(engine.tokenize(phrase).await?);
        }
        Ok(Self { phrases: phrases.to_vec(), patterns })
    }

    /// Build from pre-encoded patterns.
    pub fn from_patterns(phrases: Vec<String>, patterns: Vec<Vec<u32>>) -> Self {
        Self { phrases, patterns }
    }

    /// True once `output` ends with any pattern.
    pub fn matches(&self, output: &[u32]) -> bool {
        self.patterns
            .iter()
            .any(|p| !p.is_empty() && output.ends_with(p))
    }

    /// The configured phrases, for text-level containment checks.
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.iter().all(|p| p.is_empty())
    }
}
