//! Optional-capability probing
//!
//! The assist and embedding backends are conditional dependencies: the core
//! holds no load-time requirement on either. Availability is probed once at
//! process start and the result is passed into components, which select
//! degraded behavior at each call site.

use crate::config::Settings;
use tracing::info;

/// Probe result for the optional external capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Language-model segmentation assist reachable
    pub segment_assist: bool,

    /// Language-model field-extraction assist reachable
    pub extract_assist: bool,

    /// Embedding backend usable for semantic matching
    pub embeddings: bool,
}

impl Capabilities {
    /// Probe availability from settings and environment.
    ///
    /// Assist requires an API key; embeddings require a supported model
    /// configuration. A backend that passes the probe can still fail at call
    /// time, which degrades per call rather than failing the pipeline.
    pub fn probe(settings: &Settings) -> Self {
        let assist = !settings.assist.api_key().is_empty();
        let embeddings = settings.embedding.validate().is_ok();

        let caps = Self {
            segment_assist: assist,
            extract_assist: assist,
            embeddings,
        };
        info!(
            segment_assist = caps.segment_assist,
            extract_assist = caps.extract_assist,
            embeddings = caps.embeddings,
            "capability probe complete"
        );
        caps
    }

    /// All capabilities absent; heuristic/regex paths only
    pub fn none() -> Self {
        Self {
            segment_assist: false,
            extract_assist: false,
            embeddings: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_disables_everything() {
        let caps = Capabilities::none();
        assert!(!caps.segment_assist);
        assert!(!caps.extract_assist);
        assert!(!caps.embeddings);
    }

    #[test]
    fn test_probe_without_api_key_disables_assist() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let caps = Capabilities::probe(&Settings::default());
        assert!(!caps.segment_assist);
        assert!(!caps.extract_assist);
        // Default embedding config is valid regardless of the API key
        assert!(caps.embeddings);
    }
}
