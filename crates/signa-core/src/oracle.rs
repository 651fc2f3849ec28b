use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::errors::OracleError;

/// Capability that turns the bytes of one encoded image into recognized text.
///
/// Implementations are invoked by a single dispatch worker, one call at a time.
#[async_trait]
pub trait RecognitionOracle: Send + Sync {
    fn name(&self) -> &str;

    async fn detect(&self, frame: &[u8]) -> Result<String, OracleError>;
}

/// Phrases the stub oracle chooses from.
pub const PHRASES: [&str; 8] = [
    "Hello, how are you?",
    "My name is John.",
    "Nice to meet you.",
    "Thank you for your help.",
    "I need assistance please.",
    "Could you please repeat that?",
    "I understand what you're saying.",
    "I'm learning sign language.",
];

/// Stand-in recognizer that answers every frame with a random phrase.
#[derive(Clone, Debug, Default)]
pub struct PhraseOracle {
    latency: Option<Duration>,
}

impl PhraseOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate model latency before each answer.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
        }
    }
}

#[async_trait]
impl RecognitionOracle for PhraseOracle {
    fn name(&self) -> &str {
        "phrase-stub"
    }

    async fn detect(&self, frame: &[u8]) -> Result<String, OracleError> {
        if frame.is_empty() {
            return Err(OracleError::InvalidFrame("empty frame".into()));
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let phrase = PHRASES
            .choose(&mut rand::thread_rng())
            .copied()
            .ok_or(OracleError::Unavailable)?;
        Ok(phrase.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_a_known_phrase() {
        let oracle = PhraseOracle::new();
        for _ in 0..20 {
            let text = oracle.detect(b"frame").await.unwrap();
            assert!(PHRASES.contains(&text.as_str()), "unexpected phrase: {text}");
        }
    }

    #[tokio::test]
    async fn rejects_empty_frame() {
        let oracle = PhraseOracle::new();
        let err = oracle.detect(&[]).await.unwrap_err();
        assert!(matches!(err, OracleError::InvalidFrame(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_applied() {
        let oracle = PhraseOracle::with_latency(Duration::from_millis(250));
        let start = tokio::time::Instant::now();
        oracle.detect(b"frame").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn name_is_stable() {
        assert_eq!(PhraseOracle::new().name(), "phrase-stub");
    }
}
