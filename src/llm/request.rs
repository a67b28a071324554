//! Provider-neutral request types for the generation endpoint.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ConfigError, LlmError};

/// An access key used to authenticate one outbound generation request.
///
/// The `Debug` and `Display` forms only show a short fingerprint, so a
/// credential can be attached to log lines without leaking the key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for placing on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First 8 hex characters of the SHA-256 digest of the key.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..4])
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.fingerprint())
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", self.fingerprint())
    }
}

/// Fixed sampling parameters applied to every request of a run.
///
/// Both values are checked to lie in `[0.0, 1.0]` at construction, so a
/// value of this type is always safe to send.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    temperature: f64,
    top_p: f64,
}

impl SamplingParams {
    pub fn new(temperature: f64, top_p: f64) -> Result<Self, ConfigError> {
        check_unit_range("temperature", temperature)?;
        check_unit_range("top_p", top_p)?;
        Ok(Self { temperature, top_p })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn top_p(&self) -> f64 {
        self.top_p
    }
}

fn check_unit_range(name: &'static str, value: f64) -> Result<(), ConfigError> {
    // NaN fails `contains`, which is what we want.
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::SamplingOutOfRange { name, value })
    }
}

/// A single prompt sent to the generation endpoint.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub credential: Credential,
    pub sampling: SamplingParams,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        credential: Credential,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            credential,
            sampling,
        }
    }
}

/// Trait for endpoints that turn a prompt into generated text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate text for the given request, authenticated with its credential.
    async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_params_accepts_bounds() {
        let params = SamplingParams::new(0.0, 1.0).expect("bounds are inclusive");
        assert_eq!(params.temperature(), 0.0);
        assert_eq!(params.top_p(), 1.0);
    }

    #[test]
    fn test_sampling_params_rejects_out_of_range() {
        let err = SamplingParams::new(1.2, 0.9).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::SamplingOutOfRange {
                name: "temperature",
                ..
            }
        ));

        let err = SamplingParams::new(0.5, -0.01).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::SamplingOutOfRange { name: "top_p", .. }
        ));

        assert!(SamplingParams::new(f64::NAN, 0.5).is_err());
    }

    #[test]
    fn test_credential_debug_hides_key() {
        let credential = Credential::new("AIza-very-secret-key");
        let debug = format!("{:?}", credential);
        let display = credential.to_string();

        assert!(!debug.contains("secret"));
        assert!(!display.contains("secret"));
        assert_eq!(credential.fingerprint().len(), 8);
        assert!(display.ends_with(&credential.fingerprint()));
    }

    #[test]
    fn test_credential_fingerprint_is_stable() {
        let a = Credential::new("key-one");
        let b = Credential::new("key-one");
        let c = Credential::new("key-two");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
