//! Generation endpoint clients.
//!
//! Every outbound request carries its own [`Credential`] and the run's fixed
//! [`SamplingParams`]; providers only turn a prompt into text. Two wire
//! formats are supported:
//!
//! - [`GeminiClient`]: Gemini `generateContent`, key in the query string
//! - [`LiteLlmClient`]: OpenAI-compatible chat completions, key as bearer token
//!
//! ```ignore
//! use muse_forge::llm::{build_provider, Credential, GenerationRequest, SamplingParams};
//!
//! let provider = build_provider(&config.endpoint)?;
//! let sampling = SamplingParams::new(1.0, 0.99)?;
//! let text = provider
//!     .generate(GenerationRequest::new("Hello", Credential::new("key"), sampling))
//!     .await?;
//! ```

pub mod gemini;
pub mod litellm;
pub mod request;

use std::sync::Arc;

pub use gemini::{GeminiClient, DEFAULT_GEMINI_ENDPOINT};
pub use litellm::{LiteLlmClient, Message};
pub use request::{Credential, GenerationRequest, LlmProvider, SamplingParams};

use crate::config::{EndpointConfig, EndpointKind};
use crate::error::LlmError;

/// Build the provider described by the endpoint configuration.
pub fn build_provider(endpoint: &EndpointConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let timeout = endpoint.timeout();
    let provider: Arc<dyn LlmProvider> = match endpoint.kind {
        EndpointKind::Gemini => Arc::new(GeminiClient::new(endpoint.url.clone(), timeout)?),
        EndpointKind::OpenAi => Arc::new(LiteLlmClient::new(
            endpoint.url.clone(),
            endpoint.model.clone(),
            timeout,
        )?),
    };
    Ok(provider)
}
