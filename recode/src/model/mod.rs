//! Language-model clients used for stub expansion.

pub mod openai;
pub mod pricing;

use async_trait::async_trait;
use thiserror::Error;

pub use openai::OpenAiClient;
pub use pricing::Pricing;

/// One completion and what it cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    /// USD; zero when cost tracking is off.
    pub cost: f64,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("API key variable {0} is not set")]
    MissingApiKey(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<ModelError> },
    #[error("model returned no reply")]
    NoReply,
}

impl ModelError {
    /// Network failures, rate limits and server errors are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Request(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            ModelError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_statuses_are_retryable() {
        let status = |status| ModelError::Status {
            status,
            body: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(503).is_retryable());
        assert!(!status(400).is_retryable());
        assert!(!ModelError::NoReply.is_retryable());
    }
}
