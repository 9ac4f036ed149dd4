//! OpenAI-compatible chat completions client with retry and cost tracking.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::io::config::ModelConfig;
use crate::model::{Generation, ModelClient, ModelError, Pricing};

const MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    config: ModelConfig,
    pricing: Pricing,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

impl OpenAiClient {
    /// Build a client, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &ModelConfig, pricing: Pricing) -> Result<Self, ModelError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| ModelError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_api_key(config, pricing, api_key)
    }

    pub fn with_api_key(
        config: &ModelConfig,
        pricing: Pricing,
        api_key: String,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            config: config.clone(),
            pricing,
        })
    }

    async fn call_once(&self, prompt: &str) -> Result<Generation, ModelError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": &self.config.model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": self.config.temperature,
                "max_tokens": self.config.max_tokens,
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let (text, usage) = parse_completion(&body)?;
        let cost = if self.config.track_costs {
            self.pricing
                .cost(&self.config.model, usage.prompt_tokens, usage.completion_tokens)
        } else {
            0.0
        };
        debug!(
            model = %self.config.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            cost,
            "model call"
        );
        Ok(Generation { text, cost })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<Generation, ModelError> {
        let mut attempt = 0;
        loop {
            let err = match self.call_once(prompt).await {
                Ok(generation) => return Ok(generation),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= self.config.max_retries {
                return Err(ModelError::Exhausted {
                    attempts: attempt + 1,
                    last: Box::new(err),
                });
            }
            let unit = rand::thread_rng().r#gen::<f64>();
            let delay = backoff_delay(
                self.config.retry_base_delay_ms,
                attempt,
                self.config.retry_jitter,
                MAX_BACKOFF_MS,
                unit,
            );
            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying model call");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Capped exponential backoff, `base * 2^attempt`, scaled by
/// `1 + jitter * (2 * unit - 1)` where `unit` is uniform in `[0, 1)`.
pub(crate) fn backoff_delay(base_ms: u64, attempt: u32, jitter: f64, cap_ms: u64, unit: f64) -> Duration {
    let exp = base_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(cap_ms);
    let factor = 1.0 + jitter * (2.0 * unit - 1.0);
    Duration::from_millis((exp as f64 * factor).max(0.0).round() as u64)
}

fn parse_completion(body: &str) -> Result<(String, Usage), ModelError> {
    let response: ApiResponse =
        serde_json::from_str(body).map_err(|err| ModelError::Malformed(err.to_string()))?;
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(ModelError::NoReply)?;
    Ok((text, response.usage.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap() {
        assert_eq!(backoff_delay(1000, 0, 0.0, 30_000, 0.5), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1000, 2, 0.0, 30_000, 0.5), Duration::from_millis(4000));
        assert_eq!(backoff_delay(1000, 10, 0.0, 30_000, 0.5), Duration::from_millis(30_000));
    }

    #[test]
    fn jitter_spreads_around_the_base() {
        assert_eq!(backoff_delay(1000, 0, 0.1, 30_000, 0.0), Duration::from_millis(900));
        assert_eq!(backoff_delay(1000, 0, 0.1, 30_000, 1.0), Duration::from_millis(1100));
    }

    #[test]
    fn parses_content_and_usage() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "<think>ok</think>"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let (text, usage) = parse_completion(body).expect("parse");
        assert_eq!(text, "<think>ok</think>");
        assert_eq!(
            usage,
            Usage {
                prompt_tokens: 12,
                completion_tokens: 3
            }
        );
    }

    #[test]
    fn empty_choices_is_no_reply() {
        assert!(matches!(
            parse_completion(r#"{"choices": []}"#),
            Err(ModelError::NoReply)
        ));
        assert!(matches!(
            parse_completion("not json"),
            Err(ModelError::Malformed(_))
        ));
    }

    #[test]
    fn missing_key_is_reported() {
        let config = ModelConfig {
            api_key_env: "RECODE_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..ModelConfig::default()
        };
        let Err(err) = OpenAiClient::from_config(&config, Pricing::default()) else {
            panic!("expected missing key error");
        };
        assert!(matches!(err, ModelError::MissingApiKey(_)));
        assert!(err.to_string().contains("RECODE_TEST_KEY_THAT_IS_NOT_SET"));
    }
}
