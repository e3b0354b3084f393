use anyhow::{anyhow, Result};
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// A chat-completion backend: system prompt + user prompt in, text out.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, api_base: Option<String>, model: String) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .temperature(0.7)
            .build()?;

        let resp = self.client.chat().create(request).await?;
        resp.choices
            .first()
            .and_then(|c| c.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("empty completion"))
    }
}

/// What came back from the model, once a consumer has tried to read it.
#[derive(Debug, Clone, PartialEq)]
pub enum AiReply<T> {
    Parsed(T),
    Unrecognized(String),
}

/// Upstream failure of the completion backend. Callers absorb it and fall
/// back to local content; it never reaches an HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI request timed out after {0:?}")]
    Timeout(Duration),
    #[error("AI error after {attempts} attempt(s): {source}")]
    Provider {
        attempts: u32,
        source: anyhow::Error,
    },
}

/// Bounded access to the completion backend: a few retries with backoff,
/// all inside one overall timeout.
pub struct AiService {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
    retries: u32,
}

impl AiService {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration, retries: u32) -> Self {
        Self {
            client,
            timeout,
            retries,
        }
    }

    pub async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
        match tokio::time::timeout(self.timeout, self.complete_with_retries(system, user)).await {
            Ok(result) => result,
            Err(_) => Err(AiError::Timeout(self.timeout)),
        }
    }

    async fn complete_with_retries(&self, system: &str, user: &str) -> Result<String, AiError> {
        let mut attempt = 0;
        loop {
            match self.client.complete(system, user).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.retries {
                        return Err(AiError::Provider {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    tracing::debug!("AI call failed (attempt {}): {}", attempt, err);
                    sleep(Duration::from_millis(250 * attempt as u64)).await;
                }
            }
        }
    }
}

/// Every balanced `[...]` substring that parses as a JSON array, in order of
/// where it starts. Prose around or between the arrays is ignored.
pub fn json_array_candidates(text: &str) -> Vec<&str> {
    text.match_indices('[')
        .filter_map(|(start, _)| {
            let end = matching_bracket(&text.as_bytes()[start..])?;
            let candidate = &text[start..=start + end];
            serde_json::from_str::<serde_json::Value>(candidate)
                .ok()
                .filter(|v| v.is_array())
                .map(|_| candidate)
        })
        .collect()
}

pub fn extract_json_array(text: &str) -> Option<&str> {
    json_array_candidates(text).into_iter().next()
}

fn matching_bracket(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Always answers with the same text.
    pub struct CannedClient {
        pub reply: String,
        pub calls: AtomicUsize,
    }

    impl CannedClient {
        pub fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionClient for CannedClient {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    /// Fails like an unreachable provider.
    pub struct FailingClient;

    #[async_trait]
    impl CompletionClient for FailingClient {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            Err(anyhow!("connection refused"))
        }
    }

    /// Never answers.
    pub struct HangingClient;

    #[async_trait]
    impl CompletionClient for HangingClient {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    pub fn service(client: Arc<dyn CompletionClient>) -> Arc<AiService> {
        Arc::new(AiService::new(client, Duration::from_millis(200), 1))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_extract_plain_array() {
        assert_eq!(extract_json_array(r#"[{"a":1}]"#), Some(r#"[{"a":1}]"#));
    }

    #[test]
    fn test_extract_from_prose() {
        let text = "Sure! Here are the questions:\n```json\n[{\"text\": \"I like [brackets] in text\", \"trait\": \"openness\"}]\n```\nHope it helps.";
        let extracted = extract_json_array(text).unwrap();
        let value: serde_json::Value = serde_json::from_str(extracted).unwrap();
        assert_eq!(value[0]["text"], "I like [brackets] in text");
    }

    #[test]
    fn test_skips_malformed_brackets() {
        let text = "Note [see below] then [1, 2, 3] and [4]";
        assert_eq!(extract_json_array(text), Some("[1, 2, 3]"));
        assert_eq!(json_array_candidates(text), vec!["[1, 2, 3]", "[4]"]);
        assert_eq!(extract_json_array("no json here"), None);
        assert_eq!(extract_json_array("[unterminated"), None);
    }

    #[tokio::test]
    async fn test_retries_then_fails() {
        let ai = AiService::new(Arc::new(FailingClient), Duration::from_secs(5), 2);
        let err = ai.complete("s", "u").await.unwrap_err();
        assert!(matches!(err, AiError::Provider { attempts: 3, .. }));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_timeout_bounds_call() {
        let ai = AiService::new(Arc::new(HangingClient), Duration::from_millis(50), 0);
        let started = std::time::Instant::now();
        assert!(matches!(ai.complete("s", "u").await, Err(AiError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_passes_reply_through() {
        let client = Arc::new(CannedClient::new("hello"));
        let ai = AiService::new(client.clone(), Duration::from_secs(1), 0);
        assert_eq!(ai.complete("s", "u").await.unwrap(), "hello");
        assert_eq!(client.calls(), 1);
    }
}
