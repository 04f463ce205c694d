//! Prompt assembly and response generation
//!
//! The language model is an opaque prompt-in, text-out backend behind
//! [`LanguageModel`]. [`ResponseGenerator`] owns the rules around it: which
//! turns go into the prompt, what is recorded afterwards, and the fallback
//! reply when the backend fails.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::conversation::{ConversationHistory, ConversationTurn, DEFAULT_CONTEXT_WINDOW};
use crate::error::GenerationError;
use crate::{Error, Result};

/// Reply shown when the backend fails
pub const FALLBACK_REPLY: &str = "I'm sorry, there was an error generating a response.";

/// Default Gemini model
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// A text completion backend
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a single prompt
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::BackendFailure`] on transport failure or an
    /// empty completion
    async fn complete(&self, prompt: &str) -> std::result::Result<String, GenerationError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

#[derive(serde::Serialize)]
struct GeminiRequest<'a> {
    contents: [GeminiContent<'a>; 1],
}

#[derive(serde::Serialize)]
struct GeminiContent<'a> {
    parts: [GeminiPart<'a>; 1],
}

#[derive(serde::Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(serde::Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(serde::Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(serde::Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(serde::Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

/// Google Gemini `generateContent` client
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl GeminiClient {
    /// Create a Gemini client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing or empty
    pub fn new(api_key: Option<SecretString>, model: impl Into<String>) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.expose_secret().trim().is_empty())
            .ok_or_else(|| Error::Config("GOOGLE_API_KEY is required for Gemini".to_string()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.into(),
        })
    }

    /// Model identifier in use
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
        let url = format!("{GEMINI_BASE_URL}/{}:generateContent", self.model);
        let request = GeminiRequest {
            contents: [GeminiContent {
                parts: [GeminiPart { text: prompt }],
            }],
        };

        tracing::debug!(model = %self.model, prompt_chars = prompt.len(), "requesting completion");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gemini request failed");
                GenerationError::BackendFailure(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Gemini API error");
            return Err(GenerationError::BackendFailure(format!(
                "Gemini API error {status}: {body}"
            )));
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::BackendFailure(e.to_string()))?;

        let text = body.into_text();
        if text.trim().is_empty() {
            return Err(GenerationError::BackendFailure(
                "Gemini returned no text".to_string(),
            ));
        }

        Ok(text.trim().to_string())
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Render the context window and the new user text as a prompt
///
/// Lines are oldest first; the new text follows on its own `User:` line and the
/// prompt ends with an open `AI:` line for the model to complete.
#[must_use]
pub fn build_prompt(window: &[ConversationTurn], user_text: &str) -> String {
    let context = window
        .iter()
        .map(ConversationTurn::prompt_line)
        .collect::<Vec<_>>()
        .join("\n");

    format!("{context}\nUser: {user_text}\nAI:")
}

/// Result of one generation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Text to present: the model's answer or [`FALLBACK_REPLY`]
    pub text: String,
    /// Backend failure absorbed into the fallback
    pub error: Option<GenerationError>,
}

impl Reply {
    /// Whether the backend failed and the fallback was used
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Produces assistant replies and records successful exchanges
#[derive(Clone)]
pub struct ResponseGenerator {
    model: Arc<dyn LanguageModel>,
    window: usize,
}

impl ResponseGenerator {
    /// Create a generator with the default context window
    #[must_use]
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            window: DEFAULT_CONTEXT_WINDOW,
        }
    }

    /// Override the number of prior turns sent as context
    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Generate a reply to `user_text`
    ///
    /// On success the user turn and the reply are appended in that order. On
    /// failure the history is left untouched and the fallback text returned.
    pub async fn generate(&self, history: &mut ConversationHistory, user_text: &str) -> Reply {
        let prompt = build_prompt(history.context_window(self.window), user_text);

        match self.model.complete(&prompt).await {
            Ok(text) => {
                history.append(ConversationTurn::user(user_text));
                history.append(ConversationTurn::assistant(text.clone()));
                tracing::debug!(model = self.model.name(), turns = history.len(), "reply generated");
                Reply { text, error: None }
            }
            Err(e) => {
                tracing::warn!(model = self.model.name(), error = %e, "generation failed, using fallback");
                Reply {
                    text: FALLBACK_REPLY.to_string(),
                    error: Some(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::conversation::Role;

    /// Records prompts and answers from a script
    struct ScriptedModel {
        prompts: Mutex<Vec<String>>,
        answer: std::result::Result<String, GenerationError>,
    }

    impl ScriptedModel {
        fn answering(text: &str) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                answer: Ok(text.to_string()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                answer: Err(GenerationError::BackendFailure("boom".to_string())),
            })
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.answer.clone()
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_first_prompt_and_history() {
        let model = ScriptedModel::answering("Hi there");
        let generator = ResponseGenerator::new(model.clone());
        let mut history = ConversationHistory::new();

        let reply = generator.generate(&mut history, "Hello").await;

        assert_eq!(model.last_prompt(), "\nUser: Hello\nAI:");
        assert_eq!(reply.text, "Hi there");
        assert!(!reply.is_fallback());
        assert_eq!(history.len(), 2);
        assert_eq!(history.full()[0].role(), Role::User);
        assert_eq!(history.full()[0].text(), "Hello");
        assert_eq!(history.full()[1].role(), Role::Assistant);
    }

    #[tokio::test]
    async fn test_failure_uses_fallback_and_keeps_history() {
        let generator = ResponseGenerator::new(ScriptedModel::failing());
        let mut history = ConversationHistory::new();
        history.append(ConversationTurn::user("a"));
        history.append(ConversationTurn::assistant("b"));

        let reply = generator.generate(&mut history, "Hello").await;

        assert_eq!(reply.text, FALLBACK_REPLY);
        assert!(reply.is_fallback());
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn test_prompt_carries_only_window() {
        let model = ScriptedModel::answering("Goodbye");
        let generator = ResponseGenerator::new(model.clone());
        let mut history = ConversationHistory::new();
        for i in 0..4 {
            history.append(ConversationTurn::user(format!("q{i}")));
            history.append(ConversationTurn::assistant(format!("a{i}")));
        }

        generator.generate(&mut history, "Bye").await;

        assert_eq!(
            model.last_prompt(),
            "User: q1\nAI: a1\nUser: q2\nAI: a2\nUser: q3\nAI: a3\nUser: Bye\nAI:"
        );
        assert_eq!(history.len(), 10);
    }

    #[test]
    fn test_build_prompt_custom_window() {
        let turns = [ConversationTurn::user("Hola"), ConversationTurn::assistant("¡Hola!")];
        assert_eq!(build_prompt(&turns, "¿Qué tal?"), "User: Hola\nAI: ¡Hola!\nUser: ¿Qué tal?\nAI:");
    }

    #[test]
    fn test_gemini_requires_key() {
        assert!(GeminiClient::new(None, DEFAULT_MODEL).is_err());
        assert!(GeminiClient::new(Some(SecretString::from("  ".to_string())), DEFAULT_MODEL).is_err());
        let client = GeminiClient::new(Some(SecretString::from("key".to_string())), DEFAULT_MODEL).unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_gemini_response_text() {
        let body: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Bon"},{"text":"jour"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(body.into_text(), "Bonjour");

        let empty: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.into_text(), "");
    }
}
