//! OpenAI-compatible chat-completions wire format.
//!
//! Both text providers speak this dialect; Groq serves it under its own base
//! URL, so only the endpoint and the key differ between them.

use reqwest::blocking::Response;
use serde::{Deserialize, Serialize};

use crate::rchain::provider::{Provider, ProviderError};
use crate::rchain::transcript::Turn;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.wire_name(),
            content: turn.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

/// One server-sent chunk of a streamed completion.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Present when the provider aborts the stream with an error event.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkChoice {
    #[serde(default)]
    pub delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Delta {
    pub content: Option<String>,
}

pub fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Extracts the assistant reply from a non-streamed response.
///
/// An empty reply is still a reply; only a missing `content` is an error.
pub fn read_completion(provider: Provider, response: Response) -> Result<String, ProviderError> {
    let body: ChatCompletionResponse = response
        .json()
        .map_err(|source| ProviderError::Request { provider, source })?;
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or(ProviderError::EmptyResponse { provider })
}

#[cfg(test)]
mod tests {
    use super::{ChatCompletionChunk, ChatMessage, chat_completions_url};
    use crate::rchain::transcript::Turn;

    #[test]
    fn url_join_tolerates_trailing_slash() {
        assert_eq!(
            chat_completions_url("https://api.groq.com/openai/v1/"),
            "https://api.groq.com/openai/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("http://127.0.0.1:1234"),
            "http://127.0.0.1:1234/chat/completions"
        );
    }

    #[test]
    fn turns_map_to_lowercase_wire_roles() {
        let message = ChatMessage::from(&Turn::assistant("done"));
        let json = serde_json::to_value(&message).expect("serializable");
        assert_eq!(json, serde_json::json!({ "role": "assistant", "content": "done" }));
    }

    #[test]
    fn chunk_without_delta_content_parses() {
        let chunk: ChatCompletionChunk =
            serde_json::from_str(r#"{"id":"x","choices":[{"index":0,"delta":{}}]}"#)
                .expect("chunk should parse");
        assert!(chunk.choices[0].delta.content.is_none());
        assert!(chunk.error.is_none());
    }
}
