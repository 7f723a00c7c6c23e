//! Provider plumbing behind the session loop.
//!
//! The module holds the transcript model, the gateway that turns a transcript
//! into exactly one provider call, and the HTTP helpers behind it.

pub(crate) mod chat_runtime;
/// Image-generation endpoint client.
pub mod images;
/// OpenAI-compatible chat-completions payloads.
pub mod openai;
/// Provider selection, errors, and the gateway trait.
pub mod provider;
/// Append-only conversation history and its JSON persistence.
pub mod transcript;
