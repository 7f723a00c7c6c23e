use std::io::{BufRead, BufReader};
use std::time::Instant;

use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Serialize;

use crate::rchain::openai::ChatCompletionChunk;
use crate::rchain::provider::{Provider, ProviderError};

/// Single-pass sequence of reply fragments from a streamed completion.
pub type FragmentStream = Box<dyn Iterator<Item = Result<String, ProviderError>>>;

/// Posts a chat request once and maps unsuccessful statuses to provider errors.
pub(crate) fn send_chat_request<T: Serialize + ?Sized>(
    client: &Client,
    provider: Provider,
    url: &str,
    api_key: &str,
    payload: &T,
) -> Result<Response, ProviderError> {
    let started = Instant::now();
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(payload)
        .send()
        .map_err(|source| ProviderError::Request { provider, source })?;

    let status = response.status();
    tracing::debug!(
        provider = provider.as_str(),
        status = status.as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "chat completion responded"
    );

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(classify_failure(provider, status, body))
}

/// Sorts a failed response into the authentication, rate-limit, or generic bucket.
pub(crate) fn classify_failure(
    provider: Provider,
    status: StatusCode,
    body: String,
) -> ProviderError {
    let lowered = body.to_ascii_lowercase();
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || lowered.contains("invalid_api_key")
    {
        ProviderError::Authentication {
            provider,
            status,
            body,
        }
    } else if status == StatusCode::TOO_MANY_REQUESTS || lowered.contains("rate_limit") {
        ProviderError::RateLimited {
            provider,
            status,
            body,
        }
    } else {
        ProviderError::Api {
            provider,
            status,
            body,
        }
    }
}

/// Wraps a streaming response body as a fragment iterator.
pub(crate) fn fragments(provider: Provider, response: Response) -> FragmentStream {
    Box::new(SseFragments::new(provider, BufReader::new(response)))
}

/// Reads `data:` lines of a server-sent event stream and yields delta content.
pub(crate) struct SseFragments<R> {
    provider: Provider,
    reader: R,
    line: String,
    finished: bool,
    emitted: usize,
}

impl<R: BufRead> SseFragments<R> {
    pub(crate) fn new(provider: Provider, reader: R) -> Self {
        Self {
            provider,
            reader,
            line: String::new(),
            finished: false,
            emitted: 0,
        }
    }

    fn fail(&mut self, message: String) -> Option<Result<String, ProviderError>> {
        self.finished = true;
        Some(Err(ProviderError::Stream {
            provider: self.provider,
            message,
        }))
    }

    fn finish(&mut self) -> Option<Result<String, ProviderError>> {
        self.finished = true;
        tracing::debug!(
            provider = self.provider.as_str(),
            fragments = self.emitted,
            "stream finished"
        );
        None
    }
}

impl<R: BufRead> Iterator for SseFragments<R> {
    type Item = Result<String, ProviderError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return self.finish(),
                Ok(_) => {}
                Err(err) => return self.fail(format!("failed to read stream: {err}")),
            }

            let Some(payload) = extract_data_payload(self.line.trim()) else {
                continue;
            };
            if payload == "[DONE]" {
                return self.finish();
            }
            if payload.is_empty() {
                continue;
            }

            match serde_json::from_str::<ChatCompletionChunk>(payload) {
                Ok(chunk) if chunk.error.is_some() => {
                    let message = summarize_error(payload);
                    return self.fail(message);
                }
                Ok(chunk) => {
                    let content = chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                        .filter(|content| !content.is_empty());
                    if let Some(content) = content {
                        self.emitted += 1;
                        return Some(Ok(content));
                    }
                }
                Err(_) => {
                    let message = summarize_error(payload);
                    return self.fail(message);
                }
            }
        }
        None
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn summarize_error(payload: &str) -> String {
    serde_json::from_str::<serde_json::Value>(payload)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("message"))
                .and_then(|message| message.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| payload.trim().to_string())
}
