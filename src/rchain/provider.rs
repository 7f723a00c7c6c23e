use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;

use crate::config::{Credentials, SessionConfig};
use crate::rchain::chat_runtime::{self, FragmentStream};
use crate::rchain::images;
use crate::rchain::openai::{self, ChatMessage};
use crate::rchain::transcript::Turn;

/// Backend selected for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Openai,
    Groq,
    Image,
}

impl Provider {
    pub const SUPPORTED: &'static str = "openai, groq, image";

    /// Case-insensitive lookup; `None` for names outside the supported set.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::Openai),
            "groq" => Some(Self::Groq),
            "image" => Some(Self::Image),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Groq => "groq",
            Self::Image => "image",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Openai => "OpenAI",
            Self::Groq => "Groq",
            Self::Image => "image",
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, Self::Image)
    }

    /// Environment variable the provider needs before a session may start.
    pub fn credential_env(self) -> &'static str {
        match self {
            Self::Openai => "OPENAI_API_KEY",
            Self::Groq => "GROQ_API_KEY",
            Self::Image => "APP_URL",
        }
    }
}

/// Coarse failure classes surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    RateLimit,
    Generic,
}

#[derive(Debug)]
pub enum ProviderError {
    MissingApiKey {
        provider: Provider,
        key_env: &'static str,
    },
    Authentication {
        provider: Provider,
        status: StatusCode,
        body: String,
    },
    RateLimited {
        provider: Provider,
        status: StatusCode,
        body: String,
    },
    Request {
        provider: Provider,
        source: reqwest::Error,
    },
    Api {
        provider: Provider,
        status: StatusCode,
        body: String,
    },
    EmptyResponse {
        provider: Provider,
    },
    Stream {
        provider: Provider,
        message: String,
    },
    UnsupportedOperation {
        provider: Provider,
    },
    UnknownProvider {
        name: String,
    },
    MissingImageEndpoint,
    ImageStatus {
        status: StatusCode,
    },
    ImageDecode {
        source: image::ImageError,
    },
    Io {
        path: PathBuf,
        source: io::Error,
    },
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingApiKey { .. } | Self::Authentication { .. } => ErrorKind::Authentication,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            _ => ErrorKind::Generic,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey { key_env, .. } => {
                write!(f, "{key_env} is not set in the environment")
            }
            Self::Authentication {
                provider,
                status,
                body,
            } => write!(
                f,
                "{} rejected the credentials ({status}): {body}",
                provider.as_str()
            ),
            Self::RateLimited {
                provider,
                status,
                body,
            } => write!(f, "{} rate limit hit ({status}): {body}", provider.as_str()),
            Self::Request { provider, source } => {
                write!(f, "{} request failed: {source}", provider.as_str())
            }
            Self::Api {
                provider,
                status,
                body,
            } => write!(f, "{} API error {status}: {body}", provider.as_str()),
            Self::EmptyResponse { provider } => {
                write!(f, "{} response did not contain message content", provider.as_str())
            }
            Self::Stream { provider, message } => {
                write!(f, "{} stream failed: {message}", provider.as_str())
            }
            Self::UnsupportedOperation { provider } => {
                write!(f, "{} does not support this operation", provider.as_str())
            }
            Self::UnknownProvider { name } => write!(
                f,
                "unknown provider '{name}' (supported: {})",
                Provider::SUPPORTED
            ),
            Self::MissingImageEndpoint => write!(f, "APP_URL is not set in the environment"),
            Self::ImageStatus { status } => write!(
                f,
                "API request failed with status code: {}",
                status.as_u16()
            ),
            Self::ImageDecode { source } => write!(f, "response is not a valid image: {source}"),
            Self::Io { path, source } => {
                write!(f, "failed to write '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Request { source, .. } => Some(source),
            Self::ImageDecode { source } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Normalized outcome of a text completion.
pub enum TextResult {
    /// The full reply, delivered at once.
    Complete(String),
    /// Reply fragments in emission order; must be drained before the reply is used.
    Stream(FragmentStream),
}

impl fmt::Debug for TextResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete(content) => f.debug_tuple("Complete").field(content).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Image written to disk by [`ProviderGateway::generate_image`].
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub path: PathBuf,
    pub elapsed: Duration,
}

/// One call shape over every backend the session can talk to.
pub trait ProviderGateway {
    /// Sends the whole transcript to the configured text provider.
    fn complete_text(
        &self,
        transcript: &[Turn],
        config: &SessionConfig,
    ) -> Result<TextResult, ProviderError>;

    /// Requests one image for `prompt` and stores it under `output_dir`.
    fn generate_image(
        &self,
        prompt: &str,
        output_dir: &Path,
    ) -> Result<GeneratedArtifact, ProviderError>;
}

/// Gateway backed by the hosted HTTP APIs.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    credentials: Credentials,
}

impl HttpGateway {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
        }
    }

    fn text_endpoint(&self, provider: Provider) -> Result<(String, &str), ProviderError> {
        let (base_url, api_key) = match provider {
            Provider::Openai => (
                &self.credentials.openai_base_url,
                self.credentials.openai_api_key.as_deref(),
            ),
            Provider::Groq => (
                &self.credentials.groq_base_url,
                self.credentials.groq_api_key.as_deref(),
            ),
            Provider::Image => return Err(ProviderError::UnsupportedOperation { provider }),
        };
        let api_key = api_key.ok_or(ProviderError::MissingApiKey {
            provider,
            key_env: provider.credential_env(),
        })?;
        Ok((openai::chat_completions_url(base_url), api_key))
    }
}

impl ProviderGateway for HttpGateway {
    fn complete_text(
        &self,
        transcript: &[Turn],
        config: &SessionConfig,
    ) -> Result<TextResult, ProviderError> {
        let provider = Provider::parse(&config.provider_name).ok_or_else(|| {
            ProviderError::UnknownProvider {
                name: config.provider_name.clone(),
            }
        })?;
        let (url, api_key) = self.text_endpoint(provider)?;

        let request = openai::ChatCompletionRequest {
            model: config.model_for(provider).to_string(),
            messages: transcript.iter().map(ChatMessage::from).collect(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream: config.stream,
        };
        tracing::debug!(
            provider = provider.as_str(),
            model = %request.model,
            messages = request.messages.len(),
            stream = request.stream,
            api_key_present = !api_key.trim().is_empty(),
            "dispatching chat completion"
        );

        let response =
            chat_runtime::send_chat_request(&self.client, provider, &url, api_key, &request)?;
        if config.stream {
            Ok(TextResult::Stream(chat_runtime::fragments(provider, response)))
        } else {
            openai::read_completion(provider, response).map(TextResult::Complete)
        }
    }

    fn generate_image(
        &self,
        prompt: &str,
        output_dir: &Path,
    ) -> Result<GeneratedArtifact, ProviderError> {
        let endpoint = self
            .credentials
            .image_url
            .as_deref()
            .ok_or(ProviderError::MissingImageEndpoint)?;
        images::generate(&self.client, endpoint, prompt, output_dir)
    }
}
