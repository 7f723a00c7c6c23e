//! Interactive read, dispatch, append cycle.
//!
//! A session alternates between waiting for input and dispatching it to the
//! configured provider. Text turns record the user's message before the call
//! and the reply after it; image turns record a description of the saved file
//! only once it exists. The literal `exit` (any case) ends the session, after
//! which the transcript may be written to disk.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::thread;

use crate::config::SessionConfig;
use crate::console::Console;
use crate::rchain::images::DEFAULT_IMAGE_DIR;
use crate::rchain::provider::{ErrorKind, Provider, ProviderError, ProviderGateway, TextResult};
use crate::rchain::transcript::{SaveTarget, Transcript, Turn};

pub const EXIT_SENTINEL: &str = "exit";

/// Per-turn failures; all of them are reported and the loop carries on.
#[derive(Debug)]
pub enum SessionError {
    InvalidConfig { name: String },
    Provider(ProviderError),
    Io(io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { name } => write!(
                f,
                "Invalid model type '{name}'. Please use {}.",
                Provider::SUPPORTED
            ),
            Self::Provider(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidConfig { .. } => None,
            Self::Provider(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

pub fn is_exit_sentinel(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case(EXIT_SENTINEL)
}

/// Owns the transcript for one session and drives it until `exit`.
pub struct SessionLoop<'a> {
    config: &'a SessionConfig,
    gateway: &'a dyn ProviderGateway,
    console: &'a mut dyn Console,
    transcript: Transcript,
    image_dir: Option<PathBuf>,
    pending_input: Option<String>,
}

impl<'a> SessionLoop<'a> {
    pub fn new(
        config: &'a SessionConfig,
        gateway: &'a dyn ProviderGateway,
        console: &'a mut dyn Console,
    ) -> Self {
        Self {
            config,
            gateway,
            console,
            transcript: Transcript::new(),
            image_dir: config.image_dir.clone(),
            pending_input: None,
        }
    }

    /// Uses `text` as the first turn's input instead of prompting for it.
    pub fn with_initial_text(mut self, text: Option<String>) -> Self {
        self.pending_input = text.filter(|text| !text.trim().is_empty());
        self
    }

    /// Runs until the exit sentinel (or end of input) and returns the history.
    pub fn run(mut self) -> Transcript {
        loop {
            let Some(input) = self.next_input() else {
                tracing::debug!("input closed, ending session");
                self.finish();
                break;
            };

            if is_exit_sentinel(&input) {
                self.finish();
                break;
            }

            match self.dispatch(&input) {
                Ok(()) => {}
                Err(err @ SessionError::InvalidConfig { .. }) => {
                    self.console.error(&err.to_string());
                    continue;
                }
                Err(err) => self.report(&err),
            }

            if !self.config.turn_delay.is_zero() {
                thread::sleep(self.config.turn_delay);
            }
        }
        self.transcript
    }

    fn next_input(&mut self) -> Option<String> {
        if let Some(text) = self.pending_input.take() {
            return Some(text);
        }
        let label = match self.config.provider() {
            Some(Provider::Image) => "Enter image prompt",
            _ => "You",
        };
        self.console.prompt(label, None)
    }

    fn dispatch(&mut self, input: &str) -> Result<(), SessionError> {
        let provider = self
            .config
            .provider()
            .ok_or_else(|| SessionError::InvalidConfig {
                name: self.config.provider_name.clone(),
            })?;
        tracing::debug!(
            provider = provider.as_str(),
            turns = self.transcript.len(),
            "dispatching turn"
        );

        if provider.is_image() {
            self.image_turn(input)
        } else {
            self.text_turn(input)
        }
    }

    fn text_turn(&mut self, input: &str) -> Result<(), SessionError> {
        // Kept even when the call fails, so a failed exchange stays in history.
        self.transcript.append(Turn::user(input));

        let result = self
            .gateway
            .complete_text(self.transcript.snapshot(), self.config)?;
        let content = match result {
            TextResult::Complete(content) => {
                self.console.assistant(&content);
                content
            }
            TextResult::Stream(fragments) => {
                self.console.assistant_start();
                let mut collected = String::new();
                for fragment in fragments {
                    match fragment {
                        Ok(text) => {
                            self.console.fragment(&text);
                            collected.push_str(&text);
                        }
                        Err(err) => {
                            self.console.assistant_end();
                            return Err(err.into());
                        }
                    }
                }
                self.console.assistant_end();
                collected
            }
        };

        self.transcript.append(Turn::assistant(content));
        Ok(())
    }

    fn image_turn(&mut self, prompt: &str) -> Result<(), SessionError> {
        let output_dir = self.resolve_image_dir();
        let artifact = self.gateway.generate_image(prompt, &output_dir)?;

        self.console.success(&format!(
            "Image generated successfully in {:.2} seconds!",
            artifact.elapsed.as_secs_f64()
        ));
        self.console
            .info(&format!("Saved as: {}", artifact.path.display()));
        self.transcript
            .append(Turn::user(format!("Generated image with prompt: {prompt}")));
        self.transcript.append(Turn::assistant(format!(
            "Image saved as: {}",
            artifact.path.display()
        )));
        Ok(())
    }

    /// Asks for the image directory the first time it is needed.
    fn resolve_image_dir(&mut self) -> PathBuf {
        if let Some(dir) = &self.image_dir {
            return dir.clone();
        }
        let answer = self
            .console
            .prompt(
                "Enter path to save image (press Enter for default)",
                Some(DEFAULT_IMAGE_DIR),
            )
            .filter(|answer| !answer.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_DIR.to_string());
        let dir = PathBuf::from(answer.trim());
        self.image_dir = Some(dir.clone());
        dir
    }

    fn report(&mut self, err: &SessionError) {
        match (err, self.config.provider()) {
            (SessionError::Provider(err), Some(Provider::Image)) => {
                self.console.error(&format!("Error generating image: {err}"));
            }
            (SessionError::Provider(err), Some(provider)) => {
                let name = provider.display_name();
                self.console.error(&format!("Error with {name} API: {err}"));
                match err.kind() {
                    ErrorKind::Authentication => self
                        .console
                        .error(&format!("Please check your {name} API key.")),
                    ErrorKind::RateLimit => self.console.error(
                        "Rate limit exceeded. Please wait a moment before trying again.",
                    ),
                    ErrorKind::Generic => {}
                }
            }
            _ => self.console.error(&err.to_string()),
        }
    }

    fn finish(&mut self) {
        if self.config.save_history {
            if self.transcript.is_empty() {
                tracing::debug!("nothing to save, transcript is empty");
            } else {
                self.save_history();
            }
        }

        let activity = match self.config.provider() {
            Some(Provider::Image) => "generating images",
            _ => "chatting",
        };
        self.console.success(&format!("Thanks for {activity}!"));
    }

    fn save_history(&mut self) {
        let path = match &self.config.history_path {
            Some(path) => Some(path.clone()),
            None => self.console.prompt(
                "Enter path to save chat history (press Enter for default)",
                Some(""),
            ),
        };
        let mut target =
            SaveTarget::from_input(path.as_deref(), self.config.history_name.as_deref());
        if target.name.is_none() && !target.is_file_path() {
            let name = self.console.prompt(
                "Enter filename for chat history (press Enter for default timestamp)",
                Some(""),
            );
            target = SaveTarget::from_input(path.as_deref(), name.as_deref());
        }

        match self
            .transcript
            .persist(&target, &self.config.history_label())
            .map_err(SessionError::Io)
        {
            Ok(path) => self
                .console
                .success(&format!("Chat history saved to: {}", path.display())),
            Err(err) => self
                .console
                .error(&format!("Failed to save chat history: {err}")),
        }
    }
}
