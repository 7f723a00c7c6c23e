use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::rchain::openai::{GROQ_BASE_URL, OPENAI_BASE_URL};
use crate::rchain::provider::Provider;

pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_GROQ_MODEL: &str = "llama3-8b-8192";
pub const DEFAULT_TEMPERATURE: f32 = 0.5;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TURN_DELAY: Duration = Duration::from_secs(1);

/// Settings for one interactive session, fixed once the loop starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Provider as typed by the user; resolved at dispatch time.
    pub provider_name: String,
    pub openai_model: String,
    pub groq_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub save_history: bool,
    pub image_dir: Option<PathBuf>,
    pub history_path: Option<String>,
    pub history_name: Option<String>,
    /// Pause between turns.
    pub turn_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider_name: DEFAULT_PROVIDER.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            groq_model: DEFAULT_GROQ_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: false,
            save_history: false,
            image_dir: None,
            history_path: None,
            history_name: None,
            turn_delay: DEFAULT_TURN_DELAY,
        }
    }
}

impl SessionConfig {
    pub fn provider(&self) -> Option<Provider> {
        Provider::parse(&self.provider_name)
    }

    pub fn model_for(&self, provider: Provider) -> &str {
        match provider {
            Provider::Groq => &self.groq_model,
            Provider::Openai | Provider::Image => &self.openai_model,
        }
    }

    /// Lowercased provider name used in generated history file names.
    pub fn history_label(&self) -> String {
        self.provider_name.trim().to_ascii_lowercase()
    }

    /// Rejects values the providers would refuse anyway.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!(
                "Temperature must be between 0 and 2, got {}.",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            return Err("Max tokens must be greater than 0.".to_string());
        }
        Ok(())
    }
}

/// Secrets and endpoints read from the environment at startup.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub image_url: Option<String>,
    pub openai_base_url: String,
    pub groq_base_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key_present", &self.openai_api_key.is_some())
            .field("groq_api_key_present", &self.groq_api_key.is_some())
            .field("image_url", &self.image_url)
            .field("openai_base_url", &self.openai_base_url)
            .field("groq_base_url", &self.groq_base_url)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: env_value("OPENAI_API_KEY"),
            groq_api_key: env_value("GROQ_API_KEY"),
            image_url: env_value("APP_URL"),
            openai_base_url: env_value("OPENAI_BASE_URL")
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            groq_base_url: env_value("GROQ_BASE_URL").unwrap_or_else(|| GROQ_BASE_URL.to_string()),
        }
    }

    /// Fails when the selected provider has nothing to authenticate with.
    ///
    /// Unknown provider names pass: they are reported on every turn instead.
    pub fn ensure_present(&self, provider: Option<Provider>) -> Result<(), String> {
        let Some(provider) = provider else {
            return Ok(());
        };
        let present = match provider {
            Provider::Openai => self.openai_api_key.is_some(),
            Provider::Groq => self.groq_api_key.is_some(),
            Provider::Image => self.image_url.is_some(),
        };
        if present {
            Ok(())
        } else {
            Err(format!(
                "Error: {} environment variable is not set.",
                provider.credential_env()
            ))
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(base_url: &str) -> Self {
        Self {
            openai_api_key: Some("sk-test".to_string()),
            groq_api_key: Some("gsk-test".to_string()),
            image_url: Some(format!("{base_url}/image")),
            openai_base_url: base_url.to_string(),
            groq_base_url: base_url.to_string(),
        }
    }
}

/// Trimmed, non-empty value of an environment variable.
pub fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProfileConfig {
    pub provider: Option<String>,
    pub openai_model: Option<String>,
    pub groq_model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: Option<bool>,
    pub save: Option<bool>,
    pub image_dir: Option<String>,
    pub history_path: Option<String>,
    pub turn_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    profiles: Option<HashMap<String, ProfileConfig>>,
}

pub fn load_profile(name: &str) -> Result<ProfileConfig, String> {
    let path = config_path()?;
    let raw = fs::read_to_string(&path)
        .map_err(|err| format!("Failed to read config file '{}': {err}", path.display()))?;
    parse_profile(&raw, name, &path)
}

fn parse_profile(raw: &str, name: &str, path: &std::path::Path) -> Result<ProfileConfig, String> {
    let config: ConfigFile = toml::from_str(raw)
        .map_err(|err| format!("Failed to parse config file '{}': {err}", path.display()))?;

    let profiles = config.profiles.ok_or_else(|| {
        format!(
            "Config file '{}' does not contain a [profiles] section.",
            path.display()
        )
    })?;

    profiles.get(name).cloned().ok_or_else(|| {
        format!(
            "Profile '{}' not found in config file '{}'.",
            name,
            path.display()
        )
    })
}

fn config_path() -> Result<PathBuf, String> {
    if let Some(path) = env_value("MPCHAT_CONFIG") {
        return Ok(PathBuf::from(path));
    }

    if let Some(xdg) = env_value("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("mpchat").join("config.toml"));
    }

    let home = env_value("HOME").ok_or_else(|| {
        "Cannot resolve config path: set MPCHAT_CONFIG or HOME/XDG_CONFIG_HOME.".to_string()
    })?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("mpchat")
        .join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::{Credentials, SessionConfig, parse_profile};
    use crate::rchain::provider::Provider;
    use std::path::Path;

    #[test]
    fn profile_fields_are_read_from_named_table() {
        let raw = "[profiles.fast]\nprovider = \"groq\"\ngroq_model = \"llama3-70b\"\nstream = true\nturn_delay_ms = 0\n";
        let profile = parse_profile(raw, "fast", Path::new("config.toml")).expect("profile");
        assert_eq!(profile.provider.as_deref(), Some("groq"));
        assert_eq!(profile.groq_model.as_deref(), Some("llama3-70b"));
        assert_eq!(profile.stream, Some(true));
        assert_eq!(profile.turn_delay_ms, Some(0));
        assert!(profile.temperature.is_none());
    }

    #[test]
    fn missing_profiles_table_and_unknown_name_are_errors() {
        let path = Path::new("config.toml");
        let no_table = parse_profile("title = \"x\"\n", "fast", path).expect_err("no table");
        assert!(no_table.contains("does not contain a [profiles] section"));

        let unknown = parse_profile("[profiles.slow]\n", "fast", path).expect_err("unknown");
        assert!(unknown.contains("Profile 'fast' not found"));

        let broken = parse_profile("[profiles.fast\n", "fast", path).expect_err("broken");
        assert!(broken.contains("Failed to parse config file"));
    }

    #[test]
    fn validation_enforces_temperature_and_token_bounds() {
        assert!(SessionConfig::default().validate().is_ok());

        let hot = SessionConfig {
            temperature: 2.5,
            ..SessionConfig::default()
        };
        assert!(hot.validate().unwrap_err().contains("between 0 and 2"));

        let empty = SessionConfig {
            max_tokens: 0,
            ..SessionConfig::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn credentials_are_checked_only_for_known_providers() {
        let credentials = Credentials {
            groq_api_key: Some("gsk".to_string()),
            ..Credentials::default()
        };
        assert!(credentials.ensure_present(Some(Provider::Groq)).is_ok());
        assert_eq!(
            credentials.ensure_present(Some(Provider::Openai)),
            Err("Error: OPENAI_API_KEY environment variable is not set.".to_string())
        );
        assert_eq!(
            credentials.ensure_present(Some(Provider::Image)),
            Err("Error: APP_URL environment variable is not set.".to_string())
        );
        assert!(credentials.ensure_present(None).is_ok());
    }

    #[test]
    fn debug_output_hides_keys() {
        let credentials = Credentials {
            openai_api_key: Some("sk-secret".to_string()),
            ..Credentials::default()
        };
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("openai_api_key_present: true"));
    }
}
