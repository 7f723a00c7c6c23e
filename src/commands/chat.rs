use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Args;

use crate::config::{self, Credentials, ProfileConfig, SessionConfig};
use crate::console::{Console, TerminalConsole};
use crate::rchain::provider::{HttpGateway, Provider};
use crate::session::SessionLoop;

#[derive(Debug, Args, Clone, Default)]
pub struct ChatArgs {
    #[arg(help = "Initial text for the conversation")]
    pub text: Option<String>,
    #[arg(short = 'T', long, help = "Temperature for the model (0 to 2)")]
    pub temperature: Option<f32>,
    #[arg(short = 'M', long, help = "Maximum number of tokens to generate")]
    pub max_tokens: Option<u32>,
    #[arg(short = 'S', long, help = "Stream the response")]
    pub stream: bool,
    #[arg(
        short = 'p',
        long,
        visible_alias = "model-type",
        help = "Provider to use (openai, groq, or image)"
    )]
    pub provider: Option<String>,
    #[arg(short = 'o', long, help = "Model used with the openai provider")]
    pub openai_model: Option<String>,
    #[arg(short = 'g', long, help = "Model used with the groq provider")]
    pub groq_model: Option<String>,
    #[arg(short = 's', long, help = "Save chat history to a file on exit")]
    pub save: bool,
    #[arg(short = 'i', long, help = "Directory to save generated images")]
    pub image_dir: Option<PathBuf>,
    #[arg(long, help = "History file or directory (skips the save prompt)")]
    pub save_path: Option<String>,
    #[arg(long, help = "History file name inside the save directory")]
    pub save_name: Option<String>,
    #[arg(long, help = "Profile name from the config file")]
    pub profile: Option<String>,
    #[arg(short, long, help = "Log requests and session events to stderr")]
    pub verbose: bool,
    #[arg(short, long, help = "Silence all diagnostics")]
    pub quiet: bool,
}

pub fn run(args: ChatArgs) -> Result<(), String> {
    let profile = match args.profile.as_deref() {
        Some(name) => config::load_profile(name)?,
        None => ProfileConfig::default(),
    };
    let session_config = resolve_session_config(&args, &profile, config::env_value)?;
    session_config.validate()?;

    let credentials = Credentials::from_env();
    credentials.ensure_present(session_config.provider())?;
    tracing::debug!(
        provider = %session_config.provider_name,
        ?credentials,
        stream = session_config.stream,
        save = session_config.save_history,
        "starting session"
    );

    let gateway = HttpGateway::new(credentials);
    let mut console = TerminalConsole::stdio();
    let mode = match session_config.provider() {
        Some(Provider::Image) => "image generation",
        _ => "chat",
    };
    console.success(&format!(
        "Starting interactive {mode} with model type: {}",
        session_config.provider_name
    ));
    if let Some(text) = args.text.as_deref().filter(|text| !text.trim().is_empty()) {
        console.info(&format!("Initial text: {text}"));
    }

    let transcript = SessionLoop::new(&session_config, &gateway, &mut console)
        .with_initial_text(args.text)
        .run();
    tracing::debug!(turns = transcript.len(), "session ended");
    Ok(())
}

/// Merges CLI flags, `MPCHAT_*` variables, the profile, and defaults, in that order.
pub fn resolve_session_config(
    args: &ChatArgs,
    profile: &ProfileConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SessionConfig, String> {
    let defaults = SessionConfig::default();

    let provider_name = args
        .provider
        .clone()
        .or_else(|| env("MPCHAT_PROVIDER"))
        .or_else(|| profile.provider.clone())
        .unwrap_or(defaults.provider_name);
    let temperature = match args.temperature {
        Some(value) => value,
        None => env_parsed(&env, "MPCHAT_TEMPERATURE")?
            .or(profile.temperature)
            .unwrap_or(defaults.temperature),
    };
    let max_tokens = match args.max_tokens {
        Some(value) => value,
        None => env_parsed(&env, "MPCHAT_MAX_TOKENS")?
            .or(profile.max_tokens)
            .unwrap_or(defaults.max_tokens),
    };
    let turn_delay = env_parsed::<u64>(&env, "MPCHAT_TURN_DELAY_MS")?
        .or(profile.turn_delay_ms)
        .map(Duration::from_millis)
        .unwrap_or(defaults.turn_delay);

    Ok(SessionConfig {
        provider_name: provider_name.trim().to_string(),
        openai_model: args
            .openai_model
            .clone()
            .or_else(|| profile.openai_model.clone())
            .unwrap_or(defaults.openai_model),
        groq_model: args
            .groq_model
            .clone()
            .or_else(|| profile.groq_model.clone())
            .unwrap_or(defaults.groq_model),
        temperature,
        max_tokens,
        stream: args.stream || profile.stream.unwrap_or(defaults.stream),
        save_history: args.save || profile.save.unwrap_or(defaults.save_history),
        image_dir: args
            .image_dir
            .clone()
            .or_else(|| profile.image_dir.as_ref().map(PathBuf::from)),
        history_path: args.save_path.clone().or_else(|| profile.history_path.clone()),
        history_name: args.save_name.clone(),
        turn_delay,
    })
}

fn env_parsed<T: FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, String> {
    env(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| format!("Invalid {name} '{raw}'."))
        })
        .transpose()
}
