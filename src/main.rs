use std::io;
use std::process;

use clap::{CommandFactory, Parser, ValueEnum};
use clap_complete::{generate, shells};
use mpchat::commands::chat::{self, ChatArgs};
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit: ",
    env!("MPCHAT_GIT_SHA"),
    ", built: ",
    env!("MPCHAT_BUILD_TS"),
    ")"
);

const HELP_EXAMPLES: &str = "Examples:\n  mpchat \"Tell me a joke\"\n  mpchat --provider groq --stream --save\n  mpchat --provider image --image-dir ./pictures \"a lighthouse at dusk\"\n  mpchat --completion bash > ~/.local/share/bash-completion/completions/mpchat\n\nType 'exit' to end the session.";

#[derive(Debug, Parser)]
#[command(
    name = "mpchat",
    about = "Interactive chat with hosted LLM and image providers",
    version = VERSION,
    after_help = HELP_EXAMPLES
)]
struct Cli {
    #[command(flatten)]
    chat: ChatArgs,
    #[arg(
        long,
        value_enum,
        value_name = "SHELL",
        help = "Print a shell completion script and exit"
    )]
    completion: Option<CompletionShell>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn print_completion(shell: CompletionShell) {
    let mut cmd = Cli::command();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, "mpchat", &mut io::stdout()),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, "mpchat", &mut io::stdout()),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, "mpchat", &mut io::stdout()),
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("mpchat=debug")
    } else {
        EnvFilter::try_from_env("MPCHAT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Some(shell) = cli.completion {
        print_completion(shell);
        return;
    }

    init_logging(cli.chat.verbose, cli.chat.quiet);

    if let Err(err) = chat::run(cli.chat) {
        eprintln!("{err}");
        process::exit(1);
    }
}
