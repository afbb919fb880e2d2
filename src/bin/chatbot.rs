use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::Parser;
use colored::*;
use console_chatbot::config::SessionConfig;
use console_chatbot::repl::terminal::{colored_labels, EditorReader, SpinnerProgress};
use console_chatbot::repl::{start_session, ChatLoop, Labels, PlainReader};
use console_chatbot::LLMError;

/// Command line arguments for the chatbot
#[derive(Parser)]
#[clap(
    name = "chatbot",
    about = "Simple console chatbot for models hosted on OpenRouter"
)]
struct CliArgs {
    /// Model identifier to request
    #[arg(long)]
    model: Option<String>,

    /// System prompt sent with every message
    #[arg(long)]
    system: Option<String>,

    /// Maximum tokens in each reply
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long)]
    base_url: Option<String>,

    /// Wait for the complete reply instead of streaming it
    #[arg(long)]
    no_stream: bool,

    /// Dotenv file read when OPENROUTER_API_KEY is not set (default: nearest .env)
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

/// Resolves the credential from the environment, then the dotenv file, and
/// applies the command line overrides.
fn resolve_config(args: &CliArgs) -> Result<SessionConfig, LLMError> {
    let mut config = SessionConfig::from_lookup_or_file(
        |key| std::env::var(key).ok(),
        args.env_file.as_deref(),
    )?;

    if let Some(model) = &args.model {
        config = config.model(model);
    }
    if let Some(system) = &args.system {
        config = config.system(system);
    }
    if let Some(base_url) = &args.base_url {
        config = config.base_url(base_url);
    }
    if let Some(max_tokens) = args.max_tokens {
        config = config.max_tokens(max_tokens)?;
    }
    if args.no_stream {
        config = config.stream(false);
    }
    Ok(config)
}

/// Main entry point for the chatbot
///
/// Exits cleanly, without entering the loop, when no API key is configured.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    console_chatbot::init_logging();
    let args = CliArgs::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    let mut stdout = io::stdout();
    let Some(session) = start_session(resolve_config(&args), &mut stdout)? else {
        return Ok(());
    };

    if io::stdin().is_terminal() {
        let labels = if args.no_color {
            Labels::default()
        } else {
            colored_labels()
        };
        let mut chat = ChatLoop::new(session)
            .labels(labels)
            .progress(Box::new(SpinnerProgress::new()));
        let mut reader = EditorReader::new()?;
        if let Err(e) = chat.run(&mut reader, &mut stdout).await {
            eprintln!("{} {e}", "Error:".bright_red());
        }
    } else {
        let mut chat = ChatLoop::new(session);
        let mut reader = PlainReader::new(io::stdin().lock(), io::stdout());
        chat.run(&mut reader, &mut stdout).await?;
    }

    Ok(())
}
