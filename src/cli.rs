use clap::{Parser, Subcommand};
use gptchat::auth::KeySource;

/// Stream a model's reply to a prompt.
#[derive(Debug, Parser)]
#[command(name = "gptchat")]
#[command(version)]
#[command(about = "Chat with OpenAI models from the terminal", long_about = None)]
pub struct Args {
    /// Model name
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// System prompt placed before the user prompt
    #[arg(short = 's', long = "system")]
    pub system: Option<String>,

    /// Wait for the whole response instead of streaming it
    #[arg(long = "no-stream")]
    pub no_stream: bool,

    /// Transport (default: config/provider or "openai")
    #[arg(long = "provider")]
    pub provider: Option<String>,

    /// Responses API endpoint
    #[arg(long = "endpoint")]
    pub endpoint: Option<String>,

    /// Where to read the API key from: `stored` or `env`
    #[arg(long = "key-source")]
    pub key_source: Option<KeySource>,

    /// Environment variable holding the API key
    #[arg(long = "key-env", value_name = "NAME")]
    pub key_env: Option<String>,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the resolved settings and where they come from
    Config,

    /// Run an interactive terminal chat UI
    #[cfg(feature = "tui")]
    Tui,
}
