use clap::{Parser, Subcommand};

use crate::core::config::Config;
use crate::server;

mod ask;

#[derive(Parser)]
#[command(name = "pundit")]
#[command(about = "Persona-driven chat that streams answers as bullet lists")]
#[command(long_about = "Pundit serves a persona-driven chat surface backed by an \
OpenAI-compatible API, streaming answers over Server-Sent Events and rendering \
them as bullet lists.\n\n\
Environment Variables:\n\
  PUNDIT_API_KEY / OPENAI_API_KEY    Backend API key\n\
  PUNDIT_BASE_URL / OPENAI_BASE_URL  Backend base URL (default https://api.openai.com/v1)\n\
  PUNDIT_MODEL                       Model identifier\n\
  PUNDIT_BIND                        Server bind address (default 127.0.0.1:3000)\n\
  PUNDIT_IDLE_TIMEOUT_SECS           Fail a stream with no data for this long (default 30)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (the default when no command is given)
    Serve {
        /// Bind address, e.g. 127.0.0.1:3000
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Ask a running server one question and print the answer as bullets
    Ask {
        /// The question text
        question: Vec<String>,
        /// Persona key (e.g. general, sports, medical, java, ai-interview)
        #[arg(short, long, default_value = "general")]
        expert: String,
        /// Base URL of the pundit server
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        server: String,
        /// Use the blocking /chat route instead of streaming
        #[arg(long)]
        no_stream: bool,
    },
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = Config::load()?;

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            server::start_server(&config).await
        }
        Command::Ask {
            question,
            expert,
            server,
            no_stream,
        } => ask::run_ask(question, expert, server, no_stream, &config).await,
    }
}
