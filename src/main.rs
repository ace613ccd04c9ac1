use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use colored::*;

use policy_chat::app::App;
use policy_chat::tui::{self, EventHandler, Tui, TICK_RATE};
use policy_chat::{handler, logging, ui};
use policy_chat::{Attachment, AttachmentController, BackendClient, ChatMessage, Config, ConversationController};

#[derive(Parser)]
#[command(name = "policy-chat")]
#[command(about = "Chat with your documents through a RAG backend")]
#[command(version)]
struct Cli {
    /// Backend base URL (overrides the config file)
    #[arg(long, global = true, env = "POLICY_CHAT_BASE_URL")]
    base_url: Option<String>,
    /// Document upload path on the backend (overrides the config file)
    #[arg(long, global = true, env = "POLICY_CHAT_UPLOAD_PATH")]
    upload_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat (default)
    Chat,
    /// Ask a single question and print the answer with its sources
    Ask {
        /// Your question
        question: String,
    },
    /// Upload a PDF for indexing
    Upload {
        /// Path to the PDF
        path: PathBuf,
    },
    /// Summarize every uploaded document
    Summarize,
    /// Check that the backend is reachable
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A broken config file is reported rather than silently replaced
    let config = Config::load()?.with_overrides(cli.base_url, cli.upload_path);

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(&config).await,
        Commands::Ask { question } => {
            logging::init_stderr();
            ask_once(&config, &question).await
        }
        Commands::Upload { path } => {
            logging::init_stderr();
            upload_once(&config, &path).await
        }
        Commands::Summarize => {
            logging::init_stderr();
            summarize_once(&config).await
        }
        Commands::Health => {
            logging::init_stderr();
            check_health(&config).await
        }
    }
}

fn client_for(config: &Config) -> Result<BackendClient> {
    Ok(BackendClient::new(&config.base_url, &config.upload_path, config.request_timeout())?)
}

async fn run_chat(config: &Config) -> Result<()> {
    // Logging is best effort; the UI works without it
    let log_path = logging::init_file().ok();
    tracing::info!(base_url = %config.base_url, log = ?log_path, "starting chat");

    let mut app = App::new(config)?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    app.check_health();

    let mut events = EventHandler::new(TICK_RATE);
    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

fn print_reply(message: &ChatMessage) {
    println!("{}", "Answer:".bold().green());
    println!("{}", message.text);

    if !message.sources.is_empty() {
        println!("\n{}", "Sources:".bold().blue());
        for source in &message.sources {
            println!("• {}", source.label().yellow());
        }
    }
}

async fn ask_once(config: &Config, question: &str) -> Result<()> {
    let mut conversation = ConversationController::new(client_for(config)?);

    if !conversation.submit_question(question, false) {
        bail!("question must not be empty");
    }
    println!("🤖 Asking {}...\n", config.base_url.bold().magenta());
    conversation.settle().await;

    if conversation.last_exchange_failed() {
        bail!("could not get an answer from {}", config.base_url);
    }
    if let Some(reply) = conversation.messages().last() {
        print_reply(reply);
    }
    Ok(())
}

async fn upload_once(config: &Config, path: &Path) -> Result<()> {
    let attachment = Attachment::from_path(path).await?;
    let mut uploads = AttachmentController::new(client_for(config)?, config.notice_lifetime());

    if uploads.select_file(attachment) {
        println!("📄 {}", uploads.status().unwrap_or_default().dimmed());
        uploads.settle().await;
    }

    if let Some(error) = uploads.error() {
        bail!("{}", error);
    }
    if let Some(status) = uploads.status() {
        println!("{}", status.green());
    }
    Ok(())
}

async fn summarize_once(config: &Config) -> Result<()> {
    let mut conversation = ConversationController::new(client_for(config)?);
    conversation.request_summary(false);
    conversation.settle().await;

    if conversation.last_exchange_failed() {
        bail!("could not get a summary from {}", config.base_url);
    }
    if let Some(reply) = conversation.messages().last() {
        println!("{}", "Summary:".bold().green());
        println!("{}", reply.text);
    }
    Ok(())
}

async fn check_health(config: &Config) -> Result<()> {
    match client_for(config)?.health().await {
        Ok(health) => {
            let status = health.status.unwrap_or_else(|| "ok".to_string());
            println!("{} {} ({})", "●".green(), config.base_url.bold(), status);
            Ok(())
        }
        Err(e) => {
            println!("{} {}: {}", "●".red(), config.base_url.bold(), e);
            println!("Make sure the backend is running and reachable");
            bail!("backend unreachable")
        }
    }
}
