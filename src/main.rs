use std::sync::Arc;

use anyhow::Context;
use botchat::agent::CompletionClient;
use botchat::agent::providers;
use botchat::config;
use botchat::orchestrator::events::EventKind;
use botchat::orchestrator::{
    Orchestrator, ReactionChange, RegenerateOutcome, SendOutcome,
};
use botchat::secrets;
use botchat::store::{FileCache, InMemoryStore, LocalCache, MemoryCache};
use botchat::types::{ChatEntry, FeedbackScore, LocalKind, Message, NewBot, Personality, Sender};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "botchat")]
#[command(about = "Chat with personality-driven AI companions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat with a new bot
    Chat {
        /// Bot name
        #[arg(short, long, default_value = "Pip")]
        name: String,

        /// What the bot is, e.g. "study buddy"
        #[arg(short, long)]
        role: Option<String>,

        /// Humor level, 0-100
        #[arg(long, default_value = "50")]
        humor: i64,

        /// Empathy level, 0-100
        #[arg(long, default_value = "50")]
        empathy: i64,

        /// Creativity level, 0-100
        #[arg(long, default_value = "50")]
        creativity: i64,

        /// Formality level, 0-100
        #[arg(long, default_value = "50")]
        formality: i64,
    },

    /// Store an API key for a completion provider
    Auth {
        /// anthropic or openai
        provider: String,
    },

    /// Show resolved configuration
    Status,
}

const HELP: &str = "\
commands:
  /regen                 regenerate the last reply
  /clear                 delete every message
  /summary               summarize the conversation
  /suggest               suggest what to say next
  /search <text>         search messages
  /offline, /online      simulate connectivity changes
  /react <n> <emoji>     toggle a reaction on message n
  /feedback <n> <score>  rate message n with -1, 0 or 1
  /history               list messages with their numbers
  /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            name,
            role,
            humor,
            empathy,
            creativity,
            formality,
        } => {
            let personality = Personality::new(humor, empathy, creativity, formality)?;
            let mut bot = NewBot::new(name);
            if let Some(role) = role {
                bot.role = role;
            }
            bot.personality = Some(personality);
            chat(bot).await
        }
        Commands::Auth { provider } => {
            if !["anthropic", "openai"].contains(&provider.as_str()) {
                anyhow::bail!("unknown provider '{provider}': expected anthropic or openai");
            }
            let key = rpassword::prompt_password(format!("{provider} API key: "))
                .context("failed to read API key")?;
            let key = key.trim();
            if key.is_empty() {
                anyhow::bail!("no key entered");
            }
            let path = secrets::store_api_key(&provider, key)?;
            println!("saved {provider} key to {}", path.display());
            Ok(())
        }
        Commands::Status => {
            let cfg = config::load()?;
            println!("botchat v{}", env!("CARGO_PKG_VERSION"));
            println!("config: {}", config::config_path().display());
            println!(
                "provider: {} ({})",
                cfg.completion.provider, cfg.completion.model
            );
            println!(
                "api key: {}",
                if cfg.completion.api_key.is_some() {
                    "configured"
                } else {
                    "missing"
                }
            );
            println!("context window: {}", cfg.orchestrator.context_window);
            match cfg.cache.resolved_path() {
                Some(path) => println!("cache: {}", path.display()),
                None => println!("cache: in-memory"),
            }
            Ok(())
        }
    }
}

async fn chat(bot: NewBot) -> anyhow::Result<()> {
    let cfg = config::load()?;
    let provider = providers::from_config(&cfg.completion)?;
    let completion = CompletionClient::new(Arc::from(provider), cfg.completion.max_tokens);
    let cache: Arc<dyn LocalCache> = match cfg.cache.resolved_path() {
        Some(dir) => Arc::new(FileCache::open(dir)?),
        None => Arc::new(MemoryCache::new()),
    };
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(
        Uuid::new_v4(),
        store,
        cache,
        completion,
        cfg.orchestrator.clone(),
    );

    let bot = orchestrator.create_bot(bot).await?;
    let conversation = orchestrator.create_conversation(bot.id).await?;

    let mut events = orchestrator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.kind {
                EventKind::Notice(text) => println!("  ({text})"),
                EventKind::Error(text) => eprintln!("  [error] {text}"),
                EventKind::Connectivity(online) => {
                    println!("  ({})", if online { "online" } else { "offline" })
                }
                _ => {}
            }
        }
    });

    println!("{} {} is here. Type /help for commands.", bot.emoji, bot.name);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.strip_prefix('/') {
            Some(cmd) => cmd.split_once(' ').unwrap_or((cmd, "")),
            None => ("", line),
        };
        let rest = rest.trim();

        let result: anyhow::Result<bool> = async {
            match command {
                "" => match orchestrator
                    .send_message(conversation, rest, Vec::new(), None)
                    .await?
                {
                    SendOutcome::Delivered { reply, .. } => say(&bot.name, &reply),
                    SendOutcome::Queued { .. } => println!("  (queued)"),
                    SendOutcome::ReplyFailed {
                        retry_scheduled, ..
                    } => {
                        if retry_scheduled {
                            println!("  (reply failed, will retry on /online)");
                        }
                    }
                },
                "help" => println!("{HELP}"),
                "quit" | "exit" => return Ok(false),
                "regen" => {
                    if let RegenerateOutcome::Regenerated { reply, .. } =
                        orchestrator.regenerate_response(conversation).await?
                    {
                        say(&bot.name, &reply);
                    }
                }
                "clear" => {
                    let removed = orchestrator.clear_chat(conversation).await?;
                    println!("  (removed {removed} messages)");
                }
                "summary" => {
                    if let Some(summary) = orchestrator
                        .generate_conversation_summary(conversation)
                        .await?
                    {
                        println!("  {summary}");
                    }
                }
                "suggest" => {
                    for suggestion in orchestrator.generate_suggestions(conversation).await? {
                        println!("  - {suggestion}");
                    }
                }
                "search" => {
                    for m in orchestrator.search_messages(conversation, rest).await? {
                        println!("  [{}] {}", m.created_at.format("%H:%M"), m.content);
                    }
                }
                "offline" => {
                    orchestrator.set_online(false).await;
                }
                "online" => {
                    for (_, report) in orchestrator.set_online(true).await {
                        println!(
                            "  (synced: {} delivered, {} requeued, {} failed)",
                            report.delivered, report.requeued, report.failed
                        );
                    }
                }
                "react" => {
                    let (index, emoji) = rest.split_once(' ').unwrap_or((rest, "❤️"));
                    let target = nth_message(&orchestrator, conversation, index).await?;
                    match orchestrator.add_message_reaction(target.id, emoji).await? {
                        ReactionChange::Added => println!("  (added {emoji})"),
                        ReactionChange::Removed => println!("  (removed {emoji})"),
                    }
                }
                "feedback" => {
                    let (index, score) = rest
                        .split_once(' ')
                        .context("usage: /feedback <n> <score>")?;
                    let score: i64 = score.trim().parse().context("score must be -1, 0 or 1")?;
                    let score = FeedbackScore::try_from(score)?;
                    let target = nth_message(&orchestrator, conversation, index).await?;
                    let outcome = orchestrator.submit_feedback(target.id, score).await?;
                    if let Some(note) = outcome.learned {
                        println!("  (learned: {note})");
                    }
                }
                "history" => {
                    for (i, entry) in orchestrator.messages(conversation).await?.iter().enumerate() {
                        print_entry(i + 1, &bot.name, entry);
                    }
                }
                other => println!("  unknown command /{other}, try /help"),
            }
            Ok(true)
        }
        .await;

        match result {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("  error: {e}"),
        }
    }

    Ok(())
}

fn say(name: &str, message: &Message) {
    println!("{name}: {}", message.content);
}

fn print_entry(n: usize, bot_name: &str, entry: &ChatEntry) {
    let who = match entry.sender() {
        Sender::User => "you",
        Sender::Bot => bot_name,
    };
    let status = match entry.local_kind() {
        Some(LocalKind::Queued) => " (queued)",
        Some(LocalKind::Sending) => " (sending)",
        Some(LocalKind::Typing) => " (typing)",
        _ => "",
    };
    let reactions = entry
        .persisted()
        .map(|m| {
            m.reactions
                .iter()
                .map(|r| format!(" {}x{}", r.emoji, r.count))
                .collect::<String>()
        })
        .unwrap_or_default();
    println!("{n:>3}. {who}: {}{status}{reactions}", entry.content());
}

/// Resolve a 1-based index from `/history` to a stored message.
async fn nth_message(
    orchestrator: &Orchestrator,
    conversation: Uuid,
    index: &str,
) -> anyhow::Result<Message> {
    let n: usize = index.trim().parse().context("message number expected")?;
    let entries = orchestrator.messages(conversation).await?;
    entries
        .get(n.saturating_sub(1))
        .and_then(ChatEntry::persisted)
        .cloned()
        .with_context(|| format!("message {n} is not stored yet"))
}
