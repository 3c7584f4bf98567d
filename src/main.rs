use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use tg_broadcast::broadcast::Dispatcher;
use tg_broadcast::chats::ChatRegistry;
use tg_broadcast::config;
use tg_broadcast::db;
use tg_broadcast::model::{Chat, NewChat, Template, DEFAULT_CHAT_KIND, DEFAULT_PARSE_MODE};
use tg_broadcast::telegram::TelegramMessenger;
use tg_broadcast::templates::TemplateStore;

#[derive(Debug, Parser)]
#[command(author, version, about = "Template broadcaster for Telegram group chats")]
struct Args {
    /// Path to YAML config file; defaults and environment only when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or upgrade the database schema
    InitDb,
    /// Preview or send one template to one chat
    Broadcast {
        /// Template name
        #[arg(long)]
        template: String,
        #[arg(long, allow_negative_numbers = true)]
        chat_id: i64,
        /// Replace the template body for this send only
        #[arg(long)]
        text: Option<String>,
        /// Print the message instead of sending it
        #[arg(long)]
        dry_run: bool,
    },
    /// Send templates to chats and mark them sent
    Send {
        #[arg(long = "template-id", required = true, allow_negative_numbers = true)]
        template_ids: Vec<i64>,
        #[arg(long = "chat-id", allow_negative_numbers = true, required_unless_present = "all_active")]
        chat_ids: Vec<i64>,
        /// Target every active chat instead of explicit ids
        #[arg(long, conflicts_with = "chat_ids")]
        all_active: bool,
        /// Keep going after a failed chat; only fully delivered templates are marked sent
        #[arg(long)]
        isolated: bool,
        #[arg(long)]
        json: bool,
    },
    /// Manage templates
    #[command(subcommand)]
    Template(TemplateCommand),
    /// List active chats
    Chats {
        #[arg(long)]
        json: bool,
    },
    /// Register or toggle chats
    #[command(subcommand)]
    Chat(ChatCommand),
}

#[derive(Debug, Subcommand)]
enum TemplateCommand {
    /// Create a template, or update the one with the same name
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, required_unless_present = "text_file", conflicts_with = "text_file")]
        text: Option<String>,
        /// Read the body from a file
        #[arg(long)]
        text_file: Option<PathBuf>,
        #[arg(long, default_value = DEFAULT_PARSE_MODE)]
        parse_mode: String,
        /// Fail unless the stored version equals this value
        #[arg(long)]
        expect_version: Option<i64>,
    },
    Show {
        name: String,
    },
    List {
        /// Hide templates that were already sent
        #[arg(long)]
        unsent: bool,
        #[arg(long)]
        json: bool,
    },
    Delete {
        name: String,
    },
    /// Delete templates by id; unknown ids are skipped
    DeleteIds {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

#[derive(Debug, Subcommand)]
enum ChatCommand {
    Add {
        #[arg(long, allow_negative_numbers = true)]
        chat_id: i64,
        #[arg(long = "type", default_value = DEFAULT_CHAT_KIND)]
        kind: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    Show {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
    Activate {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
    Deactivate {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref()).context("failed to load configuration")?;

    let pool = db::init_pool(&cfg.app.database_url).await?;
    db::run_migrations(&pool).await?;

    let store = TemplateStore::new(pool.clone());
    let registry = ChatRegistry::new(pool.clone());
    let messenger = Arc::new(TelegramMessenger::new(cfg.telegram.bot_token.clone()));
    let dispatcher = Dispatcher::new(store.clone(), messenger);

    match args.command {
        Command::InitDb => {
            info!(database_url = %cfg.app.database_url, "database initialised");
            println!("Database initialised.");
        }
        Command::Broadcast {
            template,
            chat_id,
            text,
            dry_run,
        } => {
            let result = dispatcher
                .dispatch_one(&template, chat_id, text.as_deref(), dry_run)
                .await?;
            if result.dry_run {
                println!(
                    "[dry-run] would send template '{}' to {}:\n{}",
                    result.template_name, result.chat_id, result.text
                );
            } else {
                println!(
                    "Sent template '{}' to {}.",
                    result.template_name, result.chat_id
                );
            }
        }
        Command::Send {
            template_ids,
            chat_ids,
            all_active,
            isolated,
            json,
        } => {
            let chat_ids = if all_active {
                registry
                    .list_active()
                    .await?
                    .into_iter()
                    .map(|c| c.chat_id)
                    .collect()
            } else {
                chat_ids
            };

            if isolated {
                let report = dispatcher
                    .dispatch_many_isolated(&template_ids, &chat_ids)
                    .await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    for failure in report.failures() {
                        println!(
                            "FAILED {} -> {}: {}",
                            failure.template_name,
                            failure.chat_id,
                            failure.error.as_deref().unwrap_or_default()
                        );
                    }
                    print_templates(&report.sent, false)?;
                }
            } else {
                dispatcher.dispatch_many(&template_ids, &chat_ids).await?;
                print_templates(&store.list(true).await?, json)?;
            }
        }
        Command::Template(cmd) => run_template_command(&store, cmd).await?,
        Command::Chats { json } => print_chats(&registry.list_active().await?, json)?,
        Command::Chat(cmd) => run_chat_command(&registry, cmd).await?,
    }

    Ok(())
}

async fn run_template_command(store: &TemplateStore, cmd: TemplateCommand) -> Result<()> {
    match cmd {
        TemplateCommand::Create {
            name,
            text,
            text_file,
            parse_mode,
            expect_version,
        } => {
            let body = match (text, text_file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("either --text or --text-file is required"),
            };
            let template = match expect_version {
                Some(expected) => {
                    store
                        .update_versioned(&name, expected, &body, Some(&parse_mode))
                        .await?
                }
                None => {
                    store
                        .create_or_update(&name, &body, Some(&parse_mode))
                        .await?
                }
            };
            println!("{}", serde_json::to_string_pretty(&template)?);
        }
        TemplateCommand::Show { name } => {
            let template = store.get(&name).await?;
            println!("{}", serde_json::to_string_pretty(&template)?);
        }
        TemplateCommand::List { unsent, json } => {
            print_templates(&store.list(!unsent).await?, json)?;
        }
        TemplateCommand::Delete { name } => {
            store.delete_by_name(&name).await?;
            println!("Deleted template '{name}'.");
        }
        TemplateCommand::DeleteIds { ids } => {
            let deleted = store.delete(&ids).await?;
            println!("Deleted {deleted} template(s).");
        }
    }
    Ok(())
}

async fn run_chat_command(registry: &ChatRegistry, cmd: ChatCommand) -> Result<()> {
    let chat = match cmd {
        ChatCommand::Add {
            chat_id,
            kind,
            title,
            notes,
        } => {
            registry
                .upsert(&NewChat {
                    chat_id,
                    kind,
                    title,
                    notes,
                })
                .await?
        }
        ChatCommand::Show { chat_id } => registry.get(chat_id).await?,
        ChatCommand::Activate { chat_id } => registry.set_active(chat_id, true).await?,
        ChatCommand::Deactivate { chat_id } => registry.set_active(chat_id, false).await?,
    };
    println!("{}", serde_json::to_string_pretty(&chat)?);
    Ok(())
}

fn print_templates(templates: &[Template], as_json: bool) -> Result<()> {
    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "items": templates }))?
        );
        return Ok(());
    }
    if templates.is_empty() {
        println!("No templates.");
        return Ok(());
    }
    for t in templates {
        let sent = match t.sent_at {
            Some(at) => format!("sent {}", at.to_rfc3339()),
            None => "unsent".to_string(),
        };
        println!(
            "#{:<4} v{:<3} {:<14} {:<9} {}",
            t.id,
            t.version,
            t.parse_mode,
            if t.was_sent { "SENT" } else { "PENDING" },
            t.name
        );
        println!("      updated {} / {}", t.updated_at.to_rfc3339(), sent);
    }
    Ok(())
}

fn print_chats(chats: &[Chat], as_json: bool) -> Result<()> {
    if as_json {
        let items: Vec<_> = chats
            .iter()
            .map(|c| json!({ "chat_id": c.chat_id, "title": c.display_title(), "type": c.kind }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    for c in chats {
        println!("{:>16}  {:<10} {}", c.chat_id, c.kind, c.display_title());
    }
    Ok(())
}
