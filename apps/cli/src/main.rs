#![deny(warnings)]

//! `todo-mine`: command-line front end for the Todo Mine backend.
//!
//! Every command is routed through the same request surface; `serve` speaks
//! JSON lines over stdin/stdout.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mine_api::{Api, Request, Response};
use mine_core::UserId;
use mine_runtime::{Clock, RuntimeConfig, Services, SystemClock};
use persistence::{GameStateStore, MemoryGameStateStore, MemoryTaskStore, SqliteStore, TaskStore};
use serde_json::{json, Map, Value};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(
    name = "todo-mine",
    about = "Gamified to-do tracker backend",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_SHA"), ")")
)]
struct Cli {
    /// YAML config file (defaults to ./todo-mine.yaml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all todos.
    Todos,
    /// Create a todo.
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// low, medium or high.
        #[arg(long)]
        priority: Option<String>,
        /// work, personal, health, learning or other.
        #[arg(long)]
        category: Option<String>,
    },
    /// Mark a todo complete (pays the reward once).
    Complete { id: String },
    /// Mark a todo incomplete again.
    Reopen { id: String },
    /// Edit a todo's fields.
    Update {
        id: String,
        #[command(flatten)]
        fields: UpdateArgs,
    },
    /// Delete a todo.
    Delete { id: String },
    /// Show game stats.
    Stats,
    /// Override coins, mining power or auto-miner count.
    SetStats {
        #[arg(long)]
        coins: Option<u64>,
        #[arg(long)]
        mining_power: Option<u32>,
        #[arg(long)]
        auto_miners: Option<u32>,
    },
    /// List upgrades with current level and cost.
    Upgrades,
    /// Buy one level of an upgrade.
    Buy { upgrade_id: String },
    /// Run one auto-mining tick.
    Mine,
    /// Health check.
    Health,
    /// Answer JSON-line requests from stdin until EOF.
    Serve,
}

#[derive(Args, Debug)]
struct UpdateArgs {
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    priority: Option<String>,
    #[arg(long)]
    category: Option<String>,
}

/// Object with only the given fields that are set.
fn object(fields: Vec<(&str, Option<Value>)>) -> Value {
    let map: Map<String, Value> = fields
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
        .collect();
    Value::Object(map)
}

impl Command {
    /// The request this command stands for; `None` for `serve`.
    fn to_request(&self) -> Option<Request> {
        let req = match self {
            Command::Todos => Request::get("/api/todos"),
            Command::Add {
                title,
                description,
                priority,
                category,
            } => Request::post(
                "/api/todos",
                Some(object(vec![
                    ("title", Some(json!(title))),
                    ("description", description.as_ref().map(|d| json!(d))),
                    ("priority", priority.as_ref().map(|p| json!(p))),
                    ("category", category.as_ref().map(|c| json!(c))),
                ])),
            ),
            Command::Complete { id } => {
                Request::put(format!("/api/todos/{id}"), json!({ "completed": true }))
            }
            Command::Reopen { id } => {
                Request::put(format!("/api/todos/{id}"), json!({ "completed": false }))
            }
            Command::Update { id, fields } => Request::put(
                format!("/api/todos/{id}"),
                object(vec![
                    ("title", fields.title.as_ref().map(|v| json!(v))),
                    ("description", fields.description.as_ref().map(|v| json!(v))),
                    ("priority", fields.priority.as_ref().map(|v| json!(v))),
                    ("category", fields.category.as_ref().map(|v| json!(v))),
                ]),
            ),
            Command::Delete { id } => Request::delete(format!("/api/todos/{id}")),
            Command::Stats => Request::get("/api/game/stats"),
            Command::SetStats {
                coins,
                mining_power,
                auto_miners,
            } => Request::post(
                "/api/game/stats",
                Some(object(vec![
                    ("coins", coins.map(|v| json!(v))),
                    ("mining_power", mining_power.map(|v| json!(v))),
                    ("auto_miners", auto_miners.map(|v| json!(v))),
                ])),
            ),
            Command::Upgrades => Request::get("/api/game/upgrades"),
            Command::Buy { upgrade_id } => {
                Request::post(format!("/api/game/upgrade/{upgrade_id}"), None)
            }
            Command::Mine => Request::post("/api/game/auto-mine", None),
            Command::Health => Request::get("/api/health"),
            Command::Serve => return None,
        };
        Some(req)
    }
}

fn init_logging(config: &Config) {
    // Logs go to stderr; stdout carries responses.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_stores(config: &Config) -> Result<(Arc<dyn TaskStore>, Arc<dyn GameStateStore>)> {
    if config.uses_memory() {
        info!("using in-memory stores");
        return Ok((
            Arc::new(MemoryTaskStore::new()),
            Arc::new(MemoryGameStateStore::new()),
        ));
    }
    let url = config.database_url.as_str();
    let file = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .filter(|p| !p.starts_with(":memory:"));
    if let Some(parent) = file.and_then(|p| Path::new(p).parent()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = SqliteStore::connect(url)
        .await
        .with_context(|| format!("opening database {url}"))?;
    Ok((Arc::new(store.clone()), Arc::new(store)))
}

async fn build_api(config: &Config) -> Result<Api> {
    let (tasks, game) = open_stores(config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = Services::new(
        tasks,
        game,
        clock.clone(),
        RuntimeConfig {
            max_write_attempts: config.max_write_attempts,
        },
    );
    Ok(Api::new(services, UserId::new(config.user_id.clone()), clock))
}

fn print_response(resp: &Response) -> Result<()> {
    let text = serde_json::to_string_pretty(&resp.body)?;
    if resp.is_success() {
        println!("{text}");
        Ok(())
    } else {
        anyhow::bail!("request failed with status {}: {text}", resp.status)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config);
    info!(database = %config.database_url, user = %config.user_id, "starting todo-mine");

    let api = build_api(&config).await?;
    match cli.command.to_request() {
        Some(req) => print_response(&api.handle(req).await),
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            let handled = mine_api::transport::serve_lines(&api, stdin, tokio::io::stdout()).await?;
            info!(handled, "serve loop finished");
            Ok(())
        }
    }
}
