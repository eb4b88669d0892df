//! CLI commands for Attache using clap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::agents::{AgentRegistry, AgentSlug};
use crate::board::run_board_meeting;
use crate::config::{get_home_dir, load_settings_or_default, Settings};
use crate::providers::ProviderRouter;
use crate::relay::Relay;
use crate::session::SessionStore;
use crate::store::Store;

/// Attache - personal assistant relay.
#[derive(Parser)]
#[command(name = "attache")]
#[command(version = "0.1.0")]
#[command(about = "Attache - personal assistant relay", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Send one message through the relay
    Chat {
        /// Message to send
        message: String,

        /// Agent to address
        #[arg(long, short)]
        agent: Option<String>,
    },

    /// Run a board meeting across all specialists
    Board {
        /// Question for the board
        question: String,

        /// Extra context shared with every specialist
        #[arg(long)]
        context: Option<String>,
    },

    /// Queued action operations
    Actions {
        #[command(subcommand)]
        action: ActionCommand,
    },

    /// Show or set an agent's model routing
    Model {
        /// Agent slug
        agent: String,

        /// Provider name: claude, openrouter, ollama
        #[arg(long)]
        provider: Option<String>,

        /// Model to use
        #[arg(long)]
        model: Option<String>,

        /// Remove the override
        #[arg(long)]
        disable: bool,
    },

    /// Reset an agent's conversation session
    Reset {
        /// Agent slugs to reset
        #[arg(required = true)]
        agents: Vec<String>,
    },

    /// Show current status
    Status,
}

#[derive(Subcommand)]
pub enum ActionCommand {
    /// List actions awaiting approval
    List,

    /// Approve and execute a pending action
    Approve {
        /// Action id
        id: String,
    },

    /// Deny a pending action
    Deny {
        /// Action id
        id: String,
    },
}

/// Shared state assembled once per invocation.
struct App {
    settings: Settings,
    store: Option<Arc<Store>>,
    sessions: Arc<SessionStore>,
    registry: AgentRegistry,
}

impl App {
    fn load() -> Result<Self> {
        let home = get_home_dir()?;
        let settings = load_settings_or_default();
        let store = Store::open_default(&settings);
        let sessions = Arc::new(SessionStore::new(&home));
        let registry = AgentRegistry::load(&home);

        // Startup reconciliation: report actions a previous crash left in
        // approved, whichever command runs. They need a human, never a
        // re-execution.
        let queue = crate::actions::ActionQueue::new(store.clone());
        for stranded in queue.reconcile_startup() {
            eprintln!(
                "⚠ Action {} needs manual review: {}",
                stranded.id, stranded.description
            );
        }

        Ok(Self {
            settings,
            store,
            sessions,
            registry,
        })
    }

    fn router(&self) -> Arc<ProviderRouter> {
        Arc::new(ProviderRouter::from_settings(
            &self.settings,
            self.store.clone(),
            self.sessions.clone(),
        ))
    }
}

impl Commands {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Chat { message, agent } => cmd_chat(message, agent.as_deref()).await,
            Command::Board { question, context } => cmd_board(question, context.as_deref()).await,
            Command::Actions { action } => cmd_actions(action).await,
            Command::Model {
                agent,
                provider,
                model,
                disable,
            } => cmd_model(agent, provider.as_deref(), model.as_deref(), *disable),
            Command::Reset { agents } => cmd_reset(agents),
            Command::Status => cmd_status(),
        }
    }
}

fn resolve_agent(app: &App, agent: Option<&str>) -> Result<AgentSlug> {
    let name = agent
        .or(app.settings.routing.default_agent.as_deref())
        .unwrap_or(AgentSlug::DEFAULT.as_str());
    name.parse::<AgentSlug>().map_err(|e| anyhow::anyhow!(e))
}

async fn cmd_chat(message: &str, agent: Option<&str>) -> Result<()> {
    let app = App::load()?;
    let slug = resolve_agent(&app, agent)?;
    let relay = Relay::new(
        app.router(),
        app.registry,
        app.sessions.clone(),
        app.store.clone(),
    );

    let reply = relay.handle_message(slug, message).await;
    println!("{}", reply.text);

    if !reply.queued_actions.is_empty() {
        println!();
        for action in &reply.queued_actions {
            println!("Pending approval: {}", action.description);
            println!("  approve: attache actions approve {}", action.id);
            println!("  deny:    attache actions deny {}", action.id);
        }
    }
    Ok(())
}

async fn cmd_board(question: &str, context: Option<&str>) -> Result<()> {
    let app = App::load()?;
    let router = app.router();

    let result = run_board_meeting(router, &app.registry, question, context).await;

    for response in &result.responses {
        println!("=== {} ({}ms) ===", response.agent, response.duration_ms);
        println!("{}\n", response.response);
    }
    println!("=== Synthesis ===");
    println!("{}", result.synthesis);
    println!("\nCompleted in {}ms", result.total_duration_ms);
    Ok(())
}

async fn cmd_actions(action: &ActionCommand) -> Result<()> {
    let app = App::load()?;
    let queue = crate::actions::ActionQueue::new(app.store.clone());

    match action {
        ActionCommand::List => {
            let pending = queue.pending_actions();
            if pending.is_empty() {
                println!("No pending actions.");
                return Ok(());
            }
            for action in pending {
                println!("{}  {}", action.id, action.description);
            }
        }
        ActionCommand::Approve { id } => {
            let outcome = queue.approve_action(id);
            if outcome.success {
                println!("{}", outcome.description);
            } else {
                anyhow::bail!("{}", outcome.description);
            }
        }
        ActionCommand::Deny { id } => {
            let outcome = queue.deny_action(id);
            if outcome.success {
                println!("{}", outcome.description);
            } else {
                anyhow::bail!("{}", outcome.description);
            }
        }
    }
    Ok(())
}

fn cmd_model(
    agent: &str,
    provider: Option<&str>,
    model: Option<&str>,
    disable: bool,
) -> Result<()> {
    let app = App::load()?;
    let slug: AgentSlug = agent.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let configs = crate::models::ModelConfigStore::new(app.store.clone());

    if disable {
        let Some(mut config) = configs.get(slug.as_str()) else {
            println!("{}: no model override set", slug);
            return Ok(());
        };
        config.enabled = false;
        configs.set(&config)?;
        println!("{}: model override disabled", slug);
        return Ok(());
    }

    match (provider, model) {
        (Some(provider), Some(model)) => {
            let provider = provider
                .parse::<crate::providers::ProviderKind>()
                .map_err(|e| anyhow::anyhow!(e))?;
            configs.set(&crate::models::ModelConfig {
                agent: slug.as_str().to_string(),
                provider,
                model: model.to_string(),
                enabled: true,
            })?;
            println!("{}: routed to {}/{}", slug, provider, model);
        }
        (None, None) => match configs.get(slug.as_str()) {
            Some(config) => println!("{}: {}/{}", slug, config.provider, config.model),
            None => println!("{}: provider chain defaults", slug),
        },
        _ => anyhow::bail!("--provider and --model must be given together"),
    }
    Ok(())
}

fn cmd_reset(agents: &[String]) -> Result<()> {
    let app = App::load()?;
    for name in agents {
        let slug: AgentSlug = name.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        app.sessions.clear(slug)?;
        println!("Reset session for {}", slug);
    }
    Ok(())
}

fn cmd_status() -> Result<()> {
    let app = App::load()?;

    println!("Provider:  {}", app.settings.models.provider);
    println!(
        "Fallback:  {}",
        if app.settings.models.fallback_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "Store:     {}",
        if app.store.is_some() {
            "available"
        } else {
            "unavailable"
        }
    );

    let active = app.sessions.active_slugs();
    if active.is_empty() {
        println!("Sessions:  none");
    } else {
        println!("Sessions:  {}", active.join(", "));
    }

    if let Some(store) = &app.store {
        let queue = crate::actions::ActionQueue::new(Some(store.clone()));
        println!("Pending:   {} action(s)", queue.pending_actions().len());
        if let Ok(cost) = store.total_cost() {
            println!("Est. cost: ${:.4}", cost);
        }
    }
    Ok(())
}
