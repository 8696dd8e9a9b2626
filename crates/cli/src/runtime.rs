//! Shared wiring for the `agent` and `daemon` commands.

use picoclaw_agent::{AgentLoop, ContextBuilder, CurrentUser, MemoryStore, SessionStore};
use picoclaw_config::{builtin_skills_path, global_skills_path, state_dir, Config};
use picoclaw_core::{MessageBus, OutboundMessage, Provider, ToolRegistry};
use picoclaw_providers::OpenAiCompatProvider;
use picoclaw_tools::{MemoryAppendTool, MemoryReadTool, MemoryWriteTool, MessageTool, UserIdProvider};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

pub struct Runtime {
    pub bus: Arc<MessageBus>,
    pub agent: Arc<AgentLoop>,
    pub config: Arc<RwLock<Config>>,
    pub config_path: PathBuf,
}

/// Bridges the loop's user binding into the tools' provider seam.
struct CurrentUserAdapter(CurrentUser);

impl UserIdProvider for CurrentUserAdapter {
    fn current_user_id(&self) -> String {
        self.0.get()
    }
}

fn build_tools(
    workspace: &std::path::Path,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    users: Arc<dyn UserIdProvider>,
    config: &Config,
) -> ToolRegistry {
    let store = Arc::new(MemoryStore::new(workspace));
    if let Some(dir) = config.additional_memory_path() {
        store.set_additional_dir(Some(dir));
    }

    let mut registry = ToolRegistry::new();
    let timeout_minutes = config.tools.cron.exec_timeout_minutes;
    if timeout_minutes > 0 {
        registry = registry
            .with_default_timeout(std::time::Duration::from_secs(u64::from(timeout_minutes) * 60));
    }

    registry.register(Arc::new(MessageTool::new(outbound)));
    registry.register(Arc::new(MemoryReadTool::new(
        Arc::clone(&store),
        Arc::clone(&users),
    )));
    registry.register(Arc::new(MemoryWriteTool::new(
        Arc::clone(&store),
        Arc::clone(&users),
    )));
    registry.register(Arc::new(MemoryAppendTool::new(store, users)));
    registry
}

fn build_provider(config: &Config) -> Result<Arc<dyn Provider>, Box<dyn std::error::Error>> {
    let Some(api_key) = config.api_key().map(str::to_string) else {
        return Err("no provider API key configured; run `picoclaw onboard` and edit config.json".into());
    };
    let api_base = config
        .api_base()
        .ok_or("no provider API base configured")?;

    let name = if config.agents.defaults.provider.is_empty() {
        "openai-compat".to_string()
    } else {
        config.agents.defaults.provider.clone()
    };

    Ok(Arc::new(OpenAiCompatProvider::new(name, api_base, api_key)?))
}

/// Assemble the full runtime from a loaded config.
pub fn build(config: Config, config_path: PathBuf) -> Result<Runtime, Box<dyn std::error::Error>> {
    let workspace = config.workspace_path();
    std::fs::create_dir_all(&workspace)?;

    let bus = Arc::new(MessageBus::new());
    let provider = build_provider(&config)?;

    let users = CurrentUser::new();
    let adapter: Arc<dyn UserIdProvider> = Arc::new(CurrentUserAdapter(users.clone()));
    let tools = build_tools(&workspace, bus.outbound_sender(), Arc::clone(&adapter), &config);

    let context = ContextBuilder::new(
        &workspace,
        global_skills_path(),
        builtin_skills_path(&state_dir()),
    );
    let sessions = SessionStore::new(&workspace);

    let factory_workspace = workspace.clone();
    let factory_outbound = bus.outbound_sender();
    let agent = AgentLoop::new(
        provider,
        tools,
        context,
        sessions,
        bus.outbound_sender(),
        &config.agents.defaults,
    )
    .with_current_user(users)
    .with_tool_factory(Box::new(move |cfg| {
        build_tools(
            &factory_workspace,
            factory_outbound.clone(),
            Arc::clone(&adapter),
            cfg,
        )
    }));

    Ok(Runtime {
        bus,
        agent: Arc::new(agent),
        config: Arc::new(RwLock::new(config)),
        config_path,
    })
}
