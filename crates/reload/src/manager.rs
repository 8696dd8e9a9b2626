//! Selective live updates.
//!
//! Routes watch events to the matching reload operation on the running
//! agent. Each event kind carries a reentrancy guard: only one reload of a
//! kind runs at a time, and concurrent duplicates report "already in
//! progress" without waiting.

use crate::watcher::{WatchEvent, WatchEventType};
use dashmap::DashMap;
use picoclaw_agent::bootstrap::BootstrapConfig;
use picoclaw_agent::pruning::PruningConfig;
use picoclaw_agent::AgentLoop;
use picoclaw_config::{load_config, Config};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// The result of one reload operation.
#[derive(Debug, Clone)]
pub struct ReloadResult {
    pub success: bool,
    pub component: &'static str,
    pub message: String,
}

impl ReloadResult {
    fn ok(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: true,
            component,
            message: message.into(),
        }
    }

    fn failed(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            component,
            message: message.into(),
        }
    }

    fn already_in_progress(component: &'static str) -> Self {
        Self::failed(component, format!("{component} reload already in progress"))
    }
}

/// Clears the in-flight marker when the reload finishes or fails.
struct InFlight<'a> {
    map: &'a DashMap<&'static str, ()>,
    key: &'static str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.remove(self.key);
    }
}

pub struct ReloadManager {
    agent: Arc<AgentLoop>,
    config: Arc<RwLock<Config>>,
    config_path: PathBuf,
    reloading: DashMap<&'static str, ()>,
}

impl ReloadManager {
    pub fn new(agent: Arc<AgentLoop>, config: Arc<RwLock<Config>>, config_path: PathBuf) -> Self {
        Self {
            agent,
            config,
            config_path,
            reloading: DashMap::new(),
        }
    }

    /// Mark `kind` as in flight. `None` means another reload of the same
    /// kind is already running.
    fn begin(&self, kind: &'static str) -> Option<InFlight<'_>> {
        if self.reloading.insert(kind, ()).is_some() {
            debug!(kind, "Reload already in progress");
            return None;
        }
        Some(InFlight {
            map: &self.reloading,
            key: kind,
        })
    }

    /// Route a watch event to the matching reload.
    pub fn handle_event(&self, event: &WatchEvent) -> ReloadResult {
        info!(
            event_type = %event.event_type,
            path = %event.path.display(),
            "Handling reload event"
        );

        match event.event_type {
            WatchEventType::Config => self.reload_config(),
            WatchEventType::Skill => self.reload_skills(),
            WatchEventType::Bootstrap => self.reload_bootstrap(),
        }
    }

    /// Reload the config file, diff the hot-reloadable fields, and push
    /// each change through the matching agent hook. A failed load leaves
    /// the in-memory config untouched.
    pub fn reload_config(&self) -> ReloadResult {
        let Some(_guard) = self.begin("config") else {
            return ReloadResult::already_in_progress("config");
        };

        info!("Reloading configuration");
        let new_config = match load_config(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Failed to load configuration file");
                return ReloadResult::failed("config", format!("Failed to load configuration: {e}"));
            }
        };

        let changed = {
            let current = self.config.read().unwrap();
            current.compare_hot_reloadable(&new_config)
        };

        if changed.is_empty() {
            info!("No hot-reloadable fields changed");
            return ReloadResult::ok("config", "No changes detected");
        }

        info!(?changed, "Config fields changed");
        self.apply_config_changes(&new_config, &changed);

        if changed.contains(&"tools.web") {
            if let Err(e) = self.agent.reload_tools(&new_config) {
                warn!(error = %e, "Failed to reload tools");
            }
        }

        *self.config.write().unwrap() = new_config;
        ReloadResult::ok("config", format!("Reloaded config, changed fields: {changed:?}"))
    }

    fn apply_config_changes(&self, new_config: &Config, changed: &[&'static str]) {
        let defaults = &new_config.agents.defaults;
        for field in changed {
            match *field {
                "model" => self.agent.update_model(&defaults.model),
                "max_tokens" => self.agent.update_context_window(defaults.max_tokens as usize),
                "temperature" => self.agent.update_temperature(defaults.temperature),
                "max_tool_iterations" => self
                    .agent
                    .update_max_tool_iterations(defaults.max_tool_iterations as usize),
                "bootstrap_max_chars" | "bootstrap_total_max_chars" => {
                    self.agent.update_bootstrap_config(BootstrapConfig {
                        max_chars: defaults.bootstrap_max_chars,
                        total_max_chars: defaults.bootstrap_total_max_chars,
                    })
                }
                "context_pruning" => self
                    .agent
                    .update_pruning_config(PruningConfig::from(&defaults.context_pruning)),
                "additional_memory_dir" => self
                    .agent
                    .update_additional_memory_dir(new_config.additional_memory_path()),
                _ => {}
            }
        }
    }

    /// Re-scan the skill roots and rebuild the prompt catalog.
    pub fn reload_skills(&self) -> ReloadResult {
        let Some(_guard) = self.begin("skills") else {
            return ReloadResult::already_in_progress("skills");
        };

        info!("Reloading skills");
        self.agent.reload_skills_summary();
        let (total, names) = self.agent.skills_info();
        ReloadResult::ok(
            "skills",
            format!("Skills reloaded ({total} available: {names:?})"),
        )
    }

    /// Invalidate the bootstrap cache so the next turn re-reads the files.
    pub fn reload_bootstrap(&self) -> ReloadResult {
        let Some(_guard) = self.begin("bootstrap") else {
            return ReloadResult::already_in_progress("bootstrap");
        };

        info!("Invalidating bootstrap cache");
        self.agent.invalidate_bootstrap_cache();
        ReloadResult::ok("bootstrap", "Bootstrap cache invalidated")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use picoclaw_agent::{ContextBuilder, SessionStore};
    use picoclaw_config::save_config;
    use picoclaw_core::{
        Message, Provider, ProviderError, ProviderRequest, ProviderResponse, ToolRegistry,
    };
    use tempfile::TempDir;

    struct StubProvider;

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }
        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant("stub"),
                usage: None,
                model: "stub".into(),
            })
        }
    }

    struct Fixture {
        _state: TempDir,
        _workspace: TempDir,
        manager: ReloadManager,
        agent: Arc<AgentLoop>,
        config_path: PathBuf,
    }

    fn fixture() -> Fixture {
        let state = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let config_path = state.path().join("config.json");

        let config = Config::default();
        save_config(&config_path, &config).unwrap();

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let context = ContextBuilder::new(
            workspace.path(),
            state.path().join("skills"),
            state.path().join("picoclaw/skills"),
        );
        let sessions = SessionStore::new(workspace.path());
        let agent = Arc::new(
            AgentLoop::new(
                Arc::new(StubProvider),
                ToolRegistry::new(),
                context,
                sessions,
                tx,
                &config.agents.defaults,
            )
            .with_tool_factory(Box::new(|_cfg| ToolRegistry::new())),
        );

        let manager = ReloadManager::new(
            Arc::clone(&agent),
            Arc::new(RwLock::new(config)),
            config_path.clone(),
        );

        Fixture {
            _state: state,
            _workspace: workspace,
            manager,
            agent,
            config_path,
        }
    }

    fn event(event_type: WatchEventType, path: &std::path::Path) -> WatchEvent {
        WatchEvent {
            event_type,
            path: path.to_path_buf(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unchanged_config_is_a_noop() {
        let f = fixture();
        let result = f.manager.reload_config();
        assert!(result.success);
        assert!(result.message.contains("No changes"));
    }

    #[tokio::test]
    async fn model_change_reaches_the_agent() {
        let f = fixture();

        let mut new_config = Config::default();
        new_config.agents.defaults.model = "upgraded-model".into();
        save_config(&f.config_path, &new_config).unwrap();

        let result = f
            .manager
            .handle_event(&event(WatchEventType::Config, &f.config_path));
        assert!(result.success);
        assert!(result.message.contains("model"));
        assert_eq!(f.agent.model(), "upgraded-model");
    }

    #[tokio::test]
    async fn malformed_config_leaves_memory_untouched() {
        let f = fixture();
        std::fs::write(&f.config_path, "{broken json").unwrap();

        let result = f.manager.reload_config();
        assert!(!result.success);
        assert_eq!(
            f.manager.config.read().unwrap().agents.defaults.model,
            "glm-4.7"
        );
        assert_eq!(f.agent.model(), "glm-4.7");
    }

    #[tokio::test]
    async fn skill_event_rebuilds_summary() {
        let f = fixture();
        let result = f
            .manager
            .handle_event(&event(WatchEventType::Skill, std::path::Path::new("/x/SKILL.md")));
        assert!(result.success);
        assert_eq!(result.component, "skills");
    }

    #[tokio::test]
    async fn bootstrap_event_invalidates_cache() {
        let f = fixture();
        let result = f
            .manager
            .handle_event(&event(WatchEventType::Bootstrap, std::path::Path::new("/ws/AGENTS.md")));
        assert!(result.success);
        assert_eq!(result.component, "bootstrap");
    }

    #[tokio::test]
    async fn concurrent_reload_of_same_kind_reports_in_progress() {
        let f = fixture();

        let guard = f.manager.begin("config").expect("first claim succeeds");
        assert!(f.manager.begin("config").is_none());

        // Other kinds are unaffected
        assert!(f.manager.begin("skills").is_some());

        drop(guard);
        assert!(f.manager.begin("config").is_some());
    }

    #[tokio::test]
    async fn in_progress_result_is_distinctive() {
        let f = fixture();
        let _guard = f.manager.begin("config").unwrap();
        let result = f.manager.reload_config();
        assert!(!result.success);
        assert!(result.message.contains("already in progress"));
    }

    #[tokio::test]
    async fn pruning_change_applies() {
        let f = fixture();

        let mut new_config = Config::default();
        new_config.agents.defaults.context_pruning.mode = "cache-ttl".into();
        new_config.agents.defaults.max_tokens = 32_000;
        save_config(&f.config_path, &new_config).unwrap();

        let result = f.manager.reload_config();
        assert!(result.success);
        assert!(result.message.contains("context_pruning"));
        assert!(result.message.contains("max_tokens"));
    }
}
