//! Context assembly.
//!
//! Builds the system prompt from layered sources — identity header,
//! bootstrap files, skills catalog, session metadata — and emits the final
//! message array for the LLM. Assembly is pure composition over what the
//! budget-enforcing pieces (bootstrap, pruning, truncation) produce.

use crate::bootstrap::{BootstrapCache, BootstrapConfig, SessionKind};
use crate::memory::MemoryStore;
use chrono::Local;
use picoclaw_core::{Message, Role};
use picoclaw_skills::SkillsLoader;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

pub struct ContextBuilder {
    workspace: PathBuf,
    skills_loader: SkillsLoader,
    memory: MemoryStore,
    bootstrap_config: RwLock<BootstrapConfig>,
    bootstrap_cache: BootstrapCache,
    skills_summary: RwLock<Option<String>>,
    tool_summaries: RwLock<Vec<String>>,
}

impl ContextBuilder {
    pub fn new(
        workspace: impl Into<PathBuf>,
        global_skills: impl Into<PathBuf>,
        builtin_skills: impl Into<PathBuf>,
    ) -> Self {
        let workspace = workspace.into();
        Self {
            skills_loader: SkillsLoader::new(&workspace, global_skills, builtin_skills),
            memory: MemoryStore::new(&workspace),
            workspace,
            bootstrap_config: RwLock::new(BootstrapConfig::default()),
            bootstrap_cache: BootstrapCache::new(),
            skills_summary: RwLock::new(None),
            tool_summaries: RwLock::new(Vec::new()),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn skills_loader(&self) -> &SkillsLoader {
        &self.skills_loader
    }

    /// One-line tool summaries for the identity header. Refreshed whenever
    /// the tool registry is (re)built.
    pub fn set_tool_summaries(&self, summaries: Vec<String>) {
        *self.tool_summaries.write().unwrap() = summaries;
    }

    pub fn set_bootstrap_config(&self, config: BootstrapConfig) {
        *self.bootstrap_config.write().unwrap() = config;
        self.bootstrap_cache.invalidate();
    }

    /// Purge the cached bootstrap sections.
    pub fn invalidate_bootstrap_cache(&self) {
        self.bootstrap_cache.invalidate();
    }

    /// Re-scan the skill roots and rebuild the cached catalog summary.
    pub fn reload_skills_summary(&self) {
        let summary = self.skills_loader.build_skills_summary();
        debug!(bytes = summary.len(), "Skills summary rebuilt");
        *self.skills_summary.write().unwrap() = Some(summary);
    }

    /// (total, names) of the admitted skill catalog.
    pub fn skills_info(&self) -> (usize, Vec<String>) {
        let skills = self.skills_loader.list_skills();
        let names = skills.iter().map(|s| s.name.clone()).collect();
        (skills.len(), names)
    }

    fn cached_skills_summary(&self) -> String {
        if let Some(summary) = self.skills_summary.read().unwrap().as_ref() {
            return summary.clone();
        }
        self.reload_skills_summary();
        self.skills_summary.read().unwrap().clone().unwrap_or_default()
    }

    /// The bot's display name, from the line after `## Name` in IDENTITY.md.
    /// Empty when the file or section is missing (triggers onboarding).
    fn bot_name(&self) -> String {
        self.identity_name_line()
            .and_then(|line| line.split_whitespace().next().map(str::to_string))
            .unwrap_or_default()
    }

    fn bot_emoji(&self) -> String {
        self.identity_name_line()
            .and_then(|line| {
                let mut parts = line.split_whitespace();
                let name = parts.next()?;
                let rest = line.strip_prefix(name)?.trim();
                (!rest.is_empty()).then(|| rest.to_string())
            })
            .unwrap_or_else(|| "🤖".to_string())
    }

    fn identity_name_line(&self) -> Option<String> {
        self.identity_field("Name")
    }

    /// The first non-placeholder line following `## <section>` in IDENTITY.md.
    fn identity_field(&self, section: &str) -> Option<String> {
        let identity_path = self.workspace.join("IDENTITY.md");
        let content = std::fs::read_to_string(identity_path).ok()?;
        let lines: Vec<&str> = content.lines().collect();

        let header = format!("## {section}");
        for (i, line) in lines.iter().enumerate() {
            if line.contains(&header) {
                let value = lines.get(i + 1)?.trim();
                if !value.is_empty() && !value.starts_with("_(") {
                    return Some(value.to_string());
                }
                return None;
            }
        }
        None
    }

    fn tools_section(&self) -> String {
        let summaries = self.tool_summaries.read().unwrap();
        if summaries.is_empty() {
            return String::new();
        }

        let mut section = String::from("## Available Tools\n\n");
        section.push_str(
            "**CRITICAL**: You MUST use tools to perform actions. Do NOT pretend to execute commands or schedule tasks.\n\n",
        );
        section.push_str("You have access to the following tools:\n\n");
        for summary in summaries.iter() {
            section.push_str(summary);
            section.push('\n');
        }
        section
    }

    /// The identity header: bot name, timestamp, runtime, workspace paths,
    /// tool catalog, and standing rules.
    fn identity_section(&self, user_id: &str) -> String {
        let now = Local::now().format("%Y-%m-%d %H:%M (%A)").to_string();
        let workspace = self.workspace.display();
        let runtime = format!(
            "{} {}, Rust",
            std::env::consts::OS,
            std::env::consts::ARCH
        );

        let bot_name = self.bot_name();
        let bot_emoji = self.bot_emoji();

        let mut personality_parts = Vec::new();
        if let Some(creature) = self.identity_field("Creature") {
            personality_parts.push(format!("**Creature:** {creature}"));
        }
        if let Some(vibe) = self.identity_field("Vibe") {
            personality_parts.push(format!("**Vibe:** {vibe}"));
        }
        let personality = if personality_parts.is_empty() {
            String::new()
        } else {
            format!("\n\n## Personality\n\n{}", personality_parts.join("\n"))
        };

        let memory_path = format!("{workspace}/{}", MemoryStore::memory_display_path(user_id));

        format!(
            "# {bot_name} {bot_emoji}\n\n\
            You are {}, a helpful AI assistant.{personality}\n\n\
            ## Current Time\n{now}\n\n\
            ## Runtime\n{runtime}\n\n\
            ## Workspace\n\
            Your workspace is at: {workspace}\n\
            - Memory: {memory_path}\n\
            - Daily Notes: {workspace}/memory/YYYYMM/YYYYMMDD.md\n\
            - Skills: {workspace}/skills/{{skill-name}}/SKILL.md\n\n\
            {}\n\
            ## Important Rules\n\n\
            1. **ALWAYS use tools** - When you need to perform an action (schedule reminders, send messages, execute commands, etc.), you MUST call the appropriate tool. Do NOT just say you'll do it or pretend to do it.\n\n\
            2. **Be helpful and accurate** - When using tools, briefly explain what you're doing.\n\n\
            3. **Memory** - When remembering something, write to {memory_path}",
            bot_name.to_lowercase(),
            self.tools_section(),
        )
    }

    /// Assemble the full system prompt: identity → bootstrap → skills.
    pub fn build_system_prompt(&self, kind: SessionKind, user_id: &str) -> String {
        let mut parts = vec![self.identity_section(user_id)];

        let config = *self.bootstrap_config.read().unwrap();
        let bootstrap = self.bootstrap_cache.load(&self.workspace, config, kind);
        if !bootstrap.is_empty() {
            parts.push(bootstrap);
        }

        let skills_summary = self.cached_skills_summary();
        if !skills_summary.is_empty() {
            parts.push(format!(
                "# Skills\n\n\
                The following skills extend your capabilities. To use a skill, read its SKILL.md file using the read_file tool.\n\n\
                {skills_summary}"
            ));
        }

        parts.join("\n\n---\n\n")
    }

    /// Emit the final message array: system prompt (plus optional summary
    /// and session metadata), surviving history, then the new user message.
    ///
    /// Leading tool-role messages in the history are stripped defensively —
    /// they would dangle without a preceding assistant tool-call turn.
    #[allow(clippy::too_many_arguments)]
    pub fn build_messages(
        &self,
        kind: SessionKind,
        history: &[Message],
        summary: Option<&str>,
        current_message: &str,
        channel: &str,
        chat_id: &str,
        user_id: &str,
    ) -> Vec<Message> {
        let mut system_prompt = self.build_system_prompt(kind, user_id);

        if !channel.is_empty() && !chat_id.is_empty() {
            system_prompt.push_str(&format!(
                "\n\n## Current Session\nChannel: {channel}\nChat ID: {chat_id}"
            ));
        }

        if let Some(summary) = summary.filter(|s| !s.is_empty()) {
            system_prompt.push_str(&format!(
                "\n\n## Summary of Previous Conversation\n\n{summary}"
            ));
        }

        debug!(
            total_chars = system_prompt.len(),
            history_len = history.len(),
            "System prompt built"
        );

        let mut surviving = history;
        while let Some(first) = surviving.first() {
            if first.role != Role::Tool {
                break;
            }
            debug!("Removing orphaned tool message from history head");
            surviving = &surviving[1..];
        }

        let mut messages = Vec::with_capacity(surviving.len() + 2);
        messages.push(Message::system(system_prompt));
        messages.extend_from_slice(surviving);
        messages.push(Message::user(current_message));
        messages
    }
}
