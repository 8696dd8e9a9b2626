//! `picoclaw onboard` — initialize the state directory and workspace.

use picoclaw_config::{config_path, default_workspace, save_config, state_dir, Config};

const IDENTITY_TEMPLATE: &str = "# Identity\n\n## Name\n_(pick a name and an emoji, e.g. `Pico 🦀`)_\n\n## Creature\n_(what kind of creature is your agent?)_\n\n## Vibe\n_(one line of personality)_\n";

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let state = state_dir();
    let config_file = config_path();
    let workspace = default_workspace();

    std::fs::create_dir_all(&workspace)?;
    std::fs::create_dir_all(workspace.join("memory"))?;
    std::fs::create_dir_all(workspace.join("skills"))?;
    std::fs::create_dir_all(state.join("skills"))?;

    if config_file.exists() {
        println!("Config already exists at {}", config_file.display());
    } else {
        save_config(&config_file, &Config::default())?;
        println!("Wrote default config to {}", config_file.display());
    }

    let identity = workspace.join("IDENTITY.md");
    if !identity.exists() {
        std::fs::write(&identity, IDENTITY_TEMPLATE)?;
        println!("Wrote identity template to {}", identity.display());
    }

    println!("State directory: {}", state.display());
    println!("Workspace:       {}", workspace.display());
    println!("Next: add a provider API key to config.json, then run `picoclaw agent`.");
    Ok(())
}
