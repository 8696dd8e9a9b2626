//! `picoclaw status` — configuration and skills at a glance.

use picoclaw_config::{builtin_skills_path, config_path, global_skills_path, load_config, state_dir};
use picoclaw_skills::SkillsLoader;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_file = config_path();
    let config = load_config(&config_file)?;
    let workspace = config.workspace_path();

    println!("State directory: {}", state_dir().display());
    println!("Config:          {}", config_file.display());
    println!("Workspace:       {}", workspace.display());
    println!("Model:           {}", config.agents.defaults.model);
    println!(
        "Pruning:         {}",
        config.agents.defaults.context_pruning.mode
    );
    println!(
        "Provider key:    {}",
        if config.api_key().is_some() { "configured" } else { "missing" }
    );

    let loader = SkillsLoader::new(
        &workspace,
        global_skills_path(),
        builtin_skills_path(&state_dir()),
    );
    let skills = loader.list_skills();
    println!("Skills:          {}", skills.len());
    for skill in skills {
        println!("  - {} ({}): {}", skill.name, skill.source, skill.description);
    }

    Ok(())
}
