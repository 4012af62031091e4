//! `deskhive status` — Show configuration status.

use deskhive_config::AppConfig;
use deskhive_core::worker::WorkerRole;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("🐝 Deskhive Status");
    println!("==================");
    println!("  Config dir:     {}", AppConfig::config_dir().display());
    println!("  API base:       {}", config.api_base_url);
    println!(
        "  API key:        {}",
        if config.has_api_key() { "configured" } else { "missing" }
    );
    println!("  Default model:  {}", config.default_model);
    println!(
        "  History window: {} messages",
        config.workers.history_window
    );
    println!(
        "  Restart:        {} attempts, base {}ms, cap {}ms, cooldown {}s",
        config.restart.max_attempts,
        config.restart.base_delay_ms,
        config.restart.max_delay_ms,
        config.restart.cooldown_secs
    );
    println!(
        "  Budget:         {} tokens (warning {:.0}%, critical {:.0}%)",
        config.budget.max_tokens,
        config.budget.warning_threshold * 100.0,
        config.budget.critical_threshold * 100.0
    );
    println!();
    println!("  Workers:");
    for role in WorkerRole::all() {
        let profile = config.role_profile(role);
        println!(
            "    {:<16} {} [{}]",
            role.to_string(),
            profile.display_name,
            profile.model_id
        );
    }

    // Check config file existence
    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `deskhive onboard` first");
    }

    Ok(())
}
