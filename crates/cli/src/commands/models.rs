//! `colloquy models`: List models installed on the backend.

use colloquy_config::AppConfig;
use colloquy_core::backend::Backend;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let backend = colloquy_providers::build_from_config(config);
    let models = backend
        .list_models()
        .await
        .map_err(|e| format!("Cannot reach the backend at {}: {e}", backend.base_url()))?;

    println!("Installed models ({}):", backend.base_url());
    if models.is_empty() {
        println!("  (none)");
    }
    for line in model_lines(&models, &config.model) {
        println!("{line}");
    }

    if !models.iter().any(|m| is_same_model(m, &config.model)) {
        println!();
        println!(
            "  Configured model {} is not installed; `colloquy chat` will pull it.",
            config.model
        );
    }
    Ok(())
}

fn is_same_model(installed: &str, configured: &str) -> bool {
    installed == configured || installed == format!("{configured}:latest")
}

fn model_lines(models: &[String], configured: &str) -> Vec<String> {
    models
        .iter()
        .map(|m| {
            let marker = if is_same_model(m, configured) { "*" } else { " " };
            format!("  {marker} {m}")
        })
        .collect()
}
