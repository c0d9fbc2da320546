//! Utility functions for CLI commands.

use std::path::Path;

use anyhow::Context as _;
use giztoy_ubm::{persist, MixtureModel};

/// Loads a YAML or JSON file, picking the format from the extension.
pub fn load_config_file<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("yaml");

    let result = match ext.to_lowercase().as_str() {
        "json" => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };

    Ok(result)
}

/// Loads a model, adding the path to any error.
pub fn load_model(path: &Path) -> anyhow::Result<MixtureModel> {
    persist::load_file(path).with_context(|| format!("load model {}", path.display()))
}

/// Saves a model, adding the path to any error.
pub fn save_model(model: &MixtureModel, path: &Path) -> anyhow::Result<()> {
    persist::save_file(model, path).with_context(|| format!("save model {}", path.display()))
}

/// Prints a value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
