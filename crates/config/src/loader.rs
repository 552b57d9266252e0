//! Config file discovery and environment overrides.

use std::path::{Path, PathBuf};

use {anyhow::Context, secrecy::Secret, tracing::debug};

use crate::schema::{BaristaConfig, IntentMode};

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "BARISTA_CONFIG";

const CONFIG_FILE_NAME: &str = "barista.toml";

/// Load the configuration.
///
/// Resolution order for the file: `explicit`, then `$BARISTA_CONFIG`, then the
/// platform config directory, then `./barista.toml`. A missing file is not an
/// error unless it was named explicitly. Environment overrides are applied
/// last.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<BaristaConfig> {
    let mut config = match resolve_path(explicit)? {
        Some(path) => {
            debug!(path = %path.display(), "loading config file");
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            parse_config(&raw).with_context(|| format!("invalid config in {}", path.display()))?
        },
        None => {
            debug!("no config file found, using defaults");
            BaristaConfig::default()
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Parse a TOML document into a config.
pub fn parse_config(raw: &str) -> anyhow::Result<BaristaConfig> {
    Ok(toml::from_str(raw)?)
}

fn resolve_path(explicit: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("config file {} does not exist", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if !path.exists() {
            anyhow::bail!("{CONFIG_ENV} points at missing file {}", path.display());
        }
        return Ok(Some(path));
    }

    let mut candidates = directories::ProjectDirs::from("org", "barista", "barista")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .into_iter()
        .chain(std::iter::once(PathBuf::from(CONFIG_FILE_NAME)));

    Ok(candidates.find(|p| p.exists()))
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Empty values are ignored so an exported-but-blank variable does not wipe
/// a configured value.
pub fn apply_env_overrides(config: &mut BaristaConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(port) = get("PORT").and_then(|v| v.parse().ok()) {
        config.server.port = port;
    }
    if let Some(url) = get("DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(url) = get("EVOLUTION_API_URL") {
        config.evolution.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(key) = get("EVOLUTION_API_KEY") {
        config.evolution.api_key = Secret::new(key);
    }
    if let Some(instance) = get("EVOLUTION_INSTANCE") {
        config.evolution.instance = instance;
    }
    if let Some(key) = get("OPENAI_API_KEY") {
        config.openai.api_key = Some(Secret::new(key));
    }
    if let Some(model) = get("OPENAI_MODEL") {
        config.openai.model = model;
    }
    if let Some(ms) = get("QUIET_WINDOW_MS").and_then(|v| v.parse().ok()) {
        config.debounce.quiet_window_ms = ms;
    }
    if let Some(mode) = get("INTENT_MODE") {
        match mode.to_lowercase().as_str() {
            "llm" => config.agent.intent_mode = IntentMode::Llm,
            "keywords" => config.agent.intent_mode = IntentMode::Keywords,
            other => tracing::warn!(value = other, "ignoring unknown INTENT_MODE"),
        }
    }
}
