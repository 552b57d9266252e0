//! Configuration loading for barista.
//!
//! Settings come from `barista.toml` and are then overridden by environment
//! variables, so deployments that only set env vars keep working.

pub mod loader;
pub mod schema;

pub use {
    loader::{CONFIG_ENV, apply_env_overrides, load_config, parse_config},
    schema::{
        AgentConfig, BaristaConfig, DatabaseConfig, DebounceConfig, EvolutionConfig, IntentMode,
        OpenAiConfig, ServerConfig,
    },
};
