// SPDX-License-Identifier: MIT

//! Daemon configuration: state directory resolution, socket/log/database
//! paths, env-var overrides. Mirrors `oj-daemon::lifecycle::Config`'s
//! resolve-from-env-then-default pattern.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve a state directory (set CORRAL_STATE_DIR or HOME)")]
    NoStateDir,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub socket_path: PathBuf,
    pub log_path: PathBuf,
    pub sessions_db_path: PathBuf,
    pub extractions_db_path: PathBuf,
    pub logs_dir: PathBuf,
    pub patterns_path: PathBuf,
    pub environments_path: PathBuf,
    pub timer_check_ms: u64,
}

/// On-disk document for a handful of tunables a `corral.toml` may override;
/// everything else is derived from `state_dir`.
#[derive(Debug, Default, serde::Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    timer_check_ms: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let state_dir = state_dir()?;
        std::fs::create_dir_all(&state_dir)?;

        let doc_path = state_dir.join("corral.toml");
        let doc: ConfigDocument = match std::fs::read_to_string(&doc_path) {
            Ok(text) => toml::from_str(&text)?,
            Err(_) => ConfigDocument::default(),
        };

        let timer_check_ms = env_u64("CORRAL_TIMER_CHECK_MS").or(doc.timer_check_ms).unwrap_or(1_000);

        Ok(Self {
            socket_path: state_dir.join("corral.sock"),
            log_path: state_dir.join("corral.log"),
            sessions_db_path: state_dir.join("sessions.db"),
            extractions_db_path: state_dir.join("extractions.db"),
            logs_dir: state_dir.join("logs"),
            patterns_path: state_dir.join("patterns.toml"),
            environments_path: state_dir.join("environments.toml"),
            state_dir,
            timer_check_ms,
        })
    }
}

/// Resolve state directory: `CORRAL_STATE_DIR` > `dirs::data_dir()/corral`.
fn state_dir() -> Result<PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("CORRAL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir().map(|d| d.join("corral")).ok_or(ConfigError::NoStateDir)
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Environment-policy document (spec.md §6 "Environment definitions"),
/// loaded per named environment and handed to `PolicyCheck`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct EnvironmentDecl {
    #[serde(default)]
    pub denied_commands: Vec<String>,
    #[serde(default)]
    pub restricted_prefixes: Vec<PathBuf>,
}

pub fn load_policy(path: &Path, environment: &str) -> corral_adapters::PolicyCheck {
    #[derive(serde::Deserialize, Default)]
    struct Document {
        #[serde(default)]
        environment: std::collections::HashMap<String, EnvironmentDecl>,
    }
    let Ok(text) = std::fs::read_to_string(path) else {
        return corral_adapters::PolicyCheck::new();
    };
    let document: Document = toml::from_str(&text).unwrap_or_default();
    let Some(decl) = document.environment.get(environment) else {
        return corral_adapters::PolicyCheck::new();
    };
    let mut policy = corral_adapters::PolicyCheck::new();
    for command in &decl.denied_commands {
        policy = policy.deny_command(command.clone());
    }
    for prefix in &decl.restricted_prefixes {
        policy = policy.restrict_prefix(prefix.clone());
    }
    policy
}

/// Load the declarative pattern set from `patterns_path` (spec.md §6
/// "Configuration"). Missing file yields an empty set rather than an error —
/// a freshly-installed daemon starts with extraction disabled, not refusing
/// to boot.
pub fn load_patterns(path: &Path) -> Result<corral_core::PatternSet, corral_core::PatternLoadError> {
    #[derive(serde::Deserialize, Default)]
    struct Document {
        #[serde(default)]
        pattern: Vec<corral_core::PatternDecl>,
    }
    let Ok(text) = std::fs::read_to_string(path) else {
        return Ok(corral_core::PatternSet::empty());
    };
    let document: Document = toml::from_str(&text).map_err(|e| corral_core::PatternLoadError::Parse(e.to_string()))?;
    corral_core::PatternSet::compile(&document.pattern)
}
