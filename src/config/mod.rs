//! Configuration Management
//!
//! This module handles loading and saving named profiles. A profile selects the
//! generation provider, the database connection, the HTTP bind address and the
//! per-request limits.
//!
//! # Configuration Locations
//! - Local: `.askdb/profiles.json` (team-shareable, per-project)
//! - Global: `~/.config/askdb/profiles.json` (per-user)
//!
//! Local profiles override global profiles of the same name, and a local `default`
//! overrides the global one.
//!
//! # Profile Selection
//! 1. `--profile` flag (highest priority)
//! 2. `ASKDB_PROFILE` environment variable
//! 3. The registry's `default`
//! 4. The built-in `llama3.2-postgres` profile
//!
//! Selection happens once, at process start.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{ConnectionConfig, DatabaseType};
use crate::error::{AskError, Result};
use crate::generate::{GeneratorConfig, Provider};
use crate::pipeline::Limits;
use crate::server::ServerConfig;

/// Name of the profile that is always available
pub const BUILTIN_PROFILE: &str = "llama3.2-postgres";

/// Environment variable naming the profile to use
pub const PROFILE_ENV: &str = "ASKDB_PROFILE";

/// Profile registry (stored in config files)
///
/// Example:
/// ```json
/// {
///   "profiles": {
///     "gpt-local": {
///       "generator": { "provider": "openai", "model": "gpt-4o-mini" },
///       "database": { "engine": "sqlite", "file": "./shop.db" }
///     }
///   },
///   "default": "gpt-local"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileRegistry {
    /// Named profiles
    #[serde(default)]
    pub profiles: BTreeMap<String, StoredProfile>,

    /// Name of the default profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ProfileRegistry {
    /// Overlay `local` on top of `self`; local entries and default win
    #[must_use]
    pub fn merge(mut self, local: Self) -> Self {
        self.profiles.extend(local.profiles);
        if local.default.is_some() {
            self.default = local.default;
        }
        self
    }
}

/// Database section as stored on disk
///
/// Like `ConnectionConfig`, but the password may be referenced through an
/// environment variable instead of being stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDatabase {
    #[serde(flatten)]
    pub config: ConnectionConfig,

    /// Environment variable name for the password (if not storing it directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl StoredDatabase {
    /// Resolve environment references into a usable `ConnectionConfig`
    pub fn resolve(&self) -> Result<ConnectionConfig> {
        let mut config = self.config.clone();

        if let Some(env_var) = &self.password_env {
            let password = std::env::var(env_var).map_err(|_| {
                AskError::config(format!("Environment variable {env_var} not found for password"))
            })?;
            config.password = Some(password);
        }

        Ok(config)
    }
}

/// Profile as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProfile {
    pub generator: GeneratorConfig,
    pub database: StoredDatabase,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: Limits,
}

impl StoredProfile {
    /// Resolve into a runnable profile named `name`
    pub fn resolve(&self, name: &str) -> Result<Profile> {
        Ok(Profile {
            name: name.to_string(),
            generator: self.generator.clone(),
            database: self.database.resolve()?,
            server: self.server.clone(),
            limits: self.limits.clone(),
        })
    }
}

/// A fully resolved profile, ready to start the pipeline
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub generator: GeneratorConfig,
    pub database: ConnectionConfig,
    pub server: ServerConfig,
    pub limits: Limits,
}

/// One line of `askdb profiles` output (never carries credentials)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub name: String,
    pub provider: Provider,
    pub model: String,
    pub engine: DatabaseType,
    pub target: String,
    pub is_default: bool,
    pub builtin: bool,
}

impl ProfileSummary {
    fn new(name: &str, generator: &GeneratorConfig, database: &ConnectionConfig) -> Self {
        Self {
            name: name.to_string(),
            provider: generator.provider,
            model: generator.model().to_string(),
            engine: database.engine,
            target: database.describe(),
            is_default: false,
            builtin: false,
        }
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.askdb/profiles.json` (team-shareable)
    Local,
    /// Global config: `~/.config/askdb/profiles.json` (per-user)
    Global,
}

/// Get path to local config file (`.askdb/profiles.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        AskError::config(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".askdb").join("profiles.json"))
}

/// Get path to global config file (`~/.config/askdb/profiles.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AskError::config("Could not determine user config directory"))?;

    Ok(config_dir.join("askdb").join("profiles.json"))
}

fn config_path(location: ConfigLocation) -> Result<PathBuf> {
    match location {
        ConfigLocation::Local => local_config_path(),
        ConfigLocation::Global => global_config_path(),
    }
}

/// Load a profile registry from a config file; a missing file is an empty registry
pub fn load_registry(path: &Path) -> Result<ProfileRegistry> {
    if !path.exists() {
        return Ok(ProfileRegistry::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| AskError::config(format!("Could not read config file: {e}")))?;

    serde_json::from_str(&contents).map_err(|e| {
        AskError::config(format!("Invalid profile file {}: {e}", path.display()))
    })
}

/// Save a profile registry, creating the parent directory if needed
pub fn save_registry(path: &Path, registry: &ProfileRegistry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AskError::config(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(registry)
        .map_err(|e| AskError::config(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| AskError::config(format!("Could not write config file: {e}")))
}

/// Load the merged view of the global and local registries
pub fn load_with_precedence() -> Result<ProfileRegistry> {
    let global = load_registry(&global_config_path()?)?;
    let local = load_registry(&local_config_path()?)?;
    Ok(global.merge(local))
}

/// Name of the profile to use: flag, then environment, then registry default, then built-in
#[must_use]
pub fn select_profile_name(
    flag: Option<&str>,
    env: Option<String>,
    registry: &ProfileRegistry,
) -> String {
    flag.map(str::to_string)
        .or(env.filter(|v| !v.trim().is_empty()))
        .or_else(|| registry.default.clone())
        .unwrap_or_else(|| BUILTIN_PROFILE.to_string())
}

/// The built-in Ollama + `PostgreSQL` profile
///
/// Connection parameters come from `DB_HOST`, `DB_PORT`, `DB_NAME`, `DB_USER` and
/// `DB_PASSWORD`; the HTTP port from `PORT`.
#[must_use]
pub fn builtin_profile() -> Profile {
    let env = |key: &str, fallback: &str| std::env::var(key).unwrap_or_else(|_| fallback.to_string());
    let port = |key: &str, fallback: u16| {
        std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(fallback)
    };

    Profile {
        name: BUILTIN_PROFILE.to_string(),
        generator: GeneratorConfig {
            model: Some("llama3.2".to_string()),
            base_url: Some("http://localhost:11434".to_string()),
            ..GeneratorConfig::new(Provider::Ollama)
        },
        database: ConnectionConfig::postgres(
            env("DB_HOST", "localhost"),
            port("DB_PORT", 5432),
            env("DB_USER", "postgres"),
            env("DB_PASSWORD", "password"),
            env("DB_NAME", "mydb"),
        ),
        server: ServerConfig { port: port("PORT", 3000), ..ServerConfig::default() },
        limits: Limits::default(),
    }
}

/// Resolve the profile to run with
///
/// `name` is the `--profile` flag; see the module docs for the fallback order.
/// A registry entry named like the built-in profile replaces it.
pub fn resolve_profile(name: Option<&str>) -> Result<Profile> {
    let registry = load_with_precedence()?;
    let selected = select_profile_name(name, std::env::var(PROFILE_ENV).ok(), &registry);
    resolve_from(&registry, &selected)
}

/// Resolve `name` against an already loaded registry
pub fn resolve_from(registry: &ProfileRegistry, name: &str) -> Result<Profile> {
    match registry.profiles.get(name) {
        Some(stored) => stored.resolve(name),
        None if name == BUILTIN_PROFILE => Ok(builtin_profile()),
        None => {
            let mut available: Vec<&str> = registry.profiles.keys().map(String::as_str).collect();
            available.push(BUILTIN_PROFILE);
            Err(AskError::config(format!(
                "Profile '{name}' not found. Available profiles: {}",
                available.join(", ")
            )))
        }
    }
}

/// Save a profile to a config file
///
/// The first profile saved to a file becomes its default.
pub fn save_profile(name: &str, profile: StoredProfile, location: ConfigLocation) -> Result<()> {
    let path = config_path(location)?;
    let mut registry = load_registry(&path)?;

    if registry.profiles.is_empty() {
        registry.default = Some(name.to_string());
    }
    registry.profiles.insert(name.to_string(), profile);

    save_registry(&path, &registry)
}

/// List all available profiles, including the built-in one
pub fn list_profiles() -> Result<Vec<ProfileSummary>> {
    Ok(summarize(&load_with_precedence()?))
}

fn summarize(registry: &ProfileRegistry) -> Vec<ProfileSummary> {
    let default = registry.default.as_deref().unwrap_or(BUILTIN_PROFILE);

    let mut summaries: Vec<ProfileSummary> = registry
        .profiles
        .iter()
        .map(|(name, stored)| {
            let mut summary = ProfileSummary::new(name, &stored.generator, &stored.database.config);
            summary.is_default = name == default;
            summary
        })
        .collect();

    if !registry.profiles.contains_key(BUILTIN_PROFILE) {
        let builtin = builtin_profile();
        let mut summary = ProfileSummary::new(BUILTIN_PROFILE, &builtin.generator, &builtin.database);
        summary.is_default = default == BUILTIN_PROFILE;
        summary.builtin = true;
        summaries.push(summary);
    }

    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sqlite_profile(file: &str) -> StoredProfile {
        StoredProfile {
            generator: GeneratorConfig::new(Provider::OpenAi),
            database: StoredDatabase {
                config: ConnectionConfig::sqlite(PathBuf::from(file)),
                password_env: None,
            },
            server: ServerConfig::default(),
            limits: Limits::default(),
        }
    }

    fn registry(names: &[&str], default: Option<&str>) -> ProfileRegistry {
        ProfileRegistry {
            profiles: names.iter().map(|n| (n.to_string(), sqlite_profile(n))).collect(),
            default: default.map(str::to_string),
        }
    }

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("askdb-config-{tag}-{}", std::process::id()))
            .join("profiles.json")
    }

    #[test]
    fn test_profile_file_format() {
        let json = serde_json::json!({
            "profiles": {
                "shop": {
                    "generator": {"provider": "ollama"},
                    "database": {"engine": "postgres", "host": "db", "password_env": "SHOP_PW"},
                    "server": {"port": 8080},
                    "limits": {"max_rows": 10}
                }
            }
        });
        let registry: ProfileRegistry = serde_json::from_value(json).unwrap();
        let shop = &registry.profiles["shop"];
        assert_eq!(shop.database.password_env.as_deref(), Some("SHOP_PW"));
        assert_eq!(shop.database.config.host.as_deref(), Some("db"));
        assert_eq!(shop.server.port, 8080);
        assert_eq!(shop.limits.max_rows, 10);
        assert_eq!(shop.limits.generation_timeout_ms, 60_000);
    }

    #[test]
    fn test_stored_database_resolve_env_var() {
        std::env::set_var("ASKDB_TEST_PASSWORD", "secret");

        let mut stored = sqlite_profile("x.db").database;
        stored.password_env = Some("ASKDB_TEST_PASSWORD".to_string());
        assert_eq!(stored.resolve().unwrap().password, Some("secret".to_string()));

        std::env::remove_var("ASKDB_TEST_PASSWORD");
    }

    #[test]
    fn test_stored_database_resolve_missing_env_var() {
        let mut stored = sqlite_profile("x.db").database;
        stored.password_env = Some("ASKDB_NONEXISTENT_VAR".to_string());

        let err = stored.resolve().unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.message().contains("Environment variable ASKDB_NONEXISTENT_VAR not found"));
    }

    #[test]
    fn test_merge_local_overrides_global() {
        let mut global = registry(&["shared", "global-only"], Some("global-only"));
        global.profiles.get_mut("shared").unwrap().limits.max_rows = 1;
        let local = registry(&["shared", "local-only"], Some("local-only"));

        let merged = global.merge(local);
        assert_eq!(
            merged.profiles.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["global-only", "local-only", "shared"]
        );
        assert_eq!(merged.profiles["shared"].limits.max_rows, 1000);
        assert_eq!(merged.default.as_deref(), Some("local-only"));
    }

    #[test]
    fn test_merge_keeps_global_default() {
        let merged = registry(&["a"], Some("a")).merge(registry(&["b"], None));
        assert_eq!(merged.default.as_deref(), Some("a"));
    }

    #[test]
    fn test_selection_order() {
        let reg = registry(&["a", "b"], Some("a"));
        assert_eq!(select_profile_name(Some("b"), Some("x".to_string()), &reg), "b");
        assert_eq!(select_profile_name(None, Some("x".to_string()), &reg), "x");
        assert_eq!(select_profile_name(None, Some(" ".to_string()), &reg), "a");
        assert_eq!(select_profile_name(None, None, &reg), "a");
        assert_eq!(select_profile_name(None, None, &ProfileRegistry::default()), BUILTIN_PROFILE);
    }

    #[test]
    fn test_resolve_from_registry_and_builtin() {
        let reg = registry(&["a"], None);
        assert_eq!(resolve_from(&reg, "a").unwrap().database.engine, DatabaseType::SQLite);

        let builtin = resolve_from(&reg, BUILTIN_PROFILE).unwrap();
        assert_eq!(builtin.generator.provider, Provider::Ollama);
        assert_eq!(builtin.generator.model(), "llama3.2");
        assert_eq!(builtin.database.engine, DatabaseType::Postgres);

        let err = resolve_from(&reg, "missing").unwrap_err();
        assert!(err.message().contains("Profile 'missing' not found"));
        assert!(err.message().contains("a, llama3.2-postgres"));
    }

    #[test]
    fn test_registry_entry_replaces_builtin() {
        let reg = registry(&[BUILTIN_PROFILE], None);
        let profile = resolve_from(&reg, BUILTIN_PROFILE).unwrap();
        assert_eq!(profile.database.engine, DatabaseType::SQLite);
    }

    #[test]
    fn test_save_and_load_registry() {
        let path = temp_path("roundtrip");
        let reg = registry(&["a"], Some("a"));

        save_registry(&path, &reg).unwrap();
        let loaded = load_registry(&path).unwrap();
        assert_eq!(loaded.default.as_deref(), Some("a"));
        assert_eq!(
            loaded.profiles["a"].database.config.file,
            Some(PathBuf::from("a"))
        );

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_is_empty_registry() {
        let loaded = load_registry(&temp_path("missing")).unwrap();
        assert!(loaded.profiles.is_empty());
        assert!(loaded.default.is_none());
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let path = temp_path("invalid");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(load_registry(&path).unwrap_err().error_code(), "CONFIG_ERROR");
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_summaries_include_builtin() {
        let summaries = summarize(&registry(&["a"], Some("a")));
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].is_default);
        assert_eq!(summaries[0].target, "sqlite:a");
        assert!(summaries[1].builtin);
        assert!(!summaries[1].is_default);

        let summaries = summarize(&ProfileRegistry::default());
        assert!(summaries[0].builtin && summaries[0].is_default);
    }
}
