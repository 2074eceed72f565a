// Configuration loading and parsing (server.toml, league.toml).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::draft::order::{DraftScope, OrderingPolicy};
use crate::draft::session::Session;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub ws_port: u16,
    /// SQLite file, resolved against the config base directory.
    pub db_path: PathBuf,
    /// Player catalog CSV, resolved against the config base directory.
    pub catalog_path: PathBuf,
    pub draft: DraftSettings,
    pub sessions: Vec<SessionSetup>,
}

/// A session ready to be registered, with the seats declared for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetup {
    pub session: Session,
    pub participants: Vec<ParticipantConfig>,
}

// ---------------------------------------------------------------------------
// server.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct ServerFile {
    server: ServerSection,
    database: DatabaseSection,
    catalog: CatalogSection,
}

#[derive(Debug, Clone, Deserialize)]
struct ServerSection {
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogSection {
    path: String,
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    draft: DraftSettings,
    #[serde(default)]
    sessions: Vec<SessionConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingKind {
    #[default]
    Alphabetical,
    Random,
}

/// League-wide draft defaults, the `[draft]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct DraftSettings {
    pub initial_credits: u32,
    #[serde(default)]
    pub ordering: OrderingKind,
    /// Single letter the alphabetical order of each role group starts from.
    #[serde(default)]
    pub starting_letter: Option<String>,
    /// Makes random orders reproducible.
    #[serde(default)]
    pub seed: Option<u64>,
    /// `ALL` or a role code.
    #[serde(default = "default_scope_text")]
    pub default_scope: String,
}

/// One `[[sessions]]` entry. Unset fields fall back to `[draft]`.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub id: String,
    pub admin_user_id: String,
    #[serde(default)]
    pub initial_credits: Option<u32>,
    #[serde(default)]
    pub ordering: Option<OrderingKind>,
    #[serde(default)]
    pub starting_letter: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub default_scope: Option<String>,
    #[serde(default)]
    pub participants: Vec<ParticipantConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ParticipantConfig {
    pub user_id: String,
    pub nickname: String,
}

fn default_scope_text() -> String {
    "ALL".into()
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/server.toml` and
/// `config/league.toml`, both relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- server.toml (required) ---
    let server_path = config_dir.join("server.toml");
    let server_text = read_file(&server_path)?;
    let server: ServerFile = toml::from_str(&server_text).map_err(|e| ConfigError::ParseError {
        path: server_path.clone(),
        source: e,
    })?;

    // --- league.toml (required) ---
    let league_path = config_dir.join("league.toml");
    let league_text = read_file(&league_path)?;
    let league: LeagueFile = toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
        path: league_path.clone(),
        source: e,
    })?;

    validate_server(&server)?;
    validate_draft(&league.draft)?;
    let sessions = resolve_sessions(&league)?;

    Ok(Config {
        ws_port: server.server.port,
        db_path: base_dir.join(server.database.path),
        catalog_path: base_dir.join(server.catalog.path),
        draft: league.draft,
        sessions,
    })
}

/// Files read from `config/`, seeded from `defaults/` when absent.
pub const CONFIG_FILES: [&str; 2] = ["server.toml", "league.toml"];

/// Copy every entry of [`CONFIG_FILES`] missing from `config/` out of
/// `defaults/`, leaving files already present alone. Returns the paths written.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let config_dir = base_dir.join("config");
    let missing: Vec<&str> = CONFIG_FILES
        .into_iter()
        .filter(|name| !config_dir.join(name).is_file())
        .collect();
    if missing.is_empty() {
        return Ok(Vec::new());
    }

    let defaults_dir = base_dir.join("defaults");
    if !defaults_dir.is_dir() {
        return Err(seed_error(format!(
            "{} missing under {} and there is no defaults/ to seed from",
            missing.join(", "),
            config_dir.display()
        )));
    }
    std::fs::create_dir_all(&config_dir)
        .map_err(|e| seed_error(format!("cannot create {}: {e}", config_dir.display())))?;

    missing
        .into_iter()
        .map(|name| {
            let (from, to) = (defaults_dir.join(name), config_dir.join(name));
            std::fs::copy(&from, &to).map_err(|e| {
                seed_error(format!("cannot seed {} from {}: {e}", to.display(), from.display()))
            })?;
            Ok(to)
        })
        .collect()
}

fn seed_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

/// Convenience wrapper: loads config relative to the working directory, or
/// the platform config directory when the working directory has neither
/// `config/` nor `defaults/`. Ensures default config files are copied first.
pub fn load_config() -> Result<Config, ConfigError> {
    let base = config_base_dir()?;
    ensure_config_files(&base)?;
    load_config_from(&base)
}

fn config_base_dir() -> Result<PathBuf, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    if cwd.join("config").exists() || cwd.join("defaults").exists() {
        return Ok(cwd);
    }
    directories::ProjectDirs::from("", "", "fantabuilder")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| ConfigError::DefaultsCopyError {
            message: "no config/ in the working directory and no home directory to fall back to"
                .into(),
        })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn parse_letter(field: &str, text: &str) -> Result<char, ConfigError> {
    let mut chars = text.trim().chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_alphabetic() => Ok(c),
        _ => Err(invalid(field, format!("must be a single letter, got `{text}`"))),
    }
}

fn parse_scope(field: &str, text: &str) -> Result<DraftScope, ConfigError> {
    DraftScope::from_str_scope(text)
        .ok_or_else(|| invalid(field, format!("must be ALL or a role code (P, D, C, A), got `{text}`")))
}

fn build_policy(
    prefix: &str,
    ordering: OrderingKind,
    starting_letter: Option<&str>,
    seed: Option<u64>,
) -> Result<OrderingPolicy, ConfigError> {
    Ok(match ordering {
        OrderingKind::Alphabetical => OrderingPolicy::Alphabetical {
            start_letter: starting_letter
                .map(|l| parse_letter(&format!("{prefix}.starting_letter"), l))
                .transpose()?,
        },
        OrderingKind::Random => OrderingPolicy::Random { seed },
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_server(server: &ServerFile) -> Result<(), ConfigError> {
    if server.server.port == 0 {
        return Err(invalid("server.port", "must be greater than 0"));
    }
    if server.database.path.trim().is_empty() {
        return Err(invalid("database.path", "must not be empty"));
    }
    if server.catalog.path.trim().is_empty() {
        return Err(invalid("catalog.path", "must not be empty"));
    }
    Ok(())
}

fn validate_draft(draft: &DraftSettings) -> Result<(), ConfigError> {
    if draft.initial_credits == 0 {
        return Err(invalid("draft.initial_credits", "must be greater than 0"));
    }
    if let Some(letter) = &draft.starting_letter {
        parse_letter("draft.starting_letter", letter)?;
    }
    parse_scope("draft.default_scope", &draft.default_scope)?;
    Ok(())
}

/// Merge each `[[sessions]]` entry with the `[draft]` defaults.
fn resolve_sessions(league: &LeagueFile) -> Result<Vec<SessionSetup>, ConfigError> {
    let draft = &league.draft;
    let mut ids = HashSet::new();
    let mut out = Vec::with_capacity(league.sessions.len());

    for (i, cfg) in league.sessions.iter().enumerate() {
        let prefix = format!("sessions[{i}]");
        if cfg.id.trim().is_empty() {
            return Err(invalid(format!("{prefix}.id"), "must not be empty"));
        }
        if !ids.insert(cfg.id.as_str()) {
            return Err(invalid(format!("{prefix}.id"), format!("duplicate session id `{}`", cfg.id)));
        }
        if cfg.admin_user_id.trim().is_empty() {
            return Err(invalid(format!("{prefix}.admin_user_id"), "must not be empty"));
        }

        let initial_credits = cfg.initial_credits.unwrap_or(draft.initial_credits);
        if initial_credits == 0 {
            return Err(invalid(format!("{prefix}.initial_credits"), "must be greater than 0"));
        }

        let policy = build_policy(
            &prefix,
            cfg.ordering.unwrap_or(draft.ordering),
            cfg.starting_letter.as_deref().or(draft.starting_letter.as_deref()),
            cfg.seed.or(draft.seed),
        )?;
        let default_scope = match &cfg.default_scope {
            Some(text) => parse_scope(&format!("{prefix}.default_scope"), text)?,
            None => parse_scope("draft.default_scope", &draft.default_scope)?,
        };

        let mut users = HashSet::new();
        for (j, p) in cfg.participants.iter().enumerate() {
            if p.user_id.trim().is_empty() {
                return Err(invalid(
                    format!("{prefix}.participants[{j}].user_id"),
                    "must not be empty",
                ));
            }
            if !users.insert(p.user_id.as_str()) {
                return Err(invalid(
                    format!("{prefix}.participants[{j}].user_id"),
                    format!("duplicate participant `{}`", p.user_id),
                ));
            }
        }

        out.push(SessionSetup {
            session: Session {
                id: cfg.id.clone(),
                admin_user_id: cfg.admin_user_id.clone(),
                policy,
                default_scope,
                initial_credits,
            },
            participants: cfg.participants.clone(),
        });
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
