use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub calendar: CalendarConfig,
    pub crm: CrmConfig,
    pub agent: AgentConfig,
    pub slot_cache: SlotCacheConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub event_type_id: String,
    pub timezone: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub pipe_id: String,
    pub phase_id: String,
    pub timeout_secs: u64,
}

/// Persona and conversation limits embedded into the system prompt and the
/// session lifecycle.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub product_name: String,
    pub product_description: String,
    pub company_name: String,
    pub tone: String,
    pub max_messages: u32,
    pub session_timeout_minutes: u32,
}

#[derive(Clone, Debug)]
pub struct SlotCacheConfig {
    pub max_sessions: usize,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

/// Programmatic overrides applied after the file and the environment; used by
/// bootstrap tests and the binary's composition root.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub calendar_api_key: Option<String>,
    pub calendar_event_type_id: Option<String>,
    pub crm_api_key: Option<String>,
    pub crm_pipe_id: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://leadline.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: String::new().into(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4-turbo-preview".to_string(),
                timeout_secs: 30,
            },
            calendar: CalendarConfig {
                api_key: String::new().into(),
                base_url: "https://api.cal.com/v1".to_string(),
                event_type_id: String::new(),
                timezone: "America/Sao_Paulo".to_string(),
                timeout_secs: 15,
            },
            crm: CrmConfig {
                api_key: String::new().into(),
                base_url: "https://api.pipefy.com/graphql".to_string(),
                pipe_id: String::new(),
                phase_id: String::new(),
                timeout_secs: 15,
            },
            agent: AgentConfig {
                product_name: "Sistema de Automação de Marketing".to_string(),
                product_description:
                    "Plataforma completa de automação de marketing e vendas que ajuda empresas a \
                     aumentar conversões e otimizar processos comerciais"
                        .to_string(),
                company_name: "TechSolutions".to_string(),
                tone: "profissional, empático e consultivo".to_string(),
                max_messages: 50,
                session_timeout_minutes: 30,
            },
            slot_cache: SlotCacheConfig { max_sessions: 100, sweep_interval_secs: 600 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl AppConfig {
    /// Layered load: defaults, then `leadline.toml` (if present), then
    /// `LEADLINE_*` environment variables, then programmatic overrides, then
    /// validation.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leadline.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = secret_value(llm_api_key_value);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(calendar) = patch.calendar {
            if let Some(calendar_api_key_value) = calendar.api_key {
                self.calendar.api_key = secret_value(calendar_api_key_value);
            }
            if let Some(base_url) = calendar.base_url {
                self.calendar.base_url = base_url;
            }
            if let Some(event_type_id) = calendar.event_type_id {
                self.calendar.event_type_id = event_type_id;
            }
            if let Some(timezone) = calendar.timezone {
                self.calendar.timezone = timezone;
            }
            if let Some(timeout_secs) = calendar.timeout_secs {
                self.calendar.timeout_secs = timeout_secs;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(crm_api_key_value) = crm.api_key {
                self.crm.api_key = secret_value(crm_api_key_value);
            }
            if let Some(base_url) = crm.base_url {
                self.crm.base_url = base_url;
            }
            if let Some(pipe_id) = crm.pipe_id {
                self.crm.pipe_id = pipe_id;
            }
            if let Some(phase_id) = crm.phase_id {
                self.crm.phase_id = phase_id;
            }
            if let Some(timeout_secs) = crm.timeout_secs {
                self.crm.timeout_secs = timeout_secs;
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(product_name) = agent.product_name {
                self.agent.product_name = product_name;
            }
            if let Some(product_description) = agent.product_description {
                self.agent.product_description = product_description;
            }
            if let Some(company_name) = agent.company_name {
                self.agent.company_name = company_name;
            }
            if let Some(tone) = agent.tone {
                self.agent.tone = tone;
            }
            if let Some(max_messages) = agent.max_messages {
                self.agent.max_messages = max_messages;
            }
            if let Some(session_timeout_minutes) = agent.session_timeout_minutes {
                self.agent.session_timeout_minutes = session_timeout_minutes;
            }
        }

        if let Some(slot_cache) = patch.slot_cache {
            if let Some(max_sessions) = slot_cache.max_sessions {
                self.slot_cache.max_sessions = max_sessions;
            }
            if let Some(sweep_interval_secs) = slot_cache.sweep_interval_secs {
                self.slot_cache.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEADLINE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEADLINE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("LEADLINE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LEADLINE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_LLM_API_KEY") {
            self.llm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("LEADLINE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("LEADLINE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LEADLINE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("LEADLINE_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_CALENDAR_API_KEY") {
            self.calendar.api_key = secret_value(value);
        }
        if let Some(value) = read_env("LEADLINE_CALENDAR_BASE_URL") {
            self.calendar.base_url = value;
        }
        if let Some(value) = read_env("LEADLINE_CALENDAR_EVENT_TYPE_ID") {
            self.calendar.event_type_id = value;
        }
        if let Some(value) = read_env("LEADLINE_CALENDAR_TIMEZONE") {
            self.calendar.timezone = value;
        }

        if let Some(value) = read_env("LEADLINE_CRM_API_KEY") {
            self.crm.api_key = secret_value(value);
        }
        if let Some(value) = read_env("LEADLINE_CRM_BASE_URL") {
            self.crm.base_url = value;
        }
        if let Some(value) = read_env("LEADLINE_CRM_PIPE_ID") {
            self.crm.pipe_id = value;
        }
        if let Some(value) = read_env("LEADLINE_CRM_PHASE_ID") {
            self.crm.phase_id = value;
        }

        if let Some(value) = read_env("LEADLINE_AGENT_PRODUCT_NAME") {
            self.agent.product_name = value;
        }
        if let Some(value) = read_env("LEADLINE_AGENT_PRODUCT_DESCRIPTION") {
            self.agent.product_description = value;
        }
        if let Some(value) = read_env("LEADLINE_AGENT_COMPANY_NAME") {
            self.agent.company_name = value;
        }
        if let Some(value) = read_env("LEADLINE_AGENT_MAX_MESSAGES") {
            self.agent.max_messages = parse_u32("LEADLINE_AGENT_MAX_MESSAGES", &value)?;
        }
        if let Some(value) = read_env("LEADLINE_AGENT_SESSION_TIMEOUT_MINUTES") {
            self.agent.session_timeout_minutes =
                parse_u32("LEADLINE_AGENT_SESSION_TIMEOUT_MINUTES", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_SLOT_CACHE_MAX_SESSIONS") {
            self.slot_cache.max_sessions =
                parse_u32("LEADLINE_SLOT_CACHE_MAX_SESSIONS", &value)? as usize;
        }
        if let Some(value) = read_env("LEADLINE_SLOT_CACHE_SWEEP_INTERVAL_SECS") {
            self.slot_cache.sweep_interval_secs =
                parse_u64("LEADLINE_SLOT_CACHE_SWEEP_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEADLINE_SERVER_PORT") {
            self.server.port = parse_u16("LEADLINE_SERVER_PORT", &value)?;
        }

        if let Some(value) = read_env("LEADLINE_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("LEADLINE_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(llm_api_key_value) = overrides.llm_api_key {
            self.llm.api_key = secret_value(llm_api_key_value);
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(calendar_api_key_value) = overrides.calendar_api_key {
            self.calendar.api_key = secret_value(calendar_api_key_value);
        }
        if let Some(calendar_event_type_id) = overrides.calendar_event_type_id {
            self.calendar.event_type_id = calendar_event_type_id;
        }
        if let Some(crm_api_key_value) = overrides.crm_api_key {
            self.crm.api_key = secret_value(crm_api_key_value);
        }
        if let Some(crm_pipe_id) = overrides.crm_pipe_id {
            self.crm.pipe_id = crm_pipe_id;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_calendar(&self.calendar)?;
        validate_crm(&self.crm)?;
        validate_agent(&self.agent)?;
        validate_slot_cache(&self.slot_cache)?;
        validate_server(&self.server)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leadline.toml"), PathBuf::from("config/leadline.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.api_key.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "llm.api_key is required (or set LEADLINE_LLM_API_KEY)".to_string(),
        ));
    }
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }
    if llm.timeout_secs == 0 || llm.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=120".to_string(),
        ));
    }
    Ok(())
}

fn validate_calendar(calendar: &CalendarConfig) -> Result<(), ConfigError> {
    if calendar.api_key.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "calendar.api_key is required (or set LEADLINE_CALENDAR_API_KEY)".to_string(),
        ));
    }
    if calendar.event_type_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "calendar.event_type_id is required (or set LEADLINE_CALENDAR_EVENT_TYPE_ID)"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if crm.api_key.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "crm.api_key is required (or set LEADLINE_CRM_API_KEY)".to_string(),
        ));
    }
    if crm.pipe_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "crm.pipe_id is required (or set LEADLINE_CRM_PIPE_ID)".to_string(),
        ));
    }
    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.max_messages == 0 || agent.max_messages > 500 {
        return Err(ConfigError::Validation(
            "agent.max_messages must be in range 1..=500".to_string(),
        ));
    }
    if agent.session_timeout_minutes == 0 || agent.session_timeout_minutes > 1440 {
        return Err(ConfigError::Validation(
            "agent.session_timeout_minutes must be in range 1..=1440".to_string(),
        ));
    }
    Ok(())
}

fn validate_slot_cache(slot_cache: &SlotCacheConfig) -> Result<(), ConfigError> {
    if slot_cache.max_sessions == 0 {
        return Err(ConfigError::Validation(
            "slot_cache.max_sessions must be greater than zero".to_string(),
        ));
    }
    if slot_cache.sweep_interval_secs == 0 || slot_cache.sweep_interval_secs > 86_400 {
        return Err(ConfigError::Validation(
            "slot_cache.sweep_interval_secs must be in range 1..=86400".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    calendar: Option<CalendarPatch>,
    crm: Option<CrmPatch>,
    agent: Option<AgentPatch>,
    slot_cache: Option<SlotCachePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    event_type_id: Option<String>,
    timezone: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    pipe_id: Option<String>,
    phase_id: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    product_name: Option<String>,
    product_description: Option<String>,
    company_name: Option<String>,
    tone: Option<String>,
    max_messages: Option<u32>,
    session_timeout_minutes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SlotCachePatch {
    max_sessions: Option<usize>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
