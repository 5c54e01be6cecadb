use anyhow::{Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::agent::{AgentConfig, DEFAULT_MAX_ITERATIONS, PromptOptions};
use crate::agent::decide::DEFAULT_AGENT_TEMPERATURE;
use crate::agent::prompt::DEFAULT_DESCRIPTION_DELIMITER;
use crate::db::sqlite::{DEFAULT_MAX_STRING_LENGTH, DEFAULT_SAMPLE_ROWS_IN_TABLE_INFO};
use crate::tools::sql::DEFAULT_CHECKER_TEMPERATURE;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

const CONFIG_DIR_NAME: &str = "sql-agent";
const CONFIG_FILE_NAME: &str = "config.toml";
const MAX_TEMPERATURE: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_uri: Option<String>,
    pub provider: ProviderKind,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub agent_temperature: f32,
    pub checker_temperature: f32,
    pub verbose: bool,
    pub handle_parsing_errors: bool,
    /// `None` means no iteration limit.
    pub max_iterations: Option<usize>,
    pub max_execution_time: Option<Duration>,
    pub description_delimiter: Option<String>,
    pub sample_rows_in_table_info: usize,
    pub max_string_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            _ => Err(format!(
                "unknown provider '{value}', expected gemini or openai"
            )),
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileConfig {
    db_uri: Option<String>,
    provider: Option<String>,
    gemini_api_key: Option<String>,
    gemini_model: Option<String>,
    gemini_base_url: Option<String>,
    openai_api_key: Option<String>,
    openai_model: Option<String>,
    openai_base_url: Option<String>,
    agent_temperature: Option<f32>,
    checker_temperature: Option<f32>,
    verbose: Option<bool>,
    handle_parsing_errors: Option<bool>,
    max_iterations: Option<usize>,
    max_execution_time_ms: Option<u64>,
    description_delimiter: Option<String>,
    sample_rows_in_table_info: Option<usize>,
    max_string_length: Option<usize>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(explicit_path: Option<&Path>) -> Result<Self> {
        let config_path = match explicit_path {
            Some(path) => {
                if !path.is_file() {
                    bail!("Failed to load config {}: file not found", path.display());
                }
                path.to_path_buf()
            }
            None => discover_config_path()?,
        };
        let file = load_file_config(&config_path)?.unwrap_or_default();

        dotenvy::dotenv().ok();

        let provider = match env_non_empty("SQL_AGENT_PROVIDER")
            .or_else(|| file.provider.as_deref().and_then(non_empty).map(ToOwned::to_owned))
        {
            Some(value) => ProviderKind::from_str(&value)
                .map_err(|reason| config_error(&config_path, "provider", &reason))?,
            None => ProviderKind::Gemini,
        };

        let agent_temperature = validate_temperature(
            &config_path,
            "agent_temperature",
            env_parse("SQL_AGENT_TEMPERATURE")?
                .or(file.agent_temperature)
                .unwrap_or(DEFAULT_AGENT_TEMPERATURE),
        )?;
        let checker_temperature = validate_temperature(
            &config_path,
            "checker_temperature",
            env_parse("SQL_AGENT_CHECKER_TEMPERATURE")?
                .or(file.checker_temperature)
                .unwrap_or(DEFAULT_CHECKER_TEMPERATURE),
        )?;

        let max_iterations = env_parse("SQL_AGENT_MAX_ITERATIONS")?
            .or(file.max_iterations)
            .unwrap_or(DEFAULT_MAX_ITERATIONS);
        let max_execution_time_ms =
            env_parse("SQL_AGENT_MAX_EXECUTION_TIME_MS")?.or(file.max_execution_time_ms);

        let description_delimiter = match file.description_delimiter {
            Some(delimiter) if delimiter.is_empty() => None,
            Some(delimiter) => Some(delimiter),
            None => Some(DEFAULT_DESCRIPTION_DELIMITER.to_string()),
        };

        Ok(Self {
            db_uri: env_non_empty("SQL_AGENT_DB_URI").or(file_value(file.db_uri)),
            provider,
            gemini_api_key: env_non_empty("GEMINI_API_KEY").or(file_value(file.gemini_api_key)),
            gemini_model: env_non_empty("GEMINI_MODEL")
                .or(file_value(file.gemini_model))
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: env_non_empty("GEMINI_BASE_URL")
                .or(file_value(file.gemini_base_url))
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            openai_api_key: env_non_empty("OPENAI_API_KEY").or(file_value(file.openai_api_key)),
            openai_model: env_non_empty("OPENAI_MODEL")
                .or(file_value(file.openai_model))
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            openai_base_url: env_non_empty("OPENAI_BASE_URL")
                .or(file_value(file.openai_base_url))
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            agent_temperature,
            checker_temperature,
            verbose: env_bool("SQL_AGENT_VERBOSE")?
                .or(file.verbose)
                .unwrap_or(false),
            handle_parsing_errors: env_bool("SQL_AGENT_HANDLE_PARSING_ERRORS")?
                .or(file.handle_parsing_errors)
                .unwrap_or(false),
            max_iterations: (max_iterations > 0).then_some(max_iterations),
            max_execution_time: max_execution_time_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            description_delimiter,
            sample_rows_in_table_info: env_parse("SQL_AGENT_SAMPLE_ROWS_IN_TABLE_INFO")?
                .or(file.sample_rows_in_table_info)
                .unwrap_or(DEFAULT_SAMPLE_ROWS_IN_TABLE_INFO),
            max_string_length: env_parse("SQL_AGENT_MAX_STRING_LENGTH")?
                .or(file.max_string_length)
                .unwrap_or(DEFAULT_MAX_STRING_LENGTH),
        })
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_iterations: self.max_iterations,
            max_execution_time: self.max_execution_time,
            handle_parsing_errors: self.handle_parsing_errors,
            agent_temperature: self.agent_temperature,
            checker_temperature: self.checker_temperature,
            prompt: PromptOptions {
                description_delimiter: self.description_delimiter.clone(),
            },
        }
    }
}

fn discover_config_path() -> Result<PathBuf> {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let trimmed = xdg.trim();
        if trimmed.is_empty() {
            bail!("Failed to resolve config path: XDG_CONFIG_HOME is set but empty");
        }

        return Ok(PathBuf::from(trimmed)
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| anyhow!("Failed to resolve config path: HOME directory is unavailable"))?;

    Ok(home
        .join(".config")
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

fn load_file_config(config_path: &Path) -> Result<Option<RawFileConfig>> {
    if !config_path.is_file() {
        return Ok(None);
    }

    let config_text = fs::read_to_string(config_path).map_err(|err| {
        anyhow!(
            "Failed to load config {}: unable to read file: {err}",
            config_path.display()
        )
    })?;

    toml::from_str(&config_text)
        .map(Some)
        .map_err(|err| anyhow!("Failed to load config {}: {err}", config_path.display()))
}

fn validate_temperature(config_path: &Path, key: &str, value: f32) -> Result<f32> {
    if !(0.0..=MAX_TEMPERATURE).contains(&value) {
        return Err(config_error(
            config_path,
            key,
            &format!("{value} is outside 0.0..={MAX_TEMPERATURE}"),
        ));
    }
    Ok(value)
}

fn env_bool(key: &str) -> Result<Option<bool>> {
    let Some(value) = env_non_empty(key) else {
        return Ok(None);
    };

    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        _ => bail!("Invalid {key}: expected true or false, got '{value}'"),
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let Some(value) = env_non_empty(key) else {
        return Ok(None);
    };

    value
        .parse::<T>()
        .map(Some)
        .map_err(|err| anyhow!("Invalid {key}: '{value}': {err}"))
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn file_value(value: Option<String>) -> Option<String> {
    value
        .as_deref()
        .and_then(non_empty)
        .map(ToOwned::to_owned)
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn config_error(config_path: &Path, key_path: &str, reason: &str) -> anyhow::Error {
    anyhow!(
        "Failed to load config {}: {key_path}: {reason}",
        config_path.display()
    )
}
