pub mod agent;
pub mod cli;
pub mod config;
pub mod db;
pub mod http;
pub mod llm;
pub mod tools;
pub mod trace;

use agent::{AgentInput, SqlAgent};
use anyhow::{Result, anyhow, bail};
use cli::{CliArgs, error_details, progress_lines};
use config::{AppConfig, ProviderKind};
use db::SqliteDatabase;
use http::client::HttpClient;
use http::debug::{HttpDebugConfig, redact_db_uri};
use llm::ConfiguredProvider;
use llm::gemini::GeminiProvider;
use llm::openai::OpenAiProvider;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use trace::SessionTrace;

pub async fn run(args: CliArgs) -> Result<()> {
    let mut config = AppConfig::load_with_path(args.config.as_deref())?;
    if args.verbose {
        config.verbose = true;
    }
    if args.handle_parsing_errors {
        config.handle_parsing_errors = true;
    }

    let db_uri = config.db_uri.clone().ok_or_else(|| {
        anyhow!("Missing database URI: set SQL_AGENT_DB_URI or db_uri in the config file")
    })?;
    let question = resolve_question(args.question)?;

    let session_id = generate_session_id();
    let trace = SessionTrace::create(&session_id)?;
    let redacted_uri = redact_db_uri(&db_uri);
    trace.log_db_open(&redacted_uri);
    let db = SqliteDatabase::from_uri(&db_uri)
        .map_err(|err| {
            trace.log_error(&err.to_string());
            anyhow!("Failed to open database {redacted_uri}: {err}")
        })?
        .with_sample_rows_in_table_info(config.sample_rows_in_table_info)
        .with_max_string_length(config.max_string_length);

    let http = HttpClient::new(
        reqwest::Client::new(),
        HttpDebugConfig::from_verbose(config.verbose),
    )
    .with_trace(trace.clone());
    let provider = build_provider(&config, http)?;
    let agent = SqlAgent::new(Arc::new(db), Arc::new(provider), config.agent_config());

    trace.log_system_prompt(agent.system_message());
    trace.log_question(&question);
    let verbose = config.verbose;
    let result = agent
        .invoke_with_events(AgentInput::new(question), &mut |event| {
            trace.log_agent_event(&event);
            if verbose {
                for line in progress_lines(&event) {
                    eprintln!("{line}");
                }
            }
        })
        .await;

    match result {
        Ok(output) => {
            trace.log_answer(&output.output);
            println!("{}", output.output);
            Ok(())
        }
        Err(err) => {
            trace.log_error(&err.to_string());
            for line in error_details(&err) {
                eprintln!("{line}");
            }
            Err(anyhow::Error::new(err)
                .context(format!("Agent run failed (trace: {})", trace.file_path().display())))
        }
    }
}

fn build_provider(config: &AppConfig, http: HttpClient) -> Result<ConfiguredProvider> {
    let provider = match config.provider {
        ProviderKind::Gemini => GeminiProvider::new(
            http,
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.gemini_base_url.clone(),
        )
        .map(ConfiguredProvider::Gemini),
        ProviderKind::OpenAi => OpenAiProvider::new(
            http,
            config.openai_api_key.clone(),
            config.openai_model.clone(),
            config.openai_base_url.clone(),
        )
        .map(ConfiguredProvider::OpenAi),
    };

    provider.map_err(|err| anyhow!("Failed to configure {} provider: {err}", config.provider))
}

fn resolve_question(arg: Option<String>) -> Result<String> {
    let raw = match arg {
        Some(question) => question,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|err| anyhow!("Failed to read question from stdin: {err}"))?;
            buffer
        }
    };

    let question = raw.trim();
    if question.is_empty() {
        bail!("No question provided: pass QUESTION or pipe it on stdin");
    }
    Ok(question.to_string())
}

fn generate_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis());
    format!("{millis:x}-{:x}", std::process::id())
}
