use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use partwise::config::{self, PartwiseConfig};
use partwise::llm::{EventMode, InstrumentedModel, Model, ModelKind, ModelRequestParameters, ModelSettings};
use partwise::logging::{init_logging, LogLevel};
use partwise::messages::{
    ModelMessage, ModelRequest, Part, PartDelta, RequestPart, ResponseStreamEvent,
};
use std::io::{stdout, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the standard search paths)
    #[arg(long, global = true, env = "PARTWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level, overriding the configured one
    #[arg(long, global = true, value_parser = parse_level)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a reply to a prompt, printing text as it arrives
    Stream {
        /// The prompt to send
        prompt: String,

        /// Model as `provider:name` (defaults to `default_model`)
        #[arg(short, long, env = "PARTWISE_MODEL")]
        model: Option<String>,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<u64>,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f64>,

        /// Record a GenAI span for the request
        #[arg(long)]
        instrument: bool,

        /// Print every normalized stream event as JSON instead of text
        #[arg(long)]
        events: bool,
    },
    /// Show how a model name resolves
    Resolve {
        /// Model as `provider:name` or a bare legacy name
        model: String,
    },
    /// List the configuration files that are searched
    ConfigPaths,
}

fn parse_level(value: &str) -> Result<LogLevel, String> {
    match value.to_ascii_lowercase().as_str() {
        "trace" => Ok(LogLevel::Trace),
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        other => Err(format!("unknown log level: {other}")),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PartwiseConfig> {
    match path {
        Some(path) => config::from_path(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => config::load().context("loading configuration"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    let _guard = init_logging(&config.logging)?;

    match cli.command {
        Commands::Stream {
            prompt,
            model,
            system,
            max_tokens,
            temperature,
            instrument,
            events,
        } => {
            let settings = ModelSettings {
                max_tokens,
                temperature,
                ..ModelSettings::default()
            };
            let mut parts = Vec::new();
            if let Some(system) = system {
                parts.push(RequestPart::system(system));
            }
            parts.push(RequestPart::user(prompt));
            let messages = vec![ModelMessage::from(ModelRequest::new(parts))];

            let known = config.resolve_model(model.as_deref())?;
            let model: Box<dyn Model> = if instrument || config.instrumentation.enabled {
                let mode = if instrument && !config.instrumentation.enabled {
                    EventMode::default()
                } else {
                    config.instrumentation.event_mode
                };
                Box::new(InstrumentedModel::new(known, mode))
            } else {
                Box::new(known)
            };

            stream_reply(model.as_ref(), &messages, &settings, events).await?;
        }
        Commands::Resolve { model } => {
            let kind = ModelKind::parse(&model)?;
            let resolved = config.resolve_model(Some(&model))?;
            println!("name:     {kind}");
            println!("model:    {}", resolved.model_name());
            println!("system:   {}", resolved.system());
            println!("variant:  {}", resolved.variant_name());
            if let Some(url) = resolved.base_url() {
                println!("base_url: {url}");
            }
        }
        Commands::ConfigPaths => {
            for path in config::search_paths() {
                let marker = if path.exists() { "found" } else { "missing" };
                println!("{marker:8} {}", path.display());
            }
        }
    }

    Ok(())
}

async fn stream_reply(
    model: &dyn Model,
    messages: &[ModelMessage],
    settings: &ModelSettings,
    print_events: bool,
) -> Result<()> {
    let mut stream = model
        .request_stream(messages, Some(settings), &ModelRequestParameters::default())
        .await?;

    let mut out = stdout();
    while let Some(event) = stream.next_event().await {
        let event = event?;
        if print_events {
            writeln!(out, "{}", serde_json::to_string(&event)?)?;
            continue;
        }
        match &event {
            ResponseStreamEvent::PartStart {
                part: Part::Text(text),
                ..
            } => write!(out, "{}", text.content)?,
            ResponseStreamEvent::PartDelta {
                delta: PartDelta::Text { content_delta },
                ..
            } => write!(out, "{content_delta}")?,
            _ => {}
        }
        out.flush()?;
    }
    writeln!(out)?;

    let response = stream.get();
    for call in response.tool_calls() {
        eprintln!(
            "tool call {} {}({})",
            call.tool_call_id,
            call.tool_name,
            call.args_as_json_str()
        );
    }
    let usage = stream.usage();
    eprintln!(
        "usage: {} request tokens, {} response tokens, {} requests",
        usage.request_tokens.unwrap_or(0),
        usage.response_tokens.unwrap_or(0),
        usage.requests
    );
    Ok(())
}
