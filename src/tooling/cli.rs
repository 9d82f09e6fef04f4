//! CLI Tooling
//!
//! Command-line interface for running an agent, resolving single messages
//! offline and inspecting the effective configuration.

use crate::agent::{AgentBuilder, AgentHooks};
use crate::config::{redelivery_limit, AgentSettings, ConfigLoader, TransportKind};
use crate::engine::IntentEngine;
use crate::error::AgentError;
use crate::message;
use crate::resolver::ResolverRegistry;
use crate::transport::{InMemoryBus, LineTransport, Transport};
use crate::types::MessageTree;
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::info;

/// Intentbus CLI - intent resolution agents for a shared message bus
#[derive(Parser)]
#[command(name = "intentbus")]
#[command(about = "Resolve intents carried by messages on a shared publish/subscribe bus")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the delivery loop until interrupted or the input closes
    Run {
        /// Agent name (overrides agent.name)
        #[arg(long)]
        name: Option<String>,
        /// Transport to connect (overrides bus.transport)
        #[arg(long, value_enum)]
        transport: Option<TransportKind>,
        /// Topic name (overrides bus.topic)
        #[arg(long)]
        topic: Option<String>,
        /// Message to publish once the agent starts (repeatable)
        #[arg(long = "seed", value_name = "JSON")]
        seeds: Vec<String>,
        /// Declines tolerated per message, or "unbounded"
        #[arg(long, value_parser = parse_redelivery_limit)]
        max_redeliveries: Option<RedeliveryLimit>,
    },
    /// Resolve one message offline and print the result
    Resolve {
        /// Message JSON; read from stdin when neither this nor --file is given
        #[arg(conflicts_with = "file")]
        message: Option<String>,
        /// Read the message from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List the resolvers an agent would register
    Resolvers {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the effective configuration as TOML
    Config,
}

/// Parsed `--max-redeliveries` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryLimit(pub Option<u32>);

fn parse_redelivery_limit(value: &str) -> Result<RedeliveryLimit, String> {
    redelivery_limit::parse(value).map(RedeliveryLimit)
}

/// Read a whole message from an async reader such as stdin
async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<String> {
    let mut text = String::new();
    reader.read_to_string(&mut text).await?;
    Ok(text)
}

/// Prints outgoing messages when the bus is in-process and nothing else can see them
struct StdoutEcho;

impl AgentHooks for StdoutEcho {
    fn on_sending(&self, message: &MessageTree) {
        println!("{}", message);
    }
}

/// CLI context holding the loaded settings
pub struct CliContext {
    settings: AgentSettings,
}

impl CliContext {
    /// Create a new CLI context from layered configuration
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, AgentError> {
        let settings = ConfigLoader::load(config_path.as_deref())?;
        Ok(Self { settings })
    }

    pub fn from_settings(settings: AgentSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Apply `--log-*` flags on top of the configured logging section
    pub fn apply_logging_overrides(&mut self, cli: &Cli) {
        let logging = &mut self.settings.logging;
        if let Some(level) = &cli.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &cli.log_format {
            logging.format = format.clone();
        }
        if let Some(output) = &cli.log_output {
            logging.output = output.clone();
        }
        if let Some(file) = &cli.log_file {
            logging.file = Some(file.clone());
        }
    }

    /// Execute a CLI command
    ///
    /// Returns text for stdout; empty when the command already wrote its output.
    pub async fn execute(&self, command: &Commands) -> Result<String, AgentError> {
        match command {
            Commands::Run {
                name,
                transport,
                topic,
                seeds,
                max_redeliveries,
            } => {
                let mut settings = self.settings.clone();
                if let Some(name) = name {
                    settings.agent.name = name.clone();
                }
                if let Some(transport) = transport {
                    settings.bus.transport = *transport;
                }
                if let Some(topic) = topic {
                    settings.bus.topic = topic.clone();
                }
                if let Some(limit) = max_redeliveries {
                    settings.delivery.max_redeliveries = limit.0;
                }
                settings.validate()?;
                self.handle_run(settings, seeds).await
            }
            Commands::Resolve { message, file } => {
                self.handle_resolve(message.as_deref(), file.as_ref()).await
            }
            Commands::Resolvers { format } => self.handle_resolvers(format),
            Commands::Config => toml::to_string_pretty(&self.settings).map_err(|e| {
                AgentError::ConfigError(format!("Failed to render configuration: {}", e))
            }),
        }
    }

    async fn handle_run(
        &self,
        settings: AgentSettings,
        seeds: &[String],
    ) -> Result<String, AgentError> {
        let seeds = seeds
            .iter()
            .map(|seed| message::decode(seed.as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;

        let poll_timeout = settings.bus.poll_timeout();
        let (transport, hooks) = match settings.bus.transport {
            TransportKind::Stdio => {
                let transport: Arc<dyn Transport> = Arc::new(LineTransport::stdio(
                    settings.bus.topic.clone(),
                    poll_timeout,
                ));
                (transport, None)
            }
            TransportKind::Memory => {
                let bus = InMemoryBus::new(settings.bus.topic.clone());
                let transport: Arc<dyn Transport> = Arc::new(bus.connect(poll_timeout));
                let hooks: Arc<dyn AgentHooks> = Arc::new(StdoutEcho);
                (transport, Some(hooks))
            }
        };

        let mut builder = AgentBuilder::from_settings(settings).transport(transport);
        if let Some(hooks) = hooks {
            builder = builder.hooks(hooks);
        }
        let agent = Arc::new(builder.build()?);

        for seed in &seeds {
            agent.publish(seed)?;
        }

        let signal_agent = Arc::clone(&agent);
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, stopping agent");
                signal_agent.stop();
            }
        });
        let result = agent.run().await;
        signal.abort();
        result?;

        let stats = agent.stats();
        info!(
            agent = %agent.name(),
            received = stats.received,
            resolved = stats.resolved,
            domain_errors = stats.domain_errors,
            declined = stats.declined,
            discarded = stats.discarded,
            "Run finished"
        );
        Ok(String::new())
    }

    async fn handle_resolve(
        &self,
        message: Option<&str>,
        file: Option<&PathBuf>,
    ) -> Result<String, AgentError> {
        let text = match (message, file) {
            (Some(text), _) => text.to_string(),
            (None, Some(path)) => tokio::fs::read_to_string(path).await?,
            (None, None) => read_all(tokio::io::stdin()).await?,
        };
        let tree = message::decode(text.as_bytes())?;

        let engine = IntentEngine::new(Arc::new(self.registry()?));
        let resolution = engine.resolve_message(&tree)?;
        Ok(serde_json::to_string_pretty(&resolution.message)?)
    }

    fn handle_resolvers(&self, format: &str) -> Result<String, AgentError> {
        let registry = self.registry()?;
        let rows: Vec<(String, &'static str, String)> = registry
            .names()
            .into_iter()
            .map(|name| {
                let source = if self.settings.resolvers.contains_key(name) {
                    "config"
                } else {
                    "builtin"
                };
                let data_type = registry
                    .get(name)
                    .and_then(|resolver| resolver.data_type())
                    .unwrap_or("-")
                    .to_string();
                (name.to_string(), source, data_type)
            })
            .collect();

        match format {
            "json" => {
                let entries: Vec<_> = rows
                    .iter()
                    .map(|(name, source, data_type)| {
                        json!({ "name": name, "source": source, "data_type": data_type })
                    })
                    .collect();
                Ok(serde_json::to_string_pretty(&entries)?)
            }
            "text" => {
                if rows.is_empty() {
                    return Ok("No resolvers registered.".to_string());
                }
                let mut table = Table::new();
                table.load_preset(UTF8_BORDERS_ONLY);
                table.set_header(vec!["Intent", "Source", "Data type"]);
                for (name, source, data_type) in rows {
                    table.add_row(vec![name, source.to_string(), data_type]);
                }
                Ok(table.to_string())
            }
            other => Err(AgentError::ConfigError(format!(
                "Invalid format: {} (must be 'text' or 'json')",
                other
            ))),
        }
    }

    fn registry(&self) -> Result<ResolverRegistry, AgentError> {
        let mut registry = ResolverRegistry::new();
        registry.load_from_settings(&self.settings)?;
        Ok(registry)
    }
}
