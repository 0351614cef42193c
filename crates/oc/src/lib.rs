use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

pub mod chat;
pub mod commands;
pub mod config;
pub mod error;
pub mod message;
pub mod printer;
pub mod prompt;
pub mod segmenter;

#[derive(Debug, Parser)]
#[command(name = "oc")]
#[command(about = "Chat with local Ollama models through the terminal")]
pub struct Cli {
    /// Config file. Defaults to `$OC_ROOT/config.yaml` or `~/.config/oc/config.yaml`.
    #[arg(long, global = true, env = "OC_CONFIG")]
    pub config: Option<PathBuf>,
    /// Ollama server address.
    #[arg(long, global = true, env = "OLLAMA_BASE_URL")]
    pub base_url: Option<String>,
    /// Connect and read timeout, in milliseconds.
    #[arg(long, global = true, env = "OC_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,
    /// Response output format
    #[arg(short, long, global = true, value_enum, default_value = "raw")]
    pub output: Output,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Send a message to one or more models
    #[clap(alias = "c")]
    Chat(commands::chat::CommandOptions),
    /// List the models installed on the server
    #[clap(alias = "m")]
    Models,
}

#[derive(Default, ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[clap(rename_all = "kebab-case")]
pub enum Output {
    #[default]
    /// Plain text
    Raw,
    /// JSON
    Json,
    /// YAML
    Yaml,
}

impl Cli {
    /// Loads the config file and applies the global flags on top of it.
    pub fn config(&self) -> error::Result<config::Config> {
        let mut config = config::Config::load(self.config.as_deref())?;

        if self.base_url.is_some() {
            config.base_url = self.base_url.clone();
        }

        if self.timeout_ms.is_some() {
            config.timeout_ms = self.timeout_ms;
        }

        Ok(config)
    }
}
