use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;
use ollama_stream::Client;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

use crate::config::Config;
use crate::message::DisplayMessage;
use crate::printer::{self, LivePrinter};
use crate::prompt::{self, ModelFormat};
use crate::Output;

#[derive(Default, Clone, Parser, Debug)]
pub struct CommandOptions {
    /// The message to send. Use `-` to read it from stdin.
    prompt: Option<String>,
    /// Model to query. Repeat the flag, or separate names with commas, to ask
    /// several models at once.
    #[clap(short, long = "model", env = "OC_MODEL", value_delimiter = ',')]
    models: Vec<String>,
    /// Custom instructions sent as the system turn.
    #[clap(short, long)]
    system: Option<String>,
    /// Ask the model to answer without showing its reasoning.
    #[clap(long)]
    no_think: bool,
    /// Prompt layout expected by the model.
    #[clap(short, long, value_enum)]
    format: Option<ModelFormat>,
    /// JSON file with the previous turns of the conversation.
    #[clap(long)]
    history: Option<PathBuf>,
}

/// Final response of one model, as printed by the `json` and `yaml` outputs.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model: String,
    pub messages: Vec<DisplayMessage>,
}

/// Merges the command options into the config.
pub fn merge_options(mut config: Config, options: &CommandOptions) -> Config {
    if !options.models.is_empty() {
        config.model = None;
        config.models = Some(options.models.clone());
    }

    if options.system.is_some() {
        config.system = options.system.clone();
    }

    if options.format.is_some() {
        config.format = options.format;
    }

    config
}

/// Runs the `chat` command.
pub async fn run(options: CommandOptions, config: Config, output: Output) -> Result<()> {
    tracing::event!(tracing::Level::INFO, "Parsing prompt...");
    let message = match options.prompt.as_deref() {
        Some("-") => read_prompt(std::io::stdin().lock())?,
        Some(prompt) => prompt.to_string(),
        None => color_eyre::eyre::bail!("No prompt provided. Pass one or use `-` for stdin."),
    };

    let history = match &options.history {
        Some(path) => crate::message::load_history(path)?,
        None => vec![],
    };

    tracing::event!(tracing::Level::INFO, "Merging command options...");
    let config = merge_options(config, &options);

    let prompt = prompt::build(
        history,
        &message,
        config.system.as_deref(),
        !options.no_think,
        config.format.unwrap_or_default(),
    )?;
    tracing::event!(tracing::Level::DEBUG, "prompt: {:?}", prompt);

    let client = Client::new(config.client_config())?;
    let models = config.model_list();

    match (models.as_slice(), output) {
        ([model], Output::Raw) => stream_one(client, model.clone(), prompt, &config).await,
        _ => collect_all(client, models, prompt, &config, output).await,
    }
}

/// Reads a whole prompt from `reader`, lossily decoded and trimmed.
fn read_prompt(mut reader: impl Read) -> std::io::Result<String> {
    tracing::event!(tracing::Level::INFO, "Reading prompt from stdin...");
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).trim().to_string())
}

fn spinner(message: String) -> indicatif::ProgressBar {
    let spinner = indicatif::ProgressBar::new_spinner();
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Prints the response of a single model as it arrives.
async fn stream_one(client: Client, model: String, prompt: String, config: &Config) -> Result<()> {
    let spinner = spinner(format!("Waiting for {model}..."));
    let views = crate::chat::respond(client, model, prompt, config.markers());
    tokio::pin!(views);

    let mut printer = LivePrinter::new(std::io::stdout());
    while let Some(view) = views.next().await {
        if !spinner.is_finished() {
            spinner.finish_and_clear();
        }
        printer.print(&view)?;
    }
    spinner.finish_and_clear();
    printer.finish()?;

    Ok(())
}

/// Waits for every model to finish, then prints their final views.
async fn collect_all(
    client: Client,
    models: Vec<String>,
    prompt: String,
    config: &Config,
    output: Output,
) -> Result<()> {
    let spinner = spinner(format!("Waiting for {}...", models.join(", ")));

    let mut responses: Vec<ModelResponse> = models
        .iter()
        .map(|model| ModelResponse {
            model: model.clone(),
            messages: vec![],
        })
        .collect();

    let updates = crate::chat::respond_all(client, models, prompt, config.markers());
    tokio::pin!(updates);

    while let Some(update) = updates.next().await {
        tracing::event!(tracing::Level::DEBUG, "update from {}", update.model);
        match responses.get_mut(update.index) {
            Some(response) => response.messages = update.messages,
            None => responses.push(ModelResponse {
                model: update.model,
                messages: update.messages,
            }),
        }
    }
    spinner.finish_and_clear();

    match output {
        Output::Raw => {
            let several = responses.len() > 1;
            for response in &responses {
                if several {
                    println!("## {}\n", response.model);
                }
                println!("{}\n", printer::render(&response.messages));
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&responses)?),
        Output::Yaml => print!("{}", serde_yaml::to_string(&responses)?),
    }

    Ok(())
}
