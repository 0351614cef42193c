use color_eyre::eyre::Result;
use ollama_stream::Client;

use crate::config::Config;
use crate::Output;

/// Runs the `models` command.
pub async fn run(config: Config, output: Output) -> Result<()> {
    let client = Client::new(config.client_config())?;

    tracing::event!(
        tracing::Level::INFO,
        "Fetching models from {}...",
        client.config().base_url
    );
    let models = client.models().await?;

    match output {
        Output::Raw => {
            for model in &models {
                println!("{model}");
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&models)?),
        Output::Yaml => print!("{}", serde_yaml::to_string(&models)?),
    }

    Ok(())
}
