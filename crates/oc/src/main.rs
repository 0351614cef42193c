use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    run().await?;

    Ok(())
}

/// Run the program
async fn run() -> color_eyre::eyre::Result<()> {
    let cli = oc::Cli::parse();
    let config = cli.config()?;

    match cli.command {
        Some(oc::Commands::Chat(options)) => {
            let span = tracing::span!(tracing::Level::INFO, "Chat");
            let _enter = span.enter();
            oc::commands::chat::run(options, config, cli.output).await?;
        }
        Some(oc::Commands::Models) => oc::commands::models::run(config, cli.output).await?,
        None => {
            color_eyre::eyre::bail!(
                "No subcommand provided. Use --help to see available subcommands."
            )
        }
    }

    Ok(())
}
