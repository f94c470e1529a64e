//! evalmodel binary entry point

use std::io::Read;

use color_eyre::{eyre::WrapErr, Result};
use evalmodel::{
    cli::{Cli, Commands},
    EvalModel, LiteLlmModel, ModelConfig,
};
use tracing_subscriber::EnvFilter;

fn load_config(cli: &Cli) -> Result<ModelConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| Some(ModelConfig::default_path()).filter(|p| p.exists()));

    let mut config = match path {
        Some(path) => ModelConfig::load_from_path(&path)?,
        None => ModelConfig::default(),
    };

    if let Some(model) = &cli.model {
        config.model.clone_from(model);
        config.model_name = None;
    }

    Ok(config)
}

fn read_prompt(prompt: String) -> Result<String> {
    if prompt != "-" {
        return Ok(prompt);
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .wrap_err("failed to read prompt from stdin")?;
    Ok(buf)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install error handler
    color_eyre::install()?;

    // Provider keys may live in a local .env
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Set up logging
    let default_filter = if cli.verbose {
        "evalmodel=debug"
    } else {
        "evalmodel=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Handle commands
    match &cli.command {
        Commands::Generate(args) => {
            let mut config = load_config(&cli)?;
            args.apply_to(&mut config);
            let overrides = args.overrides();
            let prompt = read_prompt(args.prompt.clone())?;

            let model = LiteLlmModel::new(config)?;
            let text = tokio::task::spawn_blocking(move || model.generate(&prompt, &overrides))
                .await
                .wrap_err("completion task panicked")??;
            println!("{text}");
        }
        Commands::Check => {
            let model = LiteLlmModel::new(load_config(&cli)?)?;
            println!("{} -> {}: ok", model.model_name(), model.provider());
        }
        Commands::Version => {
            println!("evalmodel version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
