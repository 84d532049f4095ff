//! imagepin CLI - pins container image references to digests and tags.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod settings;

use commands::{Cli, Commands};
use settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imagepin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve(args) => {
            let settings = Settings::load_or_default(cli.config.as_deref())?;
            commands::resolve::run(&args, &settings).await
        }
        Commands::Tags(args) => {
            let settings = Settings::load_or_default(cli.config.as_deref())?;
            commands::tags::run(&args, &settings).await
        }
        Commands::Version => {
            println!("imagepin {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
