//! Monolith cache CLI - validate cache configurations and run cache simulations.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use monolith_cache_cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli.log_level();
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("monolith_embedding_cache={}", level).parse()?)
                .add_directive(format!("monolith_cache_cli={}", level).parse()?),
        )
        .init();

    info!("Monolith cache CLI starting...");

    match cli.command {
        Commands::Validate(cmd) => cmd.run()?,
        Commands::Simulate(cmd) => {
            cmd.run()?;
        }
    }

    info!("Monolith cache CLI completed successfully");
    Ok(())
}
