use anyhow::Context;
use clap::Parser;
use qr_attendance::Settings;
use qr_attendance::cli::Cli;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load configuration")?;

    cli.command.run(settings)
}
