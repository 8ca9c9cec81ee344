use bugboard::{app, commands::Command, config, logging};
use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "bugboard")]
#[command(about = "Command-line client for the bug and suggestion board")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/bugboard/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Board API base URL, overriding the config file
  #[arg(long)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override API URL if specified on command line
  if let Some(url) = args.api_url {
    config.api.base_url = url;
  }

  let _guard = logging::init(&config.log.level)?;

  let app = app::App::new(&config)?;
  app.run(args.command).await?;

  Ok(())
}
