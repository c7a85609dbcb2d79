mod api;
mod app;
mod cache;
mod commands;
mod config;
mod logging;
mod mutation;
mod store;
mod validation;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

use crate::config::ExecutionContext;

#[derive(Parser, Debug)]
#[command(name = "propfolio")]
#[command(about = "Browse and manage property portfolios")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./propfolio.yaml or $XDG_CONFIG_HOME/propfolio/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Run as a server-side pre-fetch, using the internal API URL when co-located
  #[arg(long, global = true)]
  server_side: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging)?;

  let context = if args.server_side {
    ExecutionContext::Server
  } else {
    ExecutionContext::Client
  };

  let app = app::App::new(config, context)?;
  app.run(args.command).await?;

  Ok(())
}
