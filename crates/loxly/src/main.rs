mod cli;
mod commands;
mod config;
mod error;
mod output;
mod structure_cache;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries events only
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "loxly", &mut std::io::stdout());
            Ok(())
        }

        Command::Rooms => {
            let cfg = config::load_config()?;
            commands::rooms::handle(&cli.global, &cfg).await
        }

        Command::Map => {
            let cfg = config::load_config()?;
            commands::map::handle(&cli.global, &cfg).await
        }

        Command::Status(args) => {
            let cfg = config::load_config()?;
            commands::status::handle(args, &cli.global, &cfg).await
        }

        Command::Watch(args) => {
            let cfg = config::load_config()?;
            tracing::debug!(?args, "starting watch");
            commands::watch::handle(args, &cli.global, &cfg).await
        }
    }
}
