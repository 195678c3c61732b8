use clap::Parser;

use watchpuppy::cli::Cli;
use watchpuppy::cli::commands;
use watchpuppy::config::{LoggingConfig, Settings};
use watchpuppy::logging;

#[tokio::main]
async fn main() {
    // Usage errors exit 1; --help and --version exit 0
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init_with_config(&LoggingConfig::default());
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };
    cli.apply_overrides(&mut settings);

    logging::init_with_config(&settings.logging);

    if cli.show_config {
        if let Err(e) = commands::config::run_config(&settings) {
            eprintln!("Error displaying config: {e}");
            std::process::exit(1);
        }
        return;
    }

    // clap rejects a missing DIRECTORY unless --show-config is given
    let result = match cli.directory.as_deref() {
        Some(directory) => commands::watch::run(directory, &settings).await,
        None => Err(anyhow::anyhow!("missing DIRECTORY argument")),
    };

    if let Err(e) = result {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}
