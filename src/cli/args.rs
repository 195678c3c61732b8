//! CLI argument parsing using clap.

use clap::{
    Parser,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::{Settings, WatchBackend};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Watch a directory and run an action program for every file change
#[derive(Parser, Debug)]
#[command(
    name = "watchpuppy",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch a directory and run an action program for every file change",
    long_about = "Watch a directory tree recursively. Created, modified and moved-in files \
                  run the insert action; deleted and moved-out files run the delete action. \
                  Each action is invoked with the file path as its only argument.",
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Directory to watch (recursively)
    #[arg(value_name = "DIRECTORY", required_unless_present = "show_config")]
    pub directory: Option<PathBuf>,

    /// Program to run for created, modified and moved-in files
    #[arg(long, value_name = "PATH")]
    pub insert_action: Option<PathBuf>,

    /// Program to run for deleted and moved-out files
    #[arg(long, value_name = "PATH")]
    pub delete_action: Option<PathBuf>,

    /// Wait for each action to finish and report failures
    #[arg(long)]
    pub sync: bool,

    /// Use the polling backend instead of native notifications
    #[arg(long)]
    pub poll: bool,

    /// Polling interval in milliseconds (implies --poll)
    #[arg(long, value_name = "MS")]
    pub poll_interval: Option<u64>,

    /// Maximum number of concurrently running async actions (0 = unbounded)
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,

    /// Path to a settings TOML file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the effective settings and exit
    #[arg(long)]
    pub show_config: bool,
}

impl Cli {
    /// Apply CLI flags on top of loaded settings.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(insert) = &self.insert_action {
            settings.actions.insert = Some(insert.clone());
        }
        if let Some(delete) = &self.delete_action {
            settings.actions.delete = Some(delete.clone());
        }
        if self.sync {
            settings.actions.sync = true;
        }
        if let Some(limit) = self.max_concurrent {
            settings.actions.max_concurrent = limit;
        }
        if self.poll || self.poll_interval.is_some() {
            settings.watch.backend = WatchBackend::Poll;
        }
        if let Some(ms) = self.poll_interval {
            settings.watch.poll_interval_ms = ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_full_invocation() {
        let cli = Cli::try_parse_from([
            "watchpuppy",
            "/tmp/watch",
            "--insert-action",
            "/bin/true",
            "--delete-action",
            "/bin/false",
            "--sync",
        ])
        .unwrap();

        assert_eq!(cli.directory, Some(PathBuf::from("/tmp/watch")));
        assert_eq!(cli.insert_action, Some(PathBuf::from("/bin/true")));
        assert_eq!(cli.delete_action, Some(PathBuf::from("/bin/false")));
        assert!(cli.sync);
        assert!(!cli.poll);
    }

    #[test]
    fn test_directory_required() {
        assert!(Cli::try_parse_from(["watchpuppy", "--insert-action", "/bin/true"]).is_err());
        assert!(Cli::try_parse_from(["watchpuppy", "--show-config"]).is_ok());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut settings = Settings::default();
        settings.actions.insert = Some(PathBuf::from("/from/config"));
        settings.actions.delete = Some(PathBuf::from("/kept/delete"));

        let cli = Cli::try_parse_from([
            "watchpuppy",
            "/tmp/watch",
            "--insert-action",
            "/from/cli",
            "--poll-interval",
            "250",
            "--max-concurrent",
            "8",
        ])
        .unwrap();
        cli.apply_overrides(&mut settings);

        assert_eq!(settings.actions.insert, Some(PathBuf::from("/from/cli")));
        assert_eq!(settings.actions.delete, Some(PathBuf::from("/kept/delete")));
        assert!(!settings.actions.sync);
        assert_eq!(settings.actions.max_concurrent, 8);
        assert_eq!(settings.watch.backend, WatchBackend::Poll);
        assert_eq!(settings.watch.poll_interval_ms, 250);
    }
}
