mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mineflayer_client::{ConfigLoadError, MineflayerConfig, OfflineGame};
use mineflayer_scripting_host::ScriptRunner;
use tracing::{debug, error, info};

#[derive(Debug, Parser)]
#[command(name = "mineflayer", version, about = "Run a JavaScript bot script", long_about = None)]
pub struct Cli {
    /// Enables debug logging (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Account from the config file to play as
    #[arg(short, long)]
    account: Option<String>,

    /// User name reported to the script, overrides --account
    #[arg(short, long)]
    username: Option<String>,

    /// Also write logs to the data directory
    #[arg(long)]
    log_file: bool,

    /// Main script to run
    script: PathBuf,
}

fn load_config() -> anyhow::Result<MineflayerConfig> {
    match MineflayerConfig::load() {
        Ok(config) => Ok(config),
        Err(ConfigLoadError::NotFound) => Ok(MineflayerConfig::default()),
        Err(e) => Err(e).context("Failed to load config"),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config()?;

    let _log_guard = logging::init_logging(cli.debug, cli.log_file || config.scripting.log_to_file)
        .context("Failed to initialize logging")?;

    let username = config.resolve_username(cli.username.as_deref(), cli.account.as_deref())?;
    debug!("Running {} as {}", cli.script.display(), username);

    let game = Arc::new(OfflineGame::new(username.clone()));
    let host = ScriptRunner::builder(&cli.script, game)
        .username(username)
        .physics_fps(config.scripting.physics_fps)
        .spawn()
        .context("Failed to start script host")?;

    host.go();
    let exit = host.join()?;

    if let Some(failure) = &exit.failure {
        error!("Script failed: {}", failure);
    }
    info!("Exiting with status {}", exit.code);

    drop(_log_guard);
    std::process::exit(exit.code);
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
    fn test_parse_arguments() {
        let cli = Cli::try_parse_from(["mineflayer", "-dd", "--account", "main", "bot.js"]).unwrap();
        assert_eq!(cli.debug, 2);
        assert_eq!(cli.account.as_deref(), Some("main"));
        assert_eq!(cli.username, None);
        assert!(!cli.log_file);
        assert_eq!(cli.script, PathBuf::from("bot.js"));

        let cli = Cli::try_parse_from(["mineflayer", "--username", "steve", "--log-file", "bot.js"])
            .unwrap();
        assert_eq!(cli.username.as_deref(), Some("steve"));
        assert!(cli.log_file);
    }

    #[test]
    fn test_script_is_required() {
        assert!(Cli::try_parse_from(["mineflayer"]).is_err());
    }
}
