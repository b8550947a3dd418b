use raftsnap_core::config::Environment;
use raftsnap_core::logging::{self, LogSettings};

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() {
    // A broken .env is reported once logging is up, then ignored.
    let (env, dotenv_err) = match Environment::load() {
        Ok(env) => (env, None),
        Err(err) => (Environment::default(), Some(err)),
    };

    // Initialize logging as early as possible.
    let settings = LogSettings::from_lookup(|k| env.var(k));
    if let Err(err) = logging::init_logging(&settings) {
        logging::init_logging_stderr(&settings);
        tracing::warn!(error = %format!("{:#}", err), "log file unavailable, logging to stderr");
    }
    match dotenv_err {
        Some(err) => tracing::warn!(error = %err, "ignoring .env"),
        None if env.dotenv_len() > 0 => tracing::debug!(vars = env.dotenv_len(), ".env loaded"),
        None => {}
    }

    // Usage errors exit 2 inside clap; runtime failures exit 1.
    if let Err(err) = CliCommand::run_from_args(&env).await {
        tracing::error!(error = %format!("{:#}", err), "command failed");
        eprintln!("raftsnap error: {:#}", err);
        std::process::exit(1);
    }
}
