mod cli;
mod commands;
mod format;

use std::process::ExitCode;

use clap::Parser;
use serde_json::json;

use tern::modules::AGENT_VERSION;

use cli::{Cli, Command};
use commands::serve::ServeOverrides;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => cli.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Hold the non-blocking guards for the lifetime of main so logs flush on exit.
    let _log_guards = match init_logging(env_filter, cli.log_file.as_deref()) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Error: failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(commands::exit_status(&e))
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let config_path = cli.config_path();

    match cli.command {
        Command::Version => format::print(
            format,
            &json!({
                "version": AGENT_VERSION,
                "platform": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            }),
        ),
        Command::GenerateToken { force } => {
            commands::token::generate_token(&config_path, force, format)
        }
        Command::ShowToken => {
            let config = commands::load_config(&config_path)?;
            commands::token::show_token(&config, format)
        }
        Command::Hosts { webserver } => {
            let config = commands::load_config(&config_path)?;
            commands::certs::hosts(&config, webserver, format)
        }
        Command::DeployCert {
            server_name,
            cert,
            key,
        } => {
            let config = commands::load_config(&config_path)?;
            commands::certs::deploy_cert(&config, &server_name, &cert, &key, format)
        }
        Command::IssueCert { domains, no_deploy } => {
            let config = commands::load_config(&config_path)?;
            commands::certs::issue_cert(&config, &domains, !no_deploy, format)
        }
        Command::CommonDir { command } => {
            let config = commands::load_config(&config_path)?;
            commands::certs::common_dir(&config, &command, format)
        }
        Command::Update { check, url } => {
            let config = commands::load_config(&config_path)?;
            let url = url.or(config.update.url);
            commands::update::update(url.as_deref(), check, format)
        }
        // ── Everything below needs a Tokio runtime ──────────────────────
        Command::Serve {
            listen,
            port,
            no_stats,
        } => {
            let config = commands::load_config(&config_path)?;
            tracing::info!(path = %config_path.display(), "Configuration loaded");
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::serve::serve(
                config,
                ServeOverrides {
                    listen,
                    port,
                    no_stats,
                },
            ))
        }
    }
}

// ── Logging setup ───────────────────────────────────────────────────

/// Initialize tracing with stderr + optional file output.
/// Returns guards that must be held for the lifetime of the program
/// to ensure the non-blocking writers flush on shutdown.
fn init_logging(
    env_filter: tracing_subscriber::EnvFilter,
    log_file: Option<&std::path::Path>,
) -> anyhow::Result<Vec<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    // Command output goes to stdout; logs stay on stderr so the two never mix.
    let (nb_stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(nb_stderr);

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let (nb_file, file_guard) = tracing_appender::non_blocking(file);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(nb_file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();

        Ok(vec![stderr_guard, file_guard])
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();

        Ok(vec![stderr_guard])
    }
}
