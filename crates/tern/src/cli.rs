use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use tern_common::paths;
use tern_webserver::WebserverCode;

use crate::format::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "tern",
    version,
    about = "Deploys TLS certificates into nginx/Apache and reports host statistics"
)]
pub struct Cli {
    /// Agent configuration file (default: <data dir>/config.toml)
    #[arg(long, env = "TERN_CONFIG", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "TERN_LOG", default_value = "info", global = true)]
    pub log_level: String,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write logs to file (in addition to stderr)
    #[arg(long, env = "TERN_LOG_FILE", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Output format for command results
    #[arg(long, value_enum, default_value_t = OutputFormat::Json, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(paths::tern_config_path)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the agent: control-plane listener and statistics collection
    Serve {
        /// Address to listen on (overrides the config file)
        #[arg(long, env = "TERN_LISTEN")]
        listen: Option<String>,
        /// TCP port (overrides the config file)
        #[arg(long, env = "TERN_PORT")]
        port: Option<u16>,
        /// Do not sample host statistics
        #[arg(long)]
        no_stats: bool,
    },
    /// List virtual hosts across installed webservers
    Hosts {
        /// Only hosts served by this webserver (nginx, apache)
        #[arg(long)]
        webserver: Option<WebserverCode>,
    },
    /// Point a virtual host at certificate and key files
    DeployCert {
        /// Server name of the virtual host
        #[arg(long)]
        server_name: String,
        /// PEM certificate (full chain)
        #[arg(long, value_name = "PATH")]
        cert: PathBuf,
        /// PEM private key
        #[arg(long, value_name = "PATH")]
        key: PathBuf,
    },
    /// Issue a certificate through the configured ACME client
    IssueCert {
        /// Domain to include; the first is the primary name
        #[arg(short, long = "domain", value_name = "DOMAIN", required = true)]
        domains: Vec<String>,
        /// Store the certificate without deploying it
        #[arg(long)]
        no_deploy: bool,
    },
    /// Generate a control-plane token and save it in the config file
    GenerateToken {
        /// Replace an existing token
        #[arg(long)]
        force: bool,
    },
    /// Inspect or toggle the ACME challenge directory
    CommonDir {
        #[command(subcommand)]
        command: CommonDirCommand,
    },
    /// Print the configured control-plane token
    ShowToken,
    /// Show version information
    Version,
    /// Replace this binary with the latest published release
    Update {
        /// Only report whether an update is available
        #[arg(long)]
        check: bool,
        /// Release base URL (overrides the config file)
        #[arg(long, env = "TERN_UPDATE_URL")]
        url: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CommonDirCommand {
    /// Challenge directory state for every virtual host
    Status,
    /// Serve the challenge directory from a virtual host
    Enable { server_name: String },
    /// Stop serving the challenge directory from a virtual host
    Disable { server_name: String },
}
