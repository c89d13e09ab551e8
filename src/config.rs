//! Startup configuration
//!
//! Resolves command-line flags and environment into an immutable
//! [`RuntimeConfig`]. Resolution never exits the process by itself; the
//! binary decides what to do with [`Startup::Help`] and parse errors.

use clap::{ArgAction, Parser};
use std::ffi::OsString;
use std::net::{Ipv4Addr, SocketAddr};

/// Usage text printed to standard error for `-h` / `--help`
pub const USAGE: &str = r#"HTTP Logger

This tool starts an HTTP server that logs all incoming requests.
By default, it returns "ok" with status 200.
Enable mirror mode to return the full request as JSON.

Usage:
  http-logger [options]

Options:
  -p, --port <port>    Port to run the server on (default: 8080)
  -m, --mirror         Enable mirror mode (responds with full request details)
  -h, --help           Show this help message and exit
"#;

/// Port used when neither `--port` nor `HTTP_LOGGER_PORT` is given
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Parser, Debug)]
#[command(name = "http-logger", disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Port to run the HTTP server on
    #[arg(short, long, env = "HTTP_LOGGER_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Enable mirror mode
    #[arg(short, long, env = "HTTP_LOGGER_MIRROR", action = ArgAction::SetTrue)]
    mirror: bool,

    /// Show help
    #[arg(short, long, action = ArgAction::SetTrue)]
    help: bool,
}

/// Runtime configuration, fixed for the lifetime of the process
///
/// # Examples
///
/// ```
/// use http_logger::RuntimeConfig;
///
/// let config = RuntimeConfig::default();
/// assert_eq!(config.port, 8080);
/// assert!(!config.mirror);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// TCP port to bind on all interfaces
    pub port: u16,
    /// Echo each request back as JSON instead of answering "ok"
    pub mirror: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            mirror: false,
        }
    }
}

impl RuntimeConfig {
    /// Address the listener binds to: every interface, configured port
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

/// What the process should do after resolving its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Startup {
    /// Start the server with this configuration
    Run(RuntimeConfig),
    /// Print [`USAGE`] to standard error and exit successfully
    Help,
}

/// Resolves process arguments (including the program name) into a [`Startup`]
///
/// Unknown flags and invalid port values are returned as `clap` errors;
/// calling [`clap::Error::exit`] on them gives the standard report and exit
/// status.
pub fn resolve<I, T>(args: I) -> Result<Startup, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args)?;
    if cli.help {
        return Ok(Startup::Help);
    }

    Ok(Startup::Run(RuntimeConfig {
        port: cli.port,
        mirror: cli.mirror,
    }))
}
