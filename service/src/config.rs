use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Heartbeat interval used when none is configured, in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 15;

/// A custom response header given as `Name: value`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CustomHeaderParseError(String);

impl fmt::Display for CustomHeaderParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "invalid custom header {:?}, expected the form `Name: value`",
            self.0
        )
    }
}

impl StdError for CustomHeaderParseError {}

impl FromStr for CustomHeader {
    type Err = CustomHeaderParseError;

    fn from_str(header: &str) -> Result<CustomHeader, Self::Err> {
        match header.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => Ok(CustomHeader {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(CustomHeaderParseError(header.to_string())),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// Seconds between heartbeat comments on idle SSE streams. 0 disables heartbeats.
    #[arg(long, env, default_value_t = DEFAULT_HEARTBEAT_INTERVAL_SECS)]
    pub heartbeat_interval_secs: u64,

    /// Extra headers sent on every SSE response, as `Name: value` pairs separated by `;`.
    /// Applied after the built-in SSE headers, so they can override them.
    #[arg(long, env, value_delimiter = ';')]
    pub custom_headers: Vec<CustomHeader>,

    /// Broadcast a numbered demo event to every connection at this interval in seconds.
    /// 0 disables the demo broadcaster.
    #[arg(long, env, default_value_t = 0)]
    pub demo_broadcast_interval_secs: u64,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap_or(LevelFilter::Info)),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn interface(&self) -> &str {
        self.interface.as_deref().unwrap_or("127.0.0.1")
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Returns the demo broadcast interval, or `None` when the demo is disabled.
    pub fn demo_broadcast_interval(&self) -> Option<Duration> {
        match self.demo_broadcast_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn custom_headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.custom_headers
            .iter()
            .map(|header| (header.name.as_str(), header.value.as_str()))
    }
}
