//! Configuration loading for `netconsoled`.
//!
//! Configuration is read from a YAML file and may be overridden through environment variables. Once loaded, the
//! configured filter and sink stages can be built into a [`Dispatcher`].
#![deny(missing_docs)]

use std::{
    io,
    net::SocketAddr,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use figment::{
    providers::{Data, Env, Serialized, Yaml},
    Figment, Provider,
};
use netconsoled_core::{dispatcher::Dispatcher, sinks::SinkBuildError};
use serde::Deserialize;
use snafu::{ResultExt as _, Snafu};
use tracing::info;

mod server;
use self::server::resolve_addr;

mod stages;
pub use self::stages::{FilterConfig, SinkConfig};

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "NETCONSOLED_";

/// Default configuration document, as written by [`write_default_configuration`].
pub const DEFAULT_CONFIGURATION: &str = r#"---
# Configuration of the netconsoled server.
server:
  # Required: listen for incoming netconsole logs.
  udp_addr: :6666
  # Optional: enable HTTP server for Prometheus metrics.
  http_addr: :8080
# Logging for netconsoled itself.
logging:
  level: info
  format_json: false
# Zero or more filters to apply to incoming logs.
filters:
  # By default, apply no filtering to logs.
  - type: noop
# Zero or more sinks to use to store processed logs.
sinks:
  # By default, print logs to stdout and to a file.
  - type: stdout
  - type: file
    file: netconsoled.log
"#;

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// The configuration file could not be read.
    #[snafu(display("failed to read configuration file '{}': {}", path.display(), source))]
    Read {
        /// Path of the configuration file.
        path: PathBuf,

        /// Error source.
        source: io::Error,
    },

    /// The configuration could not be parsed.
    #[snafu(display("failed to process configuration: {}", source))]
    Parse {
        /// Error source.
        source: Box<figment::Error>,
    },

    /// Environment variable prefix was empty.
    #[snafu(display("environment variable prefix must not be empty"))]
    EmptyPrefix,

    /// The server UDP address was not set.
    #[snafu(display("server UDP address must not be empty"))]
    MissingUdpAddress,

    /// A server address could not be parsed or resolved.
    #[snafu(display("failed to parse server {} address '{}': {}", field, address, source))]
    InvalidAddress {
        /// Name of the address field.
        field: &'static str,

        /// The offending address.
        address: String,

        /// Error source.
        source: io::Error,
    },

    /// A server address resolved to nothing.
    #[snafu(display("server {} address '{}' did not resolve to any address", field, address))]
    UnresolvedAddress {
        /// Name of the address field.
        field: &'static str,

        /// The offending address.
        address: String,
    },

    /// A block-list filter entry was not an IP address.
    #[snafu(display("invalid address '{}' in blocklist filter: {}", address, source))]
    InvalidBlocklistAddress {
        /// The offending address.
        address: String,

        /// Error source.
        source: std::net::AddrParseError,
    },

    /// A file sink was configured without a file.
    #[snafu(display("must specify output file for file sink"))]
    MissingSinkFile,

    /// A sink could not be built.
    #[snafu(display("failed to build sink: {}", source))]
    BuildSink {
        /// Error source.
        source: SinkBuildError,
    },

    /// The default configuration could not be written.
    #[snafu(display("failed to write default configuration file '{}': {}", path.display(), source))]
    WriteDefault {
        /// Path of the configuration file.
        path: PathBuf,

        /// Error source.
        source: io::Error,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        Self::Parse { source: Box::new(e) }
    }
}

/// A configuration loader that can pull from various sources.
///
/// Sources take precedence in the order they are added: values from a later source override values from an earlier
/// one.
pub struct ConfigurationLoader {
    figment: Figment,
}

impl Default for ConfigurationLoader {
    fn default() -> Self {
        Self { figment: Figment::new() }
    }
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file could not be read, an error will be returned.
    pub fn from_yaml<P>(self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).context(Read { path })?;
        Ok(self.from_yaml_str(&contents))
    }

    /// Loads configuration from a YAML document.
    pub fn from_yaml_str(self, contents: &str) -> Self {
        self.add_provider(Data::<Yaml>::string(contents))
    }

    /// Loads configuration from environment variables.
    ///
    /// Only variables starting with `prefix` are considered. Nested keys are separated by a double underscore, so with a
    /// prefix of `NETCONSOLED_`, `NETCONSOLED_SERVER__UDP_ADDR` sets `server.udp_addr`.
    ///
    /// # Errors
    ///
    /// If the prefix is empty, or the environment could not be read, an error will be returned.
    pub fn from_environment(self, prefix: &str) -> Result<Self, ConfigurationError> {
        if prefix.is_empty() {
            return Err(ConfigurationError::EmptyPrefix);
        }

        // Snapshot the environment now, rather than whenever the configuration is extracted.
        let values = Env::prefixed(prefix).split("__").data()?;
        Ok(match values.get(&figment::Profile::Default) {
            Some(dict) => self.add_provider(Serialized::defaults(dict.clone())),
            None => self,
        })
    }

    fn add_provider<P: Provider>(mut self, provider: P) -> Self {
        self.figment = self.figment.admerge(provider);
        self
    }

    /// Consumes the loader, producing a validated configuration.
    ///
    /// # Errors
    ///
    /// If the configuration is malformed or incomplete, an error will be returned.
    pub fn into_config(self) -> Result<Config, ConfigurationError> {
        let raw = self.figment.extract::<RawConfig>()?;
        Config::from_raw(raw)
    }
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    server: RawServerConfig,

    #[serde(default)]
    logging: LoggingConfig,

    #[serde(default)]
    filters: Vec<FilterConfig>,

    #[serde(default)]
    sinks: Vec<SinkConfig>,
}

#[derive(Default, Deserialize)]
struct RawServerConfig {
    #[serde(default)]
    udp_addr: String,

    #[serde(default)]
    http_addr: Option<String>,

    #[serde(default)]
    workers: Option<NonZeroUsize>,
}

/// Server configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Address to receive netconsole logs on.
    pub udp_addr: SocketAddr,

    /// Address to serve Prometheus metrics on, if any.
    pub http_addr: Option<SocketAddr>,

    /// Number of dispatch workers, if set explicitly.
    pub workers: Option<NonZeroUsize>,
}

/// Logging configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log filter directives, such as `info` or `netconsoled=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to write logs as JSON.
    #[serde(default)]
    pub format_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format_json: false,
        }
    }
}

/// Processed `netconsoled` configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Filter stages, in order.
    ///
    /// Never empty: a configuration without filters gets a single no-op filter.
    pub filters: Vec<FilterConfig>,

    /// Sink stages, in order.
    ///
    /// Never empty: a configuration without sinks gets a single no-op sink.
    pub sinks: Vec<SinkConfig>,
}

impl Config {
    /// Loads configuration from the given YAML file, overridden by any `NETCONSOLED_` environment variables.
    ///
    /// # Errors
    ///
    /// If the configuration could not be loaded, or is not valid, an error will be returned.
    pub fn from_file<P>(path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        ConfigurationLoader::default()
            .from_yaml(path)?
            .from_environment(ENV_PREFIX)?
            .into_config()
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigurationError> {
        if raw.server.udp_addr.trim().is_empty() {
            return Err(ConfigurationError::MissingUdpAddress);
        }

        let udp_addr = resolve_addr("UDP", &raw.server.udp_addr)?;
        let http_addr = match raw.server.http_addr.as_deref().map(str::trim) {
            Some(addr) if !addr.is_empty() => Some(resolve_addr("HTTP", addr)?),
            _ => None,
        };

        let mut filters = raw.filters;
        if filters.is_empty() {
            filters.push(FilterConfig::Noop);
        }

        let mut sinks = raw.sinks;
        if sinks.is_empty() {
            sinks.push(SinkConfig::Noop);
        }

        // Validate stage parameters up front, so that nothing is built from a configuration that can't be built in full.
        for filter in &filters {
            filter.validate()?;
        }
        for sink in &sinks {
            sink.validate()?;
        }

        Ok(Self {
            server: ServerConfig {
                udp_addr,
                http_addr,
                workers: raw.server.workers,
            },
            logging: raw.logging,
            filters,
            sinks,
        })
    }

    /// Builds a dispatcher from the configured filter and sink stages.
    ///
    /// The names of the loaded stages are logged.
    ///
    /// # Errors
    ///
    /// If any stage could not be built, an error will be returned. No partially built pipeline is ever returned.
    pub fn build_dispatcher(&self) -> Result<Dispatcher, ConfigurationError> {
        let filter = stages::build_filters(&self.filters)?;
        let sink = stages::build_sinks(&self.sinks)?;

        info!("Loaded {} filter(s):", self.filters.len());
        for name in filter.stage_names() {
            info!("  - {}", name);
        }

        info!("Loaded {} sink(s):", self.sinks.len());
        for name in sink.stage_names() {
            info!("  - {}", name);
        }

        Ok(Dispatcher::new(filter, sink))
    }
}

/// Writes the default configuration document to `path`, replacing anything already there.
///
/// # Errors
///
/// If the file could not be written, an error will be returned.
pub fn write_default_configuration<P>(path: P) -> Result<(), ConfigurationError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    info!(path = %path.display(), "Creating netconsoled configuration file.");
    std::fs::write(path, DEFAULT_CONFIGURATION).context(WriteDefault { path })
}
