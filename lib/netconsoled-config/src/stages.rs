use std::{net::IpAddr, path::PathBuf};

use netconsoled_core::{
    filters::{BlocklistFilter, Filter, MultiFilter, NoopFilter},
    sinks::{open_file, stdout, MultiSink, NoopSink, Sink},
};
use serde::Deserialize;
use snafu::ResultExt as _;

use crate::{BuildSink, ConfigurationError, InvalidBlocklistAddress};

/// Configuration of a single filter stage.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    /// Passes every log through unchanged.
    Noop,

    /// Drops logs sent from any of the listed IP addresses.
    Blocklist {
        /// Blocked IP addresses.
        #[serde(default)]
        addrs: Vec<String>,
    },
}

impl FilterConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        self.build().map(|_| ())
    }

    /// Builds the filter.
    ///
    /// # Errors
    ///
    /// If the filter parameters are invalid, an error is returned.
    pub fn build(&self) -> Result<Box<dyn Filter>, ConfigurationError> {
        Ok(match self {
            Self::Noop => Box::new(NoopFilter),
            Self::Blocklist { addrs } => {
                let addrs = addrs
                    .iter()
                    .map(|addr| {
                        addr.trim()
                            .parse::<IpAddr>()
                            .context(InvalidBlocklistAddress { address: addr.as_str() })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(BlocklistFilter::new(addrs))
            }
        })
    }
}

/// Configuration of a single sink stage.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// Discards every log.
    Noop,

    /// Writes logs to standard output.
    Stdout,

    /// Appends logs to a file, creating it if necessary.
    File {
        /// Path of the file.
        #[serde(default)]
        file: PathBuf,
    },
}

impl SinkConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Self::File { file } if file.as_os_str().is_empty() => Err(ConfigurationError::MissingSinkFile),
            _ => Ok(()),
        }
    }

    /// Builds the sink.
    ///
    /// Building a file sink opens (or creates) its file.
    ///
    /// # Errors
    ///
    /// If the sink parameters are invalid, or the sink's resources could not be acquired, an error is returned.
    pub fn build(&self) -> Result<Box<dyn Sink>, ConfigurationError> {
        self.validate()?;

        Ok(match self {
            Self::Noop => Box::new(NoopSink),
            Self::Stdout => Box::new(stdout()),
            Self::File { file } => Box::new(open_file(file).context(BuildSink)?),
        })
    }
}

pub(crate) fn build_filters(configs: &[FilterConfig]) -> Result<MultiFilter, ConfigurationError> {
    let filters = configs.iter().map(FilterConfig::build).collect::<Result<Vec<_>, _>>()?;
    Ok(MultiFilter::new(filters))
}

pub(crate) fn build_sinks(configs: &[SinkConfig]) -> Result<MultiSink, ConfigurationError> {
    let sinks = configs.iter().map(SinkConfig::build).collect::<Result<Vec<_>, _>>()?;
    Ok(MultiSink::new(sinks))
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use netconsoled_core::{
        filters::FilterOutcome,
        record::{LogEntry, Record},
        sinks::close_sink,
    };

    use super::*;

    #[test]
    fn filter_names() {
        let configs = vec![
            FilterConfig::Noop,
            FilterConfig::Blocklist {
                addrs: vec!["192.0.2.1".to_string()],
            },
        ];

        let filter = build_filters(&configs).unwrap();
        assert_eq!(filter.stage_names().collect::<Vec<_>>(), vec!["noop", "blocklist"]);
    }

    #[test]
    fn blocklist_rejects_configured_hosts() {
        let filter = FilterConfig::Blocklist {
            addrs: vec![" 192.0.2.1 ".to_string()],
        }
        .build()
        .unwrap();

        let blocked = Record::new(SocketAddr::from((Ipv4Addr::new(192, 0, 2, 1), 6666)), LogEntry::default());
        assert_eq!(filter.process(blocked).unwrap(), FilterOutcome::Reject);

        let allowed = Record::new(SocketAddr::from((Ipv4Addr::new(192, 0, 2, 2), 6666)), LogEntry::default());
        assert!(matches!(filter.process(allowed), Ok(FilterOutcome::Continue(_))));
    }

    #[test]
    fn sink_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netconsoled.log");
        let configs = vec![SinkConfig::Noop, SinkConfig::Stdout, SinkConfig::File { file: path.clone() }];

        let sink = build_sinks(&configs).unwrap();
        assert_eq!(
            sink.stage_names().collect::<Vec<_>>(),
            vec!["noop".to_string(), "stdout".to_string(), format!("file: {:?}", path)]
        );
        close_sink(&sink).unwrap();
    }

    #[test]
    fn file_sink_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = SinkConfig::File {
            file: dir.path().join("missing").join("netconsoled.log"),
        };

        assert!(matches!(config.build(), Err(ConfigurationError::BuildSink { .. })));
    }
}
