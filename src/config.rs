//! Startup configuration, read once from environment variables.
//!
//! | Variable            | Meaning                                  | Default          |
//! |---------------------|------------------------------------------|------------------|
//! | `GCP_PROJECT`       | project the metrics are attributed to    | required         |
//! | `GCP_ZONE`          | location of the monitored host           | required         |
//! | `GCP_INSTANCE_NAME` | cluster (instance) name                  | required         |
//! | `CADVISOR_HOST`     | `host:port` of the cAdvisor endpoint     | `localhost:8080` |
//! | `SERVICE_PATTERN`   | inclusion regex over rendered label sets | `.*`             |
//! | `SCRAPE_INTERVAL`   | seconds between scrapes                  | `30`             |
//!
//! Empty values are treated as unset.

use std::time::Duration;

use regex::Regex;

use crate::filter::Filter;
use crate::scraper::MonitoredResource;

pub const DEFAULT_CADVISOR_HOST: &str = "localhost:8080";
pub const DEFAULT_SCRAPE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_FILTER_PATTERN: &str = ".*";

const ENV_PROJECT: &str = "GCP_PROJECT";
const ENV_LOCATION: &str = "GCP_ZONE";
const ENV_CLUSTER: &str = "GCP_INSTANCE_NAME";
const ENV_CADVISOR_HOST: &str = "CADVISOR_HOST";
const ENV_FILTER_PATTERN: &str = "SERVICE_PATTERN";
const ENV_SCRAPE_INTERVAL: &str = "SCRAPE_INTERVAL";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to compile regex pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("GCP environment variables (GCP_PROJECT, GCP_ZONE, GCP_INSTANCE_NAME) must be set")]
    MissingIdentity,
    #[error("invalid scrape interval `{value}`: expected a positive number of seconds")]
    InvalidInterval { value: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fully validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_id: String,
    pub location: String,
    pub cluster: String,
    pub cadvisor_host: String,
    pub scrape_interval: Duration,
    pub filter_pattern: Regex,
}

impl Config {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Config::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPattern`] if `SERVICE_PATTERN` does not compile.
    /// - [`Error::MissingIdentity`] if any of the three identity variables is unset.
    /// - [`Error::InvalidInterval`] if `SCRAPE_INTERVAL` is not a positive integer.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let pattern = var(ENV_FILTER_PATTERN).unwrap_or_else(|| DEFAULT_FILTER_PATTERN.to_owned());
        let filter_pattern = Regex::new(&pattern).map_err(|source| Error::InvalidPattern {
            pattern: pattern.clone(),
            source,
        })?;

        let (Some(project_id), Some(location), Some(cluster)) =
            (var(ENV_PROJECT), var(ENV_LOCATION), var(ENV_CLUSTER))
        else {
            return Err(Error::MissingIdentity);
        };

        let scrape_interval = match var(ENV_SCRAPE_INTERVAL) {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(Error::InvalidInterval { value }),
            },
            None => DEFAULT_SCRAPE_INTERVAL,
        };

        Ok(Self {
            project_id,
            location,
            cluster,
            cadvisor_host: var(ENV_CADVISOR_HOST)
                .unwrap_or_else(|| DEFAULT_CADVISOR_HOST.to_owned()),
            scrape_interval,
            filter_pattern,
        })
    }

    /// Identity attached to exported samples.
    pub fn resource(&self) -> MonitoredResource {
        MonitoredResource {
            project_id: self.project_id.clone(),
            location: self.location.clone(),
            cluster: self.cluster.clone(),
        }
    }

    pub fn filter(&self) -> Filter {
        Filter::new(self.filter_pattern.clone())
    }
}
