use std::time::Duration;

use castupnp::{DescriptionError, SoapError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Failed to fetch device description from {location}: {reason}")]
    DescriptionFetch { location: String, reason: String },
    #[error("Device at {0} exposes no AVTransport service")]
    UnsupportedService(String),
    #[error("{action} failed with HTTP status {status}")]
    RemoteControl {
        action: String,
        status: u16,
        body: String,
    },
    #[error("HTTP error while calling {action}: {source}")]
    Transport {
        action: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("Cannot build SOAP envelope: {0}")]
    Envelope(#[from] SoapError),
    #[error("Operation cancelled")]
    Cancelled,
}

impl ControlError {
    pub fn description_fetch(location: &str, reason: impl ToString) -> Self {
        ControlError::DescriptionFetch {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_url(url: &str, reason: impl ToString) -> Self {
        ControlError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Discovery failures. They are absorbed and logged by the discoverer, never
/// surfaced as a failure of the overall search.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Discovery timed out after {0:?}, returning partial results")]
    Timeout(Duration),
    #[error("SSDP socket error: {0}")]
    Socket(#[from] std::io::Error),
    #[error("Device description error: {0}")]
    Description(String),
}

impl From<DescriptionError> for DiscoveryError {
    fn from(err: DescriptionError) -> Self {
        DiscoveryError::Description(err.to_string())
    }
}

impl From<ControlError> for DiscoveryError {
    fn from(err: ControlError) -> Self {
        DiscoveryError::Description(err.to_string())
    }
}
