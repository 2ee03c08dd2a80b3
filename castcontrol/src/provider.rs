use std::time::Duration;

use async_trait::async_trait;
use castupnp::{DeviceDescription, parse_device_description};
use tracing::debug;

use crate::errors::{ControlError, DiscoveryError};

/// Fetches and parses the description document advertised at a location.
#[async_trait]
pub trait DeviceDescriptionProvider: Send + Sync {
    async fn fetch(&self, location: &str) -> Result<DeviceDescription, DiscoveryError>;
}

/// HTTP-based XML description provider (UPnP `description.xml`)
#[derive(Clone)]
pub struct HttpDescriptionProvider {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpDescriptionProvider {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl DeviceDescriptionProvider for HttpDescriptionProvider {
    async fn fetch(&self, location: &str) -> Result<DeviceDescription, DiscoveryError> {
        Ok(fetch_description(&self.client, location, self.timeout).await?)
    }
}

/// GETs `location` with a bounded timeout and parses the device description.
pub async fn fetch_description(
    client: &reqwest::Client,
    location: &str,
    timeout: Duration,
) -> Result<DeviceDescription, ControlError> {
    debug!("Fetching description at {}", location);

    let response = client
        .get(location)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ControlError::description_fetch(location, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ControlError::description_fetch(
            location,
            format!("HTTP status {}", status),
        ));
    }

    let body = response
        .text()
        .await
        .map_err(|e| ControlError::description_fetch(location, e))?;

    parse_device_description(&body).map_err(|e| ControlError::description_fetch(location, e))
}
