//! AVTransport control of one renderer.

use std::sync::Mutex;
use std::time::Duration;

use castconfig::Config;
use castupnp::{AV_TRANSPORT_FRAGMENT, build_soap_request, soap::soap_action_header};
use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::ControlError;
use crate::model::DeviceInfo;
use crate::provider::fetch_description;
use crate::subscription::SubscriptionManager;

/// Resolved control endpoint of the renderer's AVTransport service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEndpoint {
    pub service_type: String,
    pub control_url: String,
    pub event_sub_url: Option<String>,
}

/// Playback progress of a controller. There is no uninitialised state: a
/// controller only exists once its description is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    DescriptionResolved,
    SourceSet,
    Playing,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub http_timeout: Duration,
    pub settle_delay: Duration,
    pub heartbeat: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(2000),
            heartbeat: Duration::from_secs(30),
        }
    }
}

impl ControllerOptions {
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        Self {
            http_timeout: config
                .get_renderer_http_timeout()
                .unwrap_or(defaults.http_timeout),
            settle_delay: config
                .get_renderer_settle_delay()
                .unwrap_or(defaults.settle_delay),
            heartbeat: config.get_renderer_heartbeat().unwrap_or(defaults.heartbeat),
        }
    }
}

/// Resolves a service URL from a device description.
///
/// Absolute URLs are kept. Relative ones are joined to the directory of the
/// description location, leading `/` ignored.
pub fn resolve_service_url(location: &str, path: &str) -> Result<String, ControlError> {
    let lower = path.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(path.to_string());
    }
    let base = Url::parse(location).map_err(|e| ControlError::invalid_url(location, e))?;
    let resolved = base
        .join(path.trim_start_matches('/'))
        .map_err(|e| ControlError::invalid_url(path, e))?;
    Ok(resolved.to_string())
}

/// Drives one renderer through its AVTransport service.
pub struct DeviceController {
    client: reqwest::Client,
    endpoint: ControlEndpoint,
    info: DeviceInfo,
    options: ControllerOptions,
    state: Mutex<ControllerState>,
    subscription: SubscriptionManager,
}

impl DeviceController {
    /// Fetches the description at `location` and resolves the AVTransport
    /// control endpoint.
    pub async fn create(location: &str, cancel: &CancellationToken) -> Result<Self, ControlError> {
        Self::create_with_options(location, ControllerOptions::default(), cancel).await
    }

    pub async fn create_configured(
        location: &str,
        cancel: &CancellationToken,
    ) -> Result<Self, ControlError> {
        let options = ControllerOptions::from_config(&castconfig::get_config());
        Self::create_with_options(location, options, cancel).await
    }

    pub async fn create_with_options(
        location: &str,
        options: ControllerOptions,
        cancel: &CancellationToken,
    ) -> Result<Self, ControlError> {
        let client = reqwest::Client::new();

        let description = tokio::select! {
            _ = cancel.cancelled() => return Err(ControlError::Cancelled),
            fetched = fetch_description(&client, location, options.http_timeout) => fetched?,
        };

        let service = description
            .find_service(AV_TRANSPORT_FRAGMENT)
            .ok_or_else(|| ControlError::UnsupportedService(location.to_string()))?;

        let endpoint = ControlEndpoint {
            service_type: service.service_type.clone(),
            control_url: resolve_service_url(location, &service.control_url)?,
            event_sub_url: service
                .event_sub_url
                .as_deref()
                .map(|path| resolve_service_url(location, path))
                .transpose()?,
        };

        let info = DeviceInfo {
            friendly_name: description.friendly_name.clone().unwrap_or_default(),
            manufacturer: description.manufacturer.clone().unwrap_or_default(),
            model_name: description.model_name.clone().unwrap_or_default(),
            location: location.to_string(),
        };

        info!(
            control_url = %endpoint.control_url,
            "🎛️ Controller ready for {}",
            info.friendly_name
        );

        Ok(Self {
            client,
            subscription: SubscriptionManager::new(endpoint.event_sub_url.clone()),
            endpoint,
            info,
            options,
            state: Mutex::new(ControllerState::DescriptionResolved),
        })
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock().expect("controller state mutex poisoned")
    }

    pub fn subscription_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Sets `media_url` as the transport source, waits the settle delay,
    /// starts playback and then the event subscription.
    ///
    /// A failed step aborts the sequence: later calls are never attempted.
    pub async fn play_media(
        &self,
        media_url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ControlError> {
        info!("▶️ Casting {} to {}", media_url, self.info.friendly_name);

        self.invoke(
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", media_url),
                ("CurrentURIMetaData", ""),
            ],
            cancel,
        )
        .await?;
        self.set_state(ControllerState::SourceSet);

        tokio::select! {
            _ = cancel.cancelled() => return Err(ControlError::Cancelled),
            _ = tokio::time::sleep(self.options.settle_delay) => {}
        }

        self.invoke("Play", &[("InstanceID", "0"), ("Speed", "1")], cancel)
            .await?;
        self.set_state(ControllerState::Playing);

        self.subscription.start(self.options.heartbeat, cancel);
        Ok(())
    }

    /// Cancels the event subscription.
    pub fn stop(&self) {
        self.subscription.stop();
    }

    fn set_state(&self, state: ControllerState) {
        *self.state.lock().expect("controller state mutex poisoned") = state;
    }

    async fn invoke(
        &self,
        action: &str,
        args: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> Result<String, ControlError> {
        let body = build_soap_request(&self.endpoint.service_type, action, args)?;

        let request = self
            .client
            .post(&self.endpoint.control_url)
            .timeout(self.options.http_timeout)
            .header(CONTENT_TYPE, r#"text/xml; charset="utf-8""#)
            .header(
                "SOAPAction",
                soap_action_header(&self.endpoint.service_type, action),
            )
            .body(body);

        let transport = |source| ControlError::Transport {
            action: action.to_string(),
            source,
        };

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ControlError::Cancelled),
            sent = request.send() => sent.map_err(transport)?,
        };
        let status = response.status();
        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(ControlError::Cancelled),
            text = response.text() => text.map_err(transport)?,
        };

        if !status.is_success() {
            let excerpt: String = text.chars().take(200).collect();
            warn!(
                action,
                status = status.as_u16(),
                "SOAP call failed: {}",
                excerpt
            );
            return Err(ControlError::RemoteControl {
                action: action.to_string(),
                status: status.as_u16(),
                body: excerpt,
            });
        }

        debug!("{} accepted by {}", action, self.info.friendly_name);
        Ok(text)
    }
}

impl Drop for DeviceController {
    fn drop(&mut self) {
        self.subscription.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_url_uses_location_directory() {
        assert_eq!(
            resolve_service_url("http://192.168.1.9:1400/xml/device.xml", "/MediaRenderer/AVTransport/Control")
                .unwrap(),
            "http://192.168.1.9:1400/xml/MediaRenderer/AVTransport/Control"
        );
        assert_eq!(
            resolve_service_url("http://192.168.1.9:8080/description.xml", "upnp/control/avt").unwrap(),
            "http://192.168.1.9:8080/upnp/control/avt"
        );
    }

    #[test]
    fn test_absolute_url_is_kept() {
        assert_eq!(
            resolve_service_url("http://192.168.1.9/desc.xml", "http://192.168.1.9:5000/ctrl").unwrap(),
            "http://192.168.1.9:5000/ctrl"
        );
    }

    #[test]
    fn test_invalid_location() {
        assert!(matches!(
            resolve_service_url("not a url", "ctrl"),
            Err(ControlError::InvalidUrl { .. })
        ));
    }
}
