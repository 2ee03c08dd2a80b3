//! Renderer discovery: SSDP searches, bounded description fetches and a
//! deduplicated device set shared with subscribers.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use castconfig::Config;
use castupnp::ssdp::SSDP_ALL;
use castupnp::{SearchResponse, SsdpClient};
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::DiscoveryError;
use crate::model::DeviceRecord;
use crate::provider::{DeviceDescriptionProvider, HttpDescriptionProvider};

/// Callback fired once per newly admitted device, from a background task.
pub type FoundCallback = Arc<dyn Fn(&DeviceRecord) + Send + Sync>;

/// Sends one search for a target type and returns the responses seen within
/// `window`.
#[async_trait]
pub trait SsdpSearch: Send + Sync {
    async fn search(
        &self,
        target: &str,
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResponse>, DiscoveryError>;
}

#[async_trait]
impl SsdpSearch for SsdpClient {
    async fn search(
        &self,
        target: &str,
        window: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResponse>, DiscoveryError> {
        Ok(SsdpClient::search(self, target, window, cancel).await?)
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub timeout: Duration,
    pub detail_timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub search_targets: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            detail_timeout: Duration::from_secs(3),
            max_concurrent_fetches: 5,
            search_targets: vec![
                SSDP_ALL.to_string(),
                "urn:schemas-upnp-org:device:MediaRenderer:1".to_string(),
                "urn:schemas-upnp-org:device:MediaRenderer:2".to_string(),
            ],
        }
    }
}

impl DiscoveryOptions {
    pub fn from_config(config: &Config) -> Self {
        let defaults = Self::default();
        let timeout = config.get_discovery_timeout().unwrap_or_else(|e| {
            warn!("{}, using {:?}", e, defaults.timeout);
            defaults.timeout
        });
        let detail_timeout = config.get_discovery_detail_timeout().unwrap_or_else(|e| {
            warn!("{}, using {:?}", e, defaults.detail_timeout);
            defaults.detail_timeout
        });
        let max_concurrent_fetches = config
            .get_discovery_max_concurrent_fetches()
            .unwrap_or(defaults.max_concurrent_fetches)
            .max(1);
        let mut search_targets = config.get_discovery_search_targets();
        if search_targets.is_empty() {
            search_targets = defaults.search_targets;
        }

        Self {
            timeout,
            detail_timeout,
            max_concurrent_fetches,
            search_targets,
        }
    }
}

/// Append-only device set of the current search session.
struct DeviceStore {
    inner: Mutex<StoreInner>,
    events: broadcast::Sender<DeviceRecord>,
}

#[derive(Default)]
struct StoreInner {
    devices: Vec<DeviceRecord>,
    keys: HashSet<String>,
}

impl DeviceStore {
    fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(StoreInner::default()),
            events,
        }
    }

    fn reset(&self) {
        let mut inner = self.inner.lock().expect("device store mutex poisoned");
        inner.devices.clear();
        inner.keys.clear();
    }

    /// Adds `record` unless a device with the same key is already known.
    fn admit(&self, record: &DeviceRecord) -> bool {
        {
            let mut inner = self.inner.lock().expect("device store mutex poisoned");
            if !inner.keys.insert(record.key().to_string()) {
                return false;
            }
            inner.devices.push(record.clone());
        }
        // No receiver is fine.
        let _ = self.events.send(record.clone());
        true
    }

    fn snapshot(&self) -> Vec<DeviceRecord> {
        self.inner
            .lock()
            .expect("device store mutex poisoned")
            .devices
            .clone()
    }
}

/// Best-effort renderer discovery.
pub struct Discoverer {
    searcher: Arc<dyn SsdpSearch>,
    provider: Arc<dyn DeviceDescriptionProvider>,
    options: DiscoveryOptions,
    store: Arc<DeviceStore>,
    session_lock: tokio::sync::Mutex<()>,
}

impl Discoverer {
    pub fn new(
        searcher: Arc<dyn SsdpSearch>,
        provider: Arc<dyn DeviceDescriptionProvider>,
        options: DiscoveryOptions,
    ) -> Self {
        Self {
            searcher,
            provider,
            options,
            store: Arc::new(DeviceStore::new()),
            session_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Discoverer using a real SSDP socket and HTTP description fetches.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_network(options: DiscoveryOptions) -> Result<Self, DiscoveryError> {
        let searcher = Arc::new(SsdpClient::new()?);
        let provider = Arc::new(HttpDescriptionProvider::new(options.detail_timeout));
        Ok(Self::new(searcher, provider, options))
    }

    pub fn new_configured() -> Result<Self, DiscoveryError> {
        Self::with_network(DiscoveryOptions::from_config(&castconfig::get_config()))
    }

    pub fn options(&self) -> &DiscoveryOptions {
        &self.options
    }

    /// Devices admitted by the current (or last) search session
    pub fn devices(&self) -> Vec<DeviceRecord> {
        self.store.snapshot()
    }

    /// Receives every device admitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceRecord> {
        self.store.events.subscribe()
    }

    /// Runs one search session and returns the devices found.
    ///
    /// Target types are searched in turn. `timeout` is split into one window
    /// per target plus a final window for the last detail fetches. Every
    /// advertised location is fetched at most once, with at most
    /// `max_concurrent_fetches` fetches in flight. When `timeout` elapses or
    /// `cancel` fires, the devices admitted so far are returned.
    pub async fn search(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
        on_found: Option<FoundCallback>,
    ) -> Vec<DeviceRecord> {
        let _session_guard = self.session_lock.lock().await;
        self.store.reset();

        let session = cancel.child_token();
        let window = search_window(timeout, self.options.search_targets.len());
        let permits = Arc::new(Semaphore::new(self.options.max_concurrent_fetches.max(1)));
        let mut seen_locations: HashSet<String> = HashSet::new();
        let mut tasks = JoinSet::new();

        let collect = async {
            for target in &self.options.search_targets {
                if session.is_cancelled() {
                    break;
                }
                info!("🔍 Searching {} (window {:?})", target, window);

                let responses = match self.searcher.search(target, window, &session).await {
                    Ok(responses) => responses,
                    Err(e) => {
                        warn!("SSDP search for {} failed: {}", target, e);
                        continue;
                    }
                };

                for response in responses {
                    if !seen_locations.insert(response.location.clone()) {
                        debug!("Location {} already queued", response.location);
                        continue;
                    }
                    tasks.spawn(admit_candidate(
                        response,
                        Arc::clone(&self.provider),
                        Arc::clone(&self.store),
                        Arc::clone(&permits),
                        session.clone(),
                        self.options.detail_timeout,
                        on_found.clone(),
                    ));
                }
            }

            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!("Device detail task failed: {}", e);
                }
            }
        };

        tokio::select! {
            _ = collect => {}
            _ = tokio::time::sleep(timeout) => {
                info!("{}", DiscoveryError::Timeout(timeout));
            }
            _ = cancel.cancelled() => {
                info!("Discovery cancelled, returning partial results");
            }
        }

        session.cancel();
        tasks.abort_all();

        let devices = self.store.snapshot();
        info!("✅ Discovery finished with {} device(s)", devices.len());
        devices
    }
}

/// Listening time of one target, leaving one window after the last target
/// for its detail fetches.
fn search_window(timeout: Duration, targets: usize) -> Duration {
    let slots = u32::try_from(targets).unwrap_or(u32::MAX).saturating_add(1);
    timeout / slots
}

/// Fetches the details of one candidate and admits it into the store.
///
/// A failed fetch still admits a coarse record keyed by USN.
async fn admit_candidate(
    response: SearchResponse,
    provider: Arc<dyn DeviceDescriptionProvider>,
    store: Arc<DeviceStore>,
    permits: Arc<Semaphore>,
    session: CancellationToken,
    detail_timeout: Duration,
    on_found: Option<FoundCallback>,
) {
    let _permit = tokio::select! {
        permit = permits.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return,
        },
        _ = session.cancelled() => return,
    };

    let record = tokio::select! {
        _ = session.cancelled() => return,
        fetched = tokio::time::timeout(detail_timeout, provider.fetch(&response.location)) => {
            match fetched {
                Ok(Ok(description)) => DeviceRecord::from_description(&response, description),
                Ok(Err(e)) => {
                    warn!("Details for {} unavailable: {}", response.location, e);
                    DeviceRecord::coarse(&response)
                }
                Err(_) => {
                    warn!(
                        "Details for {} timed out after {:?}",
                        response.location, detail_timeout
                    );
                    DeviceRecord::coarse(&response)
                }
            }
        }
    };

    if store.admit(&record) {
        info!(
            key = record.key(),
            location = %record.location,
            "📺 Found {}",
            record.display_name()
        );
        if let Some(callback) = on_found {
            callback(&record);
        }
    } else {
        debug!("Device {} already known", record.key());
    }
}
