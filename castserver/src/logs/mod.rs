//! Logging initialisation: level filter reloadable at runtime, in-memory ring
//! buffer of recent entries with a live feed, optional console output.

mod buffer_layer;

pub use buffer_layer::BufferLayer;

use std::{
    collections::VecDeque,
    sync::{Arc, RwLock},
    time::SystemTime,
};

use castconfig::Config;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::{
    Registry,
    filter::LevelFilter,
    layer::SubscriberExt,
    reload,
    util::SubscriberInitExt,
};

/// Représente une entrée de log
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Buffer circulaire partagé
#[derive(Clone)]
pub struct LogState {
    buffer: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
    max_level: Arc<RwLock<Level>>,
    reload_handle: Option<Arc<reload::Handle<LevelFilter, Registry>>>,
}

impl LogState {
    pub fn new(capacity: usize, reload_handle: Option<reload::Handle<LevelFilter, Registry>>) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            tx: broadcast::channel(256).0,
            max_level: Arc::new(RwLock::new(Level::TRACE)),
            reload_handle: reload_handle.map(Arc::new),
        }
    }

    /// Changes the level filter of the installed subscriber.
    pub fn set_max_level(&self, level: Level) {
        *self.max_level.write().expect("log level lock poisoned") = level;

        if let Some(handle) = &self.reload_handle {
            if let Err(e) = handle.reload(LevelFilter::from_level(level)) {
                tracing::warn!("Failed to reload log level filter: {}", e);
            }
        }
    }

    pub fn get_max_level(&self) -> Level {
        *self.max_level.read().expect("log level lock poisoned")
    }

    pub(crate) fn push(&self, entry: LogEntry) {
        {
            let mut buf = self.buffer.write().expect("log buffer lock poisoned");
            if buf.len() == self.capacity {
                buf.pop_front();
            }
            buf.push_back(entry.clone());
        }
        let _ = self.tx.send(entry);
    }

    /// Live feed of new entries
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }

    /// Entries currently held, oldest first
    pub fn dump(&self) -> Vec<LogEntry> {
        self.buffer
            .read()
            .expect("log buffer lock poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

pub fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

/// Installs the global subscriber from `host.logger.*`.
///
/// If a global subscriber is already installed, the returned state is still
/// usable but receives no events.
pub fn init_logging(config: &Config) -> LogState {
    let level = config
        .get_log_min_level()
        .ok()
        .and_then(|l| string_to_level(&l))
        .unwrap_or(Level::INFO);

    let (filter, reload_handle) = reload::Layer::new(LevelFilter::from_level(level));

    let buffer_capacity = config.get_log_cache_size().unwrap_or(1000);
    let log_state = LogState::new(buffer_capacity, Some(reload_handle));
    *log_state.max_level.write().expect("log level lock poisoned") = level;

    // The filter must come first so it applies to every layer.
    let subscriber = Registry::default()
        .with(filter)
        .with(BufferLayer::new(log_state.clone()));

    let enable_console = config.get_log_enable_console().unwrap_or(true);
    let installed = if enable_console {
        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        subscriber.try_init()
    };

    if let Err(e) = installed {
        eprintln!("Logging already initialised: {}", e);
    }

    log_state
}
