//! # castcontrol - renderer discovery and control
//!
//! - [`Discoverer`] : SSDP search sessions producing a deduplicated set of
//!   [`DeviceRecord`]s
//! - [`DeviceController`] : AVTransport control of one renderer
//!   (`SetAVTransportURI` then `Play`)

pub mod controller;
pub mod discovery;
pub mod errors;
pub mod model;
pub mod provider;
pub mod subscription;

pub use controller::{ControlEndpoint, ControllerOptions, ControllerState, DeviceController};
pub use discovery::{Discoverer, DiscoveryOptions, FoundCallback, SsdpSearch};
pub use errors::{ControlError, DiscoveryError};
pub use model::{DeviceInfo, DeviceRecord, coarse_device_name};
pub use provider::{DeviceDescriptionProvider, HttpDescriptionProvider};
