//! # castupnp - UPnP wire layer for Castify
//!
//! Everything that speaks UPnP on the wire, with no policy attached:
//!
//! - [`ssdp`] : M-SEARCH client and SSDP message parsing
//! - [`soap`] : SOAP request envelopes for control actions
//! - [`description`] : device description (`description.xml`) parsing
//!
//! Discovery policy (deduplication, concurrency) and renderer control live in
//! `castcontrol`.

pub mod description;
pub mod soap;
pub mod ssdp;

pub use description::{DescriptionError, DeviceDescription, ServiceDescription, parse_device_description};
pub use soap::{SoapError, build_soap_request};
pub use ssdp::{SearchResponse, SsdpClient, SsdpEvent};

/// Service type fragment identifying the playback transport service
pub const AV_TRANSPORT_FRAGMENT: &str = "AVTransport";

/// Default AVTransport service URN
pub const AV_TRANSPORT_URN: &str = "urn:schemas-upnp-org:service:AVTransport:1";
