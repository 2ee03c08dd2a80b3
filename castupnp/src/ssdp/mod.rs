//! # SSDP - Simple Service Discovery Protocol
//!
//! Castify only acts as a *control point*: it sends `M-SEARCH` requests and
//! collects the unicast `HTTP/1.1 200 OK` answers of renderers. It never
//! answers searches and never announces itself.
//!
//! - [`SsdpClient`] : ephemeral-port client sending M-SEARCH and reading replies
//! - [`SsdpEvent`] : parsed SSDP message (NOTIFY alive/byebye, search response)
//!
//! ## Constants
//!
//! - **Multicast Address**: 239.255.255.250:1900
//! - **Max-Age**: 1800 seconds, used when a reply carries no usable `CACHE-CONTROL`

mod client;

pub use client::{SearchResponse, SsdpClient, SsdpEvent, parse_message};

/// Adresse multicast SSDP
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Default validity of an announcement (seconds)
pub const MAX_AGE: u32 = 1800;

/// Search target matching every device and service
pub const SSDP_ALL: &str = "ssdp:all";

/// Largest MX value sent in an M-SEARCH
pub const MAX_MX: u32 = 5;
