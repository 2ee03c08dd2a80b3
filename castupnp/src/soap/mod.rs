//! # SOAP - control requests
//!
//! Builds the SOAP 1.1 envelopes sent to a renderer's control URL.

mod builder;

pub use builder::{SoapError, build_soap_request, soap_action_header};

/// Namespace of the SOAP envelope
pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP encoding style required by UPnP
pub const SOAP_ENCODING_STYLE: &str = "http://schemas.xmlsoap.org/soap/encoding/";
