use castupnp::{DeviceDescription, SearchResponse};
use serde::Serialize;

/// A discovered renderer, deduplicated by [`DeviceRecord::key`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub usn: String,
    pub udn: Option<String>,
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub location: String,
    pub server: String,
}

impl DeviceRecord {
    /// Record built from a search response and its parsed description
    pub fn from_description(response: &SearchResponse, description: DeviceDescription) -> Self {
        Self {
            usn: response.usn.clone(),
            udn: description.udn,
            friendly_name: description.friendly_name,
            manufacturer: description.manufacturer,
            model_name: description.model_name,
            location: response.location.clone(),
            server: response.server.clone(),
        }
    }

    /// Record for a device whose description could not be fetched
    pub fn coarse(response: &SearchResponse) -> Self {
        Self {
            usn: response.usn.clone(),
            udn: None,
            friendly_name: None,
            manufacturer: None,
            model_name: None,
            location: response.location.clone(),
            server: response.server.clone(),
        }
    }

    /// Deduplication key: UDN when present and non-empty, USN otherwise
    pub fn key(&self) -> &str {
        match self.udn.as_deref() {
            Some(udn) if !udn.trim().is_empty() => udn,
            _ => &self.usn,
        }
    }

    /// Whether the device description was retrieved
    pub fn has_details(&self) -> bool {
        self.friendly_name.is_some() || self.udn.is_some()
    }

    /// Name shown to the user
    pub fn display_name(&self) -> String {
        if let Some(name) = self.friendly_name.as_deref() {
            return name.to_string();
        }
        if !self.server.is_empty() && self.server != "Unknown" {
            return coarse_device_name(&self.server);
        }
        host_of(&self.location)
            .map(str::to_string)
            .unwrap_or_else(|| "Unknown device".to_string())
    }
}

/// Information exposed by a device controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub location: String,
}

const TV_BRANDS: &[(&str, &str)] = &[
    ("lg", "LG TV"),
    ("samsung", "Samsung TV"),
    ("panasonic", "Panasonic TV"),
    ("sharp", "Sharp TV"),
    ("toshiba", "Toshiba TV"),
    ("philips", "Philips TV"),
    ("hisense", "Hisense TV"),
    ("tcl", "TCL TV"),
];

/// Derives a readable name from an SSDP `SERVER` header.
pub fn coarse_device_name(server: &str) -> String {
    if let Some((_, model)) = server.split_once("KDL-") {
        let model: String = model
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        return format!("Sony TV (KDL-{})", model);
    }

    let lower = server.to_ascii_lowercase();
    if let Some((_, name)) = TV_BRANDS.iter().find(|(kw, _)| lower.contains(kw)) {
        return name.to_string();
    }

    if let Some(idx) = server.find(" UPnP/") {
        if idx > 0 {
            return server[..idx].to_string();
        }
    }

    if let Some(idx) = server.find('/') {
        let first = &server[..idx];
        if first.len() >= 3 && !first.chars().any(|c| c.is_ascii_digit()) {
            return first.to_string();
        }
    }

    if server.chars().count() > 30 {
        let head: String = server.chars().take(27).collect();
        return format!("{}...", head);
    }
    server.to_string()
}

fn host_of(location: &str) -> Option<&str> {
    location.split('/').nth(2).filter(|h| !h.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(usn: &str, server: &str) -> SearchResponse {
        SearchResponse {
            usn: usn.to_string(),
            st: "ssdp:all".to_string(),
            location: "http://192.168.1.30:1400/xml/device.xml".to_string(),
            server: server.to_string(),
            max_age: 1800,
            from: "192.168.1.30:1900".parse().unwrap(),
        }
    }

    #[test]
    fn test_key_prefers_udn() {
        let desc = DeviceDescription {
            udn: Some("uuid:tv".to_string()),
            ..Default::default()
        };
        let record = DeviceRecord::from_description(&response("uuid:tv::upnp:rootdevice", ""), desc);
        assert_eq!(record.key(), "uuid:tv");

        let coarse = DeviceRecord::coarse(&response("uuid:tv::upnp:rootdevice", ""));
        assert_eq!(coarse.key(), "uuid:tv::upnp:rootdevice");
    }

    #[test]
    fn test_empty_udn_falls_back_to_usn() {
        let mut record = DeviceRecord::coarse(&response("uuid:x", ""));
        record.udn = Some("  ".to_string());
        assert_eq!(record.key(), "uuid:x");
    }

    #[test]
    fn test_coarse_names() {
        assert_eq!(
            coarse_device_name("Linux/3.10 UPnP/1.0 KDL-55W805C/1.0"),
            "Sony TV (KDL-55W805C)"
        );
        assert_eq!(coarse_device_name("WebOS/4.1.0 UPnP/1.0 LG/1.0"), "LG TV");
        assert_eq!(coarse_device_name("Kodi UPnP/1.0 Platinum/1.0"), "Kodi");
        assert_eq!(coarse_device_name("Roku/9.4.0"), "Roku");
        assert_eq!(coarse_device_name("Linux 4.9"), "Linux 4.9");
        assert_eq!(
            coarse_device_name("Some very long renderer server header 1.2.3"),
            "Some very long renderer ser..."
        );
    }

    #[test]
    fn test_display_name_prefers_friendly_name() {
        let desc = DeviceDescription {
            friendly_name: Some("Bedroom".to_string()),
            ..Default::default()
        };
        let record = DeviceRecord::from_description(&response("uuid:b", "Roku/9.4.0"), desc);
        assert_eq!(record.display_name(), "Bedroom");

        let coarse = DeviceRecord::coarse(&response("uuid:b", "Unknown"));
        assert_eq!(coarse.display_name(), "192.168.1.30:1400");
    }
}
