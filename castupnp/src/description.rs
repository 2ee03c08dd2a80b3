//! Device description (`description.xml`) parsing.
//!
//! Only the fields Castify needs are extracted: identity of the root device
//! and the service list of the root device and its embedded devices.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("Invalid device description XML: {0}")]
    Xml(#[from] quick_xml::DeError),
}

/// Service entry of a device description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescription {
    pub service_type: String,
    pub control_url: String,
    pub event_sub_url: Option<String>,
}

/// Parsed device description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescription {
    pub udn: Option<String>,
    pub friendly_name: Option<String>,
    pub manufacturer: Option<String>,
    pub model_name: Option<String>,
    pub device_type: Option<String>,
    /// Services of the root device first, then of embedded devices
    pub services: Vec<ServiceDescription>,
}

impl DeviceDescription {
    /// First service whose type contains `fragment` (case-insensitive)
    pub fn find_service(&self, fragment: &str) -> Option<&ServiceDescription> {
        let needle = fragment.to_ascii_lowercase();
        self.services
            .iter()
            .find(|s| s.service_type.to_ascii_lowercase().contains(&needle))
    }
}

#[derive(Debug, Deserialize)]
struct RootXml {
    device: DeviceXml,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeviceXml {
    #[serde(rename = "deviceType")]
    device_type: Option<String>,
    #[serde(rename = "friendlyName")]
    friendly_name: Option<String>,
    manufacturer: Option<String>,
    #[serde(rename = "modelName")]
    model_name: Option<String>,
    #[serde(rename = "UDN")]
    udn: Option<String>,
    #[serde(rename = "serviceList")]
    service_list: Option<ServiceListXml>,
    #[serde(rename = "deviceList")]
    device_list: Option<DeviceListXml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceListXml {
    service: Vec<ServiceXml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServiceXml {
    #[serde(rename = "serviceType")]
    service_type: Option<String>,
    #[serde(rename = "controlURL")]
    control_url: Option<String>,
    #[serde(rename = "eventSubURL")]
    event_sub_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeviceListXml {
    device: Vec<DeviceXml>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn collect_services(device: DeviceXml, out: &mut Vec<ServiceDescription>) {
    if let Some(list) = device.service_list {
        for service in list.service {
            let Some(control_url) = non_empty(service.control_url) else {
                continue;
            };
            out.push(ServiceDescription {
                service_type: non_empty(service.service_type).unwrap_or_default(),
                control_url,
                event_sub_url: non_empty(service.event_sub_url),
            });
        }
    }
    if let Some(list) = device.device_list {
        for embedded in list.device {
            collect_services(embedded, out);
        }
    }
}

/// Parses a UPnP device description document.
///
/// Identity fields come from the root device. Services without a control URL
/// are skipped.
pub fn parse_device_description(xml: &str) -> Result<DeviceDescription, DescriptionError> {
    let root: RootXml = quick_xml::de::from_str(xml)?;
    let mut device = root.device;

    let mut description = DeviceDescription {
        udn: non_empty(device.udn.take()),
        friendly_name: non_empty(device.friendly_name.take()),
        manufacturer: non_empty(device.manufacturer.take()),
        model_name: non_empty(device.model_name.take()),
        device_type: non_empty(device.device_type.take()),
        services: Vec::new(),
    };
    collect_services(device, &mut description.services);

    Ok(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RENDERER: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Living Room TV</friendlyName>
    <manufacturer>Sony Corporation</manufacturer>
    <modelName>KDL-55W805C</modelName>
    <UDN>uuid:1234-abcd</UDN>
    <iconList><icon><url>/icon.png</url></icon></iconList>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
        <controlURL>/upnp/control/RenderingControl</controlURL>
        <eventSubURL>/upnp/event/RenderingControl</eventSubURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <controlURL>/upnp/control/AVTransport</controlURL>
        <eventSubURL>/upnp/event/AVTransport</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn test_parse_renderer_description() {
        let desc = parse_device_description(RENDERER).unwrap();
        assert_eq!(desc.udn.as_deref(), Some("uuid:1234-abcd"));
        assert_eq!(desc.friendly_name.as_deref(), Some("Living Room TV"));
        assert_eq!(desc.manufacturer.as_deref(), Some("Sony Corporation"));
        assert_eq!(desc.model_name.as_deref(), Some("KDL-55W805C"));
        assert_eq!(desc.services.len(), 2);

        let avt = desc.find_service("avtransport").unwrap();
        assert_eq!(avt.control_url, "/upnp/control/AVTransport");
        assert_eq!(avt.event_sub_url.as_deref(), Some("/upnp/event/AVTransport"));
    }

    #[test]
    fn test_embedded_device_services_are_collected() {
        let xml = r#"<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <friendlyName>Receiver</friendlyName>
    <UDN>uuid:root</UDN>
    <deviceList>
      <device>
        <friendlyName>Embedded</friendlyName>
        <UDN>uuid:child</UDN>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
            <controlURL>AVTransport/ctrl</controlURL>
          </service>
        </serviceList>
      </device>
    </deviceList>
  </device>
</root>"#;

        let desc = parse_device_description(xml).unwrap();
        assert_eq!(desc.udn.as_deref(), Some("uuid:root"));
        assert_eq!(desc.friendly_name.as_deref(), Some("Receiver"));
        let avt = desc.find_service("AVTransport").unwrap();
        assert_eq!(avt.control_url, "AVTransport/ctrl");
        assert!(avt.event_sub_url.is_none());
    }

    #[test]
    fn test_missing_udn_and_services() {
        let xml = r#"<root><device><friendlyName>  Speaker  </friendlyName></device></root>"#;
        let desc = parse_device_description(xml).unwrap();
        assert!(desc.udn.is_none());
        assert_eq!(desc.friendly_name.as_deref(), Some("Speaker"));
        assert!(desc.find_service("AVTransport").is_none());
    }

    #[test]
    fn test_invalid_document_is_an_error() {
        assert!(parse_device_description("<html><body>nope</body></html>").is_err());
    }
}
