//! Construction de requêtes SOAP

use super::{SOAP_ENCODING_STYLE, SOAP_ENVELOPE_NS};
use thiserror::Error;
use xmltree::{Element, XMLNode};

#[derive(Debug, Error)]
pub enum SoapError {
    #[error("Failed to write SOAP envelope: {0}")]
    Emit(#[from] xmltree::Error),

    #[error("SOAP envelope is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

fn build_soap_envelope_with_body(body_child: Element) -> Result<String, SoapError> {
    let mut body = Element::new("s:Body");
    body.children.push(XMLNode::Element(body_child));

    let mut envelope = Element::new("s:Envelope");
    envelope
        .attributes
        .insert("xmlns:s".to_string(), SOAP_ENVELOPE_NS.to_string());
    envelope
        .attributes
        .insert("s:encodingStyle".to_string(), SOAP_ENCODING_STYLE.to_string());
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    // Some renderers reject `<Arg/>`, so empty arguments keep an explicit end tag.
    let config = xmltree::EmitterConfig::new()
        .write_document_declaration(true)
        .normalize_empty_elements(false)
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8(buf)?)
}

/// Builds a UPnP SOAP action request.
///
/// Argument values are written as text nodes, so URLs containing `&`, `<` or
/// quotes are escaped by the emitter.
///
/// # Arguments
///
/// * `service_urn` - URN du service (ex: "urn:schemas-upnp-org:service:AVTransport:1")
/// * `action` - Nom de l'action (ex: "SetAVTransportURI")
/// * `args` - Ordered action arguments
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, SoapError> {
    let request_name = format!("u:{}", action);
    let mut request_elem = Element::new(&request_name);
    request_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in args {
        let mut child = Element::new(name);
        if !value.is_empty() {
            child.children.push(XMLNode::Text((*value).to_string()));
        }
        request_elem.children.push(XMLNode::Element(child));
    }

    build_soap_envelope_with_body(request_elem)
}

/// Value of the `SOAPAction` HTTP header for an action, quotes included
pub fn soap_action_header(service_urn: &str, action: &str) -> String {
    format!("\"{}#{}\"", service_urn, action)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AVT: &str = "urn:schemas-upnp-org:service:AVTransport:1";

    #[test]
    fn test_build_set_uri_request() {
        let xml = build_soap_request(
            AVT,
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", "http://192.168.1.5:8080/movie.mp4"),
                ("CurrentURIMetaData", ""),
            ],
        )
        .unwrap();

        assert!(xml.contains("<u:SetAVTransportURI"));
        assert!(xml.contains("xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\""));
        assert!(xml.contains("<InstanceID>0</InstanceID>"));
        assert!(xml.contains("<CurrentURI>http://192.168.1.5:8080/movie.mp4</CurrentURI>"));
        assert!(xml.contains("<CurrentURIMetaData></CurrentURIMetaData>"));
        assert!(xml.contains("xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\""));
    }

    #[test]
    fn test_argument_values_are_escaped() {
        let xml = build_soap_request(
            AVT,
            "SetAVTransportURI",
            &[("CurrentURI", "http://h/a.mkv?transcode=true&subtitle=1")],
        )
        .unwrap();

        assert!(xml.contains("transcode=true&amp;subtitle=1"));
        assert!(!xml.contains("transcode=true&subtitle=1"));
    }

    #[test]
    fn test_soap_action_header_is_quoted() {
        assert_eq!(
            soap_action_header(AVT, "Play"),
            "\"urn:schemas-upnp-org:service:AVTransport:1#Play\""
        );
    }
}
