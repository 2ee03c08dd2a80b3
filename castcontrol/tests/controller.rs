use std::time::{Duration, Instant};

use castcontrol::{ControlError, ControllerOptions, ControllerState, DeviceController};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AVT_URN: &str = "urn:schemas-upnp-org:service:AVTransport:1";

const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Test TV</friendlyName>
    <manufacturer>Acme</manufacturer>
    <modelName>TV-1</modelName>
    <UDN>uuid:test-tv</UDN>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <controlURL>/upnp/control/AVTransport</controlURL>
        <eventSubURL>/upnp/event/AVTransport</eventSubURL>
      </service>
    </serviceList>
  </device>
</root>"#;

const NO_TRANSPORT: &str = r#"<root><device><friendlyName>Speaker</friendlyName>
<serviceList><service><serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
<controlURL>/rc</controlURL></service></serviceList></device></root>"#;

fn fast_options(settle: Duration) -> ControllerOptions {
    ControllerOptions {
        http_timeout: Duration::from_secs(2),
        settle_delay: settle,
        heartbeat: Duration::from_secs(30),
    }
}

fn soap_action(action: &str) -> String {
    format!("\"{}#{}\"", AVT_URN, action)
}

async fn renderer(description: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/description.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(description))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_create_resolves_endpoint_and_info() {
    let server = renderer(DESCRIPTION).await;
    let location = format!("{}/description.xml", server.uri());

    let controller = DeviceController::create_with_options(
        &location,
        fast_options(Duration::ZERO),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        controller.endpoint().control_url,
        format!("{}/upnp/control/AVTransport", server.uri())
    );
    assert_eq!(
        controller.endpoint().event_sub_url.as_deref(),
        Some(format!("{}/upnp/event/AVTransport", server.uri()).as_str())
    );
    assert_eq!(controller.device_info().friendly_name, "Test TV");
    assert_eq!(controller.device_info().manufacturer, "Acme");
    assert_eq!(controller.device_info().location, location);
    assert_eq!(controller.state(), ControllerState::DescriptionResolved);
}

#[tokio::test]
async fn test_missing_transport_service() {
    let server = renderer(NO_TRANSPORT).await;
    let location = format!("{}/description.xml", server.uri());

    let result = DeviceController::create(&location, &CancellationToken::new()).await;
    assert!(matches!(result, Err(ControlError::UnsupportedService(_))));
}

#[tokio::test]
async fn test_unreachable_description() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let location = format!("{}/description.xml", server.uri());

    let result = DeviceController::create(&location, &CancellationToken::new()).await;
    assert!(matches!(result, Err(ControlError::DescriptionFetch { .. })));
}

#[tokio::test]
async fn test_play_media_sequence() {
    let server = renderer(DESCRIPTION).await;
    Mock::given(method("POST"))
        .and(path("/upnp/control/AVTransport"))
        .and(header("SOAPAction", soap_action("SetAVTransportURI").as_str()))
        .and(body_string_contains(
            "<CurrentURI>http://192.168.1.5:8080/movie.mkv?transcode=true&amp;subtitle=1</CurrentURI>",
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upnp/control/AVTransport"))
        .and(header("SOAPAction", soap_action("Play").as_str()))
        .and(body_string_contains("<Speed>1</Speed>"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let controller = DeviceController::create_with_options(
        &format!("{}/description.xml", server.uri()),
        fast_options(Duration::from_millis(10)),
        &cancel,
    )
    .await
    .unwrap();

    controller
        .play_media(
            "http://192.168.1.5:8080/movie.mkv?transcode=true&subtitle=1",
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(controller.state(), ControllerState::Playing);
    assert!(controller.subscription_active());

    controller.stop();
    assert!(!controller.subscription_active());
}

#[tokio::test]
async fn test_failed_set_source_skips_play_and_subscription() {
    let server = renderer(DESCRIPTION).await;
    Mock::given(method("POST"))
        .and(header("SOAPAction", soap_action("SetAVTransportURI").as_str()))
        .respond_with(ResponseTemplate::new(500).set_body_string("<s:Fault>busy</s:Fault>"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("SOAPAction", soap_action("Play").as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let controller = DeviceController::create_with_options(
        &format!("{}/description.xml", server.uri()),
        fast_options(Duration::from_millis(10)),
        &cancel,
    )
    .await
    .unwrap();

    let err = controller
        .play_media("http://192.168.1.5:8080/a.mp4", &cancel)
        .await
        .unwrap_err();

    match err {
        ControlError::RemoteControl { action, status, body } => {
            assert_eq!(action, "SetAVTransportURI");
            assert_eq!(status, 500);
            assert!(body.contains("busy"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!controller.subscription_active());
    assert_eq!(controller.state(), ControllerState::DescriptionResolved);
}

#[tokio::test]
async fn test_cancel_during_settle_delay() {
    let server = renderer(DESCRIPTION).await;
    Mock::given(method("POST"))
        .and(header("SOAPAction", soap_action("SetAVTransportURI").as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("SOAPAction", soap_action("Play").as_str()))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let controller = DeviceController::create_with_options(
        &format!("{}/description.xml", server.uri()),
        fast_options(Duration::from_secs(10)),
        &cancel,
    )
    .await
    .unwrap();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = controller.play_media("http://192.168.1.5:8080/a.mp4", &cancel).await;

    assert!(matches!(result, Err(ControlError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(controller.state(), ControllerState::SourceSet);
    assert!(!controller.subscription_active());
}
