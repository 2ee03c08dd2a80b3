/*!
The Castify SSDP client is a *control point*.
It must **not** bind to UDP port 1900.

If a client socket shares port 1900 with a local media server (even with
SO_REUSEPORT) the kernel load-balances incoming datagrams between sockets and
search replies are lost randomly.

Therefore the client binds `0.0.0.0:0`, sends M-SEARCH to the multicast group
and receives the unicast replies on its ephemeral port.
*/

use super::{MAX_AGE, MAX_MX, SSDP_MULTICAST_ADDR, SSDP_PORT};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Unicast answer to an M-SEARCH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResponse {
    pub usn: String,
    pub st: String,
    pub location: String,
    pub server: String,
    pub max_age: u32,
    pub from: SocketAddr,
}

/// SSDP messages a control point cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsdpEvent {
    Alive {
        usn: String,
        nt: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
    ByeBye {
        usn: String,
        nt: String,
        from: SocketAddr,
    },
    SearchResponse(SearchResponse),
}

/// Client SSDP: sends M-SEARCH and collects the replies
pub struct SsdpClient {
    socket: UdpSocket,
}

impl SsdpClient {
    /// Opens the client socket on an ephemeral port.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> io::Result<Self> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;

        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
        socket2.bind(&bind_addr.into())?;
        socket2.set_nonblocking(true)?;

        let socket: std::net::UdpSocket = socket2.into();
        socket.set_multicast_loop_v4(true)?;

        let group = multicast_group();
        for (name, ipv4) in castutils::ipv4_interfaces() {
            match socket.join_multicast_v4(&group, &ipv4) {
                Ok(()) => debug!("SSDP: joined {} on {} ({})", SSDP_MULTICAST_ADDR, ipv4, name),
                Err(e) => warn!(
                    "SSDP: failed to join {} on {} ({}): {}",
                    SSDP_MULTICAST_ADDR, ipv4, name, e
                ),
            }
        }

        let socket = UdpSocket::from_std(socket)?;
        info!("✅ SSDP client ready on {}", socket.local_addr()?);

        Ok(Self { socket })
    }

    /// Local address of the client socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Envoie un M-SEARCH pour un type donné
    pub async fn send_msearch(&self, st: &str, mx: u32) -> io::Result<()> {
        let mx = mx.clamp(1, MAX_MX);
        let msg = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\
             USER-AGENT: Castify SSDP Client\r\n\
             \r\n",
            SSDP_MULTICAST_ADDR, SSDP_PORT, mx, st
        );

        let addr = SocketAddr::V4(SocketAddrV4::new(multicast_group(), SSDP_PORT));

        match self.socket.send_to(msg.as_bytes(), addr).await {
            Ok(_) => {
                info!("📤 M-SEARCH sent (ST={}, MX={})", st, mx);
                trace!("📨 M-SEARCH payload\n{}", msg);
                Ok(())
            }
            Err(e) => {
                warn!("❌ Failed to send M-SEARCH: {}", e);
                Err(e)
            }
        }
    }

    /// Sends one M-SEARCH for `st` and collects search responses until
    /// `window` elapses or `cancel` fires.
    ///
    /// NOTIFY traffic received meanwhile is ignored. Read errors are logged
    /// and do not end the window.
    pub async fn search(
        &self,
        st: &str,
        window: Duration,
        cancel: &CancellationToken,
    ) -> io::Result<Vec<SearchResponse>> {
        let mx = u32::try_from(window.as_secs()).unwrap_or(MAX_MX);
        self.send_msearch(st, mx).await?;

        let deadline = Instant::now() + window;
        let mut responses = Vec::new();
        let mut buf = [0u8; 8192];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("SSDP search for {} cancelled", st);
                    break;
                }
                _ = tokio::time::sleep_until(deadline) => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((n, from)) => {
                        let data = String::from_utf8_lossy(&buf[..n]);
                        if let Some(SsdpEvent::SearchResponse(response)) = parse_message(&data, from) {
                            debug!("📥 SSDP response from {}: {}", from, response.location);
                            responses.push(response);
                        }
                    }
                    Err(e) => warn!("❌ SSDP client read error: {}", e),
                }
            }
        }

        debug!("SSDP search for {} collected {} responses", st, responses.len());
        Ok(responses)
    }
}

fn multicast_group() -> Ipv4Addr {
    Ipv4Addr::new(239, 255, 255, 250)
}

/// Parses a raw SSDP datagram.
///
/// Returns `None` for M-SEARCH requests from other control points and for
/// messages missing one of their mandatory headers.
pub fn parse_message(data: &str, from: SocketAddr) -> Option<SsdpEvent> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim();
    let upper = first_line.to_ascii_uppercase();
    let headers = parse_headers(lines);

    let result = if upper.starts_with("NOTIFY ") {
        handle_notify(&headers, from)
    } else if upper.starts_with("HTTP/") && upper.contains(" 200") {
        handle_search_response(&headers, from)
    } else if upper.starts_with("M-SEARCH ") {
        None
    } else {
        trace!("Unknown SSDP message type from {}: {}", from, first_line);
        None
    };

    if result.is_none() {
        trace!("SSDP message from {} ignored:\n{}", from, data);
    }

    result
}

fn handle_notify(headers: &HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    let nt = headers.get("NT")?.to_string();
    let usn = headers.get("USN")?.to_string();

    match nts.as_str() {
        "ssdp:alive" => {
            let Some(location) = headers.get("LOCATION") else {
                trace!("NOTIFY ssdp:alive from {} missing LOCATION header", from);
                return None;
            };
            Some(SsdpEvent::Alive {
                usn,
                nt,
                location: location.to_string(),
                server: server_header(headers),
                max_age: parse_max_age(headers.get("CACHE-CONTROL")),
                from,
            })
        }
        "ssdp:byebye" => Some(SsdpEvent::ByeBye { usn, nt, from }),
        _ => {
            trace!("Unknown NTS value from {}: {}", from, nts);
            None
        }
    }
}

fn handle_search_response(
    headers: &HashMap<String, String>,
    from: SocketAddr,
) -> Option<SsdpEvent> {
    let (Some(st), Some(usn), Some(location)) = (
        headers.get("ST"),
        headers.get("USN"),
        headers.get("LOCATION"),
    ) else {
        trace!("M-SEARCH response from {} missing ST, USN or LOCATION", from);
        return None;
    };

    Some(SsdpEvent::SearchResponse(SearchResponse {
        usn: usn.to_string(),
        st: st.to_string(),
        location: location.to_string(),
        server: server_header(headers),
        max_age: parse_max_age(headers.get("CACHE-CONTROL")),
        from,
    }))
}

fn server_header(headers: &HashMap<String, String>) -> String {
    headers
        .get("SERVER")
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string())
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();

        // Empty line marks end of headers
        if line.is_empty() {
            break;
        }

        // Split on first ':' only (values may contain ':')
        let Some((name, value)) = line.split_once(':') else {
            trace!("Skipping line without colon: '{}'", line);
            continue;
        };

        let name = name.trim().to_ascii_uppercase();
        let value = value.trim();
        if name.is_empty() || value.is_empty() {
            trace!("Skipping malformed header: '{}'", line);
            continue;
        }
        headers.insert(name, value.to_string());
    }
    headers
}

fn parse_max_age(value: Option<&String>) -> u32 {
    if let Some(v) = value {
        let lower = v.to_ascii_lowercase();
        if let Some(idx) = lower.find("max-age") {
            let after_eq = lower[idx + 7..]
                .trim_start()
                .trim_start_matches('=')
                .trim_start();
            let digits: String = after_eq
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(age) = digits.parse::<u32>() {
                return age;
            }
        }
        trace!("Could not parse max-age from '{}', using {}", v, MAX_AGE);
    }
    MAX_AGE
}
