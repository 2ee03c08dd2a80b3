use get_if_addrs::{IfAddr, get_if_addrs};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Devine l'adresse IP locale de la machine.
///
/// Asks the OS which interface would be used to reach a public address
/// (`8.8.8.8:80`) through an unconnected UDP socket. No packet is sent.
///
/// Returns `None` when the host has no route or only an IPv6 route.
pub fn guess_local_ip() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() && !ip.is_loopback() => Some(ip),
        _ => None,
    }
}

/// Lists the IPv4 addresses of every non-loopback network interface.
///
/// Returns `(interface name, address)` pairs, in the order reported by the OS.
/// An interface enumeration failure yields an empty list.
pub fn ipv4_interfaces() -> Vec<(String, Ipv4Addr)> {
    let Ok(interfaces) = get_if_addrs() else {
        return Vec::new();
    };

    interfaces
        .into_iter()
        .filter_map(|iface| match iface.addr {
            IfAddr::V4(ref v4) if !v4.ip.is_loopback() => Some((iface.name.clone(), v4.ip)),
            _ => None,
        })
        .collect()
}

/// Detects the LAN IPv4 address advertised in media URLs.
///
/// The first non-loopback IPv4 interface wins; when interface enumeration
/// finds nothing, the routing-table guess of [`guess_local_ip`] is used.
pub fn lan_ipv4() -> Option<Ipv4Addr> {
    ipv4_interfaces()
        .into_iter()
        .map(|(_, ip)| ip)
        .next()
        .or_else(guess_local_ip)
}
