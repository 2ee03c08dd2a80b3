/// Utilitaires pour la gestion des adresses IP réseau.
///
/// Castify needs two things from the host network stack: the LAN IPv4
/// address advertised to renderers in media URLs, and the list of IPv4
/// interfaces on which the SSDP client joins the multicast group.
///
/// # Examples
///
/// ```
/// use castutils::lan_ipv4;
///
/// let host = lan_ipv4()
///     .map(|ip| ip.to_string())
///     .unwrap_or_else(|| "localhost".to_string());
/// println!("Advertised host: {}", host);
/// ```
mod ip_utils;

pub use ip_utils::{guess_local_ip, ipv4_interfaces, lan_ipv4};
